//! Dependency Resolver - 의존성 기반 활성화 순서 계산

use super::manifest::PluginDescriptor;
use std::collections::{HashMap, HashSet};
use weave_foundation::{Error, Result};

/// 활성화 순서 계산
///
/// 입력은 등록 순서대로 정렬된 디스크립터. 서로 독립인 플러그인은 등록 순서를 유지한다.
/// 등록되지 않은 의존성은 순서 계산에서 무시하고, enable 시점에 `DependencyUnavailable`로 걸러진다.
pub fn resolve_order(descriptors: &[PluginDescriptor]) -> Result<Vec<String>> {
    let index: HashMap<&str, usize> = descriptors
        .iter()
        .enumerate()
        .map(|(i, d)| (d.name.as_str(), i))
        .collect();

    // 남은 (등록된) 의존성 수
    let mut pending: Vec<usize> = descriptors
        .iter()
        .map(|d| {
            d.dependencies
                .iter()
                .filter(|dep| index.contains_key(dep.as_str()))
                .collect::<HashSet<_>>()
                .len()
        })
        .collect();

    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); descriptors.len()];
    for (i, d) in descriptors.iter().enumerate() {
        let unique: HashSet<&str> = d.dependencies.iter().map(String::as_str).collect();
        for dep in unique {
            if let Some(&j) = index.get(dep) {
                dependents[j].push(i);
            }
        }
    }

    let mut done = vec![false; descriptors.len()];
    let mut order = Vec::with_capacity(descriptors.len());

    // 준비된 노드 중 등록 순서가 가장 빠른 것부터
    while let Some(next) = (0..descriptors.len()).find(|&i| !done[i] && pending[i] == 0) {
        done[next] = true;
        order.push(descriptors[next].name.clone());
        for &dependent in &dependents[next] {
            pending[dependent] -= 1;
        }
    }

    if order.len() < descriptors.len() {
        let remaining: Vec<usize> = (0..descriptors.len()).filter(|&i| !done[i]).collect();
        return Err(Error::CyclicDependency {
            cycle: find_cycle(descriptors, &index, &done, remaining[0]),
        });
    }

    Ok(order)
}

/// 남은 그래프에서 순환 경로를 찾는다. 결과는 [a, b, c, a] 형태.
fn find_cycle(
    descriptors: &[PluginDescriptor],
    index: &HashMap<&str, usize>,
    done: &[bool],
    start: usize,
) -> Vec<String> {
    let mut path: Vec<usize> = vec![start];
    let mut seen: HashMap<usize, usize> = HashMap::from([(start, 0)]);
    let mut current = start;

    // 남은 노드는 모두 남은 의존성을 하나 이상 가지므로 반드시 순환에 도달한다
    loop {
        let next = descriptors[current]
            .dependencies
            .iter()
            .filter_map(|dep| index.get(dep.as_str()).copied())
            .find(|&j| !done[j]);

        let Some(next) = next else {
            return path.iter().map(|&i| descriptors[i].name.clone()).collect();
        };

        if let Some(&pos) = seen.get(&next) {
            let mut cycle: Vec<String> = path[pos..]
                .iter()
                .map(|&i| descriptors[i].name.clone())
                .collect();
            cycle.push(descriptors[next].name.clone());
            return cycle;
        }

        seen.insert(next, path.len());
        path.push(next);
        current = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(name: &str, deps: &[&str]) -> PluginDescriptor {
        deps.iter()
            .fold(PluginDescriptor::new(name), |d, dep| d.with_dependency(*dep))
    }

    #[test]
    fn test_dependencies_come_first() {
        let order = resolve_order(&[
            desc("app", &["auth", "db"]),
            desc("auth", &["db"]),
            desc("db", &[]),
        ])
        .unwrap();
        assert_eq!(order, vec!["db", "auth", "app"]);
    }

    #[test]
    fn test_independent_plugins_keep_registration_order() {
        let order = resolve_order(&[
            desc("c", &[]),
            desc("a", &[]),
            desc("b", &["c"]),
            desc("d", &[]),
        ])
        .unwrap();
        assert_eq!(order, vec!["c", "a", "b", "d"]);
    }

    #[test]
    fn test_cycle_names_members() {
        let err = resolve_order(&[
            desc("a", &["b"]),
            desc("b", &["c"]),
            desc("c", &["a"]),
            desc("free", &[]),
        ])
        .unwrap_err();

        match err {
            Error::CyclicDependency { cycle } => {
                assert_eq!(cycle, vec!["a", "b", "c", "a"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_cycle_reached_through_tail() {
        let err = resolve_order(&[
            desc("tail", &["x"]),
            desc("x", &["y"]),
            desc("y", &["x"]),
        ])
        .unwrap_err();

        match err {
            Error::CyclicDependency { cycle } => assert_eq!(cycle, vec!["x", "y", "x"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_dependency_is_ignored() {
        let order = resolve_order(&[desc("a", &["ghost"]), desc("b", &[])]).unwrap();
        assert_eq!(order, vec!["a", "b"]);
    }

    #[test]
    fn test_duplicate_dependency_entries() {
        let order = resolve_order(&[desc("a", &["b", "b"]), desc("b", &[])]).unwrap();
        assert_eq!(order, vec!["b", "a"]);
    }
}
