//! Plugin Registry - 플러그인 저장소
//!
//! 디스크립터와 현재 라이프사이클 상태를 보관한다.
//! 상태 변경은 `set_state`로만 하며, 허용되지 않은 전이는 거부된다.

use super::lifecycle::LifecycleState;
use super::manifest::PluginDescriptor;
use super::traits::Plugin;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use weave_foundation::{Error, Result};

/// 플러그인 정보
pub struct PluginInfo {
    /// 플러그인 인스턴스
    pub plugin: Arc<dyn Plugin>,

    /// 등록 시점에 고정된 디스크립터
    pub descriptor: PluginDescriptor,

    /// 현재 상태
    pub state: LifecycleState,

    /// 등록 순서
    pub load_order: usize,

    /// 연속 enable 실패 횟수
    pub enable_failures: u32,

    /// 재시도 한도를 넘겨 영구 실패로 표시됨
    pub permanently_failed: bool,

    /// 마지막 실패 메시지
    pub last_error: Option<String>,
}

/// 플러그인 레지스트리 - 모든 플러그인 관리
pub struct PluginRegistry {
    /// 플러그인 저장소 (name -> PluginInfo)
    plugins: RwLock<HashMap<String, PluginInfo>>,

    /// 로드 카운터
    load_counter: RwLock<usize>,
}

impl PluginRegistry {
    /// 새 레지스트리 생성
    pub fn new() -> Self {
        Self {
            plugins: RwLock::new(HashMap::new()),
            load_counter: RwLock::new(0),
        }
    }

    /// 플러그인 등록
    ///
    /// 같은 이름이 이미 있으면 `DuplicateName`. 이 경우 레지스트리는 바뀌지 않는다.
    pub fn register(&self, plugin: Arc<dyn Plugin>) -> Result<PluginDescriptor> {
        let descriptor = plugin.descriptor();
        let name = descriptor.name.clone();

        let mut plugins = self.plugins.write();
        if plugins.contains_key(&name) {
            return Err(Error::DuplicateName(name));
        }

        let load_order = {
            let mut counter = self.load_counter.write();
            *counter += 1;
            *counter
        };

        plugins.insert(
            name.clone(),
            PluginInfo {
                plugin,
                descriptor: descriptor.clone(),
                state: LifecycleState::Registered,
                load_order,
                enable_failures: 0,
                permanently_failed: false,
                last_error: None,
            },
        );

        info!(plugin = %name, version = %descriptor.version, "Registered plugin");
        Ok(descriptor)
    }

    /// 플러그인 등록 해제
    pub fn unregister(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        let removed = self.plugins.write().remove(name);
        if removed.is_some() {
            debug!(plugin = %name, "Unregistered plugin");
        }
        removed.map(|info| info.plugin)
    }

    /// 플러그인 조회
    pub fn get(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins
            .read()
            .get(name)
            .map(|info| Arc::clone(&info.plugin))
    }

    /// 디스크립터 조회
    pub fn descriptor(&self, name: &str) -> Option<PluginDescriptor> {
        self.plugins.read().get(name).map(|info| info.descriptor.clone())
    }

    /// 상태 조회
    pub fn state(&self, name: &str) -> Option<LifecycleState> {
        self.plugins.read().get(name).map(|info| info.state)
    }

    /// 상태 전이. 이전 상태를 반환
    pub fn set_state(&self, name: &str, to: LifecycleState) -> Result<LifecycleState> {
        let mut plugins = self.plugins.write();
        let info = plugins
            .get_mut(name)
            .ok_or_else(|| Error::PluginNotFound(name.to_string()))?;

        let from = info.state;
        if !from.can_transition_to(to) {
            return Err(Error::InvalidTransition {
                plugin: name.to_string(),
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        info.state = to;
        debug!(plugin = %name, %from, %to, "State transition");
        Ok(from)
    }

    /// enable 실패 기록. 누적 실패 횟수를 반환
    pub fn record_enable_failure(&self, name: &str, message: impl Into<String>) -> u32 {
        let mut plugins = self.plugins.write();
        match plugins.get_mut(name) {
            Some(info) => {
                info.enable_failures += 1;
                info.last_error = Some(message.into());
                info.enable_failures
            }
            None => 0,
        }
    }

    /// enable 성공 시 실패 카운터 초기화
    pub fn reset_enable_failures(&self, name: &str) {
        if let Some(info) = self.plugins.write().get_mut(name) {
            info.enable_failures = 0;
            info.last_error = None;
        }
    }

    pub fn mark_permanently_failed(&self, name: &str) {
        if let Some(info) = self.plugins.write().get_mut(name) {
            info.permanently_failed = true;
        }
    }

    pub fn is_permanently_failed(&self, name: &str) -> bool {
        self.plugins
            .read()
            .get(name)
            .map(|info| info.permanently_failed)
            .unwrap_or(false)
    }

    pub fn last_error(&self, name: &str) -> Option<String> {
        self.plugins
            .read()
            .get(name)
            .and_then(|info| info.last_error.clone())
    }

    /// 등록 순서대로 디스크립터 목록
    pub fn descriptors_in_order(&self) -> Vec<PluginDescriptor> {
        let plugins = self.plugins.read();
        let mut infos: Vec<_> = plugins.values().collect();
        infos.sort_by_key(|info| info.load_order);
        infos.iter().map(|info| info.descriptor.clone()).collect()
    }

    /// 등록 순서대로 (이름, 상태) 목록
    pub fn states_in_order(&self) -> Vec<(String, LifecycleState)> {
        let plugins = self.plugins.read();
        let mut infos: Vec<_> = plugins.values().collect();
        infos.sort_by_key(|info| info.load_order);
        infos
            .iter()
            .map(|info| (info.descriptor.name.clone(), info.state))
            .collect()
    }

    /// 플러그인 존재 여부 확인
    pub fn contains(&self, name: &str) -> bool {
        self.plugins.read().contains_key(name)
    }

    /// 플러그인 수
    pub fn len(&self) -> usize {
        self.plugins.read().len()
    }

    /// 비어있는지 확인
    pub fn is_empty(&self) -> bool {
        self.plugins.read().is_empty()
    }

    /// 이 플러그인에 의존하는 플러그인 이름들
    pub fn dependents_of(&self, name: &str) -> Vec<String> {
        let plugins = self.plugins.read();
        let mut dependents: Vec<_> = plugins
            .values()
            .filter(|info| info.descriptor.depends_on(name))
            .collect();
        dependents.sort_by_key(|info| info.load_order);
        dependents
            .iter()
            .map(|info| info.descriptor.name.clone())
            .collect()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestPlugin {
        descriptor: PluginDescriptor,
    }

    impl Plugin for TestPlugin {
        fn descriptor(&self) -> PluginDescriptor {
            self.descriptor.clone()
        }
    }

    fn plugin(name: &str) -> Arc<dyn Plugin> {
        Arc::new(TestPlugin {
            descriptor: PluginDescriptor::new(name),
        })
    }

    #[test]
    fn test_register_and_get() {
        let registry = PluginRegistry::new();
        registry.register(plugin("a")).unwrap();

        assert!(registry.contains("a"));
        assert_eq!(registry.state("a"), Some(LifecycleState::Registered));
        assert!(registry.get("a").is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_leaves_registry_unchanged() {
        let registry = PluginRegistry::new();
        registry.register(plugin("a")).unwrap();
        registry.set_state("a", LifecycleState::Initializing).unwrap();

        let err = registry.register(plugin("a")).unwrap_err();
        assert!(matches!(err, Error::DuplicateName(ref n) if n == "a"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.state("a"), Some(LifecycleState::Initializing));
    }

    #[test]
    fn test_invalid_transition_rejected() {
        let registry = PluginRegistry::new();
        registry.register(plugin("a")).unwrap();

        let err = registry.set_state("a", LifecycleState::Enabled).unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
        assert_eq!(registry.state("a"), Some(LifecycleState::Registered));
    }

    #[test]
    fn test_order_and_dependents() {
        let registry = PluginRegistry::new();
        registry.register(plugin("b")).unwrap();
        registry.register(plugin("a")).unwrap();
        registry
            .register(Arc::new(TestPlugin {
                descriptor: PluginDescriptor::new("c").with_dependency("a"),
            }))
            .unwrap();

        let names: Vec<_> = registry
            .descriptors_in_order()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["b", "a", "c"]);
        assert_eq!(registry.dependents_of("a"), vec!["c"]);
    }

    #[test]
    fn test_enable_failure_counter() {
        let registry = PluginRegistry::new();
        registry.register(plugin("a")).unwrap();

        assert_eq!(registry.record_enable_failure("a", "boom"), 1);
        assert_eq!(registry.record_enable_failure("a", "boom"), 2);
        assert_eq!(registry.last_error("a").as_deref(), Some("boom"));

        registry.reset_enable_failures("a");
        assert_eq!(registry.record_enable_failure("a", "again"), 1);
    }
}
