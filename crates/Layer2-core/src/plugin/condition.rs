//! Conditional Loader - 플러그인 등록 여부를 결정하는 조건식
//!
//! 환경 변수, 기능 플래그, 설정 값으로 구성된 컨텍스트 위에서 평가한다.
//! 평가는 순수 함수이며 부작용이 없다.
//!
//! ```json
//! { "type": "and", "conditions": [
//!     { "type": "equals", "path": "env.APP_ENV", "value": "production" },
//!     { "type": "not", "condition": { "type": "exists", "path": "features.legacy" } }
//! ] }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;
use weave_foundation::{ConditionConfig, UnknownPredicatePolicy};

// ============================================================================
// Condition - 조건식
// ============================================================================

/// 조건식
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    And { conditions: Vec<Condition> },
    Or { conditions: Vec<Condition> },
    Not { condition: Box<Condition> },
    Equals { path: String, value: Value },
    NotEquals { path: String, value: Value },
    Contains { path: String, value: Value },
    GreaterThan { path: String, value: Value },
    LessThan { path: String, value: Value },
    Exists { path: String },
    /// 호스트가 등록한 이름 있는 술어
    Custom {
        name: String,
        #[serde(default)]
        args: Value,
    },
    /// 알 수 없는 타입 (정책에 따라 평가)
    #[serde(other)]
    Unknown,
}

impl Condition {
    pub fn and(conditions: Vec<Condition>) -> Self {
        Self::And { conditions }
    }

    pub fn or(conditions: Vec<Condition>) -> Self {
        Self::Or { conditions }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(condition: Condition) -> Self {
        Self::Not {
            condition: Box::new(condition),
        }
    }

    pub fn equals(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Equals {
            path: path.into(),
            value: value.into(),
        }
    }

    pub fn not_equals(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::NotEquals {
            path: path.into(),
            value: value.into(),
        }
    }

    pub fn contains(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Contains {
            path: path.into(),
            value: value.into(),
        }
    }

    pub fn greater_than(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::GreaterThan {
            path: path.into(),
            value: value.into(),
        }
    }

    pub fn less_than(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::LessThan {
            path: path.into(),
            value: value.into(),
        }
    }

    pub fn exists(path: impl Into<String>) -> Self {
        Self::Exists { path: path.into() }
    }

    pub fn custom(name: impl Into<String>, args: Value) -> Self {
        Self::Custom {
            name: name.into(),
            args,
        }
    }
}

// ============================================================================
// ConditionContext - 평가 컨텍스트
// ============================================================================

/// 평가 컨텍스트
///
/// 경로의 첫 세그먼트가 영역을 고른다: `env.NAME`, `features.NAME`, `config.a.b.0`.
#[derive(Debug, Clone, Default)]
pub struct ConditionContext {
    pub env: HashMap<String, String>,
    pub features: HashMap<String, bool>,
    pub config: Value,
}

impl ConditionContext {
    pub fn new() -> Self {
        Self {
            config: Value::Object(Default::default()),
            ..Default::default()
        }
    }

    /// 현재 프로세스 환경 변수와 설정의 기능 플래그로 생성
    pub fn from_env(config: &ConditionConfig) -> Self {
        Self {
            env: std::env::vars().collect(),
            features: config.features.clone(),
            config: Value::Object(Default::default()),
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_feature(mut self, name: impl Into<String>, enabled: bool) -> Self {
        self.features.insert(name.into(), enabled);
        self
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }

    /// 경로 조회
    pub fn lookup(&self, path: &str) -> Option<Value> {
        let (root, rest) = path.split_once('.')?;
        match root {
            "env" => self.env.get(rest).cloned().map(Value::String),
            "features" => self.features.get(rest).copied().map(Value::Bool),
            "config" => {
                let mut current = &self.config;
                for segment in rest.split('.') {
                    current = match current {
                        Value::Object(map) => map.get(segment)?,
                        Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                        _ => return None,
                    };
                }
                Some(current.clone())
            }
            _ => None,
        }
    }
}

// ============================================================================
// ConditionEvaluator - 평가기
// ============================================================================

/// 커스텀 술어: (args, context) -> bool
pub type CustomPredicate = Arc<dyn Fn(&Value, &ConditionContext) -> bool + Send + Sync>;

/// 조건 평가기
#[derive(Clone, Default)]
pub struct ConditionEvaluator {
    policy: UnknownPredicatePolicy,
    predicates: HashMap<String, CustomPredicate>,
}

impl ConditionEvaluator {
    pub fn new(policy: UnknownPredicatePolicy) -> Self {
        Self {
            policy,
            predicates: HashMap::new(),
        }
    }

    pub fn from_config(config: &ConditionConfig) -> Self {
        Self::new(config.unknown_predicate)
    }

    /// 빌더 패턴: 커스텀 술어 추가
    pub fn with_predicate<F>(mut self, name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Value, &ConditionContext) -> bool + Send + Sync + 'static,
    {
        self.register_predicate(name, predicate);
        self
    }

    pub fn register_predicate<F>(&mut self, name: impl Into<String>, predicate: F)
    where
        F: Fn(&Value, &ConditionContext) -> bool + Send + Sync + 'static,
    {
        self.predicates.insert(name.into(), Arc::new(predicate));
    }

    pub fn policy(&self) -> UnknownPredicatePolicy {
        self.policy
    }

    /// 조건 평가
    pub fn evaluate(&self, condition: &Condition, ctx: &ConditionContext) -> bool {
        match condition {
            Condition::And { conditions } => conditions.iter().all(|c| self.evaluate(c, ctx)),
            Condition::Or { conditions } => conditions.iter().any(|c| self.evaluate(c, ctx)),
            Condition::Not { condition } => !self.evaluate(condition, ctx),
            Condition::Equals { path, value } => ctx
                .lookup(path)
                .map(|actual| loosely_equal(&actual, value))
                .unwrap_or(false),
            Condition::NotEquals { path, value } => ctx
                .lookup(path)
                .map(|actual| !loosely_equal(&actual, value))
                .unwrap_or(true),
            Condition::Contains { path, value } => ctx
                .lookup(path)
                .map(|actual| contains(&actual, value))
                .unwrap_or(false),
            Condition::GreaterThan { path, value } => compare(ctx.lookup(path), value)
                .map(|ord| ord == std::cmp::Ordering::Greater)
                .unwrap_or(false),
            Condition::LessThan { path, value } => compare(ctx.lookup(path), value)
                .map(|ord| ord == std::cmp::Ordering::Less)
                .unwrap_or(false),
            Condition::Exists { path } => ctx
                .lookup(path)
                .map(|v| !v.is_null())
                .unwrap_or(false),
            Condition::Custom { name, args } => match self.predicates.get(name) {
                Some(predicate) => predicate(args, ctx),
                None => {
                    let verdict = self.policy.verdict();
                    warn!(predicate = %name, verdict, "Unknown custom predicate");
                    verdict
                }
            },
            Condition::Unknown => {
                let verdict = self.policy.verdict();
                warn!(verdict, "Unknown condition type");
                verdict
            }
        }
    }
}

impl std::fmt::Debug for ConditionEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.predicates.keys().collect();
        names.sort();
        f.debug_struct("ConditionEvaluator")
            .field("policy", &self.policy)
            .field("predicates", &names)
            .finish()
    }
}

// ============================================================================
// 비교 헬퍼 (문자열 <-> 숫자/불리언 변환 허용)
// ============================================================================

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn loosely_equal(actual: &Value, expected: &Value) -> bool {
    if actual == expected {
        return true;
    }
    match (actual, expected) {
        (Value::String(s), Value::Bool(b)) | (Value::Bool(b), Value::String(s)) => {
            s.parse::<bool>().map(|p| p == *b).unwrap_or(false)
        }
        _ => match (as_number(actual), as_number(expected)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
    }
}

fn contains(actual: &Value, expected: &Value) -> bool {
    match actual {
        Value::String(s) => expected.as_str().map(|e| s.contains(e)).unwrap_or(false),
        Value::Array(items) => items.iter().any(|item| loosely_equal(item, expected)),
        Value::Object(map) => expected.as_str().map(|k| map.contains_key(k)).unwrap_or(false),
        _ => false,
    }
}

fn compare(actual: Option<Value>, expected: &Value) -> Option<std::cmp::Ordering> {
    let actual = actual?;
    match (as_number(&actual), as_number(expected)) {
        (Some(a), Some(b)) => a.partial_cmp(&b),
        _ => match (actual.as_str(), expected.as_str()) {
            (Some(a), Some(b)) => Some(a.cmp(b)),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> ConditionContext {
        ConditionContext::new()
            .with_env("APP_ENV", "production")
            .with_env("WORKERS", "8")
            .with_feature("beta", true)
            .with_config(json!({
                "db": { "pool": 10, "driver": "postgres" },
                "regions": ["eu", "us"]
            }))
    }

    #[test]
    fn test_leaf_predicates() {
        let eval = ConditionEvaluator::default();
        let ctx = ctx();

        assert!(eval.evaluate(&Condition::equals("env.APP_ENV", "production"), &ctx));
        assert!(eval.evaluate(&Condition::not_equals("env.APP_ENV", "dev"), &ctx));
        assert!(eval.evaluate(&Condition::equals("features.beta", true), &ctx));
        assert!(eval.evaluate(&Condition::contains("config.regions", "eu"), &ctx));
        assert!(eval.evaluate(&Condition::contains("config.db.driver", "gres"), &ctx));
        assert!(eval.evaluate(&Condition::greater_than("env.WORKERS", 4), &ctx));
        assert!(eval.evaluate(&Condition::less_than("config.db.pool", 20), &ctx));
        assert!(eval.evaluate(&Condition::exists("config.regions.1"), &ctx));
        assert!(!eval.evaluate(&Condition::exists("env.MISSING"), &ctx));
    }

    #[test]
    fn test_missing_path() {
        let eval = ConditionEvaluator::default();
        let ctx = ctx();

        assert!(!eval.evaluate(&Condition::equals("env.NOPE", "x"), &ctx));
        assert!(eval.evaluate(&Condition::not_equals("env.NOPE", "x"), &ctx));
        assert!(!eval.evaluate(&Condition::greater_than("config.nope", 1), &ctx));
    }

    #[test]
    fn test_combinators() {
        let eval = ConditionEvaluator::default();
        let ctx = ctx();

        let cond = Condition::and(vec![
            Condition::equals("env.APP_ENV", "production"),
            Condition::or(vec![
                Condition::equals("features.beta", false),
                Condition::greater_than("config.db.pool", 5),
            ]),
            Condition::not(Condition::exists("features.legacy")),
        ]);
        assert!(eval.evaluate(&cond, &ctx));

        assert!(eval.evaluate(&Condition::and(vec![]), &ctx));
        assert!(!eval.evaluate(&Condition::or(vec![]), &ctx));
    }

    #[test]
    fn test_deserialize_from_json() {
        let cond: Condition = serde_json::from_value(json!({
            "type": "and",
            "conditions": [
                { "type": "equals", "path": "env.APP_ENV", "value": "production" },
                { "type": "not", "condition": { "type": "exists", "path": "features.legacy" } }
            ]
        }))
        .unwrap();

        assert!(ConditionEvaluator::default().evaluate(&cond, &ctx()));
    }

    #[test]
    fn test_unknown_type_follows_policy() {
        let cond: Condition = serde_json::from_value(json!({ "type": "phase_of_moon" })).unwrap();
        assert_eq!(cond, Condition::Unknown);

        let open = ConditionEvaluator::new(UnknownPredicatePolicy::FailOpen);
        let closed = ConditionEvaluator::new(UnknownPredicatePolicy::FailClosed);
        assert!(open.evaluate(&cond, &ctx()));
        assert!(!closed.evaluate(&cond, &ctx()));

        let custom = Condition::custom("unregistered", Value::Null);
        assert!(open.evaluate(&custom, &ctx()));
        assert!(!closed.evaluate(&custom, &ctx()));
    }

    #[test]
    fn test_custom_predicate() {
        let eval = ConditionEvaluator::new(UnknownPredicatePolicy::FailClosed).with_predicate(
            "min_workers",
            |args, ctx| {
                let min = args.get("min").and_then(Value::as_u64).unwrap_or(0);
                ctx.lookup("env.WORKERS")
                    .and_then(|v| v.as_str().and_then(|s| s.parse::<u64>().ok()))
                    .map(|w| w >= min)
                    .unwrap_or(false)
            },
        );

        assert!(eval.evaluate(&Condition::custom("min_workers", json!({ "min": 4 })), &ctx()));
        assert!(!eval.evaluate(&Condition::custom("min_workers", json!({ "min": 16 })), &ctx()));
    }
}
