//! 데모 플러그인
//!
//! - `store`: 키-값 서비스 제공
//! - `greeter`: `store`에 의존. waterfall 훅과 이벤트 구독 사용
//! - `audit`: 조건부 등록. 라이프사이클 훅 로깅

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use weave_core::hook::lifecycle_hooks;
use weave_core::{
    hook_handler, Condition, HookOptions, Plugin, PluginCapability, PluginContext,
    PluginDescriptor, PluginVersion, RuntimeContext,
};
use weave_foundation::Result;

/// 데모 플러그인 이름
pub const NAMES: [&str; 3] = ["store", "greeter", "audit"];

/// 이름으로 새 인스턴스 생성 (핫 리로드 소스용)
pub fn create(name: &str) -> Option<Arc<dyn Plugin>> {
    let plugin: Arc<dyn Plugin> = match name {
        "store" => Arc::new(StorePlugin),
        "greeter" => Arc::new(GreeterPlugin::default()),
        "audit" => Arc::new(AuditPlugin),
        _ => return None,
    };
    Some(plugin)
}

/// 등록 조건 (없으면 항상 등록)
pub fn condition(name: &str) -> Option<Condition> {
    match name {
        "audit" => Some(Condition::or(vec![
            Condition::equals("features.audit", true),
            Condition::exists("env.WEAVE_AUDIT"),
        ])),
        _ => None,
    }
}

/// 프로세스 내 기본 설정
pub fn install_defaults(runtime: &RuntimeContext) {
    let store = runtime.plugin_config();
    store.set_defaults("store", json!({ "capacity": 128 }));
    store.set_defaults("greeter", json!({ "greeting": "Hello", "punctuation": "!" }));
}

// ============================================================================
// store
// ============================================================================

/// 키-값 서비스
#[derive(Debug)]
pub struct KvService {
    capacity: usize,
    entries: Mutex<HashMap<String, Value>>,
}

impl KvService {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// 저장. 용량을 넘으면 false
    pub fn put(&self, key: impl Into<String>, value: Value) -> bool {
        let key = key.into();
        let mut entries = self.entries.lock();
        if entries.len() >= self.capacity && !entries.contains_key(&key) {
            return false;
        }
        entries.insert(key, value);
        true
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.lock().get(key).cloned()
    }
}

struct StorePlugin;

#[async_trait]
impl Plugin for StorePlugin {
    fn descriptor(&self) -> PluginDescriptor {
        PluginDescriptor::new("store")
            .with_version(PluginVersion::new(1, 0, 0))
            .with_description("In-memory key-value service")
            .with_capability(PluginCapability::Init)
    }

    async fn init(&self, ctx: &PluginContext) -> Result<()> {
        let capacity = ctx.config()["capacity"].as_u64().unwrap_or(128) as usize;
        ctx.services().register("kv", Arc::new(KvService::new(capacity)))?;
        ctx.span().in_scope(|| info!(capacity, "Key-value service ready"));
        Ok(())
    }
}

// ============================================================================
// greeter
// ============================================================================

/// 인사말 형식 훅
pub const GREETING_FORMAT_HOOK: &str = "greeting:format";
/// 인사말 발송 이벤트
pub const GREETING_SENT_EVENT: &str = "greeting:sent";

#[derive(Default)]
struct GreeterPlugin {
    settings: Arc<RwLock<Value>>,
}

#[async_trait]
impl Plugin for GreeterPlugin {
    fn descriptor(&self) -> PluginDescriptor {
        PluginDescriptor::new("greeter")
            .with_version(PluginVersion::new(1, 1, 0))
            .with_description("Formats greetings and counts them in the store")
            .with_dependency("store")
            .with_capability(PluginCapability::Init)
            .with_capability(PluginCapability::ConfigChange)
    }

    async fn init(&self, ctx: &PluginContext) -> Result<()> {
        *self.settings.write() = ctx.config();

        let settings = self.settings.clone();
        ctx.on(
            GREETING_FORMAT_HOOK,
            hook_handler(move |name: Value| {
                let settings = settings.read().clone();
                async move {
                    let greeting = settings["greeting"].as_str().unwrap_or("Hello");
                    let punctuation = settings["punctuation"].as_str().unwrap_or("");
                    let name = name.as_str().unwrap_or("world");
                    Ok(Some(json!(format!("{greeting}, {name}{punctuation}"))))
                }
            }),
            HookOptions::waterfall().with_priority(10),
        )?;

        let kv = ctx.services().get::<KvService>("store.kv")?;
        ctx.subscribe(GREETING_SENT_EVENT, move |_| {
            let sent = kv.get("greetings").and_then(|v| v.as_u64()).unwrap_or(0);
            kv.put("greetings", json!(sent + 1));
            Ok(())
        });
        Ok(())
    }

    async fn on_config_change(&self, config: &Value) -> Result<()> {
        *self.settings.write() = config.clone();
        info!(greeting = %config["greeting"], "Greeter config updated");
        Ok(())
    }
}

// ============================================================================
// audit
// ============================================================================

struct AuditPlugin;

#[async_trait]
impl Plugin for AuditPlugin {
    fn descriptor(&self) -> PluginDescriptor {
        PluginDescriptor::new("audit")
            .with_version(PluginVersion::new(0, 3, 0))
            .with_description("Logs plugin lifecycle transitions")
            .with_capability(PluginCapability::Init)
    }

    async fn init(&self, ctx: &PluginContext) -> Result<()> {
        for hook in lifecycle_hooks::ALL {
            ctx.on(
                hook,
                hook_handler(move |payload: Value| async move {
                    info!(
                        target: "audit",
                        hook,
                        plugin = %payload["plugin"],
                        from = %payload["from"],
                        to = %payload["to"],
                        "Lifecycle transition"
                    );
                    Ok(None)
                }),
                HookOptions::sequential().with_priority(-100),
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_core::{PluginManager, RuntimeConfig};

    async fn runtime_with_demo() -> (Arc<RuntimeContext>, PluginManager) {
        let runtime = Arc::new(RuntimeContext::new(RuntimeConfig::default()));
        install_defaults(&runtime);
        let manager = PluginManager::new(runtime.clone());
        for name in ["store", "greeter"] {
            manager.register(create(name).unwrap()).unwrap();
        }
        manager.enable_all().await.unwrap();
        (runtime, manager)
    }

    #[tokio::test]
    async fn test_greeter_formats_and_counts() {
        let (runtime, manager) = runtime_with_demo().await;

        let greeting = runtime
            .hooks()
            .dispatch_waterfall(GREETING_FORMAT_HOOK, json!("Ada"))
            .await
            .unwrap();
        assert_eq!(greeting, json!("Hello, Ada!"));

        runtime.events().publish(GREETING_SENT_EVENT, &greeting);
        runtime.events().publish(GREETING_SENT_EVENT, &greeting);
        let kv = runtime.services().get::<KvService>("store.kv").unwrap();
        assert_eq!(kv.get("greetings"), Some(json!(2)));

        manager
            .update_config("greeter", json!({ "greeting": "Hi" }))
            .await
            .unwrap();
        let greeting = runtime
            .hooks()
            .dispatch_waterfall(GREETING_FORMAT_HOOK, json!("Ada"))
            .await
            .unwrap();
        assert_eq!(greeting, json!("Hi, Ada!"));
    }

    #[test]
    fn test_kv_capacity() {
        let kv = KvService::new(1);
        assert!(kv.put("a", json!(1)));
        assert!(!kv.put("b", json!(2)));
        assert!(kv.put("a", json!(3)));
        assert_eq!(kv.get("a"), Some(json!(3)));
        assert_eq!(kv.get("b"), None);
    }

    #[test]
    fn test_audit_condition() {
        let evaluator = weave_core::ConditionEvaluator::default();
        let audit = condition("audit").unwrap();
        let ctx = weave_core::ConditionContext::new();
        assert!(!evaluator.evaluate(&audit, &ctx));
        assert!(evaluator.evaluate(&audit, &ctx.with_feature("audit", true)));
        assert!(condition("store").is_none());
    }
}
