//! Plugin Context - init 시점에 플러그인에 전달되는 호스트 API
//!
//! 모든 등록은 이 플러그인 이름을 소유자로 기록된다.

use crate::comm::{PublishReport, ServiceInstance, ServiceKey, ServiceRegistry, Subscription};
use crate::hook::{HookHandler, HookOptions};
use crate::runtime::RuntimeContext;
use serde_json::Value;
use std::any::Any;
use std::sync::Arc;
use tracing::Span;
use weave_foundation::Result;

/// 플러그인 컨텍스트
#[derive(Clone)]
pub struct PluginContext {
    plugin: String,
    runtime: Arc<RuntimeContext>,
    span: Span,
}

impl PluginContext {
    pub fn new(plugin: impl Into<String>, runtime: Arc<RuntimeContext>) -> Self {
        let plugin = plugin.into();
        let span = tracing::info_span!("plugin", name = %plugin);
        Self {
            plugin,
            runtime,
            span,
        }
    }

    /// 플러그인 이름
    pub fn name(&self) -> &str {
        &self.plugin
    }

    /// 현재 유효 설정 (기본값 위에 외부 설정 병합)
    pub fn config(&self) -> Value {
        self.runtime.plugin_config().get(&self.plugin)
    }

    /// 로깅용 span. `ctx.span().in_scope(|| info!(...))`
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// 훅 핸들러 등록
    pub fn on(&self, hook: impl Into<String>, handler: HookHandler, options: HookOptions) -> Result<()> {
        self.runtime
            .hooks()
            .register(hook, self.plugin.clone(), handler, options)
    }

    /// 훅 디스패치 (다른 플러그인의 확장 지점 호출)
    pub fn hooks(&self) -> &Arc<crate::hook::HookBus> {
        self.runtime.hooks()
    }

    /// 이 플러그인 네임스페이스의 서비스 API
    pub fn services(&self) -> ScopedServices<'_> {
        ScopedServices {
            owner: &self.plugin,
            registry: self.runtime.services(),
        }
    }

    /// 이벤트 발행
    pub fn publish(&self, event: &str, payload: &Value) -> PublishReport {
        self.runtime.events().publish(event, payload)
    }

    /// 이벤트 구독
    pub fn subscribe<F>(&self, event: impl Into<String>, callback: F) -> Subscription
    where
        F: Fn(&Value) -> Result<()> + Send + Sync + 'static,
    {
        self.runtime
            .events()
            .subscribe(event, self.plugin.clone(), callback)
    }

    pub fn runtime(&self) -> &Arc<RuntimeContext> {
        &self.runtime
    }
}

/// 플러그인 네임스페이스에 묶인 서비스 API
pub struct ScopedServices<'a> {
    owner: &'a str,
    registry: &'a ServiceRegistry,
}

impl ScopedServices<'_> {
    /// `"<plugin>.<name>"`으로 인스턴스 등록
    pub fn register<T: Any + Send + Sync>(&self, name: &str, instance: Arc<T>) -> Result<ServiceKey> {
        self.registry.register(self.owner, name, instance)
    }

    /// `"<plugin>.<name>"`으로 팩토리 등록
    pub fn register_factory<T, F>(&self, name: &str, factory: F) -> Result<ServiceKey>
    where
        T: Any + Send + Sync,
        F: Fn() -> Result<Arc<T>> + Send + Sync + 'static,
    {
        self.registry.register_factory(self.owner, name, factory)
    }

    /// 정규화된 이름으로 조회 (다른 플러그인의 서비스 포함)
    pub fn get<T: Any + Send + Sync>(&self, qualified: &str) -> Result<Arc<T>> {
        self.registry.get(qualified)
    }

    pub fn get_any(&self, qualified: &str) -> Result<ServiceInstance> {
        self.registry.get_any(qualified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hook::hook_handler;
    use serde_json::json;

    #[test]
    fn test_registrations_are_scoped_to_plugin() {
        let runtime = Arc::new(RuntimeContext::default());
        let ctx = PluginContext::new("auth", runtime.clone());

        let key = ctx.services().register("tokens", Arc::new(5u32)).unwrap();
        assert_eq!(key.as_str(), "auth.tokens");
        ctx.on("request", hook_handler(|_| async { Ok(None) }), HookOptions::default())
            .unwrap();
        ctx.subscribe("login", |_| Ok(()));

        assert_eq!(runtime.hooks().hooks_of("auth"), vec!["request"]);
        assert_eq!(*ctx.services().get::<u32>("auth.tokens").unwrap(), 5);
        assert_eq!(ctx.publish("login", &Value::Null).delivered, 1);
    }

    #[test]
    fn test_config_reads_store() {
        let runtime = Arc::new(RuntimeContext::default());
        runtime
            .plugin_config()
            .set_defaults("cache", json!({ "ttl": 60, "size": 10 }));
        runtime.plugin_config().apply("cache", json!({ "ttl": 5 }));

        let ctx = PluginContext::new("cache", runtime);
        assert_eq!(ctx.config(), json!({ "ttl": 5, "size": 10 }));
    }
}
