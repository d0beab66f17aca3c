//! Runtime Context - 컴포넌트가 공유하는 상태 묶음
//!
//! 전역 싱글톤 대신 이 구조체를 생성자에 넘긴다.
//! 런타임 인스턴스를 여러 개 만들어도 서로 간섭하지 않는다.

use crate::comm::{EventChannel, ServiceRegistry};
use crate::hook::HookBus;
use std::sync::Arc;
use weave_foundation::{ErrorTracker, PluginConfigStore, RuntimeConfig};

/// 런타임 컨텍스트
pub struct RuntimeContext {
    config: RuntimeConfig,
    plugin_config: Arc<PluginConfigStore>,
    hooks: Arc<HookBus>,
    services: Arc<ServiceRegistry>,
    events: EventChannel,
    tracker: Arc<ErrorTracker>,
}

impl RuntimeContext {
    /// 새 컨텍스트 생성 (플러그인 설정은 메모리 전용)
    pub fn new(config: RuntimeConfig) -> Self {
        Self::with_plugin_config(config, Arc::new(PluginConfigStore::new()))
    }

    /// 플러그인 설정 저장소를 지정해서 생성
    pub fn with_plugin_config(config: RuntimeConfig, plugin_config: Arc<PluginConfigStore>) -> Self {
        let tracker = Arc::new(ErrorTracker::new(config.tracker.clone()));
        Self {
            hooks: Arc::new(HookBus::new(tracker.clone())),
            services: Arc::new(ServiceRegistry::new()),
            events: EventChannel::new(tracker.clone()),
            plugin_config,
            tracker,
            config,
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn plugin_config(&self) -> &Arc<PluginConfigStore> {
        &self.plugin_config
    }

    pub fn hooks(&self) -> &Arc<HookBus> {
        &self.hooks
    }

    pub fn services(&self) -> &Arc<ServiceRegistry> {
        &self.services
    }

    pub fn events(&self) -> &EventChannel {
        &self.events
    }

    pub fn tracker(&self) -> &Arc<ErrorTracker> {
        &self.tracker
    }

    /// 플러그인이 등록한 훅/서비스/구독을 모두 제거
    pub(crate) fn remove_contributions(&self, plugin: &str) -> usize {
        self.hooks.remove_owner(plugin)
            + self.services.remove_owner(plugin)
            + self.events.remove_subscriber(plugin)
    }
}

impl Default for RuntimeContext {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}
