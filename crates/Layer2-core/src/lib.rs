//! weave-core: Plugin Runtime for Weave
//!
//! Layer2 - 플러그인 라이프사이클과 확장 지점 레이어
//!
//! # 주요 모듈
//!
//! - `plugin`: 등록, 의존성 순서, 라이프사이클, 조건부 로딩
//! - `hook`: 우선순위 기반 훅 버스 (sequential / parallel / bail / waterfall)
//! - `comm`: 플러그인 간 서비스 레지스트리와 이벤트 채널
//! - `reload`: 핫 리로드 (디바운스, 상태 보존, 롤백)
//! - `runtime`: 위 구성요소를 묶는 공유 런타임 컨텍스트
//!
//! # 사용 예시
//!
//! ```ignore
//! use weave_core::{PluginManager, RuntimeContext, HookOptions, hook_handler};
//!
//! let runtime = Arc::new(RuntimeContext::new(RuntimeConfig::load(".")?));
//! let manager = Arc::new(PluginManager::new(runtime.clone()));
//!
//! manager.register(Arc::new(DbPlugin))?;
//! manager.register(Arc::new(AuthPlugin))?;
//!
//! // 의존성 순서대로 init -> enable
//! let report = manager.enable_all().await?;
//!
//! // 훅 실행
//! let value = runtime.hooks().dispatch_waterfall("request:transform", json!({})).await?;
//!
//! // 서비스 조회
//! let tokens = runtime.services().get::<TokenStore>("auth.tokens")?;
//! ```

pub mod comm;
pub mod hook;
pub mod plugin;
pub mod reload;
pub mod runtime;

// Re-exports: Plugin
pub use plugin::{
    resolve_order, BulkReport, CapabilitySet, Condition, ConditionContext, ConditionEvaluator,
    LifecycleEvent, LifecyclePhase, LifecycleState, Plugin, PluginCapability, PluginContext,
    PluginDescriptor, PluginManager, PluginSummary, PluginVersion, RegisterOutcome,
    ScopedServices,
};

// Re-exports: Hook
pub use hook::{hook_handler, HookBus, HookHandler, HookMode, HookOptions, HookOutcome};

// Re-exports: Communication
pub use comm::{EventChannel, PublishReport, ServiceKey, ServiceRegistry, Subscription};

// Re-exports: Hot Reload
pub use reload::{
    ChangeEvent, FnSource, HotReloadManager, PluginSource, PollingWatcher, ReloadOutcome,
    ReloadPhase, ReloadReport,
};

// Re-exports: Runtime
pub use runtime::RuntimeContext;

// Re-exports: Foundation
pub use weave_foundation::{Error, Result, RuntimeConfig};
