//! # Plugin System
//!
//! 플러그인 등록, 의존성 순서 계산, 라이프사이클 관리
//!
//! ## 아키텍처
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     PluginManager                           │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────────┐  │
//! │  │ Condition    │→ │ Registry     │→ │ Resolver         │  │
//! │  │ Evaluator    │  │ (descriptor, │  │ (topological     │  │
//! │  │              │  │  state)      │  │  order, cycles)  │  │
//! │  └──────────────┘  └──────────────┘  └──────────────────┘  │
//! │                          │                                  │
//! │  ┌───────────────────────┼───────────────────────────────┐ │
//! │  │     PluginContext     │                               │ │
//! │  │  - HookBus (on)       │                               │ │
//! │  │  - ServiceRegistry    │                               │ │
//! │  │  - EventChannel       │                               │ │
//! │  │  - config / span      │                               │ │
//! │  └───────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 예시
//!
//! ```ignore
//! struct AuthPlugin;
//!
//! #[async_trait]
//! impl Plugin for AuthPlugin {
//!     fn descriptor(&self) -> PluginDescriptor {
//!         PluginDescriptor::new("auth")
//!             .with_dependency("db")
//!             .with_capability(PluginCapability::Init)
//!     }
//!
//!     async fn init(&self, ctx: &PluginContext) -> Result<()> {
//!         ctx.services().register("tokens", Arc::new(TokenStore::default()))?;
//!         Ok(())
//!     }
//! }
//!
//! let manager = PluginManager::new(Arc::new(RuntimeContext::default()));
//! manager.register(Arc::new(AuthPlugin))?;
//! manager.enable_all().await?;
//! ```

mod condition;
mod context;
mod lifecycle;
mod manager;
mod manifest;
mod registry;
mod resolver;
mod traits;

pub use condition::{Condition, ConditionContext, ConditionEvaluator, CustomPredicate};
pub use context::{PluginContext, ScopedServices};
pub use lifecycle::{LifecycleEvent, LifecycleHistory, LifecyclePhase, LifecycleState};
pub use manager::{BulkReport, PluginManager, PluginSummary, RegisterOutcome};
pub use manifest::{PluginDescriptor, PluginVersion};
pub use registry::{PluginInfo, PluginRegistry};
pub use resolver::resolve_order;
pub use traits::{CapabilitySet, Plugin, PluginCapability};
