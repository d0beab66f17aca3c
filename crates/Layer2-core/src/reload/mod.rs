//! # Hot Reload
//!
//! 실행 중인 플러그인 구현을 교체하고, 실패하면 이전 구현으로 되돌린다.
//!
//! ```text
//! PollingWatcher ──ChangeEvent──▶ HotReloadManager ──▶ PluginManager
//!                                   │  debounce            disable / unload
//!                                   │  queue               register / enable
//!                                   ▼
//!                               PluginSource (load)
//! ```

mod manager;
mod session;
mod source;
mod watcher;

pub use manager::HotReloadManager;
pub use session::{ReloadOutcome, ReloadPhase, ReloadReport, ReloadSession};
pub use source::{ChangeEvent, FnSource, PluginSource};
pub use watcher::PollingWatcher;
