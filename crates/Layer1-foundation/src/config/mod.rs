//! Config - 통합 설정 관리
//!
//! - `runtime.rs` - RuntimeConfig (라이프사이클, 핫 리로드, 조건, 에러 추적)
//! - `plugin.rs` - 플러그인별 JSON 설정 저장소

mod plugin;
mod runtime;

pub use plugin::{merge_json, PluginConfigStore, PLUGINS_CONFIG_FILE};
pub use runtime::{
    ConditionConfig, HotReloadConfig, LifecycleConfig, RuntimeConfig, TrackerConfig,
    UnknownPredicatePolicy, RUNTIME_CONFIG_FILE,
};
