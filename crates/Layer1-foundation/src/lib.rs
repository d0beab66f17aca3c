//! # weave-foundation
//!
//! Foundation layer for Weave:
//! - Error: 런타임 전체의 에러 타입
//! - Config: RuntimeConfig, 플러그인별 JSON 설정 저장소
//! - Storage: JsonStore (범용 JSON 파일)
//! - Tracker: fingerprint 기반 에러 추적
//!
//! ## 아키텍처
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  weave-core (PluginManager, HookBus, Services, Reload)  │
//! │                     │                                   │
//! │                     ▼                                   │
//! │   ┌──────────────┬──────────────┬──────────────────┐   │
//! │   │ RuntimeConfig│ PluginConfig │  ErrorTracker    │   │
//! │   │  (weave.json)│ (plugins.json)│ (fingerprints)  │   │
//! │   └──────────────┴──────────────┴──────────────────┘   │
//! │                     │                                   │
//! │                 JsonStore                               │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod storage;
pub mod tracker;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, HookFailure, Result};

// ============================================================================
// Config (설정)
// ============================================================================
pub use config::{
    merge_json, ConditionConfig, HotReloadConfig, LifecycleConfig, PluginConfigStore,
    RuntimeConfig, TrackerConfig, UnknownPredicatePolicy, PLUGINS_CONFIG_FILE,
    RUNTIME_CONFIG_FILE,
};

// ============================================================================
// Storage (저장소)
// ============================================================================
pub use storage::{JsonStore, PROJECT_DIR};

// ============================================================================
// Tracker (에러 추적)
// ============================================================================
pub use tracker::{ErrorKind, ErrorReport, ErrorTracker, Fingerprint, TrackedError};
