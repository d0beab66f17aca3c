//! Error types for Weave
//!
//! 플러그인 런타임의 모든 에러를 중앙에서 관리

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// 훅 핸들러 하나의 실패 기록
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookFailure {
    /// 핸들러를 등록한 플러그인
    pub plugin: String,
    /// 에러 메시지
    pub message: String,
}

impl std::fmt::Display for HookFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.plugin, self.message)
    }
}

/// Weave 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // 레지스트리 / 의존성
    // ========================================================================
    #[error("Plugin already registered: {0}")]
    DuplicateName(String),

    #[error("Plugin not found: {0}")]
    PluginNotFound(String),

    #[error("Cyclic dependency detected: {}", .cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    #[error("Dependency unavailable: {plugin} requires {dependency}")]
    DependencyUnavailable { plugin: String, dependency: String },

    // ========================================================================
    // 라이프사이클
    // ========================================================================
    #[error("Plugin {plugin} failed during {phase}: {source}")]
    LifecycleCallback {
        plugin: String,
        phase: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Invalid transition for {plugin}: {from} -> {to}")]
    InvalidTransition {
        plugin: String,
        from: String,
        to: String,
    },

    // ========================================================================
    // 서비스 / 이벤트
    // ========================================================================
    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    #[error("Service already registered: {0}")]
    ServiceAlreadyRegistered(String),

    #[error("Service {0} has a different type")]
    ServiceTypeMismatch(String),

    // ========================================================================
    // 훅
    // ========================================================================
    #[error("Hook {hook} dispatch failed ({} handler error(s)): {}", .failures.len(), join_failures(.failures))]
    HookDispatch {
        hook: String,
        failures: Vec<HookFailure>,
    },

    #[error("Hook {hook} is registered as {existing}, not {requested}")]
    HookModeMismatch {
        hook: String,
        existing: String,
        requested: String,
    },

    // ========================================================================
    // 핫 리로드
    // ========================================================================
    #[error("Reload of {plugin} failed (rolled back: {rolled_back}): {reason}")]
    ReloadFailed {
        plugin: String,
        rolled_back: bool,
        reason: String,
    },

    // ========================================================================
    // 플러그인 콜백이 반환하는 일반 에러
    // ========================================================================
    #[error("Plugin error: {0}")]
    Plugin(String),

    // ========================================================================
    // 설정
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    // ========================================================================
    // 외부 에러 변환
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ========================================================================
    // 기타
    // ========================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

fn join_failures(failures: &[HookFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// 플러그인 콜백 실패를 감싸는 헬퍼
    pub fn lifecycle(plugin: impl Into<String>, phase: impl Into<String>, source: Error) -> Self {
        Error::LifecycleCallback {
            plugin: plugin.into(),
            phase: phase.into(),
            source: Box::new(source),
        }
    }

    /// 의존성 에러 생성 헬퍼
    pub fn dependency_unavailable(plugin: impl Into<String>, dependency: impl Into<String>) -> Self {
        Error::DependencyUnavailable {
            plugin: plugin.into(),
            dependency: dependency.into(),
        }
    }

    /// 리로드 실패 에러 생성 헬퍼
    pub fn reload_failed(plugin: impl Into<String>, rolled_back: bool, reason: impl ToString) -> Self {
        Error::ReloadFailed {
            plugin: plugin.into(),
            rolled_back,
            reason: reason.to_string(),
        }
    }

    /// 재시도로 회복될 수 있는 에러인지 확인
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::LifecycleCallback { source, .. } => source.is_retryable(),
            Error::Plugin(_) | Error::Io(_) => true,
            _ => false,
        }
    }
}

// ============================================================================
// From 구현 (추가 변환)
// ============================================================================

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Internal(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Internal(s.to_string())
    }
}
