//! Hook 타입 정의
//!
//! 훅 이름별 디스패치 모드, 등록 옵션, 핸들러 타입

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use weave_foundation::Result;

// ============================================================================
// HookMode - 디스패치 방식
// ============================================================================

/// 디스패치 모드. 훅 이름마다 첫 등록 시점에 고정된다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookMode {
    /// 우선순위 순으로 하나씩 실행. 에러가 나도 나머지는 실행
    #[default]
    Sequential,
    /// 모든 핸들러 동시 실행
    Parallel,
    /// 처음으로 값을 반환한 핸들러에서 중단
    Bail,
    /// 각 핸들러의 반환값이 다음 핸들러의 입력
    Waterfall,
}

impl std::fmt::Display for HookMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sequential => write!(f, "sequential"),
            Self::Parallel => write!(f, "parallel"),
            Self::Bail => write!(f, "bail"),
            Self::Waterfall => write!(f, "waterfall"),
        }
    }
}

// ============================================================================
// HookOptions - 등록 옵션
// ============================================================================

/// 훅 등록 옵션
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookOptions {
    /// 높을수록 먼저 실행
    #[serde(default)]
    pub priority: i32,

    #[serde(default)]
    pub mode: HookMode,
}

impl HookOptions {
    pub fn new(mode: HookMode) -> Self {
        Self { priority: 0, mode }
    }

    pub fn sequential() -> Self {
        Self::new(HookMode::Sequential)
    }

    pub fn parallel() -> Self {
        Self::new(HookMode::Parallel)
    }

    pub fn bail() -> Self {
        Self::new(HookMode::Bail)
    }

    pub fn waterfall() -> Self {
        Self::new(HookMode::Waterfall)
    }

    /// 빌더 패턴: 우선순위 설정
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

// ============================================================================
// HookHandler - 핸들러 콜백
// ============================================================================

/// 핸들러 반환 Future
pub type HookFuture = Pin<Box<dyn Future<Output = Result<Option<Value>>> + Send>>;

/// 훅 핸들러
///
/// `None`은 "값 없음"이다. bail 모드에서는 다음 핸들러로 넘어가고,
/// waterfall 모드에서는 현재 값을 그대로 전달한다.
pub type HookHandler = Arc<dyn Fn(Value) -> HookFuture + Send + Sync>;

/// async 클로저를 `HookHandler`로 감싸는 헬퍼
pub fn hook_handler<F, Fut>(f: F) -> HookHandler
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<Value>>> + Send + 'static,
{
    Arc::new(move |payload| Box::pin(f(payload)))
}

// ============================================================================
// HookRegistration - 등록 항목
// ============================================================================

/// 훅 등록 항목
pub struct HookRegistration {
    pub hook: String,
    pub owner: String,
    pub priority: i32,
    pub mode: HookMode,
    pub handler: HookHandler,
    /// 등록 순서 (동일 우선순위 tie-break)
    pub(crate) seq: u64,
}

impl std::fmt::Debug for HookRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistration")
            .field("hook", &self.hook)
            .field("owner", &self.owner)
            .field("priority", &self.priority)
            .field("mode", &self.mode)
            .finish()
    }
}

// ============================================================================
// HookOutcome - 디스패치 결과
// ============================================================================

/// 디스패치 결과
#[derive(Debug, Clone, PartialEq)]
pub enum HookOutcome {
    /// 등록된 핸들러 없음
    NoHandlers,
    /// sequential/parallel: 각 핸들러의 반환값 (우선순위 순)
    Collected(Vec<Option<Value>>),
    /// bail: 처음 반환된 값
    Bailed(Option<Value>),
    /// waterfall: 최종 값
    Transformed(Value),
}

impl HookOutcome {
    /// 결과 값 하나로 축약
    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::NoHandlers => None,
            Self::Collected(values) => values.into_iter().flatten().last(),
            Self::Bailed(value) => value,
            Self::Transformed(value) => Some(value),
        }
    }
}
