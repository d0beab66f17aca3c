//! # Hook System
//!
//! 플러그인이 확장 지점(훅)에 핸들러를 붙이고, 호스트나 다른 플러그인이 디스패치한다.
//!
//! ## 디스패치 모드
//!
//! - `sequential`: 우선순위 순으로 하나씩 await. 실패는 모아서 마지막에 반환
//! - `parallel`: 모든 핸들러를 동시에 실행 (`join_all`)
//! - `bail`: 처음으로 값을 반환한 핸들러에서 중단
//! - `waterfall`: 반환값을 다음 핸들러의 입력으로 전달
//!
//! ## 예시
//!
//! ```ignore
//! bus.register("request:transform", "auth", hook_handler(|req| async move {
//!     Ok(Some(add_token(req)))
//! }), HookOptions::waterfall().with_priority(10))?;
//!
//! let req = bus.dispatch_waterfall("request:transform", req).await?;
//! ```

mod bus;
mod types;

pub use bus::HookBus;
pub use types::{
    hook_handler, HookFuture, HookHandler, HookMode, HookOptions, HookOutcome, HookRegistration,
};

/// 라이프사이클 훅 이름
pub mod lifecycle_hooks {
    pub const INITIALIZED: &str = "plugin:initialized";
    pub const ENABLED: &str = "plugin:enabled";
    pub const DISABLED: &str = "plugin:disabled";
    pub const UNLOADED: &str = "plugin:unloaded";
    pub const ERROR: &str = "plugin:error";

    pub const ALL: [&str; 5] = [INITIALIZED, ENABLED, DISABLED, UNLOADED, ERROR];
}
