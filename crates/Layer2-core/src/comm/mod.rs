//! Communication Layer - 서비스 레지스트리와 이벤트 채널
//!
//! 두 테이블 모두 플러그인 이름을 소유자로 기록하고, 라이프사이클 매니저가
//! disable/unload 시점에 소유자 단위로 정리한다.

mod channel;
mod service;

pub use channel::{EventCallback, EventChannel, PublishReport, Subscription};
pub use service::{ServiceFactory, ServiceInstance, ServiceKey, ServiceRegistry};
