//! Plugin Source - 플러그인 구현을 새로 만들어내는 쪽
//!
//! 핫 리로드 매니저는 파일 시스템을 직접 다루지 않는다. 변경 감지는
//! `ChangeEvent` 스트림으로 들어오고, 새 구현은 `PluginSource`가 만든다.

use crate::plugin::Plugin;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use weave_foundation::Result;

/// 플러그인 구현 공급자
#[async_trait]
pub trait PluginSource: Send + Sync {
    /// 새 구현 인스턴스 생성
    async fn load(&self) -> Result<Arc<dyn Plugin>>;

    /// 캐시된 모듈 상태 제거 (load 직전에 호출)
    fn invalidate(&self) {}
}

/// 클로저 기반 소스
pub struct FnSource<F> {
    factory: F,
}

impl<F> FnSource<F>
where
    F: Fn() -> Result<Arc<dyn Plugin>> + Send + Sync,
{
    pub fn new(factory: F) -> Self {
        Self { factory }
    }
}

#[async_trait]
impl<F> PluginSource for FnSource<F>
where
    F: Fn() -> Result<Arc<dyn Plugin>> + Send + Sync,
{
    async fn load(&self) -> Result<Arc<dyn Plugin>> {
        (self.factory)()
    }
}

/// 변경 감지 이벤트
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub plugin: String,
    /// 바뀐 파일 (알 수 있는 경우)
    pub path: Option<PathBuf>,
}

impl ChangeEvent {
    pub fn new(plugin: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            path: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }
}
