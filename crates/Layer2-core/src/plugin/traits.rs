//! Plugin traits - 핵심 플러그인 인터페이스

use super::context::PluginContext;
use super::manifest::PluginDescriptor;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use weave_foundation::Result;

// ============================================================================
// PluginCapability - 플러그인이 구현한 콜백
// ============================================================================

/// 플러그인이 구현할 수 있는 라이프사이클 콜백
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginCapability {
    Init,
    Enable,
    Disable,
    Destroy,
    ConfigChange,
}

impl PluginCapability {
    pub const ALL: [PluginCapability; 5] = [
        Self::Init,
        Self::Enable,
        Self::Disable,
        Self::Destroy,
        Self::ConfigChange,
    ];

    fn bit(self) -> u8 {
        match self {
            Self::Init => 1,
            Self::Enable => 1 << 1,
            Self::Disable => 1 << 2,
            Self::Destroy => 1 << 3,
            Self::ConfigChange => 1 << 4,
        }
    }
}

/// 콜백 집합
///
/// 매니저는 여기 포함된 콜백만 호출한다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<PluginCapability>", into = "Vec<PluginCapability>")]
pub struct CapabilitySet(u8);

impl CapabilitySet {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn all() -> Self {
        PluginCapability::ALL.into_iter().collect()
    }

    pub fn with(mut self, capability: PluginCapability) -> Self {
        self.insert(capability);
        self
    }

    pub fn insert(&mut self, capability: PluginCapability) {
        self.0 |= capability.bit();
    }

    pub fn contains(&self, capability: PluginCapability) -> bool {
        self.0 & capability.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = PluginCapability> + '_ {
        PluginCapability::ALL
            .into_iter()
            .filter(move |c| self.contains(*c))
    }
}

impl FromIterator<PluginCapability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = PluginCapability>>(iter: I) -> Self {
        let mut set = Self::empty();
        for capability in iter {
            set.insert(capability);
        }
        set
    }
}

impl From<Vec<PluginCapability>> for CapabilitySet {
    fn from(caps: Vec<PluginCapability>) -> Self {
        caps.into_iter().collect()
    }
}

impl From<CapabilitySet> for Vec<PluginCapability> {
    fn from(set: CapabilitySet) -> Self {
        set.iter().collect()
    }
}

// ============================================================================
// Plugin Trait - 모든 플러그인이 구현해야 하는 인터페이스
// ============================================================================

/// 플러그인 트레이트
///
/// 식별 정보(`descriptor`)를 제외한 모든 콜백은 선택 사항이다.
/// 구현한 콜백은 디스크립터의 `capabilities`에 선언해야 호출된다.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// 플러그인 디스크립터 반환
    fn descriptor(&self) -> PluginDescriptor;

    /// 초기화. 훅/서비스/구독은 여기서 등록한다.
    async fn init(&self, _ctx: &PluginContext) -> Result<()> {
        Ok(())
    }

    /// 활성화
    async fn enable(&self) -> Result<()> {
        Ok(())
    }

    /// 비활성화
    async fn disable(&self) -> Result<()> {
        Ok(())
    }

    /// 언로드 직전 정리
    async fn destroy(&self) -> Result<()> {
        Ok(())
    }

    /// 외부 설정 변경 통지
    async fn on_config_change(&self, _config: &Value) -> Result<()> {
        Ok(())
    }
}
