//! Plugin Descriptor - 플러그인 식별 정보와 선언된 의존성

use super::traits::{CapabilitySet, PluginCapability};
use serde::{Deserialize, Serialize};

/// 플러그인 버전
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PluginVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl PluginVersion {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }

    /// 버전 문자열 파싱 (예: "1.2.3")
    pub fn parse(s: &str) -> Option<Self> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 3 {
            return None;
        }

        Some(Self {
            major: parts[0].parse().ok()?,
            minor: parts[1].parse().ok()?,
            patch: parts[2].parse().ok()?,
        })
    }
}

impl std::fmt::Display for PluginVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl Default for PluginVersion {
    fn default() -> Self {
        Self::new(1, 0, 0)
    }
}

/// 플러그인 디스크립터
///
/// 이름은 레지스트리 안에서 유일한 키다. 식별 필드는 등록 이후 바뀌지 않고,
/// 라이프사이클 상태는 레지스트리가 따로 관리한다.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PluginDescriptor {
    /// 고유 이름 (예: "auth")
    pub name: String,

    /// 버전
    pub version: PluginVersion,

    /// 설명
    #[serde(default)]
    pub description: String,

    /// 선언된 의존성 (플러그인 이름)
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// 구현한 라이프사이클 콜백
    #[serde(default)]
    pub capabilities: CapabilitySet,
}

impl PluginDescriptor {
    /// 새 디스크립터 생성
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: PluginVersion::default(),
            description: String::new(),
            dependencies: vec![],
            capabilities: CapabilitySet::empty(),
        }
    }

    /// 빌더 패턴: 버전 설정
    pub fn with_version(mut self, version: PluginVersion) -> Self {
        self.version = version;
        self
    }

    /// 빌더 패턴: 설명 설정
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    /// 빌더 패턴: 의존성 추가
    pub fn with_dependency(mut self, name: impl Into<String>) -> Self {
        self.dependencies.push(name.into());
        self
    }

    /// 빌더 패턴: 콜백 선언 추가
    pub fn with_capability(mut self, capability: PluginCapability) -> Self {
        self.capabilities.insert(capability);
        self
    }

    /// 빌더 패턴: 콜백 집합 교체
    pub fn with_capabilities(mut self, capabilities: CapabilitySet) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn depends_on(&self, name: &str) -> bool {
        self.dependencies.iter().any(|d| d == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parse() {
        let v = PluginVersion::parse("1.2.3").unwrap();
        assert_eq!(v, PluginVersion::new(1, 2, 3));
        assert_eq!(v.to_string(), "1.2.3");

        assert!(PluginVersion::parse("1.2").is_none());
        assert!(PluginVersion::parse("a.b.c").is_none());
    }

    #[test]
    fn test_descriptor_builder() {
        let descriptor = PluginDescriptor::new("auth")
            .with_version(PluginVersion::new(2, 0, 0))
            .with_description("Authentication")
            .with_dependency("db")
            .with_capability(PluginCapability::Init)
            .with_capability(PluginCapability::Enable);

        assert_eq!(descriptor.name, "auth");
        assert!(descriptor.depends_on("db"));
        assert!(!descriptor.depends_on("cache"));
        assert!(descriptor.capabilities.contains(PluginCapability::Init));
        assert!(!descriptor.capabilities.contains(PluginCapability::Destroy));
    }

    #[test]
    fn test_descriptor_deserialize_defaults() {
        let descriptor: PluginDescriptor = serde_json::from_str(
            r#"{ "name": "cache", "version": { "major": 0, "minor": 3, "patch": 1 } }"#,
        )
        .unwrap();
        assert!(descriptor.dependencies.is_empty());
        assert!(descriptor.capabilities.is_empty());
    }
}
