//! Service Registry - 플러그인 간 이름 기반 기능 조회
//!
//! 테이블이 `ServiceEntry`의 유일한 소유자다. 플러그인은 `"<plugin>.<service>"`
//! 키로만 조회하며, 등록한 플러그인이 disable/unload되면 항목도 사라진다.

use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::debug;
use weave_foundation::{Error, Result};

/// 타입이 지워진 서비스 인스턴스
pub type ServiceInstance = Arc<dyn Any + Send + Sync>;

/// 지연 생성 팩토리. 첫 조회 때 한 번만 호출된다.
pub type ServiceFactory = Arc<dyn Fn() -> Result<ServiceInstance> + Send + Sync>;

// ============================================================================
// ServiceKey
// ============================================================================

/// 정규화된 서비스 이름 `"<plugin>.<service>"`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceKey(String);

impl ServiceKey {
    pub fn new(plugin: &str, service: &str) -> Self {
        Self(format!("{}.{}", plugin, service))
    }

    /// 정규화된 이름 파싱. 첫 번째 `.` 앞이 플러그인 이름
    pub fn parse(qualified: &str) -> Option<Self> {
        let (plugin, service) = qualified.split_once('.')?;
        if plugin.is_empty() || service.is_empty() {
            return None;
        }
        Some(Self(qualified.to_string()))
    }

    pub fn plugin(&self) -> &str {
        self.0.split_once('.').map(|(p, _)| p).unwrap_or(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// ServiceEntry
// ============================================================================

enum Provider {
    Instance(ServiceInstance),
    Factory(ServiceFactory),
}

struct ServiceEntry {
    owner: String,
    provider: Provider,
    cached: OnceLock<ServiceInstance>,
}

impl ServiceEntry {
    fn resolve(&self) -> Result<ServiceInstance> {
        match &self.provider {
            Provider::Instance(instance) => Ok(Arc::clone(instance)),
            Provider::Factory(factory) => {
                if let Some(instance) = self.cached.get() {
                    return Ok(Arc::clone(instance));
                }
                let created = factory()?;
                // 동시에 생성된 경우 먼저 저장된 인스턴스를 쓴다
                let _ = self.cached.set(created);
                self.cached
                    .get()
                    .cloned()
                    .ok_or_else(|| Error::Internal("service cache not populated".into()))
            }
        }
    }
}

// ============================================================================
// ServiceRegistry
// ============================================================================

/// 서비스 레지스트리
#[derive(Default)]
pub struct ServiceRegistry {
    entries: RwLock<HashMap<ServiceKey, Arc<ServiceEntry>>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, owner: &str, service: &str, provider: Provider) -> Result<ServiceKey> {
        let key = ServiceKey::new(owner, service);
        let mut entries = self.entries.write();
        if entries.contains_key(&key) {
            return Err(Error::ServiceAlreadyRegistered(key.to_string()));
        }
        entries.insert(
            key.clone(),
            Arc::new(ServiceEntry {
                owner: owner.to_string(),
                provider,
                cached: OnceLock::new(),
            }),
        );
        debug!(service = %key, "Registered service");
        Ok(key)
    }

    /// 인스턴스 등록
    pub fn register<T: Any + Send + Sync>(
        &self,
        owner: &str,
        service: &str,
        instance: Arc<T>,
    ) -> Result<ServiceKey> {
        self.insert(owner, service, Provider::Instance(instance as ServiceInstance))
    }

    /// 팩토리 등록 (지연 생성, 결과 캐시)
    pub fn register_factory<T, F>(&self, owner: &str, service: &str, factory: F) -> Result<ServiceKey>
    where
        T: Any + Send + Sync,
        F: Fn() -> Result<Arc<T>> + Send + Sync + 'static,
    {
        let factory: ServiceFactory = Arc::new(move || factory().map(|t| t as ServiceInstance));
        self.insert(owner, service, Provider::Factory(factory))
    }

    /// 타입이 지워진 인스턴스 조회
    pub fn get_any(&self, qualified: &str) -> Result<ServiceInstance> {
        let entry = ServiceKey::parse(qualified)
            .and_then(|key| self.entries.read().get(&key).cloned())
            .ok_or_else(|| Error::ServiceNotFound(qualified.to_string()))?;
        entry.resolve()
    }

    /// 타입 지정 조회
    pub fn get<T: Any + Send + Sync>(&self, qualified: &str) -> Result<Arc<T>> {
        self.get_any(qualified)?
            .downcast::<T>()
            .map_err(|_| Error::ServiceTypeMismatch(qualified.to_string()))
    }

    pub fn contains(&self, qualified: &str) -> bool {
        ServiceKey::parse(qualified)
            .map(|key| self.entries.read().contains_key(&key))
            .unwrap_or(false)
    }

    /// (owner, service) 항목 해제
    pub fn unregister(&self, owner: &str, service: &str) -> bool {
        self.entries
            .write()
            .remove(&ServiceKey::new(owner, service))
            .is_some()
    }

    /// 플러그인이 등록한 모든 서비스 해제. 해제된 개수 반환
    pub fn remove_owner(&self, owner: &str) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| entry.owner != owner);
        let removed = before - entries.len();
        if removed > 0 {
            debug!(owner = %owner, removed, "Removed services");
        }
        removed
    }

    /// 플러그인이 등록한 서비스 키 (정렬됨)
    pub fn keys_of(&self, owner: &str) -> Vec<ServiceKey> {
        let mut keys: Vec<_> = self
            .entries
            .read()
            .iter()
            .filter(|(_, entry)| entry.owner == owner)
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
