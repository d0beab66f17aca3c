//! Plugin Config Store - 플러그인별 JSON 설정
//!
//! 플러그인 이름을 키로 하는 JSON 문서를 프로세스 내 기본값 위에 병합한다.
//! 저장소는 플러그인 언로드/리로드와 무관하게 유지된다.

use crate::storage::JsonStore;
use crate::Result;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// 플러그인 설정 파일명
pub const PLUGINS_CONFIG_FILE: &str = "plugins.json";

/// JSON 객체 재귀 병합 (overlay가 우선, 객체가 아닌 값은 통째로 교체)
pub fn merge_json(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

#[derive(Default)]
struct Layers {
    defaults: HashMap<String, Value>,
    overrides: HashMap<String, Value>,
}

impl Layers {
    fn effective(&self, name: &str) -> Value {
        let mut value = self
            .defaults
            .get(name)
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()));
        if let Some(overlay) = self.overrides.get(name) {
            merge_json(&mut value, overlay);
        }
        value
    }

    fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .defaults
            .keys()
            .chain(self.overrides.keys())
            .cloned()
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

/// 플러그인 설정 저장소
#[derive(Default)]
pub struct PluginConfigStore {
    layers: RwLock<Layers>,
    source: Option<PathBuf>,
}

impl PluginConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 디렉토리의 `plugins.json`을 오버라이드로 사용하는 저장소
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let store = Self {
            layers: RwLock::new(Layers::default()),
            source: Some(JsonStore::new(dir.as_ref()).file_path(PLUGINS_CONFIG_FILE)),
        };
        store.reload_file()?;
        Ok(store)
    }

    /// 프로세스 내 기본값 등록
    pub fn set_defaults(&self, name: impl Into<String>, defaults: Value) {
        self.layers.write().defaults.insert(name.into(), defaults);
    }

    /// 현재 유효 설정 (기본값 + 오버라이드)
    pub fn get(&self, name: &str) -> Value {
        self.layers.read().effective(name)
    }

    /// 오버라이드 교체 후 새 유효 설정 반환
    pub fn apply(&self, name: impl Into<String>, overrides: Value) -> Value {
        let name = name.into();
        let mut layers = self.layers.write();
        layers.overrides.insert(name.clone(), overrides);
        debug!(plugin = %name, "Plugin config override applied");
        layers.effective(&name)
    }

    /// 오버라이드 원본 (리로드 시 캡처/복원용)
    pub fn overrides(&self, name: &str) -> Option<Value> {
        self.layers.read().overrides.get(name).cloned()
    }

    /// 오버라이드 복원 (None이면 제거)
    pub fn restore(&self, name: &str, overrides: Option<Value>) {
        let mut layers = self.layers.write();
        match overrides {
            Some(value) => {
                layers.overrides.insert(name.to_string(), value);
            }
            None => {
                layers.overrides.remove(name);
            }
        }
    }

    /// 설정 파일 재로드. 유효 설정이 바뀐 플러그인 이름 반환
    pub fn reload_file(&self) -> Result<Vec<String>> {
        let Some(path) = &self.source else {
            return Ok(Vec::new());
        };
        let (dir, file) = match (path.parent(), path.file_name().and_then(|f| f.to_str())) {
            (Some(dir), Some(file)) => (dir, file),
            _ => return Ok(Vec::new()),
        };

        let loaded: HashMap<String, Value> =
            JsonStore::new(dir).load_optional(file)?.unwrap_or_default();

        let mut layers = self.layers.write();
        let before: HashMap<String, Value> = layers
            .names()
            .into_iter()
            .map(|name| {
                let value = layers.effective(&name);
                (name, value)
            })
            .collect();

        layers.overrides = loaded;

        let changed: Vec<String> = layers
            .names()
            .into_iter()
            .filter(|name| before.get(name) != Some(&layers.effective(name)))
            .collect();

        info!(
            path = %path.display(),
            changed = changed.len(),
            "Plugin config reloaded"
        );
        Ok(changed)
    }
}
