//! JSON 파일 저장소
//!
//! `weave.json`, `plugins.json`이 놓이는 디렉토리 하나를 다룬다.
//! 저장은 임시 파일에 쓴 뒤 rename하므로, 폴링 중인 감시자가 반쯤 쓰인 파일을 읽지 않는다.

use crate::{Error, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};

/// 프로젝트 설정 디렉토리 이름
pub const PROJECT_DIR: &str = ".weave";

/// JSON 설정 저장소
#[derive(Debug, Clone)]
pub struct JsonStore {
    base_dir: PathBuf,
}

impl JsonStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// 글로벌 설정 (~/.config/weave/)
    pub fn global() -> Result<Self> {
        let dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("Cannot find config directory".to_string()))?
            .join("weave");
        Ok(Self::new(dir))
    }

    /// 프로젝트 설정 (<root>/.weave/)
    pub fn project(root: impl Into<PathBuf>) -> Self {
        Self::new(root.into().join(PROJECT_DIR))
    }

    /// 프로젝트 디렉토리가 있으면 그것을, 없으면 글로벌 디렉토리를 사용
    pub fn discover(root: impl Into<PathBuf>) -> Result<Self> {
        let project = Self::project(root);
        if project.base_dir.is_dir() {
            return Ok(project);
        }
        Self::global()
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn file_path(&self, filename: &str) -> PathBuf {
        self.base_dir.join(filename)
    }

    /// JSON 로드
    pub fn load<T: DeserializeOwned>(&self, filename: &str) -> Result<T> {
        let path = self.file_path(filename);
        let content = std::fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// JSON 로드. 파일이 없으면 None
    pub fn load_optional<T: DeserializeOwned>(&self, filename: &str) -> Result<Option<T>> {
        if !self.file_path(filename).exists() {
            return Ok(None);
        }
        self.load(filename).map(Some)
    }

    /// JSON 저장 (임시 파일 + rename)
    pub fn save<T: Serialize>(&self, filename: &str, data: &T) -> Result<()> {
        std::fs::create_dir_all(&self.base_dir)
            .map_err(|e| Error::Config(format!("Failed to create directory: {}", e)))?;

        let path = self.file_path(filename);
        let tmp = self.file_path(&format!(".{}.tmp", filename));
        let content = serde_json::to_string_pretty(data)?;

        std::fs::write(&tmp, content)
            .map_err(|e| Error::Config(format!("Failed to write {}: {}", tmp.display(), e)))?;
        std::fs::rename(&tmp, &path)
            .map_err(|e| Error::Config(format!("Failed to replace {}: {}", path.display(), e)))
    }
}
