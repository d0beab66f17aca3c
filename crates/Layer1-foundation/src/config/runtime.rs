//! Runtime Config - 플러그인 런타임 설정
//!
//! `weave.json` 하나로 관리되며, 모든 필드는 기본값을 가진다.

use crate::storage::JsonStore;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// 설정 파일명
pub const RUNTIME_CONFIG_FILE: &str = "weave.json";

// ============================================================================
// Runtime Config (통합)
// ============================================================================

/// 플러그인 런타임 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfig {
    /// 라이프사이클 설정
    #[serde(default)]
    pub lifecycle: LifecycleConfig,

    /// 핫 리로드 설정
    #[serde(default)]
    pub hot_reload: HotReloadConfig,

    /// 조건부 로딩 설정
    #[serde(default)]
    pub conditions: ConditionConfig,

    /// 에러 추적 설정
    #[serde(default)]
    pub tracker: TrackerConfig,
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Load / Save
    // ========================================================================

    /// 디렉토리의 `weave.json`을 기본값 위에 병합하여 로드
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let store = JsonStore::new(dir.as_ref());
        let mut config = Self::new();
        if let Some(file_config) = store.load_optional::<RuntimeConfig>(RUNTIME_CONFIG_FILE)? {
            config.merge(file_config);
        }
        Ok(config)
    }

    /// 디렉토리에 저장
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<()> {
        JsonStore::new(dir.as_ref()).save(RUNTIME_CONFIG_FILE, self)
    }

    // ========================================================================
    // Merge
    // ========================================================================

    /// 다른 설정과 병합 (other가 우선)
    pub fn merge(&mut self, other: RuntimeConfig) {
        self.lifecycle.merge(other.lifecycle);
        self.hot_reload.merge(other.hot_reload);
        self.conditions.merge(other.conditions);
        self.tracker.merge(other.tracker);
    }

    // ========================================================================
    // Builder
    // ========================================================================

    pub fn max_enable_attempts(mut self, attempts: u32) -> Self {
        self.lifecycle.max_enable_attempts = attempts;
        self
    }

    pub fn debounce_ms(mut self, ms: u64) -> Self {
        self.hot_reload.debounce_ms = ms;
        self
    }

    pub fn unknown_predicate(mut self, policy: UnknownPredicatePolicy) -> Self {
        self.conditions.unknown_predicate = policy;
        self
    }

    pub fn feature(mut self, name: impl Into<String>, enabled: bool) -> Self {
        self.conditions.features.insert(name.into(), enabled);
        self
    }
}

// ============================================================================
// Lifecycle Config
// ============================================================================

/// 라이프사이클 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleConfig {
    /// enable 실패 시 최대 시도 횟수 (초과하면 영구 실패)
    #[serde(default = "default_max_enable_attempts")]
    pub max_enable_attempts: u32,

    /// 보관할 전이 히스토리 개수
    #[serde(default = "default_history_size")]
    pub history_size: usize,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            max_enable_attempts: default_max_enable_attempts(),
            history_size: default_history_size(),
        }
    }
}

impl LifecycleConfig {
    fn merge(&mut self, other: LifecycleConfig) {
        if other.max_enable_attempts != default_max_enable_attempts() {
            self.max_enable_attempts = other.max_enable_attempts;
        }
        if other.history_size != default_history_size() {
            self.history_size = other.history_size;
        }
    }
}

// ============================================================================
// Hot Reload Config
// ============================================================================

/// 핫 리로드 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotReloadConfig {
    /// 핫 리로드 활성화
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// 디바운스 윈도우 (ms)
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// 파일 폴링 주기 (ms)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for HotReloadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: default_debounce_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl HotReloadConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    fn merge(&mut self, other: HotReloadConfig) {
        self.enabled = other.enabled;
        if other.debounce_ms != default_debounce_ms() {
            self.debounce_ms = other.debounce_ms;
        }
        if other.poll_interval_ms != default_poll_interval_ms() {
            self.poll_interval_ms = other.poll_interval_ms;
        }
    }
}

// ============================================================================
// Condition Config
// ============================================================================

/// 알 수 없는 조건 타입 처리 정책
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UnknownPredicatePolicy {
    /// true로 평가 (경고 로그)
    #[default]
    FailOpen,
    /// false로 평가
    FailClosed,
}

impl UnknownPredicatePolicy {
    pub fn verdict(self) -> bool {
        matches!(self, Self::FailOpen)
    }
}

/// 조건부 로딩 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionConfig {
    /// 알 수 없는 조건 타입 처리
    #[serde(default)]
    pub unknown_predicate: UnknownPredicatePolicy,

    /// 기능 플래그
    #[serde(default)]
    pub features: HashMap<String, bool>,
}

impl ConditionConfig {
    fn merge(&mut self, other: ConditionConfig) {
        if other.unknown_predicate != UnknownPredicatePolicy::default() {
            self.unknown_predicate = other.unknown_predicate;
        }
        self.features.extend(other.features);
    }
}

// ============================================================================
// Tracker Config
// ============================================================================

/// 에러 추적 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerConfig {
    /// 보관할 최대 fingerprint 개수
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// fingerprint 계산에 쓰는 상위 프레임 수
    #[serde(default = "default_frame_depth")]
    pub frame_depth: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            frame_depth: default_frame_depth(),
        }
    }
}

impl TrackerConfig {
    fn merge(&mut self, other: TrackerConfig) {
        if other.max_entries != default_max_entries() {
            self.max_entries = other.max_entries;
        }
        if other.frame_depth != default_frame_depth() {
            self.frame_depth = other.frame_depth;
        }
    }
}

// ============================================================================
// 기본값
// ============================================================================

fn default_true() -> bool {
    true
}

fn default_max_enable_attempts() -> u32 {
    3
}

fn default_history_size() -> usize {
    256
}

fn default_debounce_ms() -> u64 {
    300
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_max_entries() -> usize {
    256
}

fn default_frame_depth() -> usize {
    3
}
