//! Error Tracker - 라이프사이클/훅/통신 실패 수집
//!
//! 같은 실패가 반복되면 fingerprint로 묶고 발생 횟수만 증가시킨다.
//!
//! ```ignore
//! let tracker = ErrorTracker::new(TrackerConfig::default());
//! let fp = tracker.capture(
//!     ErrorReport::from_error(ErrorKind::Lifecycle, &err)
//!         .plugin("auth")
//!         .frame("init"),
//! );
//! assert_eq!(tracker.get(fp).unwrap().count, 1);
//! ```

mod fingerprint;

pub use fingerprint::Fingerprint;

use crate::config::TrackerConfig;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, error};

/// 실패가 발생한 영역
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Lifecycle,
    Hook,
    Communication,
    Reload,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lifecycle => write!(f, "lifecycle"),
            Self::Hook => write!(f, "hook"),
            Self::Communication => write!(f, "communication"),
            Self::Reload => write!(f, "reload"),
        }
    }
}

/// 수집할 실패 하나
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub plugin: Option<String>,
    pub message: String,
    /// 컨텍스트 프레임 (단계/훅 이름, 이후 source 체인)
    pub frames: Vec<String>,
}

impl ErrorReport {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            plugin: None,
            message: message.into(),
            frames: Vec::new(),
        }
    }

    /// 에러와 그 source 체인으로 리포트 생성
    pub fn from_error(kind: ErrorKind, err: &(dyn std::error::Error + 'static)) -> Self {
        let mut report = Self::new(kind, err.to_string());
        let mut source = err.source();
        while let Some(cause) = source {
            report.frames.push(cause.to_string());
            source = cause.source();
        }
        report
    }

    pub fn plugin(mut self, plugin: impl Into<String>) -> Self {
        self.plugin = Some(plugin.into());
        self
    }

    /// 가장 위쪽에 프레임 추가
    pub fn frame(mut self, frame: impl Into<String>) -> Self {
        self.frames.insert(0, frame.into());
        self
    }
}

/// 중복 제거된 실패 항목
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedError {
    pub fingerprint: String,
    pub kind: ErrorKind,
    pub plugin: Option<String>,
    pub message: String,
    pub frames: Vec<String>,
    pub count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// 에러 추적기
pub struct ErrorTracker {
    config: TrackerConfig,
    entries: Mutex<HashMap<Fingerprint, TrackedError>>,
}

impl ErrorTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// 실패 수집. 같은 fingerprint면 횟수만 증가
    pub fn capture(&self, report: ErrorReport) -> Fingerprint {
        let kind_label = report.kind.to_string();
        let fingerprint = Fingerprint::compute(
            &kind_label,
            &report.message,
            &report.frames,
            self.config.frame_depth,
        );
        let now = Utc::now();

        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(&fingerprint) {
            entry.count += 1;
            entry.last_seen = now;
            debug!(
                fingerprint = %fingerprint,
                count = entry.count,
                "Repeated error occurrence"
            );
            return fingerprint;
        }

        error!(
            kind = %report.kind,
            plugin = report.plugin.as_deref().unwrap_or("-"),
            fingerprint = %fingerprint,
            "{}",
            report.message
        );

        if self.config.max_entries > 0 && entries.len() >= self.config.max_entries {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.last_seen)
                .map(|(fp, _)| *fp);
            if let Some(fp) = oldest {
                entries.remove(&fp);
            }
        }

        entries.insert(
            fingerprint,
            TrackedError {
                fingerprint: fingerprint.to_string(),
                kind: report.kind,
                plugin: report.plugin,
                message: report.message,
                frames: report.frames,
                count: 1,
                first_seen: now,
                last_seen: now,
            },
        );
        fingerprint
    }

    pub fn get(&self, fingerprint: Fingerprint) -> Option<TrackedError> {
        self.entries.lock().get(&fingerprint).cloned()
    }

    /// 모든 항목 (발생 횟수 내림차순)
    pub fn entries(&self) -> Vec<TrackedError> {
        let mut all: Vec<TrackedError> = self.entries.lock().values().cloned().collect();
        all.sort_by(|a, b| b.count.cmp(&a.count).then(b.last_seen.cmp(&a.last_seen)));
        all
    }

    pub fn for_plugin(&self, plugin: &str) -> Vec<TrackedError> {
        self.entries()
            .into_iter()
            .filter(|e| e.plugin.as_deref() == Some(plugin))
            .collect()
    }

    pub fn total_occurrences(&self) -> u64 {
        self.entries.lock().values().map(|e| e.count).sum()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl Default for ErrorTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}
