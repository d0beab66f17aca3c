//! Reload Session - 리로드 한 번 동안의 기록과 결과

use crate::plugin::{LifecycleState, Plugin, PluginManager};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

// ============================================================================
// ReloadPhase - 플러그인별 리로드 상태
// ============================================================================

/// 리로드 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "phase")]
pub enum ReloadPhase {
    /// 감시 중 (변경 없음)
    Watching,
    /// 변경 감지
    ChangeDetected,
    /// 디바운스 대기
    Debouncing,
    /// 리로드 진행 중
    Reloading,
    /// 마지막 리로드 성공
    Succeeded,
    /// 마지막 리로드 실패
    Failed { rolled_back: bool },
}

impl std::fmt::Display for ReloadPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Watching => write!(f, "watching"),
            Self::ChangeDetected => write!(f, "change_detected"),
            Self::Debouncing => write!(f, "debouncing"),
            Self::Reloading => write!(f, "reloading"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed { rolled_back: true } => write!(f, "failed (rolled back)"),
            Self::Failed { rolled_back: false } => write!(f, "failed"),
        }
    }
}

// ============================================================================
// ReloadSession - 리로드 전 캡처한 상태
// ============================================================================

/// 리로드 세션
///
/// 변경이 감지되어 리로드가 시작될 때 만들어지고, 완료 또는 롤백 후 버려진다.
pub struct ReloadSession {
    pub plugin: String,
    /// 리로드 전 상태 (등록되지 않았으면 None)
    pub previous_state: Option<LifecycleState>,
    /// 리로드 전 외부 설정 오버라이드 원본
    pub previous_overrides: Option<Value>,
    /// 리로드 전 유효 설정. 복원 후 비교에 쓴다
    pub previous_config: Value,
    pub watched_files: Vec<PathBuf>,
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    /// 롤백용 이전 구현
    pub(crate) previous_impl: Option<Arc<dyn Plugin>>,
}

impl ReloadSession {
    /// 현재 상태 캡처
    pub fn capture(
        manager: &PluginManager,
        plugin: &str,
        watched_files: Vec<PathBuf>,
        attempt: u32,
    ) -> Self {
        let store = manager.runtime().plugin_config();
        Self {
            plugin: plugin.to_string(),
            previous_state: manager.state(plugin),
            previous_overrides: store.overrides(plugin),
            previous_config: store.get(plugin),
            watched_files,
            attempt,
            started_at: Utc::now(),
            previous_impl: manager.plugin(plugin),
        }
    }

    pub fn was_enabled(&self) -> bool {
        self.previous_state == Some(LifecycleState::Enabled)
    }
}

impl std::fmt::Debug for ReloadSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReloadSession")
            .field("plugin", &self.plugin)
            .field("previous_state", &self.previous_state)
            .field("watched_files", &self.watched_files)
            .field("attempt", &self.attempt)
            .finish()
    }
}

// ============================================================================
// ReloadReport - 리로드 결과
// ============================================================================

/// 리로드 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum ReloadOutcome {
    Succeeded,
    /// 실패했지만 이전 구현과 상태로 복원됨
    RolledBack { reason: String },
    /// 롤백도 실패. 플러그인은 Error 상태로 남는다
    Failed { reason: String },
}

/// 리로드 기록
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReloadReport {
    pub plugin: String,
    pub attempt: u32,
    pub outcome: ReloadOutcome,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl ReloadReport {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ReloadOutcome::Succeeded)
    }

    pub fn phase(&self) -> ReloadPhase {
        match self.outcome {
            ReloadOutcome::Succeeded => ReloadPhase::Succeeded,
            ReloadOutcome::RolledBack { .. } => ReloadPhase::Failed { rolled_back: true },
            ReloadOutcome::Failed { .. } => ReloadPhase::Failed { rolled_back: false },
        }
    }
}
