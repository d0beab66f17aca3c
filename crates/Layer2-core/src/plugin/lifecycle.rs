//! Lifecycle - 플러그인 상태 머신과 전이 히스토리

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// 플러그인 라이프사이클 상태
///
/// 라이프사이클 매니저만 상태를 바꾼다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Registered,
    Initializing,
    Initialized,
    Enabling,
    Enabled,
    Disabling,
    Disabled,
    Error,
    Unloaded,
}

impl LifecycleState {
    /// 허용된 전이인지 확인
    pub fn can_transition_to(self, to: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, to),
            (Registered, Initializing)
                | (Registered, Unloaded)
                | (Registered, Error)
                | (Initializing, Initialized)
                | (Initializing, Error)
                | (Initialized, Enabling)
                | (Initialized, Unloaded)
                | (Initialized, Error)
                | (Enabling, Enabled)
                | (Enabling, Error)
                | (Enabled, Disabling)
                | (Disabling, Disabled)
                | (Disabling, Error)
                | (Disabled, Initializing)
                | (Disabled, Unloaded)
                | (Disabled, Error)
                | (Error, Initializing)
                | (Error, Unloaded)
        )
    }

    /// 콜백 실행 중인 일시 상태
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Initializing | Self::Enabling | Self::Disabling)
    }

    /// 훅/서비스 등록이 살아있을 수 있는 상태
    pub fn is_live(self) -> bool {
        matches!(self, Self::Initialized | Self::Enabled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::Initializing => "initializing",
            Self::Initialized => "initialized",
            Self::Enabling => "enabling",
            Self::Enabled => "enabled",
            Self::Disabling => "disabling",
            Self::Disabled => "disabled",
            Self::Error => "error",
            Self::Unloaded => "unloaded",
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 콜백 단계 (에러 보고용)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    Init,
    Enable,
    Disable,
    Destroy,
    ConfigChange,
}

impl std::fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Init => write!(f, "init"),
            Self::Enable => write!(f, "enable"),
            Self::Disable => write!(f, "disable"),
            Self::Destroy => write!(f, "destroy"),
            Self::ConfigChange => write!(f, "config_change"),
        }
    }
}

/// 상태 전이 기록
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub plugin: String,
    pub from: LifecycleState,
    pub to: LifecycleState,
    pub at: DateTime<Utc>,
    pub error: Option<String>,
}

/// 최근 전이 히스토리 (최대 N개)
pub struct LifecycleHistory {
    events: Mutex<VecDeque<LifecycleEvent>>,
    capacity: usize,
}

impl LifecycleHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
        }
    }

    pub fn record(&self, event: LifecycleEvent) {
        let mut events = self.events.lock();
        if self.capacity > 0 && events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    pub fn all(&self) -> Vec<LifecycleEvent> {
        self.events.lock().iter().cloned().collect()
    }

    pub fn events_for(&self, plugin: &str) -> Vec<LifecycleEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.plugin == plugin)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use LifecycleState::*;

    #[test]
    fn test_happy_path_transitions() {
        let path = [
            Registered,
            Initializing,
            Initialized,
            Enabling,
            Enabled,
            Disabling,
            Disabled,
            Unloaded,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_rejected_transitions() {
        assert!(!Registered.can_transition_to(Enabled));
        assert!(!Enabled.can_transition_to(Unloaded));
        assert!(!Unloaded.can_transition_to(Registered));
        assert!(!Initialized.can_transition_to(Disabled));
    }

    #[test]
    fn test_error_recovery_transitions() {
        assert!(Error.can_transition_to(Initializing));
        assert!(Error.can_transition_to(Unloaded));
        assert!(!Error.can_transition_to(Enabled));
        // 콜백 밖에서 감지된 실패
        assert!(Registered.can_transition_to(Error));
        assert!(Disabled.can_transition_to(Error));
        assert!(!Enabled.can_transition_to(Error));
        assert!(!Error.is_transient());
        assert!(Enabling.is_transient());
    }

    #[test]
    fn test_history_is_bounded() {
        let history = LifecycleHistory::new(2);
        for to in [Initializing, Initialized, Enabling] {
            history.record(LifecycleEvent {
                plugin: "p".into(),
                from: Registered,
                to,
                at: Utc::now(),
                error: None,
            });
        }
        let events = history.all();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].to, Initialized);
        assert_eq!(events[1].to, Enabling);
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_string(&Initializing).unwrap();
        assert_eq!(json, "\"initializing\"");

        let parsed: LifecycleState = serde_json::from_str("\"error\"").unwrap();
        assert_eq!(parsed, Error);
    }
}
