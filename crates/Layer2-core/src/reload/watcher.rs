//! Polling Watcher - 파일 수정 시각 기반 변경 감지
//!
//! 감시 파일의 mtime을 주기적으로 비교하여 `ChangeEvent`를 보낸다.
//! 첫 폴링은 기준값만 기록한다.

use super::source::ChangeEvent;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

/// mtime 폴링 감시자
pub struct PollingWatcher {
    interval: Duration,
    /// (플러그인, 파일) 목록
    targets: Vec<(String, PathBuf)>,
    /// 파일별 마지막 mtime (없는 파일은 None)
    fingerprints: HashMap<PathBuf, Option<SystemTime>>,
    primed: bool,
}

impl PollingWatcher {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            targets: Vec::new(),
            fingerprints: HashMap::new(),
            primed: false,
        }
    }

    /// 감시 파일 추가
    pub fn watch(&mut self, plugin: impl Into<String>, path: impl Into<PathBuf>) {
        self.targets.push((plugin.into(), path.into()));
    }

    pub fn with_targets(mut self, targets: impl IntoIterator<Item = (String, PathBuf)>) -> Self {
        self.targets.extend(targets);
        self
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// 한 번 폴링하고 바뀐 파일의 이벤트를 반환
    pub async fn poll_once(&mut self) -> Vec<ChangeEvent> {
        let mut changes = Vec::new();

        for (plugin, path) in &self.targets {
            let current = tokio::fs::metadata(path)
                .await
                .ok()
                .and_then(|meta| meta.modified().ok());
            let previous = self.fingerprints.insert(path.clone(), current);

            if !self.primed {
                continue;
            }
            if previous.flatten() != current {
                trace!(plugin = %plugin, path = %path.display(), "File changed");
                changes.push(ChangeEvent::new(plugin.clone()).with_path(path.clone()));
            }
        }

        self.primed = true;
        changes
    }

    /// 백그라운드 폴링 시작. 수신측이 닫히면 종료한다
    pub fn spawn(mut self, changes: mpsc::Sender<ChangeEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            debug!(files = self.targets.len(), interval = ?self.interval, "Polling watcher started");

            loop {
                ticker.tick().await;
                for event in self.poll_once().await {
                    if changes.send(event).await.is_err() {
                        debug!("Change receiver dropped, stopping watcher");
                        return;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    #[tokio::test]
    async fn test_detects_modification_after_baseline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.plugin");
        File::create(&path).unwrap().write_all(b"v1").unwrap();

        let mut watcher = PollingWatcher::new(Duration::from_millis(10));
        watcher.watch("auth", &path);

        assert!(watcher.poll_once().await.is_empty());
        assert!(watcher.poll_once().await.is_empty());

        let file = File::options().write(true).open(&path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(60))
            .unwrap();

        let changes = watcher.poll_once().await;
        assert_eq!(changes, vec![ChangeEvent::new("auth").with_path(path.clone())]);
        assert!(watcher.poll_once().await.is_empty());
    }

    #[tokio::test]
    async fn test_created_file_counts_as_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("late.plugin");

        let mut watcher = PollingWatcher::new(Duration::from_millis(10));
        watcher.watch("late", &path);
        assert!(watcher.poll_once().await.is_empty());

        File::create(&path).unwrap();
        let changes = watcher.poll_once().await;
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].plugin, "late");
    }
}
