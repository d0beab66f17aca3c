//! Hot Reload Manager - 플러그인 구현 교체
//!
//! ```text
//! Watching -> ChangeDetected -> Debouncing -> Reloading -> Succeeded | Failed
//! ```
//!
//! 디바운스 윈도우 안에서 들어온 변경은 한 번의 리로드로 합쳐진다.
//! 리로드 중에 들어온 변경은 보류되었다가 현재 리로드가 끝나면 한 번 더 실행된다.
//! 같은 플러그인의 리로드는 플러그인별 락으로 직렬화된다.

use super::session::{ReloadOutcome, ReloadPhase, ReloadReport, ReloadSession};
use super::source::{ChangeEvent, PluginSource};
use crate::plugin::{LifecycleState, PluginManager};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use weave_foundation::{Error, ErrorKind, ErrorReport, HotReloadConfig, Result};

/// 보관할 리로드 기록 수
const REPORT_HISTORY: usize = 64;

struct WatchEntry {
    source: Arc<dyn PluginSource>,
    files: Vec<PathBuf>,
    phase: ReloadPhase,
    /// 변경 감지마다 증가. 디바운스 태스크가 자신이 최신인지 확인하는 데 쓴다
    generation: u64,
    /// 리로드 중에 변경이 들어옴
    pending: bool,
    attempts: u32,
    reload_lock: Arc<AsyncMutex<()>>,
}

/// 핫 리로드 매니저
pub struct HotReloadManager {
    plugins: Arc<PluginManager>,
    config: HotReloadConfig,
    watches: Mutex<HashMap<String, WatchEntry>>,
    reports: Mutex<VecDeque<ReloadReport>>,
}

impl HotReloadManager {
    pub fn new(plugins: Arc<PluginManager>) -> Arc<Self> {
        let config = plugins.runtime().config().hot_reload.clone();
        Arc::new(Self {
            plugins,
            config,
            watches: Mutex::new(HashMap::new()),
            reports: Mutex::new(VecDeque::new()),
        })
    }

    pub fn plugins(&self) -> &Arc<PluginManager> {
        &self.plugins
    }

    // ========================================================================
    // 감시 대상
    // ========================================================================

    /// 감시 대상 등록
    pub fn watch(&self, plugin: impl Into<String>, source: Arc<dyn PluginSource>, files: Vec<PathBuf>) {
        let plugin = plugin.into();
        debug!(plugin = %plugin, files = files.len(), "Watching plugin");
        self.watches.lock().insert(
            plugin,
            WatchEntry {
                source,
                files,
                phase: ReloadPhase::Watching,
                generation: 0,
                pending: false,
                attempts: 0,
                reload_lock: Arc::new(AsyncMutex::new(())),
            },
        );
    }

    pub fn unwatch(&self, plugin: &str) -> bool {
        self.watches.lock().remove(plugin).is_some()
    }

    /// 현재 리로드 상태
    pub fn status(&self, plugin: &str) -> Option<ReloadPhase> {
        self.watches.lock().get(plugin).map(|entry| entry.phase)
    }

    /// 감시 중인 (플러그인, 파일) 목록
    pub fn watched_files(&self) -> Vec<(String, PathBuf)> {
        let watches = self.watches.lock();
        let mut files: Vec<_> = watches
            .iter()
            .flat_map(|(name, entry)| entry.files.iter().map(move |f| (name.clone(), f.clone())))
            .collect();
        files.sort();
        files
    }

    /// 최근 리로드 기록 (오래된 순)
    pub fn reports(&self) -> Vec<ReloadReport> {
        self.reports.lock().iter().cloned().collect()
    }

    // ========================================================================
    // 변경 감지
    // ========================================================================

    /// 변경 이벤트 스트림 소비
    pub fn spawn(self: &Arc<Self>, mut changes: mpsc::Receiver<ChangeEvent>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = changes.recv().await {
                this.notify_changed(event);
            }
            debug!("Change stream closed");
        })
    }

    /// 변경 감지. 디바운스 후 리로드를 예약한다
    pub fn notify_changed(self: &Arc<Self>, event: ChangeEvent) {
        if !self.config.enabled {
            debug!(plugin = %event.plugin, "Hot reload disabled, ignoring change");
            return;
        }

        let debounce = self.config.debounce();
        let generation = {
            let mut watches = self.watches.lock();
            let Some(entry) = watches.get_mut(&event.plugin) else {
                debug!(plugin = %event.plugin, "Change for unwatched plugin");
                return;
            };

            entry.generation += 1;
            if entry.phase == ReloadPhase::Reloading {
                entry.pending = true;
                debug!(plugin = %event.plugin, "Change during reload, queued");
                return;
            }

            // 디바운스 윈도우가 0이면 대기 없이 바로 리로드
            entry.phase = if debounce.is_zero() {
                ReloadPhase::ChangeDetected
            } else {
                ReloadPhase::Debouncing
            };
            debug!(plugin = %event.plugin, path = ?event.path, phase = %entry.phase, "Change detected");
            entry.generation
        };

        let this = Arc::clone(self);
        let plugin = event.plugin;
        tokio::spawn(async move {
            if !debounce.is_zero() {
                tokio::time::sleep(debounce).await;
            }
            if !this.is_latest(&plugin, generation) {
                // 이후 변경이 같은 리로드를 예약했다
                return;
            }
            if let Err(e) = this.reload(&plugin).await {
                warn!(plugin = %plugin, error = %e, "Hot reload failed");
            }
        });
    }

    fn is_latest(&self, plugin: &str, generation: u64) -> bool {
        self.watches
            .lock()
            .get(plugin)
            .map(|entry| {
                entry.generation == generation
                    && matches!(entry.phase, ReloadPhase::Debouncing | ReloadPhase::ChangeDetected)
            })
            .unwrap_or(false)
    }

    // ========================================================================
    // 리로드
    // ========================================================================

    /// 리로드 실행
    ///
    /// 실패하면 이전 구현과 상태로 롤백하고 `ReloadFailed`를 반환한다.
    pub async fn reload(&self, plugin: &str) -> Result<ReloadReport> {
        let lock = self
            .watches
            .lock()
            .get(plugin)
            .map(|entry| entry.reload_lock.clone())
            .ok_or_else(|| Error::reload_failed(plugin, false, "plugin is not watched"))?;
        let _guard = lock.lock().await;

        loop {
            let (source, files, attempt) = {
                let mut watches = self.watches.lock();
                let entry = watches
                    .get_mut(plugin)
                    .ok_or_else(|| Error::reload_failed(plugin, false, "plugin is not watched"))?;
                entry.phase = ReloadPhase::Reloading;
                entry.pending = false;
                entry.attempts += 1;
                (entry.source.clone(), entry.files.clone(), entry.attempts)
            };

            let session = ReloadSession::capture(&self.plugins, plugin, files, attempt);
            let report = self.run_session(&session, source.as_ref()).await;
            self.record(report.clone());

            let again = {
                let mut watches = self.watches.lock();
                match watches.get_mut(plugin) {
                    Some(entry) if entry.pending => {
                        entry.pending = false;
                        true
                    }
                    Some(entry) => {
                        entry.phase = report.phase();
                        false
                    }
                    None => false,
                }
            };

            if again {
                debug!(plugin = %plugin, "Running queued reload");
                continue;
            }

            return match report.outcome {
                ReloadOutcome::Succeeded => Ok(report),
                ReloadOutcome::RolledBack { reason } => Err(Error::reload_failed(plugin, true, reason)),
                ReloadOutcome::Failed { reason } => Err(Error::reload_failed(plugin, false, reason)),
            };
        }
    }

    async fn run_session(&self, session: &ReloadSession, source: &dyn PluginSource) -> ReloadReport {
        let started = Instant::now();
        info!(plugin = %session.plugin, attempt = session.attempt, previous = ?session.previous_state, "Reloading plugin");

        let outcome = match self.swap(session, source).await {
            Ok(()) => {
                info!(plugin = %session.plugin, "Plugin reloaded");
                ReloadOutcome::Succeeded
            }
            Err(e) => {
                warn!(plugin = %session.plugin, error = %e, "Reload failed, rolling back");
                let reason = e.to_string();
                match self.rollback(session).await {
                    Ok(()) => {
                        info!(plugin = %session.plugin, "Rolled back to previous implementation");
                        ReloadOutcome::RolledBack { reason }
                    }
                    Err(rollback_err) => {
                        error!(plugin = %session.plugin, error = %rollback_err, "Rollback failed");
                        let reason = format!("{}; rollback failed: {}", reason, rollback_err);
                        self.contain(session, &reason).await;
                        ReloadOutcome::Failed { reason }
                    }
                }
            }
        };

        if let ReloadOutcome::RolledBack { reason } | ReloadOutcome::Failed { reason } = &outcome {
            self.plugins.runtime().tracker().capture(
                ErrorReport::new(ErrorKind::Reload, reason.clone())
                    .plugin(session.plugin.clone())
                    .frame(format!("reload:{}", session.attempt)),
            );
        }

        ReloadReport {
            plugin: session.plugin.clone(),
            attempt: session.attempt,
            outcome,
            started_at: session.started_at,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }

    /// disable -> unload -> invalidate -> load -> register -> 설정 복원 -> init -> enable
    async fn swap(&self, session: &ReloadSession, source: &dyn PluginSource) -> Result<()> {
        let name = session.plugin.as_str();

        if session.was_enabled() {
            self.plugins.disable(name).await?;
        }
        if self.plugins.contains(name) {
            self.plugins.unload(name).await?;
        }

        source.invalidate();
        let plugin = source.load().await?;
        let loaded = plugin.descriptor().name;
        if loaded != name {
            return Err(Error::Plugin(format!(
                "source for {} produced plugin {}",
                name, loaded
            )));
        }

        self.plugins.register(plugin)?;
        self.restore(session).await
    }

    /// 현재 등록된 구현을 내리고 이전 구현을 이전 상태로 되돌린다
    async fn rollback(&self, session: &ReloadSession) -> Result<()> {
        let name = session.plugin.as_str();

        if self.plugins.contains(name) {
            if self.plugins.state(name) == Some(LifecycleState::Enabled) {
                if let Err(e) = self.plugins.disable(name).await {
                    warn!(plugin = %name, error = %e, "Disable during rollback failed");
                }
            }
            self.plugins.unload(name).await?;
        }

        let Some(previous) = session.previous_impl.clone() else {
            return Ok(());
        };
        self.plugins.register(previous)?;
        self.restore(session).await
    }

    /// 롤백까지 실패한 플러그인을 레지스트리에 남기고 Error로 표시
    async fn contain(&self, session: &ReloadSession, reason: &str) {
        let name = session.plugin.as_str();
        if !self.plugins.contains(name) {
            if let Some(previous) = session.previous_impl.clone() {
                if let Err(e) = self.plugins.register(previous) {
                    error!(plugin = %name, error = %e, "Could not re-register previous implementation");
                    return;
                }
            }
        }
        if self.plugins.contains(name) {
            if let Err(e) = self.plugins.mark_failed(name, reason).await {
                error!(plugin = %name, error = %e, "Could not mark plugin as failed");
            }
        }
    }

    async fn restore(&self, session: &ReloadSession) -> Result<()> {
        let name = session.plugin.as_str();
        let store = self.plugins.runtime().plugin_config();
        store.restore(name, session.previous_overrides.clone());
        if store.get(name) != session.previous_config {
            warn!(plugin = %name, "Effective config changed during reload");
        }

        match session.previous_state {
            None | Some(LifecycleState::Registered) => Ok(()),
            Some(LifecycleState::Enabled) => self.plugins.enable(name).await,
            Some(_) => self.plugins.init(name).await,
        }
    }

    fn record(&self, report: ReloadReport) {
        let mut reports = self.reports.lock();
        if reports.len() >= REPORT_HISTORY {
            reports.pop_front();
        }
        reports.push_back(report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::{PluginCapability, PluginContext, PluginDescriptor, PluginVersion};
    use crate::runtime::RuntimeContext;
    use crate::Plugin;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
    use std::time::Duration;
    use weave_foundation::RuntimeConfig;

    struct Versioned {
        version: u32,
        fail_init: bool,
        seen_config: parking_lot::Mutex<Option<Value>>,
    }

    #[async_trait]
    impl Plugin for Versioned {
        fn descriptor(&self) -> PluginDescriptor {
            PluginDescriptor::new("greeter")
                .with_version(PluginVersion::new(self.version, 0, 0))
                .with_capability(PluginCapability::Init)
        }

        async fn init(&self, ctx: &PluginContext) -> Result<()> {
            if self.fail_init {
                return Err(Error::Plugin("syntax error".into()));
            }
            *self.seen_config.lock() = Some(ctx.config());
            ctx.services().register("version", Arc::new(self.version))?;
            Ok(())
        }
    }

    /// load할 때마다 버전이 오른다
    struct CountingSource {
        loads: AtomicU32,
        invalidations: AtomicU32,
        broken: AtomicBool,
        /// load 지연 (ms)
        delay_ms: AtomicU64,
    }

    impl CountingSource {
        fn new() -> Self {
            Self {
                loads: AtomicU32::new(0),
                invalidations: AtomicU32::new(0),
                broken: AtomicBool::new(false),
                delay_ms: AtomicU64::new(0),
            }
        }
    }

    #[async_trait]
    impl PluginSource for CountingSource {
        async fn load(&self) -> Result<Arc<dyn Plugin>> {
            let delay = self.delay_ms.load(Ordering::SeqCst);
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            let n = self.loads.fetch_add(1, Ordering::SeqCst) + 2;
            Ok(Arc::new(Versioned {
                version: n,
                fail_init: self.broken.load(Ordering::SeqCst),
                seen_config: parking_lot::Mutex::new(None),
            }))
        }

        fn invalidate(&self) {
            self.invalidations.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn setup(config: RuntimeConfig) -> (Arc<HotReloadManager>, Arc<CountingSource>) {
        let runtime = Arc::new(RuntimeContext::new(config));
        runtime
            .plugin_config()
            .set_defaults("greeter", json!({ "greeting": "hello" }));
        runtime.plugin_config().apply("greeter", json!({ "greeting": "hi" }));

        let plugins = Arc::new(PluginManager::new(runtime));
        plugins
            .register(Arc::new(Versioned {
                version: 1,
                fail_init: false,
                seen_config: parking_lot::Mutex::new(None),
            }))
            .unwrap();
        plugins.enable("greeter").await.unwrap();

        let source = Arc::new(CountingSource::new());
        let manager = HotReloadManager::new(plugins);
        manager.watch("greeter", source.clone(), vec![PathBuf::from("greeter.wasm")]);
        (manager, source)
    }

    fn version(manager: &HotReloadManager) -> u32 {
        *manager
            .plugins()
            .runtime()
            .services()
            .get::<u32>("greeter.version")
            .unwrap()
    }

    #[tokio::test]
    async fn test_reload_round_trip() {
        let (manager, source) = setup(RuntimeConfig::default()).await;
        let before = manager.plugins().runtime().plugin_config().get("greeter");

        let report = manager.reload("greeter").await.unwrap();
        assert!(report.is_success());
        assert_eq!(report.attempt, 1);

        let plugins = manager.plugins();
        assert_eq!(plugins.state("greeter"), Some(LifecycleState::Enabled));
        assert_eq!(plugins.descriptor("greeter").unwrap().version.major, 2);
        assert_eq!(version(&manager), 2);
        assert_eq!(plugins.runtime().plugin_config().get("greeter"), before);
        assert_eq!(source.invalidations.load(Ordering::SeqCst), 1);
        assert_eq!(manager.status("greeter"), Some(ReloadPhase::Succeeded));
    }

    #[tokio::test]
    async fn test_failed_init_rolls_back() {
        let (manager, source) = setup(RuntimeConfig::default()).await;
        source.broken.store(true, Ordering::SeqCst);

        let err = manager.reload("greeter").await.unwrap_err();
        assert!(matches!(err, Error::ReloadFailed { rolled_back: true, .. }));

        let plugins = manager.plugins();
        assert_eq!(plugins.state("greeter"), Some(LifecycleState::Enabled));
        assert_eq!(plugins.descriptor("greeter").unwrap().version.major, 1);
        assert_eq!(version(&manager), 1);
        assert_eq!(
            manager.status("greeter"),
            Some(ReloadPhase::Failed { rolled_back: true })
        );
        assert_eq!(manager.reports().len(), 1);
    }

    #[tokio::test]
    async fn test_reload_of_unwatched_plugin() {
        let (manager, _) = setup(RuntimeConfig::default()).await;
        assert!(matches!(
            manager.reload("other").await,
            Err(Error::ReloadFailed { rolled_back: false, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_changes_coalesce() {
        let (manager, source) = setup(RuntimeConfig::new().debounce_ms(300)).await;

        for _ in 0..5 {
            manager.notify_changed(ChangeEvent::new("greeter"));
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(manager.status("greeter"), Some(ReloadPhase::Debouncing));

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(source.loads.load(Ordering::SeqCst), 1);
        assert_eq!(manager.reports().len(), 1);
        assert_eq!(manager.status("greeter"), Some(ReloadPhase::Succeeded));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_hot_reload_ignores_changes() {
        let mut config = RuntimeConfig::default();
        config.hot_reload.enabled = false;
        let (manager, source) = setup(config).await;

        manager.notify_changed(ChangeEvent::new("greeter"));
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(source.loads.load(Ordering::SeqCst), 0);
        assert_eq!(manager.status("greeter"), Some(ReloadPhase::Watching));
    }

    #[tokio::test(start_paused = true)]
    async fn test_change_during_reload_runs_again() {
        let (manager, source) = setup(RuntimeConfig::new().debounce_ms(100)).await;
        source.delay_ms.store(500, Ordering::SeqCst);

        manager.notify_changed(ChangeEvent::new("greeter"));
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(manager.status("greeter"), Some(ReloadPhase::Reloading));

        for _ in 0..3 {
            manager.notify_changed(ChangeEvent::new("greeter"));
        }
        assert_eq!(manager.status("greeter"), Some(ReloadPhase::Reloading));

        tokio::time::sleep(Duration::from_millis(3000)).await;
        assert_eq!(source.loads.load(Ordering::SeqCst), 2);
        assert_eq!(manager.reports().len(), 2);
        assert_eq!(manager.reports()[1].attempt, 2);
        assert_eq!(version(&manager), 3);
        assert_eq!(
            manager.plugins().state("greeter"),
            Some(LifecycleState::Enabled)
        );
        assert_eq!(manager.status("greeter"), Some(ReloadPhase::Succeeded));
    }
}
