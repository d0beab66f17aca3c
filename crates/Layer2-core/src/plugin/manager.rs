//! Plugin Manager - 플러그인 라이프사이클 관리
//!
//! 상태 전이는 모두 여기서 일어난다. 같은 플러그인에 대한 작업은 플러그인별
//! 비동기 락으로 직렬화되고, 서로 다른 플러그인의 작업은 동시에 진행될 수 있다.
//!
//! ## 전이 규칙
//!
//! - `init`: Registered/Disabled/Error -> Initializing -> Initialized
//! - `enable`: Initialized -> Enabling -> Enabled (의존성이 모두 Enabled여야 함)
//! - `disable`: Enabled -> Disabling -> Disabled (훅/서비스/구독 먼저 제거)
//! - `unload`: Registered/Initialized/Disabled/Error -> Unloaded (레지스트리에서 제거)
//!
//! 콜백이 실패하면 플러그인은 Error가 되고, 실패는 ErrorTracker에 기록된다.

use super::condition::{Condition, ConditionContext, ConditionEvaluator};
use super::context::PluginContext;
use super::lifecycle::{LifecycleEvent, LifecycleHistory, LifecyclePhase, LifecycleState};
use super::manifest::PluginDescriptor;
use super::registry::PluginRegistry;
use super::resolver;
use super::traits::{Plugin, PluginCapability};
use crate::hook::lifecycle_hooks;
use crate::runtime::RuntimeContext;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn, Instrument};
use weave_foundation::{Error, ErrorKind, ErrorReport, Result};

/// 조건부 등록 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    Registered(PluginDescriptor),
    /// 조건이 false라서 건너뜀 (에러 아님)
    Skipped(String),
}

/// 일괄 작업 결과
#[derive(Debug, Default)]
pub struct BulkReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, Error)>,
    /// 의존성이 준비되지 않아 건너뛴 플러그인
    pub skipped: Vec<(String, Error)>,
}

impl BulkReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }

    fn record(&mut self, name: String, result: Result<()>) {
        match result {
            Ok(()) => self.succeeded.push(name),
            Err(e @ Error::DependencyUnavailable { .. }) => self.skipped.push((name, e)),
            Err(e) => self.failed.push((name, e)),
        }
    }
}

/// 플러그인 시스템 요약
#[derive(Debug, Clone, Serialize)]
pub struct PluginSummary {
    pub total: usize,
    pub by_state: BTreeMap<String, usize>,
    pub permanently_failed: Vec<String>,
    pub hook_count: usize,
    pub service_count: usize,
    pub subscription_count: usize,
    pub tracked_errors: usize,
}

/// 플러그인 매니저 - 전체 플러그인 시스템 관리
pub struct PluginManager {
    /// 공유 런타임 상태
    runtime: Arc<RuntimeContext>,

    /// 플러그인 레지스트리
    registry: PluginRegistry,

    /// 상태 전이 기록
    history: LifecycleHistory,

    /// 조건부 등록 평가기
    evaluator: RwLock<ConditionEvaluator>,

    /// 플러그인별 작업 락
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl PluginManager {
    /// 새 매니저 생성
    pub fn new(runtime: Arc<RuntimeContext>) -> Self {
        let history = LifecycleHistory::new(runtime.config().lifecycle.history_size);
        let evaluator = ConditionEvaluator::from_config(&runtime.config().conditions);
        Self {
            runtime,
            registry: PluginRegistry::new(),
            history,
            evaluator: RwLock::new(evaluator),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn runtime(&self) -> &Arc<RuntimeContext> {
        &self.runtime
    }

    async fn lock(&self, name: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    // ========================================================================
    // 등록
    // ========================================================================

    /// 플러그인 등록 (Registered 상태)
    pub fn register(&self, plugin: Arc<dyn Plugin>) -> Result<PluginDescriptor> {
        self.registry.register(plugin)
    }

    /// 조건이 참일 때만 등록
    pub fn register_when(
        &self,
        plugin: Arc<dyn Plugin>,
        condition: &Condition,
        ctx: &ConditionContext,
    ) -> Result<RegisterOutcome> {
        if !self.evaluator.read().evaluate(condition, ctx) {
            let name = plugin.descriptor().name;
            info!(plugin = %name, "Condition not met, skipping registration");
            return Ok(RegisterOutcome::Skipped(name));
        }
        self.register(plugin).map(RegisterOutcome::Registered)
    }

    /// 현재 프로세스 환경과 설정의 기능 플래그로 만든 조건 컨텍스트
    pub fn condition_context(&self) -> ConditionContext {
        ConditionContext::from_env(&self.runtime.config().conditions)
    }

    /// 커스텀 조건 술어 등록
    pub fn register_predicate<F>(&self, name: impl Into<String>, predicate: F)
    where
        F: Fn(&Value, &ConditionContext) -> bool + Send + Sync + 'static,
    {
        self.evaluator.write().register_predicate(name, predicate);
    }

    /// 활성화 순서 (의존성 먼저, 동률은 등록 순)
    pub fn resolve_order(&self) -> Result<Vec<String>> {
        resolver::resolve_order(&self.registry.descriptors_in_order())
    }

    // ========================================================================
    // 단일 플러그인 전이
    // ========================================================================

    /// 플러그인 초기화
    pub async fn init(&self, name: &str) -> Result<()> {
        let _guard = self.lock(name).await;
        self.init_locked(name).await
    }

    /// 플러그인 활성화. 초기화 전이면 먼저 초기화한다
    pub async fn enable(&self, name: &str) -> Result<()> {
        let _guard = self.lock(name).await;
        self.enable_locked(name).await
    }

    /// 플러그인 비활성화
    pub async fn disable(&self, name: &str) -> Result<()> {
        let _guard = self.lock(name).await;
        self.disable_locked(name).await
    }

    /// 플러그인 언로드. Enabled면 먼저 비활성화한다
    pub async fn unload(&self, name: &str) -> Result<()> {
        let _guard = self.lock(name).await;
        self.unload_locked(name).await
    }

    /// 콜백 밖에서 감지한 실패로 플러그인을 Error로 표시
    ///
    /// 핫 리로드 롤백이 실패했을 때 쓴다. 콜백은 호출하지 않고, 이미 Error면 그대로 둔다.
    pub async fn mark_failed(&self, name: &str, reason: impl Into<String>) -> Result<()> {
        let _guard = self.lock(name).await;
        let state = self
            .registry
            .state(name)
            .ok_or_else(|| Error::PluginNotFound(name.to_string()))?;
        if state == LifecycleState::Error {
            return Ok(());
        }

        let reason = reason.into();
        error!(plugin = %name, %state, reason = %reason, "Marking plugin as failed");
        self.runtime.remove_contributions(name);
        let from = self.transition(name, LifecycleState::Error, Some(reason))?;
        self.fire(lifecycle_hooks::ERROR, name, from, LifecycleState::Error)
            .await;
        Ok(())
    }

    async fn init_locked(&self, name: &str) -> Result<()> {
        let (plugin, descriptor) = self.entry(name)?;
        let from = self.transition(name, LifecycleState::Initializing, None)?;

        // 이전 활성 구간의 잔여 등록 정리
        self.runtime.remove_contributions(name);

        debug!(plugin = %name, %from, "Initializing plugin");
        let result = if descriptor.capabilities.contains(PluginCapability::Init) {
            let ctx = PluginContext::new(name, self.runtime.clone());
            let span = ctx.span().clone();
            plugin.init(&ctx).instrument(span).await
        } else {
            Ok(())
        };

        match result {
            Ok(()) => {
                self.transition(name, LifecycleState::Initialized, None)?;
                info!(plugin = %name, "Plugin initialized");
                self.fire(
                    lifecycle_hooks::INITIALIZED,
                    name,
                    LifecycleState::Initializing,
                    LifecycleState::Initialized,
                )
                .await;
                Ok(())
            }
            Err(e) => Err(self.fail(name, LifecyclePhase::Init, e).await),
        }
    }

    async fn enable_locked(&self, name: &str) -> Result<()> {
        let (plugin, descriptor) = self.entry(name)?;

        if self.registry.state(name) == Some(LifecycleState::Enabled) {
            return Ok(());
        }

        if self.registry.is_permanently_failed(name) {
            let reason = self
                .registry
                .last_error(name)
                .unwrap_or_else(|| "enable failed".to_string());
            return Err(Error::lifecycle(
                name,
                LifecyclePhase::Enable.to_string(),
                Error::Plugin(format!("permanently failed: {}", reason)),
            ));
        }

        // 의존성은 resolver 순서로 보장되지만 여기서 다시 확인한다
        for dep in &descriptor.dependencies {
            if self.registry.state(dep) != Some(LifecycleState::Enabled) {
                return Err(Error::dependency_unavailable(name, dep.clone()));
            }
        }

        let max_attempts = self.runtime.config().lifecycle.max_enable_attempts.max(1);
        loop {
            if self.registry.state(name) != Some(LifecycleState::Initialized) {
                self.init_locked(name).await?;
            }

            self.transition(name, LifecycleState::Enabling, None)?;
            let result = if descriptor.capabilities.contains(PluginCapability::Enable) {
                plugin
                    .enable()
                    .instrument(tracing::info_span!("plugin", name = %name))
                    .await
            } else {
                Ok(())
            };

            match result {
                Ok(()) => {
                    self.transition(name, LifecycleState::Enabled, None)?;
                    self.registry.reset_enable_failures(name);
                    info!(plugin = %name, "Plugin enabled");
                    self.fire(
                        lifecycle_hooks::ENABLED,
                        name,
                        LifecycleState::Enabling,
                        LifecycleState::Enabled,
                    )
                    .await;
                    return Ok(());
                }
                Err(e) => {
                    let retryable = e.is_retryable();
                    let attempts = self.registry.record_enable_failure(name, e.to_string());
                    let err = self.fail(name, LifecyclePhase::Enable, e).await;
                    if attempts >= max_attempts {
                        self.registry.mark_permanently_failed(name);
                        error!(plugin = %name, attempts, "Plugin permanently failed to enable");
                        return Err(err);
                    }
                    if !retryable {
                        warn!(plugin = %name, attempt = attempts, "Enable error is not retryable");
                        return Err(err);
                    }
                    warn!(plugin = %name, attempt = attempts, max_attempts, "Retrying enable");
                }
            }
        }
    }

    async fn disable_locked(&self, name: &str) -> Result<()> {
        let (plugin, descriptor) = self.entry(name)?;

        match self.registry.state(name) {
            Some(LifecycleState::Enabled) => {}
            Some(LifecycleState::Disabled) => return Ok(()),
            Some(other) => {
                return Err(Error::InvalidTransition {
                    plugin: name.to_string(),
                    from: other.to_string(),
                    to: LifecycleState::Disabling.to_string(),
                })
            }
            None => return Err(Error::PluginNotFound(name.to_string())),
        }

        self.transition(name, LifecycleState::Disabling, None)?;
        let result = if descriptor.capabilities.contains(PluginCapability::Disable) {
            plugin
                .disable()
                .instrument(tracing::info_span!("plugin", name = %name))
                .await
        } else {
            Ok(())
        };

        // Disabled로 표시하기 전에 모든 등록 제거
        let removed = self.runtime.remove_contributions(name);
        debug!(plugin = %name, removed, "Removed plugin contributions");

        match result {
            Ok(()) => {
                self.transition(name, LifecycleState::Disabled, None)?;
                info!(plugin = %name, "Plugin disabled");
                self.fire(
                    lifecycle_hooks::DISABLED,
                    name,
                    LifecycleState::Disabling,
                    LifecycleState::Disabled,
                )
                .await;
                Ok(())
            }
            Err(e) => Err(self.fail(name, LifecyclePhase::Disable, e).await),
        }
    }

    async fn unload_locked(&self, name: &str) -> Result<()> {
        let (plugin, descriptor) = self.entry(name)?;

        if self.registry.state(name) == Some(LifecycleState::Enabled) {
            if let Err(e) = self.disable_locked(name).await {
                warn!(plugin = %name, error = %e, "Disable before unload failed");
            }
        }

        let state = self
            .registry
            .state(name)
            .ok_or_else(|| Error::PluginNotFound(name.to_string()))?;
        if !state.can_transition_to(LifecycleState::Unloaded) {
            return Err(Error::InvalidTransition {
                plugin: name.to_string(),
                from: state.to_string(),
                to: LifecycleState::Unloaded.to_string(),
            });
        }

        if descriptor.capabilities.contains(PluginCapability::Destroy) {
            let result = plugin
                .destroy()
                .instrument(tracing::info_span!("plugin", name = %name))
                .await;
            if let Err(e) = result {
                // destroy 실패는 언로드를 막지 않는다
                let err = Error::lifecycle(name, LifecyclePhase::Destroy.to_string(), e);
                warn!(plugin = %name, error = %err, "Destroy callback failed");
                self.track(name, LifecyclePhase::Destroy, &err);
            }
        }

        self.runtime.remove_contributions(name);
        let from = self.transition(name, LifecycleState::Unloaded, None)?;
        self.registry.unregister(name);
        info!(plugin = %name, "Plugin unloaded");

        self.fire(lifecycle_hooks::UNLOADED, name, from, LifecycleState::Unloaded)
            .await;
        Ok(())
    }

    // ========================================================================
    // 일괄 작업
    // ========================================================================

    /// Registered 상태인 모든 플러그인 초기화 (의존성 순)
    ///
    /// 순환이 있으면 어떤 전이도 하지 않고 에러를 반환한다.
    pub async fn init_all(&self) -> Result<BulkReport> {
        let order = self.resolve_order()?;
        let mut report = BulkReport::default();
        let mut unavailable: HashSet<String> = HashSet::new();

        for name in order {
            let Some(descriptor) = self.registry.descriptor(&name) else {
                continue;
            };

            let missing = descriptor.dependencies.iter().find(|dep| {
                unavailable.contains(*dep)
                    || matches!(self.registry.state(dep), None | Some(LifecycleState::Error))
            });
            if let Some(dep) = missing {
                warn!(plugin = %name, dependency = %dep, "Skipping init, dependency unavailable");
                unavailable.insert(name.clone());
                report.record(name.clone(), Err(Error::dependency_unavailable(&name, dep.clone())));
                continue;
            }

            if self.registry.state(&name) != Some(LifecycleState::Registered) {
                continue;
            }

            let result = self.init(&name).await;
            if result.is_err() {
                unavailable.insert(name.clone());
            }
            report.record(name, result);
        }

        Ok(report)
    }

    /// 모든 플러그인 활성화 (의존성 순)
    ///
    /// 실패한 플러그인에 의존하는 플러그인은 `DependencyUnavailable`로 건너뛴다.
    pub async fn enable_all(&self) -> Result<BulkReport> {
        let order = self.resolve_order()?;
        let mut report = BulkReport::default();

        for name in order {
            if self.registry.state(&name) == Some(LifecycleState::Enabled) {
                continue;
            }
            let result = self.enable(&name).await;
            if let Err(e @ Error::DependencyUnavailable { .. }) = &result {
                warn!(plugin = %name, error = %e, "Skipping enable");
            }
            report.record(name, result);
        }

        Ok(report)
    }

    /// Enabled 상태인 모든 플러그인 비활성화 (의존성 역순)
    pub async fn disable_all(&self) -> BulkReport {
        let mut report = BulkReport::default();
        for name in self.teardown_order() {
            if self.registry.state(&name) == Some(LifecycleState::Enabled) {
                let result = self.disable(&name).await;
                report.record(name, result);
            }
        }
        report
    }

    /// 모든 플러그인 비활성화 후 언로드 (의존성 역순)
    pub async fn shutdown(&self) -> BulkReport {
        let mut report = self.disable_all().await;
        for name in self.teardown_order() {
            let result = self.unload(&name).await;
            if let Err(e) = result {
                report.failed.push((name, e));
            }
        }
        info!(remaining = self.registry.len(), "Plugin runtime shut down");
        report
    }

    fn teardown_order(&self) -> Vec<String> {
        let mut order = self.resolve_order().unwrap_or_else(|_| {
            self.registry
                .descriptors_in_order()
                .into_iter()
                .map(|d| d.name)
                .collect()
        });
        order.reverse();
        order
    }

    // ========================================================================
    // 설정
    // ========================================================================

    /// 외부 설정 교체 후 `on_config_change`로 새 유효 설정 전달
    pub async fn update_config(&self, name: &str, overrides: Value) -> Result<Value> {
        if !self.registry.contains(name) {
            return Err(Error::PluginNotFound(name.to_string()));
        }
        let effective = self.runtime.plugin_config().apply(name, overrides);
        self.deliver_config(name, &effective).await?;
        Ok(effective)
    }

    /// 설정 파일을 다시 읽고, 유효 설정이 바뀐 플러그인에 전달
    pub async fn reload_config_file(&self) -> Result<Vec<String>> {
        let changed = self.runtime.plugin_config().reload_file()?;
        for name in &changed {
            if !self.registry.contains(name) {
                continue;
            }
            let effective = self.runtime.plugin_config().get(name);
            if let Err(e) = self.deliver_config(name, &effective).await {
                warn!(plugin = %name, error = %e, "Config change delivery failed");
            }
        }
        Ok(changed)
    }

    /// 설정 변경 전달. 실패해도 상태는 바뀌지 않는다
    async fn deliver_config(&self, name: &str, config: &Value) -> Result<()> {
        let _guard = self.lock(name).await;
        let (plugin, descriptor) = self.entry(name)?;

        let live = self.registry.state(name).map(|s| s.is_live()).unwrap_or(false);
        if !live || !descriptor.capabilities.contains(PluginCapability::ConfigChange) {
            return Ok(());
        }

        plugin
            .on_config_change(config)
            .instrument(tracing::info_span!("plugin", name = %name))
            .await
            .map_err(|e| {
                let err = Error::lifecycle(name, LifecyclePhase::ConfigChange.to_string(), e);
                warn!(plugin = %name, error = %err, "Config change callback failed");
                self.track(name, LifecyclePhase::ConfigChange, &err);
                err
            })
    }

    // ========================================================================
    // 조회
    // ========================================================================

    pub fn state(&self, name: &str) -> Option<LifecycleState> {
        self.registry.state(name)
    }

    pub fn plugin(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.registry.get(name)
    }

    pub fn descriptor(&self, name: &str) -> Option<PluginDescriptor> {
        self.registry.descriptor(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.registry.contains(name)
    }

    pub fn is_permanently_failed(&self, name: &str) -> bool {
        self.registry.is_permanently_failed(name)
    }

    /// 등록 순서대로 (이름, 상태)
    pub fn plugins(&self) -> Vec<(String, LifecycleState)> {
        self.registry.states_in_order()
    }

    /// 이 플러그인에 의존하는 플러그인들
    pub fn dependents_of(&self, name: &str) -> Vec<String> {
        self.registry.dependents_of(name)
    }

    pub fn history(&self) -> Vec<LifecycleEvent> {
        self.history.all()
    }

    pub fn history_for(&self, name: &str) -> Vec<LifecycleEvent> {
        self.history.events_for(name)
    }

    pub fn plugin_count(&self) -> usize {
        self.registry.len()
    }

    /// 플러그인 요약 정보
    pub fn summary(&self) -> PluginSummary {
        let plugins = self.registry.states_in_order();
        let mut by_state = BTreeMap::new();
        for (_, state) in &plugins {
            *by_state.entry(state.to_string()).or_insert(0) += 1;
        }

        PluginSummary {
            total: plugins.len(),
            by_state,
            permanently_failed: plugins
                .iter()
                .filter(|(name, _)| self.registry.is_permanently_failed(name))
                .map(|(name, _)| name.clone())
                .collect(),
            hook_count: self.runtime.hooks().len(),
            service_count: self.runtime.services().len(),
            subscription_count: self.runtime.events().len(),
            tracked_errors: self.runtime.tracker().len(),
        }
    }

    // ========================================================================
    // 내부 헬퍼
    // ========================================================================

    fn entry(&self, name: &str) -> Result<(Arc<dyn Plugin>, PluginDescriptor)> {
        match (self.registry.get(name), self.registry.descriptor(name)) {
            (Some(plugin), Some(descriptor)) => Ok((plugin, descriptor)),
            _ => Err(Error::PluginNotFound(name.to_string())),
        }
    }

    fn transition(
        &self,
        name: &str,
        to: LifecycleState,
        error: Option<String>,
    ) -> Result<LifecycleState> {
        let from = self.registry.set_state(name, to)?;
        self.history.record(LifecycleEvent {
            plugin: name.to_string(),
            from,
            to,
            at: Utc::now(),
            error,
        });
        Ok(from)
    }

    /// 콜백 실패 처리: 등록 제거, Error 전이, 추적, 훅 발행
    async fn fail(&self, name: &str, phase: LifecyclePhase, source: Error) -> Error {
        let err = Error::lifecycle(name, phase.to_string(), source);
        error!(plugin = %name, %phase, error = %err, "Lifecycle callback failed");

        self.runtime.remove_contributions(name);
        self.track(name, phase, &err);

        match self.transition(name, LifecycleState::Error, Some(err.to_string())) {
            Ok(from) => {
                self.fire(lifecycle_hooks::ERROR, name, from, LifecycleState::Error)
                    .await;
            }
            Err(e) => warn!(plugin = %name, error = %e, "Could not mark plugin as failed"),
        }
        err
    }

    fn track(&self, name: &str, phase: LifecyclePhase, err: &Error) {
        self.runtime.tracker().capture(
            ErrorReport::from_error(ErrorKind::Lifecycle, err)
                .plugin(name)
                .frame(format!("lifecycle:{}", phase)),
        );
    }

    /// 라이프사이클 훅 발행. 핸들러 실패는 로그만 남긴다
    async fn fire(&self, hook: &str, name: &str, from: LifecycleState, to: LifecycleState) {
        let payload = json!({ "plugin": name, "from": from, "to": to });
        if let Err(e) = self.runtime.hooks().dispatch(hook, payload).await {
            warn!(hook = %hook, plugin = %name, error = %e, "Lifecycle hook failed");
        }
    }
}
