//! Hook Bus - 훅 등록과 디스패치
//!
//! 등록/해제는 쓰기 락 안에서 한 번에 적용되고, 디스패치는 읽기 락으로
//! 핸들러 목록 스냅샷을 떠서 락 밖에서 실행한다. 따라서 진행 중인 디스패치는
//! 변경 전 또는 변경 후 테이블만 본다.

use super::types::{HookHandler, HookMode, HookOptions, HookOutcome, HookRegistration};
use futures::future::join_all;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use weave_foundation::{Error, ErrorKind, ErrorReport, ErrorTracker, HookFailure, Result};

/// 훅 이름 하나에 대한 핸들러 목록
struct HookSlot {
    mode: HookMode,
    /// 우선순위 내림차순, 같은 우선순위는 등록 순
    handlers: Vec<Arc<HookRegistration>>,
}

impl HookSlot {
    fn sort(&mut self) {
        self.handlers
            .sort_by(|a, b| b.priority.cmp(&a.priority).then(a.seq.cmp(&b.seq)));
    }
}

/// 훅 버스
pub struct HookBus {
    slots: RwLock<HashMap<String, HookSlot>>,
    next_seq: AtomicU64,
    tracker: Arc<ErrorTracker>,
}

impl HookBus {
    pub fn new(tracker: Arc<ErrorTracker>) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
            tracker,
        }
    }

    // ========================================================================
    // 등록
    // ========================================================================

    /// 핸들러 등록
    ///
    /// 같은 (hook, owner)가 이미 있으면 기존 핸들러를 교체한다.
    /// 훅의 모드와 다른 모드로 등록하면 `HookModeMismatch`.
    pub fn register(
        &self,
        hook: impl Into<String>,
        owner: impl Into<String>,
        handler: HookHandler,
        options: HookOptions,
    ) -> Result<()> {
        let hook = hook.into();
        let owner = owner.into();

        let mut slots = self.slots.write();
        let slot = slots.entry(hook.clone()).or_insert_with(|| HookSlot {
            mode: options.mode,
            handlers: Vec::new(),
        });

        if slot.mode != options.mode {
            let existing = slot.mode;
            if slot.handlers.is_empty() {
                slots.remove(&hook);
            }
            return Err(Error::HookModeMismatch {
                hook,
                existing: existing.to_string(),
                requested: options.mode.to_string(),
            });
        }

        let position = slot.handlers.iter().position(|r| r.owner == owner);
        let seq = match position {
            Some(i) => slot.handlers[i].seq,
            None => self.next_seq.fetch_add(1, Ordering::Relaxed),
        };

        let registration = Arc::new(HookRegistration {
            hook: hook.clone(),
            owner: owner.clone(),
            priority: options.priority,
            mode: options.mode,
            handler,
            seq,
        });

        match position {
            Some(i) => {
                slot.handlers[i] = registration;
                debug!(hook = %hook, owner = %owner, "Replaced hook handler");
            }
            None => {
                slot.handlers.push(registration);
                debug!(hook = %hook, owner = %owner, priority = options.priority, mode = %options.mode, "Registered hook handler");
            }
        }
        slot.sort();
        Ok(())
    }

    /// (hook, owner) 핸들러 해제
    pub fn unregister(&self, hook: &str, owner: &str) -> bool {
        let mut slots = self.slots.write();
        let Some(slot) = slots.get_mut(hook) else {
            return false;
        };

        let before = slot.handlers.len();
        slot.handlers.retain(|r| r.owner != owner);
        let removed = slot.handlers.len() != before;
        if slot.handlers.is_empty() {
            slots.remove(hook);
        }
        removed
    }

    /// 플러그인이 등록한 모든 핸들러 해제. 해제된 개수 반환
    pub fn remove_owner(&self, owner: &str) -> usize {
        let mut slots = self.slots.write();
        let mut removed = 0;
        slots.retain(|_, slot| {
            let before = slot.handlers.len();
            slot.handlers.retain(|r| r.owner != owner);
            removed += before - slot.handlers.len();
            !slot.handlers.is_empty()
        });
        if removed > 0 {
            debug!(owner = %owner, removed, "Removed hook handlers");
        }
        removed
    }

    // ========================================================================
    // 조회
    // ========================================================================

    /// 훅의 모드 (등록된 핸들러가 없으면 None)
    pub fn mode(&self, hook: &str) -> Option<HookMode> {
        self.slots.read().get(hook).map(|slot| slot.mode)
    }

    /// 실행 순서대로 (owner, priority) 목록
    pub fn handlers(&self, hook: &str) -> Vec<(String, i32)> {
        self.slots
            .read()
            .get(hook)
            .map(|slot| {
                slot.handlers
                    .iter()
                    .map(|r| (r.owner.clone(), r.priority))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// 플러그인이 등록한 훅 이름들
    pub fn hooks_of(&self, owner: &str) -> Vec<String> {
        let mut hooks: Vec<_> = self
            .slots
            .read()
            .iter()
            .filter(|(_, slot)| slot.handlers.iter().any(|r| r.owner == owner))
            .map(|(name, _)| name.clone())
            .collect();
        hooks.sort();
        hooks
    }

    /// 전체 등록 수
    pub fn len(&self) -> usize {
        self.slots.read().values().map(|s| s.handlers.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self, hook: &str) -> Option<(HookMode, Vec<Arc<HookRegistration>>)> {
        self.slots
            .read()
            .get(hook)
            .map(|slot| (slot.mode, slot.handlers.clone()))
    }

    // ========================================================================
    // 디스패치
    // ========================================================================

    /// 훅의 모드로 디스패치
    pub async fn dispatch(&self, hook: &str, payload: Value) -> Result<HookOutcome> {
        let Some((mode, handlers)) = self.snapshot(hook) else {
            return Ok(HookOutcome::NoHandlers);
        };

        debug!(hook = %hook, mode = %mode, handlers = handlers.len(), "Dispatching hook");
        match mode {
            HookMode::Sequential => self.run_sequential(hook, &handlers, payload).await,
            HookMode::Parallel => self.run_parallel(hook, &handlers, payload).await,
            HookMode::Bail => self
                .run_bail(hook, &handlers, payload)
                .await
                .map(HookOutcome::Bailed),
            HookMode::Waterfall => self
                .run_waterfall(hook, &handlers, payload)
                .await
                .map(HookOutcome::Transformed),
        }
    }

    /// bail 훅 디스패치. 핸들러가 없으면 None
    pub async fn dispatch_bail(&self, hook: &str, payload: Value) -> Result<Option<Value>> {
        match self.snapshot(hook) {
            None => Ok(None),
            Some((HookMode::Bail, handlers)) => self.run_bail(hook, &handlers, payload).await,
            Some((mode, _)) => Err(mode_mismatch(hook, mode, HookMode::Bail)),
        }
    }

    /// waterfall 훅 디스패치. 핸들러가 없으면 입력을 그대로 반환
    pub async fn dispatch_waterfall(&self, hook: &str, payload: Value) -> Result<Value> {
        match self.snapshot(hook) {
            None => Ok(payload),
            Some((HookMode::Waterfall, handlers)) => {
                self.run_waterfall(hook, &handlers, payload).await
            }
            Some((mode, _)) => Err(mode_mismatch(hook, mode, HookMode::Waterfall)),
        }
    }

    async fn run_sequential(
        &self,
        hook: &str,
        handlers: &[Arc<HookRegistration>],
        payload: Value,
    ) -> Result<HookOutcome> {
        let mut results = Vec::with_capacity(handlers.len());
        let mut failures = Vec::new();

        for registration in handlers {
            match (registration.handler)(payload.clone()).await {
                Ok(value) => results.push(value),
                Err(e) => {
                    failures.push(self.record_failure(hook, registration, &e));
                    results.push(None);
                }
            }
        }

        collect(hook, results, failures)
    }

    async fn run_parallel(
        &self,
        hook: &str,
        handlers: &[Arc<HookRegistration>],
        payload: Value,
    ) -> Result<HookOutcome> {
        let futures = handlers
            .iter()
            .map(|registration| (registration.handler)(payload.clone()));
        let outputs = join_all(futures).await;

        let mut results = Vec::with_capacity(outputs.len());
        let mut failures = Vec::new();
        for (registration, output) in handlers.iter().zip(outputs) {
            match output {
                Ok(value) => results.push(value),
                Err(e) => {
                    failures.push(self.record_failure(hook, registration, &e));
                    results.push(None);
                }
            }
        }

        collect(hook, results, failures)
    }

    async fn run_bail(
        &self,
        hook: &str,
        handlers: &[Arc<HookRegistration>],
        payload: Value,
    ) -> Result<Option<Value>> {
        for registration in handlers {
            match (registration.handler)(payload.clone()).await {
                Ok(Some(value)) => {
                    debug!(hook = %hook, owner = %registration.owner, "Hook bailed");
                    return Ok(Some(value));
                }
                Ok(None) => continue,
                Err(e) => {
                    let failure = self.record_failure(hook, registration, &e);
                    return Err(Error::HookDispatch {
                        hook: hook.to_string(),
                        failures: vec![failure],
                    });
                }
            }
        }
        Ok(None)
    }

    async fn run_waterfall(
        &self,
        hook: &str,
        handlers: &[Arc<HookRegistration>],
        payload: Value,
    ) -> Result<Value> {
        let mut current = payload;
        for registration in handlers {
            match (registration.handler)(current.clone()).await {
                Ok(Some(next)) => current = next,
                Ok(None) => {}
                Err(e) => {
                    let failure = self.record_failure(hook, registration, &e);
                    return Err(Error::HookDispatch {
                        hook: hook.to_string(),
                        failures: vec![failure],
                    });
                }
            }
        }
        Ok(current)
    }

    fn record_failure(&self, hook: &str, registration: &HookRegistration, err: &Error) -> HookFailure {
        warn!(hook = %hook, owner = %registration.owner, error = %err, "Hook handler failed");
        self.tracker.capture(
            ErrorReport::from_error(ErrorKind::Hook, err)
                .plugin(registration.owner.clone())
                .frame(format!("hook:{}", hook)),
        );
        HookFailure {
            plugin: registration.owner.clone(),
            message: err.to_string(),
        }
    }
}

fn collect(
    hook: &str,
    results: Vec<Option<Value>>,
    failures: Vec<HookFailure>,
) -> Result<HookOutcome> {
    if failures.is_empty() {
        Ok(HookOutcome::Collected(results))
    } else {
        Err(Error::HookDispatch {
            hook: hook.to_string(),
            failures,
        })
    }
}

fn mode_mismatch(hook: &str, existing: HookMode, requested: HookMode) -> Error {
    Error::HookModeMismatch {
        hook: hook.to_string(),
        existing: existing.to_string(),
        requested: requested.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hook::hook_handler;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;

    fn bus() -> HookBus {
        HookBus::new(Arc::new(ErrorTracker::default()))
    }

    fn constant(value: Option<Value>) -> HookHandler {
        hook_handler(move |_| {
            let value = value.clone();
            async move { Ok(value) }
        })
    }

    fn failing(message: &'static str) -> HookHandler {
        hook_handler(move |_| async move { Err(Error::Plugin(message.to_string())) })
    }

    #[tokio::test]
    async fn test_priority_then_registration_order() {
        let bus = bus();
        let log = Arc::new(Mutex::new(Vec::new()));

        for (owner, priority) in [("low", 0), ("high", 10), ("low2", 0)] {
            let log = log.clone();
            let handler = hook_handler(move |_| {
                let log = log.clone();
                async move {
                    log.lock().push(owner);
                    Ok(None)
                }
            });
            bus.register("app:start", owner, handler, HookOptions::sequential().with_priority(priority))
                .unwrap();
        }

        bus.dispatch("app:start", Value::Null).await.unwrap();
        assert_eq!(*log.lock(), vec!["high", "low", "low2"]);
    }

    #[tokio::test]
    async fn test_sequential_runs_all_and_aggregates() {
        let bus = bus();
        let ran = Arc::new(AtomicUsize::new(0));

        bus.register("h", "a", failing("first"), HookOptions::sequential().with_priority(2))
            .unwrap();
        let counter = ran.clone();
        bus.register(
            "h",
            "b",
            hook_handler(move |_| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(None)
                }
            }),
            HookOptions::sequential().with_priority(1),
        )
        .unwrap();
        bus.register("h", "c", failing("third"), HookOptions::sequential())
            .unwrap();

        let err = bus.dispatch("h", Value::Null).await.unwrap_err();
        match err {
            Error::HookDispatch { failures, .. } => {
                let owners: Vec<_> = failures.iter().map(|f| f.plugin.as_str()).collect();
                assert_eq!(owners, vec!["a", "c"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(bus.tracker.len(), 2);
    }

    #[tokio::test]
    async fn test_parallel_collects_results() {
        let bus = bus();
        bus.register("p", "a", constant(Some(Value::from(1))), HookOptions::parallel())
            .unwrap();
        bus.register("p", "b", failing("nope"), HookOptions::parallel())
            .unwrap();
        bus.register("p", "c", constant(Some(Value::from(3))), HookOptions::parallel())
            .unwrap();

        let err = bus.dispatch("p", Value::Null).await.unwrap_err();
        assert!(matches!(err, Error::HookDispatch { ref failures, .. } if failures.len() == 1));

        bus.unregister("p", "b");
        let outcome = bus.dispatch("p", Value::Null).await.unwrap();
        assert_eq!(
            outcome,
            HookOutcome::Collected(vec![Some(Value::from(1)), Some(Value::from(3))])
        );
    }

    #[tokio::test]
    async fn test_bail_stops_at_first_value() {
        let bus = bus();
        let h3_called = Arc::new(AtomicUsize::new(0));

        bus.register("resolve", "h1", constant(None), HookOptions::bail().with_priority(3))
            .unwrap();
        bus.register(
            "resolve",
            "h2",
            constant(Some(Value::from("X"))),
            HookOptions::bail().with_priority(2),
        )
        .unwrap();
        let counter = h3_called.clone();
        bus.register(
            "resolve",
            "h3",
            hook_handler(move |_| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(Some(Value::from("Y")))
                }
            }),
            HookOptions::bail().with_priority(1),
        )
        .unwrap();

        let result = bus.dispatch_bail("resolve", Value::Null).await.unwrap();
        assert_eq!(result, Some(Value::from("X")));
        assert_eq!(h3_called.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_bail_aborts_on_error() {
        let bus = bus();
        bus.register("b", "bad", failing("boom"), HookOptions::bail().with_priority(1))
            .unwrap();
        bus.register("b", "good", constant(Some(Value::from(1))), HookOptions::bail())
            .unwrap();

        assert!(bus.dispatch_bail("b", Value::Null).await.is_err());
    }

    #[tokio::test]
    async fn test_waterfall_transforms() {
        let bus = bus();
        bus.register(
            "num",
            "double",
            hook_handler(|v| async move { Ok(v.as_i64().map(|n| Value::from(n * 2))) }),
            HookOptions::waterfall().with_priority(2),
        )
        .unwrap();
        bus.register(
            "num",
            "increment",
            hook_handler(|v| async move { Ok(v.as_i64().map(|n| Value::from(n + 1))) }),
            HookOptions::waterfall().with_priority(1),
        )
        .unwrap();

        let result = bus.dispatch_waterfall("num", Value::from(3)).await.unwrap();
        assert_eq!(result, Value::from(7));
    }

    #[tokio::test]
    async fn test_waterfall_none_passes_value_through() {
        let bus = bus();
        bus.register("w", "noop", constant(None), HookOptions::waterfall())
            .unwrap();
        let result = bus.dispatch_waterfall("w", Value::from("same")).await.unwrap();
        assert_eq!(result, Value::from("same"));

        let empty = bus.dispatch_waterfall("unknown", Value::from(1)).await.unwrap();
        assert_eq!(empty, Value::from(1));
    }

    #[tokio::test]
    async fn test_reregistration_replaces_handler() {
        let bus = bus();
        bus.register("r", "a", constant(Some(Value::from(1))), HookOptions::bail())
            .unwrap();
        bus.register("r", "b", constant(Some(Value::from(2))), HookOptions::bail())
            .unwrap();
        bus.register("r", "a", constant(Some(Value::from(10))), HookOptions::bail())
            .unwrap();

        assert_eq!(bus.len(), 2);
        let handlers: Vec<_> = bus.handlers("r").into_iter().map(|(o, _)| o).collect();
        assert_eq!(handlers, vec!["a", "b"]);
        assert_eq!(
            bus.dispatch_bail("r", Value::Null).await.unwrap(),
            Some(Value::from(10))
        );
    }

    #[test]
    fn test_mode_fixed_at_first_registration() {
        let bus = bus();
        bus.register("m", "a", constant(None), HookOptions::bail()).unwrap();
        let err = bus
            .register("m", "b", constant(None), HookOptions::waterfall())
            .unwrap_err();
        assert!(matches!(err, Error::HookModeMismatch { .. }));
        assert_eq!(bus.mode("m"), Some(HookMode::Bail));

        // 핸들러가 모두 빠지면 모드도 잊는다
        bus.remove_owner("a");
        assert_eq!(bus.mode("m"), None);
        bus.register("m", "b", constant(None), HookOptions::waterfall())
            .unwrap();
        assert_eq!(bus.mode("m"), Some(HookMode::Waterfall));
    }

    #[tokio::test]
    async fn test_dispatch_mode_mismatch() {
        let bus = bus();
        bus.register("s", "a", constant(None), HookOptions::sequential())
            .unwrap();
        assert!(matches!(
            bus.dispatch_bail("s", Value::Null).await,
            Err(Error::HookModeMismatch { .. })
        ));
    }

    #[test]
    fn test_remove_owner() {
        let bus = bus();
        bus.register("x", "p", constant(None), HookOptions::default()).unwrap();
        bus.register("y", "p", constant(None), HookOptions::bail()).unwrap();
        bus.register("y", "q", constant(None), HookOptions::bail()).unwrap();

        assert_eq!(bus.hooks_of("p"), vec!["x", "y"]);
        assert_eq!(bus.remove_owner("p"), 2);
        assert_eq!(bus.len(), 1);
        assert!(bus.hooks_of("p").is_empty());
    }
}
