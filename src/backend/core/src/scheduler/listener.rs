//! Listener contracts and the ListenerRegistry (§4.3, §4.4).
//!
//! Each category (job/trigger/scheduler) is split into *global* and
//! *internal* sublists; internal lists carry the reserved listeners
//! installed at construction (`ExecutionTracker`, `ErrorLogger`). Iteration
//! always happens over a stable snapshot taken under the list's lock so no
//! lock is held across user code, matching the rest of this codebase's
//! shared-resource policy.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::dispatcher::InstructionCode;
use super::execution::{ExecutionTracker, JobExecutionContext};
use super::job::JobKey;
use super::trigger::TriggerKey;
use crate::error::{ApexError, Result};

/// Callbacks fired around a single job body's invocation.
#[async_trait]
pub trait JobListener: Send + Sync {
    fn name(&self) -> &str;

    async fn job_to_be_executed(&self, ctx: &JobExecutionContext) {
        let _ = ctx;
    }

    async fn job_execution_vetoed(&self, ctx: &JobExecutionContext) {
        let _ = ctx;
    }

    async fn job_was_executed(&self, ctx: &JobExecutionContext, error: Option<&ApexError>) {
        let _ = (ctx, error);
    }
}

/// Callbacks fired around a trigger's own lifecycle.
#[async_trait]
pub trait TriggerListener: Send + Sync {
    fn name(&self) -> &str;

    /// Return `true` to veto the execution (job body is not invoked).
    async fn trigger_fired(&self, ctx: &JobExecutionContext) -> bool {
        let _ = ctx;
        false
    }

    async fn trigger_misfired(&self, trigger_key: &TriggerKey) {
        let _ = trigger_key;
    }

    async fn trigger_complete(&self, ctx: &JobExecutionContext, instruction: InstructionCode) {
        let _ = (ctx, instruction);
    }
}

/// Events about the scheduler itself, not a specific job/trigger.
#[async_trait]
pub trait SchedulerListener: Send + Sync {
    async fn scheduler_started(&self) {}
    async fn scheduler_in_standby_mode(&self) {}
    async fn scheduler_shutting_down(&self) {}
    async fn scheduler_shutdown(&self) {}
    async fn job_added(&self, job_key: &JobKey) {
        let _ = job_key;
    }
    async fn job_scheduled(&self, trigger_key: &TriggerKey) {
        let _ = trigger_key;
    }
    async fn job_unscheduled(&self, trigger_key: &TriggerKey) {
        let _ = trigger_key;
    }
    async fn scheduler_error(&self, message: &str, error: &ApexError) {
        let _ = (message, error);
    }
}

struct NamedList<T: ?Sized> {
    global: Vec<Arc<T>>,
    internal: Vec<Arc<T>>,
}

impl<T: ?Sized> Default for NamedList<T> {
    fn default() -> Self {
        Self {
            global: Vec::new(),
            internal: Vec::new(),
        }
    }
}

/// Global/internal lists of job-, trigger-, and scheduler-listeners.
///
/// The `ExecutionTracker` job listener and the `ErrorLogger` scheduler
/// listener are installed into the internal sublists at construction.
pub struct ListenerRegistry {
    job_listeners: RwLock<NamedList<dyn JobListener>>,
    trigger_listeners: RwLock<NamedList<dyn TriggerListener>>,
    scheduler_listeners: RwLock<Vec<Arc<dyn SchedulerListener>>>,
    scheduler_listeners_internal: RwLock<Vec<Arc<dyn SchedulerListener>>>,
}

impl ListenerRegistry {
    pub fn new(tracker: Arc<ExecutionTracker>) -> Self {
        Self {
            job_listeners: RwLock::new(NamedList {
                global: Vec::new(),
                internal: vec![Arc::new(ExecutionTrackerListener(tracker))],
            }),
            trigger_listeners: RwLock::new(NamedList::default()),
            scheduler_listeners: RwLock::new(Vec::new()),
            scheduler_listeners_internal: RwLock::new(vec![Arc::new(ErrorLoggerListener)]),
        }
    }

    // ── job listeners ──────────────────────────────────────────────────

    pub async fn add_job_listener(&self, listener: Arc<dyn JobListener>) -> Result<()> {
        Self::add_named(&self.job_listeners, listener, false).await
    }

    pub async fn remove_job_listener(&self, name: &str) -> bool {
        Self::remove_named(&self.job_listeners, name).await
    }

    pub async fn job_listeners_snapshot(&self) -> Vec<Arc<dyn JobListener>> {
        let list = self.job_listeners.read().await;
        list.global.iter().chain(list.internal.iter()).cloned().collect()
    }

    // ── trigger listeners ──────────────────────────────────────────────

    pub async fn add_trigger_listener(&self, listener: Arc<dyn TriggerListener>) -> Result<()> {
        Self::add_named(&self.trigger_listeners, listener, false).await
    }

    pub async fn remove_trigger_listener(&self, name: &str) -> bool {
        Self::remove_named(&self.trigger_listeners, name).await
    }

    pub async fn trigger_listeners_snapshot(&self) -> Vec<Arc<dyn TriggerListener>> {
        let list = self.trigger_listeners.read().await;
        list.global.iter().chain(list.internal.iter()).cloned().collect()
    }

    // ── scheduler listeners (positional, not name-keyed) ───────────────

    pub async fn add_scheduler_listener(&self, listener: Arc<dyn SchedulerListener>) {
        self.scheduler_listeners.write().await.push(listener);
    }

    pub async fn scheduler_listeners_snapshot(&self) -> Vec<Arc<dyn SchedulerListener>> {
        let internal = self.scheduler_listeners_internal.read().await.clone();
        let global = self.scheduler_listeners.read().await.clone();
        global.into_iter().chain(internal).collect()
    }

    async fn add_named<T: ?Sized + Named>(
        list: &RwLock<NamedList<T>>,
        listener: Arc<T>,
        internal: bool,
    ) -> Result<()> {
        if listener.name().is_empty() {
            return Err(ApexError::scheduler_invalid_argument(
                "listener name must be non-empty",
            ));
        }
        let mut guard = list.write().await;
        let target = if internal {
            &mut guard.internal
        } else {
            &mut guard.global
        };
        if target.iter().any(|l| l.name() == listener.name()) {
            return Err(ApexError::scheduler_already_exists("listener", listener.name()));
        }
        target.push(listener);
        Ok(())
    }

    async fn remove_named<T: ?Sized + Named>(list: &RwLock<NamedList<T>>, name: &str) -> bool {
        let mut guard = list.write().await;
        let before = guard.global.len();
        guard.global.retain(|l| l.name() != name);
        before != guard.global.len()
    }
}

trait Named {
    fn name(&self) -> &str;
}

impl Named for dyn JobListener {
    fn name(&self) -> &str {
        JobListener::name(self)
    }
}

impl Named for dyn TriggerListener {
    fn name(&self) -> &str {
        TriggerListener::name(self)
    }
}

/// Reserved internal job listener bridging dispatch events to the tracker.
struct ExecutionTrackerListener(Arc<ExecutionTracker>);

#[async_trait]
impl JobListener for ExecutionTrackerListener {
    fn name(&self) -> &str {
        "ExecutionTracker"
    }

    async fn job_to_be_executed(&self, ctx: &JobExecutionContext) {
        self.0.job_to_be_executed(ctx.clone()).await;
    }

    async fn job_was_executed(&self, ctx: &JobExecutionContext, _error: Option<&ApexError>) {
        self.0.job_was_executed(ctx.fire_instance_id).await;
    }
}

/// Reserved internal scheduler listener that logs `SchedulerError` events.
pub struct ErrorLoggerListener;

#[async_trait]
impl SchedulerListener for ErrorLoggerListener {
    async fn scheduler_error(&self, message: &str, error: &ApexError) {
        error.log();
        tracing::warn!(message, code = %error.code(), "scheduler error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NamedJobListener(&'static str);

    #[async_trait]
    impl JobListener for NamedJobListener {
        fn name(&self) -> &str {
            self.0
        }
    }

    #[tokio::test]
    async fn execution_tracker_listener_installed_internal() {
        let tracker = Arc::new(ExecutionTracker::new());
        let registry = ListenerRegistry::new(tracker);
        let snapshot = registry.job_listeners_snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].name(), "ExecutionTracker");
    }

    #[tokio::test]
    async fn error_logger_installed_internal() {
        let tracker = Arc::new(ExecutionTracker::new());
        let registry = ListenerRegistry::new(tracker);
        let snapshot = registry.scheduler_listeners_snapshot().await;
        assert_eq!(snapshot.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_job_listener_name_rejected() {
        let tracker = Arc::new(ExecutionTracker::new());
        let registry = ListenerRegistry::new(tracker);
        registry
            .add_job_listener(Arc::new(NamedJobListener("a")))
            .await
            .unwrap();
        let err = registry
            .add_job_listener(Arc::new(NamedJobListener("a")))
            .await
            .unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::SchedulerObjectAlreadyExists);
    }

    #[tokio::test]
    async fn empty_listener_name_rejected() {
        let tracker = Arc::new(ExecutionTracker::new());
        let registry = ListenerRegistry::new(tracker);
        let err = registry
            .add_job_listener(Arc::new(NamedJobListener("")))
            .await
            .unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::SchedulerInvalidArgument);
    }

    #[tokio::test]
    async fn remove_job_listener_by_name() {
        let tracker = Arc::new(ExecutionTracker::new());
        let registry = ListenerRegistry::new(tracker);
        registry
            .add_job_listener(Arc::new(NamedJobListener("a")))
            .await
            .unwrap();
        assert!(registry.remove_job_listener("a").await);
        assert!(!registry.remove_job_listener("a").await);
    }
}
