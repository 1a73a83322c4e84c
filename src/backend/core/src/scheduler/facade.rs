//! The public operational surface (§4.1) plus the lifecycle state machine
//! (§4.8): `CREATED → (STARTED ↔ STANDBY) → SHUTTING_DOWN → SHUTDOWN`.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex, RwLock};

use super::dispatcher::Dispatcher;
use super::execution::ExecutionTracker;
use super::job::{JobDataMap, JobDetail, JobKey, MANUAL_TRIGGER_GROUP};
use super::listener::{JobListener, ListenerRegistry, SchedulerListener, TriggerListener};
use super::loop_::SchedulingLoop;
use super::pool::WorkerPool;
use super::signaler::Signaler;
use super::store::JobStore;
use super::trigger::{Trigger, TriggerKey, TriggerState};
use crate::config::SchedulerConfig;
use crate::error::{ApexError, Result};

/// Source of the random component of generated manual-trigger ids
/// (`MT_<id>`), pluggable so tests can exercise the collision-retry path
/// deterministically (§8 S5).
pub trait ManualTriggerIdSource: Send + Sync {
    fn next_id(&self) -> u64;
}

/// Default source: the low 63 bits of a fresh UUIDv4.
pub struct RandomIdSource;

impl ManualTriggerIdSource for RandomIdSource {
    fn next_id(&self) -> u64 {
        (uuid::Uuid::new_v4().as_u128() as u64) & 0x7fff_ffff_ffff_ffff
    }
}

const MANUAL_TRIGGER_ID_ATTEMPTS: u32 = 100;

/// Public facade over one scheduler instance: the store, pool, loop, and
/// listener registry it owns, plus the lifecycle state machine.
pub struct SchedulerFacade {
    name: String,
    store: Arc<dyn JobStore>,
    pool: Arc<dyn WorkerPool>,
    listeners: Arc<ListenerRegistry>,
    tracker: Arc<ExecutionTracker>,
    signaler: Arc<Signaler>,
    scheduling_loop: Arc<SchedulingLoop>,
    config: SchedulerConfig,
    manual_id_source: Arc<dyn ManualTriggerIdSource>,

    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    loop_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,

    shutting_down: AtomicBool,
    closed: AtomicBool,
    in_standby: AtomicBool,
    initial_start: RwLock<Option<DateTime<Utc>>>,

    /// Opaque hold-list keeping caller-owned objects alive for the
    /// scheduler's lifetime. A list, not a set: duplicate inserts allowed.
    no_gc_hold: RwLock<Vec<Arc<dyn Any + Send + Sync>>>,
}

impl SchedulerFacade {
    pub fn new(
        name: impl Into<String>,
        store: Arc<dyn JobStore>,
        pool: Arc<dyn WorkerPool>,
        config: SchedulerConfig,
    ) -> Arc<Self> {
        Self::with_manual_id_source(name, store, pool, config, Arc::new(RandomIdSource))
    }

    pub fn with_manual_id_source(
        name: impl Into<String>,
        store: Arc<dyn JobStore>,
        pool: Arc<dyn WorkerPool>,
        config: SchedulerConfig,
        manual_id_source: Arc<dyn ManualTriggerIdSource>,
    ) -> Arc<Self> {
        let tracker = Arc::new(ExecutionTracker::new());
        let listeners = Arc::new(ListenerRegistry::new(tracker.clone()));
        let dispatcher = Arc::new(Dispatcher::new(
            store.clone(),
            pool.clone(),
            listeners.clone(),
            tracker.clone(),
        ));
        let signaler = Arc::new(Signaler::new());
        let scheduling_loop = Arc::new(SchedulingLoop::new(
            store.clone(),
            dispatcher,
            pool.clone(),
            signaler.clone(),
            config.clone(),
        ));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Arc::new(Self {
            name: name.into(),
            store,
            pool,
            listeners,
            tracker,
            signaler,
            scheduling_loop,
            config,
            manual_id_source,
            shutdown_tx,
            shutdown_rx,
            loop_handle: Mutex::new(None),
            shutting_down: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            in_standby: AtomicBool::new(false),
            initial_start: RwLock::new(None),
            no_gc_hold: RwLock::new(Vec::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn listeners(&self) -> &Arc<ListenerRegistry> {
        &self.listeners
    }

    pub fn tracker(&self) -> &Arc<ExecutionTracker> {
        &self.tracker
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub fn pool(&self) -> &Arc<dyn WorkerPool> {
        &self.pool
    }

    pub async fn add_job_listener(&self, listener: Arc<dyn JobListener>) -> Result<()> {
        self.listeners.add_job_listener(listener).await
    }

    pub async fn add_trigger_listener(&self, listener: Arc<dyn TriggerListener>) -> Result<()> {
        self.listeners.add_trigger_listener(listener).await
    }

    pub async fn add_scheduler_listener(&self, listener: Arc<dyn SchedulerListener>) {
        self.listeners.add_scheduler_listener(listener).await
    }

    /// `!shuttingDown && !closed && !inStandby && initialStart != null` (§4.8).
    pub async fn is_started(&self) -> bool {
        !self.shutting_down.load(Ordering::SeqCst)
            && !self.closed.load(Ordering::SeqCst)
            && !self.in_standby.load(Ordering::SeqCst)
            && self.initial_start.read().await.is_some()
    }

    fn validate_state(&self) -> Result<()> {
        if self.shutting_down.load(Ordering::SeqCst) || self.closed.load(Ordering::SeqCst) {
            return Err(ApexError::scheduler_shutdown());
        }
        Ok(())
    }

    async fn signal(&self, candidate: Option<DateTime<Utc>>) {
        if self.config.signal_on_scheduling_change {
            self.signaler.signal_scheduling_change(candidate).await;
        }
    }

    async fn resolve_calendar(
        &self,
        trigger: &Trigger,
    ) -> Result<Option<Arc<dyn super::calendar::Calendar>>> {
        match &trigger.calendar_name {
            None => Ok(None),
            Some(name) => match self.store.retrieve_calendar(name).await {
                Some(cal) => Ok(Some(cal)),
                None => Err(ApexError::scheduler_calendar_not_found(name.clone())),
            },
        }
    }

    // ── scheduling operations (§4.1) ────────────────────────────────────

    pub async fn schedule_job(&self, detail: JobDetail, mut trigger: Trigger) -> Result<DateTime<Utc>> {
        self.validate_state()?;
        if trigger.job_key != detail.key {
            return Err(ApexError::scheduler_invalid_argument(format!(
                "trigger {} is bound to job {}, not {}",
                trigger.key, trigger.job_key, detail.key
            )));
        }
        let calendar = self.resolve_calendar(&trigger).await?;
        let first_fire = trigger
            .compute_first_fire_time(calendar.as_deref())
            .ok_or_else(|| ApexError::scheduler_never_fires(trigger.key.to_string()))?;

        self.store.store_job_and_trigger(detail.clone(), trigger.clone()).await?;
        self.signal(Some(first_fire)).await;

        for listener in self.listeners.scheduler_listeners_snapshot().await {
            listener.job_added(&detail.key).await;
            listener.job_scheduled(&trigger.key).await;
        }
        tracing::debug!(job = %detail.key, trigger = %trigger.key, first_fire = %first_fire, "job scheduled");
        Ok(first_fire)
    }

    pub async fn schedule_trigger(&self, mut trigger: Trigger) -> Result<DateTime<Utc>> {
        self.validate_state()?;
        if self.store.retrieve_job(&trigger.job_key).await.is_none() {
            return Err(ApexError::scheduler_invalid_argument(format!(
                "trigger {} names unknown job {}",
                trigger.key, trigger.job_key
            )));
        }
        let calendar = self.resolve_calendar(&trigger).await?;
        let first_fire = trigger
            .compute_first_fire_time(calendar.as_deref())
            .ok_or_else(|| ApexError::scheduler_never_fires(trigger.key.to_string()))?;

        self.store.store_trigger(trigger.clone(), false).await?;
        self.signal(Some(first_fire)).await;

        for listener in self.listeners.scheduler_listeners_snapshot().await {
            listener.job_scheduled(&trigger.key).await;
        }
        Ok(first_fire)
    }

    pub async fn add_job(&self, detail: JobDetail, replace: bool) -> Result<()> {
        self.validate_state()?;
        if !detail.durable && !replace {
            return Err(ApexError::scheduler_invalid_argument(
                "a non-durable job must be added together with a trigger",
            ));
        }
        self.store.store_job(detail.clone(), replace).await?;
        for listener in self.listeners.scheduler_listeners_snapshot().await {
            listener.job_added(&detail.key).await;
        }
        Ok(())
    }

    pub async fn delete_job(&self, key: &JobKey) -> Result<bool> {
        self.validate_state()?;
        let trigger_keys = self.store.triggers_for_job(key).await;
        for tk in &trigger_keys {
            if let Err(err) = self.store.remove_trigger(tk).await {
                return Err(ApexError::scheduler_delete_conflict(key.to_string(), err.to_string()));
            }
        }
        let removed = self.store.remove_job(key).await?;
        for listener in self.listeners.scheduler_listeners_snapshot().await {
            for tk in &trigger_keys {
                listener.job_unscheduled(tk).await;
            }
        }
        Ok(removed)
    }

    pub async fn unschedule_job(&self, key: &TriggerKey) -> Result<bool> {
        self.validate_state()?;
        let removed = self.store.remove_trigger(key).await?;
        if removed {
            for listener in self.listeners.scheduler_listeners_snapshot().await {
                listener.job_unscheduled(key).await;
            }
        }
        Ok(removed)
    }

    pub async fn reschedule_job(
        &self,
        key: &TriggerKey,
        mut new_trigger: Trigger,
    ) -> Result<Option<DateTime<Utc>>> {
        self.validate_state()?;
        let calendar = self.resolve_calendar(&new_trigger).await?;
        let first_fire = new_trigger
            .compute_first_fire_time(calendar.as_deref())
            .ok_or_else(|| ApexError::scheduler_never_fires(new_trigger.key.to_string()))?;

        let replaced = self.store.replace_trigger(key, new_trigger.clone()).await?;
        if !replaced {
            return Ok(None);
        }
        self.signal(Some(first_fire)).await;
        for listener in self.listeners.scheduler_listeners_snapshot().await {
            listener.job_unscheduled(key).await;
            listener.job_scheduled(key).await;
        }
        Ok(Some(first_fire))
    }

    /// One-shot manual fire: `MT_<id>` in the reserved manual-trigger
    /// group, retrying on id collision up to a bounded number of attempts.
    pub async fn trigger_job(&self, job_key: &JobKey, data: JobDataMap, volatile: bool) -> Result<()> {
        self.validate_state()?;
        if self.store.retrieve_job(job_key).await.is_none() {
            return Err(ApexError::scheduler_invalid_argument(format!(
                "unknown job {job_key}"
            )));
        }

        for _ in 0..MANUAL_TRIGGER_ID_ATTEMPTS {
            let id = self.manual_id_source.next_id();
            let trigger_key = TriggerKey::new(format!("MT_{id}"), MANUAL_TRIGGER_GROUP);
            let mut trigger = Trigger::once(trigger_key.clone(), job_key.clone(), Utc::now())
                .with_job_data(data.clone())
                .volatile(volatile);
            trigger.compute_first_fire_time(None);

            match self.store.store_trigger(trigger, false).await {
                Ok(()) => {
                    self.signal(Some(Utc::now())).await;
                    for listener in self.listeners.scheduler_listeners_snapshot().await {
                        listener.job_scheduled(&trigger_key).await;
                    }
                    return Ok(());
                }
                Err(err) if err.code() == crate::error::ErrorCode::SchedulerObjectAlreadyExists => {
                    tracing::debug!(job = %job_key, "manual trigger id collision, retrying");
                    continue;
                }
                Err(err) => return Err(err),
            }
        }
        tracing::warn!(job = %job_key, "manual trigger id space exhausted after repeated collisions");
        Err(ApexError::scheduler_duplicate_name(
            "manual trigger id space exhausted after repeated collisions",
        ))
    }

    // ── pause/resume (§4.1, delegated to the store) ────────────────────

    pub async fn pause_trigger(&self, key: &TriggerKey) -> Result<()> {
        self.validate_state()?;
        self.store.pause_trigger(key).await?;
        self.signal(None).await;
        Ok(())
    }

    pub async fn resume_trigger(&self, key: &TriggerKey) -> Result<()> {
        self.validate_state()?;
        self.store.resume_trigger(key).await?;
        self.signal(None).await;
        Ok(())
    }

    pub async fn pause_trigger_group(&self, group: &str) -> Result<()> {
        self.validate_state()?;
        self.store.pause_trigger_group(group).await?;
        self.signal(None).await;
        Ok(())
    }

    pub async fn resume_trigger_group(&self, group: &str) -> Result<()> {
        self.validate_state()?;
        self.store.resume_trigger_group(group).await?;
        self.signal(None).await;
        Ok(())
    }

    pub async fn pause_job(&self, key: &JobKey) -> Result<()> {
        self.validate_state()?;
        self.store.pause_job(key).await?;
        self.signal(None).await;
        Ok(())
    }

    pub async fn resume_job(&self, key: &JobKey) -> Result<()> {
        self.validate_state()?;
        self.store.resume_job(key).await?;
        self.signal(None).await;
        Ok(())
    }

    pub async fn pause_job_group(&self, group: &str) -> Result<()> {
        self.validate_state()?;
        self.store.pause_job_group(group).await?;
        self.signal(None).await;
        Ok(())
    }

    pub async fn resume_job_group(&self, group: &str) -> Result<()> {
        self.validate_state()?;
        self.store.resume_job_group(group).await?;
        self.signal(None).await;
        Ok(())
    }

    pub async fn pause_all(&self) -> Result<()> {
        self.validate_state()?;
        self.store.pause_all().await?;
        self.signal(None).await;
        Ok(())
    }

    pub async fn resume_all(&self) -> Result<()> {
        self.validate_state()?;
        self.store.resume_all().await?;
        self.signal(None).await;
        Ok(())
    }

    // ── queries ─────────────────────────────────────────────────────────

    pub async fn get_job_detail(&self, key: &JobKey) -> Option<JobDetail> {
        self.store.retrieve_job(key).await
    }

    pub async fn get_trigger(&self, key: &TriggerKey) -> Option<Trigger> {
        self.store.retrieve_trigger(key).await
    }

    pub async fn get_trigger_state(&self, key: &TriggerKey) -> TriggerState {
        self.store.get_trigger_state(key).await
    }

    pub async fn get_triggers_for_job(&self, key: &JobKey) -> Vec<TriggerKey> {
        self.store.triggers_for_job(key).await
    }

    pub async fn store_calendar(&self, name: impl Into<String>, calendar: Arc<dyn super::calendar::Calendar>) -> Result<()> {
        self.validate_state()?;
        self.store.store_calendar(name.into(), calendar).await
    }

    // ── NoGCObject hold-list (§5, §9) ───────────────────────────────────

    pub async fn hold_no_gc_object(&self, object: Arc<dyn Any + Send + Sync>) {
        self.no_gc_hold.write().await.push(object);
    }

    /// Removes only the first matching entry, by pointer identity.
    pub async fn remove_no_gc_object(&self, object: &Arc<dyn Any + Send + Sync>) -> bool {
        let mut guard = self.no_gc_hold.write().await;
        if let Some(pos) = guard.iter().position(|held| Arc::ptr_eq(held, object)) {
            guard.remove(pos);
            true
        } else {
            false
        }
    }

    // ── lifecycle (§4.8) ────────────────────────────────────────────────

    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if self.shutting_down.load(Ordering::SeqCst) || self.closed.load(Ordering::SeqCst) {
            return Err(ApexError::scheduler_shutdown());
        }
        self.in_standby.store(false, Ordering::SeqCst);
        self.scheduling_loop.resume();

        let mut handle_guard = self.loop_handle.lock().await;
        if handle_guard.is_none() {
            super::repository::register(self.clone()).await?;
            *self.initial_start.write().await = Some(Utc::now());
            self.store.scheduler_started().await?;
            let loop_clone = self.scheduling_loop.clone();
            let rx = self.shutdown_rx.clone();
            *handle_guard = Some(tokio::spawn(async move {
                loop_clone.run(rx).await;
            }));
            for listener in self.listeners.scheduler_listeners_snapshot().await {
                listener.scheduler_started().await;
            }
            tracing::info!(scheduler = %self.name, "scheduler started");
        }
        Ok(())
    }

    /// Spawns a helper task that sleeps `delay` then starts; never blocks
    /// the caller.
    pub fn start_delayed(self: Arc<Self>, delay: StdDuration) {
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(err) = self.start().await {
                err.log();
            }
        });
    }

    pub async fn standby(&self) -> Result<()> {
        self.in_standby.store(true, Ordering::SeqCst);
        self.scheduling_loop.standby();
        for listener in self.listeners.scheduler_listeners_snapshot().await {
            listener.scheduler_in_standby_mode().await;
        }
        tracing::info!(scheduler = %self.name, "scheduler entered standby");
        Ok(())
    }

    /// Idempotent: calls after the first are no-ops (§8 property 7).
    pub async fn shutdown(&self, wait_for_completion: bool) -> Result<()> {
        if self
            .shutting_down
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(());
        }
        tracing::info!(scheduler = %self.name, wait_for_completion, "scheduler shutting down");

        self.in_standby.store(true, Ordering::SeqCst);
        for listener in self.listeners.scheduler_listeners_snapshot().await {
            listener.scheduler_shutting_down().await;
        }
        let _ = self.shutdown_tx.send(true);

        if self.config.interrupt_jobs_on_shutdown || self.config.interrupt_jobs_on_shutdown_with_wait {
            for ctx in self.tracker.snapshot().await {
                if ctx.is_interruptible() {
                    ctx.interrupt();
                }
            }
        }

        if wait_for_completion || self.config.interrupt_jobs_on_shutdown_with_wait {
            while self.tracker.count().await > 0 {
                tokio::time::sleep(StdDuration::from_millis(20)).await;
            }
        }

        if let Some(handle) = self.loop_handle.lock().await.take() {
            let _ = handle.await;
        }

        self.store.shutdown().await?;
        self.closed.store(true, Ordering::SeqCst);
        self.no_gc_hold.write().await.clear();

        for listener in self.listeners.scheduler_listeners_snapshot().await {
            listener.scheduler_shutdown().await;
        }
        super::repository::unregister(&self.name).await;
        tracing::info!(scheduler = %self.name, "scheduler shutdown complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::job::{Job, JobResult};
    use crate::scheduler::pool::TokioWorkerPool;
    use crate::scheduler::store::InMemoryJobStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering as StdOrdering};
    use std::sync::Mutex as StdMutex;

    struct CountingJob(Arc<AtomicU32>);

    #[async_trait]
    impl Job for CountingJob {
        async fn execute(&self, _ctx: &super::super::execution::JobExecutionContext) -> JobResult {
            self.0.fetch_add(1, StdOrdering::SeqCst);
            Ok(())
        }
    }

    fn test_config() -> SchedulerConfig {
        SchedulerConfig {
            idle_wait_time_ms: 20,
            db_failure_retry_interval_ms: 20,
            signal_on_scheduling_change: true,
            interrupt_jobs_on_shutdown: false,
            interrupt_jobs_on_shutdown_with_wait: false,
            max_batch_size: 10,
            worker_pool_size: 4,
        }
    }

    fn make_facade(name: &str) -> Arc<SchedulerFacade> {
        let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
        let pool: Arc<dyn WorkerPool> = Arc::new(TokioWorkerPool::new(2));
        SchedulerFacade::new(name, store, pool, test_config())
    }

    #[tokio::test]
    async fn schedule_job_runs_once_and_cleans_up_nondurable_job() {
        let facade = make_facade("facade-test-schedule-job-runs-once");
        facade.start().await.unwrap();

        let counter = Arc::new(AtomicU32::new(0));
        let job_key = JobKey::new("a", "DEFAULT");
        let detail = JobDetail::new(job_key.clone(), Arc::new(CountingJob(counter.clone())));
        let trigger = Trigger::once(
            TriggerKey::new("t1", "DEFAULT"),
            job_key.clone(),
            Utc::now() + chrono::Duration::milliseconds(50),
        );
        facade.schedule_job(detail, trigger).await.unwrap();

        tokio::time::sleep(StdDuration::from_millis(300)).await;
        assert_eq!(counter.load(StdOrdering::SeqCst), 1);
        assert!(facade.get_trigger(&TriggerKey::new("t1", "DEFAULT")).await.is_none());
        assert!(facade.get_job_detail(&job_key).await.is_none());

        facade.shutdown(true).await.unwrap();
    }

    #[tokio::test]
    async fn schedule_job_never_fires_is_rejected_without_touching_store() {
        let facade = make_facade("facade-test-schedule-job-never-fires");
        let job_key = JobKey::new("a", "DEFAULT");
        let detail = JobDetail::new(job_key.clone(), Arc::new(CountingJob(Arc::new(AtomicU32::new(0)))));

        struct AlwaysExcluded;
        impl super::super::calendar::Calendar for AlwaysExcluded {
            fn is_time_excluded(&self, _t: DateTime<Utc>) -> bool {
                true
            }
        }
        facade.store_calendar("blackout", Arc::new(AlwaysExcluded)).await.unwrap();

        let trigger = Trigger::once(TriggerKey::new("t1", "DEFAULT"), job_key.clone(), Utc::now())
            .with_calendar_name("blackout");
        let err = facade.schedule_job(detail, trigger).await.unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::SchedulerNeverFires);
        assert!(facade.get_job_detail(&job_key).await.is_none());
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let facade = make_facade("facade-test-shutdown-is-idempotent");
        facade.start().await.unwrap();
        facade.shutdown(true).await.unwrap();
        facade.shutdown(true).await.unwrap();
        assert!(facade.validate_state().is_err());
    }

    struct SeqIdSource(StdMutex<Vec<u64>>);

    impl ManualTriggerIdSource for SeqIdSource {
        fn next_id(&self) -> u64 {
            self.0.lock().unwrap().remove(0)
        }
    }

    #[tokio::test]
    async fn manual_trigger_retries_past_id_collision() {
        let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
        let pool: Arc<dyn WorkerPool> = Arc::new(TokioWorkerPool::new(2));
        let ids = Arc::new(SeqIdSource(StdMutex::new(vec![42, 43])));
        let facade = SchedulerFacade::with_manual_id_source("test", store.clone(), pool, test_config(), ids);

        let job_key = JobKey::new("a", "DEFAULT");
        let detail = JobDetail::new(job_key.clone(), Arc::new(CountingJob(Arc::new(AtomicU32::new(0)))))
            .durable(true);
        facade.add_job(detail, true).await.unwrap();

        // Pre-seed a trigger occupying MT_42 so the first id collides.
        let collision = Trigger::once(
            TriggerKey::new("MT_42", MANUAL_TRIGGER_GROUP),
            job_key.clone(),
            Utc::now() + chrono::Duration::seconds(30),
        );
        store.store_trigger(collision, false).await.unwrap();

        facade
            .trigger_job(&job_key, JobDataMap::new(), false)
            .await
            .unwrap();

        assert!(facade
            .get_trigger(&TriggerKey::new("MT_43", MANUAL_TRIGGER_GROUP))
            .await
            .is_some());
    }
}
