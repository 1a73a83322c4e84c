//! The scheduling control loop (§4.2): repeatedly acquires due triggers in
//! batches, hands them to the `Dispatcher`, and sleeps until the next
//! candidate fire time or an external signal, whichever comes first.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration as ChronoDuration, Utc};
use tokio::sync::watch;

use super::dispatcher::Dispatcher;
use super::pool::WorkerPool;
use super::signaler::Signaler;
use super::store::JobStore;
use crate::config::SchedulerConfig;

const STATE_RUNNING: u8 = 0;
const STATE_PAUSED: u8 = 1;
const STATE_HALTED: u8 = 2;

/// Observable run state of the scheduling loop (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Paused,
    Halted,
}

/// Drives acquisition and dispatch of due triggers on a dedicated task.
pub struct SchedulingLoop {
    store: Arc<dyn JobStore>,
    dispatcher: Arc<Dispatcher>,
    pool: Arc<dyn WorkerPool>,
    signaler: Arc<Signaler>,
    config: SchedulerConfig,
    state: AtomicU8,
}

impl SchedulingLoop {
    pub fn new(
        store: Arc<dyn JobStore>,
        dispatcher: Arc<Dispatcher>,
        pool: Arc<dyn WorkerPool>,
        signaler: Arc<Signaler>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            dispatcher,
            pool,
            signaler,
            config,
            state: AtomicU8::new(STATE_PAUSED),
        }
    }

    pub fn state(&self) -> LoopState {
        match self.state.load(Ordering::SeqCst) {
            STATE_RUNNING => LoopState::Running,
            STATE_HALTED => LoopState::Halted,
            _ => LoopState::Paused,
        }
    }

    pub fn resume(&self) {
        if self.state.load(Ordering::SeqCst) != STATE_HALTED {
            self.state.store(STATE_RUNNING, Ordering::SeqCst);
        }
    }

    pub fn standby(&self) {
        if self.state.load(Ordering::SeqCst) != STATE_HALTED {
            self.state.store(STATE_PAUSED, Ordering::SeqCst);
        }
    }

    fn halt(&self) {
        self.state.store(STATE_HALTED, Ordering::SeqCst);
    }

    /// Run until `shutdown_rx` reports `true`. Intended to be spawned as a
    /// dedicated tokio task owned by the `SchedulerFacade`.
    pub async fn run(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        let idle_wait = StdDuration::from_millis(self.config.idle_wait_time_ms);
        let retry_wait = StdDuration::from_millis(self.config.db_failure_retry_interval_ms);
        tracing::info!("scheduling loop started");

        loop {
            if *shutdown_rx.borrow() {
                self.halt();
                tracing::info!("scheduling loop halted");
                return;
            }

            if self.state() == LoopState::Paused {
                tokio::select! {
                    _ = self.signaler.wait(idle_wait) => {}
                    _ = shutdown_rx.changed() => {}
                }
                continue;
            }

            let available = self.pool.available_permits();
            if available == 0 {
                tracing::debug!("no worker slots available, waiting");
                tokio::select! {
                    _ = self.signaler.wait(idle_wait) => {}
                    _ = shutdown_rx.changed() => {}
                }
                continue;
            }
            let batch_size = available.min(self.config.max_batch_size);

            let acquire_window = Utc::now() + ChronoDuration::milliseconds(self.config.idle_wait_time_ms as i64);
            let acquire_span = tracing::info_span!("acquire_next_triggers", available, batch_size);
            let acquired = {
                let _enter = acquire_span.enter();
                self.store
                    .acquire_next_triggers(acquire_window, batch_size)
                    .await
            };
            match acquired {
                Ok(triggers) if triggers.is_empty() => {
                    let wait_for = self.next_wait(idle_wait).await;
                    tokio::select! {
                        _ = self.signaler.wait(wait_for) => {}
                        _ = shutdown_rx.changed() => {}
                    }
                }
                Ok(triggers) => {
                    tracing::debug!(acquired = triggers.len(), "triggers acquired");
                    let bundles = match self.store.triggers_fired(triggers).await {
                        Ok(bundles) => bundles,
                        Err(err) => {
                            tracing::error!(error = %err, "failed to mark triggers fired");
                            err.log();
                            tokio::time::sleep(retry_wait).await;
                            continue;
                        }
                    };
                    for bundle in bundles {
                        let dispatcher = self.dispatcher.clone();
                        tokio::spawn(async move {
                            if let Err(err) = dispatcher.dispatch(bundle).await {
                                tracing::error!(error = %err, "dispatch failed");
                                err.log();
                            }
                        });
                    }
                }
                Err(err) => {
                    tracing::error!(error = %err, "failed to acquire next triggers");
                    err.log();
                    tokio::time::sleep(retry_wait).await;
                }
            }
        }
    }

    /// How long to sleep before the next acquisition attempt: either the
    /// configured idle wait, or less if a fresher candidate was signaled.
    async fn next_wait(&self, idle_wait: StdDuration) -> StdDuration {
        match self.signaler.earliest_known_candidate().await {
            Some(candidate) => {
                let delta = candidate - Utc::now();
                match delta.to_std() {
                    Ok(d) if d < idle_wait => d,
                    _ => idle_wait,
                }
            }
            None => idle_wait,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::execution::ExecutionTracker;
    use crate::scheduler::job::{Job, JobDetail, JobKey, JobResult};
    use crate::scheduler::listener::ListenerRegistry;
    use crate::scheduler::pool::TokioWorkerPool;
    use crate::scheduler::store::InMemoryJobStore;
    use crate::scheduler::trigger::{Trigger, TriggerKey};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering as StdOrdering};

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

    #[tokio::test]
    async fn starts_paused_and_resumes() {
        let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
        let pool: Arc<dyn WorkerPool> = Arc::new(TokioWorkerPool::new(2));
        let tracker = Arc::new(ExecutionTracker::new());
        let listeners = Arc::new(ListenerRegistry::new(tracker.clone()));
        let dispatcher = Arc::new(Dispatcher::new(store.clone(), pool.clone(), listeners, tracker));
        let signaler = Arc::new(Signaler::new());
        let sched_loop = SchedulingLoop::new(store, dispatcher, pool, signaler, test_config());

        assert_eq!(sched_loop.state(), LoopState::Paused);
        sched_loop.resume();
        assert_eq!(sched_loop.state(), LoopState::Running);
        sched_loop.standby();
        assert_eq!(sched_loop.state(), LoopState::Paused);
    }

    #[tokio::test]
    async fn running_loop_fires_a_due_job_and_halts_on_shutdown() {
        let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
        let pool: Arc<dyn WorkerPool> = Arc::new(TokioWorkerPool::new(2));
        let tracker = Arc::new(ExecutionTracker::new());
        let listeners = Arc::new(ListenerRegistry::new(tracker.clone()));
        let dispatcher = Arc::new(Dispatcher::new(store.clone(), pool.clone(), listeners, tracker));
        let signaler = Arc::new(Signaler::new());
        let sched_loop = Arc::new(SchedulingLoop::new(store.clone(), dispatcher, pool, signaler, test_config()));

        let counter = Arc::new(AtomicU32::new(0));
        let job_key = JobKey::new("j", "DEFAULT");
        let detail = JobDetail::new(job_key.clone(), Arc::new(CountingJob(counter.clone())));
        store.store_job(detail, false).await.unwrap();
        let mut trigger = Trigger::once(TriggerKey::new("t", "DEFAULT"), job_key, Utc::now());
        trigger.compute_first_fire_time(None);
        store.store_trigger(trigger, false).await.unwrap();

        sched_loop.resume();
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(sched_loop.clone().run(rx));

        tokio::time::sleep(StdDuration::from_millis(100)).await;
        assert_eq!(counter.load(StdOrdering::SeqCst), 1);

        tx.send(true).unwrap();
        tokio::time::timeout(StdDuration::from_secs(1), handle)
            .await
            .expect("loop should halt promptly on shutdown signal")
            .unwrap();
        assert_eq!(sched_loop.state(), LoopState::Halted);
    }
}
