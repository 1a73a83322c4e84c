//! Turns a fired trigger into a job execution; invokes listeners; records
//! completion (§4.3).

use std::sync::Arc;

use super::execution::{ExecutionTracker, JobExecutionContext};
use super::listener::ListenerRegistry;
use super::pool::WorkerPool;
use super::store::{JobStore, TriggerFiredBundle};
use crate::error::{ApexError, Result};

/// Instruction steering the store's follow-up action on a fired trigger,
/// derived either from a listener decision or a job body's own error (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionCode {
    NoInstruction,
    ReExecuteJob,
    SetTriggerComplete,
    DeleteTrigger,
    SetAllJobTriggersComplete,
    SetTriggerError,
    SetAllJobTriggersError,
}

/// Turns acquired, fired triggers into executions on the worker pool.
pub struct Dispatcher {
    store: Arc<dyn JobStore>,
    pool: Arc<dyn WorkerPool>,
    listeners: Arc<ListenerRegistry>,
    tracker: Arc<ExecutionTracker>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn JobStore>,
        pool: Arc<dyn WorkerPool>,
        listeners: Arc<ListenerRegistry>,
        tracker: Arc<ExecutionTracker>,
    ) -> Self {
        Self {
            store,
            pool,
            listeners,
            tracker,
        }
    }

    /// Dispatch a single fired bundle. Errors here are loop-internal: the
    /// caller is expected to forward them to `SchedulerError` listeners,
    /// never to return them to an external caller (§7 Propagation policy).
    pub async fn dispatch(&self, bundle: TriggerFiredBundle) -> Result<()> {
        let span = tracing::info_span!(
            "dispatch",
            job = %bundle.job_key.name,
            trigger = %bundle.trigger_key.name,
        );
        let _enter = span.enter();

        let ctx = JobExecutionContext::new(
            bundle.job_key.clone(),
            bundle.trigger_key.clone(),
            bundle.scheduled_fire_time,
            bundle.merged_job_data,
            bundle.job,
        );

        let vetoed = self.notify_trigger_listeners_fired(&ctx).await;
        if vetoed {
            tracing::debug!(job = %ctx.job_key.name, "job execution vetoed by trigger listener");
            self.notify_job_listeners_vetoed(&ctx).await;
            let instruction = if bundle.may_fire_again {
                InstructionCode::NoInstruction
            } else {
                InstructionCode::SetTriggerComplete
            };
            self.store
                .triggered_job_complete(&ctx.trigger_key, &ctx.job_key, instruction)
                .await?;
            return Ok(());
        }

        self.notify_job_listeners_to_be_executed(&ctx).await;

        let permit = self.pool.acquire().await?;
        tracing::debug!(job = %ctx.job_key.name, "job execution starting");
        let body_result = ctx.job.execute(&ctx).await;
        drop(permit);

        let (instruction, error) = match body_result {
            Ok(()) => (InstructionCode::NoInstruction, None),
            Err(job_err) => {
                let apex = super::job::to_apex_error(&ctx.job_key.name, &job_err);
                (job_err.instruction, Some(apex))
            }
        };

        self.notify_trigger_listeners_complete(&ctx, instruction).await;
        self.notify_job_listeners_was_executed(&ctx, error.as_ref()).await;

        if let Some(err) = &error {
            tracing::warn!(job = %ctx.job_key.name, error = %err, "job execution failed");
            self.notify_scheduler_error("job execution failed", err).await;
        } else {
            tracing::debug!(job = %ctx.job_key.name, "job execution completed");
        }

        self.store
            .triggered_job_complete(&ctx.trigger_key, &ctx.job_key, instruction)
            .await?;

        self.tracker.job_was_executed(ctx.fire_instance_id).await;

        Ok(())
    }

    async fn notify_trigger_listeners_fired(&self, ctx: &JobExecutionContext) -> bool {
        for listener in self.listeners.trigger_listeners_snapshot().await {
            if listener.trigger_fired(ctx).await {
                return true;
            }
        }
        false
    }

    async fn notify_trigger_listeners_complete(
        &self,
        ctx: &JobExecutionContext,
        instruction: InstructionCode,
    ) {
        for listener in self.listeners.trigger_listeners_snapshot().await {
            listener.trigger_complete(ctx, instruction).await;
        }
    }

    async fn notify_job_listeners_to_be_executed(&self, ctx: &JobExecutionContext) {
        for listener in self.listeners.job_listeners_snapshot().await {
            listener.job_to_be_executed(ctx).await;
        }
    }

    async fn notify_job_listeners_vetoed(&self, ctx: &JobExecutionContext) {
        for listener in self.listeners.job_listeners_snapshot().await {
            listener.job_execution_vetoed(ctx).await;
        }
    }

    async fn notify_job_listeners_was_executed(
        &self,
        ctx: &JobExecutionContext,
        error: Option<&ApexError>,
    ) {
        for listener in self.listeners.job_listeners_snapshot().await {
            listener.job_was_executed(ctx, error).await;
        }
    }

    async fn notify_scheduler_error(&self, message: &str, error: &ApexError) {
        for listener in self.listeners.scheduler_listeners_snapshot().await {
            listener.scheduler_error(message, error).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::job::{Job, JobDetail, JobKey, JobResult};
    use crate::scheduler::pool::TokioWorkerPool;
    use crate::scheduler::store::InMemoryJobStore;
    use crate::scheduler::trigger::{Trigger, TriggerKey};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingJob(Arc<AtomicU32>);

    #[async_trait]
    impl Job for CountingJob {
        async fn execute(&self, _ctx: &JobExecutionContext) -> JobResult {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn dispatch_runs_job_and_completes_trigger() {
        let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
        let pool: Arc<dyn WorkerPool> = Arc::new(TokioWorkerPool::new(2));
        let tracker = Arc::new(ExecutionTracker::new());
        let listeners = Arc::new(ListenerRegistry::new(tracker.clone()));
        let dispatcher = Dispatcher::new(store.clone(), pool, listeners, tracker.clone());

        let counter = Arc::new(AtomicU32::new(0));
        let job_key = JobKey::new("j", "DEFAULT");
        let detail = JobDetail::new(job_key.clone(), Arc::new(CountingJob(counter.clone())));
        store.store_job(detail, false).await.unwrap();

        let trigger_key = TriggerKey::new("t", "DEFAULT");
        let mut trigger = Trigger::once(trigger_key.clone(), job_key.clone(), Utc::now());
        trigger.compute_first_fire_time(None);
        store.store_trigger(trigger, false).await.unwrap();

        let bundles = store
            .acquire_next_triggers(Utc::now() + chrono::Duration::seconds(1), 10)
            .await
            .unwrap();
        let fired = store.triggers_fired(bundles).await.unwrap();
        assert_eq!(fired.len(), 1);
        dispatcher.dispatch(fired.into_iter().next().unwrap()).await.unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.num_jobs_fired(), 1);
        assert_eq!(tracker.count().await, 0);
    }
}
