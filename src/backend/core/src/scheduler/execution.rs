//! JobExecutionContext and the ExecutionTracker (§3, §4.5).

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::job::{Job, JobDataMap, JobKey};
use super::trigger::TriggerKey;
use crate::error::{ApexError, Result};

/// Unique identifier for a single invocation of a job by a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FireInstanceId(pub Uuid);

impl FireInstanceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FireInstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for FireInstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-fire instance handed to listeners and the job body (§3).
#[derive(Clone)]
pub struct JobExecutionContext {
    pub fire_instance_id: FireInstanceId,
    pub job_key: JobKey,
    pub trigger_key: TriggerKey,
    pub scheduled_fire_time: DateTime<Utc>,
    pub actual_fire_time: DateTime<Utc>,
    pub merged_job_data: JobDataMap,
    pub(crate) job: Arc<dyn Job>,
}

impl JobExecutionContext {
    pub fn new(
        job_key: JobKey,
        trigger_key: TriggerKey,
        scheduled_fire_time: DateTime<Utc>,
        merged_job_data: JobDataMap,
        job: Arc<dyn Job>,
    ) -> Self {
        Self {
            fire_instance_id: FireInstanceId::new(),
            job_key,
            trigger_key,
            scheduled_fire_time,
            actual_fire_time: Utc::now(),
            merged_job_data,
            job,
        }
    }

    pub fn is_interruptible(&self) -> bool {
        self.job.is_interruptible()
    }

    pub fn interrupt(&self) {
        self.job.interrupt();
    }
}

impl std::fmt::Debug for JobExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobExecutionContext")
            .field("fire_instance_id", &self.fire_instance_id)
            .field("job_key", &self.job_key)
            .field("trigger_key", &self.trigger_key)
            .finish()
    }
}

/// Live set of currently-executing jobs plus a fired counter (§4.5).
#[derive(Default)]
pub struct ExecutionTracker {
    executing: RwLock<HashMap<FireInstanceId, JobExecutionContext>>,
    num_jobs_fired: AtomicU64,
}

impl ExecutionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn job_to_be_executed(&self, ctx: JobExecutionContext) {
        self.num_jobs_fired.fetch_add(1, Ordering::Relaxed);
        self.executing.write().await.insert(ctx.fire_instance_id, ctx);
    }

    pub async fn job_was_executed(&self, fire_instance_id: FireInstanceId) {
        self.executing.write().await.remove(&fire_instance_id);
    }

    pub fn num_jobs_fired(&self) -> u64 {
        self.num_jobs_fired.load(Ordering::Relaxed)
    }

    pub async fn count(&self) -> usize {
        self.executing.read().await.len()
    }

    /// Stable snapshot of the currently-executing contexts.
    pub async fn snapshot(&self) -> Vec<JobExecutionContext> {
        self.executing.read().await.values().cloned().collect()
    }

    /// Interrupt every executing instance of `(name, group)`.
    ///
    /// Returns `Ok(true)` if at least one matching instance was
    /// interrupted; `Ok(false)` if none matched; `Err(JobNotInterruptible)`
    /// if a match was found but declared itself non-interruptible.
    pub async fn interrupt(&self, job_key: &JobKey) -> Result<bool> {
        let snapshot = self.snapshot().await;
        let mut found_non_interruptible = false;
        let mut interrupted = false;
        for ctx in snapshot.iter().filter(|c| &c.job_key == job_key) {
            if ctx.is_interruptible() {
                ctx.interrupt();
                interrupted = true;
            } else {
                found_non_interruptible = true;
            }
        }
        if interrupted {
            Ok(true)
        } else if found_non_interruptible {
            Err(ApexError::scheduler_job_not_interruptible(job_key.to_string()))
        } else {
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::job::JobResult;
    use async_trait::async_trait;

    struct InterruptibleJob {
        flag: super::super::job::InterruptFlag,
    }

    #[async_trait]
    impl Job for InterruptibleJob {
        async fn execute(&self, _ctx: &JobExecutionContext) -> JobResult {
            Ok(())
        }
        fn is_interruptible(&self) -> bool {
            true
        }
        fn interrupt(&self) {
            self.flag.set();
        }
    }

    struct PlainJob;

    #[async_trait]
    impl Job for PlainJob {
        async fn execute(&self, _ctx: &JobExecutionContext) -> JobResult {
            Ok(())
        }
    }

    fn make_ctx(job: Arc<dyn Job>) -> JobExecutionContext {
        JobExecutionContext::new(
            JobKey::new("j", "DEFAULT"),
            TriggerKey::new("t", "DEFAULT"),
            Utc::now(),
            JobDataMap::new(),
            job,
        )
    }

    #[tokio::test]
    async fn tracks_and_counts_executions() {
        let tracker = ExecutionTracker::new();
        let ctx = make_ctx(Arc::new(PlainJob));
        let id = ctx.fire_instance_id;
        tracker.job_to_be_executed(ctx).await;
        assert_eq!(tracker.count().await, 1);
        assert_eq!(tracker.num_jobs_fired(), 1);
        tracker.job_was_executed(id).await;
        assert_eq!(tracker.count().await, 0);
    }

    #[tokio::test]
    async fn interrupt_flips_flag_on_interruptible_job() {
        let tracker = ExecutionTracker::new();
        let job = Arc::new(InterruptibleJob {
            flag: super::super::job::InterruptFlag::new(),
        });
        let ctx = make_ctx(job.clone());
        let job_key = ctx.job_key.clone();
        tracker.job_to_be_executed(ctx).await;
        let result = tracker.interrupt(&job_key).await.unwrap();
        assert!(result);
        assert!(job.flag.is_set());
    }

    #[tokio::test]
    async fn interrupt_fails_on_non_interruptible_match() {
        let tracker = ExecutionTracker::new();
        let ctx = make_ctx(Arc::new(PlainJob));
        let job_key = ctx.job_key.clone();
        tracker.job_to_be_executed(ctx).await;
        let err = tracker.interrupt(&job_key).await.unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::SchedulerJobNotInterruptible);
    }

    #[tokio::test]
    async fn interrupt_returns_false_when_no_match() {
        let tracker = ExecutionTracker::new();
        let result = tracker
            .interrupt(&JobKey::new("nope", "DEFAULT"))
            .await
            .unwrap();
        assert!(!result);
    }

    #[tokio::test]
    async fn fire_instance_ids_are_unique() {
        let a = FireInstanceId::new();
        let b = FireInstanceId::new();
        assert_ne!(a, b);
    }
}
