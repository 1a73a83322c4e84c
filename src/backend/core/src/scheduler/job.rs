//! Job identity and the job-body trait.
//!
//! A `JobDetail` is pure identity and metadata; the actual work lives behind
//! the `Job` trait, resolved directly from an `Arc<dyn Job>` stored alongside
//! the detail rather than through a reflective factory.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::execution::JobExecutionContext;

/// Default group used when a caller supplies no explicit group name.
pub const DEFAULT_GROUP: &str = "DEFAULT";

/// Reserved group for triggers created by `SchedulerFacade::trigger_job`.
pub const MANUAL_TRIGGER_GROUP: &str = "MANUAL_TRIGGER";

/// Composite key identifying a job (or trigger) within its group.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobKey {
    pub name: String,
    pub group: String,
}

impl JobKey {
    pub fn new(name: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group: group.into(),
        }
    }

    /// Construct a key, canonicalising an absent group to `DEFAULT`.
    pub fn of(name: impl Into<String>, group: Option<String>) -> Self {
        Self::new(name, group.unwrap_or_else(|| DEFAULT_GROUP.to_string()))
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group, self.name)
    }
}

/// Payload data carried by a job, overlaid per-trigger at fire time.
pub type JobDataMap = HashMap<String, Value>;

/// The result a job body returns: `Ok` on success, or an instruction-bearing
/// failure describing how the store should follow up on the firing trigger.
pub type JobResult = std::result::Result<(), JobExecutionError>;

/// Error raised by a job body, carrying the instruction code the dispatcher
/// uses to steer the store's handling of the firing trigger (§4.3).
#[derive(Debug, Clone)]
pub struct JobExecutionError {
    pub message: String,
    pub instruction: super::dispatcher::InstructionCode,
}

impl JobExecutionError {
    /// A plain failure: no special instruction, trigger proceeds normally.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            instruction: super::dispatcher::InstructionCode::NoInstruction,
        }
    }

    pub fn with_instruction(
        message: impl Into<String>,
        instruction: super::dispatcher::InstructionCode,
    ) -> Self {
        Self {
            message: message.into(),
            instruction,
        }
    }
}

impl fmt::Display for JobExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for JobExecutionError {}

/// Identity, flags, and payload for a registered job (§3 JobDetail).
#[derive(Clone)]
pub struct JobDetail {
    pub key: JobKey,
    /// May exist without any trigger referencing it.
    pub durable: bool,
    /// Concurrent executions of this detail are forbidden when true.
    pub stateful: bool,
    /// Hint to the store that this job should be recovered after a crash.
    pub requests_recovery: bool,
    pub job_data: JobDataMap,
    pub(crate) job: Arc<dyn Job>,
}

impl fmt::Debug for JobDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobDetail")
            .field("key", &self.key)
            .field("durable", &self.durable)
            .field("stateful", &self.stateful)
            .field("requests_recovery", &self.requests_recovery)
            .finish()
    }
}

impl JobDetail {
    pub fn new(key: JobKey, job: Arc<dyn Job>) -> Self {
        Self {
            key,
            durable: false,
            stateful: false,
            requests_recovery: false,
            job_data: JobDataMap::new(),
            job,
        }
    }

    pub fn durable(mut self, durable: bool) -> Self {
        self.durable = durable;
        self
    }

    pub fn stateful(mut self, stateful: bool) -> Self {
        self.stateful = stateful;
        self
    }

    pub fn requests_recovery(mut self, requests_recovery: bool) -> Self {
        self.requests_recovery = requests_recovery;
        self
    }

    pub fn job_data(mut self, job_data: JobDataMap) -> Self {
        self.job_data = job_data;
        self
    }
}

/// The interface a user-defined unit of work implements.
///
/// Interruption is cooperative: `interrupt()` only has to flip a flag the
/// body checks; the scheduler never forcibly terminates a worker task.
#[async_trait]
pub trait Job: Send + Sync {
    /// Execute the job body for a single fire instance.
    async fn execute(&self, ctx: &JobExecutionContext) -> JobResult;

    /// Declares whether this job instance supports cooperative interruption.
    fn is_interruptible(&self) -> bool {
        false
    }

    /// Requests interruption; no-op for non-interruptible jobs.
    fn interrupt(&self) {}
}

/// An interruptible job wrapping a shared cancellation flag, used by jobs
/// that poll `should_stop()` in a loop rather than composing `select!`
/// against a future of their own.
#[derive(Default)]
pub struct InterruptFlag(AtomicBool);

impl InterruptFlag {
    pub fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Resolve a job's implementation error into the crate-wide error type,
/// used at dispatch sites that need to surface a `Result<_, ApexError>`.
pub fn to_apex_error(job_name: &str, err: &JobExecutionError) -> crate::error::ApexError {
    crate::error::ApexError::scheduler_job_execution_failed(job_name, err.message.clone())
}

#[allow(dead_code)]
fn _assert_job_object_safe(_: &dyn Job) {}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopJob;

    #[async_trait]
    impl Job for NoopJob {
        async fn execute(&self, _ctx: &JobExecutionContext) -> JobResult {
            Ok(())
        }
    }

    #[test]
    fn job_key_default_group() {
        let k = JobKey::of("a", None);
        assert_eq!(k.group, DEFAULT_GROUP);
        assert_eq!(k.to_string(), "DEFAULT.a");
    }

    #[test]
    fn job_detail_builders() {
        let key = JobKey::new("a", "g");
        let detail = JobDetail::new(key.clone(), Arc::new(NoopJob))
            .durable(true)
            .stateful(true);
        assert!(detail.durable);
        assert!(detail.stateful);
        assert_eq!(detail.key, key);
    }

    #[test]
    fn interrupt_flag_round_trip() {
        let flag = InterruptFlag::new();
        assert!(!flag.is_set());
        flag.set();
        assert!(flag.is_set());
    }

    #[tokio::test]
    async fn resolve_apex_error_maps_code() {
        let err = JobExecutionError::new("boom");
        let apex = to_apex_error("a", &err);
        assert_eq!(apex.code(), crate::error::ErrorCode::SchedulerJobExecutionFailed);
    }
}
