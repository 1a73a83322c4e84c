//! General-purpose job scheduler.
//!
//! ```text
//!                  ┌───────────────────┐
//!   facade calls → │  SchedulerFacade   │ → mutates store, signals loop
//!                  └─────────┬──────────┘
//!                            │
//!                  ┌─────────▼──────────┐      ┌───────────┐
//!                  │   SchedulingLoop    │◄────►│ Signaler  │
//!                  └─────────┬──────────┘      └───────────┘
//!                            │ acquire / triggers_fired
//!                  ┌─────────▼──────────┐
//!                  │      JobStore       │ (InMemoryJobStore ships here)
//!                  └─────────┬──────────┘
//!                            │ TriggerFiredBundle
//!                  ┌─────────▼──────────┐
//!                  │     Dispatcher      │ → ListenerRegistry, ExecutionTracker
//!                  └─────────┬──────────┘
//!                            │ acquire()
//!                  ┌─────────▼──────────┐
//!                  │     WorkerPool      │ (TokioWorkerPool ships here)
//!                  └────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use apex_core::scheduler::{
//!     facade::SchedulerFacade, job::{Job, JobDetail, JobKey, JobResult},
//!     pool::TokioWorkerPool, store::InMemoryJobStore, trigger::{Trigger, TriggerKey},
//! };
//! use std::sync::Arc;
//!
//! struct PrintJob;
//! #[async_trait::async_trait]
//! impl Job for PrintJob {
//!     async fn execute(&self, _ctx: &apex_core::scheduler::execution::JobExecutionContext) -> JobResult {
//!         println!("fired");
//!         Ok(())
//!     }
//! }
//!
//! # async fn run() -> apex_core::error::Result<()> {
//! let store = Arc::new(InMemoryJobStore::new());
//! let pool = Arc::new(TokioWorkerPool::new(4));
//! let scheduler = SchedulerFacade::new("demo", store, pool, Default::default());
//! scheduler.start().await?;
//!
//! let job_key = JobKey::new("hello", "DEFAULT");
//! let detail = JobDetail::new(job_key.clone(), Arc::new(PrintJob));
//! let trigger = Trigger::once(TriggerKey::new("t1", "DEFAULT"), job_key, chrono::Utc::now());
//! scheduler.schedule_job(detail, trigger).await?;
//! # Ok(())
//! # }
//! ```

pub mod calendar;
pub mod dispatcher;
pub mod execution;
pub mod facade;
pub mod job;
pub mod listener;
pub mod loop_;
pub mod pool;
pub mod repository;
pub mod signaler;
pub mod store;
pub mod trigger;

pub use calendar::{Calendar, DailyExclusionCalendar, NoopCalendar};
pub use dispatcher::{Dispatcher, InstructionCode};
pub use execution::{ExecutionTracker, FireInstanceId, JobExecutionContext};
pub use facade::{ManualTriggerIdSource, SchedulerFacade};
pub use job::{Job, JobDataMap, JobDetail, JobExecutionError, JobKey, JobResult, DEFAULT_GROUP, MANUAL_TRIGGER_GROUP};
pub use listener::{JobListener, ListenerRegistry, SchedulerListener, TriggerListener};
pub use loop_::{LoopState, SchedulingLoop};
pub use pool::{TokioWorkerPool, WorkerPermit, WorkerPool};
pub use signaler::Signaler;
pub use store::{InMemoryJobStore, JobStore, TriggerFiredBundle};
pub use trigger::{MisfirePolicy, Schedule, Trigger, TriggerKey, TriggerState, DEFAULT_PRIORITY};
