#![allow(clippy::result_large_err)]
//! # Apex Core
//!
//! A general-purpose job scheduler: durable triggers, misfire handling,
//! pause/resume, and a pluggable job store and worker pool.
//!
//! ## Architecture
//!
//! - **Scheduler**: `JobStore`, `SchedulingLoop`, `Dispatcher`, `WorkerPool`,
//!   `ListenerRegistry` and the `SchedulerFacade` operational surface
//! - **Observability**: Distributed tracing and metrics
//! - **Telemetry**: Logging, tracing, and metrics infrastructure

pub mod observability;
pub mod telemetry;
pub mod config;
pub mod error;
pub mod scheduler;

pub use error::{ApexError, Result, ErrorCode, ErrorContext, ErrorDetails, ErrorSeverity};

/// Crate version, resolved at build time from `Cargo.toml`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{ApexError, Result, ErrorCode, ErrorContext, ErrorDetails, ErrorSeverity};
    pub use crate::scheduler::{
        Calendar, DailyExclusionCalendar, NoopCalendar,
        Dispatcher, InstructionCode,
        ExecutionTracker, FireInstanceId, JobExecutionContext,
        ManualTriggerIdSource, SchedulerFacade,
        Job, JobDataMap, JobDetail, JobExecutionError, JobKey, JobResult,
        DEFAULT_GROUP, MANUAL_TRIGGER_GROUP,
        JobListener, ListenerRegistry, SchedulerListener, TriggerListener,
        LoopState, SchedulingLoop,
        TokioWorkerPool, WorkerPermit, WorkerPool,
        Signaler,
        InMemoryJobStore, JobStore, TriggerFiredBundle,
        MisfirePolicy, Schedule, Trigger, TriggerKey, TriggerState, DEFAULT_PRIORITY,
    };
}
