//! Configuration management.

use serde::Deserialize;

/// Main application configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Job scheduler configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// OpenTelemetry OTLP endpoint
    pub otlp_endpoint: Option<String>,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: None,
            log_level: default_log_level(),
            json_logging: default_json_logging(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// How long the scheduling loop sleeps when no triggers are due.
    #[serde(default = "default_idle_wait_time_ms")]
    pub idle_wait_time_ms: u64,

    /// Delay between retries after a transient job store failure.
    #[serde(default = "default_db_failure_retry_interval_ms")]
    pub db_failure_retry_interval_ms: u64,

    /// Whether the facade signals the loop on every scheduling change.
    #[serde(default = "default_signal_on_scheduling_change")]
    pub signal_on_scheduling_change: bool,

    /// Whether shutdown interrupts currently-executing interruptible jobs.
    #[serde(default = "default_interrupt_jobs_on_shutdown")]
    pub interrupt_jobs_on_shutdown: bool,

    /// Whether an interrupted shutdown waits for jobs to actually exit.
    #[serde(default = "default_interrupt_jobs_on_shutdown_with_wait")]
    pub interrupt_jobs_on_shutdown_with_wait: bool,

    /// Maximum number of triggers acquired in a single batch.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Number of concurrent worker-pool slots available to job executions.
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            idle_wait_time_ms: default_idle_wait_time_ms(),
            db_failure_retry_interval_ms: default_db_failure_retry_interval_ms(),
            signal_on_scheduling_change: default_signal_on_scheduling_change(),
            interrupt_jobs_on_shutdown: default_interrupt_jobs_on_shutdown(),
            interrupt_jobs_on_shutdown_with_wait: default_interrupt_jobs_on_shutdown_with_wait(),
            max_batch_size: default_max_batch_size(),
            worker_pool_size: default_worker_pool_size(),
        }
    }
}

fn default_idle_wait_time_ms() -> u64 { 30_000 }
fn default_db_failure_retry_interval_ms() -> u64 { 15_000 }
fn default_signal_on_scheduling_change() -> bool { true }
fn default_interrupt_jobs_on_shutdown() -> bool { false }
fn default_interrupt_jobs_on_shutdown_with_wait() -> bool { false }
fn default_max_batch_size() -> usize { 10 }
fn default_worker_pool_size() -> usize { 10 }

// Default value functions
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }

impl Config {
    /// Load configuration from environment and config files.
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("APEX").separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        Ok(cfg)
    }

    /// Load from a specific file path.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("APEX").separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        Ok(cfg)
    }
}
