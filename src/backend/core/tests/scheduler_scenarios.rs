//! Literal end-to-end scenarios for the scheduling engine.

use apex_core::config::SchedulerConfig;
use apex_core::error::ErrorCode;
use apex_core::scheduler::{
    Calendar, InMemoryJobStore, Job, JobDataMap, JobDetail, JobExecutionContext, JobKey,
    JobResult, ManualTriggerIdSource, MisfirePolicy, SchedulerFacade, TokioWorkerPool, Trigger,
    TriggerKey, MANUAL_TRIGGER_GROUP,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn fast_config() -> SchedulerConfig {
    SchedulerConfig {
        idle_wait_time_ms: 20,
        db_failure_retry_interval_ms: 20,
        signal_on_scheduling_change: true,
        interrupt_jobs_on_shutdown: false,
        interrupt_jobs_on_shutdown_with_wait: false,
        max_batch_size: 10,
        worker_pool_size: 1,
    }
}

struct CountingJob(Arc<AtomicU32>);

#[async_trait]
impl Job for CountingJob {
    async fn execute(&self, _ctx: &JobExecutionContext) -> JobResult {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn make_scheduler(name: &str) -> Arc<SchedulerFacade> {
    let store = Arc::new(InMemoryJobStore::new());
    let pool = Arc::new(TokioWorkerPool::new(1));
    SchedulerFacade::new(name, store, pool, fast_config())
}

/// S1 — simple one-shot: job fires once, trigger and non-durable job are
/// both gone afterward.
#[tokio::test]
async fn s1_simple_one_shot() {
    let scheduler = make_scheduler("scenarios-s1");
    scheduler.start().await.unwrap();

    let counter = Arc::new(AtomicU32::new(0));
    let job_key = JobKey::new("a", "DEFAULT");
    let detail = JobDetail::new(job_key.clone(), Arc::new(CountingJob(counter.clone())));
    let trigger = Trigger::once(
        TriggerKey::new("t1", "DEFAULT"),
        job_key.clone(),
        Utc::now() + ChronoDuration::milliseconds(200),
    );
    scheduler.schedule_job(detail, trigger).await.unwrap();

    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert!(scheduler.get_trigger(&TriggerKey::new("t1", "DEFAULT")).await.is_none());
    assert!(scheduler.get_job_detail(&job_key).await.is_none());

    scheduler.shutdown(true).await.unwrap();
}

/// S2 — a trigger that can never fire is rejected and leaves no trace.
#[tokio::test]
async fn s2_never_fires_rejection() {
    let scheduler = make_scheduler("scenarios-s2");

    struct AlwaysExcluded;
    impl Calendar for AlwaysExcluded {
        fn is_time_excluded(&self, _t: DateTime<Utc>) -> bool {
            true
        }
    }
    scheduler.store_calendar("blackout", Arc::new(AlwaysExcluded)).await.unwrap();

    let job_key = JobKey::new("a", "DEFAULT");
    let detail = JobDetail::new(job_key.clone(), Arc::new(CountingJob(Arc::new(AtomicU32::new(0)))));
    let trigger = Trigger::once(TriggerKey::new("t1", "DEFAULT"), job_key.clone(), Utc::now())
        .with_calendar_name("blackout");

    let err = scheduler.schedule_job(detail, trigger).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::SchedulerNeverFires);
    assert!(scheduler.get_job_detail(&job_key).await.is_none());
    assert!(scheduler.get_trigger(&TriggerKey::new("t1", "DEFAULT")).await.is_none());
}

/// S3 — rescheduling to an earlier time preempts the original fire.
#[tokio::test]
async fn s3_reschedule_preempts_original_fire() {
    let scheduler = make_scheduler("scenarios-s3");
    scheduler.start().await.unwrap();

    let counter = Arc::new(AtomicU32::new(0));
    let job_key = JobKey::new("a", "DEFAULT");
    let detail = JobDetail::new(job_key.clone(), Arc::new(CountingJob(counter.clone())))
        .durable(true);
    scheduler.add_job(detail, true).await.unwrap();

    let original = Trigger::once(
        TriggerKey::new("t1", "DEFAULT"),
        job_key.clone(),
        Utc::now() + ChronoDuration::seconds(10),
    );
    scheduler.schedule_trigger(original).await.unwrap();

    let sooner = Trigger::once(
        TriggerKey::new("t1", "DEFAULT"),
        job_key.clone(),
        Utc::now() + ChronoDuration::milliseconds(100),
    );
    let refired = scheduler
        .reschedule_job(&TriggerKey::new("t1", "DEFAULT"), sooner)
        .await
        .unwrap();
    assert!(refired.is_some());

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    scheduler.shutdown(true).await.unwrap();
}

/// S4 — pausing a repeating trigger stops further fires until resumed.
#[tokio::test]
async fn s4_pause_then_resume() {
    let scheduler = make_scheduler("scenarios-s4");
    scheduler.start().await.unwrap();

    let counter = Arc::new(AtomicU32::new(0));
    let job_key = JobKey::new("a", "DEFAULT");
    let detail = JobDetail::new(job_key.clone(), Arc::new(CountingJob(counter.clone())))
        .durable(true);
    scheduler.add_job(detail, true).await.unwrap();

    let trigger = Trigger::interval(
        TriggerKey::new("t1", "DEFAULT"),
        job_key.clone(),
        Utc::now(),
        ChronoDuration::milliseconds(100),
        None,
    )
    .with_misfire_policy(MisfirePolicy::IgnoreMisfirePolicy);
    scheduler.schedule_trigger(trigger).await.unwrap();

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(counter.load(Ordering::SeqCst) >= 2);

    scheduler.pause_trigger(&TriggerKey::new("t1", "DEFAULT")).await.unwrap();
    let after_pause = counter.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(counter.load(Ordering::SeqCst), after_pause, "no fires while paused");

    scheduler.resume_trigger(&TriggerKey::new("t1", "DEFAULT")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(counter.load(Ordering::SeqCst) > after_pause);

    scheduler.shutdown(true).await.unwrap();
}

struct SeqIdSource(Mutex<Vec<u64>>);

impl ManualTriggerIdSource for SeqIdSource {
    fn next_id(&self) -> u64 {
        self.0.lock().unwrap().remove(0)
    }
}

/// S5 — manual-trigger id collision is retried until a free id is found.
#[tokio::test]
async fn s5_manual_trigger_id_collision_retried() {
    let store = Arc::new(InMemoryJobStore::new());
    let pool = Arc::new(TokioWorkerPool::new(1));
    let ids = Arc::new(SeqIdSource(Mutex::new(vec![42, 43])));
    let scheduler = SchedulerFacade::with_manual_id_source("scenarios-s5", store.clone(), pool, fast_config(), ids);
    scheduler.start().await.unwrap();

    let counter = Arc::new(AtomicU32::new(0));
    let job_key = JobKey::new("a", "DEFAULT");
    let detail = JobDetail::new(job_key.clone(), Arc::new(CountingJob(counter.clone())))
        .durable(true);
    scheduler.add_job(detail, true).await.unwrap();

    use apex_core::scheduler::JobStore;
    let colliding = Trigger::once(
        TriggerKey::new("MT_42", MANUAL_TRIGGER_GROUP),
        job_key.clone(),
        Utc::now() + ChronoDuration::seconds(30),
    );
    store.store_trigger(colliding, false).await.unwrap();

    scheduler.trigger_job(&job_key, JobDataMap::new(), false).await.unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(scheduler
        .get_trigger(&TriggerKey::new("MT_43", MANUAL_TRIGGER_GROUP))
        .await
        .is_none(), "MT_43 fired once and, being non-repeating, was reaped");
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    scheduler.shutdown(true).await.unwrap();
}

/// S6 — an interruptible long-running job is interrupted on shutdown and
/// shutdown returns well before the job's own 10s body would finish.
#[tokio::test]
async fn s6_interrupt_on_shutdown() {
    use apex_core::scheduler::job::InterruptFlag;

    struct LongJob(Arc<InterruptFlag>);

    #[async_trait]
    impl Job for LongJob {
        async fn execute(&self, _ctx: &JobExecutionContext) -> JobResult {
            for _ in 0..100 {
                if self.0.is_set() {
                    return Ok(());
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            Ok(())
        }

        fn is_interruptible(&self) -> bool {
            true
        }

        fn interrupt(&self) {
            self.0.set();
        }
    }

    let store = Arc::new(InMemoryJobStore::new());
    let pool = Arc::new(TokioWorkerPool::new(1));
    let mut config = fast_config();
    config.interrupt_jobs_on_shutdown_with_wait = true;
    let scheduler = SchedulerFacade::new("scenarios-s6", store, pool, config);
    scheduler.start().await.unwrap();

    let flag = Arc::new(InterruptFlag::new());
    let job_key = JobKey::new("long", "DEFAULT");
    let detail = JobDetail::new(job_key.clone(), Arc::new(LongJob(flag.clone())));
    let trigger = Trigger::once(TriggerKey::new("t1", "DEFAULT"), job_key.clone(), Utc::now());
    scheduler.schedule_job(detail, trigger).await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;

    let start = tokio::time::Instant::now();
    scheduler.shutdown(true).await.unwrap();
    let elapsed = start.elapsed();

    assert!(flag.is_set());
    assert!(elapsed < Duration::from_secs(5), "shutdown should not wait for the full 10s body");
}
