//! JobStore contract (§6) and an in-memory reference implementation.
//!
//! The abstract contract is the "external collaborator" named throughout
//! the component design; `InMemoryJobStore` is the one concrete backing
//! this crate ships so the engine is testable standalone. A SQL-backed
//! store is explicitly out of scope (§1 Non-goals).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::calendar::Calendar;
use super::dispatcher::InstructionCode;
use super::job::{Job, JobDataMap, JobDetail, JobKey};
use super::trigger::{Trigger, TriggerKey, TriggerState};
use crate::error::{ApexError, Result};

/// Result of firing one acquired trigger, handed to the Dispatcher.
#[derive(Clone)]
pub struct TriggerFiredBundle {
    pub job_key: JobKey,
    pub trigger_key: TriggerKey,
    pub scheduled_fire_time: DateTime<Utc>,
    pub actual_fire_time: DateTime<Utc>,
    pub merged_job_data: JobDataMap,
    pub may_fire_again: bool,
    pub job: Arc<dyn Job>,
}

/// Durable set of jobs, triggers, and calendars; acquisition of due
/// triggers; pause state (§6).
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn store_job(&self, detail: JobDetail, replace: bool) -> Result<()>;

    async fn store_trigger(&self, trigger: Trigger, replace: bool) -> Result<()>;

    async fn store_job_and_trigger(&self, detail: JobDetail, trigger: Trigger) -> Result<()>;

    async fn store_calendar(&self, name: String, calendar: Arc<dyn Calendar>) -> Result<()>;

    async fn remove_job(&self, key: &JobKey) -> Result<bool>;

    async fn remove_trigger(&self, key: &TriggerKey) -> Result<bool>;

    /// Replace an existing trigger's schedule, preserving its key. Returns
    /// `false` if no trigger with the old key existed.
    async fn replace_trigger(&self, key: &TriggerKey, new_trigger: Trigger) -> Result<bool>;

    async fn retrieve_job(&self, key: &JobKey) -> Option<JobDetail>;

    async fn retrieve_trigger(&self, key: &TriggerKey) -> Option<Trigger>;

    async fn retrieve_calendar(&self, name: &str) -> Option<Arc<dyn Calendar>>;

    async fn triggers_for_job(&self, key: &JobKey) -> Vec<TriggerKey>;

    /// Atomically acquire up to `max_count` NORMAL triggers due no later
    /// than `no_later_than`, transitioning them to ACQUIRED.
    async fn acquire_next_triggers(
        &self,
        no_later_than: DateTime<Utc>,
        max_count: usize,
    ) -> Result<Vec<Trigger>>;

    async fn release_acquired_trigger(&self, key: &TriggerKey) -> Result<()>;

    /// Resolve each acquired trigger into a fired bundle, or drop it
    /// silently if it vanished or became paused/blocked in the interim.
    async fn triggers_fired(&self, triggers: Vec<Trigger>) -> Result<Vec<TriggerFiredBundle>>;

    async fn triggered_job_complete(
        &self,
        trigger_key: &TriggerKey,
        job_key: &JobKey,
        instruction: InstructionCode,
    ) -> Result<()>;

    async fn pause_trigger(&self, key: &TriggerKey) -> Result<()>;
    async fn resume_trigger(&self, key: &TriggerKey) -> Result<()>;
    async fn pause_trigger_group(&self, group: &str) -> Result<()>;
    async fn resume_trigger_group(&self, group: &str) -> Result<()>;
    async fn pause_job(&self, key: &JobKey) -> Result<()>;
    async fn resume_job(&self, key: &JobKey) -> Result<()>;
    async fn pause_job_group(&self, group: &str) -> Result<()>;
    async fn resume_job_group(&self, group: &str) -> Result<()>;
    async fn pause_all(&self) -> Result<()>;
    async fn resume_all(&self) -> Result<()>;

    async fn get_trigger_state(&self, key: &TriggerKey) -> TriggerState;
    async fn get_paused_trigger_groups(&self) -> Vec<String>;
    async fn is_job_group_paused(&self, group: &str) -> bool;
    async fn is_trigger_group_paused(&self, group: &str) -> bool;

    async fn scheduler_started(&self) -> Result<()>;
    async fn shutdown(&self) -> Result<()>;

    fn supports_persistence(&self) -> bool {
        false
    }
    fn clustered(&self) -> bool {
        false
    }
}

struct StoredTrigger {
    trigger: Trigger,
    state: TriggerState,
}

#[derive(Default)]
struct Inner {
    jobs: HashMap<JobKey, JobDetail>,
    triggers: HashMap<TriggerKey, StoredTrigger>,
    calendars: HashMap<String, Arc<dyn Calendar>>,
    paused_trigger_groups: HashSet<String>,
    paused_job_groups: HashSet<String>,
    /// Job keys with a currently-executing stateful fire instance (§5).
    blocked_stateful_jobs: HashSet<JobKey>,
}

/// `Arc<RwLock<..>>`-guarded in-memory `JobStore` implementation.
pub struct InMemoryJobStore {
    inner: RwLock<Inner>,
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Remove the job if non-durable and it has no remaining triggers
    /// (§3 invariant: a non-durable JobDetail exists iff it has ≥1 trigger).
    fn cleanup_non_durable_job(inner: &mut Inner, job_key: &JobKey) {
        let still_has_triggers = inner.triggers.values().any(|t| &t.trigger.job_key == job_key);
        if still_has_triggers {
            return;
        }
        if let Some(detail) = inner.jobs.get(job_key) {
            if !detail.durable {
                inner.jobs.remove(job_key);
            }
        }
    }

    fn group_paused(inner: &Inner, trigger: &Trigger, job_key: &JobKey) -> bool {
        inner.paused_trigger_groups.contains(&trigger.key.group)
            || inner.paused_job_groups.contains(&job_key.group)
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn store_job(&self, detail: JobDetail, replace: bool) -> Result<()> {
        let mut inner = self.inner.write().await;
        if !replace && inner.jobs.contains_key(&detail.key) {
            return Err(ApexError::scheduler_already_exists("job", detail.key.to_string()));
        }
        inner.jobs.insert(detail.key.clone(), detail);
        Ok(())
    }

    async fn store_trigger(&self, trigger: Trigger, replace: bool) -> Result<()> {
        let mut inner = self.inner.write().await;
        if !inner.jobs.contains_key(&trigger.job_key) {
            return Err(ApexError::scheduler_invalid_argument(format!(
                "trigger {} names unknown job {}",
                trigger.key, trigger.job_key
            )));
        }
        if !replace && inner.triggers.contains_key(&trigger.key) {
            return Err(ApexError::scheduler_already_exists("trigger", trigger.key.to_string()));
        }
        inner.triggers.insert(
            trigger.key.clone(),
            StoredTrigger {
                trigger,
                state: TriggerState::Normal,
            },
        );
        Ok(())
    }

    async fn store_job_and_trigger(&self, detail: JobDetail, trigger: Trigger) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.jobs.contains_key(&detail.key) {
            return Err(ApexError::scheduler_already_exists("job", detail.key.to_string()));
        }
        if inner.triggers.contains_key(&trigger.key) {
            return Err(ApexError::scheduler_already_exists("trigger", trigger.key.to_string()));
        }
        inner.jobs.insert(detail.key.clone(), detail);
        inner.triggers.insert(
            trigger.key.clone(),
            StoredTrigger {
                trigger,
                state: TriggerState::Normal,
            },
        );
        Ok(())
    }

    async fn store_calendar(&self, name: String, calendar: Arc<dyn Calendar>) -> Result<()> {
        self.inner.write().await.calendars.insert(name, calendar);
        Ok(())
    }

    async fn remove_job(&self, key: &JobKey) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let had_job = inner.jobs.remove(key).is_some();
        Ok(had_job)
    }

    async fn remove_trigger(&self, key: &TriggerKey) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let removed = inner.triggers.remove(key);
        if let Some(stored) = removed {
            Self::cleanup_non_durable_job(&mut inner, &stored.trigger.job_key);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn replace_trigger(&self, key: &TriggerKey, mut new_trigger: Trigger) -> Result<bool> {
        let mut inner = self.inner.write().await;
        if !inner.triggers.contains_key(key) {
            return Ok(false);
        }
        if !inner.jobs.contains_key(&new_trigger.job_key) {
            return Err(ApexError::scheduler_invalid_argument(format!(
                "trigger {} names unknown job {}",
                new_trigger.key, new_trigger.job_key
            )));
        }
        new_trigger.key = key.clone();
        inner.triggers.remove(key);
        inner.triggers.insert(
            key.clone(),
            StoredTrigger {
                trigger: new_trigger,
                state: TriggerState::Normal,
            },
        );
        Ok(true)
    }

    async fn retrieve_job(&self, key: &JobKey) -> Option<JobDetail> {
        self.inner.read().await.jobs.get(key).cloned()
    }

    async fn retrieve_trigger(&self, key: &TriggerKey) -> Option<Trigger> {
        self.inner
            .read()
            .await
            .triggers
            .get(key)
            .map(|s| s.trigger.clone())
    }

    async fn retrieve_calendar(&self, name: &str) -> Option<Arc<dyn Calendar>> {
        self.inner.read().await.calendars.get(name).cloned()
    }

    async fn triggers_for_job(&self, key: &JobKey) -> Vec<TriggerKey> {
        self.inner
            .read()
            .await
            .triggers
            .values()
            .filter(|s| &s.trigger.job_key == key)
            .map(|s| s.trigger.key.clone())
            .collect()
    }

    async fn acquire_next_triggers(
        &self,
        no_later_than: DateTime<Utc>,
        max_count: usize,
    ) -> Result<Vec<Trigger>> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();

        let mut candidates: Vec<TriggerKey> = inner
            .triggers
            .iter()
            .filter(|(_, s)| {
                s.state == TriggerState::Normal
                    && s.trigger
                        .next_fire_time
                        .map(|t| t <= no_later_than)
                        .unwrap_or(false)
            })
            .map(|(k, _)| k.clone())
            .collect();

        candidates.sort_by(|a, b| {
            let sa = &inner.triggers[a].trigger;
            let sb = &inner.triggers[b].trigger;
            sa.next_fire_time
                .cmp(&sb.next_fire_time)
                .then_with(|| sb.priority.cmp(&sa.priority))
                .then_with(|| a.cmp(b))
        });
        candidates.truncate(max_count.max(1));

        let mut acquired = Vec::with_capacity(candidates.len());
        for key in candidates {
            let calendar_name = inner.triggers[&key].trigger.calendar_name.clone();
            let calendar = calendar_name.and_then(|n| inner.calendars.get(&n).cloned());
            let stored = inner.triggers.get_mut(&key).unwrap();
            stored.trigger.update_after_misfire(now, calendar.as_deref());
            stored.state = TriggerState::Acquired;
            acquired.push(stored.trigger.clone());
        }
        Ok(acquired)
    }

    async fn release_acquired_trigger(&self, key: &TriggerKey) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(stored) = inner.triggers.get_mut(key) {
            if stored.state == TriggerState::Acquired {
                stored.state = TriggerState::Normal;
            }
        }
        Ok(())
    }

    async fn triggers_fired(&self, triggers: Vec<Trigger>) -> Result<Vec<TriggerFiredBundle>> {
        let mut inner = self.inner.write().await;
        let mut bundles = Vec::with_capacity(triggers.len());

        for acquired in triggers {
            let key = acquired.key.clone();
            let Some(stored) = inner.triggers.get(&key) else {
                continue; // vanished
            };
            if stored.state != TriggerState::Acquired {
                continue; // no longer acquired (paused/removed concurrently)
            }
            let job_key = acquired.job_key.clone();
            let Some(detail) = inner.jobs.get(&job_key).cloned() else {
                continue;
            };

            if Self::group_paused(&inner, &acquired, &job_key) {
                let stored = inner.triggers.get_mut(&key).unwrap();
                stored.state = TriggerState::Paused;
                continue;
            }

            if detail.stateful && inner.blocked_stateful_jobs.contains(&job_key) {
                let stored = inner.triggers.get_mut(&key).unwrap();
                stored.state = TriggerState::Blocked;
                continue;
            }
            if detail.stateful {
                inner.blocked_stateful_jobs.insert(job_key.clone());
            }

            let calendar = acquired
                .calendar_name
                .as_ref()
                .and_then(|n| inner.calendars.get(n).cloned());

            let scheduled_fire_time = acquired.next_fire_time.unwrap_or_else(Utc::now);
            let mut merged_job_data = detail.job_data.clone();
            merged_job_data.extend(acquired.job_data_overlay.clone());

            let mut advanced = acquired.clone();
            advanced.triggered(scheduled_fire_time, calendar.as_deref());
            let may_fire_again = advanced.may_fire_again();

            let final_state = if may_fire_again {
                TriggerState::Normal
            } else {
                TriggerState::Complete
            };

            inner.triggers.insert(
                key.clone(),
                StoredTrigger {
                    trigger: advanced,
                    state: final_state,
                },
            );

            bundles.push(TriggerFiredBundle {
                job_key,
                trigger_key: key,
                scheduled_fire_time,
                actual_fire_time: Utc::now(),
                merged_job_data,
                may_fire_again,
                job: detail.job.clone(),
            });
        }
        Ok(bundles)
    }

    async fn triggered_job_complete(
        &self,
        trigger_key: &TriggerKey,
        job_key: &JobKey,
        instruction: InstructionCode,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.blocked_stateful_jobs.remove(job_key);

        match instruction {
            InstructionCode::NoInstruction => {}
            InstructionCode::ReExecuteJob => {
                if let Some(stored) = inner.triggers.get_mut(trigger_key) {
                    stored.trigger.next_fire_time = Some(Utc::now());
                    stored.state = TriggerState::Normal;
                }
            }
            InstructionCode::SetTriggerComplete => {
                if let Some(stored) = inner.triggers.get_mut(trigger_key) {
                    stored.state = TriggerState::Complete;
                }
            }
            InstructionCode::DeleteTrigger => {
                inner.triggers.remove(trigger_key);
            }
            InstructionCode::SetAllJobTriggersComplete => {
                for stored in inner.triggers.values_mut() {
                    if &stored.trigger.job_key == job_key {
                        stored.state = TriggerState::Complete;
                    }
                }
            }
            InstructionCode::SetTriggerError => {
                if let Some(stored) = inner.triggers.get_mut(trigger_key) {
                    stored.state = TriggerState::Error;
                }
            }
            InstructionCode::SetAllJobTriggersError => {
                for stored in inner.triggers.values_mut() {
                    if &stored.trigger.job_key == job_key {
                        stored.state = TriggerState::Error;
                    }
                }
            }
        }

        // Remove triggers that reached a terminal state; then reclaim the
        // job if it is non-durable and now orphaned (§3 lifecycles).
        let terminal_keys: Vec<TriggerKey> = inner
            .triggers
            .iter()
            .filter(|(_, s)| {
                &s.trigger.job_key == job_key
                    && matches!(s.state, TriggerState::Complete)
                    && !s.trigger.may_fire_again()
            })
            .map(|(k, _)| k.clone())
            .collect();
        for k in terminal_keys {
            inner.triggers.remove(&k);
        }
        Self::cleanup_non_durable_job(&mut inner, job_key);

        Ok(())
    }

    async fn pause_trigger(&self, key: &TriggerKey) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(stored) = inner.triggers.get_mut(key) {
            stored.state = TriggerState::Paused;
        }
        Ok(())
    }

    async fn resume_trigger(&self, key: &TriggerKey) -> Result<()> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        let calendar = inner
            .triggers
            .get(key)
            .and_then(|s| s.trigger.calendar_name.clone())
            .and_then(|n| inner.calendars.get(&n).cloned());
        if let Some(stored) = inner.triggers.get_mut(key) {
            if stored.state == TriggerState::Paused {
                stored.trigger.update_after_misfire(now, calendar.as_deref());
                stored.state = TriggerState::Normal;
            }
        }
        Ok(())
    }

    async fn pause_trigger_group(&self, group: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.paused_trigger_groups.insert(group.to_string());
        for stored in inner.triggers.values_mut() {
            if stored.trigger.key.group == group && stored.state == TriggerState::Normal {
                stored.state = TriggerState::Paused;
            }
        }
        Ok(())
    }

    async fn resume_trigger_group(&self, group: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.paused_trigger_groups.remove(group);
        let now = Utc::now();
        let keys: Vec<TriggerKey> = inner
            .triggers
            .iter()
            .filter(|(k, s)| k.group == group && s.state == TriggerState::Paused)
            .map(|(k, _)| k.clone())
            .collect();
        for key in keys {
            let calendar = inner
                .triggers
                .get(&key)
                .and_then(|s| s.trigger.calendar_name.clone())
                .and_then(|n| inner.calendars.get(&n).cloned());
            if let Some(stored) = inner.triggers.get_mut(&key) {
                stored.trigger.update_after_misfire(now, calendar.as_deref());
                stored.state = TriggerState::Normal;
            }
        }
        Ok(())
    }

    async fn pause_job(&self, key: &JobKey) -> Result<()> {
        let mut inner = self.inner.write().await;
        let keys: Vec<TriggerKey> = inner
            .triggers
            .iter()
            .filter(|(_, s)| &s.trigger.job_key == key)
            .map(|(k, _)| k.clone())
            .collect();
        for k in keys {
            if let Some(stored) = inner.triggers.get_mut(&k) {
                if stored.state == TriggerState::Normal {
                    stored.state = TriggerState::Paused;
                }
            }
        }
        Ok(())
    }

    async fn resume_job(&self, key: &JobKey) -> Result<()> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        let keys: Vec<TriggerKey> = inner
            .triggers
            .iter()
            .filter(|(_, s)| &s.trigger.job_key == key && s.state == TriggerState::Paused)
            .map(|(k, _)| k.clone())
            .collect();
        for k in keys {
            let calendar = inner
                .triggers
                .get(&k)
                .and_then(|s| s.trigger.calendar_name.clone())
                .and_then(|n| inner.calendars.get(&n).cloned());
            if let Some(stored) = inner.triggers.get_mut(&k) {
                stored.trigger.update_after_misfire(now, calendar.as_deref());
                stored.state = TriggerState::Normal;
            }
        }
        Ok(())
    }

    async fn pause_job_group(&self, group: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.paused_job_groups.insert(group.to_string());
        let keys: Vec<TriggerKey> = inner
            .triggers
            .iter()
            .filter(|(_, s)| s.trigger.job_key.group == group && s.state == TriggerState::Normal)
            .map(|(k, _)| k.clone())
            .collect();
        for k in keys {
            if let Some(stored) = inner.triggers.get_mut(&k) {
                stored.state = TriggerState::Paused;
            }
        }
        Ok(())
    }

    async fn resume_job_group(&self, group: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.paused_job_groups.remove(group);
        let now = Utc::now();
        let keys: Vec<TriggerKey> = inner
            .triggers
            .iter()
            .filter(|(_, s)| s.trigger.job_key.group == group && s.state == TriggerState::Paused)
            .map(|(k, _)| k.clone())
            .collect();
        for k in keys {
            let calendar = inner
                .triggers
                .get(&k)
                .and_then(|s| s.trigger.calendar_name.clone())
                .and_then(|n| inner.calendars.get(&n).cloned());
            if let Some(stored) = inner.triggers.get_mut(&k) {
                stored.trigger.update_after_misfire(now, calendar.as_deref());
                stored.state = TriggerState::Normal;
            }
        }
        Ok(())
    }

    async fn pause_all(&self) -> Result<()> {
        let mut inner = self.inner.write().await;
        let groups: Vec<String> = inner.triggers.keys().map(|k| k.group.clone()).collect();
        for g in groups {
            inner.paused_trigger_groups.insert(g);
        }
        for stored in inner.triggers.values_mut() {
            if stored.state == TriggerState::Normal {
                stored.state = TriggerState::Paused;
            }
        }
        Ok(())
    }

    async fn resume_all(&self) -> Result<()> {
        let groups: Vec<String> = {
            let inner = self.inner.read().await;
            inner.paused_trigger_groups.iter().cloned().collect()
        };
        for g in groups {
            self.resume_trigger_group(&g).await?;
        }
        Ok(())
    }

    async fn get_trigger_state(&self, key: &TriggerKey) -> TriggerState {
        self.inner
            .read()
            .await
            .triggers
            .get(key)
            .map(|s| s.state)
            .unwrap_or(TriggerState::None)
    }

    async fn get_paused_trigger_groups(&self) -> Vec<String> {
        self.inner
            .read()
            .await
            .paused_trigger_groups
            .iter()
            .cloned()
            .collect()
    }

    async fn is_job_group_paused(&self, group: &str) -> bool {
        self.inner.read().await.paused_job_groups.contains(group)
    }

    async fn is_trigger_group_paused(&self, group: &str) -> bool {
        self.inner.read().await.paused_trigger_groups.contains(group)
    }

    async fn scheduler_started(&self) -> Result<()> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::job::{Job, JobDetail, JobResult};
    use async_trait::async_trait;

    struct NoopJob;

    #[async_trait]
    impl Job for NoopJob {
        async fn execute(&self, _ctx: &super::super::execution::JobExecutionContext) -> JobResult {
            Ok(())
        }
    }

    fn job_key() -> JobKey {
        JobKey::new("a", "DEFAULT")
    }

    #[tokio::test]
    async fn store_trigger_requires_existing_job() {
        let store = InMemoryJobStore::new();
        let trigger = Trigger::once(TriggerKey::new("t1", "DEFAULT"), job_key(), Utc::now());
        let err = store.store_trigger(trigger, false).await.unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::SchedulerInvalidArgument);
    }

    #[tokio::test]
    async fn acquire_triggers_fired_and_complete_removes_nondurable_job() {
        let store = InMemoryJobStore::new();
        let detail = JobDetail::new(job_key(), Arc::new(NoopJob));
        store.store_job(detail, false).await.unwrap();

        let mut trigger = Trigger::once(TriggerKey::new("t1", "DEFAULT"), job_key(), Utc::now());
        trigger.compute_first_fire_time(None);
        store.store_trigger(trigger, false).await.unwrap();

        let acquired = store
            .acquire_next_triggers(Utc::now() + chrono::Duration::seconds(1), 10)
            .await
            .unwrap();
        assert_eq!(acquired.len(), 1);
        assert_eq!(
            store.get_trigger_state(&TriggerKey::new("t1", "DEFAULT")).await,
            TriggerState::Acquired
        );

        let bundles = store.triggers_fired(acquired).await.unwrap();
        assert_eq!(bundles.len(), 1);
        assert!(!bundles[0].may_fire_again);

        store
            .triggered_job_complete(
                &TriggerKey::new("t1", "DEFAULT"),
                &job_key(),
                InstructionCode::NoInstruction,
            )
            .await
            .unwrap();

        assert!(store.retrieve_trigger(&TriggerKey::new("t1", "DEFAULT")).await.is_none());
        assert!(store.retrieve_job(&job_key()).await.is_none());
    }

    #[tokio::test]
    async fn stateful_job_blocks_second_concurrent_fire() {
        let store = InMemoryJobStore::new();
        let detail = JobDetail::new(job_key(), Arc::new(NoopJob)).stateful(true).durable(true);
        store.store_job(detail, false).await.unwrap();

        let t1 = {
            let mut t = Trigger::interval(
                TriggerKey::new("t1", "DEFAULT"),
                job_key(),
                Utc::now(),
                chrono::Duration::milliseconds(10),
                None,
            );
            t.compute_first_fire_time(None);
            t
        };
        store.store_trigger(t1, false).await.unwrap();

        let acquired = store
            .acquire_next_triggers(Utc::now() + chrono::Duration::seconds(1), 10)
            .await
            .unwrap();
        let bundles = store.triggers_fired(acquired.clone()).await.unwrap();
        assert_eq!(bundles.len(), 1);

        // Simulate a second fire while the first is still "executing"
        // (blocked_stateful_jobs still holds the job key).
        let acquired2 = store
            .acquire_next_triggers(Utc::now() + chrono::Duration::seconds(1), 10)
            .await
            .unwrap();
        let bundles2 = store.triggers_fired(acquired2).await.unwrap();
        assert!(bundles2.is_empty());
        assert_eq!(
            store.get_trigger_state(&TriggerKey::new("t1", "DEFAULT")).await,
            TriggerState::Blocked
        );
    }

    #[tokio::test]
    async fn pause_and_resume_trigger() {
        let store = InMemoryJobStore::new();
        let detail = JobDetail::new(job_key(), Arc::new(NoopJob)).durable(true);
        store.store_job(detail, false).await.unwrap();
        let mut trigger = Trigger::interval(
            TriggerKey::new("t1", "DEFAULT"),
            job_key(),
            Utc::now(),
            chrono::Duration::milliseconds(100),
            None,
        );
        trigger.compute_first_fire_time(None);
        store.store_trigger(trigger, false).await.unwrap();

        store.pause_trigger(&TriggerKey::new("t1", "DEFAULT")).await.unwrap();
        assert_eq!(
            store.get_trigger_state(&TriggerKey::new("t1", "DEFAULT")).await,
            TriggerState::Paused
        );
        store.resume_trigger(&TriggerKey::new("t1", "DEFAULT")).await.unwrap();
        assert_eq!(
            store.get_trigger_state(&TriggerKey::new("t1", "DEFAULT")).await,
            TriggerState::Normal
        );
    }
}
