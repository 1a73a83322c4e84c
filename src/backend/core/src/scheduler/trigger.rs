//! Trigger identity, schedule algebra contract, and concrete trigger kinds.
//!
//! This crate implements only the abstract "next fire time" contract plus
//! two minimal concrete schedules (`SimpleTrigger`, `IntervalTrigger`); a
//! general cron-expression engine is out of scope (§1 Non-goals).

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

use super::calendar::Calendar;
use super::job::{JobDataMap, JobKey, DEFAULT_GROUP};

/// Composite key identifying a trigger within its group.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TriggerKey {
    pub name: String,
    pub group: String,
}

impl TriggerKey {
    pub fn new(name: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group: group.into(),
        }
    }

    pub fn of(name: impl Into<String>, group: Option<String>) -> Self {
        Self::new(name, group.unwrap_or_else(|| DEFAULT_GROUP.to_string()))
    }
}

impl fmt::Display for TriggerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group, self.name)
    }
}

/// Trigger lifecycle state, owned solely by the store (§3 Invariants).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerState {
    Normal,
    Paused,
    Complete,
    Error,
    Blocked,
    Acquired,
    /// Surfaced by `getTriggerState` for an unknown key; never stored.
    None,
}

impl fmt::Display for TriggerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// How a trigger catches up after missing one or more scheduled fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MisfirePolicy {
    /// Use the trigger kind's own default recovery behavior.
    SmartPolicy,
    /// Fire once immediately, then resume normal cadence.
    FireNowOnce,
    /// Skip the missed fires entirely; pretend they never happened.
    IgnoreMisfirePolicy,
    /// Drop the trigger to COMPLETE rather than catching up.
    DoNothing,
}

impl Default for MisfirePolicy {
    fn default() -> Self {
        Self::SmartPolicy
    }
}

/// Trigger priority; higher fires first among simultaneously-due triggers.
pub const DEFAULT_PRIORITY: i32 = 5;

/// Schedule descriptor plus binding metadata for a single trigger (§3).
///
/// The schedule algebra itself is abstracted behind `next_fire_after`; the
/// two variants below are concrete enough to drive the engine end-to-end
/// without attempting a general calendar/cron arithmetic system.
#[derive(Debug, Clone)]
pub struct Trigger {
    pub key: TriggerKey,
    pub job_key: JobKey,
    pub calendar_name: Option<String>,
    pub misfire_policy: MisfirePolicy,
    /// Excluded from durable recovery bookkeeping.
    pub volatile: bool,
    pub job_data_overlay: JobDataMap,
    pub priority: i32,
    pub schedule: Schedule,

    /// Mutable scheduling state, advanced by `triggered()`.
    pub next_fire_time: Option<DateTime<Utc>>,
    pub previous_fire_time: Option<DateTime<Utc>>,
    pub fire_count: u64,
}

/// Concrete schedule kinds satisfying the abstract Trigger contract.
#[derive(Debug, Clone)]
pub enum Schedule {
    /// Fires exactly once at `at`.
    Once { at: DateTime<Utc> },
    /// Fires every `every`, starting at `start`, for `repeat_count` times
    /// (`None` = forever).
    Interval {
        start: DateTime<Utc>,
        every: ChronoDuration,
        repeat_count: Option<u64>,
    },
}

impl Trigger {
    pub fn once(key: TriggerKey, job_key: JobKey, at: DateTime<Utc>) -> Self {
        Self {
            key,
            job_key,
            calendar_name: None,
            misfire_policy: MisfirePolicy::default(),
            volatile: false,
            job_data_overlay: HashMap::new(),
            priority: DEFAULT_PRIORITY,
            schedule: Schedule::Once { at },
            next_fire_time: None,
            previous_fire_time: None,
            fire_count: 0,
        }
    }

    pub fn interval(
        key: TriggerKey,
        job_key: JobKey,
        start: DateTime<Utc>,
        every: ChronoDuration,
        repeat_count: Option<u64>,
    ) -> Self {
        Self {
            key,
            job_key,
            calendar_name: None,
            misfire_policy: MisfirePolicy::default(),
            volatile: false,
            job_data_overlay: HashMap::new(),
            priority: DEFAULT_PRIORITY,
            schedule: Schedule::Interval {
                start,
                every,
                repeat_count,
            },
            next_fire_time: None,
            previous_fire_time: None,
            fire_count: 0,
        }
    }

    pub fn with_calendar_name(mut self, name: impl Into<String>) -> Self {
        self.calendar_name = Some(name.into());
        self
    }

    pub fn with_misfire_policy(mut self, policy: MisfirePolicy) -> Self {
        self.misfire_policy = policy;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_job_data(mut self, data: HashMap<String, Value>) -> Self {
        self.job_data_overlay = data;
        self
    }

    pub fn volatile(mut self, volatile: bool) -> Self {
        self.volatile = volatile;
        self
    }

    /// Compute and record the first fire time, respecting the calendar's
    /// exclusion predicate. Returns `None` if the trigger would never fire
    /// (§7 `NeverFires`).
    pub fn compute_first_fire_time(&mut self, calendar: Option<&dyn Calendar>) -> Option<DateTime<Utc>> {
        let candidate = self.raw_first_candidate();
        let resolved = self.skip_excluded(candidate, calendar);
        self.next_fire_time = resolved;
        resolved
    }

    pub fn get_next_fire_time(&self) -> Option<DateTime<Utc>> {
        self.next_fire_time
    }

    /// Whether this trigger can fire again after its current `next_fire_time`.
    pub fn may_fire_again(&self) -> bool {
        match &self.schedule {
            Schedule::Once { .. } => self.fire_count == 0 && self.next_fire_time.is_some(),
            Schedule::Interval { repeat_count, .. } => match repeat_count {
                None => self.next_fire_time.is_some(),
                Some(max) => self.fire_count < *max && self.next_fire_time.is_some(),
            },
        }
    }

    /// Advance state after firing at `fire_time`, computing the next
    /// candidate (respecting the calendar) or clearing it if exhausted.
    pub fn triggered(&mut self, fire_time: DateTime<Utc>, calendar: Option<&dyn Calendar>) {
        self.previous_fire_time = Some(fire_time);
        self.fire_count += 1;

        let candidate = match &self.schedule {
            Schedule::Once { .. } => None,
            Schedule::Interval {
                every,
                repeat_count,
                ..
            } => {
                if let Some(max) = repeat_count {
                    if self.fire_count >= *max {
                        None
                    } else {
                        Some(fire_time + *every)
                    }
                } else {
                    Some(fire_time + *every)
                }
            }
        };

        self.next_fire_time = self.skip_excluded(candidate, calendar);
    }

    /// Applied by the store during acquisition when a fire time has elapsed
    /// without the scheduler acting on it.
    pub fn update_after_misfire(&mut self, now: DateTime<Utc>, calendar: Option<&dyn Calendar>) {
        match self.misfire_policy {
            MisfirePolicy::DoNothing => {
                self.next_fire_time = None;
            }
            MisfirePolicy::IgnoreMisfirePolicy => {
                // Leave next_fire_time as-is; the loop will fire it immediately
                // (current behavior already treats a past fire time as due now).
            }
            MisfirePolicy::FireNowOnce | MisfirePolicy::SmartPolicy => {
                // Catch up to "now" once, then resume normal cadence from there.
                if let Some(nft) = self.next_fire_time {
                    if nft < now {
                        self.next_fire_time = self.skip_excluded(Some(now), calendar);
                    }
                }
            }
        }
    }

    fn raw_first_candidate(&self) -> Option<DateTime<Utc>> {
        match &self.schedule {
            Schedule::Once { at } => Some(*at),
            Schedule::Interval { start, .. } => Some(*start),
        }
    }

    fn skip_excluded(
        &self,
        mut candidate: Option<DateTime<Utc>>,
        calendar: Option<&dyn Calendar>,
    ) -> Option<DateTime<Utc>> {
        let Some(cal) = calendar else { return candidate };
        // Bounded search: a calendar that excludes every candidate for a
        // year's worth of steps is treated as "never fires" rather than
        // looping forever.
        let step = match &self.schedule {
            Schedule::Interval { every, .. } => *every,
            Schedule::Once { .. } => ChronoDuration::days(1),
        };
        let mut attempts = 0;
        while let Some(t) = candidate {
            if !cal.is_time_excluded(t) {
                return Some(t);
            }
            attempts += 1;
            if attempts > 366 || step.num_milliseconds() <= 0 {
                return None;
            }
            candidate = Some(t + step);
        }
        None
    }
}
