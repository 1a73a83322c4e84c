//! Wakes the scheduling loop early when a scheduling change makes its
//! current wait stale (§4.2 "signal-driven wait truncation").

use chrono::{DateTime, Utc};
use tokio::sync::{Notify, RwLock};

/// Holds the earliest fire time the loop is currently waiting on, and a
/// `Notify` used to interrupt that wait when a fresher candidate appears.
#[derive(Default)]
pub struct Signaler {
    candidate: RwLock<Option<DateTime<Utc>>>,
    notify: Notify,
}

impl Signaler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that scheduling state changed (a new/rescheduled trigger,
    /// pause/resume, etc.) and wake the loop if `new_candidate` is earlier
    /// than whatever it is currently waiting on.
    pub async fn signal_scheduling_change(&self, new_candidate: Option<DateTime<Utc>>) {
        {
            let mut guard = self.candidate.write().await;
            *guard = match (*guard, new_candidate) {
                (Some(cur), Some(new)) => Some(cur.min(new)),
                (None, Some(new)) => Some(new),
                (cur, None) => cur,
            };
        }
        self.notify.notify_one();
    }

    /// Block until either `max_duration` elapses or a scheduling change is
    /// signaled, whichever comes first. Clears the recorded candidate on
    /// return so the next wait starts fresh.
    pub async fn wait(&self, max_duration: std::time::Duration) {
        tokio::select! {
            _ = tokio::time::sleep(max_duration) => {}
            _ = self.notify.notified() => {}
        }
        *self.candidate.write().await = None;
    }

    pub async fn earliest_known_candidate(&self) -> Option<DateTime<Utc>> {
        *self.candidate.read().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn wait_times_out_without_signal() {
        let signaler = Signaler::new();
        let start = tokio::time::Instant::now();
        signaler.wait(Duration::from_millis(20)).await;
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn signal_wakes_waiter_early() {
        let signaler = Arc::new(Signaler::new());
        let waiter = signaler.clone();
        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now();
            waiter.wait(Duration::from_secs(5)).await;
            start.elapsed()
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        signaler.signal_scheduling_change(Some(Utc::now())).await;
        let elapsed = handle.await.unwrap();
        assert!(elapsed < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn candidate_tracks_earliest() {
        let signaler = Signaler::new();
        let later = Utc::now() + chrono::Duration::seconds(10);
        let earlier = Utc::now() + chrono::Duration::seconds(1);
        signaler.signal_scheduling_change(Some(later)).await;
        signaler.signal_scheduling_change(Some(earlier)).await;
        assert_eq!(signaler.earliest_known_candidate().await, Some(earlier));
    }
}
