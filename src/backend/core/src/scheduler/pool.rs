//! Bounded concurrent execution of submitted job bodies.
//!
//! Grounded on the teacher's `orchestrator::worker_pool` module: a
//! semaphore-bounded pool with an RAII permit, reused here behind a small
//! trait so the engine can be driven by any pool implementation.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{ApexError, Result};

/// Bounded concurrent execution of submitted tasks (§3 WorkerPool collaborator).
#[async_trait]
pub trait WorkerPool: Send + Sync {
    /// Block until a worker slot is available, returning a permit that
    /// releases the slot on drop.
    async fn acquire(&self) -> Result<WorkerPermit>;

    /// Worker slots available *right now*, without waiting.
    fn available_permits(&self) -> usize;

    fn max_workers(&self) -> usize;
}

/// RAII guard representing one occupied worker slot.
pub struct WorkerPermit {
    _permit: OwnedSemaphorePermit,
    active: Arc<AtomicUsize>,
}

impl Drop for WorkerPermit {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Semaphore-bounded worker pool.
pub struct TokioWorkerPool {
    semaphore: Arc<Semaphore>,
    max_workers: usize,
    active: Arc<AtomicUsize>,
}

impl TokioWorkerPool {
    pub fn new(max_workers: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_workers)),
            max_workers,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn active_workers(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkerPool for TokioWorkerPool {
    async fn acquire(&self) -> Result<WorkerPermit> {
        let span = tracing::info_span!("worker_pool_acquire");
        let _enter = span.enter();
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| ApexError::scheduler_store_fatal(format!("worker pool closed: {e}")))?;
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::trace!(active, max = self.max_workers, "worker slot acquired");
        Ok(WorkerPermit {
            _permit: permit,
            active: self.active.clone(),
        })
    }

    fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    fn max_workers(&self) -> usize {
        self.max_workers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_release_round_trip() {
        let pool = TokioWorkerPool::new(2);
        assert_eq!(pool.available_permits(), 2);
        let p1 = pool.acquire().await.unwrap();
        assert_eq!(pool.available_permits(), 1);
        assert_eq!(pool.active_workers(), 1);
        drop(p1);
        assert_eq!(pool.available_permits(), 2);
        assert_eq!(pool.active_workers(), 0);
    }

    #[tokio::test]
    async fn acquire_blocks_at_capacity() {
        let pool = Arc::new(TokioWorkerPool::new(1));
        let p1 = pool.acquire().await.unwrap();
        let pool2 = pool.clone();
        let handle = tokio::spawn(async move { pool2.acquire().await });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!handle.is_finished());
        drop(p1);
        let p2 = handle.await.unwrap().unwrap();
        drop(p2);
    }
}
