//! Process-wide registry of named scheduler instances (§4.7).

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use tokio::sync::RwLock;

use super::facade::SchedulerFacade;
use crate::error::{ApexError, Result};

static REGISTRY: Lazy<RwLock<HashMap<String, Arc<SchedulerFacade>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Register a scheduler under `name`. Fails `DuplicateScheduler` if the
/// name is already taken.
pub async fn register(facade: Arc<SchedulerFacade>) -> Result<()> {
    let mut guard = REGISTRY.write().await;
    if guard.contains_key(facade.name()) {
        return Err(ApexError::scheduler_duplicate_name(facade.name()));
    }
    guard.insert(facade.name().to_string(), facade);
    Ok(())
}

pub async fn lookup(name: &str) -> Option<Arc<SchedulerFacade>> {
    REGISTRY.read().await.get(name).cloned()
}

pub async fn unregister(name: &str) {
    REGISTRY.write().await.remove(name);
}

pub async fn all_names() -> Vec<String> {
    REGISTRY.read().await.keys().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerConfig;
    use crate::scheduler::pool::TokioWorkerPool;
    use crate::scheduler::store::InMemoryJobStore;

    fn make_facade(name: &str) -> Arc<SchedulerFacade> {
        let store: Arc<dyn crate::scheduler::store::JobStore> = Arc::new(InMemoryJobStore::new());
        let pool: Arc<dyn crate::scheduler::pool::WorkerPool> = Arc::new(TokioWorkerPool::new(1));
        SchedulerFacade::new(name, store, pool, SchedulerConfig::default())
    }

    #[tokio::test]
    async fn register_lookup_and_unregister_round_trip() {
        let name = "repo-test-a";
        let facade = make_facade(name);
        register(facade).await.unwrap();
        assert!(lookup(name).await.is_some());
        unregister(name).await;
        assert!(lookup(name).await.is_none());
    }

    #[tokio::test]
    async fn duplicate_name_rejected() {
        let name = "repo-test-b";
        register(make_facade(name)).await.unwrap();
        let err = register(make_facade(name)).await.unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::SchedulerDuplicateName);
        unregister(name).await;
    }
}
