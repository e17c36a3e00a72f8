use std::sync::Arc;
use std::time::Duration;

use orchestrator_core::config::{StoreBackend, StoreConfig};
use orchestrator_core::OrchestratorResult;
use orchestrator_domain::ports::TaskStore;
use tracing::{debug, info};

use crate::{InMemoryTaskStore, RedisTaskStore};

pub struct TaskStoreFactory;

impl TaskStoreFactory {
    pub async fn create(config: &StoreConfig) -> OrchestratorResult<Arc<dyn TaskStore>> {
        debug!("Creating task store with backend: {:?}", config.backend);

        match config.backend {
            StoreBackend::Memory => {
                info!(
                    task_ttl_seconds = config.task_ttl_seconds,
                    "Initializing in-memory task store"
                );
                Ok(Arc::new(InMemoryTaskStore::with_ttl(Duration::from_secs(
                    config.task_ttl_seconds,
                ))))
            }
            StoreBackend::Redis => {
                info!("Initializing Redis task store");
                let store = RedisTaskStore::new(config).await?;
                Ok(Arc::new(store))
            }
        }
    }

    pub fn get_backend_string(backend: &StoreBackend) -> &'static str {
        match backend {
            StoreBackend::Memory => "memory",
            StoreBackend::Redis => "redis",
        }
    }
}
