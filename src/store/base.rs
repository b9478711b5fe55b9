use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use super::{memory_store::MemoryStore, mongodb_store::MongoDBStore, no_store::NoStore};
use crate::config::{StoreBackend, StoreConfig};
use crate::error::StoreError;

/// The Store trait abstracts the small durable key/value map the
/// authentication summary is cached in (get, set, remove).
#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
    fn is_enabled(&self) -> bool {
        // Default implementation should return always True for real stores
        // No store will return false so we can write better debug messages
        true
    }
}

/// Creates a concrete store implementation based on the StoreConfig.
/// If `store.enabled = false`, returns NoStore. Otherwise, picks the specified backend.
pub async fn create_store(config: &StoreConfig) -> Result<Arc<dyn Store>, StoreError> {
    if !config.enabled {
        info!("Auth record store is disabled. Using NoStore.");
        return Ok(Arc::new(NoStore::new()));
    }

    match &config.backend {
        Some(StoreBackend::Memory) => {
            info!("Using in-memory auth record store.");
            Ok(Arc::new(MemoryStore::new()))
        }
        Some(StoreBackend::MongoDB(mongo_config)) => {
            let store = MongoDBStore::new(mongo_config).await.map_err(|e| {
                error!("Failed to create MongoDB store: {}", e);
                e
            })?;
            info!("Successfully created MongoDB store.");
            Ok(Arc::new(store))
        }
        None => {
            error!("Store is enabled, but no backend config is provided!");
            Err(StoreError::Backend(
                "store is enabled but no backend is configured".to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_config_yields_no_store() {
        let config = StoreConfig {
            enabled: false,
            backend: None,
        };
        let store = create_store(&config).await.expect("NoStore is always available");
        assert!(!store.is_enabled());
    }

    #[tokio::test]
    async fn test_enabled_without_backend_is_rejected() {
        let config = StoreConfig {
            enabled: true,
            backend: None,
        };
        assert!(create_store(&config).await.is_err());
    }

    #[tokio::test]
    async fn test_memory_backend() {
        let config = StoreConfig {
            enabled: true,
            backend: Some(StoreBackend::Memory),
        };
        let store = create_store(&config).await.expect("memory store");
        assert!(store.is_enabled());
        store.set("k", "v").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
    }
}
