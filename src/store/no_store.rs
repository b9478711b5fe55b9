use super::Store;
use crate::error::StoreError;
use async_trait::async_trait;

/// A no-op store that always returns an error if called,
/// indicating the store is disabled.
pub struct NoStore;

impl NoStore {
    pub fn new() -> Self {
        NoStore
    }
}

impl Default for NoStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for NoStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(StoreError::Disabled)
    }

    async fn set(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
        Err(StoreError::Disabled)
    }

    async fn remove(&self, _key: &str) -> Result<(), StoreError> {
        Err(StoreError::Disabled)
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test that every operation on NoStore fails.
    #[tokio::test]
    async fn test_no_store_rejects_everything() {
        let no_store = NoStore::new();
        assert_eq!(no_store.get("k").await, Err(StoreError::Disabled));
        assert_eq!(no_store.set("k", "v").await, Err(StoreError::Disabled));
        assert_eq!(no_store.remove("k").await, Err(StoreError::Disabled));
        assert!(!no_store.is_enabled());
    }
}
