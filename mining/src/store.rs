use crate::{
    api::CredentialStore,
    errors::{StoreError, StoreResult},
    registry::credential_key,
};
use async_trait::async_trait;
use dashmap::DashMap;

/// Process-local [`CredentialStore`]. Increments hold the key's shard lock for
/// the read-modify-write, so concurrent increments never lose updates.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    entries: DashMap<String, String>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Registers a login. The stored value is the worker name.
    pub fn add_credential(&self, user: &str, password: &str) {
        self.set(credential_key(user, password), user);
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn atomic_increment(&self, key: &str, amount: f64) -> StoreResult<f64> {
        let mut entry = self.entries.entry(key.to_owned()).or_insert_with(|| "0".to_owned());
        let current: f64 = entry.parse().map_err(|_| StoreError::NotANumber(key.to_owned()))?;
        let updated = current + amount;
        *entry = updated.to_string();
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_get_and_increment() {
        let store = MemoryCredentialStore::new();
        assert_eq!(store.get("missing").await.unwrap(), None);
        assert_eq!(store.atomic_increment("work", 2.5).await.unwrap(), 2.5);
        assert_eq!(store.atomic_increment("work", 0.5).await.unwrap(), 3.0);
        assert_eq!(store.get("work").await.unwrap().as_deref(), Some("3"));

        store.set("name", "alice");
        assert_eq!(store.atomic_increment("name", 1.0).await, Err(StoreError::NotANumber("name".to_string())));
        assert_eq!(store.get("name").await.unwrap().as_deref(), Some("alice"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments_are_not_lost() {
        let store = Arc::new(MemoryCredentialStore::new());
        let tasks: Vec<_> = (0..64)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    for _ in 0..10 {
                        store.atomic_increment("btc:alice:current_work", 1.0).await.unwrap();
                    }
                })
            })
            .collect();
        for result in futures_util::future::join_all(tasks).await {
            result.unwrap();
        }
        assert_eq!(store.get("btc:alice:current_work").await.unwrap().as_deref(), Some("640"));
    }
}
