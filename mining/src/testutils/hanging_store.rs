use crate::{api::CredentialStore, errors::StoreResult};
use async_trait::async_trait;
use std::future::pending;

/// A credential store that never answers.
pub struct HangingStore;

#[async_trait]
impl CredentialStore for HangingStore {
    async fn get(&self, _key: &str) -> StoreResult<Option<String>> {
        pending().await
    }

    async fn atomic_increment(&self, _key: &str, _amount: f64) -> StoreResult<f64> {
        pending().await
    }
}
