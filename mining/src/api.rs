use crate::{
    errors::{StoreResult, TemplateResult},
    model::template::BlockTemplate,
};
use async_trait::async_trait;

/// The coin daemon as seen by the job pipeline.
#[async_trait]
pub trait TemplateClient: Send + Sync {
    async fn get_block_template(&self) -> TemplateResult<BlockTemplate>;

    /// Submits a fully assembled, serialized block.
    async fn submit_block(&self, block: &[u8]) -> TemplateResult<()>;
}

/// Key/value storage for worker credentials and accumulated work.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Adds `amount` to the number stored at `key` (absent counts as zero) and
    /// returns the new value. Concurrent increments of one key never lose updates.
    async fn atomic_increment(&self, key: &str, amount: f64) -> StoreResult<f64>;
}
