use crate::{
    api::CredentialStore,
    errors::{StoreError, StoreResult},
};
use pool_core::warn;
use pool_pow::Target;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::{future::Future, sync::Arc, time::Duration};
use tokio::time::timeout;

pub const CREDENTIAL_PREFIX: &str = "credential";

/// Store key for a login: a SHA-256 over the JSON object
/// `{"user": <user>, "password": <password>}`.
pub fn credential_key(user: &str, password: &str) -> String {
    let material = format!("{{\"user\": {}, \"password\": {}}}", Value::from(user), Value::from(password));
    format!("{CREDENTIAL_PREFIX}:{}", hex::encode(Sha256::digest(material.as_bytes())))
}

/// An authorized worker as loaded from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Worker {
    pub name: String,
    pub difficulty: f64,
    pub target: Target,
    pub accumulated_work: f64,
}

/// Worker authorization, difficulty assignment and work accounting, all kept
/// in the credential store under an instance namespace.
pub struct WorkerRegistry {
    store: Arc<dyn CredentialStore>,
    namespace: String,
    default_difficulty: f64,
    store_timeout: Duration,
}

impl WorkerRegistry {
    /// A non-positive `default_difficulty` is replaced by 1. Every store call
    /// fails with [`StoreError::Unavailable`] after `store_timeout`.
    pub fn new(store: Arc<dyn CredentialStore>, namespace: impl Into<String>, default_difficulty: f64, store_timeout: Duration) -> Self {
        let default_difficulty = if valid_difficulty(default_difficulty) { default_difficulty } else { 1.0 };
        Self { store, namespace: namespace.into(), default_difficulty, store_timeout }
    }

    pub async fn authorize(&self, name: &str, secret: &str) -> StoreResult<bool> {
        Ok(self.get(&credential_key(name, secret)).await?.is_some())
    }

    /// Loads the worker, creating its work counter if the store has none yet.
    pub async fn load_worker(&self, name: &str) -> StoreResult<Worker> {
        let difficulty = self.difficulty(name).await?;
        let accumulated_work = self.increment(&self.work_key(name), 0.0).await?;
        Ok(Worker { name: name.to_owned(), difficulty, target: Target::from_difficulty(difficulty), accumulated_work })
    }

    /// The stored difficulty, or the pool default when unset or unusable.
    pub async fn difficulty(&self, name: &str) -> StoreResult<f64> {
        let Some(stored) = self.get(&self.difficulty_key(name)).await? else {
            return Ok(self.default_difficulty);
        };
        match stored.parse::<f64>() {
            Ok(difficulty) if valid_difficulty(difficulty) => Ok(difficulty),
            _ => {
                warn!("Ignoring invalid difficulty `{}` stored for worker {}", stored, name);
                Ok(self.default_difficulty)
            }
        }
    }

    pub async fn target(&self, name: &str) -> StoreResult<Target> {
        Ok(Target::from_difficulty(self.difficulty(name).await?))
    }

    /// Credits work to the worker, returning its new total.
    pub async fn add_work(&self, name: &str, amount: f64) -> StoreResult<f64> {
        self.increment(&self.work_key(name), amount).await
    }

    pub fn default_difficulty(&self) -> f64 {
        self.default_difficulty
    }

    pub fn difficulty_key(&self, name: &str) -> String {
        format!("{}:{}:difficulty", self.namespace, name)
    }

    pub fn work_key(&self, name: &str) -> String {
        format!("{}:{}:current_work", self.namespace, name)
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.bounded(self.store.get(key)).await
    }

    async fn increment(&self, key: &str, amount: f64) -> StoreResult<f64> {
        self.bounded(self.store.atomic_increment(key, amount)).await
    }

    async fn bounded<T>(&self, call: impl Future<Output = StoreResult<T>>) -> StoreResult<T> {
        timeout(self.store_timeout, call)
            .await
            .map_err(|_| StoreError::Unavailable(format!("no answer within {} ms", self.store_timeout.as_millis())))?
    }
}

fn valid_difficulty(difficulty: f64) -> bool {
    difficulty.is_finite() && difficulty > 0.0
}
