use crate::{
    extranonce::ExtranonceAllocator,
    session::{StratumConfig, StratumContext},
};
use pool_mining::{
    ShareCounters,
    api::CredentialStore,
    manager::{JobManager, JobManagerConfig},
    registry::WorkerRegistry,
    store::MemoryCredentialStore,
    testutils::{fixtures, template_client_mock::TemplateClientMock},
};
use std::{sync::Arc, time::Duration};

pub const WORKER: &str = "alice.rig1";
pub const PASSWORD: &str = "x";
pub const STORE_TIMEOUT: Duration = Duration::from_millis(200);

pub struct Harness {
    pub client: Arc<TemplateClientMock>,
    pub ctx: Arc<StratumContext>,
}

/// A context over a mocked daemon whose first job is already published.
/// [`WORKER`] may log in with [`PASSWORD`] and mines at
/// [`fixtures::EASY_DIFFICULTY`].
pub async fn harness(bits: u32, idle_timeout: Duration) -> Harness {
    let store = Arc::new(MemoryCredentialStore::new());
    store.add_credential(WORKER, PASSWORD);
    harness_with_store(bits, idle_timeout, store).await
}

/// Like [`harness`] but backed by the given store, bounded by [`STORE_TIMEOUT`].
pub async fn harness_with_store(bits: u32, idle_timeout: Duration, store: Arc<dyn CredentialStore>) -> Harness {
    let client = Arc::new(TemplateClientMock::new(fixtures::block_template_with_bits(2, bits)));
    let job_manager = Arc::new(JobManager::new(
        client.clone(),
        JobManagerConfig {
            pool_tag: fixtures::POOL_TAG.to_vec(),
            extranonce_size: fixtures::EXTRANONCE1_SIZE + fixtures::EXTRANONCE2_SIZE,
            payout_script: Some(fixtures::payout_script()),
            rpc_timeout: Duration::from_secs(1),
        },
    ));
    job_manager.rebuild().await.expect("mock template builds");

    let ctx = Arc::new(StratumContext {
        job_manager,
        registry: Arc::new(WorkerRegistry::new(store, "btc", fixtures::EASY_DIFFICULTY, STORE_TIMEOUT)),
        extranonces: Arc::new(ExtranonceAllocator::new()),
        counters: Arc::new(ShareCounters::default()),
        config: StratumConfig { extranonce2_size: fixtures::EXTRANONCE2_SIZE, idle_timeout },
    });
    Harness { client, ctx }
}
