use crate::{
    api::TemplateClient,
    block_template::builder::JobBuilder,
    errors::{TemplateError, TemplateResult},
    model::{job::JobTemplate, template::BlockTemplate},
};
use arc_swap::ArcSwapOption;
use pool_core::{debug, error, info, warn};
use pool_hashes::Hash;
use std::{future::Future, str::FromStr, sync::Arc, time::Duration};
use tokio::{
    sync::{Mutex, broadcast},
    time::{MissedTickBehavior, interval, timeout},
};

/// Job ids wrap here rather than at a narrower integer boundary.
pub const JOB_ID_SENTINEL: u64 = i64::MAX as u64;

const JOB_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone)]
pub struct JobManagerConfig {
    pub pool_tag: Vec<u8>,
    /// Combined extranonce1 and extranonce2 size
    pub extranonce_size: usize,
    pub payout_script: Option<Vec<u8>>,
    /// Bound on every daemon call
    pub rpc_timeout: Duration,
}

/// Owns the current job and is its only writer.
pub struct JobManager {
    client: Arc<dyn TemplateClient>,
    builder: JobBuilder,
    rpc_timeout: Duration,
    current: ArcSwapOption<JobTemplate>,
    /// Serializes rebuilds and holds the last assigned job id
    last_job_id: Mutex<u64>,
    notifier: broadcast::Sender<Arc<JobTemplate>>,
}

impl JobManager {
    pub fn new(client: Arc<dyn TemplateClient>, config: JobManagerConfig) -> Self {
        let (notifier, _) = broadcast::channel(JOB_CHANNEL_CAPACITY);
        Self {
            client,
            builder: JobBuilder::new(config.pool_tag, config.extranonce_size, config.payout_script),
            rpc_timeout: config.rpc_timeout,
            current: ArcSwapOption::empty(),
            last_job_id: Mutex::new(0),
            notifier,
        }
    }

    /// Receives every job published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<JobTemplate>> {
        self.notifier.subscribe()
    }

    /// The current job, if any template was ever built.
    pub fn current_snapshot(&self) -> Option<Arc<JobTemplate>> {
        self.current.load_full()
    }

    /// Fetches a fresh template and publishes a new job built from it. On
    /// failure the previous job stays in effect.
    pub async fn rebuild(&self) -> TemplateResult<Arc<JobTemplate>> {
        let mut last_job_id = self.last_job_id.lock().await;
        let result = match self.fetch_template().await {
            Ok(template) => self.publish(&template, &mut last_job_id),
            Err(err) => Err(err),
        };
        if let Err(err) = &result {
            warn!("Job rebuild failed, keeping the previous job: {}", err);
        }
        result
    }

    /// Like [`Self::rebuild`] but publishes only when the previous block hash
    /// moved. Returns the new job if one was published.
    pub async fn rebuild_if_changed(&self) -> TemplateResult<Option<Arc<JobTemplate>>> {
        let mut last_job_id = self.last_job_id.lock().await;
        let template = self.fetch_template().await?;
        let tip = template.previous_block_hash.as_deref().and_then(|hash| Hash::from_str(hash).ok());
        let current = self.current.load_full();
        if let (Some(job), Some(tip)) = (current.as_deref(), tip)
            && job.prev_hash == tip
        {
            return Ok(None);
        }
        self.publish(&template, &mut last_job_id).map(Some)
    }

    /// Submits a solved block, then rebuilds no matter what the daemon said.
    pub async fn block_found(&self, block: Vec<u8>) -> TemplateResult<()> {
        let submitted = self.bounded(self.client.submit_block(&block)).await;
        match &submitted {
            Ok(()) => info!("Block submitted ({} bytes)", block.len()),
            Err(err) => error!("Block submission failed: {}", err),
        }
        // rebuild reports its own failure
        let _ = self.rebuild().await;
        submitted
    }

    /// Template polling fallback for daemons without block notifications.
    pub async fn poll(self: Arc<Self>, period: Duration) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.rebuild_if_changed().await {
                Ok(Some(job)) => debug!("Poll picked up a new tip, job {}", job.job_id_hex()),
                Ok(None) => {}
                Err(err) => warn!("Template poll failed: {}", err),
            }
        }
    }

    fn publish(&self, template: &BlockTemplate, last_job_id: &mut u64) -> TemplateResult<Arc<JobTemplate>> {
        let job_id = next_job_id(*last_job_id);
        let job = Arc::new(self.builder.build(template, job_id)?);
        *last_job_id = job_id;
        self.current.store(Some(job.clone()));
        // no live sessions is not an error
        let _ = self.notifier.send(job.clone());
        info!("New job {} at height {} with {} transactions", job.job_id_hex(), job.height, job.transactions.len());
        Ok(job)
    }

    async fn fetch_template(&self) -> TemplateResult<BlockTemplate> {
        self.bounded(self.client.get_block_template()).await
    }

    async fn bounded<T>(&self, call: impl Future<Output = TemplateResult<T>>) -> TemplateResult<T> {
        timeout(self.rpc_timeout, call).await.map_err(|_| TemplateError::Timeout(self.rpc_timeout.as_millis() as u64))?
    }
}

#[inline]
fn next_job_id(previous: u64) -> u64 {
    (previous + 1) % JOB_ID_SENTINEL
}
