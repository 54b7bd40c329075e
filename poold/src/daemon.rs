use crate::args::{Args, ConfigError};
use pool_bitcoind::{BitcoindClient, BitcoindConfig};
use pool_core::{info, warn};
use pool_mining::{
    ShareCounters,
    manager::{JobManager, JobManagerConfig},
    registry::WorkerRegistry,
    store::MemoryCredentialStore,
};
use pool_stratum::{
    ControlListener, StratumConfig, StratumContext, StratumError, StratumListener,
    extranonce::{EXTRANONCE1_SIZE, ExtranonceAllocator},
};
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio::time::{MissedTickBehavior, interval};

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to start listener: {0}")]
    Listener(#[from] StratumError),
}

/// A fully wired pool whose sockets are bound but not yet serving.
pub struct Daemon {
    pub ctx: Arc<StratumContext>,
    pub stratum: StratumListener,
    pub control: ControlListener,
    poll_interval: Option<Duration>,
    stats_interval: Option<Duration>,
}

/// Loads the configured worker logins and difficulties into a fresh store.
pub fn seed_store(args: &Args) -> Arc<MemoryCredentialStore> {
    let store = Arc::new(MemoryCredentialStore::new());
    let registry = WorkerRegistry::new(store.clone(), args.instance_id.clone(), args.default_difficulty, args.store_timeout());
    for worker in args.workers.iter() {
        store.add_credential(&worker.name, &worker.password);
        if let Some(difficulty) = worker.difficulty {
            store.set(registry.difficulty_key(&worker.name), difficulty.to_string());
        }
    }
    store
}

impl Daemon {
    pub async fn bind(args: &Args) -> Result<Self, DaemonError> {
        args.validate()?;
        let payout_script = args.payout_script_bytes()?;
        if payout_script.is_none() {
            warn!("No payout-script configured, templates without coinbasetxn will be refused");
        }
        if args.workers.is_empty() {
            warn!("No workers configured, every authorization will fail");
        }

        let client = Arc::new(BitcoindClient::new(BitcoindConfig {
            url: args.rpc_url.clone(),
            user: args.rpc_user.clone(),
            password: args.rpc_password.clone(),
        }));
        let job_manager = Arc::new(JobManager::new(
            client,
            JobManagerConfig {
                pool_tag: args.pool_tag.as_bytes().to_vec(),
                extranonce_size: EXTRANONCE1_SIZE + args.extranonce2_size,
                payout_script,
                rpc_timeout: Duration::from_millis(args.rpc_timeout_ms),
            },
        ));
        let registry = Arc::new(WorkerRegistry::new(seed_store(args), args.instance_id.clone(), args.default_difficulty, args.store_timeout()));
        let ctx = Arc::new(StratumContext {
            job_manager: job_manager.clone(),
            registry,
            extranonces: Arc::new(ExtranonceAllocator::new()),
            counters: Arc::new(ShareCounters::default()),
            config: StratumConfig {
                extranonce2_size: args.extranonce2_size,
                idle_timeout: Duration::from_secs(args.idle_timeout_secs),
            },
        });

        let stratum = StratumListener::bind(args.listen, ctx.clone()).await?;
        let control = ControlListener::bind(args.control_listen, job_manager).await?;
        Ok(Self {
            ctx,
            stratum,
            control,
            poll_interval: (args.poll_interval_ms > 0).then(|| Duration::from_millis(args.poll_interval_ms)),
            stats_interval: (args.stats_interval_secs > 0).then(|| Duration::from_secs(args.stats_interval_secs)),
        })
    }

    /// Builds the first job and starts serving. Returns once every task is
    /// spawned; the caller decides how long the process lives.
    pub async fn start(self) {
        // a daemon that is still starting up is not fatal, the next notification retries
        if self.ctx.job_manager.rebuild().await.is_err() {
            warn!("No initial job, miners will get work after the next block notification");
        }
        if let Some(period) = self.poll_interval {
            info!("Polling for new templates every {:?}", period);
            tokio::spawn(self.ctx.job_manager.clone().poll(period));
        }
        if let Some(period) = self.stats_interval {
            tokio::spawn(report_counters(self.ctx.counters.clone(), period));
        }
        tokio::spawn(self.stratum.run());
        tokio::spawn(self.control.run());
    }
}

async fn report_counters(counters: Arc<ShareCounters>, period: Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick completes immediately
    ticker.tick().await;
    let mut last = counters.snapshot();
    loop {
        ticker.tick().await;
        let snapshot = counters.snapshot();
        let delta = &snapshot - &last;
        info!(
            "Shares in the last {:?}: {} accepted, {} rejected, {} stale, {} blocks (totals {}/{}/{}/{})",
            period,
            delta.accepted,
            delta.rejected,
            delta.stale,
            delta.blocks_found,
            snapshot.accepted,
            snapshot.rejected,
            snapshot.stale,
            snapshot.blocks_found
        );
        last = snapshot;
    }
}
