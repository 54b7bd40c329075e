use crate::{
    error::{StratumError, StratumResult},
    extranonce::{Extranonce1, ExtranonceAllocator},
    protocol::{
        MiningAuthorizeParams, Outbound, StratumMethod, StratumRequest, create_error_response, create_error_response_with_result,
        create_success_response, notify_notification, parse_message, set_difficulty_notification,
    },
};
use pool_core::{debug, info, warn};
use pool_mining::{
    ShareCounters,
    errors::ShareRejection,
    manager::JobManager,
    model::job::JobTemplate,
    registry::{Worker, WorkerRegistry},
    share::{Share, ShareProof, Verdict, validate},
};
use serde_json::{Value, json};
use std::{net::SocketAddr, sync::Arc, time::Duration};

#[derive(Debug, Clone)]
pub struct StratumConfig {
    pub extranonce2_size: usize,
    /// Connections with no inbound line for this long are closed
    pub idle_timeout: Duration,
}

/// Everything sessions share. Built once and handed to every connection task.
pub struct StratumContext {
    pub job_manager: Arc<JobManager>,
    pub registry: Arc<WorkerRegistry>,
    pub extranonces: Arc<ExtranonceAllocator>,
    pub counters: Arc<ShareCounters>,
    pub config: StratumConfig,
}

/// Per-connection protocol state.
///
/// A session is `Connected` until subscribed (it holds an extranonce1) and
/// authorized (it holds a worker). Only `mining.subscribe` and
/// `mining.authorize` are dispatched before authorization.
pub struct Session {
    ctx: Arc<StratumContext>,
    peer: SocketAddr,
    extranonce1: Option<Extranonce1>,
    worker: Option<Worker>,
}

impl Session {
    pub fn new(ctx: Arc<StratumContext>, peer: SocketAddr) -> Self {
        Self { ctx, peer, extranonce1: None, worker: None }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_subscribed(&self) -> bool {
        self.extranonce1.is_some()
    }

    pub fn is_authorized(&self) -> bool {
        self.worker.is_some()
    }

    pub fn extranonce1(&self) -> Option<&Extranonce1> {
        self.extranonce1.as_ref()
    }

    pub fn worker(&self) -> Option<&Worker> {
        self.worker.as_ref()
    }

    /// Handles one inbound line and returns what to write back, in order.
    pub async fn handle_line(&mut self, line: &str) -> Vec<Outbound> {
        let request = match parse_message(line) {
            Ok(request) => request,
            Err(err) => {
                debug!("[{}] Malformed message: {}", self.peer, err);
                return vec![Outbound::Response(create_error_response(Value::Null, &err))];
            }
        };

        let method = StratumMethod::from(request.method.as_str());
        if !self.is_authorized() && !method.allowed_before_authorization() {
            debug!("[{}] {} refused before authorization", self.peer, request.method);
            return vec![Outbound::Response(create_error_response(request.id, &StratumError::Unauthorized))];
        }

        match method {
            StratumMethod::Subscribe => self.subscribe(request.id),
            StratumMethod::Authorize => self.authorize(&request).await,
            StratumMethod::Submit => vec![respond(request.id.clone(), self.submit(&request).await.map(|()| Value::Bool(true)))],
            StratumMethod::Capabilities
            | StratumMethod::ExtranonceSubscribe
            | StratumMethod::SuggestDifficulty
            | StratumMethod::SuggestTarget => vec![Outbound::Response(create_success_response(request.id, Value::Bool(true)))],
            StratumMethod::GetTransactions => vec![respond(request.id.clone(), self.transactions(&request))],
            StratumMethod::BlockNotify | StratumMethod::Unknown(_) => {
                vec![Outbound::Response(create_error_response(request.id, &StratumError::MethodNotFound(request.method)))]
            }
        }
    }

    /// The `mining.notify` to forward for a freshly published job, if this
    /// session is mining.
    pub fn on_new_job(&self, job: &JobTemplate) -> Option<Outbound> {
        (self.is_subscribed() && self.is_authorized()).then(|| Outbound::Notification(notify_notification(job)))
    }

    fn subscribe(&mut self, id: Value) -> Vec<Outbound> {
        // a second subscribe swaps in a fresh extranonce1 and frees the old one
        let extranonce1 = self.ctx.extranonces.allocate();
        let subscription = extranonce1.to_hex();
        debug!("[{}] Subscribed with extranonce1 {}", self.peer, subscription);
        let result = json!([
            [["mining.set_difficulty", subscription], ["mining.notify", subscription]],
            extranonce1.to_hex(),
            self.ctx.config.extranonce2_size,
        ]);
        self.extranonce1 = Some(extranonce1);

        let mut out = vec![Outbound::Response(create_success_response(id, result))];
        if let Some(worker) = self.worker.as_ref() {
            out.push(Outbound::Notification(set_difficulty_notification(worker.difficulty)));
            out.extend(self.current_job_notification());
        }
        out
    }

    async fn authorize(&mut self, request: &StratumRequest) -> Vec<Outbound> {
        let id = request.id.clone();
        let params = match MiningAuthorizeParams::try_from(request) {
            Ok(params) => params,
            Err(err) => return vec![Outbound::Response(create_error_response(id, &err))],
        };

        let worker = match self.load_authorized(&params).await {
            Ok(Some(worker)) => worker,
            Ok(None) => {
                info!("[{}] Authorization failed for worker {}", self.peer, params.username);
                return vec![Outbound::Response(create_error_response_with_result(id, Value::Bool(false), &StratumError::Unauthorized))];
            }
            Err(err) => {
                warn!("[{}] Authorization of worker {} failed: {}", self.peer, params.username, err);
                return vec![Outbound::Response(create_error_response_with_result(id, Value::Bool(false), &err))];
            }
        };

        info!("[{}] Worker {} authorized at difficulty {}", self.peer, worker.name, worker.difficulty);
        let mut out = vec![
            Outbound::Response(create_success_response(id, Value::Bool(true))),
            Outbound::Notification(set_difficulty_notification(worker.difficulty)),
        ];
        self.worker = Some(worker);
        if self.is_subscribed() {
            out.extend(self.current_job_notification());
        }
        out
    }

    async fn load_authorized(&self, params: &MiningAuthorizeParams) -> StratumResult<Option<Worker>> {
        if !self.ctx.registry.authorize(&params.username, &params.password).await? {
            return Ok(None);
        }
        Ok(Some(self.ctx.registry.load_worker(&params.username).await?))
    }

    async fn submit(&self, request: &StratumRequest) -> StratumResult<()> {
        let share = Share::try_from(request)?;
        let extranonce1 = self.extranonce1.as_ref().ok_or(ShareRejection::NotSubscribed)?;
        let worker = self.worker.as_ref().ok_or(StratumError::Unauthorized)?;
        if share.worker_name != worker.name {
            debug!("[{}] Submit names worker {} but {} is authorized", self.peer, share.worker_name, worker.name);
            return Err(StratumError::Unauthorized);
        }
        let job = self.ctx.job_manager.current_snapshot().ok_or(ShareRejection::StaleJob)?;

        let verdict = validate(&extranonce1.bytes(), &job, &share, &worker.target, self.ctx.config.extranonce2_size);
        self.ctx.counters.record(&verdict);
        match verdict {
            Verdict::Rejected(rejection) => {
                debug!("[{}] Share from {} rejected: {}", self.peer, worker.name, rejection);
                Err(rejection.into())
            }
            Verdict::Accepted(proof) => {
                debug!("[{}] Share from {} accepted, difficulty {:.4}", self.peer, worker.name, proof.difficulty);
                self.credit(worker, &proof).await
            }
            Verdict::BlockFound(proof, block) => {
                info!("Block candidate {} at height {} found by {}", proof.hash, job.height, worker.name);
                let credited = self.credit(worker, &proof).await;
                // submission failures are logged by the job manager, the share itself was valid
                let _ = self.ctx.job_manager.block_found(block).await;
                credited
            }
        }
    }

    async fn credit(&self, worker: &Worker, proof: &ShareProof) -> StratumResult<()> {
        match self.ctx.registry.add_work(&worker.name, worker.difficulty).await {
            Ok(total) => {
                debug!("[{}] Worker {} work now {} (share hash {})", self.peer, worker.name, total, proof.hash);
                Ok(())
            }
            Err(err) => {
                warn!("[{}] Failed to credit work to {}: {}", self.peer, worker.name, err);
                Err(err.into())
            }
        }
    }

    fn transactions(&self, request: &StratumRequest) -> StratumResult<Value> {
        let job = self.ctx.job_manager.current_snapshot().ok_or(ShareRejection::StaleJob)?;
        let requested = request.params.first().and_then(Value::as_str).and_then(|id| u64::from_str_radix(id, 16).ok());
        if requested != Some(job.job_id) {
            return Err(ShareRejection::StaleJob.into());
        }
        Ok(json!(job.transactions.iter().map(hex::encode).collect::<Vec<_>>()))
    }

    fn current_job_notification(&self) -> Option<Outbound> {
        self.ctx.job_manager.current_snapshot().map(|job| Outbound::Notification(notify_notification(&job)))
    }
}

fn respond(id: Value, result: StratumResult<Value>) -> Outbound {
    Outbound::Response(match result {
        Ok(result) => create_success_response(id, result),
        Err(err) => create_error_response(id, &err),
    })
}
