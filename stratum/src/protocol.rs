//! Stratum protocol message types and parsing

use crate::error::{StratumError, StratumResult};
use pool_hashes::Hash;
use pool_mining::{model::job::JobTemplate, share::Share};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Stratum request message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StratumRequest {
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Vec<Value>,
}

/// Stratum response message. `result` and `error` are always present, the
/// absent one as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StratumResponse {
    pub id: Value,
    pub result: Value,
    pub error: Option<StratumErrorResponse>,
}

/// Stratum error triple `[code, message, traceback]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StratumErrorResponse(pub i64, pub String, pub Option<Value>);

/// Stratum notification/event message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StratumNotification {
    pub id: Value,
    pub method: String,
    pub params: Vec<Value>,
}

/// Anything the server writes to a connection
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Outbound {
    Response(StratumResponse),
    Notification(StratumNotification),
}

impl Outbound {
    /// One protocol line, without the trailing newline.
    pub fn to_line(&self) -> StratumResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StratumMethod {
    Subscribe,
    Authorize,
    Submit,
    Capabilities,
    ExtranonceSubscribe,
    GetTransactions,
    SuggestDifficulty,
    SuggestTarget,
    /// Operator trigger, served on the control channel only
    BlockNotify,
    Unknown(String),
}

impl StratumMethod {
    /// Methods dispatched while the connection is not yet authorized.
    pub fn allowed_before_authorization(&self) -> bool {
        matches!(self, StratumMethod::Authorize | StratumMethod::Subscribe)
    }
}

impl From<&str> for StratumMethod {
    fn from(method: &str) -> Self {
        match method {
            "mining.subscribe" => StratumMethod::Subscribe,
            "mining.authorize" => StratumMethod::Authorize,
            "mining.submit" => StratumMethod::Submit,
            "mining.capabilities" => StratumMethod::Capabilities,
            "mining.extranonce.subscribe" => StratumMethod::ExtranonceSubscribe,
            "mining.get_transactions" => StratumMethod::GetTransactions,
            "mining.suggest_difficulty" => StratumMethod::SuggestDifficulty,
            "mining.suggest_target" => StratumMethod::SuggestTarget,
            "daemon.blocknotify" => StratumMethod::BlockNotify,
            other => StratumMethod::Unknown(other.to_owned()),
        }
    }
}

/// Mining authorize request parameters
#[derive(Debug, Clone)]
pub struct MiningAuthorizeParams {
    pub username: String,
    pub password: String,
}

impl TryFrom<&StratumRequest> for MiningAuthorizeParams {
    type Error = StratumError;

    fn try_from(req: &StratumRequest) -> Result<Self, Self::Error> {
        let username = string_param(req, 0, "username")?;
        // some firmwares omit the password entirely
        let password = match req.params.get(1) {
            None | Some(Value::Null) => String::new(),
            Some(_) => string_param(req, 1, "password")?,
        };
        Ok(MiningAuthorizeParams { username, password })
    }
}

/// `mining.submit` params: worker, job id, extranonce2, ntime, nonce
impl TryFrom<&StratumRequest> for Share {
    type Error = StratumError;

    fn try_from(req: &StratumRequest) -> Result<Self, Self::Error> {
        Ok(Share {
            worker_name: string_param(req, 0, "worker name")?,
            job_id: string_param(req, 1, "job_id")?,
            extranonce2: string_param(req, 2, "extranonce2")?,
            ntime: string_param(req, 3, "ntime")?,
            nonce: string_param(req, 4, "nonce")?,
        })
    }
}

fn string_param(req: &StratumRequest, index: usize, name: &str) -> StratumResult<String> {
    req.params
        .get(index)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| StratumError::Protocol(format!("{name} parameter must be a string")))
}

/// Parses one inbound line. Invalid JSON and JSON that is not a request are
/// told apart so they map to distinct error codes.
pub fn parse_message(line: &str) -> StratumResult<StratumRequest> {
    let value: Value = serde_json::from_str(line)?;
    serde_json::from_value(value).map_err(|err| StratumError::Protocol(err.to_string()))
}

/// Create a success response
pub fn create_success_response(id: Value, result: Value) -> StratumResponse {
    StratumResponse { id, result, error: None }
}

/// Create an error response
pub fn create_error_response(id: Value, error: &StratumError) -> StratumResponse {
    create_error_response_with_result(id, Value::Null, error)
}

pub fn create_error_response_with_result(id: Value, result: Value, error: &StratumError) -> StratumResponse {
    StratumResponse { id, result, error: Some(StratumErrorResponse(error.code(), error.to_string(), None)) }
}

/// Create a notification message
pub fn create_notification(method: &str, params: Vec<Value>) -> StratumNotification {
    StratumNotification { id: Value::Null, method: method.to_owned(), params }
}

pub fn set_difficulty_notification(difficulty: f64) -> StratumNotification {
    create_notification("mining.set_difficulty", vec![json!(difficulty)])
}

/// `mining.notify` for a job
pub fn notify_notification(job: &JobTemplate) -> StratumNotification {
    create_notification(
        "mining.notify",
        vec![
            json!(job.job_id_hex()),
            json!(stratum_prev_hash(&job.prev_hash)),
            json!(hex::encode(&job.coinbase1)),
            json!(hex::encode(&job.coinbase2)),
            json!(job.merkle_branch.iter().map(Hash::to_internal_hex).collect::<Vec<_>>()),
            json!(format!("{:08x}", job.version)),
            json!(format!("{:08x}", job.bits)),
            json!(format!("{:08x}", job.cur_time)),
            json!(job.clean_jobs),
        ],
    )
}

/// Previous block hash as miners expect it: internal byte order with every
/// 4-byte word reversed.
pub fn stratum_prev_hash(hash: &Hash) -> String {
    let mut bytes = hash.as_bytes();
    bytes.chunks_exact_mut(4).for_each(|word| word.reverse());
    hex::encode(bytes)
}
