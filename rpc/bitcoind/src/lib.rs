use async_trait::async_trait;
use pool_core::trace;
use pool_mining::{
    api::TemplateClient,
    errors::{TemplateError, TemplateResult},
    model::template::BlockTemplate,
};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Default)]
pub struct BitcoindConfig {
    pub url: String,
    pub user: Option<String>,
    pub password: Option<String>,
}

/// [`TemplateClient`] speaking bitcoind's JSON-RPC over HTTP. Call timeouts
/// are left to the caller.
pub struct BitcoindClient {
    http: reqwest::Client,
    config: BitcoindConfig,
    next_id: AtomicU64,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

impl BitcoindClient {
    pub fn new(config: BitcoindConfig) -> Self {
        Self { http: reqwest::Client::new(), config, next_id: AtomicU64::new(1) }
    }

    async fn call<T: DeserializeOwned>(&self, method: &'static str, params: Value) -> TemplateResult<Option<T>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        trace!("bitcoind request {} `{}`", id, method);
        let mut request = self.http.post(&self.config.url).json(&json!({"jsonrpc": "1.0", "id": id, "method": method, "params": params}));
        if let Some(user) = self.config.user.as_deref() {
            request = request.basic_auth(user, self.config.password.as_deref());
        }
        let response = request.send().await.map_err(|err| TemplateError::Rpc(format!("{method}: {err}")))?;
        let status = response.status();
        let body = response.text().await.map_err(|err| TemplateError::Rpc(format!("{method}: {err}")))?;
        decode_response(status.is_success(), &body).map_err(|err| match err {
            TemplateError::Rpc(reason) => TemplateError::Rpc(format!("{method}: HTTP {status}: {reason}")),
            other => other,
        })
    }
}

/// bitcoind reports RPC errors with a non-2xx status and a JSON body, so the
/// body is decoded before the status is considered.
fn decode_response<T: DeserializeOwned>(success: bool, body: &str) -> TemplateResult<Option<T>> {
    match serde_json::from_str::<RpcResponse<T>>(body) {
        Ok(RpcResponse { error: Some(error), .. }) => Err(TemplateError::Daemon { code: error.code, message: error.message }),
        Ok(RpcResponse { result, .. }) => Ok(result),
        Err(err) if success => Err(TemplateError::Rpc(format!("undecodable response: {err}"))),
        Err(_) => Err(TemplateError::Rpc(body.chars().take(200).collect())),
    }
}

#[async_trait]
impl TemplateClient for BitcoindClient {
    async fn get_block_template(&self) -> TemplateResult<BlockTemplate> {
        self.call("getblocktemplate", json!([{"rules": ["segwit"]}]))
            .await?
            .ok_or_else(|| TemplateError::Rpc("getblocktemplate: empty result".to_owned()))
    }

    async fn submit_block(&self, block: &[u8]) -> TemplateResult<()> {
        // null on success, otherwise the rejection reason
        match self.call::<String>("submitblock", json!([hex::encode(block)])).await? {
            None => Ok(()),
            Some(reason) => Err(TemplateError::BlockRejected(reason)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_template_result() {
        let body = r#"{"result":{"version":536870912,"previousblockhash":"00","curtime":1,"bits":"207fffff","height":5,"transactions":[]},"error":null,"id":1}"#;
        let template: BlockTemplate = decode_response(true, body).unwrap().unwrap();
        assert_eq!(template.height, Some(5));
        assert_eq!(template.bits.as_deref(), Some("207fffff"));
    }

    #[test]
    fn test_decode_daemon_error() {
        let body = r#"{"result":null,"error":{"code":-10,"message":"Bitcoin Core is in initial sync and waiting for blocks..."},"id":1}"#;
        assert_eq!(
            decode_response::<BlockTemplate>(false, body),
            Err(TemplateError::Daemon { code: -10, message: "Bitcoin Core is in initial sync and waiting for blocks...".to_owned() })
        );
    }

    #[test]
    fn test_decode_submitblock_results() {
        assert_eq!(decode_response::<String>(true, r#"{"result":null,"error":null,"id":2}"#), Ok(None));
        assert_eq!(decode_response::<String>(true, r#"{"result":"duplicate","error":null,"id":2}"#), Ok(Some("duplicate".to_owned())));
    }

    #[test]
    fn test_decode_garbage() {
        assert_eq!(decode_response::<String>(false, "401 Unauthorized"), Err(TemplateError::Rpc("401 Unauthorized".to_owned())));
        assert!(matches!(decode_response::<String>(true, "<html>"), Err(TemplateError::Rpc(_))));
    }

    #[tokio::test]
    async fn test_unreachable_daemon_is_an_rpc_error() {
        let client = BitcoindClient::new(BitcoindConfig { url: "http://127.0.0.1:1".to_owned(), user: None, password: None });
        assert!(matches!(client.get_block_template().await, Err(TemplateError::Rpc(_))));
    }
}
