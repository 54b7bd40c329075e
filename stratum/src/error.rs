use pool_mining::errors::{ShareRejection, StoreError, TemplateError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StratumError {
    #[error("Parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid request: {0}")]
    Protocol(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error(transparent)]
    Share(#[from] ShareRejection),

    #[error("Credential store error: {0}")]
    Store(#[from] StoreError),

    #[error("Template refresh failed: {0}")]
    Template(#[from] TemplateError),

    #[error("Control channel must listen on a loopback address, not {0}")]
    NonLoopback(std::net::SocketAddr),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StratumError {
    /// Code of the `[code, message, null]` error triple sent to the peer.
    pub fn code(&self) -> i64 {
        match self {
            StratumError::Json(_) => -32700,
            StratumError::Protocol(_) => -32600,
            StratumError::MethodNotFound(_) => -32601,
            StratumError::Unauthorized => 24,
            StratumError::Share(rejection) => rejection.code(),
            StratumError::Store(_) | StratumError::Template(_) | StratumError::NonLoopback(_) | StratumError::Io(_) => 20,
        }
    }
}

pub type StratumResult<T> = std::result::Result<T, StratumError>;
