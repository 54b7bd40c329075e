use thiserror::Error;

/// Failures while fetching a block template or submitting a block. None of
/// them is fatal: the job manager keeps serving its previous template.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// The daemon could not be reached or answered garbage
    #[error("daemon RPC failure: {0}")]
    Rpc(String),

    /// The daemon answered with a JSON-RPC error object
    #[error("daemon error {code}: {message}")]
    Daemon { code: i64, message: String },

    #[error("daemon did not answer within {0} ms")]
    Timeout(u64),

    /// The daemon refused a submitted block
    #[error("block rejected by daemon: {0}")]
    BlockRejected(String),

    #[error("block template is missing field `{0}`")]
    MissingField(&'static str),

    #[error("block template field `{field}` is not valid hex: {value}")]
    InvalidHex { field: &'static str, value: String },

    #[error("malformed coinbase transaction: {0}")]
    MalformedCoinbase(&'static str),

    #[error("coinbase scriptSig would be {0} bytes, the limit is 100")]
    ScriptSigTooLong(usize),
}

pub type TemplateResult<T> = std::result::Result<T, TemplateError>;
