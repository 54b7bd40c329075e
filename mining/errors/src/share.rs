use thiserror::Error;

/// Why a submitted share was refused. The message is what the miner sees.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareRejection {
    #[error("Invalid extranonce 2")]
    InvalidExtranonce2,

    #[error("Job not found")]
    StaleJob,

    #[error("Low difficulty share")]
    LowDifficulty,

    #[error("Malformed {0}")]
    MalformedField(&'static str),

    #[error("Not subscribed")]
    NotSubscribed,
}

impl ShareRejection {
    /// Stratum error code for the rejection.
    pub fn code(&self) -> i64 {
        match self {
            ShareRejection::InvalidExtranonce2 | ShareRejection::MalformedField(_) => 20,
            ShareRejection::StaleJob => 21,
            ShareRejection::LowDifficulty => 23,
            ShareRejection::NotSubscribed => 25,
        }
    }
}
