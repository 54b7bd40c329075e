//! Stratum v1 mining server: wire protocol, per-connection sessions, the
//! public listener and the loopback control channel.

pub mod control;
pub mod error;
pub mod extranonce;
pub mod listener;
pub mod protocol;
pub mod session;

#[cfg(test)]
pub(crate) mod testutils;

pub use control::ControlListener;
pub use error::{StratumError, StratumResult};
pub use listener::StratumListener;
pub use session::{Session, StratumConfig, StratumContext};
