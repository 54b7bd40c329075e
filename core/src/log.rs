//! Logger and logging macros
//!
//! For the macros to properly compile, the calling crate must add a dependency to
//! crate log (ie. `log.workspace = true`).

pub use log::{Level, LevelFilter};

mod appender;
mod consts;
mod logger;

pub use logger::Filters;

use appender::AppenderSpec;
use consts::{DEFAULT_LOGGER_ENV, ERR_LOG_FILE_NAME, LOG_FILE_NAME};
use log4rs::{Config, config::Root};
use thiserror::Error;

#[derive(Clone, Debug, Error)]
pub enum LogError {
    #[error("logger spec parsing error: {0}")]
    ParseLoggerSpec(String),

    #[error("log directory is not a valid path: {0}")]
    InvalidPath(String),

    #[error("log appender error: {0}")]
    Appender(String),

    #[error("logger config error: {0}")]
    Config(String),

    #[error("a global logger is already installed")]
    AlreadyInitialized,
}

const CONSOLE_APPENDER: &str = "stdout";
const LOG_FILE_APPENDER: &str = "log_file";
const ERR_LOG_FILE_APPENDER: &str = "err_log_file";

/// Installs the global logger: colored console output, and when `log_dir` is
/// set, a rolling log file plus a warn-and-above rolling error file.
///
/// `filters` follows the `RUST_LOG`-like syntax of [`Filters`]; the `RUST_LOG`
/// environment variable is applied first and `filters` on top of it.
pub fn init_logger(log_dir: Option<&str>, filters: &str) -> Result<(), LogError> {
    let filters = Filters::default().with_env(DEFAULT_LOGGER_ENV).with_expression(filters);

    let mut specs = vec![AppenderSpec::console(CONSOLE_APPENDER, None)];
    if let Some(log_dir) = log_dir {
        specs.push(AppenderSpec::roller(LOG_FILE_APPENDER, None, log_dir, LOG_FILE_NAME)?);
        specs.push(AppenderSpec::roller(ERR_LOG_FILE_APPENDER, Some(LevelFilter::Warn), log_dir, ERR_LOG_FILE_NAME)?);
    }
    let names: Vec<&'static str> = specs.iter().map(|x| x.name).collect();

    let config = Config::builder()
        .appenders(specs.iter_mut().filter_map(|x| x.appender()))
        .loggers(filters.loggers(&names))
        .build(Root::builder().appenders(names.iter().copied()).build(filters.root))
        .map_err(|err| LogError::Config(err.to_string()))?;

    log4rs::init_config(config).map_err(|_| LogError::AlreadyInitialized)?;
    Ok(())
}

#[macro_export]
macro_rules! trace {
    ($($t:tt)*) => (
        log::trace!($($t)*);
    )
}

#[macro_export]
macro_rules! debug {
    ($($t:tt)*) => (
        log::debug!($($t)*);
    )
}

#[macro_export]
macro_rules! info {
    ($($t:tt)*) => (
        log::info!($($t)*);
    )
}

#[macro_export]
macro_rules! warn {
    ($($t:tt)*) => (
        log::warn!($($t)*);
    )
}

#[macro_export]
macro_rules! error {
    ($($t:tt)*) => (
        log::error!($($t)*);
    )
}
