use clap::{Arg, ArgAction, Command, arg};
use serde::Deserialize;
use std::{ffi::OsString, fs, net::SocketAddr, str::FromStr, time::Duration};
use thiserror::Error;
use toml::from_str;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("extranonce2-size must be between 1 and 8, got {0}")]
    Extranonce2Size(usize),

    #[error("pool-tag of {0} bytes leaves no room in the coinbase scriptSig")]
    PoolTagTooLong(usize),

    #[error("payout-script is not valid hex: {0}")]
    PayoutScript(String),

    #[error("default-difficulty must be a positive number, got {0}")]
    DefaultDifficulty(f64),

    #[error("control-listen must be a loopback address, got {0}")]
    ControlListen(SocketAddr),

    #[error("worker {0} has an invalid difficulty {1}")]
    WorkerDifficulty(String, f64),

    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),
}

/// A login seeded into the credential store at startup.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerEntry {
    pub name: String,
    #[serde(default)]
    pub password: String,
    pub difficulty: Option<f64>,
}

/// Command line form `name:password[:difficulty]`
impl FromStr for WorkerEntry {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let name = parts.next().filter(|name| !name.is_empty()).ok_or_else(|| format!("missing worker name in `{s}`"))?;
        let password = parts.next().unwrap_or_default();
        let difficulty = match parts.next() {
            Some(difficulty) => Some(difficulty.parse::<f64>().map_err(|err| format!("invalid difficulty in `{s}`: {err}"))?),
            None => None,
        };
        Ok(WorkerEntry { name: name.to_owned(), password: password.to_owned(), difficulty })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct Args {
    // NOTE: property names match config file fields
    pub listen: SocketAddr,
    pub control_listen: SocketAddr,
    pub rpc_url: String,
    pub rpc_user: Option<String>,
    pub rpc_password: Option<String>,
    pub rpc_timeout_ms: u64,
    pub store_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub extranonce2_size: usize,
    pub pool_tag: String,
    pub payout_script: Option<String>,
    pub default_difficulty: f64,
    pub idle_timeout_secs: u64,
    pub instance_id: String,
    pub stats_interval_secs: u64,
    pub logdir: Option<String>,
    #[serde(rename = "nologfiles")]
    pub no_log_files: bool,
    #[serde(rename = "loglevel")]
    pub log_level: String,
    pub workers: Vec<WorkerEntry>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 3333)),
            control_listen: SocketAddr::from(([127, 0, 0, 1], 3334)),
            rpc_url: "http://127.0.0.1:8332".into(),
            rpc_user: None,
            rpc_password: None,
            rpc_timeout_ms: 5000,
            store_timeout_ms: 2000,
            poll_interval_ms: 0,
            extranonce2_size: 4,
            pool_tag: "/yeet/".into(),
            payout_script: None,
            default_difficulty: 1.0,
            idle_timeout_secs: 600,
            instance_id: "btc".into(),
            stats_interval_secs: 60,
            logdir: None,
            no_log_files: false,
            log_level: "info".into(),
            workers: vec![],
        }
    }
}

impl Args {
    /// Checks what the types alone cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=8).contains(&self.extranonce2_size) {
            return Err(ConfigError::Extranonce2Size(self.extranonce2_size));
        }
        // height push and extranonce must still fit in the 100 byte scriptSig
        if self.pool_tag.len() + 4 + self.extranonce2_size > 90 {
            return Err(ConfigError::PoolTagTooLong(self.pool_tag.len()));
        }
        self.payout_script_bytes()?;
        if !(self.default_difficulty.is_finite() && self.default_difficulty > 0.0) {
            return Err(ConfigError::DefaultDifficulty(self.default_difficulty));
        }
        if self.rpc_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout("rpc-timeout-ms"));
        }
        if self.store_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout("store-timeout-ms"));
        }
        if self.idle_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout("idle-timeout-secs"));
        }
        if !self.control_listen.ip().is_loopback() {
            return Err(ConfigError::ControlListen(self.control_listen));
        }
        for worker in self.workers.iter() {
            if let Some(difficulty) = worker.difficulty
                && !(difficulty.is_finite() && difficulty > 0.0)
            {
                return Err(ConfigError::WorkerDifficulty(worker.name.clone(), difficulty));
            }
        }
        Ok(())
    }

    pub fn payout_script_bytes(&self) -> Result<Option<Vec<u8>>, ConfigError> {
        self.payout_script
            .as_deref()
            .map(|script| hex::decode(script).map_err(|err| ConfigError::PayoutScript(err.to_string())))
            .transpose()
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// Directory for log files, unless file logging is off.
    pub fn log_dir(&self) -> Option<&str> {
        if self.no_log_files { None } else { self.logdir.as_deref() }
    }
}

pub fn cli() -> Command {
    let defaults: Args = Default::default();

    Command::new("poold")
        .about(format!("{} v{}", env!("CARGO_PKG_DESCRIPTION"), env!("CARGO_PKG_VERSION")))
        .version(env!("CARGO_PKG_VERSION"))
        .arg(arg!(-C --configfile <CONFIG_FILE> "Path of config file."))
        .arg(arg!(--logdir <LOG_DIR> "Directory to log output."))
        .arg(arg!(--nologfiles "Disable logging to files."))
        .arg(
            Arg::new("log_level")
                .short('d')
                .long("loglevel")
                .env("POOLD_LOG_LEVEL")
                .value_name("LEVEL")
                .default_value("info")
                .require_equals(true)
                .help("Logging level for all subsystems {off, error, warn, info, debug, trace}\n-- You may also specify <subsystem>=<level>,<subsystem2>=<level>,... to set the log level for individual subsystems.".to_string()),
        )
        .arg(
            Arg::new("listen")
                .long("listen")
                .env("POOLD_LISTEN")
                .value_name("IP:PORT")
                .require_equals(true)
                .value_parser(clap::value_parser!(SocketAddr))
                .help(format!("Interface:port to accept Stratum miners on (default: {}).", defaults.listen)),
        )
        .arg(
            Arg::new("control-listen")
                .long("control-listen")
                .env("POOLD_CONTROL_LISTEN")
                .value_name("IP:PORT")
                .require_equals(true)
                .value_parser(clap::value_parser!(SocketAddr))
                .help(format!("Loopback interface:port for daemon.blocknotify (default: {}).", defaults.control_listen)),
        )
        .arg(
            Arg::new("rpc-url")
                .long("rpc-url")
                .env("POOLD_RPC_URL")
                .value_name("URL")
                .require_equals(true)
                .help(format!("bitcoind JSON-RPC endpoint (default: {}).", defaults.rpc_url)),
        )
        .arg(Arg::new("rpc-user").long("rpc-user").env("POOLD_RPC_USER").value_name("USER").require_equals(true).help("bitcoind RPC user."))
        .arg(
            Arg::new("rpc-password")
                .long("rpc-password")
                .env("POOLD_RPC_PASSWORD")
                .value_name("PASSWORD")
                .require_equals(true)
                .hide_env_values(true)
                .help("bitcoind RPC password."),
        )
        .arg(
            Arg::new("rpc-timeout-ms")
                .long("rpc-timeout-ms")
                .env("POOLD_RPC_TIMEOUT_MS")
                .require_equals(true)
                .value_parser(clap::value_parser!(u64))
                .help(format!("Bound on every bitcoind call in milliseconds (default: {}).", defaults.rpc_timeout_ms)),
        )
        .arg(
            Arg::new("store-timeout-ms")
                .long("store-timeout-ms")
                .env("POOLD_STORE_TIMEOUT_MS")
                .require_equals(true)
                .value_parser(clap::value_parser!(u64))
                .help(format!("Bound on every credential store call in milliseconds (default: {}).", defaults.store_timeout_ms)),
        )
        .arg(
            Arg::new("poll-interval-ms")
                .long("poll-interval-ms")
                .env("POOLD_POLL_INTERVAL_MS")
                .require_equals(true)
                .value_parser(clap::value_parser!(u64))
                .help("Poll for a new chain tip every this many milliseconds, 0 relies on blocknotify only (default: 0)."),
        )
        .arg(
            Arg::new("extranonce2-size")
                .long("extranonce2-size")
                .env("POOLD_EXTRANONCE2_SIZE")
                .require_equals(true)
                .value_parser(clap::value_parser!(usize))
                .help(format!("Bytes of coinbase nonce space each miner rolls (default: {}).", defaults.extranonce2_size)),
        )
        .arg(
            Arg::new("pool-tag")
                .long("pool-tag")
                .env("POOLD_POOL_TAG")
                .require_equals(true)
                .help(format!("Text appended to every coinbase scriptSig (default: {}).", defaults.pool_tag)),
        )
        .arg(
            Arg::new("payout-script")
                .long("payout-script")
                .env("POOLD_PAYOUT_SCRIPT")
                .value_name("HEX")
                .require_equals(true)
                .help("scriptPubKey paid by coinbases the pool builds itself."),
        )
        .arg(
            Arg::new("default-difficulty")
                .long("default-difficulty")
                .env("POOLD_DEFAULT_DIFFICULTY")
                .require_equals(true)
                .value_parser(clap::value_parser!(f64))
                .help(format!("Share difficulty for workers without one of their own (default: {}).", defaults.default_difficulty)),
        )
        .arg(
            Arg::new("idle-timeout-secs")
                .long("idle-timeout-secs")
                .env("POOLD_IDLE_TIMEOUT_SECS")
                .require_equals(true)
                .value_parser(clap::value_parser!(u64))
                .help(format!("Close connections silent for this many seconds (default: {}).", defaults.idle_timeout_secs)),
        )
        .arg(
            Arg::new("instance-id")
                .long("instance-id")
                .env("POOLD_INSTANCE_ID")
                .require_equals(true)
                .help(format!("Namespace of this instance's worker keys (default: {}).", defaults.instance_id)),
        )
        .arg(
            Arg::new("stats-interval-secs")
                .long("stats-interval-secs")
                .env("POOLD_STATS_INTERVAL_SECS")
                .require_equals(true)
                .value_parser(clap::value_parser!(u64))
                .help(format!("Log share counters every this many seconds, 0 disables (default: {}).", defaults.stats_interval_secs)),
        )
        .arg(
            Arg::new("workers")
                .long("worker")
                .env("POOLD_WORKERS")
                .value_name("NAME:PASSWORD[:DIFFICULTY]")
                .action(ArgAction::Append)
                .value_delimiter(',')
                .require_equals(true)
                .value_parser(clap::value_parser!(String))
                .help("Add a worker login (repeatable)."),
        )
}

pub fn parse_args() -> Args {
    match Args::parse(std::env::args_os()) {
        Ok(args) => args,
        Err(err) => {
            println!("{err}");
            std::process::exit(1);
        }
    }
}

impl Args {
    pub fn parse<I, T>(itr: I) -> Result<Args, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let m: clap::ArgMatches = cli().try_get_matches_from(itr)?;
        let mut defaults: Args = Default::default();
        if let Some(config_file) = m.get_one::<String>("configfile") {
            let config_str = fs::read_to_string(config_file)?;
            defaults = from_str(&config_str).map_err(|toml_error| {
                clap::Error::raw(
                    clap::error::ErrorKind::ValueValidation,
                    format!("failed parsing config file, reason: {}", toml_error.message()),
                )
            })?;
        }

        let mut workers = defaults.workers;
        for worker in arg_match_many_unwrap_or::<String>(&m, "workers", vec![]) {
            let entry = worker.parse::<WorkerEntry>().map_err(|err| clap::Error::raw(clap::error::ErrorKind::ValueValidation, err))?;
            workers.push(entry);
        }

        let args = Args {
            listen: arg_match_unwrap_or::<SocketAddr>(&m, "listen", defaults.listen),
            control_listen: arg_match_unwrap_or::<SocketAddr>(&m, "control-listen", defaults.control_listen),
            rpc_url: arg_match_unwrap_or::<String>(&m, "rpc-url", defaults.rpc_url),
            rpc_user: m.get_one::<String>("rpc-user").cloned().or(defaults.rpc_user),
            rpc_password: m.get_one::<String>("rpc-password").cloned().or(defaults.rpc_password),
            rpc_timeout_ms: arg_match_unwrap_or::<u64>(&m, "rpc-timeout-ms", defaults.rpc_timeout_ms),
            store_timeout_ms: arg_match_unwrap_or::<u64>(&m, "store-timeout-ms", defaults.store_timeout_ms),
            poll_interval_ms: arg_match_unwrap_or::<u64>(&m, "poll-interval-ms", defaults.poll_interval_ms),
            extranonce2_size: arg_match_unwrap_or::<usize>(&m, "extranonce2-size", defaults.extranonce2_size),
            pool_tag: arg_match_unwrap_or::<String>(&m, "pool-tag", defaults.pool_tag),
            payout_script: m.get_one::<String>("payout-script").cloned().or(defaults.payout_script),
            default_difficulty: arg_match_unwrap_or::<f64>(&m, "default-difficulty", defaults.default_difficulty),
            idle_timeout_secs: arg_match_unwrap_or::<u64>(&m, "idle-timeout-secs", defaults.idle_timeout_secs),
            instance_id: arg_match_unwrap_or::<String>(&m, "instance-id", defaults.instance_id),
            stats_interval_secs: arg_match_unwrap_or::<u64>(&m, "stats-interval-secs", defaults.stats_interval_secs),
            logdir: m.get_one::<String>("logdir").cloned().or(defaults.logdir),
            no_log_files: arg_match_unwrap_or::<bool>(&m, "nologfiles", defaults.no_log_files),
            log_level: arg_match_unwrap_or::<String>(&m, "log_level", defaults.log_level),
            workers,
        };
        Ok(args)
    }
}

use clap::parser::ValueSource::DefaultValue;
use std::marker::{Send, Sync};

fn arg_match_unwrap_or<T: Clone + Send + Sync + 'static>(m: &clap::ArgMatches, arg_id: &str, default: T) -> T {
    m.get_one::<T>(arg_id).cloned().filter(|_| m.value_source(arg_id) != Some(DefaultValue)).unwrap_or(default)
}

fn arg_match_many_unwrap_or<T: Clone + Send + Sync + 'static>(m: &clap::ArgMatches, arg_id: &str, default: Vec<T>) -> Vec<T> {
    match m.get_many::<T>(arg_id) {
        Some(val_ref) => val_ref.cloned().collect(),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let args = Args::parse(["poold"]).unwrap();
        assert_eq!(args.listen, "0.0.0.0:3333".parse().unwrap());
        assert_eq!(args.control_listen, "127.0.0.1:3334".parse().unwrap());
        assert_eq!(args.extranonce2_size, 4);
        assert_eq!(args.pool_tag, "/yeet/");
        assert_eq!(args.log_level, "info");
        assert_eq!(args.poll_interval_ms, 0);
        assert_eq!(args.store_timeout_ms, 2000);
        assert!(args.workers.is_empty());
        assert_eq!(args.validate(), Ok(()));
    }

    #[test]
    fn test_config_file_overridden_by_cli() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
listen = "0.0.0.0:4444"
rpc-url = "http://10.0.0.2:18443"
extranonce2-size = 8
payout-script = "0014751e76e8199196d454941c45d1b3a323f1433bd6"
nologfiles = true

[[workers]]
name = "alice.rig1"
password = "x"
difficulty = 0.5

[[workers]]
name = "bob"
"#
        )
        .unwrap();
        let path = file.path().to_str().unwrap().to_owned();

        let args = Args::parse(["poold", "-C", &path, "--extranonce2-size=6", "--store-timeout-ms=250", "--worker=carol:pw:2"]).unwrap();
        assert_eq!(args.store_timeout_ms, 250);
        assert_eq!(args.listen, "0.0.0.0:4444".parse().unwrap());
        assert_eq!(args.rpc_url, "http://10.0.0.2:18443");
        assert_eq!(args.extranonce2_size, 6);
        assert!(args.no_log_files);
        assert_eq!(args.log_dir(), None);
        assert_eq!(args.payout_script_bytes().unwrap().unwrap().len(), 22);
        assert_eq!(
            args.workers,
            vec![
                WorkerEntry { name: "alice.rig1".into(), password: "x".into(), difficulty: Some(0.5) },
                WorkerEntry { name: "bob".into(), password: "".into(), difficulty: None },
                WorkerEntry { name: "carol".into(), password: "pw".into(), difficulty: Some(2.0) },
            ]
        );
    }

    #[test]
    fn test_unknown_config_field_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "lisen = \"0.0.0.0:4444\"").unwrap();
        let path = file.path().to_str().unwrap().to_owned();
        assert!(Args::parse(["poold", "-C", &path]).is_err());
    }

    #[test]
    fn test_validation() {
        let args = Args { extranonce2_size: 0, ..Default::default() };
        assert_eq!(args.validate(), Err(ConfigError::Extranonce2Size(0)));

        let args = Args { control_listen: "0.0.0.0:3334".parse().unwrap(), ..Default::default() };
        assert!(matches!(args.validate(), Err(ConfigError::ControlListen(_))));

        let args = Args { payout_script: Some("zz".into()), ..Default::default() };
        assert!(matches!(args.validate(), Err(ConfigError::PayoutScript(_))));

        let args = Args { pool_tag: "x".repeat(90), ..Default::default() };
        assert_eq!(args.validate(), Err(ConfigError::PoolTagTooLong(90)));

        let args = Args { default_difficulty: 0.0, ..Default::default() };
        assert_eq!(args.validate(), Err(ConfigError::DefaultDifficulty(0.0)));

        let args = Args { idle_timeout_secs: 0, ..Default::default() };
        assert_eq!(args.validate(), Err(ConfigError::ZeroTimeout("idle-timeout-secs")));

        let args = Args { store_timeout_ms: 0, ..Default::default() };
        assert_eq!(args.validate(), Err(ConfigError::ZeroTimeout("store-timeout-ms")));

        let args = Args { workers: vec!["dave:pw:-1".parse().unwrap()], ..Default::default() };
        assert_eq!(args.validate(), Err(ConfigError::WorkerDifficulty("dave".into(), -1.0)));
    }

    #[test]
    fn test_worker_entry_from_str() {
        assert_eq!("eve".parse::<WorkerEntry>().unwrap(), WorkerEntry { name: "eve".into(), password: "".into(), difficulty: None });
        assert_eq!(
            "eve:a:b:c".parse::<WorkerEntry>().unwrap_err(),
            "invalid difficulty in `eve:a:b:c`: invalid float literal".to_string()
        );
        assert!(":pw".parse::<WorkerEntry>().is_err());
    }
}
