use std::path::PathBuf;
use std::time::Duration;

use tracing::level_filters::LevelFilter;

use crate::config::ConfigError;

pub const USAGE: &str = "Usage: points-ledger [journal].csv [log_level:optional]
Available log levels: error, warn, info, debug, trace (default: info)
Environment: PORT (default: 8000), LEDGER_LOCK_TIMEOUT_MS (default: 5000)";

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5000;

/// Runtime settings, taken from the command line and the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub journal_path: PathBuf,
    pub log_level: LevelFilter,
    pub port: u16,
    /// How long a request waits for the ledger before giving up.
    pub lock_timeout: Duration
}

impl Settings {
    /// Builds settings from `args` (program name first) and an environment lookup.
    pub fn load<F>(args: &[String], env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let journal_path = args.get(1)
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from)
            .ok_or(ConfigError::MissingJournal)?;

        let log_level = args.get(2)
            .map(|level| parse_log_level(level))
            .unwrap_or(LevelFilter::INFO);

        let port = match env("PORT") {
            Some(value) => value.trim().parse().map_err(|_| ConfigError::InvalidPort(value))?,
            None => DEFAULT_PORT
        };

        let lock_timeout_ms = match env("LEDGER_LOCK_TIMEOUT_MS") {
            Some(value) => value.trim().parse().map_err(|_| ConfigError::InvalidLockTimeout(value))?,
            None => DEFAULT_LOCK_TIMEOUT_MS
        };

        Ok(Self {
            journal_path,
            log_level,
            port,
            lock_timeout: Duration::from_millis(lock_timeout_ms)
        })
    }
}

fn parse_log_level(level: &str) -> LevelFilter {
    match level.to_lowercase().as_str() {
        "trace" => LevelFilter::TRACE,
        "debug" => LevelFilter::DEBUG,
        "info" => LevelFilter::INFO,
        "warn" => LevelFilter::WARN,
        "error" => LevelFilter::ERROR,
        _ => {
            eprintln!("Invalid log level '{}', defaulting to 'info'", level);
            LevelFilter::INFO
        }
    }
}
