use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing journal path")]
    MissingJournal,
    #[error("Invalid PORT value '{0}'")]
    InvalidPort(String),
    #[error("Invalid LEDGER_LOCK_TIMEOUT_MS value '{0}'")]
    InvalidLockTimeout(String)
}
