mod context;
mod exit_codes;
mod format;

pub use context::ErrorContext;
pub use exit_codes::get_exit_code;
pub use format::{format_error_chain, format_error_with_color};

use crate::locking::timeout::{LockTimeoutSource, LockTimeoutValue};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DistLockError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Lock store error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Resource '{0}' is not held by the requested owner")]
    LockNotHeld(String),

    #[error("Failed to start lock feature '{feature}': {details}")]
    FeatureStart { feature: String, details: String },

    #[error(
        "Timed out after {waited_secs:.1}s waiting for lock on '{resource}' (timeout {timeout_value}, from {timeout_source})"
    )]
    LockingTimeout {
        resource: String,
        waited_secs: f64,
        timeout_value: LockTimeoutValue,
        timeout_source: LockTimeoutSource,
    },

    #[error("Cancelled after {waited_secs:.1}s while waiting for lock on '{resource}'")]
    LockingCancelled { resource: String, waited_secs: f64 },

    #[error("System error: {0}")]
    SystemError(String),

    #[error(transparent)]
    Sql(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DistLockError>;
