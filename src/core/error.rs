use crate::core::audit::Severity;
use rusqlite;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HivekeepError {
    #[error("SQLite error: {0}")]
    RusqliteError(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),
    #[error("Validation rejected in {op}: {reason}")]
    ValidationRejected { op: String, reason: String },
    #[error("Rate limit exceeded for '{identifier}'")]
    RateLimited { identifier: String },
    #[error(
        "Integrity failure for agent '{agent_id}' layer {layer_index}: expected digest {expected}, found {actual}"
    )]
    IntegrityFailure {
        agent_id: String,
        layer_index: i64,
        expected: String,
        actual: String,
    },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Already exists: {0}")]
    AlreadyExists(String),
    #[error("Engine error in {op} after {elapsed_ms}ms: {source}")]
    Engine {
        op: String,
        elapsed_ms: u128,
        #[source]
        source: rusqlite::Error,
    },
    #[error("Invalid configuration: {0}")]
    ConfigurationInvalid(String),
    #[error("Store not initialized")]
    NotInitialized,
    #[error("Crypto error: {0}")]
    Crypto(String),
    #[error("Lock poisoned: {0}")]
    LockPoisoned(&'static str),
}

impl HivekeepError {
    pub fn rejected(op: &str, reason: impl Into<String>) -> Self {
        Self::ValidationRejected {
            op: op.to_string(),
            reason: reason.into(),
        }
    }

    /// Attach operation context to raw engine errors. Semantic errors pass through.
    pub fn with_context(self, op: &str, elapsed_ms: u128) -> Self {
        match self {
            Self::RusqliteError(source) => Self::Engine {
                op: op.to_string(),
                elapsed_ms,
                source,
            },
            other => other,
        }
    }

    /// Validation and rate-limit rejections can be retried with sanitized input or after backing off.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ValidationRejected { .. } | Self::RateLimited { .. }
        )
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::IntegrityFailure { .. } => Severity::Critical,
            Self::Engine { .. } | Self::RusqliteError(_) | Self::IoError(_) => Severity::High,
            Self::RateLimited { .. } | Self::Crypto(_) | Self::LockPoisoned(_) => Severity::High,
            Self::ValidationRejected { .. } | Self::ConfigurationInvalid(_) => Severity::Medium,
            _ => Severity::Low,
        }
    }
}
