//! Error Taxonomy
//!
//! Purpose:
//!     Typed failures for every pipeline stage. Each stage failure stays local
//!     to the pipeline instance of one transaction hash; only ConfigError is
//!     ever fatal, and only at startup.
//!
//! Created: 2026-10-02
//!
//! Classification:
//!     Unavailable       — transient infra, limited retry at the call site only
//!     NotFound          — tx dropped/mined before lookup, discarded silently
//!     Revert / Failed   — informative negative result, normal outcome
//!     Timeout           — treated exactly like a failed simulation
//!     SubmissionError   — one retry on Transient, then recorded as failed
//!     ConfigError       — fatal at startup

use std::time::Duration;
use thiserror::Error;

/// Failures surfaced by a ChainReader.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("node unavailable: {0}")]
    Unavailable(String),

    #[error("transaction not found")]
    NotFound,

    #[error("execution reverted: {}", .0.as_deref().unwrap_or("<no reason>"))]
    Revert(Option<String>),

    /// Node answered, but the answer could not be decoded.
    #[error("malformed node response: {0}")]
    Malformed(String),
}

impl ChainError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Reasons a candidate transaction is rejected by the simulator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimulationError {
    #[error("simulation failed: {}", .reason.as_deref().unwrap_or("reverted"))]
    Failed { reason: Option<String> },

    #[error("simulation timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("simulation aborted, node unavailable: {0}")]
    Unavailable(String),
}

impl From<ChainError> for SimulationError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::Revert(reason) => Self::Failed { reason },
            ChainError::Unavailable(msg) => Self::Unavailable(msg),
            ChainError::NotFound => Self::Failed {
                reason: Some("state not found".to_string()),
            },
            ChainError::Malformed(msg) => Self::Failed { reason: Some(msg) },
        }
    }
}

/// Failures submitting or confirming a response transaction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmissionError {
    #[error("transient submission failure: {0}")]
    Transient(String),

    #[error("response reverted: {0}")]
    Reverted(String),

    /// The send may or may not have been broadcast; never retried.
    #[error("submission timed out after {}ms", .0.as_millis())]
    TimedOut(Duration),
}

impl SubmissionError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Failures building the response payload from derived parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("derived parameter '{0}' missing")]
    MissingParameter(String),

    #[error("derived parameter '{name}' does not match schema type {expected}")]
    TypeMismatch { name: String, expected: String },
}

/// Startup-only configuration failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid address for {field}: '{value}'")]
    InvalidAddress { field: String, value: String },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("response payload schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("signing credential unavailable: {0}")]
    MissingCredential(String),

    #[error("chain id mismatch: configured {expected}, node reports {actual}")]
    ChainMismatch { expected: u64, actual: u64 },
}
