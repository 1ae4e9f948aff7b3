//! Unified error handling for the mcpulse crate
//!
//! Each boundary of the poller has its own error enum so that callers can
//! decide locally how to recover:
//!
//! - [`ProbeError`] - a single status query failed (logged, snapshot untouched)
//! - [`StoreError`] - the status store or server registry failed (retried next cycle)
//! - [`LeaseError`] - the coordination store failed (fail closed on leadership)
//! - [`ConfigError`] - invalid settings or a misconfigured server row
//!
//! [`Error`] wraps all of them for code that crosses module boundaries.

use std::io;
use std::time::Duration;
use thiserror::Error;

use crate::models::ServerId;

/// Common classification interface implemented by all mcpulse error types
pub trait PulseErrorTrait: std::error::Error {
    /// Check if this error is transient (the next cycle may succeed)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Game server unreachable or misbehaving
    Network,
    /// Status store / registry errors
    Storage,
    /// Lease coordination store errors
    Coordination,
    /// Configuration and validation errors
    Config,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Storage => "storage",
            Self::Coordination => "coordination",
            Self::Config => "config",
            Self::Other => "other",
        }
    }
}

/// Errors raised while querying a game server's status
#[derive(Error, Debug)]
pub enum ProbeError {
    /// Socket-level failure (refused, reset, unreachable)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The probe did not finish within its deadline
    #[error("Probe timed out after {0:?}")]
    Timeout(Duration),

    /// Host name could not be resolved
    #[error("Failed to resolve {0}")]
    Resolve(String),

    /// The server answered with something that is not a status response
    #[error("Malformed response: {0}")]
    Protocol(String),

    /// Status JSON could not be decoded
    #[error("Invalid status JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl PulseErrorTrait for ProbeError {
    fn is_recoverable(&self) -> bool {
        true
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Network
    }
}

/// Errors raised by the status store and the server registry
#[derive(Error, Debug)]
pub enum StoreError {
    /// Could not obtain a pooled connection
    #[error("Connection pool error: {0}")]
    Pool(String),

    /// Query failed
    #[error("Query failed: {0}")]
    Query(#[from] tokio_postgres::Error),

    /// Snapshot could not be encoded/decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Store rejected the operation
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl PulseErrorTrait for StoreError {
    fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Serialization(_))
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Storage
    }
}

/// Errors raised by the lease coordination store
#[derive(Error, Debug)]
pub enum LeaseError {
    /// Could not obtain a pooled connection
    #[error("Connection pool error: {0}")]
    Pool(String),

    /// Command or script failed
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// No answer within the deadline; the outcome is unknown
    #[error("Coordination store timed out after {0:?}")]
    Timeout(Duration),

    /// Store rejected the operation
    #[error("Coordination store unavailable: {0}")]
    Unavailable(String),
}

impl PulseErrorTrait for LeaseError {
    fn is_recoverable(&self) -> bool {
        true
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Coordination
    }
}

/// Configuration and validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Registry row names a server kind we cannot probe
    #[error("Unknown server kind '{0}'. Valid options: JAVA, BEDROCK")]
    UnknownServerKind(String),

    /// Registry row has no address
    #[error("Server {0} has no address")]
    MissingAddress(ServerId),

    /// Address could not be split into host and port
    #[error("Invalid address '{0}'")]
    InvalidAddress(String),

    /// Setting out of range
    #[error("Invalid value for '{field}': {reason}")]
    Invalid { field: String, reason: String },
}

impl ConfigError {
    pub fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

impl PulseErrorTrait for ConfigError {
    fn is_recoverable(&self) -> bool {
        false
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Config
    }
}

/// Unified error type for the mcpulse crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("Probe error: {0}")]
    Probe(#[from] ProbeError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Lease error: {0}")]
    Lease(#[from] LeaseError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl PulseErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Probe(e) => e.is_recoverable(),
            Self::Store(e) => e.is_recoverable(),
            Self::Lease(e) => e.is_recoverable(),
            Self::Config(e) => e.is_recoverable(),
            Self::Other { .. } => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Probe(e) => e.category(),
            Self::Store(e) => e.category(),
            Self::Lease(e) => e.category(),
            Self::Config(e) => e.category(),
            Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

impl Error {
    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Create a generic error with context and source
    pub fn with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other {
            context: err.to_string(),
            source: None,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
