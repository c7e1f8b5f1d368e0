//! Error types for docpool

use std::time::Duration;

use thiserror::Error;

use crate::OperationKind;

/// How a failure should be treated by the reconnect policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Deployment or configuration problem; never retried
    Config,
    /// The caller's filter, document or namespace is malformed; never retried
    Argument,
    /// Credentials were rejected; the connection is discarded
    Auth,
    /// Network or availability problem; retried through reconnection
    Transient,
    /// Unexpected driver or server behaviour; the connection is discarded
    Protocol,
    /// The pool could not hand out a connection
    Pool,
    /// A single operation exceeded its deadline
    Timeout,
}

/// Core error type for docpool operations
#[derive(Error, Debug)]
pub enum DocPoolError {
    #[error("Invalid configuration for `{field}`: {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("No configuration found for pool `{0}`")]
    ConfigMissing(String),

    #[error("Connection failed: {0}")]
    ConnectFailed(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Invalid argument: {0}")]
    Argument(String),

    #[error("Transient connectivity error: {0}")]
    TransientConnectivity(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Pool `{pool}` exhausted: no connection became available within {waited:?}")]
    PoolExhausted { pool: String, waited: Duration },

    #[error("Pool `{0}` is closed")]
    PoolClosed(String),

    #[error("{operation} timed out after {timeout:?}")]
    OperationTimeout {
        operation: OperationKind,
        timeout: Duration,
    },

    #[error("{operation} on `{namespace}` failed: {source}")]
    OperationFailed {
        namespace: String,
        operation: OperationKind,
        #[source]
        source: Box<DocPoolError>,
    },
}

impl DocPoolError {
    /// Shorthand for an `InvalidConfig` error
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Classify this error for the reconnect policy.
    ///
    /// `OperationFailed` is classified by the error it wraps.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidConfig { .. } | Self::ConfigMissing(_) => ErrorClass::Config,
            Self::Argument(_) => ErrorClass::Argument,
            Self::Auth(_) => ErrorClass::Auth,
            Self::ConnectFailed(_) | Self::TransientConnectivity(_) => ErrorClass::Transient,
            Self::Protocol(_) => ErrorClass::Protocol,
            Self::PoolExhausted { .. } | Self::PoolClosed(_) => ErrorClass::Pool,
            Self::OperationTimeout { .. } => ErrorClass::Timeout,
            Self::OperationFailed { source, .. } => source.class(),
        }
    }

    /// Whether a reconnect-and-retry may clear this error
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Transient
    }

    /// Whether the connection that produced this error must not be reused
    pub fn discards_connection(&self) -> bool {
        matches!(self.class(), ErrorClass::Auth | ErrorClass::Protocol)
    }

    /// Attach call-site context.
    ///
    /// Errors that already carry context are returned unchanged so the
    /// namespace reported is always the innermost one.
    pub fn in_operation(self, namespace: impl Into<String>, operation: OperationKind) -> Self {
        match self {
            Self::OperationFailed { .. } => self,
            other => Self::OperationFailed {
                namespace: namespace.into(),
                operation,
                source: Box::new(other),
            },
        }
    }

    /// The error without any call-site context wrapping
    pub fn root(&self) -> &DocPoolError {
        match self {
            Self::OperationFailed { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Result type alias for docpool operations
pub type Result<T> = std::result::Result<T, DocPoolError>;
