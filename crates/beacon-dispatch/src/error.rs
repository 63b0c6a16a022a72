//! Error types for dispatch and transport operations.
//!
//! Transport failures are transient by design: the pipeline recovers locally
//! by persisting the event and arming the retry loop, and surfaces the error
//! only to the caller of the `dispatch` that triggered it. Nothing here is
//! ever raised as a fatal condition.

use std::time::Duration;

use beacon_core::StoreError;
use thiserror::Error;

/// Result type alias for dispatch operations.
pub type Result<T> = std::result::Result<T, DispatchError>;

/// Failure of a single network send.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Connection-level failure (refused, reset, DNS, TLS).
    #[error("network send failed: {message}")]
    Network {
        /// Description of the connection failure.
        message: String,
    },

    /// The request exceeded the configured send timeout.
    #[error("request timed out after {timeout_ms}ms")]
    Timeout {
        /// Timeout that was exceeded, in milliseconds.
        timeout_ms: u64,
    },

    /// The endpoint answered with a non-success status.
    #[error("endpoint returned HTTP {status}")]
    HttpStatus {
        /// HTTP status code returned by the endpoint.
        status: u16,
        /// Response body, truncated for logging.
        body: String,
    },
}

impl TransportError {
    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network { message: message.into() }
    }

    /// Creates a timeout error.
    pub fn timeout(timeout_ms: u64) -> Self {
        Self::Timeout { timeout_ms }
    }

    /// Creates an HTTP status error.
    pub fn http_status(status: u16, body: impl Into<String>) -> Self {
        Self::HttpStatus { status, body: body.into() }
    }

    /// HTTP status code, when the endpoint responded at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            Self::Network { .. } | Self::Timeout { .. } => None,
        }
    }
}

/// Dispatcher-level failure.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A network send failed.
    #[error("transport send failed: {0}")]
    Transport(#[from] TransportError),

    /// A durable store operation failed.
    #[error("event store operation failed: {0}")]
    Store(#[from] StoreError),

    /// The dispatcher could not be constructed from its configuration.
    #[error("invalid dispatcher configuration: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },

    /// Graceful shutdown did not complete in time.
    #[error("dispatcher shutdown timed out after {timeout:?}")]
    ShutdownTimeout {
        /// The shutdown deadline that was exceeded.
        timeout: Duration,
    },
}

impl DispatchError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }
}
