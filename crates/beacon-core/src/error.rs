//! Error types for the durable event store contract.

use thiserror::Error;

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Failure of a durable event store operation.
///
/// Store failures never abort the pipeline: a failed save drops the event
/// with a logged warning, and a failed read or removal aborts only the
/// affected flush sub-step for that cycle.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The backing store could not be reached or opened.
    #[error("event store unavailable: {message}")]
    Unavailable {
        /// Description of the underlying failure.
        message: String,
    },

    /// A read or write against the backing store failed.
    #[error("event store operation failed: {message}")]
    Io {
        /// Description of the underlying failure.
        message: String,
    },

    /// A persisted record could not be decoded back into an event.
    #[error("stored event is corrupt: {message}")]
    Corrupt {
        /// Description of the decode failure.
        message: String,
    },
}

impl StoreError {
    /// Creates an unavailable-store error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable { message: message.into() }
    }

    /// Creates an I/O error.
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io { message: message.into() }
    }

    /// Creates a corrupt-record error.
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::Corrupt { message: message.into() }
    }
}
