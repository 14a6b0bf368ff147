//! Structured errors for the synchronizers.

use thiserror::Error;

/// Result type for synchronizer operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors produced while talking to Storage Elements or the registry.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A Storage Element could not be reached.
    #[error("storage element unreachable")]
    SeTransport {
        /// Element base URL.
        url: String,
        /// Underlying transport error.
        source: reqwest::Error,
    },
    /// A Storage Element answered with a non-success status.
    #[error("storage element returned an error status")]
    SeStatus {
        /// Element base URL.
        url: String,
        /// HTTP status received.
        status: u16,
    },
    /// A Storage Element response failed to decode.
    #[error("storage element response undecodable")]
    SeDecode {
        /// Element base URL.
        url: String,
        /// Underlying decode error.
        source: reqwest::Error,
    },
    /// No bearer token could be produced for the outbound call.
    #[error("bearer token unavailable")]
    Token {
        /// Description of the token failure.
        detail: String,
    },
    /// A registry operation failed.
    #[error("registry operation failed")]
    Registry {
        /// Underlying registry error.
        source: anyhow::Error,
    },
    /// The pass was cancelled before completion.
    #[error("synchronization cancelled")]
    Cancelled,
}
