//! Structured errors for identity-provider calls. Secrets and tokens never
//! appear in error fields; response bodies are surfaced verbatim because the
//! provider's admin API reports its diagnostics there.

use thiserror::Error;

/// Result type for identity-provider calls.
pub type IdpResult<T> = Result<T, IdpError>;

/// Errors produced by the identity-provider client.
#[derive(Debug, Error)]
pub enum IdpError {
    /// The provider could not be reached.
    #[error("identity provider unreachable")]
    Transport {
        /// Underlying transport error.
        source: reqwest::Error,
    },
    /// The provider answered with a non-success status.
    #[error("identity provider returned an error status")]
    Status {
        /// HTTP status received.
        status: u16,
        /// Raw response body.
        body: String,
    },
    /// A response body failed to decode.
    #[error("identity provider response undecodable")]
    Decode {
        /// Underlying decode error.
        source: reqwest::Error,
    },
    /// A create call succeeded without the expected `Location` header.
    #[error("identity provider response missing location header")]
    MissingLocation,
}
