//! # Design
//!
//! - Structured, constant-message errors for the auth pipeline.
//! - Token material never appears in error fields.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for auth operations.
pub type AuthResult<T> = Result<T, AuthError>;

/// Errors produced by the identity pipeline.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The request carried no usable bearer token.
    #[error("missing bearer token")]
    MissingToken,
    /// The token was present but rejected before signature checks.
    #[error("invalid token")]
    InvalidToken {
        /// Static reason for the rejection.
        reason: &'static str,
    },
    /// Signature or claim verification failed.
    #[error("token verification failed")]
    Verification {
        /// Underlying verification error.
        source: jsonwebtoken::errors::Error,
    },
    /// The token names a key id absent from the cached key set.
    #[error("unknown signing key")]
    UnknownKey {
        /// Key id named by the token header.
        kid: String,
    },
    /// The key set document could not be fetched.
    #[error("key set fetch failed")]
    KeySetFetch {
        /// Key set URL.
        url: String,
        /// Underlying transport error.
        source: reqwest::Error,
    },
    /// The key set endpoint answered with a non-success status.
    #[error("key set endpoint returned an error status")]
    KeySetStatus {
        /// Key set URL.
        url: String,
        /// HTTP status received.
        status: u16,
    },
    /// The outbound HTTP client could not be constructed.
    #[error("http client construction failed")]
    ClientBuild {
        /// Underlying builder error.
        source: reqwest::Error,
    },
    /// The configured extra CA bundle could not be loaded.
    #[error("ca bundle unreadable")]
    CaBundle {
        /// Path of the bundle.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// The configured extra CA bundle did not parse as PEM.
    #[error("ca bundle invalid")]
    CaParse {
        /// Path of the bundle.
        path: PathBuf,
        /// Underlying parse error.
        source: reqwest::Error,
    },
}
