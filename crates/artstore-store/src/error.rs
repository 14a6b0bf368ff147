//! # Design
//!
//! - Structured, constant-message errors for the storage engine.
//! - Capture operation context (paths, identifiers) to make failures
//!   reproducible in tests.
//! - Preserve source errors without interpolating context into messages.

use std::io;
use std::path::PathBuf;

use artstore_model::OperatingMode;
use thiserror::Error;
use uuid::Uuid;

/// Result type for storage engine operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors produced by the storage engine.
#[derive(Debug, Error)]
pub enum StoreError {
    /// IO failures while interacting with the data directory.
    #[error("store io failure")]
    Io {
        /// Operation that triggered the IO failure.
        operation: &'static str,
        /// Path involved in the IO failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// JSON parsing or serialization failures for sidecars.
    #[error("store json failure")]
    Json {
        /// Operation that triggered the JSON failure.
        operation: &'static str,
        /// Path involved in the JSON failure.
        path: PathBuf,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
    /// The streamed byte count did not match the declared size.
    #[error("store size mismatch")]
    SizeMismatch {
        /// Size declared by the caller.
        declared: i64,
        /// Bytes actually written.
        actual: i64,
    },
    /// The requested file is not tracked by the index.
    #[error("file not found")]
    NotFound {
        /// Identifier that failed lookup.
        file_id: Uuid,
    },
    /// The requested mode pair is not a defined transition.
    #[error("invalid mode transition")]
    InvalidTransition {
        /// Mode before the request.
        from: OperatingMode,
        /// Requested target mode.
        to: OperatingMode,
    },
    /// The transition is defined but requires explicit confirmation.
    #[error("mode transition requires confirmation")]
    ConfirmationRequired {
        /// Mode before the request.
        from: OperatingMode,
        /// Requested target mode.
        to: OperatingMode,
    },
}

impl StoreError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: serde_json::Error,
    ) -> Self {
        Self::Json {
            operation,
            path: path.into(),
            source,
        }
    }
}
