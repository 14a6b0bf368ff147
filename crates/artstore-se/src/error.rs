//! Uniform API error wrapper for the Storage Element surface.

use artstore_auth::GateError;
use artstore_model::{ErrorBody, ErrorCode};
use artstore_store::StoreError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

/// Structured API error translated into the uniform
/// `{"error":{"code","message"}}` body.
#[derive(Debug)]
pub(crate) struct ApiError {
    pub(crate) status: StatusCode,
    pub(crate) code: ErrorCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub(crate) fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, ErrorCode::NotFound, message)
    }

    pub(crate) fn mode_not_allowed(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, ErrorCode::ModeNotAllowed, message)
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ErrorCode::ValidationError, message)
    }

    pub(crate) fn range_not_satisfiable(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::RANGE_NOT_SATISFIABLE,
            ErrorCode::ValidationError,
            message,
        )
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::InternalError,
            message,
        )
    }
}

impl From<GateError> for ApiError {
    fn from(err: GateError) -> Self {
        match err {
            GateError::Unauthenticated => Self::new(
                StatusCode::UNAUTHORIZED,
                ErrorCode::Unauthorized,
                "authentication required",
            ),
            GateError::Forbidden { reason } => {
                Self::new(StatusCode::FORBIDDEN, ErrorCode::Forbidden, reason)
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { file_id } => {
                Self::not_found(format!("file {file_id} not found"))
            }
            StoreError::InvalidTransition { from, to } => Self::new(
                StatusCode::CONFLICT,
                ErrorCode::InvalidTransition,
                format!("no transition from {from} to {to}"),
            ),
            StoreError::ConfirmationRequired { from, to } => Self::new(
                StatusCode::CONFLICT,
                ErrorCode::ConfirmationRequired,
                format!("transition from {from} to {to} requires confirmation"),
            ),
            StoreError::SizeMismatch { declared, actual } => Self::validation(format!(
                "declared size {declared} but received {actual} bytes"
            )),
            StoreError::Io { .. } | StoreError::Json { .. } => {
                error!(error = %err, "storage engine failure");
                Self::internal("storage engine failure")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody::new(self.code, self.message))).into_response()
    }
}
