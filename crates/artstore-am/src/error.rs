//! Uniform API error wrapper for the Admin Module surface.

use artstore_auth::GateError;
use artstore_idp::IdpError;
use artstore_model::{ErrorBody, ErrorCode};
use artstore_sync::SyncError;
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

    pub(crate) fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, ErrorCode::Unauthorized, message)
    }

    pub(crate) fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, ErrorCode::NotFound, message)
    }

    pub(crate) fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, ErrorCode::Conflict, message)
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ErrorCode::ValidationError, message)
    }

    pub(crate) fn se_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, ErrorCode::SeUnavailable, message)
    }

    pub(crate) fn idp_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, ErrorCode::IdpUnavailable, message)
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
            GateError::Unauthenticated => Self::unauthorized("authentication required"),
            GateError::Forbidden { reason } => {
                Self::new(StatusCode::FORBIDDEN, ErrorCode::Forbidden, reason)
            }
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        if artstore_data::is_unique_violation(&err) {
            return Self::conflict("a row with this unique value already exists");
        }
        error!(error = %err, "registry operation failed");
        Self::internal("registry operation failed")
    }
}

impl From<IdpError> for ApiError {
    fn from(err: IdpError) -> Self {
        match &err {
            IdpError::Status { status: 409, .. } => {
                Self::conflict("identity provider reports a conflicting client")
            }
            IdpError::Status { status: 404, .. } => {
                Self::not_found("identity provider knows no such entity")
            }
            _ => {
                error!(error = %err, "identity provider call failed");
                Self::idp_unavailable("identity provider call failed")
            }
        }
    }
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        error!(error = %err, "storage element call failed");
        match err {
            SyncError::SeStatus { status: 404, .. } => {
                Self::not_found("storage element knows no such entity")
            }
            SyncError::Cancelled => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorCode::SeUnavailable,
                "synchronization cancelled",
            ),
            _ => Self::se_unavailable("storage element call failed"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody::new(self.code, self.message))).into_response()
    }
}
