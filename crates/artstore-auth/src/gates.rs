//! Authentication middleware and role/scope authorization gates.
//!
//! The middleware validates the bearer token, resolves the subject and its
//! roles, and injects [`AuthClaims`] into the request extensions. Handlers
//! then apply [`require_role`], [`require_scope`], or
//! [`require_role_or_scope`]. Absent claims map to 401, insufficient claims
//! to 403, always with the uniform error body.

use std::sync::Arc;

use artstore_model::{AuthClaims, ErrorBody, ErrorCode, Role, SubjectType};
use async_trait::async_trait;
use axum::{
    Json,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

use crate::claims::{RoleResolver, build_claims};
use crate::jwks::{KeySetValidator, bearer_token};

/// Source of locally stored role overrides consulted for user subjects.
#[async_trait]
pub trait RoleOverrideLookup: Send + Sync {
    /// Override for the given identity-provider user id, when one exists.
    async fn role_override(&self, keycloak_user_id: &str) -> Option<Role>;
}

/// Lookup that never finds an override; used by processes without an
/// override table.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOverrides;

#[async_trait]
impl RoleOverrideLookup for NoOverrides {
    async fn role_override(&self, _keycloak_user_id: &str) -> Option<Role> {
        None
    }
}

/// Shared state for the authentication middleware.
#[derive(Clone)]
pub struct AuthState {
    /// Token validator over the remote key set.
    pub validator: KeySetValidator,
    /// Group/realm-role mapping.
    pub resolver: RoleResolver,
    /// Role override source.
    pub overrides: Arc<dyn RoleOverrideLookup>,
}

/// Authorization failure raised by the gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateError {
    /// No claims were attached to the request.
    Unauthenticated,
    /// Claims were present but insufficient.
    Forbidden {
        /// Static reason for the denial.
        reason: &'static str,
    },
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                Json(ErrorBody::new(
                    ErrorCode::Unauthorized,
                    "authentication required",
                )),
            )
                .into_response(),
            Self::Forbidden { reason } => (
                StatusCode::FORBIDDEN,
                Json(ErrorBody::new(ErrorCode::Forbidden, reason)),
            )
                .into_response(),
        }
    }
}

/// Middleware: validate the bearer token and inject [`AuthClaims`].
///
/// # Errors
///
/// Returns a 401 response with the uniform error body on any validation
/// failure; the failure detail is logged, never echoed.
pub async fn authenticate(
    State(state): State<Arc<AuthState>>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let Some(token) = bearer_token(req.headers()) else {
        return Err(unauthorized("missing bearer token"));
    };

    let raw = state.validator.validate(token).map_err(|err| {
        debug!(error = %err, "token rejected");
        unauthorized("invalid token")
    })?;

    let role_override = match (&raw.sub, looks_like_service_account(&raw)) {
        (Some(sub), false) => state.overrides.role_override(sub).await,
        _ => None,
    };

    let claims = build_claims(&raw, &state.resolver, role_override).map_err(|err| {
        debug!(error = %err, "claims rejected");
        unauthorized("invalid token")
    })?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

fn looks_like_service_account(raw: &crate::claims::RawClaims) -> bool {
    let client_id = raw.client_id.as_ref().or(raw.azp.as_ref());
    client_id.is_some() && !crate::claims::scopes_union(raw).is_empty()
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorBody::new(ErrorCode::Unauthorized, message)),
    )
        .into_response()
}

/// Admit only user subjects whose effective role is in `allowed`.
///
/// # Errors
///
/// [`GateError::Unauthenticated`] without claims; [`GateError::Forbidden`]
/// for service accounts or users with an insufficient role.
pub fn require_role<'a>(
    claims: Option<&'a AuthClaims>,
    allowed: &[Role],
) -> Result<&'a AuthClaims, GateError> {
    let claims = claims.ok_or(GateError::Unauthenticated)?;
    match claims.subject_type {
        SubjectType::ServiceAccount => Err(GateError::Forbidden {
            reason: "role-gated endpoint requires a user subject",
        }),
        SubjectType::User => match claims.effective_role {
            Some(role) if allowed.contains(&role) => Ok(claims),
            _ => Err(GateError::Forbidden {
                reason: "insufficient role",
            }),
        },
    }
}

/// Admit only service-account subjects presenting one of `scopes`.
///
/// # Errors
///
/// [`GateError::Unauthenticated`] without claims; [`GateError::Forbidden`]
/// for users or service accounts missing every required scope.
pub fn require_scope<'a>(
    claims: Option<&'a AuthClaims>,
    scopes: &[&str],
) -> Result<&'a AuthClaims, GateError> {
    let claims = claims.ok_or(GateError::Unauthenticated)?;
    match claims.subject_type {
        SubjectType::User => Err(GateError::Forbidden {
            reason: "scope-gated endpoint requires a service account",
        }),
        SubjectType::ServiceAccount => {
            if claims.has_any_scope(scopes) {
                Ok(claims)
            } else {
                Err(GateError::Forbidden {
                    reason: "insufficient scope",
                })
            }
        }
    }
}

/// Admit users by role or service accounts by scope.
///
/// # Errors
///
/// [`GateError::Unauthenticated`] without claims; [`GateError::Forbidden`]
/// when the subject's own gate rejects it.
pub fn require_role_or_scope<'a>(
    claims: Option<&'a AuthClaims>,
    allowed: &[Role],
    scopes: &[&str],
) -> Result<&'a AuthClaims, GateError> {
    let claims = claims.ok_or(GateError::Unauthenticated)?;
    match claims.subject_type {
        SubjectType::User => require_role(Some(claims), allowed),
        SubjectType::ServiceAccount => require_scope(Some(claims), scopes),
    }
}
