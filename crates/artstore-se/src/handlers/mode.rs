//! Guarded operating-mode transitions.

use std::sync::Arc;

use artstore_auth::require_role_or_scope;
use artstore_model::{AuthClaims, OperatingMode, Role};
use artstore_store::ModeTransition;
use axum::{Extension, Json, extract::State};
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::SeState;

const MAINTENANCE_ROLES: &[Role] = &[Role::Admin];
const MAINTENANCE_SCOPES: &[&str] = &["admin:maintenance"];

#[derive(Debug, Deserialize)]
pub(crate) struct TransitionRequest {
    target_mode: String,
    #[serde(default)]
    confirm: Option<bool>,
}

pub(crate) async fn transition_mode(
    State(state): State<Arc<SeState>>,
    claims: Option<Extension<AuthClaims>>,
    Json(request): Json<TransitionRequest>,
) -> Result<Json<ModeTransition>, ApiError> {
    let claims = require_role_or_scope(
        claims.as_ref().map(|ext| &ext.0),
        MAINTENANCE_ROLES,
        MAINTENANCE_SCOPES,
    )?;

    let target = request.target_mode.parse::<OperatingMode>().map_err(|_| {
        ApiError::validation(format!("unknown target_mode '{}'", request.target_mode))
    })?;
    let subject = claims
        .preferred_username
        .as_deref()
        .unwrap_or(&claims.subject);

    let record = state
        .mode
        .transition_to(target, request.confirm.unwrap_or(false), subject)?;
    Ok(Json(record))
}
