//! Admin-user endpoints: identity-provider lookups merged with the local
//! role-override table.

use std::sync::Arc;

use artstore_auth::require_role_or_scope;
use artstore_model::{AuthClaims, Role, RoleOverride};
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ApiError;
use crate::handlers::{READ_ROLES, READ_SCOPES, WRITE_ROLES, WRITE_SCOPES};
use crate::state::AmState;

#[derive(Debug, Serialize)]
pub(crate) struct AdminUserView {
    id: String,
    username: String,
    email: Option<String>,
    enabled: bool,
    role_override: Option<Role>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SearchQuery {
    #[serde(default)]
    username: Option<String>,
}

pub(crate) async fn search(
    State(state): State<Arc<AmState>>,
    claims: Option<Extension<AuthClaims>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<AdminUserView>>, ApiError> {
    require_role_or_scope(claims.as_ref().map(|ext| &ext.0), READ_ROLES, READ_SCOPES)?;
    let username = query
        .username
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ApiError::validation("a username query is required"))?;

    let users = state.idp.find_users(username).await?;
    let mut views = Vec::with_capacity(users.len());
    for user in users {
        let role_override = state
            .db
            .role_overrides()
            .get(&user.id)
            .await?
            .map(|over| over.additional_role);
        views.push(AdminUserView {
            id: user.id,
            username: user.username,
            email: user.email,
            enabled: user.enabled,
            role_override,
        });
    }
    Ok(Json(views))
}

pub(crate) async fn get(
    State(state): State<Arc<AmState>>,
    claims: Option<Extension<AuthClaims>>,
    Path(id): Path<String>,
) -> Result<Json<AdminUserView>, ApiError> {
    require_role_or_scope(claims.as_ref().map(|ext| &ext.0), READ_ROLES, READ_SCOPES)?;
    let user = state
        .idp
        .get_user(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("user {id} not found")))?;
    let role_override = state
        .db
        .role_overrides()
        .get(&user.id)
        .await?
        .map(|over| over.additional_role);
    Ok(Json(AdminUserView {
        id: user.id,
        username: user.username,
        email: user.email,
        enabled: user.enabled,
        role_override,
    }))
}

#[derive(Debug, Deserialize)]
pub(crate) struct OverrideRequest {
    additional_role: String,
}

pub(crate) async fn put_override(
    State(state): State<Arc<AmState>>,
    claims: Option<Extension<AuthClaims>>,
    Path(id): Path<String>,
    Json(request): Json<OverrideRequest>,
) -> Result<Json<RoleOverride>, ApiError> {
    let claims =
        require_role_or_scope(claims.as_ref().map(|ext| &ext.0), WRITE_ROLES, WRITE_SCOPES)?;
    let role = request.additional_role.parse::<Role>().map_err(|_| {
        ApiError::validation(format!("unknown role '{}'", request.additional_role))
    })?;

    let user = state
        .idp
        .get_user(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("user {id} not found")))?;
    let created_by = claims
        .preferred_username
        .clone()
        .unwrap_or_else(|| claims.subject.clone());
    state
        .db
        .role_overrides()
        .upsert(&user.id, &user.username, role, &created_by)
        .await?;
    let stored = state
        .db
        .role_overrides()
        .get(&user.id)
        .await?
        .ok_or_else(|| ApiError::internal("stored override vanished"))?;
    info!(
        user = %user.username,
        role = %role,
        subject = %created_by,
        "role override stored"
    );
    Ok(Json(stored))
}

pub(crate) async fn delete_override(
    State(state): State<Arc<AmState>>,
    claims: Option<Extension<AuthClaims>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let claims =
        require_role_or_scope(claims.as_ref().map(|ext| &ext.0), WRITE_ROLES, WRITE_SCOPES)?;
    if state.db.role_overrides().get(&id).await?.is_none() {
        return Err(ApiError::not_found(format!("no override for user {id}")));
    }
    state.db.role_overrides().delete(&id).await?;
    info!(user_id = %id, subject = %claims.subject, "role override removed");
    Ok(StatusCode::NO_CONTENT)
}
