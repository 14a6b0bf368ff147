//! Storage-element inventory endpoints: discovery, listing, manual sync,
//! and removal.

use std::sync::Arc;

use artstore_auth::require_role_or_scope;
use artstore_model::{AuthClaims, StorageElement};
use artstore_sync::SyncOutcome;
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::Utc;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::error::ApiError;
use crate::handlers::{READ_ROLES, READ_SCOPES, WRITE_ROLES, WRITE_SCOPES};
use crate::state::AmState;

pub(crate) async fn list(
    State(state): State<Arc<AmState>>,
    claims: Option<Extension<AuthClaims>>,
) -> Result<Json<Vec<StorageElement>>, ApiError> {
    require_role_or_scope(claims.as_ref().map(|ext| &ext.0), READ_ROLES, READ_SCOPES)?;
    Ok(Json(state.db.storage_elements().list().await?))
}

pub(crate) async fn get(
    State(state): State<Arc<AmState>>,
    claims: Option<Extension<AuthClaims>>,
    Path(id): Path<Uuid>,
) -> Result<Json<StorageElement>, ApiError> {
    require_role_or_scope(claims.as_ref().map(|ext| &ext.0), READ_ROLES, READ_SCOPES)?;
    state
        .db
        .storage_elements()
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("storage element {id} not found")))
}

#[derive(Debug, Deserialize)]
pub(crate) struct DiscoverRequest {
    name: String,
    url: String,
}

pub(crate) async fn discover(
    State(state): State<Arc<AmState>>,
    claims: Option<Extension<AuthClaims>>,
    Json(request): Json<DiscoverRequest>,
) -> Result<(StatusCode, Json<StorageElement>), ApiError> {
    let claims =
        require_role_or_scope(claims.as_ref().map(|ext| &ext.0), WRITE_ROLES, WRITE_SCOPES)?;
    let name = request.name.trim();
    let url = request.url.trim_end_matches('/');
    if name.is_empty() || url.is_empty() {
        return Err(ApiError::validation("name and url are required"));
    }

    let info = state.se_client.info(url).await?;
    if state.db.storage_elements().get_by_url(url).await?.is_some() {
        return Err(ApiError::conflict(format!("element url {url} already registered")));
    }
    if state
        .db
        .storage_elements()
        .get_by_storage_id(&info.storage_id)
        .await?
        .is_some()
    {
        return Err(ApiError::conflict(format!(
            "storage id {} already registered",
            info.storage_id
        )));
    }

    let se = StorageElement {
        id: Uuid::new_v4(),
        name: name.to_string(),
        url: url.to_string(),
        storage_id: info.storage_id.clone(),
        mode: info.mode,
        status: info.status,
        capacity_bytes: info.capacity.total_bytes,
        used_bytes: info.capacity.used_bytes,
        available_bytes: info.capacity.available_bytes,
        last_sync_at: Some(Utc::now()),
        last_file_sync_at: None,
    };
    state.db.storage_elements().insert(&se).await?;
    info!(
        se_id = %se.id,
        storage_id = %se.storage_id,
        subject = %claims.subject,
        "storage element registered"
    );
    Ok((StatusCode::CREATED, Json(se)))
}

pub(crate) async fn sync_one(
    State(state): State<Arc<AmState>>,
    claims: Option<Extension<AuthClaims>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SyncOutcome>, ApiError> {
    require_role_or_scope(claims.as_ref().map(|ext| &ext.0), WRITE_ROLES, WRITE_SCOPES)?;
    let se = state
        .db
        .storage_elements()
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("storage element {id} not found")))?;
    let outcome = state
        .file_sync
        .sync_one(&se, &CancellationToken::new())
        .await?;
    Ok(Json(outcome))
}

pub(crate) async fn delete(
    State(state): State<Arc<AmState>>,
    claims: Option<Extension<AuthClaims>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let claims =
        require_role_or_scope(claims.as_ref().map(|ext| &ext.0), WRITE_ROLES, WRITE_SCOPES)?;
    if state.db.storage_elements().get(id).await?.is_none() {
        return Err(ApiError::not_found(format!("storage element {id} not found")));
    }
    state.db.storage_elements().delete(id).await?;
    info!(se_id = %id, subject = %claims.subject, "storage element removed");
    Ok(StatusCode::NO_CONTENT)
}
