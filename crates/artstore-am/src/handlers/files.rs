//! Federated file-registry endpoints.

use std::sync::Arc;

use artstore_auth::require_role_or_scope;
use artstore_model::{AuthClaims, FileStatus, Page, RegistryFile};
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::error::ApiError;
use crate::handlers::{READ_ROLES, READ_SCOPES, WRITE_ROLES, WRITE_SCOPES};
use crate::state::AmState;

const DEFAULT_PAGE_LIMIT: usize = 100;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ListQuery {
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    offset: Option<usize>,
}

pub(crate) async fn list(
    State(state): State<Arc<AmState>>,
    claims: Option<Extension<AuthClaims>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<RegistryFile>>, ApiError> {
    require_role_or_scope(claims.as_ref().map(|ext| &ext.0), READ_ROLES, READ_SCOPES)?;
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_LIMIT).max(1);
    let offset = query.offset.unwrap_or(0);

    let items = state
        .db
        .files()
        .list(
            i64::try_from(limit).unwrap_or(i64::MAX),
            i64::try_from(offset).unwrap_or(i64::MAX),
        )
        .await?;
    let total = usize::try_from(state.db.files().count().await?).unwrap_or(0);
    Ok(Json(Page::new(items, total, limit, offset)))
}

pub(crate) async fn get(
    State(state): State<Arc<AmState>>,
    claims: Option<Extension<AuthClaims>>,
    Path(id): Path<Uuid>,
) -> Result<Json<RegistryFile>, ApiError> {
    require_role_or_scope(claims.as_ref().map(|ext| &ext.0), READ_ROLES, READ_SCOPES)?;
    state
        .db
        .files()
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("registry file {id} not found")))
}

/// Propagate a delete to the owning element, then tombstone the row. The
/// element delete runs first so a failure leaves the registry untouched.
pub(crate) async fn delete(
    State(state): State<Arc<AmState>>,
    claims: Option<Extension<AuthClaims>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let claims =
        require_role_or_scope(claims.as_ref().map(|ext| &ext.0), WRITE_ROLES, WRITE_SCOPES)?;
    let row = state
        .db
        .files()
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("registry file {id} not found")))?;
    let se = state
        .db
        .storage_elements()
        .get(row.storage_element_id)
        .await?
        .ok_or_else(|| {
            ApiError::not_found(format!(
                "storage element {} not found",
                row.storage_element_id
            ))
        })?;

    if row.status != FileStatus::Deleted {
        state.se_client.delete_file(&se.url, row.file_id).await?;
        state.db.files().set_status(row.id, FileStatus::Deleted).await?;
    }
    info!(
        registry_id = %row.id,
        file_id = %row.file_id,
        se_id = %se.id,
        subject = %claims.subject,
        "federated file deleted"
    );
    Ok(StatusCode::NO_CONTENT)
}
