//! Identity-provider status and on-demand service-account reconciliation.
//!
//! The status endpoint consumes the synchronizer only through its
//! `run_once_now` capability; there is no back-reference from the
//! synchronizer to this service.

use std::sync::Arc;

use artstore_auth::require_role_or_scope;
use artstore_model::AuthClaims;
use artstore_sync::SaSyncReport;
use axum::{Extension, Json, extract::State};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::ApiError;
use crate::handlers::{READ_ROLES, READ_SCOPES, WRITE_ROLES, WRITE_SCOPES};
use crate::state::AmState;

#[derive(Debug, Serialize)]
pub(crate) struct IdpStatusResponse {
    reachable: bool,
    url: String,
    realm: String,
    last_sa_sync_at: Option<DateTime<Utc>>,
}

pub(crate) async fn status(
    State(state): State<Arc<AmState>>,
    claims: Option<Extension<AuthClaims>>,
) -> Result<Json<IdpStatusResponse>, ApiError> {
    require_role_or_scope(claims.as_ref().map(|ext| &ext.0), READ_ROLES, READ_SCOPES)?;
    let reachable = state.idp.is_reachable().await;
    let sync_state = state.db.sync_state().get().await?;
    Ok(Json(IdpStatusResponse {
        reachable,
        url: state.oidc.url.clone(),
        realm: state.oidc.realm.clone(),
        last_sa_sync_at: sync_state.last_sa_sync_at,
    }))
}

pub(crate) async fn sync_now(
    State(state): State<Arc<AmState>>,
    claims: Option<Extension<AuthClaims>>,
) -> Result<Json<SaSyncReport>, ApiError> {
    require_role_or_scope(claims.as_ref().map(|ext| &ext.0), WRITE_ROLES, WRITE_SCOPES)?;
    let report = state.sa_sync.run_once_now().await;
    Ok(Json(report))
}
