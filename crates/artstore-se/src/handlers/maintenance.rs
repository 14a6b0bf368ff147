//! On-demand reconciliation endpoint.

use std::sync::Arc;

use artstore_auth::require_role_or_scope;
use artstore_model::{AuthClaims, Role};
use artstore_store::ReconcileReport;
use axum::{Extension, Json, extract::State};

use crate::error::ApiError;
use crate::state::SeState;

const MAINTENANCE_ROLES: &[Role] = &[Role::Admin];
const MAINTENANCE_SCOPES: &[&str] = &["admin:maintenance"];

pub(crate) async fn reconcile(
    State(state): State<Arc<SeState>>,
    claims: Option<Extension<AuthClaims>>,
) -> Result<Json<ReconcileReport>, ApiError> {
    require_role_or_scope(
        claims.as_ref().map(|ext| &ext.0),
        MAINTENANCE_ROLES,
        MAINTENANCE_SCOPES,
    )?;
    let report = state.reconciler.run_once().await?;
    Ok(Json(report))
}
