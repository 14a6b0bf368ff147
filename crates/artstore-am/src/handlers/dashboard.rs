//! Fan-in aggregates backing the UI cards and tables.

use std::collections::BTreeMap;
use std::sync::Arc;

use artstore_auth::require_role_or_scope;
use artstore_model::{AuthClaims, SaStatus};
use axum::{Extension, Json, extract::State};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::ApiError;
use crate::handlers::{READ_ROLES, READ_SCOPES};
use crate::state::AmState;

#[derive(Debug, Serialize)]
pub(crate) struct DashboardResponse {
    files: FileAggregates,
    storage_elements: SeAggregates,
    service_accounts: SaAggregates,
    last_file_sync_at: Option<DateTime<Utc>>,
    last_sa_sync_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct FileAggregates {
    total: i64,
    by_status: BTreeMap<String, i64>,
    total_active_bytes: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct SeAggregates {
    total: usize,
    by_status: BTreeMap<String, usize>,
    capacity_bytes: i64,
    used_bytes: i64,
    available_bytes: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct SaAggregates {
    total: usize,
    active: usize,
}

pub(crate) async fn dashboard(
    State(state): State<Arc<AmState>>,
    claims: Option<Extension<AuthClaims>>,
) -> Result<Json<DashboardResponse>, ApiError> {
    require_role_or_scope(claims.as_ref().map(|ext| &ext.0), READ_ROLES, READ_SCOPES)?;

    let file_total = state.db.files().count().await?;
    let by_status: BTreeMap<String, i64> =
        state.db.files().count_by_status().await?.into_iter().collect();
    let total_active_bytes = state.db.files().total_active_size().await?;

    let elements = state.db.storage_elements().list().await?;
    let mut se_by_status: BTreeMap<String, usize> = BTreeMap::new();
    let mut capacity_bytes = 0;
    let mut used_bytes = 0;
    let mut available_bytes = 0;
    for element in &elements {
        *se_by_status
            .entry(element.status.as_str().to_string())
            .or_default() += 1;
        capacity_bytes += element.capacity_bytes;
        used_bytes += element.used_bytes;
        available_bytes += element.available_bytes;
    }

    let accounts = state.db.service_accounts().list().await?;
    let active = accounts
        .iter()
        .filter(|account| account.status == SaStatus::Active)
        .count();

    let sync_state = state.db.sync_state().get().await?;
    Ok(Json(DashboardResponse {
        files: FileAggregates {
            total: file_total,
            by_status,
            total_active_bytes,
        },
        storage_elements: SeAggregates {
            total: elements.len(),
            by_status: se_by_status,
            capacity_bytes,
            used_bytes,
            available_bytes,
        },
        service_accounts: SaAggregates {
            total: accounts.len(),
            active,
        },
        last_file_sync_at: sync_state.last_file_sync_at,
        last_sa_sync_at: sync_state.last_sa_sync_at,
    }))
}
