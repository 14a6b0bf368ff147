//! Liveness, readiness, and metrics endpoints.

use std::collections::BTreeMap;
use std::sync::Arc;

use artstore_model::{InstanceRole, ReplicaMode};
use axum::{
    Json,
    body::Body,
    extract::State,
    http::StatusCode,
    response::Response,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{error, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::{SeState, VERSION};

#[derive(Serialize)]
pub(crate) struct ReadyResponse {
    status: &'static str,
    checks: BTreeMap<&'static str, String>,
}

pub(crate) async fn live() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now(),
        "version": VERSION,
        "service": "artstore-se",
    }))
}

pub(crate) async fn ready(
    State(state): State<Arc<SeState>>,
) -> (StatusCode, Json<ReadyResponse>) {
    let mut checks = BTreeMap::new();
    let mut degraded = false;
    let mut failed = false;

    match filesystem_probe(&state).await {
        Ok(()) => {
            checks.insert("filesystem", "ok".to_string());
        }
        Err(err) => {
            warn!(error = %err, "readiness filesystem probe failed");
            checks.insert("filesystem", "fail".to_string());
            failed = true;
        }
    }

    // The mode marker shares the data directory, so its persistence path is
    // healthy whenever the filesystem probe is.
    checks.insert(
        "wal",
        if failed { "fail" } else { "ok" }.to_string(),
    );

    if !state.index.is_ready() {
        degraded = true;
    }

    if state.instance_role == InstanceRole::Follower
        && state.replica_mode == ReplicaMode::Replicated
    {
        if state.leader_url.is_some() {
            checks.insert("leader_connection", "configured".to_string());
        } else {
            checks.insert("leader_connection", "unconfigured".to_string());
            degraded = true;
        }
    }

    let (status, code) = if failed {
        ("fail", StatusCode::SERVICE_UNAVAILABLE)
    } else if degraded {
        ("degraded", StatusCode::OK)
    } else {
        ("ok", StatusCode::OK)
    };
    (code, Json(ReadyResponse { status, checks }))
}

pub(crate) async fn metrics(State(state): State<Arc<SeState>>) -> Result<Response, ApiError> {
    match state.metrics.render() {
        Ok(body) => Response::builder()
            .status(StatusCode::OK)
            .header(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4",
            )
            .body(Body::from(body))
            .map_err(|_| ApiError::internal("failed to build metrics response")),
        Err(err) => {
            error!(error = %err, "failed to render metrics");
            Err(ApiError::internal("failed to render metrics"))
        }
    }
}

async fn filesystem_probe(state: &SeState) -> std::io::Result<()> {
    let probe = state
        .blobs
        .data_dir()
        .join(format!(".health-probe-{}", Uuid::new_v4()));
    tokio::fs::write(&probe, b"probe").await?;
    tokio::fs::remove_file(&probe).await
}
