//! Liveness, readiness, and metrics endpoints for the Admin Module.

use std::collections::BTreeMap;
use std::sync::Arc;

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
use tracing::error;

use crate::error::ApiError;
use crate::health::DependencyStatus;
use crate::state::{AmState, VERSION};

#[derive(Serialize)]
pub(crate) struct ReadyResponse {
    status: &'static str,
    checks: BTreeMap<String, DependencyStatus>,
}

pub(crate) async fn live() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now(),
        "version": VERSION,
        "service": "artstore-am",
    }))
}

pub(crate) async fn ready(
    State(state): State<Arc<AmState>>,
) -> (StatusCode, Json<ReadyResponse>) {
    let mut checks = BTreeMap::new();
    let mut worst = DependencyStatus::Online;
    for name in state.health.dependency_names() {
        let status = state.health.dependency_status(&name);
        match status {
            DependencyStatus::Offline => worst = DependencyStatus::Offline,
            DependencyStatus::Unavailable if worst == DependencyStatus::Online => {
                worst = DependencyStatus::Unavailable;
            }
            DependencyStatus::Online | DependencyStatus::Unavailable => {}
        }
        checks.insert(name, status);
    }

    let (status, code) = match worst {
        DependencyStatus::Online => ("ok", StatusCode::OK),
        DependencyStatus::Unavailable => ("degraded", StatusCode::OK),
        DependencyStatus::Offline => ("fail", StatusCode::SERVICE_UNAVAILABLE),
    };
    (code, Json(ReadyResponse { status, checks }))
}

pub(crate) async fn metrics(State(state): State<Arc<AmState>>) -> Result<Response, ApiError> {
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
