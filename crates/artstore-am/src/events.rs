//! Server-sent status streams for the admin UI.
//!
//! Each connection gets one snapshot immediately and one per configured
//! interval: a `dep-status` event covering the known dependencies and an
//! `se-status` event covering every Storage Element. The loop ends when the
//! client disconnects.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::Arc;

use async_stream::stream;
use axum::{
    extract::State,
    http::HeaderMap,
    response::sse::{self, KeepAlive, Sse},
};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::session;
use crate::state::AmState;

#[derive(Debug, Serialize)]
struct DependencyEntry {
    name: String,
    status: crate::health::DependencyStatus,
}

pub(crate) async fn system_status(
    State(state): State<Arc<AmState>>,
    headers: HeaderMap,
) -> Result<Sse<impl futures_core::Stream<Item = Result<sse::Event, Infallible>> + Send>, ApiError>
{
    let session_id = headers
        .get(axum::http::header::COOKIE)
        .and_then(|value| value.to_str().ok())
        .and_then(session::session_id_from_cookies)
        .ok_or_else(|| ApiError::unauthorized("a browser session is required"))?;
    if state.sessions.get(&session_id).is_none() {
        return Err(ApiError::unauthorized("session expired"));
    }

    let interval = state.event_interval;
    let stream = stream! {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            for event in snapshot(&state).await {
                yield Ok(event);
            }
        }
    };

    debug!("status stream opened");
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// One snapshot: the `dep-status` and `se-status` events.
async fn snapshot(state: &AmState) -> Vec<sse::Event> {
    let mut events = Vec::with_capacity(2);

    let dependencies: Vec<DependencyEntry> = state
        .health
        .dependency_names()
        .into_iter()
        .map(|name| DependencyEntry {
            status: state.health.dependency_status(&name),
            name,
        })
        .collect();
    match serde_json::to_string(&dependencies) {
        Ok(payload) => events.push(sse::Event::default().event("dep-status").data(payload)),
        Err(err) => warn!(error = %err, "failed to serialize dependency snapshot"),
    }

    match state.db.storage_elements().list().await {
        Ok(elements) => {
            let mut totals: BTreeMap<&'static str, usize> = BTreeMap::new();
            for element in &elements {
                *totals.entry(element.status.as_str()).or_default() += 1;
            }
            let rows: Vec<_> = elements
                .iter()
                .map(|element| {
                    json!({
                        "id": element.id,
                        "name": element.name,
                        "mode": element.mode,
                        "status": element.status,
                    })
                })
                .collect();
            let payload = json!({"elements": rows, "totals": totals});
            events.push(
                sse::Event::default()
                    .event("se-status")
                    .data(payload.to_string()),
            );
        }
        Err(err) => warn!(error = %err, "failed to snapshot storage elements"),
    }

    events
}
