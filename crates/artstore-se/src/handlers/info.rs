//! Public element info endpoint.

use std::sync::Arc;

use artstore_model::SeInfo;
use axum::{Json, extract::State};

use crate::state::SeState;

pub(crate) async fn info(State(state): State<Arc<SeState>>) -> Json<SeInfo> {
    Json(state.info())
}
