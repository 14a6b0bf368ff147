//! Router construction and server host for the Storage Element API.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use artstore_auth::{AuthState, authenticate};
use artstore_config::ServerTimeouts;
use axum::{
    Router,
    extract::{DefaultBodyLimit, MatchedPath, Request, State},
    http::{Method, header::CONTENT_TYPE},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;

use crate::handlers::{download, files, health, info as info_handler, maintenance, mode};
use crate::state::SeState;

/// Axum router wrapper hosting the Storage Element services.
pub struct ApiServer {
    router: Router,
}

impl ApiServer {
    /// Build the router over shared state and the auth middleware.
    #[must_use]
    pub fn new(state: Arc<SeState>, auth: Arc<AuthState>, timeouts: &ServerTimeouts) -> Self {
        let protected = Router::new()
            .route("/api/v1/files", get(files::list_files))
            .route("/api/v1/files/upload", post(files::upload_file))
            .route(
                "/api/v1/files/{id}",
                get(files::get_file)
                    .patch(files::update_file)
                    .delete(files::delete_file),
            )
            .route("/api/v1/files/{id}/download", get(download::download_file))
            .route("/api/v1/mode/transition", post(mode::transition_mode))
            .route("/api/v1/maintenance/reconcile", post(maintenance::reconcile))
            .route_layer(middleware::from_fn_with_state(auth, authenticate))
            .layer(DefaultBodyLimit::disable());

        let public = Router::new()
            .route("/api/v1/info", get(info_handler::info))
            .route("/health/live", get(health::live))
            .route("/health/ready", get(health::ready))
            .route("/metrics", get(health::metrics));

        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([CONTENT_TYPE, axum::http::header::AUTHORIZATION]);

        let router = protected
            .merge(public)
            .layer(middleware::from_fn_with_state(
                Arc::clone(&state),
                track_requests,
            ))
            .layer(TraceLayer::new_for_http())
            .layer(TimeoutLayer::with_status_code(
                axum::http::StatusCode::REQUEST_TIMEOUT,
                timeouts.read,
            ))
            .layer(cors)
            .with_state(state);

        Self { router }
    }

    /// Router clone for in-process testing.
    #[must_use]
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve until `shutdown` fires, then drain within `drain`.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot bind or the server fails.
    pub async fn serve(
        self,
        addr: SocketAddr,
        shutdown: CancellationToken,
        drain: Duration,
    ) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        info!(addr = %addr, "storage element listening");

        let graceful = shutdown.clone();
        let server = axum::serve(listener, self.router)
            .with_graceful_shutdown(async move { graceful.cancelled().await });

        tokio::select! {
            result = server => result.context("server failed"),
            () = async {
                shutdown.cancelled().await;
                tokio::time::sleep(drain).await;
            } => {
                info!("drain window elapsed; abandoning in-flight requests");
                Ok(())
            }
        }
    }
}

async fn track_requests(
    State(state): State<Arc<SeState>>,
    matched: Option<MatchedPath>,
    req: Request,
    next: Next,
) -> Response {
    let route = matched.map_or_else(
        || req.uri().path().to_string(),
        |path| path.as_str().to_string(),
    );
    let response = next.run(req).await;
    state
        .metrics
        .inc_http_request(&route, response.status().as_u16());
    response
}
