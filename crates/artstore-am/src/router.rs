//! Router construction and server host for the Admin Module API.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use artstore_auth::{AuthState, authenticate};
use artstore_config::ServerTimeouts;
use axum::{
    Router,
    extract::{MatchedPath, Request, State},
    http::{Method, header::CONTENT_TYPE},
    middleware::{self, Next},
    response::Response,
    routing::{get, post, put},
};
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;

use crate::events;
use crate::handlers::{
    admin_users, dashboard, files, health, idp_status, oidc, service_accounts, storage_elements,
};
use crate::state::AmState;

/// Axum router wrapper hosting the Admin Module services.
pub struct ApiServer {
    router: Router,
}

impl ApiServer {
    /// Build the router over shared state and the auth middleware.
    #[must_use]
    pub fn new(state: Arc<AmState>, auth: Arc<AuthState>, timeouts: &ServerTimeouts) -> Self {
        let api = Router::new()
            .route("/api/v1/admin-users", get(admin_users::search))
            .route("/api/v1/admin-users/{id}", get(admin_users::get))
            .route(
                "/api/v1/admin-users/{id}/role-override",
                put(admin_users::put_override).delete(admin_users::delete_override),
            )
            .route(
                "/api/v1/service-accounts",
                get(service_accounts::list).post(service_accounts::create),
            )
            .route(
                "/api/v1/service-accounts/{id}",
                get(service_accounts::get)
                    .patch(service_accounts::update)
                    .delete(service_accounts::delete),
            )
            .route(
                "/api/v1/service-accounts/{id}/rotate-secret",
                post(service_accounts::rotate_secret),
            )
            .route("/api/v1/storage-elements", get(storage_elements::list))
            .route(
                "/api/v1/storage-elements/discover",
                post(storage_elements::discover),
            )
            .route(
                "/api/v1/storage-elements/{id}",
                get(storage_elements::get).delete(storage_elements::delete),
            )
            .route(
                "/api/v1/storage-elements/{id}/sync",
                post(storage_elements::sync_one),
            )
            .route("/api/v1/files", get(files::list))
            .route("/api/v1/files/{id}", get(files::get).delete(files::delete))
            .route("/api/v1/idp/status", get(idp_status::status))
            .route("/api/v1/idp/sync-sa", post(idp_status::sync_now))
            .route("/api/v1/dashboard", get(dashboard::dashboard))
            .route_layer(middleware::from_fn_with_state(auth, authenticate));

        let public = Router::new()
            .route("/admin/login", get(oidc::login))
            .route("/admin/callback", get(oidc::callback))
            .route("/admin/logout", get(oidc::logout))
            .route("/admin/events/system-status", get(events::system_status))
            .route("/health/live", get(health::live))
            .route("/health/ready", get(health::ready))
            .route("/metrics", get(health::metrics));

        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([CONTENT_TYPE, axum::http::header::AUTHORIZATION]);

        let router = api
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
        info!(addr = %addr, "admin module listening");

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
    State(state): State<Arc<AmState>>,
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
