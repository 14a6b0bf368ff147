//! Shared state wired through the Admin Module handlers.

use std::sync::Arc;
use std::time::Duration;

use artstore_auth::AuthState;
use artstore_config::OidcConfig;
use artstore_data::Database;
use artstore_idp::IdpAdminClient;
use artstore_sync::{FileRegistrySynchronizer, SaSyncHandle, SeClient};
use artstore_telemetry::Metrics;

use crate::health::HealthRegistry;
use crate::session::SessionStore;

/// Software version reported by the health endpoints.
pub(crate) const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Dependencies shared by every Admin Module handler.
pub struct AmState {
    /// Registry database.
    pub db: Database,
    /// Identity provider admin client.
    pub idp: IdpAdminClient,
    /// Storage Element client.
    pub se_client: SeClient,
    /// File-registry synchronizer, exposed for on-demand passes.
    pub file_sync: Arc<FileRegistrySynchronizer>,
    /// On-demand service-account reconciliation capability.
    pub sa_sync: SaSyncHandle,
    /// Dependency health registry.
    pub health: Arc<HealthRegistry>,
    /// Browser session store.
    pub sessions: SessionStore,
    /// Identity provider settings for the browser flow.
    pub oidc: OidcConfig,
    /// Prefix stamped onto generated service-account client ids.
    pub sa_prefix: String,
    /// Status-stream snapshot cadence.
    pub event_interval: Duration,
    /// Token validation and role resolution, shared with the middleware.
    pub auth: Arc<AuthState>,
    /// Outbound client for the browser-flow token exchange.
    pub http: reqwest::Client,
    /// Metrics registry.
    pub metrics: Metrics,
}
