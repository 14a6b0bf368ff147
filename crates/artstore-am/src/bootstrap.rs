//! Admin Module boot sequence.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use artstore_auth::{
    AuthState, KeySetValidator, RoleOverrideLookup, RoleResolver, build_http_client,
};
use artstore_config::AmConfig;
use artstore_data::{Database, RoleOverrideStore};
use artstore_idp::{IdpAdminClient, IdpAdminConfig};
use artstore_model::Role;
use artstore_sync::{
    BearerProvider, FileRegistrySynchronizer, SaSyncHandle, SaSynchronizer, SeClient,
};
use artstore_telemetry::{Metrics, init_tracing};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::health::{DependencyChecker, HealthRegistry, HttpProbe, SqlPing};
use crate::router::ApiServer;
use crate::session::SessionStore;
use crate::state::AmState;

/// Role overrides resolved from the registry database.
struct DbOverrides {
    store: RoleOverrideStore,
}

#[async_trait]
impl RoleOverrideLookup for DbOverrides {
    async fn role_override(&self, keycloak_user_id: &str) -> Option<Role> {
        match self.store.get(keycloak_user_id).await {
            Ok(row) => row.map(|over| over.additional_role),
            Err(err) => {
                warn!(error = %err, "role override lookup failed");
                None
            }
        }
    }
}

/// Bearer tokens for Storage Element calls, drawn from the provider's
/// client-credentials cache.
struct IdpTokens {
    idp: IdpAdminClient,
}

#[async_trait]
impl BearerProvider for IdpTokens {
    async fn bearer_token(&self) -> Result<String, String> {
        self.idp.bearer_token().await.map_err(|err| err.to_string())
    }
}

/// Entry point for the Admin Module process.
///
/// # Errors
///
/// Returns an error when configuration, database, or server startup fails.
pub async fn run() -> Result<()> {
    let config = AmConfig::from_env().context("failed to load configuration")?;
    init_tracing(&config.log_level, config.log_format);
    info!("admin module bootstrap starting");

    let metrics = Metrics::new().context("failed to build metrics registry")?;
    let db = Database::connect(&config.database.connection_url())
        .await
        .context("failed to initialize the registry database")?;

    let idp_http = build_http_client(&config.idp_client, config.http_timeout)
        .context("failed to build identity provider client")?;
    let idp = IdpAdminClient::new(
        idp_http.clone(),
        IdpAdminConfig {
            base_url: config.oidc.url.clone(),
            realm: config.oidc.realm.clone(),
            client_id: config.oidc.client_id.clone(),
            client_secret: config.oidc.client_secret.clone(),
        },
    );

    let se_http = build_http_client(&config.se_client, config.http_timeout)
        .context("failed to build storage element client")?;
    let se_client = SeClient::new(
        se_http,
        Arc::new(IdpTokens { idp: idp.clone() }),
    );

    let validator = KeySetValidator::start(idp_http.clone(), config.auth_keys.clone()).await;
    let auth = Arc::new(AuthState {
        validator: validator.clone(),
        resolver: RoleResolver::new(
            config.oidc.admin_groups.clone(),
            config.oidc.readonly_groups.clone(),
        ),
        overrides: Arc::new(DbOverrides {
            store: db.role_overrides(),
        }),
    });

    let file_sync = Arc::new(FileRegistrySynchronizer::new(
        Arc::new(db.clone()),
        se_client.clone(),
        config.sync_page_size,
        metrics.clone(),
    ));
    let sa_sync = Arc::new(SaSynchronizer::new(
        Arc::new(db.clone()),
        Arc::new(idp.clone()),
        config.sa_prefix.clone(),
        metrics.clone(),
    ));

    let checkers: Vec<Arc<dyn DependencyChecker>> = vec![
        Arc::new(SqlPing::new("database.pool".to_string(), db.pool().clone())),
        Arc::new(HttpProbe::new(
            "idp.realm".to_string(),
            idp_http.clone(),
            format!("{}/realms/{}", config.oidc.url, config.oidc.realm),
        )),
    ];
    let health = Arc::new(HealthRegistry::new(checkers, metrics.clone()));

    let shutdown = CancellationToken::new();
    let file_sync_task =
        Arc::clone(&file_sync).spawn(config.file_sync_interval, shutdown.clone());
    let sa_sync_task = Arc::clone(&sa_sync).spawn(config.sa_sync_interval, shutdown.clone());
    let health_task = Arc::clone(&health).spawn(config.health_interval, shutdown.clone());
    let refresh_task = validator.spawn_refresh(shutdown.clone());

    let state = Arc::new(AmState {
        db,
        idp,
        se_client,
        file_sync,
        sa_sync: SaSyncHandle::new(Arc::clone(&sa_sync)),
        health,
        sessions: SessionStore::new(),
        oidc: config.oidc.clone(),
        sa_prefix: config.sa_prefix.clone(),
        event_interval: config.event_interval,
        auth: Arc::clone(&auth),
        http: idp_http,
        metrics,
    });

    let server = ApiServer::new(Arc::clone(&state), auth, &config.server);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("shutdown signal received");
        signal_token.cancel();
    });

    let result = server.serve(addr, shutdown.clone(), config.server.shutdown).await;

    shutdown.cancel();
    for (name, task) in [
        ("file-sync", file_sync_task),
        ("sa-sync", sa_sync_task),
        ("dependency-health", health_task),
        ("jwks-refresh", refresh_task),
    ] {
        if let Err(err) = task.await {
            warn!(task = name, error = %err, "background task join failed");
        }
    }

    result?;
    info!("admin module shutdown complete");
    Ok(())
}

async fn wait_for_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = term.recv() => {}
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler; relying on ctrl-c");
                let _ = ctrl_c.await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
