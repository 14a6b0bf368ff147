//! Storage Element boot sequence.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use artstore_auth::{AuthState, KeySetValidator, NoOverrides, RoleResolver, build_http_client};
use artstore_config::SeConfig;
use artstore_model::ReplicaMode;
use artstore_store::{
    AttrStore, BlobStore, FileIndex, GarbageCollector, ModeMachine, Reconciler, load_initial_mode,
};
use artstore_telemetry::{Metrics, init_tracing};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::router::ApiServer;
use crate::state::SeState;

/// Entry point for the Storage Element process.
///
/// # Errors
///
/// Returns an error when configuration, store initialization, or the HTTP
/// server fails.
pub async fn run() -> Result<()> {
    let config = SeConfig::from_env().context("failed to load configuration")?;
    init_tracing(&config.log_level, config.log_format);
    info!(storage_id = %config.storage_id, "storage element bootstrap starting");

    tokio::fs::create_dir_all(&config.data_dir)
        .await
        .with_context(|| format!("failed to create data dir {}", config.data_dir.display()))?;

    let metrics = Metrics::new().context("failed to build metrics registry")?;
    let blobs = BlobStore::new(&config.data_dir);
    let attrs = AttrStore::new(&config.data_dir);
    let index = Arc::new(FileIndex::new());

    let scanned = index
        .build_from_dir(&attrs)
        .await
        .context("failed to build index from data dir")?;
    info!(files = scanned, "index built from disk");

    let initial_mode = load_initial_mode(&config.data_dir, config.default_mode);
    let marker_dir = match config.replica_mode {
        ReplicaMode::Replicated => Some(config.data_dir.as_path()),
        ReplicaMode::Standalone => None,
    };
    let mode = Arc::new(ModeMachine::new(initial_mode, marker_dir));

    let gc = Arc::new(GarbageCollector::new(
        blobs.clone(),
        attrs.clone(),
        Arc::clone(&index),
        metrics.clone(),
    ));
    let reconciler = Arc::new(Reconciler::new(
        blobs.clone(),
        attrs.clone(),
        Arc::clone(&index),
        metrics.clone(),
    ));

    let http_client = build_http_client(&config.http_client, None)
        .context("failed to build outbound http client")?;
    let validator = KeySetValidator::start(http_client, config.auth_keys.clone()).await;
    let auth = Arc::new(AuthState {
        validator: validator.clone(),
        resolver: RoleResolver::new(Vec::new(), Vec::new()),
        overrides: Arc::new(NoOverrides),
    });

    let shutdown = CancellationToken::new();
    let gc_task = Arc::clone(&gc).spawn(config.gc_interval, shutdown.clone());
    let reconcile_task =
        Arc::clone(&reconciler).spawn(config.reconcile_interval, shutdown.clone());
    let refresh_task = validator.spawn_refresh(shutdown.clone());

    let state = Arc::new(SeState {
        storage_id: config.storage_id.clone(),
        capacity_bytes: config.capacity_bytes,
        replica_mode: config.replica_mode,
        instance_role: config.instance_role,
        leader_url: config.leader_url.clone(),
        blobs,
        attrs,
        index,
        mode,
        reconciler,
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
        ("gc", gc_task),
        ("reconciler", reconcile_task),
        ("jwks-refresh", refresh_task),
    ] {
        if let Err(err) = task.await {
            warn!(task = name, error = %err, "background task join failed");
        }
    }

    result?;
    info!("storage element shutdown complete");
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
