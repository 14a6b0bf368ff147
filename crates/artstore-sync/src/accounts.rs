//! Two-way reconciliation between the local service-account table and the
//! identity provider's clients.
//!
//! The synchronizer owns the reconciliation algorithm; on-demand callers
//! (the IdP status service) reach it through the narrow [`SaSyncHandle`]
//! capability rather than a back-reference.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use artstore_data::{Database, NewServiceAccount};
use artstore_idp::{ClientRepresentation, IdpAdminClient, IdpError, NewClient};
use artstore_model::{SaSource, SaStatus, ServiceAccount};
use artstore_telemetry::Metrics;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Local service-account operations the synchronizer depends on.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// All local rows.
    async fn list(&self) -> anyhow::Result<Vec<ServiceAccount>>;
    /// Create a local row.
    async fn insert(&self, sa: &NewServiceAccount) -> anyhow::Result<()>;
    /// Backfill the provider's internal client id.
    async fn set_keycloak_client_id(&self, id: Uuid, keycloak_client_id: &str)
    -> anyhow::Result<()>;
    /// Stamp the last reconciliation touching a row.
    async fn set_last_synced(&self, id: Uuid, at: DateTime<Utc>) -> anyhow::Result<()>;
    /// Stamp the global service-account watermark.
    async fn stamp_sa_sync(&self, at: DateTime<Utc>) -> anyhow::Result<()>;
}

/// Provider operations the synchronizer depends on.
#[async_trait]
pub trait IdpDirectory: Send + Sync {
    /// Clients whose OAuth client id starts with `prefix`.
    async fn list_clients_by_prefix(
        &self,
        prefix: &str,
    ) -> Result<Vec<ClientRepresentation>, IdpError>;
    /// Create a client, returning the provider's internal id.
    async fn create_client(&self, client: &NewClient) -> Result<String, IdpError>;
    /// Replace a client's scope set.
    async fn update_client_scopes(&self, id: &str, scopes: &[String]) -> Result<(), IdpError>;
}

#[async_trait]
impl AccountStore for Database {
    async fn list(&self) -> anyhow::Result<Vec<ServiceAccount>> {
        self.service_accounts().list().await
    }

    async fn insert(&self, sa: &NewServiceAccount) -> anyhow::Result<()> {
        self.service_accounts().insert(sa).await
    }

    async fn set_keycloak_client_id(
        &self,
        id: Uuid,
        keycloak_client_id: &str,
    ) -> anyhow::Result<()> {
        self.service_accounts()
            .set_keycloak_client_id(id, keycloak_client_id)
            .await
    }

    async fn set_last_synced(&self, id: Uuid, at: DateTime<Utc>) -> anyhow::Result<()> {
        self.service_accounts().set_last_synced(id, at).await
    }

    async fn stamp_sa_sync(&self, at: DateTime<Utc>) -> anyhow::Result<()> {
        self.sync_state().set_last_sa_sync(at).await
    }
}

#[async_trait]
impl IdpDirectory for IdpAdminClient {
    async fn list_clients_by_prefix(
        &self,
        prefix: &str,
    ) -> Result<Vec<ClientRepresentation>, IdpError> {
        Self::list_clients_by_prefix(self, prefix).await
    }

    async fn create_client(&self, client: &NewClient) -> Result<String, IdpError> {
        Self::create_client(self, client).await
    }

    async fn update_client_scopes(&self, id: &str, scopes: &[String]) -> Result<(), IdpError> {
        Self::update_client_scopes(self, id, scopes).await
    }
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SaSyncReport {
    /// Provider clients imported as local rows.
    pub created_local: u64,
    /// Local rows pushed to the provider.
    pub created_remote: u64,
    /// Provider scope sets overwritten from local rows.
    pub scopes_updated: u64,
    /// Local rows backfilled with the provider's internal id.
    pub backfilled: u64,
    /// Per-item failures counted and skipped.
    pub errors: u64,
}

/// Two-way service-account synchronizer.
pub struct SaSynchronizer {
    accounts: Arc<dyn AccountStore>,
    idp: Arc<dyn IdpDirectory>,
    prefix: String,
    metrics: Metrics,
}

impl SaSynchronizer {
    /// Wire the synchronizer to its collaborators.
    #[must_use]
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        idp: Arc<dyn IdpDirectory>,
        prefix: String,
        metrics: Metrics,
    ) -> Self {
        Self {
            accounts,
            idp,
            prefix,
            metrics,
        }
    }

    /// Execute one reconciliation pass. Per-item failures are logged and
    /// counted; the pass continues.
    pub async fn run_once(&self) -> SaSyncReport {
        let timer = Instant::now();
        let mut report = SaSyncReport::default();

        let provider_clients = match self.idp.list_clients_by_prefix(&self.prefix).await {
            Ok(clients) => clients,
            Err(err) => {
                warn!(error = %err, "failed to list provider clients; pass aborted");
                report.errors += 1;
                return report;
            }
        };
        let local_accounts = match self.accounts.list().await {
            Ok(accounts) => accounts,
            Err(err) => {
                warn!(error = %err, "failed to list local service accounts; pass aborted");
                report.errors += 1;
                return report;
            }
        };

        let provider_by_client_id: HashMap<&str, &ClientRepresentation> = provider_clients
            .iter()
            .map(|client| (client.client_id.as_str(), client))
            .collect();
        let local_by_client_id: HashMap<&str, &ServiceAccount> = local_accounts
            .iter()
            .map(|account| (account.client_id.as_str(), account))
            .collect();

        for client in &provider_clients {
            if local_by_client_id.contains_key(client.client_id.as_str()) {
                continue;
            }
            self.import_provider_client(client, &mut report).await;
        }

        let now = Utc::now();
        for account in &local_accounts {
            match provider_by_client_id.get(account.client_id.as_str()) {
                None => self.export_local_account(account, &mut report).await,
                Some(client) => {
                    self.converge_pair(account, client, &mut report).await;
                }
            }
            if let Err(err) = self.accounts.set_last_synced(account.id, now).await {
                warn!(
                    client_id = %account.client_id,
                    error = %err,
                    "failed to stamp account sync"
                );
                report.errors += 1;
            }
        }

        if let Err(err) = self.accounts.stamp_sa_sync(now).await {
            warn!(error = %err, "failed to stamp service account watermark");
            report.errors += 1;
        }

        self.metrics.observe_sa_sync(timer.elapsed());
        info!(
            created_local = report.created_local,
            created_remote = report.created_remote,
            scopes_updated = report.scopes_updated,
            backfilled = report.backfilled,
            errors = report.errors,
            "service account pass complete"
        );
        report
    }

    /// Run passes on `interval` until `shutdown` fires.
    pub fn spawn(
        self: Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => {
                        debug!("service account sync loop stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.run_once().await;
                    }
                }
            }
        })
    }

    async fn import_provider_client(
        &self,
        client: &ClientRepresentation,
        report: &mut SaSyncReport,
    ) {
        let name = client.name.clone().unwrap_or_else(|| {
            client
                .client_id
                .strip_prefix(&self.prefix)
                .unwrap_or(&client.client_id)
                .to_string()
        });
        let row = NewServiceAccount {
            id: Uuid::new_v4(),
            keycloak_client_id: Some(client.id.clone()),
            client_id: client.client_id.clone(),
            name,
            description: client.description.clone(),
            scopes: client.default_client_scopes.clone(),
            status: if client.enabled {
                SaStatus::Active
            } else {
                SaStatus::Suspended
            },
            source: SaSource::Keycloak,
        };
        match self.accounts.insert(&row).await {
            Ok(()) => {
                self.metrics.inc_sa_sync_action("created_local");
                report.created_local += 1;
                debug!(client_id = %client.client_id, "imported provider client");
            }
            Err(err) => {
                warn!(
                    client_id = %client.client_id,
                    error = %err,
                    "failed to import provider client"
                );
                report.errors += 1;
            }
        }
    }

    async fn export_local_account(&self, account: &ServiceAccount, report: &mut SaSyncReport) {
        let new_client = NewClient {
            client_id: account.client_id.clone(),
            name: Some(account.name.clone()),
            description: account.description.clone(),
            default_client_scopes: account.scopes.clone(),
            service_accounts_enabled: true,
        };
        match self.idp.create_client(&new_client).await {
            Ok(provider_id) => {
                self.metrics.inc_sa_sync_action("created_remote");
                report.created_remote += 1;
                if let Err(err) = self
                    .accounts
                    .set_keycloak_client_id(account.id, &provider_id)
                    .await
                {
                    warn!(
                        client_id = %account.client_id,
                        error = %err,
                        "provider client created but local backfill failed"
                    );
                    report.errors += 1;
                }
            }
            Err(err) => {
                warn!(
                    client_id = %account.client_id,
                    error = %err,
                    "failed to create provider client"
                );
                report.errors += 1;
            }
        }
    }

    /// Local scopes are the source of truth; the provider is overwritten
    /// when the unordered sets differ.
    async fn converge_pair(
        &self,
        account: &ServiceAccount,
        client: &ClientRepresentation,
        report: &mut SaSyncReport,
    ) {
        if account.keycloak_client_id.is_none() {
            match self
                .accounts
                .set_keycloak_client_id(account.id, &client.id)
                .await
            {
                Ok(()) => {
                    self.metrics.inc_sa_sync_action("backfilled");
                    report.backfilled += 1;
                }
                Err(err) => {
                    warn!(
                        client_id = %account.client_id,
                        error = %err,
                        "failed to backfill provider client id"
                    );
                    report.errors += 1;
                }
            }
        }

        let local: BTreeSet<&str> = account.scopes.iter().map(String::as_str).collect();
        let remote: BTreeSet<&str> = client
            .default_client_scopes
            .iter()
            .map(String::as_str)
            .collect();
        if local != remote {
            match self
                .idp
                .update_client_scopes(&client.id, &account.scopes)
                .await
            {
                Ok(()) => {
                    self.metrics.inc_sa_sync_action("scopes_updated");
                    report.scopes_updated += 1;
                    debug!(client_id = %account.client_id, "provider scopes converged");
                }
                Err(err) => {
                    warn!(
                        client_id = %account.client_id,
                        error = %err,
                        "failed to converge provider scopes"
                    );
                    report.errors += 1;
                }
            }
        }
    }
}

/// Clonable on-demand trigger for the reconciliation pass.
#[derive(Clone)]
pub struct SaSyncHandle {
    inner: Arc<SaSynchronizer>,
}

impl SaSyncHandle {
    /// Wrap the owning synchronizer.
    #[must_use]
    pub fn new(inner: Arc<SaSynchronizer>) -> Self {
        Self { inner }
    }

    /// Run one pass immediately and return its report.
    pub async fn run_once_now(&self) -> SaSyncReport {
        self.inner.run_once().await
    }
}
