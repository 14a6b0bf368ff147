//! Pluggable dependency health checkers with periodic evaluation.
//!
//! Checker names are hierarchical: a dependency named `database` is online
//! iff every checker whose name starts with `database` reports healthy.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use artstore_telemetry::Metrics;
use async_trait::async_trait;
use serde::Serialize;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// One probe over an external collaborator.
#[async_trait]
pub trait DependencyChecker: Send + Sync {
    /// Hierarchical checker name, e.g. `database.pool` or `idp.realm`.
    fn name(&self) -> &str;
    /// Probe the dependency once.
    ///
    /// # Errors
    ///
    /// Returns a human-readable description of the failure.
    async fn check(&self) -> Result<(), String>;
}

/// SQL `SELECT 1` ping over the registry pool.
pub struct SqlPing {
    name: String,
    pool: PgPool,
}

impl SqlPing {
    /// Create a ping named `name` over `pool`.
    #[must_use]
    pub const fn new(name: String, pool: PgPool) -> Self {
        Self { name, pool }
    }
}

#[async_trait]
impl DependencyChecker for SqlPing {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self) -> Result<(), String> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|err| err.to_string())
    }
}

/// HTTP GET probe expecting a success status.
pub struct HttpProbe {
    name: String,
    client: reqwest::Client,
    url: String,
}

impl HttpProbe {
    /// Create a probe named `name` over `url`.
    #[must_use]
    pub const fn new(name: String, client: reqwest::Client, url: String) -> Self {
        Self { name, client, url }
    }
}

#[async_trait]
impl DependencyChecker for HttpProbe {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self) -> Result<(), String> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|err| err.to_string())?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(format!("status {status}"))
        }
    }
}

/// Aggregate status of a named dependency.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DependencyStatus {
    /// Every checker under the name is healthy.
    Online,
    /// At least one checker under the name is unhealthy.
    Offline,
    /// No checker under the name has reported yet.
    Unavailable,
}

/// Registry of checkers plus their last observed results.
pub struct HealthRegistry {
    checkers: Vec<Arc<dyn DependencyChecker>>,
    results: RwLock<BTreeMap<String, bool>>,
    metrics: Metrics,
}

impl HealthRegistry {
    /// Create a registry over the given checkers.
    #[must_use]
    pub fn new(checkers: Vec<Arc<dyn DependencyChecker>>, metrics: Metrics) -> Self {
        Self {
            checkers,
            results: RwLock::new(BTreeMap::new()),
            metrics,
        }
    }

    /// Run every checker once, updating results and metrics.
    pub async fn evaluate_all(&self) {
        for checker in &self.checkers {
            let name = checker.name().to_string();
            let timer = Instant::now();
            let healthy = match checker.check().await {
                Ok(()) => true,
                Err(reason) => {
                    warn!(checker = %name, reason = %reason, "dependency check failed");
                    false
                }
            };
            self.metrics
                .observe_dependency_latency(&name, timer.elapsed());
            self.metrics.set_dependency_up(&name, healthy);
            self.results
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .insert(name, healthy);
        }
    }

    /// Evaluate on `interval` until `shutdown` fires; one evaluation runs
    /// immediately at startup.
    pub fn spawn(
        self: Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => {
                        debug!("dependency health loop stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.evaluate_all().await;
                    }
                }
            }
        })
    }

    /// Aggregate status for a dependency name: online iff every checker
    /// whose name is prefixed by it reports healthy.
    #[must_use]
    pub fn dependency_status(&self, dependency: &str) -> DependencyStatus {
        let results = self
            .results
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut seen = false;
        for (name, healthy) in results.iter() {
            if !name.starts_with(dependency) {
                continue;
            }
            seen = true;
            if !healthy {
                return DependencyStatus::Offline;
            }
        }
        if seen {
            DependencyStatus::Online
        } else {
            DependencyStatus::Unavailable
        }
    }

    /// Names of the distinct dependencies (first label of each checker).
    #[must_use]
    pub fn dependency_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .checkers
            .iter()
            .map(|checker| {
                checker
                    .name()
                    .split('.')
                    .next()
                    .unwrap_or(checker.name())
                    .to_string()
            })
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Whether every registered checker currently reports healthy.
    #[must_use]
    pub fn all_healthy(&self) -> bool {
        let results = self
            .results
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        !results.is_empty() && results.values().all(|healthy| *healthy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedChecker {
        name: &'static str,
        healthy: bool,
    }

    #[async_trait]
    impl DependencyChecker for FixedChecker {
        fn name(&self) -> &str {
            self.name
        }

        async fn check(&self) -> Result<(), String> {
            if self.healthy {
                Ok(())
            } else {
                Err("down".to_string())
            }
        }
    }

    fn registry(checkers: Vec<(&'static str, bool)>) -> HealthRegistry {
        HealthRegistry::new(
            checkers
                .into_iter()
                .map(|(name, healthy)| {
                    Arc::new(FixedChecker { name, healthy }) as Arc<dyn DependencyChecker>
                })
                .collect(),
            Metrics::new().expect("metrics"),
        )
    }

    #[tokio::test]
    async fn dependency_is_online_iff_all_prefixed_checkers_are_healthy() {
        let registry = registry(vec![
            ("database.pool", true),
            ("database.migrations", true),
            ("idp.realm", false),
        ]);
        registry.evaluate_all().await;

        assert_eq!(
            registry.dependency_status("database"),
            DependencyStatus::Online
        );
        assert_eq!(registry.dependency_status("idp"), DependencyStatus::Offline);
        assert_eq!(
            registry.dependency_status("queue"),
            DependencyStatus::Unavailable
        );
    }

    #[tokio::test]
    async fn partial_failure_takes_the_dependency_offline() {
        let registry = registry(vec![("database.pool", true), ("database.replica", false)]);
        registry.evaluate_all().await;
        assert_eq!(
            registry.dependency_status("database"),
            DependencyStatus::Offline
        );
        assert!(!registry.all_healthy());
    }

    #[test]
    fn dependency_names_are_first_labels_deduplicated() {
        let registry = registry(vec![
            ("database.pool", true),
            ("database.replica", true),
            ("idp.realm", true),
        ]);
        assert_eq!(registry.dependency_names(), vec!["database", "idp"]);
    }

    #[test]
    fn unevaluated_registry_reports_unavailable() {
        let registry = registry(vec![("database.pool", true)]);
        assert_eq!(
            registry.dependency_status("database"),
            DependencyStatus::Unavailable
        );
    }
}
