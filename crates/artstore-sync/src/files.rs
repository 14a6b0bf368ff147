//! Periodic reconciliation between the federated file registry and each
//! online Storage Element.
//!
//! One pass refreshes every online element under a bounded worker pool:
//! info refresh, paginated listing, content-diffed batch upsert, and
//! tombstoning of rows no longer present on the element.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use artstore_data::{Database, NewRegistryFile, SeInfoUpdate};
use artstore_model::{FileMetadata, RegistryFile, SeStatus, StorageElement};
use artstore_telemetry::Metrics;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};
use crate::se_client::SeClient;

/// Upper bound on per-pass worker parallelism.
const MAX_PARALLEL_WORKERS: usize = 5;

/// Registry operations the synchronizer depends on.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Elements currently marked online.
    async fn online_elements(&self) -> anyhow::Result<Vec<StorageElement>>;
    /// Apply an info refresh to an element row.
    async fn apply_info(&self, id: Uuid, update: &SeInfoUpdate) -> anyhow::Result<()>;
    /// Every registry row for an element.
    async fn files_for_se(&self, se_id: Uuid) -> anyhow::Result<Vec<RegistryFile>>;
    /// Upsert observed records for an element.
    async fn upsert_files(&self, se_id: Uuid, files: &[NewRegistryFile]) -> anyhow::Result<()>;
    /// Tombstone rows whose file id was not observed; returns the count.
    async fn mark_absent_deleted(&self, se_id: Uuid, observed: &[Uuid]) -> anyhow::Result<u64>;
    /// Stamp the element's file-sync completion.
    async fn stamp_se_file_sync(&self, se_id: Uuid, at: DateTime<Utc>) -> anyhow::Result<()>;
    /// Stamp the global file-sync watermark.
    async fn stamp_global_file_sync(&self, at: DateTime<Utc>) -> anyhow::Result<()>;
}

#[async_trait]
impl RegistryStore for Database {
    async fn online_elements(&self) -> anyhow::Result<Vec<StorageElement>> {
        self.storage_elements().list_by_status(SeStatus::Online).await
    }

    async fn apply_info(&self, id: Uuid, update: &SeInfoUpdate) -> anyhow::Result<()> {
        self.storage_elements().apply_info(id, update).await
    }

    async fn files_for_se(&self, se_id: Uuid) -> anyhow::Result<Vec<RegistryFile>> {
        self.files().files_for_se(se_id).await
    }

    async fn upsert_files(&self, se_id: Uuid, files: &[NewRegistryFile]) -> anyhow::Result<()> {
        self.files().upsert_batch(se_id, files).await
    }

    async fn mark_absent_deleted(&self, se_id: Uuid, observed: &[Uuid]) -> anyhow::Result<u64> {
        self.files().mark_absent_deleted(se_id, observed).await
    }

    async fn stamp_se_file_sync(&self, se_id: Uuid, at: DateTime<Utc>) -> anyhow::Result<()> {
        self.storage_elements().set_last_file_sync(se_id, at).await
    }

    async fn stamp_global_file_sync(&self, at: DateTime<Utc>) -> anyhow::Result<()> {
        self.sync_state().set_last_file_sync(at).await
    }
}

/// Per-element outcome of one synchronization.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SyncOutcome {
    /// Registry id of the element.
    pub se_id: Uuid,
    /// Rows newly created.
    pub added: u64,
    /// Rows whose content changed.
    pub updated: u64,
    /// Rows newly tombstoned.
    pub deleted: u64,
    /// Files observed on the element.
    pub files_seen: usize,
}

/// Aggregated outcome of one full pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncSummary {
    /// Elements attempted.
    pub attempted: usize,
    /// Elements synchronized successfully.
    pub succeeded: usize,
    /// Elements skipped after a failure.
    pub failed: usize,
    /// Per-element outcomes for the successes.
    pub outcomes: Vec<SyncOutcome>,
}

/// Bounded-parallelism synchronizer over all online elements.
pub struct FileRegistrySynchronizer {
    store: Arc<dyn RegistryStore>,
    client: SeClient,
    page_size: usize,
    metrics: Metrics,
}

impl FileRegistrySynchronizer {
    /// Wire the synchronizer to its collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn RegistryStore>,
        client: SeClient,
        page_size: usize,
        metrics: Metrics,
    ) -> Self {
        Self {
            store,
            client,
            page_size,
            metrics,
        }
    }

    /// Execute one full pass over every online element with at most five
    /// workers in flight.
    pub async fn run_once(&self, shutdown: &CancellationToken) -> SyncSummary {
        let elements = match self.store.online_elements().await {
            Ok(elements) => elements,
            Err(err) => {
                warn!(error = %err, "failed to enumerate online elements");
                return SyncSummary::default();
            }
        };

        let mut summary = SyncSummary {
            attempted: elements.len(),
            ..SyncSummary::default()
        };
        let mut workers = futures_util::stream::iter(elements.into_iter().map(|se| async move {
            self.sync_one(&se, shutdown).await
        }))
        .buffer_unordered(MAX_PARALLEL_WORKERS);

        while let Some(result) = workers.next().await {
            match result {
                Ok(outcome) => {
                    summary.succeeded += 1;
                    summary.outcomes.push(outcome);
                }
                Err(err) => {
                    summary.failed += 1;
                    warn!(error = %err, "element synchronization failed; skipping");
                }
            }
        }

        if let Err(err) = self.store.stamp_global_file_sync(Utc::now()).await {
            warn!(error = %err, "failed to stamp global file sync watermark");
        }
        info!(
            attempted = summary.attempted,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "file registry pass complete"
        );
        summary
    }

    /// Synchronize one element: info refresh, paginated listing with
    /// content-diffed upserts, then tombstoning of absent rows.
    ///
    /// # Errors
    ///
    /// Returns a [`SyncError`] when the element or the registry fails;
    /// callers treat this as skip-and-continue.
    pub async fn sync_one(
        &self,
        se: &StorageElement,
        shutdown: &CancellationToken,
    ) -> SyncResult<SyncOutcome> {
        let timer = Instant::now();
        let se_label = se.storage_id.clone();

        let observed_info = self.client.info(&se.url).await?;
        if observed_info.storage_id != se.storage_id {
            warn!(
                registered = %se.storage_id,
                reported = %observed_info.storage_id,
                url = %se.url,
                "element reports a different storage id than registered"
            );
        }
        self.store
            .apply_info(
                se.id,
                &SeInfoUpdate {
                    mode: observed_info.mode,
                    status: observed_info.status,
                    capacity_bytes: observed_info.capacity.total_bytes,
                    used_bytes: observed_info.capacity.used_bytes,
                    available_bytes: observed_info.capacity.available_bytes,
                    last_sync_at: Utc::now(),
                },
            )
            .await
            .map_err(|source| SyncError::Registry { source })?;

        let existing: HashMap<Uuid, RegistryFile> = self
            .store
            .files_for_se(se.id)
            .await
            .map_err(|source| SyncError::Registry { source })?
            .into_iter()
            .map(|row| (row.file_id, row))
            .collect();

        let mut observed = Vec::new();
        let mut added: u64 = 0;
        let mut updated: u64 = 0;
        let mut offset = 0;
        loop {
            if shutdown.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            let page = self
                .client
                .list_files(&se.url, self.page_size, offset)
                .await?;

            let mut changed = Vec::new();
            for meta in &page.items {
                observed.push(meta.file_id);
                let incoming = to_registry_record(meta);
                match existing.get(&meta.file_id) {
                    None => {
                        added += 1;
                        changed.push(incoming);
                    }
                    Some(row) if !row_matches(row, &incoming) => {
                        updated += 1;
                        changed.push(incoming);
                    }
                    Some(_) => {}
                }
            }
            if !changed.is_empty() {
                self.store
                    .upsert_files(se.id, &changed)
                    .await
                    .map_err(|source| SyncError::Registry { source })?;
            }

            // A short page terminates; an exactly-full final page costs one
            // extra request that returns an empty page.
            if page.items.len() < self.page_size {
                break;
            }
            offset += self.page_size;
        }

        let deleted = self
            .store
            .mark_absent_deleted(se.id, &observed)
            .await
            .map_err(|source| SyncError::Registry { source })?;
        self.store
            .stamp_se_file_sync(se.id, Utc::now())
            .await
            .map_err(|source| SyncError::Registry { source })?;

        self.metrics.observe_file_sync(&se_label, timer.elapsed());
        self.metrics.inc_file_sync_action(&se_label, "added", added);
        self.metrics
            .inc_file_sync_action(&se_label, "updated", updated);
        self.metrics
            .inc_file_sync_action(&se_label, "deleted", deleted);
        debug!(
            se_id = %se.id,
            added,
            updated,
            deleted,
            files_seen = observed.len(),
            "element synchronized"
        );

        Ok(SyncOutcome {
            se_id: se.id,
            added,
            updated,
            deleted,
            files_seen: observed.len(),
        })
    }

    /// Run full passes on `interval` until `shutdown` fires.
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
                        debug!("file registry sync loop stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.run_once(&shutdown).await;
                    }
                }
            }
        })
    }
}

fn to_registry_record(meta: &FileMetadata) -> NewRegistryFile {
    NewRegistryFile {
        file_id: meta.file_id,
        original_filename: meta.original_filename.clone(),
        content_type: meta.content_type.clone(),
        size: meta.size,
        checksum: meta.checksum.clone(),
        uploaded_by: meta.uploaded_by.clone(),
        uploaded_at: meta.uploaded_at,
        status: meta.status,
    }
}

fn row_matches(row: &RegistryFile, incoming: &NewRegistryFile) -> bool {
    row.original_filename == incoming.original_filename
        && row.content_type == incoming.content_type
        && row.size == incoming.size
        && row.checksum == incoming.checksum
        && row.uploaded_by == incoming.uploaded_by
        && row.uploaded_at == incoming.uploaded_at
        && row.status == incoming.status
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::se_client::BearerProvider;
    use artstore_model::{Capacity, FileStatus, OperatingMode, Page, RetentionPolicy, SeInfo};
    use axum::{
        Json, Router,
        extract::{Query, State as AxumState},
        routing::get,
    };
    use serde::Deserialize;
    use std::error::Error;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticToken;

    #[async_trait]
    impl BearerProvider for StaticToken {
        async fn bearer_token(&self) -> Result<String, String> {
            Ok("test-token".to_string())
        }
    }

    #[derive(Default)]
    struct FakeSe {
        files: Mutex<Vec<FileMetadata>>,
        list_requests: AtomicUsize,
    }

    impl FakeSe {
        fn push_file(&self, size: i64) -> FileMetadata {
            let file_id = Uuid::new_v4();
            let meta = FileMetadata {
                file_id,
                original_filename: format!("{file_id}.bin"),
                storage_path: file_id.to_string(),
                content_type: "application/octet-stream".to_string(),
                size,
                checksum: "00".repeat(32),
                uploaded_by: "svc".to_string(),
                uploaded_at: Utc::now(),
                status: FileStatus::Active,
                retention_policy: RetentionPolicy::Permanent,
                ttl_days: None,
                expires_at: None,
                description: None,
                tags: None,
            };
            self.files
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(meta.clone());
            meta
        }

        fn remove_file(&self, file_id: Uuid) {
            self.files
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .retain(|meta| meta.file_id != file_id);
        }
    }

    #[derive(Deserialize)]
    struct ListParams {
        #[serde(default)]
        limit: usize,
        #[serde(default)]
        offset: usize,
    }

    async fn fake_se_server(state: Arc<FakeSe>) -> Result<String, Box<dyn Error>> {
        let app = Router::new()
            .route(
                "/api/v1/info",
                get(|| async {
                    Json(SeInfo {
                        storage_id: "se-fake".to_string(),
                        mode: OperatingMode::Rw,
                        status: artstore_model::SeStatus::Online,
                        version: "0.1.0".to_string(),
                        allowed_operations: OperatingMode::Rw.allowed_operations().to_vec(),
                        capacity: Capacity::from_usage(1_000, 100),
                        replica_mode: None,
                        role: None,
                    })
                }),
            )
            .route(
                "/api/v1/files",
                get(
                    |AxumState(state): AxumState<Arc<FakeSe>>,
                     Query(params): Query<ListParams>| async move {
                        state.list_requests.fetch_add(1, Ordering::SeqCst);
                        let files = state
                            .files
                            .lock()
                            .unwrap_or_else(std::sync::PoisonError::into_inner)
                            .clone();
                        let total = files.len();
                        let end = total.min(params.offset + params.limit);
                        let items = if params.offset >= total {
                            Vec::new()
                        } else {
                            files[params.offset..end].to_vec()
                        };
                        Json(Page::new(items, total, params.limit, params.offset))
                    },
                ),
            )
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Ok(format!("http://{addr}"))
    }

    #[derive(Default)]
    struct MemRegistry {
        elements: Mutex<Vec<StorageElement>>,
        files: Mutex<HashMap<(Uuid, Uuid), RegistryFile>>,
    }

    impl MemRegistry {
        fn add_element(&self, url: &str) -> StorageElement {
            let se = StorageElement {
                id: Uuid::new_v4(),
                name: "fake".to_string(),
                url: url.to_string(),
                storage_id: "se-fake".to_string(),
                mode: OperatingMode::Rw,
                status: artstore_model::SeStatus::Online,
                capacity_bytes: 0,
                used_bytes: 0,
                available_bytes: 0,
                last_sync_at: None,
                last_file_sync_at: None,
            };
            self.elements
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(se.clone());
            se
        }

        fn status_of(&self, se_id: Uuid, file_id: Uuid) -> Option<FileStatus> {
            self.files
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .get(&(se_id, file_id))
                .map(|row| row.status)
        }
    }

    #[async_trait]
    impl RegistryStore for MemRegistry {
        async fn online_elements(&self) -> anyhow::Result<Vec<StorageElement>> {
            Ok(self
                .elements
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .clone())
        }

        async fn apply_info(&self, _id: Uuid, _update: &SeInfoUpdate) -> anyhow::Result<()> {
            Ok(())
        }

        async fn files_for_se(&self, se_id: Uuid) -> anyhow::Result<Vec<RegistryFile>> {
            Ok(self
                .files
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .values()
                .filter(|row| row.storage_element_id == se_id)
                .cloned()
                .collect())
        }

        async fn upsert_files(
            &self,
            se_id: Uuid,
            files: &[NewRegistryFile],
        ) -> anyhow::Result<()> {
            let mut store = self
                .files
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            for file in files {
                let now = Utc::now();
                let row = store
                    .entry((se_id, file.file_id))
                    .or_insert_with(|| RegistryFile {
                        id: Uuid::new_v4(),
                        storage_element_id: se_id,
                        file_id: file.file_id,
                        original_filename: String::new(),
                        content_type: String::new(),
                        size: 0,
                        checksum: String::new(),
                        uploaded_by: String::new(),
                        uploaded_at: now,
                        status: FileStatus::Active,
                        created_at: now,
                        updated_at: now,
                    });
                row.original_filename = file.original_filename.clone();
                row.content_type = file.content_type.clone();
                row.size = file.size;
                row.checksum = file.checksum.clone();
                row.uploaded_by = file.uploaded_by.clone();
                row.uploaded_at = file.uploaded_at;
                row.status = file.status;
                row.updated_at = now;
            }
            Ok(())
        }

        async fn mark_absent_deleted(
            &self,
            se_id: Uuid,
            observed: &[Uuid],
        ) -> anyhow::Result<u64> {
            let mut store = self
                .files
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let mut count = 0;
            for (key, row) in store.iter_mut() {
                if key.0 == se_id
                    && row.status != FileStatus::Deleted
                    && !observed.contains(&key.1)
                {
                    row.status = FileStatus::Deleted;
                    count += 1;
                }
            }
            Ok(count)
        }

        async fn stamp_se_file_sync(&self, _se_id: Uuid, _at: DateTime<Utc>) -> anyhow::Result<()> {
            Ok(())
        }

        async fn stamp_global_file_sync(&self, _at: DateTime<Utc>) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn synchronizer(
        store: Arc<MemRegistry>,
        page_size: usize,
    ) -> Arc<FileRegistrySynchronizer> {
        Arc::new(FileRegistrySynchronizer::new(
            store,
            SeClient::new(reqwest::Client::new(), Arc::new(StaticToken)),
            page_size,
            Metrics::new().expect("metrics"),
        ))
    }

    #[tokio::test]
    async fn sync_one_is_idempotent_and_tombstones() -> Result<(), Box<dyn Error>> {
        let fake = Arc::new(FakeSe::default());
        let first = fake.push_file(10);
        let second = fake.push_file(20);
        let url = fake_se_server(Arc::clone(&fake)).await?;

        let registry = Arc::new(MemRegistry::default());
        let se = registry.add_element(&url);
        let sync = synchronizer(Arc::clone(&registry), 100);
        let shutdown = CancellationToken::new();

        let outcome = sync.sync_one(&se, &shutdown).await?;
        assert_eq!((outcome.added, outcome.updated, outcome.deleted), (2, 0, 0));

        let outcome = sync.sync_one(&se, &shutdown).await?;
        assert_eq!((outcome.added, outcome.updated, outcome.deleted), (0, 0, 0));

        fake.remove_file(first.file_id);
        let outcome = sync.sync_one(&se, &shutdown).await?;
        assert_eq!((outcome.added, outcome.updated, outcome.deleted), (0, 0, 1));
        assert_eq!(
            registry.status_of(se.id, first.file_id),
            Some(FileStatus::Deleted)
        );
        assert_eq!(
            registry.status_of(se.id, second.file_id),
            Some(FileStatus::Active)
        );
        Ok(())
    }

    #[tokio::test]
    async fn exactly_full_final_page_costs_one_extra_request() -> Result<(), Box<dyn Error>> {
        let fake = Arc::new(FakeSe::default());
        for _ in 0..4 {
            fake.push_file(1);
        }
        let url = fake_se_server(Arc::clone(&fake)).await?;

        let registry = Arc::new(MemRegistry::default());
        let se = registry.add_element(&url);
        let sync = synchronizer(Arc::clone(&registry), 2);
        let shutdown = CancellationToken::new();

        let outcome = sync.sync_one(&se, &shutdown).await?;
        assert_eq!(outcome.added, 4);
        assert_eq!(outcome.files_seen, 4);
        // Two full pages plus the trailing empty page.
        assert_eq!(fake.list_requests.load(Ordering::SeqCst), 3);
        Ok(())
    }

    #[tokio::test]
    async fn full_pass_skips_failing_elements() -> Result<(), Box<dyn Error>> {
        let fake = Arc::new(FakeSe::default());
        fake.push_file(10);
        let url = fake_se_server(Arc::clone(&fake)).await?;

        let registry = Arc::new(MemRegistry::default());
        registry.add_element(&url);
        registry.add_element("http://127.0.0.1:1");

        let sync = synchronizer(Arc::clone(&registry), 100);
        let shutdown = CancellationToken::new();
        let summary = sync.run_once(&shutdown).await;
        assert_eq!(summary.attempted, 2);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        Ok(())
    }

    #[tokio::test]
    async fn content_change_counts_as_update() -> Result<(), Box<dyn Error>> {
        let fake = Arc::new(FakeSe::default());
        let meta = fake.push_file(10);
        let url = fake_se_server(Arc::clone(&fake)).await?;

        let registry = Arc::new(MemRegistry::default());
        let se = registry.add_element(&url);
        let sync = synchronizer(Arc::clone(&registry), 100);
        let shutdown = CancellationToken::new();
        sync.sync_one(&se, &shutdown).await?;

        {
            let mut files = fake
                .files
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let entry = files
                .iter_mut()
                .find(|candidate| candidate.file_id == meta.file_id)
                .expect("file present");
            entry.status = FileStatus::Expired;
        }

        let outcome = sync.sync_one(&se, &shutdown).await?;
        assert_eq!((outcome.added, outcome.updated, outcome.deleted), (0, 1, 0));
        assert_eq!(
            registry.status_of(se.id, meta.file_id),
            Some(FileStatus::Expired)
        );
        Ok(())
    }
}
