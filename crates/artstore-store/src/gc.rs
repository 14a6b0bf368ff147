//! Garbage collector: TTL expiry plus physical removal of soft-deleted
//! blobs.
//!
//! Runs are serialized by a mutex. Per-file failures are counted and
//! skipped; a run never fails as a whole.

use std::sync::Arc;
use std::time::{Duration, Instant};

use artstore_model::{FileStatus, RetentionPolicy};
use artstore_telemetry::Metrics;
use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::attrs::AttrStore;
use crate::blob::BlobStore;
use crate::index::FileIndex;

/// Outcome of one garbage-collector run.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct GcReport {
    /// Active temporary files whose TTL elapsed this run.
    pub expired: u64,
    /// Soft-deleted files physically removed this run.
    pub purged: u64,
    /// Per-file failures counted and skipped.
    pub errors: u64,
}

/// Background garbage collector over the blob store and index.
pub struct GarbageCollector {
    blobs: BlobStore,
    attrs: AttrStore,
    index: Arc<FileIndex>,
    metrics: Metrics,
    running: Mutex<()>,
}

impl GarbageCollector {
    /// Wire the collector to its stores.
    #[must_use]
    pub fn new(
        blobs: BlobStore,
        attrs: AttrStore,
        index: Arc<FileIndex>,
        metrics: Metrics,
    ) -> Self {
        Self {
            blobs,
            attrs,
            index,
            metrics,
            running: Mutex::new(()),
        }
    }

    /// Execute one full run: expire, then purge. Concurrent callers queue on
    /// the run mutex.
    pub async fn run_once(&self) -> GcReport {
        let _serial = self.running.lock().await;
        let started = Instant::now();
        let mut report = GcReport::default();

        self.expire_phase(&mut report).await;
        self.purge_phase(&mut report).await;

        let elapsed = started.elapsed();
        self.metrics
            .observe_gc_run(elapsed, report.expired, report.purged, report.errors);
        info!(
            expired = report.expired,
            purged = report.purged,
            errors = report.errors,
            elapsed_ms = elapsed.as_millis(),
            "garbage collection run complete"
        );
        report
    }

    /// Run the collector on `interval` until `shutdown` is cancelled.
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
                        debug!("garbage collector loop stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.run_once().await;
                    }
                }
            }
        })
    }

    async fn expire_phase(&self, report: &mut GcReport) {
        let now = Utc::now();
        let (active, _) = self.index.list(0, 0, Some(FileStatus::Active));
        for mut meta in active {
            if meta.retention_policy != RetentionPolicy::Temporary {
                continue;
            }
            let Some(expires_at) = meta.expires_at else {
                continue;
            };
            if expires_at > now {
                continue;
            }

            meta.status = FileStatus::Expired;
            if let Err(err) = self.attrs.write(&meta).await {
                warn!(
                    file_id = %meta.file_id,
                    error = %err,
                    "failed to persist expiry; skipping file"
                );
                report.errors += 1;
                continue;
            }
            if let Err(err) = self.index.update(meta.clone()) {
                warn!(
                    file_id = %meta.file_id,
                    error = %err,
                    "failed to index expiry; skipping file"
                );
                report.errors += 1;
                continue;
            }
            debug!(file_id = %meta.file_id, "file expired");
            report.expired += 1;
        }
    }

    async fn purge_phase(&self, report: &mut GcReport) {
        let (deleted, _) = self.index.list(0, 0, Some(FileStatus::Deleted));
        for meta in deleted {
            // A blob already gone is not an error; the purge is idempotent.
            if let Err(err) = self.blobs.delete(&meta.storage_path).await {
                warn!(
                    file_id = %meta.file_id,
                    error = %err,
                    "failed to remove blob; skipping file"
                );
                report.errors += 1;
                continue;
            }
            if let Err(err) = self.attrs.delete(meta.file_id).await {
                warn!(
                    file_id = %meta.file_id,
                    error = %err,
                    "blob removed but sidecar removal failed"
                );
            }
            self.index.remove(meta.file_id);
            debug!(file_id = %meta.file_id, "file purged");
            report.purged += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use artstore_model::FileMetadata;
    use chrono::Duration as ChronoDuration;
    use std::error::Error;
    use tempfile::TempDir;
    use uuid::Uuid;

    struct Fixture {
        _dir: TempDir,
        blobs: BlobStore,
        attrs: AttrStore,
        index: Arc<FileIndex>,
        gc: GarbageCollector,
    }

    fn fixture() -> Result<Fixture, Box<dyn Error>> {
        let dir = tempfile::Builder::new().prefix("artstore-gc-").tempdir()?;
        let blobs = BlobStore::new(dir.path());
        let attrs = AttrStore::new(dir.path());
        let index = Arc::new(FileIndex::new());
        let gc = GarbageCollector::new(
            blobs.clone(),
            attrs.clone(),
            Arc::clone(&index),
            Metrics::new()?,
        );
        Ok(Fixture {
            _dir: dir,
            blobs,
            attrs,
            index,
            gc,
        })
    }

    async fn seed(
        fixture: &Fixture,
        status: FileStatus,
        policy: RetentionPolicy,
        ttl_days: Option<i64>,
        expired: bool,
    ) -> Result<FileMetadata, Box<dyn Error>> {
        let id = Uuid::new_v4();
        let mut payload: &[u8] = b"hello world";
        let (size, checksum) = fixture.blobs.write(id, &mut payload, 0).await?;
        let uploaded_at = Utc::now() - ChronoDuration::days(10);
        let expires_at = ttl_days.map(|days| {
            if expired {
                uploaded_at + ChronoDuration::days(days)
            } else {
                Utc::now() + ChronoDuration::days(days)
            }
        });
        let meta = FileMetadata {
            file_id: id,
            original_filename: format!("{id}.bin"),
            storage_path: id.to_string(),
            content_type: "application/octet-stream".to_string(),
            size,
            checksum,
            uploaded_by: "tester".to_string(),
            uploaded_at,
            status,
            retention_policy: policy,
            ttl_days,
            expires_at,
            description: None,
            tags: None,
        };
        fixture.attrs.write(&meta).await?;
        fixture.index.add(meta.clone());
        Ok(meta)
    }

    #[tokio::test]
    async fn expires_overdue_temporary_files() -> Result<(), Box<dyn Error>> {
        let fixture = fixture()?;
        let overdue = seed(
            &fixture,
            FileStatus::Active,
            RetentionPolicy::Temporary,
            Some(3),
            true,
        )
        .await?;
        let fresh = seed(
            &fixture,
            FileStatus::Active,
            RetentionPolicy::Temporary,
            Some(3),
            false,
        )
        .await?;
        let permanent = seed(
            &fixture,
            FileStatus::Active,
            RetentionPolicy::Permanent,
            None,
            false,
        )
        .await?;

        let report = fixture.gc.run_once().await;
        assert_eq!(report.expired, 1);
        assert_eq!(report.errors, 0);

        let expired_meta = fixture.index.get(overdue.file_id).expect("still indexed");
        assert_eq!(expired_meta.status, FileStatus::Expired);
        let sidecar = fixture.attrs.read(overdue.file_id).await?;
        assert_eq!(sidecar.status, FileStatus::Expired);

        assert_eq!(
            fixture.index.get(fresh.file_id).expect("fresh kept").status,
            FileStatus::Active
        );
        assert_eq!(
            fixture
                .index
                .get(permanent.file_id)
                .expect("permanent kept")
                .status,
            FileStatus::Active
        );
        Ok(())
    }

    #[tokio::test]
    async fn purges_soft_deleted_files() -> Result<(), Box<dyn Error>> {
        let fixture = fixture()?;
        let doomed = seed(
            &fixture,
            FileStatus::Deleted,
            RetentionPolicy::Permanent,
            None,
            false,
        )
        .await?;
        assert!(fixture.blobs.exists(&doomed.storage_path).await);

        let report = fixture.gc.run_once().await;
        assert_eq!(report.purged, 1);
        assert!(!fixture.blobs.exists(&doomed.storage_path).await);
        assert!(fixture.attrs.read(doomed.file_id).await.is_err());
        assert!(fixture.index.get(doomed.file_id).is_none());
        Ok(())
    }

    #[tokio::test]
    async fn purge_tolerates_missing_blob() -> Result<(), Box<dyn Error>> {
        let fixture = fixture()?;
        let doomed = seed(
            &fixture,
            FileStatus::Deleted,
            RetentionPolicy::Permanent,
            None,
            false,
        )
        .await?;
        fixture.blobs.delete(&doomed.storage_path).await?;

        let report = fixture.gc.run_once().await;
        assert_eq!(report.purged, 1);
        assert_eq!(report.errors, 0);
        assert!(fixture.index.get(doomed.file_id).is_none());
        Ok(())
    }

    #[tokio::test]
    async fn post_run_invariants_hold() -> Result<(), Box<dyn Error>> {
        let fixture = fixture()?;
        seed(
            &fixture,
            FileStatus::Deleted,
            RetentionPolicy::Permanent,
            None,
            false,
        )
        .await?;
        seed(
            &fixture,
            FileStatus::Active,
            RetentionPolicy::Temporary,
            Some(1),
            true,
        )
        .await?;

        fixture.gc.run_once().await;
        assert_eq!(fixture.index.count_by_status(FileStatus::Deleted), 0);
        let (active, _) = fixture.index.list(0, 0, Some(FileStatus::Active));
        assert!(
            active
                .iter()
                .all(|meta| meta.retention_policy == RetentionPolicy::Permanent
                    || meta.expires_at.is_some_and(|at| at > Utc::now())),
            "no expired temporary file may remain active"
        );
        Ok(())
    }
}
