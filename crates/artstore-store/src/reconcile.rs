//! Disk-versus-index consistency audit.
//!
//! One pass classifies every top-level data-directory entry, emits typed
//! issues for orphaned blobs, ghost sidecars, and size or checksum
//! disagreements, then rebuilds the index from the sidecars so memory
//! reflects reality.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use artstore_telemetry::Metrics;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::attrs::{ATTR_SUFFIX, AttrStore};
use crate::blob::{BlobStore, is_reserved_name};
use crate::error::StoreResult;
use crate::index::FileIndex;
use uuid::Uuid;

/// Kind of consistency issue detected by the reconciler.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// Blob present with no matching sidecar.
    OrphanedFile,
    /// Sidecar present with no matching blob.
    MissingFile,
    /// Blob size disagrees with the sidecar.
    SizeMismatch,
    /// Blob content hash disagrees with the sidecar.
    ChecksumMismatch,
}

impl IssueKind {
    /// Wire label for the issue kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OrphanedFile => "orphaned_file",
            Self::MissingFile => "missing_file",
            Self::SizeMismatch => "size_mismatch",
            Self::ChecksumMismatch => "checksum_mismatch",
        }
    }
}

/// One detected inconsistency.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileIssue {
    /// Issue classification.
    pub kind: IssueKind,
    /// Data-directory entry the issue anchors to.
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// File identifier, when it could be recovered.
    pub file_id: Option<Uuid>,
    /// Human-readable detail.
    pub detail: String,
}

/// Aggregated issue counts for one pass.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ReconcileSummary {
    /// `files_checked − |issues|`, floored at zero.
    pub ok: usize,
    /// Blobs without sidecars.
    pub orphaned_files: usize,
    /// Sidecars without blobs.
    pub missing_files: usize,
    /// Content-hash disagreements.
    pub checksum_mismatches: usize,
    /// Size disagreements.
    pub size_mismatches: usize,
}

/// Outcome of one reconciler pass.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    /// Pass start instant.
    pub started_at: DateTime<Utc>,
    /// Pass completion instant.
    pub completed_at: DateTime<Utc>,
    /// Files tracked by the rebuilt index.
    pub files_checked: usize,
    /// Issues found, in scan order.
    pub issues: Vec<ReconcileIssue>,
    /// Aggregated counts.
    pub summary: ReconcileSummary,
    /// True when the pass was refused because another was in flight.
    pub skipped: bool,
}

impl ReconcileReport {
    fn skipped_now() -> Self {
        let now = Utc::now();
        Self {
            started_at: now,
            completed_at: now,
            files_checked: 0,
            issues: Vec::new(),
            summary: ReconcileSummary::default(),
            skipped: true,
        }
    }
}

/// Background disk-versus-index auditor.
pub struct Reconciler {
    blobs: BlobStore,
    attrs: AttrStore,
    index: Arc<FileIndex>,
    metrics: Metrics,
    running: Mutex<()>,
}

impl Reconciler {
    /// Wire the reconciler to its stores.
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

    /// Execute one pass. A concurrent invocation returns immediately with
    /// `skipped = true` instead of queueing.
    ///
    /// # Errors
    ///
    /// Returns an error only when the data directory itself cannot be
    /// enumerated; per-file problems become issues, not errors.
    pub async fn run_once(&self) -> StoreResult<ReconcileReport> {
        let Ok(_serial) = self.running.try_lock() else {
            debug!("reconciler pass already in flight; skipping");
            return Ok(ReconcileReport::skipped_now());
        };

        let started_at = Utc::now();
        let timer = Instant::now();
        let mut issues = Vec::new();

        let (blob_names, sidecar_names) = self.classify_entries().await?;
        check_orphans(&blob_names, &sidecar_names, &mut issues);
        self.check_pairs(&blob_names, &sidecar_names, &mut issues)
            .await;

        let files_checked = self.index.build_from_dir(&self.attrs).await?;

        let mut summary = ReconcileSummary {
            ok: files_checked.saturating_sub(issues.len()),
            ..ReconcileSummary::default()
        };
        for issue in &issues {
            self.metrics.inc_reconcile_issue(issue.kind.as_str());
            match issue.kind {
                IssueKind::OrphanedFile => summary.orphaned_files += 1,
                IssueKind::MissingFile => summary.missing_files += 1,
                IssueKind::SizeMismatch => summary.size_mismatches += 1,
                IssueKind::ChecksumMismatch => summary.checksum_mismatches += 1,
            }
        }

        self.metrics.observe_reconcile_run(timer.elapsed());
        info!(
            files_checked,
            issues = issues.len(),
            elapsed_ms = timer.elapsed().as_millis(),
            "reconciler pass complete"
        );

        Ok(ReconcileReport {
            started_at,
            completed_at: Utc::now(),
            files_checked,
            issues,
            summary,
            skipped: false,
        })
    }

    /// Run the reconciler on `interval` until `shutdown` is cancelled.
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
                        debug!("reconciler loop stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(err) = self.run_once().await {
                            warn!(error = %err, "reconciler pass failed");
                        }
                    }
                }
            }
        })
    }

    /// Split top-level entries into blob names and sidecar basenames.
    async fn classify_entries(&self) -> StoreResult<(BTreeSet<String>, BTreeMap<String, String>)> {
        let mut blob_names = BTreeSet::new();
        let mut sidecar_names = BTreeMap::new();

        let mut entries = tokio::fs::read_dir(self.blobs.data_dir())
            .await
            .map_err(|source| {
                crate::error::StoreError::io("reconcile.read_dir", self.blobs.data_dir(), source)
            })?;
        while let Some(entry) = entries.next_entry().await.map_err(|source| {
            crate::error::StoreError::io("reconcile.read_dir_entry", self.blobs.data_dir(), source)
        })? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if is_reserved_name(name) {
                continue;
            }
            if let Some(basename) = name.strip_suffix(ATTR_SUFFIX) {
                sidecar_names.insert(basename.to_string(), name.to_string());
            } else {
                blob_names.insert(name.to_string());
            }
        }
        Ok((blob_names, sidecar_names))
    }

    async fn check_pairs(
        &self,
        blob_names: &BTreeSet<String>,
        sidecar_names: &BTreeMap<String, String>,
        issues: &mut Vec<ReconcileIssue>,
    ) {
        for (basename, sidecar_name) in sidecar_names {
            let file_id: Option<Uuid> = basename.parse().ok();
            let meta = match file_id {
                Some(id) => match self.attrs.read(id).await {
                    Ok(meta) => Some(meta),
                    Err(err) => {
                        warn!(
                            path = sidecar_name,
                            error = %err,
                            "sidecar unreadable during reconcile"
                        );
                        None
                    }
                },
                None => None,
            };

            if !blob_names.contains(basename) {
                issues.push(ReconcileIssue {
                    kind: IssueKind::MissingFile,
                    path: sidecar_name.clone(),
                    file_id: meta.as_ref().map(|m| m.file_id).or(file_id),
                    detail: "sidecar has no blob".to_string(),
                });
                continue;
            }

            let Some(meta) = meta else {
                continue;
            };

            let actual_size = match self.blobs.size(basename).await {
                Ok(size) => size,
                Err(err) => {
                    warn!(
                        path = basename,
                        error = %err,
                        "blob unreadable during reconcile"
                    );
                    continue;
                }
            };
            if actual_size != meta.size {
                issues.push(ReconcileIssue {
                    kind: IssueKind::SizeMismatch,
                    path: basename.clone(),
                    file_id: Some(meta.file_id),
                    detail: format!("sidecar size {} but blob is {actual_size}", meta.size),
                });
                continue;
            }

            match self.blobs.compute_checksum(basename).await {
                Ok(actual) if actual != meta.checksum => {
                    issues.push(ReconcileIssue {
                        kind: IssueKind::ChecksumMismatch,
                        path: basename.clone(),
                        file_id: Some(meta.file_id),
                        detail: format!(
                            "sidecar checksum {} but blob hashes to {actual}",
                            meta.checksum
                        ),
                    });
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(
                        path = basename,
                        error = %err,
                        "checksum computation failed during reconcile"
                    );
                }
            }
        }
    }
}

fn check_orphans(
    blob_names: &BTreeSet<String>,
    sidecar_names: &BTreeMap<String, String>,
    issues: &mut Vec<ReconcileIssue>,
) {
    for name in blob_names {
        if !sidecar_names.contains_key(name) {
            issues.push(ReconcileIssue {
                kind: IssueKind::OrphanedFile,
                path: name.clone(),
                file_id: name.parse().ok(),
                detail: "blob has no sidecar".to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use artstore_model::{FileMetadata, FileStatus, RetentionPolicy};
    use std::error::Error;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        blobs: BlobStore,
        attrs: AttrStore,
        reconciler: Reconciler,
    }

    fn fixture() -> Result<Fixture, Box<dyn Error>> {
        let dir = tempfile::Builder::new()
            .prefix("artstore-reconcile-")
            .tempdir()?;
        let blobs = BlobStore::new(dir.path());
        let attrs = AttrStore::new(dir.path());
        let index = Arc::new(FileIndex::new());
        let reconciler = Reconciler::new(
            blobs.clone(),
            attrs.clone(),
            Arc::clone(&index),
            Metrics::new()?,
        );
        Ok(Fixture {
            dir,
            blobs,
            attrs,
            reconciler,
        })
    }

    async fn seed_pair(fixture: &Fixture, payload: &[u8]) -> Result<FileMetadata, Box<dyn Error>> {
        let id = Uuid::new_v4();
        let mut reader = payload;
        let (size, checksum) = fixture.blobs.write(id, &mut reader, 0).await?;
        let meta = FileMetadata {
            file_id: id,
            original_filename: format!("{id}.bin"),
            storage_path: id.to_string(),
            content_type: "application/octet-stream".to_string(),
            size,
            checksum,
            uploaded_by: "tester".to_string(),
            uploaded_at: Utc::now(),
            status: FileStatus::Active,
            retention_policy: RetentionPolicy::Permanent,
            ttl_days: None,
            expires_at: None,
            description: None,
            tags: None,
        };
        fixture.attrs.write(&meta).await?;
        Ok(meta)
    }

    #[tokio::test]
    async fn detects_each_issue_kind_exactly_once() -> Result<(), Box<dyn Error>> {
        let fixture = fixture()?;

        // Healthy pair.
        seed_pair(&fixture, b"healthy payload").await?;

        // (a) orphaned blob without a sidecar.
        let orphan_id = Uuid::new_v4();
        let mut payload: &[u8] = b"orphan";
        fixture.blobs.write(orphan_id, &mut payload, 0).await?;

        // (b) ghost sidecar without a blob.
        let ghost = seed_pair(&fixture, b"ghost").await?;
        std::fs::remove_file(fixture.dir.path().join(&ghost.storage_path))?;

        // (c) sidecar claiming the wrong size.
        let mut wrong_size = seed_pair(&fixture, b"hello world").await?;
        wrong_size.size = 999;
        fixture.attrs.write(&wrong_size).await?;

        // (d) sidecar claiming the wrong checksum.
        let mut wrong_hash = seed_pair(&fixture, b"hello world").await?;
        wrong_hash.checksum = "deadbeef".to_string();
        fixture.attrs.write(&wrong_hash).await?;

        let report = fixture.reconciler.run_once().await?;
        assert!(!report.skipped);
        assert_eq!(report.summary.orphaned_files, 1);
        assert_eq!(report.summary.missing_files, 1);
        assert_eq!(report.summary.size_mismatches, 1);
        assert_eq!(report.summary.checksum_mismatches, 1);
        assert_eq!(report.issues.len(), 4);
        assert_eq!(report.files_checked, 4);
        assert_eq!(report.summary.ok, report.files_checked - 4);

        let missing = report
            .issues
            .iter()
            .find(|issue| issue.kind == IssueKind::MissingFile)
            .expect("missing_file issue present");
        assert_eq!(missing.file_id, Some(ghost.file_id));
        Ok(())
    }

    #[tokio::test]
    async fn quiescent_store_is_idempotent() -> Result<(), Box<dyn Error>> {
        let fixture = fixture()?;
        seed_pair(&fixture, b"one").await?;
        seed_pair(&fixture, b"two").await?;

        let first = fixture.reconciler.run_once().await?;
        assert!(first.issues.is_empty());
        assert_eq!(first.files_checked, 2);
        assert_eq!(first.summary.ok, 2);

        let second = fixture.reconciler.run_once().await?;
        assert!(second.issues.is_empty(), "second pass found new issues");
        assert_eq!(second.files_checked, 2);
        Ok(())
    }

    #[tokio::test]
    async fn rebuilds_the_index_from_disk() -> Result<(), Box<dyn Error>> {
        let fixture = fixture()?;
        let meta = seed_pair(&fixture, b"indexed").await?;

        assert!(!fixture.reconciler.index.is_ready());
        fixture.reconciler.run_once().await?;
        assert!(fixture.reconciler.index.is_ready());
        assert_eq!(fixture.reconciler.index.count(), 1);
        assert!(fixture.reconciler.index.get(meta.file_id).is_some());
        Ok(())
    }

    #[tokio::test]
    async fn reserved_names_are_ignored() -> Result<(), Box<dyn Error>> {
        let fixture = fixture()?;
        std::fs::write(fixture.dir.path().join(".mode"), b"rw")?;
        std::fs::write(fixture.dir.path().join("upload.tmp"), b"partial")?;

        let report = fixture.reconciler.run_once().await?;
        assert!(report.issues.is_empty());
        assert_eq!(report.files_checked, 0);
        Ok(())
    }
}
