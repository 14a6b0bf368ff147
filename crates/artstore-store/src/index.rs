//! Thread-safe in-memory index over the sidecar metadata.
//!
//! The index holds no blob bytes: one metadata record per file plus a
//! running sum of active bytes, maintained incrementally on every mutation.
//! It is rebuilt wholesale from disk at startup and by the reconciler. No
//! operation performs I/O while holding the lock.

use std::collections::HashMap;
use std::sync::RwLock;

use artstore_model::{FileMetadata, FileStatus};
use uuid::Uuid;

use crate::attrs::AttrStore;
use crate::error::{StoreError, StoreResult};

#[derive(Debug, Default)]
struct IndexInner {
    entries: HashMap<Uuid, FileMetadata>,
    total_active_size: i64,
    ready: bool,
}

/// In-memory map of `file_id` to metadata with status-filtered pagination.
#[derive(Debug, Default)]
pub struct FileIndex {
    inner: RwLock<IndexInner>,
}

const fn active_bytes(meta: &FileMetadata) -> i64 {
    match meta.status {
        FileStatus::Active => meta.size,
        FileStatus::Deleted | FileStatus::Expired => 0,
    }
}

impl FileIndex {
    /// Create an empty, not-yet-ready index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole index with the sidecars currently on disk.
    ///
    /// The directory scan happens before the lock is taken; the swap itself
    /// is a single write-lock critical section. Callable at any time.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the data directory cannot be
    /// enumerated.
    pub async fn build_from_dir(&self, attrs: &AttrStore) -> StoreResult<usize> {
        let scanned = attrs.scan_dir().await?;
        let total_active_size = scanned.iter().map(|meta| active_bytes(meta)).sum();
        let entries: HashMap<Uuid, FileMetadata> = scanned
            .into_iter()
            .map(|meta| (meta.file_id, meta))
            .collect();
        let count = entries.len();

        let mut inner = self.write_lock();
        inner.entries = entries;
        inner.total_active_size = total_active_size;
        inner.ready = true;
        Ok(count)
    }

    /// Insert (or replace) an entry, adjusting the active-bytes counter.
    pub fn add(&self, meta: FileMetadata) {
        let mut inner = self.write_lock();
        let delta = active_bytes(&meta)
            - inner
                .entries
                .get(&meta.file_id)
                .map_or(0, |previous| active_bytes(previous));
        inner.total_active_size += delta;
        inner.entries.insert(meta.file_id, meta);
    }

    /// Replace an existing entry, adjusting the active-bytes counter.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no entry exists for the id.
    pub fn update(&self, meta: FileMetadata) -> StoreResult<()> {
        let mut inner = self.write_lock();
        let Some(previous) = inner.entries.get(&meta.file_id) else {
            return Err(StoreError::NotFound {
                file_id: meta.file_id,
            });
        };
        let delta = active_bytes(&meta) - active_bytes(previous);
        inner.total_active_size += delta;
        inner.entries.insert(meta.file_id, meta);
        Ok(())
    }

    /// Remove an entry, adjusting the active-bytes counter. Removing an
    /// absent id is a no-op.
    pub fn remove(&self, file_id: Uuid) -> Option<FileMetadata> {
        let mut inner = self.write_lock();
        let removed = inner.entries.remove(&file_id);
        if let Some(meta) = &removed {
            inner.total_active_size -= active_bytes(meta);
        }
        removed
    }

    /// Copy of the entry for `file_id`, when present. Callers never observe
    /// the live record.
    #[must_use]
    pub fn get(&self, file_id: Uuid) -> Option<FileMetadata> {
        self.read_lock().entries.get(&file_id).cloned()
    }

    /// Status-filtered, paginated enumeration.
    ///
    /// Results are sorted by `uploaded_at` descending with ties broken by
    /// `file_id` ascending. `limit == 0` means no upper bound; an offset at
    /// or past the end yields an empty slice with the total preserved.
    #[must_use]
    pub fn list(
        &self,
        limit: usize,
        offset: usize,
        status: Option<FileStatus>,
    ) -> (Vec<FileMetadata>, usize) {
        let inner = self.read_lock();
        let mut matching: Vec<&FileMetadata> = inner
            .entries
            .values()
            .filter(|meta| status.is_none_or(|wanted| meta.status == wanted))
            .collect();
        matching.sort_by(|a, b| {
            b.uploaded_at
                .cmp(&a.uploaded_at)
                .then_with(|| a.file_id.cmp(&b.file_id))
        });

        let total = matching.len();
        if offset >= total {
            return (Vec::new(), total);
        }
        let end = if limit == 0 {
            total
        } else {
            total.min(offset.saturating_add(limit))
        };
        let window = matching[offset..end].iter().map(|meta| (*meta).clone());
        (window.collect(), total)
    }

    /// Number of tracked entries.
    #[must_use]
    pub fn count(&self) -> usize {
        self.read_lock().entries.len()
    }

    /// Number of tracked entries in the given status.
    #[must_use]
    pub fn count_by_status(&self, status: FileStatus) -> usize {
        self.read_lock()
            .entries
            .values()
            .filter(|meta| meta.status == status)
            .count()
    }

    /// Running sum of bytes over active entries.
    #[must_use]
    pub fn total_active_size(&self) -> i64 {
        self.read_lock().total_active_size
    }

    /// Whether a disk scan has populated the index since startup.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.read_lock().ready
    }

    fn read_lock(&self) -> std::sync::RwLockReadGuard<'_, IndexInner> {
        self.inner
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write_lock(&self) -> std::sync::RwLockWriteGuard<'_, IndexInner> {
        self.inner
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use artstore_model::RetentionPolicy;
    use chrono::{Duration, Utc};
    use std::error::Error;

    fn entry(size: i64, status: FileStatus, age_minutes: i64) -> FileMetadata {
        let file_id = Uuid::new_v4();
        FileMetadata {
            file_id,
            original_filename: format!("{file_id}.bin"),
            storage_path: file_id.to_string(),
            content_type: "application/octet-stream".to_string(),
            size,
            checksum: "00".repeat(32),
            uploaded_by: "tester".to_string(),
            uploaded_at: Utc::now() - Duration::minutes(age_minutes),
            status,
            retention_policy: RetentionPolicy::Permanent,
            ttl_days: None,
            expires_at: None,
            description: None,
            tags: None,
        }
    }

    #[test]
    fn counter_tracks_active_bytes_across_mutations() {
        let index = FileIndex::new();
        let active = entry(100, FileStatus::Active, 0);
        let deleted = entry(40, FileStatus::Deleted, 1);
        index.add(active.clone());
        index.add(deleted.clone());
        assert_eq!(index.total_active_size(), 100);

        let mut softened = active.clone();
        softened.status = FileStatus::Deleted;
        index.update(softened).expect("update succeeds");
        assert_eq!(index.total_active_size(), 0);

        let mut restored = active;
        restored.status = FileStatus::Active;
        index.update(restored.clone()).expect("update succeeds");
        assert_eq!(index.total_active_size(), 100);

        index.remove(restored.file_id);
        assert_eq!(index.total_active_size(), 0);
        index.remove(deleted.file_id);
        assert_eq!(index.total_active_size(), 0);
    }

    #[test]
    fn counter_equals_sum_over_active_entries() {
        let index = FileIndex::new();
        let mut entries = Vec::new();
        for i in 0..20 {
            let status = match i % 3 {
                0 => FileStatus::Active,
                1 => FileStatus::Deleted,
                _ => FileStatus::Expired,
            };
            let meta = entry(i * 10, status, i);
            index.add(meta.clone());
            entries.push(meta);
        }
        let expected: i64 = entries
            .iter()
            .filter(|meta| meta.status == FileStatus::Active)
            .map(|meta| meta.size)
            .sum();
        assert_eq!(index.total_active_size(), expected);
    }

    #[test]
    fn update_missing_entry_fails() {
        let index = FileIndex::new();
        let meta = entry(10, FileStatus::Active, 0);
        assert!(matches!(
            index.update(meta),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn list_sorts_newest_first_and_paginates() {
        let index = FileIndex::new();
        for age in 0..5 {
            index.add(entry(1, FileStatus::Active, age));
        }
        let (all, total) = index.list(0, 0, None);
        assert_eq!(total, 5);
        assert_eq!(all.len(), 5);
        for pair in all.windows(2) {
            assert!(pair[0].uploaded_at >= pair[1].uploaded_at);
        }

        let (page, total) = index.list(2, 2, None);
        assert_eq!(total, 5);
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].file_id, all[2].file_id);

        let (past_end, total) = index.list(2, 10, None);
        assert_eq!(total, 5);
        assert!(past_end.is_empty());
    }

    #[test]
    fn list_filters_by_status() {
        let index = FileIndex::new();
        index.add(entry(1, FileStatus::Active, 0));
        index.add(entry(1, FileStatus::Deleted, 1));
        index.add(entry(1, FileStatus::Active, 2));
        let (items, total) = index.list(0, 0, Some(FileStatus::Active));
        assert_eq!(total, 2);
        assert!(items.iter().all(|meta| meta.status == FileStatus::Active));
        assert_eq!(index.count_by_status(FileStatus::Deleted), 1);
    }

    #[tokio::test]
    async fn build_from_dir_replaces_contents() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::Builder::new()
            .prefix("artstore-index-")
            .tempdir()?;
        let attrs = AttrStore::new(dir.path());
        let on_disk = entry(64, FileStatus::Active, 0);
        attrs.write(&on_disk).await?;

        let index = FileIndex::new();
        index.add(entry(999, FileStatus::Active, 0));
        assert!(!index.is_ready());

        let count = index.build_from_dir(&attrs).await?;
        assert_eq!(count, 1);
        assert!(index.is_ready());
        assert_eq!(index.count(), 1);
        assert_eq!(index.total_active_size(), 64);
        assert!(index.get(on_disk.file_id).is_some());
        Ok(())
    }
}
