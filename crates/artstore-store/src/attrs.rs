//! Atomic per-blob sidecar metadata files.
//!
//! Each blob `<file_id>` is accompanied by `<file_id>.meta.json`. Writes use
//! the same temp-then-rename discipline as the blob store so a crash never
//! leaves a partial sidecar on disk.

use std::path::{Path, PathBuf};

use artstore_model::FileMetadata;
use tokio::fs;
use tracing::warn;
use uuid::Uuid;

use crate::blob::{TMP_SUFFIX, is_reserved_name};
use crate::error::{StoreError, StoreResult};

/// Reserved suffix marking sidecar metadata files.
pub const ATTR_SUFFIX: &str = ".meta.json";

/// Sidecar metadata persistence rooted at the blob data directory.
#[derive(Debug, Clone)]
pub struct AttrStore {
    data_dir: PathBuf,
}

impl AttrStore {
    /// Create a store rooted at `data_dir`.
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Absolute path of the sidecar for `file_id`.
    #[must_use]
    pub fn sidecar_path(&self, file_id: Uuid) -> PathBuf {
        self.data_dir.join(format!("{file_id}{ATTR_SUFFIX}"))
    }

    /// Read and deserialize the sidecar for `file_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the file cannot be read and
    /// [`StoreError::Json`] if it does not deserialize.
    pub async fn read(&self, file_id: Uuid) -> StoreResult<FileMetadata> {
        let path = self.sidecar_path(file_id);
        read_sidecar(&path).await
    }

    /// Atomically persist the sidecar for `meta.file_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Json`] on serialization failure and
    /// [`StoreError::Io`] on filesystem failure.
    pub async fn write(&self, meta: &FileMetadata) -> StoreResult<()> {
        let path = self.sidecar_path(meta.file_id);
        let tmp = self
            .data_dir
            .join(format!("{}{ATTR_SUFFIX}{TMP_SUFFIX}", meta.file_id));

        let serialized = serde_json::to_vec_pretty(meta)
            .map_err(|source| StoreError::json("attrs.serialize", &path, source))?;
        fs::write(&tmp, serialized)
            .await
            .map_err(|source| StoreError::io("attrs.write_tmp", &tmp, source))?;
        if let Err(source) = fs::rename(&tmp, &path).await {
            if let Err(cleanup) = fs::remove_file(&tmp).await
                && cleanup.kind() != std::io::ErrorKind::NotFound
            {
                warn!(
                    path = %tmp.display(),
                    error = %cleanup,
                    "failed to remove temporary sidecar after rename failure"
                );
            }
            return Err(StoreError::io("attrs.rename", path, source));
        }
        Ok(())
    }

    /// Remove the sidecar for `file_id`; absence counts as success.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] for failures other than "not found".
    pub async fn delete(&self, file_id: Uuid) -> StoreResult<()> {
        let path = self.sidecar_path(file_id);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::io("attrs.delete", path, source)),
        }
    }

    /// Deserialize every sidecar at the top level of the data directory.
    ///
    /// The walk is non-recursive. Reserved names are skipped; malformed
    /// sidecars are logged and skipped without failing the scan.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] only if the directory itself cannot be
    /// enumerated.
    pub async fn scan_dir(&self) -> StoreResult<Vec<FileMetadata>> {
        let mut entries = fs::read_dir(&self.data_dir)
            .await
            .map_err(|source| StoreError::io("attrs.read_dir", &self.data_dir, source))?;

        let mut found = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(source) => {
                    return Err(StoreError::io("attrs.read_dir_entry", &self.data_dir, source));
                }
            };
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if is_reserved_name(name) || !name.ends_with(ATTR_SUFFIX) {
                continue;
            }
            match read_sidecar(&entry.path()).await {
                Ok(meta) => found.push(meta),
                Err(err) => {
                    warn!(
                        path = %entry.path().display(),
                        error = %err,
                        "skipping malformed sidecar during scan"
                    );
                }
            }
        }
        Ok(found)
    }
}

async fn read_sidecar(path: &Path) -> StoreResult<FileMetadata> {
    let raw = fs::read(path)
        .await
        .map_err(|source| StoreError::io("attrs.read", path, source))?;
    serde_json::from_slice(&raw).map_err(|source| StoreError::json("attrs.parse", path, source))
}

#[cfg(test)]
mod tests {
    use super::*;
    use artstore_model::{FileStatus, RetentionPolicy};
    use chrono::Utc;
    use std::error::Error;
    use tempfile::TempDir;

    fn sample(file_id: Uuid) -> FileMetadata {
        FileMetadata {
            file_id,
            original_filename: "report.pdf".to_string(),
            storage_path: file_id.to_string(),
            content_type: "application/pdf".to_string(),
            size: 128,
            checksum: "00".repeat(32),
            uploaded_by: "svc-backup".to_string(),
            uploaded_at: Utc::now(),
            status: FileStatus::Active,
            retention_policy: RetentionPolicy::Permanent,
            ttl_days: None,
            expires_at: None,
            description: None,
            tags: None,
        }
    }

    fn store() -> Result<(TempDir, AttrStore), Box<dyn Error>> {
        let dir = tempfile::Builder::new()
            .prefix("artstore-attrs-")
            .tempdir()?;
        let store = AttrStore::new(dir.path());
        Ok((dir, store))
    }

    #[tokio::test]
    async fn write_read_round_trip() -> Result<(), Box<dyn Error>> {
        let (_dir, store) = store()?;
        let meta = sample(Uuid::new_v4());
        store.write(&meta).await?;
        let restored = store.read(meta.file_id).await?;
        assert_eq!(restored, meta);
        Ok(())
    }

    #[tokio::test]
    async fn scan_skips_malformed_and_reserved_entries() -> Result<(), Box<dyn Error>> {
        let (dir, store) = store()?;
        let meta = sample(Uuid::new_v4());
        store.write(&meta).await?;

        std::fs::write(
            dir.path().join(format!("{}{ATTR_SUFFIX}", Uuid::new_v4())),
            b"not json",
        )?;
        std::fs::write(dir.path().join(".mode"), b"rw")?;
        std::fs::write(
            dir.path().join(format!("{}{ATTR_SUFFIX}{TMP_SUFFIX}", Uuid::new_v4())),
            b"{}",
        )?;

        let found = store.scan_dir().await?;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].file_id, meta.file_id);
        Ok(())
    }

    #[tokio::test]
    async fn delete_is_idempotent() -> Result<(), Box<dyn Error>> {
        let (_dir, store) = store()?;
        let meta = sample(Uuid::new_v4());
        store.write(&meta).await?;
        store.delete(meta.file_id).await?;
        store.delete(meta.file_id).await?;
        assert!(store.read(meta.file_id).await.is_err());
        Ok(())
    }
}
