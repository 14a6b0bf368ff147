//! Write-once blob persistence in a single flat data directory.
//!
//! Writes stream into a `.tmp` file while hashing, then rename atomically so
//! a crash never leaves a partially visible blob. Dot-prefixed and
//! `.tmp`-suffixed names are reserved for probes, markers, and writes in
//! progress; directory scans must skip them.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::warn;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};

/// Suffix marking a write in progress.
pub const TMP_SUFFIX: &str = ".tmp";

const COPY_BUFFER_BYTES: usize = 64 * 1024;

/// Whether a directory entry name is reserved and must be ignored by scans.
#[must_use]
pub fn is_reserved_name(name: &str) -> bool {
    name.starts_with('.') || name.ends_with(TMP_SUFFIX)
}

/// Blob persistence rooted at one flat data directory.
#[derive(Debug, Clone)]
pub struct BlobStore {
    data_dir: PathBuf,
}

impl BlobStore {
    /// Create a store rooted at `data_dir`. The directory must already exist.
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Directory this store persists into.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Absolute path of the entry named `name` inside the data directory.
    #[must_use]
    pub fn path_of(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }

    /// Stream `reader` into the blob for `id`, returning the stored size and
    /// the lowercase hex SHA-256 of the bytes written.
    ///
    /// The payload lands in `<id>.tmp` first and is renamed into place only
    /// after a successful sync, so readers never observe a partial blob. When
    /// `declared_size` is positive and differs from the counted bytes the
    /// write fails and the temporary file is removed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::SizeMismatch`] on a declared-size disagreement
    /// and [`StoreError::Io`] for filesystem failures.
    pub async fn write<R>(
        &self,
        id: Uuid,
        reader: &mut R,
        declared_size: i64,
    ) -> StoreResult<(i64, String)>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let final_path = self.path_of(&id.to_string());
        let tmp_path = self.path_of(&format!("{id}{TMP_SUFFIX}"));

        let result = self
            .write_to_tmp(&tmp_path, &final_path, reader, declared_size)
            .await;
        if result.is_err()
            && let Err(cleanup) = fs::remove_file(&tmp_path).await
            && cleanup.kind() != std::io::ErrorKind::NotFound
        {
            warn!(
                path = %tmp_path.display(),
                error = %cleanup,
                "failed to remove temporary blob after write failure"
            );
        }
        result
    }

    async fn write_to_tmp<R>(
        &self,
        tmp_path: &Path,
        final_path: &Path,
        reader: &mut R,
        declared_size: i64,
    ) -> StoreResult<(i64, String)>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(tmp_path)
            .await
            .map_err(|source| StoreError::io("blob.create_tmp", tmp_path, source))?;

        let mut hasher = Sha256::new();
        let mut written: i64 = 0;
        let mut buffer = vec![0u8; COPY_BUFFER_BYTES];
        loop {
            let read = reader
                .read(&mut buffer)
                .await
                .map_err(|source| StoreError::io("blob.read_payload", tmp_path, source))?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
            file.write_all(&buffer[..read])
                .await
                .map_err(|source| StoreError::io("blob.write_tmp", tmp_path, source))?;
            written += i64::try_from(read).unwrap_or(i64::MAX);
        }

        file.sync_all()
            .await
            .map_err(|source| StoreError::io("blob.sync_tmp", tmp_path, source))?;
        drop(file);

        if declared_size > 0 && written != declared_size {
            return Err(StoreError::SizeMismatch {
                declared: declared_size,
                actual: written,
            });
        }

        fs::rename(tmp_path, final_path)
            .await
            .map_err(|source| StoreError::io("blob.rename", final_path, source))?;

        let checksum = format!("{:x}", hasher.finalize());
        Ok((written, checksum))
    }

    /// Open the named entry for reading; the caller closes the handle.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the file cannot be opened.
    pub async fn open(&self, name: &str) -> StoreResult<File> {
        let path = self.path_of(name);
        File::open(&path)
            .await
            .map_err(|source| StoreError::io("blob.open", path, source))
    }

    /// Size in bytes of the named entry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the file cannot be stat'ed.
    pub async fn size(&self, name: &str) -> StoreResult<i64> {
        let path = self.path_of(name);
        let meta = fs::metadata(&path)
            .await
            .map_err(|source| StoreError::io("blob.stat", path, source))?;
        Ok(i64::try_from(meta.len()).unwrap_or(i64::MAX))
    }

    /// Whether the named entry exists.
    pub async fn exists(&self, name: &str) -> bool {
        fs::metadata(self.path_of(name)).await.is_ok()
    }

    /// Streaming SHA-256 of the named entry as it currently exists on disk.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the file cannot be read.
    pub async fn compute_checksum(&self, name: &str) -> StoreResult<String> {
        let path = self.path_of(name);
        let mut file = File::open(&path)
            .await
            .map_err(|source| StoreError::io("blob.checksum_open", &path, source))?;
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; COPY_BUFFER_BYTES];
        loop {
            let read = file
                .read(&mut buffer)
                .await
                .map_err(|source| StoreError::io("blob.checksum_read", &path, source))?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }
        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Best-effort removal of the named entry; absence counts as success.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] for failures other than "not found".
    pub async fn delete(&self, name: &str) -> StoreResult<()> {
        let path = self.path_of(name);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::io("blob.delete", path, source)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use tempfile::TempDir;

    const HELLO_SHA256: &str =
        "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    fn store() -> Result<(TempDir, BlobStore), Box<dyn Error>> {
        let dir = tempfile::Builder::new().prefix("artstore-blob-").tempdir()?;
        let store = BlobStore::new(dir.path());
        Ok((dir, store))
    }

    #[tokio::test]
    async fn write_persists_bytes_and_checksum() -> Result<(), Box<dyn Error>> {
        let (_dir, store) = store()?;
        let id = Uuid::new_v4();
        let mut payload: &[u8] = b"hello world";
        let (size, checksum) = store.write(id, &mut payload, 11).await?;
        assert_eq!(size, 11);
        assert_eq!(checksum, HELLO_SHA256);
        assert!(store.exists(&id.to_string()).await);
        assert_eq!(store.size(&id.to_string()).await?, 11);
        assert_eq!(store.compute_checksum(&id.to_string()).await?, checksum);
        Ok(())
    }

    #[tokio::test]
    async fn declared_size_mismatch_removes_tmp() -> Result<(), Box<dyn Error>> {
        let (dir, store) = store()?;
        let id = Uuid::new_v4();
        let mut payload: &[u8] = b"hello world";
        let result = store.write(id, &mut payload, 99).await;
        assert!(matches!(
            result,
            Err(StoreError::SizeMismatch {
                declared: 99,
                actual: 11
            })
        ));
        assert!(!store.exists(&id.to_string()).await);
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())?
            .filter_map(Result::ok)
            .collect();
        assert!(leftovers.is_empty(), "tmp file should be cleaned up");
        Ok(())
    }

    #[tokio::test]
    async fn zero_declared_size_skips_the_check() -> Result<(), Box<dyn Error>> {
        let (_dir, store) = store()?;
        let id = Uuid::new_v4();
        let mut payload: &[u8] = b"abc";
        let (size, _) = store.write(id, &mut payload, 0).await?;
        assert_eq!(size, 3);
        Ok(())
    }

    #[tokio::test]
    async fn delete_is_idempotent() -> Result<(), Box<dyn Error>> {
        let (_dir, store) = store()?;
        let id = Uuid::new_v4();
        let mut payload: &[u8] = b"abc";
        store.write(id, &mut payload, 0).await?;
        store.delete(&id.to_string()).await?;
        store.delete(&id.to_string()).await?;
        Ok(())
    }

    #[test]
    fn reserved_names_cover_probes_and_tmp_files() {
        assert!(is_reserved_name(".mode"));
        assert!(is_reserved_name(".health-probe"));
        assert!(is_reserved_name("0f8fad5b.tmp"));
        assert!(!is_reserved_name("0f8fad5b-5862-4c92-a6f3-8d1c1e6f2b11"));
    }
}
