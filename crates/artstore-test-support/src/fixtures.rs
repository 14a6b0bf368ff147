//! Sample metadata and data-directory fixtures.

use anyhow::Result;
use artstore_model::{FileMetadata, FileStatus, RetentionPolicy};
use chrono::Utc;
use tempfile::TempDir;
use uuid::Uuid;

/// Create a temporary data directory with an `artstore-` prefix.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn temp_data_dir() -> Result<TempDir> {
    Ok(tempfile::Builder::new().prefix("artstore-test-").tempdir()?)
}

/// Build sample metadata for a freshly uploaded active permanent file.
#[must_use]
pub fn metadata(file_id: Uuid, size: i64, checksum: &str) -> FileMetadata {
    FileMetadata {
        file_id,
        original_filename: format!("{file_id}.bin"),
        storage_path: file_id.to_string(),
        content_type: "application/octet-stream".to_string(),
        size,
        checksum: checksum.to_string(),
        uploaded_by: "tester".to_string(),
        uploaded_at: Utc::now(),
        status: FileStatus::Active,
        retention_policy: RetentionPolicy::Permanent,
        ttl_days: None,
        expires_at: None,
        description: None,
        tags: None,
    }
}
