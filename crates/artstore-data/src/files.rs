//! Federated file-registry repository.

use std::collections::HashSet;

use anyhow::{Context, Result};
use artstore_model::{FileStatus, RegistryFile};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Row};
use uuid::Uuid;

const UPSERT_FILE: &str = r"
    INSERT INTO registry_files
        (id, storage_element_id, file_id, original_filename, content_type,
         size, checksum, uploaded_by, uploaded_at, status, created_at, updated_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, now(), now())
    ON CONFLICT (storage_element_id, file_id) DO UPDATE
    SET original_filename = EXCLUDED.original_filename,
        content_type = EXCLUDED.content_type,
        size = EXCLUDED.size,
        checksum = EXCLUDED.checksum,
        uploaded_by = EXCLUDED.uploaded_by,
        uploaded_at = EXCLUDED.uploaded_at,
        status = EXCLUDED.status,
        updated_at = now()
";

const SELECT_FILE_IDS_FOR_SE: &str =
    r"SELECT file_id FROM registry_files WHERE storage_element_id = $1";

const SELECT_FILES_FOR_SE: &str =
    r"SELECT * FROM registry_files WHERE storage_element_id = $1";

const MARK_ABSENT_DELETED: &str = r"
    UPDATE registry_files
    SET status = 'deleted', updated_at = now()
    WHERE storage_element_id = $1
      AND status <> 'deleted'
      AND NOT (file_id = ANY($2))
";

const SELECT_FILE: &str = r"SELECT * FROM registry_files WHERE id = $1";

const SELECT_FILE_BY_SE_AND_FILE_ID: &str =
    r"SELECT * FROM registry_files WHERE storage_element_id = $1 AND file_id = $2";

const LIST_FILES: &str = r"
    SELECT * FROM registry_files
    ORDER BY uploaded_at DESC, file_id ASC
    LIMIT $1 OFFSET $2
";

const COUNT_FILES: &str = r"SELECT COUNT(*) FROM registry_files";

const COUNT_FILES_BY_STATUS: &str =
    r"SELECT status, COUNT(*) AS count FROM registry_files GROUP BY status";

const SUM_ACTIVE_SIZE: &str =
    r"SELECT COALESCE(SUM(size), 0)::BIGINT FROM registry_files WHERE status = 'active'";

const SET_FILE_STATUS: &str =
    r"UPDATE registry_files SET status = $2, updated_at = now() WHERE id = $1";

/// File record as observed on a Storage Element, ready for upsert.
#[derive(Debug, Clone)]
pub struct NewRegistryFile {
    /// File identifier on the element.
    pub file_id: Uuid,
    /// Filename supplied by the uploader.
    pub original_filename: String,
    /// MIME type declared at upload.
    pub content_type: String,
    /// Blob size in bytes.
    pub size: i64,
    /// Lowercase hex SHA-256.
    pub checksum: String,
    /// Subject that performed the upload.
    pub uploaded_by: String,
    /// Upload timestamp.
    pub uploaded_at: DateTime<Utc>,
    /// Lifecycle status on the element.
    pub status: FileStatus,
}

/// Repository over the `registry_files` table.
#[derive(Clone)]
pub struct FileRegistryStore {
    pool: PgPool,
}

impl FileRegistryStore {
    pub(crate) const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// File ids currently registered for an element.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn file_ids_for_se(&self, se_id: Uuid) -> Result<HashSet<Uuid>> {
        let rows = sqlx::query(SELECT_FILE_IDS_FOR_SE)
            .bind(se_id)
            .fetch_all(&self.pool)
            .await
            .context("failed to enumerate registry file ids")?;
        let mut ids = HashSet::with_capacity(rows.len());
        for row in rows {
            ids.insert(row.try_get("file_id")?);
        }
        Ok(ids)
    }

    /// Every registry row for an element.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn files_for_se(&self, se_id: Uuid) -> Result<Vec<RegistryFile>> {
        let rows = sqlx::query_as::<_, FileRow>(SELECT_FILES_FOR_SE)
            .bind(se_id)
            .fetch_all(&self.pool)
            .await
            .context("failed to load registry files for element")?;
        rows.into_iter().map(RegistryFile::try_from).collect()
    }

    /// Upsert one observed page of files for an element.
    ///
    /// # Errors
    ///
    /// Returns an error if any upsert fails.
    pub async fn upsert_batch(&self, se_id: Uuid, files: &[NewRegistryFile]) -> Result<()> {
        for file in files {
            sqlx::query(UPSERT_FILE)
                .bind(Uuid::new_v4())
                .bind(se_id)
                .bind(file.file_id)
                .bind(&file.original_filename)
                .bind(&file.content_type)
                .bind(file.size)
                .bind(&file.checksum)
                .bind(&file.uploaded_by)
                .bind(file.uploaded_at)
                .bind(file.status.as_str())
                .execute(&self.pool)
                .await
                .context("failed to upsert registry file")?;
        }
        Ok(())
    }

    /// Tombstone every row for the element whose file id was not observed.
    /// Returns the number of rows newly marked deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn mark_absent_deleted(&self, se_id: Uuid, observed: &[Uuid]) -> Result<u64> {
        let result = sqlx::query(MARK_ABSENT_DELETED)
            .bind(se_id)
            .bind(observed)
            .execute(&self.pool)
            .await
            .context("failed to tombstone absent registry files")?;
        Ok(result.rows_affected())
    }

    /// Load one registry row by its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get(&self, id: Uuid) -> Result<Option<RegistryFile>> {
        let row = sqlx::query_as::<_, FileRow>(SELECT_FILE)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("failed to load registry file")?;
        row.map(RegistryFile::try_from).transpose()
    }

    /// Load one registry row by element and file id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get_by_se_and_file_id(
        &self,
        se_id: Uuid,
        file_id: Uuid,
    ) -> Result<Option<RegistryFile>> {
        let row = sqlx::query_as::<_, FileRow>(SELECT_FILE_BY_SE_AND_FILE_ID)
            .bind(se_id)
            .bind(file_id)
            .fetch_optional(&self.pool)
            .await
            .context("failed to load registry file by element")?;
        row.map(RegistryFile::try_from).transpose()
    }

    /// Newest-first page over the whole registry.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<RegistryFile>> {
        let rows = sqlx::query_as::<_, FileRow>(LIST_FILES)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .context("failed to list registry files")?;
        rows.into_iter().map(RegistryFile::try_from).collect()
    }

    /// Total registry rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn count(&self) -> Result<i64> {
        let row = sqlx::query(COUNT_FILES)
            .fetch_one(&self.pool)
            .await
            .context("failed to count registry files")?;
        Ok(row.try_get(0)?)
    }

    /// Row counts grouped by status label.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn count_by_status(&self) -> Result<Vec<(String, i64)>> {
        let rows = sqlx::query(COUNT_FILES_BY_STATUS)
            .fetch_all(&self.pool)
            .await
            .context("failed to count registry files by status")?;
        let mut counts = Vec::with_capacity(rows.len());
        for row in rows {
            counts.push((row.try_get("status")?, row.try_get("count")?));
        }
        Ok(counts)
    }

    /// Sum of sizes over active rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn total_active_size(&self) -> Result<i64> {
        let row = sqlx::query(SUM_ACTIVE_SIZE)
            .fetch_one(&self.pool)
            .await
            .context("failed to sum active registry size")?;
        Ok(row.try_get(0)?)
    }

    /// Overwrite a row's status.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn set_status(&self, id: Uuid, status: FileStatus) -> Result<()> {
        sqlx::query(SET_FILE_STATUS)
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await
            .context("failed to update registry file status")?;
        Ok(())
    }
}

#[derive(Debug, Clone, FromRow)]
struct FileRow {
    id: Uuid,
    storage_element_id: Uuid,
    file_id: Uuid,
    original_filename: String,
    content_type: String,
    size: i64,
    checksum: String,
    uploaded_by: String,
    uploaded_at: DateTime<Utc>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<FileRow> for RegistryFile {
    type Error = anyhow::Error;

    fn try_from(row: FileRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            storage_element_id: row.storage_element_id,
            file_id: row.file_id,
            original_filename: row.original_filename,
            content_type: row.content_type,
            size: row.size,
            checksum: row.checksum,
            uploaded_by: row.uploaded_by,
            uploaded_at: row.uploaded_at,
            status: row
                .status
                .parse()
                .context("unknown status label in registry_files row")?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_status_decodes_into_domain_enum() {
        let row = FileRow {
            id: Uuid::nil(),
            storage_element_id: Uuid::nil(),
            file_id: Uuid::nil(),
            original_filename: "a.bin".to_string(),
            content_type: "application/octet-stream".to_string(),
            size: 10,
            checksum: "00".repeat(32),
            uploaded_by: "svc".to_string(),
            uploaded_at: Utc::now(),
            status: "expired".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let file = RegistryFile::try_from(row).expect("row decodes");
        assert_eq!(file.status, FileStatus::Expired);
    }
}
