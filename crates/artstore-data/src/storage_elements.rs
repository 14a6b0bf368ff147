//! Storage-element inventory repository.

use anyhow::{Context, Result};
use artstore_model::{OperatingMode, SeStatus, StorageElement};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

const INSERT_SE: &str = r"
    INSERT INTO storage_elements
        (id, name, url, storage_id, mode, status, capacity_bytes, used_bytes, available_bytes)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
";

const SELECT_SE: &str = r"SELECT * FROM storage_elements WHERE id = $1";

const SELECT_SE_BY_URL: &str = r"SELECT * FROM storage_elements WHERE url = $1";

const SELECT_SE_BY_STORAGE_ID: &str = r"SELECT * FROM storage_elements WHERE storage_id = $1";

const SELECT_ALL_SES: &str = r"SELECT * FROM storage_elements ORDER BY name";

const SELECT_SES_BY_STATUS: &str =
    r"SELECT * FROM storage_elements WHERE status = $1 ORDER BY name";

const UPDATE_SE_INFO: &str = r"
    UPDATE storage_elements
    SET mode = $2,
        status = $3,
        capacity_bytes = $4,
        used_bytes = $5,
        available_bytes = $6,
        last_sync_at = $7
    WHERE id = $1
";

const UPDATE_SE_STATUS: &str = r"UPDATE storage_elements SET status = $2 WHERE id = $1";

const UPDATE_SE_FILE_SYNC: &str =
    r"UPDATE storage_elements SET last_file_sync_at = $2 WHERE id = $1";

const DELETE_SE: &str = r"DELETE FROM storage_elements WHERE id = $1";

/// Fields refreshed by an `/info` poll.
#[derive(Debug, Clone, Copy)]
pub struct SeInfoUpdate {
    /// Observed operating mode.
    pub mode: OperatingMode,
    /// Observed status.
    pub status: SeStatus,
    /// Observed capacity limit.
    pub capacity_bytes: i64,
    /// Observed active-bytes sum.
    pub used_bytes: i64,
    /// Observed available bytes.
    pub available_bytes: i64,
    /// Poll completion instant.
    pub last_sync_at: DateTime<Utc>,
}

/// Repository over the `storage_elements` table.
#[derive(Clone)]
pub struct StorageElementStore {
    pool: PgPool,
}

impl StorageElementStore {
    pub(crate) const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Register a new element.
    ///
    /// # Errors
    ///
    /// Returns an error on connectivity failures or unique-constraint
    /// violations (duplicate `url` or `storage_id`).
    pub async fn insert(&self, se: &StorageElement) -> Result<()> {
        sqlx::query(INSERT_SE)
            .bind(se.id)
            .bind(&se.name)
            .bind(&se.url)
            .bind(&se.storage_id)
            .bind(se.mode.as_str())
            .bind(se.status.as_str())
            .bind(se.capacity_bytes)
            .bind(se.used_bytes)
            .bind(se.available_bytes)
            .execute(&self.pool)
            .await
            .context("failed to insert storage element")?;
        Ok(())
    }

    /// Load one element by registry id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get(&self, id: Uuid) -> Result<Option<StorageElement>> {
        let row = sqlx::query_as::<_, SeRow>(SELECT_SE)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("failed to load storage element")?;
        row.map(StorageElement::try_from).transpose()
    }

    /// Load one element by base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get_by_url(&self, url: &str) -> Result<Option<StorageElement>> {
        let row = sqlx::query_as::<_, SeRow>(SELECT_SE_BY_URL)
            .bind(url)
            .fetch_optional(&self.pool)
            .await
            .context("failed to load storage element by url")?;
        row.map(StorageElement::try_from).transpose()
    }

    /// Load one element by its self-declared identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get_by_storage_id(&self, storage_id: &str) -> Result<Option<StorageElement>> {
        let row = sqlx::query_as::<_, SeRow>(SELECT_SE_BY_STORAGE_ID)
            .bind(storage_id)
            .fetch_optional(&self.pool)
            .await
            .context("failed to load storage element by storage id")?;
        row.map(StorageElement::try_from).transpose()
    }

    /// All registered elements.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list(&self) -> Result<Vec<StorageElement>> {
        let rows = sqlx::query_as::<_, SeRow>(SELECT_ALL_SES)
            .fetch_all(&self.pool)
            .await
            .context("failed to list storage elements")?;
        rows.into_iter().map(StorageElement::try_from).collect()
    }

    /// Elements currently in the given status.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_by_status(&self, status: SeStatus) -> Result<Vec<StorageElement>> {
        let rows = sqlx::query_as::<_, SeRow>(SELECT_SES_BY_STATUS)
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await
            .context("failed to list storage elements by status")?;
        rows.into_iter().map(StorageElement::try_from).collect()
    }

    /// Apply an `/info` refresh to the row.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn apply_info(&self, id: Uuid, update: &SeInfoUpdate) -> Result<()> {
        sqlx::query(UPDATE_SE_INFO)
            .bind(id)
            .bind(update.mode.as_str())
            .bind(update.status.as_str())
            .bind(update.capacity_bytes)
            .bind(update.used_bytes)
            .bind(update.available_bytes)
            .bind(update.last_sync_at)
            .execute(&self.pool)
            .await
            .context("failed to apply storage element info")?;
        Ok(())
    }

    /// Overwrite the element's status.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn set_status(&self, id: Uuid, status: SeStatus) -> Result<()> {
        sqlx::query(UPDATE_SE_STATUS)
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await
            .context("failed to update storage element status")?;
        Ok(())
    }

    /// Stamp the completion of a file synchronization.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn set_last_file_sync(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(UPDATE_SE_FILE_SYNC)
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await
            .context("failed to stamp file sync")?;
        Ok(())
    }

    /// Remove the element and, via cascade, its registry rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        sqlx::query(DELETE_SE)
            .bind(id)
            .execute(&self.pool)
            .await
            .context("failed to delete storage element")?;
        Ok(())
    }
}

#[derive(Debug, Clone, FromRow)]
struct SeRow {
    id: Uuid,
    name: String,
    url: String,
    storage_id: String,
    mode: String,
    status: String,
    capacity_bytes: i64,
    used_bytes: i64,
    available_bytes: i64,
    last_sync_at: Option<DateTime<Utc>>,
    last_file_sync_at: Option<DateTime<Utc>>,
}

impl TryFrom<SeRow> for StorageElement {
    type Error = anyhow::Error;

    fn try_from(row: SeRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            name: row.name,
            url: row.url,
            storage_id: row.storage_id,
            mode: row
                .mode
                .parse()
                .context("unknown mode label in storage_elements row")?,
            status: row
                .status
                .parse()
                .context("unknown status label in storage_elements row")?,
            capacity_bytes: row.capacity_bytes,
            used_bytes: row.used_bytes,
            available_bytes: row.available_bytes,
            last_sync_at: row.last_sync_at,
            last_file_sync_at: row.last_file_sync_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_labels_decode_into_domain_enums() {
        let row = SeRow {
            id: Uuid::nil(),
            name: "alpha".to_string(),
            url: "http://se-alpha:8081".to_string(),
            storage_id: "se-alpha".to_string(),
            mode: "ro".to_string(),
            status: "online".to_string(),
            capacity_bytes: 100,
            used_bytes: 25,
            available_bytes: 75,
            last_sync_at: None,
            last_file_sync_at: None,
        };
        let se = StorageElement::try_from(row).expect("row decodes");
        assert_eq!(se.mode, OperatingMode::Ro);
        assert_eq!(se.status, SeStatus::Online);
    }

    #[test]
    fn unknown_labels_are_rejected() {
        let row = SeRow {
            id: Uuid::nil(),
            name: "alpha".to_string(),
            url: "http://se-alpha:8081".to_string(),
            storage_id: "se-alpha".to_string(),
            mode: "sideways".to_string(),
            status: "online".to_string(),
            capacity_bytes: 0,
            used_bytes: 0,
            available_bytes: 0,
            last_sync_at: None,
            last_file_sync_at: None,
        };
        assert!(StorageElement::try_from(row).is_err());
    }
}
