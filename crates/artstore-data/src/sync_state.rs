//! Singleton sync-watermark repository.

use anyhow::{Context, Result};
use artstore_model::SyncState;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

const SELECT_STATE: &str = r"SELECT last_file_sync_at, last_sa_sync_at FROM sync_state WHERE id = 1";

const SET_FILE_SYNC: &str = r"UPDATE sync_state SET last_file_sync_at = $1 WHERE id = 1";

const SET_SA_SYNC: &str = r"UPDATE sync_state SET last_sa_sync_at = $1 WHERE id = 1";

/// Repository over the singleton `sync_state` row.
#[derive(Clone)]
pub struct SyncStateStore {
    pool: PgPool,
}

impl SyncStateStore {
    pub(crate) const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Load the watermarks.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get(&self) -> Result<SyncState> {
        let row = sqlx::query_as::<_, StateRow>(SELECT_STATE)
            .fetch_one(&self.pool)
            .await
            .context("failed to load sync state")?;
        Ok(SyncState {
            last_file_sync_at: row.last_file_sync_at,
            last_sa_sync_at: row.last_sa_sync_at,
        })
    }

    /// Stamp the completion of a full file-registry pass.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn set_last_file_sync(&self, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(SET_FILE_SYNC)
            .bind(at)
            .execute(&self.pool)
            .await
            .context("failed to stamp file sync watermark")?;
        Ok(())
    }

    /// Stamp the completion of a service-account pass.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn set_last_sa_sync(&self, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(SET_SA_SYNC)
            .bind(at)
            .execute(&self.pool)
            .await
            .context("failed to stamp service account sync watermark")?;
        Ok(())
    }
}

#[derive(Debug, Clone, FromRow)]
struct StateRow {
    last_file_sync_at: Option<DateTime<Utc>>,
    last_sa_sync_at: Option<DateTime<Utc>>,
}
