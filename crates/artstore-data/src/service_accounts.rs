//! Service-account repository.

use anyhow::{Context, Result};
use artstore_model::{SaSource, SaStatus, ServiceAccount};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

const INSERT_SA: &str = r"
    INSERT INTO service_accounts
        (id, keycloak_client_id, client_id, name, description, scopes, status, source, created_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, now())
";

const SELECT_SA: &str = r"SELECT * FROM service_accounts WHERE id = $1";

const SELECT_SA_BY_CLIENT_ID: &str = r"SELECT * FROM service_accounts WHERE client_id = $1";

const LIST_SAS: &str = r"SELECT * FROM service_accounts ORDER BY created_at DESC";

const UPDATE_SA_SCOPES: &str = r"UPDATE service_accounts SET scopes = $2 WHERE id = $1";

const UPDATE_SA_STATUS: &str = r"UPDATE service_accounts SET status = $2 WHERE id = $1";

const UPDATE_SA_DESCRIPTION: &str = r"UPDATE service_accounts SET description = $2 WHERE id = $1";

const UPDATE_SA_KEYCLOAK_ID: &str =
    r"UPDATE service_accounts SET keycloak_client_id = $2 WHERE id = $1";

const UPDATE_SA_SYNCED: &str = r"UPDATE service_accounts SET last_synced_at = $2 WHERE id = $1";

const DELETE_SA: &str = r"DELETE FROM service_accounts WHERE id = $1";

/// Fields required to create a service-account row.
#[derive(Debug, Clone)]
pub struct NewServiceAccount {
    /// Registry identifier.
    pub id: Uuid,
    /// Identity provider's internal client id, when already known.
    pub keycloak_client_id: Option<String>,
    /// OAuth client id.
    pub client_id: String,
    /// Operator-facing name.
    pub name: String,
    /// Free-form description.
    pub description: Option<String>,
    /// Granted scopes.
    pub scopes: Vec<String>,
    /// Lifecycle status.
    pub status: SaStatus,
    /// Which side created the account.
    pub source: SaSource,
}

/// Repository over the `service_accounts` table.
#[derive(Clone)]
pub struct ServiceAccountStore {
    pool: PgPool,
}

impl ServiceAccountStore {
    pub(crate) const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a row.
    ///
    /// # Errors
    ///
    /// Returns an error on connectivity failures or a duplicate `client_id`.
    pub async fn insert(&self, sa: &NewServiceAccount) -> Result<()> {
        sqlx::query(INSERT_SA)
            .bind(sa.id)
            .bind(&sa.keycloak_client_id)
            .bind(&sa.client_id)
            .bind(&sa.name)
            .bind(&sa.description)
            .bind(&sa.scopes)
            .bind(sa.status.as_str())
            .bind(sa.source.as_str())
            .execute(&self.pool)
            .await
            .context("failed to insert service account")?;
        Ok(())
    }

    /// Load one row by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get(&self, id: Uuid) -> Result<Option<ServiceAccount>> {
        let row = sqlx::query_as::<_, SaRow>(SELECT_SA)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("failed to load service account")?;
        row.map(ServiceAccount::try_from).transpose()
    }

    /// Load one row by OAuth client id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get_by_client_id(&self, client_id: &str) -> Result<Option<ServiceAccount>> {
        let row = sqlx::query_as::<_, SaRow>(SELECT_SA_BY_CLIENT_ID)
            .bind(client_id)
            .fetch_optional(&self.pool)
            .await
            .context("failed to load service account by client id")?;
        row.map(ServiceAccount::try_from).transpose()
    }

    /// All rows, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list(&self) -> Result<Vec<ServiceAccount>> {
        let rows = sqlx::query_as::<_, SaRow>(LIST_SAS)
            .fetch_all(&self.pool)
            .await
            .context("failed to list service accounts")?;
        rows.into_iter().map(ServiceAccount::try_from).collect()
    }

    /// Overwrite the granted scopes.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn set_scopes(&self, id: Uuid, scopes: &[String]) -> Result<()> {
        sqlx::query(UPDATE_SA_SCOPES)
            .bind(id)
            .bind(scopes)
            .execute(&self.pool)
            .await
            .context("failed to update service account scopes")?;
        Ok(())
    }

    /// Overwrite the lifecycle status.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn set_status(&self, id: Uuid, status: SaStatus) -> Result<()> {
        sqlx::query(UPDATE_SA_STATUS)
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await
            .context("failed to update service account status")?;
        Ok(())
    }

    /// Overwrite the description.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn set_description(&self, id: Uuid, description: Option<&str>) -> Result<()> {
        sqlx::query(UPDATE_SA_DESCRIPTION)
            .bind(id)
            .bind(description)
            .execute(&self.pool)
            .await
            .context("failed to update service account description")?;
        Ok(())
    }

    /// Backfill the provider's internal client id.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn set_keycloak_client_id(&self, id: Uuid, keycloak_client_id: &str) -> Result<()> {
        sqlx::query(UPDATE_SA_KEYCLOAK_ID)
            .bind(id)
            .bind(keycloak_client_id)
            .execute(&self.pool)
            .await
            .context("failed to backfill provider client id")?;
        Ok(())
    }

    /// Stamp the last reconciliation touching the row.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn set_last_synced(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(UPDATE_SA_SYNCED)
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await
            .context("failed to stamp service account sync")?;
        Ok(())
    }

    /// Remove the row.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        sqlx::query(DELETE_SA)
            .bind(id)
            .execute(&self.pool)
            .await
            .context("failed to delete service account")?;
        Ok(())
    }
}

#[derive(Debug, Clone, FromRow)]
struct SaRow {
    id: Uuid,
    keycloak_client_id: Option<String>,
    client_id: String,
    name: String,
    description: Option<String>,
    scopes: Vec<String>,
    status: String,
    source: String,
    last_synced_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<SaRow> for ServiceAccount {
    type Error = anyhow::Error;

    fn try_from(row: SaRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            keycloak_client_id: row.keycloak_client_id,
            client_id: row.client_id,
            name: row.name,
            description: row.description,
            scopes: row.scopes,
            status: row
                .status
                .parse()
                .context("unknown status label in service_accounts row")?,
            source: row
                .source
                .parse()
                .context("unknown source label in service_accounts row")?,
            last_synced_at: row.last_synced_at,
            created_at: row.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_labels_decode_into_domain_enums() {
        let row = SaRow {
            id: Uuid::nil(),
            keycloak_client_id: Some("internal-1".to_string()),
            client_id: "sa_backup_0a1b2c3d".to_string(),
            name: "backup".to_string(),
            description: None,
            scopes: vec!["files:read".to_string()],
            status: "suspended".to_string(),
            source: "keycloak".to_string(),
            last_synced_at: None,
            created_at: Utc::now(),
        };
        let sa = ServiceAccount::try_from(row).expect("row decodes");
        assert_eq!(sa.status, SaStatus::Suspended);
        assert_eq!(sa.source, SaSource::Keycloak);
    }
}
