//! Role-override repository: at most one row per user; the override can
//! only raise the effective role, a rule applied at resolution time.

use anyhow::{Context, Result};
use artstore_model::{Role, RoleOverride};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

const UPSERT_OVERRIDE: &str = r"
    INSERT INTO role_overrides (keycloak_user_id, username, additional_role, created_by, created_at)
    VALUES ($1, $2, $3, $4, now())
    ON CONFLICT (keycloak_user_id) DO UPDATE
    SET username = EXCLUDED.username,
        additional_role = EXCLUDED.additional_role,
        created_by = EXCLUDED.created_by,
        created_at = now()
";

const SELECT_OVERRIDE: &str = r"SELECT * FROM role_overrides WHERE keycloak_user_id = $1";

const LIST_OVERRIDES: &str = r"SELECT * FROM role_overrides ORDER BY created_at DESC";

const DELETE_OVERRIDE: &str = r"DELETE FROM role_overrides WHERE keycloak_user_id = $1";

/// Repository over the `role_overrides` table.
#[derive(Clone)]
pub struct RoleOverrideStore {
    pool: PgPool,
}

impl RoleOverrideStore {
    pub(crate) const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create or replace the override for a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the upsert fails.
    pub async fn upsert(
        &self,
        keycloak_user_id: &str,
        username: &str,
        additional_role: Role,
        created_by: &str,
    ) -> Result<()> {
        sqlx::query(UPSERT_OVERRIDE)
            .bind(keycloak_user_id)
            .bind(username)
            .bind(additional_role.as_str())
            .bind(created_by)
            .execute(&self.pool)
            .await
            .context("failed to upsert role override")?;
        Ok(())
    }

    /// Load the override for a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get(&self, keycloak_user_id: &str) -> Result<Option<RoleOverride>> {
        let row = sqlx::query_as::<_, OverrideRow>(SELECT_OVERRIDE)
            .bind(keycloak_user_id)
            .fetch_optional(&self.pool)
            .await
            .context("failed to load role override")?;
        row.map(RoleOverride::try_from).transpose()
    }

    /// All overrides, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list(&self) -> Result<Vec<RoleOverride>> {
        let rows = sqlx::query_as::<_, OverrideRow>(LIST_OVERRIDES)
            .fetch_all(&self.pool)
            .await
            .context("failed to list role overrides")?;
        rows.into_iter().map(RoleOverride::try_from).collect()
    }

    /// Remove the override for a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn delete(&self, keycloak_user_id: &str) -> Result<()> {
        sqlx::query(DELETE_OVERRIDE)
            .bind(keycloak_user_id)
            .execute(&self.pool)
            .await
            .context("failed to delete role override")?;
        Ok(())
    }
}

#[derive(Debug, Clone, FromRow)]
struct OverrideRow {
    keycloak_user_id: String,
    username: String,
    additional_role: String,
    created_by: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<OverrideRow> for RoleOverride {
    type Error = anyhow::Error;

    fn try_from(row: OverrideRow) -> Result<Self> {
        Ok(Self {
            keycloak_user_id: row.keycloak_user_id,
            username: row.username,
            additional_role: row
                .additional_role
                .parse()
                .context("unknown role label in role_overrides row")?,
            created_by: row.created_by,
            created_at: row.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_role_decodes_into_domain_enum() {
        let row = OverrideRow {
            keycloak_user_id: "user-1".to_string(),
            username: "alice".to_string(),
            additional_role: "admin".to_string(),
            created_by: "root".to_string(),
            created_at: Utc::now(),
        };
        let over = RoleOverride::try_from(row).expect("row decodes");
        assert_eq!(over.additional_role, Role::Admin);
    }
}
