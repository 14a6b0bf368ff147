#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::cargo,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Admin Module data layer: the federated file registry, storage-element
//! inventory, service accounts, role overrides, and sync watermarks over
//! Postgres.

mod files;
mod overrides;
mod service_accounts;
mod storage_elements;
mod sync_state;

pub use files::{FileRegistryStore, NewRegistryFile};
pub use overrides::RoleOverrideStore;
pub use service_accounts::{NewServiceAccount, ServiceAccountStore};
pub use storage_elements::{SeInfoUpdate, StorageElementStore};
pub use sync_state::SyncStateStore;

use anyhow::{Context, Result};
use sqlx::PgPool;

/// Whether an error from this layer is a unique-constraint violation
/// (duplicate `client_id`, duplicate element URL, and so on).
#[must_use]
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<sqlx::Error>()
            .and_then(|sql| sql.as_database_error())
            .and_then(sqlx::error::DatabaseError::code)
            .is_some_and(|code| code == "23505")
    })
}

/// Shared database handle owning the pool and migrations.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect the pool and apply pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the database is unreachable or migrations fail.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPool::connect(url)
            .await
            .context("failed to connect to the database")?;
        Self::with_pool(pool).await
    }

    /// Wrap an existing pool and apply pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if migrations fail.
    pub async fn with_pool(pool: PgPool) -> Result<Self> {
        let mut migrator = sqlx::migrate!("./migrations");
        migrator.set_ignore_missing(true);
        migrator
            .run(&pool)
            .await
            .context("failed to run registry migrations")?;
        Ok(Self { pool })
    }

    /// Access the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Storage-element inventory store.
    #[must_use]
    pub fn storage_elements(&self) -> StorageElementStore {
        StorageElementStore::new(self.pool.clone())
    }

    /// Federated file-registry store.
    #[must_use]
    pub fn files(&self) -> FileRegistryStore {
        FileRegistryStore::new(self.pool.clone())
    }

    /// Service-account store.
    #[must_use]
    pub fn service_accounts(&self) -> ServiceAccountStore {
        ServiceAccountStore::new(self.pool.clone())
    }

    /// Role-override store.
    #[must_use]
    pub fn role_overrides(&self) -> RoleOverrideStore {
        RoleOverrideStore::new(self.pool.clone())
    }

    /// Sync-watermark store.
    #[must_use]
    pub fn sync_state(&self) -> SyncStateStore {
        SyncStateStore::new(self.pool.clone())
    }
}
