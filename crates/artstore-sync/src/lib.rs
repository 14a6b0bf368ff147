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

//! Federated synchronizers: the Storage Element client, the file-registry
//! synchronizer with bounded fan-out, and the service-account synchronizer.

mod accounts;
mod error;
mod files;
mod se_client;

pub use accounts::{
    AccountStore, IdpDirectory, SaSyncHandle, SaSyncReport, SaSynchronizer,
};
pub use error::{SyncError, SyncResult};
pub use files::{FileRegistrySynchronizer, RegistryStore, SyncOutcome, SyncSummary};
pub use se_client::{BearerProvider, SeClient};
