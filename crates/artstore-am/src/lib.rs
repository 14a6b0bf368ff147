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

//! Admin Module: the control plane aggregating Storage Elements, admin
//! users, service accounts, and the federated file registry, with live
//! status streams for the web UI.

mod bootstrap;
mod error;
mod events;
mod handlers;
mod health;
mod router;
mod session;
mod state;

pub use bootstrap::run;
pub use health::{DependencyChecker, DependencyStatus, HealthRegistry, HttpProbe, SqlPing};
pub use router::ApiServer;
pub use session::{SessionData, SessionStore};
pub use state::AmState;
