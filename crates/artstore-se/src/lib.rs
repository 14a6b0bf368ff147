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

//! Storage Element HTTP surface and process bootstrap.

mod bootstrap;
mod error;
mod handlers;
mod router;
mod state;

pub use bootstrap::run;
pub use router::ApiServer;
pub use state::SeState;
