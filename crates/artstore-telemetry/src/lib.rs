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

//! Tracing initialization and the Prometheus metrics registry shared by the
//! artstore processes.

mod init;
mod metrics;

pub use init::init_tracing;
pub use metrics::Metrics;
