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

//! Token-cached client for the OpenID Connect provider's admin REST
//! surface: clients, users, and secrets.

mod client;
mod error;
mod model;

pub use client::{IdpAdminClient, IdpAdminConfig};
pub use error::{IdpError, IdpResult};
pub use model::{ClientRepresentation, ClientSecret, NewClient, UserRepresentation};
