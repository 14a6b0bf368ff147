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

//! Environment-variable configuration for the artstore processes.
//!
//! Both binaries read a flat set of environment variables at startup. Every
//! duration must be strictly positive, every boolean must be the literal
//! `true` or `false`, and any unknown or invalid value aborts startup with a
//! labeled error naming the offending variable.

mod am;
mod error;
mod parse;
mod se;

pub use am::{AmConfig, DatabaseConfig, OidcConfig};
pub use error::{ConfigError, ConfigResult};
pub use parse::{AuthKeysConfig, HttpClientOptions, LogFormat, ServerTimeouts};
pub use se::SeConfig;
