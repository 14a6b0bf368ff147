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

//! Shared test fixtures: sample metadata builders, temp data directories,
//! and a fixed RSA key pair for minting and validating tokens in tests.

mod fixtures;
mod keys;

pub use fixtures::{metadata, temp_data_dir};
pub use keys::{
    TEST_KEY_ID, TEST_PRIVATE_KEY_PEM, jwks_document, mint_hs256_token, mint_token,
};
