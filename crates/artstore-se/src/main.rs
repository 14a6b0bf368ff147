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

//! Storage Element binary entrypoint.

#[tokio::main]
async fn main() {
    if let Err(err) = artstore_se::run().await {
        eprintln!("storage element failed: {err:#}");
        std::process::exit(1);
    }
}
