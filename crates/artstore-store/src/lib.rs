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

//! Storage Element core engine: blob persistence, sidecar metadata, the
//! in-memory index, the mode state machine, and the garbage-collector and
//! reconciler background loops.

mod attrs;
mod blob;
mod error;
mod gc;
mod index;
mod mode;
mod reconcile;

pub use attrs::{ATTR_SUFFIX, AttrStore};
pub use blob::{BlobStore, TMP_SUFFIX, is_reserved_name};
pub use error::{StoreError, StoreResult};
pub use gc::{GarbageCollector, GcReport};
pub use index::FileIndex;
pub use mode::{ModeMachine, ModeTransition, load_initial_mode};
pub use reconcile::{
    IssueKind, ReconcileIssue, ReconcileReport, ReconcileSummary, Reconciler,
};
