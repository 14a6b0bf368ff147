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

//! Identity and authorization pipeline: remote key-set validation,
//! claims extraction, role resolution, and the HTTP authorization gates.

mod claims;
mod error;
mod gates;
mod http;
mod jwks;

pub use claims::{RawClaims, RealmAccess, RoleResolver, build_claims, scopes_union};
pub use error::{AuthError, AuthResult};
pub use gates::{
    AuthState, GateError, NoOverrides, RoleOverrideLookup, authenticate, require_role,
    require_role_or_scope, require_scope,
};
pub use http::build_http_client;
pub use jwks::{KeySetValidator, bearer_token};
