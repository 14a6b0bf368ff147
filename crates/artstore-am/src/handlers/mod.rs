//! HTTP handlers for the Admin Module surface.

pub(crate) mod admin_users;
pub(crate) mod dashboard;
pub(crate) mod files;
pub(crate) mod health;
pub(crate) mod idp_status;
pub(crate) mod oidc;
pub(crate) mod service_accounts;
pub(crate) mod storage_elements;

use artstore_model::Role;

/// Roles admitted to read-only endpoints.
pub(crate) const READ_ROLES: &[Role] = &[Role::Admin, Role::Readonly];
/// Roles admitted to mutating endpoints.
pub(crate) const WRITE_ROLES: &[Role] = &[Role::Admin];
/// Scopes admitted to read-only endpoints.
pub(crate) const READ_SCOPES: &[&str] = &["admin:read", "admin:write"];
/// Scopes admitted to mutating endpoints.
pub(crate) const WRITE_SCOPES: &[&str] = &["admin:write"];
