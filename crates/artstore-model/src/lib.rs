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

//! Shared value types and wire shapes for the artstore platform.
//!
//! Both the Storage Element and the Admin Module serialize these types over
//! HTTP and persist them (as sidecar JSON on the SE, as registry rows on the
//! AM), so the serde contract here is the single source of truth for the
//! wire format.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Error raised when parsing one of the closed string vocabularies fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {vocabulary} value")]
pub struct UnknownValue {
    /// Vocabulary the value was parsed against.
    pub vocabulary: &'static str,
    /// The offending input.
    pub value: String,
}

impl UnknownValue {
    fn new(vocabulary: &'static str, value: &str) -> Self {
        Self {
            vocabulary,
            value: value.to_string(),
        }
    }
}

/// Lifecycle status of a stored file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    /// Visible and downloadable.
    Active,
    /// Soft-deleted; awaiting physical removal by the garbage collector.
    Deleted,
    /// TTL elapsed; retained on disk but no longer active.
    Expired,
}

impl FileStatus {
    /// Wire label for the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Deleted => "deleted",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileStatus {
    type Err = UnknownValue;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "active" => Ok(Self::Active),
            "deleted" => Ok(Self::Deleted),
            "expired" => Ok(Self::Expired),
            other => Err(UnknownValue::new("file_status", other)),
        }
    }
}

/// Retention policy attached to a file at upload time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RetentionPolicy {
    /// Never expires.
    Permanent,
    /// Expires `ttl_days` after upload.
    Temporary,
}

impl RetentionPolicy {
    /// Wire label for the policy.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Permanent => "permanent",
            Self::Temporary => "temporary",
        }
    }
}

impl FromStr for RetentionPolicy {
    type Err = UnknownValue;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "permanent" => Ok(Self::Permanent),
            "temporary" => Ok(Self::Temporary),
            other => Err(UnknownValue::new("retention_policy", other)),
        }
    }
}

/// Per-file metadata persisted as a sidecar next to the blob and mirrored
/// into the Admin Module's federated registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileMetadata {
    /// Identifier chosen at upload; also the blob's on-disk name.
    pub file_id: Uuid,
    /// Filename supplied by the uploader.
    pub original_filename: String,
    /// Path of the blob relative to the data directory.
    pub storage_path: String,
    /// MIME type declared at upload.
    pub content_type: String,
    /// Blob size in bytes.
    pub size: i64,
    /// Lowercase hex SHA-256 of the blob as last written.
    pub checksum: String,
    /// Subject that performed the upload.
    pub uploaded_by: String,
    /// Upload timestamp.
    pub uploaded_at: DateTime<Utc>,
    /// Lifecycle status.
    pub status: FileStatus,
    /// Retention policy.
    pub retention_policy: RetentionPolicy,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Days until expiry; set iff the policy is temporary.
    pub ttl_days: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Expiry instant; set iff the policy is temporary.
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Free-form description.
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Free-form tags.
    pub tags: Option<Vec<String>>,
}

/// Operating mode of a Storage Element.
///
/// Modes are ordered `rw > ro > ar`; downgrades are unconditional while
/// upgrades require explicit confirmation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OperatingMode {
    /// Read/write: the full operation set is admitted.
    Rw,
    /// Read-only: downloads and listings only.
    Ro,
    /// Archive: listings and info only.
    Ar,
}

impl OperatingMode {
    /// Wire label for the mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rw => "rw",
            Self::Ro => "ro",
            Self::Ar => "ar",
        }
    }

    /// Operations admitted while the element is in this mode.
    #[must_use]
    pub const fn allowed_operations(self) -> &'static [OperationKind] {
        match self {
            Self::Rw => &[
                OperationKind::Upload,
                OperationKind::Download,
                OperationKind::Update,
                OperationKind::Delete,
                OperationKind::List,
                OperationKind::Info,
            ],
            Self::Ro => &[
                OperationKind::Download,
                OperationKind::List,
                OperationKind::Info,
            ],
            Self::Ar => &[OperationKind::List, OperationKind::Info],
        }
    }

    /// Whether `operation` is admitted in this mode.
    #[must_use]
    pub fn allows(self, operation: OperationKind) -> bool {
        self.allowed_operations().contains(&operation)
    }
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperatingMode {
    type Err = UnknownValue;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "rw" => Ok(Self::Rw),
            "ro" => Ok(Self::Ro),
            "ar" => Ok(Self::Ar),
            other => Err(UnknownValue::new("operating_mode", other)),
        }
    }
}

/// Operations gated by the mode state machine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Accept a new blob.
    Upload,
    /// Serve blob bytes.
    Download,
    /// Mutate mutable metadata fields.
    Update,
    /// Soft-delete a file.
    Delete,
    /// Enumerate files.
    List,
    /// Report element info.
    Info,
}

impl OperationKind {
    /// Wire label for the operation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Download => "download",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::List => "list",
            Self::Info => "info",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reachability status of a Storage Element as observed by the Admin Module.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SeStatus {
    /// Reachable and serving.
    Online,
    /// Deliberately withdrawn from synchronization.
    Maintenance,
    /// Unreachable.
    Offline,
    /// Reachable but reporting an unhealthy readiness probe.
    Degraded,
}

impl SeStatus {
    /// Wire label for the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Maintenance => "maintenance",
            Self::Offline => "offline",
            Self::Degraded => "degraded",
        }
    }
}

impl fmt::Display for SeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeStatus {
    type Err = UnknownValue;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "online" => Ok(Self::Online),
            "maintenance" => Ok(Self::Maintenance),
            "offline" => Ok(Self::Offline),
            "degraded" => Ok(Self::Degraded),
            other => Err(UnknownValue::new("se_status", other)),
        }
    }
}

/// Deployment flavour declared by a Storage Element.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReplicaMode {
    /// Single node owning its data directory.
    Standalone,
    /// Member of a replicated deployment; the protocol itself is external.
    Replicated,
}

/// Declarative role of a Storage Element instance within its deployment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InstanceRole {
    /// Not part of a replica set.
    Standalone,
    /// Writable member a replica set follows.
    Leader,
    /// Read path replica.
    Follower,
}

/// Capacity accounting reported by `/info`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Capacity {
    /// Configured capacity limit in bytes.
    pub total_bytes: i64,
    /// Bytes consumed by active files.
    pub used_bytes: i64,
    /// `total_bytes - used_bytes`, floored at zero.
    pub available_bytes: i64,
}

impl Capacity {
    /// Derive the capacity triple from a limit and the active-bytes sum.
    #[must_use]
    pub const fn from_usage(total_bytes: i64, used_bytes: i64) -> Self {
        let available = total_bytes - used_bytes;
        Self {
            total_bytes,
            used_bytes,
            available_bytes: if available < 0 { 0 } else { available },
        }
    }
}

/// Public info document served by a Storage Element.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeInfo {
    /// Self-declared identifier of the element.
    pub storage_id: String,
    /// Current operating mode.
    pub mode: OperatingMode,
    /// Current reachability/health status.
    pub status: SeStatus,
    /// Software version string.
    pub version: String,
    /// Operations admitted in the current mode.
    pub allowed_operations: Vec<OperationKind>,
    /// Capacity accounting.
    pub capacity: Capacity,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Deployment flavour, when declared.
    pub replica_mode: Option<ReplicaMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Instance role, when declared.
    pub role: Option<InstanceRole>,
}

/// Paginated listing envelope used by file enumeration endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Page<T> {
    /// Entries for the requested window.
    pub items: Vec<T>,
    /// Total entries matching the filter, ignoring the window.
    pub total: usize,
    /// Requested page size; zero means unbounded.
    pub limit: usize,
    /// Requested offset.
    pub offset: usize,
    /// Whether entries remain past this window.
    pub has_more: bool,
}

impl<T> Page<T> {
    /// Build the envelope, deriving `has_more` from the window.
    #[must_use]
    pub fn new(items: Vec<T>, total: usize, limit: usize, offset: usize) -> Self {
        let has_more = offset.saturating_add(items.len()) < total;
        Self {
            items,
            total,
            limit,
            offset,
            has_more,
        }
    }
}

/// Administrative role granted to a human operator.
///
/// Ordered `admin > readonly`; the absence of a role ranks below both.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Read-only access to the admin surface.
    Readonly,
    /// Full administrative access.
    Admin,
}

impl Role {
    /// Wire label for the role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Readonly => "readonly",
        }
    }

    /// Numeric rank used by the monotone-upgrade rule.
    #[must_use]
    pub const fn rank(this: Option<Self>) -> u8 {
        match this {
            Some(Self::Admin) => 2,
            Some(Self::Readonly) => 1,
            None => 0,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownValue;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "admin" => Ok(Self::Admin),
            "readonly" => Ok(Self::Readonly),
            other => Err(UnknownValue::new("role", other)),
        }
    }
}

/// Kind of principal behind a validated token.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubjectType {
    /// Human operator authenticated interactively.
    User,
    /// Non-human identity authenticated by client credentials.
    ServiceAccount,
}

/// Request-scoped identity constructed by the auth middleware.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthClaims {
    /// Token subject (`sub`).
    pub subject: String,
    /// Principal classification.
    pub subject_type: SubjectType,
    /// Preferred username, when present.
    pub preferred_username: Option<String>,
    /// Email, when present.
    pub email: Option<String>,
    /// Raw realm roles from the token.
    pub roles: Vec<String>,
    /// Raw group memberships from the token.
    pub groups: Vec<String>,
    /// Role derived from identity-provider groups and realm roles.
    pub idp_role: Option<Role>,
    /// Locally stored role override, when one exists.
    pub role_override: Option<Role>,
    /// `max(idp_role, role_override)`; `None` for service accounts.
    pub effective_role: Option<Role>,
    /// Union of the token's `scope` string and `scopes` array.
    pub scopes: Vec<String>,
    /// OAuth client id (`client_id` or `azp`), when present.
    pub client_id: Option<String>,
}

impl AuthClaims {
    /// Whether the principal presents at least one of `required` scopes.
    #[must_use]
    pub fn has_any_scope(&self, required: &[&str]) -> bool {
        required
            .iter()
            .any(|scope| self.scopes.iter().any(|held| held == scope))
    }
}

/// Effective role under the monotone-upgrade rule: the override may raise a
/// user's role but never demote it.
#[must_use]
pub fn effective_role(idp_role: Option<Role>, role_override: Option<Role>) -> Option<Role> {
    if Role::rank(role_override) > Role::rank(idp_role) {
        role_override
    } else {
        idp_role
    }
}

/// Lifecycle status of a service account.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SaStatus {
    /// Credentials valid and usable.
    Active,
    /// Temporarily disabled.
    Suspended,
}

impl SaStatus {
    /// Wire label for the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Suspended => "suspended",
        }
    }
}

impl FromStr for SaStatus {
    type Err = UnknownValue;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "active" => Ok(Self::Active),
            "suspended" => Ok(Self::Suspended),
            other => Err(UnknownValue::new("sa_status", other)),
        }
    }
}

/// Which side first created a service account.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SaSource {
    /// Created through the Admin Module.
    Local,
    /// Discovered on the identity provider by the synchronizer.
    Keycloak,
}

impl SaSource {
    /// Wire label for the source.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Keycloak => "keycloak",
        }
    }
}

impl FromStr for SaSource {
    type Err = UnknownValue;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "local" => Ok(Self::Local),
            "keycloak" => Ok(Self::Keycloak),
            other => Err(UnknownValue::new("sa_source", other)),
        }
    }
}

/// Registry row for a Storage Element known to the Admin Module.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageElement {
    /// Registry identifier.
    pub id: Uuid,
    /// Operator-facing name.
    pub name: String,
    /// Base URL of the element's HTTP surface; unique.
    pub url: String,
    /// Self-declared identifier; must match the element's `/info` response.
    pub storage_id: String,
    /// Last observed operating mode.
    pub mode: OperatingMode,
    /// Last observed status.
    pub status: SeStatus,
    /// Last observed capacity limit.
    pub capacity_bytes: i64,
    /// Last observed active-bytes sum.
    pub used_bytes: i64,
    /// Last observed available bytes.
    pub available_bytes: i64,
    /// Completion instant of the last info refresh.
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Completion instant of the last file synchronization.
    pub last_file_sync_at: Option<DateTime<Utc>>,
}

/// Registry row for a file observed on some Storage Element.
///
/// `(storage_element_id, file_id)` is unique.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegistryFile {
    /// Registry identifier.
    pub id: Uuid,
    /// Owning Storage Element.
    pub storage_element_id: Uuid,
    /// File identifier on the element.
    pub file_id: Uuid,
    /// Filename supplied by the uploader.
    pub original_filename: String,
    /// MIME type declared at upload.
    pub content_type: String,
    /// Blob size in bytes.
    pub size: i64,
    /// Lowercase hex SHA-256 of the blob.
    pub checksum: String,
    /// Subject that performed the upload.
    pub uploaded_by: String,
    /// Upload timestamp.
    pub uploaded_at: DateTime<Utc>,
    /// Lifecycle status mirrored from the element.
    pub status: FileStatus,
    /// Row creation instant.
    pub created_at: DateTime<Utc>,
    /// Last mutation instant.
    pub updated_at: DateTime<Utc>,
}

/// Registry row for a service account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceAccount {
    /// Registry identifier.
    pub id: Uuid,
    /// Identity provider's internal id for the client, once known.
    pub keycloak_client_id: Option<String>,
    /// OAuth client id; unique, `<prefix><name>_<hex8>`.
    pub client_id: String,
    /// Operator-facing name.
    pub name: String,
    /// Free-form description.
    pub description: Option<String>,
    /// Scopes granted to the account.
    pub scopes: Vec<String>,
    /// Lifecycle status.
    pub status: SaStatus,
    /// Which side created the account.
    pub source: SaSource,
    /// Completion instant of the last reconciliation touching this row.
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Row creation instant.
    pub created_at: DateTime<Utc>,
}

/// Locally stored role override for a human operator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoleOverride {
    /// Identity provider's user id.
    pub keycloak_user_id: String,
    /// Username at the time the override was written.
    pub username: String,
    /// Granted role; can only raise the effective role.
    pub additional_role: Role,
    /// Operator that created the override.
    pub created_by: String,
    /// Row creation instant.
    pub created_at: DateTime<Utc>,
}

/// Singleton row tracking synchronization watermarks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SyncState {
    /// Completion instant of the last full file-registry pass.
    pub last_file_sync_at: Option<DateTime<Utc>>,
    /// Completion instant of the last service-account pass.
    pub last_sa_sync_at: Option<DateTime<Utc>>,
}

/// Closed error-code vocabulary carried in every error body.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Missing, malformed, expired, or signature-invalid token.
    Unauthorized,
    /// Authenticated but lacking role/scope, or wrong subject type.
    Forbidden,
    /// Entity absent.
    NotFound,
    /// Unique-constraint violation.
    Conflict,
    /// Operation not admitted by the current mode, or file in terminal status.
    ModeNotAllowed,
    /// Mode transition missing its confirm flag.
    ConfirmationRequired,
    /// Impossible mode pair.
    InvalidTransition,
    /// Malformed input.
    ValidationError,
    /// Upstream Storage Element call failed.
    SeUnavailable,
    /// Identity provider call failed.
    IdpUnavailable,
    /// Everything else.
    InternalError,
}

impl ErrorCode {
    /// Wire label for the code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::ModeNotAllowed => "MODE_NOT_ALLOWED",
            Self::ConfirmationRequired => "CONFIRMATION_REQUIRED",
            Self::InvalidTransition => "INVALID_TRANSITION",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::SeUnavailable => "SE_UNAVAILABLE",
            Self::IdpUnavailable => "IDP_UNAVAILABLE",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }
}

/// Uniform error body: `{"error":{"code","message"}}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    /// The error payload.
    pub error: ErrorDetail,
}

/// Code plus human-readable message inside an [`ErrorBody`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorDetail {
    /// Closed-vocabulary code.
    pub code: ErrorCode,
    /// Human-readable message; never carries tokens or secrets.
    pub message: String,
}

impl ErrorBody {
    /// Build the uniform body.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code,
                message: message.into(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_allowed_operations_match_contract() {
        assert_eq!(OperatingMode::Rw.allowed_operations().len(), 6);
        assert!(OperatingMode::Ro.allows(OperationKind::Download));
        assert!(!OperatingMode::Ro.allows(OperationKind::Upload));
        assert!(OperatingMode::Ar.allows(OperationKind::Info));
        assert!(!OperatingMode::Ar.allows(OperationKind::Download));
    }

    #[test]
    fn effective_role_never_demotes() {
        let cases = [None, Some(Role::Readonly), Some(Role::Admin)];
        for idp in cases {
            for over in cases {
                let effective = effective_role(idp, over);
                assert!(
                    Role::rank(effective) >= Role::rank(idp),
                    "override demoted {idp:?} to {effective:?}"
                );
                assert!(effective == idp || effective == over);
            }
        }
    }

    #[test]
    fn effective_role_upgrades_readonly_to_admin() {
        assert_eq!(
            effective_role(Some(Role::Readonly), Some(Role::Admin)),
            Some(Role::Admin)
        );
        assert_eq!(
            effective_role(Some(Role::Admin), Some(Role::Readonly)),
            Some(Role::Admin)
        );
    }

    #[test]
    fn capacity_floors_available_at_zero() {
        let over = Capacity::from_usage(100, 150);
        assert_eq!(over.available_bytes, 0);
        let under = Capacity::from_usage(100, 25);
        assert_eq!(under.available_bytes, 75);
    }

    #[test]
    fn page_derives_has_more() {
        let page = Page::new(vec![1, 2], 5, 2, 0);
        assert!(page.has_more);
        let last = Page::new(vec![5], 5, 2, 4);
        assert!(!last.has_more);
        let empty: Page<i32> = Page::new(Vec::new(), 5, 2, 10);
        assert!(!empty.has_more);
    }

    #[test]
    fn status_round_trips_through_labels() {
        for status in [FileStatus::Active, FileStatus::Deleted, FileStatus::Expired] {
            assert_eq!(status.as_str().parse::<FileStatus>(), Ok(status));
        }
        assert!("gone".parse::<FileStatus>().is_err());
    }

    #[test]
    fn error_body_serializes_with_nested_error() {
        let body = ErrorBody::new(ErrorCode::ModeNotAllowed, "upload not allowed in ro");
        let value = serde_json::to_value(&body).expect("serializes");
        assert_eq!(value["error"]["code"], "MODE_NOT_ALLOWED");
        assert_eq!(value["error"]["message"], "upload not allowed in ro");
    }

    #[test]
    fn metadata_sidecar_json_uses_snake_case_labels() {
        let meta = FileMetadata {
            file_id: Uuid::nil(),
            original_filename: "greeting.txt".to_string(),
            storage_path: Uuid::nil().to_string(),
            content_type: "text/plain".to_string(),
            size: 11,
            checksum: "b94d27b9".to_string(),
            uploaded_by: "tester".to_string(),
            uploaded_at: Utc::now(),
            status: FileStatus::Active,
            retention_policy: RetentionPolicy::Temporary,
            ttl_days: Some(7),
            expires_at: Some(Utc::now()),
            description: None,
            tags: None,
        };
        let value = serde_json::to_value(&meta).expect("serializes");
        assert_eq!(value["status"], "active");
        assert_eq!(value["retention_policy"], "temporary");
        assert!(value.get("description").is_none());
    }
}
