//! File listing, upload, metadata, update, and soft-delete handlers.

use std::io;
use std::sync::Arc;

use artstore_auth::require_role_or_scope;
use artstore_model::{
    AuthClaims, FileMetadata, FileStatus, OperationKind, Page, RetentionPolicy, Role,
};
use axum::{
    Extension, Json,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
};
use chrono::{Duration as ChronoDuration, Utc};
use futures_util::TryStreamExt;
use serde::Deserialize;
use tokio_util::io::StreamReader;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::SeState;

const DEFAULT_PAGE_LIMIT: usize = 100;
const MAX_DESCRIPTION_CHARS: usize = 1024;
const MAX_TAGS: usize = 32;
const MAX_TAG_CHARS: usize = 64;

const READ_ROLES: &[Role] = &[Role::Admin, Role::Readonly];
const WRITE_ROLES: &[Role] = &[Role::Admin];
const READ_SCOPES: &[&str] = &["files:read"];
const WRITE_SCOPES: &[&str] = &["files:write"];

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ListQuery {
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    offset: Option<usize>,
    #[serde(default)]
    status: Option<String>,
}

pub(crate) async fn list_files(
    State(state): State<Arc<SeState>>,
    claims: Option<Extension<AuthClaims>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<FileMetadata>>, ApiError> {
    require_role_or_scope(claims.as_ref().map(|ext| &ext.0), READ_ROLES, READ_SCOPES)?;
    if !state.can_perform(OperationKind::List) {
        return Err(ApiError::mode_not_allowed("listing not allowed in current mode"));
    }

    let status = match query.status.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(
            raw.parse::<FileStatus>()
                .map_err(|_| ApiError::validation(format!("unknown status filter '{raw}'")))?,
        ),
    };
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_LIMIT);
    let offset = query.offset.unwrap_or(0);

    let (items, total) = state.index.list(limit, offset, status);
    state.metrics.inc_file_operation("list");
    Ok(Json(Page::new(items, total, limit, offset)))
}

pub(crate) async fn get_file(
    State(state): State<Arc<SeState>>,
    claims: Option<Extension<AuthClaims>>,
    Path(id): Path<Uuid>,
) -> Result<Json<FileMetadata>, ApiError> {
    require_role_or_scope(claims.as_ref().map(|ext| &ext.0), READ_ROLES, READ_SCOPES)?;
    state
        .index
        .get(id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("file {id} not found")))
}

pub(crate) async fn upload_file(
    State(state): State<Arc<SeState>>,
    claims: Option<Extension<AuthClaims>>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<FileMetadata>), ApiError> {
    let claims =
        require_role_or_scope(claims.as_ref().map(|ext| &ext.0), WRITE_ROLES, WRITE_SCOPES)?
            .clone();
    if !state.can_perform(OperationKind::Upload) {
        return Err(ApiError::mode_not_allowed("upload not allowed in current mode"));
    }

    let mut description: Option<String> = None;
    let mut tags: Option<Vec<String>> = None;
    let mut retention_raw: Option<String> = None;
    let mut ttl_days: Option<i64> = None;
    let mut stored: Option<StoredPayload> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                cleanup_blob(&state, stored.as_ref()).await;
                return Err(ApiError::validation(format!("malformed multipart body: {err}")));
            }
        };
        let field_name = field.name().map(ToString::to_string);
        match field_name.as_deref() {
            Some("file") => {
                if stored.is_some() {
                    cleanup_blob(&state, stored.as_ref()).await;
                    return Err(ApiError::validation("duplicate file field"));
                }
                let original_filename = field
                    .file_name()
                    .map_or_else(|| "upload.bin".to_string(), ToString::to_string);
                let content_type = field
                    .content_type()
                    .map_or_else(|| "application/octet-stream".to_string(), ToString::to_string);
                let file_id = Uuid::new_v4();
                let mut reader = StreamReader::new(field.map_err(io::Error::other));
                let (size, checksum) = state.blobs.write(file_id, &mut reader, 0).await?;
                stored = Some(StoredPayload {
                    file_id,
                    original_filename,
                    content_type,
                    size,
                    checksum,
                });
            }
            Some("description") => {
                description = Some(read_text_field(field, &state, stored.as_ref()).await?);
            }
            Some("tags") => {
                let raw = read_text_field(field, &state, stored.as_ref()).await?;
                match serde_json::from_str::<Vec<String>>(&raw) {
                    Ok(parsed) => tags = Some(parsed),
                    Err(_) => {
                        cleanup_blob(&state, stored.as_ref()).await;
                        return Err(ApiError::validation("tags must be a JSON string array"));
                    }
                }
            }
            Some("retention_policy") => {
                retention_raw = Some(read_text_field(field, &state, stored.as_ref()).await?);
            }
            Some("ttl_days") => {
                let raw = read_text_field(field, &state, stored.as_ref()).await?;
                match raw.parse::<i64>() {
                    Ok(parsed) => ttl_days = Some(parsed),
                    Err(_) => {
                        cleanup_blob(&state, stored.as_ref()).await;
                        return Err(ApiError::validation("ttl_days must be an integer"));
                    }
                }
            }
            _ => {}
        }
    }

    let Some(stored) = stored else {
        return Err(ApiError::validation("multipart body is missing the file field"));
    };

    let meta = match build_metadata(
        stored.clone(),
        &claims,
        description,
        tags,
        retention_raw.as_deref(),
        ttl_days,
    ) {
        Ok(meta) => meta,
        Err(err) => {
            cleanup_blob(&state, Some(&stored)).await;
            return Err(err);
        }
    };

    if let Err(err) = state.attrs.write(&meta).await {
        warn!(
            file_id = %meta.file_id,
            error = %err,
            "sidecar write failed; removing just-written blob"
        );
        cleanup_blob(&state, Some(&stored)).await;
        return Err(err.into());
    }
    state.index.add(meta.clone());
    state.metrics.inc_file_operation("upload");
    info!(
        file_id = %meta.file_id,
        size = meta.size,
        uploaded_by = %meta.uploaded_by,
        "file uploaded"
    );
    Ok((StatusCode::CREATED, Json(meta)))
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct UpdateRequest {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    tags: Option<Vec<String>>,
}

pub(crate) async fn update_file(
    State(state): State<Arc<SeState>>,
    claims: Option<Extension<AuthClaims>>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateRequest>,
) -> Result<Json<FileMetadata>, ApiError> {
    require_role_or_scope(claims.as_ref().map(|ext| &ext.0), WRITE_ROLES, WRITE_SCOPES)?;
    if !state.can_perform(OperationKind::Update) {
        return Err(ApiError::mode_not_allowed("update not allowed in current mode"));
    }

    validate_mutable_fields(request.description.as_deref(), request.tags.as_deref())?;

    let mut meta = state
        .index
        .get(id)
        .ok_or_else(|| ApiError::not_found(format!("file {id} not found")))?;
    if meta.status != FileStatus::Active {
        return Err(ApiError::mode_not_allowed(format!(
            "file {id} is {} and can no longer be updated",
            meta.status
        )));
    }

    if let Some(description) = request.description {
        meta.description = Some(description);
    }
    if let Some(tags) = request.tags {
        meta.tags = Some(tags);
    }

    state.attrs.write(&meta).await?;
    state.index.update(meta.clone())?;
    state.metrics.inc_file_operation("update");
    Ok(Json(meta))
}

pub(crate) async fn delete_file(
    State(state): State<Arc<SeState>>,
    claims: Option<Extension<AuthClaims>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let claims =
        require_role_or_scope(claims.as_ref().map(|ext| &ext.0), WRITE_ROLES, WRITE_SCOPES)?;
    if !state.can_perform(OperationKind::Delete) {
        return Err(ApiError::mode_not_allowed("delete not allowed in current mode"));
    }

    let mut meta = state
        .index
        .get(id)
        .ok_or_else(|| ApiError::not_found(format!("file {id} not found")))?;
    if meta.status == FileStatus::Deleted {
        return Ok(StatusCode::NO_CONTENT);
    }

    meta.status = FileStatus::Deleted;
    state.attrs.write(&meta).await?;
    state.index.update(meta)?;
    state.metrics.inc_file_operation("delete");
    info!(file_id = %id, subject = %claims.subject, "file soft-deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Clone)]
struct StoredPayload {
    file_id: Uuid,
    original_filename: String,
    content_type: String,
    size: i64,
    checksum: String,
}

async fn read_text_field(
    field: axum::extract::multipart::Field<'_>,
    state: &SeState,
    stored: Option<&StoredPayload>,
) -> Result<String, ApiError> {
    match field.text().await {
        Ok(text) => Ok(text),
        Err(err) => {
            cleanup_blob(state, stored).await;
            Err(ApiError::validation(format!("unreadable multipart field: {err}")))
        }
    }
}

async fn cleanup_blob(state: &SeState, stored: Option<&StoredPayload>) {
    if let Some(stored) = stored
        && let Err(err) = state.blobs.delete(&stored.file_id.to_string()).await
    {
        warn!(
            file_id = %stored.file_id,
            error = %err,
            "failed to remove blob during upload cleanup"
        );
    }
}

fn build_metadata(
    stored: StoredPayload,
    claims: &AuthClaims,
    description: Option<String>,
    tags: Option<Vec<String>>,
    retention_raw: Option<&str>,
    ttl_days: Option<i64>,
) -> Result<FileMetadata, ApiError> {
    validate_mutable_fields(description.as_deref(), tags.as_deref())?;

    let retention_policy = match retention_raw {
        None | Some("") => RetentionPolicy::Permanent,
        Some(raw) => raw
            .parse::<RetentionPolicy>()
            .map_err(|_| ApiError::validation(format!("unknown retention_policy '{raw}'")))?,
    };

    let uploaded_at = Utc::now();
    let (ttl_days, expires_at) = match retention_policy {
        RetentionPolicy::Temporary => {
            let days = ttl_days
                .ok_or_else(|| ApiError::validation("temporary retention requires ttl_days"))?;
            if days < 1 {
                return Err(ApiError::validation("ttl_days must be at least 1"));
            }
            (Some(days), Some(uploaded_at + ChronoDuration::days(days)))
        }
        RetentionPolicy::Permanent => {
            if ttl_days.is_some() {
                return Err(ApiError::validation(
                    "permanent retention does not accept ttl_days",
                ));
            }
            (None, None)
        }
    };

    Ok(FileMetadata {
        file_id: stored.file_id,
        original_filename: stored.original_filename,
        storage_path: stored.file_id.to_string(),
        content_type: stored.content_type,
        size: stored.size,
        checksum: stored.checksum,
        uploaded_by: claims
            .preferred_username
            .clone()
            .unwrap_or_else(|| claims.subject.clone()),
        uploaded_at,
        status: FileStatus::Active,
        retention_policy,
        ttl_days,
        expires_at,
        description,
        tags,
    })
}

fn validate_mutable_fields(
    description: Option<&str>,
    tags: Option<&[String]>,
) -> Result<(), ApiError> {
    if let Some(description) = description
        && description.chars().count() > MAX_DESCRIPTION_CHARS
    {
        return Err(ApiError::validation(format!(
            "description exceeds {MAX_DESCRIPTION_CHARS} characters"
        )));
    }
    if let Some(tags) = tags {
        if tags.len() > MAX_TAGS {
            return Err(ApiError::validation(format!("more than {MAX_TAGS} tags")));
        }
        if let Some(oversized) = tags.iter().find(|tag| tag.chars().count() > MAX_TAG_CHARS) {
            return Err(ApiError::validation(format!(
                "tag '{oversized}' exceeds {MAX_TAG_CHARS} characters"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temporary_requires_ttl() {
        let stored = StoredPayload {
            file_id: Uuid::new_v4(),
            original_filename: "a.bin".to_string(),
            content_type: "application/octet-stream".to_string(),
            size: 1,
            checksum: "00".repeat(32),
        };
        let claims = AuthClaims {
            subject: "svc".to_string(),
            subject_type: artstore_model::SubjectType::ServiceAccount,
            preferred_username: None,
            email: None,
            roles: Vec::new(),
            groups: Vec::new(),
            idp_role: None,
            role_override: None,
            effective_role: None,
            scopes: vec!["files:write".to_string()],
            client_id: Some("sa_uploader_00000000".to_string()),
        };
        let result = build_metadata(stored.clone(), &claims, None, None, Some("temporary"), None);
        let err = result.expect_err("temporary without ttl_days must fail");
        assert_eq!(err.code, artstore_model::ErrorCode::ValidationError);

        let ok = build_metadata(stored.clone(), &claims, None, None, Some("temporary"), Some(7))
            .expect("metadata");
        assert_eq!(ok.ttl_days, Some(7));
        let expires = ok.expires_at.expect("expires_at set");
        assert_eq!(expires, ok.uploaded_at + ChronoDuration::days(7));

        let rejected =
            build_metadata(stored, &claims, None, None, Some("permanent"), Some(7));
        assert!(rejected.is_err());
    }

    #[test]
    fn mutable_field_limits_are_enforced() {
        assert!(validate_mutable_fields(Some(&"x".repeat(1025)), None).is_err());
        assert!(validate_mutable_fields(Some("fine"), None).is_ok());
        let too_many: Vec<String> = (0..33).map(|i| format!("tag-{i}")).collect();
        assert!(validate_mutable_fields(None, Some(&too_many)).is_err());
        let oversized = vec!["y".repeat(65)];
        assert!(validate_mutable_fields(None, Some(&oversized)).is_err());
    }
}
