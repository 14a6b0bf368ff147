//! Service-account CRUD with compensating cleanups across the identity
//! provider and the local table.

use std::sync::Arc;

use artstore_auth::require_role_or_scope;
use artstore_data::NewServiceAccount;
use artstore_idp::NewClient;
use artstore_model::{AuthClaims, SaSource, SaStatus, ServiceAccount};
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use once_cell::sync::Lazy;
use rand::RngCore;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::handlers::{READ_ROLES, READ_SCOPES, WRITE_ROLES, WRITE_SCOPES};
use crate::state::AmState;

static NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9 _-]{0,62}$").expect("pattern compiles"));

pub(crate) async fn list(
    State(state): State<Arc<AmState>>,
    claims: Option<Extension<AuthClaims>>,
) -> Result<Json<Vec<ServiceAccount>>, ApiError> {
    require_role_or_scope(claims.as_ref().map(|ext| &ext.0), READ_ROLES, READ_SCOPES)?;
    Ok(Json(state.db.service_accounts().list().await?))
}

pub(crate) async fn get(
    State(state): State<Arc<AmState>>,
    claims: Option<Extension<AuthClaims>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ServiceAccount>, ApiError> {
    require_role_or_scope(claims.as_ref().map(|ext| &ext.0), READ_ROLES, READ_SCOPES)?;
    state
        .db
        .service_accounts()
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("service account {id} not found")))
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateRequest {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    scopes: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreatedResponse {
    service_account: ServiceAccount,
    /// Returned exactly once; subsequent reads require a rotation.
    client_secret: String,
}

pub(crate) async fn create(
    State(state): State<Arc<AmState>>,
    claims: Option<Extension<AuthClaims>>,
    Json(request): Json<CreateRequest>,
) -> Result<(StatusCode, Json<CreatedResponse>), ApiError> {
    let claims =
        require_role_or_scope(claims.as_ref().map(|ext| &ext.0), WRITE_ROLES, WRITE_SCOPES)?;
    let name = request.name.trim().to_lowercase();
    if !NAME_PATTERN.is_match(&name) {
        return Err(ApiError::validation(
            "name must be lowercase alphanumeric with spaces, dashes, or underscores",
        ));
    }
    if request.scopes.is_empty() {
        return Err(ApiError::validation("at least one scope is required"));
    }

    let client_id = format!("{}{}_{}", state.sa_prefix, normalize(&name), hex8());
    if state
        .db
        .service_accounts()
        .get_by_client_id(&client_id)
        .await?
        .is_some()
    {
        return Err(ApiError::conflict(format!(
            "client id {client_id} already exists"
        )));
    }

    let provider_id = state
        .idp
        .create_client(&NewClient {
            client_id: client_id.clone(),
            name: Some(name.clone()),
            description: request.description.clone(),
            default_client_scopes: request.scopes.clone(),
            service_accounts_enabled: true,
        })
        .await?;

    let row = NewServiceAccount {
        id: Uuid::new_v4(),
        keycloak_client_id: Some(provider_id.clone()),
        client_id: client_id.clone(),
        name,
        description: request.description,
        scopes: request.scopes,
        status: SaStatus::Active,
        source: SaSource::Local,
    };
    if let Err(err) = state.db.service_accounts().insert(&row).await {
        // Compensating cleanup: a provider client without a local row would
        // keep resurfacing through the synchronizer.
        if let Err(cleanup) = state.idp.delete_client(&provider_id).await {
            warn!(
                client_id = %client_id,
                error = %cleanup,
                "failed to remove provider client after local insert failure"
            );
        }
        return Err(err.into());
    }

    let secret = state.idp.get_client_secret(&provider_id).await?;
    let service_account = state
        .db
        .service_accounts()
        .get(row.id)
        .await?
        .ok_or_else(|| ApiError::internal("created service account vanished"))?;
    info!(
        client_id = %client_id,
        subject = %claims.subject,
        "service account created"
    );
    Ok((
        StatusCode::CREATED,
        Json(CreatedResponse {
            service_account,
            client_secret: secret.value,
        }),
    ))
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct UpdateRequest {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    scopes: Option<Vec<String>>,
    #[serde(default)]
    status: Option<SaStatus>,
}

pub(crate) async fn update(
    State(state): State<Arc<AmState>>,
    claims: Option<Extension<AuthClaims>>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateRequest>,
) -> Result<Json<ServiceAccount>, ApiError> {
    require_role_or_scope(claims.as_ref().map(|ext| &ext.0), WRITE_ROLES, WRITE_SCOPES)?;
    let account = state
        .db
        .service_accounts()
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("service account {id} not found")))?;

    if let Some(scopes) = &request.scopes {
        if scopes.is_empty() {
            return Err(ApiError::validation("at least one scope is required"));
        }
        state.db.service_accounts().set_scopes(id, scopes).await?;
        if let Some(provider_id) = &account.keycloak_client_id
            && let Err(err) = state.idp.update_client_scopes(provider_id, scopes).await
        {
            warn!(
                client_id = %account.client_id,
                error = %err,
                "provider scope update failed; synchronizer will converge"
            );
        }
    }
    if let Some(status) = request.status {
        state.db.service_accounts().set_status(id, status).await?;
        if let Some(provider_id) = &account.keycloak_client_id
            && let Err(err) = state
                .idp
                .set_client_enabled(provider_id, status == SaStatus::Active)
                .await
        {
            warn!(
                client_id = %account.client_id,
                error = %err,
                "provider enable toggle failed"
            );
        }
    }
    if let Some(description) = &request.description {
        state
            .db
            .service_accounts()
            .set_description(id, Some(description))
            .await?;
    }

    state
        .db
        .service_accounts()
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::internal("updated service account vanished"))
}

pub(crate) async fn delete(
    State(state): State<Arc<AmState>>,
    claims: Option<Extension<AuthClaims>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let claims =
        require_role_or_scope(claims.as_ref().map(|ext| &ext.0), WRITE_ROLES, WRITE_SCOPES)?;
    let account = state
        .db
        .service_accounts()
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("service account {id} not found")))?;

    if let Some(provider_id) = &account.keycloak_client_id {
        match state.idp.delete_client(provider_id).await {
            Ok(()) => {}
            Err(artstore_idp::IdpError::Status { status: 404, .. }) => {}
            Err(err) => return Err(err.into()),
        }
    }
    state.db.service_accounts().delete(id).await?;
    info!(
        client_id = %account.client_id,
        subject = %claims.subject,
        "service account deleted"
    );
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub(crate) struct RotatedResponse {
    client_id: String,
    client_secret: String,
}

pub(crate) async fn rotate_secret(
    State(state): State<Arc<AmState>>,
    claims: Option<Extension<AuthClaims>>,
    Path(id): Path<Uuid>,
) -> Result<Json<RotatedResponse>, ApiError> {
    let claims =
        require_role_or_scope(claims.as_ref().map(|ext| &ext.0), WRITE_ROLES, WRITE_SCOPES)?;
    let account = state
        .db
        .service_accounts()
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("service account {id} not found")))?;
    let provider_id = account.keycloak_client_id.as_deref().ok_or_else(|| {
        ApiError::conflict("service account has not been pushed to the provider yet")
    })?;

    let secret = state.idp.rotate_client_secret(provider_id).await?;
    info!(
        client_id = %account.client_id,
        subject = %claims.subject,
        "service account secret rotated"
    );
    Ok(Json(RotatedResponse {
        client_id: account.client_id,
        client_secret: secret.value,
    }))
}

fn normalize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn hex8() -> String {
    let mut bytes = [0u8; 4];
    rand::rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_ids_follow_the_naming_rule() {
        let suffix = hex8();
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(normalize("backup agent-2"), "backup_agent_2");
    }

    #[test]
    fn name_pattern_rejects_uppercase_and_symbols() {
        assert!(NAME_PATTERN.is_match("backup agent-2"));
        assert!(!NAME_PATTERN.is_match("Backup"));
        assert!(!NAME_PATTERN.is_match(" leading"));
        assert!(!NAME_PATTERN.is_match(""));
    }
}
