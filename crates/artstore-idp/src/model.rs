//! Wire shapes for the provider's admin REST surface.

use serde::{Deserialize, Serialize};

/// Client as represented by the provider's admin API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRepresentation {
    /// Provider-internal identifier.
    pub id: String,
    /// OAuth client id.
    pub client_id: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Scope names granted by default.
    #[serde(default)]
    pub default_client_scopes: Vec<String>,
    /// Whether the account is enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

const fn default_enabled() -> bool {
    true
}

/// Payload for creating a provider client.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewClient {
    /// OAuth client id.
    pub client_id: String,
    /// Display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Scope names granted by default.
    pub default_client_scopes: Vec<String>,
    /// Client-credential accounts are always service accounts.
    pub service_accounts_enabled: bool,
}

/// Secret material returned by the secret endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecret {
    /// The secret value; returned exactly once per rotation.
    pub value: String,
}

/// User as represented by the provider's admin API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRepresentation {
    /// Provider-internal identifier.
    pub id: String,
    /// Login name.
    pub username: String,
    /// Email address.
    #[serde(default)]
    pub email: Option<String>,
    /// Whether the account is enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}
