//! Admin REST client with a mutex-guarded client-credentials token cache.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{IdpError, IdpResult};
use crate::model::{ClientRepresentation, ClientSecret, NewClient, UserRepresentation};

/// The cached token is refreshed this long before its reported expiry.
const REFRESH_MARGIN: Duration = Duration::from_secs(30);

/// Connection settings for the admin client.
#[derive(Debug, Clone)]
pub struct IdpAdminConfig {
    /// Base URL of the provider.
    pub base_url: String,
    /// Realm name.
    pub realm: String,
    /// Client id used for the client-credentials grant.
    pub client_id: String,
    /// Client secret for the grant.
    pub client_secret: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

struct ClientInner {
    http: Client,
    config: IdpAdminConfig,
    token: Mutex<Option<CachedToken>>,
}

/// Token-cached client over the provider's admin REST surface.
#[derive(Clone)]
pub struct IdpAdminClient {
    inner: Arc<ClientInner>,
}

impl IdpAdminClient {
    /// Wrap an HTTP client and connection settings.
    #[must_use]
    pub fn new(http: Client, config: IdpAdminConfig) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                http,
                config,
                token: Mutex::new(None),
            }),
        }
    }

    /// Whether the provider's realm endpoint answers at all.
    pub async fn is_reachable(&self) -> bool {
        let url = format!(
            "{}/realms/{}",
            self.inner.config.base_url, self.inner.config.realm
        );
        matches!(
            self.inner.http.get(url).send().await,
            Ok(response) if response.status().is_success()
        )
    }

    /// Clients whose OAuth client id starts with `prefix`.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or an error status.
    pub async fn list_clients_by_prefix(
        &self,
        prefix: &str,
    ) -> IdpResult<Vec<ClientRepresentation>> {
        let response = self
            .request(Method::GET, "clients")
            .await?
            .query(&[("clientId", prefix), ("search", "true")])
            .send()
            .await
            .map_err(|source| IdpError::Transport { source })?;
        let clients: Vec<ClientRepresentation> = decode(check(response).await?).await?;
        Ok(clients
            .into_iter()
            .filter(|client| client.client_id.starts_with(prefix))
            .collect())
    }

    /// One client by provider-internal id.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or an error status.
    pub async fn get_client(&self, id: &str) -> IdpResult<ClientRepresentation> {
        let response = self
            .request(Method::GET, &format!("clients/{id}"))
            .await?
            .send()
            .await
            .map_err(|source| IdpError::Transport { source })?;
        decode(check(response).await?).await
    }

    /// Create a client, returning the provider's internal id parsed from the
    /// `Location` response header.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, an error status, or a missing
    /// `Location` header.
    pub async fn create_client(&self, client: &NewClient) -> IdpResult<String> {
        let response = self
            .request(Method::POST, "clients")
            .await?
            .json(client)
            .send()
            .await
            .map_err(|source| IdpError::Transport { source })?;
        let response = check(response).await?;
        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(IdpError::MissingLocation)?;
        let id = location
            .rsplit('/')
            .next()
            .filter(|segment| !segment.is_empty())
            .ok_or(IdpError::MissingLocation)?;
        debug!(client_id = %client.client_id, "provider client created");
        Ok(id.to_string())
    }

    /// Replace a client's default scope set.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or an error status.
    pub async fn update_client_scopes(&self, id: &str, scopes: &[String]) -> IdpResult<()> {
        let mut client = self.get_client(id).await?;
        client.default_client_scopes = scopes.to_vec();
        let response = self
            .request(Method::PUT, &format!("clients/{id}"))
            .await?
            .json(&client)
            .send()
            .await
            .map_err(|source| IdpError::Transport { source })?;
        check(response).await?;
        Ok(())
    }

    /// Enable or disable a client.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or an error status.
    pub async fn set_client_enabled(&self, id: &str, enabled: bool) -> IdpResult<()> {
        let mut client = self.get_client(id).await?;
        client.enabled = enabled;
        let response = self
            .request(Method::PUT, &format!("clients/{id}"))
            .await?
            .json(&client)
            .send()
            .await
            .map_err(|source| IdpError::Transport { source })?;
        check(response).await?;
        Ok(())
    }

    /// Delete a client.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or an error status.
    pub async fn delete_client(&self, id: &str) -> IdpResult<()> {
        let response = self
            .request(Method::DELETE, &format!("clients/{id}"))
            .await?
            .send()
            .await
            .map_err(|source| IdpError::Transport { source })?;
        check(response).await?;
        Ok(())
    }

    /// Current secret of a client.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or an error status.
    pub async fn get_client_secret(&self, id: &str) -> IdpResult<ClientSecret> {
        let response = self
            .request(Method::GET, &format!("clients/{id}/client-secret"))
            .await?
            .send()
            .await
            .map_err(|source| IdpError::Transport { source })?;
        decode(check(response).await?).await
    }

    /// Regenerate a client's secret, returning the new value.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or an error status.
    pub async fn rotate_client_secret(&self, id: &str) -> IdpResult<ClientSecret> {
        let response = self
            .request(Method::POST, &format!("clients/{id}/client-secret"))
            .await?
            .send()
            .await
            .map_err(|source| IdpError::Transport { source })?;
        decode(check(response).await?).await
    }

    /// Users matching an exact username.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or an error status.
    pub async fn find_users(&self, username: &str) -> IdpResult<Vec<UserRepresentation>> {
        let response = self
            .request(Method::GET, "users")
            .await?
            .query(&[("username", username), ("exact", "true")])
            .send()
            .await
            .map_err(|source| IdpError::Transport { source })?;
        decode(check(response).await?).await
    }

    /// One user by provider-internal id, when present.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or an error status other than
    /// not-found.
    pub async fn get_user(&self, id: &str) -> IdpResult<Option<UserRepresentation>> {
        let response = self
            .request(Method::GET, &format!("users/{id}"))
            .await?
            .send()
            .await
            .map_err(|source| IdpError::Transport { source })?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(decode(check(response).await?).await?))
    }

    /// Currently valid client-credentials token, for callers that attach it
    /// to non-admin requests (for example Storage Element calls).
    ///
    /// # Errors
    ///
    /// Returns an error if a refresh is needed and fails.
    pub async fn bearer_token(&self) -> IdpResult<String> {
        self.access_token().await
    }

    async fn request(&self, method: Method, path: &str) -> IdpResult<RequestBuilder> {
        let token = self.access_token().await?;
        let url = format!(
            "{}/admin/realms/{}/{path}",
            self.inner.config.base_url, self.inner.config.realm
        );
        Ok(self.inner.http.request(method, url).bearer_auth(token))
    }

    /// Cached access token, refreshed under the mutex shortly before its
    /// reported expiry; only one refresh is ever in flight.
    async fn access_token(&self) -> IdpResult<String> {
        let mut guard = self.inner.token.lock().await;
        if let Some(cached) = guard.as_ref()
            && cached.expires_at > Instant::now() + REFRESH_MARGIN
        {
            return Ok(cached.access_token.clone());
        }

        let url = format!(
            "{}/realms/{}/protocol/openid-connect/token",
            self.inner.config.base_url, self.inner.config.realm
        );
        let response = self
            .inner
            .http
            .post(url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.inner.config.client_id.as_str()),
                ("client_secret", self.inner.config.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|source| IdpError::Transport { source })?;
        let token: TokenResponse = decode(check(response).await?).await?;

        let access_token = token.access_token.clone();
        *guard = Some(CachedToken {
            access_token: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        });
        debug!("provider access token refreshed");
        Ok(access_token)
    }
}

async fn check(response: Response) -> IdpResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(IdpError::Status {
        status: status.as_u16(),
        body,
    })
}

async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> IdpResult<T> {
    response
        .json()
        .await
        .map_err(|source| IdpError::Decode { source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Json, Router,
        extract::State as AxumState,
        http::{HeaderMap, StatusCode as AxumStatus},
        response::IntoResponse,
        routing::{get, post},
    };
    use serde_json::json;
    use std::error::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeIdp {
        token_requests: AtomicUsize,
    }

    async fn fake_server(state: Arc<FakeIdp>) -> Result<String, Box<dyn Error>> {
        let app = Router::new()
            .route(
                "/realms/master/protocol/openid-connect/token",
                post(|AxumState(state): AxumState<Arc<FakeIdp>>| async move {
                    state.token_requests.fetch_add(1, Ordering::SeqCst);
                    Json(json!({"access_token": "token-1", "expires_in": 3600}))
                }),
            )
            .route(
                "/admin/realms/master/clients",
                get(|headers: HeaderMap| async move {
                    if headers
                        .get("authorization")
                        .and_then(|value| value.to_str().ok())
                        != Some("Bearer token-1")
                    {
                        return (AxumStatus::UNAUTHORIZED, Json(json!([]))).into_response();
                    }
                    Json(json!([
                        {"id": "internal-1", "clientId": "sa_backup_0a1b2c3d",
                         "defaultClientScopes": ["files:read"]},
                        {"id": "internal-2", "clientId": "unrelated-client"},
                    ]))
                    .into_response()
                })
                .post(|| async {
                    (
                        [(
                            "location",
                            "http://idp/admin/realms/master/clients/internal-9",
                        )],
                        AxumStatus::CREATED,
                    )
                }),
            )
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Ok(format!("http://{addr}"))
    }

    fn client(base_url: String) -> IdpAdminClient {
        IdpAdminClient::new(
            Client::new(),
            IdpAdminConfig {
                base_url,
                realm: "master".to_string(),
                client_id: "artstore-am".to_string(),
                client_secret: "s3cr3t".to_string(),
            },
        )
    }

    #[tokio::test]
    async fn caches_the_token_across_calls() -> Result<(), Box<dyn Error>> {
        let fake = Arc::new(FakeIdp::default());
        let client = client(fake_server(Arc::clone(&fake)).await?);

        client.list_clients_by_prefix("sa_").await?;
        client.list_clients_by_prefix("sa_").await?;
        assert_eq!(fake.token_requests.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn prefix_listing_filters_client_ids() -> Result<(), Box<dyn Error>> {
        let fake = Arc::new(FakeIdp::default());
        let client = client(fake_server(fake).await?);

        let clients = client.list_clients_by_prefix("sa_").await?;
        assert_eq!(clients.len(), 1);
        assert_eq!(clients[0].client_id, "sa_backup_0a1b2c3d");
        assert_eq!(clients[0].default_client_scopes, vec!["files:read"]);
        Ok(())
    }

    #[tokio::test]
    async fn create_client_parses_the_location_header() -> Result<(), Box<dyn Error>> {
        let fake = Arc::new(FakeIdp::default());
        let client = client(fake_server(fake).await?);

        let id = client
            .create_client(&NewClient {
                client_id: "sa_new_00000000".to_string(),
                name: Some("new".to_string()),
                description: None,
                default_client_scopes: vec!["files:read".to_string()],
                service_accounts_enabled: true,
            })
            .await?;
        assert_eq!(id, "internal-9");
        Ok(())
    }

    #[tokio::test]
    async fn error_statuses_surface_status_and_body() {
        let client = client("http://127.0.0.1:1".to_string());
        let result = client.list_clients_by_prefix("sa_").await;
        assert!(matches!(result, Err(IdpError::Transport { .. })));
    }
}
