//! Remote key-set fetch, background refresh, and RS256 token validation.
//!
//! The validator starts even when the first fetch fails and refreshes the
//! cached key set in the background; validation always observes the
//! last-known good set and never blocks on the refresh.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use artstore_config::AuthKeysConfig;
use axum::http::HeaderMap;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::claims::RawClaims;
use crate::error::{AuthError, AuthResult};

#[derive(Debug, Deserialize)]
struct JwksDocument {
    #[serde(default)]
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kty: String,
    kid: Option<String>,
    n: Option<String>,
    e: Option<String>,
}

struct ValidatorInner {
    client: reqwest::Client,
    config: AuthKeysConfig,
    keyed: RwLock<HashMap<String, DecodingKey>>,
    unkeyed: RwLock<Vec<DecodingKey>>,
}

/// Validator over a remotely hosted JSON Web Key Set.
#[derive(Clone)]
pub struct KeySetValidator {
    inner: Arc<ValidatorInner>,
}

/// Extract the bearer token from the `Authorization` header. The `Bearer `
/// prefix is matched case-insensitively.
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

impl KeySetValidator {
    /// Construct the validator and attempt an initial fetch. A failed first
    /// fetch is logged and tolerated; the background refresh will retry.
    pub async fn start(client: reqwest::Client, config: AuthKeysConfig) -> Self {
        let validator = Self {
            inner: Arc::new(ValidatorInner {
                client,
                config,
                keyed: RwLock::new(HashMap::new()),
                unkeyed: RwLock::new(Vec::new()),
            }),
        };
        match validator.refresh().await {
            Ok(count) => info!(keys = count, "initial key set loaded"),
            Err(err) => warn!(error = %err, "initial key set fetch failed; starting anyway"),
        }
        validator
    }

    /// Fetch the key set and replace the cache. Returns the number of usable
    /// keys.
    ///
    /// # Errors
    ///
    /// Returns an error when the fetch or parse fails; the previous cache is
    /// left untouched in that case.
    pub async fn refresh(&self) -> AuthResult<usize> {
        let url = &self.inner.config.jwks_url;
        let response = self
            .inner
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| AuthError::KeySetFetch {
                url: url.clone(),
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::KeySetStatus {
                url: url.clone(),
                status: status.as_u16(),
            });
        }
        let document: JwksDocument =
            response
                .json()
                .await
                .map_err(|source| AuthError::KeySetFetch {
                    url: url.clone(),
                    source,
                })?;

        let mut keyed = HashMap::new();
        let mut unkeyed = Vec::new();
        for jwk in document.keys {
            if jwk.kty != "RSA" {
                continue;
            }
            let (Some(n), Some(e)) = (&jwk.n, &jwk.e) else {
                continue;
            };
            match DecodingKey::from_rsa_components(n, e) {
                Ok(key) => match jwk.kid {
                    Some(kid) => {
                        keyed.insert(kid, key);
                    }
                    None => unkeyed.push(key),
                },
                Err(err) => {
                    warn!(kid = ?jwk.kid, error = %err, "skipping unusable key");
                }
            }
        }
        let count = keyed.len() + unkeyed.len();

        *self
            .inner
            .keyed
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = keyed;
        *self
            .inner
            .unkeyed
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = unkeyed;
        debug!(keys = count, "key set cache replaced");
        Ok(count)
    }

    /// Refresh the cache on the configured interval until `shutdown` fires.
    pub fn spawn_refresh(&self, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        let validator = self.clone();
        let interval = self.inner.config.refresh_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => {
                        debug!("key set refresh loop stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(err) = validator.refresh().await {
                            warn!(error = %err, "key set refresh failed");
                        }
                    }
                }
            }
        })
    }

    /// Validate a bearer token and return its raw claims.
    ///
    /// Only `RS256` is accepted, an `exp` claim is mandatory, the configured
    /// leeway applies to all time checks, and the configured issuer, when
    /// set, must match.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthError`] describing the rejection; the token itself
    /// is never captured in the error.
    pub fn validate(&self, token: &str) -> AuthResult<RawClaims> {
        let header = decode_header(token).map_err(|_| AuthError::InvalidToken {
            reason: "unparseable_header",
        })?;
        if header.alg != Algorithm::RS256 {
            return Err(AuthError::InvalidToken {
                reason: "algorithm_not_rs256",
            });
        }

        let mut validation = Validation::new(Algorithm::RS256);
        validation.leeway = self.inner.config.leeway.as_secs();
        validation.set_required_spec_claims(&["exp"]);
        if let Some(issuer) = &self.inner.config.issuer {
            validation.set_issuer(&[issuer]);
        }
        validation.validate_aud = false;

        if let Some(kid) = &header.kid {
            let keyed = self
                .inner
                .keyed
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let Some(key) = keyed.get(kid) else {
                return Err(AuthError::UnknownKey { kid: kid.clone() });
            };
            return decode::<RawClaims>(token, key, &validation)
                .map(|data| data.claims)
                .map_err(|source| AuthError::Verification { source });
        }

        let unkeyed = self
            .inner
            .unkeyed
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut last = AuthError::InvalidToken {
            reason: "no_usable_key",
        };
        for key in unkeyed.iter() {
            match decode::<RawClaims>(token, key, &validation) {
                Ok(data) => return Ok(data.claims),
                Err(source) => last = AuthError::Verification { source },
            }
        }
        Err(last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use artstore_test_support::{jwks_document, mint_hs256_token, mint_token};
    use axum::{Json, Router, routing::get};
    use serde_json::json;
    use std::error::Error;
    use std::time::Duration;

    async fn jwks_server() -> Result<(String, tokio::task::JoinHandle<()>), Box<dyn Error>> {
        let app = Router::new().route("/certs", get(|| async { Json(jwks_document()) }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Ok((format!("http://{addr}/certs"), handle))
    }

    async fn validator(issuer: Option<&str>) -> Result<KeySetValidator, Box<dyn Error>> {
        let (jwks_url, _server) = jwks_server().await?;
        let config = AuthKeysConfig {
            jwks_url,
            refresh_interval: Duration::from_secs(300),
            leeway: Duration::from_secs(30),
            issuer: issuer.map(str::to_string),
        };
        let validator = KeySetValidator::start(reqwest::Client::new(), config).await;
        Ok(validator)
    }

    fn exp_in(secs: i64) -> i64 {
        chrono::Utc::now().timestamp() + secs
    }

    #[tokio::test]
    async fn accepts_valid_rs256_token() -> Result<(), Box<dyn Error>> {
        let validator = validator(None).await?;
        let token = mint_token(&json!({
            "sub": "user-1",
            "preferred_username": "alice",
            "exp": exp_in(600),
        }));
        let claims = validator.validate(&token)?;
        assert_eq!(claims.sub.as_deref(), Some("user-1"));
        assert_eq!(claims.preferred_username.as_deref(), Some("alice"));
        Ok(())
    }

    #[tokio::test]
    async fn rejects_non_rs256_algorithms() -> Result<(), Box<dyn Error>> {
        let validator = validator(None).await?;
        let token = mint_hs256_token(&json!({"sub": "user-1", "exp": exp_in(600)}));
        assert!(matches!(
            validator.validate(&token),
            Err(AuthError::InvalidToken {
                reason: "algorithm_not_rs256"
            })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn rejects_expired_tokens_beyond_leeway() -> Result<(), Box<dyn Error>> {
        let validator = validator(None).await?;
        let token = mint_token(&json!({"sub": "user-1", "exp": exp_in(-600)}));
        assert!(matches!(
            validator.validate(&token),
            Err(AuthError::Verification { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn enforces_issuer_when_configured() -> Result<(), Box<dyn Error>> {
        let validator = validator(Some("https://idp.example/realms/artstore")).await?;
        let good = mint_token(&json!({
            "sub": "user-1",
            "iss": "https://idp.example/realms/artstore",
            "exp": exp_in(600),
        }));
        assert!(validator.validate(&good).is_ok());

        let bad = mint_token(&json!({
            "sub": "user-1",
            "iss": "https://rogue.example",
            "exp": exp_in(600),
        }));
        assert!(validator.validate(&bad).is_err());
        Ok(())
    }

    #[tokio::test]
    async fn starts_without_reachable_key_set() {
        let config = AuthKeysConfig {
            jwks_url: "http://127.0.0.1:1/certs".to_string(),
            refresh_interval: Duration::from_secs(300),
            leeway: Duration::from_secs(0),
            issuer: None,
        };
        let validator = KeySetValidator::start(reqwest::Client::new(), config).await;
        let token = mint_token(&json!({"sub": "user-1", "exp": exp_in(600)}));
        assert!(matches!(
            validator.validate(&token),
            Err(AuthError::UnknownKey { .. })
        ));
    }

    #[test]
    fn bearer_extraction_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            "bEaReR abc.def.ghi".parse().expect("header"),
        );
        assert_eq!(bearer_token(&headers), Some("abc.def.ghi"));

        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            "Basic abc".parse().expect("header"),
        );
        assert_eq!(bearer_token(&headers), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }
}
