//! Browser sessions and the Authorization Code + PKCE flow.
//!
//! Sessions live in memory, keyed by a random cookie id; pending logins are
//! tracked by their `state` parameter until the callback exchanges the code.
//! The HTML rendering on top of these endpoints is an external concern.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use artstore_model::Role;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::RngCore;
use serde::Deserialize;
use sha2::{Digest, Sha256};

/// Name of the session cookie.
pub(crate) const SESSION_COOKIE: &str = "artstore_session";

/// Per-browser session established at the OIDC callback.
#[derive(Debug, Clone)]
pub struct SessionData {
    /// Access token issued by the provider; never logged.
    pub access_token: String,
    /// Refresh token, when issued.
    pub refresh_token: Option<String>,
    /// Access-token expiry.
    pub expires_at: DateTime<Utc>,
    /// Preferred username.
    pub username: String,
    /// Email, when present.
    pub email: Option<String>,
    /// Effective role at login time.
    pub role: Option<Role>,
    /// Group memberships at login time.
    pub groups: Vec<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct PendingLogin {
    pub(crate) code_verifier: String,
    pub(crate) started_at: DateTime<Utc>,
}

#[derive(Default)]
struct SessionInner {
    sessions: HashMap<String, SessionData>,
    pending: HashMap<String, PendingLogin>,
}

/// In-memory session store shared across handlers.
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<Mutex<SessionInner>>,
}

impl SessionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a pending login and return its `state` parameter.
    pub(crate) fn begin_login(&self, code_verifier: String) -> String {
        let state = random_token();
        self.lock().pending.insert(
            state.clone(),
            PendingLogin {
                code_verifier,
                started_at: Utc::now(),
            },
        );
        state
    }

    /// Consume a pending login by its `state` parameter. Logins older than
    /// ten minutes are dropped.
    pub(crate) fn take_pending(&self, state: &str) -> Option<PendingLogin> {
        let mut inner = self.lock();
        let cutoff = Utc::now() - ChronoDuration::minutes(10);
        inner.pending.retain(|_, login| login.started_at > cutoff);
        inner.pending.remove(state)
    }

    /// Create a session and return its cookie id.
    pub(crate) fn create(&self, data: SessionData) -> String {
        let id = random_token();
        self.lock().sessions.insert(id.clone(), data);
        id
    }

    /// Session for a cookie id, dropping it when the token has expired.
    pub(crate) fn get(&self, id: &str) -> Option<SessionData> {
        let mut inner = self.lock();
        match inner.sessions.get(id) {
            Some(data) if data.expires_at > Utc::now() => Some(data.clone()),
            Some(_) => {
                inner.sessions.remove(id);
                None
            }
            None => None,
        }
    }

    /// Remove a session.
    pub(crate) fn remove(&self, id: &str) {
        self.lock().sessions.remove(id);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionInner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// URL-safe random token for session ids, states, and code verifiers.
pub(crate) fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// S256 code challenge for a PKCE verifier.
pub(crate) fn code_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// Token response of the authorization-code exchange.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenExchange {
    pub(crate) access_token: String,
    #[serde(default)]
    pub(crate) refresh_token: Option<String>,
    pub(crate) expires_in: i64,
}

/// Extract the session cookie id from a `Cookie` header value.
pub(crate) fn session_id_from_cookies(cookies: &str) -> Option<String> {
    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE).then(|| value.to_string())
    })
}
