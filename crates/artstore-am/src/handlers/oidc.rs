//! Authorization Code + PKCE endpoints for the admin UI session.

use std::sync::Arc;

use artstore_auth::build_claims;
use axum::{
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Redirect, Response},
};
use chrono::{Duration as ChronoDuration, Utc};
use serde::Deserialize;
use tracing::{info, warn};
use url::Url;

use crate::error::ApiError;
use crate::session::{
    SESSION_COOKIE, SessionData, TokenExchange, code_challenge, random_token,
    session_id_from_cookies,
};
use crate::state::AmState;

pub(crate) async fn login(State(state): State<Arc<AmState>>) -> Result<Response, ApiError> {
    let code_verifier = random_token();
    let challenge = code_challenge(&code_verifier);
    let login_state = state.sessions.begin_login(code_verifier);

    let authorize = format!(
        "{}/realms/{}/protocol/openid-connect/auth",
        state.oidc.url, state.oidc.realm
    );
    let url = Url::parse_with_params(
        &authorize,
        &[
            ("client_id", state.oidc.client_id.as_str()),
            ("redirect_uri", state.oidc.redirect_url.as_str()),
            ("response_type", "code"),
            ("scope", "openid profile email"),
            ("state", login_state.as_str()),
            ("code_challenge", challenge.as_str()),
            ("code_challenge_method", "S256"),
        ],
    )
    .map_err(|_| ApiError::internal("failed to build authorize url"))?;

    Ok(Redirect::to(url.as_str()).into_response())
}

#[derive(Debug, Deserialize)]
pub(crate) struct CallbackQuery {
    code: String,
    state: String,
}

pub(crate) async fn callback(
    State(state): State<Arc<AmState>>,
    Query(query): Query<CallbackQuery>,
) -> Result<Response, ApiError> {
    let pending = state
        .sessions
        .take_pending(&query.state)
        .ok_or_else(|| ApiError::unauthorized("unknown or expired login state"))?;

    let token_url = format!(
        "{}/realms/{}/protocol/openid-connect/token",
        state.oidc.url, state.oidc.realm
    );
    let response = state
        .http
        .post(&token_url)
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", query.code.as_str()),
            ("redirect_uri", state.oidc.redirect_url.as_str()),
            ("client_id", state.oidc.client_id.as_str()),
            ("client_secret", state.oidc.client_secret.as_str()),
            ("code_verifier", pending.code_verifier.as_str()),
        ])
        .send()
        .await
        .map_err(|err| {
            warn!(error = %err, "token exchange failed");
            ApiError::idp_unavailable("token exchange failed")
        })?;
    if !response.status().is_success() {
        warn!(status = %response.status(), "token exchange rejected");
        return Err(ApiError::unauthorized("token exchange rejected"));
    }
    let exchange: TokenExchange = response
        .json()
        .await
        .map_err(|_| ApiError::idp_unavailable("token exchange undecodable"))?;

    let raw = state
        .auth
        .validator
        .validate(&exchange.access_token)
        .map_err(|err| {
            warn!(error = %err, "exchanged token failed validation");
            ApiError::unauthorized("exchanged token failed validation")
        })?;
    let role_override = match &raw.sub {
        Some(sub) => state.auth.overrides.role_override(sub).await,
        None => None,
    };
    let claims = build_claims(&raw, &state.auth.resolver, role_override)
        .map_err(|_| ApiError::unauthorized("exchanged token carries no subject"))?;

    let username = claims
        .preferred_username
        .clone()
        .unwrap_or_else(|| claims.subject.clone());
    let session_id = state.sessions.create(SessionData {
        access_token: exchange.access_token,
        refresh_token: exchange.refresh_token,
        expires_at: Utc::now() + ChronoDuration::seconds(exchange.expires_in),
        username: username.clone(),
        email: claims.email.clone(),
        role: claims.effective_role,
        groups: claims.groups.clone(),
    });
    info!(username = %username, "admin session established");

    let mut response = Redirect::to("/admin").into_response();
    let cookie = format!("{SESSION_COOKIE}={session_id}; Path=/; HttpOnly; SameSite=Lax");
    response.headers_mut().insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&cookie)
            .map_err(|_| ApiError::internal("failed to build session cookie"))?,
    );
    Ok(response)
}

pub(crate) async fn logout(
    State(state): State<Arc<AmState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    if let Some(session_id) = headers
        .get(header::COOKIE)
        .and_then(|value| value.to_str().ok())
        .and_then(session_id_from_cookies)
    {
        state.sessions.remove(&session_id);
    }

    let end_session = format!(
        "{}/realms/{}/protocol/openid-connect/logout",
        state.oidc.url, state.oidc.realm
    );
    let mut response = Response::builder()
        .status(StatusCode::SEE_OTHER)
        .header(header::LOCATION, end_session)
        .body(axum::body::Body::empty())
        .map_err(|_| ApiError::internal("failed to build logout response"))?;
    let expired = format!("{SESSION_COOKIE}=; Path=/; HttpOnly; Max-Age=0");
    response.headers_mut().insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&expired)
            .map_err(|_| ApiError::internal("failed to clear session cookie"))?,
    );
    Ok(response)
}
