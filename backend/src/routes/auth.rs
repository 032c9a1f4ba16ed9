//! Login, logout, and the OIDC flow endpoints.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AUTH_TOKEN_HEADER;
use crate::config::Config;
use crate::error::{ApiError, Result};
use crate::AppState;

/// Cookie carrying the anti-forgery state between initiation and callback.
const STATE_COOKIE: &str = "oidc-state";
const STATE_COOKIE_MAX_AGE_SECS: u32 = 600;

#[derive(Debug, Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    token: String,
}

#[derive(Debug, Serialize)]
struct LogoutResponse {
    ok: bool,
}

#[derive(Debug, Serialize)]
struct AuthUrlResponse {
    url: String,
}

#[derive(Debug, Serialize)]
struct CallbackResponse {
    token: String,
    username: String,
}

#[derive(Debug, Serialize)]
struct ProviderEntry {
    name: String,
    display_name: String,
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    #[serde(default)]
    state: String,
    #[serde(default)]
    code: String,
}

/// POST /auth/login
async fn login(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    let user = state.users.authenticate(&body.username, &body.password)?;
    let token = state.sessions.issue(&user)?;
    Ok(Json(LoginResponse { token }))
}

/// POST /auth/logout
///
/// Reads the token straight from the header rather than going through the
/// auth middleware: a token whose session already expired can still be
/// presented here.
async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<LogoutResponse>> {
    let token = headers
        .get(AUTH_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|t| !t.is_empty())
        .ok_or(ApiError::Unauthenticated)?;

    state.sessions.revoke(token)?;
    Ok(Json(LogoutResponse { ok: true }))
}

/// GET /auth/oidc/providers
async fn list_providers(State(state): State<Arc<AppState>>) -> Result<Json<Vec<ProviderEntry>>> {
    let providers = state
        .store
        .list_active_providers()?
        .into_iter()
        .map(|p| ProviderEntry {
            name: p.name,
            display_name: p.display_name,
        })
        .collect();
    Ok(Json(providers))
}

/// GET /auth/oidc/:provider
///
/// Starts an OIDC login: returns the provider authorization URL and plants
/// the state cookie the callback later checks.
async fn oidc_initiate(
    State(state): State<Arc<AppState>>,
    Path(provider_name): Path<String>,
    headers: HeaderMap,
) -> Result<Response> {
    if state.config.security.oidc.is_none() {
        return Err(ApiError::ProviderNotFound(provider_name));
    }

    let provider = state.oidc.provider(&provider_name)?;
    let redirect_url = callback_url(&state.config, &headers, &provider.name);

    let login_state = Uuid::new_v4().to_string();
    let url = state
        .oidc
        .authorization_url(&provider, &redirect_url, &login_state)
        .await?;

    let mut response = Json(AuthUrlResponse { url }).into_response();
    response
        .headers_mut()
        .insert(header::SET_COOKIE, state_cookie(&login_state)?);
    Ok(response)
}

/// GET /auth/callback/:provider
///
/// Completes an OIDC login: checks the state cookie, redeems the code,
/// maps the verified claims onto an account, and issues a session.
async fn oidc_callback(
    State(state): State<Arc<AppState>>,
    Path(provider_name): Path<String>,
    Query(query): Query<CallbackQuery>,
    headers: HeaderMap,
) -> Result<Json<CallbackResponse>> {
    if !state.config.security.debug {
        let expected = cookie_value(&headers, STATE_COOKIE).ok_or(ApiError::StateMismatch)?;
        if query.state != expected {
            return Err(ApiError::StateMismatch);
        }
    }

    let provider = state.oidc.provider(&provider_name)?;
    let redirect_url = callback_url(&state.config, &headers, &provider.name);

    let claims = state
        .oidc
        .exchange_code(&provider, &query.code, &redirect_url)
        .await?;
    let user = state.oidc.resolve_user(&state.users, &claims)?;
    let token = state.sessions.issue(&user)?;

    Ok(Json(CallbackResponse {
        token,
        username: user.username,
    }))
}

/// Computes the redirect URL for a provider. Initiation and code exchange
/// must send the identical value, so both go through here.
fn callback_url(config: &Config, headers: &HeaderMap, provider: &str) -> String {
    let base = match &config.http.public_url {
        Some(url) => url.trim_end_matches('/').to_string(),
        None => {
            let host = headers
                .get(header::HOST)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("localhost");
            format!("http://{host}")
        }
    };
    format!("{base}/auth/callback/{provider}")
}

fn state_cookie(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(&format!(
        "{STATE_COOKIE}={value}; Max-Age={STATE_COOKIE_MAX_AGE_SECS}; Path=/; HttpOnly; SameSite=Lax"
    ))
    .map_err(|e| ApiError::Internal(format!("invalid cookie value: {e}")))
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    for part in cookies.split(';') {
        if let Some((key, value)) = part.trim().split_once('=') {
            if key == name {
                return Some(value.to_string());
            }
        }
    }
    None
}

/// Build the authentication router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/oidc/providers", get(list_providers))
        .route("/auth/oidc/:provider", get(oidc_initiate))
        .route("/auth/callback/:provider", get(oidc_callback))
        .with_state(state)
}
