//! Request authentication middleware.
//!
//! Callers present a signed token in either the `X-AUTH-TOKEN` header
//! (interactive sessions) or the `X-API-KEY` header (programmatic access).
//! Both carry the same token format and go through the same verification.
//! Whichever header is present first decides the path; an invalid value in
//! one never falls through to the other.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::ApiError;
use crate::models::{Session, User};
use crate::AppState;

pub const AUTH_TOKEN_HEADER: &str = "X-AUTH-TOKEN";
pub const API_KEY_HEADER: &str = "X-API-KEY";

/// Authenticated caller, attached to the request extensions for handlers.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user: User,
    pub session: Session,
}

/// Middleware requiring a valid token.
pub async fn require_user(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    authorize(state, request, next, false).await
}

/// Middleware requiring a valid token belonging to an admin.
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    authorize(state, request, next, true).await
}

async fn authorize(
    state: Arc<AppState>,
    mut request: Request,
    next: Next,
    requires_admin: bool,
) -> Response {
    let token = match presented_token(request.headers()) {
        Some(token) => token,
        None => return ApiError::Unauthenticated.into_response(),
    };

    let (session, user) = match state.sessions.verify(&token) {
        Ok(resolved) => resolved,
        Err(e) => {
            tracing::debug!("Token verification failed: {}", e);
            return ApiError::Unauthenticated.into_response();
        }
    };

    if requires_admin && !user.admin {
        return ApiError::AccessDenied.into_response();
    }

    request.extensions_mut().insert(Identity { user, session });
    next.run(request).await
}

fn presented_token(headers: &HeaderMap) -> Option<String> {
    for header in [AUTH_TOKEN_HEADER, API_KEY_HEADER] {
        if let Some(value) = headers.get(header) {
            // Present but unreadable still claims this path.
            return value.to_str().ok().map(str::to_string);
        }
    }
    None
}
