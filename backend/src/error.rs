use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application-wide error type.
///
/// Variants carry the internal detail; `IntoResponse` decides what actually
/// crosses the wire. Every authentication failure collapses onto one of two
/// fixed 401 bodies so callers cannot probe which step rejected them.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    Conflict(String),

    #[error("invalid credentials")]
    InvalidCredentials,

    /// Password login attempted against a non-local account.
    #[error("password login not supported for this account kind")]
    UnsupportedAuthMethod,

    #[error("unauthenticated")]
    Unauthenticated,

    /// Authenticated but lacking the admin flag.
    #[error("access denied")]
    AccessDenied,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("invalid token signature: {0}")]
    InvalidSignature(String),

    /// Token parsed but carries no session id claim.
    #[error("token carries no session id")]
    MissingSessionClaim,

    /// No live session backs the token.
    #[error("session not found")]
    SessionNotFound,

    #[error("unknown provider: {0}")]
    ProviderNotFound(String),

    /// OIDC callback state does not match the value set at initiation.
    #[error("state mismatch")]
    StateMismatch,

    #[error("user already exists and isn't of kind oidc")]
    KindConflict,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("user lookup failed: {0}")]
    LookupError(String),

    #[error("storage error: {0}")]
    Storage(String),

    /// Upstream OIDC provider failure (discovery, token exchange, JWKS).
    #[error("{0}")]
    Oidc(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::InvalidCredentials | ApiError::UnsupportedAuthMethod => {
                (StatusCode::UNAUTHORIZED, "invalid credentials".to_string())
            }
            ApiError::Unauthenticated
            | ApiError::InvalidToken(_)
            | ApiError::InvalidSignature(_)
            | ApiError::MissingSessionClaim
            | ApiError::SessionNotFound => (StatusCode::UNAUTHORIZED, "unauthenticated".to_string()),
            ApiError::AccessDenied => (StatusCode::UNAUTHORIZED, self.to_string()),
            ApiError::NotFound(_) | ApiError::ProviderNotFound(_) => {
                (StatusCode::NOT_FOUND, self.to_string())
            }
            ApiError::Conflict(_) => (StatusCode::CONFLICT, self.to_string()),
            ApiError::StateMismatch | ApiError::KindConflict | ApiError::InvalidRequest(_) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            ApiError::Oidc(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            ApiError::LookupError(_) | ApiError::Storage(_) | ApiError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
        };

        if status.is_server_error() {
            tracing::error!(status = %status.as_u16(), "Request failed: {}", self);
        }

        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(e: rusqlite::Error) -> Self {
        ApiError::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(e: ApiError) -> StatusCode {
        e.into_response().status()
    }

    #[test]
    fn test_auth_failures_are_401() {
        assert_eq!(status_of(ApiError::InvalidCredentials), StatusCode::UNAUTHORIZED);
        assert_eq!(status_of(ApiError::Unauthenticated), StatusCode::UNAUTHORIZED);
        assert_eq!(status_of(ApiError::SessionNotFound), StatusCode::UNAUTHORIZED);
        assert_eq!(status_of(ApiError::AccessDenied), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_conflict_is_409() {
        assert_eq!(status_of(ApiError::Conflict("user".to_string())), StatusCode::CONFLICT);
    }

    #[test]
    fn test_provider_failures_are_502() {
        assert_eq!(
            status_of(ApiError::Oidc("discovery failed".to_string())),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_storage_errors_are_500() {
        let response = ApiError::Storage("no such table: users".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
