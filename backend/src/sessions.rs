//! Session tokens and their server-side lifecycle.
//!
//! Tokens are ES256-signed JWTs carrying a session id. A signature alone is
//! never enough to authenticate: the session row it points at must still
//! exist and be unexpired, which is what makes logout take effect before
//! the token itself expires.

use std::sync::Arc;

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rcgen::KeyPair;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiError, Result};
use crate::models::{Session, User};
use crate::store::Store;

/// Value stamped into both the issuer and audience claims.
pub const TOKEN_ISSUER: &str = "portal";

/// Session lifetime in seconds. Tokens and their backing rows share it.
const SESSION_TTL_SECS: i64 = 3600;

/// Claims carried by a signed session token.
///
/// `admin` and `sub` are snapshots from issuance time; authorization
/// decisions use the stored user, which is re-read on every verification.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    pub iss: String,
    pub aud: String,
    /// Username of the session owner.
    pub sub: String,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    pub session_id: String,
    pub admin: bool,
}

/// Issues, verifies, and revokes session tokens.
pub struct SessionManager {
    store: Arc<Store>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl SessionManager {
    /// Builds a manager from a PEM-encoded EC P-256 private key (PKCS#8).
    pub fn new(store: Arc<Store>, signing_key_pem: &str) -> Result<Self> {
        let key_pair = KeyPair::from_pem(signing_key_pem)
            .map_err(|e| ApiError::Internal(format!("invalid signing key: {e}")))?;
        let encoding_key = EncodingKey::from_ec_pem(signing_key_pem.as_bytes())
            .map_err(|e| ApiError::Internal(format!("invalid signing key: {e}")))?;
        let decoding_key = DecodingKey::from_ec_pem(key_pair.public_key_pem().as_bytes())
            .map_err(|e| ApiError::Internal(format!("invalid signing key: {e}")))?;

        Ok(Self {
            store,
            encoding_key,
            decoding_key,
        })
    }

    /// Issues a token for the user and records the backing session row.
    pub fn issue(&self, user: &User) -> Result<String> {
        let session_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let expires = now + Duration::seconds(SESSION_TTL_SECS);

        let claims = SessionClaims {
            iss: TOKEN_ISSUER.to_string(),
            aud: TOKEN_ISSUER.to_string(),
            sub: user.username.clone(),
            jti: session_id.clone(),
            iat: now.timestamp(),
            exp: expires.timestamp(),
            session_id: session_id.clone(),
            admin: user.admin,
        };

        // Opportunistic cleanup; a failure must not block the login.
        if let Err(e) = self.store.purge_expired_sessions(now) {
            tracing::warn!("Failed to purge expired sessions: {}", e);
        }

        let token = encode(&Header::new(Algorithm::ES256), &claims, &self.encoding_key)
            .map_err(|e| ApiError::Internal(format!("failed to sign session token: {e}")))?;

        self.store.record_login(&Session {
            id: session_id,
            user_id: user.id.clone(),
            expires,
        })?;

        tracing::debug!("Issued session for user: {}", user.username);
        Ok(token)
    }

    /// Verifies a token and resolves the live session and user behind it.
    pub fn verify(&self, token: &str) -> Result<(Session, User)> {
        let claims = self
            .decode(token)
            .map_err(|e| ApiError::InvalidSignature(e.to_string()))?;

        let session = self
            .store
            .get_session(&claims.session_id)?
            .ok_or(ApiError::SessionNotFound)?;
        if session.expires < Utc::now() {
            return Err(ApiError::SessionNotFound);
        }

        let user = self
            .store
            .get_user_by_username(&claims.sub)?
            .ok_or_else(|| ApiError::NotFound("user".to_string()))?;

        Ok((session, user))
    }

    /// Deletes the session named by the token. The signature must check
    /// out but the session is not required to still exist.
    pub fn revoke(&self, token: &str) -> Result<()> {
        let claims = self
            .decode(token)
            .map_err(|e| ApiError::InvalidToken(e.to_string()))?;
        if claims.session_id.is_empty() {
            return Err(ApiError::MissingSessionClaim);
        }
        self.store.delete_session(&claims.session_id)?;
        Ok(())
    }

    fn decode(&self, token: &str) -> jsonwebtoken::errors::Result<SessionClaims> {
        let mut validation = Validation::new(Algorithm::ES256);
        validation.set_issuer(&[TOKEN_ISSUER]);
        validation.set_audience(&[TOKEN_ISSUER]);
        let data = decode::<SessionClaims>(token, &self.decoding_key, &validation)?;
        Ok(data.claims)
    }
}
