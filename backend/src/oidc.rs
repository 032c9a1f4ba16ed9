//! OIDC login flow against external identity providers.
//!
//! Endpoints are resolved through the provider's discovery document on
//! every use, so issuer-side rotation needs no restart. The id_token
//! returned by the code exchange is verified against the provider's JWKS
//! before any claim is trusted.

use std::collections::HashMap;
use std::sync::Arc;

use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use url::Url;

use crate::error::{ApiError, Result};
use crate::models::{NewUser, OidcProvider, User, UserKind};
use crate::store::Store;
use crate::users::UserService;

/// Signature algorithms accepted on provider id_tokens. Symmetric
/// algorithms are excluded so a published JWKS can never double as a
/// signing secret.
const ID_TOKEN_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::ES256,
    Algorithm::ES384,
];

/// Subset of the provider discovery document we need.
#[derive(Debug, Deserialize)]
struct DiscoveryDocument {
    authorization_endpoint: String,
    token_endpoint: String,
    jwks_uri: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[allow(dead_code)]
    access_token: Option<String>,
    id_token: Option<String>,
    #[allow(dead_code)]
    token_type: Option<String>,
}

/// One key from the provider's JWKS document.
#[derive(Debug, Deserialize)]
struct Jwk {
    kid: Option<String>,
    kty: String,
    // RSA components
    n: Option<String>,
    e: Option<String>,
    // EC components
    #[allow(dead_code)]
    crv: Option<String>,
    x: Option<String>,
    y: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JwksResponse {
    keys: Vec<Jwk>,
}

/// Verified identity claims from a provider id_token.
#[derive(Debug, Clone, Deserialize)]
pub struct IdTokenClaims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    // Providers differ on absent-vs-null for the groups claim; both
    // deserialize as None.
    #[serde(default)]
    pub groups: Option<Vec<String>>,
}

/// Drives the OIDC authorization-code flow.
pub struct OidcFlow {
    store: Arc<Store>,
    http_client: reqwest::Client,
}

impl OidcFlow {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            http_client: reqwest::Client::new(),
        }
    }

    /// Looks up an active provider by name.
    pub fn provider(&self, name: &str) -> Result<OidcProvider> {
        self.store
            .get_provider(name)?
            .filter(|p| p.active)
            .ok_or_else(|| ApiError::ProviderNotFound(name.to_string()))
    }

    /// Builds the provider authorization URL for the login redirect.
    pub async fn authorization_url(
        &self,
        provider: &OidcProvider,
        redirect_url: &str,
        state: &str,
    ) -> Result<String> {
        let discovery = self.discover(&provider.issuer).await?;

        let mut auth_url = Url::parse(&discovery.authorization_endpoint)
            .map_err(|e| ApiError::Oidc(format!("invalid authorization endpoint: {e}")))?;
        {
            let mut params = auth_url.query_pairs_mut();
            params.append_pair("response_type", "code");
            params.append_pair("client_id", &provider.client_id);
            params.append_pair("redirect_uri", redirect_url);
            params.append_pair("state", state);
            if !provider.scopes.is_empty() {
                params.append_pair("scope", &provider.scopes.join(" "));
            }
        }

        Ok(auth_url.to_string())
    }

    /// Redeems an authorization code and returns the verified id_token
    /// claims. `redirect_url` must match the value used at initiation.
    pub async fn exchange_code(
        &self,
        provider: &OidcProvider,
        code: &str,
        redirect_url: &str,
    ) -> Result<IdTokenClaims> {
        let discovery = self.discover(&provider.issuer).await?;

        let mut form = HashMap::new();
        form.insert("grant_type", "authorization_code");
        form.insert("code", code);
        form.insert("redirect_uri", redirect_url);
        form.insert("client_id", provider.client_id.as_str());
        form.insert("client_secret", provider.client_secret.as_str());

        let response = self
            .http_client
            .post(&discovery.token_endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|e| ApiError::Oidc(format!("failed to exchange token: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Oidc(format!(
                "failed to exchange token: HTTP {status}: {body}"
            )));
        }

        let tokens: TokenResponse = response
            .json()
            .await
            .map_err(|e| ApiError::Oidc(format!("invalid token response: {e}")))?;

        let id_token = tokens
            .id_token
            .as_deref()
            .ok_or_else(|| ApiError::Oidc("token response carries no id_token".to_string()))?;

        self.verify_id_token(provider, &discovery.jwks_uri, id_token)
            .await
    }

    /// Maps verified claims onto a stored user, creating or refreshing the
    /// account as needed. Accounts reached this way never gain admin.
    pub fn resolve_user(&self, users: &UserService, claims: &IdTokenClaims) -> Result<User> {
        let email = claims
            .email
            .as_deref()
            .filter(|e| !e.is_empty())
            .ok_or_else(|| ApiError::Oidc("id token carries no email claim".to_string()))?;
        let display_name = claims.name.clone().unwrap_or_default();

        match users.get_by_email(email) {
            Ok(existing) => {
                if existing.kind != UserKind::Oidc {
                    return Err(ApiError::KindConflict);
                }
                users.update(&existing.id, email, false, &display_name)?;
                users.get_by_id(&existing.id)
            }
            Err(ApiError::NotFound(_)) => users.create(NewUser {
                username: email.to_string(),
                email: email.to_string(),
                password: String::new(),
                kind: UserKind::Oidc,
                admin: false,
                display_name,
            }),
            Err(e) => Err(ApiError::LookupError(e.to_string())),
        }
    }

    async fn discover(&self, issuer: &str) -> Result<DiscoveryDocument> {
        let url = format!(
            "{}/.well-known/openid-configuration",
            issuer.trim_end_matches('/')
        );
        self.http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| ApiError::Oidc(format!("provider discovery failed: {e}")))?
            .json()
            .await
            .map_err(|e| ApiError::Oidc(format!("invalid discovery document: {e}")))
    }

    async fn verify_id_token(
        &self,
        provider: &OidcProvider,
        jwks_uri: &str,
        token: &str,
    ) -> Result<IdTokenClaims> {
        let jwks: JwksResponse = self
            .http_client
            .get(jwks_uri)
            .send()
            .await
            .map_err(|e| ApiError::Oidc(format!("JWKS fetch failed: {e}")))?
            .json()
            .await
            .map_err(|e| ApiError::Oidc(format!("invalid JWKS document: {e}")))?;

        let header =
            decode_header(token).map_err(|e| ApiError::Oidc(format!("invalid id_token: {e}")))?;
        if !ID_TOKEN_ALGORITHMS.contains(&header.alg) {
            return Err(ApiError::Oidc(format!(
                "unsupported id_token algorithm: {:?}",
                header.alg
            )));
        }
        let kid = header
            .kid
            .ok_or_else(|| ApiError::Oidc("id_token header carries no kid".to_string()))?;

        let jwk = jwks
            .keys
            .iter()
            .find(|k| k.kid.as_deref() == Some(kid.as_str()))
            .ok_or_else(|| ApiError::Oidc(format!("no JWKS key matches kid {kid}")))?;
        let key = decoding_key(jwk)
            .ok_or_else(|| ApiError::Oidc(format!("unsupported JWKS key type: {}", jwk.kty)))?;

        let mut validation = Validation::new(header.alg);
        validation.set_issuer(&[provider.issuer.as_str()]);
        validation.set_audience(&[provider.client_id.as_str()]);

        let data = decode::<IdTokenClaims>(token, &key, &validation)
            .map_err(|e| ApiError::Oidc(format!("id_token verification failed: {e}")))?;
        Ok(data.claims)
    }
}

fn decoding_key(jwk: &Jwk) -> Option<DecodingKey> {
    match jwk.kty.as_str() {
        "RSA" => match (&jwk.n, &jwk.e) {
            (Some(n), Some(e)) => DecodingKey::from_rsa_components(n, e).ok(),
            _ => None,
        },
        "EC" => match (&jwk.x, &jwk.y) {
            (Some(x), Some(y)) => DecodingKey::from_ec_components(x, y).ok(),
            _ => None,
        },
        _ => None,
    }
}
