//! Admin configuration routes.

use std::sync::Arc;

use axum::{extract::State, middleware, routing::post, Json, Router};
use chrono::Utc;
use serde::Deserialize;

use crate::auth;
use crate::config::default_scopes;
use crate::error::{ApiError, Result};
use crate::models::OidcProvider;
use crate::AppState;

#[derive(Debug, Deserialize)]
struct NewProviderRequest {
    name: String,
    #[serde(default)]
    display_name: String,
    client_id: String,
    client_secret: String,
    issuer: String,
    #[serde(default)]
    scopes: Vec<String>,
}

/// POST /config/oidc/provider
///
/// Registers a new OIDC provider at runtime. The name doubles as a path
/// segment in the login routes and is restricted to ASCII alphanumerics.
async fn create_provider(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewProviderRequest>,
) -> Result<Json<OidcProvider>> {
    if body.name.is_empty() || !body.name.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ApiError::InvalidRequest("invalid name".to_string()));
    }

    let scopes = if body.scopes.is_empty() {
        default_scopes()
    } else {
        body.scopes
    };

    let provider = OidcProvider {
        name: body.name,
        display_name: body.display_name,
        issuer: body.issuer,
        client_id: body.client_id,
        client_secret: body.client_secret,
        scopes,
        active: true,
        created: Utc::now(),
    };

    state.store.create_provider(&provider)?;
    tracing::info!("Registered OIDC provider: {}", provider.name);
    Ok(Json(provider))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/oidc/provider", post(create_provider))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_admin,
        ))
        .with_state(state)
}
