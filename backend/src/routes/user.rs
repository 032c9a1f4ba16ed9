//! Routes exposing the authenticated caller's own record.

use std::sync::Arc;

use axum::{middleware, routing::get, Extension, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::auth::{self, Identity};
use crate::models::UserKind;
use crate::AppState;

#[derive(Debug, Serialize)]
struct ProfileResponse {
    id: String,
    username: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    display_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    email: String,
    kind: UserKind,
    admin: bool,
    created: DateTime<Utc>,
    last_login: Option<DateTime<Utc>>,
}

/// GET /user/profile
async fn profile(Extension(identity): Extension<Identity>) -> Json<ProfileResponse> {
    let user = identity.user;
    Json(ProfileResponse {
        id: user.id,
        username: user.username,
        display_name: user.display_name,
        email: user.email,
        kind: user.kind,
        admin: user.admin,
        created: user.created,
        last_login: user.last_login,
    })
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/user/profile", get(profile))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_user,
        ))
        .with_state(state)
}
