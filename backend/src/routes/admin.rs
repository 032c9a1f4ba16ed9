//! Admin API routes.
//!
//! Provides:
//! - User listing for the admin dashboard (`/admin/users`)
//! - Full user detail (`/admin/user/:id`)
//!
//! Every route is gated on an admin token by the auth middleware.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    middleware,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::auth;
use crate::error::Result;
use crate::models::{User, UserKind};
use crate::AppState;

/// Minimal entry for the user listing.
#[derive(Debug, Serialize)]
struct UserSummary {
    id: String,
    username: String,
}

/// Full record for the user detail endpoint.
#[derive(Debug, Serialize)]
struct UserDetail {
    id: String,
    username: String,
    email: String,
    display_name: String,
    kind: UserKind,
    admin: bool,
    active: bool,
    created: DateTime<Utc>,
    last_login: Option<DateTime<Utc>>,
}

impl From<User> for UserDetail {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            display_name: user.display_name,
            kind: user.kind,
            admin: user.admin,
            active: user.active,
            created: user.created,
            last_login: user.last_login,
        }
    }
}

/// GET /admin/users
async fn list_users(State(state): State<Arc<AppState>>) -> Result<Json<Vec<UserSummary>>> {
    let users = state
        .users
        .list()?
        .into_iter()
        .map(|u| UserSummary {
            id: u.id,
            username: u.username,
        })
        .collect();
    Ok(Json(users))
}

/// GET /admin/user/:id
async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<UserDetail>> {
    let user = state.users.get_by_id(&id)?;
    Ok(Json(user.into()))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/users", get(list_users))
        .route("/user/:id", get(get_user))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_admin,
        ))
        .with_state(state)
}
