pub mod admin;
pub mod auth;
pub mod config;
pub mod health;
pub mod spa;
pub mod user;

use std::sync::Arc;

use axum::Router;

use crate::AppState;

/// Assembles every API route into one router, with the JSON 404 fallback
/// for unknown `/api` paths.
pub fn api_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(health::router(state.clone()))
        .merge(auth::router(state.clone()))
        .merge(user::router(state.clone()))
        .nest("/admin", admin::router(state.clone()))
        .nest("/config", config::router(state))
        .fallback(spa::api_not_found)
}
