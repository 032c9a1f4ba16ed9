use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Liveness endpoint, reachable without authentication. Reports
/// `degraded` when the credential store cannot be queried.
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let status = match state.store.ping() {
        Ok(()) => "ok",
        Err(e) => {
            tracing::warn!("Health check failed to reach the store: {}", e);
            "degraded"
        }
    };
    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(state)
}
