//! Bundled frontend serving.
//!
//! The SPA owns every path outside `/api`. Unknown paths serve index.html
//! so client-side routes survive a full page load.

use std::path::PathBuf;

use axum::{http::StatusCode, Json};
use serde_json::json;
use tower_http::services::{ServeDir, ServeFile};

/// File service for the built frontend bundle, with the SPA fallback.
///
/// Client-routed paths must come back as 200, not 404; the OIDC
/// callback page is one of them, and `fallback` serves index.html with
/// its natural status where `not_found_service` would rewrite it.
pub fn service(static_dir: &str) -> ServeDir<ServeFile> {
    let index = PathBuf::from(static_dir).join("index.html");
    ServeDir::new(static_dir).fallback(ServeFile::new(index))
}

/// Fallback for unknown `/api` paths. API consumers get JSON, never the
/// SPA fallback page.
pub async fn api_not_found() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "API route not found" })),
    )
}
