use std::sync::Arc;

use axum::{middleware, Router};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use portal_backend::{
    bootstrap_admin, logging, routes, seed_providers, AppState, Config, OidcFlow, SessionManager,
    Store, UserService,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting portal backend");

    // Initialize components
    let store = Arc::new(Store::new(&config.database.url)?);
    let users = UserService::new(store.clone())?;
    let sessions = SessionManager::new(store.clone(), &config.security.signing_key)?;
    let oidc = OidcFlow::new(store.clone());

    bootstrap_admin(&users, &config.security.admin_password)?;
    seed_providers(&store, &config)?;

    let state = Arc::new(AppState {
        config: config.clone(),
        store,
        users,
        sessions,
        oidc,
    });

    // Build CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build router: API under /api, everything else is the SPA
    let app = Router::new()
        .nest("/api", routes::api_router(state.clone()))
        .fallback_service(routes::spa::service(&config.http.static_dir))
        .layer(middleware::from_fn(logging::request_logger))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = format!("{}:{}", config.http.host, config.http.port);
    tracing::info!("Listening on {}", addr);

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
