pub mod auth;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod oidc;
pub mod routes;
pub mod sessions;
pub mod store;
pub mod test_util;
pub mod users;

pub use config::Config;
pub use error::{ApiError, Result};
pub use oidc::OidcFlow;
pub use sessions::SessionManager;
pub use store::Store;
pub use users::UserService;

use std::sync::Arc;

use chrono::Utc;

use crate::models::{NewUser, OidcProvider, UserKind};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub store: Arc<Store>,
    pub users: UserService,
    pub sessions: SessionManager,
    pub oidc: OidcFlow,
}

/// Creates the bootstrap `admin` account unless it already exists.
pub fn bootstrap_admin(users: &UserService, admin_password: &str) -> Result<()> {
    match users.get_by_username("admin") {
        Ok(_) => Ok(()),
        Err(ApiError::NotFound(_)) => {
            tracing::info!("Creating bootstrap admin user");
            users.create(NewUser {
                username: "admin".to_string(),
                email: "admin@localhost".to_string(),
                password: admin_password.to_string(),
                kind: UserKind::Local,
                admin: true,
                display_name: "Admin".to_string(),
            })?;
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Upserts every statically configured OIDC provider into the store.
pub fn seed_providers(store: &Store, config: &Config) -> Result<()> {
    let Some(providers) = &config.security.oidc else {
        return Ok(());
    };
    for (name, seed) in providers {
        store.upsert_provider(&OidcProvider {
            name: name.clone(),
            display_name: seed.display_name.clone(),
            issuer: seed.issuer.clone(),
            client_id: seed.client_id.clone(),
            client_secret: seed.client_secret.clone(),
            scopes: seed.scopes.clone(),
            active: true,
            created: Utc::now(),
        })?;
        tracing::info!("Seeded OIDC provider: {}", name);
    }
    Ok(())
}
