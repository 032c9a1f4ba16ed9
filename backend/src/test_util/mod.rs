use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rcgen::KeyPair;

use crate::config::{
    default_scopes, Config, DatabaseConfig, HttpConfig, LoggingConfig, OidcProviderConfig,
    SecurityConfig,
};
use crate::{seed_providers, AppState, OidcFlow, SessionManager, Store, UserService};

/// Generates a fresh EC P-256 signing key, PEM-encoded.
pub fn test_signing_key() -> String {
    KeyPair::generate().expect("generate test key").serialize_pem()
}

pub fn test_config(signing_key: &str) -> Config {
    Config {
        http: HttpConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
            public_url: None,
            static_dir: "ui/dist".to_string(),
        },
        database: DatabaseConfig {
            url: ":memory:".to_string(),
        },
        security: SecurityConfig {
            signing_key: signing_key.to_string(),
            admin_password: "test-admin-password".to_string(),
            debug: false,
            oidc: None,
        },
        logging: LoggingConfig {
            level: "debug".to_string(),
        },
    }
}

/// Builds a full application state over an in-memory store.
pub fn create_test_state() -> AppState {
    let signing_key = test_signing_key();
    let config = test_config(&signing_key);
    build_state(config)
}

/// Like [`create_test_state`] but with OIDC enabled and one provider
/// named `corp` pointing at `issuer`, already seeded into the store.
pub fn create_test_state_with_oidc(issuer: &str) -> AppState {
    let signing_key = test_signing_key();
    let mut config = test_config(&signing_key);
    config.security.oidc = Some(HashMap::from([(
        "corp".to_string(),
        OidcProviderConfig {
            display_name: "Corp SSO".to_string(),
            issuer: issuer.to_string(),
            client_id: "portal-client".to_string(),
            client_secret: "secret".to_string(),
            scopes: default_scopes(),
        },
    )]));

    let state = build_state(config);
    seed_providers(&state.store, &state.config).expect("seed providers");
    state
}

fn build_state(config: Config) -> AppState {
    let store = Arc::new(Store::new(&config.database.url).expect("open test store"));
    let users = UserService::new(store.clone()).expect("user service");
    let sessions =
        SessionManager::new(store.clone(), &config.security.signing_key).expect("session manager");
    let oidc = OidcFlow::new(store.clone());

    AppState {
        config,
        store,
        users,
        sessions,
        oidc,
    }
}

#[derive(serde::Serialize)]
struct TestIdClaims {
    iss: String,
    sub: String,
    aud: String,
    exp: i64,
    iat: i64,
    email: Option<String>,
    name: Option<String>,
}

/// Signs an id_token the way a provider would, ES256 with the given kid.
pub fn generate_id_token(
    issuer: &str,
    audience: &str,
    email: Option<&str>,
    name: Option<&str>,
    kid: &str,
    signing_key: &EncodingKey,
) -> String {
    let now = Utc::now();
    let claims = TestIdClaims {
        iss: issuer.to_string(),
        sub: "idp-subject".to_string(),
        aud: audience.to_string(),
        exp: (now + Duration::hours(1)).timestamp(),
        iat: now.timestamp(),
        email: email.map(String::from),
        name: name.map(String::from),
    };

    let header = Header {
        alg: Algorithm::ES256,
        kid: Some(kid.to_string()),
        ..Default::default()
    };

    encode(&header, &claims, signing_key).expect("Failed to encode id_token")
}
