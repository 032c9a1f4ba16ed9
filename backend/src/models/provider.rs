use chrono::{DateTime, Utc};
use serde::Serialize;

/// Configuration for one external OIDC identity provider.
///
/// Rows come from two places: the static `security.oidc` config section,
/// upserted at startup, and the admin config API.
#[derive(Debug, Clone, Serialize)]
pub struct OidcProvider {
    /// URL-safe name, used as the path segment in the login routes.
    pub name: String,
    /// Label shown on the login page.
    pub display_name: String,
    /// Issuer base URL, discovery is rooted here.
    pub issuer: String,
    pub client_id: String,
    #[serde(skip_serializing)]
    pub client_secret: String,
    /// Scopes requested during authorization.
    pub scopes: Vec<String>,
    /// Inactive providers are hidden from the login page and reject logins.
    pub active: bool,
    pub created: DateTime<Utc>,
}
