use chrono::{DateTime, Utc};
use serde::Serialize;

/// Server-side record backing a signed session token.
///
/// The token is only accepted while this record exists and is unexpired,
/// which is what makes logout effective before the token itself expires.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    /// Session identifier, also embedded in the token claims.
    pub id: String,
    pub user_id: String,
    pub expires: DateTime<Utc>,
}
