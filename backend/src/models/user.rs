use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// How an account authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UserKind {
    /// Password login against the locally stored hash.
    Local,
    /// Login through an external OIDC provider, no local password.
    Oidc,
    /// Non-interactive account, no login path at all.
    Service,
}

impl UserKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserKind::Local => "local",
            UserKind::Oidc => "oidc",
            UserKind::Service => "service",
        }
    }
}

impl fmt::Display for UserKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(UserKind::Local),
            "oidc" => Ok(UserKind::Oidc),
            "service" => Ok(UserKind::Service),
            _ => Err(()),
        }
    }
}

/// A stored user account.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    /// Stable identifier (UUID).
    pub id: String,
    /// Login name, unique across all accounts.
    pub username: String,
    /// Contact address, also unique. OIDC logins are matched on it.
    pub email: String,
    /// Human-readable name shown in the frontend.
    pub display_name: String,
    pub kind: UserKind,
    /// Grants access to the admin API.
    pub admin: bool,
    pub active: bool,
    /// Argon2 PHC string, empty for accounts without a password.
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

/// Input for creating an account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    /// Plaintext password, hashed before storage. Empty means no password.
    pub password: String,
    pub kind: UserKind,
    pub admin: bool,
    pub display_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_kind_round_trip() {
        for kind in [UserKind::Local, UserKind::Oidc, UserKind::Service] {
            assert_eq!(kind.as_str().parse::<UserKind>(), Ok(kind));
        }
    }

    #[test]
    fn test_user_kind_rejects_unknown() {
        assert!("ldap".parse::<UserKind>().is_err());
        assert!("".parse::<UserKind>().is_err());
    }

    #[test]
    fn test_password_hash_never_serialized() {
        let user = User {
            id: "u1".to_string(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            display_name: "Alice".to_string(),
            kind: UserKind::Local,
            admin: false,
            active: true,
            password_hash: "$argon2id$v=19$secret".to_string(),
            created: Utc::now(),
            last_login: None,
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("argon2"));
        assert!(json.contains("\"kind\":\"local\""));
    }
}
