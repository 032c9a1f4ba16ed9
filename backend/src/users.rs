//! User accounts and password authentication.

use std::sync::Arc;

use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use chrono::Utc;
use password_hash::{PasswordHash, SaltString};
use uuid::Uuid;

use crate::error::{ApiError, Result};
use crate::models::{NewUser, User, UserKind};
use crate::store::Store;

/// Hashes a password into an argon2id PHC string with a fresh random salt.
pub fn hash_password(password: &str) -> Result<String> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes)
        .map_err(|e| ApiError::Internal(format!("failed to source salt: {e}")))?;
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| ApiError::Internal(format!("failed to encode salt: {e}")))?;

    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| ApiError::Internal(format!("failed to hash password: {e}")))?;

    Ok(hash.to_string())
}

/// Verifies a password against a stored PHC string. Unparseable hashes
/// (including the empty hash of passwordless accounts) never match.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Account management on top of the credential store.
pub struct UserService {
    store: Arc<Store>,
    /// Hash verified for unknown usernames so lookup misses take as long
    /// as password mismatches.
    dummy_hash: String,
}

impl UserService {
    pub fn new(store: Arc<Store>) -> Result<Self> {
        let dummy_hash = hash_password(&Uuid::new_v4().to_string())?;
        Ok(Self { store, dummy_hash })
    }

    /// Creates an account. The password is hashed before it reaches the
    /// store; an empty password stores an empty hash and the account can
    /// never log in locally.
    pub fn create(&self, new_user: NewUser) -> Result<User> {
        let password_hash = if new_user.password.is_empty() {
            String::new()
        } else {
            hash_password(&new_user.password)?
        };

        let user = User {
            id: Uuid::new_v4().to_string(),
            username: new_user.username,
            email: new_user.email,
            display_name: new_user.display_name,
            kind: new_user.kind,
            admin: new_user.admin,
            active: true,
            password_hash,
            created: Utc::now(),
            last_login: None,
        };

        self.store.create_user(&user)?;
        tracing::info!("Created {} user: {}", user.kind, user.username);
        Ok(user)
    }

    /// Checks a username/password pair against a local account.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<User> {
        let user = match self.store.get_user_by_username(username)? {
            Some(user) => user,
            None => {
                let _ = verify_password(password, &self.dummy_hash);
                return Err(ApiError::InvalidCredentials);
            }
        };

        if user.kind != UserKind::Local {
            return Err(ApiError::UnsupportedAuthMethod);
        }
        if !verify_password(password, &user.password_hash) {
            return Err(ApiError::InvalidCredentials);
        }

        Ok(user)
    }

    pub fn get_by_username(&self, username: &str) -> Result<User> {
        self.store
            .get_user_by_username(username)?
            .ok_or_else(|| ApiError::NotFound(format!("user {username}")))
    }

    pub fn get_by_id(&self, id: &str) -> Result<User> {
        self.store
            .get_user_by_id(id)?
            .ok_or_else(|| ApiError::NotFound(format!("user {id}")))
    }

    pub fn get_by_email(&self, email: &str) -> Result<User> {
        self.store
            .get_user_by_email(email)?
            .ok_or_else(|| ApiError::NotFound(format!("user {email}")))
    }

    /// Updates the admin flag, always, and email and display name when
    /// non-empty.
    pub fn update(&self, id: &str, email: &str, admin: bool, display_name: &str) -> Result<()> {
        let email = (!email.is_empty()).then_some(email);
        let display_name = (!display_name.is_empty()).then_some(display_name);
        self.store.update_user(id, email, admin, display_name)
    }

    pub fn list(&self) -> Result<Vec<User>> {
        self.store.list_users()
    }
}
