use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{ApiError, Result};
use crate::models::{OidcProvider, Session, User, UserKind};

const USER_COLUMNS: &str =
    "id, username, email, display_name, kind, admin, active, password, created, last_login";

const PROVIDER_COLUMNS: &str =
    "name, display_name, issuer, client_id, client_secret, scopes, active, created";

/// SQLite-backed credential store holding users, sessions, and OIDC
/// provider configuration.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn new(database_url: &str) -> Result<Self> {
        // Parse sqlite: prefix if present
        let path = if database_url.starts_with("sqlite:") {
            &database_url[7..]
        } else {
            database_url
        };

        // Create parent directories if needed
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ApiError::Storage(e.to_string()))?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        // Create users table
        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT UNIQUE NOT NULL,
                email TEXT UNIQUE NOT NULL,
                display_name TEXT NOT NULL DEFAULT '',
                kind TEXT NOT NULL,
                admin INTEGER NOT NULL DEFAULT 0,
                active INTEGER NOT NULL DEFAULT 1,
                password TEXT NOT NULL DEFAULT '',
                created TEXT NOT NULL,
                last_login TEXT
            )",
            [],
        )?;

        // Create sessions table
        conn.execute(
            "CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                expires INTEGER NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            )",
            [],
        )?;

        // Create oidc_providers table
        conn.execute(
            "CREATE TABLE IF NOT EXISTS oidc_providers (
                name TEXT PRIMARY KEY,
                display_name TEXT NOT NULL DEFAULT '',
                issuer TEXT NOT NULL,
                client_id TEXT NOT NULL,
                client_secret TEXT NOT NULL,
                scopes TEXT NOT NULL DEFAULT 'openid,profile,email,groups',
                active INTEGER NOT NULL DEFAULT 1,
                created TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_sessions_expires ON sessions(expires)",
            [],
        )?;

        tracing::info!("Credential store initialized with database: {}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| ApiError::Storage(e.to_string()))
    }

    /// Liveness probe for the health endpoint.
    pub fn ping(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }

    // ---- users ----

    pub fn create_user(&self, user: &User) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO users (id, username, email, display_name, kind, admin, active, password, created, last_login)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                user.id,
                user.username,
                user.email,
                user.display_name,
                user.kind.as_str(),
                user.admin as i32,
                user.active as i32,
                user.password_hash,
                user.created.to_rfc3339(),
                user.last_login.map(|dt| dt.to_rfc3339()),
            ],
        )
        .map_err(|e| conflict_on_constraint(e, "user"))?;

        tracing::debug!("Created user: {}", user.username);
        Ok(())
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let conn = self.conn()?;
        let user = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
                params![username],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<User>> {
        let conn = self.conn()?;
        let user = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.conn()?;
        let user = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
                params![email],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    /// Updates the admin flag and, when present, email and display name.
    pub fn update_user(
        &self,
        id: &str,
        email: Option<&str>,
        admin: bool,
        display_name: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE users SET
                admin = ?1,
                email = COALESCE(?2, email),
                display_name = COALESCE(?3, display_name)
             WHERE id = ?4",
            params![admin as i32, email, display_name, id],
        )?;
        Ok(())
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY username"))?;
        let users = stmt
            .query_map([], user_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    // ---- sessions ----

    /// Inserts the session row and stamps the user's last login, atomically.
    pub fn record_login(&self, session: &Session) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO sessions (id, user_id, expires) VALUES (?1, ?2, ?3)",
            params![session.id, session.user_id, session.expires.timestamp()],
        )?;
        tx.execute(
            "UPDATE users SET last_login = ?1 WHERE id = ?2",
            params![Utc::now().to_rfc3339(), session.user_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn get_session(&self, id: &str) -> Result<Option<Session>> {
        let conn = self.conn()?;
        let session = conn
            .query_row(
                "SELECT id, user_id, expires FROM sessions WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Session {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        expires: DateTime::from_timestamp(row.get(2)?, 0)
                            .unwrap_or(DateTime::UNIX_EPOCH),
                    })
                },
            )
            .optional()?;
        Ok(session)
    }

    pub fn delete_session(&self, id: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// Deletes every session that expired before `now`. Returns the count.
    pub fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM sessions WHERE expires < ?1",
            params![now.timestamp()],
        )?;
        Ok(deleted)
    }

    // ---- oidc providers ----

    pub fn create_provider(&self, provider: &OidcProvider) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO oidc_providers ({PROVIDER_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
            ),
            params![
                provider.name,
                provider.display_name,
                provider.issuer,
                provider.client_id,
                provider.client_secret,
                provider.scopes.join(","),
                provider.active as i32,
                provider.created.to_rfc3339(),
            ],
        )
        .map_err(|e| conflict_on_constraint(e, "provider"))?;

        tracing::debug!("Created OIDC provider: {}", provider.name);
        Ok(())
    }

    /// Inserts or overwrites the provider. The `created` stamp of an
    /// existing row is kept.
    pub fn upsert_provider(&self, provider: &OidcProvider) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO oidc_providers ({PROVIDER_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(name) DO UPDATE SET
                    display_name = excluded.display_name,
                    issuer = excluded.issuer,
                    client_id = excluded.client_id,
                    client_secret = excluded.client_secret,
                    scopes = excluded.scopes,
                    active = excluded.active"
            ),
            params![
                provider.name,
                provider.display_name,
                provider.issuer,
                provider.client_id,
                provider.client_secret,
                provider.scopes.join(","),
                provider.active as i32,
                provider.created.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_provider(&self, name: &str) -> Result<Option<OidcProvider>> {
        let conn = self.conn()?;
        let provider = conn
            .query_row(
                &format!("SELECT {PROVIDER_COLUMNS} FROM oidc_providers WHERE name = ?1"),
                params![name],
                provider_from_row,
            )
            .optional()?;
        Ok(provider)
    }

    pub fn list_active_providers(&self) -> Result<Vec<OidcProvider>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {PROVIDER_COLUMNS} FROM oidc_providers WHERE active = 1 ORDER BY name"
        ))?;
        let providers = stmt
            .query_map([], provider_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(providers)
    }
}

impl FromSql for UserKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        s.parse()
            .map_err(|_| FromSqlError::Other(format!("unknown user kind: {s}").into()))
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        display_name: row.get(3)?,
        kind: row.get(4)?,
        admin: row.get::<_, i32>(5)? != 0,
        active: row.get::<_, i32>(6)? != 0,
        password_hash: row.get(7)?,
        created: parse_timestamp(&row.get::<_, String>(8)?),
        last_login: row.get::<_, Option<String>>(9)?.map(|s| parse_timestamp(&s)),
    })
}

fn provider_from_row(row: &Row<'_>) -> rusqlite::Result<OidcProvider> {
    let scopes: String = row.get(5)?;
    Ok(OidcProvider {
        name: row.get(0)?,
        display_name: row.get(1)?,
        issuer: row.get(2)?,
        client_id: row.get(3)?,
        client_secret: row.get(4)?,
        scopes: scopes
            .split(',')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        active: row.get::<_, i32>(6)? != 0,
        created: parse_timestamp(&row.get::<_, String>(7)?),
    })
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn conflict_on_constraint(e: rusqlite::Error, what: &str) -> ApiError {
    match &e {
        rusqlite::Error::SqliteFailure(f, _)
            if f.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            ApiError::Conflict(what.to_string())
        }
        _ => ApiError::Storage(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn test_store() -> Store {
        Store::new(":memory:").unwrap()
    }

    fn sample_user(username: &str) -> User {
        User {
            id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            email: format!("{username}@example.com"),
            display_name: String::new(),
            kind: UserKind::Local,
            admin: false,
            active: true,
            password_hash: String::new(),
            created: Utc::now(),
            last_login: None,
        }
    }

    fn sample_provider(name: &str, active: bool) -> OidcProvider {
        OidcProvider {
            name: name.to_string(),
            display_name: format!("{name} IdP"),
            issuer: format!("https://{name}.example.com"),
            client_id: "portal".to_string(),
            client_secret: "secret".to_string(),
            scopes: vec!["openid".to_string(), "email".to_string()],
            active,
            created: Utc::now(),
        }
    }

    #[test]
    fn test_create_and_fetch_user() {
        let store = test_store();
        let user = sample_user("alice");
        store.create_user(&user).unwrap();

        let by_username = store.get_user_by_username("alice").unwrap().unwrap();
        assert_eq!(by_username.id, user.id);
        assert_eq!(by_username.email, "alice@example.com");
        assert_eq!(by_username.kind, UserKind::Local);
        assert!(by_username.active);
        assert!(by_username.last_login.is_none());

        assert!(store.get_user_by_id(&user.id).unwrap().is_some());
        assert!(store.get_user_by_email("alice@example.com").unwrap().is_some());
        assert!(store.get_user_by_username("bob").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_username_is_conflict() {
        let store = test_store();
        store.create_user(&sample_user("alice")).unwrap();

        let mut duplicate = sample_user("alice");
        duplicate.email = "other@example.com".to_string();
        let err = store.create_user(&duplicate).unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[test]
    fn test_duplicate_email_is_conflict() {
        let store = test_store();
        store.create_user(&sample_user("alice")).unwrap();

        let mut duplicate = sample_user("bob");
        duplicate.email = "alice@example.com".to_string();
        let err = store.create_user(&duplicate).unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[test]
    fn test_update_user_skips_absent_fields() {
        let store = test_store();
        let user = sample_user("alice");
        store.create_user(&user).unwrap();

        store.update_user(&user.id, None, true, None).unwrap();
        let fetched = store.get_user_by_id(&user.id).unwrap().unwrap();
        assert!(fetched.admin);
        assert_eq!(fetched.email, "alice@example.com");

        store
            .update_user(&user.id, Some("new@example.com"), false, Some("Alice"))
            .unwrap();
        let fetched = store.get_user_by_id(&user.id).unwrap().unwrap();
        assert!(!fetched.admin);
        assert_eq!(fetched.email, "new@example.com");
        assert_eq!(fetched.display_name, "Alice");
    }

    #[test]
    fn test_list_users_sorted_by_username() {
        let store = test_store();
        store.create_user(&sample_user("bob")).unwrap();
        store.create_user(&sample_user("alice")).unwrap();

        let users = store.list_users().unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].username, "alice");
        assert_eq!(users[1].username, "bob");
    }

    #[test]
    fn test_record_login_inserts_session_and_stamps_user() {
        let store = test_store();
        let user = sample_user("alice");
        store.create_user(&user).unwrap();

        let expires = Utc::now() + Duration::hours(1);
        let session = Session {
            id: Uuid::new_v4().to_string(),
            user_id: user.id.clone(),
            expires,
        };
        store.record_login(&session).unwrap();

        let fetched = store.get_session(&session.id).unwrap().unwrap();
        assert_eq!(fetched.user_id, user.id);
        // Sub-second precision is dropped on the way through the store.
        assert_eq!(fetched.expires.timestamp(), expires.timestamp());

        let user = store.get_user_by_id(&user.id).unwrap().unwrap();
        assert!(user.last_login.is_some());
    }

    #[test]
    fn test_delete_session() {
        let store = test_store();
        let user = sample_user("alice");
        store.create_user(&user).unwrap();

        let session = Session {
            id: Uuid::new_v4().to_string(),
            user_id: user.id.clone(),
            expires: Utc::now() + Duration::hours(1),
        };
        store.record_login(&session).unwrap();
        store.delete_session(&session.id).unwrap();
        assert!(store.get_session(&session.id).unwrap().is_none());
    }

    #[test]
    fn test_purge_expired_sessions_keeps_live_ones() {
        let store = test_store();
        let user = sample_user("alice");
        store.create_user(&user).unwrap();

        let expired = Session {
            id: "expired".to_string(),
            user_id: user.id.clone(),
            expires: Utc::now() - Duration::hours(1),
        };
        let live = Session {
            id: "live".to_string(),
            user_id: user.id.clone(),
            expires: Utc::now() + Duration::hours(1),
        };
        store.record_login(&expired).unwrap();
        store.record_login(&live).unwrap();

        let deleted = store.purge_expired_sessions(Utc::now()).unwrap();
        assert_eq!(deleted, 1);
        assert!(store.get_session("expired").unwrap().is_none());
        assert!(store.get_session("live").unwrap().is_some());
    }

    #[test]
    fn test_provider_create_conflict_and_upsert() {
        let store = test_store();
        let provider = sample_provider("corp", true);
        store.create_provider(&provider).unwrap();

        let err = store.create_provider(&provider).unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));

        let mut updated = sample_provider("corp", true);
        updated.issuer = "https://sso.example.com".to_string();
        store.upsert_provider(&updated).unwrap();

        let fetched = store.get_provider("corp").unwrap().unwrap();
        assert_eq!(fetched.issuer, "https://sso.example.com");
        assert_eq!(fetched.created, provider.created);
    }

    #[test]
    fn test_provider_scopes_round_trip() {
        let store = test_store();
        store.create_provider(&sample_provider("corp", true)).unwrap();
        let fetched = store.get_provider("corp").unwrap().unwrap();
        assert_eq!(fetched.scopes, vec!["openid", "email"]);
    }

    #[test]
    fn test_inactive_provider_hidden_from_listing() {
        let store = test_store();
        store.create_provider(&sample_provider("corp", true)).unwrap();
        store.create_provider(&sample_provider("legacy", false)).unwrap();

        let listed = store.list_active_providers().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "corp");
    }

    #[test]
    fn test_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join("portal.db").display());

        let store = Store::new(&url).unwrap();
        store.create_user(&sample_user("alice")).unwrap();
        drop(store);

        let store = Store::new(&url).unwrap();
        assert!(store.get_user_by_username("alice").unwrap().is_some());
    }
}
