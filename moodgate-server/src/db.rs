//! SQLite persistence layer.
//!
//! Backs the three store contracts the auth core consumes: the
//! key-value table for the signing secret, refresh-token records, and
//! identity links. Uses WAL mode for concurrent reads during writes;
//! the busy timeout is the explicit bound on any store operation.

use std::path::Path;
use std::time::Duration;

use chrono::DateTime;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use crate::auth::error::AuthError;
use crate::auth::store::{
    IdentityLinkStore, RefreshTokenRecord, RefreshTokenStore, SecretStore,
};

/// Upper bound on a single store operation before it fails as an
/// infrastructure error.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database handle wrapping a SQLite connection.
pub struct Db {
    conn: Mutex<Connection>,
}

impl Db {
    /// Open (or create) the database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;
        let db = Self { conn: Mutex::new(conn) };
        db.init()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory() -> Result<Self, rusqlite::Error> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn: Mutex::new(conn) };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<(), rusqlite::Error> {
        let conn = self.conn.lock();
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS refresh_tokens (
                token      TEXT PRIMARY KEY,
                user_id    TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_refresh_tokens_user
                ON refresh_tokens(user_id);

            CREATE TABLE IF NOT EXISTS identity_links (
                user_id          TEXT PRIMARY KEY,
                telegram_user_id TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }
}

impl SecretStore for Db {
    fn get(&self, key: &str) -> Result<Option<String>, AuthError> {
        let conn = self.conn.lock();
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn put_if_absent(&self, key: &str, value: &str) -> Result<(), AuthError> {
        let conn = self.conn.lock();
        // Conditional write: an existing row wins, the caller re-reads.
        conn.execute(
            "INSERT OR IGNORE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }
}

impl RefreshTokenStore for Db {
    fn get(&self, token: &str) -> Result<Option<RefreshTokenRecord>, AuthError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT user_id, expires_at FROM refresh_tokens WHERE token = ?1",
                params![token],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?;
        match row {
            Some((user_id, expires_at)) => {
                let expires_at = DateTime::from_timestamp(expires_at, 0).ok_or_else(|| {
                    AuthError::Infrastructure(format!(
                        "refresh token row has unrepresentable expiry {expires_at}"
                    ))
                })?;
                Ok(Some(RefreshTokenRecord {
                    token: token.to_string(),
                    user_id,
                    expires_at,
                }))
            }
            None => Ok(None),
        }
    }

    fn put(&self, record: &RefreshTokenRecord) -> Result<(), AuthError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO refresh_tokens (token, user_id, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(token) DO UPDATE SET
                 user_id = excluded.user_id,
                 expires_at = excluded.expires_at",
            params![record.token, record.user_id, record.expires_at.timestamp()],
        )?;
        Ok(())
    }
}

impl IdentityLinkStore for Db {
    fn get(&self, user_id: &str) -> Result<Option<String>, AuthError> {
        let conn = self.conn.lock();
        let value = conn
            .query_row(
                "SELECT telegram_user_id FROM identity_links WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn put(&self, user_id: &str, telegram_user_id: &str) -> Result<(), AuthError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO identity_links (user_id, telegram_user_id) VALUES (?1, ?2)
             ON CONFLICT(user_id) DO UPDATE SET
                 telegram_user_id = excluded.telegram_user_id",
            params![user_id, telegram_user_id],
        )?;
        Ok(())
    }
}
