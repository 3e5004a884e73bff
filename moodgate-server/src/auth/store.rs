//! Store contracts consumed by the auth core.
//!
//! Three key-addressed durable stores with no schema beyond the fields
//! below. The SQLite layer in [`crate::db`] implements all of them;
//! anything satisfying these traits (a different engine, a test
//! double) can be injected instead.

use chrono::{DateTime, Utc};

use super::error::AuthError;

/// A refresh-token row: opaque token, owning account, absolute expiry.
///
/// Rotation inserts a new record and never mutates or deletes the old
/// one; expiry is enforced at read time by the issuer.
#[derive(Debug, Clone)]
pub struct RefreshTokenRecord {
    pub token: String,
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
}

/// Durable key→value persistence for the signing secret.
pub trait SecretStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, AuthError>;

    /// Write `value` under `key` only if no value exists yet. Callers
    /// must re-read afterwards; the stored value is authoritative.
    fn put_if_absent(&self, key: &str, value: &str) -> Result<(), AuthError>;
}

/// Durable record store keyed by the opaque refresh-token string.
pub trait RefreshTokenStore: Send + Sync {
    fn get(&self, token: &str) -> Result<Option<RefreshTokenRecord>, AuthError>;
    fn put(&self, record: &RefreshTokenRecord) -> Result<(), AuthError>;
}

/// Durable mapping from account id to Telegram user id, one row per
/// account, overwritten on re-link.
pub trait IdentityLinkStore: Send + Sync {
    fn get(&self, user_id: &str) -> Result<Option<String>, AuthError>;
    fn put(&self, user_id: &str, telegram_user_id: &str) -> Result<(), AuthError>;
}
