//! Telegram signed-login verification.
//!
//! Validates the payload the Telegram login widget hands to the
//! client, per Telegram's protocol: HMAC-SHA256 over a canonical
//! check-string, keyed by SHA-256 of the bot token, plus a 24-hour
//! replay window. Pure function of the payload, the shared secret,
//! and the clock; no network, no state.
//!
//! Which check failed is logged here and deliberately not surfaced:
//! callers uniformly see `Forbidden`.

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use super::error::AuthError;

/// Login payloads older than this are rejected as replays.
const MAX_LOGIN_AGE_HOURS: i64 = 24;

/// The payload the Telegram login widget produces.
///
/// Typed at the boundary: required fields are required, optional ones
/// are `Option`. `hash` is optional only so its absence is our check
/// to fail, not a deserialization error.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginPayload {
    pub id: i64,
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
    pub auth_date: i64,
    #[serde(default)]
    pub hash: Option<String>,
}

/// Canonical check-string: every present field except `hash`, sorted
/// lexicographically by key, joined as `key=value` lines.
fn check_string(payload: &LoginPayload) -> String {
    let mut lines = vec![
        format!("auth_date={}", payload.auth_date),
        format!("first_name={}", payload.first_name),
        format!("id={}", payload.id),
    ];
    if let Some(last_name) = &payload.last_name {
        lines.push(format!("last_name={last_name}"));
    }
    if let Some(photo_url) = &payload.photo_url {
        lines.push(format!("photo_url={photo_url}"));
    }
    if let Some(username) = &payload.username {
        lines.push(format!("username={username}"));
    }
    lines.join("\n")
}

/// Verify a signed login payload and return the asserted Telegram
/// user id. Binding it to an account is the caller's job.
pub fn verify(
    payload: &LoginPayload,
    bot_token: &str,
    now: DateTime<Utc>,
) -> Result<String, AuthError> {
    let Some(supplied) = payload.hash.as_deref().filter(|h| !h.is_empty()) else {
        tracing::warn!("login payload missing hash");
        return Err(AuthError::Forbidden);
    };
    // Telegram sends lowercase hex; uppercase is rejected rather than
    // normalized, keeping the comparison case-sensitive.
    if supplied.bytes().any(|b| b.is_ascii_uppercase()) {
        tracing::warn!("login hash is not lowercase hex");
        return Err(AuthError::Forbidden);
    }
    let Ok(supplied_bytes) = hex::decode(supplied) else {
        tracing::warn!("login hash is not valid hex");
        return Err(AuthError::Forbidden);
    };

    let key = Sha256::digest(bot_token.as_bytes());
    let mut mac = Hmac::<Sha256>::new_from_slice(key.as_slice())
        .map_err(|e| AuthError::Infrastructure(format!("hmac init failed: {e}")))?;
    mac.update(check_string(payload).as_bytes());
    if mac.verify_slice(&supplied_bytes).is_err() {
        tracing::warn!("login hash mismatch");
        return Err(AuthError::Forbidden);
    }

    if payload.auth_date < (now - Duration::hours(MAX_LOGIN_AGE_HOURS)).timestamp() {
        tracing::warn!("login payload outdated");
        return Err(AuthError::Forbidden);
    }

    Ok(payload.id.to_string())
}
