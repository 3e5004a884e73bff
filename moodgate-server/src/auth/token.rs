//! Access-token codec and the token issuer.
//!
//! Access tokens are compact HS256 tokens
//! (`base64url(header).base64url(claims).base64url(sig)`) signed with
//! the process-wide secret. They are stateless: signature plus expiry
//! are the only validity checks, there is no revocation list.
//!
//! Refresh tokens are opaque high-entropy strings stored server-side
//! with an absolute expiry. Rotation inserts a new record; it never
//! extends an existing one.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use super::error::AuthError;
use super::secret::SigningSecretProvider;
use super::store::{IdentityLinkStore, RefreshTokenRecord, RefreshTokenStore};

/// Access tokens live for ten minutes.
const ACCESS_TTL_MINUTES: i64 = 10;
/// Refresh tokens live for a year.
const REFRESH_TTL_DAYS: i64 = 365;
/// A refresh token expiring within this window is rotated on use.
const ROTATION_WINDOW_DAYS: i64 = 14;

/// Signed claims carried by an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Account id the token was minted for.
    pub sub: String,
    /// Linked Telegram user id, once identity linking has completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tg: Option<String>,
    /// Absolute expiry, unix seconds UTC.
    pub exp: i64,
}

/// Response body for registration and refresh.
///
/// `refresh_token` is present on registration and on rotation; a plain
/// refresh outside the rotation window returns only the access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

fn mac_for(secret: &str) -> Result<Hmac<Sha256>, AuthError> {
    Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| AuthError::Infrastructure(format!("hmac init failed: {e}")))
}

/// Encode and sign an access token.
pub fn encode_token(claims: &AccessClaims, secret: &str) -> Result<String, AuthError> {
    let header = serde_json::json!({"alg": "HS256", "typ": "JWT"});
    let header_bytes = serde_json::to_vec(&header)
        .map_err(|e| AuthError::Infrastructure(format!("header serialization: {e}")))?;
    let claims_bytes = serde_json::to_vec(claims)
        .map_err(|e| AuthError::Infrastructure(format!("claims serialization: {e}")))?;

    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(header_bytes),
        URL_SAFE_NO_PAD.encode(claims_bytes)
    );
    let mut mac = mac_for(secret)?;
    mac.update(signing_input.as_bytes());
    let sig = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
    Ok(format!("{signing_input}.{sig}"))
}

/// Verify and decode an access token.
///
/// The signature is checked (constant-time) before the claims are
/// parsed. Every failure collapses to `Unauthorized`; callers never
/// learn whether a token was malformed, forged, or expired.
pub fn decode_token(
    token: &str,
    secret: &str,
    now: DateTime<Utc>,
) -> Result<AccessClaims, AuthError> {
    let mut parts = token.split('.');
    let (Some(header_b64), Some(claims_b64), Some(sig_b64), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(AuthError::Unauthorized);
    };

    let sig = URL_SAFE_NO_PAD
        .decode(sig_b64)
        .map_err(|_| AuthError::Unauthorized)?;
    let mut mac = mac_for(secret)?;
    mac.update(header_b64.as_bytes());
    mac.update(b".");
    mac.update(claims_b64.as_bytes());
    mac.verify_slice(&sig).map_err(|_| AuthError::Unauthorized)?;

    let claims_bytes = URL_SAFE_NO_PAD
        .decode(claims_b64)
        .map_err(|_| AuthError::Unauthorized)?;
    let claims: AccessClaims =
        serde_json::from_slice(&claims_bytes).map_err(|_| AuthError::Unauthorized)?;

    if claims.exp <= now.timestamp() {
        return Err(AuthError::Unauthorized);
    }
    Ok(claims)
}

/// Mints access tokens and owns refresh-token rotation policy.
pub struct TokenIssuer {
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    identity_links: Arc<dyn IdentityLinkStore>,
    secrets: Arc<SigningSecretProvider>,
}

impl TokenIssuer {
    pub fn new(
        refresh_tokens: Arc<dyn RefreshTokenStore>,
        identity_links: Arc<dyn IdentityLinkStore>,
        secrets: Arc<SigningSecretProvider>,
    ) -> Self {
        Self {
            refresh_tokens,
            identity_links,
            secrets,
        }
    }

    /// Anonymous registration: fresh account id, year-long refresh
    /// token, ten-minute access token with no linked identity.
    pub fn register(&self, now: DateTime<Utc>) -> Result<TokenPair, AuthError> {
        let user_id = Uuid::new_v4().simple().to_string();
        let record = self.issue_refresh_token(&user_id, now)?;
        let access_token = self.mint_access_token(&user_id, None, now)?;
        tracing::info!(user_id = %user_id, "registered new account");
        Ok(TokenPair {
            access_token,
            refresh_token: Some(record.token),
        })
    }

    /// Exchange a refresh token for a new access token.
    ///
    /// Rotation: a refresh token expiring in under fourteen days is
    /// superseded by a brand-new year-long record returned alongside
    /// the access token. Retrying a failed rotation may leave two live
    /// records; both stay valid (at-least-once, never corrupting).
    pub fn refresh(&self, refresh_token: &str, now: DateTime<Utc>) -> Result<TokenPair, AuthError> {
        let record = self
            .refresh_tokens
            .get(refresh_token)?
            .ok_or(AuthError::Unauthorized)?;
        if record.expires_at <= now {
            tracing::warn!(user_id = %record.user_id, "refresh token expired");
            return Err(AuthError::Unauthorized);
        }

        let telegram_user_id = self.identity_links.get(&record.user_id)?;
        let access_token =
            self.mint_access_token(&record.user_id, telegram_user_id.as_deref(), now)?;

        let refresh_token = if record.expires_at < now + Duration::days(ROTATION_WINDOW_DAYS) {
            let rotated = self.issue_refresh_token(&record.user_id, now)?;
            tracing::info!(user_id = %record.user_id, "rotated refresh token");
            Some(rotated.token)
        } else {
            None
        };

        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Bind a verified Telegram identity to an account and mint an
    /// access token embedding it. The caller has already been
    /// authenticated by the decision point; no refresh token here.
    pub fn link_identity(
        &self,
        user_id: &str,
        telegram_user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        self.identity_links.put(user_id, telegram_user_id)?;
        tracing::info!(user_id = %user_id, "linked telegram identity");
        self.mint_access_token(user_id, Some(telegram_user_id), now)
    }

    fn issue_refresh_token(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<RefreshTokenRecord, AuthError> {
        let record = RefreshTokenRecord {
            token: generate_refresh_token(),
            user_id: user_id.to_string(),
            expires_at: now + Duration::days(REFRESH_TTL_DAYS),
        };
        self.refresh_tokens.put(&record)?;
        Ok(record)
    }

    fn mint_access_token(
        &self,
        user_id: &str,
        telegram_user_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        let secret = self.secrets.get_or_create()?;
        let claims = AccessClaims {
            sub: user_id.to_string(),
            tg: telegram_user_id.map(str::to_string),
            exp: (now + Duration::minutes(ACCESS_TTL_MINUTES)).timestamp(),
        };
        encode_token(&claims, &secret)
    }
}

/// 128 bytes of entropy, hex-encoded (256 characters).
fn generate_refresh_token() -> String {
    let mut bytes = [0u8; 128];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;

    fn issuer() -> (TokenIssuer, Arc<SigningSecretProvider>) {
        let db = Arc::new(Db::open_memory().unwrap());
        let secrets = Arc::new(SigningSecretProvider::new(db.clone()));
        (
            TokenIssuer::new(db.clone(), db, secrets.clone()),
            secrets,
        )
    }

    #[test]
    fn roundtrip_with_and_without_identity() {
        let secret = "s3cret";
        for tg in [None, Some("99887766".to_string())] {
            let claims = AccessClaims {
                sub: "abc123".into(),
                tg: tg.clone(),
                exp: Utc::now().timestamp() + 600,
            };
            let token = encode_token(&claims, secret).unwrap();
            let decoded = decode_token(&token, secret, Utc::now()).unwrap();
            assert_eq!(decoded, claims);
        }
    }

    #[test]
    fn tampered_token_is_rejected() {
        let secret = "s3cret";
        let claims = AccessClaims {
            sub: "abc123".into(),
            tg: None,
            exp: Utc::now().timestamp() + 600,
        };
        let token = encode_token(&claims, secret).unwrap();

        // Swap the claims segment for one naming a different subject.
        let forged_claims = AccessClaims {
            sub: "attacker".into(),
            ..claims
        };
        let forged = encode_token(&forged_claims, secret).unwrap();
        let spliced = format!(
            "{}.{}.{}",
            token.split('.').next().unwrap(),
            forged.split('.').nth(1).unwrap(),
            token.split('.').nth(2).unwrap(),
        );
        assert!(matches!(
            decode_token(&spliced, secret, Utc::now()),
            Err(AuthError::Unauthorized)
        ));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let claims = AccessClaims {
            sub: "abc123".into(),
            tg: None,
            exp: Utc::now().timestamp() + 600,
        };
        let token = encode_token(&claims, "secret-a").unwrap();
        assert!(decode_token(&token, "secret-b", Utc::now()).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let secret = "s3cret";
        let now = Utc::now();
        let claims = AccessClaims {
            sub: "abc123".into(),
            tg: None,
            exp: now.timestamp() + 600,
        };
        let token = encode_token(&claims, secret).unwrap();
        assert!(decode_token(&token, secret, now).is_ok());
        // Exactly at expiry counts as expired.
        let at_expiry = DateTime::from_timestamp(claims.exp, 0).unwrap();
        assert!(decode_token(&token, secret, at_expiry).is_err());
    }

    #[test]
    fn garbage_tokens_are_rejected() {
        for junk in ["", "a", "a.b", "a.b.c.d", "not base64.!!!.sig"] {
            assert!(decode_token(junk, "s3cret", Utc::now()).is_err());
        }
    }

    #[test]
    fn register_mints_anonymous_pair() {
        let (issuer, secrets) = issuer();
        let now = Utc::now();
        let pair = issuer.register(now).unwrap();

        let secret = secrets.get_or_create().unwrap();
        let claims = decode_token(&pair.access_token, &secret, now).unwrap();
        assert!(claims.tg.is_none());
        assert_eq!(claims.exp, now.timestamp() + 600);
        let refresh = pair.refresh_token.expect("registration returns a refresh token");
        assert_eq!(refresh.len(), 256);
    }

    #[test]
    fn refresh_far_from_expiry_does_not_rotate() {
        let (issuer, _) = issuer();
        let now = Utc::now();
        let pair = issuer.register(now).unwrap();
        let refresh = pair.refresh_token.unwrap();

        // 365-day token used immediately: well outside the window.
        let renewed = issuer.refresh(&refresh, now).unwrap();
        assert!(renewed.refresh_token.is_none());
    }

    #[test]
    fn refresh_near_expiry_rotates_with_fresh_ceiling() {
        let (issuer, _) = issuer();
        let registered_at = Utc::now();
        let pair = issuer.register(registered_at).unwrap();
        let refresh = pair.refresh_token.unwrap();

        // 10 days before the ceiling: inside the 14-day window.
        let later = registered_at + Duration::days(355);
        let renewed = issuer.refresh(&refresh, later).unwrap();
        let rotated = renewed.refresh_token.expect("rotation expected");
        assert_ne!(rotated, refresh);

        // The rotated token carries a fresh 365-day ceiling: using it
        // right away must not rotate again.
        let again = issuer.refresh(&rotated, later).unwrap();
        assert!(again.refresh_token.is_none());

        // The superseded token is still live until its own expiry.
        assert!(issuer.refresh(&refresh, later).is_ok());
    }

    #[test]
    fn refresh_with_expired_or_unknown_token_is_unauthorized() {
        let (issuer, _) = issuer();
        let now = Utc::now();
        let pair = issuer.register(now).unwrap();
        let refresh = pair.refresh_token.unwrap();

        assert!(matches!(
            issuer.refresh("no-such-token", now),
            Err(AuthError::Unauthorized)
        ));
        assert!(matches!(
            issuer.refresh(&refresh, now + Duration::days(365)),
            Err(AuthError::Unauthorized)
        ));
    }

    #[test]
    fn refresh_after_link_embeds_identity() {
        let (issuer, secrets) = issuer();
        let now = Utc::now();
        let pair = issuer.register(now).unwrap();
        let refresh = pair.refresh_token.unwrap();
        let secret = secrets.get_or_create().unwrap();

        let claims = decode_token(&pair.access_token, &secret, now).unwrap();
        let linked = issuer.link_identity(&claims.sub, "424242", now).unwrap();
        let linked_claims = decode_token(&linked, &secret, now).unwrap();
        assert_eq!(linked_claims.tg.as_deref(), Some("424242"));

        let renewed = issuer.refresh(&refresh, now).unwrap();
        let renewed_claims = decode_token(&renewed.access_token, &secret, now).unwrap();
        assert_eq!(renewed_claims.tg.as_deref(), Some("424242"));
    }
}
