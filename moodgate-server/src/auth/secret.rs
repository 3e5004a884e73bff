//! Signing-secret lifecycle.
//!
//! The secret is generated lazily on first use, persisted so every
//! instance of the service converges on the same value, and cached
//! in-process for the life of the process.

use std::sync::Arc;

use parking_lot::Mutex;
use rand::RngCore;

use super::error::AuthError;
use super::store::SecretStore;

/// Key under which the signing secret is persisted.
const SECRET_KEY: &str = "jwt_secret";

/// Process-wide provider of the token-signing secret.
///
/// Owned by the composition root and shared via `Arc`; there is no
/// ambient global. The cache lock is never held across a store call.
pub struct SigningSecretProvider {
    store: Arc<dyn SecretStore>,
    cached: Mutex<Option<String>>,
}

impl SigningSecretProvider {
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self {
            store,
            cached: Mutex::new(None),
        }
    }

    /// Return the signing secret: cache hit, else stored value, else
    /// generate + conditional write + authoritative re-read.
    ///
    /// An instance that loses the first-write race adopts the value
    /// another instance persisted, so all instances converge.
    pub fn get_or_create(&self) -> Result<String, AuthError> {
        if let Some(secret) = self.cached.lock().clone() {
            return Ok(secret);
        }

        if let Some(secret) = self.store.get(SECRET_KEY)? {
            return Ok(self.adopt(secret));
        }

        let fresh = generate_secret();
        self.store.put_if_absent(SECRET_KEY, &fresh)?;
        match self.store.get(SECRET_KEY)? {
            Some(stored) => {
                if stored == fresh {
                    tracing::info!("generated and persisted new signing secret");
                } else {
                    tracing::info!("adopted signing secret persisted by another instance");
                }
                Ok(self.adopt(stored))
            }
            None => Err(AuthError::Infrastructure(
                "signing secret missing after conditional write".into(),
            )),
        }
    }

    /// Populate the cache at most once; a concurrent in-process caller
    /// that got there first wins.
    fn adopt(&self, secret: String) -> String {
        let mut cached = self.cached.lock();
        match cached.as_ref() {
            Some(existing) => existing.clone(),
            None => {
                *cached = Some(secret.clone());
                secret
            }
        }
    }
}

/// 32 bytes of entropy, hex-encoded.
fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
