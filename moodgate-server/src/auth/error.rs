//! Error taxonomy for the auth core.

/// Failure classes the auth core distinguishes.
///
/// Store failures are always `Infrastructure`, never an auth failure;
/// the web layer maps the variants to 401 / 403 / 500.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Missing, invalid, or expired credential.
    #[error("unauthorized")]
    Unauthorized,
    /// External identity verification failed. Which check failed is
    /// logged internally and never surfaced to the caller.
    #[error("forbidden")]
    Forbidden,
    /// Store unavailable, timed out, or returned garbage.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl From<rusqlite::Error> for AuthError {
    fn from(e: rusqlite::Error) -> Self {
        AuthError::Infrastructure(e.to_string())
    }
}
