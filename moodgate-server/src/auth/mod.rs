//! Identity and authorization core.
//!
//! Everything with a security contract lives here:
//! - token issuance and rotation ([`token`])
//! - Telegram signed-login verification ([`telegram`])
//! - the policy decision point ([`authorize`])
//! - signing-secret lifecycle ([`secret`])
//!
//! The rest of the service (polls, memes, mood queries) only sees the
//! [`authorize::PolicyDecision`] the web layer injects per request.

pub mod authorize;
pub mod error;
pub mod secret;
pub mod store;
pub mod telegram;
pub mod token;
