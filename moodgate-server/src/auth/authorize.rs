//! Policy decision point.
//!
//! Converts a bearer credential into an allow/deny decision plus
//! request-scoped context. Pure function of the credential, the
//! signing secret, and the clock; performs no writes and never fails:
//! every malformed, forged, or expired credential collapses into the
//! same Deny so callers get no oracle.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::token;

/// Scheme label expected on the credential string.
const BEARER_PREFIX: &str = "Bearer ";
/// Principal used when no verified subject exists.
const ANONYMOUS_PRINCIPAL: &str = "user";
/// Scope an account holds before identity linking completes: only the
/// identity-link and refresh surface.
pub const SCOPE_AUTH: &str = "auth";
/// Scope granting the full API surface.
pub const SCOPE_ALL: &str = "*";
/// Context key carrying the linked identity downstream.
pub const CONTEXT_TELEGRAM_USER_ID: &str = "telegram_user_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Effect {
    Allow,
    Deny,
}

/// The decision handed to the request router.
///
/// `resource` is the resource base joined with the allowed scope;
/// `context` is propagated to business logic so it never re-verifies
/// identity.
#[derive(Debug, Clone, Serialize)]
pub struct PolicyDecision {
    pub principal: String,
    pub effect: Effect,
    pub resource: String,
    pub context: HashMap<String, String>,
}

impl PolicyDecision {
    fn deny(resource_base: &str) -> Self {
        PolicyDecision {
            principal: ANONYMOUS_PRINCIPAL.to_string(),
            effect: Effect::Deny,
            resource: format!("{resource_base}{SCOPE_ALL}"),
            context: HashMap::new(),
        }
    }

    /// Whether this decision permits a request against `resource`.
    pub fn permits(&self, resource: &str) -> bool {
        if self.effect != Effect::Allow {
            return false;
        }
        match self.resource.strip_suffix(SCOPE_ALL) {
            Some(prefix) => resource.starts_with(prefix),
            None => resource == self.resource,
        }
    }
}

/// Render a policy decision for a bearer credential.
pub fn authorize(
    credential: &str,
    secret: &str,
    resource_base: &str,
    now: DateTime<Utc>,
) -> PolicyDecision {
    let Some(raw_token) = credential
        .strip_prefix(BEARER_PREFIX)
        .filter(|t| !t.is_empty())
    else {
        tracing::warn!("credential missing or lacks bearer prefix");
        return PolicyDecision::deny(resource_base);
    };

    let claims = match token::decode_token(raw_token, secret, now) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::warn!("access token rejected: {e}");
            return PolicyDecision::deny(resource_base);
        }
    };

    let mut context = HashMap::new();
    let scope = match claims.tg.as_deref().filter(|tg| !tg.is_empty()) {
        Some(tg) => {
            context.insert(CONTEXT_TELEGRAM_USER_ID.to_string(), tg.to_string());
            SCOPE_ALL
        }
        None => SCOPE_AUTH,
    };

    PolicyDecision {
        principal: claims.sub,
        effect: Effect::Allow,
        resource: format!("{resource_base}{scope}"),
        context,
    }
}
