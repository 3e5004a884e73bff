//! HTTP surface: axum router, handlers, and the authorization
//! middleware protected routes sit behind.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::Utc;
use tower_http::cors::CorsLayer;

use crate::auth::authorize::{self, Effect, PolicyDecision, SCOPE_AUTH};
use crate::auth::error::AuthError;
use crate::auth::secret::SigningSecretProvider;
use crate::auth::telegram::{self, LoginPayload};
use crate::auth::token::{TokenIssuer, TokenPair};
use crate::config::ServerConfig;
use crate::db::Db;

/// Header carrying the opaque refresh token.
const REFRESH_TOKEN_HEADER: &str = "x-refresh-token";

/// Shared state behind every handler.
pub struct SharedState {
    pub config: ServerConfig,
    pub issuer: TokenIssuer,
    pub secrets: Arc<SigningSecretProvider>,
}

impl SharedState {
    pub fn new(config: ServerConfig, db: Arc<Db>) -> Self {
        let secrets = Arc::new(SigningSecretProvider::new(db.clone()));
        let issuer = TokenIssuer::new(db.clone(), db, secrets.clone());
        SharedState {
            config,
            issuer,
            secrets,
        }
    }
}

/// Build the axum router.
pub fn router(state: Arc<SharedState>) -> Router {
    let protected = Router::new()
        .route("/auth/telegram", post(link_telegram))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/health", get(health))
        .route("/auth/register", post(register))
        .route("/auth/refresh", post(refresh))
        .merge(protected)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

/// Run the decision point on the bearer credential and stash the
/// decision in request extensions for the handler. Deny, or a scope
/// not covering the auth surface, is a 401.
async fn require_auth(
    State(state): State<Arc<SharedState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, (StatusCode, String)> {
    let credential = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let secret = state
        .secrets
        .get_or_create()
        .map_err(error_response)?;
    let decision = authorize::authorize(
        credential,
        &secret,
        &state.config.api_resource,
        Utc::now(),
    );

    let auth_surface = format!("{}{SCOPE_AUTH}", state.config.api_resource);
    if decision.effect != Effect::Allow || !decision.permits(&auth_surface) {
        return Err((StatusCode::UNAUTHORIZED, "unauthorized".to_string()));
    }

    req.extensions_mut().insert(decision);
    Ok(next.run(req).await)
}

async fn register(
    State(state): State<Arc<SharedState>>,
) -> Result<(StatusCode, Json<TokenPair>), (StatusCode, String)> {
    let pair = state.issuer.register(Utc::now()).map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(pair)))
}

async fn refresh(
    State(state): State<Arc<SharedState>>,
    headers: HeaderMap,
) -> Result<Json<TokenPair>, (StatusCode, String)> {
    let refresh_token = headers
        .get(REFRESH_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| (StatusCode::UNAUTHORIZED, "unauthorized".to_string()))?;
    let pair = state
        .issuer
        .refresh(refresh_token, Utc::now())
        .map_err(error_response)?;
    Ok(Json(pair))
}

async fn link_telegram(
    State(state): State<Arc<SharedState>>,
    Extension(decision): Extension<PolicyDecision>,
    Json(payload): Json<LoginPayload>,
) -> Result<Json<TokenPair>, (StatusCode, String)> {
    let telegram_user_id =
        telegram::verify(&payload, &state.config.telegram_token, Utc::now())
            .map_err(error_response)?;
    let access_token = state
        .issuer
        .link_identity(&decision.principal, &telegram_user_id, Utc::now())
        .map_err(error_response)?;
    Ok(Json(TokenPair {
        access_token,
        refresh_token: None,
    }))
}

/// Map the auth taxonomy onto HTTP. Infrastructure detail is logged,
/// never sent to the client.
fn error_response(err: AuthError) -> (StatusCode, String) {
    match err {
        AuthError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized".to_string()),
        AuthError::Forbidden => (StatusCode::FORBIDDEN, "forbidden".to_string()),
        AuthError::Infrastructure(detail) => {
            tracing::error!("store failure: {detail}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error".to_string(),
            )
        }
    }
}
