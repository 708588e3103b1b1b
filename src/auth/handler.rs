//! Token issuer HTTP surface: signup, login, JWKS publication and health.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State, rejection::JsonRejection},
    http::StatusCode,
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{get, post},
};
use jsonwebtoken::jwk::JwkSet;
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::{error, info};

use super::credentials::CredentialStore;
use super::issuer::TokenIssuer;
use super::keys::KeyProvider;
use super::limiter::{AttemptLimiter, limit_attempts};
use super::{Role, UserView};
use crate::ApiError;

/// Shared state of the token issuer service
#[derive(Debug, Clone)]
pub struct AuthState {
    /// Identity registry
    pub credentials: Arc<CredentialStore>,
    /// Token minting
    pub issuer: TokenIssuer,
    /// Published key set
    pub keys: Arc<KeyProvider>,
    /// Process start, for `/health`
    pub started_at: Instant,
}

/// Create the issuer router. `limiter` guards `/signup` and `/login` only.
pub fn create_router(state: AuthState, limiter: Arc<AttemptLimiter>, max_body_size: usize) -> Router {
    let attempts = Router::new()
        .route("/signup", post(signup_handler))
        .route("/login", post(login_handler))
        .route_layer(from_fn_with_state(limiter, limit_attempts));

    Router::new()
        .merge(attempts)
        .route("/.well-known/jwks.json", get(jwks_handler))
        .route("/health", get(health_handler))
        .fallback(not_found_handler)
        .layer(DefaultBodyLimit::max(max_body_size))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct SignupRequest {
    email: Option<String>,
    password: Option<String>,
    role: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: Option<String>,
    password: Option<String>,
}

/// Present and non-empty
fn field(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// POST /signup
async fn signup_handler(
    State(state): State<AuthState>,
    payload: Result<Json<SignupRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = payload?;

    let (Some(email), Some(password), Some(role)) =
        (field(body.email), field(body.password), field(body.role))
    else {
        return Err(ApiError::validation(
            "Missing required fields: email, password, role",
        ));
    };

    let role: Role = role
        .parse()
        .map_err(|e: super::InvalidRole| ApiError::validation(e.to_string()))?;

    let identity = state.credentials.create(&email, &password, role).await?;
    info!(user_id = %identity.id, role = %identity.role, "User created successfully");

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "User created successfully" })),
    ))
}

/// POST /login
async fn login_handler(
    State(state): State<AuthState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = payload?;

    let (Some(email), Some(password)) = (field(body.email), field(body.password)) else {
        return Err(ApiError::validation("Email and password are required"));
    };

    let identity = state.credentials.verify(&email, &password).await?;
    let token = state.issuer.issue(&identity).map_err(|e| {
        error!(error = %e, "Token signing failed");
        ApiError::Internal(format!("token signing failed: {e}"))
    })?;

    info!(user_id = %identity.id, "User logged in successfully");
    Ok(Json(json!({
        "token": token,
        "user": UserView::from(&identity),
    })))
}

/// GET /.well-known/jwks.json
async fn jwks_handler(State(state): State<AuthState>) -> Json<JwkSet> {
    Json(state.keys.jwks().clone())
}

/// GET /health
async fn health_handler(State(state): State<AuthState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "uptime": state.started_at.elapsed().as_secs_f64(),
    }))
}

pub(crate) async fn not_found_handler() -> ApiError {
    ApiError::NotFound("Not Found".to_string())
}
