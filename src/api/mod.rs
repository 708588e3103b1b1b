//! Check-in resource API.
//!
//! Every route except `/health` sits behind the [`AccessGate`]; the role
//! each route requires is attached to its handler.

mod checkins;
pub mod model;
mod reports;
mod responses;

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State},
    handler::Handler,
    http::{HeaderValue, Method, header},
    middleware::from_fn_with_state,
    routing::{get, post},
};
use serde_json::{Value, json};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use crate::auth::gate::enforce;
use crate::auth::handler::not_found_handler;
use crate::auth::limiter::limit_attempts;
use crate::auth::{AccessGate, AttemptLimiter, Role};
use model::CheckinBoard;

/// Shared state of the resource API
#[derive(Debug, Clone)]
pub struct AppState {
    /// Token and role checks
    pub gate: AccessGate,
    /// Check-ins and responses
    pub board: Arc<CheckinBoard>,
    /// Process start, for `/health`
    pub started_at: Instant,
}

/// Create the resource API router
pub fn create_router(
    state: AppState,
    limiter: Arc<AttemptLimiter>,
    cors_origins: &[String],
    max_body_size: usize,
) -> Router {
    let anyone = from_fn_with_state(state.gate.require(&[]), enforce);
    let manager = from_fn_with_state(state.gate.require(&[Role::Manager]), enforce);
    let member = from_fn_with_state(state.gate.require(&[Role::Member]), enforce);

    Router::new()
        .route(
            "/checkins",
            get(checkins::list_handler.layer(anyone))
                .post(checkins::create_handler.layer(manager.clone())),
        )
        .route(
            "/responses",
            post(responses::create_handler.layer(member.clone())),
        )
        .route("/responses/me", get(responses::mine_handler.layer(member)))
        .route(
            "/reports/checkin/{check_in_id}",
            get(reports::by_check_in_handler.layer(manager.clone())),
        )
        .route(
            "/reports/checkin/user/{user_id}",
            get(reports::by_user_handler.layer(manager.clone())),
        )
        .route(
            "/reports/summary",
            get(reports::summary_handler.layer(manager)),
        )
        .route("/health", get(health_handler))
        .fallback(not_found_handler)
        .layer(DefaultBodyLimit::max(max_body_size))
        .layer(from_fn_with_state(limiter, limit_attempts))
        .layer(cors_layer(cors_origins))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "uptime": state.started_at.elapsed().as_secs_f64(),
    }))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}
