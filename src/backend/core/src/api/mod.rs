//! HTTP API for the trainee actions service.
//!
//! The query/command surface mirrors what the reconciliation engine and
//! query service expose: a trainee's own action list and completion, an
//! internal programme membership view, and the bulk owner move.

pub mod auth;
mod handlers;

use axum::{
    routing::{get, patch, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::service::ActionService;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ActionService>,
    pub metrics: PrometheusHandle,
}

/// API response wrapper.
#[derive(serde::Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

/// Build the API router.
///
/// # Endpoints
///
/// - `GET /health` - liveness probe
/// - `GET /metrics` - Prometheus exposition
/// - `GET /api/action` - incomplete actions for the authenticated trainee
/// - `POST /api/action/:action_id/complete` - complete an action as the
///   authenticated trainee
/// - `GET /api/action/:trainee_id/:programme_id` - programme membership and
///   person actions (internal)
/// - `PATCH /api/action/move/:from_trainee_id/to/:to_trainee_id` - bulk
///   owner move (internal)
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::prometheus_metrics))
        .route("/api/action", get(handlers::get_trainee_actions))
        .route("/api/action/:id/complete", post(handlers::complete_action))
        .route(
            "/api/action/:id/:programme_id",
            get(handlers::get_trainee_programme_actions),
        )
        .route(
            "/api/action/move/:from_trainee_id/to/:to_trainee_id",
            patch(handlers::move_actions),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
