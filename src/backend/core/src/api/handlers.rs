//! API request handlers with proper error propagation.
//!
//! Handlers return `Result<impl IntoResponse, ActionsError>` so that errors
//! convert to appropriate HTTP status codes via the `IntoResponse`
//! implementation on `ActionsError`.

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap},
    response::IntoResponse,
    Json,
};
use tracing::info;

use super::{ApiResponse, AppState};
use crate::api::auth;
use crate::error::{ActionsError, Result};

pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

pub async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics.render()
}

fn authenticated_trainee(headers: &HeaderMap) -> Result<String> {
    let header_value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ActionsError::InvalidToken("missing authorization header".into()))?;
    auth::trainee_id_from_token(header_value)
}

/// `GET /api/action` - available incomplete actions for the authenticated
/// trainee.
pub async fn get_trainee_actions(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse> {
    let trainee_id = authenticated_trainee(&headers)?;
    info!(trainee_id, "received request to get actions of authenticated user");

    let actions = state.service.find_incomplete_actions(&trainee_id).await?;
    info!(trainee_id, count = actions.len(), "incomplete actions found");

    Ok(Json(ApiResponse::success(actions)))
}

/// `POST /api/action/:action_id/complete` - mark a trainee's own action as
/// completed.
pub async fn complete_action(
    State(state): State<AppState>,
    Path(action_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse> {
    let trainee_id = authenticated_trainee(&headers)?;
    info!(trainee_id, action_id, "received request to complete action");

    match state.service.complete_as_user(&trainee_id, &action_id).await? {
        Some(action) => Ok(Json(ApiResponse::success(action))),
        None => Err(ActionsError::NotFound("action not found".into())),
    }
}

/// `GET /api/action/:trainee_id/:programme_id` - all actions for a trainee's
/// programme membership plus their person-level actions. Internal endpoint,
/// no authorization token.
pub async fn get_trainee_programme_actions(
    State(state): State<AppState>,
    Path((trainee_id, programme_id)): Path<(String, String)>,
) -> Result<impl IntoResponse> {
    info!(
        trainee_id,
        programme_id, "received request to get programme membership actions"
    );

    let actions = state
        .service
        .find_programme_actions(&trainee_id, &programme_id)
        .await?;
    info!(trainee_id, count = actions.len(), "actions found");

    Ok(Json(ApiResponse::success(actions)))
}

/// `PATCH /api/action/move/:from/to/:to` - move all actions between
/// trainees.
pub async fn move_actions(
    State(state): State<AppState>,
    Path((from_trainee_id, to_trainee_id)): Path<(String, String)>,
) -> Result<impl IntoResponse> {
    info!(
        from_trainee_id,
        to_trainee_id, "received request to move actions"
    );

    state
        .service
        .move_actions(&from_trainee_id, &to_trainee_id)
        .await?;
    Ok(Json(ApiResponse::success(true)))
}
