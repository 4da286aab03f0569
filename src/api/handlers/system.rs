use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use crate::api::{state::AppState, types::*};
use crate::services::HealthStatus;

/// GET /server_check
pub async fn server_check() -> Json<StatusResponse> {
    Json(StatusResponse::ok())
}

/// GET /db_check
pub async fn db_check(
    State(state): State<AppState>,
) -> std::result::Result<Json<StatusResponse>, ApiError> {
    state
        .query
        .store()
        .ping()
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(StatusResponse::ok()))
}

/// GET /health
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let health = state.health.get_health().await;
    let status_code = match health.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(health))
}
