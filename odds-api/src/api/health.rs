use super::AppState;
use axum::extract::State;
use axum::http::StatusCode;

/// `GET /health` (spec §6): DB connectivity only — the read side has no
/// upstream clients to probe.
pub async fn health_check(State(state): State<AppState>) -> StatusCode {
    match sqlx::query("SELECT 1").fetch_one(&state.pool).await {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}
