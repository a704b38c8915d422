use super::AppState;
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize)]
pub struct PlatformHealth {
    pub platform: &'static str,
    pub ok: bool,
    pub latency_ms: u64,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub platforms: Vec<PlatformHealth>,
}

/// `GET /health` (spec §6): reports each client's `check_health()` result.
/// `ok` is the conjunction of all three — a single unhealthy upstream does
/// not make the service itself unhealthy, but callers should know.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let (reference, sportybet, bet9ja) = tokio::join!(
        state.reference_client.check_health(),
        state.sportybet_client.check_health(),
        state.bet9ja_client.check_health(),
    );

    let platforms = vec![
        PlatformHealth { platform: "reference", ok: reference.ok, latency_ms: reference.latency_ms },
        PlatformHealth { platform: "sportybet", ok: sportybet.ok, latency_ms: sportybet.latency_ms },
        PlatformHealth { platform: "bet9ja", ok: bet9ja.ok, latency_ms: bet9ja.latency_ms },
    ];

    Json(HealthResponse { ok: platforms.iter().all(|p| p.ok), platforms })
}
