//! HTTP surface (spec §6): scrape control/inspection REST, health, and the
//! SSE/WebSocket progress streams.

mod health;
mod scrape;
mod stream;

use crate::broadcaster::Broadcaster;
use crate::clients::{bet9ja::Bet9jaClient, reference::ReferenceClient, sportybet::SportybetClient};
use crate::orchestrator::Orchestrator;
use crate::run_metadata::RunMetadataStore;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub run_metadata: Arc<RunMetadataStore>,
    pub broadcaster: Arc<Broadcaster>,
    pub reference_client: Arc<ReferenceClient>,
    pub sportybet_client: Arc<SportybetClient>,
    pub bet9ja_client: Arc<Bet9jaClient>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/scrape", post(scrape::start_scrape))
        .route("/scrape/runs", get(scrape::list_runs))
        .route("/scrape/stats", get(scrape::stats))
        .route("/scrape/:id", get(scrape::get_run))
        .route("/scrape/:id/retry", post(scrape::retry_run))
        .route("/scrape/runs/:id/progress", get(stream::scrape_progress_sse))
        .route("/ws", get(stream::ws_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
