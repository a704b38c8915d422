//! HTTP surface for the History Query Service (spec §6).

mod events;
mod health;

use axum::routing::get;
use axum::Router;
use odds_core::registry::MarketRegistry;
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub registry: Arc<MarketRegistry>,
}

pub fn router(pool: PgPool, registry: Arc<MarketRegistry>) -> Router {
    let state = AppState { pool, registry };
    Router::new()
        .route("/health", get(health::health_check))
        .route("/events", get(events::list_events))
        .route("/events/unmatched", get(events::unmatched_events))
        .route("/events/:id", get(events::get_event_detail))
        .route("/events/:id/markets/:market_id/history", get(events::odds_history))
        .route("/events/:id/markets/:market_id/margin-history", get(events::margin_history))
        .route("/coverage", get(events::coverage_stats))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
