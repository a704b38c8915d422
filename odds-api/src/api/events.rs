use super::AppState;
use crate::queries::{self, EventListFilter};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use odds_core::error::ProblemDocument;
use odds_core::model::MarketClass;
use odds_core::registry::MarketRegistry;
use serde::Deserialize;
use sqlx::PgPool;

pub struct ApiError(StatusCode, ProblemDocument);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(self.1)).into_response()
    }
}

fn db_error(e: sqlx::Error) -> ApiError {
    ApiError(
        StatusCode::INTERNAL_SERVER_ERROR,
        ProblemDocument { error_type: "storage".to_string(), message: e.to_string(), platform: None, recoverable: true },
    )
}

fn invalid_request(message: impl Into<String>) -> ApiError {
    ApiError(
        StatusCode::BAD_REQUEST,
        ProblemDocument { error_type: "invalid_request".to_string(), message: message.into(), platform: None, recoverable: false },
    )
}

fn not_found(message: impl Into<String>) -> ApiError {
    ApiError(
        StatusCode::NOT_FOUND,
        ProblemDocument { error_type: "not_found".to_string(), message: message.into(), platform: None, recoverable: false },
    )
}

async fn bookmaker_id_for_slug(pool: &PgPool, slug: &str) -> Result<i64, ApiError> {
    sqlx::query_scalar::<_, i64>("SELECT id FROM bookmakers WHERE slug = $1")
        .bind(slug)
        .fetch_optional(pool)
        .await
        .map_err(db_error)?
        .ok_or_else(|| not_found(format!("unknown bookmaker '{slug}'")))
}

/// A specifier market (over/under, handicap) has no meaning without a
/// `line`; history for one must always be filtered (spec §4.E invariant).
fn require_line_for_specifier_market(registry: &MarketRegistry, market_id: &str, line: Option<f64>) -> Result<(), ApiError> {
    let Some(definition) = registry.find_by_canonical_id(market_id).or_else(|| registry.find_by_reference_id(market_id)) else {
        return Ok(());
    };
    let is_specifier = definition.has_flag(MarketClass::OverUnder) || definition.has_flag(MarketClass::Handicap);
    if is_specifier && line.is_none() {
        return Err(invalid_request(format!("market '{market_id}' requires a 'line' query parameter")));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct ListEventsQuery {
    pub kickoff_from: Option<DateTime<Utc>>,
    pub kickoff_to: Option<DateTime<Utc>>,
    pub tournament_id: Option<i64>,
    pub sport_id: Option<i64>,
    pub min_bookmakers: Option<i64>,
    #[serde(default)]
    pub include_started: bool,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
}

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    50
}

/// `GET /events`.
pub async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<ListEventsQuery>,
) -> Result<Json<queries::EventListPage>, ApiError> {
    let filter = EventListFilter {
        kickoff_from: query.kickoff_from,
        kickoff_to: query.kickoff_to,
        tournament_id: query.tournament_id,
        sport_id: query.sport_id,
        min_bookmakers: query.min_bookmakers,
        include_started: query.include_started,
        page: query.page,
        page_size: query.page_size,
    };
    queries::list_events(&state.pool, &state.registry, &filter).await.map(Json).map_err(db_error)
}

#[derive(Debug, Deserialize)]
pub struct UnmatchedQuery {
    #[serde(default = "default_page_size")]
    pub limit: i64,
}

/// `GET /events/unmatched`.
pub async fn unmatched_events(
    State(state): State<AppState>,
    Query(query): Query<UnmatchedQuery>,
) -> Result<Json<Vec<queries::EventListItem>>, ApiError> {
    queries::unmatched_events(&state.pool, &state.registry, query.limit).await.map(Json).map_err(db_error)
}

/// `GET /events/{id}`.
pub async fn get_event_detail(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<queries::EventDetail>, ApiError> {
    queries::get_event_detail(&state.pool, id)
        .await
        .map_err(db_error)?
        .map(Json)
        .ok_or_else(|| not_found(format!("event {id} not found")))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub bookmaker_slug: String,
    pub line: Option<f64>,
}

/// `GET /events/{id}/markets/{market_id}/history`.
pub async fn odds_history(
    State(state): State<AppState>,
    Path((event_id, market_id)): Path<(i64, String)>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<odds_core::model::MarketOdds>>, ApiError> {
    require_line_for_specifier_market(&state.registry, &market_id, query.line)?;
    let bookmaker_id = bookmaker_id_for_slug(&state.pool, &query.bookmaker_slug).await?;
    queries::odds_history(&state.pool, event_id, bookmaker_id, &market_id, query.line)
        .await
        .map(Json)
        .map_err(db_error)
}

/// `GET /events/{id}/markets/{market_id}/margin-history`.
pub async fn margin_history(
    State(state): State<AppState>,
    Path((event_id, market_id)): Path<(i64, String)>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<queries::MarginPoint>>, ApiError> {
    require_line_for_specifier_market(&state.registry, &market_id, query.line)?;
    let bookmaker_id = bookmaker_id_for_slug(&state.pool, &query.bookmaker_slug).await?;
    queries::margin_history(&state.pool, event_id, bookmaker_id, &market_id, query.line)
        .await
        .map(Json)
        .map_err(db_error)
}

/// `GET /coverage` (spec §4.G coverage_stats).
pub async fn coverage_stats(State(state): State<AppState>) -> Result<Json<queries::CoverageStats>, ApiError> {
    queries::coverage_stats(&state.pool).await.map(Json).map_err(db_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A line-less request for a market with no line of its own (1X2) must
    /// pass through untouched (spec §4.E, round-trip property "history for a
    /// non-specifier market ignores `line`").
    #[test]
    fn non_specifier_market_never_requires_a_line() {
        let registry = MarketRegistry::load();
        assert!(require_line_for_specifier_market(&registry, "1x2", None).is_ok());
    }

    /// A specifier market (over/under) with no `line` must be rejected
    /// rather than silently returning unfiltered history across every line
    /// (spec §4.E E1: the mandatory-line invariant).
    #[test]
    fn specifier_market_without_line_is_rejected() {
        let registry = MarketRegistry::load();
        let err = require_line_for_specifier_market(&registry, "over_under", None);
        assert!(err.is_err());
    }

    #[test]
    fn specifier_market_with_line_is_accepted() {
        let registry = MarketRegistry::load();
        assert!(require_line_for_specifier_market(&registry, "over_under", Some(2.5)).is_ok());
    }

    /// An unknown market id isn't this function's concern — the query
    /// itself will simply return no rows downstream.
    #[test]
    fn unknown_market_id_is_not_rejected() {
        let registry = MarketRegistry::load();
        assert!(require_line_for_specifier_market(&registry, "not_a_real_market", None).is_ok());
    }
}
