use super::AppState;
use crate::orchestrator::{DetailLevel, ScrapeRequest};
use crate::run_metadata::RunStats;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use odds_core::error::ProblemDocument;
use odds_core::model::{Platform, PlatformStatus, RunTrigger, ScrapeRun};
use serde::Deserialize;
use std::sync::Arc;

pub struct ApiError(StatusCode, ProblemDocument);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(self.1)).into_response()
    }
}

fn db_error(e: sqlx::Error) -> ApiError {
    ApiError(
        StatusCode::INTERNAL_SERVER_ERROR,
        ProblemDocument {
            error_type: "storage".to_string(),
            message: e.to_string(),
            platform: None,
            recoverable: true,
        },
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

#[derive(Debug, Deserialize)]
pub struct StartScrapeBody {
    #[serde(default)]
    pub platforms: Vec<String>,
    pub sport_id: Option<i64>,
    pub tournament_id: Option<i64>,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub summary_only: bool,
}

fn default_timeout() -> u64 {
    120
}

#[derive(serde::Serialize)]
pub struct StartScrapeResponse {
    pub run_id: i64,
}

/// `POST /scrape` (spec §6): opens a new run and returns its id
/// immediately; the run itself proceeds in the background.
pub async fn start_scrape(
    State(state): State<Arc<AppState>>,
    Json(body): Json<StartScrapeBody>,
) -> Result<Json<StartScrapeResponse>, ApiError> {
    let platforms = parse_platforms(&body.platforms)?;
    let request = ScrapeRequest {
        platforms,
        sport_id: body.sport_id,
        tournament_id: body.tournament_id,
        timeout_seconds: body.timeout_seconds,
        detail: if body.summary_only { DetailLevel::Summary } else { DetailLevel::Full },
        trigger: RunTrigger::Manual,
    };

    let run_id = state.orchestrator.clone().start(request).await.map_err(db_error)?;
    Ok(Json(StartScrapeResponse { run_id }))
}

pub async fn get_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ScrapeRun>, ApiError> {
    state
        .run_metadata
        .get_run(id)
        .await
        .map_err(db_error)?
        .map(Json)
        .ok_or_else(|| not_found(format!("run {id} not found")))
}

#[derive(Debug, Deserialize)]
pub struct ListRunsQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

pub async fn list_runs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListRunsQuery>,
) -> Result<Json<Vec<ScrapeRun>>, ApiError> {
    let limit = query.limit.clamp(1, 200);
    state.run_metadata.list_runs(limit, query.offset.max(0)).await.map(Json).map_err(db_error)
}

pub async fn stats(State(state): State<Arc<AppState>>) -> Result<Json<RunStats>, ApiError> {
    state.run_metadata.stats_24h().await.map(Json).map_err(db_error)
}

#[derive(Debug, Deserialize)]
pub struct RetryRequest {
    pub platforms: Vec<String>,
}

/// `POST /scrape/{id}/retry` (spec §6): opens a fresh run scoped to exactly
/// the platforms the caller names in the request body, validated against the
/// set that did not complete in the named run.
pub async fn retry_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<RetryRequest>,
) -> Result<Json<StartScrapeResponse>, ApiError> {
    let run = state
        .run_metadata
        .get_run(id)
        .await
        .map_err(db_error)?
        .ok_or_else(|| not_found(format!("run {id} not found")))?;

    let incomplete: std::collections::HashSet<Platform> = run
        .platform_status
        .into_iter()
        .filter(|(_, status)| *status != PlatformStatus::Completed)
        .map(|(platform, _)| platform)
        .collect();

    if body.platforms.is_empty() {
        return Err(invalid_request("retry request must name at least one platform"));
    }
    let requested_platforms = parse_platforms(&body.platforms)?;
    for platform in &requested_platforms {
        if !incomplete.contains(platform) {
            return Err(invalid_request(format!("platform '{platform}' did not fail in run {id}")));
        }
    }

    let new_run_id = state.run_metadata.retry_platforms(&requested_platforms).await.map_err(db_error)?;
    let request = ScrapeRequest {
        platforms: requested_platforms,
        sport_id: None,
        tournament_id: None,
        timeout_seconds: 120,
        detail: DetailLevel::Full,
        trigger: RunTrigger::Retry,
    };
    state
        .orchestrator
        .clone()
        .resume(new_run_id, request)
        .await
        .map_err(db_error)?;

    Ok(Json(StartScrapeResponse { run_id: new_run_id }))
}

fn parse_platforms(raw: &[String]) -> Result<Vec<Platform>, ApiError> {
    if raw.is_empty() {
        return Ok(Platform::all().to_vec());
    }
    raw.iter()
        .map(|p| p.parse::<Platform>().map_err(invalid_request))
        .collect()
}
