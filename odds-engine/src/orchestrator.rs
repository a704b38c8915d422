//! Orchestrator (spec §4.D) — drives one `ScrapeRun` end-to-end: platform
//! fan-out, per-platform phase emission, partial-failure aggregation,
//! progress publication.

use crate::broadcaster::{Broadcaster, ProgressError, ProgressEvent, Topic};
use crate::clients::{
    bet9ja::Bet9jaClient, reference::ReferenceClient, sportybet::SportybetClient, ClientError,
    EventSummary, INTER_REQUEST_PAUSE, MAX_CONCURRENT_FETCHES,
};
use crate::run_metadata::RunMetadataStore;
use chrono::Utc;
use odds_core::error::ScrapeErrorType;
use odds_core::matcher::{resolve_event, FixtureSighting};
use odds_core::model::{Platform, PlatformStatus, RunStatus, RunTrigger, ScrapePhase};
use odds_core::normalize::{bet9ja, reference, sportybet};
use odds_core::registry::MarketRegistry;
use odds_core::snapshot_store::SnapshotStore;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// `detail=summary` stores only discovery-level coverage; `detail=full`
/// fetches and stores every market (spec §4.D Inputs).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailLevel {
    Summary,
    Full,
}

#[derive(Debug, Clone)]
pub struct ScrapeRequest {
    pub platforms: Vec<Platform>,
    pub sport_id: Option<i64>,
    pub tournament_id: Option<i64>,
    pub timeout_seconds: u64,
    pub detail: DetailLevel,
    pub trigger: RunTrigger,
}

impl ScrapeRequest {
    pub fn clamped_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.clamp(5, 300))
    }
}

struct PlatformOutcome {
    platform: Platform,
    status: PlatformStatus,
    events_scraped: i64,
    events_failed: i64,
}

pub struct Orchestrator {
    pool: PgPool,
    registry: Arc<MarketRegistry>,
    run_metadata: Arc<RunMetadataStore>,
    broadcaster: Arc<Broadcaster>,
    reference_client: Arc<ReferenceClient>,
    sportybet_client: Arc<SportybetClient>,
    bet9ja_client: Arc<Bet9jaClient>,
}

impl Orchestrator {
    pub fn new(
        pool: PgPool,
        registry: Arc<MarketRegistry>,
        run_metadata: Arc<RunMetadataStore>,
        broadcaster: Arc<Broadcaster>,
        reference_client: Arc<ReferenceClient>,
        sportybet_client: Arc<SportybetClient>,
        bet9ja_client: Arc<Bet9jaClient>,
    ) -> Self {
        Orchestrator {
            pool,
            registry,
            run_metadata,
            broadcaster,
            reference_client,
            sportybet_client,
            bet9ja_client,
        }
    }

    /// Opens a run and fans platforms out in parallel. Returns the run id
    /// immediately to the caller (spec §6 `POST /scrape`); the run itself
    /// continues in the background task this spawns.
    pub async fn start(self: Arc<Self>, request: ScrapeRequest) -> Result<i64, sqlx::Error> {
        let run_id = self.run_metadata.open_run(request.trigger, &request.platforms).await?;
        self.resume(run_id, request).await?;
        Ok(run_id)
    }

    /// Drives `request` against a run id that has already been opened
    /// (spec §6 `POST /scrape/{id}/retry`, where `run_metadata` opens the
    /// retry run before the orchestrator takes over).
    pub async fn resume(self: Arc<Self>, run_id: i64, request: ScrapeRequest) -> Result<(), sqlx::Error> {
        let this = self.clone();
        tokio::spawn(async move {
            this.drive_run(run_id, request).await;
        });
        Ok(())
    }

    async fn drive_run(&self, run_id: i64, request: ScrapeRequest) {
        let deadline = request.clamped_timeout();
        let cancel = CancellationToken::new();

        let mut join_set = tokio::task::JoinSet::new();
        for platform in request.platforms.clone() {
            let this = self.snapshot_refs();
            let cancel = cancel.clone();
            let sport_id = request.sport_id;
            let tournament_id = request.tournament_id;
            let detail = request.detail;
            join_set.spawn(async move {
                this.run_platform(run_id, platform, sport_id, tournament_id, detail, cancel).await
            });
        }

        let collect = async {
            let mut outcomes = Vec::new();
            while let Some(res) = join_set.join_next().await {
                match res {
                    Ok(outcome) => outcomes.push(outcome),
                    Err(e) => error!(run_id, error = %e, "platform task panicked"),
                }
            }
            outcomes
        };

        let outcomes = match tokio::time::timeout(deadline, collect).await {
            Ok(outcomes) => outcomes,
            Err(_) => {
                warn!(run_id, "run deadline exceeded, cancelling remaining platforms");
                cancel.cancel();
                let mut outcomes = Vec::new();
                while let Some(res) = join_set.join_next().await {
                    if let Ok(outcome) = res {
                        outcomes.push(outcome);
                    }
                }
                outcomes
            }
        };

        let final_status = aggregate_status(&outcomes, &request.platforms);
        let events_scraped: i64 = outcomes.iter().map(|o| o.events_scraped).sum();
        let events_failed: i64 = outcomes.iter().map(|o| o.events_failed).sum();
        if let Err(e) = self.run_metadata.close_run(run_id, final_status, events_scraped, events_failed).await {
            error!(run_id, error = %e, "failed to close run");
        }
        info!(run_id, status = ?final_status, events_scraped, events_failed, "run finished");
    }

    /// Cheap `Arc` clones for use inside a spawned platform task.
    fn snapshot_refs(&self) -> PlatformWorker {
        PlatformWorker {
            pool: self.pool.clone(),
            registry: self.registry.clone(),
            run_metadata: self.run_metadata.clone(),
            broadcaster: self.broadcaster.clone(),
            reference_client: self.reference_client.clone(),
            sportybet_client: self.sportybet_client.clone(),
            bet9ja_client: self.bet9ja_client.clone(),
        }
    }
}

fn aggregate_status(outcomes: &[PlatformOutcome], requested: &[Platform]) -> RunStatus {
    if outcomes.len() < requested.len() {
        // Platforms that never reported back (panicked, or still running
        // at deadline without returning) count as failed for aggregation.
        return if outcomes.iter().all(|o| o.status == PlatformStatus::Failed) {
            RunStatus::Failed
        } else {
            RunStatus::Partial
        };
    }
    if outcomes.iter().all(|o| o.status == PlatformStatus::Completed) {
        RunStatus::Completed
    } else if outcomes.iter().all(|o| o.status == PlatformStatus::Failed) {
        RunStatus::Failed
    } else {
        RunStatus::Partial
    }
}

/// Holds the `Arc`-shared dependencies a single platform subtask needs,
/// cloned cheaply per spawn (spec §4.D Fan-out: each platform is a
/// self-contained pipeline, and each event fetch within it is its own
/// spawned task bounded by the shared semaphore).
#[derive(Clone)]
struct PlatformWorker {
    pool: PgPool,
    registry: Arc<MarketRegistry>,
    run_metadata: Arc<RunMetadataStore>,
    broadcaster: Arc<Broadcaster>,
    reference_client: Arc<ReferenceClient>,
    sportybet_client: Arc<SportybetClient>,
    bet9ja_client: Arc<Bet9jaClient>,
}

impl PlatformWorker {
    async fn run_platform(
        self,
        run_id: i64,
        platform: Platform,
        sport_id: Option<i64>,
        tournament_id: Option<i64>,
        detail: DetailLevel,
        cancel: CancellationToken,
    ) -> PlatformOutcome {
        let start = Instant::now();
        let _ = self.run_metadata.record_platform_status(run_id, platform, PlatformStatus::Active).await;
        self.ensure_bookmaker(platform).await.ok();

        let result = self.run_platform_pipeline(run_id, platform, sport_id, tournament_id, detail, &cancel).await;

        let duration_ms = start.elapsed().as_millis() as i64;
        let (status, events_scraped, events_failed) = match result {
            Ok((scraped, failed)) if cancel.is_cancelled() => {
                self.record_error(run_id, platform, ScrapeErrorType::DeadlineExceeded, "run deadline exceeded").await;
                (PlatformStatus::Failed, scraped, failed)
            }
            Ok((scraped, failed)) => (PlatformStatus::Completed, scraped, failed),
            Err(e) => {
                self.record_error(run_id, platform, e.error_type(), &e.message()).await;
                (PlatformStatus::Failed, 0, 0)
            }
        };

        let _ = self.run_metadata.record_platform_timing(run_id, platform, duration_ms, events_scraped).await;
        let _ = self.run_metadata.record_platform_status(run_id, platform, status).await;
        self.publish_progress(run_id, platform, None, status, events_scraped, start.elapsed());

        PlatformOutcome { platform, status, events_scraped, events_failed }
    }

    async fn run_platform_pipeline(
        &self,
        run_id: i64,
        platform: Platform,
        sport_id: Option<i64>,
        tournament_id: Option<i64>,
        detail: DetailLevel,
        cancel: &CancellationToken,
    ) -> Result<(i64, i64), ClientError> {
        self.transition(run_id, platform, ScrapePhase::Discovering).await;
        let summaries = self.discover(platform, sport_id, tournament_id).await?;
        self.publish_progress(run_id, platform, Some("discovering"), PlatformStatus::Active, summaries.len() as i64, Duration::default());

        self.transition(run_id, platform, ScrapePhase::Scraping).await;
        let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_FETCHES));
        let mut scraped = 0i64;
        let mut failed = 0i64;

        let mut fetches = tokio::task::JoinSet::new();
        for summary in summaries.iter().cloned() {
            if cancel.is_cancelled() {
                break;
            }
            let this = self.clone();
            let semaphore = semaphore.clone();
            fetches.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
                tokio::time::sleep(INTER_REQUEST_PAUSE).await;
                let result = this.fetch_and_store_event(platform, &summary, detail).await;
                (summary, result)
            });
        }

        while let Some(joined) = fetches.join_next().await {
            match joined {
                Ok((summary, Ok(()))) => scraped += 1,
                Ok((summary, Err(e))) => {
                    warn!(run_id, platform = %platform, event = %summary.external_event_id, error = %e, "event dropped");
                    self.record_error(run_id, platform, e.error_type(), &e.message()).await;
                    failed += 1;
                }
                Err(e) => {
                    error!(run_id, platform = %platform, error = %e, "fetch task panicked");
                    failed += 1;
                }
            }
        }

        self.transition(run_id, platform, ScrapePhase::Storing).await;
        Ok((scraped, failed))
    }

    async fn discover(
        &self,
        platform: Platform,
        sport_id: Option<i64>,
        tournament_id: Option<i64>,
    ) -> Result<Vec<EventSummary>, ClientError> {
        match platform {
            Platform::Reference => self.reference_client.fetch_events(sport_id.unwrap_or(1), tournament_id).await,
            Platform::Sportybet => self.sportybet_client.fetch_events(tournament_id.unwrap_or(0)).await,
            Platform::Bet9ja => self.bet9ja_client.fetch_events(tournament_id.unwrap_or(0)).await,
        }
    }

    async fn fetch_and_store_event(
        &self,
        platform: Platform,
        summary: &EventSummary,
        detail: DetailLevel,
    ) -> Result<(), ClientError> {
        let bookmaker_id = self.bookmaker_id(platform).await.map_err(|e| ClientError::InvalidResponse(e.to_string()))?;

        let sighting = FixtureSighting {
            bookmaker_id,
            external_event_id: summary.external_event_id.clone(),
            correlation_id: summary.correlation_id.clone(),
            home_team: summary.home_team.clone(),
            away_team: summary.away_team.clone(),
            kickoff_time: summary.kickoff_time,
            sport_id: 1,
            tournament_id: 1,
        };
        let event_id = resolve_event(&self.pool, &sighting)
            .await
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;

        if detail == DetailLevel::Summary {
            return Ok(());
        }

        let batch = match platform {
            Platform::Reference => {
                let raw = self.reference_client.fetch_event(&summary.external_event_id).await?;
                reference::normalize_batch(&self.registry, &raw)
            }
            Platform::Sportybet => {
                let raw = self.sportybet_client.fetch_event(&summary.external_event_id).await?;
                sportybet::normalize_batch(&self.registry, &raw)
            }
            Platform::Bet9ja => {
                let raw = self.bet9ja_client.fetch_event(&summary.external_event_id).await?;
                bet9ja::normalize_batch(&self.registry, &raw)
            }
        };

        for mapping_error in &batch.errors {
            warn!(platform = %platform, event = %summary.external_event_id, error = %mapping_error, "market dropped");
        }

        let snapshot_store = SnapshotStore::new(self.pool.clone());
        let capture_time = Utc::now();
        let market_odds: Vec<_> = batch
            .markets
            .into_iter()
            .enumerate()
            .map(|(i, m)| m.into_market_odds(i as i64))
            .collect();

        snapshot_store
            .append_snapshot(event_id, bookmaker_id, capture_time, &market_odds)
            .await
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;

        Ok(())
    }

    /// Creates the bookmaker row on first use of a platform, no migration
    /// required (spec §4.D Bookmaker auto-registration).
    async fn ensure_bookmaker(&self, platform: Platform) -> Result<i64, sqlx::Error> {
        let role = if platform == Platform::Reference { "reference" } else { "competitor" };
        sqlx::query_scalar(
            r#"
            INSERT INTO bookmakers (slug, display_name, role)
            VALUES ($1, $2, $3)
            ON CONFLICT (slug) DO UPDATE SET slug = EXCLUDED.slug
            RETURNING id
            "#,
        )
        .bind(platform.as_str())
        .bind(display_name(platform))
        .bind(role)
        .fetch_one(&self.pool)
        .await
    }

    async fn bookmaker_id(&self, platform: Platform) -> Result<i64, sqlx::Error> {
        if let Some(id) = sqlx::query("SELECT id FROM bookmakers WHERE slug = $1")
            .bind(platform.as_str())
            .fetch_optional(&self.pool)
            .await?
            .map(|row| row.get::<i64, _>("id"))
        {
            return Ok(id);
        }
        self.ensure_bookmaker(platform).await
    }

    async fn transition(&self, run_id: i64, platform: Platform, phase: ScrapePhase) {
        let _ = self
            .run_metadata
            .record_phase(run_id, Some(platform), phase, None, phase.as_str(), None)
            .await;
        self.publish_progress(run_id, platform, Some(phase.as_str()), PlatformStatus::Active, 0, Duration::default());
    }

    async fn record_error(&self, run_id: i64, platform: Platform, error_type: ScrapeErrorType, message: &str) {
        if let Err(e) = self.run_metadata.record_error(run_id, Some(platform), error_type, message).await {
            error!(run_id, error = %e, "failed to record scrape error");
        }
    }

    fn publish_progress(
        &self,
        run_id: i64,
        platform: Platform,
        phase: Option<&str>,
        status: PlatformStatus,
        events_count: i64,
        elapsed: Duration,
    ) {
        let error = match status {
            PlatformStatus::Failed => Some(ProgressError {
                error_type: "platform_failed".to_string(),
                message: format!("platform {platform} did not complete"),
                recoverable: true,
            }),
            _ => None,
        };
        self.broadcaster.publish(ProgressEvent {
            topic: Topic::ScrapeProgress,
            run_id,
            platform: Some(platform),
            phase: phase.map(str::to_string),
            current: 0,
            total: 0,
            events_count,
            elapsed_ms: elapsed.as_millis() as i64,
            message: phase.unwrap_or("").to_string(),
            error,
            timestamp: Utc::now(),
        });
    }
}

fn display_name(platform: Platform) -> &'static str {
    match platform {
        Platform::Reference => "Betpawa",
        Platform::Sportybet => "SportyBet",
        Platform::Bet9ja => "Bet9ja",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(platform: Platform, status: PlatformStatus) -> PlatformOutcome {
        PlatformOutcome { platform, status, events_scraped: 0, events_failed: 0 }
    }

    /// Every requested platform completed (spec §8 E2 partial-run scenario,
    /// the all-succeed baseline).
    #[test]
    fn all_completed_yields_completed() {
        let requested = vec![Platform::Reference, Platform::Sportybet, Platform::Bet9ja];
        let outcomes = vec![
            outcome(Platform::Reference, PlatformStatus::Completed),
            outcome(Platform::Sportybet, PlatformStatus::Completed),
            outcome(Platform::Bet9ja, PlatformStatus::Completed),
        ];
        assert_eq!(aggregate_status(&outcomes, &requested), RunStatus::Completed);
    }

    /// One platform fails while the rest complete (spec §8 E2: a partial
    /// run must aggregate to `Partial`, not `Completed` or `Failed`).
    #[test]
    fn mixed_outcomes_yield_partial() {
        let requested = vec![Platform::Reference, Platform::Sportybet, Platform::Bet9ja];
        let outcomes = vec![
            outcome(Platform::Reference, PlatformStatus::Completed),
            outcome(Platform::Sportybet, PlatformStatus::Failed),
            outcome(Platform::Bet9ja, PlatformStatus::Completed),
        ];
        assert_eq!(aggregate_status(&outcomes, &requested), RunStatus::Partial);
    }

    #[test]
    fn all_failed_yields_failed() {
        let requested = vec![Platform::Reference, Platform::Sportybet];
        let outcomes = vec![
            outcome(Platform::Reference, PlatformStatus::Failed),
            outcome(Platform::Sportybet, PlatformStatus::Failed),
        ];
        assert_eq!(aggregate_status(&outcomes, &requested), RunStatus::Failed);
    }

    /// A platform task that panicked or never returned before the deadline
    /// never appears in `outcomes` at all; with at least one real failure
    /// among the ones that did, the run is still `Partial`, not `Completed`.
    #[test]
    fn missing_outcome_with_a_real_failure_yields_partial() {
        let requested = vec![Platform::Reference, Platform::Sportybet, Platform::Bet9ja];
        let outcomes = vec![
            outcome(Platform::Reference, PlatformStatus::Completed),
            outcome(Platform::Sportybet, PlatformStatus::Failed),
        ];
        assert_eq!(aggregate_status(&outcomes, &requested), RunStatus::Partial);
    }

    /// Every platform that did report back failed, and the rest never
    /// reported at all: still `Failed`, since nothing succeeded.
    #[test]
    fn missing_outcomes_with_no_success_yields_failed() {
        let requested = vec![Platform::Reference, Platform::Sportybet, Platform::Bet9ja];
        let outcomes = vec![outcome(Platform::Reference, PlatformStatus::Failed)];
        assert_eq!(aggregate_status(&outcomes, &requested), RunStatus::Failed);
    }
}
