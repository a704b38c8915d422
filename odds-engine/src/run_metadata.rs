//! Run Metadata (spec §4.I) — lifecycle recording for a `ScrapeRun`:
//! status, per-platform timings, per-phase audit log, errors with taxonomy.

use chrono::{DateTime, Utc};
use odds_core::error::{truncate_message, ScrapeErrorType};
use odds_core::model::{
    Platform, PlatformStatus, PlatformTiming, RunStatus, RunTrigger, ScrapePhase, ScrapeRun,
};
use serde_json::json;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::info;

pub struct RunMetadataStore {
    pool: PgPool,
}

#[derive(Debug, serde::Serialize)]
pub struct RunStats {
    pub total_runs: i64,
    pub runs_24h: i64,
    pub avg_duration_seconds: f64,
}

impl RunMetadataStore {
    pub fn new(pool: PgPool) -> Self {
        RunMetadataStore { pool }
    }

    pub async fn open_run(&self, trigger: RunTrigger, platforms: &[Platform]) -> Result<i64, sqlx::Error> {
        let initial_status: HashMap<&str, &str> =
            platforms.iter().map(|p| (p.as_str(), "pending")).collect();
        let run_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO scrape_runs
                (started_at, status, trigger, events_scraped, events_failed,
                 platform_timings, current_phase, current_platform, platform_status)
            VALUES (now(), 'running', $1, 0, 0, '{}'::jsonb, NULL, NULL, $2)
            RETURNING id
            "#,
        )
        .bind(trigger_str(trigger))
        .bind(json!(initial_status))
        .fetch_one(&self.pool)
        .await?;
        info!(run_id, trigger = trigger_str(trigger), "opened scrape run");
        Ok(run_id)
    }

    pub async fn record_phase(
        &self,
        run_id: i64,
        platform: Option<Platform>,
        phase: ScrapePhase,
        events_processed: Option<i64>,
        message: &str,
        error_details: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO scrape_phase_log
                (run_id, platform, phase, started_at, events_processed, message, error_details)
            VALUES ($1, $2, $3, now(), $4, $5, $6)
            "#,
        )
        .bind(run_id)
        .bind(platform.map(|p| p.as_str().to_string()))
        .bind(phase.as_str())
        .bind(events_processed)
        .bind(message)
        .bind(error_details)
        .execute(&self.pool)
        .await?;

        sqlx::query("UPDATE scrape_runs SET current_phase = $1, current_platform = $2 WHERE id = $3")
            .bind(phase.as_str())
            .bind(platform.map(|p| p.as_str().to_string()))
            .bind(run_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn record_platform_timing(
        &self,
        run_id: i64,
        platform: Platform,
        duration_ms: i64,
        events_count: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE scrape_runs
            SET platform_timings = jsonb_set(
                platform_timings, ARRAY[$1], jsonb_build_object('duration_ms', $2, 'events_count', $3)
            )
            WHERE id = $4
            "#,
        )
        .bind(platform.as_str())
        .bind(duration_ms)
        .bind(events_count)
        .bind(run_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn record_platform_status(
        &self,
        run_id: i64,
        platform: Platform,
        status: PlatformStatus,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE scrape_runs
            SET platform_status = jsonb_set(platform_status, ARRAY[$1], to_jsonb($2::text))
            WHERE id = $3
            "#,
        )
        .bind(platform.as_str())
        .bind(platform_status_str(status))
        .bind(run_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn record_error(
        &self,
        run_id: i64,
        platform: Option<Platform>,
        error_type: ScrapeErrorType,
        message: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO scrape_errors (run_id, platform, error_type, message, occurred_at)
            VALUES ($1, $2, $3, $4, now())
            "#,
        )
        .bind(run_id)
        .bind(platform.map(|p| p.as_str().to_string()))
        .bind(error_type.as_str())
        .bind(truncate_message(message))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn close_run(
        &self,
        run_id: i64,
        final_status: RunStatus,
        events_scraped: i64,
        events_failed: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE scrape_runs SET status = $1, completed_at = now(), events_scraped = $2, events_failed = $3 WHERE id = $4",
        )
        .bind(run_status_str(final_status))
        .bind(events_scraped)
        .bind(events_failed)
        .bind(run_id)
        .execute(&self.pool)
        .await?;
        info!(run_id, status = run_status_str(final_status), events_scraped, events_failed, "closed scrape run");
        Ok(())
    }

    pub async fn get_run(&self, run_id: i64) -> Result<Option<ScrapeRun>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT id, started_at, completed_at, status, trigger, events_scraped, events_failed,
                   platform_timings, current_phase, current_platform, platform_status
            FROM scrape_runs
            WHERE id = $1
            "#,
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_run).transpose()
    }

    pub async fn list_runs(&self, limit: i64, offset: i64) -> Result<Vec<ScrapeRun>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, started_at, completed_at, status, trigger, events_scraped, events_failed,
                   platform_timings, current_phase, current_platform, platform_status
            FROM scrape_runs
            ORDER BY started_at DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_run).collect()
    }

    pub async fn stats_24h(&self) -> Result<RunStats, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT count(*) FROM scrape_runs) AS total_runs,
                (SELECT count(*) FROM scrape_runs WHERE started_at >= now() - interval '24 hours') AS runs_24h,
                (SELECT COALESCE(AVG(EXTRACT(EPOCH FROM (completed_at - started_at))), 0.0)
                 FROM scrape_runs WHERE completed_at IS NOT NULL) AS avg_duration_seconds
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(RunStats {
            total_runs: row.get("total_runs"),
            runs_24h: row.get("runs_24h"),
            avg_duration_seconds: row.get("avg_duration_seconds"),
        })
    }

    /// Opens a new run restricted to `platforms` with `trigger=retry`
    /// (spec §4.I `retry_platforms`).
    pub async fn retry_platforms(&self, platforms: &[Platform]) -> Result<i64, sqlx::Error> {
        self.open_run(RunTrigger::Retry, platforms).await
    }
}

fn trigger_str(trigger: RunTrigger) -> &'static str {
    match trigger {
        RunTrigger::Scheduled => "scheduled",
        RunTrigger::Manual => "manual",
        RunTrigger::Retry => "retry",
    }
}

fn run_status_str(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Running => "running",
        RunStatus::Completed => "completed",
        RunStatus::Partial => "partial",
        RunStatus::Failed => "failed",
    }
}

fn platform_status_str(status: PlatformStatus) -> &'static str {
    match status {
        PlatformStatus::Pending => "pending",
        PlatformStatus::Active => "active",
        PlatformStatus::Completed => "completed",
        PlatformStatus::Failed => "failed",
    }
}

fn parse_run_status(s: &str) -> RunStatus {
    match s {
        "completed" => RunStatus::Completed,
        "partial" => RunStatus::Partial,
        "failed" => RunStatus::Failed,
        _ => RunStatus::Running,
    }
}

fn parse_platform_status(s: &str) -> PlatformStatus {
    match s {
        "active" => PlatformStatus::Active,
        "completed" => PlatformStatus::Completed,
        "failed" => PlatformStatus::Failed,
        _ => PlatformStatus::Pending,
    }
}

fn row_to_run(row: sqlx::postgres::PgRow) -> Result<ScrapeRun, sqlx::Error> {
    let status_str: String = row.get("status");
    let trigger_str: String = row.get("trigger");
    let trigger = match trigger_str.as_str() {
        "manual" => RunTrigger::Manual,
        "retry" => RunTrigger::Retry,
        _ => RunTrigger::Scheduled,
    };

    let timings_json: serde_json::Value = row.get("platform_timings");
    let platform_timings = timings_json
        .as_object()
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| {
                    let platform = Platform::from_str(k).ok()?;
                    let duration_ms = v.get("duration_ms")?.as_i64()?;
                    let events_count = v.get("events_count")?.as_i64()?;
                    Some((platform, PlatformTiming { duration_ms, events_count }))
                })
                .collect::<HashMap<_, _>>()
        })
        .unwrap_or_default();

    let status_json: serde_json::Value = row.get("platform_status");
    let platform_status = status_json
        .as_object()
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| {
                    let platform = Platform::from_str(k).ok()?;
                    let status = parse_platform_status(v.as_str()?);
                    Some((platform, status))
                })
                .collect::<HashMap<_, _>>()
        })
        .unwrap_or_default();

    let current_phase: Option<String> = row.get("current_phase");
    let current_platform: Option<String> = row.get("current_platform");

    Ok(ScrapeRun {
        id: row.get("id"),
        started_at: row.get("started_at"),
        completed_at: row.get::<Option<DateTime<Utc>>, _>("completed_at"),
        status: parse_run_status(&status_str),
        trigger,
        events_scraped: row.get("events_scraped"),
        events_failed: row.get("events_failed"),
        platform_timings,
        current_phase: current_phase.map(|p| parse_phase(&p)),
        current_platform: current_platform.and_then(|p| Platform::from_str(&p).ok()),
        platform_status,
    })
}

fn parse_phase(s: &str) -> ScrapePhase {
    match s {
        "scraping" => ScrapePhase::Scraping,
        "mapping" => ScrapePhase::Mapping,
        "storing" => ScrapePhase::Storing,
        _ => ScrapePhase::Discovering,
    }
}
