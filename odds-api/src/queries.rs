//! History Query Service (spec §4.G) — read-only queries over the data the
//! engine has already written. Every query takes a `&PgPool` directly;
//! there is no shared mutable state on the read side.

use chrono::{DateTime, Utc};
use odds_core::model::{MarketOdds, OutcomeOdds};
use odds_core::registry::MarketRegistry;
use serde::Serialize;
use sqlx::{PgPool, Row};
use std::collections::HashMap;

/// One key market's latest odds for one bookmaker, used in the `list_events`
/// summary (spec §4.G: "per-bookmaker latest odds summary for a fixed 'key
/// markets' set").
#[derive(Debug, Clone, Serialize)]
pub struct KeyMarketOdds {
    pub bookmaker_slug: String,
    pub reference_market_id: String,
    pub line: Option<f64>,
    pub outcomes: Vec<OutcomeOdds>,
    pub margin: f64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct EventListItem {
    pub id: i64,
    pub home_team: String,
    pub away_team: String,
    pub kickoff_time: DateTime<Utc>,
    pub sport_id: i64,
    pub tournament_id: i64,
    pub bookmaker_count: i64,
    #[sqlx(default)]
    pub key_markets: Vec<KeyMarketOdds>,
}

/// The fixed "key markets" set the `list_events` summary reports on: 1X2,
/// over/under 2.5, and both-teams-to-score (spec §4.G), resolved through the
/// shared registry rather than hardcoded reference ids.
fn key_market_specs(registry: &MarketRegistry) -> Vec<(String, Option<f64>)> {
    let resolve = |canonical_id: &str| {
        registry
            .find_by_canonical_id(canonical_id)
            .map(|def| def.reference_market_id.clone().unwrap_or_else(|| def.canonical_id.clone()))
    };
    [("1x2", None), ("over_under", Some(2.5)), ("both_teams_to_score", None)]
        .into_iter()
        .filter_map(|(canonical_id, line)| resolve(canonical_id).map(|reference_id| (reference_id, line)))
        .collect()
}

/// Fetches each key market's latest per-bookmaker odds for every event in
/// `event_ids`, grouped by event id.
async fn fetch_key_markets(
    pool: &PgPool,
    event_ids: &[i64],
    specs: &[(String, Option<f64>)],
) -> Result<HashMap<i64, Vec<KeyMarketOdds>>, sqlx::Error> {
    let mut by_event: HashMap<i64, Vec<KeyMarketOdds>> = HashMap::new();
    if event_ids.is_empty() {
        return Ok(by_event);
    }

    for (reference_market_id, line) in specs {
        let rows = sqlx::query(
            r#"
            WITH latest AS (
                SELECT DISTINCT ON (s.event_id, s.bookmaker_id) s.id AS snapshot_id, s.event_id, s.bookmaker_id
                FROM snapshots s
                WHERE s.event_id = ANY($1)
                ORDER BY s.event_id, s.bookmaker_id, s.capture_time DESC
            )
            SELECT latest.event_id, b.slug AS bookmaker_slug, mo.reference_market_id, mo.line, mo.outcomes, mo.margin
            FROM latest
            JOIN bookmakers b ON b.id = latest.bookmaker_id
            JOIN market_odds mo ON mo.snapshot_id = latest.snapshot_id
            WHERE mo.reference_market_id = $2
              AND ($3::double precision IS NULL OR mo.line = $3)
            "#,
        )
        .bind(event_ids)
        .bind(reference_market_id)
        .bind(line)
        .fetch_all(pool)
        .await?;

        for row in rows {
            let event_id: i64 = row.get("event_id");
            let outcomes_json: serde_json::Value = row.get("outcomes");
            let outcomes: Vec<OutcomeOdds> =
                serde_json::from_value(outcomes_json).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
            by_event.entry(event_id).or_default().push(KeyMarketOdds {
                bookmaker_slug: row.get("bookmaker_slug"),
                reference_market_id: row.get("reference_market_id"),
                line: row.get("line"),
                outcomes,
                margin: row.get("margin"),
            });
        }
    }
    Ok(by_event)
}

#[derive(Debug, Clone, Serialize)]
pub struct EventListPage {
    pub events: Vec<EventListItem>,
    pub page: i64,
    pub page_size: i64,
    pub total: i64,
}

#[derive(Debug, Default)]
pub struct EventListFilter {
    pub kickoff_from: Option<DateTime<Utc>>,
    pub kickoff_to: Option<DateTime<Utc>>,
    pub tournament_id: Option<i64>,
    pub sport_id: Option<i64>,
    pub min_bookmakers: Option<i64>,
    pub include_started: bool,
    pub page: i64,
    pub page_size: i64,
}

/// `GET /events` (spec §6). `bookmaker_count` is the distinct count of
/// sources that carry a `fixture_links` row for the event — the coverage
/// signal the reference-vs-competitor comparison depends on. Each item also
/// carries the key-markets odds summary spec §4.G requires.
pub async fn list_events(
    pool: &PgPool,
    registry: &MarketRegistry,
    filter: &EventListFilter,
) -> Result<EventListPage, sqlx::Error> {
    let page = filter.page.max(1);
    let page_size = filter.page_size.clamp(1, 200);
    let offset = (page - 1) * page_size;

    let mut rows: Vec<EventListItem> = sqlx::query_as(
        r#"
        SELECT e.id, e.home_team, e.away_team, e.kickoff_time, e.sport_id, e.tournament_id,
               count(distinct fl.bookmaker_id) AS bookmaker_count
        FROM events e
        LEFT JOIN fixture_links fl ON fl.event_id = e.id
        WHERE ($1::timestamptz IS NULL OR e.kickoff_time >= $1)
          AND ($2::timestamptz IS NULL OR e.kickoff_time <= $2)
          AND ($3::bigint IS NULL OR e.tournament_id = $3)
          AND ($4::bigint IS NULL OR e.sport_id = $4)
          AND ($5 OR e.kickoff_time > now())
        GROUP BY e.id
        HAVING count(distinct fl.bookmaker_id) >= $6
        ORDER BY e.kickoff_time ASC
        LIMIT $7 OFFSET $8
        "#,
    )
    .bind(filter.kickoff_from)
    .bind(filter.kickoff_to)
    .bind(filter.tournament_id)
    .bind(filter.sport_id)
    .bind(filter.include_started)
    .bind(filter.min_bookmakers.unwrap_or(0))
    .bind(page_size)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT count(*) FROM (
            SELECT e.id
            FROM events e
            LEFT JOIN fixture_links fl ON fl.event_id = e.id
            WHERE ($1::timestamptz IS NULL OR e.kickoff_time >= $1)
              AND ($2::timestamptz IS NULL OR e.kickoff_time <= $2)
              AND ($3::bigint IS NULL OR e.tournament_id = $3)
              AND ($4::bigint IS NULL OR e.sport_id = $4)
              AND ($5 OR e.kickoff_time > now())
            GROUP BY e.id
            HAVING count(distinct fl.bookmaker_id) >= $6
        ) counted
        "#,
    )
    .bind(filter.kickoff_from)
    .bind(filter.kickoff_to)
    .bind(filter.tournament_id)
    .bind(filter.sport_id)
    .bind(filter.include_started)
    .bind(filter.min_bookmakers.unwrap_or(0))
    .fetch_one(pool)
    .await?;

    let event_ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
    let specs = key_market_specs(registry);
    let mut key_markets_by_event = fetch_key_markets(pool, &event_ids, &specs).await?;
    for row in &mut rows {
        row.key_markets = key_markets_by_event.remove(&row.id).unwrap_or_default();
    }

    Ok(EventListPage { events: rows, page, page_size, total })
}

#[derive(Debug, Clone, Serialize)]
pub struct BookmakerMarkets {
    pub bookmaker_slug: String,
    pub latest_capture_time: DateTime<Utc>,
    pub markets: Vec<MarketOdds>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventDetail {
    pub id: i64,
    pub home_team: String,
    pub away_team: String,
    pub kickoff_time: DateTime<Utc>,
    pub correlation_id: Option<String>,
    pub coverage: Vec<BookmakerMarkets>,
}

/// `GET /events/{id}` (spec §4.G): the event plus, per bookmaker, the full
/// `MarketOdds` list from its latest snapshot, margin included per market.
pub async fn get_event_detail(pool: &PgPool, event_id: i64) -> Result<Option<EventDetail>, sqlx::Error> {
    let Some(event_row) = sqlx::query("SELECT id, home_team, away_team, kickoff_time, correlation_id FROM events WHERE id = $1")
        .bind(event_id)
        .fetch_optional(pool)
        .await?
    else {
        return Ok(None);
    };

    let rows = sqlx::query(
        r#"
        WITH latest AS (
            SELECT DISTINCT ON (bookmaker_id) id AS snapshot_id, bookmaker_id, capture_time
            FROM snapshots
            WHERE event_id = $1
            ORDER BY bookmaker_id, capture_time DESC
        )
        SELECT b.slug AS bookmaker_slug, latest.capture_time,
               mo.snapshot_id, mo.reference_market_id, mo.reference_market_name,
               mo.line, mo.outcomes, mo.margin
        FROM latest
        JOIN bookmakers b ON b.id = latest.bookmaker_id
        JOIN market_odds mo ON mo.snapshot_id = latest.snapshot_id
        ORDER BY b.slug, mo.reference_market_id, mo.line
        "#,
    )
    .bind(event_id)
    .fetch_all(pool)
    .await?;

    let mut coverage: Vec<BookmakerMarkets> = Vec::new();
    for row in rows {
        let slug: String = row.get("bookmaker_slug");
        let capture_time: DateTime<Utc> = row.get("capture_time");
        let outcomes_json: serde_json::Value = row.get("outcomes");
        let outcomes = serde_json::from_value(outcomes_json).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        let market = MarketOdds {
            snapshot_id: row.get("snapshot_id"),
            reference_market_id: row.get("reference_market_id"),
            reference_market_name: row.get("reference_market_name"),
            line: row.get("line"),
            outcomes,
            margin: row.get("margin"),
        };

        match coverage.iter_mut().find(|bm| bm.bookmaker_slug == slug) {
            Some(bm) => bm.markets.push(market),
            None => coverage.push(BookmakerMarkets { bookmaker_slug: slug, latest_capture_time: capture_time, markets: vec![market] }),
        }
    }

    Ok(Some(EventDetail {
        id: event_row.get("id"),
        home_team: event_row.get("home_team"),
        away_team: event_row.get("away_team"),
        kickoff_time: event_row.get("kickoff_time"),
        correlation_id: event_row.get("correlation_id"),
        coverage,
    }))
}

/// `GET /events/{id}/markets/{market_id}/history` (spec §6, §4.E): thin
/// wrapper over the snapshot store's range query. `line` is mandatory
/// whenever the market is a specifier market (spec §4.E invariant); the
/// caller enforces that before calling through.
pub async fn odds_history(
    pool: &PgPool,
    event_id: i64,
    bookmaker_id: i64,
    reference_market_id: &str,
    line: Option<f64>,
) -> Result<Vec<MarketOdds>, sqlx::Error> {
    let store = odds_core::snapshot_store::SnapshotStore::new(pool.clone());
    store.market_history(event_id, bookmaker_id, reference_market_id, line).await
}

#[derive(Debug, Clone, Serialize)]
pub struct MarginPoint {
    pub capture_time: DateTime<Utc>,
    pub margin: f64,
}

/// `GET /events/{id}/markets/{market_id}/margin-history` (spec §6): the
/// margin series alone, for charting without the full outcome payload.
pub async fn margin_history(
    pool: &PgPool,
    event_id: i64,
    bookmaker_id: i64,
    reference_market_id: &str,
    line: Option<f64>,
) -> Result<Vec<MarginPoint>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT s.capture_time, mo.margin
        FROM market_odds mo
        JOIN snapshots s ON s.id = mo.snapshot_id
        WHERE s.event_id = $1 AND s.bookmaker_id = $2 AND mo.reference_market_id = $3
          AND ($4::double precision IS NULL OR mo.line = $4)
        ORDER BY s.capture_time ASC
        "#,
    )
    .bind(event_id)
    .bind(bookmaker_id)
    .bind(reference_market_id)
    .bind(line)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|row| MarginPoint { capture_time: row.get("capture_time"), margin: row.get("margin") }).collect())
}

#[derive(Debug, Clone, Serialize)]
pub struct CoverageStats {
    pub total_events: i64,
    /// Events seen by the reference bookmaker and at least one competitor —
    /// distinct-by-`correlation_id`, not by raw fixture-link count (spec
    /// §8 property 7).
    pub matched_events: i64,
    /// Distinct event count per bookmaker slug (spec §4.G
    /// `per_bookmaker_count`).
    pub per_bookmaker_count: HashMap<String, i64>,
    /// Events seen by at least one competitor but never by the reference
    /// bookmaker (spec §4.G `competitor_only_count`).
    pub competitor_only_count: i64,
}

pub async fn coverage_stats(pool: &PgPool) -> Result<CoverageStats, sqlx::Error> {
    let row = sqlx::query(
        r#"
        WITH per_event AS (
            SELECT e.id,
                   bool_or(b.role = 'reference') AS has_reference,
                   bool_or(b.role = 'competitor') AS has_competitor
            FROM events e
            JOIN fixture_links fl ON fl.event_id = e.id
            JOIN bookmakers b ON b.id = fl.bookmaker_id
            GROUP BY e.id
        )
        SELECT
            count(*) AS total_events,
            count(*) FILTER (WHERE has_reference AND has_competitor) AS matched_events,
            count(*) FILTER (WHERE has_competitor AND NOT has_reference) AS competitor_only_count
        FROM per_event
        "#,
    )
    .fetch_one(pool)
    .await?;

    let per_bookmaker_rows = sqlx::query(
        r#"
        SELECT b.slug AS bookmaker_slug, count(distinct fl.event_id) AS event_count
        FROM fixture_links fl
        JOIN bookmakers b ON b.id = fl.bookmaker_id
        GROUP BY b.slug
        "#,
    )
    .fetch_all(pool)
    .await?;
    let per_bookmaker_count = per_bookmaker_rows
        .into_iter()
        .map(|r| (r.get::<String, _>("bookmaker_slug"), r.get::<i64, _>("event_count")))
        .collect();

    Ok(CoverageStats {
        total_events: row.get("total_events"),
        matched_events: row.get("matched_events"),
        per_bookmaker_count,
        competitor_only_count: row.get("competitor_only_count"),
    })
}

/// `GET /events/unmatched` (spec §6): events carried by only one bookmaker
/// role, surfaced so an operator can investigate a Matcher miss.
pub async fn unmatched_events(
    pool: &PgPool,
    registry: &MarketRegistry,
    limit: i64,
) -> Result<Vec<EventListItem>, sqlx::Error> {
    let mut rows: Vec<EventListItem> = sqlx::query_as(
        r#"
        SELECT e.id, e.home_team, e.away_team, e.kickoff_time, e.sport_id, e.tournament_id,
               count(distinct fl.bookmaker_id) AS bookmaker_count
        FROM events e
        JOIN fixture_links fl ON fl.event_id = e.id
        GROUP BY e.id
        HAVING count(distinct fl.bookmaker_id) = 1
        ORDER BY e.kickoff_time DESC
        LIMIT $1
        "#,
    )
    .bind(limit.clamp(1, 500))
    .fetch_all(pool)
    .await?;

    let event_ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
    let specs = key_market_specs(registry);
    let mut key_markets_by_event = fetch_key_markets(pool, &event_ids, &specs).await?;
    for row in &mut rows {
        row.key_markets = key_markets_by_event.remove(&row.id).unwrap_or_default();
    }

    Ok(rows)
}
