//! Fixture Matcher (spec §4.F) — resolves a source's raw event into a
//! canonical [`Event`] id, creating one on first sight and reusing it on
//! every later sighting regardless of arrival order.

use crate::model::Event;
use chrono::{DateTime, Utc};
use regex::Regex;
use sqlx::PgPool;
use std::sync::OnceLock;

/// What a scraping client knows about one raw event before it has been
/// resolved to a canonical [`Event`].
pub struct FixtureSighting {
    pub bookmaker_id: i64,
    pub external_event_id: String,
    pub correlation_id: Option<String>,
    pub home_team: String,
    pub away_team: String,
    pub kickoff_time: DateTime<Utc>,
    pub sport_id: i64,
    pub tournament_id: i64,
}

/// Fallback-match window either side of kickoff when no correlation id is
/// available (spec §4.F Best-effort fallback).
const FALLBACK_WINDOW_MINUTES: i64 = 30;

fn word_splitter() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"[.,/\\\-_()\[\]{}+*=|<>?!@#$%^&*~`'":;]"#).unwrap())
}

fn digit_stripper() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\d+").unwrap())
}

/// Lowercases, strips punctuation and digits, and drops short filler words
/// so team names from different sources can be compared loosely.
fn normalize_team_name(team_name: &str) -> String {
    if team_name.is_empty() {
        return String::new();
    }
    let lower = team_name.to_lowercase();
    let no_punct = word_splitter().replace_all(&lower, "");
    let no_digits = digit_stripper().replace_all(&no_punct, "");
    no_digits
        .split_whitespace()
        .filter(|w| w.len() > 2 && *w != "afc")
        .collect::<Vec<_>>()
        .join(" ")
}

fn names_loosely_match(a: &str, b: &str) -> bool {
    let na = normalize_team_name(a);
    let nb = normalize_team_name(b);
    !na.is_empty() && !nb.is_empty() && (na.contains(&nb) || nb.contains(&na))
}

#[derive(sqlx::FromRow)]
struct ExistingEvent {
    id: i64,
    home_team: String,
    away_team: String,
}

/// Resolves a sighting to a canonical event id, inserting rows as needed.
/// Runs entirely inside one transaction so the create-or-reuse decision is
/// atomic against concurrent sightings of the same fixture.
pub async fn resolve_event(pool: &PgPool, sighting: &FixtureSighting) -> Result<i64, sqlx::Error> {
    // Step 1: a FixtureLink for this exact (bookmaker, external id) pair
    // already names the canonical event.
    if let Some(event_id) = find_existing_link(pool, sighting).await? {
        return Ok(event_id);
    }

    // Step 2 and 3 run in a transaction; a concurrent writer may insert the
    // same correlation_id between our lookup and insert, so we retry once
    // on the unique violation rather than fail the sighting.
    const MAX_ATTEMPTS: usize = 3;
    let mut last_err = None;
    for _ in 0..MAX_ATTEMPTS {
        match resolve_in_transaction(pool, sighting).await {
            Ok(event_id) => return Ok(event_id),
            Err(e) if is_unique_violation(&e) => {
                last_err = Some(e);
                continue;
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap())
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err.as_database_error().and_then(|d| d.code()), Some(code) if code == "23505")
}

async fn find_existing_link(pool: &PgPool, sighting: &FixtureSighting) -> Result<Option<i64>, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT event_id FROM fixture_links WHERE bookmaker_id = $1 AND external_event_id = $2",
    )
    .bind(sighting.bookmaker_id)
    .bind(&sighting.external_event_id)
    .fetch_optional(pool)
    .await
}

async fn resolve_in_transaction(pool: &PgPool, sighting: &FixtureSighting) -> Result<i64, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let event_id = if let Some(correlation_id) = &sighting.correlation_id {
        match find_event_by_correlation(&mut tx, correlation_id).await? {
            Some(existing_id) => {
                unify_fallback_duplicate(&mut tx, existing_id, correlation_id).await?;
                existing_id
            }
            None => insert_event(&mut tx, sighting, Some(correlation_id.clone())).await?,
        }
    } else {
        match find_fallback_match(&mut tx, sighting).await? {
            Some(existing_id) => existing_id,
            None => insert_event(&mut tx, sighting, None).await?,
        }
    };

    insert_fixture_link(&mut tx, event_id, sighting).await?;
    tx.commit().await?;
    Ok(event_id)
}

async fn find_event_by_correlation(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    correlation_id: &str,
) -> Result<Option<i64>, sqlx::Error> {
    sqlx::query_scalar("SELECT id FROM events WHERE correlation_id = $1")
        .bind(correlation_id)
        .fetch_optional(&mut **tx)
        .await
}

/// If an earlier, correlation-id-less sighting already created a singleton
/// event for this fixture (the fallback path), and a later sighting now
/// supplies the correlation id pointing at a *different* row, merge the
/// duplicate into the canonical row instead of leaving two events around
/// (spec §4.F Out-of-order arrival).
async fn unify_fallback_duplicate(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    canonical_event_id: i64,
    correlation_id: &str,
) -> Result<(), sqlx::Error> {
    let duplicate: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM events WHERE correlation_id IS NULL AND id != $1 \
         AND id IN (SELECT event_id FROM fixture_links WHERE correlation_id = $2)",
    )
    .bind(canonical_event_id)
    .bind(correlation_id)
    .fetch_optional(&mut **tx)
    .await?;

    if let Some(duplicate_id) = duplicate {
        sqlx::query("UPDATE fixture_links SET event_id = $1 WHERE event_id = $2")
            .bind(canonical_event_id)
            .bind(duplicate_id)
            .execute(&mut **tx)
            .await?;
        sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(duplicate_id)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

async fn find_fallback_match(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    sighting: &FixtureSighting,
) -> Result<Option<i64>, sqlx::Error> {
    let window = chrono::Duration::minutes(FALLBACK_WINDOW_MINUTES);
    let rows: Vec<ExistingEvent> = sqlx::query_as(
        r#"
        SELECT id, home_team, away_team
        FROM events
        WHERE tournament_id = $1
          AND kickoff_time >= $2
          AND kickoff_time <= $3
        "#,
    )
    .bind(sighting.tournament_id)
    .bind(sighting.kickoff_time - window)
    .bind(sighting.kickoff_time + window)
    .fetch_all(&mut **tx)
    .await?;

    for row in rows {
        if names_loosely_match(&row.home_team, &sighting.home_team)
            && names_loosely_match(&row.away_team, &sighting.away_team)
        {
            return Ok(Some(row.id));
        }
    }
    Ok(None)
}

async fn insert_event(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    sighting: &FixtureSighting,
    correlation_id: Option<String>,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        INSERT INTO events (home_team, away_team, kickoff_time, correlation_id, sport_id, tournament_id)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id
        "#,
    )
    .bind(&sighting.home_team)
    .bind(&sighting.away_team)
    .bind(sighting.kickoff_time)
    .bind(correlation_id)
    .bind(sighting.sport_id)
    .bind(sighting.tournament_id)
    .fetch_one(&mut **tx)
    .await
}

async fn insert_fixture_link(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    event_id: i64,
    sighting: &FixtureSighting,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO fixture_links (event_id, bookmaker_id, external_event_id, correlation_id)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (bookmaker_id, external_event_id) DO NOTHING
        "#,
    )
    .bind(event_id)
    .bind(sighting.bookmaker_id)
    .bind(&sighting.external_event_id)
    .bind(&sighting.correlation_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Loads the canonical event a fixture link points to, for callers that
/// already hold the link (e.g. the orchestrator attaching a snapshot).
pub async fn load_event(pool: &PgPool, event_id: i64) -> Result<Option<Event>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT id, home_team, away_team, kickoff_time, correlation_id, sport_id, tournament_id
        FROM events
        WHERE id = $1
        "#,
    )
    .bind(event_id)
    .fetch_optional(pool)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_team_names_for_loose_comparison() {
        assert_eq!(normalize_team_name("Manchester United F.C."), "manchester united");
        assert_eq!(normalize_team_name("Arsenal AFC"), "arsenal");
    }

    #[test]
    fn loose_match_accepts_substring_either_direction() {
        assert!(names_loosely_match("Manchester United", "Man United FC"));
        assert!(!names_loosely_match("Arsenal", "Chelsea"));
    }

    #[test]
    fn empty_names_never_match() {
        assert!(!names_loosely_match("", ""));
    }
}
