//! Cross-module scenario: out-of-order fixture arrival unification (E3).
//! Requires a live Postgres reachable via `DATABASE_URL` with the project's
//! migrations applied; skipped otherwise, matching the fixture-skip pattern
//! used for DB-backed test suites elsewhere in the corpus.

use chrono::{TimeZone, Utc};
use odds_core::matcher::{resolve_event, FixtureSighting};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

async fn test_pool() -> Option<PgPool> {
    let url = std::env::var("DATABASE_URL").ok()?;
    PgPoolOptions::new().max_connections(2).connect(&url).await.ok()
}

fn sighting(bookmaker_id: i64, external_id: &str, correlation_id: Option<&str>) -> FixtureSighting {
    FixtureSighting {
        bookmaker_id,
        external_event_id: external_id.to_string(),
        correlation_id: correlation_id.map(str::to_string),
        home_team: "Arsenal".to_string(),
        away_team: "Chelsea".to_string(),
        kickoff_time: Utc.with_ymd_and_hms(2026, 8, 1, 15, 0, 0).unwrap(),
        sport_id: 1,
        tournament_id: 1,
    }
}

/// A later sighting that learns the correlation id of an event first seen
/// through the fallback path must resolve to the same event, not create a
/// second one (spec §4.F Out-of-order arrival).
#[tokio::test]
async fn sighting_with_known_correlation_joins_existing_event() {
    let Some(pool) = test_pool().await else { return };

    let x_sighting = sighting(9101, "x-early-sighting", None);
    let x_event_id = resolve_event(&pool, &x_sighting).await.expect("resolve X sighting");

    sqlx::query("UPDATE events SET correlation_id = $1 WHERE id = $2")
        .bind("corr-e3-join")
        .bind(x_event_id)
        .execute(&pool)
        .await
        .expect("learn correlation id on X's event");

    let y_sighting = sighting(9102, "y-later-sighting", Some("corr-e3-join"));
    let y_event_id = resolve_event(&pool, &y_sighting).await.expect("resolve Y sighting");

    assert_eq!(x_event_id, y_event_id, "Y must resolve to X's existing event, not create a new one");

    let link_count: i64 = sqlx::query_scalar("SELECT count(*) FROM fixture_links WHERE event_id = $1")
        .bind(x_event_id)
        .fetch_one(&pool)
        .await
        .expect("count fixture links");
    assert_eq!(link_count, 2);
}

/// Reproduces the duplicate-orphan state the unify step exists to clean up:
/// a fixture_link already carries the correlation id of an orphan event,
/// while a separate event is canonical for that same correlation id. A
/// third sighting naming that correlation id must trigger the merge —
/// transferring the orphan's link to the canonical event and deleting the
/// orphan (spec §4.F Out-of-order arrival, `unify_fallback_duplicate`).
#[tokio::test]
async fn third_sighting_triggers_duplicate_unification() {
    let Some(pool) = test_pool().await else { return };

    let kickoff = Utc.with_ymd_and_hms(2026, 8, 2, 18, 0, 0).unwrap();

    let canonical_id: i64 = sqlx::query_scalar(
        "INSERT INTO events (home_team, away_team, kickoff_time, correlation_id, sport_id, tournament_id) \
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
    )
    .bind("River Plate")
    .bind("Boca Juniors")
    .bind(kickoff)
    .bind("corr-e3-merge")
    .bind(1i64)
    .bind(1i64)
    .fetch_one(&pool)
    .await
    .expect("insert canonical event");

    let duplicate_id: i64 = sqlx::query_scalar(
        "INSERT INTO events (home_team, away_team, kickoff_time, correlation_id, sport_id, tournament_id) \
         VALUES ($1, $2, $3, NULL, $4, $5) RETURNING id",
    )
    .bind("River Plate")
    .bind("Boca Juniors")
    .bind(kickoff)
    .bind(1i64)
    .bind(1i64)
    .fetch_one(&pool)
    .await
    .expect("insert duplicate orphan event");

    sqlx::query(
        "INSERT INTO fixture_links (event_id, bookmaker_id, external_event_id, correlation_id) \
         VALUES ($1, $2, $3, $4)",
    )
    .bind(duplicate_id)
    .bind(9201i64)
    .bind("b-sighting")
    .bind("corr-e3-merge")
    .execute(&pool)
    .await
    .expect("insert orphan's fixture link carrying the learned correlation id");

    let c_sighting = FixtureSighting {
        bookmaker_id: 9202,
        external_event_id: "c-sighting".to_string(),
        correlation_id: Some("corr-e3-merge".to_string()),
        home_team: "River Plate".to_string(),
        away_team: "Boca Juniors".to_string(),
        kickoff_time: kickoff,
        sport_id: 1,
        tournament_id: 1,
    };
    let resolved_id = resolve_event(&pool, &c_sighting).await.expect("resolve C sighting");
    assert_eq!(resolved_id, canonical_id, "C must resolve to the canonical event");

    let duplicate_still_exists: i64 = sqlx::query_scalar("SELECT count(*) FROM events WHERE id = $1")
        .bind(duplicate_id)
        .fetch_one(&pool)
        .await
        .expect("count duplicate event rows");
    assert_eq!(duplicate_still_exists, 0, "the orphan event must be deleted after unification");

    let orphan_link_event: i64 = sqlx::query_scalar("SELECT event_id FROM fixture_links WHERE bookmaker_id = $1 AND external_event_id = $2")
        .bind(9201i64)
        .bind("b-sighting")
        .fetch_one(&pool)
        .await
        .expect("fetch B's fixture link");
    assert_eq!(orphan_link_event, canonical_id, "B's link must be transferred to the canonical event");

    let total_links: i64 = sqlx::query_scalar("SELECT count(*) FROM fixture_links WHERE event_id = $1")
        .bind(canonical_id)
        .fetch_one(&pool)
        .await
        .expect("count canonical event links");
    assert_eq!(total_links, 2, "canonical event now carries both B's transferred link and C's new link");
}
