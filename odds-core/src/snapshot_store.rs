//! Snapshot Store (spec §4.E) — time-series storage for per-bookmaker
//! odds observations, range-partitioned by day with a 30-day retention
//! window.

use crate::model::{MarketOdds, OutcomeOdds, Snapshot};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use sqlx::{PgPool, Row};
use tracing::{info, warn};

/// Partitions are pre-provisioned this many days ahead of the current date
/// so an ingest never blocks on DDL (spec §4.E Partitioning).
const PREPROVISION_DAYS: i64 = 7;

/// Whole partitions older than this are dropped rather than deleted row by
/// row (spec §4.E Retention).
const RETENTION_DAYS: i64 = 30;

pub struct SnapshotStore {
    pool: PgPool,
}

impl SnapshotStore {
    pub fn new(pool: PgPool) -> Self {
        SnapshotStore { pool }
    }

    /// Records one capture: a snapshot row plus one market_odds row per
    /// market (several per market when a specifier line produces more than
    /// one, e.g. a split Asian Handicap). Returns the new snapshot id.
    pub async fn append_snapshot(
        &self,
        event_id: i64,
        bookmaker_id: i64,
        capture_time: DateTime<Utc>,
        markets: &[MarketOdds],
    ) -> Result<i64, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let snapshot_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO snapshots (event_id, bookmaker_id, capture_time)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
        )
        .bind(event_id)
        .bind(bookmaker_id)
        .bind(capture_time)
        .fetch_one(&mut *tx)
        .await?;

        for market in markets {
            let outcomes = serde_json::to_value(&market.outcomes)
                .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
            sqlx::query(
                r#"
                INSERT INTO market_odds
                    (snapshot_id, reference_market_id, reference_market_name, line, outcomes, margin, capture_time)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(snapshot_id)
            .bind(&market.reference_market_id)
            .bind(&market.reference_market_name)
            .bind(market.line)
            .bind(outcomes)
            .bind(market.margin)
            .bind(capture_time)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(snapshot_id)
    }

    pub async fn latest_snapshot(
        &self,
        event_id: i64,
        bookmaker_id: i64,
    ) -> Result<Option<Snapshot>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT id, event_id, bookmaker_id, capture_time
            FROM snapshots
            WHERE event_id = $1 AND bookmaker_id = $2
            ORDER BY capture_time DESC
            LIMIT 1
            "#,
        )
        .bind(event_id)
        .bind(bookmaker_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Snapshot {
            id: r.get("id"),
            event_id: r.get("event_id"),
            bookmaker_id: r.get("bookmaker_id"),
            capture_time: r.get("capture_time"),
        }))
    }

    pub async fn snapshots_between(
        &self,
        event_id: i64,
        bookmaker_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Snapshot>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, event_id, bookmaker_id, capture_time
            FROM snapshots
            WHERE event_id = $1 AND bookmaker_id = $2
              AND capture_time >= $3 AND capture_time <= $4
            ORDER BY capture_time ASC
            "#,
        )
        .bind(event_id)
        .bind(bookmaker_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| Snapshot {
                id: r.get("id"),
                event_id: r.get("event_id"),
                bookmaker_id: r.get("bookmaker_id"),
                capture_time: r.get("capture_time"),
            })
            .collect())
    }

    /// Odds history for one market on one bookmaker's event. `line` is
    /// mandatory whenever the market carries more than one line (O/U,
    /// handicap) — passing `None` for those returns every line interleaved,
    /// which is never what a caller wants, so the History Query Service
    /// enforces this before calling in (spec §4.E / §4.G Invariant).
    pub async fn market_history(
        &self,
        event_id: i64,
        bookmaker_id: i64,
        reference_market_id: &str,
        line: Option<f64>,
    ) -> Result<Vec<MarketOdds>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT mo.snapshot_id, mo.reference_market_id, mo.reference_market_name,
                   mo.line, mo.outcomes, mo.margin
            FROM market_odds mo
            JOIN snapshots s ON s.id = mo.snapshot_id
            WHERE s.event_id = $1 AND s.bookmaker_id = $2
              AND mo.reference_market_id = $3
              AND ($4::double precision IS NULL OR mo.line = $4)
            ORDER BY s.capture_time ASC
            "#,
        )
        .bind(event_id)
        .bind(bookmaker_id)
        .bind(reference_market_id)
        .bind(line)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| {
                let outcomes: serde_json::Value = r.get("outcomes");
                let outcomes: Vec<OutcomeOdds> =
                    serde_json::from_value(outcomes).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
                Ok(MarketOdds {
                    snapshot_id: r.get("snapshot_id"),
                    reference_market_id: r.get("reference_market_id"),
                    reference_market_name: r.get("reference_market_name"),
                    line: r.get("line"),
                    outcomes,
                    margin: r.get("margin"),
                })
            })
            .collect()
    }

    /// Creates tomorrow's through `+PREPROVISION_DAYS` partitions if they
    /// don't already exist. Idempotent; safe to call on every orchestrator
    /// tick (spec §4.E Partitioning).
    pub async fn provision_upcoming_partitions(&self) -> Result<(), sqlx::Error> {
        let today = Utc::now().date_naive();
        for offset in 0..=PREPROVISION_DAYS {
            let day = today + Duration::days(offset);
            self.ensure_partition("snapshots", day).await?;
            self.ensure_partition("market_odds", day).await?;
        }
        Ok(())
    }

    async fn ensure_partition(&self, parent: &str, day: NaiveDate) -> Result<(), sqlx::Error> {
        let suffix = day.format("%Y_%m_%d");
        let next_day = day + Duration::days(1);
        let sql = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {parent}_{suffix}
            PARTITION OF {parent}
            FOR VALUES FROM ('{day}') TO ('{next_day}')
            "#,
        );
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }

    /// Drops whole partitions older than [`RETENTION_DAYS`] rather than
    /// deleting rows, which would thrash the index on a table this size
    /// (spec §4.E Retention). Both `snapshots` and `market_odds` are
    /// range-partitioned the same way, so both get swept.
    pub async fn drop_expired_partitions(&self) -> Result<u32, sqlx::Error> {
        let mut dropped = 0;
        for parent in ["snapshots", "market_odds"] {
            dropped += self.drop_expired_partitions_for(parent).await?;
        }
        Ok(dropped)
    }

    async fn drop_expired_partitions_for(&self, parent: &str) -> Result<u32, sqlx::Error> {
        let cutoff = Utc::now().date_naive() - Duration::days(RETENTION_DAYS);
        let rows = sqlx::query(
            r#"
            SELECT child.relname AS partition_name
            FROM pg_inherits
            JOIN pg_class parent ON pg_inherits.inhparent = parent.oid
            JOIN pg_class child ON pg_inherits.inhrelid = child.oid
            WHERE parent.relname = $1
            "#,
        )
        .bind(parent)
        .fetch_all(&self.pool)
        .await?;

        let mut dropped = 0;
        for row in rows {
            let name: String = row.get("partition_name");
            if let Some(day) = partition_day(parent, &name) {
                if day < cutoff {
                    sqlx::query(&format!("DROP TABLE IF EXISTS {name}"))
                        .execute(&self.pool)
                        .await?;
                    dropped += 1;
                    info!(partition = %name, "dropped expired snapshot partition");
                }
            } else {
                warn!(partition = %name, "skipping partition with unparsable name");
            }
        }
        Ok(dropped)
    }
}

fn partition_day(parent: &str, partition_name: &str) -> Option<NaiveDate> {
    let suffix = partition_name.strip_prefix(parent)?.strip_prefix('_')?;
    NaiveDate::parse_from_str(suffix, "%Y_%m_%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_day_parses_known_suffix() {
        assert_eq!(
            partition_day("market_odds", "market_odds_2026_07_28"),
            NaiveDate::from_ymd_opt(2026, 7, 28)
        );
        assert_eq!(
            partition_day("snapshots", "snapshots_2026_07_28"),
            NaiveDate::from_ymd_opt(2026, 7, 28)
        );
    }

    #[test]
    fn partition_day_rejects_unrelated_table() {
        assert_eq!(partition_day("market_odds", "snapshots_2026_07_28"), None);
        assert_eq!(partition_day("snapshots", "market_odds"), None);
    }
}
