//! Entity types for the odds-aggregation data model (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single classification flag on a [`MarketDefinition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketClass {
    OverUnder,
    Handicap,
    Variant,
    TimeBased,
    Composite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookmakerRole {
    Reference,
    Competitor,
}

/// The three data sources this system reconciles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Reference,
    Sportybet,
    Bet9ja,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Reference => "reference",
            Platform::Sportybet => "sportybet",
            Platform::Bet9ja => "bet9ja",
        }
    }

    pub fn all() -> [Platform; 3] {
        [Platform::Reference, Platform::Sportybet, Platform::Bet9ja]
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reference" => Ok(Platform::Reference),
            "sportybet" => Ok(Platform::Sportybet),
            "bet9ja" => Ok(Platform::Bet9ja),
            other => Err(format!("unknown platform '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sport {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tournament {
    pub id: i64,
    pub sport_id: i64,
    pub name: String,
}

/// A real-world fixture, created on first sight of its `correlation_id`
/// from any source (spec §3 Lifecycle).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Event {
    pub id: i64,
    pub home_team: String,
    pub away_team: String,
    pub kickoff_time: DateTime<Utc>,
    pub correlation_id: Option<String>,
    pub sport_id: i64,
    pub tournament_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bookmaker {
    pub id: i64,
    pub slug: String,
    pub display_name: String,
    pub role: BookmakerRole,
}

/// Links a per-source fixture row to a canonical [`Event`]. May be created
/// before its Event exists; the Matcher resolves it lazily (spec §4.F).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureLink {
    pub event_id: i64,
    pub bookmaker_id: i64,
    pub external_event_id: String,
    pub correlation_id: Option<String>,
}

/// One outcome slot on a [`MarketDefinition`], with per-source names used by
/// the normalizers for outcome matching (spec §4.B).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeDefinition {
    pub canonical_id: String,
    pub reference_outcome_name: Option<String>,
    pub sportybet_description: Option<String>,
    pub bet9ja_suffix: Option<String>,
    pub position: u32,
}

/// Immutable-per-deployment row of the Market Mapping Registry (spec §4.A).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketDefinition {
    pub canonical_id: String,
    pub display_name: String,
    pub reference_market_id: Option<String>,
    pub sportybet_market_id: Option<String>,
    pub bet9ja_market_key: Option<String>,
    pub outcome_mapping: Vec<OutcomeDefinition>,
    pub classification_flags: Vec<MarketClass>,
}

impl MarketDefinition {
    pub fn has_flag(&self, flag: MarketClass) -> bool {
        self.classification_flags.contains(&flag)
    }

    /// Outcome match: case-insensitive on the source-appropriate display
    /// field, falling back to `position` (spec §4.B Outcome matching).
    pub fn match_outcome_by_name(&self, platform: Platform, name: &str) -> Option<&OutcomeDefinition> {
        let needle = name.to_lowercase();
        self.outcome_mapping.iter().find(|o| {
            let candidate = match platform {
                Platform::Reference => o.reference_outcome_name.as_deref(),
                Platform::Sportybet => o.sportybet_description.as_deref(),
                Platform::Bet9ja => o.bet9ja_suffix.as_deref(),
            };
            candidate.map(|c| c.to_lowercase() == needle).unwrap_or(false)
        })
    }

    pub fn match_outcome_by_position(&self, position: u32) -> Option<&OutcomeDefinition> {
        self.outcome_mapping.iter().find(|o| o.position == position)
    }
}

/// One observation of a bookmaker's odds for one event at one moment (spec
/// §3 / Glossary).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: i64,
    pub event_id: i64,
    pub bookmaker_id: i64,
    pub capture_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeOdds {
    pub name: String,
    pub odds: f64,
    pub active: bool,
}

/// A single market's odds within a [`Snapshot`]. `line` is part of the
/// effective key for specifier markets (spec §3 Invariant).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketOdds {
    pub snapshot_id: i64,
    pub reference_market_id: String,
    pub reference_market_name: String,
    pub line: Option<f64>,
    pub outcomes: Vec<OutcomeOdds>,
    pub margin: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Partial,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunTrigger {
    Scheduled,
    Manual,
    Retry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformStatus {
    Pending,
    Active,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformTiming {
    pub duration_ms: i64,
    pub events_count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrapePhase {
    Discovering,
    Scraping,
    Mapping,
    Storing,
}

impl ScrapePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrapePhase::Discovering => "discovering",
            ScrapePhase::Scraping => "scraping",
            ScrapePhase::Mapping => "mapping",
            ScrapePhase::Storing => "storing",
        }
    }
}

/// One row of a scrape run's append-only audit trail (spec §3
/// ScrapePhaseLog).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapePhaseLog {
    pub run_id: i64,
    pub platform: Option<Platform>,
    pub phase: ScrapePhase,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub events_processed: Option<i64>,
    pub message: String,
    pub error_details: Option<String>,
}

/// One recorded failure within a run (spec §3 ScrapeError). `message` is
/// truncated to 1000 chars via [`crate::error::truncate_message`] before
/// storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeError {
    pub run_id: i64,
    pub platform: Option<Platform>,
    pub error_type: crate::error::ScrapeErrorType,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeRun {
    pub id: i64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub trigger: RunTrigger,
    pub events_scraped: i64,
    pub events_failed: i64,
    pub platform_timings: std::collections::HashMap<Platform, PlatformTiming>,
    pub current_phase: Option<ScrapePhase>,
    pub current_platform: Option<Platform>,
    pub platform_status: std::collections::HashMap<Platform, PlatformStatus>,
}
