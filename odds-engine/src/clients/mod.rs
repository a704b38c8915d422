//! Scraping Clients (spec §4.C). One client per source, each an async HTTP
//! facade returning raw payloads only — normalization is `odds-core`'s job.

pub mod bet9ja;
pub mod reference;
pub mod sportybet;

use odds_core::error::ScrapeErrorType;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Bounded-concurrency fan-in gate shared by every client (spec §4.C
/// Concurrency): 10 permits, ~50ms between detail fetches. Mandatory
/// uniformly across clients, not just the competitor ones (§9 resolution).
pub const MAX_CONCURRENT_FETCHES: usize = 10;
pub const INTER_REQUEST_PAUSE: Duration = Duration::from_millis(50);

const MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Transport/protocol failure from a single HTTP call, before it has been
/// classified into a [`ScrapeErrorType`] (spec §7 Error Handling Design).
#[derive(Debug, Clone)]
pub enum ClientError {
    Network(String),
    RateLimit,
    Parse(String),
    InvalidResponse(String),
}

impl ClientError {
    fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Network(_) | ClientError::RateLimit)
    }

    pub fn error_type(&self) -> ScrapeErrorType {
        match self {
            ClientError::Network(_) => ScrapeErrorType::Network,
            ClientError::RateLimit => ScrapeErrorType::RateLimit,
            ClientError::Parse(_) => ScrapeErrorType::Parse,
            ClientError::InvalidResponse(_) => ScrapeErrorType::InvalidResponse,
        }
    }

    pub fn message(&self) -> String {
        match self {
            ClientError::Network(m) => m.clone(),
            ClientError::RateLimit => "rate limited by upstream".to_string(),
            ClientError::Parse(m) => m.clone(),
            ClientError::InvalidResponse(m) => m.clone(),
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.status().map(|s| s.as_u16()) == Some(429) {
            ClientError::RateLimit
        } else if e.is_timeout() || e.is_connect() {
            ClientError::Network(e.to_string())
        } else {
            ClientError::InvalidResponse(e.to_string())
        }
    }
}

/// Exponential backoff retry: initial 1s, factor 2, cap 10s, max 3 attempts.
/// Retries only transient errors (network, rate_limit); a 4xx other than
/// 429 surfaces on the first attempt (spec §4.C Retry policy).
pub async fn retry_with_backoff<F, Fut, T>(mut attempt: F) -> Result<T, ClientError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, ClientError>>,
{
    let mut backoff = INITIAL_BACKOFF;
    let mut last_err = None;
    for attempt_no in 1..=MAX_ATTEMPTS {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt_no < MAX_ATTEMPTS => {
                warn!(attempt = attempt_no, error = %e.message(), "retrying after transient error");
                sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.expect("loop always sets last_err before exhausting attempts"))
}

/// Result of a `check_health()` call (spec §4.C).
#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthStatus {
    pub ok: bool,
    pub latency_ms: u64,
}

/// One row of a source's discovery listing, enough for the Fixture Matcher
/// (spec §4.F) to resolve it before the per-event detail fetch runs.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct EventSummary {
    pub external_event_id: String,
    pub home_team: String,
    pub away_team: String,
    pub kickoff_time: chrono::DateTime<chrono::Utc>,
    pub correlation_id: Option<String>,
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}
