//! Bet9ja client. Two-step discovery pattern; the per-event detail call
//! returns a flat odds map decoded by `odds_core::normalize::bet9ja`.

use super::{retry_with_backoff, ClientError, EventSummary, HealthStatus};
use odds_core::normalize::bet9ja::RawOddsMap;
use reqwest::Client;
use std::time::{Duration, Instant};

pub struct Bet9jaClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl Bet9jaClient {
    pub fn new(base_url: String, api_key: String) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Bet9jaClient { http, base_url, api_key }
    }

    pub async fn fetch_events(&self, tournament_id: i64) -> Result<Vec<EventSummary>, ClientError> {
        retry_with_backoff(|| self.fetch_events_once(tournament_id)).await
    }

    async fn fetch_events_once(&self, tournament_id: i64) -> Result<Vec<EventSummary>, ClientError> {
        let url = format!("{}/Sport/Default", self.base_url);
        let response = self
            .http
            .get(&url)
            .header("Authorization", &self.api_key)
            .query(&[("groupId", tournament_id.to_string())])
            .send()
            .await?;
        parse_response(response).await
    }

    pub async fn fetch_event(&self, external_event_id: &str) -> Result<RawOddsMap, ClientError> {
        retry_with_backoff(|| self.fetch_event_once(external_event_id)).await
    }

    async fn fetch_event_once(&self, external_event_id: &str) -> Result<RawOddsMap, ClientError> {
        let url = format!("{}/Event/{}/Odds", self.base_url, external_event_id);
        let response = self.http.get(&url).header("Authorization", &self.api_key).send().await?;
        parse_response(response).await
    }

    pub async fn check_health(&self) -> HealthStatus {
        let start = Instant::now();
        let url = format!("{}/Sport/Ping", self.base_url);
        let ok = self.http.get(&url).send().await.map(|r| r.status().is_success()).unwrap_or(false);
        HealthStatus { ok, latency_ms: start.elapsed().as_millis() as u64 }
    }
}

async fn parse_response<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
    let status = response.status();
    if status.as_u16() == 429 {
        return Err(ClientError::RateLimit);
    }
    if !status.is_success() {
        return Err(ClientError::InvalidResponse(format!("status {status}")));
    }
    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| ClientError::Parse(e.to_string()))
}
