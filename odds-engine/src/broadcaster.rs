//! Progress Broadcaster (spec §4.H) — single-process pub/sub delivering
//! phase/odds events to SSE and WebSocket subscribers, with last-value
//! replay on reconnect.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use odds_core::model::Platform;
use serde::Serialize;
use tokio::sync::broadcast;

/// Channel capacity; a subscriber that falls this far behind gets
/// `RecvError::Lagged`, which callers treat as "skip to latest" — the
/// tail-drop policy for slow subscribers (spec §5 Shared resources).
const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    ScrapeProgress,
    OddsUpdates,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressError {
    pub error_type: String,
    pub message: String,
    pub recoverable: bool,
}

/// The wire shape of one broadcast event (spec §4.H Event shape).
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub topic: Topic,
    pub run_id: i64,
    pub platform: Option<Platform>,
    pub phase: Option<String>,
    pub current: u32,
    pub total: u32,
    pub events_count: i64,
    pub elapsed_ms: i64,
    pub message: String,
    pub error: Option<ProgressError>,
    pub timestamp: DateTime<Utc>,
}

type ReplayKey = (Topic, i64, Option<Platform>);

pub struct Broadcaster {
    sender: broadcast::Sender<ProgressEvent>,
    replay: DashMap<ReplayKey, ProgressEvent>,
}

impl Broadcaster {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Broadcaster { sender, replay: DashMap::new() }
    }

    /// Publishes an event: updates the replay cache *then* sends, so a
    /// subscriber connecting between the two observes consistent state
    /// (spec §4.H Atomicity — the orchestrator must update state before
    /// publishing; the broadcaster mirrors that ordering for its own cache).
    pub fn publish(&self, event: ProgressEvent) {
        let key = (event.topic, event.run_id, event.platform);
        self.replay.insert(key, event.clone());
        // No subscribers is not an error: the run proceeds whether or not
        // anyone is watching.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }

    /// Replay cache for one run across every platform seen so far, used to
    /// seed a newly (re)connected subscriber (spec §8 Broadcaster replay).
    pub fn replay_for_run(&self, topic: Topic, run_id: i64) -> Vec<ProgressEvent> {
        self.replay
            .iter()
            .filter(|entry| entry.key().0 == topic && entry.key().1 == run_id)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Replay cache across every run for a topic, used to seed a
    /// newly-connected WebSocket subscriber that has not named a run.
    pub fn replay_for_all_runs(&self, topic: Topic) -> Vec<ProgressEvent> {
        self.replay
            .iter()
            .filter(|entry| entry.key().0 == topic)
            .map(|entry| entry.value().clone())
            .collect()
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event(topic: Topic, run_id: i64, platform: Option<Platform>) -> ProgressEvent {
        ProgressEvent {
            topic,
            run_id,
            platform,
            phase: Some("scraping".to_string()),
            current: 1,
            total: 10,
            events_count: 1,
            elapsed_ms: 100,
            message: "in progress".to_string(),
            error: None,
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    #[test]
    fn late_subscriber_replay_returns_last_event_per_platform() {
        let broadcaster = Broadcaster::new();
        broadcaster.publish(sample_event(Topic::ScrapeProgress, 7, Some(Platform::Reference)));
        broadcaster.publish(sample_event(Topic::ScrapeProgress, 7, Some(Platform::Sportybet)));

        let replay = broadcaster.replay_for_run(Topic::ScrapeProgress, 7);
        assert_eq!(replay.len(), 2);
    }

    #[test]
    fn replay_is_scoped_to_topic_and_run() {
        let broadcaster = Broadcaster::new();
        broadcaster.publish(sample_event(Topic::ScrapeProgress, 1, None));
        broadcaster.publish(sample_event(Topic::OddsUpdates, 1, None));
        broadcaster.publish(sample_event(Topic::ScrapeProgress, 2, None));

        assert_eq!(broadcaster.replay_for_run(Topic::ScrapeProgress, 1).len(), 1);
        assert_eq!(broadcaster.replay_for_run(Topic::OddsUpdates, 1).len(), 1);
        assert_eq!(broadcaster.replay_for_run(Topic::ScrapeProgress, 2).len(), 1);
    }

    #[tokio::test]
    async fn current_subscriber_receives_published_event() {
        let broadcaster = Broadcaster::new();
        let mut rx = broadcaster.subscribe();
        broadcaster.publish(sample_event(Topic::ScrapeProgress, 3, None));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.run_id, 3);
    }

    /// A reconnecting subscriber that hasn't named a run (spec §8 E6) must
    /// be seeded with the last event per (topic, run, platform) across every
    /// run seen so far, not just the most recent one.
    #[test]
    fn replay_for_all_runs_spans_every_run() {
        let broadcaster = Broadcaster::new();
        broadcaster.publish(sample_event(Topic::ScrapeProgress, 1, Some(Platform::Reference)));
        broadcaster.publish(sample_event(Topic::ScrapeProgress, 2, Some(Platform::Sportybet)));
        broadcaster.publish(sample_event(Topic::OddsUpdates, 1, Some(Platform::Reference)));

        let replay = broadcaster.replay_for_all_runs(Topic::ScrapeProgress);
        assert_eq!(replay.len(), 2);
        assert!(replay.iter().any(|e| e.run_id == 1));
        assert!(replay.iter().any(|e| e.run_id == 2));
    }

    /// Reconnecting after a 410 Gone must replay the latest state, not a
    /// stale one: publishing a second event for the same (topic, run,
    /// platform) key must overwrite the cached replay entry, not append.
    #[test]
    fn replay_cache_holds_only_the_latest_event_per_key() {
        let broadcaster = Broadcaster::new();
        let mut stale = sample_event(Topic::ScrapeProgress, 5, Some(Platform::Bet9ja));
        stale.current = 1;
        broadcaster.publish(stale);

        let mut fresh = sample_event(Topic::ScrapeProgress, 5, Some(Platform::Bet9ja));
        fresh.current = 9;
        broadcaster.publish(fresh);

        let replay = broadcaster.replay_for_all_runs(Topic::ScrapeProgress);
        assert_eq!(replay.len(), 1);
        assert_eq!(replay[0].current, 9);
    }
}
