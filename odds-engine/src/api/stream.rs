//! SSE and WebSocket progress streams (spec §6, §4.H).

use super::AppState;
use crate::broadcaster::{ProgressEvent, Topic};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use odds_core::model::RunStatus;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// `GET /scrape/runs/{id}/progress` (spec §6, §8 E6): replays every cached
/// progress event for the run, then tails live updates. Returns 410 once
/// the run has already reached a terminal status and there is nothing left
/// to stream live — the replay is still returned as the response body in
/// that case via a one-shot burst, never silently dropped.
pub async fn scrape_progress_sse(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<i64>,
) -> axum::response::Response {
    let run = match state.run_metadata.get_run(run_id).await {
        Ok(Some(run)) => run,
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            warn!(run_id, error = %e, "failed to load run for progress stream");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let replay = state.broadcaster.replay_for_run(Topic::ScrapeProgress, run_id);
    let terminal = run.status != RunStatus::Running;

    if terminal {
        let events: Vec<Result<Event, Infallible>> =
            replay.into_iter().filter_map(|e| to_sse_event(&e).ok().map(Ok)).collect();
        return (
            StatusCode::GONE,
            Sse::new(stream::iter(events)).keep_alive(KeepAlive::default()),
        )
            .into_response();
    }

    let rx = state.broadcaster.subscribe();
    let live = stream::unfold(rx, move |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) if event.topic == Topic::ScrapeProgress && event.run_id == run_id => {
                    return Some((event, rx));
                }
                Ok(_) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return None,
            }
        }
    });

    let combined = stream::iter(replay).chain(live).filter_map(|e| async move { to_sse_event(&e).ok() }).map(Ok::<_, Infallible>);

    Sse::new(combined).keep_alive(KeepAlive::default()).into_response()
}

fn to_sse_event(event: &ProgressEvent) -> Result<Event, serde_json::Error> {
    Ok(Event::default().event("progress").json_data(event)?)
}

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    #[serde(default)]
    pub topics: Option<String>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let topics = parse_topics(query.topics.as_deref());
    ws.on_upgrade(move |socket| handle_socket(socket, state, topics))
}

fn parse_topics(raw: Option<&str>) -> Vec<Topic> {
    match raw {
        None => vec![Topic::ScrapeProgress, Topic::OddsUpdates],
        Some(s) => s
            .split(',')
            .filter_map(|t| match t.trim() {
                "scrape_progress" => Some(Topic::ScrapeProgress),
                "odds_updates" => Some(Topic::OddsUpdates),
                _ => None,
            })
            .collect(),
    }
}

#[derive(Serialize)]
struct Envelope<'a> {
    #[serde(rename = "type")]
    type_: &'a str,
    timestamp: chrono::DateTime<Utc>,
    data: &'a ProgressEvent,
}

#[derive(Deserialize)]
struct ClientFrame {
    #[serde(rename = "type")]
    type_: String,
}

/// Client must ping at least every 30s; a quiet socket past that window is
/// assumed dead and dropped (spec §6 WebSocket protocol).
const PING_GRACE_PERIOD: Duration = Duration::from_secs(30);

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>, topics: Vec<Topic>) {
    info!(?topics, "websocket client connected");

    for topic in &topics {
        for event in state.broadcaster.replay_for_all_runs(*topic) {
            if send_envelope(&mut socket, &event).await.is_err() {
                return;
            }
        }
    }

    let mut rx = state.broadcaster.subscribe();
    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(event) if topics.contains(&event.topic) => {
                        if send_envelope(&mut socket, &event).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            incoming = tokio::time::timeout(PING_GRACE_PERIOD, socket.recv()) => {
                match incoming {
                    Ok(Some(Ok(Message::Text(text)))) => {
                        if let Ok(frame) = serde_json::from_str::<ClientFrame>(&text) {
                            if frame.type_ == "ping" {
                                let pong = serde_json::json!({"type": "pong"});
                                if socket.send(Message::Text(pong.to_string())).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Ok(Some(Ok(Message::Close(_)))) | Ok(None) => break,
                    Ok(Some(Err(_))) => break,
                    Ok(Some(Ok(_))) => continue,
                    Err(_) => {
                        info!("websocket client silent past ping grace period, closing");
                        break;
                    }
                }
            }
        }
    }
    info!("websocket client disconnected");
}

async fn send_envelope(socket: &mut WebSocket, event: &ProgressEvent) -> Result<(), axum::Error> {
    let topic_name = match event.topic {
        Topic::ScrapeProgress => "scrape_progress",
        Topic::OddsUpdates => "odds_updates",
    };
    let envelope = Envelope { type_: topic_name, timestamp: Utc::now(), data: event };
    let json = serde_json::to_string(&envelope).unwrap_or_default();
    socket.send(Message::Text(json)).await
}
