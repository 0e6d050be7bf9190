//! Live progress transports for spec §4.8/§6: Server-Sent Events for a
//! single job, and a WebSocket variant for callers that want a persistent
//! duplex connection instead of opening one SSE stream per job.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::Response;
use futures::{Stream, StreamExt};
use serde::Deserialize;

use crate::domain::ProgressEventKind;
use crate::error::Error;
use crate::ids::JobId;
use crate::progress::ProgressBus;

use super::error::ApiError;
use super::AppState;

fn event_name(kind: ProgressEventKind) -> &'static str {
    match kind {
        ProgressEventKind::Started => "started",
        ProgressEventKind::Progress => "progress",
        ProgressEventKind::Completed => "complete",
        ProgressEventKind::Failed => "failed",
        ProgressEventKind::Cancelled => "cancelled",
    }
}

fn parse_job_id(raw: &str) -> Result<JobId, ApiError> {
    raw.parse().map_err(|_| ApiError(Error::InvalidInput(format!("not a job id: {raw}"))))
}

pub async fn progress_sse(
    State(state): State<Arc<AppState>>,
    Path(raw): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let id = parse_job_id(&raw)?;
    let events = state.orchestrator.bus().subscribe(id, state.store.as_ref()).await?;

    let stream = events.map(|event| {
        let payload = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
        Ok(Event::default().event(event_name(event.kind)).data(payload))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(ProgressBus::heartbeat_interval())))
}

#[derive(Deserialize)]
pub struct AnalysisWsQuery {
    pub job_id: JobId,
}

pub async fn analysis_ws(
    State(state): State<Arc<AppState>>,
    Query(q): Query<AnalysisWsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, q.job_id))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>, job_id: JobId) {
    let events = match state.orchestrator.bus().subscribe(job_id, state.store.as_ref()).await {
        Ok(events) => events,
        Err(err) => {
            let _ = socket.send(Message::Text(err.to_string().into())).await;
            return;
        }
    };
    tokio::pin!(events);

    let mut heartbeat = tokio::time::interval(ProgressBus::heartbeat_interval());
    heartbeat.tick().await; // first tick fires immediately; consume it before the loop

    loop {
        tokio::select! {
            next = events.next() => {
                let Some(event) = next else { break };
                let payload = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
                if socket.send(Message::Text(payload.into())).await.is_err() {
                    break;
                }
                if matches!(
                    event.kind,
                    ProgressEventKind::Completed | ProgressEventKind::Failed | ProgressEventKind::Cancelled
                ) {
                    break;
                }
            }
            _ = heartbeat.tick() => {
                if socket.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }
    let _ = socket.send(Message::Close(None)).await;
}
