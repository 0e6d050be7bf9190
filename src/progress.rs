//! Progress Bus (spec §4.8): in-process publish/subscribe from the
//! orchestrator to WebSocket/SSE subscribers, one broadcast channel per job.
//!
//! Modeled on the broadcast-backed event bus pattern: a bounded
//! `tokio::sync::broadcast` channel per topic, with `Lagged` receiver errors
//! folded into the bus's own drop-oldest semantics rather than surfaced to
//! subscribers as an error.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::{stream, Stream};
use tokio::sync::{broadcast, Mutex};

use crate::domain::{JobSnapshot, JobStatus, ProgressEvent, ProgressEventKind};
use crate::ids::JobId;
use crate::store::ResultStore;

const QUEUE_DEPTH: usize = 256;
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

struct Topic {
    sender: broadcast::Sender<ProgressEvent>,
    next_sequence: u64,
}

enum SubState {
    Synthetic(ProgressEvent),
    Live(broadcast::Receiver<ProgressEvent>),
    Done,
}

/// Per-job fan-out. One publisher (the orchestrator), many subscribers.
/// Topics are torn down lazily; a job with no active subscribers and no
/// further publishes just has its `broadcast::Sender` dropped along with the
/// bus's own reference once `retire` is called.
#[derive(Default)]
pub struct ProgressBus {
    topics: Mutex<HashMap<JobId, Topic>>,
}

impl ProgressBus {
    pub fn new() -> Self {
        Self::default()
    }

    async fn topic_sender(&self, job_id: JobId) -> broadcast::Sender<ProgressEvent> {
        let mut topics = self.topics.lock().await;
        let topic = topics.entry(job_id).or_insert_with(|| Topic {
            sender: broadcast::channel(QUEUE_DEPTH).0,
            next_sequence: 0,
        });
        topic.sender.clone()
    }

    /// Publish an event, assigning the next sequence number for this job.
    /// A publish with no subscribers is not an error (spec: "publish
    /// failure does not roll back state" implies publishing is best-effort).
    pub async fn publish(&self, job_id: JobId, kind: ProgressEventKind, progress: Option<f64>, snapshot: Option<JobSnapshot>) {
        let sequence = {
            let mut topics = self.topics.lock().await;
            let topic = topics.entry(job_id).or_insert_with(|| Topic {
                sender: broadcast::channel(QUEUE_DEPTH).0,
                next_sequence: 0,
            });
            let seq = topic.next_sequence;
            topic.next_sequence += 1;
            seq
        };

        let event = ProgressEvent { job_id, sequence, kind, progress, snapshot, wall_time: chrono::Utc::now() };
        let _ = self.topic_sender(job_id).await.send(event);
    }

    /// Drop the bus's retained sender for a job once it has gone terminal
    /// and no further events will ever be published for it. Subscribers
    /// already holding a receiver keep draining the channel until closed.
    pub async fn retire(&self, job_id: JobId) {
        self.topics.lock().await.remove(&job_id);
    }

    /// Subscribe to a job's event stream. If the job has already reached a
    /// terminal state, the first item is a synthetic current-state event
    /// built from the persisted record rather than the live channel (spec
    /// §4.8: late subscribers must see current state, not silence).
    pub async fn subscribe(
        &self,
        job_id: JobId,
        store: &dyn ResultStore,
    ) -> crate::error::Result<impl Stream<Item = ProgressEvent>> {
        let job = store.get_job(job_id).await?;
        let receiver = self.topic_sender(job_id).await.subscribe();

        let synthetic = if job.status.is_terminal() {
            let result = store.get_result(job_id).await?;
            Some(ProgressEvent {
                job_id,
                sequence: 0,
                kind: terminal_event_kind(job.status),
                progress: Some(1.0),
                snapshot: Some(JobSnapshot { status: job.status, result, error: job.error.clone() }),
                wall_time: chrono::Utc::now(),
            })
        } else {
            None
        };

        let initial = match synthetic {
            Some(event) => SubState::Synthetic(event),
            None => SubState::Live(receiver),
        };

        Ok(stream::unfold(initial, |state| async move {
            match state {
                SubState::Synthetic(event) => Some((event, SubState::Done)),
                SubState::Done => None,
                SubState::Live(mut receiver) => loop {
                    match receiver.recv().await {
                        Ok(event) => {
                            let is_terminal = matches!(
                                event.kind,
                                ProgressEventKind::Completed | ProgressEventKind::Failed | ProgressEventKind::Cancelled
                            );
                            let next = if is_terminal { SubState::Done } else { SubState::Live(receiver) };
                            return Some((event, next));
                        }
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                },
            }
        }))
    }

    /// Heartbeat ticker for a subscriber's transport layer (WS ping / SSE
    /// comment) to interleave with `subscribe`'s event stream.
    pub fn heartbeat_interval() -> Duration {
        HEARTBEAT_INTERVAL
    }
}

fn terminal_event_kind(status: JobStatus) -> ProgressEventKind {
    match status {
        JobStatus::Completed => ProgressEventKind::Completed,
        JobStatus::Failed => ProgressEventKind::Failed,
        JobStatus::Cancelled => ProgressEventKind::Cancelled,
        JobStatus::Pending | JobStatus::Processing => ProgressEventKind::Progress,
    }
}

/// Wraps a [`ProgressBus`] publish call with a fan-out progress fraction, so
/// orchestrator tasks never need to construct [`ProgressEvent`] by hand.
pub async fn publish_progress(bus: &Arc<ProgressBus>, job_id: JobId, fraction: f64) {
    bus.publish(job_id, ProgressEventKind::Progress, Some(fraction.min(0.99)), None).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AnalysisOptions, Job, JobKind, SourceDescriptor};
    use crate::store::InMemoryStore;
    use futures::StreamExt;

    #[tokio::test]
    async fn late_subscriber_to_a_terminal_job_gets_synthetic_snapshot() {
        let store = InMemoryStore::new();
        let job = Job::new(JobKind::Single, SourceDescriptor::LocalPath { path: "/a.mp4".into() }, AnalysisOptions::default());
        let id = store.create_job(job).await.unwrap();
        store.update_job_status(id, JobStatus::Processing, None).await.unwrap();
        store.update_job_status(id, JobStatus::Completed, None).await.unwrap();

        let bus = ProgressBus::new();
        let mut stream = Box::pin(bus.subscribe(id, &store).await.unwrap());
        let event = stream.next().await.unwrap();
        assert!(matches!(event.kind, ProgressEventKind::Completed));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn live_subscriber_sees_published_events_in_sequence() {
        let store = InMemoryStore::new();
        let job = Job::new(JobKind::Single, SourceDescriptor::LocalPath { path: "/a.mp4".into() }, AnalysisOptions::default());
        let id = store.create_job(job).await.unwrap();
        store.update_job_status(id, JobStatus::Processing, None).await.unwrap();

        let bus = ProgressBus::new();
        let mut stream = Box::pin(bus.subscribe(id, &store).await.unwrap());

        bus.publish(id, ProgressEventKind::Progress, Some(0.25), None).await;
        bus.publish(id, ProgressEventKind::Completed, Some(1.0), None).await;

        let first = stream.next().await.unwrap();
        assert_eq!(first.sequence, 0);
        let second = stream.next().await.unwrap();
        assert_eq!(second.sequence, 1);
        assert!(matches!(second.kind, ProgressEventKind::Completed));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn publishing_with_no_subscribers_does_not_error() {
        let bus = ProgressBus::new();
        bus.publish(JobId::new(), ProgressEventKind::Started, None, None).await;
    }
}
