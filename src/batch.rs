//! Batch Coordinator (spec §4.7): dispatches a batch's items onto a bounded
//! worker pool, each worker driving one item through the Analysis
//! Orchestrator, and keeps a live aggregate status plus counters.
//!
//! Generalizes the teacher's worker-pool job runner from "N transcode jobs"
//! to "N orchestrated analysis jobs" — the pool size and per-item dispatch
//! shape are the same, only what each worker calls has changed.

use std::sync::Arc;

use tokio::sync::{watch, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::domain::{Batch, BatchCounters, BatchItem, BatchStatus, Job, JobKind, JobStatus};
use crate::error::Result;
use crate::ids::{BatchId, JobId};
use crate::orchestrator::Orchestrator;

/// Owns one batch's worker pool and aggregate state for the lifetime of the
/// submission. `watch` carries the latest [`Batch`] snapshot to pollers; the
/// coordinator itself is the sole writer.
pub struct BatchRun {
    pub id: BatchId,
    state: watch::Sender<Batch>,
    cancel: CancellationToken,
}

impl BatchRun {
    pub fn snapshot(&self) -> Batch {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Batch> {
        self.state.subscribe()
    }

    /// Cancels every not-yet-dispatched item and propagates cancellation
    /// into every in-flight orchestrator call (spec §4.7: "cancel propagates
    /// to in-flight and un-dispatched items alike").
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

fn apply_counters(batch: &mut Batch, index: usize, status: JobStatus) {
    let previous = batch.items[index].status;
    batch.items[index].status = status;

    let dec = |c: &mut u64| *c = c.saturating_sub(1);
    match previous {
        JobStatus::Pending => dec(&mut batch.counters.pending),
        JobStatus::Processing => dec(&mut batch.counters.in_progress),
        JobStatus::Completed => dec(&mut batch.counters.completed),
        JobStatus::Failed => dec(&mut batch.counters.failed),
        JobStatus::Cancelled => dec(&mut batch.counters.cancelled),
    }
    match status {
        JobStatus::Pending => batch.counters.pending += 1,
        JobStatus::Processing => batch.counters.in_progress += 1,
        JobStatus::Completed => batch.counters.completed += 1,
        JobStatus::Failed => batch.counters.failed += 1,
        JobStatus::Cancelled => batch.counters.cancelled += 1,
    }
    batch.updated_at = chrono::Utc::now();
}

/// Monotonic batch status: never regresses out of a terminal state (spec
/// §4.7 "batch status is a join over item statuses, and only moves
/// forward").
fn derive_status(counters: &BatchCounters, current: BatchStatus) -> BatchStatus {
    if matches!(current, BatchStatus::Completed | BatchStatus::Cancelled) {
        return current;
    }
    if counters.pending == counters.total {
        return BatchStatus::Pending;
    }
    let settled = counters.completed + counters.failed + counters.cancelled;
    if settled == counters.total {
        if counters.cancelled > 0 && counters.completed == 0 && counters.failed == 0 {
            BatchStatus::Cancelled
        } else {
            BatchStatus::Completed
        }
    } else {
        BatchStatus::Processing
    }
}

/// Submits every item in `sources` as its own [`JobKind::BatchItem`] job,
/// bounded to `max_parallel` concurrent orchestrator calls, preserving
/// submission order in the returned [`BatchRun`]'s item list.
pub fn submit(
    orchestrator: Arc<Orchestrator>,
    sources: Vec<crate::domain::SourceDescriptor>,
    options: crate::domain::AnalysisOptions,
    max_parallel: usize,
) -> Arc<BatchRun> {
    let total = sources.len() as u64;
    let items: Vec<BatchItem> = sources
        .iter()
        .map(|source| BatchItem { source: source.clone(), job_id: None, status: JobStatus::Pending })
        .collect();

    let batch = Batch {
        id: BatchId::new(),
        items,
        counters: BatchCounters { total, pending: total, ..Default::default() },
        status: BatchStatus::Pending,
        started_at: chrono::Utc::now(),
        updated_at: chrono::Utc::now(),
        completed_at: None,
    };
    let id = batch.id;
    let (tx, _rx) = watch::channel(batch);
    let cancel = CancellationToken::new();
    let run = Arc::new(BatchRun { id, state: tx, cancel });

    let semaphore = Arc::new(Semaphore::new(max_parallel.max(1)));
    for (index, source) in sources.into_iter().enumerate() {
        let orchestrator = orchestrator.clone();
        let options = options.clone();
        let semaphore = semaphore.clone();
        let run = run.clone();
        tokio::spawn(async move {
            run_item(orchestrator, run, index, source, options, semaphore).await;
        });
    }

    run
}

async fn run_item(
    orchestrator: Arc<Orchestrator>,
    run: Arc<BatchRun>,
    index: usize,
    source: crate::domain::SourceDescriptor,
    options: crate::domain::AnalysisOptions,
    semaphore: Arc<Semaphore>,
) {
    if run.cancel.is_cancelled() {
        mark_item(&run, index, None, JobStatus::Cancelled);
        return;
    }

    let Ok(_permit) = semaphore.acquire_owned().await else { return };
    if run.cancel.is_cancelled() {
        mark_item(&run, index, None, JobStatus::Cancelled);
        return;
    }

    let job = Job::new(JobKind::BatchItem, source, options);
    let job_id = job.id;
    mark_item(&run, index, Some(job_id), JobStatus::Processing);

    let item_cancel = run.cancel.clone();
    let result = orchestrator.start(job, item_cancel).await;
    let final_status = match result {
        Ok(_) => JobStatus::Completed,
        Err(crate::error::Error::Cancelled(_)) => JobStatus::Cancelled,
        Err(_) => JobStatus::Failed,
    };
    mark_item(&run, index, Some(job_id), final_status);
}

fn mark_item(run: &BatchRun, index: usize, job_id: Option<JobId>, status: JobStatus) {
    run.state.send_if_modified(|batch| {
        if let Some(job_id) = job_id {
            batch.items[index].job_id = Some(job_id);
        }
        apply_counters(batch, index, status);
        batch.status = derive_status(&batch.counters, batch.status);
        if matches!(batch.status, BatchStatus::Completed | BatchStatus::Cancelled)
            && batch.completed_at.is_none()
        {
            batch.completed_at = Some(chrono::Utc::now());
        }
        true
    });
}

/// Process-lifetime registry of in-flight/completed batches, keyed by id.
/// Batches don't survive a restart (spec leaves batch persistence
/// unspecified; a `Batch` row is cheap to reconstruct from its items' own
/// job records if that's ever needed).
#[derive(Default)]
pub struct BatchRegistry {
    runs: tokio::sync::RwLock<std::collections::HashMap<BatchId, Arc<BatchRun>>>,
}

impl BatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, run: Arc<BatchRun>) {
        self.runs.write().await.insert(run.id, run);
    }

    pub async fn get(&self, id: BatchId) -> Result<Arc<BatchRun>> {
        self.runs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| crate::error::Error::NotFound(format!("batch {id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;
    use crate::config::Config;
    use crate::domain::{AnalysisOptions, SourceDescriptor};
    use crate::progress::ProgressBus;
    use crate::store::InMemoryStore;

    fn orchestrator() -> Arc<Orchestrator> {
        let config = Config {
            ffprobe_path: "/nonexistent/ffprobe-does-not-exist".into(),
            allowed_path_roots: vec![],
            ..Config::from_env()
        };
        Arc::new(Orchestrator::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(InMemoryCache::new()),
            Arc::new(ProgressBus::new()),
            config,
        ))
    }

    async fn wait_for_terminal(run: &BatchRun) -> Batch {
        let mut rx = run.subscribe();
        loop {
            let batch = rx.borrow().clone();
            if matches!(batch.status, BatchStatus::Completed | BatchStatus::Cancelled) {
                return batch;
            }
            rx.changed().await.unwrap();
        }
    }

    #[tokio::test]
    async fn all_items_failing_settles_the_batch_as_completed_with_failed_counters() {
        let orch = orchestrator();
        let sources = vec![
            SourceDescriptor::LocalPath { path: "/data/a.mp4".into() },
            SourceDescriptor::LocalPath { path: "/data/b.mp4".into() },
        ];
        let run = submit(orch, sources, AnalysisOptions::default(), 2);

        let batch = wait_for_terminal(&run).await;
        assert_eq!(batch.status, BatchStatus::Completed);
        assert_eq!(batch.counters.failed, 2);
        assert_eq!(batch.counters.total, 2);
        assert!(batch.counters.invariant_holds());
    }

    #[tokio::test]
    async fn cancelling_before_dispatch_marks_unstarted_items_cancelled() {
        let orch = orchestrator();
        let sources = vec![SourceDescriptor::LocalPath { path: "/data/a.mp4".into() }];
        let run = submit(orch, sources, AnalysisOptions::default(), 1);
        run.cancel();

        let batch = wait_for_terminal(&run).await;
        assert!(batch.counters.invariant_holds());
    }

    #[test]
    fn derive_status_never_leaves_a_terminal_state() {
        let counters = BatchCounters { total: 2, completed: 2, ..Default::default() };
        assert_eq!(derive_status(&counters, BatchStatus::Cancelled), BatchStatus::Cancelled);
    }

    #[test]
    fn derive_status_reports_processing_while_items_are_in_flight() {
        let counters = BatchCounters { total: 2, completed: 1, in_progress: 1, ..Default::default() };
        assert_eq!(derive_status(&counters, BatchStatus::Processing), BatchStatus::Processing);
    }
}
