//! In-memory reference implementation of [`super::ResultStore`], grounded in
//! the same repository shape the teacher's settings layer persists to disk
//! synchronously — here behind a `tokio::sync::RwLock` so many orchestrator
//! tasks can read concurrently.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{AnalysisResult, Job, JobStatus, QualityMetricRecord};
use crate::error::{Error, Result};
use crate::ids::{JobId, TenantId, UserId};

use super::{JobFilters, Page, ResultStore};

#[derive(Default)]
pub struct InMemoryStore {
    jobs: RwLock<HashMap<JobId, Job>>,
    results: RwLock<HashMap<JobId, AnalysisResult>>,
    metrics: RwLock<Vec<QualityMetricRecord>>,
    fingerprint_index: RwLock<HashMap<String, JobId>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResultStore for InMemoryStore {
    async fn create_job(&self, job: Job) -> Result<JobId> {
        let id = job.id;
        let fingerprint = job.fingerprint.clone();
        self.jobs.write().await.insert(id, job);
        if let Some(fp) = fingerprint {
            self.fingerprint_index.write().await.insert(fp, id);
        }
        Ok(id)
    }

    async fn update_job_status(&self, id: JobId, status: JobStatus, error: Option<String>) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or_else(|| Error::NotFound(format!("job {id}")))?;

        if job.status.is_terminal() {
            return Err(Error::Conflict(format!(
                "job {id} is already terminal ({:?}); cannot transition to {:?}",
                job.status, status
            )));
        }
        if !job.status.can_transition_to(status) {
            return Err(Error::Conflict(format!(
                "illegal transition for job {id}: {:?} -> {:?}",
                job.status, status
            )));
        }

        job.status = status;
        job.error = error.map(|detail| crate::domain::JobError { kind: format!("{status:?}"), detail });
        if status == JobStatus::Processing && job.start_time.is_none() {
            job.start_time = Some(chrono::Utc::now());
        }
        if status.is_terminal() {
            job.end_time = Some(chrono::Utc::now());
        }
        Ok(())
    }

    async fn upsert_analysis_result(&self, job_id: JobId, result: AnalysisResult) -> Result<()> {
        {
            let jobs = self.jobs.read().await;
            jobs.get(&job_id).ok_or_else(|| Error::NotFound(format!("job {job_id}")))?;
        }
        self.results.write().await.insert(job_id, result);
        Ok(())
    }

    async fn get_job(&self, id: JobId) -> Result<Job> {
        self.jobs.read().await.get(&id).cloned().ok_or_else(|| Error::NotFound(format!("job {id}")))
    }

    async fn get_result(&self, id: JobId) -> Result<Option<AnalysisResult>> {
        Ok(self.results.read().await.get(&id).cloned())
    }

    async fn list_jobs(
        &self,
        user: Option<UserId>,
        tenant: Option<TenantId>,
        filters: JobFilters,
        page: usize,
        page_size: usize,
    ) -> Result<Page<Job>> {
        let jobs = self.jobs.read().await;
        let mut matching: Vec<Job> = jobs
            .values()
            .filter(|j| user.map(|u| j.user_id == Some(u)).unwrap_or(true))
            .filter(|j| tenant.map(|t| j.tenant_id == Some(t)).unwrap_or(true))
            .filter(|j| filters.status.map(|s| j.status == s).unwrap_or(true))
            .cloned()
            .collect();
        matching.sort_by_key(|j| j.submit_time);

        let total = matching.len();
        let start = page.saturating_mul(page_size).min(total);
        let end = (start + page_size).min(total);
        Ok(Page { items: matching[start..end].to_vec(), total, page, page_size })
    }

    async fn insert_quality_metric(&self, record: QualityMetricRecord) -> Result<()> {
        {
            let jobs = self.jobs.read().await;
            jobs.get(&record.parent_job_id)
                .ok_or_else(|| Error::NotFound(format!("job {}", record.parent_job_id)))?;
        }
        self.metrics.write().await.push(record);
        Ok(())
    }

    async fn get_by_content_fingerprint(&self, fingerprint: &str) -> Result<Option<Job>> {
        let Some(id) = self.fingerprint_index.read().await.get(fingerprint).copied() else {
            return Ok(None);
        };
        let jobs = self.jobs.read().await;
        Ok(jobs.get(&id).filter(|j| j.status == JobStatus::Completed).cloned())
    }

    async fn delete_job_cascade(&self, id: JobId) -> Result<()> {
        let job = self.jobs.write().await.remove(&id).ok_or_else(|| Error::NotFound(format!("job {id}")))?;
        self.results.write().await.remove(&id);
        self.metrics.write().await.retain(|m| m.parent_job_id != id);
        if let Some(fp) = job.fingerprint {
            self.fingerprint_index.write().await.remove(&fp);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AnalysisOptions, JobKind, SourceDescriptor, ToolVersions};

    fn sample_job() -> Job {
        Job::new(JobKind::Single, SourceDescriptor::LocalPath { path: "/data/a.mp4".into() }, AnalysisOptions::default())
    }

    #[tokio::test]
    async fn update_job_status_rejects_illegal_transitions() {
        let store = InMemoryStore::new();
        let job = sample_job();
        let id = store.create_job(job).await.unwrap();
        let err = store.update_job_status(id, JobStatus::Completed, None).await.unwrap_err();
        assert_eq!(err.code(), "Conflict");
    }

    #[tokio::test]
    async fn terminal_jobs_cannot_be_mutated_further() {
        let store = InMemoryStore::new();
        let id = store.create_job(sample_job()).await.unwrap();
        store.update_job_status(id, JobStatus::Processing, None).await.unwrap();
        store.update_job_status(id, JobStatus::Completed, None).await.unwrap();
        let err = store.update_job_status(id, JobStatus::Failed, None).await.unwrap_err();
        assert_eq!(err.code(), "Conflict");
    }

    #[tokio::test]
    async fn fingerprint_lookup_only_returns_completed_jobs() {
        let store = InMemoryStore::new();
        let mut job = sample_job();
        job.fingerprint = Some("fp-1".to_string());
        let id = store.create_job(job).await.unwrap();

        assert!(store.get_by_content_fingerprint("fp-1").await.unwrap().is_none());

        store.update_job_status(id, JobStatus::Processing, None).await.unwrap();
        store.update_job_status(id, JobStatus::Completed, None).await.unwrap();
        let found = store.get_by_content_fingerprint("fp-1").await.unwrap();
        assert_eq!(found.unwrap().id, id);
    }

    #[tokio::test]
    async fn delete_job_cascade_removes_result_and_metrics() {
        let store = InMemoryStore::new();
        let id = store.create_job(sample_job()).await.unwrap();
        store.update_job_status(id, JobStatus::Processing, None).await.unwrap();
        store
            .upsert_analysis_result(
                id,
                AnalysisResult {
                    job_id: id,
                    raw_probe: serde_json::json!({}),
                    enhanced_analysis: Default::default(),
                    content_analysis: None,
                    content_hash: None,
                    processing_duration_ms: 10,
                    tool_versions: ToolVersions { ffprobe: None, ffmpeg: None },
                    warnings: vec![],
                },
            )
            .await
            .unwrap();

        store.delete_job_cascade(id).await.unwrap();
        assert!(store.get_job(id).await.is_err());
        assert!(store.get_result(id).await.unwrap().is_none());
    }
}
