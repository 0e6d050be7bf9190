//! Result Store (spec §4.9): a repository contract plus an in-memory
//! reference implementation.

mod in_memory;

pub use in_memory::InMemoryStore;

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::{AnalysisResult, Job, JobStatus, QualityMetricRecord};
use crate::error::Result;
use crate::ids::{JobId, TenantId, UserId};

#[derive(Debug, Clone, Default)]
pub struct JobFilters {
    pub status: Option<JobStatus>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
}

#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn create_job(&self, job: Job) -> Result<JobId>;
    async fn update_job_status(&self, id: JobId, status: JobStatus, error: Option<String>) -> Result<()>;
    async fn upsert_analysis_result(&self, job_id: JobId, result: AnalysisResult) -> Result<()>;
    async fn get_job(&self, id: JobId) -> Result<Job>;
    async fn get_result(&self, id: JobId) -> Result<Option<AnalysisResult>>;
    async fn list_jobs(
        &self,
        user: Option<UserId>,
        tenant: Option<TenantId>,
        filters: JobFilters,
        page: usize,
        page_size: usize,
    ) -> Result<Page<Job>>;
    async fn insert_quality_metric(&self, record: QualityMetricRecord) -> Result<()>;
    async fn get_by_content_fingerprint(&self, fingerprint: &str) -> Result<Option<Job>>;
    async fn delete_job_cascade(&self, id: JobId) -> Result<()>;
}
