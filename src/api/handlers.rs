//! Request/response glue for spec §6's REST surface. Each handler builds a
//! [`Job`] (or batch of them) and hands it to the [`Orchestrator`], then
//! shapes the result into the wire format — handlers never touch
//! `ffprobe`/`ffmpeg` or the store directly beyond what the domain layer
//! exposes.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::domain::{AnalysisOptions, Job, JobKind, JobStatus, SourceDescriptor};
use crate::error::Error;
use crate::ids::{BatchId, JobId, TenantId, UserId};
use crate::quality::MetricKind;
use crate::store::JobFilters;

use super::error::ApiError;
use super::AppState;

fn parse_job_id(raw: &str) -> Result<JobId, ApiError> {
    raw.parse().map_err(|_| ApiError(Error::InvalidInput(format!("not a job id: {raw}"))))
}

fn parse_batch_id(raw: &str) -> Result<BatchId, ApiError> {
    raw.parse().map_err(|_| ApiError(Error::InvalidInput(format!("not a batch id: {raw}"))))
}

/// Runs a job to completion, or hands it to a background task and answers
/// `202 Accepted` right away, per the submitted `async` flag (spec §6:
/// "every analysis endpoint accepts a synchronous or fire-and-forget mode").
async fn submit_and_respond(
    state: &Arc<AppState>,
    job: Job,
    asynchronous: bool,
) -> Result<Response, ApiError> {
    let job_id = job.id;
    if asynchronous {
        let orchestrator = state.orchestrator.clone();
        tokio::spawn(async move {
            let _ = orchestrator.start(job, CancellationToken::new()).await;
        });
        Ok((StatusCode::ACCEPTED, Json(AcceptedBody { job_id })).into_response())
    } else {
        let result = state.orchestrator.start(job, CancellationToken::new()).await?;
        Ok((StatusCode::OK, Json(result)).into_response())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AcceptedBody {
    job_id: JobId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeFileRequest {
    pub path: std::path::PathBuf,
    #[serde(default)]
    pub options: AnalysisOptions,
    #[serde(rename = "async", default)]
    pub r#async: bool,
}

pub async fn probe_file(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ProbeFileRequest>,
) -> Result<Response, ApiError> {
    let source = SourceDescriptor::LocalPath { path: req.path };
    let job = Job::new(JobKind::Single, source, req.options);
    submit_and_respond(&state, job, req.r#async).await
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeUrlRequest {
    pub url: String,
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub options: AnalysisOptions,
    #[serde(rename = "async", default)]
    pub r#async: bool,
}

pub async fn probe_url(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ProbeUrlRequest>,
) -> Result<Response, ApiError> {
    let source = SourceDescriptor::Url { url: req.url, timeout_ms: req.timeout_ms };
    let job = Job::new(JobKind::Single, source, req.options);
    submit_and_respond(&state, job, req.r#async).await
}

fn default_max_segments() -> u32 {
    10
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeHlsRequest {
    pub url: String,
    #[serde(default = "default_max_segments")]
    pub max_segments: u32,
    #[serde(default = "default_true")]
    pub analyze_segments: bool,
    #[serde(default = "default_true")]
    pub validate_compliance: bool,
    #[serde(default)]
    pub options: AnalysisOptions,
    #[serde(rename = "async", default)]
    pub r#async: bool,
}

pub async fn probe_hls(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ProbeHlsRequest>,
) -> Result<Response, ApiError> {
    let source = SourceDescriptor::HlsManifest {
        url: req.url,
        max_segments: req.max_segments,
        analyze_segments: req.analyze_segments,
        validate_compliance: req.validate_compliance,
    };
    let job = Job::new(JobKind::Hls, source, req.options);
    submit_and_respond(&state, job, req.r#async).await
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeCompareRequest {
    pub reference_job_id: JobId,
    pub distorted_job_id: JobId,
    pub metrics: Vec<MetricKind>,
    #[serde(rename = "async", default)]
    pub r#async: bool,
}

pub async fn probe_compare(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ProbeCompareRequest>,
) -> Result<Response, ApiError> {
    let source = SourceDescriptor::Comparison {
        reference_job_id: req.reference_job_id,
        distorted_job_id: req.distorted_job_id,
        metrics: req.metrics,
    };
    let job = Job::new(JobKind::Comparison, source, AnalysisOptions::default());
    submit_and_respond(&state, job, req.r#async).await
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusBody {
    pub status: JobStatus,
    pub error: Option<crate::domain::JobError>,
    pub result: Option<crate::domain::AnalysisResult>,
}

pub async fn job_status(
    State(state): State<Arc<AppState>>,
    Path(raw): Path<String>,
) -> Result<Json<JobStatusBody>, ApiError> {
    let id = parse_job_id(&raw)?;
    let job = state.store.get_job(id).await?;
    let result = if job.status.is_terminal() { state.store.get_result(id).await? } else { None };
    Ok(Json(JobStatusBody { status: job.status, error: job.error, result }))
}

fn default_page() -> usize {
    1
}

fn default_page_size() -> usize {
    20
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListAnalysesQuery {
    pub status: Option<JobStatus>,
    pub user_id: Option<UserId>,
    pub tenant_id: Option<TenantId>,
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

pub async fn list_analyses(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ListAnalysesQuery>,
) -> Result<Json<crate::store::Page<Job>>, ApiError> {
    let filters = JobFilters { status: q.status };
    let page = state.store.list_jobs(q.user_id, q.tenant_id, filters, q.page, q.page_size).await?;
    Ok(Json(page))
}

pub async fn delete_analysis(
    State(state): State<Arc<AppState>>,
    Path(raw): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_job_id(&raw)?;
    state.store.delete_job_cascade(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSubmitRequest {
    pub sources: Vec<SourceDescriptor>,
    #[serde(default)]
    pub options: AnalysisOptions,
    pub max_parallel: Option<usize>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchAcceptedBody {
    batch_id: BatchId,
}

pub async fn submit_batch(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BatchSubmitRequest>,
) -> Result<Response, ApiError> {
    if req.sources.is_empty() {
        return Err(ApiError(Error::InvalidInput("a batch needs at least one source".into())));
    }
    let max_parallel = req.max_parallel.unwrap_or(state.config.max_parallel_batch_items);
    let run = crate::batch::submit(state.orchestrator.clone(), req.sources, req.options, max_parallel);
    let batch_id = run.id;
    state.batches.insert(run).await;
    Ok((StatusCode::ACCEPTED, Json(BatchAcceptedBody { batch_id })).into_response())
}

pub async fn batch_status(
    State(state): State<Arc<AppState>>,
    Path(raw): Path<String>,
) -> Result<Json<crate::domain::Batch>, ApiError> {
    let id = parse_batch_id(&raw)?;
    let run = state.batches.get(id).await?;
    Ok(Json(run.snapshot()))
}

pub async fn cancel_batch(
    State(state): State<Arc<AppState>>,
    Path(raw): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_batch_id(&raw)?;
    let run = state.batches.get(id).await?;
    run.cancel();
    Ok(StatusCode::ACCEPTED)
}
