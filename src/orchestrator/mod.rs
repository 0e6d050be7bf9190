//! Analysis Orchestrator (spec §4.6): owns the job state machine, fans a
//! submitted job out to the Probe Invoker / Content Filter Runners / Quality
//! Comparator / HLS Analyzer, and reduces their outputs into one persisted
//! [`AnalysisResult`].
//!
//! One [`start`](Orchestrator::start) call runs a job to a terminal state and
//! returns the persisted result; it does not return early. Callers that want
//! "submit now, poll/subscribe later" semantics (the HTTP layer) spawn this
//! as a background task themselves.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::cache::Cache;
use crate::config::Config;
use crate::content::{self, FilterKind};
use crate::domain::{
    AnalysisResult, Job, JobError, JobSnapshot, JobStatus, ProgressEventKind, SourceDescriptor,
    ToolVersions,
};
use crate::error::{Error, Result};
use crate::fingerprint;
use crate::hls;
use crate::ids::JobId;
use crate::probe::{self, validate};
use crate::progress::{self, ProgressBus};
use crate::quality;

/// Holds the orchestrator's dependencies so the HTTP/batch layers can build
/// one instance and share it behind an `Arc`.
pub struct Orchestrator {
    store: Arc<dyn crate::store::ResultStore>,
    cache: Arc<dyn Cache>,
    bus: Arc<ProgressBus>,
    config: Config,
    http_client: reqwest::Client,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn crate::store::ResultStore>,
        cache: Arc<dyn Cache>,
        bus: Arc<ProgressBus>,
        config: Config,
    ) -> Self {
        Self { store, cache, bus, config, http_client: reqwest::Client::new() }
    }

    pub fn bus(&self) -> &Arc<ProgressBus> {
        &self.bus
    }

    pub fn store(&self) -> &Arc<dyn crate::store::ResultStore> {
        &self.store
    }

    /// Runs `job` through validation, dedup, fan-out/fan-in, and persistence,
    /// returning the terminal [`AnalysisResult`] or the terminal error. Inside
    /// the fan-out, a mandatory task's failure cancels a child token scoped to
    /// the optional tasks immediately, so they're torn down rather than left
    /// to run past a failure that already decided the outcome; `cancel`
    /// itself is only flipped here once `execute` has returned, for the
    /// benefit of any caller still watching it after the job is already
    /// terminal.
    pub async fn start(&self, mut job: Job, cancel: CancellationToken) -> Result<AnalysisResult> {
        self.validate_source(&job.source)?;

        let fp = fingerprint::compute(&job.source, &job.options).await;
        job.fingerprint = fp.clone();
        let job_id = self.store.create_job(job.clone()).await?;
        self.bus.publish(job_id, ProgressEventKind::Started, Some(0.0), None).await;

        if let Some(fp) = &fp {
            if let Some(result) = self.try_dedup(job_id, fp).await? {
                return Ok(result);
            }
        }

        self.store.update_job_status(job_id, JobStatus::Processing, None).await?;
        progress::publish_progress(&self.bus, job_id, 0.05).await;

        let started = Instant::now();
        let outcome = self.execute(job_id, &job, &cancel).await;

        match outcome {
            Ok(mut result) => {
                result.processing_duration_ms = started.elapsed().as_millis() as u64;
                self.store.upsert_analysis_result(job_id, result.clone()).await?;
                self.store.update_job_status(job_id, JobStatus::Completed, None).await?;
                if let Some(fp) = &fp {
                    self.remember_fingerprint(fp, job_id).await;
                }
                let snapshot = JobSnapshot {
                    status: JobStatus::Completed,
                    result: Some(result.clone()),
                    error: None,
                };
                self.bus
                    .publish(job_id, ProgressEventKind::Completed, Some(1.0), Some(snapshot))
                    .await;
                self.bus.retire(job_id).await;
                Ok(result)
            }
            Err(err) => {
                cancel.cancel();
                let (status, kind) = if matches!(err, Error::Cancelled(_)) {
                    (JobStatus::Cancelled, ProgressEventKind::Cancelled)
                } else {
                    (JobStatus::Failed, ProgressEventKind::Failed)
                };
                self.store.update_job_status(job_id, status, Some(err.to_string())).await?;
                let snapshot = JobSnapshot {
                    status,
                    result: None,
                    error: Some(JobError { kind: err.code().to_string(), detail: err.to_string() }),
                };
                self.bus.publish(job_id, kind, Some(1.0), Some(snapshot)).await;
                self.bus.retire(job_id).await;
                Err(err)
            }
        }
    }

    fn validate_source(&self, source: &SourceDescriptor) -> Result<()> {
        match source {
            SourceDescriptor::LocalPath { path } => {
                validate::validate_local_path(path, &self.config.allowed_path_roots).map(|_| ())
            }
            SourceDescriptor::Url { url, .. } => {
                validate::validate_url_scheme(url, &self.config.allowed_url_schemes)
            }
            SourceDescriptor::HlsManifest { url, .. } => {
                validate::validate_url_scheme(url, &self.config.allowed_url_schemes)
            }
            SourceDescriptor::Comparison { reference_job_id, distorted_job_id, .. } => {
                if reference_job_id == distorted_job_id {
                    Err(Error::InvalidInput("comparison references the same job twice".into()))
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Looks up a completed job with the same content+option fingerprint via
    /// the cache's TTL-bounded pointer (spec §4.6: "within the configured
    /// freshness window"). A miss here is always a cold miss, never an error
    /// — the caller just runs the job normally.
    async fn try_dedup(&self, job_id: JobId, fp: &str) -> Result<Option<AnalysisResult>> {
        let Some(prior_id) = self
            .cache
            .hgetall(fp)
            .await
            .get("job_id")
            .and_then(|s| s.parse::<JobId>().ok())
        else {
            return Ok(None);
        };

        let Ok(prior_job) = self.store.get_job(prior_id).await else { return Ok(None) };
        if prior_job.status != JobStatus::Completed {
            return Ok(None);
        }
        let Some(mut result) = self.store.get_result(prior_id).await? else { return Ok(None) };
        result.job_id = job_id;

        self.store.update_job_status(job_id, JobStatus::Processing, None).await?;
        self.store.upsert_analysis_result(job_id, result.clone()).await?;
        self.store.update_job_status(job_id, JobStatus::Completed, None).await?;
        self.remember_fingerprint(fp, job_id).await;

        let snapshot =
            JobSnapshot { status: JobStatus::Completed, result: Some(result.clone()), error: None };
        self.bus.publish(job_id, ProgressEventKind::Completed, Some(1.0), Some(snapshot)).await;
        self.bus.retire(job_id).await;
        Ok(Some(result))
    }

    async fn remember_fingerprint(&self, fp: &str, job_id: JobId) {
        let mut fields = std::collections::HashMap::new();
        fields.insert("job_id".to_string(), job_id.to_string());
        self.cache.hset(fp, fields).await;
        self.cache.expire(fp, self.config.dedup_ttl).await;
    }

    async fn execute(&self, job_id: JobId, job: &Job, cancel: &CancellationToken) -> Result<AnalysisResult> {
        match &job.source {
            SourceDescriptor::LocalPath { .. } | SourceDescriptor::Url { .. } => {
                self.execute_probe_job(job_id, job, cancel).await
            }
            SourceDescriptor::HlsManifest { url, max_segments, analyze_segments, .. } => {
                self.execute_hls_job(job_id, url, *max_segments, *analyze_segments, cancel).await
            }
            SourceDescriptor::Comparison { reference_job_id, distorted_job_id, metrics } => {
                self.execute_comparison_job(job_id, *reference_job_id, *distorted_job_id, metrics, cancel)
                    .await
            }
        }
    }

    fn input_arg(&self, source: &SourceDescriptor) -> Result<String> {
        match source {
            SourceDescriptor::LocalPath { path } => {
                let validated = validate::validate_local_path(path, &self.config.allowed_path_roots)?;
                Ok(validated.to_string_lossy().into_owned())
            }
            SourceDescriptor::Url { url, .. } => {
                validate::validate_url_scheme(url, &self.config.allowed_url_schemes)?;
                Ok(url.clone())
            }
            other => Err(Error::InvalidInput(format!("no single input argument for {other:?}"))),
        }
    }

    /// Mandatory Probe Invoker plus optional Content Filter Runners, run
    /// concurrently against the same validated input (spec §4.6 step 5). The
    /// two fan out on independent tokens: the filters' token is a child of
    /// `cancel` so a probe failure cancels the filters immediately instead of
    /// waiting for them to run to completion past an outcome that's already
    /// decided (spec §4.6 step 7: cancel remaining tasks on first mandatory
    /// failure).
    async fn execute_probe_job(
        &self,
        job_id: JobId,
        job: &Job,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult> {
        let input_arg = self.input_arg(&job.source)?;
        let filters = job.options.filters.clone();
        let filters_cancel = cancel.child_token();

        let probe_fut = probe::probe(&job.source, &job.options.probe, &self.config, cancel);
        let filters_fut = content::run_filters(&input_arg, &filters, &self.config, &filters_cancel);
        tokio::pin!(probe_fut);
        tokio::pin!(filters_fut);

        let mut probe_outcome = None;
        let mut filters_outcome = None;
        while probe_outcome.is_none() || filters_outcome.is_none() {
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(Error::Cancelled(format!("job {job_id} cancelled during fan-out")));
                }
                result = &mut probe_fut, if probe_outcome.is_none() => {
                    if result.is_err() {
                        filters_cancel.cancel();
                    }
                    probe_outcome = Some(result);
                }
                result = &mut filters_fut, if filters_outcome.is_none() => {
                    filters_outcome = Some(result);
                }
            }
        }
        let outcome = probe_outcome.unwrap()?;
        let (mut content_analysis, filter_warnings) = filters_outcome.unwrap();
        progress::publish_progress(&self.bus, job_id, 0.6).await;

        if filters.contains(&FilterKind::Hdr) {
            let video_stream =
                outcome.raw.streams.iter().find(|s| s.codec_type.as_deref() == Some("video"));
            content_analysis.hdr = video_stream.and_then(content::hdr::classify);
        }
        progress::publish_progress(&self.bus, job_id, 0.9).await;

        let mut warnings = outcome.warnings;
        warnings.extend(filter_warnings);

        Ok(AnalysisResult {
            job_id,
            raw_probe: outcome.raw_json,
            enhanced_analysis: crate::analyzer::analyze(&outcome.raw),
            content_analysis: if filters.is_empty() { None } else { Some(content_analysis) },
            content_hash: fingerprint::compute(&job.source, &job.options).await,
            processing_duration_ms: 0,
            tool_versions: ToolVersions { ffprobe: None, ffmpeg: None },
            warnings,
        })
    }

    /// HLS Analyzer (spec §4.5): the manifest fetch/classify/segment-probe
    /// pipeline stands in for the Probe Invoker for this job kind. The
    /// manifest's shape is folded into `raw_probe` as a hand-built summary
    /// object, since [`hls::AnalyzeOutcome`] carries non-serializable
    /// per-segment [`Result`]s that don't map onto a raw ffprobe blob.
    async fn execute_hls_job(
        &self,
        job_id: JobId,
        url: &str,
        max_segments: u32,
        analyze_segments: bool,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult> {
        let rules = hls::default_rules();
        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled(format!("job {job_id} cancelled during manifest fetch"))),
            result = hls::analyze_manifest(
                &self.http_client,
                url,
                max_segments,
                analyze_segments,
                &rules,
                &self.config,
                cancel,
            ) => result?,
        };
        progress::publish_progress(&self.bus, job_id, 0.8).await;

        let segments: Vec<serde_json::Value> = outcome
            .segment_reports
            .iter()
            .map(|report| match &report.probe {
                Ok(probe) => serde_json::json!({ "url": report.url, "ok": true, "warnings": probe.warnings }),
                Err(e) => serde_json::json!({ "url": report.url, "ok": false, "error": e.to_string() }),
            })
            .collect();
        let failed_segments = outcome.segment_reports.iter().filter(|r| r.probe.is_err()).count();

        let raw_probe = serde_json::json!({
            "hls": {
                "kind": match outcome.kind {
                    hls::ManifestKind::Master => "master",
                    hls::ManifestKind::Media => "media",
                },
                "variants": outcome.variants,
                "segments": segments,
                "failedSegments": failed_segments,
                "compliance": outcome.compliance,
            }
        });

        let warnings = outcome
            .compliance
            .iter()
            .map(|v| crate::domain::Warning { source: format!("hls:{}", v.rule), message: v.detail.clone() })
            .collect();

        Ok(AnalysisResult {
            job_id,
            raw_probe,
            enhanced_analysis: Default::default(),
            content_analysis: None,
            content_hash: None,
            processing_duration_ms: 0,
            tool_versions: ToolVersions { ffprobe: None, ffmpeg: None },
            warnings,
        })
    }

    /// Quality Comparator (spec §4.4). The two referenced jobs must already
    /// be completed, local-file analyses — the deployment's ffmpeg filter
    /// graphs need a seekable, decodable input, not an arbitrary streaming
    /// source (this repo's resolution of an otherwise-unspecified point in
    /// spec §4.4).
    async fn execute_comparison_job(
        &self,
        job_id: JobId,
        reference_job_id: JobId,
        distorted_job_id: JobId,
        metrics: &[quality::MetricKind],
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult> {
        let reference = self.resolve_local_source(reference_job_id).await?;
        let distorted = self.resolve_local_source(distorted_job_id).await?;
        progress::publish_progress(&self.bus, job_id, 0.1).await;

        let (outcomes, summary) = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled(format!("job {job_id} cancelled during comparison"))),
            result = quality::compare(&reference, &distorted, metrics, job_id, &self.config, cancel) => result,
        };
        progress::publish_progress(&self.bus, job_id, 0.9).await;

        let mut warnings = Vec::new();
        for outcome in &outcomes {
            match outcome {
                Ok(quality::MetricOutcome::Computed(record)) => {
                    self.store.insert_quality_metric(record.clone()).await?;
                }
                Ok(quality::MetricOutcome::Unsupported { metric, reason }) => {
                    warnings.push(crate::domain::Warning {
                        source: format!("quality:{metric:?}"),
                        message: reason.clone(),
                    });
                }
                Err(e) => {
                    warnings.push(crate::domain::Warning {
                        source: "quality".to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        Ok(AnalysisResult {
            job_id,
            raw_probe: serde_json::to_value(&summary).unwrap_or(serde_json::Value::Null),
            enhanced_analysis: Default::default(),
            content_analysis: None,
            content_hash: None,
            processing_duration_ms: 0,
            tool_versions: ToolVersions { ffprobe: None, ffmpeg: None },
            warnings,
        })
    }

    async fn resolve_local_source(&self, job_id: JobId) -> Result<std::path::PathBuf> {
        let job = self.store.get_job(job_id).await?;
        match job.source {
            SourceDescriptor::LocalPath { path } => Ok(path),
            other => Err(Error::InvalidInput(format!(
                "comparison source job {job_id} is not a local file ({other:?})"
            ))),
        }
    }
}
