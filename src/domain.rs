//! Core data model (spec §3). Field naming follows the teacher's
//! `#[serde(rename_all = "camelCase")]` convention throughout.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{BatchId, JobId, ReportId, TenantId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Single,
    BatchItem,
    Comparison,
    Hls,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled)
    }

    /// Legal forward edges of the job state machine (spec §4.6).
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Cancelled)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Cancelled)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceDescriptor {
    LocalPath {
        path: PathBuf,
    },
    Url {
        url: String,
        timeout_ms: Option<u64>,
    },
    HlsManifest {
        url: String,
        max_segments: u32,
        analyze_segments: bool,
        validate_compliance: bool,
    },
    Comparison {
        reference_job_id: JobId,
        distorted_job_id: JobId,
        metrics: Vec<crate::quality::MetricKind>,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeOptions {
    pub show_format: bool,
    pub show_streams: bool,
    pub show_frames: bool,
    pub show_packets: bool,
    pub show_chapters: bool,
    pub show_programs: bool,
    pub show_error: bool,
    pub select_streams: Option<String>,
    pub probesize: Option<u64>,
    pub analyzeduration: Option<u64>,
    pub user_agent: Option<String>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisOptions {
    pub probe: ProbeOptions,
    pub filters: Vec<crate::content::FilterKind>,
    pub quality_metrics: Vec<crate::quality::MetricKind>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub source: SourceDescriptor,
    pub options: AnalysisOptions,
    pub user_id: Option<UserId>,
    pub tenant_id: Option<TenantId>,
    pub submit_time: DateTime<Utc>,
    pub status: JobStatus,
    pub error: Option<JobError>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Combined content+option fingerprint, when computable (spec §4.6
    /// idempotence); `None` for streaming sources that can't be hashed.
    pub fingerprint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobError {
    pub kind: String,
    pub detail: String,
}

impl Job {
    pub fn new(kind: JobKind, source: SourceDescriptor, options: AnalysisOptions) -> Self {
        Self {
            id: JobId::new(),
            kind,
            source,
            options,
            user_id: None,
            tenant_id: None,
            submit_time: Utc::now(),
            status: JobStatus::Pending,
            error: None,
            start_time: None,
            end_time: None,
            fingerprint: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolVersions {
    pub ffprobe: Option<String>,
    pub ffmpeg: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub job_id: JobId,
    pub raw_probe: serde_json::Value,
    pub enhanced_analysis: crate::analyzer::EnhancedAnalysis,
    pub content_analysis: Option<crate::content::ContentAnalysis>,
    pub content_hash: Option<String>,
    pub processing_duration_ms: u64,
    pub tool_versions: ToolVersions,
    pub warnings: Vec<Warning>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Warning {
    pub source: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rating {
    Excellent,
    Good,
    Fair,
    Poor,
    Bad,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PercentileTable {
    pub p1: f64,
    pub p5: f64,
    pub p10: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

impl PercentileTable {
    pub fn is_monotonic(&self) -> bool {
        let v = [
            self.p1, self.p5, self.p10, self.p25, self.p50, self.p75, self.p90, self.p95,
            self.p99,
        ];
        v.windows(2).all(|w| w[0] <= w[1])
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityMetricRecord {
    pub parent_job_id: JobId,
    pub metric: crate::quality::MetricKind,
    pub overall: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub stddev: f64,
    pub percentiles: PercentileTable,
    pub per_frame_samples: Option<Vec<f64>>,
    pub configuration: serde_json::Value,
    pub rating: Rating,
}

impl QualityMetricRecord {
    pub fn invariants_hold(&self) -> bool {
        self.min <= self.mean && self.mean <= self.max && self.percentiles.is_monotonic()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Pending,
    Ready,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: ReportId,
    pub source_job_id: JobId,
    pub format: String,
    pub status: ReportStatus,
    pub artifact_locator: Option<String>,
    pub expiry: Option<DateTime<Utc>>,
    pub download_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Pending,
    Processing,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchCounters {
    pub total: u64,
    pub pending: u64,
    pub in_progress: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
}

impl BatchCounters {
    pub fn invariant_holds(&self) -> bool {
        self.total == self.pending + self.in_progress + self.completed + self.failed + self.cancelled
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItem {
    pub source: SourceDescriptor,
    pub job_id: Option<JobId>,
    pub status: JobStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    pub id: BatchId,
    pub items: Vec<BatchItem>,
    pub counters: BatchCounters,
    pub status: BatchStatus,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressEventKind {
    Started,
    Progress,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub job_id: JobId,
    pub sequence: u64,
    pub kind: ProgressEventKind,
    pub progress: Option<f64>,
    pub snapshot: Option<JobSnapshot>,
    pub wall_time: DateTime<Utc>,
}

/// Terminal/current-state snapshot, used both as a terminal event payload
/// and as the synthetic event a late subscriber receives (spec §4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub status: JobStatus,
    pub result: Option<AnalysisResult>,
    pub error: Option<JobError>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_status_terminal_transitions_are_sticky() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Processing));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Processing));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Cancelled));
    }

    #[test]
    fn batch_counters_invariant() {
        let c = BatchCounters { total: 10, pending: 0, in_progress: 0, completed: 8, failed: 2, cancelled: 0 };
        assert!(c.invariant_holds());
        let bad = BatchCounters { total: 10, ..c };
        assert!(bad.invariant_holds());
        let broken = BatchCounters { total: 11, ..c };
        assert!(!broken.invariant_holds());
    }

    #[test]
    fn percentile_table_monotonic_check() {
        let ok = PercentileTable { p1: 1.0, p5: 2.0, p10: 3.0, p25: 4.0, p50: 5.0, p75: 6.0, p90: 7.0, p95: 8.0, p99: 9.0 };
        assert!(ok.is_monotonic());
        let bad = PercentileTable { p50: 1.0, ..ok };
        assert!(!bad.is_monotonic());
    }
}
