//! VMAF computation (spec §4.4), adapted from the teacher's single-purpose
//! `engine/vmaf.rs`: same ffmpeg invocation shape, generalized to read the
//! structured JSON log libvmaf writes rather than scraping a summary line
//! from stderr.

use std::path::Path;

use serde_json::Value;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::domain::QualityMetricRecord;
use crate::error::{Error, Result};
use crate::ids::JobId;
use crate::process_ext::{self, DEFAULT_KILL_GRACE};

use super::stats;
use super::types::{MetricKind, MetricOutcome};

fn build_filter(log_path: &Path, config: &Config) -> String {
    let (w, h) = config.quality_canonical_resolution;
    let model_opt = config
        .vmaf_model_dir
        .as_ref()
        .map(|dir| format!(":model=path={}", dir.display()))
        .unwrap_or_default();
    format!(
        "[0:v]setpts=PTS-STARTPTS,scale={w}:{h}:flags=bicubic,format=yuv420p[ref];\
         [1:v]setpts=PTS-STARTPTS,scale={w}:{h}:flags=bicubic,format=yuv420p[dist];\
         [dist][ref]libvmaf=log_fmt=json:log_path={path}{model_opt}",
        path = log_path.display(),
    )
}

/// Reads `pooled_metrics.vmaf`, falling back to the older `aggregate_metrics`
/// key name (spec §4.4).
fn pooled_vmaf(log: &Value) -> Option<&Value> {
    log.get("pooled_metrics")
        .and_then(|p| p.get("vmaf"))
        .or_else(|| log.get("aggregate_metrics").and_then(|p| p.get("vmaf")))
}

fn per_frame_samples(log: &Value) -> Vec<f64> {
    log.get("frames")
        .and_then(Value::as_array)
        .map(|frames| {
            frames
                .iter()
                .filter_map(|f| f.get("metrics").and_then(|m| m.get("vmaf")).and_then(Value::as_f64))
                .collect()
        })
        .unwrap_or_default()
}

pub async fn compute(
    reference: &Path,
    distorted: &Path,
    job_id: JobId,
    config: &Config,
    cancel: &CancellationToken,
) -> Result<MetricOutcome> {
    let log_file = tempfile::Builder::new()
        .suffix(".json")
        .tempfile()
        .map_err(Error::internal)?;
    let log_path = log_file.path().to_path_buf();
    let filter = build_filter(&log_path, config);

    let mut cmd = Command::new(&config.ffmpeg_path);
    cmd.arg("-hide_banner")
        .arg("-nostdin")
        .arg("-i")
        .arg(reference)
        .arg("-i")
        .arg(distorted)
        .arg("-an")
        .arg("-sn")
        .arg("-lavfi")
        .arg(&filter)
        .arg("-f")
        .arg("null")
        .arg("-");

    let output = process_ext::run_cancellable(
        cmd,
        config.default_comparator_timeout,
        16 * 1024 * 1024,
        DEFAULT_KILL_GRACE,
        cancel,
        &config.process_slots,
    )
    .await
    .map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::ToolMissing(format!("ffmpeg not executable at {}", config.ffmpeg_path.display()))
        } else {
            Error::ToolFailure(e.to_string())
        }
    })?;

    if output.cancelled {
        return Err(Error::Cancelled("VMAF computation cancelled".to_string()));
    }
    if output.timed_out {
        return Err(Error::Timeout("ffmpeg timed out computing VMAF".to_string()));
    }
    if !output.status.map(|s| s.success()).unwrap_or(false) {
        let tail = String::from_utf8_lossy(&output.stderr);
        return Err(Error::ToolFailure(format!(
            "ffmpeg exited non-zero computing VMAF: {}",
            tail.lines().rev().take(12).collect::<Vec<_>>().join("\n")
        )));
    }

    let log_bytes = tokio::fs::read(&log_path).await.map_err(Error::internal)?;
    let log: Value = serde_json::from_slice(&log_bytes).map_err(|e| Error::ParseFailure(e.to_string()))?;

    let pooled = pooled_vmaf(&log)
        .ok_or_else(|| Error::ParseFailure("vmaf log missing pooled_metrics.vmaf".to_string()))?;
    let mean = pooled.get("mean").and_then(Value::as_f64).unwrap_or(0.0);

    let samples = per_frame_samples(&log);
    let stat = stats::summarize(&samples);
    let min = pooled.get("min").and_then(Value::as_f64).unwrap_or(stat.min);
    let max = pooled.get("max").and_then(Value::as_f64).unwrap_or(stat.max);
    let stddev = stat.stddev;
    let percentiles = stats::percentile_table(&samples);
    let rating = stats::rate(mean, config.threshold_table.vmaf);

    Ok(MetricOutcome::Computed(QualityMetricRecord {
        parent_job_id: job_id,
        metric: MetricKind::Vmaf,
        overall: mean,
        min,
        max,
        mean,
        stddev,
        percentiles,
        per_frame_samples: if samples.is_empty() { None } else { Some(samples) },
        configuration: serde_json::json!({ "filter": filter }),
        rating,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pooled_metrics_preferred_over_aggregate_metrics() {
        let log = serde_json::json!({
            "pooled_metrics": {"vmaf": {"mean": 94.6, "min": 80.0, "max": 99.0}},
            "aggregate_metrics": {"vmaf": {"mean": 10.0}},
        });
        let pooled = pooled_vmaf(&log).expect("found");
        assert_eq!(pooled.get("mean").and_then(Value::as_f64), Some(94.6));
    }

    #[test]
    fn falls_back_to_aggregate_metrics_when_pooled_absent() {
        let log = serde_json::json!({
            "aggregate_metrics": {"vmaf": {"mean": 88.0}},
        });
        let pooled = pooled_vmaf(&log).expect("found");
        assert_eq!(pooled.get("mean").and_then(Value::as_f64), Some(88.0));
    }

    #[test]
    fn extracts_per_frame_samples() {
        let log = serde_json::json!({
            "frames": [
                {"frameNum": 0, "metrics": {"vmaf": 90.0}},
                {"frameNum": 1, "metrics": {"vmaf": 95.0}},
            ],
        });
        assert_eq!(per_frame_samples(&log), vec![90.0, 95.0]);
    }
}
