//! PSNR and SSIM (spec §4.4): per-frame stderr scraping, same filter-graph
//! shape as [`super::vmaf`] but without a JSON log — ffmpeg reports these
//! inline per frame.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, RatingThresholds};
use crate::domain::QualityMetricRecord;
use crate::error::{Error, Result};
use crate::ids::JobId;
use crate::process_ext::{self, DEFAULT_KILL_GRACE};

use super::stats;
use super::types::{MetricKind, MetricOutcome};

static PSNR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:psnr_avg|average):(?P<v>[0-9.]+)").unwrap());
static SSIM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"All:(?P<v>[0-9.]+)").unwrap());

fn scale_filter(config: &Config) -> String {
    let (w, h) = config.quality_canonical_resolution;
    format!("scale={w}:{h}:flags=bicubic,format=yuv420p")
}

async fn run_filter(
    reference: &Path,
    distorted: &Path,
    filter_name: &str,
    filter_opts: &str,
    config: &Config,
    cancel: &CancellationToken,
) -> Result<String> {
    let scale = scale_filter(config);
    let filter = format!(
        "[0:v]setpts=PTS-STARTPTS,{scale}[ref];\
         [1:v]setpts=PTS-STARTPTS,{scale}[dist];\
         [dist][ref]{filter_name}={filter_opts}",
    );

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
        return Err(Error::Cancelled(format!("{filter_name} computation cancelled")));
    }
    if output.timed_out {
        return Err(Error::Timeout(format!("ffmpeg timed out computing {filter_name}")));
    }
    if !output.status.map(|s| s.success()).unwrap_or(false) {
        return Err(Error::ToolFailure(format!(
            "ffmpeg exited non-zero computing {filter_name}: {}",
            String::from_utf8_lossy(&output.stderr)
        )));
    }

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push('\n');
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    Ok(combined)
}

fn extract_samples(text: &str, re: &Regex) -> Vec<f64> {
    text.lines()
        .filter_map(|line| re.captures(line))
        .filter_map(|c| c["v"].parse::<f64>().ok())
        .collect()
}

fn build_record(
    metric: MetricKind,
    job_id: JobId,
    samples: Vec<f64>,
    thresholds: RatingThresholds,
    configuration: serde_json::Value,
) -> Result<MetricOutcome> {
    if samples.is_empty() {
        return Err(Error::ParseFailure(format!("no per-frame samples found for {metric:?}")));
    }
    let stat = stats::summarize(&samples);
    let percentiles = stats::percentile_table(&samples);
    let rating = stats::rate(stat.mean, thresholds);
    Ok(MetricOutcome::Computed(QualityMetricRecord {
        parent_job_id: job_id,
        metric,
        overall: stat.mean,
        min: stat.min,
        max: stat.max,
        mean: stat.mean,
        stddev: stat.stddev,
        percentiles,
        per_frame_samples: Some(samples),
        configuration,
        rating,
    }))
}

pub async fn compute_psnr(
    reference: &Path,
    distorted: &Path,
    job_id: JobId,
    config: &Config,
    cancel: &CancellationToken,
) -> Result<MetricOutcome> {
    let text = run_filter(reference, distorted, "psnr", "stats_file=-", config, cancel).await?;
    let samples = extract_samples(&text, &PSNR_RE);
    build_record(
        MetricKind::Psnr,
        job_id,
        samples,
        config.threshold_table.psnr,
        serde_json::json!({ "filter": "psnr" }),
    )
}

pub async fn compute_ssim(
    reference: &Path,
    distorted: &Path,
    job_id: JobId,
    config: &Config,
    cancel: &CancellationToken,
) -> Result<MetricOutcome> {
    let text = run_filter(reference, distorted, "ssim", "stats_file=-", config, cancel).await?;
    let samples = extract_samples(&text, &SSIM_RE);
    build_record(
        MetricKind::Ssim,
        job_id,
        samples,
        config.threshold_table.ssim,
        serde_json::json!({ "filter": "ssim" }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_psnr_average_values() {
        let text = "n:1 mse_avg:8.49 psnr_avg:38.80\nn:2 mse_avg:7.90 psnr_avg:39.10\n";
        let samples = extract_samples(text, &PSNR_RE);
        assert_eq!(samples, vec![38.80, 39.10]);
    }

    #[test]
    fn extracts_ssim_all_values() {
        let text = "n:1 Y:0.987952 U:0.992000 V:0.994000 All:0.990000 (20.000000)\n\
                     n:2 Y:0.980000 U:0.990000 V:0.991000 All:0.985000 (18.200000)\n";
        let samples = extract_samples(text, &SSIM_RE);
        assert_eq!(samples, vec![0.990000, 0.985000]);
    }

    #[test]
    fn build_record_fails_closed_on_empty_samples() {
        let err = build_record(
            MetricKind::Ssim,
            JobId::new(),
            vec![],
            RatingThresholds { excellent: 0.95, good: 0.90, fair: 0.85, poor: 0.80 },
            serde_json::json!({}),
        )
        .unwrap_err();
        assert_eq!(err.code(), "ParseFailure");
    }
}
