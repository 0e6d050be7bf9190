//! Quality Comparator (spec §4.4): fans a requested metric list out to the
//! per-metric implementations, then blends per-metric ratings into a single
//! overall rating plus a deterministic recommendation list.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::domain::Rating;
use crate::error::Result;
use crate::ids::JobId;

use super::types::{ComparisonSummary, MetricKind, MetricOutcome};
use super::{stats, stats_filter, vmaf};

async fn compute_one(
    metric: MetricKind,
    reference: &Path,
    distorted: &Path,
    job_id: JobId,
    config: &Config,
    cancel: &CancellationToken,
) -> Result<MetricOutcome> {
    match metric {
        MetricKind::Vmaf => vmaf::compute(reference, distorted, job_id, config, cancel).await,
        MetricKind::Psnr => stats_filter::compute_psnr(reference, distorted, job_id, config, cancel).await,
        MetricKind::Ssim => stats_filter::compute_ssim(reference, distorted, job_id, config, cancel).await,
        MetricKind::MsSsim | MetricKind::Mse | MetricKind::Lpips => Ok(MetricOutcome::Unsupported {
            metric,
            reason: format!("{metric:?} has no supported ffmpeg filter graph in this deployment"),
        }),
    }
}

/// Runs every requested metric, bounded by `config.max_parallel_metrics`
/// concurrent ffmpeg invocations (spec §4.4).
pub async fn compare(
    reference: &Path,
    distorted: &Path,
    metrics: &[MetricKind],
    job_id: JobId,
    config: &Config,
    cancel: &CancellationToken,
) -> (Vec<Result<MetricOutcome>>, ComparisonSummary) {
    let semaphore = Arc::new(Semaphore::new(config.max_parallel_metrics.max(1)));
    let mut tasks = Vec::with_capacity(metrics.len());

    for metric in metrics.iter().copied() {
        let semaphore = semaphore.clone();
        let reference = reference.to_path_buf();
        let distorted = distorted.to_path_buf();
        let config = config.clone();
        let cancel = cancel.clone();
        tasks.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore not closed");
            compute_one(metric, &reference, &distorted, job_id, &config, &cancel).await
        }));
    }

    let mut outcomes = Vec::with_capacity(tasks.len());
    for task in tasks {
        outcomes.push(task.await.unwrap_or_else(|e| {
            Err(crate::error::Error::internal(anyhow::anyhow!("metric task panicked: {e}")))
        }));
    }

    let summary = summarize(&outcomes, config);
    (outcomes, summary)
}

/// Nominal bucket score used only to blend ratings across metrics; it never
/// leaves this module as a standalone value.
fn rating_bucket_score(rating: Rating) -> f64 {
    match rating {
        Rating::Excellent => 100.0,
        Rating::Good => 85.0,
        Rating::Fair => 70.0,
        Rating::Poor => 55.0,
        Rating::Bad => 30.0,
    }
}

fn recommend(metric: MetricKind, rating: Rating) -> Option<String> {
    use Rating::*;
    match (metric, rating) {
        (MetricKind::Vmaf, Poor | Bad) => {
            Some("VMAF is low: raise bitrate or switch to a higher-quality encode profile".to_string())
        }
        (MetricKind::Psnr, Poor | Bad) => {
            Some("PSNR is low: check for compression artifacts or an undersized bitrate ladder rung".to_string())
        }
        (MetricKind::Ssim, Poor | Bad) => {
            Some("SSIM is low: inspect for structural distortion, e.g. scaling or deinterlacing defects".to_string())
        }
        _ => None,
    }
}

fn summarize(outcomes: &[Result<MetricOutcome>], config: &Config) -> ComparisonSummary {
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    let mut recommendations = Vec::new();

    for outcome in outcomes {
        let Ok(MetricOutcome::Computed(record)) = outcome else { continue };
        let weight = record.metric.overall_weight();
        if weight > 0.0 {
            weighted_sum += rating_bucket_score(record.rating) * weight;
            weight_total += weight;
        }
        if let Some(r) = recommend(record.metric, record.rating) {
            recommendations.push(r);
        }
    }

    let overall_rating = if weight_total > 0.0 {
        stats::rate(weighted_sum / weight_total, config.threshold_table.overall)
    } else {
        Rating::Fair
    };

    // No per-metric complaint and the blend is good or better: say so rather
    // than leaving the caller to infer it from an empty list (spec §8
    // scenario 4).
    if recommendations.is_empty() && matches!(overall_rating, Rating::Excellent | Rating::Good) {
        recommendations.push("Quality is within target range: no change needed".to_string());
    }

    ComparisonSummary { overall_rating, recommendations }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PercentileTable, QualityMetricRecord};

    fn record(metric: MetricKind, rating: Rating) -> QualityMetricRecord {
        QualityMetricRecord {
            parent_job_id: JobId::new(),
            metric,
            overall: 0.0,
            min: 0.0,
            max: 0.0,
            mean: 0.0,
            stddev: 0.0,
            percentiles: PercentileTable {
                p1: 0.0, p5: 0.0, p10: 0.0, p25: 0.0, p50: 0.0, p75: 0.0, p90: 0.0, p95: 0.0, p99: 0.0,
            },
            per_frame_samples: None,
            configuration: serde_json::json!({}),
            rating,
        }
    }

    #[test]
    fn unsupported_metrics_never_reach_the_blend() {
        let config = Config::from_env();
        let outcomes = vec![
            Ok(MetricOutcome::Computed(record(MetricKind::Vmaf, Rating::Excellent))),
            Ok(MetricOutcome::Unsupported { metric: MetricKind::MsSsim, reason: "n/a".to_string() }),
        ];
        let summary = summarize(&outcomes, &config);
        assert_eq!(summary.overall_rating, Rating::Excellent);
    }

    #[test]
    fn poor_vmaf_triggers_a_recommendation() {
        let config = Config::from_env();
        let outcomes = vec![Ok(MetricOutcome::Computed(record(MetricKind::Vmaf, Rating::Poor)))];
        let summary = summarize(&outcomes, &config);
        assert_eq!(summary.recommendations.len(), 1);
        assert_eq!(summary.overall_rating, Rating::Bad);
    }

    #[test]
    fn excellent_vmaf_yields_a_no_change_recommendation() {
        let config = Config::from_env();
        let outcomes = vec![Ok(MetricOutcome::Computed(record(MetricKind::Vmaf, Rating::Excellent)))];
        let summary = summarize(&outcomes, &config);
        assert_eq!(summary.overall_rating, Rating::Excellent);
        assert_eq!(summary.recommendations, vec!["Quality is within target range: no change needed".to_string()]);
    }

    #[test]
    fn empty_outcomes_default_to_fair() {
        let config = Config::from_env();
        let summary = summarize(&[], &config);
        assert_eq!(summary.overall_rating, Rating::Fair);
    }
}
