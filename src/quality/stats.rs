//! Shared per-frame sample reduction (spec §4.4): every metric — VMAF,
//! PSNR, SSIM and friends — collapses to the same mean/min/max/stddev plus
//! percentile table over its per-frame samples.

use crate::config::RatingThresholds;
use crate::domain::{PercentileTable, Rating};

pub struct SummaryStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub stddev: f64,
}

pub fn summarize(samples: &[f64]) -> SummaryStats {
    if samples.is_empty() {
        return SummaryStats { min: 0.0, max: 0.0, mean: 0.0, stddev: 0.0 };
    }
    let min = samples.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = samples.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let mean = samples.iter().sum::<f64>() / samples.len() as f64;
    let variance =
        samples.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / samples.len() as f64;
    SummaryStats { min, max, mean, stddev: variance.sqrt() }
}

fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = q * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
    }
}

pub fn percentile_table(samples: &[f64]) -> PercentileTable {
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    PercentileTable {
        p1: percentile(&sorted, 0.01),
        p5: percentile(&sorted, 0.05),
        p10: percentile(&sorted, 0.10),
        p25: percentile(&sorted, 0.25),
        p50: percentile(&sorted, 0.50),
        p75: percentile(&sorted, 0.75),
        p90: percentile(&sorted, 0.90),
        p95: percentile(&sorted, 0.95),
        p99: percentile(&sorted, 0.99),
    }
}

pub fn rate(value: f64, thresholds: RatingThresholds) -> Rating {
    if value >= thresholds.excellent {
        Rating::Excellent
    } else if value >= thresholds.good {
        Rating::Good
    } else if value >= thresholds.fair {
        Rating::Fair
    } else if value >= thresholds.poor {
        Rating::Poor
    } else {
        Rating::Bad
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summarize_computes_min_max_mean_stddev() {
        let s = summarize(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_eq!(s.min, 2.0);
        assert_eq!(s.max, 9.0);
        assert_eq!(s.mean, 5.0);
        assert!((s.stddev - 2.0).abs() < 1e-9);
    }

    #[test]
    fn percentile_table_is_monotonic_for_sorted_input() {
        let samples: Vec<f64> = (1..=100).map(|v| v as f64).collect();
        let table = percentile_table(&samples);
        assert!(table.is_monotonic());
        assert!((table.p50 - 50.5).abs() < 1.0);
    }

    #[test]
    fn rate_maps_value_through_thresholds() {
        let thresholds = RatingThresholds { excellent: 95.0, good: 85.0, fair: 75.0, poor: 60.0 };
        assert_eq!(rate(96.0, thresholds), Rating::Excellent);
        assert_eq!(rate(90.0, thresholds), Rating::Good);
        assert_eq!(rate(80.0, thresholds), Rating::Fair);
        assert_eq!(rate(65.0, thresholds), Rating::Poor);
        assert_eq!(rate(10.0, thresholds), Rating::Bad);
    }
}
