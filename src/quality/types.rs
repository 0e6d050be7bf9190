//! Quality Comparator types (spec §4.4).

use serde::{Deserialize, Serialize};

use crate::domain::{QualityMetricRecord, Rating};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Vmaf,
    Psnr,
    Ssim,
    MsSsim,
    Mse,
    Lpips,
}

impl MetricKind {
    /// Weight in the overall-rating blend (spec §4.4: "VMAF weight 1.0,
    /// SSIM 0.8, PSNR 0.6"). Metrics not named by the spec's weighting rule
    /// don't contribute to the overall rating.
    pub fn overall_weight(self) -> f64 {
        match self {
            MetricKind::Vmaf => 1.0,
            MetricKind::Ssim => 0.8,
            MetricKind::Psnr => 0.6,
            MetricKind::MsSsim | MetricKind::Mse | MetricKind::Lpips => 0.0,
        }
    }
}

/// A metric either produced a record or was declined because the tool/model
/// it needs isn't available — never a placeholder value (spec's Open
/// Question resolution for MS-SSIM/MSE/LPIPS).
#[derive(Debug, Clone)]
pub enum MetricOutcome {
    Computed(QualityMetricRecord),
    Unsupported { metric: MetricKind, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonSummary {
    pub overall_rating: Rating,
    pub recommendations: Vec<String>,
}
