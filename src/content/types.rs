//! Content Filter Runner catalog and the aggregate result record (spec §4.2).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    BlackFrame,
    FreezeFrame,
    AudioClipping,
    Blockiness,
    Blurriness,
    Interlacing,
    Noise,
    Loudness,
    Hdr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlackFrameResult {
    pub event_count: u32,
    pub union_duration_seconds: f64,
    pub threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FreezeFrameResult {
    pub event_count: u32,
    pub union_duration_seconds: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioClippingResult {
    pub peak_level_dbfs: f64,
    pub clipping_detected: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockinessResult {
    pub average_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlurrinessResult {
    pub average_yavg: f64,
    pub is_blurry: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterlacingResult {
    pub progressive_frames: u64,
    pub interlaced_frames: u64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoiseResult {
    pub average_ydif: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoudnessResult {
    pub integrated_lufs: f64,
    pub loudness_range_lu: f64,
    pub true_peak_dbtp: f64,
    pub compliant: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HdrResult {
    pub is_hdr: bool,
    pub color_transfer: Option<String>,
    pub color_primaries: Option<String>,
    pub color_space: Option<String>,
    pub master_display: Option<String>,
    pub max_cll: Option<f64>,
    pub max_fall: Option<f64>,
}

/// Composite of filter-runner outputs (spec's redesign note: distinct from
/// the structural probe output; every field optional since each runner is
/// independent and failures degrade to a missing field, never a job
/// failure).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentAnalysis {
    pub black_frame: Option<BlackFrameResult>,
    pub freeze_frame: Option<FreezeFrameResult>,
    pub audio_clipping: Option<AudioClippingResult>,
    pub blockiness: Option<BlockinessResult>,
    pub blurriness: Option<BlurrinessResult>,
    pub interlacing: Option<InterlacingResult>,
    pub noise: Option<NoiseResult>,
    pub loudness: Option<LoudnessResult>,
    pub hdr: Option<HdrResult>,
    /// Filter kinds that did not complete within the fan-in deadline.
    pub timed_out: Vec<FilterKind>,
}
