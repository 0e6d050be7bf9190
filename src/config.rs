//! Service configuration (spec §6). Every field mirrors an environment
//! variable of the same uppercase-snake-case name; defaults match the spec.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

#[derive(Debug, Clone)]
pub struct Config {
    pub ffprobe_path: PathBuf,
    pub ffmpeg_path: PathBuf,
    pub vmaf_model_dir: Option<PathBuf>,

    pub max_input_size: u64,

    /// Target resolution quality comparisons scale both inputs to before
    /// running a filter, unless they already match exactly (spec §4.4).
    pub quality_canonical_resolution: (u32, u32),

    pub default_probe_timeout: Duration,
    pub default_comparator_timeout: Duration,
    pub live_stream_timeout: Duration,

    pub max_parallel_runners: usize,
    pub max_parallel_metrics: usize,
    pub max_parallel_batch_items: usize,
    pub max_global_processes: usize,
    /// Process-wide slot pool sized by `max_global_processes`; cloning a
    /// `Config` shares the same pool rather than handing out a fresh one
    /// (spec §5: one ceiling on concurrently-running `ffprobe`/`ffmpeg`
    /// children across the whole service, not per job or per metric).
    pub process_slots: Arc<Semaphore>,

    pub dedup_ttl: Duration,

    pub enable_frame_level: bool,

    pub allowed_path_roots: Vec<PathBuf>,
    pub allowed_url_schemes: Vec<String>,

    pub threshold_table: ThresholdTable,
}

/// Per-metric rating thresholds (spec §4.4), ordered
/// excellent/good/fair/poor boundaries; anything below `poor` is `bad`.
#[derive(Debug, Clone, Copy)]
pub struct RatingThresholds {
    pub excellent: f64,
    pub good: f64,
    pub fair: f64,
    pub poor: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct ThresholdTable {
    pub vmaf: RatingThresholds,
    pub psnr: RatingThresholds,
    pub ssim: RatingThresholds,
    pub overall: RatingThresholds,
}

impl Default for ThresholdTable {
    fn default() -> Self {
        Self {
            vmaf: RatingThresholds { excellent: 95.0, good: 85.0, fair: 75.0, poor: 60.0 },
            psnr: RatingThresholds { excellent: 40.0, good: 35.0, fair: 30.0, poor: 25.0 },
            ssim: RatingThresholds { excellent: 0.95, good: 0.90, fair: 0.85, poor: 0.80 },
            overall: RatingThresholds { excellent: 90.0, good: 80.0, fair: 70.0, poor: 50.0 },
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_u64(key: &str, default: u64) -> u64 {
    env_string(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    env_string(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    env_string(key)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        let max_global_processes = env_usize("MAX_GLOBAL_PROCESSES", 32);
        Self {
            ffprobe_path: env_string("FFPROBE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("ffprobe")),
            ffmpeg_path: env_string("FFMPEG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("ffmpeg")),
            vmaf_model_dir: env_string("VMAF_MODEL_DIR").map(PathBuf::from),

            max_input_size: env_u64("MAX_INPUT_SIZE", 64 * 1024 * 1024),

            quality_canonical_resolution: (
                env_u64("QUALITY_CANONICAL_WIDTH", 1920) as u32,
                env_u64("QUALITY_CANONICAL_HEIGHT", 1080) as u32,
            ),

            default_probe_timeout: Duration::from_millis(env_u64(
                "DEFAULT_PROBE_TIMEOUT_MS",
                30 * 60 * 1000,
            )),
            default_comparator_timeout: Duration::from_millis(env_u64(
                "DEFAULT_COMPARATOR_TIMEOUT_MS",
                60 * 60 * 1000,
            )),
            live_stream_timeout: Duration::from_millis(env_u64(
                "LIVE_STREAM_TIMEOUT_MS",
                30 * 1000,
            )),

            max_parallel_runners: env_usize("MAX_PARALLEL_RUNNERS", 8),
            max_parallel_metrics: env_usize("MAX_PARALLEL_METRICS", 3),
            max_parallel_batch_items: env_usize("MAX_PARALLEL_BATCH_ITEMS", 5),
            max_global_processes,
            process_slots: Arc::new(Semaphore::new(max_global_processes.max(1))),

            dedup_ttl: Duration::from_millis(env_u64("DEDUP_TTL_MS", 24 * 60 * 60 * 1000)),

            enable_frame_level: env_bool("ENABLE_FRAME_LEVEL", false),

            allowed_path_roots: env_string("ALLOWED_PATH_ROOTS")
                .map(|v| v.split(':').map(PathBuf::from).collect())
                .unwrap_or_else(|| vec![PathBuf::from("/data")]),
            allowed_url_schemes: env_string("ALLOWED_URL_SCHEMES")
                .map(|v| v.split(',').map(str::to_string).collect())
                .unwrap_or_else(|| {
                    vec!["http".into(), "https".into(), "rtmp".into(), "rtsp".into()]
                }),

            threshold_table: ThresholdTable::default(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_thresholds_match_spec() {
        let t = ThresholdTable::default();
        assert_eq!(t.vmaf.excellent, 95.0);
        assert_eq!(t.psnr.poor, 25.0);
        assert_eq!(t.ssim.good, 0.90);
        assert_eq!(t.overall.fair, 70.0);
    }
}
