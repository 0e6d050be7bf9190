//! Generic ffmpeg filter-graph runner (spec §4.2), generalized from the
//! teacher's single-purpose VMAF invocation into one runner per filter spec.
//!
//! All enabled runners for a job launch concurrently against the same
//! read-only input, bounded by `config.max_parallel_runners`. Each runner
//! enforces its own deadline; an individual runner's failure is recorded as
//! a timeout or a warning and never fails the job — the aggregate result
//! just carries a partial set.

use std::sync::Arc;
use std::time::Duration;

use tokio::process::Command;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::domain::Warning;
use crate::process_ext::{self, DEFAULT_KILL_GRACE};

use super::parsers;
use super::types::*;

/// Slack added on top of the slowest individual runner deadline before the
/// fan-in gives up on still-outstanding runners (spec §4.2).
const FAN_IN_SLACK: Duration = Duration::from_secs(5);

const BLURRINESS_THRESHOLD: f64 = 50.0;
const BLACKDETECT_THRESHOLD: f64 = 0.10;

struct FilterSpec {
    kind: FilterKind,
    filter_graph: &'static str,
    is_audio: bool,
    timeout: Duration,
}

fn spec_for(kind: FilterKind, config: &Config) -> FilterSpec {
    let timeout = config.default_probe_timeout;
    match kind {
        FilterKind::BlackFrame => FilterSpec {
            kind,
            filter_graph: "blackdetect=d=0.5:pix_th=0.10",
            is_audio: false,
            timeout,
        },
        FilterKind::FreezeFrame => FilterSpec {
            kind,
            filter_graph: "freezedetect=n=0.001:d=2",
            is_audio: false,
            timeout,
        },
        FilterKind::AudioClipping => FilterSpec {
            kind,
            filter_graph: "astats=metadata=1:reset=1",
            is_audio: true,
            timeout,
        },
        FilterKind::Blockiness => {
            FilterSpec { kind, filter_graph: "blockdetect", is_audio: false, timeout }
        }
        FilterKind::Blurriness => FilterSpec {
            kind,
            filter_graph: "edgedetect,signalstats",
            is_audio: false,
            timeout,
        },
        FilterKind::Interlacing => {
            FilterSpec { kind, filter_graph: "idet", is_audio: false, timeout }
        }
        FilterKind::Noise => {
            FilterSpec { kind, filter_graph: "signalstats", is_audio: false, timeout }
        }
        FilterKind::Loudness => {
            FilterSpec { kind, filter_graph: "ebur128=metadata=1", is_audio: true, timeout }
        }
        // HDR is classified from probe metadata, not a filter run; callers
        // never build a spec for it.
        FilterKind::Hdr => unreachable!("HDR is classified without a subprocess"),
    }
}

enum RunnerOutput {
    BlackFrame(BlackFrameResult),
    FreezeFrame(FreezeFrameResult),
    AudioClipping(Option<AudioClippingResult>),
    Blockiness(Option<BlockinessResult>),
    Blurriness(Option<BlurrinessResult>),
    Interlacing(Option<InterlacingResult>),
    Noise(Option<NoiseResult>),
    Loudness(Option<LoudnessResult>),
}

/// Runs one filter's ffmpeg invocation, or reports why it didn't produce a
/// result. Spawn/IO failure is propagated rather than swallowed into a
/// default empty-stderr parse, which would otherwise read as a genuine
/// "nothing detected" measurement (spec §4.2: a runner failure is recorded
/// as a warning, not converted into a false-clean result).
async fn run_one(
    spec: FilterSpec,
    input_arg: String,
    ffmpeg_path: std::path::PathBuf,
    cancel: CancellationToken,
    process_slots: Arc<Semaphore>,
) -> Result<RunnerOutput, String> {
    let flag = if spec.is_audio { "-af" } else { "-vf" };
    let mut cmd = Command::new(&ffmpeg_path);
    cmd.args(["-nostats", "-hide_banner", "-i", &input_arg, flag, spec.filter_graph, "-f", "null", "-"]);

    let output =
        process_ext::run_cancellable(cmd, spec.timeout, 16 * 1024 * 1024, DEFAULT_KILL_GRACE, &cancel, &process_slots)
            .await
            .map_err(|e| e.to_string())?;
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    Ok(match spec.kind {
        FilterKind::BlackFrame => RunnerOutput::BlackFrame(parsers::parse_black_frame(&stderr, BLACKDETECT_THRESHOLD)),
        FilterKind::FreezeFrame => RunnerOutput::FreezeFrame(parsers::parse_freeze_frame(&stderr)),
        FilterKind::AudioClipping => RunnerOutput::AudioClipping(parsers::parse_audio_clipping(&stderr)),
        FilterKind::Blockiness => RunnerOutput::Blockiness(parsers::parse_blockiness(&stderr)),
        FilterKind::Blurriness => {
            RunnerOutput::Blurriness(parsers::parse_blurriness(&stderr, BLURRINESS_THRESHOLD))
        }
        FilterKind::Interlacing => RunnerOutput::Interlacing(parsers::parse_interlacing(&stderr)),
        FilterKind::Noise => RunnerOutput::Noise(parsers::parse_noise(&stderr)),
        FilterKind::Loudness => RunnerOutput::Loudness(parsers::parse_loudness(&stderr)),
        FilterKind::Hdr => unreachable!("HDR is classified without a subprocess"),
    })
}

/// Runs every requested filter concurrently (capped at
/// `config.max_parallel_runners` in flight at once) and fans the results
/// back into a single [`ContentAnalysis`] plus the warnings any individual
/// runner raised, marking any runner that misses the overall deadline as
/// timed out rather than failing the caller.
pub async fn run_filters(
    input_arg: &str,
    kinds: &[FilterKind],
    config: &Config,
    cancel: &CancellationToken,
) -> (ContentAnalysis, Vec<Warning>) {
    let mut analysis = ContentAnalysis::default();
    let requested: Vec<FilterKind> = kinds.iter().copied().filter(|k| *k != FilterKind::Hdr).collect();
    if requested.is_empty() {
        return (analysis, Vec::new());
    }

    let (tx, mut rx) = mpsc::channel::<(FilterKind, Result<RunnerOutput, String>)>(requested.len() + 1);
    let overall_deadline = requested
        .iter()
        .map(|k| spec_for(*k, config).timeout)
        .max()
        .unwrap_or(config.default_probe_timeout)
        + FAN_IN_SLACK;

    let runner_slots = Arc::new(Semaphore::new(config.max_parallel_runners.max(1)));
    let mut pending: std::collections::HashSet<FilterKind> = requested.iter().copied().collect();
    for kind in &requested {
        let spec = spec_for(*kind, config);
        let input_arg = input_arg.to_string();
        let ffmpeg_path = config.ffmpeg_path.clone();
        let tx = tx.clone();
        let kind = *kind;
        let cancel = cancel.clone();
        let runner_slots = runner_slots.clone();
        let process_slots = config.process_slots.clone();
        tokio::spawn(async move {
            let _runner_permit = runner_slots.acquire_owned().await.expect("semaphore not closed");
            let outcome = run_one(spec, input_arg, ffmpeg_path, cancel, process_slots).await;
            let _ = tx.send((kind, outcome)).await;
        });
    }
    drop(tx);

    let mut warnings = Vec::new();
    let fan_in = async {
        while let Some((kind, outcome)) = rx.recv().await {
            pending.remove(&kind);
            match outcome {
                Ok(out) => apply(&mut analysis, kind, out),
                Err(message) => warnings.push(Warning { source: format!("filter:{kind:?}"), message }),
            }
        }
    };

    if tokio::time::timeout(overall_deadline, fan_in).await.is_err() {
        // Deadline hit with runners still outstanding; whatever's left in
        // `pending` never reported back in time.
    }

    analysis.timed_out = pending.into_iter().collect();
    (analysis, warnings)
}

fn apply(analysis: &mut ContentAnalysis, kind: FilterKind, outcome: RunnerOutput) {
    match (kind, outcome) {
        (FilterKind::BlackFrame, RunnerOutput::BlackFrame(r)) => analysis.black_frame = Some(r),
        (FilterKind::FreezeFrame, RunnerOutput::FreezeFrame(r)) => analysis.freeze_frame = Some(r),
        (FilterKind::AudioClipping, RunnerOutput::AudioClipping(r)) => analysis.audio_clipping = r,
        (FilterKind::Blockiness, RunnerOutput::Blockiness(r)) => analysis.blockiness = r,
        (FilterKind::Blurriness, RunnerOutput::Blurriness(r)) => analysis.blurriness = r,
        (FilterKind::Interlacing, RunnerOutput::Interlacing(r)) => analysis.interlacing = r,
        (FilterKind::Noise, RunnerOutput::Noise(r)) => analysis.noise = r,
        (FilterKind::Loudness, RunnerOutput::Loudness(r)) => analysis.loudness = r,
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_filter_list_returns_default_analysis() {
        let config = Config::from_env();
        let (result, warnings) = run_filters("/dev/null", &[], &config, &CancellationToken::new()).await;
        assert!(result.black_frame.is_none());
        assert!(result.timed_out.is_empty());
        assert!(warnings.is_empty());
    }

    #[tokio::test]
    async fn missing_ffmpeg_records_a_warning_instead_of_a_false_clean_result() {
        let mut config = Config::from_env();
        config.ffmpeg_path = std::path::PathBuf::from("/nonexistent/ffmpeg-does-not-exist");
        let (result, warnings) =
            run_filters("/data/clip.mp4", &[FilterKind::BlackFrame], &config, &CancellationToken::new()).await;
        assert!(result.black_frame.is_none());
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].source, "filter:BlackFrame");
    }
}
