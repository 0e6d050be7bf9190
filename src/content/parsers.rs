//! Line-oriented parsers for each filter's textual output, each unit-tested
//! against a canned sample (spec §9 redesign note: "replace ad-hoc substring
//! search with explicit line-oriented parsers with named capture groups").

use once_cell::sync::Lazy;
use regex::Regex;

use super::types::*;

static BLACK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"black_start:(?P<start>[0-9.]+)\s+black_end:(?P<end>[0-9.]+)\s+black_duration:(?P<dur>[0-9.]+)").unwrap()
});

pub fn parse_black_frame(stderr: &str, threshold: f64) -> BlackFrameResult {
    let mut event_count = 0u32;
    let mut union_duration = 0.0;
    for line in stderr.lines() {
        if let Some(caps) = BLACK_RE.captures(line) {
            if let Ok(dur) = caps["dur"].parse::<f64>() {
                union_duration += dur;
                event_count += 1;
            }
        }
    }
    BlackFrameResult { event_count, union_duration_seconds: union_duration, threshold }
}

static FREEZE_START_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"lavfi\.freezedetect\.freeze_start").unwrap());
static FREEZE_DURATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"freeze_duration:\s*(?P<dur>[0-9.]+)").unwrap());

pub fn parse_freeze_frame(stderr: &str) -> FreezeFrameResult {
    let mut event_count = 0u32;
    let mut union_duration = 0.0;
    for line in stderr.lines() {
        if FREEZE_START_RE.is_match(line) {
            event_count += 1;
        }
        if let Some(caps) = FREEZE_DURATION_RE.captures(line) {
            if let Ok(dur) = caps["dur"].parse::<f64>() {
                union_duration += dur;
            }
        }
    }
    FreezeFrameResult { event_count, union_duration_seconds: union_duration }
}

static ASTATS_PEAK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Peak level dB:\s*(?P<db>-?[0-9.]+)").unwrap());

pub fn parse_audio_clipping(stderr: &str) -> Option<AudioClippingResult> {
    let mut peak = f64::NEG_INFINITY;
    for line in stderr.lines() {
        if let Some(caps) = ASTATS_PEAK_RE.captures(line) {
            if let Ok(db) = caps["db"].parse::<f64>() {
                peak = peak.max(db);
            }
        }
    }
    if peak.is_finite() {
        Some(AudioClippingResult { peak_level_dbfs: peak, clipping_detected: peak > -1.0 })
    } else {
        None
    }
}

static BLOCKINESS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bavg:\s*(?P<avg>[0-9.]+)").unwrap());

pub fn parse_blockiness(stderr: &str) -> Option<BlockinessResult> {
    let mut sum = 0.0;
    let mut count = 0u32;
    for line in stderr.lines() {
        if let Some(caps) = BLOCKINESS_RE.captures(line) {
            if let Ok(v) = caps["avg"].parse::<f64>() {
                sum += v;
                count += 1;
            }
        }
    }
    if count > 0 {
        Some(BlockinessResult { average_score: sum / f64::from(count) })
    } else {
        None
    }
}

static YAVG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"YAVG:(?P<v>[0-9.]+)").unwrap());

pub fn parse_blurriness(stderr: &str, threshold: f64) -> Option<BlurrinessResult> {
    let mut sum = 0.0;
    let mut count = 0u32;
    for line in stderr.lines() {
        if let Some(caps) = YAVG_RE.captures(line) {
            if let Ok(v) = caps["v"].parse::<f64>() {
                sum += v;
                count += 1;
            }
        }
    }
    if count == 0 {
        return None;
    }
    let average = sum / f64::from(count);
    Some(BlurrinessResult { average_yavg: average, is_blurry: average < threshold })
}

// ffmpeg's `idet` filter emits a summary line on the last reported frame:
//   [Parsed_idet_0 @ 0x...] Multi frame detection: TFF: 0 BFF: 0 Progressive: 480 Undetermined: 20
static MULTI_FRAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Multi frame detection:\s*TFF:\s*(?P<tff>\d+)\s*BFF:\s*(?P<bff>\d+)\s*Progressive:\s*(?P<prog>\d+)\s*Undetermined:\s*(?P<und>\d+)").unwrap()
});

pub fn parse_interlacing(stderr: &str) -> Option<InterlacingResult> {
    let caps = stderr.lines().rev().find_map(|l| MULTI_FRAME_RE.captures(l))?;
    let tff: u64 = caps["tff"].parse().ok()?;
    let bff: u64 = caps["bff"].parse().ok()?;
    let progressive: u64 = caps["prog"].parse().ok()?;
    let undetermined: u64 = caps["und"].parse().ok()?;
    let interlaced = tff + bff;
    let total = interlaced + progressive + undetermined;
    let confidence = if total > 0 { interlaced as f64 / total as f64 } else { 0.0 };
    Some(InterlacingResult { progressive_frames: progressive, interlaced_frames: interlaced, confidence })
}

static YDIF_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"YDIF:(?P<v>[0-9.]+)").unwrap());

pub fn parse_noise(stderr: &str) -> Option<NoiseResult> {
    let mut sum = 0.0;
    let mut count = 0u32;
    for line in stderr.lines() {
        if let Some(caps) = YDIF_RE.captures(line) {
            if let Ok(v) = caps["v"].parse::<f64>() {
                sum += v;
                count += 1;
            }
        }
    }
    if count > 0 {
        Some(NoiseResult { average_ydif: sum / f64::from(count) })
    } else {
        None
    }
}

static LOUDNESS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)Integrated loudness:\s*I:\s*(?P<i>-?[0-9.]+)\s*LUFS.*?LRA:\s*(?P<lra>[0-9.]+)\s*LU.*?True peak:\s*Peak:\s*(?P<peak>-?[0-9.]+)\s*dBTP").unwrap()
});

pub fn parse_loudness(stderr: &str) -> Option<LoudnessResult> {
    let caps = LOUDNESS_RE.captures(stderr)?;
    let integrated: f64 = caps["i"].parse().ok()?;
    let lra: f64 = caps["lra"].parse().ok()?;
    let true_peak: f64 = caps["peak"].parse().ok()?;
    let compliant = (-25.0..=-21.0).contains(&integrated) && true_peak <= -1.0;
    Some(LoudnessResult {
        integrated_lufs: integrated,
        loudness_range_lu: lra,
        true_peak_dbtp: true_peak,
        compliant,
    })
}
