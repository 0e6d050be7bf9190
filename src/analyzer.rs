//! Enhanced Analyzer (spec §4.3): a pure reducer over a raw probe result.
//! Takes no I/O and never errors — missing input degrades to null/zero
//! fields rather than a `Result`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::probe::raw::{RawProbeResult, RawStream};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamCounts {
    pub total: u32,
    pub video: u32,
    pub audio: u32,
    pub subtitle: u32,
    pub data: u32,
    pub attachment: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GopStructure {
    pub keyframe_count: u64,
    pub average_gop_size: f64,
    pub min_gop_size: u64,
    pub max_gop_size: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameStatistics {
    pub i_frames: u64,
    pub p_frames: u64,
    pub b_frames: u64,
    pub average_packet_size: f64,
    pub min_packet_size: f64,
    pub max_packet_size: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamRole {
    Main,
    Commentary,
    Dub,
    Original,
    Forced,
    Alternate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Accessibility {
    None,
    Sdh,
    AudioDescription,
    Captions,
    ForcedNarrative,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamClassification {
    pub index: u32,
    pub role: StreamRole,
    pub accessibility: Accessibility,
    pub language: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancedAnalysis {
    pub stream_counts: StreamCounts,
    pub chroma_subsampling: String,
    pub gop_structure: Option<GopStructure>,
    pub frame_statistics: Option<FrameStatistics>,
    pub stream_classifications: Vec<StreamClassification>,
    pub language_distribution: BTreeMap<String, u32>,
    pub accessibility_score: u32,
}

/// Maps `pix_fmt` to a chroma subsampling label (spec §4.3). Unknown formats
/// map to an empty string rather than an error.
pub fn chroma_subsampling(pix_fmt: Option<&str>) -> String {
    match pix_fmt {
        Some("yuv420p") | Some("yuvj420p") => "4:2:0".to_string(),
        Some("yuv422p") | Some("yuvj422p") => "4:2:2".to_string(),
        Some("yuv444p") | Some("yuvj444p") => "4:4:4".to_string(),
        _ => String::new(),
    }
}

fn stream_counts(streams: &[RawStream]) -> StreamCounts {
    let mut counts = StreamCounts::default();
    counts.total = streams.len() as u32;
    for stream in streams {
        match stream.codec_type.as_deref() {
            Some("video") => counts.video += 1,
            Some("audio") => counts.audio += 1,
            Some("subtitle") => counts.subtitle += 1,
            Some("data") => counts.data += 1,
            Some("attachment") => counts.attachment += 1,
            _ => {}
        }
    }
    counts
}

/// GOP size is measured by the gap between consecutive keyframe indices in
/// probe-order. Requires at least 2 keyframes to report min/max/average.
fn gop_structure(raw: &RawProbeResult) -> Option<GopStructure> {
    if raw.frames.is_empty() {
        return None;
    }

    let keyframe_positions: Vec<usize> = raw
        .frames
        .iter()
        .enumerate()
        .filter(|(_, f)| f.key_frame == Some(1))
        .map(|(i, _)| i)
        .collect();

    let keyframe_count = keyframe_positions.len() as u64;
    if keyframe_count < 2 {
        return None;
    }

    let gaps: Vec<u64> =
        keyframe_positions.windows(2).map(|w| (w[1] - w[0]) as u64).collect();
    let total_frames = raw.frames.len() as u64;
    let average_gop_size = total_frames as f64 / keyframe_count as f64;
    let min_gop_size = *gaps.iter().min().unwrap();
    let max_gop_size = *gaps.iter().max().unwrap();

    Some(GopStructure { keyframe_count, average_gop_size, min_gop_size, max_gop_size })
}

fn frame_statistics(raw: &RawProbeResult) -> Option<FrameStatistics> {
    if raw.frames.is_empty() {
        return None;
    }

    let mut stats = FrameStatistics::default();
    let mut sizes: Vec<f64> = Vec::new();

    for frame in &raw.frames {
        match frame.pict_type.as_deref() {
            Some("I") => stats.i_frames += 1,
            Some("P") => stats.p_frames += 1,
            Some("B") => stats.b_frames += 1,
            _ => {}
        }
        if let Some(size) = frame.pkt_size {
            sizes.push(size);
        }
    }

    if !sizes.is_empty() {
        stats.average_packet_size = sizes.iter().sum::<f64>() / sizes.len() as f64;
        stats.min_packet_size = sizes.iter().cloned().fold(f64::INFINITY, f64::min);
        stats.max_packet_size = sizes.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    }

    Some(stats)
}

fn disposition_flag(stream: &RawStream, flag: &str) -> bool {
    stream.disposition.flags.get(flag).copied().unwrap_or(0) != 0
}

fn classify_stream(stream: &RawStream) -> StreamClassification {
    let forced = disposition_flag(stream, "forced");
    let comment = disposition_flag(stream, "comment");
    let dub = disposition_flag(stream, "dub");
    let original = disposition_flag(stream, "original");
    let hearing_impaired = disposition_flag(stream, "hearing_impaired");
    let visual_impaired = disposition_flag(stream, "visual_impaired");
    let captions = disposition_flag(stream, "captions");

    let role = if comment {
        StreamRole::Commentary
    } else if dub {
        StreamRole::Dub
    } else if original {
        StreamRole::Original
    } else if forced {
        StreamRole::Forced
    } else if stream.disposition.flags.get("default").copied().unwrap_or(0) == 0 {
        StreamRole::Alternate
    } else {
        StreamRole::Main
    };

    let accessibility = if hearing_impaired {
        Accessibility::Sdh
    } else if visual_impaired {
        Accessibility::AudioDescription
    } else if captions {
        Accessibility::Captions
    } else if forced && stream.codec_type.as_deref() == Some("subtitle") {
        Accessibility::ForcedNarrative
    } else {
        Accessibility::None
    };

    let language = stream
        .tags
        .get("language")
        .cloned()
        .unwrap_or_else(|| "und".to_string());

    StreamClassification { index: stream.index, role, accessibility, language }
}

fn language_distribution(classifications: &[StreamClassification]) -> BTreeMap<String, u32> {
    let mut histogram = BTreeMap::new();
    for c in classifications {
        *histogram.entry(c.language.clone()).or_insert(0) += 1;
    }
    histogram
}

/// Additive score capped at 100 (spec §4.3: unit tested against exact
/// thresholds, so the weights below are not tunable without updating them).
fn accessibility_score(classifications: &[StreamClassification], languages: &BTreeMap<String, u32>) -> u32 {
    let mut score = 0u32;

    let has_forced_subs = classifications
        .iter()
        .any(|c| c.accessibility == Accessibility::ForcedNarrative);
    let has_sdh = classifications.iter().any(|c| c.accessibility == Accessibility::Sdh);
    let has_descriptive_audio =
        classifications.iter().any(|c| c.accessibility == Accessibility::AudioDescription);
    let has_alternate = classifications.iter().any(|c| c.role == StreamRole::Alternate);
    let multi_language = languages.len() > 1;

    if has_forced_subs {
        score += 20;
    }
    if has_sdh {
        score += 30;
    }
    if has_descriptive_audio {
        score += 25;
    }
    if has_alternate {
        score += 15;
    }
    if multi_language {
        score += 10;
    }

    score.min(100)
}

/// Reduces a raw probe result into derived summaries. Total: never panics,
/// never errors; an empty `raw` yields an all-default `EnhancedAnalysis`.
pub fn analyze(raw: &RawProbeResult) -> EnhancedAnalysis {
    let counts = stream_counts(&raw.streams);

    let chroma = raw
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .map(|s| chroma_subsampling(s.pix_fmt.as_deref()))
        .unwrap_or_default();

    let classifications: Vec<StreamClassification> =
        raw.streams.iter().map(classify_stream).collect();
    let languages = language_distribution(&classifications);
    let score = accessibility_score(&classifications, &languages);

    EnhancedAnalysis {
        stream_counts: counts,
        chroma_subsampling: chroma,
        gop_structure: gop_structure(raw),
        frame_statistics: frame_statistics(raw),
        stream_classifications: classifications,
        language_distribution: languages,
        accessibility_score: score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::raw::{RawDisposition, RawFormat, RawFrame};

    fn video_stream(index: u32, pix_fmt: &str) -> RawStream {
        RawStream { index, codec_type: Some("video".into()), pix_fmt: Some(pix_fmt.into()), ..Default::default() }
    }

    #[test]
    fn empty_probe_result_yields_zeroed_analysis() {
        let raw = RawProbeResult::default();
        let analysis = analyze(&raw);
        assert_eq!(analysis.stream_counts.total, 0);
        assert_eq!(analysis.chroma_subsampling, "");
        assert!(analysis.gop_structure.is_none());
        assert_eq!(analysis.accessibility_score, 0);
    }

    #[test]
    fn chroma_subsampling_maps_known_formats() {
        assert_eq!(chroma_subsampling(Some("yuv420p")), "4:2:0");
        assert_eq!(chroma_subsampling(Some("yuv422p")), "4:2:2");
        assert_eq!(chroma_subsampling(Some("yuv444p")), "4:4:4");
        assert_eq!(chroma_subsampling(Some("rgb24")), "");
        assert_eq!(chroma_subsampling(None), "");
    }

    #[test]
    fn stream_counts_tally_by_codec_type() {
        let raw = RawProbeResult {
            format: Some(RawFormat::default()),
            streams: vec![
                video_stream(0, "yuv420p"),
                RawStream { index: 1, codec_type: Some("audio".into()), ..Default::default() },
                RawStream { index: 2, codec_type: Some("subtitle".into()), ..Default::default() },
            ],
            ..Default::default()
        };
        let analysis = analyze(&raw);
        assert_eq!(analysis.stream_counts.total, 3);
        assert_eq!(analysis.stream_counts.video, 1);
        assert_eq!(analysis.stream_counts.audio, 1);
        assert_eq!(analysis.stream_counts.subtitle, 1);
        assert_eq!(analysis.chroma_subsampling, "4:2:0");
    }

    #[test]
    fn gop_structure_requires_two_keyframes() {
        let single_keyframe = RawProbeResult {
            frames: vec![
                RawFrame { key_frame: Some(1), pict_type: Some("I".into()), ..Default::default() },
                RawFrame { key_frame: Some(0), pict_type: Some("P".into()), ..Default::default() },
            ],
            ..Default::default()
        };
        assert!(gop_structure(&single_keyframe).is_none());

        let two_keyframes = RawProbeResult {
            frames: vec![
                RawFrame { key_frame: Some(1), pict_type: Some("I".into()), ..Default::default() },
                RawFrame { key_frame: Some(0), pict_type: Some("P".into()), ..Default::default() },
                RawFrame { key_frame: Some(0), pict_type: Some("P".into()), ..Default::default() },
                RawFrame { key_frame: Some(1), pict_type: Some("I".into()), ..Default::default() },
            ],
            ..Default::default()
        };
        let gop = gop_structure(&two_keyframes).expect("computed");
        assert_eq!(gop.keyframe_count, 2);
        assert_eq!(gop.min_gop_size, 3);
        assert_eq!(gop.max_gop_size, 3);
        assert_eq!(gop.average_gop_size, 2.0);
    }

    #[test]
    fn frame_statistics_counts_pict_types_and_packet_sizes() {
        let raw = RawProbeResult {
            frames: vec![
                RawFrame { pict_type: Some("I".into()), pkt_size: Some(1000.0), ..Default::default() },
                RawFrame { pict_type: Some("P".into()), pkt_size: Some(200.0), ..Default::default() },
                RawFrame { pict_type: Some("B".into()), pkt_size: Some(100.0), ..Default::default() },
            ],
            ..Default::default()
        };
        let stats = frame_statistics(&raw).expect("computed");
        assert_eq!(stats.i_frames, 1);
        assert_eq!(stats.p_frames, 1);
        assert_eq!(stats.b_frames, 1);
        assert_eq!(stats.min_packet_size, 100.0);
        assert_eq!(stats.max_packet_size, 1000.0);
        assert!((stats.average_packet_size - 433.333).abs() < 0.01);
    }

    #[test]
    fn accessibility_score_is_additive_and_capped() {
        let mut sdh = RawStream { index: 0, codec_type: Some("subtitle".into()), ..Default::default() };
        sdh.disposition = RawDisposition { flags: [("hearing_impaired".to_string(), 1)].into() };
        sdh.tags.insert("language".to_string(), "eng".to_string());

        let mut forced = RawStream { index: 1, codec_type: Some("subtitle".into()), ..Default::default() };
        forced.disposition = RawDisposition { flags: [("forced".to_string(), 1)].into() };
        forced.tags.insert("language".to_string(), "fra".to_string());

        let mut descriptive = RawStream { index: 2, codec_type: Some("audio".into()), ..Default::default() };
        descriptive.disposition = RawDisposition { flags: [("visual_impaired".to_string(), 1)].into() };

        let mut alternate = RawStream { index: 3, codec_type: Some("audio".into()), ..Default::default() };
        alternate.disposition = RawDisposition { flags: [("default".to_string(), 0)].into() };

        let raw = RawProbeResult {
            streams: vec![sdh, forced, descriptive, alternate],
            ..Default::default()
        };
        let analysis = analyze(&raw);
        // sdh(30) + forced_narrative(20) + descriptive(25) + alternate(15) + multi-lang(10) = 100
        assert_eq!(analysis.accessibility_score, 100);
    }

    #[test]
    fn language_distribution_buckets_undefined_as_und() {
        let raw = RawProbeResult {
            streams: vec![
                RawStream { index: 0, codec_type: Some("audio".into()), ..Default::default() },
                RawStream { index: 1, codec_type: Some("audio".into()), ..Default::default() },
            ],
            ..Default::default()
        };
        let analysis = analyze(&raw);
        assert_eq!(analysis.language_distribution.get("und"), Some(&2));
    }
}
