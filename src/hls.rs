//! HLS Analyzer (spec §4.5): fetches a manifest with a bounded GET,
//! classifies it as master or media, extracts variants/segments, and runs a
//! small set of pluggable compliance rules over the parsed playlist.

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::probe::{self, ProbeOutcome};

const MAX_MANIFEST_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManifestKind {
    Master,
    Media,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    pub bandwidth: u64,
    pub resolution: Option<(u32, u32)>,
    pub codecs: Option<String>,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaSegment {
    pub url: String,
    pub duration_seconds: f64,
}

#[derive(Debug, Clone, Default)]
pub struct MediaPlaylist {
    pub media_sequence: Option<u64>,
    pub segments: Vec<MediaSegment>,
}

pub struct SegmentReport {
    pub url: String,
    pub probe: Result<ProbeOutcome>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceViolation {
    pub rule: String,
    pub detail: String,
}

pub struct AnalyzeOutcome {
    pub kind: ManifestKind,
    pub variants: Vec<Variant>,
    pub segment_reports: Vec<SegmentReport>,
    pub compliance: Vec<ComplianceViolation>,
}

static STREAM_INF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"#EXT-X-STREAM-INF:(?P<attrs>.*)"#).unwrap()
});
static BANDWIDTH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"BANDWIDTH=(?P<v>\d+)").unwrap());
static RESOLUTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"RESOLUTION=(?P<w>\d+)x(?P<h>\d+)").unwrap());
static CODECS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"CODECS="(?P<v>[^"]*)""#).unwrap());
static EXTINF_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"#EXTINF:(?P<dur>[0-9.]+)").unwrap());
static MEDIA_SEQUENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#EXT-X-MEDIA-SEQUENCE:(?P<v>\d+)").unwrap());

fn resolve_relative(base: &str, relative: &str) -> String {
    if relative.starts_with("http://") || relative.starts_with("https://") {
        return relative.to_string();
    }
    match reqwest::Url::parse(base).and_then(|u| u.join(relative)) {
        Ok(joined) => joined.to_string(),
        Err(_) => relative.to_string(),
    }
}

fn is_master(text: &str) -> bool {
    text.lines().any(|l| l.trim_start().starts_with("#EXT-X-STREAM-INF"))
}

fn parse_variants(text: &str, base_url: &str) -> Vec<Variant> {
    let mut variants = Vec::new();
    let lines: Vec<&str> = text.lines().collect();
    for (i, line) in lines.iter().enumerate() {
        let Some(caps) = STREAM_INF_RE.captures(line) else { continue };
        let attrs = &caps["attrs"];
        let bandwidth = BANDWIDTH_RE
            .captures(attrs)
            .and_then(|c| c["v"].parse::<u64>().ok())
            .unwrap_or(0);
        let resolution = RESOLUTION_RE.captures(attrs).and_then(|c| {
            Some((c["w"].parse::<u32>().ok()?, c["h"].parse::<u32>().ok()?))
        });
        let codecs = CODECS_RE.captures(attrs).map(|c| c["v"].to_string());

        let url = lines[i + 1..]
            .iter()
            .find(|l| !l.trim().is_empty() && !l.trim_start().starts_with('#'))
            .map(|l| resolve_relative(base_url, l.trim()));

        if let Some(url) = url {
            variants.push(Variant { bandwidth, resolution, codecs, url });
        }
    }
    variants
}

fn parse_media_playlist(text: &str, base_url: &str) -> MediaPlaylist {
    let media_sequence =
        MEDIA_SEQUENCE_RE.captures(text).and_then(|c| c["v"].parse::<u64>().ok());

    let mut segments = Vec::new();
    let lines: Vec<&str> = text.lines().collect();
    for (i, line) in lines.iter().enumerate() {
        let Some(caps) = EXTINF_RE.captures(line) else { continue };
        let duration_seconds = caps["dur"].parse::<f64>().unwrap_or(0.0);
        if let Some(url_line) = lines[i + 1..]
            .iter()
            .find(|l| !l.trim().is_empty() && !l.trim_start().starts_with('#'))
        {
            segments.push(MediaSegment {
                url: resolve_relative(base_url, url_line.trim()),
                duration_seconds,
            });
        }
    }

    MediaPlaylist { media_sequence, segments }
}

/// A pluggable manifest-level compliance predicate (spec's Open Question:
/// the rule set itself is left unspecified — this ships two concrete rules
/// as the default set).
pub trait ComplianceRule: Send + Sync {
    fn name(&self) -> &'static str;
    fn check(&self, playlist: Option<&MediaPlaylist>, variants: &[Variant]) -> Option<String>;
}

/// Flags duplicate segment URIs within a single media playlist fetch — the
/// observable symptom of a broken sequence-number mapping (each segment
/// should occupy exactly one position in the media-sequence numbering).
pub struct MonotonicSequenceRule;

impl ComplianceRule for MonotonicSequenceRule {
    fn name(&self) -> &'static str {
        "monotonic_sequence_numbers"
    }

    fn check(&self, playlist: Option<&MediaPlaylist>, _variants: &[Variant]) -> Option<String> {
        let playlist = playlist?;
        let mut seen = std::collections::HashSet::new();
        for segment in &playlist.segments {
            if !seen.insert(&segment.url) {
                return Some(format!("duplicate segment URI breaks sequence numbering: {}", segment.url));
            }
        }
        None
    }
}

/// Flags master manifests where no variant declares a `CODECS` attribute —
/// HLS recommends every variant declare it so players can select without
/// probing.
pub struct CodecsPresentRule;

impl ComplianceRule for CodecsPresentRule {
    fn name(&self) -> &'static str {
        "codecs_present_in_variant"
    }

    fn check(&self, _playlist: Option<&MediaPlaylist>, variants: &[Variant]) -> Option<String> {
        if variants.is_empty() {
            return None;
        }
        let any_declared = variants.iter().any(|v| v.codecs.is_some());
        if any_declared {
            None
        } else {
            Some("no variant declares a CODECS attribute".to_string())
        }
    }
}

pub fn default_rules() -> Vec<Box<dyn ComplianceRule>> {
    vec![Box::new(MonotonicSequenceRule), Box::new(CodecsPresentRule)]
}

async fn fetch_bounded(client: &Client, url: &str) -> Result<String> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| Error::ToolFailure(format!("hls manifest fetch failed: {e}")))?;

    if !response.status().is_success() {
        return Err(Error::ToolFailure(format!(
            "hls manifest fetch returned status {}",
            response.status()
        )));
    }

    if let Some(len) = response.content_length() {
        if len > MAX_MANIFEST_BYTES {
            return Err(Error::ParseFailure("manifest exceeds 10 MiB limit".to_string()));
        }
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| Error::ToolFailure(format!("hls manifest body read failed: {e}")))?;
    if bytes.len() as u64 > MAX_MANIFEST_BYTES {
        return Err(Error::ParseFailure("manifest exceeds 10 MiB limit".to_string()));
    }

    String::from_utf8(bytes.to_vec()).map_err(|e| Error::ParseFailure(e.to_string()))
}

/// Analyzes an HLS manifest: fetch, classify, extract variants, optionally
/// probe the first `max_segments` segments per variant, and run compliance
/// rules over the result.
pub async fn analyze_manifest(
    client: &Client,
    url: &str,
    max_segments: u32,
    analyze_segments: bool,
    rules: &[Box<dyn ComplianceRule>],
    config: &Config,
    cancel: &CancellationToken,
) -> Result<AnalyzeOutcome> {
    let text = fetch_bounded(client, url).await?;

    if is_master(&text) {
        let variants = parse_variants(&text, url);
        let mut compliance = Vec::new();
        for rule in rules {
            if let Some(detail) = rule.check(None, &variants) {
                compliance.push(ComplianceViolation { rule: rule.name().to_string(), detail });
            }
        }

        let mut segment_reports = Vec::new();
        if analyze_segments {
            for variant in &variants {
                let media_text = fetch_bounded(client, &variant.url).await?;
                let media_playlist = parse_media_playlist(&media_text, &variant.url);
                for segment in media_playlist.segments.iter().take(max_segments as usize) {
                    segment_reports.push(probe_segment(segment, config, cancel).await);
                }
            }
        }

        Ok(AnalyzeOutcome { kind: ManifestKind::Master, variants, segment_reports, compliance })
    } else {
        let playlist = parse_media_playlist(&text, url);
        let mut compliance = Vec::new();
        for rule in rules {
            if let Some(detail) = rule.check(Some(&playlist), &[]) {
                compliance.push(ComplianceViolation { rule: rule.name().to_string(), detail });
            }
        }

        let mut segment_reports = Vec::new();
        if analyze_segments {
            for segment in playlist.segments.iter().take(max_segments as usize) {
                segment_reports.push(probe_segment(segment, config, cancel).await);
            }
        }

        Ok(AnalyzeOutcome { kind: ManifestKind::Media, variants: Vec::new(), segment_reports, compliance })
    }
}

async fn probe_segment(segment: &MediaSegment, config: &Config, cancel: &CancellationToken) -> SegmentReport {
    let source = crate::domain::SourceDescriptor::Url { url: segment.url.clone(), timeout_ms: None };
    let options = crate::domain::ProbeOptions { show_format: true, show_streams: true, ..Default::default() };
    let probe_result = probe::probe(&source, &options, config, cancel).await;
    SegmentReport { url: segment.url.clone(), probe: probe_result }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MASTER: &str = "#EXTM3U\n\
#EXT-X-STREAM-INF:BANDWIDTH=1280000,RESOLUTION=1920x1080,CODECS=\"avc1.64001f,mp4a.40.2\"\n\
high/index.m3u8\n\
#EXT-X-STREAM-INF:BANDWIDTH=640000,RESOLUTION=1280x720\n\
low/index.m3u8\n";

    const MEDIA: &str = "#EXTM3U\n\
#EXT-X-MEDIA-SEQUENCE:10\n\
#EXTINF:6.0,\n\
seg10.ts\n\
#EXTINF:6.0,\n\
seg11.ts\n";

    #[test]
    fn classifies_master_manifest() {
        assert!(is_master(MASTER));
        assert!(!is_master(MEDIA));
    }

    #[test]
    fn parses_variant_attributes_and_resolves_relative_urls() {
        let variants = parse_variants(MASTER, "https://cdn.example.com/stream/master.m3u8");
        assert_eq!(variants.len(), 2);
        assert_eq!(variants[0].bandwidth, 1280000);
        assert_eq!(variants[0].resolution, Some((1920, 1080)));
        assert_eq!(variants[0].codecs.as_deref(), Some("avc1.64001f,mp4a.40.2"));
        assert_eq!(variants[0].url, "https://cdn.example.com/stream/high/index.m3u8");
        assert!(variants[1].codecs.is_none());
    }

    #[test]
    fn parses_media_sequence_and_segments() {
        let playlist = parse_media_playlist(MEDIA, "https://cdn.example.com/stream/low/index.m3u8");
        assert_eq!(playlist.media_sequence, Some(10));
        assert_eq!(playlist.segments.len(), 2);
        assert_eq!(playlist.segments[0].url, "https://cdn.example.com/stream/seg10.ts");
    }

    #[test]
    fn codecs_rule_flags_variants_with_no_codecs_declared() {
        let variants = vec![Variant { bandwidth: 1, resolution: None, codecs: None, url: "a".into() }];
        let rule = CodecsPresentRule;
        assert!(rule.check(None, &variants).is_some());

        let with_codecs = vec![Variant {
            bandwidth: 1,
            resolution: None,
            codecs: Some("avc1".into()),
            url: "a".into(),
        }];
        assert!(rule.check(None, &with_codecs).is_none());
    }

    #[test]
    fn monotonic_sequence_rule_flags_duplicate_segment_uris() {
        let playlist = MediaPlaylist {
            media_sequence: Some(0),
            segments: vec![
                MediaSegment { url: "seg0.ts".into(), duration_seconds: 6.0 },
                MediaSegment { url: "seg0.ts".into(), duration_seconds: 6.0 },
            ],
        };
        let rule = MonotonicSequenceRule;
        assert!(rule.check(Some(&playlist), &[]).is_some());
    }
}
