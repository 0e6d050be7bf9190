//! Content-addressed dedup fingerprints (spec §6): SHA-256 of the input byte
//! stream when readable, else SHA-256 of `(url + option fingerprint)`.

use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

use crate::domain::{AnalysisOptions, SourceDescriptor};

/// Deterministic digest over the option set, independent of field order.
pub fn option_fingerprint(options: &AnalysisOptions) -> String {
    let canonical = serde_json::to_string(options).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hashes a local file's bytes in fixed-size chunks; `None` if it can't be
/// read (streaming sources never dedup, per spec §4.6).
pub async fn hash_file(path: &std::path::Path) -> Option<String> {
    let mut file = tokio::fs::File::open(path).await.ok()?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await.ok()?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Some(hex::encode(hasher.finalize()))
}

/// Computes the content fingerprint for a job's source + option set,
/// used by the orchestrator's idempotence check (spec §4.6, §8).
pub async fn compute(source: &SourceDescriptor, options: &AnalysisOptions) -> Option<String> {
    let opt_fp = option_fingerprint(options);
    match source {
        SourceDescriptor::LocalPath { path } => {
            let content = hash_file(path).await?;
            Some(format!("{content}:{opt_fp}"))
        }
        SourceDescriptor::Url { url, .. } => {
            let mut hasher = Sha256::new();
            hasher.update(url.as_bytes());
            hasher.update(opt_fp.as_bytes());
            Some(hex::encode(hasher.finalize()))
        }
        // HLS/comparison sources are not byte streams we can hash cheaply;
        // spec §4.6 says "when fingerprints cannot be computed... no dedup".
        SourceDescriptor::HlsManifest { .. } | SourceDescriptor::Comparison { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ProbeOptions;

    #[test]
    fn option_fingerprint_is_deterministic() {
        let opts = AnalysisOptions {
            probe: ProbeOptions { show_format: true, ..Default::default() },
            filters: vec![],
            quality_metrics: vec![],
        };
        let a = option_fingerprint(&opts);
        let b = option_fingerprint(&opts);
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn url_sources_fingerprint_without_io() {
        let options = AnalysisOptions::default();
        let fp = compute(
            &SourceDescriptor::Url { url: "https://example.com/a.mp4".into(), timeout_ms: None },
            &options,
        )
        .await;
        assert!(fp.is_some());
    }

    #[tokio::test]
    async fn hls_sources_never_dedup() {
        let options = AnalysisOptions::default();
        let fp = compute(
            &SourceDescriptor::HlsManifest {
                url: "https://example.com/master.m3u8".into(),
                max_segments: 5,
                analyze_segments: false,
                validate_compliance: false,
            },
            &options,
        )
        .await;
        assert!(fp.is_none());
    }
}
