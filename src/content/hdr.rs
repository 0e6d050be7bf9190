//! HDR classification (spec §4.2): "via probe metadata, not filter" — a pure
//! function over a video stream's color metadata and side-data, no
//! subprocess involved.

use crate::probe::raw::RawStream;

use super::types::HdrResult;

const HDR_TRANSFERS: &[&str] = &["smpte2084", "arib-std-b67"];

/// Classifies a single video stream as HDR/SDR from its probed color
/// metadata. Returns `None` when the stream carries no color metadata at
/// all (e.g. an audio stream was passed in, or ffprobe reported nothing).
pub fn classify(stream: &RawStream) -> Option<HdrResult> {
    if stream.color_transfer.is_none()
        && stream.color_primaries.is_none()
        && stream.color_space.is_none()
        && stream.side_data_list.is_empty()
    {
        return None;
    }

    let is_hdr = stream
        .color_transfer
        .as_deref()
        .map(|t| HDR_TRANSFERS.contains(&t))
        .unwrap_or(false);

    let master_display = stream
        .side_data_list
        .iter()
        .find(|v| v.get("side_data_type").and_then(|t| t.as_str()) == Some("Mastering display metadata"))
        .map(|v| v.to_string());

    let (max_cll, max_fall) = stream
        .side_data_list
        .iter()
        .find(|v| v.get("side_data_type").and_then(|t| t.as_str()) == Some("Content light level metadata"))
        .map(|v| {
            (
                v.get("max_content").and_then(|n| n.as_f64()),
                v.get("max_average").and_then(|n| n.as_f64()),
            )
        })
        .unwrap_or((None, None));

    Some(HdrResult {
        is_hdr,
        color_transfer: stream.color_transfer.clone(),
        color_primaries: stream.color_primaries.clone(),
        color_space: stream.color_space.clone(),
        master_display,
        max_cll,
        max_fall,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classifies_smpte2084_as_hdr() {
        let stream = RawStream {
            color_transfer: Some("smpte2084".to_string()),
            color_primaries: Some("bt2020".to_string()),
            ..Default::default()
        };
        let result = classify(&stream).expect("classified");
        assert!(result.is_hdr);
    }

    #[test]
    fn classifies_bt709_as_sdr() {
        let stream = RawStream { color_transfer: Some("bt709".to_string()), ..Default::default() };
        let result = classify(&stream).expect("classified");
        assert!(!result.is_hdr);
    }

    #[test]
    fn extracts_content_light_level_side_data() {
        let stream = RawStream {
            color_transfer: Some("smpte2084".to_string()),
            side_data_list: vec![json!({
                "side_data_type": "Content light level metadata",
                "max_content": 1000,
                "max_average": 400,
            })],
            ..Default::default()
        };
        let result = classify(&stream).expect("classified");
        assert_eq!(result.max_cll, Some(1000.0));
        assert_eq!(result.max_fall, Some(400.0));
    }

    #[test]
    fn returns_none_for_stream_without_color_metadata() {
        let stream = RawStream::default();
        assert!(classify(&stream).is_none());
    }
}
