//! The raw `ffprobe -of json` shape (spec §6: "consumed bit-exactly as
//! produced by upstream versions >= 4.4"). Numeric fields the tool declares
//! as strings (durations, bit rates, frame counts) are converted with a
//! locale-independent parse helper; a failed conversion becomes a warning,
//! never a hard error (spec §4.1).

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawFormat {
    pub filename: Option<String>,
    pub format_name: Option<String>,
    #[serde(default, deserialize_with = "parse_opt_string_number")]
    pub duration: Option<f64>,
    #[serde(default, deserialize_with = "parse_opt_string_number")]
    pub size: Option<f64>,
    #[serde(default, deserialize_with = "parse_opt_string_number")]
    pub bit_rate: Option<f64>,
    pub nb_streams: Option<u64>,
    pub nb_programs: Option<u64>,
    #[serde(default)]
    pub tags: std::collections::BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawDisposition {
    #[serde(flatten)]
    pub flags: std::collections::BTreeMap<String, i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawStream {
    pub index: u32,
    pub codec_name: Option<String>,
    pub codec_type: Option<String>,
    pub pix_fmt: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub sample_rate: Option<String>,
    pub channels: Option<u32>,
    pub channel_layout: Option<String>,
    #[serde(default, deserialize_with = "parse_opt_string_number")]
    pub bit_rate: Option<f64>,
    pub r_frame_rate: Option<String>,
    pub avg_frame_rate: Option<String>,
    #[serde(default, deserialize_with = "parse_opt_string_number")]
    pub duration: Option<f64>,
    pub color_transfer: Option<String>,
    pub color_primaries: Option<String>,
    pub color_space: Option<String>,
    #[serde(default)]
    pub disposition: RawDisposition,
    #[serde(default)]
    pub tags: std::collections::BTreeMap<String, String>,
    #[serde(default)]
    pub side_data_list: Vec<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawFrame {
    pub media_type: Option<String>,
    pub stream_index: Option<u32>,
    pub key_frame: Option<i64>,
    pub pict_type: Option<String>,
    #[serde(default, deserialize_with = "parse_opt_string_number")]
    pub pkt_size: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawChapter {
    pub id: i64,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawProgram {
    pub program_id: Option<u64>,
    #[serde(default)]
    pub streams: Vec<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawProbeResult {
    pub format: Option<RawFormat>,
    #[serde(default)]
    pub streams: Vec<RawStream>,
    #[serde(default)]
    pub frames: Vec<RawFrame>,
    #[serde(default)]
    pub chapters: Vec<RawChapter>,
    #[serde(default)]
    pub programs: Vec<RawProgram>,
}

fn parse_opt_string_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: Option<Value> = Option::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(Value::Number(n)) => n.as_f64(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_string_encoded_numbers() {
        let json = serde_json::json!({
            "format": {"duration": "12.345000", "bit_rate": "N/A"},
            "streams": [{"index": 0, "codec_type": "video", "pix_fmt": "yuv420p"}],
        });
        let parsed: RawProbeResult = serde_json::from_value(json).expect("parses");
        assert_eq!(parsed.format.unwrap().duration, Some(12.345));
        assert_eq!(parsed.streams[0].pix_fmt.as_deref(), Some("yuv420p"));
    }
}
