//! Thin wrappers around `ffprobe` for reading source metadata, each with the
//! documented fallback default used when the probe itself fails to read the
//! file.

use std::path::Path;
use std::process::Command;

use serde::Deserialize;

use crate::stream_plan::{AudioStream, SubtitleStream};

pub const FALLBACK_BITRATE_BPS: u64 = 3_000_000;
pub const FALLBACK_WIDTH: u32 = 1920;
pub const FALLBACK_HEIGHT: u32 = 1080;
pub const FALLBACK_FPS: f64 = 30.0;
pub const FALLBACK_CODEC: &str = "h264";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceMeta {
  pub bitrate_bps: u64,
  pub width: u32,
  pub height: u32,
  pub fps: f64,
}

impl Default for SourceMeta {
  fn default() -> Self {
    Self { bitrate_bps: FALLBACK_BITRATE_BPS, width: FALLBACK_WIDTH, height: FALLBACK_HEIGHT, fps: FALLBACK_FPS }
  }
}

#[derive(Deserialize)]
struct ProbeFormat {
  bit_rate: Option<String>,
}

#[derive(Deserialize)]
struct ProbeStream {
  index: u32,
  codec_name: Option<String>,
  codec_type: Option<String>,
  width: Option<u32>,
  height: Option<u32>,
  r_frame_rate: Option<String>,
  bit_rate: Option<String>,
  #[serde(default)]
  tags: ProbeTags,
}

#[derive(Deserialize, Default)]
struct ProbeTags {
  language: Option<String>,
}

#[derive(Deserialize)]
struct ProbeOutput {
  format: Option<ProbeFormat>,
  #[serde(default)]
  streams: Vec<ProbeStream>,
}

fn run_ffprobe(input: &Path) -> Option<ProbeOutput> {
  let output = Command::new("ffprobe")
    .args([
      "-v",
      "quiet",
      "-print_format",
      "json",
      "-show_format",
      "-show_streams",
    ])
    .arg(input)
    .output()
    .ok()?;
  if !output.status.success() {
    return None;
  }
  serde_json::from_slice(&output.stdout).ok()
}

fn first_video_stream(probe: &ProbeOutput) -> Option<&ProbeStream> {
  probe.streams.iter().find(|s| s.codec_type.as_deref() == Some("video"))
}

fn parse_frame_rate(s: &str) -> Option<f64> {
  let mut parts = s.split('/');
  let num: f64 = parts.next()?.parse().ok()?;
  let den: f64 = parts.next().unwrap_or("1").parse().ok()?;
  if den == 0.0 {
    None
  } else {
    Some(num / den)
  }
}

/// Reads bitrate, resolution, and frame rate in a single probe call,
/// falling back to the documented defaults (and logging a warning) on any
/// failure to read or parse the metadata.
pub fn probe_source(input: &Path) -> SourceMeta {
  let Some(probe) = run_ffprobe(input) else {
    log::warn!("ffprobe failed for {:?}, using fallback defaults", input);
    return SourceMeta::default();
  };
  let video_stream = first_video_stream(&probe);

  let bitrate_bps = video_stream
    .and_then(|s| s.bit_rate.as_ref())
    .or_else(|| probe.format.as_ref().and_then(|f| f.bit_rate.as_ref()))
    .and_then(|s| s.parse::<u64>().ok())
    .unwrap_or(FALLBACK_BITRATE_BPS);

  let width = video_stream.and_then(|s| s.width).unwrap_or(FALLBACK_WIDTH);
  let height = video_stream.and_then(|s| s.height).unwrap_or(FALLBACK_HEIGHT);
  let fps = video_stream
    .and_then(|s| s.r_frame_rate.as_deref())
    .and_then(parse_frame_rate)
    .unwrap_or(FALLBACK_FPS);

  if bitrate_bps == FALLBACK_BITRATE_BPS && video_stream.is_none() {
    log::warn!("no video stream found in {:?}, using fallback defaults", input);
  }

  SourceMeta { bitrate_bps, width, height, fps }
}

/// The primary video stream's codec tag (e.g. `"h264"`, `"hevc"`, `"wmv3"`),
/// used both by the stream planner's bucket lookup and the scheduler's
/// hardware-decode support check.
pub fn probe_codec(input: &Path) -> String {
  run_ffprobe(input)
    .as_ref()
    .and_then(first_video_stream)
    .and_then(|s| s.codec_name.clone())
    .unwrap_or_else(|| FALLBACK_CODEC.to_string())
}

/// Every audio and subtitle stream in `input`, for the stream-mapping
/// policy to choose what to keep, copy, or transcode. Empty on probe
/// failure; the caller then maps no extra streams at all, which degrades to
/// a video-only output rather than guessing at stream layout.
pub fn probe_streams(input: &Path) -> (Vec<AudioStream>, Vec<SubtitleStream>) {
  let Some(probe) = run_ffprobe(input) else {
    return (Vec::new(), Vec::new());
  };

  let audio = probe
    .streams
    .iter()
    .filter(|s| s.codec_type.as_deref() == Some("audio"))
    .map(|s| AudioStream {
      index: s.index,
      codec: s.codec_name.clone().unwrap_or_default(),
      bitrate_bps: s.bit_rate.as_ref().and_then(|b| b.parse().ok()),
      language: s.tags.language.clone(),
    })
    .collect();

  let subtitles = probe
    .streams
    .iter()
    .filter(|s| s.codec_type.as_deref() == Some("subtitle"))
    .map(|s| SubtitleStream { index: s.index, language: s.tags.language.clone() })
    .collect();

  (audio, subtitles)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_frame_rate_fraction() {
    assert_eq!(parse_frame_rate("30000/1001"), Some(29.97002997002997));
    assert_eq!(parse_frame_rate("25/1"), Some(25.0));
    assert_eq!(parse_frame_rate("0/0"), None);
  }

  #[test]
  fn default_meta_matches_documented_fallback() {
    let meta = SourceMeta::default();
    assert_eq!(meta.bitrate_bps, 3_000_000);
    assert_eq!((meta.width, meta.height), (1920, 1080));
    assert_eq!(meta.fps, 30.0);
  }
}
