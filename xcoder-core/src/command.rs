//! Command Builder: pure, side-effect-free translation of
//! (input, temp output, target bitrate, source codec, encoder, decode mode)
//! into an argv vector and a display label.

use std::path::Path;

use crate::encoder::{hw_decode_supported, AttemptKey, Codec, DecodeMode, Encoder};
use crate::stream_plan::{stream_plan_args, StreamPlan};

#[derive(Debug, Clone)]
pub struct BuiltCommand {
  pub argv: Vec<String>,
  pub label: String,
}

/// `None` when the requested pair cannot be built: `HW_DECODE` on a source
/// codec the encoder's hardware decoder doesn't support. The caller (the
/// scheduler's matrix walker) moves on to the next attempt key; this is not
/// an error.
pub fn build_command(
  input: &Path,
  tmp_output: &Path,
  target_bitrate_bps: u64,
  source_codec: &str,
  codec: Codec,
  key: AttemptKey,
  fps_cap: u32,
  stream_plan: &StreamPlan,
) -> Option<BuiltCommand> {
  if key.decode_mode == DecodeMode::HwDecode {
    if key.encoder == Encoder::Cpu {
      // The CPU encoder never proposes HW_DECODE; a caller asking for it
      // anyway is a matrix-enumeration bug upstream, not something this
      // pure function should paper over.
      return None;
    }
    if !hw_decode_supported(key.encoder, source_codec) {
      return None;
    }
  }

  let mut argv = vec!["-y".to_string(), "-hide_banner".to_string(), "-loglevel".to_string(), "warning".to_string()];

  if let (DecodeMode::HwDecode, Some(hwaccel)) = (key.decode_mode, key.encoder.hwaccel_name()) {
    argv.push("-hwaccel".to_string());
    argv.push(hwaccel.to_string());
    argv.push("-hwaccel_output_format".to_string());
    argv.push(hwaccel.to_string());
  }

  argv.push("-i".to_string());
  argv.push(input.to_string_lossy().into_owned());

  if matches!(key.decode_mode, DecodeMode::SwDecodeLimited) {
    argv.push("-r".to_string());
    argv.push(fps_cap.to_string());
  }

  argv.extend(stream_plan_args(stream_plan));

  argv.push("-c:v".to_string());
  argv.push(key.encoder.ffmpeg_name(codec).to_string());
  argv.push("-b:v".to_string());
  argv.push(target_bitrate_bps.to_string());

  argv.push(tmp_output.to_string_lossy().into_owned());

  let label = display_label(codec, key, fps_cap);

  Some(BuiltCommand { argv, label })
}

fn display_label(codec: Codec, key: AttemptKey, fps_cap: u32) -> String {
  let codec_name: &str = match codec {
    Codec::Hevc => "HEVC",
    Codec::Avc => "AVC",
    Codec::Av1 => "AV1",
  };
  match (key.encoder, key.decode_mode) {
    (Encoder::Cpu, DecodeMode::SwDecodeLimited) => format!("CPU (software {}, {} fps cap)", codec_name, fps_cap),
    (Encoder::Cpu, DecodeMode::SwDecode) => format!("CPU (software {})", codec_name),
    (e, DecodeMode::HwDecode) => format!("{} ({}, hw-dec+hw-enc)", e, codec_name),
    (e, DecodeMode::SwDecodeLimited) => format!("{} ({}, sw-dec+hw-enc, {} fps cap)", e, codec_name, fps_cap),
    (e, DecodeMode::SwDecode) => format!("{} ({}, sw-dec+hw-enc)", e, codec_name),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::path::PathBuf;

  fn plan() -> StreamPlan {
    StreamPlan::default()
  }

  #[test]
  fn hw_decode_omitted_for_unsupported_source_codec() {
    let key = AttemptKey::new(Encoder::Nvenc, DecodeMode::HwDecode);
    let built = build_command(&PathBuf::from("in.wmv"), &PathBuf::from("tmp_out.mp4"), 3_000_000, "wmv3", Codec::Hevc, key, 30, &plan());
    assert!(built.is_none());
  }

  #[test]
  fn cpu_never_proposes_hw_decode() {
    let key = AttemptKey::new(Encoder::Cpu, DecodeMode::HwDecode);
    let built = build_command(&PathBuf::from("in.mp4"), &PathBuf::from("tmp_out.mp4"), 3_000_000, "h264", Codec::Hevc, key, 30, &plan());
    assert!(built.is_none());
  }

  #[test]
  fn golden_argv_for_nvenc_hw_decode() {
    let key = AttemptKey::new(Encoder::Nvenc, DecodeMode::HwDecode);
    let built = build_command(&PathBuf::from("in.mp4"), &PathBuf::from("tmp_out.mp4"), 3_000_000, "h264", Codec::Hevc, key, 30, &plan()).unwrap();
    assert_eq!(built.label, "NVENC (HEVC, hw-dec+hw-enc)");
    assert!(built.argv.contains(&"-hwaccel".to_string()));
    assert!(built.argv.contains(&"cuda".to_string()));
    assert!(built.argv.contains(&"hevc_nvenc".to_string()));
    assert_eq!(built.argv.last().unwrap(), "tmp_out.mp4");
  }

  #[test]
  fn sw_decode_limited_adds_fps_cap() {
    let key = AttemptKey::new(Encoder::Cpu, DecodeMode::SwDecodeLimited);
    let built = build_command(&PathBuf::from("in.mp4"), &PathBuf::from("tmp_out.mp4"), 3_000_000, "h264", Codec::Hevc, key, 24, &plan()).unwrap();
    assert_eq!(built.label, "CPU (software HEVC, 24 fps cap)");
    let r_pos = built.argv.iter().position(|a| a == "-r").unwrap();
    assert_eq!(built.argv[r_pos + 1], "24");
  }
}
