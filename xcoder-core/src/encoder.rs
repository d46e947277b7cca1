//! The tagged enumerations at the centre of the attempt matrix: which
//! physical encoder, and which way the source is decoded for it.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use strum::{EnumIter, EnumString, IntoStaticStr};

/// A named code path that performs video compression, backed either by
/// dedicated hardware or by the CPU.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Debug, EnumString, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum Encoder {
  Nvenc,
  Qsv,
  Videotoolbox,
  Cpu,
}

impl Encoder {
  /// Hardware encoders in the default fallback priority order. CPU is
  /// never part of this list; it is appended separately by the scheduler
  /// when the CPU fallback is enabled.
  pub const HARDWARE_PRIORITY: [Encoder; 3] = [Encoder::Nvenc, Encoder::Videotoolbox, Encoder::Qsv];

  pub fn is_hardware(self) -> bool {
    !matches!(self, Encoder::Cpu)
  }

  /// The ffmpeg encoder name this tag maps to, given the configured codec.
  pub fn ffmpeg_name(self, codec: Codec) -> &'static str {
    match (self, codec) {
      (Encoder::Nvenc, Codec::Hevc) => "hevc_nvenc",
      (Encoder::Nvenc, Codec::Avc) => "h264_nvenc",
      (Encoder::Nvenc, Codec::Av1) => "av1_nvenc",
      (Encoder::Qsv, Codec::Hevc) => "hevc_qsv",
      (Encoder::Qsv, Codec::Avc) => "h264_qsv",
      (Encoder::Qsv, Codec::Av1) => "av1_qsv",
      (Encoder::Videotoolbox, Codec::Hevc) => "hevc_videotoolbox",
      (Encoder::Videotoolbox, Codec::Avc) => "h264_videotoolbox",
      (Encoder::Videotoolbox, Codec::Av1) => "av1_videotoolbox", // unsupported by real hardware; kept for uniform dispatch
      (Encoder::Cpu, Codec::Hevc) => "libx265",
      (Encoder::Cpu, Codec::Avc) => "libx264",
      (Encoder::Cpu, Codec::Av1) => "libsvtav1",
    }
  }

  /// The `-hwaccel` value used to decode on the same device this encoder
  /// runs on. `None` for the CPU encoder, which has no hardware decode path.
  pub fn hwaccel_name(self) -> Option<&'static str> {
    match self {
      Encoder::Nvenc => Some("cuda"),
      Encoder::Qsv => Some("qsv"),
      Encoder::Videotoolbox => Some("videotoolbox"),
      Encoder::Cpu => None,
    }
  }
}

impl std::fmt::Display for Encoder {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s: &'static str = (*self).into();
    write!(f, "{}", s.to_uppercase())
  }
}

/// The configured output container codec.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Debug, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum Codec {
  Hevc,
  Avc,
  Av1,
}

impl Default for Codec {
  fn default() -> Self {
    Codec::Hevc
  }
}

/// Whether the external tool decodes on the same hardware it encodes on,
/// in software with a frame-rate cap, or in software uncapped.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Debug, EnumIter)]
pub enum DecodeMode {
  HwDecode,
  SwDecodeLimited,
  SwDecode,
}

impl std::fmt::Display for DecodeMode {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      DecodeMode::HwDecode => "HW_DECODE",
      DecodeMode::SwDecodeLimited => "SW_DECODE_LIMITED",
      DecodeMode::SwDecode => "SW_DECODE",
    };
    write!(f, "{}", s)
  }
}

/// The pair identifying one try in a task's fallback matrix.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct AttemptKey {
  pub encoder: Encoder,
  pub decode_mode: DecodeMode,
}

impl AttemptKey {
  pub fn new(encoder: Encoder, decode_mode: DecodeMode) -> Self {
    Self { encoder, decode_mode }
  }

  /// Stable, human-readable label used in result histories, e.g. `"NVENC:HW_DECODE"`.
  pub fn label(&self) -> String {
    format!("{}:{}", self.encoder, self.decode_mode)
  }
}

impl std::fmt::Display for AttemptKey {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.label())
  }
}

/// Per-encoder set of source codec tags for which `HW_DECODE` is worth
/// attempting. Consulted to skip attempts that would certainly fail (e.g.
/// one vendor's hardware decoder does not understand a given source codec).
pub static HW_DECODE_SUPPORT: Lazy<std::collections::HashMap<Encoder, HashSet<&'static str>>> = Lazy::new(|| {
  let mut m = std::collections::HashMap::new();
  m.insert(
    Encoder::Nvenc,
    ["h264", "hevc", "vp9", "mpeg2video", "mpeg4", "vc1"].into_iter().collect(),
  );
  m.insert(
    Encoder::Qsv,
    ["h264", "hevc", "vp9", "mpeg2video", "vc1", "wmv3"].into_iter().collect(),
  );
  m.insert(
    Encoder::Videotoolbox,
    ["h264", "hevc", "mpeg2video", "mpeg4"].into_iter().collect(),
  );
  m
});

/// Whether `encoder`'s hardware decoder is known to support `source_codec`.
pub fn hw_decode_supported(encoder: Encoder, source_codec: &str) -> bool {
  HW_DECODE_SUPPORT
    .get(&encoder)
    .map(|set| set.contains(source_codec))
    .unwrap_or(false)
}

/// Enumerate every (encoder, decode_mode) pair that is structurally valid
/// for `encoder` (independent of availability/source-codec filtering, which
/// the scheduler applies when walking the matrix).
pub fn valid_decode_modes(encoder: Encoder) -> &'static [DecodeMode] {
  if encoder.is_hardware() {
    &[DecodeMode::HwDecode, DecodeMode::SwDecodeLimited, DecodeMode::SwDecode]
  } else {
    &[DecodeMode::SwDecodeLimited, DecodeMode::SwDecode]
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn cpu_has_no_hw_decode_mode() {
    assert_eq!(valid_decode_modes(Encoder::Cpu), &[DecodeMode::SwDecodeLimited, DecodeMode::SwDecode]);
  }

  #[test]
  fn nvenc_excludes_wmv3() {
    assert!(!hw_decode_supported(Encoder::Nvenc, "wmv3"));
    assert!(hw_decode_supported(Encoder::Qsv, "wmv3"));
  }

  #[test]
  fn attempt_key_label_is_encoder_colon_decode_mode() {
    let key = AttemptKey::new(Encoder::Nvenc, DecodeMode::HwDecode);
    assert_eq!(key.label(), "NVENC:HW_DECODE");
  }

  #[test]
  fn display_is_uppercase() {
    assert_eq!(Encoder::Nvenc.to_string(), "NVENC");
    assert_eq!(Encoder::Cpu.to_string(), "CPU");
  }
}
