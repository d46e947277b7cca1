//! Configuration surface and its three-tier layering: built-in
//! defaults, deep-merged with an optional TOML file, deep-merged again with
//! CLI overrides. Mirrors the precedence confirmed by the reference
//! implementation's loader: CLI > file > defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::encoder::Codec;
use crate::error::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Paths {
  pub input: String,
  pub output: String,
  pub log: String,
}

impl Default for Paths {
  fn default() -> Self {
    Self { input: String::new(), output: String::new(), log: "xcoder.log".to_string() }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BitrateConfig {
  /// 0 means "auto".
  pub forced: u64,
  pub ratio: f64,
  pub min: u64,
  pub max_by_resolution: BTreeMap<u32, u64>,
}

impl Default for BitrateConfig {
  fn default() -> Self {
    let mut max_by_resolution = BTreeMap::new();
    max_by_resolution.insert(720, 1_500_000);
    max_by_resolution.insert(1080, 3_000_000);
    max_by_resolution.insert(1440, 5_000_000);
    max_by_resolution.insert(2160, 9_000_000);
    Self { forced: 0, ratio: 0.5, min: 500_000, max_by_resolution }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingConfig {
  pub codec: Codec,
  pub bitrate: BitrateConfig,
}

impl Default for EncodingConfig {
  fn default() -> Self {
    Self { codec: Codec::Hevc, bitrate: BitrateConfig::default() }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FpsConfig {
  pub max: u32,
  pub limit_on_software_decode: bool,
  pub limit_on_software_encode: bool,
}

impl Default for FpsConfig {
  fn default() -> Self {
    Self { max: 30, limit_on_software_decode: true, limit_on_software_encode: false }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
  pub enabled: bool,
  pub max_concurrent: usize,
  /// Only meaningful for the `cpu` encoder.
  pub preset: String,
}

impl Default for EncoderConfig {
  fn default() -> Self {
    Self { enabled: false, max_concurrent: 1, preset: "medium".to_string() }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodersConfig {
  pub nvenc: EncoderConfig,
  pub qsv: EncoderConfig,
  pub videotoolbox: EncoderConfig,
  pub cpu: EncoderConfig,
}

impl Default for EncodersConfig {
  fn default() -> Self {
    Self {
      nvenc: EncoderConfig { enabled: true, max_concurrent: 2, ..EncoderConfig::default() },
      qsv: EncoderConfig { enabled: true, max_concurrent: 2, ..EncoderConfig::default() },
      videotoolbox: EncoderConfig { enabled: true, max_concurrent: 2, ..EncoderConfig::default() },
      cpu: EncoderConfig { enabled: true, max_concurrent: 1, preset: "medium".to_string(), ..EncoderConfig::default() },
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
  pub max_total_concurrent: usize,
}

impl Default for SchedulerConfig {
  fn default() -> Self {
    Self { max_total_concurrent: 5 }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesConfig {
  pub min_size_mb: u64,
  pub keep_structure: bool,
  pub skip_existing: bool,
}

impl Default for FilesConfig {
  fn default() -> Self {
    Self { min_size_mb: 1, keep_structure: true, skip_existing: true }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamsConfig {
  /// Preferred audio track languages, most-preferred first. Empty means
  /// keep every audio track.
  pub preferred_audio_languages: Vec<String>,
  /// Subtitle track languages to keep. Empty means keep every subtitle track.
  pub allowed_subtitle_languages: Vec<String>,
}

impl Default for StreamsConfig {
  fn default() -> Self {
    Self { preferred_audio_languages: Vec::new(), allowed_subtitle_languages: Vec::new() }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
  pub paths: Paths,
  pub encoding: EncodingConfig,
  pub fps: FpsConfig,
  pub encoders: EncodersConfig,
  pub scheduler: SchedulerConfig,
  pub files: FilesConfig,
  pub streams: StreamsConfig,
}

impl Config {
  /// Loads built-in defaults, then deep-merges an optional TOML file over
  /// them. Unknown keys in the file are ignored.
  pub fn load(config_file: Option<&Path>) -> Result<Self, Error> {
    let mut config = Config::default();
    if let Some(path) = config_file {
      if path.exists() {
        let text = std::fs::read_to_string(path)?;
        let from_file: Config = toml::from_str(&text)?;
        config = deep_merge(config, from_file);
      }
    }
    Ok(config)
  }

  pub fn validate(&self) -> Result<(), Error> {
    if self.paths.input.is_empty() || self.paths.output.is_empty() {
      return Err(Error::InvalidConfig("paths.input and paths.output are required".to_string()));
    }
    if !(0.0..=1.0).contains(&self.encoding.bitrate.ratio) || self.encoding.bitrate.ratio <= 0.0 {
      return Err(Error::InvalidConfig("encoding.bitrate.ratio must be in (0, 1]".to_string()));
    }
    if self.scheduler.max_total_concurrent == 0 {
      return Err(Error::InvalidConfig("scheduler.max_total_concurrent must be positive".to_string()));
    }
    let any_enabled = [
      self.encoders.nvenc.enabled,
      self.encoders.qsv.enabled,
      self.encoders.videotoolbox.enabled,
      self.encoders.cpu.enabled,
    ]
    .into_iter()
    .any(|e| e);
    if !any_enabled {
      return Err(Error::NoEncodersEnabled);
    }
    Ok(())
  }

  pub fn input_root(&self) -> PathBuf {
    PathBuf::from(&self.paths.input)
  }

  pub fn output_root(&self) -> PathBuf {
    PathBuf::from(&self.paths.output)
  }
}

/// Field-by-field override: `file` values win over `base` defaults only
/// where `file` actually differs from *its own* default, approximating the
/// reference loader's recursive-dict merge without needing every field to
/// be independently `Option`-wrapped.
fn deep_merge(base: Config, file: Config) -> Config {
  let default_file = Config::default();
  Config {
    paths: merge_paths(base.paths, file.paths, &default_file.paths),
    encoding: merge_encoding(base.encoding, file.encoding, &default_file.encoding),
    fps: if toml_eq(&file.fps, &default_file.fps) { base.fps } else { file.fps },
    encoders: merge_encoders(base.encoders, file.encoders, &default_file.encoders),
    scheduler: if toml_eq(&file.scheduler, &default_file.scheduler) { base.scheduler } else { file.scheduler },
    files: if toml_eq(&file.files, &default_file.files) { base.files } else { file.files },
    streams: if toml_eq(&file.streams, &default_file.streams) { base.streams } else { file.streams },
  }
}

fn merge_paths(base: Paths, file: Paths, default: &Paths) -> Paths {
  Paths {
    input: if file.input == default.input { base.input } else { file.input },
    output: if file.output == default.output { base.output } else { file.output },
    log: if file.log == default.log { base.log } else { file.log },
  }
}

fn merge_encoding(base: EncodingConfig, file: EncodingConfig, default: &EncodingConfig) -> EncodingConfig {
  EncodingConfig {
    codec: if file.codec == default.codec { base.codec } else { file.codec },
    bitrate: if toml_eq(&file.bitrate, &default.bitrate) { base.bitrate } else { file.bitrate },
  }
}

fn merge_one_encoder(base: EncoderConfig, file: EncoderConfig, default: &EncoderConfig) -> EncoderConfig {
  if toml_eq(&file, default) {
    base
  } else {
    file
  }
}

fn merge_encoders(base: EncodersConfig, file: EncodersConfig, default: &EncodersConfig) -> EncodersConfig {
  EncodersConfig {
    nvenc: merge_one_encoder(base.nvenc, file.nvenc, &default.nvenc),
    qsv: merge_one_encoder(base.qsv, file.qsv, &default.qsv),
    videotoolbox: merge_one_encoder(base.videotoolbox, file.videotoolbox, &default.videotoolbox),
    cpu: merge_one_encoder(base.cpu, file.cpu, &default.cpu),
  }
}

fn toml_eq<T: Serialize>(a: &T, b: &T) -> bool {
  match (toml::Value::try_from(a), toml::Value::try_from(b)) {
    (Ok(a), Ok(b)) => a == b,
    _ => false,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_are_invalid_until_paths_set() {
    let config = Config::default();
    assert!(config.validate().is_err());
  }

  #[test]
  fn load_with_no_file_returns_defaults() {
    let config = Config::load(None).unwrap();
    assert_eq!(config.scheduler.max_total_concurrent, 5);
  }

  #[test]
  fn load_merges_file_over_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
      &path,
      r#"
      [paths]
      input = "/in"
      output = "/out"

      [scheduler]
      max_total_concurrent = 8
      "#,
    )
    .unwrap();
    let config = Config::load(Some(&path)).unwrap();
    assert_eq!(config.paths.input, "/in");
    assert_eq!(config.scheduler.max_total_concurrent, 8);
    // untouched sections keep their defaults
    assert_eq!(config.encoding.bitrate.ratio, 0.5);
  }
}
