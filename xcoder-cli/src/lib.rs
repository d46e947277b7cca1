use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{AppSettings, Parser};
use flexi_logger::{Level, LevelFilter};
use once_cell::sync::OnceCell;

use xcoder_core::config::Config;
use xcoder_core::encoder::{Codec, Encoder};
use xcoder_core::probe::detect_available_encoders;
use xcoder_core::runner::run_batch;
use xcoder_core::{logging, signal, Verbosity};

fn version() -> &'static str {
  static INSTANCE: OnceCell<String> = OnceCell::new();
  INSTANCE.get_or_init(|| env!("CARGO_PKG_VERSION").to_string())
}

fn positive_usize(value: &str) -> Result<(), String> {
  match value.parse::<usize>() {
    Ok(0) => Err("must be greater than 0".to_string()),
    Ok(_) => Ok(()),
    Err(e) => Err(e.to_string()),
  }
}

fn zero_or_positive_usize(value: &str) -> Result<(), String> {
  match value.parse::<usize>() {
    Ok(_) => Ok(()),
    Err(e) => Err(e.to_string()),
  }
}

/// Cross-platform batch video transcoder with multi-hardware-encoder fallback scheduling
#[derive(Parser, Debug)]
#[clap(name = "xcoder", version = version(), setting = AppSettings::DeriveDisplayOrder)]
pub struct CliOpts {
  /// Directory of source video files to transcode
  #[clap(short, long, parse(from_os_str))]
  pub input: PathBuf,

  /// Directory to write transcoded output into
  #[clap(short, long, parse(from_os_str))]
  pub output: PathBuf,

  /// Optional TOML configuration file; CLI flags override its values
  #[clap(short, long, parse(from_os_str))]
  pub config: Option<PathBuf>,

  /// Output video codec
  #[clap(long, default_value = "hevc", possible_values = &["hevc", "avc", "av1"])]
  pub codec: String,

  /// Disable printing progress to the terminal
  #[clap(short, long, conflicts_with = "verbose")]
  pub quiet: bool,

  /// Print extra progress info to the terminal
  #[clap(long)]
  pub verbose: bool,

  /// Log file location
  #[clap(long, default_value = "xcoder.log")]
  pub log_file: PathBuf,

  /// Log level for the log file (does not affect terminal verbosity)
  #[clap(long, default_value_t = LevelFilter::Info, ignore_case = true, possible_values = &["error", "warn", "info", "debug", "trace"])]
  pub log_level: LevelFilter,

  /// Number of files to process concurrently [0 = use scheduler.max_total_concurrent]
  #[clap(short, long, default_value_t = 0, validator = zero_or_positive_usize)]
  pub workers: usize,

  /// Mirror the input directory's subdirectory structure under the output directory
  #[clap(long)]
  pub keep_structure: bool,

  /// Skip files whose resolved output already exists
  #[clap(long)]
  pub skip_existing: bool,

  /// Minimum source file size, in megabytes, below which a file is skipped entirely
  #[clap(long)]
  pub min_size_mb: Option<u64>,

  /// Force every file to this exact target video bitrate, in bits per second (0 = auto)
  #[clap(long)]
  pub forced_bitrate_bps: Option<u64>,

  /// Maximum number of files transcoded across all encoders at once
  #[clap(long, validator = positive_usize)]
  pub max_total_concurrent: Option<usize>,
}

fn build_config(cli: &CliOpts) -> anyhow::Result<Config> {
  let mut config = Config::load(cli.config.as_deref()).context("failed to load configuration file")?;

  config.paths.input = cli.input.to_string_lossy().into_owned();
  config.paths.output = cli.output.to_string_lossy().into_owned();
  config.paths.log = cli.log_file.to_string_lossy().into_owned();

  config.encoding.codec = cli.codec.parse::<Codec>().map_err(|_| anyhow::anyhow!("invalid --codec value {:?}", cli.codec))?;

  if cli.keep_structure {
    config.files.keep_structure = true;
  }
  if cli.skip_existing {
    config.files.skip_existing = true;
  }
  if let Some(min_size_mb) = cli.min_size_mb {
    config.files.min_size_mb = min_size_mb;
  }
  if let Some(forced) = cli.forced_bitrate_bps {
    config.encoding.bitrate.forced = forced;
  }
  if let Some(max_total_concurrent) = cli.max_total_concurrent {
    config.scheduler.max_total_concurrent = max_total_concurrent;
  }

  config.validate().context("configuration is invalid")?;
  Ok(config)
}

fn verbosity(cli: &CliOpts) -> Verbosity {
  if cli.quiet {
    Verbosity::Quiet
  } else if cli.verbose {
    Verbosity::Verbose
  } else {
    Verbosity::Normal
  }
}

fn console_level(verbosity: Verbosity) -> Level {
  match verbosity {
    Verbosity::Normal | Verbosity::Quiet => Level::Warn,
    Verbosity::Verbose => Level::Info,
  }
}

pub fn run() -> anyhow::Result<()> {
  let cli = CliOpts::parse();
  let config = build_config(&cli)?;

  logging::init(&PathBuf::from(&config.paths.log), cli.log_level, console_level(verbosity(&cli)))?;

  signal::install().context("failed to install the interrupt handler")?;

  log::info!("probing available encoders");
  let probed = detect_available_encoders(config.encoding.codec);
  let mut available: HashSet<Encoder> = HashSet::new();
  for (encoder, result) in &probed {
    if result.available {
      available.insert(*encoder);
    } else if let Some(reason) = &result.reason {
      log::warn!("{} unavailable: {}", encoder, reason);
    }
  }
  if available.is_empty() {
    bail!("no encoders are available on this host after probing; nothing to do");
  }

  let workers = if cli.workers == 0 { config.scheduler.max_total_concurrent } else { cli.workers };

  let summary = run_batch(&config, available, workers)?;

  log::info!(
    "done: {} succeeded, {} skipped (too small), {} skipped (already exists), {} exhausted, {} failed, {} cancelled out of {} total",
    summary.succeeded,
    summary.skipped_too_small,
    summary.skipped_existing,
    summary.exhausted,
    summary.failed,
    summary.cancelled,
    summary.total,
  );
  for (encoder, count) in &summary.by_encoder {
    log::info!("  {}: {} file(s)", encoder, count);
  }

  if summary.cancelled > 0 {
    std::process::exit(signal::CANCELLED_EXIT_CODE);
  }
  if summary.failed > 0 {
    std::process::exit(1);
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn base_cli() -> CliOpts {
    CliOpts {
      input: PathBuf::from("/in"),
      output: PathBuf::from("/out"),
      config: None,
      codec: "hevc".to_string(),
      quiet: false,
      verbose: false,
      log_file: PathBuf::from("xcoder.log"),
      log_level: LevelFilter::Info,
      workers: 0,
      keep_structure: false,
      skip_existing: false,
      min_size_mb: None,
      forced_bitrate_bps: None,
      max_total_concurrent: None,
    }
  }

  #[test]
  fn build_config_binds_required_paths() {
    let cli = base_cli();
    let config = build_config(&cli).unwrap();
    assert_eq!(config.paths.input, "/in");
    assert_eq!(config.paths.output, "/out");
  }

  #[test]
  fn cli_overrides_win_over_file_defaults() {
    let mut cli = base_cli();
    cli.max_total_concurrent = Some(9);
    cli.forced_bitrate_bps = Some(4_000_000);
    let config = build_config(&cli).unwrap();
    assert_eq!(config.scheduler.max_total_concurrent, 9);
    assert_eq!(config.encoding.bitrate.forced, 4_000_000);
  }

  #[test]
  fn invalid_codec_is_rejected() {
    let mut cli = base_cli();
    cli.codec = "not-a-codec".to_string();
    assert!(build_config(&cli).is_err());
  }

  #[test]
  fn verbosity_maps_quiet_and_verbose_flags() {
    let mut cli = base_cli();
    cli.verbose = true;
    assert_eq!(verbosity(&cli), Verbosity::Verbose);
    cli.verbose = false;
    cli.quiet = true;
    assert_eq!(verbosity(&cli), Verbosity::Quiet);
  }
}
