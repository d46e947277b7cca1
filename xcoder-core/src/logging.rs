//! Logging setup: `log` facade + `flexi_logger`, combining a colored
//! console sink with a plain file sink.

use std::path::Path;

use ansi_term::{Color, Style};
use flexi_logger::writers::LogWriter;
use flexi_logger::{FileSpec, Level, LogSpecBuilder, Logger};
use path_abs::PathAbs;

use crate::error::Error;
use crate::progress_bar;

/// Writes to stderr with severity-coloured output, routed through the
/// active progress bar (if any) so a log line never corrupts its redraw.
pub struct ConsoleWriter {
  pub level: Level,
}

impl LogWriter for ConsoleWriter {
  fn write(&self, _now: &mut flexi_logger::DeferredNow, record: &flexi_logger::Record) -> std::io::Result<()> {
    if record.level() > self.level {
      return Ok(());
    }

    let style = match record.level() {
      Level::Error => Style::default().fg(Color::Fixed(196)).bold(),
      Level::Warn => Style::default().fg(Color::Fixed(208)).bold(),
      Level::Info => Style::default().dimmed(),
      _ => Style::default(),
    };

    let line = format!("{} [{}] {}", style.paint(record.level().to_string()), record.module_path().unwrap_or("<unnamed>"), record.args());

    if let Some(pb) = progress_bar::active() {
      pb.println(line);
    } else {
      eprintln!("{}", line);
    }

    Ok(())
  }

  fn flush(&self) -> std::io::Result<()> {
    Ok(())
  }
}

/// Starts the global logger: everything at `file_level` or above goes to
/// `log_file`, while only `console_level` or above is echoed to the
/// terminal. `RUST_LOG`-style fine-grained module filters can still be
/// layered on top via `flexi_logger`'s own env parsing if ever needed; the
/// scheduler's own log lines are the ones worth tuning that way.
pub fn init(log_file: &Path, file_level: flexi_logger::LevelFilter, console_level: Level) -> Result<(), Error> {
  let spec = LogSpecBuilder::new().default(file_level).build();
  let abs_log_file = PathAbs::new(log_file).map_err(|e| Error::InvalidConfig(format!("invalid log file path {:?}: {}", log_file, e)))?;
  let file_spec = FileSpec::try_from(abs_log_file).map_err(|e| Error::InvalidConfig(format!("invalid log file spec: {}", e)))?;
  Logger::with(spec)
    .log_to_file_and_writer(file_spec, Box::new(ConsoleWriter { level: console_level }))
    .start()
    .map_err(|e| Error::InvalidConfig(format!("failed to start logger: {}", e)))?;
  Ok(())
}

/// Every task-level log line should go through this so the task's identity
/// is always present.
pub fn task_context(task_id: u64, input: &Path, encoder: Option<crate::encoder::Encoder>, decode_mode: Option<crate::encoder::DecodeMode>) -> String {
  match (encoder, decode_mode) {
    (Some(e), Some(d)) => format!("task={} input={:?} encoder={} decode_mode={}", task_id, input, e, d),
    _ => format!("task={} input={:?}", task_id, input),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::encoder::{DecodeMode, Encoder};
  use std::path::PathBuf;

  #[test]
  fn task_context_includes_attempt_identity_when_known() {
    let ctx = task_context(7, &PathBuf::from("movie.mkv"), Some(Encoder::Nvenc), Some(DecodeMode::HwDecode));
    assert!(ctx.contains("task=7"));
    assert!(ctx.contains("NVENC"));
    assert!(ctx.contains("HW_DECODE"));
  }

  #[test]
  fn task_context_degrades_gracefully_before_an_attempt_is_chosen() {
    let ctx = task_context(7, &PathBuf::from("movie.mkv"), None, None);
    assert_eq!(ctx, "task=7 input=\"movie.mkv\"");
  }
}
