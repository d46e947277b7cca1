//! A process-wide progress display the batch runner drives and the console
//! logger consults, so a log line printed mid-run doesn't tear the bar in
//! two.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use once_cell::sync::Lazy;

const TEMPLATE: &str = "{spinner} [{elapsed_precise}] [{wide_bar}] {pos}/{len} files ({per_sec}/s, eta {eta})";

static PROGRESS_BAR: Lazy<ProgressBar> = Lazy::new(|| {
  let pb = ProgressBar::hidden();
  pb.set_style(ProgressStyle::default_bar().template(TEMPLATE).progress_chars("#>-"));
  pb.set_draw_target(ProgressDrawTarget::stderr());
  pb
});

/// Resets and shows the bar for a run of `total_files` tasks.
pub fn init(total_files: u64) {
  PROGRESS_BAR.reset_elapsed();
  PROGRESS_BAR.reset_eta();
  PROGRESS_BAR.set_position(0);
  PROGRESS_BAR.set_length(total_files);
  PROGRESS_BAR.reset();
  PROGRESS_BAR.set_draw_target(ProgressDrawTarget::stderr());
}

pub fn inc(n: u64) {
  PROGRESS_BAR.inc(n);
}

pub fn finish() {
  PROGRESS_BAR.finish_and_clear();
}

/// Returns the live bar if one has been initialised and is still drawing,
/// so the console logger can print above it without corrupting the line.
pub fn active() -> Option<ProgressBar> {
  if PROGRESS_BAR.is_hidden() {
    None
  } else {
    Some(PROGRESS_BAR.clone())
  }
}
