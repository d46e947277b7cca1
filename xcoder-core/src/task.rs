//! A unit of work for one input file, and the terminal record it produces.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::encoder::{AttemptKey, DecodeMode, Encoder};
use crate::stream_plan::StreamPlan;

/// Hard cap on the number of attempts a single task may make before it is
/// force-terminated with `skipped=true`, preventing livelock.
pub const MAX_RETRIES: usize = 20;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone)]
pub struct FilePlan {
  pub input: PathBuf,
  pub output: PathBuf,
  pub tmp_output: PathBuf,
  pub target_bitrate_bps: u64,
}

impl FilePlan {
  /// The temp path is always `tmp_<basename>`, a sibling of the final path.
  pub fn tmp_path_for(output: &std::path::Path) -> PathBuf {
    let file_name = output.file_name().map(|n| format!("tmp_{}", n.to_string_lossy())).unwrap_or_else(|| "tmp_output".to_string());
    output.with_file_name(file_name)
  }
}

#[derive(Debug)]
pub struct Task {
  pub id: u64,
  pub input: PathBuf,
  pub plan: FilePlan,
  pub source_codec: String,
  pub stream_plan: StreamPlan,
  tried: HashSet<AttemptKey>,
  errors: Vec<String>,
  retries: usize,
}

impl Task {
  pub fn new(input: PathBuf, plan: FilePlan, source_codec: String) -> Self {
    Self::with_stream_plan(input, plan, source_codec, StreamPlan::default())
  }

  pub fn with_stream_plan(input: PathBuf, plan: FilePlan, source_codec: String, stream_plan: StreamPlan) -> Self {
    Self {
      id: NEXT_TASK_ID.fetch_add(1, Ordering::SeqCst),
      input,
      plan,
      source_codec,
      stream_plan,
      tried: HashSet::new(),
      errors: Vec::new(),
      retries: 0,
    }
  }

  pub fn retries(&self) -> usize {
    self.retries
  }

  pub fn has_tried(&self, key: &AttemptKey) -> bool {
    self.tried.contains(key)
  }

  pub fn tried_count(&self) -> usize {
    self.tried.len()
  }

  pub fn record_attempt(&mut self, key: AttemptKey, error: String) {
    self.tried.insert(key);
    self.errors.push(error);
    self.retries += 1;
  }

  /// Last three errors joined for an aggregated exhaustion summary.
  pub fn last_errors_summary(&self) -> String {
    let n = self.errors.len();
    let start = n.saturating_sub(3);
    self.errors[start..].join("; ")
  }

  pub fn retry_history(&self) -> Vec<String> {
    let n = self.errors.len();
    let start = n.saturating_sub(3);
    self.errors[start..].to_vec()
  }
}

#[derive(Debug, Clone, Default)]
pub struct Stats {
  pub original_size_bytes: u64,
  pub new_size_bytes: u64,
  pub original_bitrate_bps: u64,
  pub new_bitrate_bps: u64,
  pub method_label: String,
  pub elapsed: Option<Duration>,
  pub source_codec: String,
  pub output_codec: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
  TooSmall,
  AlreadyExists,
  Cancelled,
  Exhausted,
}

#[derive(Debug, Clone)]
pub struct TaskResult {
  pub task_id: u64,
  pub input: PathBuf,
  pub success: bool,
  pub skipped: Option<SkipReason>,
  pub encoder: Option<Encoder>,
  pub decode_mode: Option<DecodeMode>,
  pub error: Option<String>,
  pub history: Vec<String>,
  pub stats: Option<Stats>,
}

impl TaskResult {
  pub fn success(task: &Task, encoder: Encoder, decode_mode: DecodeMode, history: Vec<String>, stats: Stats) -> Self {
    Self {
      task_id: task.id,
      input: task.input.clone(),
      success: true,
      skipped: None,
      encoder: Some(encoder),
      decode_mode: Some(decode_mode),
      error: None,
      history,
      stats: Some(stats),
    }
  }

  pub fn skipped(task: &Task, reason: SkipReason, error: impl Into<String>) -> Self {
    Self {
      task_id: task.id,
      input: task.input.clone(),
      success: false,
      skipped: Some(reason),
      encoder: None,
      decode_mode: None,
      error: Some(error.into()),
      history: task.retry_history(),
      stats: None,
    }
  }

  pub fn failed(task: &Task, error: impl Into<String>) -> Self {
    Self {
      task_id: task.id,
      input: task.input.clone(),
      success: false,
      skipped: None,
      encoder: None,
      decode_mode: None,
      error: Some(error.into()),
      history: task.retry_history(),
      stats: None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn tmp_path_is_sibling_with_prefix() {
    let out = PathBuf::from("/videos/out/movie.mp4");
    let tmp = FilePlan::tmp_path_for(&out);
    assert_eq!(tmp, PathBuf::from("/videos/out/tmp_movie.mp4"));
  }

  #[test]
  fn last_errors_summary_keeps_at_most_three() {
    let plan = FilePlan { input: "in".into(), output: "out".into(), tmp_output: "tmp".into(), target_bitrate_bps: 1 };
    let mut task = Task::new("in".into(), plan, "h264".into());
    for i in 0..5 {
      task.record_attempt(AttemptKey::new(Encoder::Nvenc, DecodeMode::HwDecode), format!("err{}", i));
    }
    assert_eq!(task.last_errors_summary(), "err2; err3; err4");
    assert_eq!(task.retries(), 5);
  }
}
