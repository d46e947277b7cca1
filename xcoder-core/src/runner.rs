//! Batch Runner: turns a configured directory tree into a queue of
//! [`Task`]s and drives them through a fixed-size worker pool — a channel
//! feeding `crossbeam_utils` scoped threads.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use crate::config::Config;
use crate::discovery::{cleanup_orphaned_tmp_files, discover_video_files, resolve_output_path};
use crate::encoder::Encoder;
use crate::error::Error;
use crate::ffprobe::{probe_codec, probe_source, probe_streams};
use crate::planner::plan_bitrate;
use crate::progress_bar;
use crate::scheduler::{AttemptLauncher, ProcessLauncher, Scheduler};
use crate::stream_plan::build_stream_plan;
use crate::task::{FilePlan, SkipReason, Task, TaskResult};

/// Aggregate outcome of one batch run, printed as the final summary.
#[derive(Debug, Default)]
pub struct RunSummary {
  pub total: usize,
  pub succeeded: usize,
  pub skipped_too_small: usize,
  pub skipped_existing: usize,
  pub cancelled: usize,
  pub exhausted: usize,
  pub failed: usize,
  pub by_encoder: HashMap<Encoder, usize>,
  pub results: Vec<TaskResult>,
}

impl RunSummary {
  fn record(&mut self, result: TaskResult) {
    self.total += 1;
    if result.success {
      self.succeeded += 1;
      if let Some(encoder) = result.encoder {
        *self.by_encoder.entry(encoder).or_insert(0) += 1;
      }
    } else {
      match result.skipped {
        Some(SkipReason::TooSmall) => self.skipped_too_small += 1,
        Some(SkipReason::AlreadyExists) => self.skipped_existing += 1,
        Some(SkipReason::Cancelled) => self.cancelled += 1,
        Some(SkipReason::Exhausted) => self.exhausted += 1,
        None => self.failed += 1,
      }
    }
    self.results.push(result);
  }
}

fn build_task(input: PathBuf, config: &Config) -> Task {
  let output = resolve_output_path(&input, &config.input_root(), &config.output_root(), config.files.keep_structure);
  let tmp_output = FilePlan::tmp_path_for(&output);
  let meta = probe_source(&input);
  let source_codec = probe_codec(&input);
  let target_bitrate_bps = plan_bitrate(&meta, &config.encoding.bitrate);
  let (audio_streams, subtitle_streams) = probe_streams(&input);
  let stream_plan = build_stream_plan(
    &audio_streams,
    &subtitle_streams,
    &config.streams.preferred_audio_languages,
    &config.streams.allowed_subtitle_languages,
  );
  let plan = FilePlan { input: input.clone(), output, tmp_output, target_bitrate_bps };
  Task::with_stream_plan(input, plan, source_codec, stream_plan)
}

fn too_small(input: &std::path::Path, min_size_mb: u64) -> bool {
  std::fs::metadata(input).map(|m| m.len() < min_size_mb * 1024 * 1024).unwrap_or(false)
}

/// Runs every discovered file in `config.paths.input` to completion,
/// returning the aggregate summary. `available` is the set of encoders the
/// startup probe found usable on this host.
pub fn run_batch(config: &Config, available: HashSet<Encoder>, workers: usize) -> Result<RunSummary, Error> {
  crate::create_dir!(config.output_root())?;
  let removed = cleanup_orphaned_tmp_files(&config.output_root());
  if removed > 0 {
    log::info!("removed {} orphaned temp file(s) from a previous run", removed);
  }

  let inputs = discover_video_files(&config.input_root());
  log::info!("discovered {} candidate file(s) under {:?}", inputs.len(), config.input_root());

  let scheduler = Scheduler::new(&config.encoders, &available, &config.scheduler);
  let launcher = ProcessLauncher;

  let mut summary = RunSummary::default();
  progress_bar::init(inputs.len() as u64);

  let (task_tx, task_rx) = crossbeam_channel::unbounded::<Task>();
  for input in inputs {
    if too_small(&input, config.files.min_size_mb) {
      let plan = FilePlan { input: input.clone(), output: PathBuf::new(), tmp_output: PathBuf::new(), target_bitrate_bps: 0 };
      let task = Task::new(input, plan, String::new());
      summary.record(TaskResult::skipped(&task, SkipReason::TooSmall, "below configured minimum size".to_string()));
      progress_bar::inc(1);
      continue;
    }
    let output = resolve_output_path(&input, &config.input_root(), &config.output_root(), config.files.keep_structure);
    if config.files.skip_existing && output.exists() {
      let plan = FilePlan { input: input.clone(), output, tmp_output: PathBuf::new(), target_bitrate_bps: 0 };
      let task = Task::new(input, plan, String::new());
      summary.record(TaskResult::skipped(&task, SkipReason::AlreadyExists, "output already exists".to_string()));
      progress_bar::inc(1);
      continue;
    }
    task_tx.send(build_task(input, config)).expect("receiver outlives senders for the duration of this scope");
  }
  drop(task_tx);

  let (result_tx, result_rx) = crossbeam_channel::unbounded::<TaskResult>();
  let worker_count = workers.max(1);

  crossbeam_utils::thread::scope(|scope| {
    for _ in 0..worker_count {
      let task_rx = task_rx.clone();
      let result_tx = result_tx.clone();
      let scheduler = &scheduler;
      let launcher: &dyn AttemptLauncher = &launcher;
      scope.spawn(move |_| {
        while let Ok(mut task) = task_rx.recv() {
          log::info!("{}", crate::logging::task_context(task.id, &task.input, None, None));
          let result = scheduler.run_task(&mut task, config.encoding.codec, effective_fps_cap(config), launcher);
          progress_bar::inc(1);
          let _ = result_tx.send(result);
        }
      });
    }
    drop(result_tx);
    for result in result_rx.iter() {
      summary.record(result);
    }
  })
  .expect("worker pool thread scope panicked");

  progress_bar::finish();
  Ok(summary)
}

fn effective_fps_cap(config: &Config) -> u32 {
  config.fps.max
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn summary_buckets_results_by_outcome() {
    let mut summary = RunSummary::default();
    let plan = FilePlan { input: "a".into(), output: "b".into(), tmp_output: "c".into(), target_bitrate_bps: 1 };
    let task = Task::new("a".into(), plan, "h264".into());
    summary.record(TaskResult::skipped(&task, SkipReason::TooSmall, "x".to_string()));
    summary.record(TaskResult::skipped(&task, SkipReason::AlreadyExists, "x".to_string()));
    assert_eq!(summary.total, 2);
    assert_eq!(summary.skipped_too_small, 1);
    assert_eq!(summary.skipped_existing, 1);
    assert_eq!(summary.succeeded, 0);
  }
}
