//! The multi-encoder fallback scheduler — the heart of the crate.
//!
//! Walks the attempt matrix for one [`Task`] at a time: hardware encoders in
//! priority order, each through its three decode modes, then the CPU
//! fallback through its two. Every attempt is gated by two permits (a
//! global concurrency cap and the specific encoder's slot) so the matrix
//! walk never oversubscribes either.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crate::command::build_command;
use crate::config::{EncodersConfig, SchedulerConfig};
use crate::encoder::{AttemptKey, Codec, DecodeMode, Encoder};
use crate::process_registry::ProcessRegistry;
use crate::slot::EncoderSlot;
use crate::sync::Semaphore;
use crate::task::{SkipReason, Stats, Task, TaskResult};

/// How long an attempt waits for a free global or encoder-specific permit
/// before giving up on that attempt and trying the next matrix entry.
const SLOT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs one attempt's external tool and reports whether it succeeded. The
/// real implementation shells out to ffmpeg through the Process Registry;
/// tests substitute a scripted fake so the matrix walk can be exercised
/// without a host ffmpeg binary.
pub trait AttemptLauncher: Send + Sync {
  fn launch(&self, argv: &[String]) -> Result<bool, String>;
}

pub struct ProcessLauncher;

impl AttemptLauncher for ProcessLauncher {
  fn launch(&self, argv: &[String]) -> Result<bool, String> {
    let mut command = Command::new("ffmpeg");
    command.args(argv).stdout(Stdio::null()).stderr(Stdio::piped());
    let handle = ProcessRegistry::global().spawn(command).map_err(|e| e.to_string())?;
    match ProcessRegistry::global().wait(handle) {
      Some(status) => Ok(status.success()),
      None => Err("child vanished from the process registry before it could be waited on".to_string()),
    }
  }
}

/// The live concurrency state the matrix walker acquires permits from: one
/// global cap plus one per-encoder slot.
pub struct Scheduler {
  slots: HashMap<Encoder, EncoderSlot>,
  global: Semaphore,
  order: Vec<Encoder>,
  cpu_enabled: bool,
}

impl Scheduler {
  /// Builds the scheduler's concurrency state from the encoders config and
  /// the set of encoders the startup probe found available. Disabled or
  /// unavailable encoders get no slot and are skipped by the attempt order.
  pub fn new(encoders: &EncodersConfig, available: &HashSet<Encoder>, scheduler: &SchedulerConfig) -> Self {
    let mut slots = HashMap::new();
    let mut order = Vec::new();
    let mut cpu_enabled = false;

    for &encoder in Encoder::HARDWARE_PRIORITY.iter() {
      let cfg = encoder_config(encoders, encoder);
      if cfg.enabled && available.contains(&encoder) {
        slots.insert(encoder, EncoderSlot::new(encoder, cfg.max_concurrent.max(1)));
        order.push(encoder);
      }
    }
    if encoders.cpu.enabled && available.contains(&Encoder::Cpu) {
      slots.insert(Encoder::Cpu, EncoderSlot::new(Encoder::Cpu, encoders.cpu.max_concurrent.max(1)));
      cpu_enabled = true;
    }

    Self { slots, global: Semaphore::new(scheduler.max_total_concurrent.max(1)), order, cpu_enabled }
  }

  /// The full attempt-key sequence a fresh task would walk, independent of
  /// what has already been tried. Exposed for diagnostics and tests.
  pub fn attempt_sequence(&self, source_codec: &str) -> Vec<AttemptKey> {
    let mut keys = Vec::new();
    for &encoder in &self.order {
      for &mode in crate::encoder::valid_decode_modes(encoder) {
        if mode == DecodeMode::HwDecode && !crate::encoder::hw_decode_supported(encoder, source_codec) {
          continue;
        }
        keys.push(AttemptKey::new(encoder, mode));
      }
    }
    if self.cpu_enabled {
      for &mode in crate::encoder::valid_decode_modes(Encoder::Cpu) {
        keys.push(AttemptKey::new(Encoder::Cpu, mode));
      }
    }
    keys
  }

  fn next_untried(&self, task: &Task) -> Option<AttemptKey> {
    self.attempt_sequence(&task.source_codec).into_iter().find(|key| !task.has_tried(key))
  }

  /// Runs `task` to completion: succeeds, exhausts its matrix, or is
  /// cancelled by a shutdown in progress. Never panics on an attempt
  /// failure — every failure is recorded on the task and the walk
  /// continues to the next matrix entry.
  pub fn run_task(&self, task: &mut Task, codec: Codec, fps_cap: u32, launcher: &dyn AttemptLauncher) -> TaskResult {
    loop {
      if task.retries() >= crate::task::MAX_RETRIES {
        return TaskResult::skipped(task, SkipReason::Exhausted, task.last_errors_summary());
      }
      if ProcessRegistry::global().is_shutting_down() {
        return TaskResult::skipped(task, SkipReason::Cancelled, "shutdown requested".to_string());
      }

      let Some(key) = self.next_untried(task) else {
        return TaskResult::skipped(task, SkipReason::Exhausted, task.last_errors_summary());
      };

      let should_abort = || ProcessRegistry::global().is_shutting_down();

      if !self.global.acquire_timeout(SLOT_ACQUIRE_TIMEOUT, should_abort) {
        if should_abort() {
          return TaskResult::skipped(task, SkipReason::Cancelled, "shutdown requested".to_string());
        }
        task.record_attempt(key, "timed out waiting for a global concurrency permit".to_string());
        continue;
      }

      let Some(slot) = self.slots.get(&key.encoder) else {
        self.global.release();
        task.record_attempt(key, format!("{} has no configured slot", key.encoder));
        continue;
      };
      let Some(guard) = slot.try_acquire(SLOT_ACQUIRE_TIMEOUT, should_abort) else {
        self.global.release();
        if should_abort() {
          return TaskResult::skipped(task, SkipReason::Cancelled, "shutdown requested".to_string());
        }
        task.record_attempt(key, format!("timed out waiting for a free {} slot", key.encoder));
        continue;
      };

      // Idempotence re-check: another run (or a prior attempt of this very
      // task, should the walker ever be re-entered) may have already
      // produced the final output while this attempt was queued.
      if task.plan.output.exists() {
        guard.release(true);
        self.global.release();
        return TaskResult::skipped(task, SkipReason::AlreadyExists, "output appeared while queued".to_string());
      }

      let Some(built) = build_command(
        &task.input,
        &task.plan.tmp_output,
        task.plan.target_bitrate_bps,
        &task.source_codec,
        codec,
        key,
        fps_cap,
        &task.stream_plan,
      ) else {
        guard.release(false);
        self.global.release();
        task.record_attempt(key, format!("{} cannot decode source codec {:?}", key.encoder, task.source_codec));
        continue;
      };

      let start = Instant::now();
      let outcome = launcher.launch(&built.argv);
      let elapsed = start.elapsed();

      match outcome {
        Ok(true) => {
          guard.release(true);
          self.global.release();
          if let Err(e) = finalize_output(&task.plan.tmp_output, &task.plan.output) {
            return TaskResult::failed(task, format!("encode succeeded but finalising the output failed: {}", e));
          }
          let original_size_bytes = file_size(&task.input);
          let new_size_bytes = file_size(&task.plan.output);
          log::info!(
            "{:?} -> {} ({} -> {}) via {}",
            task.input,
            task.plan.output.display(),
            crate::util::human_bytes(original_size_bytes),
            crate::util::human_bytes(new_size_bytes),
            built.label,
          );
          let stats = Stats {
            original_size_bytes,
            new_size_bytes,
            original_bitrate_bps: 0,
            new_bitrate_bps: task.plan.target_bitrate_bps,
            method_label: built.label,
            elapsed: Some(elapsed),
            source_codec: task.source_codec.clone(),
            output_codec: format!("{:?}", codec),
          };
          let history = task.retry_history();
          return TaskResult::success(task, key.encoder, key.decode_mode, history, stats);
        }
        Ok(false) => {
          guard.release(false);
          self.global.release();
          let _ = fs::remove_file(&task.plan.tmp_output);
          task.record_attempt(key, format!("{} exited with a non-zero status", built.label));
        }
        Err(e) => {
          guard.release(false);
          self.global.release();
          let _ = fs::remove_file(&task.plan.tmp_output);
          task.record_attempt(key, format!("{} failed to launch: {}", built.label, e));
        }
      }
    }
  }
}

fn encoder_config(encoders: &EncodersConfig, encoder: Encoder) -> &crate::config::EncoderConfig {
  match encoder {
    Encoder::Nvenc => &encoders.nvenc,
    Encoder::Qsv => &encoders.qsv,
    Encoder::Videotoolbox => &encoders.videotoolbox,
    Encoder::Cpu => &encoders.cpu,
  }
}

fn file_size(path: &Path) -> u64 {
  fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Atomically installs the finished temp file as the final output.
fn finalize_output(tmp: &Path, dest: &Path) -> Result<(), crate::error::Error> {
  fs::rename(tmp, dest).map_err(|source| crate::error::Error::Rename { tmp: tmp.to_path_buf(), dest: dest.to_path_buf(), source })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::task::FilePlan;
  use std::path::PathBuf;
  use std::sync::atomic::{AtomicUsize, Ordering};

  fn encoders_config(enabled: &[Encoder]) -> EncodersConfig {
    let mut cfg = EncodersConfig::default();
    cfg.nvenc.enabled = enabled.contains(&Encoder::Nvenc);
    cfg.qsv.enabled = enabled.contains(&Encoder::Qsv);
    cfg.videotoolbox.enabled = enabled.contains(&Encoder::Videotoolbox);
    cfg.cpu.enabled = enabled.contains(&Encoder::Cpu);
    cfg
  }

  fn scheduler_config() -> SchedulerConfig {
    SchedulerConfig { max_total_concurrent: 4 }
  }

  fn task(dir: &std::path::Path) -> Task {
    let input = dir.join("in.mp4");
    fs::write(&input, b"source").unwrap();
    let output = dir.join("out.mp4");
    let tmp_output = FilePlan::tmp_path_for(&output);
    let plan = FilePlan { input: input.clone(), output, tmp_output, target_bitrate_bps: 3_000_000 };
    Task::new(input, plan, "h264".to_string())
  }

  struct AlwaysFails;
  impl AttemptLauncher for AlwaysFails {
    fn launch(&self, _argv: &[String]) -> Result<bool, String> {
      Ok(false)
    }
  }

  struct SucceedsAfterNFailures {
    calls: AtomicUsize,
    succeed_on_call: usize,
  }

  impl AttemptLauncher for SucceedsAfterNFailures {
    fn launch(&self, argv: &[String]) -> Result<bool, String> {
      let call = self.calls.fetch_add(1, Ordering::SeqCst);
      let tmp_path = PathBuf::from(argv.last().unwrap());
      if call + 1 >= self.succeed_on_call {
        fs::write(&tmp_path, b"encoded").unwrap();
        Ok(true)
      } else {
        Ok(false)
      }
    }
  }

  #[test]
  fn hardware_priority_then_cpu_fallback_order() {
    let available: HashSet<Encoder> = [Encoder::Nvenc, Encoder::Qsv, Encoder::Cpu].into_iter().collect();
    let scheduler = Scheduler::new(&encoders_config(&[Encoder::Nvenc, Encoder::Qsv, Encoder::Cpu]), &available, &scheduler_config());
    let sequence = scheduler.attempt_sequence("h264");
    let nvenc_first = sequence.iter().position(|k| k.encoder == Encoder::Nvenc).unwrap();
    let qsv_first = sequence.iter().position(|k| k.encoder == Encoder::Qsv).unwrap();
    let cpu_first = sequence.iter().position(|k| k.encoder == Encoder::Cpu).unwrap();
    assert!(nvenc_first < qsv_first);
    assert!(qsv_first < cpu_first);
  }

  #[test]
  fn hw_decode_omitted_when_source_codec_unsupported() {
    let available: HashSet<Encoder> = [Encoder::Nvenc].into_iter().collect();
    let scheduler = Scheduler::new(&encoders_config(&[Encoder::Nvenc]), &available, &scheduler_config());
    let sequence = scheduler.attempt_sequence("wmv3");
    assert!(!sequence.iter().any(|k| k.encoder == Encoder::Nvenc && k.decode_mode == DecodeMode::HwDecode));
  }

  #[test]
  fn exhausts_after_every_attempt_fails() {
    let dir = tempfile::tempdir().unwrap();
    let available: HashSet<Encoder> = [Encoder::Nvenc, Encoder::Cpu].into_iter().collect();
    let scheduler = Scheduler::new(&encoders_config(&[Encoder::Nvenc, Encoder::Cpu]), &available, &scheduler_config());
    let mut t = task(dir.path());
    let result = scheduler.run_task(&mut t, Codec::Hevc, 30, &AlwaysFails);
    assert!(!result.success);
    assert_eq!(result.skipped, Some(SkipReason::Exhausted));
  }

  #[test]
  fn falls_back_to_a_later_attempt_after_earlier_ones_fail() {
    let dir = tempfile::tempdir().unwrap();
    let available: HashSet<Encoder> = [Encoder::Nvenc, Encoder::Cpu].into_iter().collect();
    let scheduler = Scheduler::new(&encoders_config(&[Encoder::Nvenc, Encoder::Cpu]), &available, &scheduler_config());
    let mut t = task(dir.path());
    let launcher = SucceedsAfterNFailures { calls: AtomicUsize::new(0), succeed_on_call: 4 };
    let result = scheduler.run_task(&mut t, Codec::Hevc, 30, &launcher);
    assert!(result.success);
    assert!(t.plan.output.exists());
    assert!(!t.plan.tmp_output.exists());
  }

  #[test]
  fn already_existing_output_short_circuits_as_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let available: HashSet<Encoder> = [Encoder::Cpu].into_iter().collect();
    let scheduler = Scheduler::new(&encoders_config(&[Encoder::Cpu]), &available, &scheduler_config());
    let mut t = task(dir.path());
    fs::write(&t.plan.output, b"already there").unwrap();
    let result = scheduler.run_task(&mut t, Codec::Hevc, 30, &AlwaysFails);
    assert_eq!(result.skipped, Some(SkipReason::AlreadyExists));
  }
}
