//! Encoder Probe: at startup, determine which hardware encoders
//! actually initialise on this host.

use std::collections::HashMap;
use std::process::{Command, Stdio};
use std::time::Duration;

use crate::encoder::{Codec, Encoder};

/// Synthetic trial-encode source: small and short enough to probe quickly.
/// Some encoders enforce higher minimum dimensions; raising this constant
/// is a one-line change if that ever matters in practice.
pub const PROBE_WIDTH: u32 = 256;
pub const PROBE_HEIGHT: u32 = 256;
pub const PROBE_DURATION_SECS: f64 = 0.1;
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(30);
pub const ENCODER_LIST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct ProbeResult {
  pub available: bool,
  pub reason: Option<String>,
}

/// Fragments that classify a probe failure into an actionable category.
/// Checked against the trial encode's lowercased stderr.
const FAILURE_FRAGMENTS: &[(&str, &str)] = &[
  ("no nvenc capable devices found", "no NVENC-capable GPU found"),
  ("no capable devices found", "no capable device found"),
  ("cannot load nvcuda", "NVIDIA driver not installed or too old"),
  ("driver not loaded", "driver not loaded"),
  ("no qsv-capable device", "no QSV-capable device found"),
  ("cannot open", "initialisation failed"),
  ("initialization failed", "initialisation failed"),
];

fn run_with_timeout(mut command: Command, timeout: Duration) -> Option<std::process::Output> {
  use std::sync::mpsc;
  let (tx, rx) = mpsc::channel();
  std::thread::spawn(move || {
    let result = command.output();
    let _ = tx.send(result);
  });
  rx.recv_timeout(timeout).ok()?.ok()
}

fn tool_lists_encoder(encoder_name: &str) -> bool {
  let mut cmd = Command::new("ffmpeg");
  cmd.args(["-hide_banner", "-encoders"]).stdout(Stdio::piped()).stderr(Stdio::null());
  match run_with_timeout(cmd, ENCODER_LIST_TIMEOUT) {
    Some(output) => String::from_utf8_lossy(&output.stdout).contains(encoder_name),
    None => false,
  }
}

fn classify_stderr(stderr: &str) -> Option<&'static str> {
  let lower = stderr.to_lowercase();
  FAILURE_FRAGMENTS.iter().find(|(fragment, _)| lower.contains(fragment)).map(|(_, reason)| *reason)
}

fn trial_encode(encoder_name: &str) -> ProbeResult {
  let mut cmd = Command::new("ffmpeg");
  cmd
    .args([
      "-hide_banner",
      "-loglevel",
      "error",
      "-f",
      "lavfi",
      "-i",
      &format!("nullsrc=s={}x{}:d={}", PROBE_WIDTH, PROBE_HEIGHT, PROBE_DURATION_SECS),
      "-c:v",
      encoder_name,
      "-f",
      "null",
      "-",
    ])
    .stdout(Stdio::null())
    .stderr(Stdio::piped());

  match run_with_timeout(cmd, PROBE_TIMEOUT) {
    None => ProbeResult { available: false, reason: Some(format!("{} probe timed out", encoder_name)) },
    Some(output) => {
      let stderr = String::from_utf8_lossy(&output.stderr);
      if let Some(reason) = classify_stderr(&stderr) {
        return ProbeResult { available: false, reason: Some(reason.to_string()) };
      }
      if output.status.success() {
        ProbeResult { available: true, reason: None }
      } else {
        let tail: String = stderr.chars().rev().take(100).collect::<Vec<_>>().into_iter().rev().collect();
        ProbeResult { available: false, reason: Some(format!("probe failed: {}", tail.trim())) }
      }
    }
  }
}

fn check_hardware(encoder: Encoder, codec: Codec, platform_ok: bool) -> ProbeResult {
  if !platform_ok {
    return ProbeResult { available: false, reason: Some(format!("{} is not available on this platform", encoder)) };
  }
  let name = encoder.ffmpeg_name(codec);
  if !tool_lists_encoder(name) {
    return ProbeResult { available: false, reason: Some(format!("encoder {} not found in ffmpeg", name)) };
  }
  trial_encode(name)
}

/// Probes every candidate encoder. CPU is considered available whenever
/// `ffmpeg` lists its codec; it never goes through the hardware trial
/// encode. A probe failure disables that one encoder; it never fails the run.
pub fn detect_available_encoders(codec: Codec) -> HashMap<Encoder, ProbeResult> {
  let mut results = HashMap::new();

  results.insert(Encoder::Nvenc, check_hardware(Encoder::Nvenc, codec, true));
  results.insert(Encoder::Qsv, check_hardware(Encoder::Qsv, codec, true));
  results.insert(Encoder::Videotoolbox, check_hardware(Encoder::Videotoolbox, codec, cfg!(target_os = "macos")));

  let cpu_name = Encoder::Cpu.ffmpeg_name(codec);
  let cpu = if tool_lists_encoder(cpu_name) {
    ProbeResult { available: true, reason: None }
  } else {
    ProbeResult { available: false, reason: Some(format!("software encoder {} not available", cpu_name)) }
  };
  results.insert(Encoder::Cpu, cpu);

  results
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn classifies_known_fragments() {
    assert_eq!(classify_stderr("Error: No NVENC capable devices found"), Some("no NVENC-capable GPU found"));
    assert_eq!(classify_stderr("cannot load nvcuda.dll"), Some("NVIDIA driver not installed or too old"));
    assert_eq!(classify_stderr("totally unrelated noise"), None);
  }

  #[test]
  fn videotoolbox_disabled_off_macos() {
    let result = check_hardware(Encoder::Videotoolbox, Codec::Hevc, false);
    assert!(!result.available);
  }
}
