//! Signal Handler: translates operator interrupts into cooperative
//! shutdown.

use std::sync::atomic::{AtomicBool, Ordering};

use once_cell::sync::Lazy;

use crate::process_registry::ProcessRegistry;

/// Exit code used when the run was cancelled by an operator interrupt.
pub const CANCELLED_EXIT_CODE: i32 = 130;

static INTERRUPTED_ONCE: Lazy<AtomicBool> = Lazy::new(|| AtomicBool::new(false));

/// Installs the process-wide Ctrl-C handler. On the first interrupt: marks
/// the Process Registry's shutdown flag and calls `terminate_all`, then
/// returns so the signal is left re-raised against this process's default
/// disposition rather than exiting from inside the handler — the worker
/// pool unwinds cooperatively and the caller reports the cancellation
/// through its own exit path. A second interrupt restores the default
/// SIGINT disposition and re-raises it immediately, for an operator who
/// wants out even if termination is still in progress.
pub fn install() -> Result<(), ctrlc::Error> {
  ctrlc::set_handler(move || {
    if INTERRUPTED_ONCE.swap(true, Ordering::SeqCst) {
      restore_default_and_reraise();
      return;
    }
    log::warn!("interrupt received, terminating in-flight attempts");
    ProcessRegistry::global().terminate_all();
  })
}

#[cfg(unix)]
fn restore_default_and_reraise() {
  unsafe {
    libc::signal(libc::SIGINT, libc::SIG_DFL);
    libc::raise(libc::SIGINT);
  }
}

#[cfg(not(unix))]
fn restore_default_and_reraise() {
  std::process::exit(CANCELLED_EXIT_CODE);
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn cancelled_exit_code_is_130() {
    assert_eq!(CANCELLED_EXIT_CODE, 130);
  }
}
