//! Process-wide registry of live child handles.
//!
//! Genuinely process-wide because a single signal handler must be able to
//! see and terminate every child regardless of which worker launched it.
//! Encapsulated as an initialised-once singleton, not sprinkled module-level
//! mutable state.

use std::collections::HashMap;
use std::process::{Child, Command};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use once_cell::sync::OnceCell;

cfg_if::cfg_if! {
  if #[cfg(unix)] {
    fn send_sigterm(pid: u32) {
      unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGTERM);
      }
    }
  } else {
    fn send_sigterm(_pid: u32) {
      // No portable graceful-stop signal on this platform; `terminate_all`
      // falls straight through to `Child::kill`.
    }
  }
}

/// An opaque handle returned by [`ProcessRegistry::spawn`], used to
/// unregister the child once it has been reaped.
pub type ChildHandle = u64;

struct Entry {
  pid: u32,
  child: Child,
}

pub struct ProcessRegistry {
  children: Mutex<HashMap<ChildHandle, Entry>>,
  next_id: AtomicU64,
  shutdown: AtomicBool,
}

static REGISTRY: OnceCell<ProcessRegistry> = OnceCell::new();

impl ProcessRegistry {
  fn new() -> Self {
    Self {
      children: Mutex::new(HashMap::new()),
      next_id: AtomicU64::new(1),
      shutdown: AtomicBool::new(false),
    }
  }

  /// Returns the process-wide singleton, creating it on first access.
  pub fn global() -> &'static ProcessRegistry {
    REGISTRY.get_or_init(ProcessRegistry::new)
  }

  pub fn is_shutting_down(&self) -> bool {
    self.shutdown.load(Ordering::SeqCst)
  }

  /// Spawns `command`, registering the resulting child under the same lock
  /// that `terminate_all` takes — so a launch racing a shutdown either
  /// observes the flag and is refused, or is registered and will be killed.
  pub fn spawn(&self, mut command: Command) -> std::io::Result<ChildHandle> {
    let mut children = self.children.lock().unwrap_or_else(|e| e.into_inner());
    if self.shutdown.load(Ordering::SeqCst) {
      return Err(std::io::Error::new(std::io::ErrorKind::Other, "shutdown in progress, refusing to spawn"));
    }
    let child = command.spawn()?;
    let pid = child.id();
    let handle = self.next_id.fetch_add(1, Ordering::SeqCst);
    children.insert(handle, Entry { pid, child });
    Ok(handle)
  }

  /// Removes a handle after its child has been reaped (via `wait`).
  pub fn unregister(&self, handle: ChildHandle) {
    let mut children = self.children.lock().unwrap_or_else(|e| e.into_inner());
    children.remove(&handle);
  }

  /// Waits for `handle`'s child to exit, then unregisters it. Returns
  /// `None` if the handle is unknown (already reaped/terminated elsewhere).
  pub fn wait(&self, handle: ChildHandle) -> Option<std::process::ExitStatus> {
    let child = {
      let mut children = self.children.lock().unwrap_or_else(|e| e.into_inner());
      children.remove(&handle)
    };
    child.map(|mut e| e.child.wait().unwrap_or_else(|_| default_failure_status()))
  }

  pub fn len(&self) -> usize {
    self.children.lock().unwrap_or_else(|e| e.into_inner()).len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Sets the shutdown flag, sends a graceful termination signal to every
  /// live child, waits up to ~3s for each to exit, and force-kills any
  /// survivor. Idempotent and safe to call from a signal handler.
  pub fn terminate_all(&self) {
    self.shutdown.store(true, Ordering::SeqCst);
    let mut children = self.children.lock().unwrap_or_else(|e| e.into_inner());
    if children.is_empty() {
      return;
    }
    for entry in children.values() {
      send_sigterm(entry.pid);
    }
    let grace = Duration::from_secs(3);
    let deadline = Instant::now() + grace;
    loop {
      let all_reaped = children.values_mut().all(|e| matches!(e.child.try_wait(), Ok(Some(_))));
      if all_reaped || Instant::now() >= deadline {
        break;
      }
      std::thread::sleep(Duration::from_millis(50));
    }
    for entry in children.values_mut() {
      if matches!(entry.child.try_wait(), Ok(None)) {
        let _ = entry.child.kill();
        let _ = entry.child.wait();
      }
    }
    children.clear();
  }
}

fn default_failure_status() -> std::process::ExitStatus {
  // Best-effort placeholder used only if `wait` itself fails (e.g. the
  // child was already reaped by someone else); treated as a failure by
  // every caller that inspects `.success()`.
  #[cfg(unix)]
  {
    use std::os::unix::process::ExitStatusExt;
    std::process::ExitStatus::from_raw(1)
  }
  #[cfg(windows)]
  {
    use std::os::windows::process::ExitStatusExt;
    std::process::ExitStatus::from_raw(1)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::process::{Command, Stdio};

  fn fresh_registry() -> ProcessRegistry {
    ProcessRegistry::new()
  }

  #[test]
  fn spawn_wait_leaves_registry_empty() {
    let reg = fresh_registry();
    let mut cmd = Command::new("true");
    cmd.stdout(Stdio::null()).stderr(Stdio::null());
    let handle = reg.spawn(cmd).expect("spawn true");
    assert_eq!(reg.len(), 1);
    reg.wait(handle);
    assert!(reg.is_empty());
  }

  #[test]
  fn spawn_refused_after_shutdown() {
    let reg = fresh_registry();
    reg.terminate_all();
    assert!(reg.is_shutting_down());
    let mut cmd = Command::new("true");
    cmd.stdout(Stdio::null()).stderr(Stdio::null());
    assert!(reg.spawn(cmd).is_err());
  }

  #[test]
  fn terminate_all_empties_registry() {
    let reg = fresh_registry();
    let mut cmd = Command::new("sleep");
    cmd.arg("5").stdout(Stdio::null()).stderr(Stdio::null());
    reg.spawn(cmd).expect("spawn sleep");
    assert_eq!(reg.len(), 1);
    reg.terminate_all();
    assert!(reg.is_empty());
  }

  #[test]
  fn terminate_all_is_idempotent() {
    let reg = fresh_registry();
    reg.terminate_all();
    reg.terminate_all();
    assert!(reg.is_empty());
  }
}
