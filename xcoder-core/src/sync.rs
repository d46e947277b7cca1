//! A counting semaphore with a bounded, shutdown-interruptible acquire.
//!
//! `std` has no semaphore; `parking_lot`'s `Mutex`/`Condvar` (already a
//! dependency for the small mutable structs elsewhere) is enough to build
//! one without pulling in an async runtime.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

pub struct Semaphore {
  state: Mutex<usize>,
  condvar: Condvar,
  max: usize,
}

/// Polling granularity used while waiting on a semaphore so that a shutdown
/// flag checked by the caller is noticed promptly instead of only once the
/// whole timeout elapses.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

impl Semaphore {
  pub fn new(permits: usize) -> Self {
    Self {
      state: Mutex::new(permits),
      condvar: Condvar::new(),
      max: permits,
    }
  }

  pub fn max(&self) -> usize {
    self.max
  }

  pub fn available(&self) -> usize {
    *self.state.lock()
  }

  /// Blocks until a permit is available or `timeout` elapses, re-checking
  /// `should_abort` between polls so callers can honour a shutdown flag.
  /// Returns `true` iff a permit was acquired.
  pub fn acquire_timeout(&self, timeout: Duration, should_abort: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    let mut guard = self.state.lock();
    loop {
      if *guard > 0 {
        *guard -= 1;
        return true;
      }
      if should_abort() {
        return false;
      }
      let now = Instant::now();
      if now >= deadline {
        return false;
      }
      let wait = POLL_INTERVAL.min(deadline - now);
      let result = self.condvar.wait_for(&mut guard, wait);
      let _ = result;
    }
  }

  pub fn release(&self) {
    let mut guard = self.state.lock();
    *guard += 1;
    debug_assert!(*guard <= self.max);
    self.condvar.notify_one();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Arc;
  use std::thread;

  #[test]
  fn acquire_release_round_trips() {
    let sem = Semaphore::new(2);
    assert!(sem.acquire_timeout(Duration::from_millis(10), || false));
    assert!(sem.acquire_timeout(Duration::from_millis(10), || false));
    assert!(!sem.acquire_timeout(Duration::from_millis(50), || false));
    sem.release();
    assert!(sem.acquire_timeout(Duration::from_millis(50), || false));
  }

  #[test]
  fn abort_predicate_short_circuits_wait() {
    let sem = Arc::new(Semaphore::new(1));
    let permit = sem.acquire_timeout(Duration::from_millis(10), || false);
    assert!(permit);
    let start = Instant::now();
    let acquired = sem.acquire_timeout(Duration::from_secs(5), || true);
    assert!(!acquired);
    assert!(start.elapsed() < Duration::from_secs(1));
  }

  #[test]
  fn never_exceeds_max_under_contention() {
    let sem = Arc::new(Semaphore::new(3));
    let handles: Vec<_> = (0..8)
      .map(|_| {
        let sem = Arc::clone(&sem);
        thread::spawn(move || {
          if sem.acquire_timeout(Duration::from_secs(2), || false) {
            thread::sleep(Duration::from_millis(5));
            sem.release();
          }
        })
      })
      .collect();
    for h in handles {
      h.join().unwrap();
    }
    assert_eq!(sem.available(), 3);
  }
}
