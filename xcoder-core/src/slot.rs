//! One physical encoder's concurrency budget: a counting semaphore plus a
//! small struct of liveness counters, independent of the scheduler's global
//! cap.

use std::time::Duration;

use parking_lot::Mutex;

use crate::encoder::Encoder;
use crate::sync::Semaphore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SlotSnapshot {
  pub current: usize,
  pub max: usize,
  pub completed: u64,
  pub failed: u64,
}

struct Counters {
  current: usize,
  completed: u64,
  failed: u64,
}

pub struct EncoderSlot {
  encoder: Encoder,
  semaphore: Semaphore,
  counters: Mutex<Counters>,
}

/// A held permit on an [`EncoderSlot`]. `release` is mandatory on every
/// acquisition path; forgetting to call it would leak the permit, so
/// callers are expected to always match an `acquire` with exactly one
/// `release(success)` call.
pub struct SlotGuard<'a> {
  slot: &'a EncoderSlot,
  released: bool,
}

impl EncoderSlot {
  pub fn new(encoder: Encoder, max_concurrent: usize) -> Self {
    Self {
      encoder,
      semaphore: Semaphore::new(max_concurrent),
      counters: Mutex::new(Counters { current: 0, completed: 0, failed: 0 }),
    }
  }

  pub fn encoder(&self) -> Encoder {
    self.encoder
  }

  /// Blocking acquire with a bounded timeout, interruptible via `should_abort`.
  pub fn try_acquire(&self, timeout: Duration, should_abort: impl Fn() -> bool) -> Option<SlotGuard<'_>> {
    if !self.semaphore.acquire_timeout(timeout, should_abort) {
      return None;
    }
    {
      let mut c = self.counters.lock();
      c.current += 1;
      debug_assert!(c.current <= self.semaphore.max());
    }
    Some(SlotGuard { slot: self, released: false })
  }

  pub fn current_load(&self) -> (usize, usize) {
    (self.counters.lock().current, self.semaphore.max())
  }

  pub fn snapshot(&self) -> SlotSnapshot {
    let c = self.counters.lock();
    SlotSnapshot {
      current: c.current,
      max: self.semaphore.max(),
      completed: c.completed,
      failed: c.failed,
    }
  }
}

impl SlotGuard<'_> {
  /// Releases the permit, recording the attempt as completed or failed.
  /// Consumes the guard so a slot can never be released twice.
  pub fn release(mut self, success: bool) {
    self.do_release(success);
  }

  fn do_release(&mut self, success: bool) {
    if self.released {
      return;
    }
    self.released = true;
    {
      let mut c = self.slot.counters.lock();
      c.current -= 1;
      if success {
        c.completed += 1;
      } else {
        c.failed += 1;
      }
    }
    self.slot.semaphore.release();
  }
}

impl Drop for SlotGuard<'_> {
  /// A guard dropped without an explicit `release` (e.g. due to an early
  /// return via `?`) is counted as failed rather than leaking the permit.
  fn drop(&mut self) {
    self.do_release(false);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn snapshot_tracks_completed_and_failed() {
    let slot = EncoderSlot::new(Encoder::Nvenc, 2);
    let g1 = slot.try_acquire(Duration::from_millis(10), || false).unwrap();
    let g2 = slot.try_acquire(Duration::from_millis(10), || false).unwrap();
    assert!(slot.try_acquire(Duration::from_millis(10), || false).is_none());
    g1.release(true);
    g2.release(false);
    let snap = slot.snapshot();
    assert_eq!(snap, SlotSnapshot { current: 0, max: 2, completed: 1, failed: 1 });
  }

  #[test]
  fn dropped_guard_counts_as_failed() {
    let slot = EncoderSlot::new(Encoder::Qsv, 1);
    {
      let _g = slot.try_acquire(Duration::from_millis(10), || false).unwrap();
    }
    let snap = slot.snapshot();
    assert_eq!(snap.failed, 1);
    assert_eq!(snap.current, 0);
  }

  #[test]
  fn current_never_exceeds_max() {
    let slot = EncoderSlot::new(Encoder::Cpu, 1);
    let g = slot.try_acquire(Duration::from_millis(10), || false).unwrap();
    assert!(slot.try_acquire(Duration::from_millis(20), || false).is_none());
    assert_eq!(slot.current_load(), (1, 1));
    g.release(true);
    assert_eq!(slot.current_load(), (0, 1));
  }
}
