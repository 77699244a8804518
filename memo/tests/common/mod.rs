#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use fibre_memo::{
  AsyncCache, Cache, CacheBuilder, Cancel, ManualScheduler, ScheduleError, Scheduler, Task, TimerHandle,
  TimerState, Ttl,
};

// Builds a cache whose clock and timers only move when the returned
// scheduler is advanced.
pub fn build_virtual_cache(default_timeout: Ttl) -> (Cache<String, String>, Arc<ManualScheduler>) {
  let scheduler = Arc::new(ManualScheduler::new());
  let cache = CacheBuilder::new()
    .shards(4)
    .default_timeout(default_timeout)
    .manual_time(scheduler.clone())
    .build()
    .unwrap();
  (cache, scheduler)
}

pub fn build_virtual_async_cache(default_timeout: Ttl) -> (AsyncCache<String, String>, Arc<ManualScheduler>) {
  let (cache, scheduler) = build_virtual_cache(default_timeout);
  (cache.to_async(), scheduler)
}

/// Counts how many times a supplier ran.
#[derive(Clone, Default)]
pub struct Calls(Arc<AtomicUsize>);

impl Calls {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn record(&self) {
    self.0.fetch_add(1, Ordering::SeqCst);
  }

  pub fn count(&self) -> usize {
    self.0.load(Ordering::SeqCst)
  }

  /// A supplier that records the call and returns `value`.
  pub fn supplier(&self, value: &str) -> impl FnOnce() -> Result<String, std::io::Error> {
    let calls = self.clone();
    let value = value.to_string();
    move || {
      calls.record();
      Ok(value)
    }
  }
}

/// A scheduler that refuses every task.
pub struct FailingScheduler;

impl Scheduler for FailingScheduler {
  fn schedule(&self, _task: Task, _delay: Duration) -> Result<TimerHandle, ScheduleError> {
    Err(ScheduleError::Rejected("test scheduler refuses all tasks".to_string()))
  }
}

/// Wraps a `ManualScheduler` but hands out handles whose cancel does nothing,
/// so stale timers really do fire.
pub struct UncancellableScheduler(pub Arc<ManualScheduler>);

impl Scheduler for UncancellableScheduler {
  fn schedule(&self, task: Task, delay: Duration) -> Result<TimerHandle, ScheduleError> {
    self.0.schedule(task, delay)?;
    // A fresh state nobody fires: cancelling it has no effect on the task.
    let detached = TimerState::new();
    Ok(TimerHandle::new(detached))
  }
}

/// A scheduler that panics instead of returning.
pub struct PanickingScheduler;

impl Scheduler for PanickingScheduler {
  fn schedule(&self, _task: Task, _delay: Duration) -> Result<TimerHandle, ScheduleError> {
    panic!("scheduler blew up");
  }
}

/// Wraps a `ManualScheduler` and counts every `cancel` call made on the
/// handles it hands out, effective or not.
pub struct CountingScheduler {
  pub inner: Arc<ManualScheduler>,
  cancels: Arc<AtomicUsize>,
}

impl CountingScheduler {
  pub fn new(inner: Arc<ManualScheduler>) -> Self {
    Self {
      inner,
      cancels: Arc::new(AtomicUsize::new(0)),
    }
  }

  pub fn cancels(&self) -> usize {
    self.cancels.load(Ordering::SeqCst)
  }
}

struct CountedCancel {
  handle: TimerHandle,
  cancels: Arc<AtomicUsize>,
}

impl Cancel for CountedCancel {
  fn cancel(&self) -> bool {
    self.cancels.fetch_add(1, Ordering::SeqCst);
    self.handle.cancel()
  }
}

impl Scheduler for CountingScheduler {
  fn schedule(&self, task: Task, delay: Duration) -> Result<TimerHandle, ScheduleError> {
    let handle = self.inner.schedule(task, delay)?;
    Ok(TimerHandle::new(CountedCancel {
      handle,
      cancels: self.cancels.clone(),
    }))
  }
}

/// Spins until `condition` holds, failing the test after a few seconds.
pub fn wait_until(what: &str, condition: impl Fn() -> bool) {
  let deadline = Instant::now() + Duration::from_secs(5);
  while !condition() {
    assert!(Instant::now() < deadline, "timed out waiting for {what}");
    thread::sleep(Duration::from_millis(1));
  }
}
