//! Delayed, cancellable task execution.
//!
//! The cache never sleeps or polls for expirations. It hands a task to a
//! [`Scheduler`] and keeps the returned [`TimerHandle`] so that an explicit
//! eviction can cancel it.

mod manual;
#[cfg(feature = "tokio")]
mod runtime;
mod thread;

pub use manual::ManualScheduler;
#[cfg(feature = "tokio")]
pub use runtime::TokioScheduler;
pub use thread::ThreadScheduler;

use crate::error::ScheduleError;

use std::cmp::Ordering as CmpOrdering;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A unit of work to run once.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Executes a task once after a delay.
///
/// Implementations must not hold internal locks while a task runs, and
/// [`TimerHandle::cancel`] must never block on a running task: the cache
/// cancels handles while holding its own shard locks, and tasks acquire
/// those same locks. Tasks may run on any thread.
pub trait Scheduler: Send + Sync {
  fn schedule(&self, task: Task, delay: Duration) -> Result<TimerHandle, ScheduleError>;
}

impl<S: Scheduler + ?Sized> Scheduler for Arc<S> {
  fn schedule(&self, task: Task, delay: Duration) -> Result<TimerHandle, ScheduleError> {
    (**self).schedule(task, delay)
  }
}

/// The cancellation side of a scheduled task.
pub trait Cancel: Send + Sync {
  /// Prevents the task from running. Returns `true` only if this call is
  /// what stopped it; cancelling a fired or already cancelled task is a
  /// no-op returning `false`.
  fn cancel(&self) -> bool;
}

impl<C: Cancel + ?Sized> Cancel for Arc<C> {
  fn cancel(&self) -> bool {
    (**self).cancel()
  }
}

/// An owned handle to a scheduled task. Dropping it does not cancel the task.
pub struct TimerHandle {
  inner: Box<dyn Cancel>,
}

impl TimerHandle {
  pub fn new<C: Cancel + 'static>(cancel: C) -> Self {
    Self {
      inner: Box::new(cancel),
    }
  }

  #[inline]
  pub fn cancel(&self) -> bool {
    self.inner.cancel()
  }
}

impl fmt::Debug for TimerHandle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("TimerHandle").finish_non_exhaustive()
  }
}

const SCHEDULED: u8 = 0;
const FIRED: u8 = 1;
const CANCELLED: u8 = 2;

/// The race arbiter between a task firing and its handle being cancelled.
/// Exactly one of [`try_fire`](Self::try_fire) and [`Cancel::cancel`] wins.
#[derive(Debug, Default)]
pub struct TimerState(AtomicU8);

impl TimerState {
  pub fn new() -> Arc<Self> {
    Arc::new(Self(AtomicU8::new(SCHEDULED)))
  }

  /// Claims the right to run the task. Returns `false` if it was cancelled.
  #[inline]
  pub fn try_fire(&self) -> bool {
    self
      .0
      .compare_exchange(SCHEDULED, FIRED, Ordering::AcqRel, Ordering::Acquire)
      .is_ok()
  }

  #[inline]
  pub fn is_live(&self) -> bool {
    self.0.load(Ordering::Acquire) == SCHEDULED
  }
}

impl Cancel for TimerState {
  #[inline]
  fn cancel(&self) -> bool {
    self
      .0
      .compare_exchange(SCHEDULED, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
      .is_ok()
  }
}

/// A queued task ordered by `(deadline, seq)`, shared by the heap-based
/// schedulers.
pub(crate) struct TimerEntry<T> {
  pub(crate) deadline: T,
  seq: u64,
  state: Arc<TimerState>,
  task: Task,
}

impl<T: Ord> TimerEntry<T> {
  pub(crate) fn new(deadline: T, seq: u64, state: Arc<TimerState>, task: Task) -> Self {
    Self {
      deadline,
      seq,
      state,
      task,
    }
  }

  #[inline]
  pub(crate) fn is_live(&self) -> bool {
    self.state.is_live()
  }

  /// Runs the task unless it was cancelled. A panicking task is logged and
  /// contained so it cannot take the scheduler down with it.
  pub(crate) fn run(self) -> bool {
    if !self.state.try_fire() {
      return false;
    }
    if panic::catch_unwind(AssertUnwindSafe(self.task)).is_err() {
      tracing::error!(seq = self.seq, "scheduled task panicked");
    }
    true
  }
}

impl<T: Ord> PartialEq for TimerEntry<T> {
  fn eq(&self, other: &Self) -> bool {
    self.deadline == other.deadline && self.seq == other.seq
  }
}

impl<T: Ord> Eq for TimerEntry<T> {}

impl<T: Ord> PartialOrd for TimerEntry<T> {
  fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
    Some(self.cmp(other))
  }
}

impl<T: Ord> Ord for TimerEntry<T> {
  fn cmp(&self, other: &Self) -> CmpOrdering {
    self
      .deadline
      .cmp(&other.deadline)
      .then_with(|| self.seq.cmp(&other.seq))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn cancel_and_fire_are_exclusive() {
    let state = TimerState::new();
    assert!(state.cancel());
    assert!(!state.try_fire());
    assert!(!state.cancel(), "second cancel must report no effect");

    let state = TimerState::new();
    assert!(state.try_fire());
    assert!(!state.cancel(), "cancelling a fired timer is a no-op");
  }

  #[test]
  fn entries_order_by_deadline_then_sequence() {
    let a = TimerEntry::new(5u64, 1, TimerState::new(), Box::new(|| {}));
    let b = TimerEntry::new(5u64, 0, TimerState::new(), Box::new(|| {}));
    let c = TimerEntry::new(1u64, 9, TimerState::new(), Box::new(|| {}));
    assert!(c < b);
    assert!(b < a);
  }

  #[test]
  fn panicking_task_is_contained() {
    let entry = TimerEntry::new(0u64, 0, TimerState::new(), Box::new(|| panic!("boom")));
    assert!(entry.run());
  }
}
