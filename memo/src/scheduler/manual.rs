use super::{Scheduler, Task, TimerEntry, TimerHandle, TimerState};
use crate::error::ScheduleError;
use crate::time::{saturating_millis, Clock, ManualClock};

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

#[derive(Default)]
struct ManualQueue {
  heap: BinaryHeap<Reverse<TimerEntry<u64>>>,
  next_seq: u64,
  history: Vec<Duration>,
}

/// A virtual-time scheduler. Nothing fires until [`advance`](Self::advance)
/// is called, at which point due tasks run synchronously on the calling
/// thread, in deadline order, with the shared [`ManualClock`] set to each
/// task's deadline as it runs.
pub struct ManualScheduler {
  clock: Arc<ManualClock>,
  queue: Mutex<ManualQueue>,
}

impl ManualScheduler {
  pub fn new() -> Self {
    Self::with_clock(Arc::new(ManualClock::new()))
  }

  pub fn with_clock(clock: Arc<ManualClock>) -> Self {
    Self {
      clock,
      queue: Mutex::new(ManualQueue::default()),
    }
  }

  /// The clock this scheduler moves.
  pub fn clock(&self) -> Arc<ManualClock> {
    self.clock.clone()
  }

  /// Advances virtual time by `by`, running every task that falls due.
  /// Tasks scheduled by running tasks are honoured within the same call.
  /// Returns the number of tasks that ran.
  pub fn advance(&self, by: Duration) -> usize {
    let target = self.clock.now_millis().saturating_add(saturating_millis(by));
    let mut fired = 0;

    loop {
      // The queue lock is released before the task runs.
      let next = {
        let mut queue = self.queue.lock();
        let due = matches!(queue.heap.peek(), Some(Reverse(entry)) if entry.deadline <= target);
        if due {
          queue.heap.pop()
        } else {
          None
        }
      };

      match next {
        Some(Reverse(entry)) => {
          self.clock.set_millis(entry.deadline);
          if entry.run() {
            fired += 1;
          }
        }
        None => break,
      }
    }

    self.clock.set_millis(target);
    fired
  }

  /// The number of tasks still waiting to fire (cancelled ones excluded).
  pub fn pending(&self) -> usize {
    self
      .queue
      .lock()
      .heap
      .iter()
      .filter(|Reverse(entry)| entry.is_live())
      .count()
  }

  /// Every delay ever passed to [`Scheduler::schedule`], in call order.
  pub fn scheduled_delays(&self) -> Vec<Duration> {
    self.queue.lock().history.clone()
  }

  /// How many times [`Scheduler::schedule`] has been called.
  pub fn schedule_count(&self) -> usize {
    self.queue.lock().history.len()
  }
}

impl Default for ManualScheduler {
  fn default() -> Self {
    Self::new()
  }
}

impl Scheduler for ManualScheduler {
  fn schedule(&self, task: Task, delay: Duration) -> Result<TimerHandle, ScheduleError> {
    let state = TimerState::new();
    let deadline = self.clock.now_millis().saturating_add(saturating_millis(delay));

    let mut queue = self.queue.lock();
    let seq = queue.next_seq;
    queue.next_seq += 1;
    queue.history.push(delay);
    queue
      .heap
      .push(Reverse(TimerEntry::new(deadline, seq, state.clone(), task)));

    Ok(TimerHandle::new(state))
  }
}

impl fmt::Debug for ManualScheduler {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ManualScheduler")
      .field("now_millis", &self.clock.now_millis())
      .field("pending", &self.pending())
      .finish()
  }
}
