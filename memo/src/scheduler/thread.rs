use super::{Cancel, Scheduler, Task, TimerEntry, TimerHandle, TimerState};
use crate::error::ScheduleError;

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

/// Cancelled entries tolerated in the heap before it is compacted.
const PRUNE_THRESHOLD: usize = 64;

#[derive(Default)]
struct Queue {
  heap: BinaryHeap<Reverse<TimerEntry<Instant>>>,
  next_seq: u64,
  /// Approximate count of cancelled entries still sitting in `heap`.
  cancelled: usize,
  shutdown: bool,
}

impl Queue {
  fn note_cancelled(&mut self) {
    self.cancelled += 1;
    if self.cancelled >= PRUNE_THRESHOLD && self.cancelled * 2 >= self.heap.len() {
      let before = self.heap.len();
      self.heap.retain(|Reverse(entry)| entry.is_live());
      self.cancelled = 0;
      tracing::trace!(pruned = before - self.heap.len(), "compacted timer queue");
    }
  }

  /// Drops cancelled entries from the front so the thread never sleeps
  /// towards a deadline nobody is waiting for.
  fn pop_dead_heads(&mut self) {
    while matches!(self.heap.peek(), Some(Reverse(entry)) if !entry.is_live()) {
      self.heap.pop();
      self.cancelled = self.cancelled.saturating_sub(1);
    }
  }
}

struct Shared {
  queue: Mutex<Queue>,
  condvar: Condvar,
}

/// A scheduler backed by one dedicated background thread that sleeps until
/// the earliest deadline.
///
/// The thread is stopped and joined when the scheduler is dropped; tasks that
/// have not fired by then are discarded.
pub struct ThreadScheduler {
  shared: Arc<Shared>,
  handle: Option<JoinHandle<()>>,
}

impl ThreadScheduler {
  /// Spawns the timer thread.
  pub fn new() -> Self {
    let shared = Arc::new(Shared {
      queue: Mutex::new(Queue::default()),
      condvar: Condvar::new(),
    });

    let thread_shared = shared.clone();
    let handle = thread::Builder::new()
      .name("fibre-memo-timer".to_string())
      .spawn(move || Self::run(&thread_shared));

    let handle = match handle {
      Ok(handle) => Some(handle),
      Err(e) => {
        // Without a thread every schedule call reports `Shutdown`, which the
        // cache treats as "do not retain".
        tracing::error!(error = %e, "failed to spawn timer thread");
        shared.queue.lock().shutdown = true;
        None
      }
    };

    Self { shared, handle }
  }

  /// The number of entries held in the queue, including cancelled ones that
  /// have not been pruned yet.
  pub fn queued(&self) -> usize {
    self.shared.queue.lock().heap.len()
  }

  /// The number of tasks still waiting to fire (cancelled ones excluded).
  pub fn pending(&self) -> usize {
    self
      .shared
      .queue
      .lock()
      .heap
      .iter()
      .filter(|Reverse(entry)| entry.is_live())
      .count()
  }

  /// The timer loop. Tasks run with the queue lock released.
  fn run(shared: &Shared) {
    let mut queue = shared.queue.lock();
    loop {
      if queue.shutdown {
        break;
      }

      queue.pop_dead_heads();
      let next_deadline = queue.heap.peek().map(|Reverse(entry)| entry.deadline);
      match next_deadline {
        None => shared.condvar.wait(&mut queue),
        Some(deadline) if deadline > Instant::now() => {
          shared.condvar.wait_until(&mut queue, deadline);
        }
        Some(_) => {
          if let Some(Reverse(entry)) = queue.heap.pop() {
            let fired = MutexGuard::unlocked(&mut queue, || entry.run());
            if !fired {
              queue.cancelled = queue.cancelled.saturating_sub(1);
            }
          }
        }
      }
    }
  }
}

impl Default for ThreadScheduler {
  fn default() -> Self {
    Self::new()
  }
}

impl Scheduler for ThreadScheduler {
  fn schedule(&self, task: Task, delay: Duration) -> Result<TimerHandle, ScheduleError> {
    let deadline = Instant::now()
      .checked_add(delay)
      .ok_or_else(|| ScheduleError::Rejected(format!("delay of {delay:?} overflows the clock")))?;
    let state = TimerState::new();

    {
      let mut queue = self.shared.queue.lock();
      if queue.shutdown {
        return Err(ScheduleError::Shutdown);
      }
      let seq = queue.next_seq;
      queue.next_seq += 1;
      queue
        .heap
        .push(Reverse(TimerEntry::new(deadline, seq, state.clone(), task)));
    }
    self.shared.condvar.notify_one();

    Ok(TimerHandle::new(ThreadTimer {
      state,
      shared: Arc::downgrade(&self.shared),
    }))
  }
}

/// Cancels through the shared state and tells the queue, so that cancelled
/// entries do not pile up until their deadlines.
struct ThreadTimer {
  state: Arc<TimerState>,
  shared: Weak<Shared>,
}

impl Cancel for ThreadTimer {
  fn cancel(&self) -> bool {
    if !self.state.cancel() {
      return false;
    }
    if let Some(shared) = self.shared.upgrade() {
      shared.queue.lock().note_cancelled();
    }
    true
  }
}

impl Drop for ThreadScheduler {
  fn drop(&mut self) {
    self.shared.queue.lock().shutdown = true;
    self.shared.condvar.notify_all();

    if let Some(handle) = self.handle.take() {
      // The last owner can be a task running on the timer thread itself.
      if handle.thread().id() != thread::current().id() {
        let _ = handle.join();
      }
    }
  }
}

impl fmt::Debug for ThreadScheduler {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ThreadScheduler")
      .field("pending", &self.pending())
      .finish()
  }
}
