use super::{Cancel, Scheduler, Task, TimerHandle, TimerState};
use crate::error::ScheduleError;

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::AbortHandle;

/// A scheduler that spawns one sleeping task per timer on a Tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioScheduler(Handle);

impl TokioScheduler {
  /// Creates a scheduler that uses the current Tokio runtime context.
  /// Panics if called outside of a Tokio runtime.
  pub fn new() -> Self {
    Self(Handle::current())
  }

  /// Like [`new`](Self::new), but returns `None` outside of a runtime.
  pub fn try_current() -> Option<Self> {
    Handle::try_current().ok().map(Self)
  }

  pub fn from_handle(handle: Handle) -> Self {
    Self(handle)
  }
}

struct TokioTimer {
  state: Arc<TimerState>,
  abort: AbortHandle,
}

impl Cancel for TokioTimer {
  fn cancel(&self) -> bool {
    if self.state.cancel() {
      self.abort.abort();
      true
    } else {
      false
    }
  }
}

impl Scheduler for TokioScheduler {
  fn schedule(&self, task: Task, delay: Duration) -> Result<TimerHandle, ScheduleError> {
    let state = TimerState::new();
    let task_state = state.clone();

    let join = self.0.spawn(async move {
      tokio::time::sleep(delay).await;
      if task_state.try_fire() {
        task();
      }
    });

    Ok(TimerHandle::new(TokioTimer {
      state,
      abort: join.abort_handle(),
    }))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};

  #[tokio::test(start_paused = true)]
  async fn fires_on_virtual_time_and_cancels() {
    let scheduler = TokioScheduler::new();
    let runs = Arc::new(AtomicUsize::new(0));

    let fired = {
      let runs = runs.clone();
      scheduler
        .schedule(
          Box::new(move || {
            runs.fetch_add(1, Ordering::SeqCst);
          }),
          Duration::from_secs(5),
        )
        .unwrap()
    };
    let cancelled = {
      let runs = runs.clone();
      scheduler
        .schedule(
          Box::new(move || {
            runs.fetch_add(100, Ordering::SeqCst);
          }),
          Duration::from_secs(5),
        )
        .unwrap()
    };

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(cancelled.cancel());
    tokio::time::sleep(Duration::from_secs(4)).await;

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert!(!fired.cancel());
    assert!(!cancelled.cancel());
  }

  #[test]
  fn try_current_outside_runtime_is_none() {
    assert!(TokioScheduler::try_current().is_none());
  }
}
