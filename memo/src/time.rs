use once_cell::sync::Lazy;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

// The single, static reference point for all time calculations in the cache.
// It is initialized lazily on its first use.
static CACHE_EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

/// A helper to get the current time as a `Duration` since the epoch.
#[inline]
pub(crate) fn now_duration() -> Duration {
  Instant::now().saturating_duration_since(*CACHE_EPOCH)
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
#[inline]
pub(crate) fn saturating_millis(duration: Duration) -> u64 {
  u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// A source of monotonic time, in milliseconds.
///
/// The cache only uses the clock for bookkeeping (when an entry was cached,
/// when it is due to expire). Expiration itself is driven by the
/// [`Scheduler`](crate::scheduler::Scheduler).
pub trait Clock: Send + Sync {
  fn now_millis(&self) -> u64;
}

/// The default clock, measuring milliseconds since the process-wide cache
/// epoch.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  #[inline]
  fn now_millis(&self) -> u64 {
    saturating_millis(now_duration())
  }
}

/// A clock that only moves when told to. Shared with a
/// [`ManualScheduler`](crate::scheduler::ManualScheduler) to drive virtual
/// time in tests.
#[derive(Default)]
pub struct ManualClock {
  millis: AtomicU64,
}

impl ManualClock {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn starting_at(millis: u64) -> Self {
    Self {
      millis: AtomicU64::new(millis),
    }
  }

  /// Moves the clock forward by `by`.
  pub fn advance(&self, by: Duration) {
    let by = saturating_millis(by);
    let _ = self
      .millis
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |millis| Some(millis.saturating_add(by)));
  }

  /// Moves the clock to `millis`. The clock never moves backwards.
  pub fn set_millis(&self, millis: u64) {
    self.millis.fetch_max(millis, Ordering::SeqCst);
  }
}

impl Clock for ManualClock {
  #[inline]
  fn now_millis(&self) -> u64 {
    self.millis.load(Ordering::SeqCst)
  }
}

impl fmt::Debug for ManualClock {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ManualClock")
      .field("millis", &self.now_millis())
      .finish()
  }
}
