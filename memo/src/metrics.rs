use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crossbeam_utils::CachePadded;

/// A thread-safe, internal metrics collector for the cache.
/// All fields are atomic to allow for lock-free updates.
#[derive(Debug)]
pub struct Metrics {
  // --- Lookups ---
  pub(crate) hits: CachePadded<AtomicU64>,
  pub(crate) misses: CachePadded<AtomicU64>,
  pub(crate) joins: CachePadded<AtomicU64>,

  // --- Computations ---
  pub(crate) loads: CachePadded<AtomicU64>,
  pub(crate) load_failures: CachePadded<AtomicU64>,
  pub(crate) abandoned_loads: CachePadded<AtomicU64>,

  // --- Retention ---
  pub(crate) uncached: CachePadded<AtomicU64>,
  pub(crate) ttl_failures: CachePadded<AtomicU64>,
  pub(crate) schedule_failures: CachePadded<AtomicU64>,

  // --- Removal ---
  pub(crate) expirations: CachePadded<AtomicU64>,
  pub(crate) evictions: CachePadded<AtomicU64>,
  pub(crate) clears: CachePadded<AtomicU64>,

  created_at: Instant,
}

impl Default for Metrics {
  fn default() -> Self {
    Self {
      hits: CachePadded::new(AtomicU64::new(0)),
      misses: CachePadded::new(AtomicU64::new(0)),
      joins: CachePadded::new(AtomicU64::new(0)),
      loads: CachePadded::new(AtomicU64::new(0)),
      load_failures: CachePadded::new(AtomicU64::new(0)),
      abandoned_loads: CachePadded::new(AtomicU64::new(0)),
      uncached: CachePadded::new(AtomicU64::new(0)),
      ttl_failures: CachePadded::new(AtomicU64::new(0)),
      schedule_failures: CachePadded::new(AtomicU64::new(0)),
      expirations: CachePadded::new(AtomicU64::new(0)),
      evictions: CachePadded::new(AtomicU64::new(0)),
      clears: CachePadded::new(AtomicU64::new(0)),
      created_at: Instant::now(),
    }
  }
}

impl Metrics {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  #[inline]
  pub(crate) fn incr(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
  }

  /// Creates a point-in-time snapshot of the current metrics.
  pub(crate) fn snapshot(&self) -> MetricsSnapshot {
    let hits = self.hits.load(Ordering::Relaxed);
    let joins = self.joins.load(Ordering::Relaxed);
    let misses = self.misses.load(Ordering::Relaxed);
    let total_lookups = hits + joins + misses;

    MetricsSnapshot {
      hits,
      misses,
      joins,
      hit_ratio: if total_lookups == 0 {
        0.0
      } else {
        (hits + joins) as f64 / total_lookups as f64
      },
      loads: self.loads.load(Ordering::Relaxed),
      load_failures: self.load_failures.load(Ordering::Relaxed),
      abandoned_loads: self.abandoned_loads.load(Ordering::Relaxed),
      uncached: self.uncached.load(Ordering::Relaxed),
      ttl_failures: self.ttl_failures.load(Ordering::Relaxed),
      schedule_failures: self.schedule_failures.load(Ordering::Relaxed),
      expirations: self.expirations.load(Ordering::Relaxed),
      evictions: self.evictions.load(Ordering::Relaxed),
      clears: self.clears.load(Ordering::Relaxed),
      uptime_secs: self.created_at.elapsed().as_secs(),
    }
  }
}

/// A point-in-time, public-facing snapshot of the cache's metrics.
#[derive(Clone)]
pub struct MetricsSnapshot {
  /// Lookups answered by a ready value.
  pub hits: u64,
  /// Lookups that found nothing and ran the supplier themselves.
  pub misses: u64,
  /// Lookups that waited on another caller's in-flight computation.
  pub joins: u64,
  /// The share of lookups that did not run a supplier.
  pub hit_ratio: f64,
  /// Supplier runs that produced a value.
  pub loads: u64,
  /// Supplier runs that returned an error.
  pub load_failures: u64,
  /// Supplier runs that never finished (panic or dropped future).
  pub abandoned_loads: u64,
  /// Values handed out without being retained.
  pub uncached: u64,
  /// TTL policy evaluations that failed.
  pub ttl_failures: u64,
  /// Expiration timers the scheduler refused.
  pub schedule_failures: u64,
  /// Entries removed by their own expiration timer.
  pub expirations: u64,
  /// Entries removed by `evict`.
  pub evictions: u64,
  /// Calls to `clear`.
  pub clears: u64,
  /// The number of seconds the cache has been running.
  pub uptime_secs: u64,
}

impl fmt::Debug for MetricsSnapshot {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MetricsSnapshot")
      .field("hits", &self.hits)
      .field("misses", &self.misses)
      .field("joins", &self.joins)
      .field("hit_ratio", &format!("{:.2}%", self.hit_ratio * 100.0))
      .field("loads", &self.loads)
      .field("load_failures", &self.load_failures)
      .field("abandoned_loads", &self.abandoned_loads)
      .field("uncached", &self.uncached)
      .field("ttl_failures", &self.ttl_failures)
      .field("schedule_failures", &self.schedule_failures)
      .field("expirations", &self.expirations)
      .field("evictions", &self.evictions)
      .field("clears", &self.clears)
      .field("uptime_secs", &self.uptime_secs)
      .finish()
  }
}
