use crate::entry::Generation;
use crate::error::{BoxError, LoadError};
use crate::loader::{LoadFuture, Outcome};
use crate::metrics::Metrics;
use crate::scheduler::{Scheduler, Task};
use crate::store::{EntryInfo, Lookup, ShardedStore};
use crate::time::{saturating_millis, Clock};
use crate::ttl::Ttl;

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

#[derive(Debug, Clone, Copy)]
pub(crate) struct Timeouts {
  pub(crate) default_timeout: Ttl,
  pub(crate) max_timeout: Ttl,
}

/// The internal, thread-safe core of the cache, shared by the sync and
/// async handles.
pub(crate) struct CacheShared<K, V> {
  pub(crate) store: ShardedStore<K, V>,
  pub(crate) metrics: Metrics,
  timeouts: RwLock<Timeouts>,
  clock: Arc<dyn Clock>,
  scheduler: Arc<dyn Scheduler>,
}

impl<K, V> fmt::Debug for CacheShared<K, V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheShared")
      .field("store", &self.store)
      .field("timeouts", &*self.timeouts.read())
      .field("metrics", &self.metrics.snapshot())
      .finish_non_exhaustive()
  }
}

impl<K, V> CacheShared<K, V>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
{
  pub(crate) fn new(
    store: ShardedStore<K, V>,
    timeouts: Timeouts,
    clock: Arc<dyn Clock>,
    scheduler: Arc<dyn Scheduler>,
  ) -> Self {
    Self {
      store,
      metrics: Metrics::new(),
      timeouts: RwLock::new(timeouts),
      clock,
      scheduler,
    }
  }

  pub(crate) fn default_timeout(&self) -> Ttl {
    self.timeouts.read().default_timeout
  }

  pub(crate) fn set_default_timeout(&self, ttl: Ttl) {
    self.timeouts.write().default_timeout = ttl.normalize();
  }

  pub(crate) fn max_timeout(&self) -> Ttl {
    self.timeouts.read().max_timeout
  }

  pub(crate) fn set_max_timeout(&self, ttl: Ttl) {
    self.timeouts.write().max_timeout = ttl.normalize();
  }

  /// Looks `key` up, installing a pending slot when it is absent, and
  /// records the kind of lookup.
  pub(crate) fn lookup(&self, key: &K) -> Lookup<V> {
    let lookup = self.store.lookup_or_install(key);
    let counter = match &lookup {
      Lookup::Hit(_) => &self.metrics.hits,
      Lookup::Join(_) => &self.metrics.joins,
      Lookup::Lead(..) => &self.metrics.misses,
    };
    Metrics::incr(counter);
    lookup
  }

  /// Explicit eviction. The slot's timer is cancelled under the shard lock.
  pub(crate) fn evict(&self, key: &K) -> bool {
    match self.store.evict(key) {
      Some(slot) => {
        Metrics::incr(&self.metrics.evictions);
        tracing::debug!(
          generation = slot.generation.0,
          was_ready = slot.is_ready(),
          "evicted cache entry"
        );
        true
      }
      None => false,
    }
  }

  pub(crate) fn clear(&self) {
    let removed = self.store.drain();
    Metrics::incr(&self.metrics.clears);
    tracing::debug!(removed = removed.len(), "cleared cache");
    // Values are dropped here, after every shard lock has been released.
    drop(removed);
  }

  pub(crate) fn entry_info(&self, key: &K) -> Option<EntryInfo> {
    self.store.info(key)
  }

  /// Decides whether, and for how long, a freshly computed value is kept.
  fn retain(self: &Arc<Self>, key: &K, generation: Generation, value: &Arc<V>, resolved: Result<Ttl, BoxError>) {
    let ttl = match resolved {
      Ok(ttl) => ttl.clamp_to(self.max_timeout()),
      Err(error) => {
        Metrics::incr(&self.metrics.ttl_failures);
        tracing::warn!(error = %error, generation = generation.0, "ttl policy failed, value not cached");
        self.discard(key, generation);
        return;
      }
    };

    match ttl {
      Ttl::Zero => self.discard(key, generation),
      Ttl::Unlimited => {
        self
          .store
          .promote(key, generation, value.clone(), self.clock.now_millis());
      }
      Ttl::Finite(delay) => self.arm(key, generation, value, delay),
    }
  }

  fn discard(&self, key: &K, generation: Generation) {
    Metrics::incr(&self.metrics.uncached);
    self.store.remove_if(key, generation);
  }

  /// Promotes the slot and schedules its self-eviction. The scheduler is
  /// called without any shard lock held.
  fn arm(self: &Arc<Self>, key: &K, generation: Generation, value: &Arc<V>, delay: Duration) {
    let now = self.clock.now_millis();
    if !self.store.promote(key, generation, value.clone(), now) {
      tracing::trace!(generation = generation.0, "slot evicted while loading");
      return;
    }

    let task = self.expiration_task(key.clone(), generation);
    match self.scheduler.schedule(task, delay) {
      Ok(handle) => {
        let expires_at = now.saturating_add(saturating_millis(delay));
        if let Err(handle) = self
          .store
          .attach_expiration(key, generation, handle, expires_at)
        {
          // Evicted between promotion and attachment.
          handle.cancel();
        }
      }
      Err(error) => {
        Metrics::incr(&self.metrics.schedule_failures);
        tracing::warn!(error = %error, generation = generation.0, "could not schedule expiration, value not cached");
        self.discard(key, generation);
      }
    }
  }

  /// Builds the self-eviction task for one generation of `key`. It holds the
  /// cache weakly so pending timers do not keep a dropped cache alive.
  fn expiration_task(self: &Arc<Self>, key: K, generation: Generation) -> Task {
    let shared = Arc::downgrade(self);
    Box::new(move || {
      if let Some(shared) = shared.upgrade() {
        shared.expire(&key, generation);
      }
    })
  }

  fn expire(&self, key: &K, generation: Generation) {
    match self.store.remove_if(key, generation) {
      Some(_) => {
        Metrics::incr(&self.metrics.expirations);
        tracing::trace!(generation = generation.0, "cache entry expired");
      }
      None => {
        tracing::trace!(generation = generation.0, "stale expiration ignored");
      }
    }
  }
}

/// Held by the caller that installed a pending slot. It settles the slot and
/// wakes every joined waiter exactly once; if it is dropped unsettled (the
/// supplier panicked or the async caller went away), the slot is removed and
/// waiters are told to retry.
pub(crate) struct LoadGuard<'a, K, V>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
{
  shared: &'a Arc<CacheShared<K, V>>,
  key: &'a K,
  generation: Generation,
  future: Arc<LoadFuture<V>>,
  settled: bool,
}

impl<'a, K, V> LoadGuard<'a, K, V>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
{
  pub(crate) fn new(
    shared: &'a Arc<CacheShared<K, V>>,
    key: &'a K,
    generation: Generation,
    future: Arc<LoadFuture<V>>,
  ) -> Self {
    Self {
      shared,
      key,
      generation,
      future,
      settled: false,
    }
  }

  /// The supplier produced a value and the TTL policy was evaluated.
  ///
  /// The guard stays armed until retention is decided, so a collaborator
  /// that panics in between still takes the abandoned path.
  pub(crate) fn finish(mut self, value: V, resolved: Result<Ttl, BoxError>) -> Arc<V> {
    Metrics::incr(&self.shared.metrics.loads);

    let value = Arc::new(value);
    self.shared.retain(self.key, self.generation, &value, resolved);
    self.settled = true;
    self.future.complete(Outcome::Loaded(value.clone()));
    value
  }

  /// The supplier failed. Nothing is cached and every waiter gets the error.
  pub(crate) fn fail(mut self, error: BoxError) -> LoadError {
    self.settled = true;
    Metrics::incr(&self.shared.metrics.load_failures);

    let error = LoadError::new(error);
    tracing::debug!(generation = self.generation.0, error = %error, "supplier failed");
    self.shared.store.remove_if(self.key, self.generation);
    self.future.complete(Outcome::Failed(error.clone()));
    error
  }
}

impl<'a, K, V> Drop for LoadGuard<'a, K, V>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
{
  fn drop(&mut self) {
    if self.settled {
      return;
    }
    Metrics::incr(&self.shared.metrics.abandoned_loads);
    tracing::debug!(generation = self.generation.0, "load abandoned before completion");
    self.shared.store.remove_if(self.key, self.generation);
    self.future.complete(Outcome::Abandoned);
  }
}

/// Maps a waiter's view of an in-flight load. `None` means the leader gave up
/// and the lookup must be retried.
pub(crate) fn joined<V>(outcome: Outcome<V>) -> Option<Result<Arc<V>, LoadError>> {
  match outcome {
    Outcome::Loaded(value) => Some(Ok(value)),
    Outcome::Failed(error) => Some(Err(error)),
    Outcome::Abandoned => None,
  }
}
