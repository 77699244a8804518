use crate::error::{BoxError, LoadError};
use crate::policy::TtlPolicy;
use crate::shared::{joined, CacheShared, LoadGuard};
use crate::store::{EntryInfo, Lookup};
use crate::ttl::Ttl;
use crate::{AsyncCache, MetricsSnapshot};

use core::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// A thread-safe, synchronous cache of computed values.
///
/// Each key is computed at most once at a time: concurrent lookups of the
/// same missing key block on the first caller's supplier and share its
/// result.
pub struct Cache<K, V> {
  pub(crate) shared: Arc<CacheShared<K, V>>,
}

impl<K, V> Clone for Cache<K, V> {
  fn clone(&self) -> Self {
    Self {
      shared: self.shared.clone(),
    }
  }
}

impl<K, V> fmt::Debug for Cache<K, V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Cache").field("shared", &self.shared).finish()
  }
}

impl<K, V> Cache<K, V>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
{
  /// Converts this synchronous `Cache` into an asynchronous `AsyncCache`.
  /// This is a zero-cost conversion.
  pub fn to_async(&self) -> AsyncCache<K, V> {
    AsyncCache {
      shared: self.shared.clone(),
    }
  }

  pub fn metrics(&self) -> MetricsSnapshot {
    self.shared.metrics.snapshot()
  }

  /// Returns the cached value for `key`, computing it with `supplier` if
  /// there is none. The value is retained for the cache's default timeout.
  ///
  /// If another thread is already computing `key`, this call blocks until
  /// that computation finishes and returns its result, error included.
  pub fn get_value<F, E>(&self, key: K, supplier: F) -> Result<Arc<V>, LoadError>
  where
    F: FnOnce() -> Result<V, E>,
    E: Into<BoxError>,
  {
    self.load(key, supplier, None)
  }

  /// Like [`get_value`](Self::get_value), with the retention decided by
  /// `policy` instead of the default timeout.
  ///
  /// A computed policy is evaluated on the calling thread after the supplier
  /// succeeds. If it fails, the value is still returned but not cached.
  pub fn get_value_with<F, E, P>(&self, key: K, supplier: F, policy: P) -> Result<Arc<V>, LoadError>
  where
    F: FnOnce() -> Result<V, E>,
    E: Into<BoxError>,
    P: Into<TtlPolicy<K>>,
  {
    self.load(key, supplier, Some(policy.into()))
  }

  fn load<F, E>(&self, key: K, supplier: F, policy: Option<TtlPolicy<K>>) -> Result<Arc<V>, LoadError>
  where
    F: FnOnce() -> Result<V, E>,
    E: Into<BoxError>,
  {
    let (generation, future) = loop {
      match self.shared.lookup(&key) {
        Lookup::Hit(value) => return Ok(value),
        Lookup::Join(future) => match joined(future.wait()) {
          Some(result) => return result,
          // The leader gave up; race for the slot again.
          None => continue,
        },
        Lookup::Lead(generation, future) => break (generation, future),
      }
    };

    let guard = LoadGuard::new(&self.shared, &key, generation, future);
    match supplier() {
      Ok(value) => {
        let resolved = match &policy {
          Some(policy) => futures_executor::block_on(policy.resolve(&key)),
          None => Ok(self.shared.default_timeout()),
        };
        Ok(guard.finish(value, resolved))
      }
      Err(error) => Err(guard.fail(error.into())),
    }
  }

  /// Removes `key`, cancelling its expiration timer. Returns `true` if a
  /// ready or in-flight entry was removed.
  ///
  /// Callers already waiting on an in-flight computation for `key` still
  /// receive its result, but that result is not cached.
  pub fn evict(&self, key: &K) -> bool {
    self.shared.evict(key)
  }

  /// Removes every entry and cancels every pending expiration.
  pub fn clear(&self) {
    self.shared.clear()
  }

  /// Returns `true` if a ready value is cached for `key`.
  pub fn contains_key(&self, key: &K) -> bool {
    self.shared.store.contains_ready(key)
  }

  /// Returns when `key` was cached and when it is due to expire.
  pub fn entry_info(&self, key: &K) -> Option<EntryInfo> {
    self.shared.entry_info(key)
  }

  /// The number of entries, including ones still being computed.
  pub fn len(&self) -> usize {
    self.shared.store.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn default_timeout(&self) -> Ttl {
    self.shared.default_timeout()
  }

  /// Changes the default timeout for subsequent lookups. Entries already
  /// cached keep their timers.
  pub fn set_default_timeout(&self, ttl: impl Into<Ttl>) {
    self.shared.set_default_timeout(ttl.into())
  }

  pub fn max_timeout(&self) -> Ttl {
    self.shared.max_timeout()
  }

  /// Changes the ceiling applied to subsequently computed TTLs.
  pub fn set_max_timeout(&self, ttl: impl Into<Ttl>) {
    self.shared.set_max_timeout(ttl.into())
  }
}
