use crate::error::{BoxError, LoadError};
use crate::policy::TtlPolicy;
use crate::shared::{joined, CacheShared, LoadGuard};
use crate::store::{EntryInfo, Lookup};
use crate::ttl::Ttl;
use crate::{Cache, MetricsSnapshot};

use core::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

/// A thread-safe, asynchronous cache of computed values.
///
/// Waiting on another task's in-flight computation suspends instead of
/// blocking. Dropping the future of the task that is computing a value
/// abandons that computation; tasks waiting on it then retry.
pub struct AsyncCache<K, V> {
  pub(crate) shared: Arc<CacheShared<K, V>>,
}

impl<K, V> Clone for AsyncCache<K, V> {
  fn clone(&self) -> Self {
    Self {
      shared: self.shared.clone(),
    }
  }
}

impl<K, V> fmt::Debug for AsyncCache<K, V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("AsyncCache").field("shared", &self.shared).finish()
  }
}

impl<K, V> AsyncCache<K, V>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
{
  /// Converts this asynchronous `AsyncCache` into a synchronous `Cache`.
  /// This is a zero-cost conversion.
  pub fn to_sync(&self) -> Cache<K, V> {
    Cache {
      shared: self.shared.clone(),
    }
  }

  pub fn metrics(&self) -> MetricsSnapshot {
    self.shared.metrics.snapshot()
  }

  /// Returns the cached value for `key`, computing it with `supplier` if
  /// there is none, and retains it for the default timeout.
  pub async fn get_value<F, Fut, E>(&self, key: K, supplier: F) -> Result<Arc<V>, LoadError>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<V, E>>,
    E: Into<BoxError>,
  {
    self.load(key, supplier, None).await
  }

  /// Like [`get_value`](Self::get_value), with the retention decided by
  /// `policy`.
  pub async fn get_value_with<F, Fut, E, P>(
    &self,
    key: K,
    supplier: F,
    policy: P,
  ) -> Result<Arc<V>, LoadError>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<V, E>>,
    E: Into<BoxError>,
    P: Into<TtlPolicy<K>>,
  {
    self.load(key, supplier, Some(policy.into())).await
  }

  async fn load<F, Fut, E>(
    &self,
    key: K,
    supplier: F,
    policy: Option<TtlPolicy<K>>,
  ) -> Result<Arc<V>, LoadError>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<V, E>>,
    E: Into<BoxError>,
  {
    let (generation, future) = loop {
      match self.shared.lookup(&key) {
        Lookup::Hit(value) => return Ok(value),
        Lookup::Join(future) => match joined((&*future).await) {
          Some(result) => return result,
          None => continue,
        },
        Lookup::Lead(generation, future) => break (generation, future),
      }
    };

    let guard = LoadGuard::new(&self.shared, &key, generation, future);
    match supplier().await {
      Ok(value) => {
        let resolved = match &policy {
          Some(policy) => policy.resolve(&key).await,
          None => Ok(self.shared.default_timeout()),
        };
        Ok(guard.finish(value, resolved))
      }
      Err(error) => Err(guard.fail(error.into())),
    }
  }

  /// Removes `key`, cancelling its expiration timer.
  pub fn evict(&self, key: &K) -> bool {
    self.shared.evict(key)
  }

  /// Removes every entry and cancels every pending expiration.
  pub fn clear(&self) {
    self.shared.clear()
  }

  pub fn contains_key(&self, key: &K) -> bool {
    self.shared.store.contains_ready(key)
  }

  pub fn entry_info(&self, key: &K) -> Option<EntryInfo> {
    self.shared.entry_info(key)
  }

  pub fn len(&self) -> usize {
    self.shared.store.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn default_timeout(&self) -> Ttl {
    self.shared.default_timeout()
  }

  pub fn set_default_timeout(&self, ttl: impl Into<Ttl>) {
    self.shared.set_default_timeout(ttl.into())
  }

  pub fn max_timeout(&self) -> Ttl {
    self.shared.max_timeout()
  }

  pub fn set_max_timeout(&self, ttl: impl Into<Ttl>) {
    self.shared.set_max_timeout(ttl.into())
  }
}
