use crate::error::BuildError;
use crate::handles::{AsyncCache, Cache};
use crate::scheduler::{ManualScheduler, Scheduler, ThreadScheduler};
use crate::shared::{CacheShared, Timeouts};
use crate::store::ShardedStore;
use crate::time::{Clock, SystemClock};
use crate::ttl::Ttl;
#[cfg(feature = "serde")]
use crate::config::CacheConfig;

use core::fmt;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;

/// The timeout applied when a lookup names no TTL policy of its own.
pub const DEFAULT_TIMEOUT: Ttl = Ttl::from_minutes(1);

/// The ceiling every TTL is clamped to unless configured otherwise.
pub const DEFAULT_MAX_TIMEOUT: Ttl = Ttl::Unlimited;
/// The largest shard count a cache accepts.
pub const MAX_SHARDS: usize = 1 << 16;

/// A builder for creating `Cache` and `AsyncCache` instances.
pub struct CacheBuilder<K, V> {
  shards: usize,
  default_timeout: Ttl,
  max_timeout: Ttl,
  clock: Option<Arc<dyn Clock>>,
  scheduler: Option<Arc<dyn Scheduler>>,
  _key_marker: PhantomData<K>,
  _value_marker: PhantomData<V>,
}

// Manual Debug implementation for CacheBuilder.
impl<K, V> fmt::Debug for CacheBuilder<K, V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheBuilder")
      .field("shards", &self.shards)
      .field("default_timeout", &self.default_timeout)
      .field("max_timeout", &self.max_timeout)
      .field("custom_clock", &self.clock.is_some())
      .field("custom_scheduler", &self.scheduler.is_some())
      .finish()
  }
}

// --- General Configuration Methods ---
impl<K, V> CacheBuilder<K, V> {
  /// Creates a new `CacheBuilder` with default settings.
  pub fn new() -> Self {
    Self {
      shards: (num_cpus::get() * 4).clamp(1, MAX_SHARDS).next_power_of_two(),
      default_timeout: DEFAULT_TIMEOUT,
      max_timeout: DEFAULT_MAX_TIMEOUT,
      clock: None,
      scheduler: None,
      _key_marker: PhantomData,
      _value_marker: PhantomData,
    }
  }

  /// Sets the number of concurrent shards to use. Rounded up to a power of
  /// two when the cache is built; zero is rejected.
  pub fn shards(mut self, shards: usize) -> Self {
    self.shards = shards;
    self
  }

  /// Sets the TTL for lookups that do not supply a policy.
  pub fn default_timeout(mut self, ttl: impl Into<Ttl>) -> Self {
    self.default_timeout = ttl.into().normalize();
    self
  }

  /// Sets the upper bound applied to every TTL, whatever its source.
  pub fn max_timeout(mut self, ttl: impl Into<Ttl>) -> Self {
    self.max_timeout = ttl.into().normalize();
    self
  }

  /// Sets the clock used to stamp entries. Defaults to [`SystemClock`].
  pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = Some(clock);
    self
  }

  /// Sets the scheduler that runs expiration timers. Defaults to a dedicated
  /// [`ThreadScheduler`].
  pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
    self.scheduler = Some(scheduler);
    self
  }

  /// Drives both the clock and the timers from a [`ManualScheduler`], so
  /// expirations only happen when the test advances it.
  pub fn manual_time(self, scheduler: Arc<ManualScheduler>) -> Self {
    let clock = scheduler.clock();
    self.clock(clock).scheduler(scheduler)
  }

  /// Applies every setting present in `config`.
  #[cfg(feature = "serde")]
  pub fn from_config(mut self, config: &CacheConfig) -> Self {
    self.default_timeout = config.default_timeout.normalize();
    self.max_timeout = config.max_timeout.normalize();
    if let Some(shards) = config.shards {
      self.shards = shards;
    }
    self
  }
}

impl<K, V> Default for CacheBuilder<K, V> {
  fn default() -> Self {
    Self::new()
  }
}

// --- Build Methods ---
impl<K, V> CacheBuilder<K, V>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
{
  /// Builds a synchronous `Cache`.
  pub fn build(self) -> Result<Cache<K, V>, BuildError> {
    let shared = self.build_shared_core()?;
    Ok(Cache { shared })
  }

  /// Builds an asynchronous `AsyncCache`.
  pub fn build_async(self) -> Result<AsyncCache<K, V>, BuildError> {
    let shared = self.build_shared_core()?;
    Ok(AsyncCache { shared })
  }

  fn build_shared_core(self) -> Result<Arc<CacheShared<K, V>>, BuildError> {
    self.validate()?;

    let shards = self.shards.checked_next_power_of_two().ok_or(BuildError::TooManyShards {
      requested: self.shards,
      max: MAX_SHARDS,
    })?;
    let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
    let scheduler = self
      .scheduler
      .unwrap_or_else(|| Arc::new(ThreadScheduler::new()));
    let timeouts = Timeouts {
      default_timeout: self.default_timeout,
      max_timeout: self.max_timeout,
    };

    tracing::debug!(
      shards,
      default_timeout = %timeouts.default_timeout,
      max_timeout = %timeouts.max_timeout,
      "building cache"
    );

    Ok(Arc::new(CacheShared::new(
      ShardedStore::new(shards),
      timeouts,
      clock,
      scheduler,
    )))
  }

  fn validate(&self) -> Result<(), BuildError> {
    if self.shards == 0 {
      return Err(BuildError::ZeroShards);
    }
    if self.shards > MAX_SHARDS {
      return Err(BuildError::TooManyShards {
        requested: self.shards,
        max: MAX_SHARDS,
      });
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn zero_shards_is_rejected() {
    let result = CacheBuilder::<u32, u32>::new().shards(0).build();
    assert_eq!(result.err(), Some(BuildError::ZeroShards));
  }

  #[test]
  fn oversized_shard_counts_are_rejected() {
    let result = CacheBuilder::<u32, u32>::new().shards(usize::MAX).build();
    assert_eq!(
      result.err(),
      Some(BuildError::TooManyShards {
        requested: usize::MAX,
        max: MAX_SHARDS
      })
    );
    assert!(CacheBuilder::<u32, u32>::new().shards(MAX_SHARDS).build().is_ok());
  }

  #[test]
  fn timeouts_are_normalized() {
    let builder = CacheBuilder::<u32, u32>::new()
      .default_timeout(std::time::Duration::ZERO)
      .max_timeout(Ttl::from_secs(30));
    assert_eq!(builder.default_timeout, Ttl::Zero);
    assert_eq!(builder.max_timeout, Ttl::from_secs(30));
  }

  #[test]
  fn defaults() {
    let cache = CacheBuilder::<u32, u32>::default().build().unwrap();
    assert_eq!(cache.default_timeout(), DEFAULT_TIMEOUT);
    assert_eq!(cache.max_timeout(), Ttl::Unlimited);
  }
}
