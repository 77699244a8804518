//! Per-call rules for how long a computed value lives.

use crate::error::BoxError;
use crate::ttl::Ttl;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

/// The deferred result of a computed TTL.
pub type TtlFuture = BoxFuture<'static, Result<Ttl, BoxError>>;

/// A per-key TTL function. Returning `Err` is a synchronous failure; a future
/// that resolves to `Err` is an asynchronous one. Both mean "do not cache".
pub type TtlFn<K> = Arc<dyn Fn(&K) -> Result<TtlFuture, BoxError> + Send + Sync>;

/// Decides the lifetime of a freshly computed value.
///
/// Whatever the policy yields is still clamped to the cache's max timeout.
pub enum TtlPolicy<K> {
  Fixed(Ttl),
  Computed(TtlFn<K>),
}

impl<K: 'static> TtlPolicy<K> {
  /// A policy computed asynchronously from the key.
  pub fn computed<F, Fut>(f: F) -> Self
  where
    F: Fn(&K) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Ttl, BoxError>> + Send + 'static,
  {
    let policy_fn: TtlFn<K> = Arc::new(move |key: &K| -> Result<TtlFuture, BoxError> { Ok(f(key).boxed()) });
    TtlPolicy::Computed(policy_fn)
  }

  /// A policy whose function may also fail before producing its future.
  pub fn try_computed<F, Fut>(f: F) -> Self
  where
    F: Fn(&K) -> Result<Fut, BoxError> + Send + Sync + 'static,
    Fut: Future<Output = Result<Ttl, BoxError>> + Send + 'static,
  {
    let policy_fn: TtlFn<K> = Arc::new(move |key: &K| -> Result<TtlFuture, BoxError> {
      f(key).map(|fut| fut.boxed())
    });
    TtlPolicy::Computed(policy_fn)
  }
}

impl<K> TtlPolicy<K> {
  /// Evaluates the policy for `key`. Fixed policies resolve without
  /// suspending.
  pub(crate) async fn resolve(&self, key: &K) -> Result<Ttl, BoxError> {
    match self {
      TtlPolicy::Fixed(ttl) => Ok(*ttl),
      TtlPolicy::Computed(f) => f(key)?.await,
    }
  }
}

impl<K> Clone for TtlPolicy<K> {
  fn clone(&self) -> Self {
    match self {
      TtlPolicy::Fixed(ttl) => TtlPolicy::Fixed(*ttl),
      TtlPolicy::Computed(f) => TtlPolicy::Computed(f.clone()),
    }
  }
}

impl<K> From<Ttl> for TtlPolicy<K> {
  fn from(ttl: Ttl) -> Self {
    TtlPolicy::Fixed(ttl)
  }
}

impl<K> From<std::time::Duration> for TtlPolicy<K> {
  fn from(duration: std::time::Duration) -> Self {
    TtlPolicy::Fixed(Ttl::from(duration))
  }
}

impl<K> fmt::Debug for TtlPolicy<K> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TtlPolicy::Fixed(ttl) => f.debug_tuple("Fixed").field(ttl).finish(),
      TtlPolicy::Computed(_) => f.write_str("Computed(..)"),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use futures_executor::block_on;

  #[test]
  fn fixed_policy_resolves_to_itself() {
    let policy: TtlPolicy<u32> = Ttl::from_secs(5).into();
    assert_eq!(block_on(policy.resolve(&1)).unwrap(), Ttl::from_secs(5));
  }

  #[test]
  fn computed_policy_sees_the_key() {
    let policy = TtlPolicy::computed(|key: &u64| {
      let secs = *key;
      async move { Ok::<_, BoxError>(Ttl::from_secs(secs)) }
    });
    assert_eq!(block_on(policy.resolve(&9)).unwrap(), Ttl::from_secs(9));
  }

  #[test]
  fn both_failure_modes_surface_as_err() {
    let sync_fail: TtlPolicy<u32> =
      TtlPolicy::try_computed(|_| Err::<futures_util::future::Ready<_>, _>("no ttl".into()));
    let async_fail: TtlPolicy<u32> =
      TtlPolicy::computed(|_| async { Err::<Ttl, BoxError>("lookup failed".into()) });

    assert_eq!(block_on(sync_fail.resolve(&1)).unwrap_err().to_string(), "no ttl");
    assert_eq!(block_on(async_fail.resolve(&1)).unwrap_err().to_string(), "lookup failed");
  }
}
