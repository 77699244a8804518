use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;

/// A type-erased error, as returned by suppliers and TTL policies.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// The error returned by `get_value` when the supplier fails.
///
/// Every caller that joined the same in-flight computation receives a clone
/// of the same error, so the underlying source is shared behind an `Arc`.
#[derive(Debug, Clone, Error)]
#[error("value supplier failed: {source}")]
pub struct LoadError {
  #[source]
  source: Arc<dyn StdError + Send + Sync>,
}

impl LoadError {
  pub(crate) fn new(source: BoxError) -> Self {
    Self {
      source: Arc::from(source),
    }
  }

  /// Returns the error produced by the supplier.
  pub fn inner(&self) -> &(dyn StdError + Send + Sync + 'static) {
    &*self.source
  }
}

/// Errors a [`Scheduler`](crate::scheduler::Scheduler) can report when asked
/// to arrange a delayed task.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
  /// The scheduler has been stopped and accepts no more tasks.
  #[error("scheduler is shut down")]
  Shutdown,
  /// The scheduler refused the task for an implementation-specific reason.
  #[error("scheduler rejected the task: {0}")]
  Rejected(String),
}

/// Errors that can occur when parsing a [`Ttl`](crate::Ttl) from text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseTtlError {
  #[error("duration string is empty")]
  Empty,
  #[error("invalid duration '{input}': {reason}")]
  Invalid { input: String, reason: String },
}

/// Errors that can occur when building a cache.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
  /// The cache was configured with zero shards, which is not allowed.
  #[error("shard count cannot be zero")]
  ZeroShards,
  /// More shards were requested than the cache supports.
  #[error("shard count {requested} exceeds the maximum of {max}")]
  TooManyShards { requested: usize, max: usize },
}
