//! An expiring, compute-once value cache.
//!
//! Values are produced on demand by a caller-supplied function and shared
//! behind an `Arc<V>`, so `V` never needs to be `Clone`.
//!
//! # Features
//! - **Single-flight loads**: concurrent lookups of a missing key run the
//!   supplier once and all receive its result, error included.
//! - **Sync & Async**: a blocking [`Cache`] and a non-blocking [`AsyncCache`]
//!   over the same storage, convertible at no cost.
//! - **Per-call retention**: each lookup can keep its value for a fixed
//!   [`Ttl`], forever, not at all, or for a duration computed asynchronously
//!   from the key. Every TTL is clamped to a configurable maximum.
//! - **Self-eviction**: finite entries remove themselves through a pluggable
//!   [`Scheduler`]. Explicit eviction and `clear` cancel pending timers, and a
//!   stale timer can never remove a newer entry for the same key.
//! - **Deterministic time**: [`ManualScheduler`] drives both the clock and the
//!   timers, for tests.
//!
//! ```
//! use fibre_memo::{CacheBuilder, Ttl};
//!
//! let cache = CacheBuilder::<String, String>::new()
//!   .default_timeout(Ttl::from_secs(30))
//!   .build()
//!   .unwrap();
//!
//! let value = cache
//!   .get_value("greeting".to_string(), || Ok::<_, std::io::Error>("hello".to_string()))
//!   .unwrap();
//! assert_eq!(*value, "hello");
//! ```

// Public modules that form the API
pub mod builder;
#[cfg(feature = "serde")]
pub mod config;
pub mod error;
pub mod handles;
pub mod metrics;
pub mod policy;
pub mod scheduler;
pub mod time;
pub mod ttl;

// Internal, crate-only modules
mod entry;
mod loader;
mod shared;
mod store;

// Re-export the primary user-facing types for convenience
pub use builder::CacheBuilder;
#[cfg(feature = "serde")]
pub use config::CacheConfig;
pub use error::{BoxError, BuildError, LoadError, ParseTtlError, ScheduleError};
pub use handles::{AsyncCache, Cache};
pub use metrics::MetricsSnapshot;
pub use policy::{TtlFuture, TtlPolicy};
#[cfg(feature = "tokio")]
pub use scheduler::TokioScheduler;
pub use scheduler::{Cancel, ManualScheduler, Scheduler, Task, ThreadScheduler, TimerHandle, TimerState};
pub use store::EntryInfo;
pub use time::{Clock, ManualClock, SystemClock};
pub use ttl::Ttl;
