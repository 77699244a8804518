use crate::loader::LoadFuture;
use crate::scheduler::TimerHandle;

use std::sync::Arc;

/// Identifies one installation of a slot for a key. A key that is evicted and
/// looked up again always gets a new generation, so a timer armed for the old
/// slot can never match the new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct Generation(pub(crate) u64);

pub(crate) enum SlotState<V> {
  /// The supplier (or the TTL policy) is still running.
  Pending(Arc<LoadFuture<V>>),
  Ready(Arc<V>),
}

/// The per-key unit of cache state.
pub(crate) struct Slot<V> {
  pub(crate) generation: Generation,
  pub(crate) state: SlotState<V>,
  /// Present only for entries cached with a finite TTL.
  pub(crate) expiration: Option<TimerHandle>,
  /// Clock millis when the slot became ready.
  pub(crate) cached_at: Option<u64>,
  /// Clock millis when the expiration timer is due.
  pub(crate) expires_at: Option<u64>,
}

impl<V> Slot<V> {
  pub(crate) fn pending(generation: Generation, future: Arc<LoadFuture<V>>) -> Self {
    Self {
      generation,
      state: SlotState::Pending(future),
      expiration: None,
      cached_at: None,
      expires_at: None,
    }
  }

  #[inline]
  pub(crate) fn is_ready(&self) -> bool {
    matches!(self.state, SlotState::Ready(_))
  }

  /// Cancels the expiration timer, if one is armed.
  pub(crate) fn cancel_expiration(&mut self) -> bool {
    match self.expiration.take() {
      Some(handle) => handle.cancel(),
      None => false,
    }
  }
}
