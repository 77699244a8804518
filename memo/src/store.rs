use crate::entry::{Generation, Slot, SlotState};
use crate::loader::LoadFuture;
use crate::scheduler::TimerHandle;

use core::fmt;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;

use ahash::{HashMap, HashMapExt};
use crossbeam_utils::CachePadded;
use generational_arena::{Arena, Index};
use parking_lot::RwLock;

/// The result of looking a key up with intent to load it.
pub(crate) enum Lookup<V> {
  /// A ready value.
  Hit(Arc<V>),
  /// Another caller is computing the value; wait on its future.
  Join(Arc<LoadFuture<V>>),
  /// A pending slot was installed for this caller, who must now compute it.
  Lead(Generation, Arc<LoadFuture<V>>),
}

/// One lock's worth of slots. Slots live in an arena; the index map points
/// each key at its current slot.
pub(crate) struct Shard<K, V> {
  index: HashMap<K, Index>,
  slots: Arena<Slot<V>>,
  next_generation: u64,
}

impl<K: Eq + Hash, V> Shard<K, V> {
  fn new() -> Self {
    Self {
      index: HashMap::new(),
      slots: Arena::new(),
      next_generation: 0,
    }
  }

  #[inline]
  fn get(&self, key: &K) -> Option<&Slot<V>> {
    self.index.get(key).and_then(|idx| self.slots.get(*idx))
  }

  /// Returns the slot for `key` only if it is still the given generation.
  #[inline]
  fn get_current_mut(&mut self, key: &K, generation: Generation) -> Option<&mut Slot<V>> {
    let idx = *self.index.get(key)?;
    self
      .slots
      .get_mut(idx)
      .filter(|slot| slot.generation == generation)
  }

  fn install(&mut self, key: K, future: Arc<LoadFuture<V>>) -> Generation {
    let generation = Generation(self.next_generation);
    self.next_generation += 1;
    let idx = self
      .slots
      .insert(Slot::pending(generation, future));
    self.index.insert(key, idx);
    generation
  }

  fn remove(&mut self, key: &K) -> Option<Slot<V>> {
    let idx = self.index.remove(key)?;
    self.slots.remove(idx)
  }

  fn remove_if(&mut self, key: &K, generation: Generation) -> Option<Slot<V>> {
    self.get_current_mut(key, generation)?;
    self.remove(key)
  }
}

/// A snapshot of a ready entry's bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryInfo {
  /// Clock millis at which the value was cached.
  pub cached_at_millis: u64,
  /// Clock millis at which the entry is due to evict itself; `None` for
  /// entries cached without a timer.
  pub expires_at_millis: Option<u64>,
}

/// A helper function to hash a key using a `BuildHasher`.
#[inline]
fn hash_key<K: Hash, H: BuildHasher>(hasher: &H, key: &K) -> u64 {
  hasher.hash_one(key)
}

/// A slot store that is partitioned into multiple, independently locked shards.
///
/// Every operation that changes a key's slot happens under that key's shard
/// write lock, which is what makes get-or-install, generation-checked
/// replacement and remove-plus-cancel atomic with respect to each other.
pub(crate) struct ShardedStore<K, V> {
  shards: Box<[CachePadded<RwLock<Shard<K, V>>>]>,
  hasher: ahash::RandomState,
}

impl<K, V> fmt::Debug for ShardedStore<K, V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ShardedStore")
      .field("num_shards", &self.shards.len())
      .finish()
  }
}

impl<K, V> ShardedStore<K, V>
where
  K: Eq + Hash + Clone,
{
  /// Creates a new `ShardedStore`. `num_shards` must be a power of two.
  pub(crate) fn new(num_shards: usize) -> Self {
    let shards = (0..num_shards)
      .map(|_| CachePadded::new(RwLock::new(Shard::new())))
      .collect::<Vec<_>>();

    Self {
      shards: shards.into_boxed_slice(),
      hasher: ahash::RandomState::new(),
    }
  }

  #[inline]
  fn shard(&self, key: &K) -> &RwLock<Shard<K, V>> {
    let hash = hash_key(&self.hasher, key);
    // Validated as a non-zero power of two by the builder.
    let index = hash as usize & (self.shards.len() - 1);
    &self.shards[index]
  }

  /// Returns the ready value or in-flight future for `key`, installing a new
  /// pending slot if the key is absent.
  pub(crate) fn lookup_or_install(&self, key: &K) -> Lookup<V> {
    let lock = self.shard(key);

    // Optimistic read lock.
    if let Some(found) = Self::existing(&lock.read(), key) {
      return found;
    }

    let mut shard = lock.write();
    // Another caller may have installed the key between the two locks.
    if let Some(found) = Self::existing(&shard, key) {
      return found;
    }

    let future = Arc::new(LoadFuture::new());
    let generation = shard.install(key.clone(), future.clone());
    Lookup::Lead(generation, future)
  }

  fn existing(shard: &Shard<K, V>, key: &K) -> Option<Lookup<V>> {
    shard.get(key).map(|slot| match &slot.state {
      SlotState::Ready(value) => Lookup::Hit(value.clone()),
      SlotState::Pending(future) => Lookup::Join(future.clone()),
    })
  }

  /// Turns the pending slot of `generation` into a ready one. Returns `false`
  /// if the slot was evicted in the meantime.
  pub(crate) fn promote(&self, key: &K, generation: Generation, value: Arc<V>, now: u64) -> bool {
    let mut shard = self.shard(key).write();
    match shard.get_current_mut(key, generation) {
      Some(slot) => {
        slot.state = SlotState::Ready(value);
        slot.cached_at = Some(now);
        true
      }
      None => false,
    }
  }

  /// Stores the expiration handle on the slot of `generation`. If that slot is
  /// gone the handle is handed back so the caller can cancel it.
  pub(crate) fn attach_expiration(
    &self,
    key: &K,
    generation: Generation,
    handle: TimerHandle,
    expires_at: u64,
  ) -> Result<(), TimerHandle> {
    let mut shard = self.shard(key).write();
    match shard.get_current_mut(key, generation) {
      Some(slot) => {
        slot.expiration = Some(handle);
        slot.expires_at = Some(expires_at);
        Ok(())
      }
      None => Err(handle),
    }
  }

  /// Removes the slot only if it is still the given generation.
  pub(crate) fn remove_if(&self, key: &K, generation: Generation) -> Option<Slot<V>> {
    self.shard(key).write().remove_if(key, generation)
  }

  /// Removes the slot for `key` and cancels its timer under the same lock.
  pub(crate) fn evict(&self, key: &K) -> Option<Slot<V>> {
    let mut shard = self.shard(key).write();
    let mut slot = shard.remove(key)?;
    slot.cancel_expiration();
    Some(slot)
  }

  /// Removes every slot and cancels every timer while holding all shard
  /// locks at once. The removed slots are returned so they can be dropped
  /// after the locks are released.
  pub(crate) fn drain(&self) -> Vec<Slot<V>> {
    let mut guards = self
      .shards
      .iter()
      .map(|shard| shard.write())
      .collect::<Vec<_>>();

    let mut removed = Vec::new();
    for guard in guards.iter_mut() {
      guard.index.clear();
      // Generations keep counting from `next_generation`, so a fresh arena
      // cannot produce a generation an armed timer still refers to.
      let slots = std::mem::replace(&mut guard.slots, Arena::new());
      for mut slot in slots {
        slot.cancel_expiration();
        removed.push(slot);
      }
    }
    removed
  }

  pub(crate) fn info(&self, key: &K) -> Option<EntryInfo> {
    let shard = self.shard(key).read();
    let slot = shard.get(key)?;
    Some(EntryInfo {
      cached_at_millis: slot.cached_at?,
      expires_at_millis: slot.expires_at,
    })
  }

  pub(crate) fn contains_ready(&self, key: &K) -> bool {
    self
      .shard(key)
      .read()
      .get(key)
      .is_some_and(|slot| slot.is_ready())
  }

  /// The number of slots, pending ones included.
  pub(crate) fn len(&self) -> usize {
    self.shards.iter().map(|shard| shard.read().index.len()).sum()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn lead(store: &ShardedStore<&'static str, u32>, key: &'static str) -> Generation {
    match store.lookup_or_install(&key) {
      Lookup::Lead(generation, _) => generation,
      _ => panic!("expected to lead the load for {key}"),
    }
  }

  #[test]
  fn install_then_join_then_hit() {
    let store = ShardedStore::new(4);
    let generation = lead(&store, "a");
    assert!(matches!(store.lookup_or_install(&"a"), Lookup::Join(_)));
    assert!(store.promote(&"a", generation, Arc::new(1), 10));
    assert!(matches!(store.lookup_or_install(&"a"), Lookup::Hit(v) if *v == 1));
    assert_eq!(store.len(), 1);
  }

  #[test]
  fn stale_generation_cannot_touch_new_slot() {
    let store = ShardedStore::new(1);
    let old = lead(&store, "a");
    assert!(store.evict(&"a").is_some());

    let new = lead(&store, "a");
    assert_ne!(old, new);
    assert!(!store.promote(&"a", old, Arc::new(1), 0));
    assert!(store.remove_if(&"a", old).is_none());
    assert!(store.promote(&"a", new, Arc::new(2), 0));
    assert!(store.contains_ready(&"a"));
  }

  #[test]
  fn drain_keeps_generations_unique() {
    let store = ShardedStore::new(2);
    let before = lead(&store, "a");
    assert_eq!(store.drain().len(), 1);
    assert_eq!(store.len(), 0);

    let after = lead(&store, "a");
    assert_ne!(before, after);
    assert!(store.remove_if(&"a", before).is_none());
    assert_eq!(store.len(), 1);
  }
}
