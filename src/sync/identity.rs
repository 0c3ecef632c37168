//! Identity cache guaranteeing one live instance per (entity type, id).

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

type Key = (TypeId, String);

/// Map from (entity type, id) to the single live domain instance.
///
/// Entries never expire; use [`IdentityCache::remove`] after a delete and
/// [`IdentityCache::clear`] at teardown.
#[derive(Clone, Default)]
pub struct IdentityCache {
  entries: Arc<RwLock<HashMap<Key, Arc<dyn Any + Send + Sync>>>>,
}

impl IdentityCache {
  pub fn new() -> Self {
    Self::default()
  }

  fn key<T: Any>(id: &str) -> Key {
    (TypeId::of::<T>(), id.to_string())
  }

  /// Look up an existing instance.
  pub fn find<T: Any + Send + Sync>(&self, id: &str) -> Option<Arc<T>> {
    let entries = self.entries.read();
    entries
      .get(&Self::key::<T>(id))
      .and_then(|e| Arc::clone(e).downcast::<T>().ok())
  }

  /// Return the instance for `id`, constructing it with `factory` if absent.
  ///
  /// The factory runs outside the lock. When two callers race on the same
  /// key, the first insert wins and the other constructed instance is dropped.
  pub fn get_or_add<T, F>(&self, id: &str, factory: F) -> Arc<T>
  where
    T: Any + Send + Sync,
    F: FnOnce() -> Arc<T>,
  {
    if let Some(found) = self.find::<T>(id) {
      return found;
    }

    let candidate = factory();
    let mut entries = self.entries.write();
    let winner = entries
      .entry(Self::key::<T>(id))
      .or_insert_with(|| {
        trace!(id, "identity cache insert");
        candidate.clone() as Arc<dyn Any + Send + Sync>
      })
      .clone();
    drop(entries);

    // The key carries the TypeId, so the downcast only fails on a logic error.
    winner.downcast::<T>().unwrap_or(candidate)
  }

  /// Fallible variant of [`IdentityCache::get_or_add`].
  pub fn try_get_or_add<T, E, F>(&self, id: &str, factory: F) -> Result<Arc<T>, E>
  where
    T: Any + Send + Sync,
    F: FnOnce() -> Result<Arc<T>, E>,
  {
    if let Some(found) = self.find::<T>(id) {
      return Ok(found);
    }
    let candidate = factory()?;
    Ok(self.get_or_add(id, || candidate))
  }

  /// Evict an identity so the next lookup constructs a fresh instance.
  pub fn remove<T: Any + Send + Sync>(&self, id: &str) -> Option<Arc<T>> {
    self
      .entries
      .write()
      .remove(&Self::key::<T>(id))
      .and_then(|e| e.downcast::<T>().ok())
  }

  pub fn contains<T: Any>(&self, id: &str) -> bool {
    self.entries.read().contains_key(&Self::key::<T>(id))
  }

  pub fn len(&self) -> usize {
    self.entries.read().len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.read().is_empty()
  }

  pub fn clear(&self) {
    self.entries.write().clear();
  }
}

impl std::fmt::Debug for IdentityCache {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("IdentityCache")
      .field("len", &self.len())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Barrier;

  #[derive(Debug)]
  struct Board {
    id: String,
  }

  #[derive(Debug)]
  struct Card;

  #[test]
  fn test_get_or_add_returns_existing() {
    let cache = IdentityCache::new();
    let first = cache.get_or_add("b1", || {
      Arc::new(Board {
        id: "b1".into(),
      })
    });
    let second = cache.get_or_add::<Board, _>("b1", || panic!("factory must not run for a cached id"));
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(second.id, "b1");
  }

  #[test]
  fn test_keys_are_per_type() {
    let cache = IdentityCache::new();
    cache.get_or_add("x", || Arc::new(Board { id: "x".into() }));
    assert!(cache.find::<Card>("x").is_none());
    cache.get_or_add("x", || Arc::new(Card));
    assert_eq!(cache.len(), 2);
  }

  #[test]
  fn test_concurrent_first_construction_has_single_winner() {
    let cache = IdentityCache::new();
    let built = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = (0..2)
      .map(|_| {
        let cache = cache.clone();
        let built = Arc::clone(&built);
        let barrier = Arc::clone(&barrier);
        std::thread::spawn(move || {
          barrier.wait();
          cache.get_or_add("X", || {
            built.fetch_add(1, Ordering::SeqCst);
            Arc::new(Board { id: "X".into() })
          })
        })
      })
      .collect();

    let results: Vec<Arc<Board>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(Arc::ptr_eq(&results[0], &results[1]));
    assert!(built.load(Ordering::SeqCst) >= 1);
    assert_eq!(cache.len(), 1);
  }

  #[test]
  fn test_remove_forces_fresh_instance() {
    let cache = IdentityCache::new();
    let first = cache.get_or_add("b1", || Arc::new(Board { id: "b1".into() }));
    assert!(cache.remove::<Board>("b1").is_some());
    assert!(!cache.contains::<Board>("b1"));

    let second = cache.get_or_add("b1", || Arc::new(Board { id: "b1".into() }));
    assert!(!Arc::ptr_eq(&first, &second));
  }

  #[test]
  fn test_try_get_or_add_propagates_factory_error() {
    let cache = IdentityCache::new();
    let result: Result<Arc<Board>, &str> = cache.try_get_or_add("b1", || Err("offline"));
    assert_eq!(result.unwrap_err(), "offline");
    assert!(cache.is_empty());
  }
}
