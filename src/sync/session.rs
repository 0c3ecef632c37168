//! Explicit, injectable home for process-wide synchronization state.
//!
//! A [`Session`] bundles the identity cache, the collaborators used to build
//! entities reached by reference, and the timing settings shared by every
//! context. Create one at startup, pass it to every entity constructor, and
//! call [`Session::teardown`] when done.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::debug;

use crate::error::{SyncError, SyncResult};

use super::identity::IdentityCache;
use super::traits::{Remote, Snapshot};

/// Timing knobs shared by every context of a session.
#[derive(Debug, Clone)]
pub struct SyncSettings {
  /// How long a scheduled submit waits to collect further writes
  pub submit_delay: Duration,
  /// How long fetched data counts as fresh
  pub refresh_throttle: chrono::Duration,
}

impl Default for SyncSettings {
  fn default() -> Self {
    Self {
      submit_delay: Duration::from_millis(100),
      refresh_throttle: chrono::Duration::minutes(5),
    }
  }
}

struct SessionInner {
  identities: IdentityCache,
  remotes: RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
  settings: SyncSettings,
}

/// Shared synchronization state. Cloning is cheap and yields the same session.
#[derive(Clone)]
pub struct Session {
  inner: Arc<SessionInner>,
}

impl Session {
  pub fn new(settings: SyncSettings) -> Self {
    Self {
      inner: Arc::new(SessionInner {
        identities: IdentityCache::new(),
        remotes: RwLock::new(HashMap::new()),
        settings,
      }),
    }
  }

  pub fn identities(&self) -> &IdentityCache {
    &self.inner.identities
  }

  pub fn settings(&self) -> &SyncSettings {
    &self.inner.settings
  }

  /// Register the collaborator used for entities of type `S` that are
  /// constructed while resolving references.
  pub fn register_remote<S: Snapshot>(&self, remote: Arc<dyn Remote<S>>) {
    let erased: Arc<dyn Any + Send + Sync> = Arc::new(remote);
    self
      .inner
      .remotes
      .write()
      .insert(TypeId::of::<S>(), erased);
  }

  pub fn remote<S: Snapshot>(&self) -> SyncResult<Arc<dyn Remote<S>>> {
    self
      .inner
      .remotes
      .read()
      .get(&TypeId::of::<S>())
      .and_then(|r| r.downcast_ref::<Arc<dyn Remote<S>>>())
      .cloned()
      .ok_or_else(|| SyncError::Property(format!("no remote registered for {}", S::KIND)))
  }

  /// Drop every cached entity and registered collaborator.
  ///
  /// Entities hold their session, so this also breaks the
  /// cache -> entity -> session reference loop.
  pub fn teardown(&self) {
    let evicted = self.inner.identities.len();
    self.inner.identities.clear();
    self.inner.remotes.write().clear();
    debug!(evicted, "session torn down");
  }

  pub fn ptr_eq(&self, other: &Session) -> bool {
    Arc::ptr_eq(&self.inner, &other.inner)
  }
}

impl Default for Session {
  fn default() -> Self {
    Self::new(SyncSettings::default())
  }
}

impl std::fmt::Debug for Session {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Session")
      .field("entities", &self.inner.identities.len())
      .field("settings", &self.inner.settings)
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::sync::testing::{widget, MockRemote, Widget};

  #[test]
  fn test_remote_lookup_by_snapshot_type() {
    let session = Session::default();
    assert!(session.remote::<Widget>().is_err());

    let remote: Arc<dyn Remote<Widget>> = MockRemote::serving(widget("w1", 1, 2));
    session.register_remote(remote);
    assert!(session.remote::<Widget>().is_ok());
  }

  #[test]
  fn test_teardown_clears_state() {
    let session = Session::default();
    session.identities().get_or_add("x", || Arc::new(5u8));
    let remote: Arc<dyn Remote<Widget>> = MockRemote::serving(widget("w1", 1, 2));
    session.register_remote(remote);

    session.teardown();
    assert!(session.identities().is_empty());
    assert!(session.remote::<Widget>().is_err());
  }
}
