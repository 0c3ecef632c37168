//! Generic in-memory remote for entity tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{SyncError, SyncResult};
use crate::sync::{Remote, Snapshot};

/// Serves one stored snapshot and applies partial updates to it the way a
/// JSON API would: every key present in the update overwrites the stored one.
pub struct ScriptedRemote<S> {
  pub server: Mutex<S>,
  pub fetches: AtomicUsize,
  pub deletes: AtomicUsize,
  pub updates: Mutex<Vec<serde_json::Value>>,
}

impl<S: Snapshot> ScriptedRemote<S> {
  pub fn serving(snapshot: S) -> Arc<Self> {
    Arc::new(Self {
      server: Mutex::new(snapshot),
      fetches: AtomicUsize::new(0),
      deletes: AtomicUsize::new(0),
      updates: Mutex::new(Vec::new()),
    })
  }

  pub fn fetch_count(&self) -> usize {
    self.fetches.load(Ordering::SeqCst)
  }

  pub fn update_count(&self) -> usize {
    self.updates.lock().len()
  }
}

fn to_json<S: Snapshot>(s: &S) -> SyncResult<serde_json::Value> {
  serde_json::to_value(s).map_err(|e| SyncError::Transport(e.to_string()))
}

#[async_trait]
impl<S: Snapshot> Remote<S> for ScriptedRemote<S> {
  async fn fetch(&self, _id: &str) -> SyncResult<S> {
    self.fetches.fetch_add(1, Ordering::SeqCst);
    Ok(self.server.lock().clone())
  }

  async fn update(&self, _id: &str, partial: &S) -> SyncResult<S> {
    let patch = to_json(partial)?;
    self.updates.lock().push(patch.clone());

    let mut server = self.server.lock();
    let mut stored = to_json(&*server)?;
    if let (Some(stored), Some(patch)) = (stored.as_object_mut(), patch.as_object()) {
      for (key, value) in patch {
        stored.insert(key.clone(), value.clone());
      }
    }
    *server = serde_json::from_value(stored).map_err(|e| SyncError::Transport(e.to_string()))?;
    Ok(server.clone())
  }

  async fn delete(&self, _id: &str) -> SyncResult<()> {
    self.deletes.fetch_add(1, Ordering::SeqCst);
    Ok(())
  }
}
