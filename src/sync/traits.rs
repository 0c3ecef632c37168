//! Core traits for synchronized entities and their remote collaborators.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::SyncResult;

/// Wire-shaped record mirroring one remote entity.
///
/// A default-constructed snapshot is the empty partial update: every
/// optional field is absent and serializes to nothing.
pub trait Snapshot: Clone + Default + Send + Sync + Serialize + DeserializeOwned + 'static {
  /// Entity type name for logging and error reporting (e.g., "attachment", "action")
  const KIND: &'static str;

  /// Remote identifier. Empty when the record carries no id (sub-resources).
  fn id(&self) -> &str;

  fn set_id(&mut self, id: String);
}

/// Fetch/update/delete contract for one entity type.
///
/// Implementations own endpoint selection, wire encoding, and authorization.
/// A missing remote entity is reported as [`SyncError::NotFound`].
///
/// [`SyncError::NotFound`]: crate::error::SyncError::NotFound
#[async_trait]
pub trait Remote<S: Snapshot>: Send + Sync {
  async fn fetch(&self, id: &str) -> SyncResult<S>;

  /// Send a partial snapshot. The server may normalize or add fields.
  async fn update(&self, id: &str, partial: &S) -> SyncResult<S>;

  async fn delete(&self, id: &str) -> SyncResult<()>;
}
