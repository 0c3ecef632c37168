//! Error types for the synchronization engine and its collaborators.

use thiserror::Error;

use crate::sync::ValidationFault;

/// Result type for synchronization operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors surfaced by fetch, submit, delete and field writes.
///
/// The enum is `Clone` so one submit outcome can be handed to every write
/// that was coalesced into it.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
  /// A local rule rejected a field write. Never reaches the network.
  #[error("validation failed: {0}")]
  Validation(#[from] ValidationFault),

  /// The remote entity does not exist.
  #[error("{kind} {id} not found")]
  NotFound { kind: &'static str, id: String },

  /// The server rejected an update or delete.
  #[error("rejected by server: {0}")]
  Conflict(String),

  /// Network failure, server error, or an undecodable response.
  #[error("transport error: {0}")]
  Transport(String),

  /// Unknown property name or a value of the wrong type for it.
  #[error("property error: {0}")]
  Property(String),
}

impl SyncError {
  pub fn is_not_found(&self) -> bool {
    matches!(self, SyncError::NotFound { .. })
  }
}

impl From<reqwest::Error> for SyncError {
  fn from(e: reqwest::Error) -> Self {
    SyncError::Transport(e.to_string())
  }
}
