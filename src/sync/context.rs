//! Per-entity synchronization context.
//!
//! A [`SyncContext`] owns one snapshot and its dirty set and drives every
//! network interaction for that entity:
//!
//! 1. `ensure_fresh` fetches when the data was never loaded, was expired, or is
//!    older than the refresh throttle. Concurrent callers share one fetch.
//! 2. Field writes stage a value and schedule a submit after a short delay so
//!    that writes made together go out as one update.
//! 3. `submit` sends only the dirty properties (plus any dependent context's
//!    changes), merges the server's answer, and clears what was accepted.
//! 4. `delete` freezes the context; later fetches and submits do nothing.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};

use super::core::{finish_read, Core, DirtyMarks};
use super::dependent::Dependent;
use super::field::{FieldSource, SubmitHandle, SubmitOutcome};
use super::property::{PropertyRegistry, Value};
use super::session::Session;
use super::traits::{Remote, Snapshot};

/// Observable state of a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
  /// Never loaded
  Uninitialized,
  /// A fetch is in flight
  Loading,
  /// Loaded and within the refresh throttle
  Fresh,
  /// Expired or past the refresh throttle; the next read refetches
  Stale,
  /// Local edits are waiting to be submitted
  Dirty,
  /// Deleted locally or remotely; data is frozen
  Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Freshness {
  Uninitialized,
  Loading,
  Fresh,
  Stale,
}

/// Callback invoked with the names of properties that changed in a merge.
pub type Subscriber = Arc<dyn Fn(&[&'static str]) + Send + Sync>;

/// Callback invoked with the new id when a merge replaces the entity's id.
pub type IdListener = Arc<dyn Fn(&str) + Send + Sync>;

/// Result of folding a payload into the context.
struct Merged {
  changed: Vec<&'static str>,
  corrected_id: Option<String>,
}

struct Inner<S> {
  core: Core<S>,
  freshness: Freshness,
  fetched_at: Option<DateTime<Utc>>,
  /// Set by the first successful fetch this context performed itself.
  has_fetched: bool,
  /// Bumped whenever a fetch completes, so callers queued behind it can
  /// tell that it ran.
  fetch_seq: u64,
  /// Error of the most recent fetch, shared with callers that waited on it.
  fetch_error: Option<SyncError>,
  deleted: bool,
  scheduled: Option<watch::Receiver<SubmitOutcome>>,
}

/// Synchronization state machine for one remote entity.
pub struct SyncContext<S: Snapshot> {
  this: Weak<Self>,
  registry: &'static PropertyRegistry<S>,
  remote: Arc<dyn Remote<S>>,
  session: Session,
  inner: Mutex<Inner<S>>,
  fetch_gate: tokio::sync::Mutex<()>,
  submit_gate: tokio::sync::Mutex<()>,
  dependents: Vec<Arc<dyn Dependent<S>>>,
  subscribers: Mutex<Vec<Subscriber>>,
  id_listeners: Mutex<Vec<IdListener>>,
}

impl<S: Snapshot> SyncContext<S> {
  /// Create a context for a bare id. Nothing is fetched until a read needs it.
  pub fn new(
    id: impl Into<String>,
    registry: &'static PropertyRegistry<S>,
    remote: Arc<dyn Remote<S>>,
    session: Session,
  ) -> Arc<Self> {
    Self::with_dependents(id, registry, remote, session, |_| Vec::new())
  }

  /// Create a context that owns dependent contexts for sub-resources.
  ///
  /// `build` receives a weak handle to the context under construction so the
  /// dependents can reach back to it without owning it.
  pub fn with_dependents<F>(
    id: impl Into<String>,
    registry: &'static PropertyRegistry<S>,
    remote: Arc<dyn Remote<S>>,
    session: Session,
    build: F,
  ) -> Arc<Self>
  where
    F: FnOnce(&Weak<Self>) -> Vec<Arc<dyn Dependent<S>>>,
  {
    let mut data = S::default();
    data.set_id(id.into());

    Arc::new_cyclic(|this| Self {
      this: this.clone(),
      registry,
      remote,
      session,
      inner: Mutex::new(Inner {
        core: Core::new(data),
        freshness: Freshness::Uninitialized,
        fetched_at: None,
        has_fetched: false,
        fetch_seq: 0,
        fetch_error: None,
        deleted: false,
        scheduled: None,
      }),
      fetch_gate: tokio::sync::Mutex::new(()),
      submit_gate: tokio::sync::Mutex::new(()),
      dependents: build(this),
      subscribers: Mutex::new(Vec::new()),
      id_listeners: Mutex::new(Vec::new()),
    })
  }

  pub fn id(&self) -> String {
    self.inner.lock().core.id().to_string()
  }

  pub fn session(&self) -> &Session {
    &self.session
  }

  pub fn registry(&self) -> &'static PropertyRegistry<S> {
    self.registry
  }

  /// Copy of the current snapshot, without pending local edits.
  pub fn snapshot(&self) -> S {
    self.inner.lock().core.data().clone()
  }

  pub fn state(&self) -> SyncState {
    let inner = self.inner.lock();
    if inner.deleted {
      return SyncState::Deleted;
    }
    if inner.core.has_changes() || self.dependents.iter().any(|d| d.has_changes()) {
      return SyncState::Dirty;
    }
    match inner.freshness {
      Freshness::Uninitialized => SyncState::Uninitialized,
      Freshness::Loading => SyncState::Loading,
      Freshness::Stale => SyncState::Stale,
      Freshness::Fresh if self.is_throttle_elapsed(&inner) => SyncState::Stale,
      Freshness::Fresh => SyncState::Fresh,
    }
  }

  pub fn is_deleted(&self) -> bool {
    self.inner.lock().deleted
  }

  /// True while local edits (own or dependent) await submission.
  pub fn has_changes(&self) -> bool {
    self.inner.lock().core.has_changes() || self.dependents.iter().any(|d| d.has_changes())
  }

  /// Register a change listener. It runs synchronously after each merge that
  /// changed at least one property.
  pub fn subscribe(&self, subscriber: impl Fn(&[&'static str]) + Send + Sync + 'static) {
    self.subscribers.lock().push(Arc::new(subscriber));
  }

  /// Register a listener for id corrections, e.g. a username lookup that the
  /// server answered with the canonical id.
  pub fn on_id_corrected(&self, listener: impl Fn(&str) + Send + Sync + 'static) {
    self.id_listeners.lock().push(Arc::new(listener));
  }

  fn is_throttle_elapsed(&self, inner: &Inner<S>) -> bool {
    inner
      .fetched_at
      .map(|t| Utc::now() - t > self.session.settings().refresh_throttle)
      .unwrap_or(true)
  }

  fn needs_fetch(&self) -> bool {
    let inner = self.inner.lock();
    if inner.deleted {
      return false;
    }
    match inner.freshness {
      Freshness::Fresh => self.is_throttle_elapsed(&inner),
      _ => true,
    }
  }

  /// Runs with the inner lock released.
  fn notify(&self, merged: &Merged) {
    if let Some(id) = &merged.corrected_id {
      let listeners = self.id_listeners.lock().clone();
      for listener in listeners {
        listener(id);
      }
    }
    if merged.changed.is_empty() {
      return;
    }
    // Clone the list so a subscriber may subscribe or read without deadlocking.
    let subscribers = self.subscribers.lock().clone();
    for subscriber in subscribers {
      subscriber(&merged.changed);
    }
  }

  fn merge_locked(&self, inner: &mut Inner<S>, incoming: &S) -> Merged {
    let before = inner.core.id().to_string();
    let mut changed = inner.core.merge(self.registry, incoming);
    for dependent in &self.dependents {
      changed.extend(dependent.merge(incoming));
    }
    let after = inner.core.id();
    let corrected_id = (after != before).then(|| after.to_string());
    Merged {
      changed,
      corrected_id,
    }
  }

  /// Merge data obtained elsewhere, e.g. from a collection listing.
  ///
  /// Marks the context fresh but does not count as a fetch of its own, so a
  /// later NotFound still surfaces as an error.
  pub fn merge(&self, incoming: &S) -> Vec<&'static str> {
    let merged = {
      let mut inner = self.inner.lock();
      if inner.deleted {
        return Vec::new();
      }
      inner.freshness = Freshness::Fresh;
      inner.fetched_at = Some(Utc::now());
      self.merge_locked(&mut inner, incoming)
    };
    self.notify(&merged);
    merged.changed
  }

  /// Merge a payload embedded in another entity, but only into a context
  /// that holds no data yet.
  ///
  /// Embedded payloads are often partial. Once the context has loaded data
  /// of its own they are ignored, so reading a reference never overwrites
  /// the referenced entity. Returns whether the payload was applied.
  pub fn seed(&self, incoming: &S) -> bool {
    let merged = {
      let mut inner = self.inner.lock();
      if inner.deleted || inner.freshness != Freshness::Uninitialized || inner.core.has_changes() {
        return false;
      }
      inner.freshness = Freshness::Fresh;
      inner.fetched_at = Some(Utc::now());
      self.merge_locked(&mut inner, incoming)
    };
    self.notify(&merged);
    true
  }

  /// Fetch unless the data is fresh. Concurrent callers share one fetch,
  /// including its failure.
  pub async fn ensure_fresh(&self) -> SyncResult<()> {
    if !self.needs_fetch() {
      return Ok(());
    }

    let seen = self.inner.lock().fetch_seq;
    let _gate = self.fetch_gate.lock().await;
    // Whoever held the gate before us may already have fetched.
    {
      let inner = self.inner.lock();
      if inner.fetch_seq != seen {
        if let Some(e) = &inner.fetch_error {
          return Err(e.clone());
        }
      }
    }
    if !self.needs_fetch() {
      return Ok(());
    }

    let (id, previous) = {
      let mut inner = self.inner.lock();
      let previous = inner.freshness;
      inner.freshness = Freshness::Loading;
      (inner.core.id().to_string(), previous)
    };

    debug!(kind = S::KIND, %id, "fetching");
    let result = self.remote.fetch(&id).await;

    let merged = {
      let mut inner = self.inner.lock();
      inner.fetch_seq += 1;
      inner.fetch_error = result.as_ref().err().cloned();
      match result {
        Ok(snapshot) => {
          if inner.deleted {
            return Ok(());
          }
          inner.has_fetched = true;
          inner.freshness = Freshness::Fresh;
          inner.fetched_at = Some(Utc::now());
          self.merge_locked(&mut inner, &snapshot)
        }
        Err(e) if e.is_not_found() && inner.has_fetched => {
          info!(kind = S::KIND, %id, "entity no longer exists remotely; marking deleted");
          inner.fetch_error = None;
          inner.freshness = previous;
          self.freeze(&mut inner);
          return Ok(());
        }
        Err(e) => {
          inner.freshness = previous;
          warn!(kind = S::KIND, %id, error = %e, "fetch failed");
          return Err(e);
        }
      }
    };

    debug!(kind = S::KIND, %id, changed = ?merged.changed, "fetched");
    self.notify(&merged);
    Ok(())
  }

  /// Force the next `ensure_fresh` to refetch. Dependents expire first.
  pub fn expire(&self) {
    for dependent in &self.dependents {
      dependent.expire();
    }
    let mut inner = self.inner.lock();
    if !inner.deleted && inner.freshness != Freshness::Uninitialized {
      inner.freshness = Freshness::Stale;
      debug!(kind = S::KIND, id = inner.core.id(), "expired");
    }
  }

  /// Stage a value for `name` and schedule a submit.
  pub fn write(&self, name: &'static str, value: Value) -> SyncResult<SubmitHandle> {
    let mut inner = self.inner.lock();
    if inner.deleted {
      debug!(kind = S::KIND, property = name, "ignoring write to deleted entity");
      return Ok(SubmitHandle::ready());
    }
    inner.core.stage(self.registry, name, value)?;
    Ok(self.schedule_submit(&mut inner))
  }

  /// Schedule a submit for changes staged in a dependent context.
  pub fn request_submit(&self) -> SubmitHandle {
    let mut inner = self.inner.lock();
    if inner.deleted {
      return SubmitHandle::ready();
    }
    self.schedule_submit(&mut inner)
  }

  fn schedule_submit(&self, inner: &mut Inner<S>) -> SubmitHandle {
    if let Some(outcome) = &inner.scheduled {
      return SubmitHandle::pending(outcome.clone());
    }
    let Some(this) = self.this.upgrade() else {
      return SubmitHandle::ready();
    };

    let (tx, rx) = watch::channel(None);
    inner.scheduled = Some(rx.clone());
    let delay = self.session.settings().submit_delay;

    tokio::spawn(async move {
      tokio::time::sleep(delay).await;
      // Writes from here on start a new batch.
      this.inner.lock().scheduled = None;
      let outcome = this.submit().await;
      let _ = tx.send(Some(outcome));
    });

    SubmitHandle::pending(rx)
  }

  /// Send pending changes now. Concurrent calls run one after the other.
  ///
  /// On failure the dirty set is kept for a later attempt.
  pub async fn submit(&self) -> SyncResult<()> {
    let _gate = self.submit_gate.lock().await;

    let (id, partial, marks, embedded) = {
      let inner = self.inner.lock();
      if inner.deleted {
        return Ok(());
      }
      let (mut partial, marks) = inner.core.changes(self.registry)?;
      let mut embedded: Vec<(usize, DirtyMarks)> = Vec::new();
      for (index, dependent) in self.dependents.iter().enumerate() {
        if let Some(child_marks) = dependent.embed_changes(&mut partial)? {
          embedded.push((index, child_marks));
        }
      }
      if marks.is_empty() && embedded.is_empty() {
        return Ok(());
      }
      (inner.core.id().to_string(), partial, marks, embedded)
    };

    let fields: Vec<&'static str> = marks
      .names()
      .chain(embedded.iter().flat_map(|(_, m)| m.names()))
      .collect();
    debug!(kind = S::KIND, %id, ?fields, "submitting");

    let response = match self.remote.update(&id, &partial).await {
      Ok(response) => response,
      Err(e) => {
        warn!(kind = S::KIND, %id, error = %e, "submit failed; changes kept");
        return Err(e);
      }
    };

    let merged = {
      let mut inner = self.inner.lock();
      inner.core.commit(&marks);
      for (index, child_marks) in &embedded {
        self.dependents[*index].commit(child_marks);
      }
      if inner.deleted {
        return Ok(());
      }
      self.merge_locked(&mut inner, &response)
    };

    debug!(kind = S::KIND, %id, changed = ?merged.changed, "submitted");
    self.notify(&merged);
    Ok(())
  }

  /// Delete the remote entity and freeze this context.
  pub async fn delete(&self) -> SyncResult<()> {
    if self.is_deleted() {
      return Ok(());
    }
    // Let an in-flight submit finish first.
    let _gate = self.submit_gate.lock().await;
    if self.is_deleted() {
      return Ok(());
    }

    let id = self.id();
    self.remote.delete(&id).await?;

    let mut inner = self.inner.lock();
    self.freeze(&mut inner);
    info!(kind = S::KIND, %id, "deleted");
    Ok(())
  }

  fn freeze(&self, inner: &mut Inner<S>) {
    inner.deleted = true;
    inner.core.discard_changes();
    for dependent in &self.dependents {
      dependent.discard_changes();
    }
  }

  fn read_value(&self, name: &'static str) -> SyncResult<Value> {
    let read = self.inner.lock().core.read(self.registry, name)?;
    finish_read(self.registry, &self.session, name, read)
  }
}

#[async_trait]
impl<S: Snapshot> FieldSource for SyncContext<S> {
  async fn ensure_fresh(&self) -> SyncResult<()> {
    SyncContext::ensure_fresh(self).await
  }

  fn read(&self, name: &'static str) -> SyncResult<Value> {
    self.read_value(name)
  }

  fn write(&self, name: &'static str, value: Value) -> SyncResult<SubmitHandle> {
    SyncContext::write(self, name, value)
  }
}

impl<S: Snapshot> std::fmt::Debug for SyncContext<S> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("SyncContext")
      .field("kind", &S::KIND)
      .field("id", &self.id())
      .field("state", &self.state())
      .field("dependents", &self.dependents.len())
      .finish_non_exhaustive()
  }
}

impl SyncState {
  pub fn as_str(self) -> &'static str {
    match self {
      SyncState::Uninitialized => "uninitialized",
      SyncState::Loading => "loading",
      SyncState::Fresh => "fresh",
      SyncState::Stale => "stale",
      SyncState::Dirty => "dirty",
      SyncState::Deleted => "deleted",
    }
  }
}

impl std::fmt::Display for SyncState {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::SyncError;
  use crate::sync::field::Field;
  use crate::sync::testing::{session, widget, widget_registry, MockRemote, Widget};
  use std::sync::atomic::Ordering;
  use std::time::Duration;

  fn context(remote: &Arc<MockRemote>, delay: Duration) -> Arc<SyncContext<Widget>> {
    SyncContext::new("w1", widget_registry(), remote.clone(), session(delay))
  }

  #[tokio::test]
  async fn test_fresh_context_fetches_once() {
    let remote = MockRemote::serving(widget("w1", 1, 2));
    let ctx = context(&remote, Duration::from_millis(5));
    assert_eq!(ctx.state(), SyncState::Uninitialized);

    ctx.ensure_fresh().await.unwrap();
    ctx.ensure_fresh().await.unwrap();
    assert_eq!(remote.fetch_count(), 1);
    assert_eq!(ctx.state(), SyncState::Fresh);
    assert_eq!(ctx.snapshot().b, Some(2));
  }

  #[tokio::test]
  async fn test_concurrent_reads_share_one_fetch() {
    let remote = MockRemote::serving(widget("w1", 1, 2));
    *remote.fetch_delay.lock() = Some(Duration::from_millis(50));
    let ctx = context(&remote, Duration::from_millis(5));

    let (first, second) = tokio::join!(ctx.ensure_fresh(), ctx.ensure_fresh());
    first.unwrap();
    second.unwrap();
    assert_eq!(remote.fetch_count(), 1);
  }

  #[tokio::test]
  async fn test_local_edit_survives_refetch_until_submitted() {
    let remote = MockRemote::serving(widget("w1", 1, 2));
    let ctx = context(&remote, Duration::from_secs(3600));
    let a: Field<Option<i64>> = Field::new(ctx.clone(), "a");

    a.get().await.unwrap();
    let _pending = a.set(Some(5)).unwrap();
    assert_eq!(ctx.state(), SyncState::Dirty);

    ctx.expire();
    ctx.ensure_fresh().await.unwrap();
    assert_eq!(remote.fetch_count(), 2);
    assert_eq!(a.peek().unwrap(), Some(5));

    ctx.submit().await.unwrap();
    assert!(!ctx.has_changes());
    assert_eq!(remote.updates.lock()[0].a, Some(5));
    assert_eq!(remote.server.lock().a, Some(5));

    // once submitted, the server is authoritative again
    remote.server.lock().a = Some(8);
    ctx.expire();
    assert_eq!(a.get().await.unwrap(), Some(8));
  }

  #[tokio::test]
  async fn test_deleted_context_is_frozen() {
    let remote = MockRemote::serving(widget("w1", 1, 2));
    let ctx = context(&remote, Duration::from_millis(5));
    let a: Field<Option<i64>> = Field::new(ctx.clone(), "a");
    a.get().await.unwrap();

    ctx.delete().await.unwrap();
    ctx.delete().await.unwrap();
    assert_eq!(remote.deletes.load(Ordering::SeqCst), 1);
    assert_eq!(ctx.state(), SyncState::Deleted);

    ctx.expire();
    assert_eq!(a.get().await.unwrap(), Some(1));
    a.set(Some(9)).unwrap().await.unwrap();
    ctx.submit().await.unwrap();

    assert_eq!(remote.fetch_count(), 1);
    assert_eq!(remote.update_count(), 0);
  }

  #[tokio::test]
  async fn test_not_found_before_first_fetch_is_an_error() {
    let remote = MockRemote::serving(widget("w1", 1, 2));
    remote.missing.store(true, Ordering::SeqCst);
    let ctx = context(&remote, Duration::from_millis(5));

    let err = ctx.ensure_fresh().await.unwrap_err();
    assert!(err.is_not_found());
    assert!(!ctx.is_deleted());
    assert_eq!(ctx.state(), SyncState::Uninitialized);
  }

  #[tokio::test]
  async fn test_not_found_after_fetch_marks_deleted() {
    let remote = MockRemote::serving(widget("w1", 1, 2));
    let ctx = context(&remote, Duration::from_millis(5));
    ctx.ensure_fresh().await.unwrap();

    remote.missing.store(true, Ordering::SeqCst);
    ctx.expire();
    ctx.ensure_fresh().await.unwrap();
    assert!(ctx.is_deleted());
    assert_eq!(ctx.snapshot().a, Some(1));
  }

  #[tokio::test]
  async fn test_writes_in_one_window_share_one_update() {
    let remote = MockRemote::serving(widget("w1", 1, 2));
    let ctx = context(&remote, Duration::from_millis(20));
    let name: Field<Option<String>> = Field::new(ctx.clone(), "name");
    let pos: Field<Option<f64>> = Field::new(ctx.clone(), "pos");

    let renamed = name.set(Some("Q3 plan ".into())).unwrap();
    let moved = pos.set(Some(16384.0)).unwrap();
    renamed.await.unwrap();
    moved.await.unwrap();

    let updates = remote.updates.lock().clone();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].name.as_deref(), Some("Q3 plan "));
    assert_eq!(updates[0].pos, Some(16384.0));
    assert_eq!(updates[0].a, None);

    // the merged response carries the server's normalized value
    assert_eq!(name.peek().unwrap().as_deref(), Some("Q3 plan"));
  }

  #[tokio::test]
  async fn test_rejected_submit_keeps_changes() {
    let remote = MockRemote::serving(widget("w1", 1, 2));
    remote.reject_updates.store(true, Ordering::SeqCst);
    let ctx = context(&remote, Duration::from_millis(5));
    let name: Field<Option<String>> = Field::new(ctx.clone(), "name");

    let err = name.set(Some("x".into())).unwrap().await.unwrap_err();
    assert!(matches!(err, SyncError::Conflict(_)));
    assert!(ctx.has_changes());

    remote.reject_updates.store(false, Ordering::SeqCst);
    ctx.submit().await.unwrap();
    assert!(!ctx.has_changes());
    assert_eq!(remote.update_count(), 2);
  }

  #[tokio::test]
  async fn test_submits_never_overlap() {
    let remote = MockRemote::serving(widget("w1", 1, 2));
    *remote.update_delay.lock() = Some(Duration::from_millis(30));
    let ctx = context(&remote, Duration::from_secs(3600));

    ctx.write("a", Box::new(Some(5i64))).unwrap();
    let (first, second) = tokio::join!(ctx.submit(), async {
      ctx.write("b", Box::new(Some(7i64))).unwrap();
      ctx.submit().await
    });
    first.unwrap();
    second.unwrap();

    assert_eq!(remote.update_count(), 2);
    assert_eq!(remote.max_concurrent_updates.load(Ordering::SeqCst), 1);
    assert!(!ctx.has_changes());
  }

  #[tokio::test]
  async fn test_submit_without_changes_is_silent() {
    let remote = MockRemote::serving(widget("w1", 1, 2));
    let ctx = context(&remote, Duration::from_millis(5));
    ctx.submit().await.unwrap();
    assert_eq!(remote.update_count(), 0);
  }

  #[tokio::test]
  async fn test_subscribers_see_changed_names() {
    let remote = MockRemote::serving(widget("w1", 1, 2));
    let ctx = context(&remote, Duration::from_millis(5));
    let seen: Arc<Mutex<Vec<Vec<&'static str>>>> = Arc::default();
    let sink = seen.clone();
    ctx.subscribe(move |names| sink.lock().push(names.to_vec()));

    ctx.ensure_fresh().await.unwrap();
    remote.server.lock().b = Some(3);
    ctx.expire();
    ctx.ensure_fresh().await.unwrap();

    // an unchanged refetch stays quiet
    ctx.expire();
    ctx.ensure_fresh().await.unwrap();

    assert_eq!(remote.fetch_count(), 3);
    assert_eq!(*seen.lock(), vec![vec!["a", "b"], vec!["b"]]);
  }

  #[tokio::test]
  async fn test_external_merge_counts_as_fresh() {
    let remote = MockRemote::serving(widget("w1", 1, 2));
    let ctx = context(&remote, Duration::from_millis(5));

    let changed = ctx.merge(&widget("w1", 4, 2));
    assert_eq!(changed, vec!["a", "b"]);
    ctx.ensure_fresh().await.unwrap();
    assert_eq!(remote.fetch_count(), 0);
    assert_eq!(ctx.snapshot().a, Some(4));
  }

  #[tokio::test]
  async fn test_concurrent_reads_share_a_failed_fetch() {
    let remote = MockRemote::serving(widget("w1", 1, 2));
    remote.missing.store(true, Ordering::SeqCst);
    *remote.fetch_delay.lock() = Some(Duration::from_millis(30));
    let ctx = context(&remote, Duration::from_millis(5));

    let (first, second, third) = tokio::join!(ctx.ensure_fresh(), ctx.ensure_fresh(), ctx.ensure_fresh());
    assert!(first.unwrap_err().is_not_found());
    assert!(second.unwrap_err().is_not_found());
    assert!(third.unwrap_err().is_not_found());
    assert_eq!(remote.fetch_count(), 1);

    // a later read tries again
    remote.missing.store(false, Ordering::SeqCst);
    ctx.ensure_fresh().await.unwrap();
    assert_eq!(remote.fetch_count(), 2);
    assert_eq!(ctx.state(), SyncState::Fresh);
  }

  #[tokio::test]
  async fn test_seed_only_fills_an_empty_context() {
    let remote = MockRemote::serving(widget("w1", 1, 2));
    let ctx = context(&remote, Duration::from_millis(5));

    assert!(ctx.seed(&widget("w1", 7, 8)));
    assert_eq!(ctx.snapshot().a, Some(7));

    let partial = Widget {
      id: "w1".into(),
      a: Some(9),
      ..Default::default()
    };
    assert!(!ctx.seed(&partial));
    assert_eq!(ctx.snapshot().a, Some(7));
    assert_eq!(ctx.snapshot().b, Some(8));
    assert_eq!(remote.fetch_count(), 0);
  }

  #[tokio::test]
  async fn test_id_correction_is_reported() {
    let remote = MockRemote::serving(widget("canonical", 1, 2));
    let ctx = SyncContext::new("alias", widget_registry(), remote.clone(), session(Duration::from_millis(5)));
    let seen: Arc<Mutex<Vec<String>>> = Arc::default();
    let sink = seen.clone();
    ctx.on_id_corrected(move |id| sink.lock().push(id.to_string()));

    ctx.ensure_fresh().await.unwrap();
    ctx.expire();
    ctx.ensure_fresh().await.unwrap();

    assert_eq!(ctx.id(), "canonical");
    assert_eq!(*seen.lock(), vec!["canonical".to_string()]);
  }
}
