//! Contexts for sub-resources that ride along with a parent entity.
//!
//! A sub-resource (an action's `data`, for example) has no endpoint of its
//! own. Its context keeps a private dirty set, but freshness, fetching and
//! submitting are all delegated to the parent: reads fetch the parent, writes
//! ask the parent to submit, and the parent embeds the child's changes in its
//! own update payload.

use std::marker::PhantomData;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;

use crate::error::SyncResult;

use super::context::SyncContext;
use super::core::{finish_read, Core, DirtyMarks};
use super::field::{FieldSource, SubmitHandle};
use super::property::{PropertyRegistry, Value};
use super::session::Session;
use super::traits::Snapshot;

/// What a parent context needs from each of its dependents.
pub trait Dependent<P: Snapshot>: Send + Sync {
  /// Merge the child's portion of the parent's incoming data.
  fn merge(&self, incoming: &P) -> Vec<&'static str>;

  /// Write pending child edits into the parent's update payload.
  fn embed_changes(&self, partial: &mut P) -> SyncResult<Option<DirtyMarks>>;

  /// Clear the child edits a successful parent submit carried.
  fn commit(&self, marks: &DirtyMarks);

  fn expire(&self);

  fn discard_changes(&self);

  fn has_changes(&self) -> bool;
}

type Synchronize = Box<dyn Fn() -> BoxFuture<'static, SyncResult<()>> + Send + Sync>;
type RequestSubmit = Box<dyn Fn() -> SubmitHandle + Send + Sync>;

/// Callbacks a dependent uses to reach its parent without owning it.
pub struct ParentLink {
  synchronize: Synchronize,
  request_submit: RequestSubmit,
}

impl ParentLink {
  pub fn to<P: Snapshot>(parent: &Weak<SyncContext<P>>) -> Self {
    let for_sync = parent.clone();
    let for_submit = parent.clone();
    Self {
      synchronize: Box::new(move || {
        let parent = for_sync.upgrade();
        async move {
          match parent {
            Some(parent) => parent.ensure_fresh().await,
            None => Ok(()),
          }
        }
        .boxed()
      }),
      request_submit: Box::new(move || match for_submit.upgrade() {
        Some(parent) => parent.request_submit(),
        None => SubmitHandle::ready(),
      }),
    }
  }

  async fn synchronize(&self) -> SyncResult<()> {
    (self.synchronize)().await
  }

  fn request_submit(&self) -> SubmitHandle {
    (self.request_submit)()
  }
}

struct DependentInner<C> {
  core: Core<C>,
  stale: bool,
}

/// Context for a sub-resource of type `C` nested in parent snapshots of type `P`.
pub struct DependentContext<P, C: 'static> {
  registry: &'static PropertyRegistry<C>,
  session: Session,
  link: ParentLink,
  extract: fn(&P) -> Option<&C>,
  embed: fn(&mut P, C),
  inner: Mutex<DependentInner<C>>,
  _parent: PhantomData<fn(&P)>,
}

impl<P: Snapshot, C: Snapshot> DependentContext<P, C> {
  /// `extract` finds the child in a parent payload; `embed` places a partial
  /// child into an outgoing parent payload.
  pub fn new(
    registry: &'static PropertyRegistry<C>,
    session: Session,
    link: ParentLink,
    extract: fn(&P) -> Option<&C>,
    embed: fn(&mut P, C),
  ) -> Arc<Self> {
    Arc::new(Self {
      registry,
      session,
      link,
      extract,
      embed,
      inner: Mutex::new(DependentInner {
        core: Core::new(C::default()),
        stale: true,
      }),
      _parent: PhantomData,
    })
  }

  pub fn is_stale(&self) -> bool {
    self.inner.lock().stale
  }

  pub fn snapshot(&self) -> C {
    self.inner.lock().core.data().clone()
  }
}

#[async_trait]
impl<P: Snapshot, C: Snapshot> FieldSource for DependentContext<P, C> {
  async fn ensure_fresh(&self) -> SyncResult<()> {
    self.link.synchronize().await
  }

  fn read(&self, name: &'static str) -> SyncResult<Value> {
    let read = self.inner.lock().core.read(self.registry, name)?;
    finish_read(self.registry, &self.session, name, read)
  }

  fn write(&self, name: &'static str, value: Value) -> SyncResult<SubmitHandle> {
    self.inner.lock().core.stage(self.registry, name, value)?;
    Ok(self.link.request_submit())
  }
}

impl<P: Snapshot, C: Snapshot> Dependent<P> for DependentContext<P, C> {
  fn merge(&self, incoming: &P) -> Vec<&'static str> {
    let Some(child) = (self.extract)(incoming) else {
      return Vec::new();
    };
    let mut inner = self.inner.lock();
    inner.stale = false;
    inner.core.merge(self.registry, child)
  }

  fn embed_changes(&self, partial: &mut P) -> SyncResult<Option<DirtyMarks>> {
    let inner = self.inner.lock();
    if !inner.core.has_changes() {
      return Ok(None);
    }
    let (child, marks) = inner.core.changes(self.registry)?;
    (self.embed)(partial, child);
    Ok(Some(marks))
  }

  fn commit(&self, marks: &DirtyMarks) {
    self.inner.lock().core.commit(marks);
  }

  fn expire(&self) {
    self.inner.lock().stale = true;
  }

  fn discard_changes(&self) {
    self.inner.lock().core.discard_changes();
  }

  fn has_changes(&self) -> bool {
    self.inner.lock().core.has_changes()
  }
}
