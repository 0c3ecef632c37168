//! Snapshot plus dirty set: the synchronous half of every context.
//!
//! Nothing here suspends. Parent and dependent contexts wrap a [`Core`] in a
//! mutex and add their own fetch and submit plumbing around it.

use std::collections::BTreeMap;

use crate::error::SyncResult;

use super::property::{PropertyRegistry, Value};
use super::session::Session;
use super::traits::Snapshot;

/// A locally written value waiting for the server to accept it.
#[derive(Debug)]
struct Pending {
  value: Value,
  version: u64,
}

/// Which dirty entries went out in a submit, so only those get cleared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirtyMarks(Vec<(&'static str, u64)>);

impl DirtyMarks {
  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
    self.0.iter().map(|(name, _)| *name)
  }
}

/// How a read should be served once the lock is released.
pub(crate) enum Read<S> {
  Ready(Value),
  Resolve(S),
}

#[derive(Debug)]
pub(crate) struct Core<S> {
  data: S,
  dirty: BTreeMap<&'static str, Pending>,
  next_version: u64,
}

impl<S: Snapshot> Core<S> {
  pub fn new(data: S) -> Self {
    Self {
      data,
      dirty: BTreeMap::new(),
      next_version: 0,
    }
  }

  pub fn data(&self) -> &S {
    &self.data
  }

  pub fn id(&self) -> &str {
    self.data.id()
  }

  pub fn has_changes(&self) -> bool {
    !self.dirty.is_empty()
  }

  pub fn dirty_names(&self) -> Vec<&'static str> {
    self.dirty.keys().copied().collect()
  }

  /// Dirty value first, snapshot second. Reference properties are handed back
  /// as a scratch snapshot so the resolver can run without the lock held.
  pub fn read(&self, registry: &PropertyRegistry<S>, name: &str) -> SyncResult<Read<S>> {
    let property = registry.require(name)?;
    let pending = self.dirty.get(name);

    if !property.is_reference() {
      return Ok(Read::Ready(match pending {
        Some(p) => p.value.clone_value(),
        None => property.get(&self.data),
      }));
    }

    let mut scratch = self.data.clone();
    if let Some(p) = pending {
      property.set(&mut scratch, p.value.clone_value())?;
    }
    Ok(Read::Resolve(scratch))
  }

  /// Record a local edit. It wins over merges until a submit carries it.
  pub fn stage(
    &mut self,
    registry: &PropertyRegistry<S>,
    name: &'static str,
    value: Value,
  ) -> SyncResult<()> {
    // Reject wrong-typed values here rather than at submit time.
    let property = registry.require(name)?;
    let mut probe = S::default();
    property.set(&mut probe, value.clone_value())?;

    self.next_version += 1;
    self.dirty.insert(
      name,
      Pending {
        value,
        version: self.next_version,
      },
    );
    Ok(())
  }

  /// Merge server data and return the names of properties that changed.
  ///
  /// The id is taken first; properties with pending local edits are skipped.
  pub fn merge(&mut self, registry: &PropertyRegistry<S>, incoming: &S) -> Vec<&'static str> {
    if !incoming.id().is_empty() && incoming.id() != self.data.id() {
      self.data.set_id(incoming.id().to_string());
    }

    let mut changed = Vec::new();
    for property in registry.iter() {
      if self.dirty.contains_key(property.name()) {
        continue;
      }
      let current = property.get(&self.data);
      let next = property.get(incoming);
      if current.eq_value(&*next) {
        continue;
      }
      // Getter output always fits the matching setter.
      if property.set(&mut self.data, next).is_ok() {
        changed.push(property.name());
      }
    }
    changed
  }

  /// Project the dirty set into an otherwise empty snapshot.
  pub fn changes(&self, registry: &PropertyRegistry<S>) -> SyncResult<(S, DirtyMarks)> {
    let mut partial = S::default();
    let mut marks = Vec::with_capacity(self.dirty.len());
    for (name, pending) in &self.dirty {
      registry
        .require(name)?
        .set(&mut partial, pending.value.clone_value())?;
      marks.push((*name, pending.version));
    }
    Ok((partial, DirtyMarks(marks)))
  }

  /// Clear the entries a successful submit carried. Entries rewritten while
  /// the submit was in flight have a newer version and stay dirty.
  pub fn commit(&mut self, marks: &DirtyMarks) {
    for (name, version) in &marks.0 {
      if self.dirty.get(name).is_some_and(|p| p.version == *version) {
        self.dirty.remove(name);
      }
    }
  }

  pub fn discard_changes(&mut self) {
    self.dirty.clear();
  }
}

/// Serve a [`Read`] outside the lock.
pub(crate) fn finish_read<S: Snapshot>(
  registry: &PropertyRegistry<S>,
  session: &Session,
  name: &str,
  read: Read<S>,
) -> SyncResult<Value> {
  match read {
    Read::Ready(value) => Ok(value),
    Read::Resolve(scratch) => registry.require(name)?.read(&scratch, session),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::sync::property::downcast;
  use crate::sync::testing::{widget, widget_registry, Widget};

  fn read_a(core: &Core<Widget>) -> Option<i64> {
    match core.read(widget_registry(), "a").unwrap() {
      Read::Ready(v) => downcast::<Option<i64>>(v).unwrap(),
      Read::Resolve(_) => unreachable!(),
    }
  }

  #[test]
  fn test_merge_reports_only_changed_properties() {
    let registry = widget_registry();
    let mut core = Core::new(Widget::default());
    core.merge(registry, &widget("w1", 1, 2));

    let changed = core.merge(registry, &widget("w1", 1, 3));
    assert_eq!(changed, vec!["b"]);
    assert_eq!(core.data().b, Some(3));
  }

  #[test]
  fn test_merge_takes_id_first() {
    let registry = widget_registry();
    let mut core = Core::new(Widget::default());
    core.merge(registry, &widget("w9", 1, 2));
    assert_eq!(core.id(), "w9");

    // id-less payloads never blank the id
    core.merge(registry, &Widget::default());
    assert_eq!(core.id(), "w9");
  }

  #[test]
  fn test_local_edit_wins_over_merge() {
    let registry = widget_registry();
    let mut core = Core::new(widget("w1", 1, 2));
    core.stage(registry, "a", Box::new(Some(5i64))).unwrap();

    let changed = core.merge(registry, &widget("w1", 9, 2));
    assert!(changed.is_empty());
    assert_eq!(read_a(&core), Some(5));
    assert_eq!(core.data().a, Some(1));
  }

  #[test]
  fn test_changes_project_only_dirty_fields() {
    let registry = widget_registry();
    let mut core = Core::new(widget("w1", 1, 2));
    core.stage(registry, "b", Box::new(Some(7i64))).unwrap();

    let (partial, marks) = core.changes(registry).unwrap();
    assert_eq!(partial.a, None);
    assert_eq!(partial.b, Some(7));
    assert_eq!(marks.names().collect::<Vec<_>>(), vec!["b"]);
  }

  #[test]
  fn test_commit_keeps_newer_writes() {
    let registry = widget_registry();
    let mut core = Core::new(widget("w1", 1, 2));
    core.stage(registry, "a", Box::new(Some(5i64))).unwrap();
    let (_, marks) = core.changes(registry).unwrap();

    core.stage(registry, "a", Box::new(Some(6i64))).unwrap();
    core.commit(&marks);
    assert!(core.has_changes());
    assert_eq!(read_a(&core), Some(6));
  }

  #[test]
  fn test_stage_rejects_wrong_type() {
    let registry = widget_registry();
    let mut core = Core::new(Widget::default());
    assert!(core.stage(registry, "a", Box::new("five".to_string())).is_err());
    assert!(core.stage(registry, "nope", Box::new(Some(1i64))).is_err());
    assert!(!core.has_changes());
  }
}
