//! Per-entity-type property tables.
//!
//! A [`PropertyRegistry`] maps property names to a typed getter and setter on
//! the snapshot, plus an optional resolver that turns wire data into a cached
//! domain entity. Registries are built once and only read afterwards.

use std::any::{type_name, Any};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{SyncError, SyncResult};

use super::session::Session;
use super::traits::Snapshot;

/// Bounds every property value type satisfies.
pub trait FieldValue: Any + Send + Sync + Clone + PartialEq + fmt::Debug {}

impl<T> FieldValue for T where T: Any + Send + Sync + Clone + PartialEq + fmt::Debug {}

/// Type-erased property value with equality and cloning preserved.
pub trait PropertyValue: Any + Send + Sync + fmt::Debug {
  fn clone_value(&self) -> Value;
  fn eq_value(&self, other: &dyn PropertyValue) -> bool;
  fn as_any(&self) -> &dyn Any;
  fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync>;
}

pub type Value = Box<dyn PropertyValue>;

impl<T: FieldValue> PropertyValue for T {
  fn clone_value(&self) -> Value {
    Box::new(self.clone())
  }

  fn eq_value(&self, other: &dyn PropertyValue) -> bool {
    other
      .as_any()
      .downcast_ref::<T>()
      .is_some_and(|other| other == self)
  }

  fn as_any(&self) -> &dyn Any {
    self
  }

  fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync> {
    self
  }
}

/// Recover a concrete value, or `None` if it holds another type.
pub fn downcast<T: FieldValue>(value: Value) -> Option<T> {
  value.into_any().downcast::<T>().ok().map(|v| *v)
}

pub(crate) fn downcast_or_err<T: FieldValue>(name: &str, value: Value) -> SyncResult<T> {
  downcast::<T>(value).ok_or_else(|| {
    SyncError::Property(format!(
      "property '{}' does not hold a {}",
      name,
      type_name::<T>()
    ))
  })
}

type Getter<S> = Box<dyn Fn(&S) -> Value + Send + Sync>;
type Setter<S> = Box<dyn Fn(&mut S, Value) -> SyncResult<()> + Send + Sync>;
type Resolver<S> = Box<dyn Fn(&S, &Session) -> SyncResult<Value> + Send + Sync>;

/// One named property of a snapshot type.
pub struct Property<S> {
  name: &'static str,
  get: Getter<S>,
  set: Setter<S>,
  resolve: Option<Resolver<S>>,
  selection: u32,
}

impl<S: Snapshot> Property<S> {
  pub fn new<T, G, W>(name: &'static str, get: G, set: W) -> Self
  where
    T: FieldValue,
    G: Fn(&S) -> T + Send + Sync + 'static,
    W: Fn(&mut S, T) + Send + Sync + 'static,
  {
    Self {
      name,
      get: Box::new(move |s| Box::new(get(s))),
      set: Box::new(move |s, v| {
        set(s, downcast_or_err::<T>(name, v)?);
        Ok(())
      }),
      resolve: None,
      selection: 0,
    }
  }

  /// Resolve reads of this property through the session's identity cache.
  ///
  /// The getter still drives merge comparison and the setter still drives
  /// submit; only field reads see the resolved value.
  pub fn with_resolver<R, F>(mut self, resolve: F) -> Self
  where
    R: FieldValue,
    F: Fn(&S, &Session) -> SyncResult<R> + Send + Sync + 'static,
  {
    self.resolve = Some(Box::new(move |s, session| {
      Ok(Box::new(resolve(s, session)?) as Value)
    }));
    self
  }

  /// Field-selection bits a fetch must request for this property to be populated.
  pub fn selecting(mut self, bits: u32) -> Self {
    self.selection = bits;
    self
  }

  pub fn name(&self) -> &'static str {
    self.name
  }

  pub fn get(&self, snapshot: &S) -> Value {
    (self.get)(snapshot)
  }

  pub fn set(&self, snapshot: &mut S, value: Value) -> SyncResult<()> {
    (self.set)(snapshot, value)
  }

  pub fn is_reference(&self) -> bool {
    self.resolve.is_some()
  }

  /// Read the property, resolving references when a resolver is registered.
  pub fn read(&self, snapshot: &S, session: &Session) -> SyncResult<Value> {
    match &self.resolve {
      Some(resolve) => resolve(snapshot, session),
      None => Ok(self.get(snapshot)),
    }
  }
}

impl<S> fmt::Debug for Property<S> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Property")
      .field("name", &self.name)
      .field("reference", &self.resolve.is_some())
      .field("selection", &self.selection)
      .finish_non_exhaustive()
  }
}

/// Immutable name -> property table for one snapshot type.
#[derive(Debug)]
pub struct PropertyRegistry<S> {
  properties: BTreeMap<&'static str, Property<S>>,
}

impl<S: Snapshot> PropertyRegistry<S> {
  pub fn new(properties: impl IntoIterator<Item = Property<S>>) -> Self {
    let mut map = BTreeMap::new();
    for property in properties {
      let previous = map.insert(property.name, property);
      debug_assert!(previous.is_none(), "duplicate property in registry");
    }
    Self { properties: map }
  }

  pub fn get(&self, name: &str) -> Option<&Property<S>> {
    self.properties.get(name)
  }

  pub(crate) fn require(&self, name: &str) -> SyncResult<&Property<S>> {
    self
      .get(name)
      .ok_or_else(|| SyncError::Property(format!("{} has no property '{}'", S::KIND, name)))
  }

  /// Properties in name order.
  pub fn iter(&self) -> impl Iterator<Item = &Property<S>> {
    self.properties.values()
  }

  pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
    self.properties.keys().copied()
  }

  pub fn len(&self) -> usize {
    self.properties.len()
  }

  pub fn is_empty(&self) -> bool {
    self.properties.is_empty()
  }

  /// Union of the field-selection bits for the named properties.
  ///
  /// Unknown names are reported back so callers can reject bad configuration.
  pub fn selection_bits<'a>(
    &self,
    names: impl IntoIterator<Item = &'a str>,
  ) -> Result<u32, Vec<String>> {
    let mut bits = 0;
    let mut unknown = Vec::new();
    for name in names {
      match self.properties.get(name) {
        Some(p) => bits |= p.selection,
        None => unknown.push(name.to_string()),
      }
    }
    if unknown.is_empty() {
      Ok(bits)
    } else {
      Err(unknown)
    }
  }

  /// Union of every property's selection bits.
  pub fn all_selection_bits(&self) -> u32 {
    self.iter().fold(0, |acc, p| acc | p.selection)
  }
}
