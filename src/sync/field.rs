//! Lazily loaded, validated property accessors.
//!
//! A [`Field`] holds no value. Reads go to the owning context, which fetches
//! first if it was never loaded or has gone stale; writes are validated, staged
//! in the context's dirty set, and picked up by a coalesced submit.

use std::future::IntoFuture;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::sync::watch;

use crate::error::{SyncError, SyncResult};

use super::property::{downcast_or_err, FieldValue, Value};
use super::validation::{validate, Rule};

/// What a context offers to the fields bound to it.
#[async_trait]
pub trait FieldSource: Send + Sync {
  /// Fetch if never loaded or stale; a no-op otherwise.
  async fn ensure_fresh(&self) -> SyncResult<()>;

  /// Current value without fetching.
  fn read(&self, name: &'static str) -> SyncResult<Value>;

  /// Stage a validated value and schedule a submit.
  fn write(&self, name: &'static str, value: Value) -> SyncResult<SubmitHandle>;
}

pub(crate) type SubmitOutcome = Option<SyncResult<()>>;

/// Completion of the coalesced submit that carries a write.
///
/// Every write that lands in the same batch gets a handle to the same
/// outcome. Dropping the handle does not cancel the submit.
#[derive(Debug, Clone)]
pub struct SubmitHandle {
  outcome: Option<watch::Receiver<SubmitOutcome>>,
}

impl SubmitHandle {
  /// A handle for a write that needs no network call.
  pub fn ready() -> Self {
    Self { outcome: None }
  }

  pub(crate) fn pending(outcome: watch::Receiver<SubmitOutcome>) -> Self {
    Self {
      outcome: Some(outcome),
    }
  }

  /// True once the batch has finished, successfully or not.
  pub fn is_finished(&self) -> bool {
    self
      .outcome
      .as_ref()
      .map(|rx| rx.borrow().is_some())
      .unwrap_or(true)
  }

  /// Wait for the batch to be submitted.
  pub async fn wait(self) -> SyncResult<()> {
    let Some(mut rx) = self.outcome else {
      return Ok(());
    };
    let outcome = match rx.wait_for(Option::is_some).await {
      Ok(outcome) => outcome.clone(),
      Err(_) => None,
    };
    outcome.unwrap_or_else(|| {
      Err(SyncError::Transport(
        "submit task ended without reporting".into(),
      ))
    })
  }
}

impl IntoFuture for SubmitHandle {
  type Output = SyncResult<()>;
  type IntoFuture = BoxFuture<'static, SyncResult<()>>;

  fn into_future(self) -> Self::IntoFuture {
    Box::pin(self.wait())
  }
}

/// Typed accessor for one property of one context.
pub struct Field<T> {
  source: Arc<dyn FieldSource>,
  name: &'static str,
  rules: Vec<Box<dyn Rule<T>>>,
  _value: PhantomData<fn() -> T>,
}

impl<T: FieldValue> Field<T> {
  pub fn new(source: Arc<dyn FieldSource>, name: &'static str) -> Self {
    Self {
      source,
      name,
      rules: Vec::new(),
      _value: PhantomData,
    }
  }

  /// Append a validation rule. Rules run in insertion order.
  pub fn with_rule(mut self, rule: impl Rule<T> + 'static) -> Self {
    self.rules.push(Box::new(rule));
    self
  }

  pub fn name(&self) -> &'static str {
    self.name
  }

  /// Current value, fetching first if the context needs it.
  pub async fn get(&self) -> SyncResult<T> {
    self.source.ensure_fresh().await?;
    self.peek()
  }

  /// Current value without touching the network.
  pub fn peek(&self) -> SyncResult<T> {
    downcast_or_err(self.name, self.source.read(self.name)?)
  }

  /// Validate and stage a new value.
  ///
  /// A rule violation is returned immediately and nothing is staged. The
  /// returned handle resolves once the submit carrying this value finishes.
  ///
  /// Must be called within a Tokio runtime: the delayed submit runs as a
  /// spawned task.
  pub fn set(&self, value: T) -> SyncResult<SubmitHandle> {
    validate(&self.rules, &value)?;
    self.source.write(self.name, Box::new(value))
  }
}

impl<T> std::fmt::Debug for Field<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Field")
      .field("name", &self.name)
      .field("rules", &self.rules.len())
      .finish_non_exhaustive()
  }
}
