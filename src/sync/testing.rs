//! Test fixtures: a small snapshot type with a nested part and a scripted remote.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};

use super::property::{Property, PropertyRegistry};
use super::session::{Session, SyncSettings};
use super::traits::{Remote, Snapshot};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Widget {
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub id: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub a: Option<i64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub b: Option<i64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub pos: Option<f64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub part: Option<Part>,
}

impl Snapshot for Widget {
  const KIND: &'static str = "widget";

  fn id(&self) -> &str {
    &self.id
  }

  fn set_id(&mut self, id: String) {
    self.id = id;
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Part {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub label: Option<String>,
}

impl Snapshot for Part {
  const KIND: &'static str = "part";

  fn id(&self) -> &str {
    ""
  }

  fn set_id(&mut self, _id: String) {}
}

pub fn widget(id: &str, a: i64, b: i64) -> Widget {
  Widget {
    id: id.to_string(),
    a: Some(a),
    b: Some(b),
    ..Default::default()
  }
}

pub fn widget_registry() -> &'static PropertyRegistry<Widget> {
  static REGISTRY: OnceLock<PropertyRegistry<Widget>> = OnceLock::new();
  REGISTRY.get_or_init(|| {
    PropertyRegistry::new([
      Property::new("a", |w: &Widget| w.a, |w: &mut Widget, v| w.a = v).selecting(1),
      Property::new("b", |w: &Widget| w.b, |w: &mut Widget, v| w.b = v).selecting(1 << 1),
      Property::new(
        "name",
        |w: &Widget| w.name.clone(),
        |w: &mut Widget, v| w.name = v,
      )
      .selecting(1 << 2),
      Property::new("pos", |w: &Widget| w.pos, |w: &mut Widget, v| w.pos = v).selecting(1 << 3),
    ])
  })
}

pub fn part_registry() -> &'static PropertyRegistry<Part> {
  static REGISTRY: OnceLock<PropertyRegistry<Part>> = OnceLock::new();
  REGISTRY.get_or_init(|| {
    PropertyRegistry::new([Property::new(
      "label",
      |p: &Part| p.label.clone(),
      |p: &mut Part, v| p.label = v,
    )])
  })
}

pub fn session(submit_delay: Duration) -> Session {
  Session::new(SyncSettings {
    submit_delay,
    ..Default::default()
  })
}

/// In-memory stand-in for a REST collaborator that counts every call.
#[derive(Default)]
pub struct MockRemote {
  pub server: Mutex<Widget>,
  pub fetches: AtomicUsize,
  pub deletes: AtomicUsize,
  pub updates: Mutex<Vec<Widget>>,
  pub missing: AtomicBool,
  pub reject_updates: AtomicBool,
  pub fetch_delay: Mutex<Option<Duration>>,
  pub update_delay: Mutex<Option<Duration>>,
  pub in_flight_updates: AtomicUsize,
  pub max_concurrent_updates: AtomicUsize,
}

impl MockRemote {
  pub fn serving(w: Widget) -> Arc<Self> {
    Arc::new(Self {
      server: Mutex::new(w),
      ..Default::default()
    })
  }

  pub fn fetch_count(&self) -> usize {
    self.fetches.load(Ordering::SeqCst)
  }

  pub fn update_count(&self) -> usize {
    self.updates.lock().len()
  }
}

#[async_trait]
impl Remote<Widget> for MockRemote {
  async fn fetch(&self, id: &str) -> SyncResult<Widget> {
    self.fetches.fetch_add(1, Ordering::SeqCst);
    let delay = *self.fetch_delay.lock();
    if let Some(delay) = delay {
      tokio::time::sleep(delay).await;
    }
    if self.missing.load(Ordering::SeqCst) {
      return Err(SyncError::NotFound {
        kind: Widget::KIND,
        id: id.to_string(),
      });
    }
    Ok(self.server.lock().clone())
  }

  async fn update(&self, _id: &str, partial: &Widget) -> SyncResult<Widget> {
    self.updates.lock().push(partial.clone());
    let now = self.in_flight_updates.fetch_add(1, Ordering::SeqCst) + 1;
    self.max_concurrent_updates.fetch_max(now, Ordering::SeqCst);

    let delay = *self.update_delay.lock();
    if let Some(delay) = delay {
      tokio::time::sleep(delay).await;
    }
    self.in_flight_updates.fetch_sub(1, Ordering::SeqCst);

    if self.reject_updates.load(Ordering::SeqCst) {
      return Err(SyncError::Conflict("invalid value for name".into()));
    }

    let mut server = self.server.lock();
    if partial.a.is_some() {
      server.a = partial.a;
    }
    if partial.b.is_some() {
      server.b = partial.b;
    }
    if let Some(name) = &partial.name {
      // servers trim what they store
      server.name = Some(name.trim().to_string());
    }
    if partial.pos.is_some() {
      server.pos = partial.pos;
    }
    if let Some(part) = &partial.part {
      let current = server.part.get_or_insert_with(Part::default);
      if part.label.is_some() {
        current.label = part.label.clone();
      }
    }
    Ok(server.clone())
  }

  async fn delete(&self, _id: &str) -> SyncResult<()> {
    self.deletes.fetch_add(1, Ordering::SeqCst);
    Ok(())
  }
}
