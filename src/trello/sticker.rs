//! Card stickers.

use std::sync::{Arc, OnceLock};

use crate::error::SyncResult;
use crate::sync::{Field, InRange, NotEmpty, Property, PropertyRegistry, Remote, Session, SyncContext};

use super::api_types::{ImagePreview, StickerSnapshot};
use super::fields::StickerFields;

/// Stickers may hang partly off the card; offsets are percentages.
const MIN_OFFSET: f64 = -60.0;
const MAX_OFFSET: f64 = 100.0;

fn registry() -> &'static PropertyRegistry<StickerSnapshot> {
  static REGISTRY: OnceLock<PropertyRegistry<StickerSnapshot>> = OnceLock::new();
  REGISTRY.get_or_init(|| {
    type T = StickerSnapshot;
    PropertyRegistry::new([
      Property::new("left", |s: &T| s.left, |s: &mut T, v| s.left = v)
        .selecting(StickerFields::LEFT.bits()),
      Property::new("top", |s: &T| s.top, |s: &mut T, v| s.top = v)
        .selecting(StickerFields::TOP.bits()),
      Property::new("name", |s: &T| s.name.clone(), |s: &mut T, v| s.name = v)
        .selecting(StickerFields::NAME.bits()),
      Property::new("rotation", |s: &T| s.rotation, |s: &mut T, v| s.rotation = v)
        .selecting(StickerFields::ROTATION.bits()),
      Property::new("z_index", |s: &T| s.z_index, |s: &mut T, v| s.z_index = v)
        .selecting(StickerFields::Z_INDEX.bits()),
      Property::new("image_url", |s: &T| s.image_url.clone(), |s: &mut T, v| s.image_url = v)
        .selecting(StickerFields::IMAGE_URL.bits()),
      Property::new("previews", |s: &T| s.previews.clone(), |s: &mut T, v| s.previews = v)
        .selecting(StickerFields::PREVIEWS.bits()),
    ])
  })
}

pub fn sticker_registry() -> &'static PropertyRegistry<StickerSnapshot> {
  registry()
}

pub struct Sticker {
  id: String,
  context: Arc<SyncContext<StickerSnapshot>>,
  left: Field<Option<f64>>,
  top: Field<Option<f64>>,
  name: Field<Option<String>>,
  rotation: Field<Option<i32>>,
  z_index: Field<Option<i32>>,
  image_url: Field<Option<String>>,
  previews: Field<Option<Vec<ImagePreview>>>,
}

impl Sticker {
  pub fn new(id: &str, remote: Arc<dyn Remote<StickerSnapshot>>, session: &Session) -> Arc<Self> {
    session
      .identities()
      .get_or_add(id, || Self::build(id, remote, session))
  }

  pub fn from_snapshot(
    snapshot: &StickerSnapshot,
    remote: Arc<dyn Remote<StickerSnapshot>>,
    session: &Session,
  ) -> Arc<Self> {
    let sticker = Self::new(&snapshot.id, remote, session);
    sticker.context.merge(snapshot);
    sticker
  }

  fn build(id: &str, remote: Arc<dyn Remote<StickerSnapshot>>, session: &Session) -> Arc<Self> {
    let context = SyncContext::new(id, registry(), remote, session.clone());
    let offset = || InRange::new(Some(MIN_OFFSET), Some(MAX_OFFSET));
    Arc::new(Self {
      id: id.to_string(),
      left: Field::new(context.clone(), "left").with_rule(offset()),
      top: Field::new(context.clone(), "top").with_rule(offset()),
      name: Field::new(context.clone(), "name").with_rule(NotEmpty),
      rotation: Field::new(context.clone(), "rotation").with_rule(InRange::new(Some(0), Some(359))),
      z_index: Field::new(context.clone(), "z_index"),
      image_url: Field::new(context.clone(), "image_url"),
      previews: Field::new(context.clone(), "previews"),
      context,
    })
  }

  pub fn id(&self) -> &str {
    &self.id
  }

  /// Horizontal offset from the card's left edge.
  pub fn left(&self) -> &Field<Option<f64>> {
    &self.left
  }

  /// Vertical offset from the card's top edge.
  pub fn top(&self) -> &Field<Option<f64>> {
    &self.top
  }

  /// Sticker image name, e.g. `taco-cool`.
  pub fn name(&self) -> &Field<Option<String>> {
    &self.name
  }

  /// Clockwise rotation in degrees.
  pub fn rotation(&self) -> &Field<Option<i32>> {
    &self.rotation
  }

  pub fn z_index(&self) -> &Field<Option<i32>> {
    &self.z_index
  }

  pub fn image_url(&self) -> &Field<Option<String>> {
    &self.image_url
  }

  pub fn previews(&self) -> &Field<Option<Vec<ImagePreview>>> {
    &self.previews
  }

  pub fn context(&self) -> &Arc<SyncContext<StickerSnapshot>> {
    &self.context
  }

  pub fn on_updated(&self, f: impl Fn(&[&'static str]) + Send + Sync + 'static) {
    self.context.subscribe(f);
  }

  pub async fn refresh(&self) -> SyncResult<()> {
    self.context.expire();
    self.context.ensure_fresh().await
  }

  pub async fn delete(&self) -> SyncResult<()> {
    self.context.delete().await?;
    self
      .context
      .session()
      .identities()
      .remove::<Sticker>(&self.id);
    Ok(())
  }
}

impl std::fmt::Debug for Sticker {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Sticker")
      .field("id", &self.id)
      .field("state", &self.context.state())
      .finish_non_exhaustive()
  }
}
