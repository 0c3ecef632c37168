//! Card attachments.

use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};

use crate::error::SyncResult;
use crate::sync::{Field, NotEmpty, Property, PropertyRegistry, Remote, Session, SyncContext};

use super::api_types::{AttachmentSnapshot, ImagePreview};
use super::fields::AttachmentFields;
use super::member::Member;
use super::position::{Position, PositionRule};

fn registry() -> &'static PropertyRegistry<AttachmentSnapshot> {
  static REGISTRY: OnceLock<PropertyRegistry<AttachmentSnapshot>> = OnceLock::new();
  REGISTRY.get_or_init(|| {
    type T = AttachmentSnapshot;
    PropertyRegistry::new([
      Property::new("bytes", |a: &T| a.bytes, |a: &mut T, v| a.bytes = v)
        .selecting(AttachmentFields::BYTES.bits()),
      Property::new("date", |a: &T| a.date, |a: &mut T, v| a.date = v)
        .selecting(AttachmentFields::DATE.bits()),
      Property::new("edge_color", |a: &T| a.edge_color.clone(), |a: &mut T, v| a.edge_color = v)
        .selecting(AttachmentFields::EDGE_COLOR.bits()),
      Property::new("is_upload", |a: &T| a.is_upload, |a: &mut T, v| a.is_upload = v)
        .selecting(AttachmentFields::IS_UPLOAD.bits()),
      Property::new(
        "member",
        |a: &T| a.id_member.clone(),
        |a: &mut T, v: Option<String>| a.id_member = v,
      )
      .with_resolver(|a: &T, session: &Session| match &a.id_member {
        Some(id) => Member::new(id, session).map(Some),
        None => Ok(None),
      })
      .selecting(AttachmentFields::MEMBER.bits()),
      Property::new("mime_type", |a: &T| a.mime_type.clone(), |a: &mut T, v| a.mime_type = v)
        .selecting(AttachmentFields::MIME_TYPE.bits()),
      Property::new("name", |a: &T| a.name.clone(), |a: &mut T, v| a.name = v)
        .selecting(AttachmentFields::NAME.bits()),
      Property::new("position", |a: &T| a.pos, |a: &mut T, v| a.pos = v)
        .selecting(AttachmentFields::POSITION.bits()),
      Property::new("previews", |a: &T| a.previews.clone(), |a: &mut T, v| a.previews = v)
        .selecting(AttachmentFields::PREVIEWS.bits()),
      Property::new("url", |a: &T| a.url.clone(), |a: &mut T, v| a.url = v)
        .selecting(AttachmentFields::URL.bits()),
    ])
  })
}

pub fn attachment_registry() -> &'static PropertyRegistry<AttachmentSnapshot> {
  registry()
}

/// A file or link attached to a card.
pub struct Attachment {
  id: String,
  context: Arc<SyncContext<AttachmentSnapshot>>,
  bytes: Field<Option<u64>>,
  date: Field<Option<DateTime<Utc>>>,
  edge_color: Field<Option<String>>,
  is_upload: Field<Option<bool>>,
  member: Field<Option<Arc<Member>>>,
  mime_type: Field<Option<String>>,
  name: Field<Option<String>>,
  position: Field<Option<Position>>,
  previews: Field<Option<Vec<ImagePreview>>>,
  url: Field<Option<String>>,
}

impl Attachment {
  /// `remote` is the card-scoped endpoint owning this attachment.
  pub fn new(
    id: &str,
    remote: Arc<dyn Remote<AttachmentSnapshot>>,
    session: &Session,
  ) -> Arc<Self> {
    session
      .identities()
      .get_or_add(id, || Self::build(id, remote, session))
  }

  /// Wrap a payload from a card listing. Merged into any cached instance.
  pub fn from_snapshot(
    snapshot: &AttachmentSnapshot,
    remote: Arc<dyn Remote<AttachmentSnapshot>>,
    session: &Session,
  ) -> Arc<Self> {
    let attachment = Self::new(&snapshot.id, remote, session);
    attachment.context.merge(snapshot);
    attachment
  }

  fn build(
    id: &str,
    remote: Arc<dyn Remote<AttachmentSnapshot>>,
    session: &Session,
  ) -> Arc<Self> {
    let context = SyncContext::new(id, registry(), remote, session.clone());
    Arc::new(Self {
      id: id.to_string(),
      bytes: Field::new(context.clone(), "bytes"),
      date: Field::new(context.clone(), "date"),
      edge_color: Field::new(context.clone(), "edge_color"),
      is_upload: Field::new(context.clone(), "is_upload"),
      member: Field::new(context.clone(), "member"),
      mime_type: Field::new(context.clone(), "mime_type"),
      name: Field::new(context.clone(), "name").with_rule(NotEmpty),
      position: Field::new(context.clone(), "position").with_rule(PositionRule),
      previews: Field::new(context.clone(), "previews"),
      url: Field::new(context.clone(), "url"),
      context,
    })
  }

  pub fn id(&self) -> &str {
    &self.id
  }

  pub fn creation_date(&self) -> Option<DateTime<Utc>> {
    super::creation_date(&self.id)
  }

  pub fn bytes(&self) -> &Field<Option<u64>> {
    &self.bytes
  }

  pub fn date(&self) -> &Field<Option<DateTime<Utc>>> {
    &self.date
  }

  /// Dominant edge color of an image attachment, as `#rrggbb`.
  pub fn edge_color(&self) -> &Field<Option<String>> {
    &self.edge_color
  }

  pub fn is_upload(&self) -> &Field<Option<bool>> {
    &self.is_upload
  }

  /// Member who attached it.
  pub fn member(&self) -> &Field<Option<Arc<Member>>> {
    &self.member
  }

  pub fn mime_type(&self) -> &Field<Option<String>> {
    &self.mime_type
  }

  pub fn name(&self) -> &Field<Option<String>> {
    &self.name
  }

  pub fn position(&self) -> &Field<Option<Position>> {
    &self.position
  }

  pub fn previews(&self) -> &Field<Option<Vec<ImagePreview>>> {
    &self.previews
  }

  pub fn url(&self) -> &Field<Option<String>> {
    &self.url
  }

  pub fn context(&self) -> &Arc<SyncContext<AttachmentSnapshot>> {
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
      .remove::<Attachment>(&self.id);
    Ok(())
  }
}

impl std::fmt::Debug for Attachment {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Attachment")
      .field("id", &self.id)
      .field("state", &self.context.state())
      .finish_non_exhaustive()
  }
}

impl std::fmt::Display for Attachment {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self.context.snapshot().name {
      Some(name) => f.write_str(&name),
      None => f.write_str(&self.id),
    }
  }
}
