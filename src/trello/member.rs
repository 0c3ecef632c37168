//! Trello members.

use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::SyncResult;
use crate::sync::{Field, MaxLength, NotEmpty, Property, PropertyRegistry, Session, SyncContext};

use super::api_types::MemberSnapshot;
use super::fields::MemberFields;

fn registry() -> &'static PropertyRegistry<MemberSnapshot> {
  static REGISTRY: OnceLock<PropertyRegistry<MemberSnapshot>> = OnceLock::new();
  REGISTRY.get_or_init(|| {
    type M = MemberSnapshot;
    PropertyRegistry::new([
      Property::new("username", |m: &M| m.username.clone(), |m: &mut M, v| m.username = v)
        .selecting(MemberFields::USERNAME.bits()),
      Property::new("full_name", |m: &M| m.full_name.clone(), |m: &mut M, v| m.full_name = v)
        .selecting(MemberFields::FULL_NAME.bits()),
      Property::new("initials", |m: &M| m.initials.clone(), |m: &mut M, v| m.initials = v)
        .selecting(MemberFields::INITIALS.bits()),
      Property::new("bio", |m: &M| m.bio.clone(), |m: &mut M, v| m.bio = v)
        .selecting(MemberFields::BIO.bits()),
      Property::new("avatar_url", |m: &M| m.avatar_url.clone(), |m: &mut M, v| m.avatar_url = v)
        .selecting(MemberFields::AVATAR_URL.bits()),
      Property::new("url", |m: &M| m.url.clone(), |m: &mut M, v| m.url = v)
        .selecting(MemberFields::URL.bits()),
      Property::new("confirmed", |m: &M| m.confirmed, |m: &mut M, v| m.confirmed = v)
        .selecting(MemberFields::CONFIRMED.bits()),
    ])
  })
}

/// Property table for members, used to turn configured names into selections.
pub fn member_registry() -> &'static PropertyRegistry<MemberSnapshot> {
  registry()
}

/// A Trello user. One instance per id per session.
pub struct Member {
  id: String,
  context: Arc<SyncContext<MemberSnapshot>>,
  username: Field<Option<String>>,
  full_name: Field<Option<String>>,
  initials: Field<Option<String>>,
  bio: Field<Option<String>>,
  avatar_url: Field<Option<String>>,
  url: Field<Option<String>>,
  confirmed: Field<Option<bool>>,
}

impl Member {
  /// The member for `id` (or username), using the member remote registered
  /// on the session. Nothing is fetched until a field is read.
  pub fn new(id: &str, session: &Session) -> SyncResult<Arc<Self>> {
    session
      .identities()
      .try_get_or_add(id, || Self::build(id, session))
  }

  /// The member for an already downloaded payload. The payload is merged
  /// into the cached instance.
  pub fn from_snapshot(snapshot: &MemberSnapshot, session: &Session) -> SyncResult<Arc<Self>> {
    let member = Self::new(&snapshot.id, session)?;
    member.context.merge(snapshot);
    Ok(member)
  }

  /// The member for a payload embedded in another entity, such as an
  /// action's creator. The payload only fills an instance that holds no data
  /// yet; a member that already loaded its own data is left untouched.
  pub fn from_reference(snapshot: &MemberSnapshot, session: &Session) -> SyncResult<Arc<Self>> {
    let member = Self::new(&snapshot.id, session)?;
    member.context.seed(snapshot);
    Ok(member)
  }

  fn build(id: &str, session: &Session) -> SyncResult<Arc<Self>> {
    let remote = session.remote::<MemberSnapshot>()?;
    let context = SyncContext::new(id, registry(), remote, session.clone());
    let field = |name| Field::new(context.clone(), name);

    let member = Arc::new(Self {
      id: id.to_string(),
      username: field("username").with_rule(NotEmpty),
      full_name: field("full_name").with_rule(NotEmpty),
      initials: field("initials")
        .with_rule(NotEmpty)
        .with_rule(MaxLength(4)),
      bio: field("bio").with_rule(MaxLength(16384)),
      avatar_url: field("avatar_url"),
      url: field("url"),
      confirmed: Field::new(context.clone(), "confirmed"),
      context,
    });

    // A username lookup is answered with the canonical id; make the same
    // instance reachable under it.
    let weak = Arc::downgrade(&member);
    let identities = session.identities().clone();
    member.context.on_id_corrected(move |remote_id| {
      let Some(member) = weak.upgrade() else {
        return;
      };
      let registered = identities.get_or_add(remote_id, || member.clone());
      if !Arc::ptr_eq(&registered, &member) {
        debug!(id = %member.id, %remote_id, "member already cached under its remote id");
      }
    });

    Ok(member)
  }

  /// Id the instance was created with. For a username lookup, see
  /// [`Member::remote_id`].
  pub fn id(&self) -> &str {
    &self.id
  }

  /// Id as corrected by the server.
  pub fn remote_id(&self) -> String {
    self.context.id()
  }

  pub fn creation_date(&self) -> Option<DateTime<Utc>> {
    super::creation_date(&self.context.id())
  }

  pub fn username(&self) -> &Field<Option<String>> {
    &self.username
  }

  pub fn full_name(&self) -> &Field<Option<String>> {
    &self.full_name
  }

  pub fn initials(&self) -> &Field<Option<String>> {
    &self.initials
  }

  pub fn bio(&self) -> &Field<Option<String>> {
    &self.bio
  }

  pub fn avatar_url(&self) -> &Field<Option<String>> {
    &self.avatar_url
  }

  pub fn url(&self) -> &Field<Option<String>> {
    &self.url
  }

  pub fn confirmed(&self) -> &Field<Option<bool>> {
    &self.confirmed
  }

  pub fn context(&self) -> &Arc<SyncContext<MemberSnapshot>> {
    &self.context
  }

  /// Called with the changed property names after each merge.
  pub fn on_updated(&self, f: impl Fn(&[&'static str]) + Send + Sync + 'static) {
    self.context.subscribe(f);
  }

  /// Drop cached data and fetch again.
  pub async fn refresh(&self) -> SyncResult<()> {
    self.context.expire();
    self.context.ensure_fresh().await
  }
}

impl PartialEq for Member {
  fn eq(&self, other: &Self) -> bool {
    self.id == other.id
  }
}

impl std::fmt::Debug for Member {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Member")
      .field("id", &self.id)
      .field("state", &self.context.state())
      .finish_non_exhaustive()
  }
}

impl std::fmt::Display for Member {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let snapshot = self.context.snapshot();
    match (snapshot.full_name, snapshot.username) {
      (Some(name), Some(user)) => write!(f, "{} (@{})", name, user),
      (Some(name), None) => f.write_str(&name),
      (None, Some(user)) => write!(f, "@{}", user),
      (None, None) => f.write_str(&self.id),
    }
  }
}
