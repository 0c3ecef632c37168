//! Trello actions (activity records such as comments).
//!
//! The comment text lives in the action's nested `data` object, which is
//! synchronized by a dependent context riding on the action's own context.

use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};

use crate::error::{SyncError, SyncResult};
use crate::sync::{
  Dependent, DependentContext, Field, MaxLength, NotEmpty, ParentLink, Property, PropertyRegistry,
  Session, SyncContext,
};

use super::api_types::{ActionDataSnapshot, ActionSnapshot, MemberSnapshot};
use super::fields::ActionFields;
use super::member::Member;

type A = ActionSnapshot;
type D = ActionDataSnapshot;

fn registry() -> &'static PropertyRegistry<ActionSnapshot> {
  static REGISTRY: OnceLock<PropertyRegistry<ActionSnapshot>> = OnceLock::new();
  REGISTRY.get_or_init(|| {
    PropertyRegistry::new([
      Property::new(
        "creator",
        |a: &A| a.member_creator.clone(),
        |a: &mut A, v: Option<MemberSnapshot>| a.member_creator = v,
      )
      .with_resolver(resolve_creator)
      .selecting(ActionFields::MEMBER_CREATOR.bits()),
      Property::new(
        "creator_id",
        |a: &A| a.id_member_creator.clone(),
        |a: &mut A, v| a.id_member_creator = v,
      )
      .selecting(ActionFields::MEMBER_CREATOR.bits()),
      Property::new("date", |a: &A| a.date, |a: &mut A, v| a.date = v)
        .selecting(ActionFields::DATE.bits()),
      Property::new("type", |a: &A| a.action_type.clone(), |a: &mut A, v| a.action_type = v)
        .selecting(ActionFields::TYPE.bits()),
    ])
  })
}

fn data_registry() -> &'static PropertyRegistry<ActionDataSnapshot> {
  static REGISTRY: OnceLock<PropertyRegistry<ActionDataSnapshot>> = OnceLock::new();
  REGISTRY.get_or_init(|| {
    PropertyRegistry::new([
      Property::new("text", |d: &D| d.text.clone(), |d: &mut D, v| d.text = v)
        .selecting(ActionFields::DATA.bits()),
      Property::new(
        "card_name",
        |d: &D| d.card.as_ref().and_then(|c| c.name.clone()),
        |d: &mut D, v: Option<String>| {
          if let Some(card) = d.card.as_mut() {
            card.name = v;
          }
        },
      )
      .selecting(ActionFields::DATA.bits()),
    ])
  })
}

/// Prefer the embedded creator payload; fall back to the bare id. The
/// payload never overwrites a member that loaded its own data.
fn resolve_creator(a: &ActionSnapshot, session: &Session) -> SyncResult<Option<Arc<Member>>> {
  match (&a.member_creator, &a.id_member_creator) {
    (Some(m), _) if !m.id.is_empty() => Member::from_reference(m, session).map(Some),
    (_, Some(id)) => Member::new(id, session).map(Some),
    _ => Ok(None),
  }
}

/// Map configured property names onto action field flags.
pub fn action_selection<'a>(
  names: impl IntoIterator<Item = &'a str>,
) -> Result<ActionFields, Vec<String>> {
  let mut bits = 0;
  let mut unknown = Vec::new();
  for name in names {
    match registry()
      .selection_bits([name])
      .or_else(|_| data_registry().selection_bits([name]))
    {
      Ok(b) => bits |= b,
      Err(_) => unknown.push(name.to_string()),
    }
  }
  if unknown.is_empty() {
    Ok(ActionFields::from_bits_truncate(bits))
  } else {
    Err(unknown)
  }
}

pub struct Action {
  id: String,
  context: Arc<SyncContext<ActionSnapshot>>,
  data: Arc<DependentContext<ActionSnapshot, ActionDataSnapshot>>,
  creator: Field<Option<Arc<Member>>>,
  creator_id: Field<Option<String>>,
  date: Field<Option<DateTime<Utc>>>,
  action_type: Field<Option<String>>,
  text: Field<Option<String>>,
  card_name: Field<Option<String>>,
}

impl Action {
  pub fn new(id: &str, session: &Session) -> SyncResult<Arc<Self>> {
    session
      .identities()
      .try_get_or_add(id, || Self::build(id, session))
  }

  pub fn from_snapshot(snapshot: &ActionSnapshot, session: &Session) -> SyncResult<Arc<Self>> {
    let action = Self::new(&snapshot.id, session)?;
    action.context.merge(snapshot);
    Ok(action)
  }

  fn build(id: &str, session: &Session) -> SyncResult<Arc<Self>> {
    let remote = session.remote::<ActionSnapshot>()?;
    let mut data = None;
    let context = SyncContext::with_dependents(id, registry(), remote, session.clone(), |parent| {
      let child = DependentContext::new(
        data_registry(),
        session.clone(),
        ParentLink::to(parent),
        |a: &A| a.data.as_ref(),
        // Edits go out flat as `text`, not nested under `data`.
        |a: &mut A, d: D| a.text = d.text,
      );
      data = Some(child.clone());
      vec![child as Arc<dyn Dependent<ActionSnapshot>>]
    });
    let data = data.ok_or_else(|| SyncError::Property("action data context missing".into()))?;

    Ok(Arc::new(Self {
      id: id.to_string(),
      creator: Field::new(context.clone(), "creator"),
      creator_id: Field::new(context.clone(), "creator_id"),
      date: Field::new(context.clone(), "date"),
      action_type: Field::new(context.clone(), "type"),
      text: Field::new(data.clone(), "text")
        .with_rule(NotEmpty)
        .with_rule(MaxLength(16384)),
      card_name: Field::new(data.clone(), "card_name"),
      context,
      data,
    }))
  }

  pub fn id(&self) -> &str {
    &self.id
  }

  pub fn creation_date(&self) -> Option<DateTime<Utc>> {
    super::creation_date(&self.id)
  }

  /// Member who performed the action.
  pub fn creator(&self) -> &Field<Option<Arc<Member>>> {
    &self.creator
  }

  pub fn creator_id(&self) -> &Field<Option<String>> {
    &self.creator_id
  }

  pub fn date(&self) -> &Field<Option<DateTime<Utc>>> {
    &self.date
  }

  /// Trello action type, e.g. `commentCard`.
  pub fn action_type(&self) -> &Field<Option<String>> {
    &self.action_type
  }

  /// Comment text. Writable for comment actions only.
  pub fn text(&self) -> &Field<Option<String>> {
    &self.text
  }

  /// Name of the card the action happened on, if any.
  pub fn card_name(&self) -> &Field<Option<String>> {
    &self.card_name
  }

  pub fn context(&self) -> &Arc<SyncContext<ActionSnapshot>> {
    &self.context
  }

  pub fn on_updated(&self, f: impl Fn(&[&'static str]) + Send + Sync + 'static) {
    self.context.subscribe(f);
  }

  pub async fn refresh(&self) -> SyncResult<()> {
    self.context.expire();
    self.context.ensure_fresh().await
  }

  /// Delete the action remotely and evict it from the session.
  pub async fn delete(&self) -> SyncResult<()> {
    self.context.delete().await?;
    self
      .context
      .session()
      .identities()
      .remove::<Action>(&self.id);
    Ok(())
  }

  pub fn is_data_stale(&self) -> bool {
    self.data.is_stale()
  }
}

impl std::fmt::Debug for Action {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Action")
      .field("id", &self.id)
      .field("state", &self.context.state())
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::sync::Remote;
  use crate::trello::api_types::EntityRef;
  use crate::trello::testing::ScriptedRemote;
  use std::time::Duration;

  const ID: &str = "5a1b2c3d4e5f60718293a4b5";

  fn comment() -> ActionSnapshot {
    ActionSnapshot {
      id: ID.into(),
      id_member_creator: Some("4f00aa11bb22cc33dd44ee55".into()),
      member_creator: Some(MemberSnapshot {
        id: "4f00aa11bb22cc33dd44ee55".into(),
        username: Some("ada".into()),
        ..Default::default()
      }),
      action_type: Some("commentCard".into()),
      data: Some(ActionDataSnapshot {
        text: Some("first draft".into()),
        card: Some(EntityRef {
          id: "c1".into(),
          name: Some("Launch".into()),
        }),
        board: None,
      }),
      ..Default::default()
    }
  }

  fn setup() -> (Session, Arc<ScriptedRemote<ActionSnapshot>>, Arc<ScriptedRemote<MemberSnapshot>>) {
    let session = Session::new(crate::sync::SyncSettings {
      submit_delay: Duration::from_millis(10),
      ..Default::default()
    });
    let actions = ScriptedRemote::serving(comment());
    let members = ScriptedRemote::serving(MemberSnapshot::default());
    let remote: Arc<dyn Remote<ActionSnapshot>> = actions.clone();
    session.register_remote(remote);
    let remote: Arc<dyn Remote<MemberSnapshot>> = members.clone();
    session.register_remote(remote);
    (session, actions, members)
  }

  #[tokio::test]
  async fn test_text_comes_from_nested_data() {
    let (session, actions, _) = setup();
    let action = Action::new(ID, &session).unwrap();

    assert_eq!(action.text().get().await.unwrap().as_deref(), Some("first draft"));
    assert_eq!(action.card_name().peek().unwrap().as_deref(), Some("Launch"));
    assert_eq!(action.action_type().peek().unwrap().as_deref(), Some("commentCard"));
    assert_eq!(actions.fetch_count(), 1);
  }

  #[tokio::test]
  async fn test_creator_resolves_through_identity_cache() {
    let (session, _, members) = setup();
    let action = Action::new(ID, &session).unwrap();

    let creator = action.creator().get().await.unwrap().unwrap();
    assert_eq!(creator.username().peek().unwrap().as_deref(), Some("ada"));

    let again = Member::new("4f00aa11bb22cc33dd44ee55", &session).unwrap();
    assert!(Arc::ptr_eq(&creator, &again));
    // the embedded payload made a member fetch unnecessary
    assert_eq!(members.fetch_count(), 0);
  }

  #[tokio::test]
  async fn test_reading_creator_keeps_member_data() {
    let (session, _, members) = setup();
    *members.server.lock() = MemberSnapshot {
      id: "4f00aa11bb22cc33dd44ee55".into(),
      username: Some("ada".into()),
      bio: Some("math".into()),
      url: Some("https://trello.com/ada".into()),
      ..Default::default()
    };
    let member = Member::new("4f00aa11bb22cc33dd44ee55", &session).unwrap();
    assert_eq!(member.bio().get().await.unwrap().as_deref(), Some("math"));

    let action = Action::new(ID, &session).unwrap();
    let creator = action.creator().get().await.unwrap().unwrap();
    assert!(Arc::ptr_eq(&creator, &member));
    action.creator().get().await.unwrap();

    assert_eq!(member.bio().get().await.unwrap().as_deref(), Some("math"));
    assert_eq!(member.url().peek().unwrap().as_deref(), Some("https://trello.com/ada"));
    assert_eq!(members.fetch_count(), 1);
  }

  #[tokio::test]
  async fn test_text_edit_is_sent_flat() {
    let (session, actions, _) = setup();
    let action = Action::new(ID, &session).unwrap();
    action.text().get().await.unwrap();

    action.text().set(Some("final".into())).unwrap().await.unwrap();

    let updates = actions.updates.lock().clone();
    assert_eq!(updates, vec![serde_json::json!({ "text": "final" })]);
  }

  #[tokio::test]
  async fn test_expire_cascades_to_data() {
    let (session, actions, _) = setup();
    let action = Action::new(ID, &session).unwrap();
    action.refresh().await.unwrap();
    assert!(!action.is_data_stale());

    action.context().expire();
    assert!(action.is_data_stale());
    action.text().get().await.unwrap();
    assert_eq!(actions.fetch_count(), 2);
  }

  #[tokio::test]
  async fn test_delete_evicts_identity() {
    let (session, actions, _) = setup();
    let action = Action::new(ID, &session).unwrap();
    action.delete().await.unwrap();

    assert_eq!(actions.deletes.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert!(session.identities().find::<Action>(ID).is_none());
  }

  #[test]
  fn test_selection_spans_data_properties() {
    let fields = action_selection(["text", "date"]).unwrap();
    assert_eq!(fields, ActionFields::DATA | ActionFields::DATE);
    assert_eq!(action_selection(["nope"]).unwrap_err(), vec!["nope".to_string()]);
  }
}
