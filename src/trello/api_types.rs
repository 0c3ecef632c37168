//! Serde snapshots matching Trello REST payloads.
//!
//! Every optional wire field is an `Option` skipped when absent, so a
//! default-constructed snapshot with a few fields set serializes to exactly
//! the partial update the dirty set describes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sync::Snapshot;

use super::position::Position;

macro_rules! snapshot {
  ($ty:ty, $kind:literal) => {
    impl Snapshot for $ty {
      const KIND: &'static str = $kind;

      fn id(&self) -> &str {
        &self.id
      }

      fn set_id(&mut self, id: String) {
        self.id = id;
      }
    }
  };
}

// ============================================================================
// Members
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberSnapshot {
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub id: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub username: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub full_name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub initials: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub bio: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub avatar_url: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub url: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub confirmed: Option<bool>,
}

snapshot!(MemberSnapshot, "member");

// ============================================================================
// Actions
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionSnapshot {
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub id: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub id_member_creator: Option<String>,
  /// Present when the fetch asked for `memberCreator=true`.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub member_creator: Option<MemberSnapshot>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub date: Option<DateTime<Utc>>,
  #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
  pub action_type: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub data: Option<ActionDataSnapshot>,
  /// Write-only: comment text edits are sent flat as `text`, while reads
  /// return the text nested under `data`.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub text: Option<String>,
}

snapshot!(ActionSnapshot, "action");

/// Nested `data` object of an action. Carries no id of its own.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDataSnapshot {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub text: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub card: Option<EntityRef>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub board: Option<EntityRef>,
}

impl Snapshot for ActionDataSnapshot {
  const KIND: &'static str = "action data";

  fn id(&self) -> &str {
    ""
  }

  fn set_id(&mut self, _id: String) {}
}

/// Id and display name of an entity an action refers to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityRef {
  pub id: String,
  #[serde(default)]
  pub name: Option<String>,
}

// ============================================================================
// Attachments and stickers (card-scoped)
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePreview {
  #[serde(default)]
  pub id: String,
  #[serde(default)]
  pub width: Option<u32>,
  #[serde(default)]
  pub height: Option<u32>,
  #[serde(default)]
  pub url: Option<String>,
  #[serde(default)]
  pub scaled: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentSnapshot {
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub id: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub bytes: Option<u64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub date: Option<DateTime<Utc>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub edge_color: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub id_member: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub is_upload: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub mime_type: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub previews: Option<Vec<ImagePreview>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub url: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub pos: Option<Position>,
}

snapshot!(AttachmentSnapshot, "attachment");

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StickerSnapshot {
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub id: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub left: Option<f64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub top: Option<f64>,
  /// Sticker image name, e.g. `taco-cool`.
  #[serde(rename = "image", skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub rotation: Option<i32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub z_index: Option<i32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub image_url: Option<String>,
  #[serde(rename = "imageScaled", skip_serializing_if = "Option::is_none")]
  pub previews: Option<Vec<ImagePreview>>,
}

snapshot!(StickerSnapshot, "sticker");

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_partial_update_serializes_only_set_fields() {
    let partial = AttachmentSnapshot {
      name: Some("brief.pdf".into()),
      pos: Some(Position::Bottom),
      ..Default::default()
    };
    assert_eq!(
      serde_json::to_value(&partial).unwrap(),
      serde_json::json!({ "name": "brief.pdf", "pos": "bottom" })
    );
  }

  #[test]
  fn test_action_payload() {
    let json = r#"{
      "id": "5a1b2c3d4e5f60718293a4b5",
      "idMemberCreator": "4f00aa11bb22cc33dd44ee55",
      "memberCreator": { "id": "4f00aa11bb22cc33dd44ee55", "username": "ada" },
      "type": "commentCard",
      "date": "2024-03-01T12:00:00.000Z",
      "data": { "text": "ship it", "card": { "id": "c1", "name": "Launch" } }
    }"#;
    let action: ActionSnapshot = serde_json::from_str(json).unwrap();
    assert_eq!(action.action_type.as_deref(), Some("commentCard"));
    assert_eq!(
      action.data.as_ref().and_then(|d| d.text.as_deref()),
      Some("ship it")
    );
    assert_eq!(
      action.member_creator.as_ref().and_then(|m| m.username.as_deref()),
      Some("ada")
    );
    assert!(action.text.is_none());
  }

  #[test]
  fn test_sticker_wire_names() {
    let json = r#"{ "id": "s1", "image": "taco-cool", "left": 10.5, "zIndex": 2 }"#;
    let sticker: StickerSnapshot = serde_json::from_str(json).unwrap();
    assert_eq!(sticker.name.as_deref(), Some("taco-cool"));
    assert_eq!(sticker.z_index, Some(2));
  }
}
