//! Field selections: which optional properties a fetch asks Trello for.
//!
//! Each entity type has a flag set. A flag maps either to a name in the
//! `fields=` query parameter or, for sub-resources, to an include parameter.

use bitflags::bitflags;

bitflags! {
  #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
  pub struct MemberFields: u32 {
    const USERNAME = 1;
    const FULL_NAME = 1 << 1;
    const INITIALS = 1 << 2;
    const BIO = 1 << 3;
    const AVATAR_URL = 1 << 4;
    const URL = 1 << 5;
    const CONFIRMED = 1 << 6;
  }
}

bitflags! {
  #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
  pub struct ActionFields: u32 {
    const DATA = 1;
    const DATE = 1 << 1;
    const MEMBER_CREATOR = 1 << 2;
    const TYPE = 1 << 3;
  }
}

bitflags! {
  #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
  pub struct AttachmentFields: u32 {
    const BYTES = 1;
    const DATE = 1 << 1;
    const IS_UPLOAD = 1 << 2;
    const MEMBER = 1 << 3;
    const MIME_TYPE = 1 << 4;
    const NAME = 1 << 5;
    const PREVIEWS = 1 << 6;
    const URL = 1 << 7;
    const EDGE_COLOR = 1 << 8;
    const POSITION = 1 << 9;
  }
}

bitflags! {
  #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
  pub struct StickerFields: u32 {
    const LEFT = 1;
    const NAME = 1 << 1;
    const PREVIEWS = 1 << 2;
    const ROTATION = 1 << 3;
    const TOP = 1 << 4;
    const IMAGE_URL = 1 << 5;
    const Z_INDEX = 1 << 6;
  }
}

/// Wire vocabulary of a flag set.
pub trait WireFields: bitflags::Flags<Bits = u32> + Copy + 'static {
  /// Flag -> name in the `fields=` list.
  const NAMES: &'static [(Self, &'static str)];

  /// Query parameters for a fetch limited to `self`.
  fn query(self) -> Vec<(&'static str, String)> {
    vec![("fields", field_list(self, Self::NAMES))]
  }
}

fn field_list<F: WireFields>(selected: F, names: &[(F, &'static str)]) -> String {
  let names: Vec<&str> = names
    .iter()
    .filter(|(flag, _)| selected.contains(*flag))
    .map(|(_, name)| *name)
    .collect();
  names.join(",")
}

impl WireFields for MemberFields {
  const NAMES: &'static [(Self, &'static str)] = &[
    (Self::USERNAME, "username"),
    (Self::FULL_NAME, "fullName"),
    (Self::INITIALS, "initials"),
    (Self::BIO, "bio"),
    (Self::AVATAR_URL, "avatarUrl"),
    (Self::URL, "url"),
    (Self::CONFIRMED, "confirmed"),
  ];
}

impl WireFields for ActionFields {
  const NAMES: &'static [(Self, &'static str)] = &[
    (Self::DATA, "data"),
    (Self::DATE, "date"),
    (Self::MEMBER_CREATOR, "idMemberCreator"),
    (Self::TYPE, "type"),
  ];

  fn query(self) -> Vec<(&'static str, String)> {
    let mut query = vec![("fields", field_list(self, Self::NAMES))];
    if self.contains(Self::MEMBER_CREATOR) {
      query.push(("memberCreator", "true".to_string()));
      query.push((
        "memberCreator_fields",
        field_list(MemberFields::all(), MemberFields::NAMES),
      ));
    } else {
      query.push(("memberCreator", "false".to_string()));
    }
    query
  }
}

impl WireFields for AttachmentFields {
  const NAMES: &'static [(Self, &'static str)] = &[
    (Self::BYTES, "bytes"),
    (Self::DATE, "date"),
    (Self::IS_UPLOAD, "isUpload"),
    (Self::MEMBER, "idMember"),
    (Self::MIME_TYPE, "mimeType"),
    (Self::NAME, "name"),
    (Self::PREVIEWS, "previews"),
    (Self::URL, "url"),
    (Self::EDGE_COLOR, "edgeColor"),
    (Self::POSITION, "pos"),
  ];
}

impl WireFields for StickerFields {
  const NAMES: &'static [(Self, &'static str)] = &[
    (Self::LEFT, "left"),
    (Self::NAME, "image"),
    (Self::PREVIEWS, "imageScaled"),
    (Self::ROTATION, "rotation"),
    (Self::TOP, "top"),
    (Self::IMAGE_URL, "imageUrl"),
    (Self::Z_INDEX, "zIndex"),
  ];
}

/// Selections the client applies to fetches, one per entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selections {
  pub member: MemberFields,
  pub action: ActionFields,
  pub attachment: AttachmentFields,
  pub sticker: StickerFields,
}

impl Default for Selections {
  fn default() -> Self {
    Self {
      member: MemberFields::all(),
      action: ActionFields::all(),
      attachment: AttachmentFields::all(),
      sticker: StickerFields::all(),
    }
  }
}
