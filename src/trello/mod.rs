//! Trello REST collaborator and the entities built on the sync engine.

pub mod action;
pub mod api_types;
pub mod attachment;
pub mod client;
pub mod fields;
pub mod member;
pub mod position;
pub mod sticker;

#[cfg(test)]
mod testing;

pub use action::Action;
pub use attachment::Attachment;
pub use client::{CardEndpoint, TrelloClient};
pub use member::Member;
pub use position::Position;
pub use sticker::Sticker;

use chrono::{DateTime, TimeZone, Utc};

/// Trello ids are Mongo object ids: the first 8 hex digits are the creation
/// time in seconds since the epoch.
pub fn creation_date(id: &str) -> Option<DateTime<Utc>> {
  let seconds = i64::from_str_radix(id.get(..8)?, 16).ok()?;
  Utc.timestamp_opt(seconds, 0).single()
}
