//! Ordering position of cards, lists, checklists and attachments.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::sync::{Rule, ValidationCode, ValidationFault};

/// Position on the wire is either a positive number or one of the keywords
/// `top` and `bottom`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Position {
  Top,
  Bottom,
  At(f64),
}

impl Position {
  pub fn is_valid(&self) -> bool {
    match self {
      Position::Top | Position::Bottom => true,
      Position::At(v) => v.is_finite() && *v > 0.0,
    }
  }
}

impl fmt::Display for Position {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Position::Top => f.write_str("top"),
      Position::Bottom => f.write_str("bottom"),
      Position::At(v) => write!(f, "{}", v),
    }
  }
}

impl FromStr for Position {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "top" => Ok(Position::Top),
      "bottom" => Ok(Position::Bottom),
      other => other
        .parse::<f64>()
        .map(Position::At)
        .map_err(|_| format!("'{}' is not a position (expected top, bottom or a number)", s)),
    }
  }
}

impl Serialize for Position {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    match self {
      Position::Top => serializer.serialize_str("top"),
      Position::Bottom => serializer.serialize_str("bottom"),
      Position::At(v) => serializer.serialize_f64(*v),
    }
  }
}

impl<'de> Deserialize<'de> for Position {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
      Number(f64),
      Text(String),
    }

    match Raw::deserialize(deserializer)? {
      Raw::Number(v) => Ok(Position::At(v)),
      Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
  }
}

/// Rejects missing, non-positive and non-finite positions.
#[derive(Debug, Clone, Copy, Default)]
pub struct PositionRule;

impl Rule<Option<Position>> for PositionRule {
  fn check(&self, value: &Option<Position>) -> Result<(), ValidationFault> {
    match value {
      Some(p) if p.is_valid() => Ok(()),
      _ => Err(ValidationFault::new(
        ValidationCode::InvalidPosition,
        "Position must be top, bottom or a positive number.",
      )),
    }
  }
}
