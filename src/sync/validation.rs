//! Validation rules applied to field writes before they reach the dirty set.

use std::fmt;

use thiserror::Error;

/// Stable code identifying which rule rejected a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationCode {
  NotEmpty,
  MaxLength,
  OutOfRange,
  InvalidPosition,
  InvalidId,
  InvalidUri,
}

impl ValidationCode {
  pub fn as_str(self) -> &'static str {
    match self {
      ValidationCode::NotEmpty => "not_empty",
      ValidationCode::MaxLength => "max_length",
      ValidationCode::OutOfRange => "out_of_range",
      ValidationCode::InvalidPosition => "invalid_position",
      ValidationCode::InvalidId => "invalid_id",
      ValidationCode::InvalidUri => "invalid_uri",
    }
  }
}

impl fmt::Display for ValidationCode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A rule violation raised synchronously from a field write.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("[{code}] {message}")]
pub struct ValidationFault {
  pub code: ValidationCode,
  pub message: String,
}

impl ValidationFault {
  pub fn new(code: ValidationCode, message: impl Into<String>) -> Self {
    Self {
      code,
      message: message.into(),
    }
  }
}

/// A single validation rule for values of type `T`.
///
/// Rules are run in the order they were added to a field; the first failure
/// wins and the remaining rules are skipped.
pub trait Rule<T>: Send + Sync {
  fn check(&self, value: &T) -> Result<(), ValidationFault>;
}

/// Rejects missing, empty, and whitespace-only strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotEmpty;

impl Rule<Option<String>> for NotEmpty {
  fn check(&self, value: &Option<String>) -> Result<(), ValidationFault> {
    match value {
      Some(s) if !s.trim().is_empty() => Ok(()),
      _ => Err(ValidationFault::new(
        ValidationCode::NotEmpty,
        "Value cannot be null, empty, or whitespace.",
      )),
    }
  }
}

/// Caps the character count of a string.
#[derive(Debug, Clone, Copy)]
pub struct MaxLength(pub usize);

impl Rule<Option<String>> for MaxLength {
  fn check(&self, value: &Option<String>) -> Result<(), ValidationFault> {
    let len = value.as_deref().map(|s| s.chars().count()).unwrap_or(0);
    if len > self.0 {
      return Err(ValidationFault::new(
        ValidationCode::MaxLength,
        format!("Value must be at most {} characters, got {}.", self.0, len),
      ));
    }
    Ok(())
  }
}

/// Bounded numeric rule. Either bound may be open.
#[derive(Debug, Clone, Copy)]
pub struct InRange<N> {
  pub min: Option<N>,
  pub max: Option<N>,
}

impl<N> InRange<N> {
  pub fn new(min: Option<N>, max: Option<N>) -> Self {
    Self { min, max }
  }
}

impl<N> Rule<Option<N>> for InRange<N>
where
  N: PartialOrd + fmt::Display + Send + Sync,
{
  fn check(&self, value: &Option<N>) -> Result<(), ValidationFault> {
    let Some(v) = value else {
      return Ok(());
    };
    if let Some(min) = &self.min {
      if v < min {
        return Err(ValidationFault::new(
          ValidationCode::OutOfRange,
          format!("Value {} is below the minimum of {}.", v, min),
        ));
      }
    }
    if let Some(max) = &self.max {
      if v > max {
        return Err(ValidationFault::new(
          ValidationCode::OutOfRange,
          format!("Value {} is above the maximum of {}.", v, max),
        ));
      }
    }
    Ok(())
  }
}

/// Remote ids are 24 lowercase or uppercase hex characters.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdRule;

impl IdRule {
  pub fn is_valid(id: &str) -> bool {
    id.len() == 24 && id.chars().all(|c| c.is_ascii_hexdigit())
  }
}

impl Rule<Option<String>> for IdRule {
  fn check(&self, value: &Option<String>) -> Result<(), ValidationFault> {
    match value.as_deref() {
      Some(id) if IdRule::is_valid(id) => Ok(()),
      _ => Err(ValidationFault::new(
        ValidationCode::InvalidId,
        "Value must be a 24-character hexadecimal id.",
      )),
    }
  }
}

/// Accepts absolute http(s) URLs. A missing value passes.
#[derive(Debug, Clone, Copy, Default)]
pub struct UriRule;

impl Rule<Option<String>> for UriRule {
  fn check(&self, value: &Option<String>) -> Result<(), ValidationFault> {
    let Some(raw) = value.as_deref() else {
      return Ok(());
    };
    match url::Url::parse(raw) {
      Ok(u) if u.scheme() == "http" || u.scheme() == "https" => Ok(()),
      _ => Err(ValidationFault::new(
        ValidationCode::InvalidUri,
        format!("'{}' is not an absolute http or https URL.", raw),
      )),
    }
  }
}

/// Run rules in order, stopping at the first failure.
pub fn validate<T>(rules: &[Box<dyn Rule<T>>], value: &T) -> Result<(), ValidationFault> {
  rules.iter().try_for_each(|rule| rule.check(value))
}
