//! Generic entity synchronization engine.
//!
//! Entities expose typed [`Field`]s backed by a [`SyncContext`], which fetches
//! lazily, coalesces writes into a single update, and merges server responses
//! without clobbering unsent local edits. A [`Session`] carries the identity
//! cache so every id maps to one live entity.

mod context;
mod core;
mod dependent;
mod field;
mod identity;
mod property;
mod session;
mod traits;
mod validation;

#[cfg(test)]
mod testing;

pub use self::context::{Subscriber, SyncContext, SyncState};
pub use self::core::DirtyMarks;
pub use self::dependent::{Dependent, DependentContext, ParentLink};
pub use self::field::{Field, FieldSource, SubmitHandle};
pub use self::identity::IdentityCache;
pub use self::property::{downcast, FieldValue, Property, PropertyRegistry, PropertyValue, Value};
pub use self::session::{Session, SyncSettings};
pub use self::traits::{Remote, Snapshot};
pub use self::validation::{
  validate, IdRule, InRange, MaxLength, NotEmpty, Rule, UriRule, ValidationCode, ValidationFault,
};
