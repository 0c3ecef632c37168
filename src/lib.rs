//! Lazily synchronized, identity-cached entities over a REST API.
//!
//! [`sync`] is the generic engine; [`trello`] wires it to the Trello API.

pub mod config;
pub mod error;
pub mod logging;
pub mod sync;
pub mod trello;
