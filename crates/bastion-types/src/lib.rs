//! Shared type definitions for the Bastion property store.
//!
//! This crate is the leaf of the workspace: every other crate depends on it
//! and it depends on nothing but `serde`, `uuid`, and `thiserror`.
//!
//! # Modules
//!
//! - [`ids`] -- Strongly-typed entity identifiers.
//! - [`key`] -- Namespaced property keys and their grammar.
//! - [`value`] -- Primitive storage kinds and raw stored values.

pub mod ids;
pub mod key;
pub mod value;

pub use ids::EntityId;
pub use key::{KeyError, Namespace, PropertyKey};
pub use value::{PrimitiveType, RawValue};
