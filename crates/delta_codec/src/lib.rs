//! # delta_codec
//!
//! Delta-aware binary codec for [`delta_store`] worlds.
//!
//! A [`Serializer`] turns the current values of a chosen set of properties,
//! for a chosen list of entities, into a compact big-endian packet. For
//! change-tracked properties it sends only values that differ from what it
//! sent last time. A [`Deserializer`] applies such packets to another world,
//! creating entities and components as needed.
//!
//! This crate provides:
//!
//! - [`schema`]: property targets, the resolved [`PropertyTable`] and the
//!   exchangeable [`Schema`].
//! - [`serializer`]: packet production and diffing.
//! - [`deserializer`]: packet application and entity id remapping.
//! - [`config`]: serializer configuration.
//! - [`error`]: codec error types.
//!
//! ## Packet layout
//!
//! ```text
//! packet := block*
//! block  := property_id:u8 entity_count:u32 entry*
//! entry  := entity_id:u32 payload
//! ```
//!
//! A tag payload is empty, a scalar payload is the value, and an array
//! payload is a changed-element count followed by `(index, value)` pairs,
//! with counts and indices as wide as the array length requires.

pub mod config;
pub mod deserializer;
pub mod error;
pub mod schema;
pub mod serializer;
mod shadow;
mod wire;

#[cfg(test)]
mod test_support;

pub use config::{DEFAULT_MAX_BYTES, SerializerConfig};
pub use deserializer::Deserializer;
pub use error::CodecError;
pub use schema::{
    MAX_PROPERTIES, PropertyDescriptor, PropertyTable, Schema, TableEntry, Target, TargetEntry,
};
pub use serializer::Serializer;
