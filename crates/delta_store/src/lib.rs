//! # delta_store
//!
//! Columnar entity-component storage: the data the delta codec reads from
//! and writes into.
//!
//! This crate provides:
//!
//! - [`Entity`]: dense `u32` entity identifiers.
//! - [`EntityAllocator`]: id allocation, recycling and liveness.
//! - [`ComponentDef`]: declarative component layouts (scalar, array and tag fields).
//! - [`NumericKind`] / [`Value`]: the closed set of column element types.
//! - [`Column`]: type-erased numeric storage indexed by entity id.
//! - [`World`]: the registry and storage, including the [`LayoutVersion`]
//!   that tells codecs when cached layouts are stale.

pub mod column;
pub mod component;
pub mod entity;
pub mod error;
pub mod kind;
pub mod world;

pub use column::Column;
pub use component::{ComponentDef, ComponentId, FieldDef, PropertyRef, Shape};
pub use entity::{Entity, EntityAllocator};
pub use error::StoreError;
pub use kind::{IndexWidth, NumericKind, Value};
pub use world::{DEFAULT_CAPACITY, LayoutVersion, World};
