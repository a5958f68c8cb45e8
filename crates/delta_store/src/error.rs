//! Storage-layer error types.

use crate::component::{ComponentId, PropertyRef};
use crate::entity::Entity;
use crate::kind::NumericKind;

/// Errors returned by [`World`](crate::World) operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No component is registered under this id.
    #[error("unknown component {0}")]
    UnknownComponent(ComponentId),

    /// The component exists but has no such field.
    #[error("unknown property {0}")]
    UnknownProperty(PropertyRef),

    /// The entity is not alive.
    #[error("{0} is not alive")]
    EntityNotAlive(Entity),

    /// A value of the wrong kind was written to a column.
    #[error("kind mismatch on {property}: column holds {expected:?}, got {found:?}")]
    KindMismatch {
        property: PropertyRef,
        expected: NumericKind,
        found: NumericKind,
    },

    /// The operation does not apply to this property's shape (e.g. reading a
    /// value from a tag, or a scalar access on an array column).
    #[error("property {property} is not a {expected} property")]
    ShapeMismatch {
        property: PropertyRef,
        expected: &'static str,
    },

    /// An array index past the array length.
    #[error("index {index} out of range for {property} (length {len})")]
    IndexOutOfRange {
        property: PropertyRef,
        index: usize,
        len: usize,
    },

    /// An array field was declared with zero elements.
    #[error("array field '{field}' of component '{component}' has zero length")]
    EmptyArray { component: String, field: String },
}
