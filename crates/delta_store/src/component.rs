//! Component definitions and property addressing.
//!
//! A component is a named, ordered list of fields. Each field is one column
//! of storage and one serializable *property*. A component declared without
//! any fields is a tag: it carries a single presence-only property.

use serde::{Deserialize, Serialize};

use crate::kind::NumericKind;

/// Identifies a registered component by its registration position.
///
/// Registration order is the canonical order used when a whole store is
/// serialized, so two stores that register the same components in the same
/// order hand out the same ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentId(pub u32);

impl ComponentId {
    /// Address the `field`-th property of this component.
    #[must_use]
    pub const fn property(self, field: u16) -> PropertyRef {
        PropertyRef {
            component: self,
            field,
        }
    }

    /// Returns the registration position as an index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for ComponentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Component({})", self.0)
    }
}

/// Addresses one property: a field of a registered component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PropertyRef {
    /// The component owning the column.
    pub component: ComponentId,
    /// Field position within the component definition.
    pub field: u16,
}

impl std::fmt::Display for PropertyRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.component, self.field)
    }
}

/// The storage shape of a property, fixed when the component is defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Shape {
    /// Presence only; no value column.
    Tag,
    /// One element per entity.
    Scalar(NumericKind),
    /// `len` elements per entity.
    Array { kind: NumericKind, len: u32 },
}

impl Shape {
    /// Number of element slots each entity occupies in the column.
    #[must_use]
    pub const fn stride(self) -> usize {
        match self {
            Self::Tag => 0,
            Self::Scalar(_) => 1,
            Self::Array { len, .. } => len as usize,
        }
    }

    /// The element kind, or `None` for tags.
    #[must_use]
    pub const fn kind(self) -> Option<NumericKind> {
        match self {
            Self::Tag => None,
            Self::Scalar(kind) | Self::Array { kind, .. } => Some(kind),
        }
    }
}

/// One field of a component definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub shape: Shape,
}

/// Declarative description of a component's columns.
///
/// # Examples
///
/// ```rust
/// use delta_store::{ComponentDef, NumericKind};
///
/// let position = ComponentDef::new("Position")
///     .scalar("x", NumericKind::F32)
///     .scalar("y", NumericKind::F32);
/// let inventory = ComponentDef::new("Inventory").array("slots", NumericKind::U16, 8);
/// let player = ComponentDef::new("Player");
///
/// assert_eq!(position.fields().len(), 2);
/// assert_eq!(inventory.fields().len(), 1);
/// assert!(player.is_tag());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentDef {
    name: String,
    fields: Vec<FieldDef>,
}

impl ComponentDef {
    /// Start a definition with no fields. Registered as-is it becomes a tag.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Append a scalar field.
    #[must_use]
    pub fn scalar(mut self, name: impl Into<String>, kind: NumericKind) -> Self {
        self.fields.push(FieldDef {
            name: name.into(),
            shape: Shape::Scalar(kind),
        });
        self
    }

    /// Append a fixed-length array field.
    #[must_use]
    pub fn array(mut self, name: impl Into<String>, kind: NumericKind, len: u32) -> Self {
        self.fields.push(FieldDef {
            name: name.into(),
            shape: Shape::Array { kind, len },
        });
        self
    }

    /// The component's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fields in definition order. A tag reports its single presence field.
    #[must_use]
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Returns `true` if this component carries presence only.
    #[must_use]
    pub fn is_tag(&self) -> bool {
        self.fields.is_empty() || matches!(self.fields.as_slice(), [f] if f.shape == Shape::Tag)
    }

    /// Replace an empty field list with the single tag property.
    pub(crate) fn normalize(mut self) -> Self {
        if self.fields.is_empty() {
            self.fields.push(FieldDef {
                name: self.name.clone(),
                shape: Shape::Tag,
            });
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_keeps_definition_order() {
        let def = ComponentDef::new("Body")
            .scalar("mass", NumericKind::F32)
            .array("forces", NumericKind::F64, 3)
            .scalar("flags", NumericKind::U8);
        let names: Vec<_> = def.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["mass", "forces", "flags"]);
        assert!(!def.is_tag());
    }

    #[test]
    fn test_empty_definition_normalizes_to_tag() {
        let def = ComponentDef::new("Frozen").normalize();
        assert!(def.is_tag());
        assert_eq!(def.fields().len(), 1);
        assert_eq!(def.fields()[0].shape, Shape::Tag);
    }

    #[test]
    fn test_shape_stride_and_kind() {
        assert_eq!(Shape::Tag.stride(), 0);
        assert_eq!(Shape::Scalar(NumericKind::U8).stride(), 1);
        let shape = Shape::Array {
            kind: NumericKind::U8,
            len: 300,
        };
        assert_eq!(shape.stride(), 300);
        assert_eq!(shape.kind(), Some(NumericKind::U8));
        assert_eq!(Shape::Tag.kind(), None);
    }

    #[test]
    fn test_property_ref_display() {
        assert_eq!(ComponentId(2).property(1).to_string(), "Component(2).1");
    }
}
