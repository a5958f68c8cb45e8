//! Property table resolution and schema descriptors.
//!
//! A packet never describes its own layout. Both ends resolve the same
//! [`Target`] against stores that registered the same components in the same
//! order, and a property's position in the resulting [`PropertyTable`] is its
//! one-byte wire id.
//!
//! ## Resolution order
//!
//! - [`Target::World`]: every registered component in registration order,
//!   each contributing its fields in definition order. Nothing is
//!   change-tracked.
//! - [`Target::Properties`]: the entries in the given order. A
//!   [`TargetEntry::Tracked`] component contributes its fields and marks them
//!   change-tracked, a [`TargetEntry::Component`] contributes its fields
//!   untracked, and a [`TargetEntry::Property`] contributes one column.
//!
//! The resulting table can be summarized as a [`Schema`] and exchanged out of
//! band to detect mismatched layouts before any packet is decoded.

use delta_store::{ComponentId, PropertyRef, Shape, StoreError, World};
use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// Property ids are one byte wide.
pub const MAX_PROPERTIES: usize = 256;

/// What a serializer or deserializer covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Every registered component. Re-enumerated on every call.
    World,
    /// An explicit, ordered selection.
    Properties(Vec<TargetEntry>),
}

/// One element of an explicit [`Target::Properties`] list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetEntry {
    /// All fields of the component, diffed against shadow state.
    Tracked(ComponentId),
    /// All fields of the component, always sent in full.
    Component(ComponentId),
    /// A single column.
    Property(PropertyRef),
}

/// One resolved property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableEntry {
    pub property: PropertyRef,
    pub shape: Shape,
    /// Whether the serializer diffs this property against its shadow.
    pub tracked: bool,
}

/// The ordered property list shared by both ends of a packet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyTable {
    entries: Vec<TableEntry>,
}

impl PropertyTable {
    /// Resolve `target` against `world`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::TooManyProperties`] if more than
    /// [`MAX_PROPERTIES`] properties result, or a storage error if the target
    /// names a component or field the world does not have.
    pub fn resolve(world: &World, target: &Target) -> Result<Self, CodecError> {
        let mut entries = Vec::new();
        match target {
            Target::World => {
                for (id, _) in world.components() {
                    push_component(world, id, false, &mut entries)?;
                }
            }
            Target::Properties(list) => {
                for entry in list {
                    match *entry {
                        TargetEntry::Tracked(id) => push_component(world, id, true, &mut entries)?,
                        TargetEntry::Component(id) => {
                            push_component(world, id, false, &mut entries)?;
                        }
                        TargetEntry::Property(property) => entries.push(TableEntry {
                            property,
                            shape: world.shape(property)?,
                            tracked: false,
                        }),
                    }
                }
            }
        }
        if entries.len() > MAX_PROPERTIES {
            return Err(CodecError::TooManyProperties(entries.len()));
        }
        Ok(Self { entries })
    }

    /// The entry with wire id `id`.
    #[must_use]
    pub fn get(&self, id: u8) -> Option<&TableEntry> {
        self.entries.get(id as usize)
    }

    /// Entries in wire-id order.
    #[must_use]
    pub fn entries(&self) -> &[TableEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Describe this table by component and field names.
    ///
    /// # Errors
    ///
    /// Returns a storage error if a property no longer exists in `world`.
    pub fn schema(&self, world: &World) -> Result<Schema, CodecError> {
        let mut properties = Vec::with_capacity(self.entries.len());
        for (id, entry) in self.entries.iter().enumerate() {
            let component = world
                .component(entry.property.component)
                .ok_or(StoreError::UnknownComponent(entry.property.component))?;
            let field = component
                .fields()
                .get(entry.property.field as usize)
                .ok_or(StoreError::UnknownProperty(entry.property))?;
            properties.push(PropertyDescriptor {
                id: id as u8,
                component: component.name().to_string(),
                field: field.name.clone(),
                shape: entry.shape,
            });
        }
        Ok(Schema { properties })
    }
}

fn push_component(
    world: &World,
    id: ComponentId,
    tracked: bool,
    entries: &mut Vec<TableEntry>,
) -> Result<(), CodecError> {
    let def = world.component(id).ok_or(StoreError::UnknownComponent(id))?;
    entries.extend(def.fields().iter().enumerate().map(|(i, field)| TableEntry {
        property: id.property(i as u16),
        shape: field.shape,
        tracked,
    }));
    Ok(())
}

/// A serializable description of one property table entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    /// Wire id.
    pub id: u8,
    pub component: String,
    pub field: String,
    pub shape: Shape,
}

/// The layout both ends of a packet stream must share.
///
/// Change tracking is a sender-side concern and is not part of the schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub properties: Vec<PropertyDescriptor>,
}

impl Schema {
    /// FNV-1a 64-bit offset basis.
    const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;

    /// FNV-1a 64-bit prime.
    const FNV_PRIME: u64 = 0x0100_0000_01b3;

    /// Encode to MessagePack for out-of-band exchange.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::SchemaEncode`] if serialisation fails.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        Ok(rmp_serde::to_vec(self)?)
    }

    /// Decode from MessagePack.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::SchemaDecode`] if the bytes are not a schema.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        Ok(rmp_serde::from_slice(bytes)?)
    }

    /// A stable 64-bit digest of the layout: FNV-1a over each descriptor's
    /// id, names and shape.
    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        let mut hash = Self::FNV_OFFSET_BASIS;
        let mut feed = |bytes: &[u8]| {
            for &b in bytes {
                hash ^= u64::from(b);
                hash = hash.wrapping_mul(Self::FNV_PRIME);
            }
        };
        for p in &self.properties {
            feed(&[p.id]);
            feed(p.component.as_bytes());
            feed(&[0]);
            feed(p.field.as_bytes());
            feed(&[0]);
            match p.shape {
                Shape::Tag => feed(&[0]),
                Shape::Scalar(kind) => {
                    feed(&[1, kind.width() as u8]);
                    feed(format!("{kind:?}").as_bytes());
                }
                Shape::Array { kind, len } => {
                    feed(&[2, kind.width() as u8]);
                    feed(format!("{kind:?}").as_bytes());
                    feed(&len.to_be_bytes());
                }
            }
        }
        hash
    }

    /// Check that `resolved` matches this schema.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::SchemaMismatch`] with both fingerprints.
    pub fn verify(&self, resolved: &Schema) -> Result<(), CodecError> {
        if self == resolved {
            return Ok(());
        }
        Err(CodecError::SchemaMismatch {
            expected: self.fingerprint(),
            found: resolved.fingerprint(),
        })
    }
}
