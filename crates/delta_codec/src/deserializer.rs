//! The packet deserializer.
//!
//! A [`Deserializer`] reads property blocks until the packet is exhausted,
//! looks each property id up in its own property table and writes the
//! decoded values into the receiving world. Entities and components are
//! created on demand.
//!
//! ## Entity ids across worlds
//!
//! A wire entity id that is alive in the receiving world, and is not already
//! standing in for another wire id, is written to directly. Any other id is
//! given a freshly allocated local entity, and the mapping is remembered so
//! later blocks and later packets carrying the same wire id reach the same
//! local entity. A mapping lasts only as long as its local entity: once that
//! entity is removed, even if its id is recycled, the wire id is mapped
//! afresh. Local ids are therefore not guaranteed to equal the sender's ids;
//! use [`Deserializer::local_entity`] to translate.

use std::collections::{HashMap, HashSet};

use delta_store::{Entity, IndexWidth, LayoutVersion, Shape, World};
use tracing::{debug, trace};

use crate::error::CodecError;
use crate::schema::{PropertyTable, Schema, TableEntry, Target};
use crate::wire::PacketReader;

/// A local entity allocated for a wire id, pinned to the generation it was
/// allocated in.
#[derive(Debug, Clone, Copy)]
struct Mapped {
    entity: Entity,
    generation: u32,
}

impl Mapped {
    fn is_current(self, world: &World) -> bool {
        world.is_alive(self.entity) && world.generation(self.entity) == self.generation
    }
}

/// Applies packets produced by a [`Serializer`](crate::Serializer) with an
/// equivalent target.
#[derive(Debug)]
pub struct Deserializer {
    target: Target,
    table: PropertyTable,
    seen: LayoutVersion,
    /// Schema agreed with the sender, checked on every re-resolution.
    expected: Option<Schema>,
    /// Wire id → local entity for ids that were not alive locally.
    remap: HashMap<u32, Mapped>,
    /// Local entity → wire id, the inverse of `remap`.
    origin: HashMap<Entity, u32>,
}

impl Deserializer {
    /// Create a deserializer.
    ///
    /// # Errors
    ///
    /// Returns an error if `target` cannot be resolved against `world`.
    pub fn new(world: &World, target: Target) -> Result<Self, CodecError> {
        let table = PropertyTable::resolve(world, &target)?;
        debug!(properties = table.len(), "deserializer created");
        Ok(Self {
            target,
            table,
            seen: world.layout_version(),
            expected: None,
            remap: HashMap::new(),
            origin: HashMap::new(),
        })
    }

    /// Create a deserializer that refuses to decode unless its resolved
    /// table matches `schema`, typically received from the sender's
    /// [`Serializer::schema`](crate::Serializer::schema).
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::SchemaMismatch`] if the tables differ now; the
    /// check is repeated whenever the table is re-resolved.
    pub fn with_schema(world: &World, target: Target, schema: Schema) -> Result<Self, CodecError> {
        let mut deserializer = Self::new(world, target)?;
        deserializer.expected = Some(schema);
        deserializer.check_schema(world)?;
        Ok(deserializer)
    }

    /// The property table as of the last call.
    #[must_use]
    pub fn table(&self) -> &PropertyTable {
        &self.table
    }

    /// The local entity a wire id is mapped to in `world`, if it had to be
    /// remapped and that entity still exists.
    #[must_use]
    pub fn local_entity(&self, world: &World, wire_id: u32) -> Option<Entity> {
        self.remap
            .get(&wire_id)
            .filter(|mapped| mapped.is_current(world))
            .map(|mapped| mapped.entity)
    }

    fn check_schema(&self, world: &World) -> Result<(), CodecError> {
        if let Some(expected) = &self.expected {
            expected.verify(&self.table.schema(world)?)?;
        }
        Ok(())
    }

    fn refresh(&mut self, world: &World) -> Result<(), CodecError> {
        let version = world.layout_version();
        if matches!(self.target, Target::World) || version != self.seen {
            self.table = PropertyTable::resolve(world, &self.target)?;
            self.check_schema(world)?;
            if version != self.seen {
                debug!(
                    properties = self.table.len(),
                    version = version.get(),
                    "deserializer property table re-resolved"
                );
            }
            self.seen = version;
        }
        Ok(())
    }

    /// Resolve a wire id to the local entity its data belongs to.
    fn local(&mut self, world: &mut World, wire_id: u32) -> Entity {
        if let Some(mapped) = self.remap.get(&wire_id).copied() {
            if mapped.is_current(world) {
                return mapped.entity;
            }
            self.forget(wire_id);
        }
        let direct = Entity::from_raw(wire_id);
        if world.is_alive(direct) && !self.is_claimed(world, direct) {
            return direct;
        }
        let entity = world.add_entity();
        if let Some(stale) = self.origin.insert(entity, wire_id) {
            if self.remap.get(&stale).is_some_and(|mapped| mapped.entity == entity) {
                self.remap.remove(&stale);
            }
        }
        self.remap.insert(
            wire_id,
            Mapped {
                entity,
                generation: world.generation(entity),
            },
        );
        debug!(wire_id, local = entity.id(), "mapped unknown entity to new local entity");
        entity
    }

    fn forget(&mut self, wire_id: u32) {
        if let Some(mapped) = self.remap.remove(&wire_id) {
            if self.origin.get(&mapped.entity) == Some(&wire_id) {
                self.origin.remove(&mapped.entity);
            }
        }
    }

    /// Returns `true` if `entity` currently stands in for some wire id.
    fn is_claimed(&self, world: &World, entity: Entity) -> bool {
        self.origin
            .get(&entity)
            .and_then(|wire_id| self.remap.get(wire_id))
            .is_some_and(|mapped| mapped.entity == entity && mapped.is_current(world))
    }

    /// Apply a packet to `world`.
    ///
    /// Returns the local entities that received data, in first-seen order.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnknownPropertyId`], [`CodecError::TruncatedPacket`]
    /// or [`CodecError::ElementOutOfRange`] for malformed input. Blocks decoded
    /// before the error stay applied.
    pub fn deserialize(
        &mut self,
        world: &mut World,
        packet: &[u8],
    ) -> Result<Vec<Entity>, CodecError> {
        self.refresh(world)?;

        let mut reader = PacketReader::new(packet);
        let mut touched = Vec::new();
        let mut seen = HashSet::new();
        while !reader.is_empty() {
            let id = reader.read_u8()?;
            let entry = *self.table.get(id).ok_or(CodecError::UnknownPropertyId(id))?;
            let count = reader.read_u32()?;
            reader.expect_entries(count, 4)?;

            for _ in 0..count {
                let wire_id = reader.read_u32()?;
                let entity = self.local(world, wire_id);
                world.add_component(entity, entry.property.component)?;
                if seen.insert(entity) {
                    touched.push(entity);
                }
                read_payload(&mut reader, world, id, &entry, entity)?;
            }
            trace!(id, property = %entry.property, entities = count, "applied block");
        }

        debug!(
            bytes = packet.len(),
            entities = touched.len(),
            "deserialized packet"
        );
        Ok(touched)
    }
}

fn read_payload(
    reader: &mut PacketReader<'_>,
    world: &mut World,
    id: u8,
    entry: &TableEntry,
    entity: Entity,
) -> Result<(), CodecError> {
    match entry.shape {
        Shape::Tag => {}
        Shape::Scalar(kind) => {
            let value = reader.read_value(kind)?;
            world.write_slot(entity, entry.property, 0, value)?;
        }
        Shape::Array { kind, len } => {
            let width = IndexWidth::for_len(len);
            let count = reader.read_index(width)?;
            reader.expect_entries(count, width.bytes() + kind.width())?;
            for _ in 0..count {
                let index = reader.read_index(width)?;
                let value = reader.read_value(kind)?;
                if index >= len {
                    return Err(CodecError::ElementOutOfRange {
                        property: id,
                        index,
                        len,
                    });
                }
                world.write_slot(entity, entry.property, index as usize, value)?;
            }
        }
    }
    Ok(())
}
