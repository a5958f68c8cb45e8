//! The packet serializer.
//!
//! A [`Serializer`] walks its property table in wire-id order and writes one
//! block per property:
//!
//! ```text
//! block        := prop_id:u8 entity_count:u32 entity_entry{entity_count}
//! entity_entry := entity_id:u32 payload
//! payload      := ""                                    tag
//!               | value:W                               scalar
//!               | count:Ix (index:Ix value:W){count}    array
//! ```
//!
//! Blocks are emitted even when no entity qualifies. For change-tracked
//! properties an entity is left out of a block when every value it would send
//! equals the value last sent, and arrays only list the indices that changed.

use std::collections::HashSet;

use delta_store::{Column, Entity, IndexWidth, LayoutVersion, Shape, StoreError, Value, World};
use tracing::{debug, trace, warn};

use crate::config::SerializerConfig;
use crate::error::CodecError;
use crate::schema::{PropertyTable, Schema, TableEntry, Target};
use crate::shadow::{ShadowColumn, ShadowStore, ShadowWrite};
use crate::wire::PacketWriter;

/// Encodes component state into packets, optionally as deltas.
///
/// One instance owns one output buffer and one set of shadow columns; it must
/// not be shared between independent streams.
#[derive(Debug)]
pub struct Serializer {
    target: Target,
    config: SerializerConfig,
    table: PropertyTable,
    seen: LayoutVersion,
    shadow: ShadowStore,
    writer: PacketWriter,
    /// Shadow writes of the pass in progress, applied once the packet is
    /// complete.
    pending: Vec<ShadowWrite>,
    /// Entities already visited in the block being written.
    visited: HashSet<Entity>,
}

impl Serializer {
    /// Create a serializer with the default [`SerializerConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if `target` cannot be resolved against `world`.
    pub fn new(world: &World, target: Target) -> Result<Self, CodecError> {
        Self::with_config(world, target, SerializerConfig::new())
    }

    /// Create a serializer with an explicit configuration. The output buffer
    /// of `config.max_bytes` is allocated here, once.
    ///
    /// # Errors
    ///
    /// Returns an error if `target` cannot be resolved against `world`.
    pub fn with_config(
        world: &World,
        target: Target,
        config: SerializerConfig,
    ) -> Result<Self, CodecError> {
        let table = PropertyTable::resolve(world, &target)?;
        let mut shadow = ShadowStore::new();
        track(&mut shadow, &table);
        debug!(
            properties = table.len(),
            max_bytes = config.max_bytes,
            diff = config.diff,
            "serializer created"
        );
        Ok(Self {
            target,
            writer: PacketWriter::with_capacity(config.max_bytes),
            config,
            table,
            seen: world.layout_version(),
            shadow,
            pending: Vec::new(),
            visited: HashSet::new(),
        })
    }

    /// The property table as of the last call.
    #[must_use]
    pub fn table(&self) -> &PropertyTable {
        &self.table
    }

    /// Describe the current property table for out-of-band exchange.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the table refers to properties `world` lacks.
    pub fn schema(&self, world: &World) -> Result<Schema, CodecError> {
        self.table.schema(world)
    }

    /// Forget all shadow state so the next packet carries full values.
    pub fn reset_shadow(&mut self) {
        self.shadow.clear();
    }

    fn refresh(&mut self, world: &World) -> Result<(), CodecError> {
        let version = world.layout_version();
        if matches!(self.target, Target::World) || version != self.seen {
            self.table = PropertyTable::resolve(world, &self.target)?;
            track(&mut self.shadow, &self.table);
            if version != self.seen {
                debug!(
                    properties = self.table.len(),
                    version = version.get(),
                    "serializer property table re-resolved"
                );
            }
            self.seen = version;
        }
        Ok(())
    }

    /// Serialize the live entities of `world`.
    ///
    /// # Errors
    ///
    /// See [`Serializer::serialize`].
    pub fn serialize_world(&mut self, world: &World) -> Result<Option<Vec<u8>>, CodecError> {
        self.serialize(world, world.entities())
    }

    /// Serialize `entities`, in the given order, into a packet.
    ///
    /// Returns `Ok(None)` when `entities` is empty. Entities that are dead or
    /// lack a property's component are left out of that property's block.
    ///
    /// Shadow state advances only when the whole packet was written. When an
    /// entity is listed more than once, a change-tracked property sends it at
    /// most once per packet while diffing; other properties repeat it.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::CapacityExceeded`] if the packet would not fit
    /// the output buffer, or an error if the property table cannot be
    /// re-resolved.
    pub fn serialize(
        &mut self,
        world: &World,
        entities: &[Entity],
    ) -> Result<Option<Vec<u8>>, CodecError> {
        self.refresh(world)?;
        if entities.is_empty() {
            return Ok(None);
        }

        self.writer.clear();
        self.pending.clear();
        for (id, entry) in self.table.entries().iter().enumerate() {
            let shadow = match entry.shape {
                Shape::Tag => None,
                _ if entry.tracked => self.shadow.column(entry.property),
                _ => None,
            };
            let block = Block {
                id: id as u8,
                entry,
                shadow,
                diff: self.config.diff,
            };
            let written = block.write(
                world,
                entities,
                &mut self.writer,
                &mut self.pending,
                &mut self.visited,
            );
            if let Err(err) = written {
                warn!(property = %entry.property, error = %err, "serialization aborted");
                return Err(err);
            }
        }

        self.shadow.commit(&self.pending);
        let packet = self.writer.as_slice().to_vec();
        debug!(
            bytes = packet.len(),
            entities = entities.len(),
            shadow_writes = self.pending.len(),
            "serialized packet"
        );
        Ok(Some(packet))
    }
}

fn track(shadow: &mut ShadowStore, table: &PropertyTable) {
    for entry in table.entries() {
        if entry.tracked && entry.shape != Shape::Tag {
            shadow.track(entry.property, entry.shape.stride());
        }
    }
}

/// Source column of a block, chosen once per property.
#[derive(Clone, Copy)]
enum Payload<'w> {
    Tag,
    Scalar(&'w Column),
    Array {
        column: &'w Column,
        len: u32,
        width: IndexWidth,
    },
}

/// One property block being written.
struct Block<'a> {
    id: u8,
    entry: &'a TableEntry,
    /// Present for change-tracked value properties.
    shadow: Option<&'a ShadowColumn>,
    diff: bool,
}

impl Block<'_> {
    fn write(
        &self,
        world: &World,
        entities: &[Entity],
        writer: &mut PacketWriter,
        pending: &mut Vec<ShadowWrite>,
        visited: &mut HashSet<Entity>,
    ) -> Result<(), CodecError> {
        let payload = match self.entry.shape {
            Shape::Tag => Payload::Tag,
            Shape::Scalar(_) => Payload::Scalar(world.column(self.entry.property)?),
            Shape::Array { len, .. } => Payload::Array {
                column: world.column(self.entry.property)?,
                len,
                width: IndexWidth::for_len(len),
            },
        };
        let baseline = if self.diff { self.shadow } else { None };
        visited.clear();
        let component = self.entry.property.component;

        writer.put_u8(self.id)?;
        let count_at = writer.reserve(4)?;
        let mut count = 0u32;

        for &entity in entities {
            if !world.has_component(entity, component) {
                continue;
            }
            // A repeat has nothing left to differ from the staged values.
            if baseline.is_some() && !visited.insert(entity) {
                continue;
            }
            match payload {
                Payload::Tag => writer.put_u32(entity.id())?,
                Payload::Scalar(column) => {
                    let value = read(column, entity, 0)?;
                    if baseline.is_some_and(|s| s.matches(entity, 0, value)) {
                        continue;
                    }
                    writer.put_u32(entity.id())?;
                    writer.put_value(value)?;
                    self.stage(pending, entity, 0, value);
                }
                Payload::Array { column, len, width } => {
                    let start = writer.position();
                    writer.put_u32(entity.id())?;
                    let changed_at = writer.reserve(width.bytes())?;
                    let mut changed = 0u32;
                    for index in 0..len {
                        let slot = index as usize;
                        let value = read(column, entity, slot)?;
                        if baseline.is_some_and(|s| s.matches(entity, slot, value)) {
                            continue;
                        }
                        writer.put_index(width, index)?;
                        writer.put_value(value)?;
                        self.stage(pending, entity, slot, value);
                        changed += 1;
                    }
                    if changed == 0 {
                        writer.rewind(start);
                        continue;
                    }
                    writer.patch_index(changed_at, width, changed);
                }
            }
            count += 1;
        }

        writer.patch_u32(count_at, count);
        trace!(id = self.id, property = %self.entry.property, entities = count, "wrote block");
        Ok(())
    }

    fn stage(
        &self,
        pending: &mut Vec<ShadowWrite>,
        entity: Entity,
        slot: usize,
        value: Value,
    ) {
        if self.shadow.is_some() {
            pending.push(ShadowWrite {
                property: self.entry.property,
                entity,
                slot,
                value,
            });
        }
    }
}

fn read(column: &Column, entity: Entity, slot: usize) -> Result<Value, CodecError> {
    column
        .get(entity, slot)
        .ok_or(CodecError::Store(StoreError::EntityNotAlive(entity)))
}

#[cfg(test)]
mod tests {
    use delta_store::{ComponentDef, NumericKind};

    use super::*;
    use crate::schema::TargetEntry;
    use crate::test_support::make_world;

    #[test]
    fn test_empty_entity_list_yields_no_packet() {
        let (world, ..) = make_world();
        let mut ser = Serializer::new(&world, Target::World).unwrap();
        assert_eq!(ser.serialize(&world, &[]).unwrap(), None);
        assert_eq!(ser.serialize_world(&world).unwrap(), None);
    }

    #[test]
    fn test_scalar_block_layout() {
        let (mut world, position, ..) = make_world();
        let e = world.add_entity();
        world.add_component(e, position).unwrap();
        world.set(e, position.property(0), 1.0f32).unwrap();
        world.set(e, position.property(1), 2.0f32).unwrap();

        let target = Target::Properties(vec![TargetEntry::Component(position)]);
        let mut ser = Serializer::new(&world, target).unwrap();
        let packet = ser.serialize(&world, &[e]).unwrap().unwrap();
        assert_eq!(
            packet,
            [
                0, 0, 0, 0, 1, 0, 0, 0, 0, 0x3f, 0x80, 0, 0, //
                1, 0, 0, 0, 1, 0, 0, 0, 0, 0x40, 0, 0, 0,
            ]
        );
    }

    #[test]
    fn test_empty_blocks_are_still_emitted() {
        let (mut world, position, ..) = make_world();
        let e = world.add_entity();
        let target = Target::Properties(vec![TargetEntry::Component(position)]);
        let mut ser = Serializer::new(&world, target).unwrap();
        let packet = ser.serialize(&world, &[e]).unwrap().unwrap();
        assert_eq!(packet, [0, 0, 0, 0, 0, 1, 0, 0, 0, 0]);
    }

    #[test]
    fn test_untracked_array_sends_every_index() {
        let (mut world, _, inventory, _) = make_world();
        let slots = inventory.property(0);
        let e = world.add_entity();
        world.add_component(e, inventory).unwrap();
        world.set_element(e, slots, 2, 7u16).unwrap();

        let target = Target::Properties(vec![TargetEntry::Property(slots)]);
        let mut ser = Serializer::new(&world, target).unwrap();
        let packet = ser.serialize(&world, &[e]).unwrap().unwrap();
        assert_eq!(packet.len(), 1 + 4 + 4 + 1 + 8 * (1 + 2));
        assert_eq!(packet[9], 8);
        assert_eq!(&packet[16..19], &[2, 0, 7]);
    }

    #[test]
    fn test_unchanged_scalar_is_skipped_and_change_is_sent() {
        let (mut world, position, ..) = make_world();
        let x = position.property(0);
        let e = world.add_entity();
        world.add_component(e, position).unwrap();
        world.set(e, x, 1.0f32).unwrap();

        let target = Target::Properties(vec![TargetEntry::Tracked(position)]);
        let mut ser = Serializer::new(&world, target).unwrap();
        let first = ser.serialize(&world, &[e]).unwrap().unwrap();
        assert_eq!(first.len(), 2 * (5 + 4 + 4));

        let second = ser.serialize(&world, &[e]).unwrap().unwrap();
        assert_eq!(second, [0, 0, 0, 0, 0, 1, 0, 0, 0, 0]);

        world.set(e, x, 5.0f32).unwrap();
        let third = ser.serialize(&world, &[e]).unwrap().unwrap();
        assert_eq!(
            third,
            [0, 0, 0, 0, 1, 0, 0, 0, 0, 0x40, 0xa0, 0, 0, 1, 0, 0, 0, 0]
        );

        let fourth = ser.serialize(&world, &[e]).unwrap().unwrap();
        assert_eq!(fourth, second);
    }

    #[test]
    fn test_repeated_entity_is_sent_once_while_diffing() {
        let (mut world, position, _, player) = make_world();
        let e = world.add_entity();
        world.add_component(e, position).unwrap();
        world.add_component(e, player).unwrap();
        world.set(e, position.property(0), 1.0f32).unwrap();

        let target = Target::Properties(vec![
            TargetEntry::Tracked(position),
            TargetEntry::Component(player),
        ]);
        let mut ser = Serializer::new(&world, target).unwrap();
        let first = ser.serialize(&world, &[e, e]).unwrap().unwrap();
        assert_eq!(
            first,
            [
                0, 0, 0, 0, 1, 0, 0, 0, 0, 0x3f, 0x80, 0, 0, //
                1, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, //
                2, 0, 0, 0, 2, 0, 0, 0, 0, 0, 0, 0, 0,
            ]
        );

        let second = ser.serialize(&world, &[e, e]).unwrap().unwrap();
        assert_eq!(
            second,
            [
                0, 0, 0, 0, 0, 1, 0, 0, 0, 0, //
                2, 0, 0, 0, 2, 0, 0, 0, 0, 0, 0, 0, 0,
            ]
        );
    }

    #[test]
    fn test_array_partial_diff_lists_changed_indices() {
        let (mut world, _, inventory, _) = make_world();
        let slots = inventory.property(0);
        let e = world.add_entity();
        world.add_component(e, inventory).unwrap();

        let target = Target::Properties(vec![TargetEntry::Tracked(inventory)]);
        let mut ser = Serializer::new(&world, target).unwrap();
        ser.serialize(&world, &[e]).unwrap();

        world.set_element(e, slots, 2, 300u16).unwrap();
        world.set_element(e, slots, 5, 9u16).unwrap();
        let delta = ser.serialize(&world, &[e]).unwrap().unwrap();
        assert_eq!(
            delta,
            [0, 0, 0, 0, 1, 0, 0, 0, 0, 2, 2, 0x01, 0x2c, 5, 0, 9]
        );

        let quiet = ser.serialize(&world, &[e]).unwrap().unwrap();
        assert_eq!(quiet, [0, 0, 0, 0, 0]);

        world.set_element(e, slots, 2, 0u16).unwrap();
        let reverted = ser.serialize(&world, &[e]).unwrap().unwrap();
        assert_eq!(reverted, [0, 0, 0, 0, 1, 0, 0, 0, 0, 1, 2, 0, 0]);
    }

    #[test]
    fn test_diff_disabled_sends_full_values() {
        let (mut world, position, ..) = make_world();
        let e = world.add_entity();
        world.add_component(e, position).unwrap();

        let target = Target::Properties(vec![TargetEntry::Tracked(position)]);
        let config = SerializerConfig::new().with_diff(false);
        let mut ser = Serializer::with_config(&world, target, config).unwrap();
        let first = ser.serialize(&world, &[e]).unwrap().unwrap();
        let second = ser.serialize(&world, &[e]).unwrap().unwrap();
        assert_eq!(first, second);
        assert_eq!(second.len(), 26);
    }

    #[test]
    fn test_reset_shadow_resends_everything() {
        let (mut world, position, ..) = make_world();
        let e = world.add_entity();
        world.add_component(e, position).unwrap();

        let target = Target::Properties(vec![TargetEntry::Tracked(position)]);
        let mut ser = Serializer::new(&world, target).unwrap();
        let full = ser.serialize(&world, &[e]).unwrap().unwrap();
        ser.reset_shadow();
        assert_eq!(ser.serialize(&world, &[e]).unwrap().unwrap(), full);
    }

    #[test]
    fn test_entities_without_component_are_left_out() {
        let (mut world, position, _, player) = make_world();
        let tagged = world.add_entity();
        let plain = world.add_entity();
        world.add_component(tagged, player).unwrap();
        world.add_component(plain, position).unwrap();

        let target = Target::Properties(vec![TargetEntry::Component(player)]);
        let mut ser = Serializer::new(&world, target).unwrap();
        let packet = ser.serialize(&world, &[tagged, plain]).unwrap().unwrap();
        assert_eq!(packet, [0, 0, 0, 0, 1, 0, 0, 0, 0]);
    }

    #[test]
    fn test_tag_packets_do_not_grow() {
        let (mut world, _, _, player) = make_world();
        let a = world.add_entity();
        let b = world.add_entity();
        world.add_component(a, player).unwrap();
        world.add_component(b, player).unwrap();

        let target = Target::Properties(vec![TargetEntry::Tracked(player)]);
        let mut ser = Serializer::new(&world, target).unwrap();
        let first = ser.serialize(&world, &[a, b]).unwrap().unwrap();
        assert_eq!(first, [0, 0, 0, 0, 2, 0, 0, 0, 0, 0, 0, 0, 1]);
        for _ in 0..3 {
            assert_eq!(ser.serialize(&world, &[a, b]).unwrap().unwrap(), first);
        }
    }

    #[test]
    fn test_capacity_boundary_is_exact() {
        let (mut world, position, ..) = make_world();
        let e = world.add_entity();
        world.add_component(e, position).unwrap();
        let target = Target::Properties(vec![TargetEntry::Component(position)]);

        let config = SerializerConfig::new().with_max_bytes(26);
        let mut fits = Serializer::with_config(&world, target.clone(), config).unwrap();
        assert_eq!(fits.serialize(&world, &[e]).unwrap().unwrap().len(), 26);

        let config = SerializerConfig::new().with_max_bytes(25);
        let mut short = Serializer::with_config(&world, target, config).unwrap();
        let err = short.serialize(&world, &[e]).unwrap_err();
        assert!(matches!(
            err,
            CodecError::CapacityExceeded {
                needed: 26,
                capacity: 25
            }
        ));
    }

    #[test]
    fn test_failed_pass_does_not_advance_shadow() {
        let (mut world, position, ..) = make_world();
        let a = world.add_entity();
        let b = world.add_entity();
        world.add_component(a, position).unwrap();
        world.add_component(b, position).unwrap();

        let target = Target::Properties(vec![TargetEntry::Tracked(position)]);
        let config = SerializerConfig::new().with_max_bytes(26);
        let mut ser = Serializer::with_config(&world, target, config).unwrap();
        assert!(matches!(
            ser.serialize(&world, &[a, b]),
            Err(CodecError::CapacityExceeded { .. })
        ));

        // `a` was written before the overflow but must still be sent in full.
        let packet = ser.serialize(&world, &[a]).unwrap().unwrap();
        assert_eq!(packet.len(), 26);
        assert_eq!(&packet[1..5], &[0, 0, 0, 1]);
    }

    #[test]
    fn test_world_target_picks_up_new_components() {
        let (mut world, position, ..) = make_world();
        let e = world.add_entity();
        world.add_component(e, position).unwrap();
        let mut ser = Serializer::new(&world, Target::World).unwrap();
        assert_eq!(ser.table().len(), 4);

        let health = world
            .register_component(ComponentDef::new("Health").scalar("hp", NumericKind::I32))
            .unwrap();
        world.add_component(e, health).unwrap();
        world.set(e, health.property(0), 40i32).unwrap();
        world.mark_resized();

        let packet = ser.serialize(&world, &[e]).unwrap().unwrap();
        assert_eq!(ser.table().len(), 5);
        assert_eq!(&packet[packet.len() - 13..], &[4, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 40]);
    }

    #[test]
    fn test_explicit_target_survives_capacity_growth() {
        let mut world = delta_store::World::with_capacity(1);
        let position = world
            .register_component(ComponentDef::new("Position").scalar("x", NumericKind::F32))
            .unwrap();
        let target = Target::Properties(vec![TargetEntry::Tracked(position)]);
        let mut ser = Serializer::new(&world, target).unwrap();

        let mut entities = Vec::new();
        for i in 0..5 {
            let e = world.add_entity();
            world.add_component(e, position).unwrap();
            world.set(e, position.property(0), i as f32).unwrap();
            entities.push(e);
        }
        let packet = ser.serialize(&world, &entities).unwrap().unwrap();
        assert_eq!(&packet[1..5], &[0, 0, 0, 5]);
        let quiet = ser.serialize(&world, &entities).unwrap().unwrap();
        assert_eq!(quiet, [0, 0, 0, 0, 0]);
    }
}
