//! The [`World`]: component registry, entity liveness and column storage.
//!
//! Every registered component owns one [`Column`] per non-tag field and a
//! membership table recording which entities carry it. All columns share the
//! world's entity capacity; when an allocated id reaches the capacity every
//! column grows and the world's [`LayoutVersion`] advances.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use crate::column::Column;
use crate::component::{ComponentDef, ComponentId, PropertyRef, Shape};
use crate::entity::{Entity, EntityAllocator};
use crate::error::StoreError;
use crate::kind::Value;

/// Entity capacity of a world created with [`World::new`].
pub const DEFAULT_CAPACITY: usize = 1024;

static NEXT_LAYOUT_VERSION: AtomicU64 = AtomicU64::new(1);

/// Identifies one storage layout of one world.
///
/// Versions are drawn from a process-wide sequence, so no two worlds ever
/// report the same version and a cached version detects both a layout change
/// and a switch to a different world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayoutVersion(u64);

impl LayoutVersion {
    fn next() -> Self {
        Self(NEXT_LAYOUT_VERSION.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw counter value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

#[derive(Debug)]
struct ComponentStore {
    def: ComponentDef,
    /// One entry per field; `None` for the tag field.
    columns: Vec<Option<Column>>,
    members: Vec<bool>,
}

/// Columnar entity-component storage.
#[derive(Debug)]
pub struct World {
    allocator: EntityAllocator,
    components: Vec<ComponentStore>,
    capacity: usize,
    version: LayoutVersion,
}

impl World {
    /// Create an empty world with [`DEFAULT_CAPACITY`] entity rows.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create an empty world with room for `capacity` entities before the
    /// first resize.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            allocator: EntityAllocator::new(),
            components: Vec::new(),
            capacity: capacity.max(1),
            version: LayoutVersion::next(),
        }
    }

    // -- Layout --

    /// The current layout version. It changes whenever a component is
    /// registered, the entity capacity grows, or [`World::mark_resized`] is
    /// called.
    #[must_use]
    pub fn layout_version(&self) -> LayoutVersion {
        self.version
    }

    /// Invalidate every cached property layout derived from this world.
    pub fn mark_resized(&mut self) {
        self.version = LayoutVersion::next();
    }

    /// Number of entity rows every column currently holds.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn ensure_capacity(&mut self, rows: usize) {
        if rows <= self.capacity {
            return;
        }
        let capacity = rows.max(self.capacity * 2);
        for store in &mut self.components {
            for column in store.columns.iter_mut().flatten() {
                column.grow(capacity);
            }
            store.members.resize(capacity, false);
        }
        debug!(from = self.capacity, to = capacity, "world capacity grown");
        self.capacity = capacity;
        self.mark_resized();
    }

    // -- Component registry --

    /// Register a component. Ids are handed out in registration order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::EmptyArray`] if an array field has length zero.
    pub fn register_component(&mut self, def: ComponentDef) -> Result<ComponentId, StoreError> {
        let def = def.normalize();
        let mut columns = Vec::with_capacity(def.fields().len());
        for field in def.fields() {
            if let Shape::Array { len: 0, .. } = field.shape {
                return Err(StoreError::EmptyArray {
                    component: def.name().to_string(),
                    field: field.name.clone(),
                });
            }
            columns.push(
                field
                    .shape
                    .kind()
                    .map(|kind| Column::new(kind, field.shape.stride(), self.capacity)),
            );
        }
        let id = ComponentId(self.components.len() as u32);
        debug!(component = def.name(), id = id.0, "registered component");
        self.components.push(ComponentStore {
            def,
            columns,
            members: vec![false; self.capacity],
        });
        self.mark_resized();
        Ok(id)
    }

    /// Returns the definition of a registered component.
    #[must_use]
    pub fn component(&self, id: ComponentId) -> Option<&ComponentDef> {
        self.components.get(id.index()).map(|store| &store.def)
    }

    /// Iterate registered components in registration order.
    pub fn components(&self) -> impl Iterator<Item = (ComponentId, &ComponentDef)> {
        self.components
            .iter()
            .enumerate()
            .map(|(i, store)| (ComponentId(i as u32), &store.def))
    }

    /// Look up a component by name.
    #[must_use]
    pub fn component_id(&self, name: &str) -> Option<ComponentId> {
        self.components
            .iter()
            .position(|store| store.def.name() == name)
            .map(|i| ComponentId(i as u32))
    }

    /// Look up a property by component and field name.
    #[must_use]
    pub fn property(&self, component: ComponentId, field: &str) -> Option<PropertyRef> {
        let def = self.component(component)?;
        def.fields()
            .iter()
            .position(|f| f.name == field)
            .map(|i| component.property(i as u16))
    }

    /// The shape of a property.
    ///
    /// # Errors
    ///
    /// Returns an error if the component or field does not exist.
    pub fn shape(&self, property: PropertyRef) -> Result<Shape, StoreError> {
        let store = self.store(property.component)?;
        store
            .def
            .fields()
            .get(property.field as usize)
            .map(|f| f.shape)
            .ok_or(StoreError::UnknownProperty(property))
    }

    fn store(&self, id: ComponentId) -> Result<&ComponentStore, StoreError> {
        self.components
            .get(id.index())
            .ok_or(StoreError::UnknownComponent(id))
    }

    fn store_mut(&mut self, id: ComponentId) -> Result<&mut ComponentStore, StoreError> {
        self.components
            .get_mut(id.index())
            .ok_or(StoreError::UnknownComponent(id))
    }

    // -- Entity lifecycle --

    /// Allocate a new entity, growing storage if needed.
    pub fn add_entity(&mut self) -> Entity {
        let entity = self.allocator.allocate();
        self.ensure_capacity(self.allocator.high_water());
        entity
    }

    /// Remove an entity and detach all of its components.
    ///
    /// Returns `true` if the entity was alive.
    pub fn remove_entity(&mut self, entity: Entity) -> bool {
        if !self.allocator.free(entity) {
            return false;
        }
        for store in &mut self.components {
            store.members[entity.index()] = false;
        }
        true
    }

    /// Returns `true` if the entity is alive.
    #[must_use]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.allocator.is_alive(entity)
    }

    /// The generation of an entity's id slot; see
    /// [`EntityAllocator::generation`].
    #[must_use]
    pub fn generation(&self, entity: Entity) -> u32 {
        self.allocator.generation(entity)
    }

    /// All live entities.
    #[must_use]
    pub fn entities(&self) -> &[Entity] {
        self.allocator.live()
    }

    /// Number of live entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.allocator.count()
    }

    // -- Component membership --

    /// Attach a component, zeroing its columns for the entity.
    ///
    /// Returns `false` if the entity already had the component.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is dead or the component unknown.
    pub fn add_component(&mut self, entity: Entity, id: ComponentId) -> Result<bool, StoreError> {
        if !self.is_alive(entity) {
            return Err(StoreError::EntityNotAlive(entity));
        }
        let store = self.store_mut(id)?;
        if store.members[entity.index()] {
            return Ok(false);
        }
        store.members[entity.index()] = true;
        for column in store.columns.iter_mut().flatten() {
            column.reset(entity);
        }
        Ok(true)
    }

    /// Detach a component. Returns `false` if it was not attached.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is dead or the component unknown.
    pub fn remove_component(
        &mut self,
        entity: Entity,
        id: ComponentId,
    ) -> Result<bool, StoreError> {
        if !self.is_alive(entity) {
            return Err(StoreError::EntityNotAlive(entity));
        }
        let store = self.store_mut(id)?;
        let was = std::mem::replace(&mut store.members[entity.index()], false);
        Ok(was)
    }

    /// Returns `true` if the live entity carries the component.
    #[must_use]
    pub fn has_component(&self, entity: Entity, id: ComponentId) -> bool {
        self.is_alive(entity)
            && self
                .components
                .get(id.index())
                .is_some_and(|store| store.members[entity.index()])
    }

    // -- Values --

    /// The value column backing a property.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShapeMismatch`] for tag properties, which have no
    /// column.
    pub fn column(&self, property: PropertyRef) -> Result<&Column, StoreError> {
        let store = self.store(property.component)?;
        match store.columns.get(property.field as usize) {
            Some(Some(column)) => Ok(column),
            Some(None) => Err(StoreError::ShapeMismatch {
                property,
                expected: "value",
            }),
            None => Err(StoreError::UnknownProperty(property)),
        }
    }

    fn column_mut(&mut self, property: PropertyRef) -> Result<&mut Column, StoreError> {
        let store = self.store_mut(property.component)?;
        match store.columns.get_mut(property.field as usize) {
            Some(Some(column)) => Ok(column),
            Some(None) => Err(StoreError::ShapeMismatch {
                property,
                expected: "value",
            }),
            None => Err(StoreError::UnknownProperty(property)),
        }
    }

    fn scalar_column(&self, property: PropertyRef) -> Result<&Column, StoreError> {
        match self.shape(property)? {
            Shape::Scalar(_) => self.column(property),
            _ => Err(StoreError::ShapeMismatch {
                property,
                expected: "scalar",
            }),
        }
    }

    fn array_len(&self, property: PropertyRef) -> Result<usize, StoreError> {
        match self.shape(property)? {
            Shape::Array { len, .. } => Ok(len as usize),
            _ => Err(StoreError::ShapeMismatch {
                property,
                expected: "array",
            }),
        }
    }

    fn check_alive(&self, entity: Entity) -> Result<(), StoreError> {
        if self.is_alive(entity) {
            Ok(())
        } else {
            Err(StoreError::EntityNotAlive(entity))
        }
    }

    /// Read a scalar property.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is dead or the property is not scalar.
    pub fn get(&self, entity: Entity, property: PropertyRef) -> Result<Value, StoreError> {
        self.check_alive(entity)?;
        self.scalar_column(property)?
            .get(entity, 0)
            .ok_or(StoreError::EntityNotAlive(entity))
    }

    /// Write a scalar property.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is dead, the property is not scalar, or
    /// the value has the wrong kind.
    pub fn set(
        &mut self,
        entity: Entity,
        property: PropertyRef,
        value: impl Into<Value>,
    ) -> Result<(), StoreError> {
        self.check_alive(entity)?;
        self.scalar_column(property)?;
        self.write_slot(entity, property, 0, value.into())
    }

    /// Read element `index` of an array property.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is dead, the property is not an array,
    /// or `index` is out of range.
    pub fn get_element(
        &self,
        entity: Entity,
        property: PropertyRef,
        index: usize,
    ) -> Result<Value, StoreError> {
        self.check_alive(entity)?;
        let len = self.array_len(property)?;
        if index >= len {
            return Err(StoreError::IndexOutOfRange {
                property,
                index,
                len,
            });
        }
        self.column(property)?
            .get(entity, index)
            .ok_or(StoreError::EntityNotAlive(entity))
    }

    /// Write element `index` of an array property.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is dead, the property is not an array,
    /// `index` is out of range, or the value has the wrong kind.
    pub fn set_element(
        &mut self,
        entity: Entity,
        property: PropertyRef,
        index: usize,
        value: impl Into<Value>,
    ) -> Result<(), StoreError> {
        self.check_alive(entity)?;
        let len = self.array_len(property)?;
        if index >= len {
            return Err(StoreError::IndexOutOfRange {
                property,
                index,
                len,
            });
        }
        self.write_slot(entity, property, index, value.into())
    }

    /// Write one element slot of a scalar or array property without a shape
    /// check. Scalars use slot 0.
    ///
    /// # Errors
    ///
    /// Returns an error if the property has no column, the slot is out of
    /// range, or the value has the wrong kind.
    pub fn write_slot(
        &mut self,
        entity: Entity,
        property: PropertyRef,
        slot: usize,
        value: Value,
    ) -> Result<(), StoreError> {
        let column = self.column_mut(property)?;
        let expected = column.kind();
        if value.kind() != expected {
            return Err(StoreError::KindMismatch {
                property,
                expected,
                found: value.kind(),
            });
        }
        let len = column.stride();
        if column.set(entity, slot, value) {
            Ok(())
        } else {
            Err(StoreError::IndexOutOfRange {
                property,
                index: slot,
                len,
            })
        }
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::NumericKind;

    fn make_world() -> (World, ComponentId, ComponentId, ComponentId) {
        let mut world = World::with_capacity(2);
        let position = world
            .register_component(
                ComponentDef::new("Position")
                    .scalar("x", NumericKind::F32)
                    .scalar("y", NumericKind::F32),
            )
            .unwrap();
        let inventory = world
            .register_component(ComponentDef::new("Inventory").array("slots", NumericKind::U8, 4))
            .unwrap();
        let player = world.register_component(ComponentDef::new("Player")).unwrap();
        (world, position, inventory, player)
    }

    #[test]
    fn test_register_assigns_ids_in_order() {
        let (world, position, inventory, player) = make_world();
        assert_eq!((position.0, inventory.0, player.0), (0, 1, 2));
        assert_eq!(world.component_id("Inventory"), Some(inventory));
        assert_eq!(world.property(position, "y"), Some(position.property(1)));
        assert!(world.component(player).unwrap().is_tag());
    }

    #[test]
    fn test_register_rejects_empty_array() {
        let mut world = World::new();
        let result =
            world.register_component(ComponentDef::new("Bad").array("none", NumericKind::U8, 0));
        assert!(matches!(result, Err(StoreError::EmptyArray { .. })));
    }

    #[test]
    fn test_register_bumps_layout_version() {
        let mut world = World::new();
        let before = world.layout_version();
        world.register_component(ComponentDef::new("Tag")).unwrap();
        assert_ne!(before, world.layout_version());
    }

    #[test]
    fn test_capacity_growth_bumps_version_and_keeps_values() {
        let (mut world, position, _, _) = make_world();
        let x = position.property(0);
        let e0 = world.add_entity();
        world.add_component(e0, position).unwrap();
        world.set(e0, x, 7.0f32).unwrap();
        world.add_entity();

        let before = world.layout_version();
        let e2 = world.add_entity();
        assert!(world.capacity() >= 3);
        assert_ne!(before, world.layout_version());
        assert_eq!(world.get(e0, x).unwrap(), Value::F32(7.0));
        world.add_component(e2, position).unwrap();
        assert_eq!(world.get(e2, x).unwrap(), Value::F32(0.0));
    }

    #[test]
    fn test_membership() {
        let (mut world, position, _, player) = make_world();
        let e = world.add_entity();
        assert!(!world.has_component(e, player));
        assert!(world.add_component(e, player).unwrap());
        assert!(!world.add_component(e, player).unwrap());
        assert!(world.has_component(e, player));
        assert!(world.remove_component(e, player).unwrap());
        assert!(!world.has_component(e, player));
        assert!(!world.has_component(e, position));
    }

    #[test]
    fn test_add_component_zeroes_previous_values() {
        let (mut world, position, _, _) = make_world();
        let x = position.property(0);
        let e = world.add_entity();
        world.add_component(e, position).unwrap();
        world.set(e, x, 3.0f32).unwrap();
        world.remove_component(e, position).unwrap();
        world.add_component(e, position).unwrap();
        assert_eq!(world.get(e, x).unwrap(), Value::F32(0.0));
    }

    #[test]
    fn test_remove_entity_detaches_components() {
        let (mut world, _, _, player) = make_world();
        let e = world.add_entity();
        world.add_component(e, player).unwrap();
        assert!(world.remove_entity(e));
        assert!(!world.is_alive(e));
        assert!(!world.has_component(e, player));
        assert!(!world.remove_entity(e));
    }

    #[test]
    fn test_recycled_entity_has_new_generation() {
        let mut world = World::new();
        let e = world.add_entity();
        let generation = world.generation(e);
        world.remove_entity(e);
        let reused = world.add_entity();
        assert_eq!(reused, e);
        assert_ne!(world.generation(reused), generation);
    }

    #[test]
    fn test_array_elements() {
        let (mut world, _, inventory, _) = make_world();
        let slots = inventory.property(0);
        let e = world.add_entity();
        world.set_element(e, slots, 3, 200u8).unwrap();
        assert_eq!(world.get_element(e, slots, 3).unwrap(), Value::U8(200));
        assert!(matches!(
            world.set_element(e, slots, 4, 1u8),
            Err(StoreError::IndexOutOfRange { index: 4, len: 4, .. })
        ));
        assert!(matches!(
            world.get(e, slots),
            Err(StoreError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_kind_mismatch() {
        let (mut world, position, _, _) = make_world();
        let e = world.add_entity();
        assert!(matches!(
            world.set(e, position.property(0), 1u32),
            Err(StoreError::KindMismatch { .. })
        ));
    }

    #[test]
    fn test_tag_has_no_column() {
        let (world, _, _, player) = make_world();
        assert!(matches!(
            world.column(player.property(0)),
            Err(StoreError::ShapeMismatch { .. })
        ));
        assert_eq!(world.shape(player.property(0)).unwrap(), Shape::Tag);
    }

    #[test]
    fn test_dead_entity_access_fails() {
        let (mut world, position, _, _) = make_world();
        let e = world.add_entity();
        world.remove_entity(e);
        assert!(matches!(
            world.get(e, position.property(0)),
            Err(StoreError::EntityNotAlive(_))
        ));
    }
}
