//! Last-sent value cache for change-tracked properties.
//!
//! Each tracked property gets a [`ShadowColumn`] with the same stride as its
//! source column. A slot holds the value most recently written into a packet
//! for that entity and element, or nothing if no value has been sent yet, so
//! a freshly tracked entity is always sent once in full.

use std::collections::HashMap;

use delta_store::{Entity, PropertyRef, Value};

/// Shadow slots for one property.
#[derive(Debug, Clone)]
pub struct ShadowColumn {
    stride: usize,
    slots: Vec<Option<Value>>,
}

impl ShadowColumn {
    #[must_use]
    pub fn new(stride: usize) -> Self {
        Self {
            stride,
            slots: Vec::new(),
        }
    }

    /// The last value sent for `entity` at `slot`, if any.
    #[must_use]
    pub fn get(&self, entity: Entity, slot: usize) -> Option<Value> {
        self.slots
            .get(entity.index() * self.stride + slot)
            .copied()
            .flatten()
    }

    /// Returns `true` if `value` equals the last value sent.
    #[must_use]
    pub fn matches(&self, entity: Entity, slot: usize, value: Value) -> bool {
        self.get(entity, slot) == Some(value)
    }

    /// Record `value` as sent, growing the column to cover `entity`.
    pub fn set(&mut self, entity: Entity, slot: usize, value: Value) {
        let at = entity.index() * self.stride + slot;
        if at >= self.slots.len() {
            self.slots.resize((entity.index() + 1) * self.stride, None);
        }
        self.slots[at] = Some(value);
    }
}

/// A shadow write staged during a serialize pass.
#[derive(Debug, Clone, Copy)]
pub struct ShadowWrite {
    pub property: PropertyRef,
    pub entity: Entity,
    pub slot: usize,
    pub value: Value,
}

/// Shadow columns keyed by property.
///
/// Keys are [`PropertyRef`]s rather than wire ids, so shadow state survives a
/// re-resolution of the property table.
#[derive(Debug, Default)]
pub struct ShadowStore {
    columns: HashMap<PropertyRef, ShadowColumn>,
}

impl ShadowStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The shadow column of a property, if it has one.
    #[must_use]
    pub fn column(&self, property: PropertyRef) -> Option<&ShadowColumn> {
        self.columns.get(&property)
    }

    /// Make sure a tracked property has a shadow column of `stride`.
    pub fn track(&mut self, property: PropertyRef, stride: usize) {
        let column = self
            .columns
            .entry(property)
            .or_insert_with(|| ShadowColumn::new(stride));
        if column.stride != stride {
            *column = ShadowColumn::new(stride);
        }
    }

    /// Apply staged writes.
    pub fn commit(&mut self, writes: &[ShadowWrite]) {
        for w in writes {
            if let Some(column) = self.columns.get_mut(&w.property) {
                column.set(w.entity, w.slot, w.value);
            }
        }
    }

    /// Forget every recorded value.
    pub fn clear(&mut self) {
        for column in self.columns.values_mut() {
            column.slots.clear();
        }
    }
}
