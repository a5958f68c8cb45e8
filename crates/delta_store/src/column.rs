//! Typed numeric columns indexed by entity id.
//!
//! A [`Column`] stores raw little-endian bytes. Each entity owns `stride`
//! consecutive elements of `kind.width()` bytes, starting at
//! `entity * stride`. Scalar columns have a stride of 1, array columns a
//! stride equal to the array length.

use crate::entity::Entity;
use crate::kind::{NumericKind, Value};

/// A column of fixed-width numeric elements.
#[derive(Debug, Clone)]
pub struct Column {
    /// Element type.
    kind: NumericKind,
    /// Elements per entity.
    stride: usize,
    /// Number of entity rows the column can hold.
    capacity: usize,
    /// Raw byte storage. Length is always `capacity * stride * kind.width()`.
    data: Vec<u8>,
}

impl Column {
    /// Create a zero-filled column for `capacity` entities.
    #[must_use]
    pub fn new(kind: NumericKind, stride: usize, capacity: usize) -> Self {
        Self {
            kind,
            stride,
            capacity,
            data: vec![0; capacity * stride * kind.width()],
        }
    }

    /// Element kind.
    #[must_use]
    pub fn kind(&self) -> NumericKind {
        self.kind
    }

    /// Elements per entity.
    #[must_use]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Number of entity rows.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Grow to hold at least `capacity` rows. New rows are zeroed.
    pub fn grow(&mut self, capacity: usize) {
        if capacity > self.capacity {
            self.capacity = capacity;
            self.data
                .resize(capacity * self.stride * self.kind.width(), 0);
        }
    }

    fn offset(&self, entity: Entity, slot: usize) -> Option<usize> {
        if slot >= self.stride || entity.index() >= self.capacity {
            return None;
        }
        Some((entity.index() * self.stride + slot) * self.kind.width())
    }

    /// Read element `slot` of `entity`.
    #[must_use]
    pub fn get(&self, entity: Entity, slot: usize) -> Option<Value> {
        let start = self.offset(entity, slot)?;
        Some(self.kind.decode_le(&self.data[start..start + self.kind.width()]))
    }

    /// Write element `slot` of `entity`. Returns `false` when the slot is out
    /// of range or the value has the wrong kind.
    #[must_use]
    pub fn set(&mut self, entity: Entity, slot: usize, value: Value) -> bool {
        if value.kind() != self.kind {
            return false;
        }
        let Some(start) = self.offset(entity, slot) else {
            return false;
        };
        let width = self.kind.width();
        value.encode_le(&mut self.data[start..start + width]);
        true
    }

    /// Zero every element of `entity`.
    pub fn reset(&mut self, entity: Entity) {
        if let Some(start) = self.offset(entity, 0) {
            let end = start + self.stride * self.kind.width();
            self.data[start..end].fill(0);
        }
    }
}
