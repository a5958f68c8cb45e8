//! Entity type and allocation utilities.
//!
//! An [`Entity`] is a lightweight `u32` identifier with no inherent data. The
//! identifier doubles as the row index into every column of the store, which
//! is why ids are dense and recycled instead of growing without bound.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// A unique entity identifier.
///
/// Entities are pure identifiers. They carry no data of their own. Components
/// are attached to entities to give them meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Entity(pub u32);

impl Entity {
    /// Create an entity from a raw `u32` identifier.
    #[must_use]
    pub const fn from_raw(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw `u32` identifier.
    #[must_use]
    pub const fn id(self) -> u32 {
        self.0
    }

    /// Returns the identifier as a row index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Entity({})", self.0)
    }
}

/// Allocates entity ids and tracks which of them are alive.
///
/// Fresh ids are handed out in increasing order starting at 0. Freed ids are
/// queued and reused oldest-first, so a just-removed id is not immediately
/// handed back out. Each id slot carries a generation that advances when the
/// id is freed, so a holder of a stale id can tell it was reused.
#[derive(Debug, Default)]
pub struct EntityAllocator {
    next_id: u32,
    recycled: VecDeque<u32>,
    /// `alive[id]` is the position of the entity in `dense`, if alive.
    alive: Vec<Option<usize>>,
    /// Live entities, in allocation order until a removal swaps the tail in.
    dense: Vec<Entity>,
    /// `generations[id]` counts how often `id` has been freed.
    generations: Vec<u32>,
}

impl EntityAllocator {
    /// Creates a new, empty allocator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates an entity id, preferring recycled ids.
    pub fn allocate(&mut self) -> Entity {
        let id = match self.recycled.pop_front() {
            Some(id) => id,
            None => {
                let id = self.next_id;
                self.next_id += 1;
                id
            }
        };
        let entity = Entity(id);
        if self.alive.len() <= entity.index() {
            self.alive.resize(entity.index() + 1, None);
            self.generations.resize(entity.index() + 1, 0);
        }
        self.alive[entity.index()] = Some(self.dense.len());
        self.dense.push(entity);
        entity
    }

    /// Releases an entity id. Returns `false` if the entity was not alive.
    pub fn free(&mut self, entity: Entity) -> bool {
        let Some(pos) = self.alive.get_mut(entity.index()).and_then(Option::take) else {
            return false;
        };
        self.dense.swap_remove(pos);
        if let Some(&moved) = self.dense.get(pos) {
            self.alive[moved.index()] = Some(pos);
        }
        let generation = &mut self.generations[entity.index()];
        *generation = generation.wrapping_add(1);
        self.recycled.push_back(entity.0);
        true
    }

    /// The generation of an id slot. It changes every time the id is freed,
    /// so an entity observed alive at generation `g` is the same entity only
    /// while the slot still reports `g`.
    #[must_use]
    pub fn generation(&self, entity: Entity) -> u32 {
        self.generations.get(entity.index()).copied().unwrap_or(0)
    }

    /// Returns `true` if the entity is currently alive.
    #[must_use]
    pub fn is_alive(&self, entity: Entity) -> bool {
        matches!(self.alive.get(entity.index()), Some(Some(_)))
    }

    /// Returns all live entities.
    #[must_use]
    pub fn live(&self) -> &[Entity] {
        &self.dense
    }

    /// Returns the number of live entities.
    #[must_use]
    pub fn count(&self) -> usize {
        self.dense.len()
    }

    /// One past the highest id ever handed out. Column capacity must cover it.
    #[must_use]
    pub fn high_water(&self) -> usize {
        self.next_id as usize
    }
}
