//! Entity handles and the fixed-capacity pool they are drawn from.
//!
//! Destroying an entity bumps its slot's generation before the slot goes back
//! on the free stack. A handle is only honoured while its generation matches
//! the slot's, so keeping one past destruction can never reach whatever entity
//! reuses the slot.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::trace;

use crate::signature::Signature;

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

const INDEX_BITS: u32 = 32;

/// Handle to one entity.
///
/// The low half is the pool slot; the high half is the generation that slot
/// had when the handle was issued. Serializes as that packed `u64`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u64", into = "u64")]
pub struct Entity(u64);

impl Entity {
    /// Handle for pool slot `index` at `generation`.
    #[inline]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self(((generation as u64) << INDEX_BITS) | index as u64)
    }

    /// Pool slot.
    #[inline]
    pub const fn index(self) -> u32 {
        self.0 as u32
    }

    /// How often the slot had been recycled when this handle was issued.
    #[inline]
    pub const fn generation(self) -> u32 {
        (self.0 >> INDEX_BITS) as u32
    }
}

impl From<Entity> for u64 {
    fn from(entity: Entity) -> u64 {
        entity.0
    }
}

impl From<u64> for Entity {
    fn from(packed: u64) -> Self {
        Entity(packed)
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("index", &self.index())
            .field("generation", &self.generation())
            .finish()
    }
}

/// `index.generation`, e.g. `42.7`.
impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.index(), self.generation())
    }
}

// ---------------------------------------------------------------------------
// EntityManager
// ---------------------------------------------------------------------------

/// Hands out entities from a fixed pool of `capacity` slots and stores one
/// [`Signature`] per slot.
///
/// Free slots sit on a LIFO stack: the most recently destroyed index is the
/// next one reused. A fresh manager yields indices `0, 1, 2, ...`.
#[derive(Debug)]
pub struct EntityManager {
    /// Current generation for each slot.
    generations: Box<[u32]>,
    /// Component signature for each slot. Empty for free slots.
    signatures: Box<[Signature]>,
    /// Whether the slot is currently alive.
    alive: Box<[bool]>,
    /// Free slot indices; the top of the stack is reused first.
    free: Vec<u32>,
    living: usize,
}

impl EntityManager {
    /// Create a pool with `capacity` slots, all free.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero or does not fit in a `u32`.
    pub fn new(capacity: usize) -> Self {
        contract!(
            capacity > 0 && capacity <= u32::MAX as usize,
            "entity capacity must be in 1..={}, got {capacity}",
            u32::MAX
        );
        Self {
            generations: vec![0; capacity].into_boxed_slice(),
            signatures: vec![Signature::EMPTY; capacity].into_boxed_slice(),
            alive: vec![false; capacity].into_boxed_slice(),
            free: (0..capacity as u32).rev().collect(),
            living: 0,
        }
    }

    /// Take a slot from the pool. Its signature starts empty.
    ///
    /// # Panics
    ///
    /// Panics if every slot is in use. The pool never grows; exhausting it
    /// is a sizing bug in the caller.
    pub fn create_entity(&mut self) -> Entity {
        let Some(index) = self.free.pop() else {
            fail!(
                "entity pool exhausted: all {} entities are alive",
                self.capacity()
            );
        };
        let slot = index as usize;
        self.alive[slot] = true;
        self.signatures[slot] = Signature::EMPTY;
        self.living += 1;
        let entity = Entity::new(index, self.generations[slot]);
        trace!(%entity, living = self.living, "entity created");
        entity
    }

    /// Return `entity`'s slot to the pool and invalidate the handle.
    ///
    /// # Panics
    ///
    /// Panics if `entity` is not alive (already destroyed or stale).
    pub fn destroy_entity(&mut self, entity: Entity) {
        self.assert_alive(entity, "destroy_entity");
        let slot = entity.index() as usize;
        self.alive[slot] = false;
        self.generations[slot] = self.generations[slot].wrapping_add(1);
        self.signatures[slot] = Signature::EMPTY;
        self.free.push(entity.index());
        self.living -= 1;
        trace!(%entity, living = self.living, "entity destroyed");
    }

    /// Whether `entity` refers to a live slot with a matching generation.
    pub fn is_alive(&self, entity: Entity) -> bool {
        let slot = entity.index() as usize;
        slot < self.alive.len()
            && self.alive[slot]
            && self.generations[slot] == entity.generation()
    }

    /// Overwrite `entity`'s signature.
    ///
    /// # Panics
    ///
    /// Panics if `entity` is not alive.
    pub fn set_signature(&mut self, entity: Entity, signature: Signature) {
        self.assert_alive(entity, "set_signature");
        self.signatures[entity.index() as usize] = signature;
    }

    /// `entity`'s current signature.
    ///
    /// # Panics
    ///
    /// Panics if `entity` is not alive.
    pub fn signature(&self, entity: Entity) -> Signature {
        self.assert_alive(entity, "signature");
        self.signatures[entity.index() as usize]
    }

    /// Number of live entities.
    pub fn living_count(&self) -> usize {
        self.living
    }

    /// Total number of slots.
    pub fn capacity(&self) -> usize {
        self.alive.len()
    }

    /// Every live entity with its signature, in slot order.
    pub fn living(&self) -> impl Iterator<Item = (Entity, Signature)> + '_ {
        self.alive
            .iter()
            .enumerate()
            .filter(|(_, alive)| **alive)
            .map(|(slot, _)| {
                (
                    Entity::new(slot as u32, self.generations[slot]),
                    self.signatures[slot],
                )
            })
    }

    fn assert_alive(&self, entity: Entity, op: &str) {
        contract!(
            self.is_alive(entity),
            "{op}: entity {entity} is not alive (destroyed or stale handle)"
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentType;

    #[test]
    fn fresh_pool_hands_out_ascending_indices() {
        let mut mgr = EntityManager::new(8);
        let ids: Vec<u32> = (0..8).map(|_| mgr.create_entity().index()).collect();
        assert_eq!(ids, (0..8).collect::<Vec<_>>());
        assert_eq!(mgr.living_count(), 8);
    }

    #[test]
    fn destroyed_index_is_reused_first_with_new_generation() {
        let mut mgr = EntityManager::new(4);
        let _a = mgr.create_entity();
        let b = mgr.create_entity();
        mgr.destroy_entity(b);
        let c = mgr.create_entity();
        assert_eq!(c.index(), b.index());
        assert_eq!(c.generation(), b.generation() + 1);
    }

    #[test]
    fn stale_handle_detection() {
        let mut mgr = EntityManager::new(2);
        let e0 = mgr.create_entity();
        assert!(mgr.is_alive(e0));
        mgr.destroy_entity(e0);
        assert!(!mgr.is_alive(e0), "destroyed handle should not be alive");
        let _e1 = mgr.create_entity(); // recycles the same index
        assert!(!mgr.is_alive(e0), "stale handle still not alive after reuse");
    }

    #[test]
    fn signature_resets_on_create() {
        let mut mgr = EntityManager::new(1);
        let e = mgr.create_entity();
        mgr.set_signature(e, Signature::EMPTY.with(ComponentType(3)));
        assert!(mgr.signature(e).contains(ComponentType(3)));
        mgr.destroy_entity(e);
        let e = mgr.create_entity();
        assert_eq!(mgr.signature(e), Signature::EMPTY);
    }

    #[test]
    fn capacity_exhaustion_panics() {
        let mut mgr = EntityManager::new(5);
        for _ in 0..5 {
            mgr.create_entity();
        }
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            mgr.create_entity();
        }));
        assert!(result.is_err(), "sixth entity must not be handed out");
    }

    #[test]
    #[should_panic(expected = "not alive")]
    fn double_destroy_panics() {
        let mut mgr = EntityManager::new(2);
        let e = mgr.create_entity();
        mgr.destroy_entity(e);
        mgr.destroy_entity(e);
    }

    #[test]
    fn living_lists_only_live_slots() {
        let mut mgr = EntityManager::new(4);
        let a = mgr.create_entity();
        let b = mgr.create_entity();
        let c = mgr.create_entity();
        mgr.destroy_entity(b);
        let live: Vec<Entity> = mgr.living().map(|(e, _)| e).collect();
        assert_eq!(live, vec![a, c]);
    }

    #[test]
    fn handle_fields_and_display() {
        let e = Entity::new(42, 7);
        assert_eq!(e.index(), 42);
        assert_eq!(e.generation(), 7);
        assert_eq!(e.to_string(), "42.7");
        assert_eq!(Entity::new(u32::MAX, u32::MAX).index(), u32::MAX);
    }

    #[test]
    fn serializes_as_packed_u64() {
        let e = Entity::new(42, 7);
        let json = serde_json::to_string(&e).unwrap();
        assert_eq!(json, ((7u64 << 32) | 42).to_string());
        let back: Entity = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
    }
}
