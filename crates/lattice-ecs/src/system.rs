//! System registration and signature-driven membership.
//!
//! A system is identified by a Rust type `S` (usually a unit struct) and owns
//! two things here: the [`Signature`] it requires, and the set of entities
//! whose signature currently contains that requirement. The set is never
//! edited directly; it follows from
//! [`entity_signature_changed`](SystemRegistry::entity_signature_changed) and
//! [`entity_destroyed`](SystemRegistry::entity_destroyed), which the
//! coordinator calls after every component or lifecycle change.

use std::any::{type_name, TypeId};
use std::fmt;

use lattice_collections::{AllocError, GrowableArray, HashTable, RawAllocator, SystemAllocator};
use tracing::debug;

use crate::entity::Entity;
use crate::signature::Signature;

// ---------------------------------------------------------------------------
// SystemId
// ---------------------------------------------------------------------------

/// Ordinal of a registered system, assigned in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SystemId(pub(crate) u32);

impl SystemId {
    /// Registration index of the system.
    pub fn ordinal(self) -> u32 {
        self.0
    }
}

// ---------------------------------------------------------------------------
// EntitySet
// ---------------------------------------------------------------------------

/// Unordered entity set with O(1) insert, remove and membership test.
///
/// Members are packed in a dense array; a position table maps each member's
/// slot index to its place in that array.
pub struct EntitySet<A: RawAllocator = SystemAllocator> {
    members: GrowableArray<Entity, A>,
    positions: HashTable<u32, u32, A>,
}

impl EntitySet {
    /// An empty set whose position table has `table_buckets` buckets.
    pub fn new(table_buckets: usize) -> Self {
        Self::new_in(table_buckets, SystemAllocator)
    }
}

impl<A: RawAllocator + Clone> EntitySet<A> {
    /// Like [`new`](EntitySet::new), growing through `alloc`.
    pub fn new_in(table_buckets: usize, alloc: A) -> Self {
        Self {
            members: GrowableArray::new_in(alloc.clone()),
            positions: HashTable::with_buckets_in(table_buckets, alloc),
        }
    }

    /// Whether `entity`, with this exact generation, is a member.
    pub fn contains(&self, entity: Entity) -> bool {
        self.positions
            .get(&entity.index())
            .is_some_and(|&pos| self.members[pos as usize] == entity)
    }

    /// Add `entity`. Returns `Ok(false)` if it was already a member.
    pub fn insert(&mut self, entity: Entity) -> Result<bool, AllocError> {
        if self.contains(entity) {
            return Ok(false);
        }
        contract!(
            !self.positions.contains_key(&entity.index()),
            "entity {entity} shares a slot with a member of another generation"
        );
        let pos = self.members.push(entity)?;
        if let Err(err) = self.positions.insert(entity.index(), pos as u32) {
            self.members.pop();
            return Err(err);
        }
        Ok(true)
    }

    /// Remove `entity`. Returns `false` if it was not a member.
    pub fn remove(&mut self, entity: Entity) -> bool {
        if !self.contains(entity) {
            return false;
        }
        let Some(pos) = self.positions.remove(&entity.index()) else {
            return false;
        };
        let pos = pos as usize;
        self.members.erase_fast(pos);
        if let Some(&moved) = self.members.get(pos) {
            if let Some(slot) = self.positions.get_mut(&moved.index()) {
                *slot = pos as u32;
            }
        }
        true
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the set has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Members in storage order. Removal moves the last member into the
    /// freed position, so the order is not stable.
    pub fn as_slice(&self) -> &[Entity] {
        self.members.as_slice()
    }

    fn clear(&mut self) {
        self.members.clear();
        self.positions.clear();
    }
}

impl<A: RawAllocator> fmt::Debug for EntitySet<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.members.iter()).finish()
    }
}

// ---------------------------------------------------------------------------
// SystemRegistry
// ---------------------------------------------------------------------------

struct SystemEntry<A: RawAllocator> {
    name: &'static str,
    /// `None` until `set_signature`; such a system matches nothing.
    required: Option<Signature>,
    members: EntitySet<A>,
}

/// Registered systems with their required signatures and member sets.
pub struct SystemRegistry<A: RawAllocator = SystemAllocator> {
    by_type: HashTable<TypeId, u32, A>,
    systems: Vec<SystemEntry<A>>,
    table_buckets: usize,
    alloc: A,
}

impl SystemRegistry {
    /// An empty registry; each member set gets `table_buckets` buckets.
    pub fn new(table_buckets: usize) -> Self {
        Self::new_in(table_buckets, SystemAllocator)
    }
}

impl<A: RawAllocator + Clone> SystemRegistry<A> {
    /// Like [`new`](SystemRegistry::new), allocating through `alloc`.
    pub fn new_in(table_buckets: usize, alloc: A) -> Self {
        Self {
            by_type: HashTable::with_buckets_in(64, alloc.clone()),
            systems: Vec::new(),
            table_buckets,
            alloc,
        }
    }

    /// Register system type `S`. Its signature must be set afterwards.
    ///
    /// # Panics
    ///
    /// Panics if `S` is already registered.
    pub fn register<S: 'static>(&mut self) -> Result<SystemId, AllocError> {
        let type_id = TypeId::of::<S>();
        contract!(
            !self.by_type.contains_key(&type_id),
            "system {} registered twice",
            type_name::<S>()
        );
        let id = SystemId(self.systems.len() as u32);
        self.by_type.insert(type_id, id.0)?;
        self.systems.push(SystemEntry {
            name: type_name::<S>(),
            required: None,
            members: EntitySet::new_in(self.table_buckets, self.alloc.clone()),
        });
        debug!(system = type_name::<S>(), ordinal = id.0, "system registered");
        Ok(id)
    }

    /// The id of `S`, or `None` if it is not registered.
    pub fn lookup<S: 'static>(&self) -> Option<SystemId> {
        self.by_type.get(&TypeId::of::<S>()).map(|&id| SystemId(id))
    }

    /// The id of `S`.
    ///
    /// # Panics
    ///
    /// Panics if `S` is not registered.
    pub fn id_of<S: 'static>(&self) -> SystemId {
        match self.lookup::<S>() {
            Some(id) => id,
            None => fail!("system {} used before registration", type_name::<S>()),
        }
    }

    fn entry(&self, id: SystemId) -> &SystemEntry<A> {
        match self.systems.get(id.0 as usize) {
            Some(entry) => entry,
            None => fail!("unknown system id {}", id.0),
        }
    }

    fn entry_mut(&mut self, id: SystemId) -> &mut SystemEntry<A> {
        match self.systems.get_mut(id.0 as usize) {
            Some(entry) => entry,
            None => fail!("unknown system id {}", id.0),
        }
    }

    /// Fix the signature system `id` requires. Existing entities are not
    /// examined here; feed them through [`refresh`](Self::refresh).
    ///
    /// # Panics
    ///
    /// Panics if the signature was already set.
    pub fn set_signature(&mut self, id: SystemId, required: Signature) {
        let entry = self.entry_mut(id);
        contract!(
            entry.required.is_none(),
            "signature for system {} set twice",
            entry.name
        );
        entry.required = Some(required);
        debug!(system = entry.name, ?required, "system signature set");
    }

    /// Undo [`set_signature`](Self::set_signature) and empty the member set.
    /// Used to back out of a signature whose initial population failed.
    pub(crate) fn abandon_signature(&mut self, id: SystemId) {
        let entry = self.entry_mut(id);
        entry.required = None;
        entry.members.clear();
    }

    /// Signature required by `id`, if set.
    pub fn required_signature(&self, id: SystemId) -> Option<Signature> {
        self.entry(id).required
    }

    /// Bring system `id`'s membership of `entity` in line with `signature`.
    pub fn refresh(
        &mut self,
        id: SystemId,
        entity: Entity,
        signature: Signature,
    ) -> Result<(), AllocError> {
        let entry = self.entry_mut(id);
        match entry.required {
            Some(required) if signature.contains_all(required) => {
                entry.members.insert(entity)?;
            }
            _ => {
                entry.members.remove(entity);
            }
        }
        Ok(())
    }

    /// Re-check every system against `entity`'s new signature.
    ///
    /// If an insertion fails, systems already visited keep their updated
    /// membership; the caller rolls back with
    /// [`entity_signature_narrowed`](Self::entity_signature_narrowed).
    pub fn entity_signature_changed(
        &mut self,
        entity: Entity,
        signature: Signature,
    ) -> Result<(), AllocError> {
        for index in 0..self.systems.len() {
            self.refresh(SystemId(index as u32), entity, signature)?;
        }
        Ok(())
    }

    /// Drop `entity` from every system `signature` no longer satisfies.
    ///
    /// Only removes, so it cannot fail. Correct whenever the new signature
    /// is a subset of the one the memberships were computed from.
    pub fn entity_signature_narrowed(&mut self, entity: Entity, signature: Signature) {
        for entry in &mut self.systems {
            let keeps = entry
                .required
                .is_some_and(|required| signature.contains_all(required));
            if !keeps {
                entry.members.remove(entity);
            }
        }
    }

    /// Drop `entity` from every system.
    pub fn entity_destroyed(&mut self, entity: Entity) {
        for entry in &mut self.systems {
            entry.members.remove(entity);
        }
    }

    /// Members of system `S`, in no particular order.
    ///
    /// # Panics
    ///
    /// Panics if `S` is not registered.
    pub fn entities<S: 'static>(&self) -> &[Entity] {
        self.entities_by_id(self.id_of::<S>())
    }

    /// Members of system `id`, in no particular order.
    pub fn entities_by_id(&self, id: SystemId) -> &[Entity] {
        self.entry(id).members.as_slice()
    }

    /// Whether `entity` is a member of system `id`.
    pub fn contains(&self, id: SystemId, entity: Entity) -> bool {
        self.entry(id).members.contains(entity)
    }

    /// Number of registered systems.
    pub fn len(&self) -> usize {
        self.systems.len()
    }

    /// Whether no system is registered yet.
    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }
}

impl<A: RawAllocator + Clone> fmt::Debug for SystemRegistry<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for entry in &self.systems {
            map.entry(&entry.name, &entry.members.len());
        }
        map.finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
