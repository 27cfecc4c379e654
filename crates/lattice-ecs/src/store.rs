//! Per-type component storage (a sparse set).
//!
//! A [`ComponentStore<T>`] keeps every `T` in one dense [`GrowableArray`] with
//! no gaps, plus two [`HashTable`] index maps:
//!
//! - entity index -> dense slot
//! - dense slot -> entity
//!
//! Both maps are patched on every add and remove so they stay inverse to each
//! other. Removal is a swap-remove: the last value moves into the freed slot,
//! which means a removal can relocate some *other* entity's value. Borrows
//! returned by [`get`](ComponentStore::get) cannot outlive the next mutation
//! (the borrow checker sees to that); [`DenseSlot`] handles are the storable
//! alternative and stop resolving once the layout changes.

use std::any::{type_name, Any};

use lattice_collections::{AllocError, GrowableArray, HashTable, RawAllocator, SystemAllocator};
use tracing::trace;

use crate::entity::Entity;

// ---------------------------------------------------------------------------
// DenseSlot
// ---------------------------------------------------------------------------

/// A dense index paired with the store layout it was taken from.
///
/// Resolving it after any add or remove on the same store yields `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DenseSlot {
    index: usize,
    epoch: u64,
}

impl DenseSlot {
    /// The dense index this handle was taken at.
    pub fn index(self) -> usize {
        self.index
    }
}

// ---------------------------------------------------------------------------
// ErasedStore
// ---------------------------------------------------------------------------

/// The type-erased face of a [`ComponentStore`].
///
/// The registry keeps one `Box<dyn ErasedStore>` per component type. Dropping
/// the box drops the values; [`entity_destroyed`](ErasedStore::entity_destroyed)
/// is the hook run for every store when an entity goes away.
pub trait ErasedStore: Any {
    /// Remove `entity`'s value if it has one.
    fn entity_destroyed(&mut self, entity: Entity);

    /// Number of stored values.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Name of the stored component type.
    fn component_name(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

// ---------------------------------------------------------------------------
// ComponentStore
// ---------------------------------------------------------------------------

/// Dense storage for every value of one component type.
///
/// All three arrays grow through the allocator `A`.
pub struct ComponentStore<T, A: RawAllocator = SystemAllocator> {
    items: GrowableArray<T, A>,
    entity_to_slot: HashTable<u32, u32, A>,
    slot_to_entity: HashTable<u32, Entity, A>,
    max_len: usize,
    /// Bumped on every layout change; see [`DenseSlot`].
    epoch: u64,
}

impl<T: 'static> ComponentStore<T> {
    /// Create an empty store for at most `max_len` values, with index maps of
    /// `table_buckets` buckets each. Nothing is allocated until the first add.
    pub fn new(max_len: usize, table_buckets: usize) -> Self {
        Self::new_in(max_len, table_buckets, SystemAllocator)
    }
}

impl<T: 'static, A: RawAllocator + Clone + 'static> ComponentStore<T, A> {
    /// Like [`new`](ComponentStore::new), growing through `alloc`.
    pub fn new_in(max_len: usize, table_buckets: usize, alloc: A) -> Self {
        Self {
            items: GrowableArray::new_in(alloc.clone()),
            entity_to_slot: HashTable::with_buckets_in(table_buckets, alloc.clone()),
            slot_to_entity: HashTable::with_buckets_in(table_buckets, alloc),
            max_len,
            epoch: 0,
        }
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the store holds no values.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Dense slot of `entity`, if it has a value here under this exact
    /// generation.
    fn live_slot(&self, entity: Entity) -> Option<usize> {
        let slot = *self.entity_to_slot.get(&entity.index())?;
        (self.slot_to_entity.get(&slot) == Some(&entity)).then_some(slot as usize)
    }

    /// Whether `entity` has a value in this store.
    pub fn contains(&self, entity: Entity) -> bool {
        self.live_slot(entity).is_some()
    }

    /// Store `value` for `entity`.
    ///
    /// On allocation failure the store is left exactly as it was and `value`
    /// is dropped.
    ///
    /// # Panics
    ///
    /// Panics if `entity` already has a value in this store, or if the store
    /// already holds its maximum number of values.
    pub fn add(&mut self, entity: Entity, value: T) -> Result<(), AllocError> {
        contract!(
            !self.entity_to_slot.contains_key(&entity.index()),
            "entity {entity} already has a {} component",
            type_name::<T>()
        );
        contract!(
            self.items.len() < self.max_len,
            "{} store is full ({} values)",
            type_name::<T>(),
            self.max_len
        );

        let slot = self.items.push(value)? as u32;
        if let Err(err) = self.entity_to_slot.insert(entity.index(), slot) {
            drop(self.items.pop());
            return Err(err);
        }
        if let Err(err) = self.slot_to_entity.insert(slot, entity) {
            self.entity_to_slot.remove(&entity.index());
            drop(self.items.pop());
            return Err(err);
        }
        self.epoch += 1;
        trace!(component = type_name::<T>(), %entity, slot, "component added");
        Ok(())
    }

    /// Remove and return `entity`'s value.
    ///
    /// The last value in the store moves into the freed slot.
    ///
    /// # Panics
    ///
    /// Panics if `entity` has no value in this store.
    pub fn remove(&mut self, entity: Entity) -> T {
        let Some(slot) = self.live_slot(entity) else {
            fail!(
                "entity {entity} has no {} component to remove",
                type_name::<T>()
            );
        };
        let last = self.items.len() - 1;
        let value = self.items.erase_fast(slot);

        self.entity_to_slot.remove(&entity.index());
        let moved = self.slot_to_entity.remove(&(last as u32));
        if slot != last {
            if let Some(moved) = moved {
                if let Some(target) = self.slot_to_entity.get_mut(&(slot as u32)) {
                    *target = moved;
                }
                if let Some(target) = self.entity_to_slot.get_mut(&moved.index()) {
                    *target = slot as u32;
                }
            }
        }
        self.epoch += 1;
        trace!(component = type_name::<T>(), %entity, slot, "component removed");
        value
    }

    /// Shared reference to `entity`'s value.
    pub fn get(&self, entity: Entity) -> Option<&T> {
        let slot = self.live_slot(entity)?;
        self.items.get(slot)
    }

    /// Mutable reference to `entity`'s value.
    pub fn get_mut(&mut self, entity: Entity) -> Option<&mut T> {
        let slot = self.live_slot(entity)?;
        self.items.get_mut(slot)
    }

    /// A storable handle to `entity`'s current dense slot.
    pub fn slot(&self, entity: Entity) -> Option<DenseSlot> {
        let index = self.live_slot(entity)?;
        Some(DenseSlot {
            index,
            epoch: self.epoch,
        })
    }

    /// Resolve a [`DenseSlot`]. `None` if the store changed since it was taken.
    pub fn get_by_slot(&self, slot: DenseSlot) -> Option<&T> {
        if slot.epoch != self.epoch {
            return None;
        }
        self.items.get(slot.index)
    }

    /// Mutable form of [`get_by_slot`](Self::get_by_slot).
    pub fn get_by_slot_mut(&mut self, slot: DenseSlot) -> Option<&mut T> {
        if slot.epoch != self.epoch {
            return None;
        }
        self.items.get_mut(slot.index)
    }

    /// Remove `entity`'s value if present; a no-op otherwise.
    pub fn on_entity_destroyed(&mut self, entity: Entity) {
        if self.contains(entity) {
            drop(self.remove(entity));
        }
    }

    /// Every value, densely packed, in slot order.
    pub fn as_slice(&self) -> &[T] {
        self.items.as_slice()
    }

    /// `(entity, value)` pairs in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (Entity, &T)> + '_ {
        self.items
            .iter()
            .enumerate()
            .filter_map(move |(slot, value)| {
                self.slot_to_entity
                    .get(&(slot as u32))
                    .map(|&entity| (entity, value))
            })
    }
}

impl<T: 'static, A: RawAllocator + Clone + 'static> ErasedStore for ComponentStore<T, A> {
    fn entity_destroyed(&mut self, entity: Entity) {
        self.on_entity_destroyed(entity);
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn component_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl<T, A: RawAllocator> std::fmt::Debug for ComponentStore<T, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentStore")
            .field("component", &type_name::<T>())
            .field("len", &self.items.len())
            .field("max_len", &self.max_len)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
