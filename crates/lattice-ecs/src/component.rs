//! Component type registration and the store directory.
//!
//! Every component type must be registered with a [`ComponentRegistry`]
//! before use. Registration assigns a [`ComponentType`] ordinal (the type's
//! bit in a [`Signature`](crate::signature::Signature)) and creates the
//! type's [`ComponentStore`], which the registry keeps behind the
//! [`ErasedStore`] trait object.

use std::any::{type_name, TypeId};
use std::fmt;

use lattice_collections::{AllocError, HashTable, RawAllocator, SystemAllocator};
use tracing::debug;

use crate::entity::Entity;
use crate::signature::MAX_COMPONENTS;
use crate::store::{ComponentStore, ErasedStore};

// ---------------------------------------------------------------------------
// ComponentType
// ---------------------------------------------------------------------------

/// Ordinal of a registered component type, assigned in registration order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentType(pub(crate) u8);

impl ComponentType {
    /// The ordinal, which is also the type's signature bit position.
    #[inline]
    pub fn ordinal(self) -> u8 {
        self.0
    }

    #[inline]
    pub(crate) fn bit(self) -> u64 {
        1u64 << self.0
    }
}

impl fmt::Debug for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentType({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// ComponentInfo
// ---------------------------------------------------------------------------

/// Metadata about a registered component type.
#[derive(Debug, Clone)]
pub struct ComponentInfo {
    /// Ordinal assigned at registration time.
    pub ty: ComponentType,
    /// `std::any::type_name::<T>()`
    pub name: &'static str,
    /// Rust `TypeId`, the registry key.
    pub type_id: TypeId,
}

// ---------------------------------------------------------------------------
// ComponentRegistry
// ---------------------------------------------------------------------------

/// Directory of component types and their stores.
///
/// Every store the registry creates grows through a clone of its allocator.
pub struct ComponentRegistry<A: RawAllocator = SystemAllocator> {
    /// TypeId -> ordinal.
    by_type: HashTable<TypeId, u8, A>,
    /// Indexed by ordinal.
    infos: Vec<ComponentInfo>,
    /// Indexed by ordinal.
    stores: Vec<Box<dyn ErasedStore>>,
    /// Per-store value limit (the entity capacity).
    max_entities: usize,
    table_buckets: usize,
    alloc: A,
}

impl ComponentRegistry {
    /// Create an empty registry whose stores hold up to `max_entities`
    /// values and use `table_buckets` buckets per index map.
    pub fn new(max_entities: usize, table_buckets: usize) -> Self {
        Self::new_in(max_entities, table_buckets, SystemAllocator)
    }
}

impl<A: RawAllocator + Clone + 'static> ComponentRegistry<A> {
    /// Like [`new`](ComponentRegistry::new), allocating through `alloc`.
    pub fn new_in(max_entities: usize, table_buckets: usize, alloc: A) -> Self {
        Self {
            by_type: HashTable::with_buckets_in(MAX_COMPONENTS, alloc.clone()),
            infos: Vec::new(),
            stores: Vec::new(),
            max_entities,
            table_buckets,
            alloc,
        }
    }

    /// Register `T`, creating its store and assigning the next ordinal.
    ///
    /// # Panics
    ///
    /// Panics if `T` is already registered or if [`MAX_COMPONENTS`] types
    /// are registered already.
    pub fn register<T: 'static>(&mut self) -> Result<ComponentType, AllocError> {
        let type_id = TypeId::of::<T>();
        contract!(
            !self.by_type.contains_key(&type_id),
            "component type {} registered twice",
            type_name::<T>()
        );
        contract!(
            self.infos.len() < MAX_COMPONENTS,
            "cannot register {}: all {MAX_COMPONENTS} component slots are taken",
            type_name::<T>()
        );

        let ty = ComponentType(self.infos.len() as u8);
        self.by_type.insert(type_id, ty.0)?;
        self.infos.push(ComponentInfo {
            ty,
            name: type_name::<T>(),
            type_id,
        });
        self.stores.push(Box::new(ComponentStore::<T, A>::new_in(
            self.max_entities,
            self.table_buckets,
            self.alloc.clone(),
        )));
        debug!(component = type_name::<T>(), ordinal = ty.0, "component registered");
        Ok(ty)
    }

    /// The ordinal of `T`, or `None` if it is not registered.
    pub fn lookup<T: 'static>(&self) -> Option<ComponentType> {
        self.by_type.get(&TypeId::of::<T>()).map(|&ordinal| ComponentType(ordinal))
    }

    /// Whether `T` has been registered.
    pub fn is_registered<T: 'static>(&self) -> bool {
        self.lookup::<T>().is_some()
    }

    /// The ordinal of `T`.
    ///
    /// # Panics
    ///
    /// Panics if `T` is not registered.
    pub fn component_type<T: 'static>(&self) -> ComponentType {
        match self.lookup::<T>() {
            Some(ty) => ty,
            None => fail!("component type {} used before registration", type_name::<T>()),
        }
    }

    /// The store for `T`.
    ///
    /// # Panics
    ///
    /// Panics if `T` is not registered.
    pub fn store<T: 'static>(&self) -> &ComponentStore<T, A> {
        let ty = self.component_type::<T>();
        match self.stores[ty.0 as usize]
            .as_any()
            .downcast_ref::<ComponentStore<T, A>>()
        {
            Some(store) => store,
            None => fail!("store for ordinal {} does not hold {}", ty.0, type_name::<T>()),
        }
    }

    /// Mutable store for `T`.
    ///
    /// # Panics
    ///
    /// Panics if `T` is not registered.
    pub fn store_mut<T: 'static>(&mut self) -> &mut ComponentStore<T, A> {
        let ty = self.component_type::<T>();
        match self.stores[ty.0 as usize]
            .as_any_mut()
            .downcast_mut::<ComponentStore<T, A>>()
        {
            Some(store) => store,
            None => fail!("store for ordinal {} does not hold {}", ty.0, type_name::<T>()),
        }
    }

    /// The type-erased store for a registered ordinal.
    pub fn erased_store(&self, ty: ComponentType) -> Option<&dyn ErasedStore> {
        self.stores.get(ty.0 as usize).map(|store| store.as_ref())
    }

    /// Remove `entity`'s value from every store that holds one.
    pub fn entity_destroyed(&mut self, entity: Entity) {
        for store in &mut self.stores {
            store.entity_destroyed(entity);
        }
    }

    /// Metadata for a registered ordinal.
    pub fn info(&self, ty: ComponentType) -> Option<&ComponentInfo> {
        self.infos.get(ty.0 as usize)
    }

    /// Number of registered component types.
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    /// Whether no component type is registered yet.
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }
}

impl<A: RawAllocator> fmt::Debug for ComponentRegistry<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("components", &self.infos.iter().map(|i| i.name).collect::<Vec<_>>())
            .field("max_entities", &self.max_entities)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
