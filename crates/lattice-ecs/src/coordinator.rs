//! The [`Coordinator`]: one owner for entities, component stores, systems and
//! events.
//!
//! Every mutating operation follows the same sequence:
//!
//! 1. mutate the store or the entity manager,
//! 2. recompute the entity's signature and persist it,
//! 3. propagate the new signature to the system registry.
//!
//! If step 3 fails to allocate, steps 1 and 2 are undone before the error is
//! returned, so system membership always matches the persisted signatures.

use std::any::{type_name, Any};

use lattice_collections::{RawAllocator, SystemAllocator};
use tracing::{debug, info};

use crate::component::{ComponentRegistry, ComponentType};
use crate::config::EcsConfig;
use crate::entity::{Entity, EntityManager};
use crate::event::{EventBus, EventId, ListenerId};
use crate::signature::Signature;
use crate::system::{SystemId, SystemRegistry};
use crate::EcsError;

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

/// Facade over the entity manager, component registry, system registry and
/// event bus of one ECS instance.
///
/// Every store, index table and member set grows through `A`.
#[derive(Debug)]
pub struct Coordinator<A: RawAllocator + Clone + 'static = SystemAllocator> {
    config: EcsConfig,
    entities: EntityManager,
    components: ComponentRegistry<A>,
    systems: SystemRegistry<A>,
    events: EventBus<A>,
}

impl Coordinator {
    /// Build an empty ECS sized by `config`.
    pub fn new(config: EcsConfig) -> Result<Self, EcsError> {
        Self::new_in(config, SystemAllocator)
    }
}

impl<A: RawAllocator + Clone + 'static> Coordinator<A> {
    /// Build an empty ECS sized by `config` whose containers allocate
    /// through `alloc`.
    pub fn new_in(config: EcsConfig, alloc: A) -> Result<Self, EcsError> {
        config.validate()?;
        Ok(Self::build(config, alloc))
    }

    fn build(config: EcsConfig, alloc: A) -> Self {
        info!(
            max_entities = config.max_entities,
            table_buckets = config.table_buckets,
            "coordinator created"
        );
        Self {
            config,
            entities: EntityManager::new(config.max_entities),
            components: ComponentRegistry::new_in(
                config.max_entities,
                config.table_buckets,
                alloc.clone(),
            ),
            systems: SystemRegistry::new_in(config.table_buckets, alloc.clone()),
            events: EventBus::new_in(alloc),
        }
    }

    // -- entities -----------------------------------------------------------

    /// Create an entity with an empty signature.
    ///
    /// Systems whose required signature is empty pick it up immediately.
    ///
    /// # Panics
    ///
    /// Panics if the entity pool is exhausted.
    pub fn create_entity(&mut self) -> Result<Entity, EcsError> {
        let entity = self.entities.create_entity();
        if let Err(err) = self.systems.entity_signature_changed(entity, Signature::EMPTY) {
            self.systems.entity_destroyed(entity);
            self.entities.destroy_entity(entity);
            return Err(err.into());
        }
        Ok(entity)
    }

    /// Destroy `entity`, dropping all its components and removing it from
    /// every system.
    ///
    /// # Panics
    ///
    /// Panics if `entity` is not alive.
    pub fn destroy_entity(&mut self, entity: Entity) {
        self.entities.destroy_entity(entity);
        self.components.entity_destroyed(entity);
        self.systems.entity_destroyed(entity);
    }

    /// Whether `entity` is live. A handle from before its slot was recycled
    /// is not.
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity)
    }

    /// Number of live entities.
    pub fn living_count(&self) -> usize {
        self.entities.living_count()
    }

    /// `entity`'s current signature.
    ///
    /// # Panics
    ///
    /// Panics if `entity` is not alive.
    pub fn signature(&self, entity: Entity) -> Signature {
        self.entities.signature(entity)
    }

    // -- components ---------------------------------------------------------

    /// Register component type `T`.
    ///
    /// # Panics
    ///
    /// Panics if `T` is already registered or the component limit is reached.
    pub fn register_component<T: 'static>(&mut self) -> Result<ComponentType, EcsError> {
        Ok(self.components.register::<T>()?)
    }

    /// The ordinal of `T`.
    ///
    /// # Panics
    ///
    /// Panics if `T` is not registered.
    pub fn component_type<T: 'static>(&self) -> ComponentType {
        self.components.component_type::<T>()
    }

    /// Attach `value` to `entity` and update system membership.
    ///
    /// On error nothing changes and `value` is dropped.
    ///
    /// # Panics
    ///
    /// Panics if `entity` is not alive, `T` is not registered, or `entity`
    /// already has a `T`.
    pub fn add_component<T: 'static>(&mut self, entity: Entity, value: T) -> Result<(), EcsError> {
        let old = self.entities.signature(entity);
        let ty = self.components.component_type::<T>();

        self.components.store_mut::<T>().add(entity, value)?;
        let new = old.with(ty);
        self.entities.set_signature(entity, new);

        if let Err(err) = self.systems.entity_signature_changed(entity, new) {
            debug!(
                %entity,
                component = type_name::<T>(),
                "rolling back component add after failed propagation"
            );
            drop(self.components.store_mut::<T>().remove(entity));
            self.entities.set_signature(entity, old);
            self.systems.entity_signature_narrowed(entity, old);
            return Err(err.into());
        }
        Ok(())
    }

    /// Detach and return `entity`'s `T`, updating system membership.
    ///
    /// # Panics
    ///
    /// Panics if `entity` is not alive, `T` is not registered, or `entity`
    /// has no `T`.
    pub fn remove_component<T: 'static>(&mut self, entity: Entity) -> T {
        let old = self.entities.signature(entity);
        let ty = self.components.component_type::<T>();

        let value = self.components.store_mut::<T>().remove(entity);
        let new = old.without(ty);
        self.entities.set_signature(entity, new);
        self.systems.entity_signature_narrowed(entity, new);
        value
    }

    /// `entity`'s `T`, if it has one.
    ///
    /// # Panics
    ///
    /// Panics if `T` is not registered.
    pub fn get_component<T: 'static>(&self, entity: Entity) -> Option<&T> {
        self.components.store::<T>().get(entity)
    }

    /// Mutable access to `entity`'s `T`, if it has one.
    ///
    /// # Panics
    ///
    /// Panics if `T` is not registered.
    pub fn get_component_mut<T: 'static>(&mut self, entity: Entity) -> Option<&mut T> {
        self.components.store_mut::<T>().get_mut(entity)
    }

    /// Whether `entity` has a `T`.
    ///
    /// # Panics
    ///
    /// Panics if `T` is not registered.
    pub fn has_component<T: 'static>(&self, entity: Entity) -> bool {
        self.components.store::<T>().contains(entity)
    }

    // -- systems ------------------------------------------------------------

    /// Register system type `S`. It matches nothing until its signature is
    /// set with [`set_system_signature`](Self::set_system_signature).
    ///
    /// # Panics
    ///
    /// Panics if `S` is already registered.
    pub fn register_system<S: 'static>(&mut self) -> Result<SystemId, EcsError> {
        Ok(self.systems.register::<S>()?)
    }

    /// Fix the signature `S` requires and enrol every live entity that
    /// already satisfies it.
    ///
    /// On error the signature is left unset.
    ///
    /// # Panics
    ///
    /// Panics if `S` is not registered or its signature was already set.
    pub fn set_system_signature<S: 'static>(&mut self, required: Signature) -> Result<(), EcsError> {
        let id = self.systems.id_of::<S>();
        self.systems.set_signature(id, required);
        for (entity, signature) in self.entities.living() {
            if let Err(err) = self.systems.refresh(id, entity, signature) {
                self.systems.abandon_signature(id);
                return Err(err.into());
            }
        }
        debug!(
            system = type_name::<S>(),
            members = self.systems.entities_by_id(id).len(),
            "system populated"
        );
        Ok(())
    }

    /// Entities currently matching `S`, in no particular order.
    ///
    /// # Panics
    ///
    /// Panics if `S` is not registered.
    pub fn system_entities<S: 'static>(&self) -> &[Entity] {
        self.systems.entities::<S>()
    }

    // -- events -------------------------------------------------------------

    /// See [`EventBus::add_listener`].
    pub fn add_listener<F>(&mut self, event: EventId, handler: F) -> Result<ListenerId, EcsError>
    where
        F: FnMut(&dyn Any) + 'static,
    {
        Ok(self.events.add_listener(event, handler)?)
    }

    /// See [`EventBus::remove_listener`].
    pub fn remove_listener(&mut self, event: EventId, listener: ListenerId) -> bool {
        self.events.remove_listener(event, listener)
    }

    /// See [`EventBus::send_event`].
    pub fn send_event(&mut self, event: EventId, payload: &dyn Any) -> usize {
        self.events.send_event(event, payload)
    }

    // -- accessors ----------------------------------------------------------

    /// The configuration this coordinator was built with.
    pub fn config(&self) -> &EcsConfig {
        &self.config
    }

    /// Read access to the entity pool.
    pub fn entities(&self) -> &EntityManager {
        &self.entities
    }

    /// Read access to component types and their stores.
    pub fn components(&self) -> &ComponentRegistry<A> {
        &self.components
    }

    /// Read access to systems and their member sets.
    pub fn systems(&self) -> &SystemRegistry<A> {
        &self.systems
    }

    /// Read access to the event bus.
    pub fn events(&self) -> &EventBus<A> {
        &self.events
    }

    /// The event bus itself, for callers that manage listeners directly.
    pub fn events_mut(&mut self) -> &mut EventBus<A> {
        &mut self.events
    }
}

impl Default for Coordinator {
    /// A coordinator built from [`EcsConfig::default`].
    fn default() -> Self {
        Self::build(EcsConfig::default(), SystemAllocator)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_collections::BudgetAllocator;

    #[derive(Debug, Clone, PartialEq)]
    struct Tag(&'static str);

    #[derive(Debug, Clone, PartialEq)]
    struct Mass(f32);

    struct Everything;
    struct Heavy;
    struct Labelled;

    fn budgeted() -> (Coordinator<BudgetAllocator>, BudgetAllocator) {
        let budget = BudgetAllocator::new(usize::MAX);
        let config = EcsConfig {
            max_entities: 16,
            table_buckets: 8,
        };
        let ecs = Coordinator::new_in(config, budget.clone()).unwrap();
        (ecs, budget)
    }

    /// Allow nothing beyond what is already allocated.
    fn freeze(budget: &BudgetAllocator) {
        budget.set_limit(budget.in_use());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let err = Coordinator::new(EcsConfig {
            max_entities: 0,
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, EcsError::InvalidConfig(_)));
    }

    #[test]
    fn empty_requirement_tracks_every_live_entity() {
        let mut ecs = Coordinator::default();
        let before = ecs.create_entity().unwrap();
        ecs.register_system::<Everything>().unwrap();
        ecs.set_system_signature::<Everything>(Signature::EMPTY).unwrap();
        let after = ecs.create_entity().unwrap();

        let mut members = ecs.system_entities::<Everything>().to_vec();
        members.sort_by_key(|e| e.index());
        assert_eq!(members, vec![before, after]);

        ecs.destroy_entity(before);
        assert_eq!(ecs.system_entities::<Everything>(), &[after]);
    }

    #[test]
    fn signature_tracks_components() {
        let mut ecs = Coordinator::default();
        let tag = ecs.register_component::<Tag>().unwrap();
        let mass = ecs.register_component::<Mass>().unwrap();
        let e = ecs.create_entity().unwrap();

        ecs.add_component(e, Tag("crate")).unwrap();
        ecs.add_component(e, Mass(3.0)).unwrap();
        assert_eq!(ecs.signature(e), Signature::EMPTY.with(tag).with(mass));

        ecs.remove_component::<Tag>(e);
        assert_eq!(ecs.signature(e), Signature::EMPTY.with(mass));
        assert!(!ecs.has_component::<Tag>(e));
        assert!(ecs.has_component::<Mass>(e));
    }

    #[test]
    fn get_component_mut_persists() {
        let mut ecs = Coordinator::default();
        ecs.register_component::<Mass>().unwrap();
        let e = ecs.create_entity().unwrap();
        ecs.add_component(e, Mass(1.0)).unwrap();
        ecs.get_component_mut::<Mass>(e).unwrap().0 = 8.0;
        assert_eq!(ecs.get_component::<Mass>(e), Some(&Mass(8.0)));
    }

    #[test]
    fn removal_relocation_keeps_other_entities_intact() {
        let mut ecs = Coordinator::default();
        let mass = ecs.register_component::<Mass>().unwrap();
        ecs.register_system::<Heavy>().unwrap();
        ecs.set_system_signature::<Heavy>(Signature::EMPTY.with(mass))
            .unwrap();

        let entities: Vec<Entity> = (0..6).map(|_| ecs.create_entity().unwrap()).collect();
        for (i, &e) in entities.iter().enumerate() {
            ecs.add_component(e, Mass(i as f32)).unwrap();
        }
        ecs.remove_component::<Mass>(entities[0]);
        ecs.destroy_entity(entities[3]);

        for (i, &e) in entities.iter().enumerate() {
            let expected = match i {
                0 | 3 => None,
                _ => Some(Mass(i as f32)),
            };
            assert_eq!(ecs.get_component::<Mass>(e).cloned(), expected, "entity {e}");
        }
        assert_eq!(ecs.system_entities::<Heavy>().len(), 4);
        for &member in ecs.system_entities::<Heavy>() {
            assert!(ecs.signature(member).contains(mass));
        }
    }

    #[test]
    #[should_panic(expected = "not alive")]
    fn add_to_destroyed_entity_panics() {
        let mut ecs = Coordinator::default();
        ecs.register_component::<Mass>().unwrap();
        let e = ecs.create_entity().unwrap();
        ecs.destroy_entity(e);
        let _ = ecs.add_component(e, Mass(1.0));
    }

    #[test]
    #[should_panic(expected = "before registration")]
    fn unregistered_component_panics() {
        let mut ecs = Coordinator::default();
        let e = ecs.create_entity().unwrap();
        let _ = ecs.add_component(e, Tag("x"));
    }

    #[test]
    #[should_panic(expected = "no")]
    fn removing_absent_component_panics() {
        let mut ecs = Coordinator::default();
        ecs.register_component::<Mass>().unwrap();
        let e = ecs.create_entity().unwrap();
        ecs.remove_component::<Mass>(e);
    }

    #[test]
    fn events_mut_exposes_bus() {
        let mut ecs = Coordinator::default();
        let id = EventId::from_name("ping");
        ecs.events_mut().add_listener(id, |_: &dyn Any| {}).unwrap();
        assert_eq!(ecs.events().listener_count(id), 1);
        assert_eq!(ecs.send_event(id, &()), 1);
    }

    // -- allocation failure -------------------------------------------------

    #[test]
    fn refused_propagation_rolls_back_add_component() {
        let (mut ecs, budget) = budgeted();
        let tag = ecs.register_component::<Tag>().unwrap();
        let mass = ecs.register_component::<Mass>().unwrap();
        ecs.register_system::<Heavy>().unwrap();
        ecs.set_system_signature::<Heavy>(Signature::EMPTY.with(mass))
            .unwrap();
        ecs.register_system::<Labelled>().unwrap();
        ecs.set_system_signature::<Labelled>(Signature::EMPTY.with(tag).with(mass))
            .unwrap();

        let a = ecs.create_entity().unwrap();
        let b = ecs.create_entity().unwrap();
        ecs.add_component(b, Mass(1.0)).unwrap();
        ecs.add_component(a, Tag("a")).unwrap();

        // Both stores and Heavy's member set have room; Labelled's member set
        // has never allocated and is refused.
        freeze(&budget);
        let err = ecs.add_component(a, Mass(2.0)).unwrap_err();
        assert!(matches!(err, EcsError::Alloc(_)), "got {err:?}");
        assert_eq!(budget.refusals(), 1);

        assert_eq!(ecs.signature(a), Signature::EMPTY.with(tag));
        assert!(!ecs.has_component::<Mass>(a));
        assert_eq!(ecs.components().store::<Mass>().len(), 1);
        assert_eq!(ecs.get_component::<Mass>(b), Some(&Mass(1.0)));
        assert_eq!(ecs.system_entities::<Heavy>(), &[b]);
        assert!(ecs.system_entities::<Labelled>().is_empty());

        budget.set_limit(usize::MAX);
        ecs.add_component(a, Mass(2.0)).unwrap();
        assert_eq!(ecs.system_entities::<Labelled>(), &[a]);
        assert_eq!(ecs.system_entities::<Heavy>().len(), 2);
    }

    #[test]
    fn refused_propagation_rolls_back_create_entity() {
        let (mut ecs, budget) = budgeted();
        ecs.register_system::<Everything>().unwrap();
        ecs.set_system_signature::<Everything>(Signature::EMPTY).unwrap();

        freeze(&budget);
        let err = ecs.create_entity().unwrap_err();
        assert!(matches!(err, EcsError::Alloc(_)), "got {err:?}");
        assert_eq!(ecs.living_count(), 0);
        assert!(ecs.system_entities::<Everything>().is_empty());

        budget.set_limit(usize::MAX);
        let e = ecs.create_entity().unwrap();
        assert_eq!(ecs.living_count(), 1);
        assert_eq!(e.index(), 0);
        assert_eq!(e.generation(), 1);
        assert_eq!(ecs.system_entities::<Everything>(), &[e]);
    }

    #[test]
    fn refused_backfill_leaves_signature_unset() {
        let (mut ecs, budget) = budgeted();
        let mass = ecs.register_component::<Mass>().unwrap();
        let e = ecs.create_entity().unwrap();
        ecs.add_component(e, Mass(4.0)).unwrap();
        let id = ecs.register_system::<Heavy>().unwrap();

        freeze(&budget);
        let required = Signature::EMPTY.with(mass);
        let err = ecs.set_system_signature::<Heavy>(required).unwrap_err();
        assert!(matches!(err, EcsError::Alloc(_)), "got {err:?}");
        assert_eq!(ecs.systems().required_signature(id), None);
        assert!(ecs.system_entities::<Heavy>().is_empty());

        budget.set_limit(usize::MAX);
        ecs.set_system_signature::<Heavy>(required).unwrap();
        assert_eq!(ecs.systems().required_signature(id), Some(required));
        assert_eq!(ecs.system_entities::<Heavy>(), &[e]);
    }
}
