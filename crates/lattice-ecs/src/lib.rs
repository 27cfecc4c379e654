//! Lattice ECS -- signature-driven Entity Component System.
//!
//! Entities are generational handles drawn from a fixed pool. Each component
//! type lives in its own densely packed sparse-set store; an entity's
//! [`Signature`](signature::Signature) records which stores hold a value for
//! it. Systems declare the signature they require and the
//! [`Coordinator`](coordinator::Coordinator) keeps each system's entity set in
//! step with every component change.
//!
//! # Quick Start
//!
//! ```
//! use lattice_ecs::prelude::*;
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct Position { x: f32, y: f32 }
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct Velocity { dx: f32, dy: f32 }
//!
//! struct Movement;
//!
//! let mut ecs = Coordinator::new(EcsConfig::default()).unwrap();
//! let pos = ecs.register_component::<Position>().unwrap();
//! let vel = ecs.register_component::<Velocity>().unwrap();
//! ecs.register_system::<Movement>().unwrap();
//! ecs.set_system_signature::<Movement>(Signature::EMPTY.with(pos).with(vel)).unwrap();
//!
//! let e = ecs.create_entity().unwrap();
//! ecs.add_component(e, Position { x: 0.0, y: 0.0 }).unwrap();
//! ecs.add_component(e, Velocity { dx: 1.0, dy: 1.0 }).unwrap();
//!
//! assert_eq!(ecs.system_entities::<Movement>(), &[e]);
//! ```

#![deny(unsafe_code)]

/// Log a contract violation, then panic with the same message.
macro_rules! fail {
    ($($arg:tt)+) => {{
        let message = format!($($arg)+);
        ::tracing::error!(%message, "contract violation");
        panic!("{message}")
    }};
}

/// Panic through [`fail!`] unless `cond` holds.
macro_rules! contract {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            fail!($($arg)+);
        }
    };
}

pub mod component;
pub mod config;
pub mod coordinator;
pub mod entity;
pub mod event;
pub mod signature;
pub mod store;
pub mod system;

use lattice_collections::AllocError;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by ECS operations.
///
/// Misuse (stale handles, double registration, a full entity pool) panics
/// instead; these are the failures a correct caller can still hit.
#[derive(Debug, thiserror::Error)]
pub enum EcsError {
    /// A container could not grow.
    #[error(transparent)]
    Alloc(#[from] AllocError),

    /// A configuration document is not valid JSON for [`config::EcsConfig`].
    #[error("malformed configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::component::{ComponentInfo, ComponentRegistry, ComponentType};
    pub use crate::config::EcsConfig;
    pub use crate::coordinator::Coordinator;
    pub use crate::entity::{Entity, EntityManager};
    pub use crate::event::{EventBus, EventId, ListenerId};
    pub use crate::signature::{Signature, MAX_COMPONENTS};
    pub use crate::store::{ComponentStore, DenseSlot, ErasedStore};
    pub use crate::system::{SystemId, SystemRegistry};
    pub use crate::EcsError;
}

// ---------------------------------------------------------------------------
// Integration Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use crate::prelude::*;

    // -- test component types -----------------------------------------------

    #[derive(Debug, Clone, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Velocity {
        dx: f32,
        dy: f32,
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Health(u32);

    struct Movement;
    struct Mortal;

    fn setup(max_entities: usize) -> Coordinator {
        let mut ecs = Coordinator::new(EcsConfig {
            max_entities,
            ..Default::default()
        })
        .unwrap();
        let pos = ecs.register_component::<Position>().unwrap();
        let vel = ecs.register_component::<Velocity>().unwrap();
        let hp = ecs.register_component::<Health>().unwrap();
        ecs.register_system::<Movement>().unwrap();
        ecs.set_system_signature::<Movement>(Signature::EMPTY.with(pos).with(vel))
            .unwrap();
        ecs.register_system::<Mortal>().unwrap();
        ecs.set_system_signature::<Mortal>(Signature::EMPTY.with(hp))
            .unwrap();
        ecs
    }

    // -- membership follows components --------------------------------------

    #[test]
    fn velocity_toggles_movement_membership() {
        let mut ecs = setup(16);
        let e = ecs.create_entity().unwrap();
        ecs.add_component(e, Position { x: 0.0, y: 0.0 }).unwrap();
        ecs.add_component(e, Velocity { dx: 1.0, dy: 1.0 }).unwrap();
        assert_eq!(ecs.system_entities::<Movement>(), &[e]);

        let vel = ecs.remove_component::<Velocity>(e);
        assert_eq!(vel, Velocity { dx: 1.0, dy: 1.0 });
        assert!(ecs.system_entities::<Movement>().is_empty());

        ecs.add_component(e, vel).unwrap();
        assert_eq!(ecs.system_entities::<Movement>(), &[e]);
        assert!(ecs.system_entities::<Mortal>().is_empty());
    }

    #[test]
    fn system_registered_late_picks_up_existing_entities() {
        let mut ecs = Coordinator::default();
        ecs.register_component::<Position>().unwrap();
        ecs.register_component::<Velocity>().unwrap();

        let e = ecs.create_entity().unwrap();
        ecs.add_component(e, Position { x: 0.0, y: 0.0 }).unwrap();
        ecs.add_component(e, Velocity { dx: 1.0, dy: 1.0 }).unwrap();
        let bystander = ecs.create_entity().unwrap();
        ecs.add_component(bystander, Position { x: 9.0, y: 9.0 }).unwrap();

        ecs.register_system::<Movement>().unwrap();
        let sig: Signature = [
            ecs.component_type::<Position>(),
            ecs.component_type::<Velocity>(),
        ]
        .into_iter()
        .collect();
        ecs.set_system_signature::<Movement>(sig).unwrap();

        assert_eq!(ecs.system_entities::<Movement>(), &[e]);
    }

    #[test]
    fn destroy_clears_stores_and_systems() {
        let mut ecs = setup(16);
        let e = ecs.create_entity().unwrap();
        ecs.add_component(e, Position { x: 1.0, y: 2.0 }).unwrap();
        ecs.add_component(e, Velocity { dx: 0.5, dy: 0.5 }).unwrap();
        ecs.add_component(e, Health(10)).unwrap();
        let other = ecs.create_entity().unwrap();
        ecs.add_component(other, Health(3)).unwrap();

        ecs.destroy_entity(e);

        assert!(!ecs.is_alive(e));
        assert_eq!(ecs.get_component::<Position>(e), None);
        assert_eq!(ecs.components().store::<Position>().len(), 0);
        assert_eq!(ecs.components().store::<Health>().len(), 1);
        assert!(ecs.system_entities::<Movement>().is_empty());
        assert_eq!(ecs.system_entities::<Mortal>(), &[other]);
        assert_eq!(ecs.living_count(), 1);
    }

    #[test]
    fn recycled_slot_does_not_inherit_components() {
        let mut ecs = setup(1);
        let old = ecs.create_entity().unwrap();
        ecs.add_component(old, Health(7)).unwrap();
        ecs.destroy_entity(old);

        let new = ecs.create_entity().unwrap();
        assert_eq!(new.index(), old.index());
        assert_ne!(new, old);
        assert!(!ecs.has_component::<Health>(new));
        assert_eq!(ecs.signature(new), Signature::EMPTY);
        assert!(ecs.system_entities::<Mortal>().is_empty());
    }

    // -- capacity -----------------------------------------------------------

    #[test]
    fn sixth_entity_in_pool_of_five_panics() {
        let mut ecs = setup(5);
        for _ in 0..5 {
            ecs.create_entity().unwrap();
        }
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = ecs.create_entity();
        }));
        assert!(result.is_err());
        assert_eq!(ecs.living_count(), 5);
    }

    // -- events -------------------------------------------------------------

    #[test]
    fn events_reach_listeners_through_coordinator() {
        use std::any::Any;
        use std::cell::RefCell;
        use std::rc::Rc;

        const DIED: EventId = EventId::from_name("died");

        let mut ecs = setup(8);
        let dead = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&dead);
        let listener = ecs
            .add_listener(DIED, move |payload: &dyn Any| {
                if let Some(&e) = payload.downcast_ref::<Entity>() {
                    sink.borrow_mut().push(e);
                }
            })
            .unwrap();

        let e = ecs.create_entity().unwrap();
        ecs.add_component(e, Health(0)).unwrap();
        let victims: Vec<Entity> = ecs
            .system_entities::<Mortal>()
            .iter()
            .copied()
            .filter(|&m| ecs.get_component::<Health>(m) == Some(&Health(0)))
            .collect();
        for victim in victims {
            ecs.send_event(DIED, &victim);
            ecs.destroy_entity(victim);
        }
        assert_eq!(*dead.borrow(), vec![e]);

        assert!(ecs.remove_listener(DIED, listener));
        assert_eq!(ecs.send_event(DIED, &e), 0);
    }
}
