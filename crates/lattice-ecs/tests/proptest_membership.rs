//! Property tests for system membership.
//!
//! Random sequences of create / destroy / add / remove are applied to a
//! `Coordinator` and to a plain model of which components each live entity
//! holds. After every step, each system's entity set must equal exactly the
//! live entities whose model components satisfy the system's requirement.

use std::collections::{HashMap, HashSet};

use lattice_ecs::prelude::*;
use proptest::prelude::*;

#[derive(Debug, Clone, PartialEq)]
struct Position(i32);

#[derive(Debug, Clone, PartialEq)]
struct Velocity(i32);

struct Movement;
struct Positioned;

const MAX_ENTITIES: usize = 24;

#[derive(Debug, Clone)]
enum Op {
    Create,
    Destroy(usize),
    AddPosition(usize, i32),
    AddVelocity(usize, i32),
    RemovePosition(usize),
    RemoveVelocity(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => Just(Op::Create),
        2 => any::<usize>().prop_map(Op::Destroy),
        3 => (any::<usize>(), any::<i32>()).prop_map(|(i, v)| Op::AddPosition(i, v)),
        3 => (any::<usize>(), any::<i32>()).prop_map(|(i, v)| Op::AddVelocity(i, v)),
        2 => any::<usize>().prop_map(Op::RemovePosition),
        2 => any::<usize>().prop_map(Op::RemoveVelocity),
    ]
}

#[derive(Debug, Default)]
struct Held {
    position: Option<i32>,
    velocity: Option<i32>,
}

fn setup() -> Coordinator {
    let mut ecs = Coordinator::new(EcsConfig {
        max_entities: MAX_ENTITIES,
        table_buckets: 8,
    })
    .unwrap();
    let pos = ecs.register_component::<Position>().unwrap();
    let vel = ecs.register_component::<Velocity>().unwrap();
    ecs.register_system::<Movement>().unwrap();
    ecs.set_system_signature::<Movement>(Signature::EMPTY.with(pos).with(vel))
        .unwrap();
    ecs.register_system::<Positioned>().unwrap();
    ecs.set_system_signature::<Positioned>(Signature::EMPTY.with(pos))
        .unwrap();
    ecs
}

fn members<S: 'static>(ecs: &Coordinator) -> HashSet<Entity> {
    let slice = ecs.system_entities::<S>();
    let set: HashSet<Entity> = slice.iter().copied().collect();
    assert_eq!(set.len(), slice.len(), "duplicate system member");
    set
}

fn pick(live: &[Entity], i: usize) -> Option<Entity> {
    (!live.is_empty()).then(|| live[i % live.len()])
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn membership_matches_model(ops in prop::collection::vec(op_strategy(), 1..200)) {
        let mut ecs = setup();
        let mut model: HashMap<Entity, Held> = HashMap::new();
        let mut live: Vec<Entity> = Vec::new();
        let mut dead: Vec<Entity> = Vec::new();

        for op in ops {
            match op {
                Op::Create => {
                    if live.len() < MAX_ENTITIES {
                        let e = ecs.create_entity().unwrap();
                        prop_assert!(!model.contains_key(&e));
                        model.insert(e, Held::default());
                        live.push(e);
                    }
                }
                Op::Destroy(i) => {
                    if let Some(e) = pick(&live, i) {
                        ecs.destroy_entity(e);
                        model.remove(&e);
                        live.retain(|&x| x != e);
                        dead.push(e);
                    }
                }
                Op::AddPosition(i, v) => {
                    if let Some(e) = pick(&live, i) {
                        let held = model.get_mut(&e).unwrap();
                        if held.position.is_none() {
                            ecs.add_component(e, Position(v)).unwrap();
                            held.position = Some(v);
                        }
                    }
                }
                Op::AddVelocity(i, v) => {
                    if let Some(e) = pick(&live, i) {
                        let held = model.get_mut(&e).unwrap();
                        if held.velocity.is_none() {
                            ecs.add_component(e, Velocity(v)).unwrap();
                            held.velocity = Some(v);
                        }
                    }
                }
                Op::RemovePosition(i) => {
                    if let Some(e) = pick(&live, i) {
                        let held = model.get_mut(&e).unwrap();
                        if let Some(v) = held.position.take() {
                            prop_assert_eq!(ecs.remove_component::<Position>(e), Position(v));
                        }
                    }
                }
                Op::RemoveVelocity(i) => {
                    if let Some(e) = pick(&live, i) {
                        let held = model.get_mut(&e).unwrap();
                        if let Some(v) = held.velocity.take() {
                            prop_assert_eq!(ecs.remove_component::<Velocity>(e), Velocity(v));
                        }
                    }
                }
            }

            let expected_movement: HashSet<Entity> = model
                .iter()
                .filter(|(_, h)| h.position.is_some() && h.velocity.is_some())
                .map(|(&e, _)| e)
                .collect();
            let expected_positioned: HashSet<Entity> = model
                .iter()
                .filter(|(_, h)| h.position.is_some())
                .map(|(&e, _)| e)
                .collect();
            prop_assert_eq!(members::<Movement>(&ecs), expected_movement);
            prop_assert_eq!(members::<Positioned>(&ecs), expected_positioned);

            for (&e, held) in &model {
                prop_assert_eq!(ecs.get_component::<Position>(e).map(|p| p.0), held.position);
                prop_assert_eq!(ecs.get_component::<Velocity>(e).map(|v| v.0), held.velocity);
            }
            for &e in &dead {
                prop_assert!(!ecs.is_alive(e));
                prop_assert!(!ecs.has_component::<Position>(e));
                prop_assert!(!ecs.has_component::<Velocity>(e));
            }
            prop_assert_eq!(ecs.living_count(), live.len());
        }
    }
}
