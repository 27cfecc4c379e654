//! Headless movement demo: a Movement system integrates Position by
//! Velocity, and entities join or leave it as Velocity comes and goes.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example movement -p lattice-ecs

use std::any::Any;
use std::cell::Cell;
use std::rc::Rc;

use lattice_ecs::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Velocity {
    dx: f32,
    dy: f32,
}

struct Movement;

const STOPPED: EventId = EventId::from_name("movement.stopped");

fn step(ecs: &mut Coordinator, dt: f32) {
    let members = ecs.system_entities::<Movement>().to_vec();
    for e in members {
        let Some(&vel) = ecs.get_component::<Velocity>(e) else {
            continue;
        };
        if let Some(pos) = ecs.get_component_mut::<Position>(e) {
            pos.x += vel.dx * dt;
            pos.y += vel.dy * dt;
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let mut ecs = Coordinator::new(EcsConfig {
        max_entities: 64,
        ..Default::default()
    })?;
    let pos = ecs.register_component::<Position>()?;
    let vel = ecs.register_component::<Velocity>()?;
    ecs.register_system::<Movement>()?;
    ecs.set_system_signature::<Movement>(Signature::EMPTY.with(pos).with(vel))?;

    let stopped = Rc::new(Cell::new(0u32));
    let counter = Rc::clone(&stopped);
    ecs.add_listener(STOPPED, move |payload: &dyn Any| {
        if payload.downcast_ref::<Entity>().is_some() {
            counter.set(counter.get() + 1);
        }
    })?;

    let e = ecs.create_entity()?;
    ecs.add_component(e, Position { x: 0.0, y: 0.0 })?;
    ecs.add_component(e, Velocity { dx: 1.0, dy: 1.0 })?;
    anyhow::ensure!(ecs.system_entities::<Movement>() == [e], "{e} should be moving");

    for _ in 0..10 {
        step(&mut ecs, 0.1);
    }
    println!("after 10 steps: {:?}", ecs.get_component::<Position>(e));

    let saved = ecs.remove_component::<Velocity>(e);
    ecs.send_event(STOPPED, &e);
    anyhow::ensure!(ecs.system_entities::<Movement>().is_empty(), "{e} should be stopped");
    step(&mut ecs, 0.1);
    println!("while stopped:  {:?}", ecs.get_component::<Position>(e));

    ecs.add_component(e, saved)?;
    anyhow::ensure!(ecs.system_entities::<Movement>() == [e], "{e} should move again");
    step(&mut ecs, 0.1);
    println!("resumed:        {:?}", ecs.get_component::<Position>(e));

    ecs.destroy_entity(e);
    println!(
        "destroyed {e}; living = {}, stop events = {}",
        ecs.living_count(),
        stopped.get()
    );
    Ok(())
}
