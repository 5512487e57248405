use ard_ecs::prelude::*;

// Components

#[derive(Component, Debug, Clone, Copy)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Component, Debug, Clone, Copy)]
#[enableable]
struct Velocity {
    x: f32,
    y: f32,
}

fn main() {
    let mut world = World::default();

    let entities = world.spawn_batch((
        (0..8)
            .map(|i| Position {
                x: i as f32,
                y: 0.0,
            })
            .collect::<Vec<_>>(),
        vec![Velocity { x: 1.0, y: 2.0 }; 8],
    ));

    // Frozen entities keep their velocity but stop moving.
    for entity in entities.iter().step_by(3) {
        world.set_enabled::<Velocity>(*entity, false).unwrap();
    }

    let mut moving = Query::new(
        &mut world,
        QueryDesc::new().all::<Position>().all::<Velocity>(),
    );

    let delta = 0.5;
    moving.for_each_batch_mut(&mut world, |mut batch| {
        let velocities = batch.get::<Velocity>().unwrap().to_vec();
        let positions = batch.get_mut::<Position>().unwrap();
        for (pos, vel) in positions.iter_mut().zip(&velocities) {
            pos.x += vel.x * delta;
            pos.y += vel.y * delta;
        }
    });

    // Structural changes can be queued from anywhere and applied at a sync point.
    let commands = world.commands().clone();
    commands.set_enabled::<Velocity>(entities[0], true);
    commands.destroy(&entities[7..]);
    for err in world.process_commands() {
        println!("Command failed: {err}");
    }

    for entity in &entities[..7] {
        let pos = world.get::<Position>(*entity).unwrap();
        println!(
            "{entity:?}: ({}, {}) moving: {}",
            pos.x,
            pos.y,
            world.is_enabled::<Velocity>(*entity).unwrap()
        );
    }
}
