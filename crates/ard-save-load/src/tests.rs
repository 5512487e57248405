use ard_ecs::prelude::*;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::prelude::*;

#[derive(Component, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
struct Position {
    x: i32,
    y: i32,
}

#[derive(Component, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[enableable]
struct Health(u32);

#[derive(Component, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[enableable]
struct Name(String);

#[derive(Component, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
struct Secret(u64);

#[derive(Component, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[enableable]
struct Blob([[u64; 32]; 32]);

/// Points at another entity.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
struct Target(Entity);

impl SaveLoad for Target {
    type Intermediate = Option<MappedEntity>;

    fn save(&self, ctx: &SaveContext) -> Self::Intermediate {
        ctx.entity_map.to_map(self.0)
    }

    fn load(ctx: &LoadContext, intermediate: Self::Intermediate) -> Self {
        Target(
            intermediate
                .and_then(|mapped| ctx.entity_map.from_map(mapped))
                .unwrap_or_default(),
        )
    }
}

fn small_chunks() -> WorldConfig {
    WorldConfig {
        chunk_bytes: 64,
        validate_on_mutation: true,
    }
}

fn saver<F: SaveFormat + 'static>() -> Saver<F> {
    Saver::default()
        .include::<Position>()
        .include::<Health>()
        .include::<Name>()
        .include::<Target>()
}

fn loader<F: SaveFormat + 'static>() -> Loader<F> {
    Loader::default()
        .include::<Position>()
        .include::<Health>()
        .include::<Name>()
        .include::<Target>()
}

/// Entities in the order the saver numbers them.
fn storage_order(world: &World) -> Vec<Entity> {
    world
        .archetypes()
        .archetypes()
        .iter()
        .flat_map(|archetype| archetype.chunks())
        .flat_map(|chunk| chunk.entities().iter().copied())
        .collect()
}

/// Two archetypes, two groups and a mix of disabled components.
fn populated_world() -> World {
    let mut world = World::with_config(small_chunks());

    let soldiers = world.spawn_batch((
        (0..10).map(|i| Position { x: i, y: -i }).collect::<Vec<_>>(),
        (0..10).map(|i| Health(100 + i as u32)).collect::<Vec<_>>(),
    ));
    let named = world.spawn_batch_in_group(
        (
            (0..6).map(|i| Health(i)).collect::<Vec<_>>(),
            (0..6).map(|i| Name(format!("npc {i}"))).collect::<Vec<_>>(),
        ),
        ChunkGroup(7),
    );

    for (i, entity) in soldiers.iter().enumerate() {
        if i % 3 == 0 {
            world.set_enabled::<Health>(*entity, false).unwrap();
        }
    }
    for (i, entity) in named.iter().enumerate() {
        if i % 2 == 1 {
            world.set_enabled::<Name>(*entity, false).unwrap();
        }
    }

    world
}

fn assert_same_entity(src: &World, src_entity: Entity, dst: &World, dst_entity: Entity) {
    assert_eq!(
        src.get::<Position>(src_entity).ok(),
        dst.get::<Position>(dst_entity).ok()
    );
    assert_eq!(
        src.get::<Health>(src_entity).ok(),
        dst.get::<Health>(dst_entity).ok()
    );
    assert_eq!(
        src.get::<Name>(src_entity).ok(),
        dst.get::<Name>(dst_entity).ok()
    );
    assert_eq!(
        src.is_enabled::<Health>(src_entity).ok(),
        dst.is_enabled::<Health>(dst_entity).ok()
    );
    assert_eq!(
        src.is_enabled::<Name>(src_entity).ok(),
        dst.is_enabled::<Name>(dst_entity).ok()
    );
    assert_eq!(
        src.group_of(src_entity).unwrap(),
        dst.group_of(dst_entity).unwrap()
    );
}

#[test]
fn round_trip_keeps_values_bits_and_groups() {
    let src = populated_world();
    let bytes = saver::<Bincode>()
        .save(&src)
        .unwrap()
        .to_bytes::<Bincode>()
        .unwrap();

    let mut dst = World::default();
    let data = SaveData::from_bytes::<Bincode>(&bytes).unwrap();
    let map = loader::<Bincode>().load(data, &mut dst).unwrap();

    assert_eq!(dst.len(), src.len());
    assert_eq!(map.len(), src.len());
    for (i, src_entity) in storage_order(&src).into_iter().enumerate() {
        let dst_entity = map.from_map(MappedEntity(i as u32)).unwrap();
        assert_same_entity(&src, src_entity, &dst, dst_entity);
    }
    dst.check_consistency().unwrap();
}

#[test]
fn saving_a_loaded_world_is_idempotent() {
    fn check<F: SaveFormat + 'static>() {
        let src = populated_world();
        let first = saver::<F>().save(&src).unwrap().to_bytes::<F>().unwrap();

        let mut dst = World::with_config(small_chunks());
        loader::<F>()
            .load(SaveData::from_bytes::<F>(&first).unwrap(), &mut dst)
            .unwrap();
        let second = saver::<F>().save(&dst).unwrap().to_bytes::<F>().unwrap();

        assert_eq!(first, second);
    }

    check::<Bincode>();
    check::<Ron>();
}

#[test]
fn saves_after_destroys_reach_a_fixed_point() {
    let mut src = populated_world();
    let mut rng = StdRng::seed_from_u64(0x5a7e);
    let entities = storage_order(&src);
    for entity in entities {
        if rng.gen_bool(0.4) {
            src.destroy(entity).unwrap();
        }
    }

    let first = saver::<Bincode>().save(&src).unwrap();

    let mut once = World::with_config(small_chunks());
    let map = loader::<Bincode>().load(first.clone(), &mut once).unwrap();
    for (i, src_entity) in storage_order(&src).into_iter().enumerate() {
        let dst_entity = map.from_map(MappedEntity(i as u32)).unwrap();
        assert_same_entity(&src, src_entity, &once, dst_entity);
    }

    let second = saver::<Bincode>().save(&once).unwrap();
    assert_eq!(first, second);
    once.check_consistency().unwrap();
}

#[test]
fn reloading_keeps_partially_filled_chunks() {
    let mut src = World::default();
    let entities = src.spawn_batch(((0..256).map(Health).collect::<Vec<_>>(),));
    src.set_enabled::<Health>(entities[200], false).unwrap();
    src.destroy(entities[3]).unwrap();

    let chunk_lens = |world: &World| -> Vec<usize> {
        world.archetypes().archetypes()[0]
            .chunks()
            .iter()
            .map(|chunk| chunk.len())
            .collect()
    };
    assert_eq!(chunk_lens(&src), vec![127, 128]);

    let first = saver::<Bincode>()
        .save(&src)
        .unwrap()
        .to_bytes::<Bincode>()
        .unwrap();
    let mut dst = World::default();
    loader::<Bincode>()
        .load(SaveData::from_bytes::<Bincode>(&first).unwrap(), &mut dst)
        .unwrap();
    let second = saver::<Bincode>()
        .save(&dst)
        .unwrap()
        .to_bytes::<Bincode>()
        .unwrap();

    assert_eq!(chunk_lens(&dst), vec![127, 128]);
    assert_eq!(first, second);
    dst.check_consistency().unwrap();
}

#[test]
fn reconstruction_ignores_chunk_capacity() {
    let blob = |seed: u64| Blob([[seed; 32]; 32]);

    // One entity per chunk on the saving side, several on the loading side.
    let mut src = World::with_config(WorldConfig {
        chunk_bytes: 4096,
        validate_on_mutation: true,
    });
    let entities = src.spawn_batch(((0..9).map(blob).collect::<Vec<_>>(),));
    assert_eq!(src.archetypes().archetypes()[0].chunk_capacity(), 1);
    for entity in entities.iter().step_by(2) {
        src.set_enabled::<Blob>(*entity, false).unwrap();
    }

    let saver = Saver::<Bincode>::default().include::<Blob>();
    let loader = Loader::<Bincode>::default().include::<Blob>();

    let mut dst = World::with_config(WorldConfig {
        chunk_bytes: 64 * 1024,
        validate_on_mutation: true,
    });
    let map = loader.load(saver.save(&src).unwrap(), &mut dst).unwrap();

    for (i, src_entity) in storage_order(&src).into_iter().enumerate() {
        let dst_entity = map.from_map(MappedEntity(i as u32)).unwrap();
        assert_eq!(
            src.get::<Blob>(src_entity).unwrap(),
            dst.get::<Blob>(dst_entity).unwrap()
        );
        assert_eq!(
            src.is_enabled::<Blob>(src_entity).unwrap(),
            dst.is_enabled::<Blob>(dst_entity).unwrap()
        );
    }

    // Saved chunks are never merged.
    assert_eq!(dst.archetypes().archetypes()[0].chunks().len(), 9);

    // Packed chunks split back into single-entity chunks.
    let mut packed = World::with_config(dst.config().clone());
    let entities = packed.spawn_batch(((0..9).map(blob).collect::<Vec<_>>(),));
    for entity in entities.iter().skip(1).step_by(2) {
        packed.set_enabled::<Blob>(*entity, false).unwrap();
    }
    assert_eq!(packed.archetypes().archetypes()[0].chunks().len(), 2);

    let mut back = World::with_config(src.config().clone());
    let map = loader.load(saver.save(&packed).unwrap(), &mut back).unwrap();
    assert_eq!(back.archetypes().archetypes()[0].chunks().len(), 9);
    for (i, packed_entity) in storage_order(&packed).into_iter().enumerate() {
        let back_entity = map.from_map(MappedEntity(i as u32)).unwrap();
        assert_eq!(
            packed.get::<Blob>(packed_entity).unwrap(),
            back.get::<Blob>(back_entity).unwrap()
        );
        assert_eq!(
            packed.is_enabled::<Blob>(packed_entity).unwrap(),
            back.is_enabled::<Blob>(back_entity).unwrap()
        );
    }
    let disabled = map
        .iter()
        .filter(|(_, entity)| !back.is_enabled::<Blob>(*entity).unwrap())
        .count();
    assert_eq!(disabled, 4);
    back.check_consistency().unwrap();
}

#[test]
fn entity_references_are_remapped() {
    let mut src = World::default();
    let targets = src.spawn_batch(((0..3).map(|i| Position { x: i, y: i }).collect::<Vec<_>>(),));
    let pointers = src.spawn_batch((targets.iter().map(|e| Target(*e)).collect::<Vec<_>>(),));

    let mut dst = World::default();
    dst.spawn_batch(((0..5).map(|i| Health(i)).collect::<Vec<_>>(),));
    let map = loader::<Ron>()
        .load(saver::<Ron>().save(&src).unwrap(), &mut dst)
        .unwrap();

    let order = storage_order(&src);
    let to_dst = |entity: Entity| {
        let i = order.iter().position(|e| *e == entity).unwrap();
        map.from_map(MappedEntity(i as u32)).unwrap()
    };

    for (pointer, target) in pointers.iter().zip(&targets) {
        let loaded = dst.get::<Target>(to_dst(*pointer)).unwrap();
        assert_eq!(loaded.0, to_dst(*target));
        assert_eq!(
            dst.get::<Position>(loaded.0).unwrap(),
            src.get::<Position>(*target).unwrap()
        );
    }
}

#[test]
fn components_without_a_saver_are_skipped() {
    let mut src = World::default();
    src.spawn_batch((
        vec![Position { x: 1, y: 2 }; 4],
        vec![Secret(0xdead); 4],
    ));

    for saver in [saver::<Bincode>(), saver::<Bincode>().ignore::<Secret>()] {
        let data = saver.save(&src).unwrap();
        assert_eq!(data.entity_count, 4);
        assert_eq!(data.archetypes.len(), 1);
        assert_eq!(data.archetypes[0].components, vec!["Position".to_owned()]);

        let mut dst = World::default();
        let map = loader::<Bincode>().load(data, &mut dst).unwrap();
        for (_, entity) in map.iter() {
            assert_eq!(
                *dst.get::<Position>(entity).unwrap(),
                Position { x: 1, y: 2 }
            );
            assert!(!dst.has_component::<Secret>(entity).unwrap());
        }
    }
}

#[test]
fn unknown_component_fails_and_cleans_up() {
    let mut src = World::default();
    src.spawn_batch((vec![Position { x: 0, y: 0 }; 2], vec![Secret(1); 2]));
    let data = saver::<Bincode>().include::<Secret>().save(&src).unwrap();

    let mut dst = World::default();
    let err = loader::<Bincode>().load(data, &mut dst).unwrap_err();
    assert!(matches!(err, SaveLoadError::UnknownComponent(name) if name == "Secret"));
    assert!(dst.is_empty());
    dst.check_consistency().unwrap();
}

#[test]
fn damaged_saves_are_rejected() {
    let src = populated_world();
    let data = saver::<Bincode>().save(&src).unwrap();

    let mut truncated = data.clone();
    truncated.archetypes[0].chunks[0].enable[0].words.clear();
    let mut dst = World::default();
    let err = loader::<Bincode>().load(truncated, &mut dst).unwrap_err();
    assert!(matches!(
        err,
        SaveLoadError::Ecs(EcsError::ShortWordStream { needed: 1, available: 0 })
    ));
    assert!(dst.is_empty());

    let mut short_run = data.clone();
    short_run.archetypes[0].chunks[0].enable[0].bit_count -= 1;
    let err = loader::<Bincode>()
        .load(short_run, &mut World::default())
        .unwrap_err();
    assert!(matches!(err, SaveLoadError::EnableRunLength { .. }));

    let mut short_buffer = data.clone();
    short_buffer.archetypes[0].chunks[0].buffers[0].raw =
        Bincode::serialize(&Vec::<Health>::new()).unwrap();
    let err = loader::<Bincode>()
        .load(short_buffer, &mut World::default())
        .unwrap_err();
    assert!(matches!(err, SaveLoadError::BufferLength { expected: 3, found: 0, .. }));

    assert!(matches!(
        SaveData::from_bytes::<Bincode>(&[1, 2, 3]),
        Err(SaveLoadError::Bincode(_))
    ));
    assert!(matches!(
        SaveData::from_bytes::<Ron>(b"(entity_count: "),
        Err(SaveLoadError::RonDeserialize(_))
    ));
}

#[test]
fn load_into_existing_entities() {
    let src = populated_world();
    let data = saver::<Bincode>().save(&src).unwrap();

    let mut dst = World::default();
    let existing = dst.spawn_batch((vec![Secret(9); data.entity_count],));

    let err = loader::<Bincode>()
        .load_into(data.clone(), &mut dst, &existing[1..])
        .unwrap_err();
    assert!(matches!(err, SaveLoadError::EntityCount { .. }));

    let map = loader::<Bincode>()
        .load_into(data, &mut dst, &existing)
        .unwrap();
    assert_eq!(dst.len(), existing.len());
    for (i, src_entity) in storage_order(&src).into_iter().enumerate() {
        let dst_entity = map.from_map(MappedEntity(i as u32)).unwrap();
        assert_eq!(dst_entity, existing[i]);
        assert!(!dst.has_component::<Secret>(dst_entity).unwrap());
        assert_same_entity(&src, src_entity, &dst, dst_entity);
    }
}
