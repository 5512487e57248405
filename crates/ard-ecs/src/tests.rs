use std::collections::HashMap;

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    archetype::enable::{words_for, WordCursor},
    bits::MASK_BITS,
    component::column::{AnyColumn, Column},
    key::TypeKey,
    prelude::*,
    query::{mask::compose_mask, MatchingArchetype},
};

#[derive(Component, Debug, Default, Copy, Clone, PartialEq, Eq)]
struct ComponentA {
    x: u32,
    y: u32,
}

#[derive(Component, Debug, Default, Copy, Clone, PartialEq, Eq)]
#[enableable]
struct Health(u32);

#[derive(Component, Debug, Default, Copy, Clone, PartialEq, Eq)]
#[enableable]
struct Shield(u32);

#[derive(Component, Debug, Clone)]
struct Blob([u8; 20_000]);

/// Chunks of four to five entities for the small components above.
fn small_chunks() -> WorldConfig {
    WorldConfig {
        chunk_bytes: 64,
        validate_on_mutation: true,
    }
}

fn health_pack(values: impl IntoIterator<Item = u32>) -> (Vec<Health>,) {
    (values.into_iter().map(Health).collect(),)
}

#[test]
fn trailing_zeros_across_halves() {
    let mut mask = Mask128::ZERO;
    assert_eq!(mask.trailing_zeros(), 128);

    mask.set_bit(63, true);
    assert_eq!(mask.trailing_zeros(), 63);

    let mut mask = Mask128::ZERO;
    mask.set_bit(64, true);
    assert_eq!(mask.trailing_zeros(), 64);

    mask.set_bit(127, true);
    assert_eq!(mask.trailing_zeros(), 64);
    assert_eq!(Mask128::new(1, 0).trailing_zeros(), 0);
}

#[test]
fn shift_right_all_ones() {
    assert_eq!(Mask128::ONES.shift_right(0), Mask128::ONES);
    assert_eq!(Mask128::ONES.shift_right(128), Mask128::ZERO);
    assert_eq!(Mask128::ONES.shift_right(500), Mask128::ZERO);

    for n in 0..=128u32 {
        let shifted = Mask128::ONES.shift_right(n);
        assert_eq!(shifted.count_ones(), 128 - n);
        assert_eq!(shifted, Mask128::occupancy(128 - n as usize));
    }
}

#[test]
fn shift_right_matches_u128() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..256 {
        let value: u128 = rng.gen();
        let n = rng.gen_range(0..128u32);
        assert_eq!(u128::from(Mask128::from(value).shift_right(n)), value >> n);
    }
}

#[test]
fn next_range_finds_runs() {
    let mut mask = Mask128::ZERO;
    for i in (3..=6).chain(74..=76) {
        mask.set_bit(i, true);
    }

    let (mut begin, mut end) = (0, 0);
    assert!(get_next_range(mask, &mut begin, &mut end));
    assert_eq!((begin, end), (3, 7));
    assert!(get_next_range(mask, &mut begin, &mut end));
    assert_eq!((begin, end), (74, 77));
    assert!(!get_next_range(mask, &mut begin, &mut end));
    assert_eq!(begin, end);
}

#[test]
fn next_range_edge_cases() {
    let (mut begin, mut end) = (0, 0);
    assert!(!get_next_range(Mask128::ZERO, &mut begin, &mut end));
    assert_eq!((begin, end), (0, 0));

    let ranges: Vec<_> = EnabledRanges::new(Mask128::ONES).collect();
    assert_eq!(ranges, vec![0..128]);

    let mut single = Mask128::ZERO;
    single.set_bit(127, true);
    assert_eq!(EnabledRanges::new(single).collect::<Vec<_>>(), vec![127..128]);

    let straddle = Mask128::occupancy(70) & !Mask128::occupancy(60);
    assert_eq!(EnabledRanges::new(straddle).collect::<Vec<_>>(), vec![60..70]);
}

#[test]
fn enabled_ranges_cover_random_masks() {
    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..128 {
        let mask = Mask128::from(rng.gen::<u128>());

        let mut rebuilt = Mask128::ZERO;
        let mut last_end = 0;
        for range in EnabledRanges::new(mask) {
            assert!(!range.is_empty());
            // Runs are maximal, so consecutive runs never touch.
            assert!(last_end == 0 || range.start > last_end);
            for i in range.clone() {
                rebuilt.set_bit(i, true);
            }
            last_end = range.end;
        }
        assert_eq!(rebuilt, mask);
    }
}

#[test]
fn enable_bits_random_patterns() {
    let mut rng = StdRng::seed_from_u64(0xB175);
    for _ in 0..64 {
        let count = rng.gen_range(0..=MASK_BITS);
        let mut bits = EnableBits::new(3);
        bits.push_enabled(count);

        let mut expected = vec![[true; 3]; count];
        for _ in 0..(count * 4) {
            let slot = rng.gen_range(0..count);
            let type_idx = rng.gen_range(0..3);
            let value = rng.gen_bool(0.5);

            let changed = bits.set_enabled(type_idx, slot, value).unwrap();
            assert_eq!(changed, expected[slot][type_idx] != value);
            expected[slot][type_idx] = value;
        }

        for (slot, values) in expected.iter().enumerate() {
            for (type_idx, value) in values.iter().enumerate() {
                assert_eq!(bits.is_enabled(type_idx, slot).unwrap(), *value);
            }
        }

        for type_idx in 0..3 {
            let mask = bits.mask(type_idx).unwrap();
            assert!((mask & !Mask128::occupancy(count)).is_zero());

            let zeros = expected.iter().filter(|values| !values[type_idx]).count();
            assert_eq!(bits.disabled_count(type_idx).unwrap() as usize, zeros);
        }
        bits.check().unwrap();
    }
}

#[test]
fn enable_bits_reject_bad_indices() {
    let mut bits = EnableBits::new(2);
    bits.push_enabled(4);

    let err = bits.set_enabled(0, 4, false).unwrap_err();
    assert_eq!(err, EcsError::SlotOutOfBounds { slot: 4, count: 4 });
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let err = bits.is_enabled(2, 0).unwrap_err();
    assert_eq!(err, EcsError::TypeIndexOutOfBounds { index: 2, len: 2 });
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    bits.check().unwrap();
}

#[test]
fn enable_bits_slot_helpers() {
    let mut bits = EnableBits::new(1);
    bits.push_enabled(3);
    bits.set_enabled(0, 2, false).unwrap();
    assert_eq!(bits.disabled_count(0).unwrap(), 1);

    // Occupied slots, the last one included, only leave through swap_remove.
    for slot in 0..3 {
        let err = bits.reset_slot_on_removal(slot, 0).unwrap_err();
        assert_eq!(err, EcsError::SlotOutOfBounds { slot, count: 3 });
    }
    assert!(bits.reset_slot_on_removal(MASK_BITS, 0).is_err());
    assert_eq!(bits.disabled_count(0).unwrap(), 1);
    assert!(!bits.mask(0).unwrap().get_bit(2));
    bits.check().unwrap();

    bits.reset_slot_on_removal(90, 0).unwrap();
    assert_eq!(bits.disabled_count(0).unwrap(), 1);
    bits.check().unwrap();

    bits.swap_remove(2).unwrap();
    assert_eq!(bits.count(), 2);
    assert_eq!(bits.disabled_count(0).unwrap(), 0);
    bits.check().unwrap();

    let mut bits = EnableBits::new(2);
    bits.push(|type_idx| type_idx == 0);
    bits.push(|_| false);
    assert_eq!(bits.disabled_counts(), &[1, 2]);

    bits.initialize_for_new_component(1, 2).unwrap();
    assert_eq!(bits.mask(1).unwrap(), Mask128::occupancy(2));
    assert_eq!(bits.disabled_count(1).unwrap(), 0);
    assert!(bits.initialize_for_new_component(1, 5).is_err());
    bits.check().unwrap();
}

#[test]
fn enable_bits_swap_remove() {
    let mut bits = EnableBits::new(1);
    bits.push_enabled(5);
    bits.set_enabled(0, 4, false).unwrap();
    bits.set_enabled(0, 1, false).unwrap();

    // Slot 4 (disabled) moves into slot 0.
    bits.swap_remove(0).unwrap();
    assert_eq!(bits.count(), 4);
    assert!(!bits.is_enabled(0, 0).unwrap());
    assert!(!bits.is_enabled(0, 1).unwrap());
    assert!(bits.is_enabled(0, 2).unwrap());
    assert!(!bits.mask(0).unwrap().get_bit(4));
    assert_eq!(bits.disabled_count(0).unwrap(), 2);

    // Removing the last slot moves nothing.
    bits.swap_remove(3).unwrap();
    assert_eq!(bits.count(), 3);
    assert_eq!(bits.disabled_count(0).unwrap(), 2);
    bits.check().unwrap();

    let mut src = EnableBits::new(1);
    src.push(|_| false);
    EnableBits::copy_bit(&src, 0, &mut bits, 2, 0).unwrap();
    assert!(!bits.is_enabled(0, 2).unwrap());
    assert_eq!(bits.disabled_count(0).unwrap(), 3);
}

#[test]
fn enable_words_survive_any_fullness() {
    let mut rng = StdRng::seed_from_u64(5);
    for count in [0, 1, 63, 64, 65, 100, 127, 128] {
        let mut bits = EnableBits::new(1);
        bits.push_enabled(count);
        for slot in 0..count {
            bits.set_enabled(0, slot, rng.gen_bool(0.3)).unwrap();
        }

        let mut words = Vec::<u64>::default();
        bits.write_words(0, &mut words).unwrap();
        assert_eq!(words.len(), words_for(count));

        let mut cursor = WordCursor::new(&words);
        let mask = cursor.read_words(count).unwrap();
        assert_eq!(cursor.remaining(), 0);
        assert_eq!(mask, bits.mask(0).unwrap());

        let mut loaded = EnableBits::new(1);
        loaded.push_enabled(count);
        loaded.load_mask(0, mask).unwrap();
        assert_eq!(loaded, bits);
    }

    let err = WordCursor::new(&[u64::MAX]).read_words(70).unwrap_err();
    assert_eq!(
        err,
        EcsError::ShortWordStream {
            needed: 2,
            available: 1
        }
    );
}

#[test]
fn chunk_capacity_follows_row_size() {
    let mut world = World::new();
    let entities = world.spawn_batch(health_pack(0..10));
    let archetype = world.archetypes().get(world.entities().location(entities[0]).unwrap().archetype);
    assert_eq!(archetype.chunk_capacity(), 128);

    let blobs = world.spawn_batch((vec![Blob([7; 20_000]); 3],));
    let archetype = world.archetypes().get(world.entities().location(blobs[0]).unwrap().archetype);
    assert_eq!(archetype.chunk_capacity(), 1);
    assert_eq!(archetype.chunks().len(), 3);
    world.check_consistency().unwrap();
}

#[test]
fn destroy_preserves_remaining_bits() {
    for k in 0..3 {
        let pattern = |i: usize| i % (2 + k) == 0;

        let mut world = World::new();
        let entities = world.spawn_batch(health_pack(0..10));
        for (i, entity) in entities.iter().enumerate() {
            world.set_enabled::<Health>(*entity, pattern(i)).unwrap();
        }

        world.destroy(entities[5]).unwrap();
        assert!(!world.contains(entities[5]));
        assert_eq!(
            world.destroy(entities[5]).unwrap_err(),
            EcsError::DeadEntity(entities[5])
        );

        for (i, entity) in entities.iter().enumerate().filter(|(i, _)| *i != 5) {
            assert_eq!(world.is_enabled::<Health>(*entity).unwrap(), pattern(i));
            assert_eq!(world.get::<Health>(*entity).unwrap(), &Health(i as u32));
        }

        // The last entity took the destroyed slot and kept its bit.
        assert_eq!(world.entities().location(entities[9]).unwrap().slot, 5);
        world.check_consistency().unwrap();
    }
}

#[test]
fn destroy_batch_releases_empty_chunks() {
    let mut world = World::with_config(small_chunks());
    let entities = world.spawn_batch(health_pack(0..12));
    let archetype = world.entities().location(entities[0]).unwrap().archetype;
    let capacity = world.archetypes().get(archetype).chunk_capacity();
    assert_eq!(world.archetypes().get(archetype).chunks().len(), (12 + capacity - 1) / capacity);

    world.set_enabled::<Health>(entities[11], false).unwrap();
    world.destroy_batch(&entities[..capacity]).unwrap();

    assert_eq!(world.len(), 12 - capacity);
    assert!(!world.is_enabled::<Health>(entities[11]).unwrap());
    for entity in &entities[capacity..11] {
        assert!(world.is_enabled::<Health>(*entity).unwrap());
    }

    world.destroy_batch(&entities[capacity..]).unwrap();
    assert!(world.archetypes().get(archetype).chunks().is_empty());
    assert!(world.is_empty());
    world.check_consistency().unwrap();
}

#[test]
fn type_key_add_and_remove_by_id() {
    let mut world = World::new();
    let a = world.register::<ComponentA>();
    let health = world.register::<Health>();
    let shield = world.register::<Shield>();

    let mut key = TypeKey::from_ids([shield, a, shield]);
    assert_eq!(key.as_slice(), &[a, shield]);

    assert!(!key.add_by_id(health));
    assert!(key.add_by_id(health));
    assert_eq!(key.iter().copied().collect::<Vec<_>>(), vec![a, health, shield]);
    assert_eq!(key.position(shield), Some(2));

    assert!(key.remove_by_id(a));
    assert!(!key.remove_by_id(a));
    assert_eq!(key.len(), 2);

    let single = TypeKey::from_ids([health]);
    assert!(single.subset_of(&key));
    assert!(!key.subset_of(&single));
    assert!(TypeKey::from_ids([a]).disjoint(&key));
    assert!(!single.disjoint(&key));
}

#[test]
fn set_components_replaces_everything() {
    let mut world = World::with_config(small_chunks());
    let entities = world.spawn_batch_in_group(
        (vec![ComponentA::default(); 3], vec![Health(1), Health(2), Health(3)]),
        ChunkGroup(2),
    );
    world.set_enabled::<Health>(entities[1], false).unwrap();

    world
        .set_components(entities[1], (vec![Shield(5)],))
        .unwrap();
    assert!(!world.has_component::<Health>(entities[1]).unwrap());
    assert!(!world.has_component::<ComponentA>(entities[1]).unwrap());
    assert_eq!(world.get::<Shield>(entities[1]).unwrap(), &Shield(5));
    assert!(world.is_enabled::<Shield>(entities[1]).unwrap());
    assert_eq!(world.group_of(entities[1]).unwrap(), ChunkGroup(2));

    for (entity, value) in [(entities[0], 1), (entities[2], 3)] {
        assert_eq!(world.get::<Health>(entity).unwrap(), &Health(value));
        assert!(world.is_enabled::<Health>(entity).unwrap());
    }

    let dead = world.spawn_empty(1)[0];
    world.destroy(dead).unwrap();
    assert_eq!(
        world.set_components(dead, (vec![Shield(0)],)).unwrap_err(),
        EcsError::DeadEntity(dead)
    );
    world.check_consistency().unwrap();
}

#[test]
fn restore_chunks_keeps_chunk_boundaries() {
    let mut world = World::with_config(small_chunks());
    let health = world.register::<Health>();
    let entities = world.spawn_empty(12);

    let restore = |range: std::ops::Range<usize>, disabled: &[usize]| {
        let mut mask = Mask128::occupancy(range.len());
        for slot in disabled {
            mask.set_bit(*slot, false);
        }
        ChunkRestore {
            entities: entities[range.clone()].to_vec(),
            group: ChunkGroup(1),
            columns: vec![(
                health,
                Box::new(Column::from(range.map(|i| Health(i as u32)).collect::<Vec<_>>()))
                    as Box<dyn AnyColumn>,
            )],
            enable: vec![(health, mask)],
        }
    };
    world
        .restore_chunks(vec![restore(0..3, &[1]), restore(3..12, &[0, 6])])
        .unwrap();

    let archetype = world.entities().location(entities[0]).unwrap().archetype;
    assert_eq!(world.archetypes().get(archetype).chunk_capacity(), 5);
    let lens: Vec<_> = world
        .archetypes()
        .get(archetype)
        .chunks()
        .iter()
        .map(|chunk| chunk.len())
        .collect();
    assert_eq!(lens, vec![3, 5, 4]);

    // The second restore was split without moving any record out of order.
    let location = world.entities().location(entities[9]).unwrap();
    assert_eq!((location.chunk, location.slot), (2, 1));

    for (i, entity) in entities.iter().enumerate() {
        assert_eq!(world.get::<Health>(*entity).unwrap(), &Health(i as u32));
        assert_eq!(
            world.is_enabled::<Health>(*entity).unwrap(),
            ![1, 3, 9].contains(&i)
        );
        assert_eq!(world.group_of(*entity).unwrap(), ChunkGroup(1));
    }

    let empty = world.archetypes().find(&TypeKey::default()).unwrap();
    assert!(world.archetypes().get(empty).chunks().is_empty());
    world.check_consistency().unwrap();
}

#[test]
fn restore_chunks_rejects_bad_input() {
    let mut world = World::new();
    let a = world.register::<ComponentA>();
    let entities = world.spawn_batch(health_pack(0..3));
    let dead = world.spawn_empty(1)[0];
    world.destroy(dead).unwrap();
    let before: Vec<_> = entities
        .iter()
        .map(|entity| world.entities().location(*entity).unwrap())
        .collect();

    let restore = |targets: Vec<Entity>, enable: Vec<(ComponentId, Mask128)>| ChunkRestore {
        columns: vec![(
            a,
            Box::new(Column::from(vec![ComponentA::default(); targets.len()]))
                as Box<dyn AnyColumn>,
        )],
        entities: targets,
        group: ChunkGroup::default(),
        enable,
    };

    let err = world
        .restore_chunks(vec![
            restore(entities[..2].to_vec(), Vec::default()),
            restore(entities[1..].to_vec(), Vec::default()),
        ])
        .unwrap_err();
    assert_eq!(err, EcsError::DuplicateEntity(entities[1]));
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let err = world
        .restore_chunks(vec![restore(vec![entities[0], dead], Vec::default())])
        .unwrap_err();
    assert_eq!(err, EcsError::DeadEntity(dead));

    let err = world
        .restore_chunks(vec![restore(
            entities.clone(),
            vec![(a, Mask128::occupancy(3))],
        )])
        .unwrap_err();
    assert_eq!(err, EcsError::NotEnableable(ComponentA::NAME));

    let health = world.register::<Health>();
    let err = world
        .restore_chunks(vec![restore(
            entities.clone(),
            vec![(health, Mask128::occupancy(3))],
        )])
        .unwrap_err();
    assert_eq!(err, EcsError::MissingComponent(entities[0], Health::NAME));

    for (entity, location) in entities.iter().zip(before) {
        assert_eq!(world.entities().location(*entity).unwrap(), location);
        assert!(world.has_component::<Health>(*entity).unwrap());
    }
    world.check_consistency().unwrap();
}

#[test]
fn spawn_fills_last_chunk_first() {
    let mut world = World::with_config(small_chunks());
    let first = world.spawn_batch(health_pack(0..2));
    let archetype = world.entities().location(first[0]).unwrap().archetype;
    let capacity = world.archetypes().get(archetype).chunk_capacity();

    let second = world.spawn_batch(health_pack(2..(2 + capacity as u32)));
    let chunks = world.archetypes().get(archetype).chunks();
    assert_eq!(chunks.len(), 2);
    assert!(chunks[0].is_full());
    assert_eq!(chunks[1].len(), 2);
    assert_eq!(world.entities().location(second[0]).unwrap().slot, 2);

    let empty = world.spawn_empty(3);
    assert_eq!(empty.len(), 3);
    assert_eq!(world.len(), 2 + capacity + 3);
}

#[test]
#[should_panic]
fn spawn_rejects_duplicate_types() {
    let mut world = World::new();
    world.spawn_batch((vec![Health(1)], vec![Health(2)]));
}

#[test]
fn toggle_errors_leave_state_untouched() {
    let mut world = World::new();
    let entities = world.spawn_batch((vec![Health(1); 2], vec![ComponentA::default(); 2]));

    assert_eq!(
        world.set_enabled::<ComponentA>(entities[0], false),
        Err(EcsError::NotEnableable("ComponentA"))
    );
    assert_eq!(
        world.set_enabled::<Shield>(entities[0], false),
        Err(EcsError::MissingComponent(entities[0], "Shield"))
    );

    world.register::<Shield>();
    assert_eq!(
        world.set_enabled::<Shield>(entities[0], false),
        Err(EcsError::MissingComponent(entities[0], "Shield"))
    );

    world.destroy(entities[1]).unwrap();
    let err = world.set_enabled::<Health>(entities[1], false).unwrap_err();
    assert_eq!(err, EcsError::DeadEntity(entities[1]));
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    assert!(world.is_enabled::<Health>(entities[0]).unwrap());
    assert!(world.is_enabled::<ComponentA>(entities[0]).is_err());
    world.check_consistency().unwrap();
}

#[test]
fn set_enabled_bumps_change_version() {
    let mut world = World::new();
    let entity = world.spawn_batch(health_pack([1]))[0];
    let location = world.entities().location(entity).unwrap();
    let chunk = &world.archetypes().get(location.archetype).chunks()[0];
    let spawned_at = chunk.change_version(0);

    assert!(world.set_enabled::<Health>(entity, false).unwrap());
    let chunk = &world.archetypes().get(location.archetype).chunks()[0];
    assert!(chunk.change_version(0) > spawned_at);
    assert_eq!(chunk.change_version(0), world.versions().current_version());

    // Writing the same value is not a change.
    assert!(!world.set_enabled::<Health>(entity, false).unwrap());
}

#[test]
fn add_and_remove_keep_shared_bits() {
    let mut rng = StdRng::seed_from_u64(42);
    let mut world = World::with_config(small_chunks());
    let entities = world.spawn_batch((vec![ComponentA::default(); 20],));

    let mut expected = Vec::default();
    for (i, entity) in entities.iter().enumerate() {
        world.add_component(*entity, Health(i as u32)).unwrap();
        // New components start enabled.
        assert!(world.is_enabled::<Health>(*entity).unwrap());

        let value = rng.gen_bool(0.5);
        world.set_enabled::<Health>(*entity, value).unwrap();
        expected.push(value);
    }

    for entity in entities.iter().step_by(2) {
        world.add_component(*entity, Shield(9)).unwrap();
        assert!(world.is_enabled::<Shield>(*entity).unwrap());
    }

    for (i, entity) in entities.iter().enumerate() {
        assert_eq!(world.is_enabled::<Health>(*entity).unwrap(), expected[i]);
        assert_eq!(world.get::<Health>(*entity).unwrap(), &Health(i as u32));
        assert_eq!(world.has_component::<Shield>(*entity).unwrap(), i % 2 == 0);
    }

    for entity in entities.iter().step_by(2) {
        world.remove_component::<Shield>(*entity).unwrap();
    }
    assert_eq!(
        world.remove_component::<Shield>(entities[0]),
        Err(EcsError::MissingComponent(entities[0], "Shield"))
    );

    for (i, entity) in entities.iter().enumerate() {
        assert_eq!(world.is_enabled::<Health>(*entity).unwrap(), expected[i]);
        assert!(!world.has_component::<Shield>(*entity).unwrap());
    }
    world.check_consistency().unwrap();
}

#[test]
fn adding_existing_component_replaces_in_place() {
    let mut world = World::new();
    let entity = world.spawn_batch(health_pack([1]))[0];
    let location = world.entities().location(entity).unwrap();

    world.set_enabled::<Health>(entity, false).unwrap();
    world.add_component(entity, Health(2)).unwrap();

    assert_eq!(world.entities().location(entity).unwrap(), location);
    assert_eq!(world.get::<Health>(entity).unwrap(), &Health(2));
    assert!(!world.is_enabled::<Health>(entity).unwrap());
}

#[test]
fn regroup_preserves_bits() {
    let mut world = World::with_config(small_chunks());
    let entities = world.spawn_batch((vec![Health(1); 3], vec![Shield(2); 3]));
    world.set_enabled::<Health>(entities[1], false).unwrap();
    world.set_enabled::<Shield>(entities[2], false).unwrap();

    world.set_group(entities[1], ChunkGroup(7)).unwrap();
    assert_eq!(world.group_of(entities[1]).unwrap(), ChunkGroup(7));
    assert_eq!(world.group_of(entities[0]).unwrap(), ChunkGroup(0));

    let archetype = world.entities().location(entities[0]).unwrap().archetype;
    assert_eq!(world.archetypes().get(archetype).chunks().len(), 2);

    assert!(!world.is_enabled::<Health>(entities[1]).unwrap());
    assert!(world.is_enabled::<Shield>(entities[1]).unwrap());
    assert!(world.is_enabled::<Health>(entities[2]).unwrap());
    assert!(!world.is_enabled::<Shield>(entities[2]).unwrap());

    // Same group is a no-op.
    let location = world.entities().location(entities[1]).unwrap();
    world.set_group(entities[1], ChunkGroup(7)).unwrap();
    assert_eq!(world.entities().location(entities[1]).unwrap(), location);

    world.set_group(entities[1], ChunkGroup::default()).unwrap();
    assert_eq!(world.archetypes().get(archetype).chunks().len(), 1);
    assert!(!world.is_enabled::<Health>(entities[1]).unwrap());
    world.check_consistency().unwrap();
}

#[test]
fn instantiate_copies_bits() {
    let mut world = World::with_config(small_chunks());
    let source = world.spawn_batch((vec![Health(3)], vec![Shield(4)]))[0];
    world.set_enabled::<Shield>(source, false).unwrap();

    let copies = world.instantiate(source, 9).unwrap();
    assert_eq!(copies.len(), 9);
    assert_eq!(world.len(), 10);

    for copy in &copies {
        assert_eq!(world.get::<Health>(*copy).unwrap(), &Health(3));
        assert_eq!(world.get::<Shield>(*copy).unwrap(), &Shield(4));
        assert!(world.is_enabled::<Health>(*copy).unwrap());
        assert!(!world.is_enabled::<Shield>(*copy).unwrap());
    }

    let archetype = world.entities().location(source).unwrap().archetype;
    assert!(world.archetypes().get(archetype).chunks().len() > 1);
    world.check_consistency().unwrap();
}

#[test]
fn archetype_wide_add_and_remove() {
    let mut world = World::with_config(small_chunks());
    let entities = world.spawn_batch((vec![ComponentA::default(); 9],));
    let archetype = world.entities().location(entities[0]).unwrap().archetype;

    let with_health = world
        .add_component_to_archetype(archetype, Health(5))
        .unwrap();
    assert_ne!(with_health, archetype);
    assert!(world.archetypes().get(archetype).is_empty());

    for entity in &entities {
        assert_eq!(world.get::<Health>(*entity).unwrap(), &Health(5));
        assert!(world.is_enabled::<Health>(*entity).unwrap());
    }

    world.set_enabled::<Health>(entities[4], false).unwrap();
    let with_shield = world
        .add_component_to_archetype(with_health, Shield(1))
        .unwrap();
    assert!(!world.is_enabled::<Health>(entities[4]).unwrap());
    assert!(world.is_enabled::<Shield>(entities[4]).unwrap());

    let back = world
        .remove_component_from_archetype::<Shield>(with_shield)
        .unwrap();
    assert_eq!(back, with_health);
    assert!(!world.is_enabled::<Health>(entities[4]).unwrap());
    assert!(!world.has_component::<Shield>(entities[4]).unwrap());
    world.check_consistency().unwrap();
}

#[test]
fn query_mask_composition() {
    let mut world = World::new();
    let entities = world.spawn_batch((vec![Health(0); 127], vec![Shield(0); 127]));
    world.set_enabled::<Health>(entities[0], false).unwrap();
    world.set_enabled::<Health>(entities[1], false).unwrap();
    world.set_enabled::<Shield>(entities[1], false).unwrap();
    world.set_enabled::<Shield>(entities[126], false).unwrap();

    let mut query = Query::new(&mut world, QueryDesc::new().all::<Health>().all::<Shield>());
    assert_eq!(query.matching().len(), 1);

    let matching = &query.matching()[0];
    let chunk = &world.archetypes().get(matching.archetype).chunks()[0];
    let mask = compose_mask(matching, chunk.enable_bits());
    assert_eq!(mask.lo, 0xFFFF_FFFF_FFFF_FFFC);
    assert_eq!(mask.hi, 0x3FFF_FFFF_FFFF_FFFF);

    assert_eq!(query.count(&world), 124);
}

#[test]
fn compose_mask_clauses() {
    let mut bits = EnableBits::new(3);
    bits.push_enabled(6);
    bits.set_enabled(0, 1, false).unwrap();
    bits.set_enabled(1, 2, false).unwrap();
    bits.set_enabled(2, 3, false).unwrap();
    bits.set_enabled(1, 3, false).unwrap();

    let matching = |all: &[usize], none: &[usize], any: &[usize]| MatchingArchetype {
        archetype: ArchetypeId::default(),
        all: all.iter().copied().collect(),
        none: none.iter().copied().collect(),
        any: any.iter().copied().collect(),
    };

    assert_eq!(compose_mask(&matching(&[], &[], &[]), &bits), Mask128::occupancy(6));
    assert_eq!(
        compose_mask(&matching(&[0], &[], &[]), &bits),
        Mask128::from(0b111101u128)
    );
    assert_eq!(
        compose_mask(&matching(&[], &[1], &[]), &bits),
        Mask128::from(0b001100u128)
    );
    assert_eq!(
        compose_mask(&matching(&[], &[], &[1, 2]), &bits),
        Mask128::from(0b110111u128)
    );
    assert_eq!(
        compose_mask(&matching(&[0], &[2], &[1]), &bits),
        Mask128::ZERO
    );
}

#[test]
fn query_clause_rules() {
    let mut world = World::new();
    let mut all_a = Query::new(&mut world, QueryDesc::new().all::<ComponentA>());
    let mut a_without_health = Query::new(
        &mut world,
        QueryDesc::new().all::<ComponentA>().none::<Health>(),
    );
    let mut without_a = Query::new(&mut world, QueryDesc::new().none::<ComponentA>());
    let mut health_or_shield = Query::new(
        &mut world,
        QueryDesc::new().any::<Health>().any::<Shield>(),
    );
    let mut a_or_health = Query::new(
        &mut world,
        QueryDesc::new().any::<ComponentA>().any::<Health>(),
    );

    let with_health = world.spawn_batch((vec![ComponentA::default(); 4], vec![Health(0); 4]));
    world.set_enabled::<Health>(with_health[1], false).unwrap();
    world.spawn_batch((vec![ComponentA::default(); 2],));
    let guarded = world.spawn_batch((vec![Health(0); 2], vec![Shield(0); 2]));
    world.set_enabled::<Health>(guarded[0], false).unwrap();
    world.set_enabled::<Shield>(guarded[0], false).unwrap();

    assert_eq!(all_a.count(&world), 6);
    assert_eq!(a_without_health.count(&world), 3);
    assert_eq!(without_a.count(&world), 2);
    assert_eq!(health_or_shield.count(&world), 4);
    assert_eq!(a_or_health.count(&world), 7);
}

#[test]
fn batches_follow_enabled_runs() {
    let mut world = World::new();
    let entities = world.spawn_batch(health_pack(0..10));
    for i in [3, 4, 7] {
        world.set_enabled::<Health>(entities[i], false).unwrap();
    }

    let mut query = Query::new(&mut world, QueryDesc::new().all::<Health>());
    let batches: Vec<_> = query
        .batches(&world)
        .map(|batch| {
            let values: Vec<_> = batch
                .get::<Health>()
                .unwrap()
                .iter()
                .map(|health| health.0)
                .collect();
            assert_eq!(batch.entities().len(), values.len());
            assert!(batch.get::<Shield>().is_none());
            (batch.range(), values)
        })
        .collect();

    assert_eq!(
        batches,
        vec![
            (0..3, vec![0, 1, 2]),
            (5..7, vec![5, 6]),
            (8..10, vec![8, 9]),
        ]
    );
}

#[test]
fn batch_mutation_skips_disabled() {
    let mut world = World::with_config(small_chunks());
    let entities = world.spawn_batch(health_pack(0..16));
    world.set_enabled::<Health>(entities[6], false).unwrap();

    let mut query = Query::new(&mut world, QueryDesc::new().all::<Health>());
    query.for_each_batch_mut(&mut world, |mut batch| {
        for health in batch.get_mut::<Health>().unwrap() {
            health.0 += 100;
        }
    });

    for (i, entity) in entities.iter().enumerate() {
        let expected = if i == 6 { 6 } else { i as u32 + 100 };
        assert_eq!(world.get::<Health>(*entity).unwrap().0, expected);
    }

    // Disable every entity through the batches themselves.
    query.for_each_batch_mut(&mut world, |mut batch| {
        for i in 0..batch.len() {
            batch.set_enabled::<Health>(i, false).unwrap();
        }
    });
    assert_eq!(query.count(&world), 0);
    world.check_consistency().unwrap();
}

#[test]
fn parallel_chunk_iteration() {
    let mut world = World::with_config(small_chunks());
    let entities = world.spawn_batch((vec![Health(1); 40], vec![Shield(0); 40]));
    for entity in entities.iter().step_by(3) {
        world.set_enabled::<Shield>(*entity, false).unwrap();
    }

    let mut query = Query::new(&mut world, QueryDesc::new().all::<Health>().none::<Shield>());
    query.par_for_each_chunk(&mut world, |mut chunk| {
        for range in chunk.ranges() {
            for health in &mut chunk.get_mut::<Health>().unwrap()[range] {
                health.0 = 2;
            }
        }
    });

    for (i, entity) in entities.iter().enumerate() {
        let expected = if i % 3 == 0 { 2 } else { 1 };
        assert_eq!(world.get::<Health>(*entity).unwrap().0, expected);
    }
}

#[test]
fn move_between_worlds() {
    let mut src = World::with_config(small_chunks());
    let healthy = src.spawn_batch(health_pack(0..9));
    let plain = src.spawn_batch((vec![ComponentA { x: 1, y: 2 }; 3],));
    for entity in healthy.iter().skip(1).step_by(2) {
        src.set_enabled::<Health>(*entity, false).unwrap();
    }
    src.set_group(healthy[0], ChunkGroup(3)).unwrap();

    // Register types in a different order so IDs differ between the worlds.
    let mut dst = World::new();
    dst.register::<Shield>();
    dst.register::<ComponentA>();
    dst.spawn_batch(health_pack([77]));

    let remap = dst.move_from(&mut src).unwrap();
    assert_eq!(remap.len(), 12);
    assert!(src.is_empty());
    assert_eq!(dst.len(), 13);
    src.check_consistency().unwrap();
    dst.check_consistency().unwrap();

    for (i, entity) in healthy.iter().enumerate() {
        let moved = remap.get(*entity).unwrap();
        assert_eq!(dst.get::<Health>(moved).unwrap(), &Health(i as u32));
        assert_eq!(dst.is_enabled::<Health>(moved).unwrap(), i % 2 == 0);
        assert!(!src.contains(*entity));
    }
    assert_eq!(dst.group_of(remap.get(healthy[0]).unwrap()).unwrap(), ChunkGroup(3));

    for entity in &plain {
        let moved = remap.get(*entity).unwrap();
        assert_eq!(dst.get::<ComponentA>(moved).unwrap(), &ComponentA { x: 1, y: 2 });
    }

    // The source world stays usable.
    let fresh = src.spawn_batch(health_pack([5]));
    assert_eq!(src.get::<Health>(fresh[0]).unwrap(), &Health(5));
}

#[test]
fn copy_between_worlds() {
    let mut src = World::new();
    let entities = src.spawn_batch((vec![Health(4); 6], vec![Shield(8); 6]));
    src.set_enabled::<Shield>(entities[2], false).unwrap();

    let mut dst = World::with_config(small_chunks());
    let remap = dst.copy_from(&src).unwrap();
    assert_eq!(remap.len(), 6);
    assert_eq!(src.len(), 6);

    for (i, entity) in entities.iter().enumerate() {
        let copy = remap.get(*entity).unwrap();
        assert_eq!(dst.get::<Shield>(copy).unwrap(), &Shield(8));
        assert_eq!(dst.is_enabled::<Shield>(copy).unwrap(), i != 2);
        assert!(src.contains(*entity));
    }
    dst.check_consistency().unwrap();
}

#[test]
fn commands_apply_in_order() {
    let mut world = World::new();
    let entities = world.spawn_batch(health_pack(0..4));
    let commands = world.commands().clone();

    commands.destroy(&[entities[0]]);
    commands.set_enabled::<Health>(entities[0], false);
    commands.set_enabled::<Health>(entities[1], false);
    commands.add_component(entities[2], ComponentA { x: 3, y: 4 });
    commands.remove_component::<Shield>(entities[2]);
    commands.set_enabled::<ComponentA>(entities[2], false);
    commands.set_group(entities[3], ChunkGroup(1));

    let errors = world.process_commands();
    assert_eq!(errors.len(), 3);
    assert_eq!(errors[0].kind(), ErrorKind::AccessViolation);
    assert_eq!(
        errors[1],
        EcsError::MissingComponent(entities[2], "Shield")
    );
    assert_eq!(errors[2], EcsError::NotEnableable("ComponentA"));

    assert!(!world.contains(entities[0]));
    assert!(!world.is_enabled::<Health>(entities[1]).unwrap());
    assert_eq!(world.get::<ComponentA>(entities[2]).unwrap(), &ComponentA { x: 3, y: 4 });
    assert!(world.is_enabled::<Health>(entities[2]).unwrap());
    assert_eq!(world.group_of(entities[3]).unwrap(), ChunkGroup(1));

    // Across sync points a stale handle is just dead.
    commands.remove_component::<Health>(entities[0]);
    assert_eq!(
        world.process_commands(),
        vec![EcsError::DeadEntity(entities[0])]
    );
    world.check_consistency().unwrap();
}

#[test]
fn commands_from_worker_threads() {
    let mut world = World::new();
    let entities = world.spawn_batch(health_pack(0..64));

    std::thread::scope(|scope| {
        for chunk in entities.chunks(16) {
            let commands = world.commands().clone();
            scope.spawn(move || {
                for entity in chunk.iter().step_by(2) {
                    commands.set_enabled::<Health>(*entity, false);
                }
            });
        }
    });

    assert!(world.process_commands().is_empty());
    for (i, entity) in entities.iter().enumerate() {
        assert_eq!(world.is_enabled::<Health>(*entity).unwrap(), i % 2 == 1);
    }
}

#[test]
fn random_mutations_stay_consistent() {
    #[derive(Debug, Clone, Copy)]
    struct Expected {
        health: u32,
        health_enabled: bool,
        shield_enabled: Option<bool>,
    }

    let mut rng = StdRng::seed_from_u64(0xEC5);
    let mut world = World::with_config(small_chunks());
    let mut alive = Vec::default();
    let mut expected = HashMap::new();

    for step in 0..2_000u32 {
        let pick = if alive.is_empty() {
            None
        } else {
            Some(rng.gen_range(0..alive.len()))
        };

        match (rng.gen_range(0..7), pick) {
            (0, _) => {
                let count = rng.gen_range(1..6);
                for entity in world.spawn_batch((vec![Health(step); count],)) {
                    alive.push(entity);
                    expected.insert(
                        entity,
                        Expected {
                            health: step,
                            health_enabled: true,
                            shield_enabled: None,
                        },
                    );
                }
            }
            (1, Some(idx)) => {
                let entity = alive.swap_remove(idx);
                world.destroy(entity).unwrap();
                expected.remove(&entity);
            }
            (2, Some(idx)) => {
                let value = rng.gen_bool(0.5);
                world.set_enabled::<Health>(alive[idx], value).unwrap();
                expected.get_mut(&alive[idx]).unwrap().health_enabled = value;
            }
            (3, Some(idx)) => {
                world.add_component(alive[idx], Shield(step)).unwrap();
                let entry = expected.get_mut(&alive[idx]).unwrap();
                entry.shield_enabled = Some(entry.shield_enabled.unwrap_or(true));
            }
            (4, Some(idx)) => {
                let entry = expected.get_mut(&alive[idx]).unwrap();
                let result = world.remove_component::<Shield>(alive[idx]);
                assert_eq!(result.is_ok(), entry.shield_enabled.is_some());
                entry.shield_enabled = None;
            }
            (5, Some(idx)) => {
                let group = ChunkGroup(rng.gen_range(0..3));
                world.set_group(alive[idx], group).unwrap();
            }
            (6, Some(idx)) => {
                let value = rng.gen_bool(0.5);
                let entry = expected.get_mut(&alive[idx]).unwrap();
                let result = world.set_enabled::<Shield>(alive[idx], value);
                assert_eq!(result.is_ok(), entry.shield_enabled.is_some());
                if entry.shield_enabled.is_some() {
                    entry.shield_enabled = Some(value);
                }
            }
            _ => {}
        }
    }

    assert_eq!(world.len(), expected.len());
    for (entity, entry) in &expected {
        assert_eq!(world.get::<Health>(*entity).unwrap(), &Health(entry.health));
        assert_eq!(world.is_enabled::<Health>(*entity).unwrap(), entry.health_enabled);
        match entry.shield_enabled {
            Some(value) => assert_eq!(world.is_enabled::<Shield>(*entity).unwrap(), value),
            None => assert!(!world.has_component::<Shield>(*entity).unwrap()),
        }
    }
    world.check_consistency().unwrap();
}

#[test]
fn world_config_from_ron() {
    let config = WorldConfig::from_ron("(chunk_bytes: 4096)").unwrap();
    assert_eq!(config.chunk_bytes, 4096);
    assert!(!config.validate_on_mutation);

    let config = WorldConfig::from_ron("(validate_on_mutation: true)").unwrap();
    assert_eq!(config.chunk_bytes, WorldConfig::default().chunk_bytes);
    assert!(config.validate_on_mutation);

    assert!(WorldConfig::from_ron("(chunk_bytes: \"big\")").is_err());
}
