use ard_ecs::prelude::Entity;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Position of an entity within a save.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MappedEntity(pub u32);

/// Two-way mapping between entity handles and their positions in a save.
#[derive(Debug, Default, Clone)]
pub struct EntityMap {
    src_to_dst: FxHashMap<Entity, MappedEntity>,
    dst_to_src: Vec<Entity>,
}

impl EntityMap {
    /// Maps entities in order. Repeated entities keep their first position.
    pub fn new_from_entities(entities: &[Entity]) -> Self {
        let mut s = Self::default();
        entities.iter().for_each(|e| {
            s.insert(*e);
        });
        s
    }

    /// Gets the position of an entity, appending it if it was not mapped yet.
    pub fn insert(&mut self, entity: Entity) -> MappedEntity {
        *self.src_to_dst.entry(entity).or_insert_with(|| {
            let new_id = MappedEntity(self.dst_to_src.len() as u32);
            self.dst_to_src.push(entity);
            new_id
        })
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.dst_to_src.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.dst_to_src.is_empty()
    }

    #[inline(always)]
    pub fn to_map(&self, entity: Entity) -> Option<MappedEntity> {
        self.src_to_dst.get(&entity).copied()
    }

    #[inline(always)]
    pub fn from_map(&self, mapped: MappedEntity) -> Option<Entity> {
        self.dst_to_src.get(mapped.0 as usize).copied()
    }

    /// Iterates over every mapping in position order.
    pub fn iter(&self) -> impl Iterator<Item = (MappedEntity, Entity)> + '_ {
        self.dst_to_src
            .iter()
            .enumerate()
            .map(|(i, e)| (MappedEntity(i as u32), *e))
    }
}
