use std::num::NonZeroU32;

use crate::{
    archetype::ArchetypeId,
    entity::Entity,
    error::{EcsError, EcsResult},
};

/// Where an entity's components live.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct EntityLocation {
    pub archetype: ArchetypeId,
    pub chunk: u32,
    pub slot: u32,
}

/// Description of an entity ID within the world.
#[derive(Debug, Copy, Clone)]
struct EntityInfo {
    /// Current generation of the ID. Handles with a different generation are stale.
    generation: NonZeroU32,
    /// `None` while the ID is free.
    location: Option<EntityLocation>,
}

/// Container for the entity handles belonging to a world.
#[derive(Debug, Default)]
pub struct Entities {
    infos: Vec<EntityInfo>,
    /// IDs available for reuse.
    free: Vec<u32>,
    alive: usize,
}

impl Entities {
    /// Number of living entities.
    #[inline]
    pub fn len(&self) -> usize {
        self.alive
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.alive == 0
    }

    #[inline]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.location(entity).is_ok()
    }

    /// Allocates a handle placed at `location`.
    pub(crate) fn alloc(&mut self, location: EntityLocation) -> Entity {
        self.alive += 1;
        match self.free.pop() {
            Some(id) => {
                let info = &mut self.infos[id as usize];
                info.location = Some(location);
                Entity::new(id, info.generation)
            }
            None => {
                let id = self.infos.len() as u32;
                let generation = NonZeroU32::MIN;
                self.infos.push(EntityInfo {
                    generation,
                    location: Some(location),
                });
                Entity::new(id, generation)
            }
        }
    }

    /// Frees a handle, invalidating every copy of it.
    pub(crate) fn free(&mut self, entity: Entity) -> EcsResult<()> {
        self.location(entity)?;

        let info = &mut self.infos[entity.id() as usize];
        info.location = None;
        info.generation = info.generation.checked_add(1).unwrap_or(NonZeroU32::MIN);
        self.free.push(entity.id());
        self.alive -= 1;
        Ok(())
    }

    #[inline]
    pub fn location(&self, entity: Entity) -> EcsResult<EntityLocation> {
        self.infos
            .get(entity.id() as usize)
            .filter(|info| info.generation.get() == entity.generation())
            .and_then(|info| info.location)
            .ok_or(EcsError::DeadEntity(entity))
    }

    /// Updates the location of a living entity.
    #[inline]
    pub(crate) fn set_location(&mut self, entity: Entity, location: EntityLocation) {
        let info = &mut self.infos[entity.id() as usize];
        debug_assert_eq!(info.generation.get(), entity.generation());
        info.location = Some(location);
    }
}
