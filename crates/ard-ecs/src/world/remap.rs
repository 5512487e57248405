use ard_log::debug;
use rustc_hash::FxHashMap;

use crate::{
    archetype::{chunk::TransferPlan, ArchetypeId},
    component::ComponentId,
    entity::Entity,
    error::EcsResult,
    key::TypeKey,
    world::{entities::EntityLocation, World},
};

/// Maps entities of a source world to the entities created for them in a destination world.
#[derive(Debug, Default, Clone)]
pub struct EntityRemap {
    map: FxHashMap<Entity, Entity>,
}

impl EntityRemap {
    #[inline]
    pub fn get(&self, src: Entity) -> Option<Entity> {
        self.map.get(&src).copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// `(source, destination)` pairs in no particular order.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (Entity, Entity)> + '_ {
        self.map.iter().map(|(src, dst)| (*src, *dst))
    }
}

impl World {
    /// Moves every entity of `src` into this world. `src` is left empty but keeps its registered
    /// component types. Component types are matched by Rust type.
    pub fn move_from(&mut self, src: &mut World) -> EcsResult<EntityRemap> {
        let version = self.versions.next_version();
        let mut remap = EntityRemap::default();

        for src_idx in 0..src.archetypes.len() {
            let src_id = ArchetypeId::from(src_idx);
            if src.archetypes.get(src_id).is_empty() {
                continue;
            }

            let (dst_id, plan) = self.import_archetype(src, src_id);
            let src_archetype = src.archetypes.get_mut(src_id);
            let dst_archetype = self.archetypes.get_mut(dst_id);

            for src_chunk in src_archetype.chunks_mut() {
                let group = src_chunk.group();
                // Take from the back so no source entity changes slot.
                while let Some(&entity) = src_chunk.entities().last() {
                    let chunk_idx = dst_archetype.chunk_with_space(group);
                    let dst_chunk = &mut dst_archetype.chunks_mut()[chunk_idx];
                    let slot = dst_chunk.len();
                    src_chunk.move_row_to(src_chunk.len() - 1, dst_chunk, &plan, version)?;

                    let moved = self.entities.alloc(EntityLocation {
                        archetype: dst_id,
                        chunk: chunk_idx as u32,
                        slot: slot as u32,
                    });
                    dst_chunk.rename_entity(slot, moved);
                    src.entities.free(entity)?;
                    remap.map.insert(entity, moved);
                }
            }

            src_archetype.take_chunks();
        }

        debug!("moved {} entities between worlds", remap.len());
        self.after_mutation();
        src.after_mutation();
        Ok(remap)
    }

    /// Clones every entity of `src` into this world. Component types are matched by Rust type.
    pub fn copy_from(&mut self, src: &World) -> EcsResult<EntityRemap> {
        let version = self.versions.next_version();
        let mut remap = EntityRemap::default();

        for src_archetype in src.archetypes.archetypes() {
            if src_archetype.is_empty() {
                continue;
            }

            let (dst_id, plan) = self.import_archetype(src, src_archetype.id());
            let dst_archetype = self.archetypes.get_mut(dst_id);

            for src_chunk in src_archetype.chunks() {
                let group = src_chunk.group();
                for (slot, entity) in src_chunk.entities().iter().enumerate() {
                    let chunk_idx = dst_archetype.chunk_with_space(group);
                    let dst_chunk = &mut dst_archetype.chunks_mut()[chunk_idx];
                    let copy = self.entities.alloc(EntityLocation {
                        archetype: dst_id,
                        chunk: chunk_idx as u32,
                        slot: dst_chunk.len() as u32,
                    });

                    src_chunk.clone_row_to(slot, dst_chunk, &plan, &[copy], version)?;
                    remap.map.insert(*entity, copy);
                }
            }
        }

        debug!("copied {} entities between worlds", remap.len());
        self.after_mutation();
        Ok(remap)
    }

    /// Finds or creates the archetype matching a source world's archetype, registering component
    /// types as needed, and plans the column transfer between them.
    fn import_archetype(&mut self, src: &World, src_id: ArchetypeId) -> (ArchetypeId, TransferPlan) {
        let src_layout = src.archetypes.get(src_id).layout();

        let translate: FxHashMap<ComponentId, ComponentId> = src_layout
            .infos()
            .iter()
            .map(|info| (info.id(), self.components.register_info(info)))
            .collect();

        let key = TypeKey::from_ids(translate.values().copied());
        let dst_id = self.archetypes.get_or_create(&key, &self.components);
        let plan = TransferPlan::new(src_layout, self.archetypes.get(dst_id).layout(), |id| {
            translate.get(&id).copied()
        });
        (dst_id, plan)
    }
}
