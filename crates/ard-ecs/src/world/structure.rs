use std::any::Any;

use ard_log::trace;
use rustc_hash::FxHashSet;

use crate::{
    archetype::{
        chunk::{Chunk, ChunkGroup, TransferPlan},
        ArchetypeId,
    },
    bits::{Mask128, MASK_BITS},
    component::{
        column::{AnyColumn, Column},
        pack::ComponentPack,
        Component, ComponentExt, ComponentId,
    },
    entity::Entity,
    error::{EcsError, EcsResult},
    key::TypeKey,
    world::{entities::EntityLocation, World},
};

/// Records of one chunk for [`World::restore_chunks`].
pub struct ChunkRestore {
    pub entities: Vec<Entity>,
    pub group: ChunkGroup,
    /// One column per component, each holding a value for every entity.
    pub columns: Vec<(ComponentId, Box<dyn AnyColumn>)>,
    /// Bits of enableable components, bit `i` belonging to `entities[i]`. Components left out
    /// start enabled.
    pub enable: Vec<(ComponentId, Mask128)>,
}

impl World {
    /// Creates one entity per element of the pack in the default group.
    ///
    /// # Panics
    /// Panics if the pack's vectors differ in length or the pack names a type twice.
    pub fn spawn_batch(&mut self, pack: impl ComponentPack) -> Vec<Entity> {
        self.spawn_batch_in_group(pack, ChunkGroup::default())
    }

    /// Creates one entity per element of the pack in the given group.
    pub fn spawn_batch_in_group(
        &mut self,
        pack: impl ComponentPack,
        group: ChunkGroup,
    ) -> Vec<Entity> {
        let count = pack.len();
        let columns = pack.into_columns(&mut self.components);
        self.spawn_columns(columns, count, group)
    }

    /// Creates `count` entities with no components.
    pub fn spawn_empty(&mut self, count: usize) -> Vec<Entity> {
        self.spawn_columns(Vec::default(), count, ChunkGroup::default())
    }

    /// Creates `count` entities whose components are taken from full columns. Every column must
    /// hold `count` values of a distinct registered type.
    pub fn spawn_columns(
        &mut self,
        mut columns: Vec<(ComponentId, Box<dyn AnyColumn>)>,
        count: usize,
        group: ChunkGroup,
    ) -> Vec<Entity> {
        columns.sort_unstable_by_key(|(id, _)| *id);
        assert!(
            columns.windows(2).all(|pair| pair[0].0 != pair[1].0),
            "component pack contains a duplicate type"
        );
        assert!(
            columns.iter().all(|(_, column)| column.len() == count),
            "component columns differ in length"
        );

        let key = TypeKey::from_ids(columns.iter().map(|(id, _)| *id));
        let archetype_id = self.archetypes.get_or_create(&key, &self.components);
        let mut sources: Vec<_> = columns.into_iter().map(|(_, column)| column).collect();
        let version = self.versions.next_version();

        let archetype = self.archetypes.get_mut(archetype_id);
        let mut spawned = Vec::with_capacity(count);
        while spawned.len() < count {
            let chunk_idx = archetype.chunk_with_space(group);
            let chunk = &mut archetype.chunks_mut()[chunk_idx];
            let batch = chunk.free().min(count - spawned.len());

            let first_slot = chunk.len();
            let entities: Vec<_> = (0..batch)
                .map(|i| {
                    self.entities.alloc(EntityLocation {
                        archetype: archetype_id,
                        chunk: chunk_idx as u32,
                        slot: (first_slot + i) as u32,
                    })
                })
                .collect();

            chunk.push_front_of(&entities, &mut sources, version);
            spawned.extend(entities);
        }

        trace!("spawned {count} entities in archetype {archetype_id:?}");
        self.after_mutation();
        spawned
    }

    /// Replaces every component of an entity with the single-entity pack. The entity keeps its
    /// handle and group; its enable state starts over as all enabled.
    ///
    /// # Panics
    /// Panics if the pack does not hold exactly one entity or names a type twice.
    pub fn set_components(&mut self, entity: Entity, pack: impl ComponentPack) -> EcsResult<()> {
        assert_eq!(pack.len(), 1, "set_components takes a pack of one entity");
        let group = self.group_of(entity)?;
        let columns = pack.into_columns(&mut self.components);
        self.set_columns(entity, columns, group)
    }

    /// Same as [`World::set_components`] with single-value type-erased columns and an explicit
    /// destination group.
    pub fn set_columns(
        &mut self,
        entity: Entity,
        mut columns: Vec<(ComponentId, Box<dyn AnyColumn>)>,
        group: ChunkGroup,
    ) -> EcsResult<()> {
        self.entities.location(entity)?;
        columns.sort_unstable_by_key(|(id, _)| *id);
        assert!(
            columns.windows(2).all(|pair| pair[0].0 != pair[1].0),
            "component pack contains a duplicate type"
        );
        assert!(
            columns.iter().all(|(_, column)| column.len() == 1),
            "expected one value per component"
        );

        let key = TypeKey::from_ids(columns.iter().map(|(id, _)| *id));
        let dst = self.archetypes.get_or_create(&key, &self.components);
        let mut sources: Vec<_> = columns.into_iter().map(|(_, column)| column).collect();
        let version = self.versions.next_version();

        self.detach(entity)?;

        let archetype = self.archetypes.get_mut(dst);
        let chunk_idx = archetype.chunk_with_space(group);
        let chunk = &mut archetype.chunks_mut()[chunk_idx];
        let slot = chunk.len();
        chunk.push_front_of(&[entity], &mut sources, version);
        self.entities.set_location(
            entity,
            EntityLocation {
                archetype: dst,
                chunk: chunk_idx as u32,
                slot: slot as u32,
            },
        );

        trace!("replaced the components of {entity:?}");
        self.after_mutation();
        Ok(())
    }

    /// Replaces every component of existing entities, rebuilding chunks as listed. Each
    /// [`ChunkRestore`] starts a fresh chunk of its archetype and is only split when the
    /// archetype's chunks are smaller, so restored chunks keep their order and their records keep
    /// their slots. No entity is touched if validation fails.
    ///
    /// # Panics
    /// Panics if a restore names a type twice or one of its columns does not hold a value per
    /// entity.
    pub fn restore_chunks(&mut self, mut chunks: Vec<ChunkRestore>) -> EcsResult<()> {
        let mut seen = FxHashSet::default();
        let mut targets = Vec::with_capacity(chunks.len());
        for chunk in &mut chunks {
            if chunk.entities.len() > MASK_BITS {
                return Err(EcsError::SlotOutOfBounds {
                    slot: chunk.entities.len(),
                    count: MASK_BITS,
                });
            }
            for entity in &chunk.entities {
                self.entities.location(*entity)?;
                if !seen.insert(*entity) {
                    return Err(EcsError::DuplicateEntity(*entity));
                }
            }

            chunk.columns.sort_unstable_by_key(|(id, _)| *id);
            assert!(
                chunk.columns.windows(2).all(|pair| pair[0].0 != pair[1].0),
                "component pack contains a duplicate type"
            );
            assert!(
                chunk
                    .columns
                    .iter()
                    .all(|(_, column)| column.len() == chunk.entities.len()),
                "component columns differ in length"
            );

            let archetype_id = self.archetype_of(chunk.columns.iter().map(|(id, _)| *id));
            let archetype = self.archetypes.get(archetype_id);
            let enable = chunk
                .enable
                .iter()
                .map(|(id, mask)| {
                    let info = self.components.info(*id);
                    match archetype.enableable_index_of(*id) {
                        Some(enable_idx) => Ok((enable_idx, *mask)),
                        None if info.is_enableable() => Err(EcsError::MissingComponent(
                            chunk.entities.first().copied().unwrap_or(Entity::null()),
                            info.name(),
                        )),
                        None => Err(EcsError::NotEnableable(info.name())),
                    }
                })
                .collect::<EcsResult<Vec<_>>>()?;
            targets.push((archetype_id, enable));
        }

        for entity in chunks.iter().flat_map(|chunk| chunk.entities.iter()) {
            self.detach(*entity)?;
        }

        let version = self.versions.next_version();
        let chunk_count = chunks.len();
        for (restore, (archetype_id, enable)) in chunks.into_iter().zip(targets) {
            let mut sources: Vec<_> = restore.columns.into_iter().map(|(_, c)| c).collect();
            let archetype = self.archetypes.get_mut(archetype_id);

            let mut placed = 0;
            while placed < restore.entities.len() {
                let chunk_idx = archetype.push_chunk(restore.group);
                let chunk = &mut archetype.chunks_mut()[chunk_idx];
                let batch = chunk.free().min(restore.entities.len() - placed);
                let entities = &restore.entities[placed..placed + batch];

                chunk.push_front_of(entities, &mut sources, version);
                for (enable_idx, mask) in &enable {
                    chunk.load_enable_mask(*enable_idx, mask.shift_right(placed as u32))?;
                }
                for (slot, entity) in entities.iter().enumerate() {
                    self.entities.set_location(
                        *entity,
                        EntityLocation {
                            archetype: archetype_id,
                            chunk: chunk_idx as u32,
                            slot: slot as u32,
                        },
                    );
                }
                placed += batch;
            }
        }

        trace!("restored {} entities into {chunk_count} chunks", seen.len());
        self.after_mutation();
        Ok(())
    }

    /// Destroys an entity. Fails if the entity is not alive.
    pub fn destroy(&mut self, entity: Entity) -> EcsResult<()> {
        self.destroy_one(entity)?;
        self.after_mutation();
        Ok(())
    }

    /// Destroys a list of entities, one at a time. Stops at the first entity that is not alive;
    /// entities before it stay destroyed.
    pub fn destroy_batch(&mut self, entities: &[Entity]) -> EcsResult<()> {
        for entity in entities {
            self.destroy_one(*entity)?;
        }
        self.after_mutation();
        Ok(())
    }

    fn destroy_one(&mut self, entity: Entity) -> EcsResult<()> {
        self.detach(entity)?;
        self.entities.free(entity)?;
        trace!("destroyed {entity:?}");
        Ok(())
    }

    /// Takes an entity's record out of its chunk. The entity stays alive with a stale location
    /// until it is placed again or freed.
    fn detach(&mut self, entity: Entity) -> EcsResult<()> {
        let location = self.entities.location(entity)?;
        let moved = self.chunk_mut(location).swap_remove(location.slot as usize)?;
        if let Some(moved) = moved {
            self.entities.set_location(moved, location);
        }
        self.release_chunk_if_empty(location.archetype, location.chunk as usize);
        Ok(())
    }

    /// Adds a component to an entity, moving it to a new archetype. If the entity already has a
    /// component of this type, the value is replaced in place and its enable state is kept.
    pub fn add_component<C: Component>(&mut self, entity: Entity, component: C) -> EcsResult<()> {
        self.add_component_boxed(entity, Box::new(component))
    }

    /// Type-erased version of [`World::add_component`].
    pub fn add_component_boxed(
        &mut self,
        entity: Entity,
        component: Box<dyn ComponentExt>,
    ) -> EcsResult<()> {
        let location = self.entities.location(entity)?;
        let id = component.register(&mut self.components);
        let version = self.versions.next_version();

        if let Some(column) = self
            .archetypes
            .get(location.archetype)
            .layout()
            .column_of(id)
        {
            self.chunk_mut(location).replace_component(
                column,
                location.slot as usize,
                component.into_any(),
                version,
            );
            return Ok(());
        }

        let dst = self
            .archetypes
            .transition_add(location.archetype, id, &self.components);
        let group = self.chunk(location).group();
        self.relocate(entity, location, dst, group, Some(component.into_any()), version)?;
        self.after_mutation();
        Ok(())
    }

    /// Removes a component from an entity, moving it to a new archetype.
    pub fn remove_component<C: Component>(&mut self, entity: Entity) -> EcsResult<()> {
        self.entities.location(entity)?;
        let id = self
            .components
            .id_of::<C>()
            .ok_or(EcsError::MissingComponent(entity, C::NAME))?;
        self.remove_component_by_id(entity, id)
    }

    /// Same as [`World::remove_component`] with the component type given by ID.
    pub fn remove_component_by_id(&mut self, entity: Entity, id: ComponentId) -> EcsResult<()> {
        let location = self.entities.location(entity)?;
        if !self.archetypes.get(location.archetype).key().contains(id) {
            let name = self.components.get(id).map_or("<unregistered>", |info| info.name());
            return Err(EcsError::MissingComponent(entity, name));
        }

        let version = self.versions.next_version();
        let dst = self
            .archetypes
            .transition_remove(location.archetype, id, &self.components);
        let group = self.chunk(location).group();
        self.relocate(entity, location, dst, group, None, version)?;
        self.after_mutation();
        Ok(())
    }

    /// Moves an entity into a chunk of the given group. Components and enable state are kept.
    pub fn set_group(&mut self, entity: Entity, group: ChunkGroup) -> EcsResult<()> {
        let location = self.entities.location(entity)?;
        if self.chunk(location).group() == group {
            return Ok(());
        }

        let version = self.versions.next_version();
        self.relocate(entity, location, location.archetype, group, None, version)?;
        self.after_mutation();
        Ok(())
    }

    /// Group of the chunk holding an entity.
    pub fn group_of(&self, entity: Entity) -> EcsResult<ChunkGroup> {
        Ok(self.chunk(self.entities.location(entity)?).group())
    }

    /// Creates `count` copies of an entity in the same archetype and group. Enable state is copied
    /// from the source.
    pub fn instantiate(&mut self, source: Entity, count: usize) -> EcsResult<Vec<Entity>> {
        let location = self.entities.location(source)?;
        let src_chunk = location.chunk as usize;
        let src_slot = location.slot as usize;
        let group = self.chunk(location).group();
        let version = self.versions.next_version();

        let archetype = self.archetypes.get_mut(location.archetype);
        let plan = TransferPlan::identity(archetype.layout());
        let mut created = Vec::with_capacity(count);
        while created.len() < count {
            let dst_chunk = archetype.chunk_with_space(group);
            let first_slot = archetype.chunks()[dst_chunk].len();
            let batch = archetype.chunks()[dst_chunk]
                .free()
                .min(count - created.len());

            let entities: Vec<_> = (0..batch)
                .map(|i| {
                    self.entities.alloc(EntityLocation {
                        archetype: location.archetype,
                        chunk: dst_chunk as u32,
                        slot: (first_slot + i) as u32,
                    })
                })
                .collect();

            if dst_chunk == src_chunk {
                archetype.chunks_mut()[src_chunk].clone_row_within(src_slot, &entities, version)?;
            } else {
                let (src, dst) = archetype.chunk_pair_mut(src_chunk, dst_chunk);
                src.clone_row_to(src_slot, dst, &plan, &entities, version)?;
            }
            created.extend(entities);
        }

        trace!("instantiated {count} copies of {source:?}");
        self.after_mutation();
        Ok(created)
    }

    /// Adds a component to every entity of an archetype at once. Chunks are converted in place so
    /// no entity changes slot. Returns the archetype the entities now live in.
    pub fn add_component_to_archetype<C: Component>(
        &mut self,
        archetype: ArchetypeId,
        value: C,
    ) -> EcsResult<ArchetypeId> {
        let id = self.components.register::<C>();
        let dst = self
            .archetypes
            .transition_add(archetype, id, &self.components);
        if dst == archetype {
            return Ok(archetype);
        }

        self.relayout_archetype(archetype, dst, |count| {
            vec![Box::new(Column::from(vec![value.clone(); count])) as Box<dyn AnyColumn>]
        })?;
        Ok(dst)
    }

    /// Removes a component from every entity of an archetype at once. Returns the archetype the
    /// entities now live in.
    pub fn remove_component_from_archetype<C: Component>(
        &mut self,
        archetype: ArchetypeId,
    ) -> EcsResult<ArchetypeId> {
        let id = match self.components.id_of::<C>() {
            Some(id) => id,
            None => return Ok(archetype),
        };
        let dst = self
            .archetypes
            .transition_remove(archetype, id, &self.components);
        if dst == archetype {
            return Ok(archetype);
        }

        self.relayout_archetype(archetype, dst, |_| Vec::default())?;
        Ok(dst)
    }

    fn relayout_archetype(
        &mut self,
        src: ArchetypeId,
        dst: ArchetypeId,
        mut added: impl FnMut(usize) -> Vec<Box<dyn AnyColumn>>,
    ) -> EcsResult<()> {
        let version = self.versions.next_version();
        let src_layout = self.archetypes.get(src).shared_layout().clone();
        let dst_layout = self.archetypes.get(dst).shared_layout().clone();
        let plan = TransferPlan::new(&src_layout, &dst_layout, Some);

        // Wider rows mean smaller chunks. Split chunks that would overflow before converting.
        let capacity = dst_layout.capacity();
        let identity = TransferPlan::identity(&src_layout);
        let mut chunks = Vec::default();
        for mut chunk in self.archetypes.get_mut(src).take_chunks() {
            while chunk.len() > capacity {
                let mut split = Chunk::new(src_layout.clone(), chunk.group());
                for _ in 0..(chunk.len() - capacity).min(capacity) {
                    chunk.move_row_to(chunk.len() - 1, &mut split, &identity, version)?;
                }
                chunks.push(split);
            }
            chunks.push(chunk);
        }

        let converted = chunks
            .into_iter()
            .map(|chunk| {
                let columns = added(chunk.len());
                chunk.relayout(dst_layout.clone(), &plan, columns, version)
            })
            .collect::<EcsResult<Vec<_>>>()?;

        let archetype = self.archetypes.get_mut(dst);
        for chunk in converted {
            let chunk_idx = archetype.adopt_chunk(chunk);
            for (slot, entity) in archetype.chunks()[chunk_idx].entities().iter().enumerate() {
                self.entities.set_location(
                    *entity,
                    EntityLocation {
                        archetype: dst,
                        chunk: chunk_idx as u32,
                        slot: slot as u32,
                    },
                );
            }
        }

        trace!("converted archetype {src:?} into {dst:?}");
        self.after_mutation();
        Ok(())
    }

    /// Moves an entity into a chunk of `dst` with the given group. `added` fills the one column
    /// the destination has that the source lacks, if any.
    pub(crate) fn relocate(
        &mut self,
        entity: Entity,
        src: EntityLocation,
        dst: ArchetypeId,
        group: ChunkGroup,
        added: Option<Box<dyn Any>>,
        version: u32,
    ) -> EcsResult<EntityLocation> {
        let src_chunk_idx = src.chunk as usize;

        let (dst_chunk_idx, dst_slot, moved) = if dst == src.archetype {
            let archetype = self.archetypes.get_mut(dst);
            let dst_chunk_idx = archetype.chunk_with_space(group);
            let plan = TransferPlan::identity(archetype.layout());
            let (src_chunk, dst_chunk) = archetype.chunk_pair_mut(src_chunk_idx, dst_chunk_idx);
            let dst_slot = dst_chunk.len();
            let moved = src_chunk.move_row_to(src.slot as usize, dst_chunk, &plan, version)?;
            (dst_chunk_idx, dst_slot, moved)
        } else {
            let dst_chunk_idx = self.archetypes.get_mut(dst).chunk_with_space(group);
            let (src_archetype, dst_archetype) = self.archetypes.pair_mut(src.archetype, dst);
            let plan = TransferPlan::new(src_archetype.layout(), dst_archetype.layout(), Some);

            let src_chunk = &mut src_archetype.chunks_mut()[src_chunk_idx];
            let dst_chunk = &mut dst_archetype.chunks_mut()[dst_chunk_idx];
            let dst_slot = dst_chunk.len();
            let moved = src_chunk.move_row_to(src.slot as usize, dst_chunk, &plan, version)?;

            debug_assert_eq!(plan.added().len(), usize::from(added.is_some()));
            if let (Some(column), Some(object)) = (plan.added().first(), added) {
                dst_chunk.push_component(*column, object);
            }
            (dst_chunk_idx, dst_slot, moved)
        };

        let location = EntityLocation {
            archetype: dst,
            chunk: dst_chunk_idx as u32,
            slot: dst_slot as u32,
        };
        self.entities.set_location(entity, location);
        if let Some(moved) = moved {
            self.entities.set_location(moved, src);
        }
        self.release_chunk_if_empty(src.archetype, src_chunk_idx);

        trace!("moved {entity:?} from {src:?} to {location:?}");
        self.entities.location(entity)
    }

    /// Releases an emptied chunk and fixes the locations of the entities in the chunk that took
    /// its index.
    pub(crate) fn release_chunk_if_empty(&mut self, archetype_id: ArchetypeId, chunk_idx: usize) {
        let archetype = self.archetypes.get_mut(archetype_id);
        if !archetype.release_if_empty(chunk_idx) {
            return;
        }

        for (slot, entity) in archetype.chunks()[chunk_idx].entities().iter().enumerate() {
            self.entities.set_location(
                *entity,
                EntityLocation {
                    archetype: archetype_id,
                    chunk: chunk_idx as u32,
                    slot: slot as u32,
                },
            );
        }
    }
}
