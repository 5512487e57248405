use ard_ecs::{archetype::enable::WordCursor, prelude::*};
use ard_log::{debug, warn};
use rustc_hash::FxHashMap;

use crate::{
    entity_map::EntityMap,
    error::SaveLoadError,
    format::SaveFormat,
    loader::{ComponentLoader, GenericComponentLoader},
    save_data::{SaveData, SavedChunk},
    LoadContext, SaveLoad,
};

/// Rebuilds entities out of [`SaveData`]. Every saved component type must be passed to
/// [`Loader::include`].
pub struct Loader<F: SaveFormat> {
    meta_data: FxHashMap<String, LoadingMetaData>,
    _format: std::marker::PhantomData<F>,
}

impl<F: SaveFormat> Default for Loader<F> {
    fn default() -> Self {
        Self {
            meta_data: FxHashMap::default(),
            _format: Default::default(),
        }
    }
}

impl<F: SaveFormat + 'static> Loader<F> {
    pub fn include<C: Component + SaveLoad>(mut self) -> Self {
        self.meta_data.insert(
            C::NAME.into(),
            LoadingMetaData {
                register: |world| world.register::<C>(),
                new_loader: |ctx, raw| {
                    let mut loader = ComponentLoader::<F, C>::default();
                    loader.deserialize_all(ctx, raw)?;
                    Ok(Box::new(loader))
                },
            },
        );
        self
    }

    /// Loads the save into new entities. On failure every entity created by the load is
    /// destroyed again.
    ///
    /// The returned map gives the entity created for every saved position.
    pub fn load(&self, data: SaveData, world: &mut World) -> Result<EntityMap, SaveLoadError> {
        // Archetypes are created in saved order so a fresh world stores them in the same order.
        for archetype in &data.archetypes {
            let ids = archetype
                .components
                .iter()
                .map(|name| self.meta(name).map(|meta| (meta.register)(world)))
                .collect::<Result<Vec<_>, _>>()?;
            world.archetype_of(ids);
        }

        let entities = world.spawn_empty(data.entity_count);
        match self.load_into(data, world, &entities) {
            Ok(map) => Ok(map),
            Err(err) => {
                if let Err(cleanup) = world.destroy_batch(&entities) {
                    warn!("unable to clean up after a failed load: {cleanup}");
                }
                Err(err)
            }
        }
    }

    /// Loads the save into existing entities, one per saved position. Components the entities
    /// already had are replaced.
    pub fn load_into(
        &self,
        data: SaveData,
        world: &mut World,
        entities: &[Entity],
    ) -> Result<EntityMap, SaveLoadError> {
        let ctx = LoadContext {
            entity_map: EntityMap::new_from_entities(entities),
        };
        if ctx.entity_map.len() != data.entity_count {
            return Err(SaveLoadError::EntityCount {
                expected: data.entity_count,
                found: ctx.entity_map.len(),
            });
        }

        let archetype_count = data.archetypes.len();
        let mut restores = Vec::default();
        for archetype in data.archetypes {
            for chunk in archetype.chunks {
                restores.push(self.read_chunk(&ctx, world, chunk)?);
            }
        }
        world.restore_chunks(restores)?;

        debug!(
            "loaded {} entities across {archetype_count} archetypes",
            data.entity_count
        );
        Ok(ctx.entity_map)
    }

    fn meta(&self, type_name: &str) -> Result<&LoadingMetaData, SaveLoadError> {
        self.meta_data
            .get(type_name)
            .ok_or_else(|| SaveLoadError::UnknownComponent(type_name.into()))
    }

    /// Deserializes a saved chunk into the columns and enable masks it is rebuilt from.
    fn read_chunk(
        &self,
        ctx: &LoadContext,
        world: &mut World,
        chunk: SavedChunk,
    ) -> Result<ChunkRestore, SaveLoadError> {
        let targets = chunk
            .entities
            .iter()
            .map(|mapped| {
                ctx.entity_map
                    .from_map(*mapped)
                    .ok_or(SaveLoadError::UnmappedIndex(mapped.0))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut columns = Vec::with_capacity(chunk.buffers.len());
        for buffer in &chunk.buffers {
            let meta = self.meta(&buffer.type_name)?;
            let mut loader = (meta.new_loader)(ctx, &buffer.raw)?;
            if loader.len() != targets.len() {
                return Err(SaveLoadError::BufferLength {
                    type_name: buffer.type_name.clone(),
                    found: loader.len(),
                    expected: targets.len(),
                });
            }
            columns.push((loader.register(world), loader.take_column()));
        }

        let mut enable = Vec::with_capacity(chunk.enable.len());
        for run in &chunk.enable {
            let id = chunk
                .buffers
                .iter()
                .position(|buffer| buffer.type_name == run.type_name)
                .map(|i| columns[i].0)
                .ok_or_else(|| SaveLoadError::UnknownComponent(run.type_name.clone()))?;

            let bit_count = run.bit_count as usize;
            if bit_count != targets.len() {
                return Err(SaveLoadError::EnableRunLength {
                    type_name: run.type_name.clone(),
                    found: bit_count,
                    expected: targets.len(),
                });
            }
            enable.push((id, WordCursor::new(&run.words).read_words(bit_count)?));
        }

        Ok(ChunkRestore {
            entities: targets,
            group: chunk.group,
            columns,
            enable,
        })
    }
}

struct LoadingMetaData {
    register: fn(&mut World) -> ComponentId,
    new_loader:
        fn(&LoadContext, &[u8]) -> Result<Box<dyn GenericComponentLoader>, SaveLoadError>,
}
