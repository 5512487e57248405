use std::any::TypeId;

use ard_ecs::{archetype::enable::EnableWordWriter, prelude::*};
use ard_log::warn;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::{
    entity_map::{EntityMap, MappedEntity},
    error::SaveLoadError,
    format::SaveFormat,
    saver::{ComponentSaver, GenericSaver},
    SaveContext, SaveLoad,
};

/// Builds [`SaveData`] out of a world. Only component types passed to [`Saver::include`] are
/// written.
pub struct Saver<F: SaveFormat> {
    meta_data: FxHashMap<TypeId, SavingMetaData>,
    _format: std::marker::PhantomData<F>,
}

impl<F: SaveFormat> Default for Saver<F> {
    fn default() -> Self {
        Self {
            meta_data: FxHashMap::default(),
            _format: Default::default(),
        }
    }
}

impl<F: SaveFormat + 'static> Saver<F> {
    /// Skips a component type without warning about it.
    pub fn ignore<T: 'static>(mut self) -> Self {
        self.meta_data
            .insert(TypeId::of::<T>(), SavingMetaData::Ignore);
        self
    }

    pub fn include<C: Component + SaveLoad>(mut self) -> Self {
        self.meta_data.insert(
            TypeId::of::<C>(),
            SavingMetaData::Info {
                type_name: C::NAME,
                new_saver: || Box::new(ComponentSaver::<F, C>::default()),
            },
        );
        self
    }

    /// Saves every entity of the world. Entities are numbered in storage order: archetypes,
    /// then chunks, then slots.
    pub fn save(&self, world: &World) -> Result<SaveData, SaveLoadError> {
        let archetypes: Vec<_> = world
            .archetypes()
            .archetypes()
            .iter()
            .filter(|archetype| !archetype.is_empty())
            .collect();

        let entities: Vec<_> = archetypes
            .iter()
            .flat_map(|archetype| archetype.chunks())
            .flat_map(|chunk| chunk.entities().iter().copied())
            .collect();

        let ctx = SaveContext {
            entity_map: EntityMap::new_from_entities(&entities),
        };

        let archetypes = archetypes
            .into_iter()
            .map(|archetype| self.save_archetype(&ctx, archetype))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SaveData {
            entity_count: ctx.entity_map.len(),
            archetypes,
        })
    }

    fn save_archetype(
        &self,
        ctx: &SaveContext,
        archetype: &Archetype,
    ) -> Result<SavedArchetype, SaveLoadError> {
        let mut columns = Vec::with_capacity(archetype.layout().infos().len());
        for (column, info) in archetype.layout().infos().iter().enumerate() {
            match self.meta_data.get(&info.type_id()) {
                Some(SavingMetaData::Info {
                    type_name,
                    new_saver,
                }) => columns.push(SavedColumn {
                    column,
                    type_name: *type_name,
                    new_saver: *new_saver,
                    enable_idx: archetype.layout().enable_index_of_column(column),
                }),
                Some(SavingMetaData::Ignore) => {}
                None => warn!(
                    "component `{}` has no saver and is left out of the save",
                    info.name()
                ),
            }
        }

        // Buffers are written in name order so saves do not depend on registration order.
        columns.sort_unstable_by_key(|column| column.type_name);

        let chunks = archetype
            .chunks()
            .iter()
            .map(|chunk| save_chunk(ctx, chunk, &columns))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SavedArchetype {
            components: columns
                .iter()
                .map(|column| column.type_name.to_owned())
                .collect(),
            chunks,
        })
    }
}

fn save_chunk(
    ctx: &SaveContext,
    chunk: &Chunk,
    columns: &[SavedColumn],
) -> Result<SavedChunk, SaveLoadError> {
    let entities = chunk
        .entities()
        .iter()
        .map(|e| {
            ctx.entity_map
                .to_map(*e)
                .ok_or(SaveLoadError::UnmappedEntity(*e))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut buffers = Vec::with_capacity(columns.len());
    let mut enable = Vec::default();
    for column in columns {
        let mut saver = (column.new_saver)();
        saver.add(ctx, chunk, column.column);
        buffers.push(SavedDataBuffer {
            type_name: column.type_name.to_owned(),
            raw: saver.serialize_all()?,
        });

        if let Some(enable_idx) = column.enable_idx {
            let mut run = SavedEnableRun {
                type_name: column.type_name.to_owned(),
                bit_count: 0,
                words: Vec::default(),
            };
            chunk.write_enable_words(enable_idx, &mut run)?;
            enable.push(run);
        }
    }

    Ok(SavedChunk {
        group: chunk.group(),
        entities,
        buffers,
        enable,
    })
}

enum SavingMetaData {
    Ignore,
    Info {
        type_name: &'static str,
        new_saver: fn() -> Box<dyn GenericSaver>,
    },
}

struct SavedColumn {
    column: usize,
    type_name: &'static str,
    new_saver: fn() -> Box<dyn GenericSaver>,
    enable_idx: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveData {
    pub entity_count: usize,
    pub archetypes: Vec<SavedArchetype>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedArchetype {
    /// Names of the saved component types, sorted.
    pub components: Vec<String>,
    pub chunks: Vec<SavedChunk>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedChunk {
    pub group: ChunkGroup,
    pub entities: Vec<MappedEntity>,
    /// One buffer per saved component type, in the order of [`SavedArchetype::components`].
    pub buffers: Vec<SavedDataBuffer>,
    /// One run per saved enableable component type.
    pub enable: Vec<SavedEnableRun>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedDataBuffer {
    pub type_name: String,
    pub raw: Vec<u8>,
}

/// Enable bits of one component type for every entity of a chunk, lowest slot first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedEnableRun {
    pub type_name: String,
    pub bit_count: u32,
    pub words: Vec<u64>,
}

impl EnableWordWriter for SavedEnableRun {
    fn write_words(&mut self, words: &[u64], bit_count: usize) {
        self.bit_count = bit_count as u32;
        self.words.extend_from_slice(words);
    }
}

impl SaveData {
    #[inline]
    pub fn to_bytes<F: SaveFormat>(&self) -> Result<Vec<u8>, SaveLoadError> {
        F::serialize(self)
    }

    #[inline]
    pub fn from_bytes<F: SaveFormat>(data: &[u8]) -> Result<Self, SaveLoadError> {
        F::deserialize(data)
    }
}
