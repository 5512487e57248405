use std::ops::Range;

use crate::{
    archetype::chunk::Chunk,
    bits::Mask128,
    component::{Component, Components},
    entity::Entity,
    error::{EcsError, EcsResult},
    range::EnabledRanges,
};

/// A run of consecutive matching entities within one chunk.
pub struct Batch<'a> {
    chunk: &'a Chunk,
    components: &'a Components,
    range: Range<usize>,
}

/// Mutable version of [`Batch`].
pub struct BatchMut<'a> {
    chunk: &'a mut Chunk,
    components: &'a Components,
    range: Range<usize>,
    version: u32,
}

/// A chunk holding at least one matching entity, handed out during parallel iteration.
pub struct ChunkMut<'a> {
    chunk: &'a mut Chunk,
    components: &'a Components,
    mask: Mask128,
    version: u32,
}

#[inline]
fn column_of<C: Component>(chunk: &Chunk, components: &Components) -> Option<usize> {
    chunk.layout().column_of(components.id_of::<C>()?)
}

#[inline]
fn enable_index_of<C: Component>(chunk: &Chunk, components: &Components) -> EcsResult<usize> {
    if !C::ENABLEABLE {
        return Err(EcsError::NotEnableable(C::NAME));
    }

    components
        .id_of::<C>()
        .and_then(|id| chunk.layout().enableable_index_of(id))
        .ok_or(EcsError::MissingComponent(Entity::null(), C::NAME))
}

impl<'a> Batch<'a> {
    pub(crate) fn new(chunk: &'a Chunk, components: &'a Components, range: Range<usize>) -> Self {
        Self {
            chunk,
            components,
            range,
        }
    }

    /// Slots covered by the batch within its chunk.
    #[inline]
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.range.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    #[inline]
    pub fn chunk(&self) -> &'a Chunk {
        self.chunk
    }

    #[inline]
    pub fn entities(&self) -> &'a [Entity] {
        &self.chunk.entities()[self.range.clone()]
    }

    /// Components of type `C` for the batch. `None` if the archetype lacks `C`.
    #[inline]
    pub fn get<C: Component>(&self) -> Option<&'a [C]> {
        let column = column_of::<C>(self.chunk, self.components)?;
        Some(&self.chunk.column::<C>(column)[self.range.clone()])
    }
}

impl<'a> BatchMut<'a> {
    pub(crate) fn new(
        chunk: &'a mut Chunk,
        components: &'a Components,
        range: Range<usize>,
        version: u32,
    ) -> Self {
        Self {
            chunk,
            components,
            range,
            version,
        }
    }

    #[inline]
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.range.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    #[inline]
    pub fn entities(&self) -> &[Entity] {
        &self.chunk.entities()[self.range.clone()]
    }

    #[inline]
    pub fn get<C: Component>(&self) -> Option<&[C]> {
        let column = column_of::<C>(self.chunk, self.components)?;
        Some(&self.chunk.column::<C>(column)[self.range.clone()])
    }

    /// Mutable components of type `C` for the batch. Marks the column as changed.
    #[inline]
    pub fn get_mut<C: Component>(&mut self) -> Option<&mut [C]> {
        let column = column_of::<C>(self.chunk, self.components)?;
        let range = self.range.clone();
        Some(&mut self.chunk.column_mut::<C>(column, self.version)[range])
    }

    /// Enables or disables `C` for the entity at `index` within the batch. The batch itself
    /// was computed beforehand and does not change.
    pub fn set_enabled<C: Component>(&mut self, index: usize, value: bool) -> EcsResult<bool> {
        if index >= self.range.len() {
            return Err(EcsError::SlotOutOfBounds {
                slot: index,
                count: self.range.len(),
            });
        }

        let enable_idx = enable_index_of::<C>(self.chunk, self.components)?;
        self.chunk
            .set_enabled(enable_idx, self.range.start + index, value, self.version)
    }
}

impl<'a> ChunkMut<'a> {
    pub(crate) fn new(
        chunk: &'a mut Chunk,
        components: &'a Components,
        mask: Mask128,
        version: u32,
    ) -> Self {
        Self {
            chunk,
            components,
            mask,
            version,
        }
    }

    /// Matching slots of the chunk.
    #[inline]
    pub fn mask(&self) -> Mask128 {
        self.mask
    }

    /// Runs of matching slots.
    #[inline]
    pub fn ranges(&self) -> EnabledRanges {
        EnabledRanges::new(self.mask)
    }

    #[inline]
    pub fn chunk(&self) -> &Chunk {
        self.chunk
    }

    /// Every entity in the chunk, matching or not.
    #[inline]
    pub fn entities(&self) -> &[Entity] {
        self.chunk.entities()
    }

    /// Components of type `C` for every slot of the chunk.
    #[inline]
    pub fn get<C: Component>(&self) -> Option<&[C]> {
        let column = column_of::<C>(self.chunk, self.components)?;
        Some(self.chunk.column::<C>(column))
    }

    #[inline]
    pub fn get_mut<C: Component>(&mut self) -> Option<&mut [C]> {
        let column = column_of::<C>(self.chunk, self.components)?;
        Some(self.chunk.column_mut::<C>(column, self.version))
    }

    pub fn set_enabled<C: Component>(&mut self, slot: usize, value: bool) -> EcsResult<bool> {
        let enable_idx = enable_index_of::<C>(self.chunk, self.components)?;
        self.chunk.set_enabled(enable_idx, slot, value, self.version)
    }
}
