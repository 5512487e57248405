pub mod chunk;
pub mod enable;

use std::sync::Arc;

use ard_log::debug;
use rustc_hash::FxHashMap;

use crate::{
    archetype::chunk::{Chunk, ChunkGroup, ChunkLayout},
    component::{ComponentId, Components},
    key::TypeKey,
};

/// An archetype represents a logical set of components. Entities with exactly this set of
/// components live in the archetype's chunks.
#[derive(Debug)]
pub struct Archetype {
    id: ArchetypeId,
    layout: Arc<ChunkLayout>,
    chunks: Vec<Chunk>,
    edges: Edges,
}

/// Cached archetype transitions. Filled lazily as entities gain or lose components.
#[derive(Debug, Default)]
struct Edges {
    add: FxHashMap<ComponentId, ArchetypeId>,
    remove: FxHashMap<ComponentId, ArchetypeId>,
}

/// Unique ID for an archetype.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArchetypeId(u32);

/// Holds a collection of archetypes.
#[derive(Debug)]
pub struct Archetypes {
    /// All archetypes.
    archetypes: Vec<Archetype>,
    /// Maps archetype type keys to their unique ID.
    to_archetype: FxHashMap<TypeKey, ArchetypeId>,
    /// Byte budget per chunk used to derive chunk capacities.
    chunk_bytes: usize,
}

impl Archetype {
    #[inline]
    pub fn id(&self) -> ArchetypeId {
        self.id
    }

    #[inline]
    pub fn key(&self) -> &TypeKey {
        self.layout.key()
    }

    #[inline]
    pub fn layout(&self) -> &ChunkLayout {
        &self.layout
    }

    #[inline]
    pub(crate) fn shared_layout(&self) -> &Arc<ChunkLayout> {
        &self.layout
    }

    #[inline]
    pub fn chunk_capacity(&self) -> usize {
        self.layout.capacity()
    }

    #[inline]
    pub fn enableable_count(&self) -> usize {
        self.layout.enableable_count()
    }

    #[inline]
    pub fn enableable_index_of(&self, id: ComponentId) -> Option<usize> {
        self.layout.enableable_index_of(id)
    }

    #[inline]
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    #[inline]
    pub fn chunks_mut(&mut self) -> &mut [Chunk] {
        &mut self.chunks
    }

    /// Total number of entities in the archetype.
    pub fn len(&self) -> usize {
        self.chunks.iter().map(|chunk| chunk.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.iter().all(|chunk| chunk.is_empty())
    }

    /// Finds a chunk of `group` with at least one free slot, allocating one if needed. Returns
    /// the chunk's index.
    pub(crate) fn chunk_with_space(&mut self, group: ChunkGroup) -> usize {
        if let Some(idx) = self
            .chunks
            .iter()
            .rposition(|chunk| chunk.group() == group && !chunk.is_full())
        {
            return idx;
        }
        self.push_chunk(group)
    }

    /// Allocates an empty chunk of `group` at the end of the chunk list. Returns its index.
    pub(crate) fn push_chunk(&mut self, group: ChunkGroup) -> usize {
        debug!(
            "allocating chunk {} for archetype {:?} (capacity {})",
            self.chunks.len(),
            self.id,
            self.layout.capacity()
        );
        self.chunks.push(Chunk::new(self.layout.clone(), group));
        self.chunks.len() - 1
    }

    /// Adds a chunk built elsewhere. Returns its index.
    pub(crate) fn adopt_chunk(&mut self, chunk: Chunk) -> usize {
        debug_assert!(chunk.shares_layout(&self.layout));
        self.chunks.push(chunk);
        self.chunks.len() - 1
    }

    /// Removes every chunk from the archetype.
    pub(crate) fn take_chunks(&mut self) -> Vec<Chunk> {
        std::mem::take(&mut self.chunks)
    }

    /// Releases the chunk at `idx` if it holds no entities. If another chunk was moved into
    /// `idx` to fill the hole, returns `true` so the caller can fix up entity locations.
    pub(crate) fn release_if_empty(&mut self, idx: usize) -> bool {
        if !self.chunks[idx].is_empty() {
            return false;
        }

        debug!("releasing chunk {idx} of archetype {:?}", self.id);
        self.chunks.swap_remove(idx);
        idx < self.chunks.len()
    }

    /// Gets two distinct chunks mutably.
    ///
    /// # Panics
    /// Panics if `a == b` or either index is out of bounds.
    pub(crate) fn chunk_pair_mut(&mut self, a: usize, b: usize) -> (&mut Chunk, &mut Chunk) {
        pair_mut(&mut self.chunks, a, b)
    }
}

impl Archetypes {
    pub fn new(chunk_bytes: usize) -> Self {
        Archetypes {
            archetypes: Vec::default(),
            to_archetype: FxHashMap::default(),
            chunk_bytes,
        }
    }

    /// Gets a list of all archetypes.
    #[inline]
    pub fn archetypes(&self) -> &[Archetype] {
        &self.archetypes
    }

    #[inline]
    pub(crate) fn archetypes_mut(&mut self) -> &mut [Archetype] {
        &mut self.archetypes
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.archetypes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.archetypes.is_empty()
    }

    /// # Panics
    /// Panics if the ID did not come from this collection.
    #[inline]
    pub fn get(&self, id: ArchetypeId) -> &Archetype {
        &self.archetypes[usize::from(id)]
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, id: ArchetypeId) -> &mut Archetype {
        &mut self.archetypes[usize::from(id)]
    }

    /// Gets two distinct archetypes mutably.
    #[inline]
    pub(crate) fn pair_mut(
        &mut self,
        a: ArchetypeId,
        b: ArchetypeId,
    ) -> (&mut Archetype, &mut Archetype) {
        pair_mut(&mut self.archetypes, usize::from(a), usize::from(b))
    }

    /// Finds the archetype matching the type key.
    #[inline]
    pub fn find(&self, type_key: &TypeKey) -> Option<ArchetypeId> {
        self.to_archetype.get(type_key).copied()
    }

    /// Finds or creates the archetype for a type key. Every component in the key must be
    /// registered in `components`.
    pub fn get_or_create(&mut self, type_key: &TypeKey, components: &Components) -> ArchetypeId {
        if let Some(id) = self.to_archetype.get(type_key) {
            return *id;
        }

        let infos = type_key
            .iter()
            .map(|id| components.info(*id).clone())
            .collect();
        let layout = ChunkLayout::new(type_key.clone(), infos, self.chunk_bytes);
        let id = ArchetypeId::from(self.archetypes.len());

        debug!(
            "created archetype {id:?} with {} components ({} enableable), chunk capacity {}",
            type_key.len(),
            layout.enableable_count(),
            layout.capacity()
        );

        self.archetypes.push(Archetype {
            id,
            layout: Arc::new(layout),
            chunks: Vec::default(),
            edges: Edges::default(),
        });
        self.to_archetype.insert(type_key.clone(), id);
        id
    }

    /// Archetype reached by adding `component` to `src`. Returns `src` if it already has it.
    pub fn transition_add(
        &mut self,
        src: ArchetypeId,
        component: ComponentId,
        components: &Components,
    ) -> ArchetypeId {
        if let Some(dst) = self.get(src).edges.add.get(&component) {
            return *dst;
        }

        let mut key = self.get(src).key().clone();
        key.add_by_id(component);
        let dst = self.get_or_create(&key, components);

        self.get_mut(src).edges.add.insert(component, dst);
        if dst != src {
            self.get_mut(dst).edges.remove.insert(component, src);
        }
        dst
    }

    /// Archetype reached by removing `component` from `src`. Returns `src` if it lacks it.
    pub fn transition_remove(
        &mut self,
        src: ArchetypeId,
        component: ComponentId,
        components: &Components,
    ) -> ArchetypeId {
        if let Some(dst) = self.get(src).edges.remove.get(&component) {
            return *dst;
        }

        let mut key = self.get(src).key().clone();
        key.remove_by_id(component);
        let dst = self.get_or_create(&key, components);

        self.get_mut(src).edges.remove.insert(component, dst);
        if dst != src {
            self.get_mut(dst).edges.add.insert(component, src);
        }
        dst
    }
}

#[inline]
fn pair_mut<T>(items: &mut [T], a: usize, b: usize) -> (&mut T, &mut T) {
    assert_ne!(a, b, "attempt to borrow the same element twice");
    if a < b {
        let (lo, hi) = items.split_at_mut(b);
        (&mut lo[a], &mut hi[0])
    } else {
        let (lo, hi) = items.split_at_mut(a);
        (&mut hi[0], &mut lo[b])
    }
}

impl From<u32> for ArchetypeId {
    #[inline]
    fn from(item: u32) -> Self {
        ArchetypeId(item)
    }
}

impl From<usize> for ArchetypeId {
    #[inline]
    fn from(item: usize) -> Self {
        ArchetypeId(item as u32)
    }
}

impl From<ArchetypeId> for u32 {
    #[inline]
    fn from(item: ArchetypeId) -> Self {
        item.0
    }
}

impl From<ArchetypeId> for usize {
    #[inline]
    fn from(item: ArchetypeId) -> Self {
        item.0 as usize
    }
}
