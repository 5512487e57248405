pub mod iter;
pub mod mask;

use rayon::prelude::*;
use smallvec::SmallVec;

use crate::{
    archetype::{chunk::Chunk, Archetype, ArchetypeId, Archetypes},
    component::{Component, ComponentId, Components},
    key::TypeKey,
    query::{
        iter::{Batch, BatchMut, ChunkMut},
        mask::compose_mask,
    },
    range::EnabledRanges,
    world::World,
};

type Registrar = fn(&mut Components) -> ComponentId;

/// Describes which entities a query matches.
///
/// - `all`: the entity has the component, and it is enabled if enableable.
/// - `none`: the entity lacks the component, or it is disabled.
/// - `any`: the entity has at least one of the components enabled (non-enableable components
///   count as always enabled). An empty list matches everything.
#[derive(Default, Clone)]
pub struct QueryDesc {
    all: Vec<Registrar>,
    none: Vec<Registrar>,
    any: Vec<Registrar>,
}

/// Per archetype compilation of a query. Lists hold enableable type indices of the archetype.
#[derive(Debug, Clone)]
pub struct MatchingArchetype {
    pub archetype: ArchetypeId,
    pub all: SmallVec<[usize; 4]>,
    pub none: SmallVec<[usize; 4]>,
    pub any: SmallVec<[usize; 4]>,
}

/// A compiled query. Keeps a list of matching archetypes that is brought up to date before every
/// iteration.
#[derive(Debug)]
pub struct Query {
    all: TypeKey,
    none: TypeKey,
    any: TypeKey,
    matching: Vec<MatchingArchetype>,
    /// Number of archetypes already compiled.
    seen: usize,
}

impl QueryDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all<C: Component>(mut self) -> Self {
        self.all.push(Components::register::<C>);
        self
    }

    pub fn none<C: Component>(mut self) -> Self {
        self.none.push(Components::register::<C>);
        self
    }

    pub fn any<C: Component>(mut self) -> Self {
        self.any.push(Components::register::<C>);
        self
    }
}

impl Query {
    pub fn new(world: &mut World, desc: QueryDesc) -> Self {
        let components = &mut world.components;
        let mut register =
            |list: &[Registrar]| TypeKey::from_ids(list.iter().map(|reg| reg(components)));

        let mut query = Query {
            all: register(&desc.all),
            none: register(&desc.none),
            any: register(&desc.any),
            matching: Vec::default(),
            seen: 0,
        };
        query.update(&world.archetypes);
        query
    }

    /// Compiles archetypes created since the last update.
    pub fn update(&mut self, archetypes: &Archetypes) {
        for archetype in &archetypes.archetypes()[self.seen..] {
            if let Some(matching) = self.compile(archetype) {
                self.matching.push(matching);
            }
        }
        self.seen = archetypes.len();
    }

    #[inline]
    pub fn matching(&self) -> &[MatchingArchetype] {
        &self.matching
    }

    fn compile(&self, archetype: &Archetype) -> Option<MatchingArchetype> {
        let key = archetype.key();
        if !self.all.subset_of(key) {
            return None;
        }

        let all = self
            .all
            .iter()
            .filter_map(|id| archetype.enableable_index_of(*id))
            .collect();

        let mut none = SmallVec::default();
        for id in self.none.iter().filter(|id| key.contains(**id)) {
            match archetype.enableable_index_of(*id) {
                Some(idx) => none.push(idx),
                None => return None,
            }
        }

        let mut any = SmallVec::default();
        if !self.any.is_empty() {
            let present: SmallVec<[ComponentId; 4]> = self
                .any
                .iter()
                .copied()
                .filter(|id| key.contains(*id))
                .collect();
            if present.is_empty() {
                return None;
            }

            let enableable: SmallVec<[usize; 4]> = present
                .iter()
                .filter_map(|id| archetype.enableable_index_of(*id))
                .collect();
            // A present non-enableable component satisfies the clause for every entity.
            if enableable.len() == present.len() {
                any = enableable;
            }
        }

        Some(MatchingArchetype {
            archetype: archetype.id(),
            all,
            none,
            any,
        })
    }

    /// Iterates over every run of matching entities.
    pub fn batches<'a>(&'a mut self, world: &'a World) -> impl Iterator<Item = Batch<'a>> + 'a {
        self.update(&world.archetypes);
        let components = &world.components;

        self.matching.iter().flat_map(move |matching| {
            world
                .archetypes
                .get(matching.archetype)
                .chunks()
                .iter()
                .flat_map(move |chunk| {
                    EnabledRanges::new(compose_mask(matching, chunk.enable_bits()))
                        .map(move |range| Batch::new(chunk, components, range))
                })
        })
    }

    /// Calls `f` for every run of matching entities with mutable access to their components.
    pub fn for_each_batch_mut(&mut self, world: &mut World, mut f: impl FnMut(BatchMut)) {
        self.update(&world.archetypes);
        let version = world.versions.next_version();
        let components = &world.components;

        for matching in &self.matching {
            for chunk in world.archetypes.get_mut(matching.archetype).chunks_mut() {
                let mask = compose_mask(matching, chunk.enable_bits());
                for range in EnabledRanges::new(mask) {
                    f(BatchMut::new(chunk, components, range, version));
                }
            }
        }
    }

    /// Calls `f` in parallel for every chunk holding at least one matching entity.
    pub fn par_for_each_chunk<F>(&mut self, world: &mut World, f: F)
    where
        F: Fn(ChunkMut) + Send + Sync,
    {
        self.update(&world.archetypes);
        let version = world.versions.next_version();
        let components = &world.components;

        let mut jobs: Vec<(&MatchingArchetype, &mut Chunk)> = Vec::default();
        let mut matching = self.matching.iter().peekable();
        for archetype in world.archetypes.archetypes_mut() {
            let id = archetype.id();
            if let Some(matching) = matching.next_if(|m| m.archetype == id) {
                jobs.extend(archetype.chunks_mut().iter_mut().map(|chunk| (matching, chunk)));
            }
        }

        jobs.into_par_iter().for_each(|(matching, chunk)| {
            let mask = compose_mask(matching, chunk.enable_bits());
            if !mask.is_zero() {
                f(ChunkMut::new(chunk, components, mask, version));
            }
        });
    }

    /// Number of entities matching the query.
    pub fn count(&mut self, world: &World) -> usize {
        self.update(&world.archetypes);
        self.matching
            .iter()
            .flat_map(|matching| {
                world
                    .archetypes
                    .get(matching.archetype)
                    .chunks()
                    .iter()
                    .map(move |chunk| compose_mask(matching, chunk.enable_bits()))
            })
            .map(|mask| mask.count_ones() as usize)
            .sum()
    }
}
