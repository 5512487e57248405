use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};

/// An entity is an identifier that is associated with a set of components in a world.
///
/// The `id` indexes the world's location table. The generation is bumped every time the id is
/// recycled, so stale handles to destroyed entities are detectable.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Entity {
    id: u32,
    generation: NonZeroU32,
}

impl Default for Entity {
    #[inline]
    fn default() -> Self {
        Entity::null()
    }
}

impl Entity {
    #[inline]
    pub fn new(id: u32, generation: NonZeroU32) -> Entity {
        Entity { id, generation }
    }

    /// Creates a handle to an entity that doesn't exist.
    #[inline]
    pub const fn null() -> Entity {
        Entity {
            id: u32::MAX,
            generation: NonZeroU32::MAX,
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        *self == Entity::null()
    }

    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation.get()
    }
}
