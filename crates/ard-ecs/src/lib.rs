pub mod archetype;
pub mod bits;
pub mod component;
pub mod config;
pub mod entity;
pub mod error;
pub mod key;
pub mod query;
pub mod range;
pub mod version;
pub mod world;

#[cfg(test)]
mod tests;

pub mod prelude {
    pub use crate::archetype::chunk::Chunk;
    pub use crate::archetype::chunk::ChunkGroup;
    pub use crate::archetype::enable::EnableBits;
    pub use crate::archetype::enable::EnableWordReader;
    pub use crate::archetype::enable::EnableWordWriter;
    pub use crate::archetype::Archetype;
    pub use crate::archetype::ArchetypeId;
    pub use crate::archetype::Archetypes;
    pub use crate::bits::Mask128;
    pub use crate::component::pack::ComponentPack;
    pub use crate::component::Component;
    pub use crate::component::ComponentExt;
    pub use crate::component::ComponentId;
    pub use crate::config::WorldConfig;
    pub use crate::entity::Entity;
    pub use crate::error::EcsError;
    pub use crate::error::EcsResult;
    pub use crate::error::ErrorKind;
    pub use crate::query::iter::Batch;
    pub use crate::query::iter::BatchMut;
    pub use crate::query::iter::ChunkMut;
    pub use crate::query::Query;
    pub use crate::query::QueryDesc;
    pub use crate::range::get_next_range;
    pub use crate::range::EnabledRanges;
    pub use crate::version::MonotonicVersion;
    pub use crate::version::VersionCounter;
    pub use crate::world::commands::EntityCommands;
    pub use crate::world::remap::EntityRemap;
    pub use crate::world::ChunkRestore;
    pub use crate::world::World;
}
