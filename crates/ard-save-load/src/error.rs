use ard_ecs::prelude::EcsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SaveLoadError {
    #[error("bincode: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("unable to write RON: {0}")]
    RonSerialize(#[from] ron::Error),
    #[error("unable to read RON: {0}")]
    RonDeserialize(#[from] ron::error::SpannedError),
    #[error(transparent)]
    Ecs(#[from] EcsError),
    #[error("no loader is registered for component `{0}`")]
    UnknownComponent(String),
    #[error("entity {0:?} is not part of the save")]
    UnmappedEntity(ard_ecs::prelude::Entity),
    #[error("saved entity #{0} is out of range")]
    UnmappedIndex(u32),
    #[error("buffer of `{type_name}` holds {found} values but the chunk has {expected} entities")]
    BufferLength {
        type_name: String,
        found: usize,
        expected: usize,
    },
    #[error("enable run of `{type_name}` holds {found} bits but the chunk has {expected} entities")]
    EnableRunLength {
        type_name: String,
        found: usize,
        expected: usize,
    },
    #[error("expected {expected} distinct entities to load into, got {found}")]
    EntityCount { expected: usize, found: usize },
}
