use thiserror::Error;

use crate::entity::Entity;

/// Broad classification of an [`EcsError`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller passed something it could have validated up front.
    InvalidArgument,
    /// A mutation was requested through a path that no longer has access to its target.
    AccessViolation,
    /// Internal storage state is inconsistent. Always a bug.
    InvariantViolation,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EcsError {
    #[error("component `{0}` is not enableable")]
    NotEnableable(&'static str),
    #[error("entity {0:?} does not have component `{1}`")]
    MissingComponent(Entity, &'static str),
    #[error("entity {0:?} is not alive")]
    DeadEntity(Entity),
    #[error("entity {0:?} was given more than once")]
    DuplicateEntity(Entity),
    #[error("slot {slot} is out of bounds for a chunk holding {count} entities")]
    SlotOutOfBounds { slot: usize, count: usize },
    #[error("enableable type index {index} is out of bounds (archetype has {len})")]
    TypeIndexOutOfBounds { index: usize, len: usize },
    #[error("word stream ended early: needed {needed} words, had {available}")]
    ShortWordStream { needed: usize, available: usize },
    #[error("access violation: {0}")]
    AccessViolation(String),
    #[error("invariant violated in archetype {archetype}, chunk {chunk}: {reason}")]
    InvariantViolation {
        archetype: usize,
        chunk: usize,
        reason: String,
    },
}

impl EcsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EcsError::NotEnableable(_)
            | EcsError::MissingComponent(..)
            | EcsError::DeadEntity(_)
            | EcsError::DuplicateEntity(_)
            | EcsError::SlotOutOfBounds { .. }
            | EcsError::TypeIndexOutOfBounds { .. }
            | EcsError::ShortWordStream { .. } => ErrorKind::InvalidArgument,
            EcsError::AccessViolation(_) => ErrorKind::AccessViolation,
            EcsError::InvariantViolation { .. } => ErrorKind::InvariantViolation,
        }
    }
}

pub type EcsResult<T> = Result<T, EcsError>;
