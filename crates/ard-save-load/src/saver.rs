use ard_ecs::prelude::*;

use crate::{error::SaveLoadError, format::SaveFormat, SaveContext, SaveLoad};

pub struct ComponentSaver<F: SaveFormat, C: SaveLoad> {
    to_save: Vec<C::Intermediate>,
    _format: std::marker::PhantomData<F>,
}

impl<F: SaveFormat, C: SaveLoad> Default for ComponentSaver<F, C> {
    fn default() -> Self {
        Self {
            to_save: Vec::default(),
            _format: Default::default(),
        }
    }
}

pub trait GenericSaver {
    /// Queues every value of one column of a chunk.
    fn add(&mut self, ctx: &SaveContext, chunk: &Chunk, column: usize);

    /// Serializes and clears everything queued so far.
    fn serialize_all(&mut self) -> Result<Vec<u8>, SaveLoadError>;
}

impl<F: SaveFormat, C: Component + SaveLoad> GenericSaver for ComponentSaver<F, C> {
    fn add(&mut self, ctx: &SaveContext, chunk: &Chunk, column: usize) {
        self.to_save
            .extend(chunk.column::<C>(column).iter().map(|c| c.save(ctx)));
    }

    fn serialize_all(&mut self) -> Result<Vec<u8>, SaveLoadError> {
        let res = F::serialize(&self.to_save);
        self.to_save.clear();
        res
    }
}
