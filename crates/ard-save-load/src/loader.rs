use ard_ecs::{
    component::column::{AnyColumn, Column},
    prelude::*,
};

use crate::{error::SaveLoadError, format::SaveFormat, LoadContext, SaveLoad};

pub struct ComponentLoader<F: SaveFormat, C: SaveLoad> {
    to_load: Vec<C>,
    _format: std::marker::PhantomData<F>,
}

impl<F: SaveFormat, C: SaveLoad> Default for ComponentLoader<F, C> {
    fn default() -> Self {
        Self {
            to_load: Vec::default(),
            _format: Default::default(),
        }
    }
}

pub trait GenericComponentLoader: Send + Sync {
    /// Registers the component type with the world receiving the values.
    fn register(&self, world: &mut World) -> ComponentId;

    fn deserialize_all(&mut self, ctx: &LoadContext, raw: &[u8]) -> Result<(), SaveLoadError>;

    /// Number of deserialized values.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Moves every deserialized value into a column, in saved order.
    fn take_column(&mut self) -> Box<dyn AnyColumn>;
}

impl<F: SaveFormat, C: Component + SaveLoad> GenericComponentLoader for ComponentLoader<F, C> {
    fn register(&self, world: &mut World) -> ComponentId {
        world.register::<C>()
    }

    fn deserialize_all(&mut self, ctx: &LoadContext, raw: &[u8]) -> Result<(), SaveLoadError> {
        let intermediates = F::deserialize::<Vec<C::Intermediate>>(raw)?;
        self.to_load = intermediates.into_iter().map(|i| C::load(ctx, i)).collect();
        Ok(())
    }

    fn len(&self) -> usize {
        self.to_load.len()
    }

    fn take_column(&mut self) -> Box<dyn AnyColumn> {
        Box::new(Column::from(std::mem::take(&mut self.to_load)))
    }
}
