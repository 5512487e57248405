use entity_map::EntityMap;
use serde::{de::DeserializeOwned, Serialize};

pub mod entity_map;
pub mod error;
pub mod format;
pub mod load_data;
pub mod loader;
pub mod save_data;
pub mod saver;

#[cfg(test)]
mod tests;

pub mod prelude {
    pub use crate::entity_map::{EntityMap, MappedEntity};
    pub use crate::error::SaveLoadError;
    pub use crate::format::{Bincode, Ron, SaveFormat};
    pub use crate::load_data::Loader;
    pub use crate::save_data::{SaveData, Saver};
    pub use crate::{LoadContext, SaveContext, SaveLoad};
}

/// Conversion between a component and the value actually written to a save.
///
/// Every serializable, clonable type saves as itself. Types holding entity handles implement it
/// by hand and translate handles through the context's [`EntityMap`].
pub trait SaveLoad {
    type Intermediate: Serialize + DeserializeOwned;

    fn save(&self, ctx: &SaveContext) -> Self::Intermediate;

    fn load(ctx: &LoadContext, intermediate: Self::Intermediate) -> Self;
}

impl<T: Serialize + DeserializeOwned + Clone> SaveLoad for T {
    type Intermediate = Self;

    #[inline(always)]
    fn save(&self, _: &SaveContext) -> Self::Intermediate {
        self.clone()
    }

    #[inline(always)]
    fn load(_: &LoadContext, intermediate: Self::Intermediate) -> Self {
        intermediate
    }
}

pub struct SaveContext {
    /// Maps live entities to their position in the save.
    pub entity_map: EntityMap,
}

pub struct LoadContext {
    /// Maps positions in the save to the entities receiving them.
    pub entity_map: EntityMap,
}
