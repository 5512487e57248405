use serde::{Deserialize, Serialize};

/// Tunables for a [`World`](crate::world::World).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Byte budget of a single chunk. Chunk capacity is this divided by the archetype's row size,
    /// clamped to `[1, 128]`.
    pub chunk_bytes: usize,
    /// Run `World::check_consistency` after every structural operation. Only honored in debug
    /// builds.
    pub validate_on_mutation: bool,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            chunk_bytes: 16 * 1024,
            validate_on_mutation: false,
        }
    }
}

impl WorldConfig {
    /// Parses a config from RON. Missing fields take their default values.
    pub fn from_ron(src: &str) -> Result<Self, ron::error::SpannedError> {
        ron::from_str(src)
    }
}
