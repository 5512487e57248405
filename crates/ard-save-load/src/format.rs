use serde::{de::DeserializeOwned, Serialize};

use crate::error::SaveLoadError;

pub trait SaveFormat: Send + Sync {
    fn serialize<T: Serialize>(object: &T) -> Result<Vec<u8>, SaveLoadError>;

    fn deserialize<T: DeserializeOwned>(data: &[u8]) -> Result<T, SaveLoadError>;
}

/// Human readable saves.
pub struct Ron;

/// Compact binary saves.
pub struct Bincode;

impl SaveFormat for Ron {
    fn serialize<T: Serialize>(object: &T) -> Result<Vec<u8>, SaveLoadError> {
        Ok(ron::ser::to_string(object)?.into())
    }

    fn deserialize<T: DeserializeOwned>(data: &[u8]) -> Result<T, SaveLoadError> {
        Ok(ron::de::from_bytes(data)?)
    }
}

impl SaveFormat for Bincode {
    fn serialize<T: Serialize>(object: &T) -> Result<Vec<u8>, SaveLoadError> {
        Ok(bincode::serialize(object)?)
    }

    fn deserialize<T: DeserializeOwned>(data: &[u8]) -> Result<T, SaveLoadError> {
        Ok(bincode::deserialize(data)?)
    }
}
