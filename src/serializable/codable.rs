//! JSON adapter for `serde` types

use crate::error::{CacheError, Result};
use crate::serializable::CacheSerializable;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Wraps any `serde` type so it can be cached, encoding it as JSON
#[derive(Debug, Clone, PartialEq)]
pub struct Codable<T>(pub T);

impl<T> Codable<T> {
    /// Unwrap the inner value
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> CacheSerializable for Codable<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    fn serialize(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(&self.0).map_err(|e| CacheError::SerializationError(e.to_string()))
    }

    fn deserialize(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map(Codable)
            .map_err(|e| CacheError::DeserializationError(e.to_string()))
    }
}
