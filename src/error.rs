//! Error types for cache operations
//!
//! Every facade read or write either returns a value or one of the kinds
//! below. Tier-level I/O problems (a missing file behind a manifest record,
//! unreadable metadata) are recovered inside the tier as a miss and never
//! reach the caller.

use thiserror::Error;

/// Main error type for cache operations
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key absent from both tiers
    #[error("Key not found: {key}")]
    NotFound { key: String },

    /// Key found but past its deadline; it has already been removed from both tiers
    #[error("Entry expired: {key}")]
    Expired { key: String },

    /// A value could not be encoded to bytes
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Bytes could not be decoded into a value
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// The stored value could not be re-decoded as the requested type
    #[error("Cannot decode `{key}` as {requested}: {source}")]
    TypeMismatch {
        key: String,
        requested: &'static str,
        #[source]
        source: Box<CacheError>,
    },

    /// The memory tier refused an entity
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Filesystem error while opening a tier
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl CacheError {
    /// True for [`CacheError::NotFound`]
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::NotFound { .. })
    }

    /// True for [`CacheError::Expired`]
    pub fn is_expired(&self) -> bool {
        matches!(self, CacheError::Expired { .. })
    }
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;
