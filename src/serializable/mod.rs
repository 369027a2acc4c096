//! Serialization boundary between stored values and the tiers
//!
//! The tiers never know the concrete type of what they store. Every storable
//! type implements [`CacheSerializable`]; inside an [`Entity`](crate::Entity)
//! the value is held as a boxed [`ErasedValue`] and recovered either by a
//! checked downcast or, when the requested type differs, by re-encoding the
//! stored value and decoding the bytes as the requested type.

mod codable;

pub use codable::Codable;

use crate::error::{CacheError, Result};
use std::any::{type_name, Any};
use std::fmt;

/// Capability every storable value provides
pub trait CacheSerializable: Any + Clone + Send + Sync {
    /// Encode the value to bytes
    fn serialize(&self) -> Result<Vec<u8>>;

    /// Decode a value from bytes
    fn deserialize(bytes: &[u8]) -> Result<Self>;
}

/// Object-safe view of a [`CacheSerializable`] value
pub trait ErasedValue: Send + Sync {
    /// Encode the value through its [`CacheSerializable`] impl
    fn to_bytes(&self) -> Result<Vec<u8>>;

    /// The value as `Any`, for downcasting
    fn as_any(&self) -> &dyn Any;

    /// Deep copy behind a new box
    fn clone_value(&self) -> Box<dyn ErasedValue>;

    /// Name of the concrete type
    fn type_name(&self) -> &'static str;
}

impl<T: CacheSerializable> ErasedValue for T {
    fn to_bytes(&self) -> Result<Vec<u8>> {
        CacheSerializable::serialize(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn clone_value(&self) -> Box<dyn ErasedValue> {
        Box::new(self.clone())
    }

    fn type_name(&self) -> &'static str {
        type_name::<T>()
    }
}

impl Clone for Box<dyn ErasedValue> {
    fn clone(&self) -> Self {
        self.clone_value()
    }
}

impl fmt::Debug for dyn ErasedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ErasedValue<{}>", self.type_name())
    }
}

impl CacheSerializable for Vec<u8> {
    fn serialize(&self) -> Result<Vec<u8>> {
        Ok(self.clone())
    }

    fn deserialize(bytes: &[u8]) -> Result<Self> {
        Ok(bytes.to_vec())
    }
}

impl CacheSerializable for String {
    fn serialize(&self) -> Result<Vec<u8>> {
        Ok(self.as_bytes().to_vec())
    }

    fn deserialize(bytes: &[u8]) -> Result<Self> {
        String::from_utf8(bytes.to_vec())
            .map_err(|e| CacheError::DeserializationError(format!("invalid UTF-8: {}", e)))
    }
}

/// Scalars are stored as their decimal text form
macro_rules! text_serializable {
    ($($ty:ty),* $(,)?) => {
        $(
            impl CacheSerializable for $ty {
                fn serialize(&self) -> Result<Vec<u8>> {
                    Ok(self.to_string().into_bytes())
                }

                fn deserialize(bytes: &[u8]) -> Result<Self> {
                    let text = std::str::from_utf8(bytes).map_err(|e| {
                        CacheError::DeserializationError(format!("invalid UTF-8: {}", e))
                    })?;
                    text.trim().parse::<$ty>().map_err(|e| {
                        CacheError::DeserializationError(format!(
                            "cannot parse {:?} as {}: {}",
                            text,
                            stringify!($ty),
                            e
                        ))
                    })
                }
            }
        )*
    };
}

text_serializable!(bool, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);

impl<T: CacheSerializable> CacheSerializable for Option<T> {
    /// `None` has no byte form and fails to serialize
    fn serialize(&self) -> Result<Vec<u8>> {
        match self {
            Some(value) => value.serialize(),
            None => Err(CacheError::SerializationError(
                "cannot serialize an empty Option".to_string(),
            )),
        }
    }

    /// Bytes the inner type cannot decode yield `None` instead of an error
    fn deserialize(bytes: &[u8]) -> Result<Self> {
        Ok(T::deserialize(bytes).ok())
    }
}
