//! The unit stored in either tier

use crate::error::Result;
use crate::expiry::Expiry;
use crate::serializable::{CacheSerializable, ErasedValue};

/// A cached value with its expiry and byte cost
///
/// Each tier owns its own `Entity` for a key; promotion from disk to memory
/// moves or copies the entity, never shares it.
#[derive(Debug, Clone)]
pub struct Entity {
    value: Box<dyn ErasedValue>,
    expiry: Expiry,
    cost: usize,
}

impl Entity {
    /// Wrap a value. A relative expiry is pinned to its deadline as of now.
    pub fn new<T: CacheSerializable>(value: T, expiry: Expiry) -> Self {
        Self {
            value: Box::new(value),
            expiry: expiry.pinned(),
            cost: 0,
        }
    }

    /// Raw bytes read back from disk; cost is their length
    pub(crate) fn from_bytes(bytes: Vec<u8>, expiry: Expiry) -> Self {
        let cost = bytes.len();
        Self {
            value: Box::new(bytes),
            expiry,
            cost,
        }
    }

    /// The type-erased value
    pub fn value(&self) -> &dyn ErasedValue {
        self.value.as_ref()
    }

    /// The value as `T`, if that is its concrete type
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.value.as_any().downcast_ref::<T>()
    }

    pub fn expiry(&self) -> Expiry {
        self.expiry
    }

    /// Serialized size in bytes, 0 until the entity has been encoded once
    pub fn cost(&self) -> usize {
        self.cost
    }

    pub fn is_expired(&self) -> bool {
        self.expiry.is_expired()
    }

    pub(crate) fn set_cost(&mut self, cost: usize) {
        self.cost = cost;
    }

    /// Encode the held value
    pub(crate) fn to_bytes(&self) -> Result<Vec<u8>> {
        self.value.to_bytes()
    }

    /// Produce the value as `T`.
    ///
    /// A matching concrete type is cloned out directly. Otherwise the value is
    /// re-encoded, decoded as `T`, and stored back in place with its new cost,
    /// so the entity keeps whichever type was requested last. The flag is
    /// `true` when that re-decode happened.
    pub(crate) fn coerce<T: CacheSerializable>(&mut self) -> Result<(T, bool)> {
        if let Some(value) = self.downcast_ref::<T>() {
            return Ok((value.clone(), false));
        }

        let bytes = self.value.to_bytes()?;
        let value = T::deserialize(&bytes)?;
        self.value = Box::new(value.clone());
        self.cost = bytes.len();
        Ok((value, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;
    use std::time::Duration;

    #[test]
    fn test_new_entity_pins_relative_expiry() {
        let entity = Entity::new("value".to_string(), Expiry::after(Duration::from_secs(60)));
        assert!(matches!(entity.expiry(), Expiry::At(_)));
        assert_eq!(entity.cost(), 0);
        assert!(!entity.is_expired());
    }

    #[test]
    fn test_coerce_matching_type_skips_decode() {
        let mut entity = Entity::new(7u32, Expiry::Never);
        entity.set_cost(1);

        let (value, redecoded) = entity.coerce::<u32>().unwrap();
        assert_eq!(value, 7);
        assert!(!redecoded);
        assert_eq!(entity.cost(), 1);
    }

    #[test]
    fn test_coerce_other_type_rewrites_value() {
        let mut entity = Entity::from_bytes(b"1234".to_vec(), Expiry::Never);
        assert!(entity.downcast_ref::<Vec<u8>>().is_some());

        let (value, redecoded) = entity.coerce::<u64>().unwrap();
        assert_eq!(value, 1234);
        assert!(redecoded);
        assert_eq!(entity.downcast_ref::<u64>(), Some(&1234));
        assert_eq!(entity.cost(), 4);

        // the last requested type wins, so asking for bytes decodes again
        let (bytes, redecoded) = entity.coerce::<Vec<u8>>().unwrap();
        assert_eq!(bytes, b"1234".to_vec());
        assert!(redecoded);
    }

    #[test]
    fn test_coerce_failure_leaves_value_untouched() {
        let mut entity = Entity::new("not a number".to_string(), Expiry::Never);
        let err = entity.coerce::<u8>().unwrap_err();
        assert!(matches!(err, CacheError::DeserializationError(_)));
        assert!(entity.downcast_ref::<String>().is_some());
    }
}
