//! Decode destinations for record payloads.

use crate::error::DecodeError;
use crate::types::RawPayload;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::hash::{BuildHasher, Hash};

/// A destination a payload can be decoded into.
///
/// Destinations are either settable (a value slot that is reset to its
/// zero value when the payload is absent) or clearable (a mapping that is
/// emptied in place when the payload is absent). Destinations whose shape
/// is only known at runtime report [`DecodeError::InvalidTarget`] from
/// `reset` when they are neither.
pub trait DecodeTarget {
    /// Decode a present payload into this destination.
    fn decode_from(&mut self, payload: &RawPayload) -> Result<(), DecodeError>;

    /// Apply the absent-payload rule to this destination.
    fn reset(&mut self) -> Result<(), DecodeError>;
}

/// Settable slot over any decodable value.
///
/// An absent payload resets the slot to `T::default()`.
pub struct Settable<'a, T>(pub &'a mut T);

impl<T> DecodeTarget for Settable<'_, T>
where
    T: DeserializeOwned + Default,
{
    fn decode_from(&mut self, payload: &RawPayload) -> Result<(), DecodeError> {
        *self.0 = rmp_serde::from_slice(payload.as_bytes())?;
        Ok(())
    }

    fn reset(&mut self) -> Result<(), DecodeError> {
        *self.0 = T::default();
        Ok(())
    }
}

impl<T> DecodeTarget for Option<T>
where
    T: DeserializeOwned,
{
    fn decode_from(&mut self, payload: &RawPayload) -> Result<(), DecodeError> {
        *self = Some(rmp_serde::from_slice(payload.as_bytes())?);
        Ok(())
    }

    fn reset(&mut self) -> Result<(), DecodeError> {
        *self = None;
        Ok(())
    }
}

// Maps are emptied in place, then hold exactly the decoded entries.

impl<K, V, S> DecodeTarget for HashMap<K, V, S>
where
    K: DeserializeOwned + Eq + Hash,
    V: DeserializeOwned,
    S: BuildHasher + Default,
{
    fn decode_from(&mut self, payload: &RawPayload) -> Result<(), DecodeError> {
        let decoded: HashMap<K, V, S> = rmp_serde::from_slice(payload.as_bytes())?;
        self.clear();
        self.extend(decoded);
        Ok(())
    }

    fn reset(&mut self) -> Result<(), DecodeError> {
        self.clear();
        Ok(())
    }
}

impl<K, V> DecodeTarget for BTreeMap<K, V>
where
    K: DeserializeOwned + Ord,
    V: DeserializeOwned,
{
    fn decode_from(&mut self, payload: &RawPayload) -> Result<(), DecodeError> {
        let decoded: BTreeMap<K, V> = rmp_serde::from_slice(payload.as_bytes())?;
        self.clear();
        self.extend(decoded);
        Ok(())
    }

    fn reset(&mut self) -> Result<(), DecodeError> {
        self.clear();
        Ok(())
    }
}

impl DecodeTarget for serde_json::Map<String, Value> {
    fn decode_from(&mut self, payload: &RawPayload) -> Result<(), DecodeError> {
        let decoded: serde_json::Map<String, Value> = rmp_serde::from_slice(payload.as_bytes())?;
        self.clear();
        self.extend(decoded);
        Ok(())
    }

    fn reset(&mut self) -> Result<(), DecodeError> {
        self.clear();
        Ok(())
    }
}

impl DecodeTarget for Value {
    fn decode_from(&mut self, payload: &RawPayload) -> Result<(), DecodeError> {
        *self = rmp_serde::from_slice(payload.as_bytes())?;
        Ok(())
    }

    fn reset(&mut self) -> Result<(), DecodeError> {
        match self {
            Value::Null => Ok(()),
            Value::Object(map) => {
                map.clear();
                Ok(())
            }
            Value::Bool(_) => Err(DecodeError::InvalidTarget("bool")),
            Value::Number(_) => Err(DecodeError::InvalidTarget("number")),
            Value::String(_) => Err(DecodeError::InvalidTarget("string")),
            Value::Array(_) => Err(DecodeError::InvalidTarget("array")),
        }
    }
}
