//! The shape of one oplog entry.

use super::decode::{DecodeTarget, Settable};
use crate::error::DecodeError;
use crate::types::{OpTimestamp, OperationKind, RawPayload};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Current schema version written by [`ChangeRecord::new`].
pub const SCHEMA_VERSION: i32 = 2;

/// A single entry of the operation log.
///
/// The two payloads are kept raw so they can be decoded into whatever
/// type the caller needs. Field names on the wire follow the oplog's
/// compact keys.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Ordering key assigned by the store.
    #[serde(rename = "ts")]
    pub timestamp: OpTimestamp,

    /// Unique operation id, used only to suppress duplicates.
    #[serde(rename = "h")]
    pub operation_id: i64,

    #[serde(rename = "v")]
    pub schema_version: i32,

    #[serde(rename = "op")]
    pub kind: OperationKind,

    /// `"<database>.<collection>"` the operation applies to.
    #[serde(rename = "ns")]
    pub namespace: String,

    /// Document for inserts and deletes, selector for updates.
    #[serde(rename = "o", default)]
    pub object: Option<RawPayload>,

    /// Modification applied by an update.
    #[serde(rename = "o2", default)]
    pub update_object: Option<RawPayload>,
}

impl ChangeRecord {
    /// Build a record without payloads.
    pub fn new(
        timestamp: OpTimestamp,
        operation_id: i64,
        kind: OperationKind,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            operation_id,
            schema_version: SCHEMA_VERSION,
            kind,
            namespace: namespace.into(),
            object: None,
            update_object: None,
        }
    }

    pub fn with_object(mut self, object: RawPayload) -> Self {
        self.object = Some(object);
        self
    }

    pub fn with_update_object(mut self, update: RawPayload) -> Self {
        self.update_object = Some(update);
        self
    }

    /// Database half of the namespace.
    pub fn database(&self) -> &str {
        self.namespace
            .split_once('.')
            .map_or(self.namespace.as_str(), |(db, _)| db)
    }

    /// Collection half of the namespace; empty if there is none.
    pub fn collection(&self) -> &str {
        self.namespace.split_once('.').map_or("", |(_, coll)| coll)
    }

    /// Decode the primary payload into `target`.
    ///
    /// When the record has no primary payload the target is reset: value
    /// slots to their zero value, maps emptied in place.
    pub fn decode_object<T>(&self, target: &mut T) -> Result<(), DecodeError>
    where
        T: DecodeTarget + ?Sized,
    {
        decode_into(self.object.as_ref(), target)
    }

    /// Decode the update payload into `target`, with the same absent-payload
    /// rule as [`decode_object`](Self::decode_object).
    pub fn decode_update<T>(&self, target: &mut T) -> Result<(), DecodeError>
    where
        T: DecodeTarget + ?Sized,
    {
        decode_into(self.update_object.as_ref(), target)
    }

    /// Decode the primary payload into a fresh value.
    pub fn object_as<T: DeserializeOwned + Default>(&self) -> Result<T, DecodeError> {
        let mut out = T::default();
        self.decode_object(&mut Settable(&mut out))?;
        Ok(out)
    }

    /// Decode the update payload into a fresh value.
    pub fn update_as<T: DeserializeOwned + Default>(&self) -> Result<T, DecodeError> {
        let mut out = T::default();
        self.decode_update(&mut Settable(&mut out))?;
        Ok(out)
    }
}

fn decode_into<T>(payload: Option<&RawPayload>, target: &mut T) -> Result<(), DecodeError>
where
    T: DecodeTarget + ?Sized,
{
    match payload {
        Some(raw) => target.decode_from(raw),
        None => target.reset(),
    }
}
