//! Error types for the oplog store and tailer.

use crate::types::OpTimestamp;
use thiserror::Error;

/// Errors reported by an oplog store, its connections and its cursors.
///
/// Cloneable so a tailer's terminal error can be handed out more than once.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Out of order append: {got:?} is older than newest entry {newest:?}")]
    OutOfOrder {
        newest: OpTimestamp,
        got: OpTimestamp,
    },

    #[error("Oplog is closed")]
    Closed,

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Invalid journal format: {0}")]
    InvalidFormat(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for StoreError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for StoreError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        StoreError::Deserialization(e.to_string())
    }
}

/// Terminal errors of a [`Tailer`](crate::Tailer).
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TailError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("failed to spawn tail worker: {0}")]
    Spawn(String),

    #[error("tail worker panicked")]
    WorkerPanicked,
}

/// Errors from decoding a record payload into a caller-supplied target.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("decode target must be settable or clearable, got {0}")]
    InvalidTarget(&'static str),
}

impl From<rmp_serde::decode::Error> for DecodeError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        DecodeError::Malformed(e.to_string())
    }
}

/// Errors from streaming tailed records to a writer.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("sending failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("tailer stopped{}", stopped_cause(.0))]
    TailerStopped(Option<TailError>),
}

fn stopped_cause(cause: &Option<TailError>) -> String {
    match cause {
        Some(e) => format!(": {e}"),
        None => String::new(),
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
