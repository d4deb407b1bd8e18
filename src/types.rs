//! Core types for oplog entries.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Conventional namespace of the replication oplog collection.
pub const OPLOG_NAMESPACE: &str = "local.oplog.rs";

/// Ordering key of an oplog entry.
///
/// The high 32 bits hold a seconds tick and the low 32 bits a counter
/// within that tick, so many entries can share one second while the
/// packed value still gives a total order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpTimestamp(pub u64);

impl OpTimestamp {
    /// The earliest possible timestamp; tailing from here replays everything.
    pub const ZERO: OpTimestamp = OpTimestamp(0);

    pub fn new(secs: u32, increment: u32) -> Self {
        OpTimestamp(((secs as u64) << 32) | increment as u64)
    }

    pub fn secs(self) -> u32 {
        (self.0 >> 32) as u32
    }

    pub fn increment(self) -> u32 {
        self.0 as u32
    }

    /// First timestamp of the current wall-clock second.
    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        OpTimestamp::new(secs as u32, 1)
    }
}

impl fmt::Debug for OpTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OpTimestamp({}:{})", self.secs(), self.increment())
    }
}

impl fmt::Display for OpTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.secs(), self.increment())
    }
}

/// Kind of operation an entry records.
///
/// Codes the tailer does not model are kept verbatim in `Other`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OperationKind {
    Insert,
    Update,
    Delete,
    Other(String),
}

impl OperationKind {
    /// The raw operation code as stored in the log.
    pub fn as_code(&self) -> &str {
        match self {
            OperationKind::Insert => "i",
            OperationKind::Update => "u",
            OperationKind::Delete => "d",
            OperationKind::Other(code) => code,
        }
    }
}

impl From<&str> for OperationKind {
    fn from(code: &str) -> Self {
        match code {
            "i" => OperationKind::Insert,
            "u" => OperationKind::Update,
            "d" => OperationKind::Delete,
            other => OperationKind::Other(other.to_string()),
        }
    }
}

impl From<String> for OperationKind {
    fn from(code: String) -> Self {
        match code.as_str() {
            "i" | "u" | "d" => OperationKind::from(code.as_str()),
            _ => OperationKind::Other(code),
        }
    }
}

impl From<OperationKind> for String {
    fn from(kind: OperationKind) -> Self {
        match kind {
            OperationKind::Other(code) => code,
            known => known.as_code().to_string(),
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_code())
    }
}

/// Opaque payload bytes in the store-native encoding (MessagePack).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawPayload(pub Vec<u8>);

impl RawPayload {
    /// Encode a value the way the store does, keeping field names so the
    /// payload can later be decoded into either a struct or a map.
    pub fn encode(value: &impl Serialize) -> Result<Self, rmp_serde::encode::Error> {
        Ok(RawPayload(rmp_serde::to_vec_named(value)?))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for RawPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawPayload({} bytes)", self.0.len())
    }
}
