//! # Oplog Tail
//!
//! Follows the append-only operation log of a replicated document store and
//! republishes its entries, in order, to an in-process consumer.
//!
//! ## Core Concepts
//!
//! - **Change records**: one oplog entry each, with raw payloads decoded on demand
//! - **Tailable cursors**: store cursors that wait a bounded time for new entries
//! - **Resumption**: cursor re-creation at the boundary tick without loss or repeats
//! - **Shutdown**: cooperative, with bounded latency even if the consumer stalls
//!
//! ## Example
//!
//! ```no_run
//! use oplog_tail::{Filter, MemoryOplog, OperationKind, RawPayload, Tailer};
//! use serde_json::json;
//!
//! let oplog = MemoryOplog::new();
//! let tailer = Tailer::new(&oplog, Filter::namespace("juju.logs"))?;
//!
//! let doc = RawPayload::encode(&json!({"message": "hello"}))?;
//! oplog.log_operation(OperationKind::Insert, "juju.logs", Some(doc), None)?;
//!
//! for record in &tailer {
//!     let doc: serde_json::Value = record.object_as()?;
//!     println!("{} {}", record.timestamp, doc["message"]);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod error;
pub mod oplog;
pub mod record;
pub mod stream;
pub mod tailer;
pub mod types;

// Re-exports
pub use error::{DecodeError, Result, StoreError, StreamError, TailError};
pub use oplog::{
    Fetch, Filter, LogConnection, LogHandle, MemoryConnection, MemoryCursor, MemoryOplog,
    OplogConfig, OplogJournal, Predicate, TailCursor, TailQuery,
};
pub use record::{ChangeRecord, DecodeTarget, Settable};
pub use stream::{stream_records, write_record, StreamFormat, StreamParams};
pub use tailer::{Dying, Tailer, TailerConfig, TailerStatus};
pub use types::*;
