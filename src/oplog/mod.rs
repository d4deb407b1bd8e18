//! Store-side abstraction over a tailable operation log.
//!
//! The tailer only needs three capabilities from a store:
//! - a [`LogHandle`] that can hand out dedicated connections
//! - a [`LogConnection`] that opens tailable cursors for a [`TailQuery`]
//! - a [`TailCursor`] that yields the next matching entry, waiting a bounded
//!   time for one to be appended
//!
//! [`MemoryOplog`] implements all three in process, optionally journaled to
//! disk.

mod journal;
mod memory;
mod query;

pub use journal::OplogJournal;
pub use memory::{MemoryConnection, MemoryCursor, MemoryOplog, OplogConfig};
pub use query::{Filter, Predicate, TailQuery};

use crate::error::Result;
use crate::record::ChangeRecord;
use std::time::Duration;

/// Result of one bounded-wait fetch from a tailable cursor.
#[derive(Debug)]
pub enum Fetch {
    /// The next matching entry.
    Record(ChangeRecord),

    /// The wait expired without a new entry; the cursor is still usable.
    TimedOut,

    /// The store invalidated the cursor (for example the entries at its
    /// position were trimmed). It must be re-created to continue.
    Invalidated,
}

/// Capability over a replicated operation log.
pub trait LogHandle {
    type Connection: LogConnection + Send + 'static;

    /// Open a new connection that is not shared with any other caller.
    fn connect(&self) -> Result<Self::Connection>;
}

/// A dedicated connection to the log store.
///
/// The connection is released when dropped.
pub trait LogConnection {
    type Cursor: TailCursor;

    /// Open a tailable cursor over entries matching `query`, in log order.
    /// Each fetch waits at most `wait` for a new entry.
    fn tail(&mut self, query: &TailQuery, wait: Duration) -> Result<Self::Cursor>;
}

/// A live tailable cursor.
pub trait TailCursor {
    /// Fetch the next entry, blocking up to the cursor's wait.
    ///
    /// `Err` means the query or transport failed and the cursor is dead.
    fn next(&mut self) -> Result<Fetch>;
}
