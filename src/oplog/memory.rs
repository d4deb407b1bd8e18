//! In-process capped oplog with tailable cursors.

use super::journal::OplogJournal;
use super::query::TailQuery;
use super::{Fetch, LogConnection, LogHandle, TailCursor};
use crate::error::{Result, StoreError};
use crate::record::ChangeRecord;
use crate::types::{OpTimestamp, OperationKind, RawPayload};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Oplog configuration.
#[derive(Clone, Debug)]
pub struct OplogConfig {
    /// Maximum number of retained entries. Older entries are trimmed, and
    /// cursors that had not read them yet are invalidated.
    /// Default: 100_000
    pub capacity: usize,

    /// Journal file to replay on open and append to (None = memory only).
    pub journal_path: Option<PathBuf>,

    /// fsync the journal every N appends.
    /// Default: 100
    pub sync_every: u64,
}

impl Default for OplogConfig {
    fn default() -> Self {
        Self {
            capacity: 100_000,
            journal_path: None,
            sync_every: 100,
        }
    }
}

struct Entry {
    /// Absolute position in the log; never reused after trimming.
    slot: u64,
    record: ChangeRecord,
}

struct OplogState {
    entries: VecDeque<Entry>,
    next_slot: u64,
    /// Bumped to invalidate every open cursor.
    epoch: u64,
    failure: Option<String>,
    closed: bool,
    open_connections: usize,
    /// Newest timestamp handed out by `log_operation`.
    clock: OpTimestamp,
    next_operation_id: i64,
    journal: Option<OplogJournal>,
}

impl OplogState {
    fn first_slot(&self) -> u64 {
        self.entries.front().map_or(self.next_slot, |e| e.slot)
    }

    fn newest_timestamp(&self) -> Option<OpTimestamp> {
        self.entries.back().map(|e| e.record.timestamp)
    }
}

struct Shared {
    state: Mutex<OplogState>,
    appended: Condvar,
    capacity: usize,
}

impl Shared {
    fn append_locked(&self, state: &mut OplogState, record: ChangeRecord) -> Result<()> {
        if state.closed {
            return Err(StoreError::Closed);
        }
        if let Some(newest) = state.newest_timestamp() {
            if record.timestamp < newest {
                return Err(StoreError::OutOfOrder {
                    newest,
                    got: record.timestamp,
                });
            }
        }

        if let Some(journal) = state.journal.as_mut() {
            journal.append(&record)?;
        }
        self.push_locked(state, record);
        self.appended.notify_all();
        Ok(())
    }

    fn push_locked(&self, state: &mut OplogState, record: ChangeRecord) {
        state.clock = state.clock.max(record.timestamp);
        state.next_operation_id = state.next_operation_id.max(record.operation_id.saturating_add(1));

        let slot = state.next_slot;
        state.next_slot += 1;
        state.entries.push_back(Entry { slot, record });

        while state.entries.len() > self.capacity {
            state.entries.pop_front();
        }
    }
}

/// A capped, append-only operation log held in memory.
///
/// Clones share the same log. Every [`connect`](LogHandle::connect) call
/// yields an independent connection whose cursors block on new appends.
#[derive(Clone)]
pub struct MemoryOplog {
    shared: Arc<Shared>,
}

impl MemoryOplog {
    /// Create an empty in-memory oplog with default capacity.
    pub fn new() -> Self {
        Self::from_parts(OplogConfig::default().capacity, None)
    }

    /// Create an empty in-memory oplog retaining at most `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::from_parts(capacity, None)
    }

    /// Open an oplog, replaying its journal if one is configured.
    pub fn open(config: OplogConfig) -> Result<Self> {
        let Some(path) = config.journal_path.as_ref() else {
            return Ok(Self::from_parts(config.capacity, None));
        };

        let (journal, records) = OplogJournal::open(path, config.sync_every)?;
        debug!(path = %path.display(), entries = records.len(), "replayed oplog journal");

        let oplog = Self::from_parts(config.capacity, Some(journal));
        {
            let mut state = oplog.shared.state.lock();
            for record in records {
                oplog.shared.push_locked(&mut state, record);
            }
        }
        Ok(oplog)
    }

    fn from_parts(capacity: usize, journal: Option<OplogJournal>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(OplogState {
                    entries: VecDeque::new(),
                    next_slot: 0,
                    epoch: 0,
                    failure: None,
                    closed: false,
                    open_connections: 0,
                    clock: OpTimestamp::ZERO,
                    next_operation_id: 1,
                    journal,
                }),
                appended: Condvar::new(),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Append an entry with a caller-assigned timestamp and id.
    ///
    /// Fails with [`StoreError::OutOfOrder`] if `record` is older than the
    /// newest entry.
    pub fn append(&self, record: ChangeRecord) -> Result<()> {
        let mut state = self.shared.state.lock();
        self.shared.append_locked(&mut state, record)
    }

    /// Append an operation, assigning its timestamp and operation id.
    ///
    /// Timestamps take the current wall-clock second; operations within the
    /// same second (or while the clock lags the log) share the newest tick
    /// and take the next increment.
    pub fn log_operation(
        &self,
        kind: OperationKind,
        namespace: impl Into<String>,
        object: Option<RawPayload>,
        update_object: Option<RawPayload>,
    ) -> Result<ChangeRecord> {
        let mut state = self.shared.state.lock();

        let now = OpTimestamp::now();
        let timestamp = if now.secs() > state.clock.secs() {
            now
        } else {
            OpTimestamp::new(state.clock.secs(), state.clock.increment() + 1)
        };

        let mut record = ChangeRecord::new(timestamp, state.next_operation_id, kind, namespace);
        record.object = object;
        record.update_object = update_object;

        self.shared.append_locked(&mut state, record.clone())?;
        Ok(record)
    }

    /// Invalidate every open cursor. Each reports [`Fetch::Invalidated`]
    /// on its next fetch.
    pub fn invalidate_cursors(&self) {
        let mut state = self.shared.state.lock();
        state.epoch += 1;
        debug!(epoch = state.epoch, "invalidating oplog cursors");
        self.shared.appended.notify_all();
    }

    /// Make every cursor open and fetch fail with [`StoreError::Query`]
    /// until [`clear_failure`](Self::clear_failure) is called.
    pub fn inject_failure(&self, message: impl Into<String>) {
        let mut state = self.shared.state.lock();
        state.failure = Some(message.into());
        self.shared.appended.notify_all();
    }

    pub fn clear_failure(&self) {
        self.shared.state.lock().failure = None;
    }

    /// Close the oplog. New connections and appends fail with
    /// [`StoreError::Closed`]; open cursors fail on their next fetch.
    pub fn close(&self) -> Result<()> {
        let mut state = self.shared.state.lock();
        state.closed = true;
        if let Some(journal) = state.journal.as_mut() {
            journal.sync()?;
        }
        self.shared.appended.notify_all();
        Ok(())
    }

    /// Number of connections not yet released.
    pub fn open_connections(&self) -> usize {
        self.shared.state.lock().open_connections
    }

    pub fn len(&self) -> usize {
        self.shared.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.state.lock().entries.is_empty()
    }

    /// Timestamp of the newest retained entry.
    pub fn latest_timestamp(&self) -> Option<OpTimestamp> {
        self.shared.state.lock().newest_timestamp()
    }

    /// Copy of the retained entries, oldest first.
    pub fn records(&self) -> Vec<ChangeRecord> {
        self.shared
            .state
            .lock()
            .entries
            .iter()
            .map(|e| e.record.clone())
            .collect()
    }
}

impl Default for MemoryOplog {
    fn default() -> Self {
        Self::new()
    }
}

impl LogHandle for MemoryOplog {
    type Connection = MemoryConnection;

    fn connect(&self) -> Result<MemoryConnection> {
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(StoreError::Closed);
        }
        state.open_connections += 1;
        debug!(open = state.open_connections, "oplog connection opened");

        Ok(MemoryConnection {
            shared: Arc::clone(&self.shared),
        })
    }
}

/// A dedicated connection to a [`MemoryOplog`].
pub struct MemoryConnection {
    shared: Arc<Shared>,
}

impl LogConnection for MemoryConnection {
    type Cursor = MemoryCursor;

    fn tail(&mut self, query: &TailQuery, wait: Duration) -> Result<MemoryCursor> {
        let state = self.shared.state.lock();
        if state.closed {
            return Err(StoreError::Closed);
        }
        if let Some(message) = &state.failure {
            return Err(StoreError::Query(message.clone()));
        }

        // Entries are in timestamp order, so skip straight to the first
        // one the query can match.
        let skip = state
            .entries
            .partition_point(|e| e.record.timestamp < query.min_timestamp);
        let position = state
            .entries
            .get(skip)
            .map_or(state.next_slot, |e| e.slot);

        trace!(position, min_timestamp = %query.min_timestamp, "opened tailable cursor");

        Ok(MemoryCursor {
            shared: Arc::clone(&self.shared),
            query: query.clone(),
            wait,
            position,
            epoch: state.epoch,
        })
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        state.open_connections = state.open_connections.saturating_sub(1);
        debug!(open = state.open_connections, "oplog connection released");
    }
}

/// Tailable cursor over a [`MemoryOplog`].
pub struct MemoryCursor {
    shared: Arc<Shared>,
    query: TailQuery,
    wait: Duration,
    /// Slot of the next entry to examine.
    position: u64,
    epoch: u64,
}

impl TailCursor for MemoryCursor {
    fn next(&mut self) -> Result<Fetch> {
        let deadline = Instant::now() + self.wait;
        let mut state = self.shared.state.lock();

        loop {
            if state.closed {
                return Err(StoreError::Closed);
            }
            if let Some(message) = &state.failure {
                return Err(StoreError::Query(message.clone()));
            }
            if state.epoch != self.epoch {
                return Ok(Fetch::Invalidated);
            }

            let first = state.first_slot();
            if self.position < first {
                trace!(position = self.position, first, "cursor position trimmed");
                return Ok(Fetch::Invalidated);
            }

            let start = (self.position - first) as usize;
            for entry in state.entries.iter().skip(start) {
                self.position = entry.slot + 1;
                if self.query.matches(&entry.record) {
                    return Ok(Fetch::Record(entry.record.clone()));
                }
            }
            self.position = state.next_slot;

            if self
                .shared
                .appended
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return Ok(Fetch::TimedOut);
            }
        }
    }
}
