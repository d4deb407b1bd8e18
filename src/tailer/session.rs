//! The tail loop and its resumption state.

use super::shutdown::Dying;
use crate::error::StoreError;
use crate::oplog::{Fetch, Filter, LogConnection, TailCursor, TailQuery};
use crate::record::ChangeRecord;
use crate::types::OpTimestamp;
use crossbeam_channel::{select, Sender};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, trace};

/// Connection, cursor and resumption state of one tailer.
///
/// Owned by the worker thread alone; nothing here is shared.
pub(crate) struct TailSession<C: LogConnection> {
    connection: C,
    /// Live cursor; `None` forces re-creation on the next iteration.
    cursor: Option<C::Cursor>,
    filter: Filter,
    fetch_wait: Duration,
    /// Largest timestamp delivered so far.
    last_timestamp: OpTimestamp,
    /// Ids delivered at `last_timestamp`, and only those.
    seen_ids: HashSet<i64>,
    out: Sender<ChangeRecord>,
    dying: Dying,
}

impl<C: LogConnection> TailSession<C> {
    pub(crate) fn new(
        connection: C,
        filter: Filter,
        fetch_wait: Duration,
        start_from: OpTimestamp,
        out: Sender<ChangeRecord>,
        dying: Dying,
    ) -> Self {
        Self {
            connection,
            cursor: None,
            filter,
            fetch_wait,
            last_timestamp: start_from,
            seen_ids: HashSet::new(),
            out,
            dying,
        }
    }

    /// Run until shutdown is requested (`Ok`) or the store fails (`Err`).
    pub(crate) fn run(&mut self) -> Result<(), StoreError> {
        loop {
            if self.dying.is_dying() {
                debug!(last_timestamp = %self.last_timestamp, "tail loop stopping");
                return Ok(());
            }

            match self.live_cursor()?.next()? {
                Fetch::Record(record) => {
                    let (timestamp, id) = (record.timestamp, record.operation_id);
                    if !self.emit(record) {
                        debug!("tail loop stopping during delivery");
                        return Ok(());
                    }
                    self.observe(timestamp, id);
                }
                Fetch::TimedOut => {}
                Fetch::Invalidated => {
                    debug!(
                        last_timestamp = %self.last_timestamp,
                        seen = self.seen_ids.len(),
                        "cursor invalidated, recreating"
                    );
                    self.cursor = None;
                }
            }
        }
    }

    fn live_cursor(&mut self) -> Result<&mut C::Cursor, StoreError> {
        let cursor = match self.cursor.take() {
            Some(cursor) => cursor,
            None => {
                let query = self.resume_query();
                trace!(
                    min_timestamp = %query.min_timestamp,
                    excluded = query.exclude_ids.len(),
                    "opening tailable cursor"
                );
                self.connection.tail(&query, self.fetch_wait)?
            }
        };
        Ok(self.cursor.insert(cursor))
    }

    /// Caller filter AND `timestamp >= last_timestamp` AND id not yet seen.
    ///
    /// Resuming at `>=` rather than `>` keeps undelivered entries that share
    /// the boundary tick; the exclusion set drops the delivered ones.
    fn resume_query(&self) -> TailQuery {
        TailQuery {
            filter: self.filter.clone(),
            min_timestamp: self.last_timestamp,
            exclude_ids: self.seen_ids.clone(),
        }
    }

    /// Hand a record to the consumer unless shutdown begins first.
    fn emit(&self, record: ChangeRecord) -> bool {
        select! {
            send(self.out, record) -> sent => sent.is_ok(),
            recv(self.dying.receiver()) -> _ => false,
        }
    }

    fn observe(&mut self, timestamp: OpTimestamp, id: i64) {
        if timestamp > self.last_timestamp {
            self.last_timestamp = timestamp;
            self.seen_ids = HashSet::new();
        }
        self.seen_ids.insert(id);
    }

    #[cfg(test)]
    pub(crate) fn last_timestamp(&self) -> OpTimestamp {
        self.last_timestamp
    }

    #[cfg(test)]
    pub(crate) fn seen_ids(&self) -> &HashSet<i64> {
        &self.seen_ids
    }

    #[cfg(test)]
    pub(crate) fn has_cursor(&self) -> bool {
        self.cursor.is_some()
    }
}
