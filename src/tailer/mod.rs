//! Resumable tailing of an operation log.
//!
//! A [`Tailer`] owns one dedicated store connection and one worker thread.
//! The worker follows the log through a tailable cursor and hands each
//! matching entry to the caller through a single-slot queue, so a slow
//! consumer slows the tail rather than growing a buffer.
//!
//! When the store invalidates the cursor, the worker re-opens it at the
//! last delivered timestamp, excluding the operation ids it already
//! delivered at that timestamp. Entries sharing a timestamp are therefore
//! neither skipped nor repeated across cursor re-creation.
//!
//! # Example
//!
//! ```
//! use oplog_tail::{ChangeRecord, Filter, MemoryOplog, OperationKind, OpTimestamp, Tailer};
//!
//! let oplog = MemoryOplog::new();
//! oplog
//!     .append(ChangeRecord::new(OpTimestamp::new(1, 1), 42, OperationKind::Insert, "db.logs"))
//!     .unwrap();
//!
//! let tailer = Tailer::new(&oplog, Filter::namespace("db.logs")).unwrap();
//! let record = tailer.out().recv().unwrap();
//! assert_eq!(record.operation_id, 42);
//! tailer.stop().unwrap();
//! ```

mod session;
mod shutdown;

pub use shutdown::Dying;

use crate::error::TailError;
use crate::oplog::{Filter, LogConnection, LogHandle};
use crate::record::ChangeRecord;
use crate::types::OpTimestamp;
use crossbeam_channel::{bounded, Receiver};
use parking_lot::Mutex;
use session::TailSession;
use shutdown::Lifecycle;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Capacity of the delivery queue between the worker and the consumer.
const DELIVERY_QUEUE_CAPACITY: usize = 1;

/// Tailer configuration.
#[derive(Clone, Debug)]
pub struct TailerConfig {
    /// How long one fetch waits for new entries. Bounds both how quickly
    /// new entries are noticed and how quickly a stop is honoured.
    /// Default: 1s
    pub fetch_wait: Duration,

    /// Deliver entries at or after this timestamp.
    /// Default: `OpTimestamp::ZERO` (everything retained)
    pub start_from: OpTimestamp,

    /// Name of the worker thread.
    pub thread_name: String,
}

impl Default for TailerConfig {
    fn default() -> Self {
        Self {
            fetch_wait: Duration::from_secs(1),
            start_from: OpTimestamp::ZERO,
            thread_name: "oplog-tailer".to_string(),
        }
    }
}

/// Observable state of a tailer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TailerStatus {
    /// The worker is still running.
    Running,
    /// The worker exited after a stop request.
    Stopped,
    /// The worker exited because the store failed.
    Failed(TailError),
}

/// Follows an operation log and republishes matching entries in order.
///
/// Dropping a tailer stops it.
pub struct Tailer {
    out: Receiver<ChangeRecord>,
    lifecycle: Arc<Lifecycle>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Tailer {
    /// Start tailing entries matching `filter` with the default config.
    pub fn new<H: LogHandle>(handle: &H, filter: Filter) -> Result<Self, TailError> {
        Self::with_config(handle, filter, TailerConfig::default())
    }

    /// Start tailing entries matching `filter`.
    ///
    /// Opens a dedicated connection (failures are returned here) and spawns
    /// the worker thread.
    pub fn with_config<H: LogHandle>(
        handle: &H,
        filter: Filter,
        config: TailerConfig,
    ) -> Result<Self, TailError> {
        let connection = handle.connect()?;
        let (out_tx, out_rx) = bounded(DELIVERY_QUEUE_CAPACITY);
        let lifecycle = Arc::new(Lifecycle::new());

        let worker_lifecycle = Arc::clone(&lifecycle);
        let worker = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || {
                let session = TailSession::new(
                    connection,
                    filter,
                    config.fetch_wait,
                    config.start_from,
                    out_tx,
                    worker_lifecycle.dying().clone(),
                );
                let mut exit = WorkerExit {
                    session: Some(session),
                    lifecycle: worker_lifecycle,
                    outcome: None,
                };

                if let Some(session) = exit.session.as_mut() {
                    if let Err(err) = session.run() {
                        warn!(error = %err, "oplog tailer failed");
                        exit.outcome = Some(err.into());
                    }
                }
            })
            .map_err(|e| TailError::Spawn(e.to_string()))?;

        debug!(thread = %config.thread_name, "oplog tailer started");

        Ok(Self {
            out: out_rx,
            lifecycle,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Entries matching the filter, in log order.
    ///
    /// The channel disconnects once the worker has exited, whether by stop
    /// or by failure.
    pub fn out(&self) -> &Receiver<ChangeRecord> {
        &self.out
    }

    /// Blocking iterator over [`out`](Self::out); ends when the worker exits.
    pub fn iter(&self) -> crossbeam_channel::Iter<'_, ChangeRecord> {
        self.out.iter()
    }

    /// Signal that fires when the tailer begins shutting down.
    pub fn dying(&self) -> Dying {
        self.lifecycle.dying().clone()
    }

    /// Stop the tailer and wait for the worker to exit and release its
    /// connection. Safe to call more than once and from several threads.
    ///
    /// Returns the error that ended the tail, if the store failed.
    pub fn stop(&self) -> Result<(), TailError> {
        self.lifecycle.kill(None);

        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                self.lifecycle.kill(Some(TailError::WorkerPanicked));
                self.lifecycle.mark_done();
            }
        }

        match self.lifecycle.reason() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// The error that ended the tail, if the store failed. `None` while
    /// running and after a clean stop.
    pub fn err(&self) -> Option<TailError> {
        self.lifecycle.reason()
    }

    /// Whether the worker thread is still running.
    pub fn is_alive(&self) -> bool {
        !self.lifecycle.is_done()
    }

    pub fn status(&self) -> TailerStatus {
        if !self.lifecycle.is_done() {
            return TailerStatus::Running;
        }
        match self.lifecycle.reason() {
            Some(err) => TailerStatus::Failed(err),
            None => TailerStatus::Stopped,
        }
    }
}

/// Worker exit bookkeeping, run on return and on unwind alike.
struct WorkerExit<C: LogConnection> {
    session: Option<TailSession<C>>,
    lifecycle: Arc<Lifecycle>,
    outcome: Option<TailError>,
}

impl<C: LogConnection> Drop for WorkerExit<C> {
    fn drop(&mut self) {
        let reason = if thread::panicking() {
            warn!("oplog tailer panicked");
            Some(TailError::WorkerPanicked)
        } else {
            self.outcome.take()
        };

        // Record the outcome before the queue disconnects, so a consumer
        // that sees the end of `out()` also sees `err()`.
        self.lifecycle.kill(reason);
        drop(self.session.take());
        self.lifecycle.mark_done();
        debug!("oplog tailer exited");
    }
}

impl Drop for Tailer {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

impl<'a> IntoIterator for &'a Tailer {
    type Item = ChangeRecord;
    type IntoIter = crossbeam_channel::Iter<'a, ChangeRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
