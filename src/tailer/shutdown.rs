//! Shutdown signalling between a tailer handle and its worker.

use crate::error::TailError;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Broadcast signal that fires once, when a tailer starts shutting down.
///
/// The signal is a channel that never carries a message and disconnects
/// on shutdown, so any number of clones can wait on it, including inside
/// `crossbeam_channel::select!` via [`receiver`](Self::receiver).
#[derive(Clone, Debug)]
pub struct Dying {
    rx: Receiver<()>,
}

impl Dying {
    /// Whether shutdown has begun.
    pub fn is_dying(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Block until shutdown begins.
    pub fn wait(&self) {
        // Only ever returns once the sender is gone.
        let _ = self.rx.recv();
    }

    /// Block until shutdown begins or `timeout` elapses. Returns whether
    /// shutdown has begun.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        matches!(
            self.rx.recv_timeout(timeout),
            Err(RecvTimeoutError::Disconnected)
        )
    }

    /// The underlying channel, for use as a `recv` arm in `select!`.
    /// It becomes ready (disconnected) when shutdown begins.
    pub fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }
}

/// Kill/done bookkeeping shared by a tailer and its worker thread.
pub(crate) struct Lifecycle {
    kill_tx: Mutex<Option<Sender<()>>>,
    dying: Dying,
    reason: Mutex<Option<TailError>>,
    done: AtomicBool,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        let (kill_tx, rx) = bounded(0);
        Self {
            kill_tx: Mutex::new(Some(kill_tx)),
            dying: Dying { rx },
            reason: Mutex::new(None),
            done: AtomicBool::new(false),
        }
    }

    /// Begin shutdown. The first error passed in is kept; later kills
    /// never overwrite it.
    pub(crate) fn kill(&self, reason: Option<TailError>) {
        if let Some(err) = reason {
            let mut kept = self.reason.lock();
            if kept.is_none() {
                *kept = Some(err);
            }
        }
        self.kill_tx.lock().take();
    }

    pub(crate) fn dying(&self) -> &Dying {
        &self.dying
    }

    pub(crate) fn reason(&self) -> Option<TailError> {
        self.reason.lock().clone()
    }

    pub(crate) fn mark_done(&self) {
        self.done.store(true, Ordering::Release);
    }

    pub(crate) fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }
}
