//! End-to-end tailer behaviour against an in-memory oplog.

mod common;

use common::*;
use oplog_tail::{
    ChangeRecord, Fetch, Filter, LogConnection, LogHandle, MemoryOplog, OpTimestamp,
    OperationKind, Predicate, StoreError, TailCursor, TailError, TailQuery, Tailer, TailerConfig,
    TailerStatus,
};
use std::thread;
use std::time::{Duration, Instant};

// --- Ordering ---

#[test]
fn test_delivers_in_log_order() {
    init_tracing();
    let oplog = MemoryOplog::new();
    append_all(&oplog, (1..=20).map(|i| record(i, 1, i as i64)));

    let tailer = Tailer::with_config(&oplog, Filter::all(), test_config()).unwrap();
    assert_eq!(recv_ids(&tailer, 20), (1..=20).collect::<Vec<_>>());
    assert_quiet(&tailer);
    tailer.stop().unwrap();
}

#[test]
fn test_delivers_live_appends() {
    let oplog = MemoryOplog::new();
    let tailer = Tailer::with_config(&oplog, Filter::all(), test_config()).unwrap();

    let writer = {
        let oplog = oplog.clone();
        thread::spawn(move || {
            for _ in 0..10 {
                oplog
                    .log_operation(OperationKind::Insert, "juju.logs", None, None)
                    .unwrap();
                thread::sleep(Duration::from_millis(5));
            }
        })
    };

    let delivered: Vec<ChangeRecord> = (0..10)
        .map(|_| tailer.out().recv_timeout(RECV_TIMEOUT).unwrap())
        .collect();
    writer.join().unwrap();

    assert_eq!(delivered, oplog.records());
    tailer.stop().unwrap();
}

#[test]
fn test_filter_restricts_entries() {
    let oplog = MemoryOplog::new();
    append_all(
        &oplog,
        [
            ChangeRecord::new(OpTimestamp::new(1, 1), 1, OperationKind::Insert, "juju.logs"),
            ChangeRecord::new(OpTimestamp::new(1, 2), 2, OperationKind::Insert, "juju.machines"),
            ChangeRecord::new(OpTimestamp::new(1, 3), 3, OperationKind::Delete, "juju.logs"),
            ChangeRecord::new(OpTimestamp::new(1, 4), 4, OperationKind::Insert, "juju.logs"),
        ],
    );

    let filter = Filter::namespace("juju.logs").and(Predicate::Kind(OperationKind::Insert));
    let tailer = Tailer::with_config(&oplog, filter, test_config()).unwrap();
    assert_eq!(recv_ids(&tailer, 2), vec![1, 4]);
    assert_quiet(&tailer);
}

#[test]
fn test_start_from_skips_older_entries() {
    let oplog = MemoryOplog::new();
    append_all(&oplog, (1..=5).map(|i| record(i, 1, i as i64)));

    let config = TailerConfig {
        start_from: OpTimestamp::new(4, 1),
        ..test_config()
    };
    let tailer = Tailer::with_config(&oplog, Filter::all(), config).unwrap();
    assert_eq!(recv_ids(&tailer, 2), vec![4, 5]);
    assert_quiet(&tailer);
}

// --- Resumption ---

#[test]
fn test_boundary_dedup_after_invalidation() {
    init_tracing();
    let oplog = MemoryOplog::new();
    append_all(&oplog, [record(100, 1, 1), record(100, 1, 2)]);

    let tailer = Tailer::with_config(&oplog, Filter::all(), test_config()).unwrap();
    assert_eq!(recv_ids(&tailer, 2), vec![1, 2]);

    oplog.invalidate_cursors();
    oplog.append(record(100, 2, 3)).unwrap();

    assert_eq!(recv_ids(&tailer, 1), vec![3]);
    assert_quiet(&tailer);
    tailer.stop().unwrap();
}

#[test]
fn test_undelivered_entries_of_boundary_tick_survive_invalidation() {
    let oplog = MemoryOplog::new();
    append_all(&oplog, [record(7, 1, 1), record(7, 1, 2)]);

    let tailer = Tailer::with_config(&oplog, Filter::all(), test_config()).unwrap();
    assert_eq!(recv_ids(&tailer, 2), vec![1, 2]);

    // A late entry with the same tick as the last delivered one.
    oplog.invalidate_cursors();
    oplog.append(record(7, 1, 9)).unwrap();

    assert_eq!(recv_ids(&tailer, 1), vec![9]);
    assert_quiet(&tailer);
}

#[test]
fn test_capped_trim_recovers_without_duplicates() {
    let oplog = MemoryOplog::with_capacity(3);
    append_all(&oplog, (1..=3).map(|i| record(i, 1, i as i64)));

    let tailer = Tailer::with_config(&oplog, Filter::all(), test_config()).unwrap();
    assert_eq!(recv_ids(&tailer, 1), vec![1]);

    append_all(&oplog, (4..=6).map(|i| record(i, 1, i as i64)));

    // Entries 2 and 3 may be trimmed before the worker reads them; every
    // retained entry must still arrive exactly once, in order.
    let mut delivered = Vec::new();
    while delivered.last() != Some(&6) {
        delivered.push(tailer.out().recv_timeout(RECV_TIMEOUT).unwrap().operation_id);
    }
    assert!(delivered.windows(2).all(|w| w[0] < w[1]), "{delivered:?}");
    for id in [4, 5, 6] {
        assert!(delivered.contains(&id), "{id} missing from {delivered:?}");
    }
    assert_quiet(&tailer);
}

// --- Shutdown ---

#[test]
fn test_clean_stop_before_any_record() {
    let oplog = MemoryOplog::new();
    let tailer = Tailer::with_config(&oplog, Filter::all(), test_config()).unwrap();
    assert!(tailer.is_alive());
    assert_eq!(tailer.status(), TailerStatus::Running);

    let start = Instant::now();
    tailer.stop().unwrap();
    assert!(start.elapsed() < RECV_TIMEOUT);

    assert!(tailer.err().is_none());
    assert!(!tailer.is_alive());
    assert_eq!(tailer.status(), TailerStatus::Stopped);
    assert!(tailer.dying().is_dying());
    assert!(tailer.out().recv().is_err());
}

#[test]
fn test_stop_is_idempotent() {
    let oplog = MemoryOplog::new();
    let tailer = Tailer::with_config(&oplog, Filter::all(), test_config()).unwrap();
    tailer.stop().unwrap();
    tailer.stop().unwrap();
    assert!(tailer.err().is_none());
}

#[test]
fn test_stop_with_stalled_consumer_is_prompt() {
    let oplog = MemoryOplog::new();
    append_all(&oplog, (1..=5).map(|i| record(i, 1, i as i64)));

    // A long fetch wait shows stop does not wait on it while delivering.
    let config = TailerConfig {
        fetch_wait: Duration::from_secs(30),
        ..Default::default()
    };
    let tailer = Tailer::with_config(&oplog, Filter::all(), config).unwrap();

    // Never drain; let the worker block on delivery.
    thread::sleep(Duration::from_millis(50));

    let start = Instant::now();
    tailer.stop().unwrap();
    assert!(start.elapsed() < RECV_TIMEOUT, "stop took {:?}", start.elapsed());
    assert!(tailer.err().is_none());
}

#[test]
fn test_dying_observed_from_other_thread() {
    let oplog = MemoryOplog::new();
    let tailer = Tailer::with_config(&oplog, Filter::all(), test_config()).unwrap();
    let dying = tailer.dying();

    let watcher = thread::spawn(move || {
        dying.wait();
        true
    });

    tailer.stop().unwrap();
    assert!(watcher.join().unwrap());
}

#[test]
fn test_connection_released_exactly_once() {
    let oplog = MemoryOplog::new();
    {
        let a = Tailer::with_config(&oplog, Filter::all(), test_config()).unwrap();
        let _b = Tailer::with_config(&oplog, Filter::all(), test_config()).unwrap();
        assert_eq!(oplog.open_connections(), 2);

        a.stop().unwrap();
        assert_eq!(oplog.open_connections(), 1);
        a.stop().unwrap();
        assert_eq!(oplog.open_connections(), 1);
    }
    // Dropping the second tailer stops it.
    assert_eq!(oplog.open_connections(), 0);
}

// --- Failure ---

#[test]
fn test_fetch_failure_is_terminal() {
    init_tracing();
    let oplog = MemoryOplog::new();
    oplog.append(record(1, 1, 1)).unwrap();

    let tailer = Tailer::with_config(&oplog, Filter::all(), test_config()).unwrap();
    assert_eq!(recv_ids(&tailer, 1), vec![1]);

    oplog.inject_failure("connection reset");
    oplog.append(record(2, 1, 2)).unwrap();

    // The queue disconnects without delivering anything further.
    assert!(tailer.out().recv_timeout(RECV_TIMEOUT).is_err());
    tailer.dying().wait();

    let expected = TailError::Store(StoreError::Query("connection reset".into()));
    assert_eq!(tailer.err(), Some(expected.clone()));
    assert_eq!(tailer.stop(), Err(expected.clone()));
    assert_eq!(tailer.status(), TailerStatus::Failed(expected));
    assert_eq!(oplog.open_connections(), 0);
}

#[test]
fn test_connect_failure_reported_at_construction() {
    let oplog = MemoryOplog::new();
    oplog.close().unwrap();

    let result = Tailer::new(&oplog, Filter::all());
    assert!(matches!(result, Err(TailError::Store(StoreError::Closed))));
}

#[test]
fn test_closing_the_oplog_ends_the_tail() {
    let oplog = MemoryOplog::new();
    let tailer = Tailer::with_config(&oplog, Filter::all(), test_config()).unwrap();

    oplog.close().unwrap();
    assert!(tailer.iter().next().is_none());
    assert_eq!(tailer.err(), Some(TailError::Store(StoreError::Closed)));
}

/// Store whose cursors panic on the first fetch.
struct PanickingLog;
struct PanickingConnection;
struct PanickingCursor;

impl LogHandle for PanickingLog {
    type Connection = PanickingConnection;

    fn connect(&self) -> oplog_tail::Result<PanickingConnection> {
        Ok(PanickingConnection)
    }
}

impl LogConnection for PanickingConnection {
    type Cursor = PanickingCursor;

    fn tail(&mut self, _query: &TailQuery, _wait: Duration) -> oplog_tail::Result<PanickingCursor> {
        Ok(PanickingCursor)
    }
}

impl TailCursor for PanickingCursor {
    fn next(&mut self) -> oplog_tail::Result<Fetch> {
        panic!("cursor blew up");
    }
}

#[test]
fn test_worker_panic_is_observable_without_stop() {
    let tailer = Tailer::with_config(&PanickingLog, Filter::all(), test_config()).unwrap();

    assert!(tailer.dying().wait_timeout(RECV_TIMEOUT));
    assert!(tailer.out().recv_timeout(RECV_TIMEOUT).is_err());
    assert_eq!(tailer.err(), Some(TailError::WorkerPanicked));

    let deadline = Instant::now() + RECV_TIMEOUT;
    while tailer.is_alive() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert!(!tailer.is_alive());
    assert_eq!(tailer.status(), TailerStatus::Failed(TailError::WorkerPanicked));

    assert_eq!(tailer.stop(), Err(TailError::WorkerPanicked));
}
