//! Shared helpers for integration tests.

#![allow(dead_code)]

use oplog_tail::{ChangeRecord, MemoryOplog, OpTimestamp, OperationKind, Tailer, TailerConfig};
use std::time::Duration;

/// Short fetch wait so stop and timeouts resolve quickly in tests.
pub const FETCH_WAIT: Duration = Duration::from_millis(50);

/// Generous bound for anything that should happen "promptly".
pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub fn test_config() -> TailerConfig {
    TailerConfig {
        fetch_wait: FETCH_WAIT,
        ..Default::default()
    }
}

pub fn record(secs: u32, inc: u32, id: i64) -> ChangeRecord {
    ChangeRecord::new(OpTimestamp::new(secs, inc), id, OperationKind::Insert, "juju.logs")
}

pub fn recv_ids(tailer: &Tailer, n: usize) -> Vec<i64> {
    (0..n)
        .map(|_| {
            tailer
                .out()
                .recv_timeout(RECV_TIMEOUT)
                .expect("record not delivered in time")
                .operation_id
        })
        .collect()
}

pub fn assert_quiet(tailer: &Tailer) {
    let extra = tailer.out().recv_timeout(FETCH_WAIT * 4);
    assert!(extra.is_err(), "unexpected record: {:?}", extra);
}

pub fn append_all(oplog: &MemoryOplog, records: impl IntoIterator<Item = ChangeRecord>) {
    for rec in records {
        oplog.append(rec).unwrap();
    }
}
