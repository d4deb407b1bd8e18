//! Randomised delivery checks: whatever the cursor invalidation pattern,
//! the tailer delivers every matching entry exactly once, in log order.

mod common;

use common::*;
use oplog_tail::{ChangeRecord, Filter, MemoryOplog, OpTimestamp, OperationKind, Tailer};
use proptest::prelude::*;
use std::collections::BTreeSet;

#[derive(Debug, Clone)]
struct Step {
    /// Start a new tick rather than share the previous one.
    advance: bool,
    in_namespace: bool,
}

fn step_strategy() -> impl Strategy<Value = Step> {
    (any::<bool>(), prop::bool::weighted(0.7))
        .prop_map(|(advance, in_namespace)| Step { advance, in_namespace })
}

fn build_log(steps: &[Step]) -> Vec<ChangeRecord> {
    let mut secs = 1;
    let mut inc = 1;
    steps
        .iter()
        .enumerate()
        .map(|(i, step)| {
            if step.advance {
                secs += 1;
                inc = 1;
            }
            let ns = if step.in_namespace { "juju.logs" } else { "juju.txns" };
            // Ids are unique but unrelated to log position.
            let id = (i as i64 * 7919) % 100_003;
            ChangeRecord::new(OpTimestamp::new(secs, inc), id, OperationKind::Insert, ns)
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn delivery_survives_random_invalidation(
        steps in prop::collection::vec(step_strategy(), 1..40),
        invalidate_after in prop::collection::btree_set(0usize..40, 0..6),
    ) {
        let log = build_log(&steps);
        let oplog = MemoryOplog::new();
        append_all(&oplog, log.iter().cloned());

        let expected: Vec<i64> = log
            .iter()
            .filter(|r| r.namespace == "juju.logs")
            .map(|r| r.operation_id)
            .collect();

        let tailer = Tailer::with_config(&oplog, Filter::namespace("juju.logs"), test_config()).unwrap();

        let mut delivered = Vec::with_capacity(expected.len());
        for n in 0..expected.len() {
            if invalidate_after.contains(&n) {
                oplog.invalidate_cursors();
            }
            delivered.push(
                tailer.out().recv_timeout(RECV_TIMEOUT).expect("missing record").operation_id,
            );
        }

        prop_assert_eq!(&delivered, &expected);
        prop_assert!(tailer.out().recv_timeout(FETCH_WAIT * 2).is_err());

        let unique: BTreeSet<_> = delivered.iter().collect();
        prop_assert_eq!(unique.len(), delivered.len());
        tailer.stop().unwrap();
    }

    #[test]
    fn shared_tick_entries_survive_late_invalidation(
        per_tick in 1usize..6,
        ticks in 1u32..5,
    ) {
        let oplog = MemoryOplog::new();
        let mut id = 0;
        for secs in 1..=ticks {
            for _ in 0..per_tick {
                id += 1;
                oplog.append(record(secs, 1, id)).unwrap();
            }
        }

        let tailer = Tailer::with_config(&oplog, Filter::all(), test_config()).unwrap();
        let first = recv_ids(&tailer, id as usize);
        prop_assert_eq!(first, (1..=id).collect::<Vec<_>>());

        // Late arrivals in the last delivered tick, then a new tick.
        oplog.invalidate_cursors();
        oplog.append(record(ticks, 1, id + 1)).unwrap();
        oplog.append(record(ticks + 1, 1, id + 2)).unwrap();

        prop_assert_eq!(recv_ids(&tailer, 2), vec![id + 1, id + 2]);
        prop_assert!(tailer.out().recv_timeout(FETCH_WAIT * 2).is_err());
        tailer.stop().unwrap();
    }
}
