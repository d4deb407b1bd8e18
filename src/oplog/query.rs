//! Store-native queries over oplog entries.

use crate::record::ChangeRecord;
use crate::types::{OpTimestamp, OperationKind};
use serde_json::Value;
use std::collections::HashSet;

/// One clause of a caller filter.
///
/// No clause can reference the timestamp or operation id; those fields
/// belong to the tailer's resumption predicate.
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    /// Entry namespace equals the given `"<db>.<collection>"`.
    Namespace(String),

    /// Entry namespace is one of the given namespaces.
    NamespaceIn(Vec<String>),

    /// Entry kind equals the given kind.
    Kind(OperationKind),

    /// A field of the decoded primary payload equals `value`.
    /// `path` is dotted for nested documents, e.g. `"life.state"`.
    ObjectFieldEq { path: String, value: Value },
}

impl Predicate {
    fn matches(&self, record: &ChangeRecord) -> bool {
        match self {
            Predicate::Namespace(ns) => record.namespace == *ns,
            Predicate::NamespaceIn(namespaces) => namespaces.iter().any(|ns| *ns == record.namespace),
            Predicate::Kind(kind) => record.kind == *kind,
            Predicate::ObjectFieldEq { path, value } => {
                let Some(raw) = record.object.as_ref() else {
                    return false;
                };
                let Ok(doc) = rmp_serde::from_slice::<Value>(raw.as_bytes()) else {
                    return false;
                };
                lookup(&doc, path) == Some(value)
            }
        }
    }
}

fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |node, key| node.get(key))
}

/// Conjunction of predicates restricting which entries a tailer sees.
///
/// An empty filter matches every entry.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter {
    predicates: Vec<Predicate>,
}

impl Filter {
    /// Match every entry.
    pub fn all() -> Self {
        Self::default()
    }

    /// Match entries in one namespace.
    pub fn namespace(ns: impl Into<String>) -> Self {
        Self::all().and(Predicate::Namespace(ns.into()))
    }

    /// Add a clause.
    pub fn and(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Add an equality clause on a payload field.
    pub fn field_eq(self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.and(Predicate::ObjectFieldEq {
            path: path.into(),
            value: value.into(),
        })
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn matches(&self, record: &ChangeRecord) -> bool {
        self.predicates.iter().all(|p| p.matches(record))
    }
}

/// The effective query a tailer runs: the caller filter plus its
/// resumption position.
#[derive(Clone, Debug, Default)]
pub struct TailQuery {
    pub filter: Filter,

    /// Only entries at or after this timestamp.
    pub min_timestamp: OpTimestamp,

    /// Operation ids already delivered at `min_timestamp`.
    pub exclude_ids: HashSet<i64>,
}

impl TailQuery {
    /// Reference semantics for stores that evaluate queries in process.
    pub fn matches(&self, record: &ChangeRecord) -> bool {
        record.timestamp >= self.min_timestamp
            && !self.exclude_ids.contains(&record.operation_id)
            && self.filter.matches(record)
    }
}
