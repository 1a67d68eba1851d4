//! Synchronization states and operation outcomes.

use ormlink_query::Value;
use serde::{Deserialize, Serialize};

use crate::entity::ObjectRef;

/// Where an object stands relative to its stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncState {
    /// Never stored, or its row was removed.
    Unsynchronized,
    /// Matches the row as last read or written.
    InSync,
    /// Has field or relation changes not yet written.
    Dirty,
}

/// Outcome of an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateStatus {
    Success,
    /// The row changed since the object last saw it. Synchronize, then
    /// retry. `stored_revision` is `None` when the row no longer exists.
    Conflict {
        stored_revision: Option<i64>,
        known_revision: i64,
    },
}

impl UpdateStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, UpdateStatus::Success)
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, UpdateStatus::Conflict { .. })
    }
}

/// A field changed both locally and remotely to different values.
///
/// The local value is kept; the caller decides which one wins.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldConflict {
    pub field: String,
    pub local: Value,
    pub remote: Value,
}

/// Outcome of a synchronize.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncStatus {
    /// The stored revision equals the known one.
    Unchanged,
    /// Remote changes were pulled in.
    Updated { conflicts: Vec<FieldConflict> },
    /// The row is gone; the object was detached from storage.
    Removed,
    /// The object was never stored.
    NotPersisted,
}

impl SyncStatus {
    /// Conflicting fields, if any.
    pub fn conflicts(&self) -> &[FieldConflict] {
        match self {
            SyncStatus::Updated { conflicts } => conflicts,
            _ => &[],
        }
    }
}

/// Outcome of a remove.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveStatus {
    Removed,
    /// The row changed since the object last saw it; nothing was deleted.
    Conflict {
        stored_revision: i64,
        known_revision: i64,
    },
    /// The object was never stored.
    NotPersisted,
}

/// Current state of `object`.
pub(crate) fn sync_state(object: &ObjectRef) -> SyncState {
    let core = object.core();
    if core.key().is_none() {
        return SyncState::Unsynchronized;
    }
    let fields_changed = core
        .snapshot()
        .map_or(true, |snapshot| snapshot != object.stored_values());
    if fields_changed || core.relations().iter().any(|r| r.is_dirty()) {
        SyncState::Dirty
    } else {
        SyncState::InSync
    }
}

/// Merge remote stored values into local ones.
///
/// A field takes the remote value unless it was changed locally. A field
/// changed on both sides to different values is reported and keeps the
/// local value.
pub(crate) fn merge_fields(
    names: &[String],
    snapshot: &[Value],
    local: &[Value],
    remote: &[Value],
) -> (Vec<Value>, Vec<FieldConflict>) {
    let mut merged = Vec::with_capacity(remote.len());
    let mut conflicts = Vec::new();
    for (i, remote_value) in remote.iter().enumerate() {
        let base = snapshot.get(i);
        let local_value = local.get(i).unwrap_or(remote_value);
        let changed_locally = base != Some(local_value);
        let changed_remotely = base != Some(remote_value);
        if changed_locally && changed_remotely && local_value != remote_value {
            conflicts.push(FieldConflict {
                field: names.get(i).cloned().unwrap_or_default(),
                local: local_value.clone(),
                remote: remote_value.clone(),
            });
            merged.push(local_value.clone());
        } else if changed_locally {
            merged.push(local_value.clone());
        } else {
            merged.push(remote_value.clone());
        }
    }
    (merged, conflicts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> Vec<String> {
        vec!["a".into(), "b".into(), "c".into()]
    }

    #[test]
    fn test_merge_takes_remote_for_untouched_fields() {
        let snapshot = vec![Value::Int64(1), Value::Int64(2), Value::Int64(3)];
        let local = snapshot.clone();
        let remote = vec![Value::Int64(1), Value::Int64(20), Value::Int64(3)];
        let (merged, conflicts) = merge_fields(&names(), &snapshot, &local, &remote);
        assert_eq!(merged, remote);
        assert!(conflicts.is_empty());
    }

    #[test]
    fn test_merge_keeps_local_edits() {
        let snapshot = vec![Value::Int64(1), Value::Int64(2), Value::Int64(3)];
        let local = vec![Value::Int64(10), Value::Int64(2), Value::Int64(3)];
        let remote = vec![Value::Int64(1), Value::Int64(2), Value::Int64(30)];
        let (merged, conflicts) = merge_fields(&names(), &snapshot, &local, &remote);
        assert_eq!(merged, vec![Value::Int64(10), Value::Int64(2), Value::Int64(30)]);
        assert!(conflicts.is_empty());
    }

    #[test]
    fn test_merge_reports_conflicting_edits() {
        let snapshot = vec![Value::Int64(1), Value::Int64(2), Value::Int64(3)];
        let local = vec![Value::Int64(10), Value::Int64(5), Value::Int64(3)];
        let remote = vec![Value::Int64(11), Value::Int64(5), Value::Int64(3)];
        let (merged, conflicts) = merge_fields(&names(), &snapshot, &local, &remote);
        assert_eq!(merged[0], Value::Int64(10));
        // same change on both sides is not a conflict
        assert_eq!(merged[1], Value::Int64(5));
        assert_eq!(
            conflicts,
            vec![FieldConflict {
                field: "a".into(),
                local: Value::Int64(10),
                remote: Value::Int64(11),
            }]
        );
    }
}
