//! Optimistic revision checks and advisory locks.
//!
//! Every entity row carries a revision counter. An update or remove first
//! reads the stored revision with `FOR UPDATE` inside its transaction and
//! compares it with the revision the object last saw; a mismatch ends the
//! transaction without writing and is reported as a conflict status. The
//! caller synchronizes and retries.
//!
//! Advisory locks are independent of revisions and never bump them.
//!
//! In-memory state (keys, revisions, snapshots, lock records, cache
//! entries) changes inside the transaction that writes the row, and each
//! change registers its undo. When the caller's outermost transaction rolls
//! back, every object returns to the state it had before.

mod controller;
mod lock;
mod state;

pub(crate) use controller::{increment, insert, remove, synchronize, update};
pub(crate) use lock::{lock_status, try_lock, unlock};
pub use lock::{LockInfo, LockStatus, UnlockStatus};
pub(crate) use state::sync_state;
pub use state::{FieldConflict, RemoveStatus, SyncState, SyncStatus, UpdateStatus};

use crate::entity::{Checkpoint, ObjectRef};
use crate::error::Result;
use crate::storage::{Storage, Transaction};

/// How a transactional body wants its transaction to end.
pub(crate) enum Finish<T> {
    Commit(T),
    /// Nothing was written; end without poisoning an outer transaction.
    Release(T),
}

/// Run `body` in a transaction level. A failing body rolls back.
pub(crate) fn transactional<T>(
    storage: &Storage,
    body: impl FnOnce(&Transaction<'_>) -> Result<Finish<T>>,
) -> Result<T> {
    let tx = storage.begin()?;
    match body(&tx) {
        Ok(Finish::Commit(value)) => {
            tx.commit()?;
            Ok(value)
        }
        Ok(Finish::Release(value)) => {
            tx.release()?;
            Ok(value)
        }
        Err(e) => {
            tx.rollback()?;
            Err(e)
        }
    }
}

/// Put `objects` back into their current engine state if the transaction
/// `tx` belongs to rolls back.
pub(crate) fn restore_on_rollback(
    tx: &Transaction<'_>,
    objects: impl IntoIterator<Item = ObjectRef>,
) {
    let saved: Vec<(ObjectRef, Checkpoint)> = objects
        .into_iter()
        .map(|object| {
            let checkpoint = object.core().checkpoint();
            (object, checkpoint)
        })
        .collect();
    if saved.is_empty() {
        return;
    }
    tx.on_rollback(move || {
        for (object, checkpoint) in saved.into_iter().rev() {
            object.core().restore(checkpoint);
        }
    });
}
