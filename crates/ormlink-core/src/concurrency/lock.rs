//! Advisory locks.
//!
//! A lock is a row in the lock table; the locked row's lock column holds
//! its id. Both are written in one short transaction that first reads the
//! lock column with `FOR UPDATE` (SQLite: under `BEGIN IMMEDIATE`), so two
//! processes can never both see the object unlocked and both lock it.
//! Locks are cooperative: nothing stops a writer that does not ask.

use chrono::{DateTime, Utc};
use ormlink_query::{Condition, Delete, Insert, Select, Update, Value};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::{transactional, Finish};
use crate::context::StorageContext;
use crate::entity::ObjectRef;
use crate::error::{Error, LockError, Result};
use crate::meta::LOCK_COLUMN;
use crate::storage::schema::lock_columns;
use crate::storage::Transaction;

/// One advisory lock row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockInfo {
    pub id: i64,
    pub class: String,
    pub key: i64,
    /// Owner identifier of the context that took the lock.
    pub owner: String,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Outcome of a lock attempt or status query.
#[derive(Debug, Clone, PartialEq)]
pub enum LockStatus {
    Unlocked,
    /// Held through this object.
    LockedLocally(LockInfo),
    /// Held by another process or another context.
    LockedRemotely(LockInfo),
}

impl LockStatus {
    pub fn is_locked_locally(&self) -> bool {
        matches!(self, LockStatus::LockedLocally(_))
    }

    pub fn is_locked_remotely(&self) -> bool {
        matches!(self, LockStatus::LockedRemotely(_))
    }

    pub fn info(&self) -> Option<&LockInfo> {
        match self {
            LockStatus::Unlocked => None,
            LockStatus::LockedLocally(info) | LockStatus::LockedRemotely(info) => Some(info),
        }
    }
}

/// Outcome of an unlock.
#[derive(Debug, Clone, PartialEq)]
pub enum UnlockStatus {
    /// The lock held through this object was released.
    Unlocked,
    /// Someone else holds the lock; it was left in place.
    UnlockedRemoteLock(LockInfo),
    /// No lock was held.
    NotLocked,
}

fn lock_select(table: &str, id: i64) -> Select {
    use lock_columns::*;
    Select::new(
        table,
        [ID, CLASS, KEY, OWNER, METADATA, CREATED_AT]
            .into_iter()
            .map(String::from)
            .collect(),
    )
    .with_condition(Condition::eq(ID, id))
}

fn parse_lock(row: Vec<Value>) -> Result<LockInfo> {
    let mut values = row.into_iter();
    let mut next = || values.next().unwrap_or(Value::Null);
    let id = next().as_i64().unwrap_or_default();
    let class: String = next().try_into()?;
    let key = next().as_i64().unwrap_or_default();
    let owner: String = next().try_into()?;
    let metadata = match next() {
        Value::String(text) => Some(serde_json::from_str(&text).map_err(LockError::Metadata)?),
        _ => None,
    };
    let created_at = match next() {
        Value::String(text) => DateTime::parse_from_rfc3339(&text)
            .map_err(|e| LockError::Timestamp(format!("{text}: {e}")))?
            .with_timezone(&Utc),
        other => return Err(LockError::Timestamp(format!("{other:?}")).into()),
    };
    Ok(LockInfo {
        id,
        class,
        key,
        owner,
        metadata,
        created_at,
    })
}

fn read_lock(tx: &Transaction<'_>, table: &str, id: i64) -> Result<Option<LockInfo>> {
    tx.query_one(lock_select(table, id))?
        .map(parse_lock)
        .transpose()
}

/// Lock id stored in the object's row, `None` for no lock. Fails if the
/// row is gone.
fn stored_lock_id(tx: &Transaction<'_>, object: &ObjectRef, key: i64) -> Result<Option<i64>> {
    let meta = object.core().meta();
    let row = tx
        .query_one(
            Select::new(meta.table(), vec![LOCK_COLUMN.to_string()])
                .with_condition(Condition::eq(meta.primary_key(), key))
                .for_update(),
        )?
        .ok_or_else(|| Error::NotFound {
            class: meta.class().to_string(),
            key,
        })?;
    Ok(row
        .first()
        .and_then(Value::as_i64)
        .filter(|id| *id != 0))
}

fn acquire(
    ctx: &StorageContext,
    tx: &Transaction<'_>,
    object: &ObjectRef,
    key: i64,
    metadata: Option<serde_json::Value>,
) -> Result<LockInfo> {
    use lock_columns::*;
    let meta = object.core().meta();
    let table = &ctx.config().lock_table;
    let created_at = Utc::now();
    let encoded = metadata
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(LockError::Metadata)?;

    // a row left behind for this object by an interrupted holder
    tx.execute(Delete::new(
        table.clone(),
        Condition::eq(CLASS, meta.class()).and(Condition::eq(KEY, key)),
    ))?;
    let id = tx.insert(
        Insert::new(
            table.clone(),
            [CLASS, KEY, OWNER, METADATA, CREATED_AT]
                .into_iter()
                .map(String::from)
                .collect(),
        )
        .row(vec![
            meta.class().into(),
            key.into(),
            ctx.config().owner_id.clone().into(),
            encoded.into(),
            created_at.to_rfc3339().into(),
        ]),
    )?;
    tx.execute(
        Update::new(meta.table())
            .set(LOCK_COLUMN, id)
            .with_condition(Condition::eq(meta.primary_key(), key)),
    )?;
    Ok(LockInfo {
        id,
        class: meta.class().to_string(),
        key,
        owner: ctx.config().owner_id.clone(),
        metadata,
        created_at,
    })
}

/// Record `lock` as held through `object`, restoring the previous record if
/// the transaction rolls back.
fn hold(tx: &Transaction<'_>, object: &ObjectRef, lock: Option<LockInfo>) {
    let core = object.core();
    let previous = core.lock_info();
    core.set_lock(lock);
    let object = object.clone();
    tx.on_rollback(move || object.core().set_lock(previous));
}

/// Try to take the advisory lock of `object`.
#[instrument(skip(ctx, object, metadata), fields(class = %object.core().class()))]
pub(crate) fn try_lock(
    ctx: &StorageContext,
    object: &ObjectRef,
    metadata: Option<serde_json::Value>,
) -> Result<LockStatus> {
    let core = object.core();
    let key = core.require_key()?;
    let local = core.lock_info();

    let status = transactional(ctx.storage(), |tx| {
        let table = &ctx.config().lock_table;
        let status = match stored_lock_id(tx, object, key)? {
            None => LockStatus::LockedLocally(acquire(ctx, tx, object, key, metadata)?),
            Some(id) if local.as_ref().is_some_and(|l| l.id == id) => {
                match read_lock(tx, table, id)? {
                    Some(info) => LockStatus::LockedLocally(info),
                    None => LockStatus::LockedLocally(acquire(ctx, tx, object, key, metadata)?),
                }
            }
            Some(id) => match read_lock(tx, table, id)? {
                Some(info) => LockStatus::LockedRemotely(info),
                None => {
                    warn!(key, lock_id = id, "lock column points at a missing lock, taking over");
                    LockStatus::LockedLocally(acquire(ctx, tx, object, key, metadata)?)
                }
            },
        };
        if let LockStatus::LockedLocally(info) = &status {
            hold(tx, object, Some(info.clone()));
        }
        Ok(Finish::Commit(status))
    })?;

    match &status {
        LockStatus::LockedLocally(info) => {
            info!(key, lock_id = info.id, "locked");
        }
        LockStatus::LockedRemotely(info) => {
            debug!(key, lock_id = info.id, owner = %info.owner, "locked elsewhere");
            if local.is_some() {
                warn!(key, "lock held through this object was lost");
                core.set_lock(None);
            }
        }
        LockStatus::Unlocked => {}
    }
    Ok(status)
}

/// Release the lock of `object` if it holds it.
#[instrument(skip(ctx, object), fields(class = %object.core().class()))]
pub(crate) fn unlock(ctx: &StorageContext, object: &ObjectRef) -> Result<UnlockStatus> {
    use lock_columns::*;
    let core = object.core();
    let key = core.require_key()?;
    let local = core.lock_info();
    let table = ctx.config().lock_table.clone();

    enum Outcome {
        Released,
        Remote(LockInfo),
        NotLocked,
        Lost,
    }

    let outcome = transactional(ctx.storage(), |tx| {
        let stored = stored_lock_id(tx, object, key)?;
        Ok(Finish::Commit(match (stored, &local) {
            (Some(id), Some(held)) if held.id == id => {
                tx.execute(Delete::new(table.clone(), Condition::eq(ID, id)))?;
                let meta = core.meta();
                tx.execute(
                    Update::new(meta.table())
                        .set(LOCK_COLUMN, Value::Null)
                        .with_condition(Condition::eq(meta.primary_key(), key)),
                )?;
                hold(tx, object, None);
                Outcome::Released
            }
            (_, Some(_)) => Outcome::Lost,
            (Some(id), None) => match read_lock(tx, &table, id)? {
                Some(info) => Outcome::Remote(info),
                None => Outcome::NotLocked,
            },
            (None, None) => Outcome::NotLocked,
        }))
    })?;

    match outcome {
        Outcome::Released => {
            info!(key, "unlocked");
            Ok(UnlockStatus::Unlocked)
        }
        Outcome::Remote(info) => {
            debug!(key, owner = %info.owner, "lock belongs to someone else, left in place");
            Ok(UnlockStatus::UnlockedRemoteLock(info))
        }
        Outcome::NotLocked => Ok(UnlockStatus::NotLocked),
        Outcome::Lost => {
            core.set_lock(None);
            Err(LockError::LockLost {
                class: core.class().to_string(),
                key,
            }
            .into())
        }
    }
}

/// Current lock state of `object` without changing it.
pub(crate) fn lock_status(ctx: &StorageContext, object: &ObjectRef) -> Result<LockStatus> {
    let core = object.core();
    let key = core.require_key()?;
    let local = core.lock_info();
    let table = &ctx.config().lock_table;

    transactional(ctx.storage(), |tx| {
        let Some(id) = stored_lock_id(tx, object, key)? else {
            return Ok(Finish::Release(LockStatus::Unlocked));
        };
        Ok(Finish::Release(match read_lock(tx, table, id)? {
            None => LockStatus::Unlocked,
            Some(info) if local.as_ref().is_some_and(|l| l.id == info.id) => {
                LockStatus::LockedLocally(info)
            }
            Some(info) => LockStatus::LockedRemotely(info),
        }))
    })
}

/// Drop the lock row held through a removed object, inside its delete.
pub(crate) fn release_for_removal(
    ctx: &StorageContext,
    tx: &Transaction<'_>,
    object: &ObjectRef,
) -> Result<()> {
    if let Some(lock) = object.core().lock_info() {
        tx.execute(Delete::new(
            ctx.config().lock_table.clone(),
            Condition::eq(lock_columns::ID, lock.id),
        ))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lock_row() {
        let created = "2024-05-01T10:00:00+00:00";
        let info = parse_lock(vec![
            Value::Int64(4),
            Value::String("Parent".into()),
            Value::Int64(9),
            Value::String("worker".into()),
            Value::String("{\"reason\":\"edit\"}".into()),
            Value::String(created.into()),
        ])
        .unwrap();
        assert_eq!(info.id, 4);
        assert_eq!(info.key, 9);
        assert_eq!(info.metadata, Some(serde_json::json!({"reason": "edit"})));
        assert_eq!(info.created_at.to_rfc3339(), created);
    }

    #[test]
    fn test_parse_lock_rejects_bad_timestamp() {
        let err = parse_lock(vec![
            Value::Int64(1),
            Value::String("Parent".into()),
            Value::Int64(1),
            Value::String("w".into()),
            Value::Null,
            Value::String("yesterday".into()),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::Lock(LockError::Timestamp(_))));
    }
}
