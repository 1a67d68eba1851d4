//! Row writes guarded by revision checks.

use std::sync::Arc;

use ormlink_query::{Condition, Delete, Insert, Select, SqlType, Update, Value};
use tracing::{debug, info, instrument, warn};

use super::state::{merge_fields, RemoveStatus, SyncStatus, UpdateStatus};
use super::{lock, restore_on_rollback, transactional, Finish};
use crate::context::StorageContext;
use crate::entity::{Checkpoint, ObjectRef};
use crate::error::{Error, Result};
use crate::meta::{MetaObject, REVISION_COLUMN};
use crate::relation;
use crate::storage::Transaction;
use crate::sync::{adjust_relations, detach_relations, reconcile, row_foreign_keys};

/// Stored revision of row `key`, read with `FOR UPDATE`.
fn locked_revision(tx: &Transaction<'_>, meta: &MetaObject, key: i64) -> Result<Option<i64>> {
    let row = tx.query_one(
        Select::new(meta.table(), vec![REVISION_COLUMN.to_string()])
            .with_condition(Condition::eq(meta.primary_key(), key))
            .for_update(),
    )?;
    Ok(row.and_then(|r| r.first().and_then(Value::as_i64)))
}

fn mark_relations_clean(object: &ObjectRef) {
    for proxy in object.core().relations() {
        proxy.mark_clean();
    }
}

/// Store a new object and the relations it already holds.
#[instrument(skip(ctx, object), fields(class = %object.core().class()))]
pub(crate) fn insert(ctx: &StorageContext, object: &ObjectRef) -> Result<i64> {
    let core = object.core();
    if let Some(key) = core.key() {
        debug!(key, "already persisted");
        return Ok(key);
    }
    let meta = core.meta().clone();
    let values = object.stored_values();
    let foreign_keys = row_foreign_keys(ctx, object)?;

    let cache = ctx.cache_for(meta.class())?;

    let key = transactional(ctx.storage(), |tx| {
        let mut columns = vec![REVISION_COLUMN.to_string()];
        columns.extend(meta.stored_columns());
        let mut row = vec![Value::Int64(0)];
        row.extend(values.iter().cloned());
        for (column, value) in &foreign_keys {
            columns.push(column.clone());
            row.push(value.clone());
        }
        let key = tx.insert(Insert::new(meta.table(), columns).row(row))?;
        let touched = adjust_relations(ctx, tx, object, key)?;

        restore_on_rollback(tx, [object.clone()]);
        core.set_persisted(key, 0, values);
        mark_relations_clean(object);
        cache.insert(key, object);
        tx.on_rollback(move || {
            cache.remove(key);
        });
        reconcile(ctx, tx, touched);
        Ok(Finish::Commit(key))
    })?;

    info!(key, "inserted");
    Ok(key)
}

/// Write a changed object if nobody else changed its row in between.
#[instrument(skip(ctx, object), fields(class = %object.core().class()))]
pub(crate) fn update(ctx: &StorageContext, object: &ObjectRef) -> Result<UpdateStatus> {
    let core = object.core();
    let Some(key) = core.key() else {
        insert(ctx, object)?;
        return Ok(UpdateStatus::Success);
    };
    let meta = core.meta().clone();
    let known = core.revision();
    let values = object.stored_values();
    let foreign_keys = row_foreign_keys(ctx, object)?;

    let written = transactional(ctx.storage(), |tx| {
        let stored = locked_revision(tx, &meta, key)?;
        if stored != Some(known) {
            return Ok(Finish::Release(Err(stored)));
        }
        let mut statement = Update::new(meta.table());
        for (column, value) in meta.stored_columns().into_iter().zip(values.iter().cloned()) {
            statement = statement.set(column, value);
        }
        for (column, value) in &foreign_keys {
            statement = statement.set(column.clone(), value.clone());
        }
        tx.execute(
            statement
                .increment(REVISION_COLUMN, 1i64)
                .with_condition(Condition::eq(meta.primary_key(), key)),
        )?;
        let touched = adjust_relations(ctx, tx, object, key)?;

        restore_on_rollback(tx, [object.clone()]);
        core.set_persisted(key, known + 1, values);
        mark_relations_clean(object);
        reconcile(ctx, tx, touched);
        Ok(Finish::Commit(Ok(())))
    })?;

    match written {
        Ok(()) => {
            debug!(key, revision = known + 1, "updated");
            Ok(UpdateStatus::Success)
        }
        Err(stored_revision) => {
            warn!(key, known, stored = ?stored_revision, "update conflict");
            Ok(UpdateStatus::Conflict {
                stored_revision,
                known_revision: known,
            })
        }
    }
}

/// Pull the stored state of an object into it.
#[instrument(skip(ctx, object), fields(class = %object.core().class()))]
pub(crate) fn synchronize(ctx: &StorageContext, object: &ObjectRef) -> Result<SyncStatus> {
    let core = object.core();
    let Some(key) = core.key() else {
        return Ok(SyncStatus::NotPersisted);
    };
    let meta = core.meta().clone();
    let mut columns = vec![REVISION_COLUMN.to_string()];
    columns.extend(meta.stored_columns());
    let row = ctx
        .storage()
        .query(Select::new(meta.table(), columns).with_condition(Condition::eq(meta.primary_key(), key)))?
        .into_iter()
        .next();

    let Some(row) = row else {
        info!(key, "row removed elsewhere, detaching");
        forget_removed(ctx, object, key);
        return Ok(SyncStatus::Removed);
    };
    let mut row = row.into_iter();
    let revision = row.next().and_then(|v| v.as_i64()).unwrap_or_default();
    if revision == core.revision() {
        return Ok(SyncStatus::Unchanged);
    }

    let remote = row
        .zip(meta.stored_fields())
        .map(|(value, field)| match field.sql_type() {
            Some(ty) => value.coerce(ty),
            None => Ok(value),
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let local = object.stored_values();
    let snapshot = core.snapshot().unwrap_or_else(|| remote.clone());
    let names: Vec<String> = meta.stored_fields().map(|f| f.name().to_string()).collect();
    let (merged, conflicts) = merge_fields(&names, &snapshot, &local, &remote);

    object.load_values(merged)?;
    core.set_snapshot(remote);
    core.set_revision(revision);
    for proxy in core.relations() {
        proxy.invalidate();
    }
    if conflicts.is_empty() {
        debug!(key, revision, "synchronized");
    } else {
        warn!(key, revision, conflicts = conflicts.len(), "synchronized with conflicting fields");
    }
    Ok(SyncStatus::Updated { conflicts })
}

/// Detach an object whose row no longer exists.
fn forget_removed(ctx: &StorageContext, object: &ObjectRef, key: i64) {
    let core = object.core();
    ctx.evict(core.class(), key);
    core.detach();
    for proxy in core.relations() {
        proxy.reset();
    }
}

/// Delete an object's row and unlink everything pointing at it.
#[instrument(skip(ctx, object), fields(class = %object.core().class()))]
pub(crate) fn remove(ctx: &StorageContext, object: &ObjectRef) -> Result<RemoveStatus> {
    let core = object.core();
    let Some(key) = core.key() else {
        return Ok(RemoveStatus::NotPersisted);
    };
    let meta = core.meta().clone();
    let known = core.revision();

    // live targets whose reverse side must drop this object afterwards
    let mut related: Vec<(ObjectRef, String)> = Vec::new();
    for property in meta.relations() {
        let mapping = ctx.meta().mapping(meta.class(), property.name())?;
        for target in relation::resolve(ctx, object, property.name())? {
            related.push((target, mapping.reverse.clone()));
        }
    }

    let cache = ctx.cache_for(meta.class())?;

    let outcome = transactional(ctx.storage(), |tx| match locked_revision(tx, &meta, key)? {
        Some(stored) if stored != known => Ok(Finish::Release(Err(stored))),
        None => Ok(Finish::Release(Ok(false))),
        Some(_) => {
            let touched = detach_relations(ctx, tx, object, key)?;
            lock::release_for_removal(ctx, tx, object)?;
            tx.execute(Delete::new(
                meta.table(),
                Condition::eq(meta.primary_key(), key),
            ))?;

            unlink_from_targets(tx, object, &related);
            reconcile(ctx, tx, touched);
            restore_on_rollback(tx, [object.clone()]);
            let restored = object.clone();
            tx.on_rollback(move || {
                cache.get_or_insert_with(key, || restored);
            });
            forget_removed(ctx, object, key);
            Ok(Finish::Commit(Ok(true)))
        }
    })?;

    match outcome {
        Err(stored_revision) => {
            warn!(key, known, stored = stored_revision, "remove conflict");
            return Ok(RemoveStatus::Conflict {
                stored_revision,
                known_revision: known,
            });
        }
        Ok(true) => {}
        Ok(false) => {
            debug!(key, "row already gone");
            unlink(object, &related);
            forget_removed(ctx, object, key);
        }
    }
    info!(key, "removed");
    Ok(RemoveStatus::Removed)
}

/// Drop a removed object from the reverse sides of its live targets.
fn unlink(object: &ObjectRef, related: &[(ObjectRef, String)]) {
    for (target, reverse) in related {
        if let Some(proxy) = target.core().relation(reverse) {
            proxy.forget(object);
            relation::recompute(target, reverse);
        }
    }
}

/// [`unlink`], undone if `tx` rolls back.
fn unlink_from_targets(tx: &Transaction<'_>, object: &ObjectRef, related: &[(ObjectRef, String)]) {
    let saved: Vec<(ObjectRef, String, Checkpoint)> = related
        .iter()
        .map(|(target, reverse)| (target.clone(), reverse.clone(), target.core().checkpoint()))
        .collect();
    unlink(object, related);
    if saved.is_empty() {
        return;
    }
    tx.on_rollback(move || {
        for (target, reverse, checkpoint) in saved.into_iter().rev() {
            target.core().restore(checkpoint);
            relation::recompute(&target, &reverse);
        }
    });
}

/// Add `delta` to a numeric field directly in storage, retrying when the
/// backend reports a deadlock. Returns the stored value afterwards.
#[instrument(skip(ctx, object, delta), fields(class = %object.core().class()))]
pub(crate) fn increment(
    ctx: &StorageContext,
    object: &ObjectRef,
    field: &str,
    delta: Value,
) -> Result<Value> {
    let core = object.core();
    let key = core.require_key()?;
    let meta = core.meta().clone();
    let (index, property) = meta
        .stored_fields()
        .enumerate()
        .find(|(_, f)| f.name() == field)
        .map(|(i, f)| (i, Arc::clone(f)))
        .ok_or_else(|| Error::UnknownProperty {
            class: meta.class().to_string(),
            property: field.to_string(),
        })?;
    let column = property.column_name().to_string();
    let target = Increment {
        meta: &meta,
        key,
        index,
        field,
        column: &column,
        sql_type: property.sql_type(),
    };

    let mut attempt = 0;
    let (value, after) = loop {
        match increment_once(ctx, object, &target, delta.clone()) {
            Ok(result) => break result,
            Err(e) if e.is_deadlock() && attempt < ctx.config().deadlock_retries => {
                attempt += 1;
                warn!(key, field, attempt, error = %e, "deadlock during increment, retrying");
                std::thread::sleep(ctx.config().retry_backoff());
            }
            Err(e) => return Err(e),
        }
    };
    debug!(key, field, revision = after, "incremented");
    Ok(value)
}

/// The stored field an increment applies to.
#[derive(Clone, Copy)]
struct Increment<'a> {
    meta: &'a MetaObject,
    key: i64,
    /// Position among the stored fields.
    index: usize,
    field: &'a str,
    column: &'a str,
    sql_type: Option<SqlType>,
}

/// One attempt: bump the column and the revision, read both back and, if
/// the object was in sync with its row, carry the new value into it.
fn increment_once(
    ctx: &StorageContext,
    object: &ObjectRef,
    target: &Increment<'_>,
    delta: Value,
) -> Result<(Value, i64)> {
    let Increment {
        meta,
        key,
        index,
        field,
        column,
        sql_type,
    } = *target;
    transactional(ctx.storage(), |tx| {
        let before = locked_revision(tx, meta, key)?.ok_or_else(|| Error::NotFound {
            class: meta.class().to_string(),
            key,
        })?;
        let row_key = Condition::eq(meta.primary_key(), key);
        tx.execute(
            Update::new(meta.table())
                .increment(column, delta)
                .increment(REVISION_COLUMN, 1i64)
                .with_condition(row_key.clone()),
        )?;
        let row = tx
            .query_one(
                Select::new(
                    meta.table(),
                    vec![column.to_string(), REVISION_COLUMN.to_string()],
                )
                .with_condition(row_key),
            )?
            .unwrap_or_default();
        let mut row = row.into_iter();
        let value = row.next().unwrap_or(Value::Null);
        let after = row.next().and_then(|v| v.as_i64()).unwrap_or(before + 1);
        let value = match sql_type {
            Some(ty) => value.coerce(ty)?,
            None => value,
        };

        let core = object.core();
        if core.revision() == before {
            restore_on_rollback(tx, [object.clone()]);
            let previous = core.snapshot().and_then(|s| s.get(index).cloned());
            if let Some(previous) = previous.filter(|p| object.value_of(field).as_ref() == Some(p)) {
                let dependents = relation::dependents_of(ctx.meta(), object, field)?;
                object.set_value(field, value.clone())?;
                for (dependent, through) in &dependents {
                    relation::recompute(dependent, through);
                }
                let object = object.clone();
                let field = field.to_string();
                tx.on_rollback(move || {
                    if let Err(e) = object.set_value(&field, previous) {
                        warn!(field = %field, error = %e, "could not restore field after rollback");
                    }
                    for (dependent, through) in &dependents {
                        relation::recompute(dependent, through);
                    }
                });
            }
            core.advance_field(index, value.clone(), after);
        }
        Ok(Finish::Commit((value, after)))
    })
}
