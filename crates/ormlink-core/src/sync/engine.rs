//! Running relation plans inside the caller's transaction.

use std::collections::BTreeMap;

use ormlink_query::Value;
use tracing::{debug, trace};

use super::plan::{self, Step};
use crate::concurrency::restore_on_rollback;
use crate::context::StorageContext;
use crate::entity::ObjectRef;
use crate::error::{Error, Result};
use crate::meta::{Cardinality, RelationMapping, RelationStorage};
use crate::storage::Transaction;

/// A row bumped as a side effect of writing a relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Touched {
    pub class: String,
    pub key: i64,
    /// Revision read just before the bump.
    pub revision: i64,
    /// Relation of that row whose stored value changed.
    pub relation: String,
}

fn require_keys(mapping: &RelationMapping, keys: Vec<Option<i64>>) -> Result<Vec<i64>> {
    keys.into_iter()
        .map(|k| {
            k.ok_or_else(|| Error::UnpersistedTarget {
                class: mapping.class.clone(),
                relation: mapping.property.clone(),
            })
        })
        .collect()
}

/// Foreign key values of the many-to-one relations written with the row
/// itself. Unresolved relations are left out so the stored value stays.
pub(crate) fn row_foreign_keys(
    ctx: &StorageContext,
    object: &ObjectRef,
) -> Result<Vec<(String, Value)>> {
    let class = object.core().class();
    let mut columns = Vec::new();
    for proxy in object.core().relations() {
        let mapping = ctx.meta().mapping(class, proxy.name())?;
        let RelationStorage::OwnColumn { column, .. } = &mapping.storage else {
            continue;
        };
        if mapping.cardinality != Cardinality::ManyToOne {
            continue;
        }
        let Some(keys) = proxy.target_keys() else {
            continue;
        };
        let keys = require_keys(&mapping, keys)?;
        columns.push((column.clone(), Value::from(keys.first().copied())));
    }
    Ok(columns)
}

/// Write every dirty relation of `object`, stored under `key`, except the
/// many-to-one ones already written with the row.
pub(crate) fn adjust_relations(
    ctx: &StorageContext,
    tx: &Transaction<'_>,
    object: &ObjectRef,
    key: i64,
) -> Result<Vec<Touched>> {
    let meta = object.core().meta().clone();
    let mut touched = Vec::new();
    for proxy in object.core().relations() {
        if !proxy.is_dirty() {
            continue;
        }
        let Some(keys) = proxy.target_keys() else {
            continue;
        };
        let mapping = ctx.meta().mapping(meta.class(), proxy.name())?;
        let desired = require_keys(&mapping, keys)?;
        let target = ctx.meta().meta_object(&mapping.target_class)?;
        let target_pk = target.primary_key();

        let steps = match (&mapping.storage, mapping.cardinality) {
            (RelationStorage::OwnColumn { .. }, Cardinality::ManyToOne) => continue,
            (RelationStorage::OwnColumn { .. }, _) => {
                plan::owning_one_to_one(&mapping, meta.primary_key(), key, desired.first().copied())
            }
            (RelationStorage::ReverseColumn { .. }, _) => {
                plan::reverse_column(&mapping, target_pk, key, &desired)
            }
            (RelationStorage::JoinTable { .. }, _) => {
                let existing = existing_keys(tx, &mapping, key)?;
                plan::join_table(&mapping, target_pk, key, &existing, &desired)
            }
        };
        let before = touched.len();
        run_steps(tx, steps, &mut touched)?;
        debug!(
            class = %meta.class(),
            relation = %proxy.name(),
            key,
            targets = desired.len(),
            touched = touched.len() - before,
            "relation written"
        );
    }
    Ok(touched)
}

/// Unlink a row that is about to be deleted from every row pointing at it.
pub(crate) fn detach_relations(
    ctx: &StorageContext,
    tx: &Transaction<'_>,
    object: &ObjectRef,
    key: i64,
) -> Result<Vec<Touched>> {
    let meta = object.core().meta().clone();
    let mut touched = Vec::new();
    for relation in meta.relations() {
        let mapping = ctx.meta().mapping(meta.class(), relation.name())?;
        let target = ctx.meta().meta_object(&mapping.target_class)?;
        let steps = match &mapping.storage {
            // the column goes away with the row
            RelationStorage::OwnColumn { .. } => continue,
            RelationStorage::ReverseColumn { .. } => {
                plan::reverse_column(&mapping, target.primary_key(), key, &[])
            }
            RelationStorage::JoinTable { .. } => {
                let existing = existing_keys(tx, &mapping, key)?;
                plan::join_table(&mapping, target.primary_key(), key, &existing, &[])
            }
        };
        run_steps(tx, steps, &mut touched)?;
    }
    Ok(touched)
}

fn existing_keys(tx: &Transaction<'_>, mapping: &RelationMapping, key: i64) -> Result<Vec<i64>> {
    let Some(select) = plan::existing_pairs(mapping, key) else {
        return Ok(Vec::new());
    };
    Ok(tx
        .query(select)?
        .into_iter()
        .filter_map(|row| row.first().and_then(Value::as_i64))
        .collect())
}

fn run_steps(tx: &Transaction<'_>, steps: Vec<Step>, touched: &mut Vec<Touched>) -> Result<()> {
    for step in steps {
        if step.statement.is_noop() {
            continue;
        }
        if let Some(probe) = step.probe {
            for row in tx.query(probe.select)? {
                let (Some(key), Some(revision)) = (
                    row.first().and_then(Value::as_i64),
                    row.get(1).and_then(Value::as_i64),
                ) else {
                    continue;
                };
                touched.push(Touched {
                    class: probe.class.clone(),
                    key,
                    revision,
                    relation: probe.relation.clone(),
                });
            }
        }
        tx.execute(step.statement)?;
    }
    Ok(())
}

/// Bring live objects in line with the rows a write bumped.
///
/// An object whose revision matches the revision read before the bump is
/// advanced by the number of bumps; one that was already stale keeps its
/// revision so its next update reports a conflict. The changed relation is
/// reloaded on next access unless it holds pending changes. The objects
/// are restored if `tx` ends up rolled back.
pub(crate) fn reconcile(ctx: &StorageContext, tx: &Transaction<'_>, touched: Vec<Touched>) {
    let mut rows: BTreeMap<(String, i64), (i64, i64, Vec<String>)> = BTreeMap::new();
    for t in touched {
        let entry = rows
            .entry((t.class, t.key))
            .or_insert((t.revision, 0, Vec::new()));
        entry.0 = entry.0.min(t.revision);
        entry.1 += 1;
        if !entry.2.contains(&t.relation) {
            entry.2.push(t.relation);
        }
    }
    let live: Vec<(ObjectRef, i64, i64, Vec<String>)> = rows
        .into_iter()
        .filter_map(|((class, key), (revision, bumps, relations))| {
            ctx.cached(&class, key)
                .map(|object| (object, revision, bumps, relations))
        })
        .collect();
    restore_on_rollback(tx, live.iter().map(|(object, ..)| object.clone()));

    for (object, revision, bumps, relations) in live {
        let core = object.core();
        if core.revision() == revision {
            core.set_revision(revision + bumps);
        }
        for relation in &relations {
            if let Some(proxy) = core.relation(relation) {
                if proxy.invalidate() {
                    trace!(
                        class = %core.class(),
                        key = ?core.key(),
                        relation = %relation,
                        "relation invalidated"
                    );
                }
            }
        }
    }
}
