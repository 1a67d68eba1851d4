//! Relation proxies and in-memory relation maintenance.
//!
//! Every object carries one [`RelationProxy`] per relation. Proxies are
//! resolved lazily from storage; `relate`, `unrelate` and `clear` change
//! them in memory and keep the reverse side consistent. The changes reach
//! storage on the next update of an affected object.

mod bookkeeping;
mod dependency;
mod proxy;

use std::sync::Arc;

use ormlink_query::{Condition, Select};
use tracing::{debug, instrument, trace};

pub(crate) use dependency::{dependents_of, propagate, recompute};
pub(crate) use proxy::ProxyCheckpoint;
pub use proxy::RelationProxy;
use proxy::Targets;

use bookkeeping::{plan_relate, plan_unrelate, Edit, Shapes, Side};

use crate::context::StorageContext;
use crate::entity::{same_object, ObjectRef};
use crate::error::{Error, Result};
use crate::meta::{RelationMapping, RelationStorage};

/// Identity-compared object handle for the bookkeeping planner.
#[derive(Clone)]
struct Handle(ObjectRef);

impl PartialEq for Handle {
    fn eq(&self, other: &Self) -> bool {
        same_object(&self.0, &other.0)
    }
}

fn handles(objects: Vec<ObjectRef>) -> Vec<Handle> {
    objects.into_iter().map(Handle).collect()
}

pub(crate) fn proxy_of<'a>(object: &'a ObjectRef, relation: &str) -> Result<&'a RelationProxy> {
    let core = object.core();
    core.relation(relation).ok_or_else(|| {
        if core.meta().field(relation).is_some() {
            Error::NotARelation {
                class: core.class().to_string(),
                property: relation.to_string(),
            }
        } else {
            Error::UnknownProperty {
                class: core.class().to_string(),
                property: relation.to_string(),
            }
        }
    })
}

/// Current targets of `object.relation`, loading them if needed.
#[instrument(level = "trace", skip(ctx, object), fields(class = %object.core().class()))]
pub(crate) fn resolve(
    ctx: &StorageContext,
    object: &ObjectRef,
    relation: &str,
) -> Result<Vec<ObjectRef>> {
    let proxy = proxy_of(object, relation)?;
    match proxy.targets() {
        Targets::Ready(live) => Ok(live),
        Targets::Stale { missing, .. } => {
            let mapping = ctx.meta().mapping(object.core().class(), relation)?;
            trace!(missing = missing.len(), "reloading released targets");
            let reloaded = ctx.load_many(&mapping.target_class, &missing)?;
            proxy.refresh(&reloaded);
            Ok(proxy.loaded_targets().unwrap_or_default())
        }
        Targets::Unresolved => {
            let Some(key) = object.core().key() else {
                proxy.resolve_empty();
                return Ok(Vec::new());
            };
            let mapping = ctx.meta().mapping(object.core().class(), relation)?;
            let loaded = fetch(ctx, &mapping, key)?;
            debug!(
                relation = %relation,
                key,
                targets = loaded.len(),
                "resolved relation"
            );
            if proxy.install(&loaded) {
                recompute(object, relation);
                Ok(loaded)
            } else {
                Ok(proxy.loaded_targets().unwrap_or_default())
            }
        }
    }
}

/// Read the targets of the row `key` through `mapping`.
fn fetch(ctx: &StorageContext, mapping: &RelationMapping, key: i64) -> Result<Vec<ObjectRef>> {
    let model = ctx.meta();
    match &mapping.storage {
        RelationStorage::OwnColumn { table, column } => {
            let own = model.meta_object(&mapping.class)?;
            let select = Select::new(table.clone(), vec![column.clone()])
                .with_condition(Condition::eq(own.primary_key(), key));
            let keys: Vec<i64> = ctx
                .storage()
                .query(select)?
                .into_iter()
                .filter_map(|row| row.first().and_then(|v| v.as_i64()))
                .collect();
            ctx.load_many(&mapping.target_class, &keys)
        }
        RelationStorage::ReverseColumn { column, .. } => {
            let target = model.meta_object(&mapping.target_class)?;
            ctx.load_where(&target, Condition::eq(column.clone(), key))
        }
        RelationStorage::JoinTable {
            table,
            own_column,
            other_column,
        } => {
            let select = Select::new(table.clone(), vec![other_column.clone()])
                .with_condition(Condition::eq(own_column.clone(), key))
                .order_asc(other_column.clone());
            let keys: Vec<i64> = ctx
                .storage()
                .query(select)?
                .into_iter()
                .filter_map(|row| row.first().and_then(|v| v.as_i64()))
                .collect();
            ctx.load_many(&mapping.target_class, &keys)
        }
    }
}

fn checked_mapping(
    ctx: &StorageContext,
    owner: &ObjectRef,
    relation: &str,
    target: &ObjectRef,
) -> Result<Arc<RelationMapping>> {
    proxy_of(owner, relation)?;
    let mapping = ctx.meta().mapping(owner.core().class(), relation)?;
    if target.core().class() != mapping.target_class {
        return Err(Error::WrongTarget {
            class: mapping.class.clone(),
            relation: mapping.property.clone(),
            expected: mapping.target_class.clone(),
            found: target.core().class().to_string(),
        });
    }
    Ok(mapping)
}

fn shapes(mapping: &RelationMapping) -> Shapes {
    Shapes {
        forward_to_many: mapping.cardinality.is_to_many(),
        reverse_to_many: mapping.cardinality.complement().is_to_many(),
    }
}

/// Add `target` to `owner.relation`, replacing the previous target of a
/// to-one relation, and update the reverse side.
pub(crate) fn relate(
    ctx: &StorageContext,
    owner: &ObjectRef,
    relation: &str,
    target: &ObjectRef,
) -> Result<()> {
    let mapping = checked_mapping(ctx, owner, relation, target)?;
    let owner_targets = resolve(ctx, owner, relation)?;
    let target_targets = resolve(ctx, target, &mapping.reverse)?;
    let edits = plan_relate(
        shapes(&mapping),
        &Handle(owner.clone()),
        &Handle(target.clone()),
        &handles(owner_targets),
        &handles(target_targets),
    );
    apply(&mapping, edits);
    Ok(())
}

/// Remove `target` from `owner.relation` and from the reverse side.
pub(crate) fn unrelate(
    ctx: &StorageContext,
    owner: &ObjectRef,
    relation: &str,
    target: &ObjectRef,
) -> Result<()> {
    let mapping = checked_mapping(ctx, owner, relation, target)?;
    let owner_targets = resolve(ctx, owner, relation)?;
    let target_targets = resolve(ctx, target, &mapping.reverse)?;
    let edits = plan_unrelate(
        shapes(&mapping),
        &Handle(owner.clone()),
        &Handle(target.clone()),
        &handles(owner_targets),
        &handles(target_targets),
    )
    .ok_or_else(|| Error::NotRelated {
        class: mapping.class.clone(),
        relation: mapping.property.clone(),
    })?;
    apply(&mapping, edits);
    Ok(())
}

/// Make `targets` the complete content of `owner.relation`.
pub(crate) fn relate_all(
    ctx: &StorageContext,
    owner: &ObjectRef,
    relation: &str,
    targets: &[ObjectRef],
) -> Result<()> {
    let mapping = ctx.meta().mapping(owner.core().class(), relation)?;
    if !mapping.cardinality.is_to_many() && targets.len() > 1 {
        return Err(Error::TooManyTargets {
            class: mapping.class.clone(),
            relation: mapping.property.clone(),
            count: targets.len(),
        });
    }
    let current = resolve(ctx, owner, relation)?;
    for previous in current {
        if !targets.iter().any(|t| same_object(t, &previous)) {
            unrelate(ctx, owner, relation, &previous)?;
        }
    }
    for target in targets {
        relate(ctx, owner, relation, target)?;
    }
    Ok(())
}

/// Drop every target of `owner.relation` in memory only; the reverse
/// side is left untouched.
pub(crate) fn clear(owner: &ObjectRef, relation: &str) -> Result<()> {
    proxy_of(owner, relation)?.clear();
    recompute(owner, relation);
    Ok(())
}

fn apply(mapping: &RelationMapping, edits: Vec<Edit<Handle>>) {
    let mut touched: Vec<(ObjectRef, &str)> = Vec::new();
    for edit in edits {
        let (object, side) = match &edit {
            Edit::Add { object, relation, .. }
            | Edit::Remove { object, relation, .. }
            | Edit::Set { object, relation, .. } => (object.0.clone(), *relation),
        };
        let name = match side {
            Side::Forward => mapping.property.as_str(),
            Side::Reverse => mapping.reverse.as_str(),
        };
        let Some(proxy) = object.core().relation(name) else {
            continue;
        };
        if !proxy.is_resolved() {
            if object.core().key().is_some() {
                // the next resolve reads the stored state
                trace!(class = %object.core().class(), relation = %name, "skipping unresolved proxy");
                continue;
            }
            proxy.resolve_empty();
        }
        match edit {
            Edit::Add { target, .. } => proxy.add(&target.0),
            Edit::Remove { target, .. } => proxy.remove(&target.0),
            Edit::Set { target, .. } => proxy.set(target.as_ref().map(|t| &t.0)),
        }
        if !touched
            .iter()
            .any(|(o, n)| *n == name && same_object(o, &object))
        {
            touched.push((object, name));
        }
    }
    for (object, name) in touched {
        recompute(&object, name);
    }
}
