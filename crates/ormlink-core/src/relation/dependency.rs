//! Recomputation of dependent fields.
//!
//! Classes declare `(dependent, relation, source)` triples. A dependent is
//! recomputed when its relation changes in memory or is loaded, and when
//! the source field of one of the related objects is reported changed.

use ormlink_query::Value;
use tracing::trace;

use crate::entity::ObjectRef;
use crate::error::Result;
use crate::meta::MetaModel;

/// Recompute every dependent of `object` that reads through `relation`.
///
/// Skipped while the relation is unresolved; loading it recomputes.
pub(crate) fn recompute(object: &ObjectRef, relation: &str) {
    let meta = object.core().meta().clone();
    let mut dependencies = meta.dependencies_on_relation(relation).peekable();
    if dependencies.peek().is_none() {
        return;
    }
    let Some(targets) = object
        .core()
        .relation(relation)
        .and_then(|proxy| proxy.loaded_targets())
    else {
        return;
    };
    for dependency in dependencies {
        let sources: Vec<Value> = targets
            .iter()
            .map(|t| t.value_of(&dependency.source).unwrap_or(Value::Null))
            .collect();
        trace!(
            class = %meta.class(),
            dependent = %dependency.dependent,
            sources = sources.len(),
            "recomputing dependent field"
        );
        object.recompute(&dependency.dependent, &sources);
    }
}

/// Loaded objects whose dependents read `field` of `object`, each with the
/// relation it reads through.
pub(crate) fn dependents_of(
    model: &MetaModel,
    object: &ObjectRef,
    field: &str,
) -> Result<Vec<(ObjectRef, String)>> {
    let class = object.core().class().to_string();
    let mut dependents = Vec::new();
    for proxy in object.core().relations() {
        let Some(targets) = proxy.loaded_targets() else {
            continue;
        };
        let mapping = model.mapping(&class, proxy.name())?;
        for target in targets {
            let reads_field = target
                .core()
                .meta()
                .dependencies()
                .iter()
                .any(|d| d.relation == mapping.reverse && d.source == field);
            if reads_field {
                dependents.push((target, mapping.reverse.clone()));
            }
        }
    }
    Ok(dependents)
}

/// Propagate a change of `field` on `object` to the loaded objects whose
/// dependents read it. Returns how many objects were recomputed.
pub(crate) fn propagate(model: &MetaModel, object: &ObjectRef, field: &str) -> Result<usize> {
    let dependents = dependents_of(model, object, field)?;
    for (target, relation) in &dependents {
        recompute(target, relation);
    }
    Ok(dependents.len())
}
