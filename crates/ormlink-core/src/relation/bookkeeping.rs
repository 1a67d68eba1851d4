//! Reverse-relation bookkeeping.
//!
//! A change to one side of a relation is turned into the complete list of
//! proxy edits for both sides up front. Nothing here touches a proxy, so
//! setting the reverse side can never call back into this side.

/// One proxy edit. `object` names the proxy owner, `relation` the proxy.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Edit<O> {
    Add { object: O, relation: Side, target: O },
    Remove { object: O, relation: Side, target: O },
    Set { object: O, relation: Side, target: Option<O> },
}

/// Which of the two relation names an edit applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Side {
    /// The relation the caller changed.
    Forward,
    /// Its reverse, on the target class.
    Reverse,
}

/// Shape of both sides of the changed relation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Shapes {
    pub forward_to_many: bool,
    pub reverse_to_many: bool,
}

/// Edits for `owner.forward += target`.
///
/// `owner_targets` are the current targets of `owner.forward` and
/// `target_targets` the current targets of `target.reverse`; both must be
/// resolved by the caller.
pub(crate) fn plan_relate<O: Clone + PartialEq>(
    shapes: Shapes,
    owner: &O,
    target: &O,
    owner_targets: &[O],
    target_targets: &[O],
) -> Vec<Edit<O>> {
    let mut edits = Vec::new();

    if shapes.forward_to_many {
        if !owner_targets.contains(target) {
            edits.push(Edit::Add {
                object: owner.clone(),
                relation: Side::Forward,
                target: target.clone(),
            });
        }
    } else if owner_targets != std::slice::from_ref(target) {
        // the previous target loses its back-reference to the owner
        for previous in owner_targets.iter().filter(|p| *p != target) {
            edits.push(Edit::Remove {
                object: previous.clone(),
                relation: Side::Reverse,
                target: owner.clone(),
            });
        }
        edits.push(Edit::Set {
            object: owner.clone(),
            relation: Side::Forward,
            target: Some(target.clone()),
        });
    }

    if shapes.reverse_to_many {
        if !target_targets.contains(owner) {
            edits.push(Edit::Add {
                object: target.clone(),
                relation: Side::Reverse,
                target: owner.clone(),
            });
        }
    } else if target_targets != std::slice::from_ref(owner) {
        // the target's previous holder loses the target
        for previous in target_targets.iter().filter(|p| *p != owner) {
            edits.push(Edit::Remove {
                object: previous.clone(),
                relation: Side::Forward,
                target: target.clone(),
            });
        }
        edits.push(Edit::Set {
            object: target.clone(),
            relation: Side::Reverse,
            target: Some(owner.clone()),
        });
    }

    edits
}

/// Edits for `owner.forward -= target`, or `None` when `target` is not
/// currently related.
pub(crate) fn plan_unrelate<O: Clone + PartialEq>(
    shapes: Shapes,
    owner: &O,
    target: &O,
    owner_targets: &[O],
    target_targets: &[O],
) -> Option<Vec<Edit<O>>> {
    if !owner_targets.contains(target) {
        return None;
    }
    let mut edits = Vec::with_capacity(2);
    if shapes.forward_to_many {
        edits.push(Edit::Remove {
            object: owner.clone(),
            relation: Side::Forward,
            target: target.clone(),
        });
    } else {
        edits.push(Edit::Set {
            object: owner.clone(),
            relation: Side::Forward,
            target: None,
        });
    }
    if target_targets.contains(owner) {
        if shapes.reverse_to_many {
            edits.push(Edit::Remove {
                object: target.clone(),
                relation: Side::Reverse,
                target: owner.clone(),
            });
        } else {
            edits.push(Edit::Set {
                object: target.clone(),
                relation: Side::Reverse,
                target: None,
            });
        }
    }
    Some(edits)
}
