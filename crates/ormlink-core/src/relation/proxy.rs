//! Lazily resolved relation values.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::entity::{object_addr, same_object, ObjectRef, PersistentObject};
use crate::meta::{MetaProperty, Strength};

/// One target held by a proxy.
#[derive(Clone)]
enum Link {
    Strong(ObjectRef),
    /// The key is remembered so a released target can be loaded again.
    Weak {
        key: Option<i64>,
        object: Weak<dyn PersistentObject>,
    },
}

impl Link {
    fn new(object: &ObjectRef, strength: Strength) -> Self {
        match strength {
            Strength::Strong => Link::Strong(object.clone()),
            Strength::Weak => Link::Weak {
                key: object.core().key(),
                object: Arc::downgrade(object),
            },
        }
    }

    fn upgrade(&self) -> Option<ObjectRef> {
        match self {
            Link::Strong(object) => Some(object.clone()),
            Link::Weak { object, .. } => object.upgrade(),
        }
    }

    fn is(&self, target: &ObjectRef) -> bool {
        self.upgrade().is_some_and(|o| same_object(&o, target))
    }
}

/// What a proxy currently knows about its targets.
pub(crate) enum Targets {
    /// Never loaded; storage must be queried.
    Unresolved,
    /// Every target is in memory.
    Ready(Vec<ObjectRef>),
    /// Some weak targets were released and must be loaded again by key.
    Stale {
        live: Vec<ObjectRef>,
        missing: Vec<i64>,
    },
}

#[derive(Clone, Default)]
struct ProxyState {
    resolved: bool,
    links: Vec<Link>,
    /// Changed in memory since the last write.
    dirty: bool,
}

/// Saved state of a proxy.
pub(crate) struct ProxyCheckpoint(ProxyState);

/// The in-memory value of one relation of one object.
///
/// A proxy starts unresolved and is filled from storage on first access.
/// Its lock is never held across storage access or while another proxy is
/// locked.
pub struct RelationProxy {
    property: Arc<MetaProperty>,
    owner: Weak<dyn PersistentObject>,
    state: Mutex<ProxyState>,
}

impl RelationProxy {
    pub(crate) fn new(property: Arc<MetaProperty>, owner: Weak<dyn PersistentObject>) -> Self {
        Self {
            property,
            owner,
            state: Mutex::new(ProxyState::default()),
        }
    }

    pub fn name(&self) -> &str {
        self.property.name()
    }

    pub fn property(&self) -> &Arc<MetaProperty> {
        &self.property
    }

    /// The object this proxy belongs to, while it is alive.
    pub fn owner(&self) -> Option<ObjectRef> {
        self.owner.upgrade()
    }

    fn strength(&self) -> Strength {
        self.property
            .relation()
            .map(|r| r.strength)
            .unwrap_or_default()
    }

    pub fn is_resolved(&self) -> bool {
        self.state.lock().resolved
    }

    /// Whether the relation changed in memory since it was last written.
    pub fn is_dirty(&self) -> bool {
        self.state.lock().dirty
    }

    /// Number of links held, released weak targets included.
    pub fn len(&self) -> usize {
        self.state.lock().links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current targets without touching storage.
    ///
    /// Released weak targets that were never stored are dropped for good.
    pub(crate) fn targets(&self) -> Targets {
        let mut state = self.state.lock();
        if !state.resolved {
            return Targets::Unresolved;
        }
        let mut live = Vec::with_capacity(state.links.len());
        let mut missing = Vec::new();
        state.links.retain(|link| match link.upgrade() {
            Some(object) => {
                live.push(object);
                true
            }
            None => match link {
                Link::Weak { key: Some(key), .. } => {
                    missing.push(*key);
                    true
                }
                _ => false,
            },
        });
        if missing.is_empty() {
            Targets::Ready(live)
        } else {
            Targets::Stale { live, missing }
        }
    }

    /// Live targets if resolved, `None` otherwise.
    pub(crate) fn loaded_targets(&self) -> Option<Vec<ObjectRef>> {
        match self.targets() {
            Targets::Unresolved => None,
            Targets::Ready(live) | Targets::Stale { live, .. } => Some(live),
        }
    }

    /// Keys of all targets, `None` for a target that has not been stored.
    /// `None` overall when unresolved.
    pub(crate) fn target_keys(&self) -> Option<Vec<Option<i64>>> {
        let state = self.state.lock();
        if !state.resolved {
            return None;
        }
        let keys = state
            .links
            .iter()
            .filter_map(|link| match link.upgrade() {
                Some(object) => Some(object.core().key()),
                None => match link {
                    Link::Weak { key: Some(key), .. } => Some(Some(*key)),
                    _ => None,
                },
            })
            .collect();
        Some(keys)
    }

    /// Install freshly loaded targets. Returns false if another thread
    /// resolved the proxy first; its state wins.
    pub(crate) fn install(&self, targets: &[ObjectRef]) -> bool {
        let strength = self.strength();
        let mut state = self.state.lock();
        if state.resolved {
            return false;
        }
        state.links = targets.iter().map(|t| Link::new(t, strength)).collect();
        state.resolved = true;
        true
    }

    /// Replace released weak links by the reloaded instances.
    pub(crate) fn refresh(&self, reloaded: &[ObjectRef]) {
        let strength = self.strength();
        let mut state = self.state.lock();
        for link in state.links.iter_mut() {
            let Link::Weak { key: Some(key), object } = link else {
                continue;
            };
            if object.strong_count() > 0 {
                continue;
            }
            if let Some(found) = reloaded.iter().find(|o| o.core().key() == Some(*key)) {
                *link = Link::new(found, strength);
            }
        }
        // rows that vanished in the meantime
        state.links.retain(|l| l.upgrade().is_some());
    }

    /// Treat a proxy of a fresh object as loaded and empty.
    pub(crate) fn resolve_empty(&self) {
        let mut state = self.state.lock();
        if !state.resolved {
            state.resolved = true;
            state.links.clear();
        }
    }

    /// Whether `target` is held in memory. Never touches storage.
    pub fn contains(&self, target: &ObjectRef) -> bool {
        self.state.lock().links.iter().any(|l| l.is(target))
    }

    /// Add a target unless present.
    pub(crate) fn add(&self, target: &ObjectRef) {
        let strength = self.strength();
        let mut state = self.state.lock();
        if !state.links.iter().any(|l| l.is(target)) {
            state.links.push(Link::new(target, strength));
        }
        state.resolved = true;
        state.dirty = true;
    }

    /// Remove a target if present.
    pub(crate) fn remove(&self, target: &ObjectRef) {
        let mut state = self.state.lock();
        state.links.retain(|l| !l.is(target));
        state.dirty = true;
    }

    /// Make `target` the only target, or empty the proxy.
    pub(crate) fn set(&self, target: Option<&ObjectRef>) {
        let strength = self.strength();
        let mut state = self.state.lock();
        state.links.clear();
        if let Some(target) = target {
            state.links.push(Link::new(target, strength));
        }
        state.resolved = true;
        state.dirty = true;
    }

    /// Drop a target that left storage without marking the proxy dirty.
    pub(crate) fn forget(&self, target: &ObjectRef) {
        let addr = object_addr(target);
        let mut state = self.state.lock();
        state
            .links
            .retain(|l| l.upgrade().map_or(true, |o| object_addr(&o) != addr));
    }

    /// Drop every association in memory only.
    pub(crate) fn clear(&self) {
        let mut state = self.state.lock();
        state.links.clear();
        state.resolved = true;
        state.dirty = true;
    }

    pub(crate) fn mark_clean(&self) {
        self.state.lock().dirty = false;
    }

    /// Forget the loaded state so the next access reads storage again.
    /// Dirty proxies keep their pending changes. Returns whether the proxy
    /// was reset.
    pub(crate) fn invalidate(&self) -> bool {
        let mut state = self.state.lock();
        if state.dirty {
            return false;
        }
        state.resolved = false;
        state.links.clear();
        true
    }

    pub(crate) fn checkpoint(&self) -> ProxyCheckpoint {
        ProxyCheckpoint(self.state.lock().clone())
    }

    pub(crate) fn restore(&self, checkpoint: ProxyCheckpoint) {
        *self.state.lock() = checkpoint.0;
    }

    /// Empty, clean and resolved; used once the owner's row is deleted.
    pub(crate) fn reset(&self) {
        let mut state = self.state.lock();
        state.links.clear();
        state.resolved = true;
        state.dirty = false;
    }
}

impl std::fmt::Debug for RelationProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("RelationProxy")
            .field("relation", &self.property.name())
            .field("resolved", &state.resolved)
            .field("links", &state.links.len())
            .field("dirty", &state.dirty)
            .finish()
    }
}
