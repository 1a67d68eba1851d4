//! Persistent object instances.

use std::any::Any;
use std::sync::{Arc, Weak};

use ormlink_query::Value;
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::trace;

use super::descriptor::{Entity, EntityBinding};
use crate::concurrency::LockInfo;
use crate::error::{Error, Result};
use crate::meta::MetaObject;
use crate::relation::{ProxyCheckpoint, RelationProxy};

/// Type-erased handle to a persistent object.
pub type ObjectRef = Arc<dyn PersistentObject>;

/// Identity of an object: the address of its allocation.
pub(crate) fn object_addr(object: &ObjectRef) -> usize {
    Arc::as_ptr(object) as *const () as usize
}

/// Whether two handles point at the same instance.
pub fn same_object(a: &ObjectRef, b: &ObjectRef) -> bool {
    object_addr(a) == object_addr(b)
}

/// Engine view of a persistent object, independent of its Rust type.
pub trait PersistentObject: Any + Send + Sync {
    /// Engine bookkeeping shared by all classes.
    fn core(&self) -> &ObjectCore;

    /// Values of the stored fields, in column order.
    fn stored_values(&self) -> Vec<Value>;

    /// Overwrite the stored fields, in column order.
    fn load_values(&self, values: Vec<Value>) -> Result<()>;

    /// Current value of a scalar field.
    fn value_of(&self, field: &str) -> Option<Value>;

    /// Overwrite one scalar field.
    fn set_value(&self, field: &str, value: Value) -> Result<()>;

    /// Recompute a dependent field from the source values of related objects.
    fn recompute(&self, dependent: &str, sources: &[Value]);

    /// Rust type name of the entity.
    fn type_name(&self) -> &'static str;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

#[derive(Debug, Clone, Default)]
struct ObjectState {
    key: Option<i64>,
    revision: i64,
    /// Stored values as last read from or written to storage.
    snapshot: Option<Vec<Value>>,
    lock: Option<LockInfo>,
}

/// Engine state of one object, taken before a write so a rolled-back
/// transaction can put it back.
pub(crate) struct Checkpoint {
    state: ObjectState,
    relations: Vec<ProxyCheckpoint>,
}

/// Per-object engine state: identity, revision, snapshot, lock and relation
/// proxies.
pub struct ObjectCore {
    meta: Arc<MetaObject>,
    state: Mutex<ObjectState>,
    relations: Vec<RelationProxy>,
}

impl std::fmt::Debug for ObjectCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ObjectCore")
            .field("class", &self.meta.class())
            .field("key", &state.key)
            .field("revision", &state.revision)
            .finish()
    }
}

impl ObjectCore {
    fn new(meta: Arc<MetaObject>, owner: Weak<dyn PersistentObject>) -> Self {
        let relations = meta
            .relations()
            .iter()
            .map(|p| RelationProxy::new(p.clone(), owner.clone()))
            .collect();
        Self {
            meta,
            state: Mutex::new(ObjectState::default()),
            relations,
        }
    }

    pub fn meta(&self) -> &Arc<MetaObject> {
        &self.meta
    }

    pub fn class(&self) -> &str {
        self.meta.class()
    }

    /// Primary key, once stored.
    pub fn key(&self) -> Option<i64> {
        self.state.lock().key
    }

    /// Revision as last seen in storage.
    pub fn revision(&self) -> i64 {
        self.state.lock().revision
    }

    pub fn is_persisted(&self) -> bool {
        self.key().is_some()
    }

    /// The lock held through this object, if any.
    pub fn lock_info(&self) -> Option<LockInfo> {
        self.state.lock().lock.clone()
    }

    /// Relation proxy by name.
    pub fn relation(&self, name: &str) -> Option<&RelationProxy> {
        self.relations.iter().find(|r| r.name() == name)
    }

    pub fn relations(&self) -> &[RelationProxy] {
        &self.relations
    }

    pub(crate) fn require_key(&self) -> Result<i64> {
        self.key().ok_or_else(|| Error::NotPersisted {
            class: self.class().to_string(),
        })
    }

    pub(crate) fn set_persisted(&self, key: i64, revision: i64, snapshot: Vec<Value>) {
        let mut state = self.state.lock();
        state.key = Some(key);
        state.revision = revision;
        state.snapshot = Some(snapshot);
    }

    pub(crate) fn set_revision(&self, revision: i64) {
        self.state.lock().revision = revision;
    }

    pub(crate) fn snapshot(&self) -> Option<Vec<Value>> {
        self.state.lock().snapshot.clone()
    }

    pub(crate) fn set_snapshot(&self, snapshot: Vec<Value>) {
        self.state.lock().snapshot = Some(snapshot);
    }

    /// Update one snapshot slot and the revision together.
    pub(crate) fn advance_field(&self, index: usize, value: Value, revision: i64) {
        let mut state = self.state.lock();
        if let Some(slot) = state.snapshot.as_mut().and_then(|s| s.get_mut(index)) {
            *slot = value;
        }
        state.revision = revision;
    }

    pub(crate) fn set_lock(&self, lock: Option<LockInfo>) {
        self.state.lock().lock = lock;
    }

    pub(crate) fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            state: self.state.lock().clone(),
            relations: self.relations.iter().map(RelationProxy::checkpoint).collect(),
        }
    }

    pub(crate) fn restore(&self, checkpoint: Checkpoint) {
        *self.state.lock() = checkpoint.state;
        for (proxy, saved) in self.relations.iter().zip(checkpoint.relations) {
            proxy.restore(saved);
        }
    }

    /// Forget the storage identity after the row is gone.
    pub(crate) fn detach(&self) {
        let mut state = self.state.lock();
        state.key = None;
        state.revision = 0;
        state.snapshot = None;
        state.lock = None;
    }
}

/// A persistent instance of entity `T`.
///
/// Obtained from the storage context; at most one instance per stored row
/// exists while any strong reference to it is alive.
pub struct Persistent<T: Entity> {
    core: ObjectCore,
    value: RwLock<T>,
    /// Recomputations that found the value borrowed, oldest first.
    pending: Mutex<Vec<(String, Vec<Value>)>>,
    binding: Arc<EntityBinding<T>>,
}

impl<T: Entity> Persistent<T> {
    pub(crate) fn instantiate(
        meta: Arc<MetaObject>,
        binding: Arc<EntityBinding<T>>,
        value: T,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let owner: Weak<dyn PersistentObject> = weak.clone();
            Self {
                core: ObjectCore::new(meta, owner),
                value: RwLock::new(value),
                pending: Mutex::new(Vec::new()),
                binding,
            }
        })
    }

    /// Borrow the entity.
    ///
    /// Relation changes made while a guard is held recompute dependent
    /// fields once the guard is released. Context calls that write fields
    /// (`synchronize`, `increment`) block while any guard on this object is
    /// held by the calling thread.
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.settle();
        self.value.read()
    }

    /// Borrow the entity mutably. Changes reach storage on the next update.
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.settle();
        self.value.write()
    }

    /// Apply deferred recomputations if the value is free.
    fn settle(&self) {
        let mut pending = self.pending.lock();
        if pending.is_empty() {
            return;
        }
        let (Some(recompute), Some(mut value)) = (self.binding.recompute, self.value.try_write())
        else {
            return;
        };
        for (dependent, sources) in pending.drain(..) {
            recompute(&mut value, &dependent, &sources);
        }
    }

    pub fn key(&self) -> Option<i64> {
        self.core.key()
    }

    pub fn revision(&self) -> i64 {
        self.core.revision()
    }

    pub fn class(&self) -> &str {
        self.core.class()
    }
}

impl<T: Entity> std::fmt::Debug for Persistent<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persistent").field("core", &self.core).finish()
    }
}

impl<T: Entity> PersistentObject for Persistent<T> {
    fn core(&self) -> &ObjectCore {
        &self.core
    }

    fn stored_values(&self) -> Vec<Value> {
        let value = self.read();
        self.binding.stored().map(|f| (f.get)(&value)).collect()
    }

    fn load_values(&self, values: Vec<Value>) -> Result<()> {
        let mut value = self.value.write();
        for (field, v) in self.binding.stored().zip(values) {
            (field.set)(&mut value, v.coerce(field.ty)?)?;
        }
        Ok(())
    }

    fn value_of(&self, field: &str) -> Option<Value> {
        let field = self.binding.field(field)?;
        Some((field.get)(&self.read()))
    }

    fn set_value(&self, field: &str, value: Value) -> Result<()> {
        let descriptor = self
            .binding
            .field(field)
            .ok_or_else(|| Error::UnknownProperty {
                class: self.core.class().to_string(),
                property: field.to_string(),
            })?;
        let value = value.coerce(descriptor.ty)?;
        (descriptor.set)(&mut self.value.write(), value)?;
        Ok(())
    }

    fn recompute(&self, dependent: &str, sources: &[Value]) {
        let Some(recompute) = self.binding.recompute else {
            return;
        };
        let mut pending = self.pending.lock();
        match self.value.try_write() {
            Some(mut value) => {
                for (dependent, sources) in pending.drain(..) {
                    recompute(&mut value, &dependent, &sources);
                }
                recompute(&mut value, dependent, sources);
            }
            None => {
                trace!(class = %self.core.class(), dependent, "value borrowed, recomputing later");
                pending.push((dependent.to_string(), sources.to_vec()));
            }
        }
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Recover the typed handle of an erased object.
pub fn downcast<T: Entity>(object: ObjectRef) -> Result<Arc<Persistent<T>>> {
    let found = object.core().class().to_string();
    object
        .into_any()
        .downcast::<Persistent<T>>()
        .map_err(|_| Error::TypeMismatch {
            expected: std::any::type_name::<T>(),
            found,
        })
}

/// Anything that can be handed to the context as an object.
pub trait AsObject {
    fn as_object(&self) -> ObjectRef;
}

impl<T: Entity> AsObject for Arc<Persistent<T>> {
    fn as_object(&self) -> ObjectRef {
        self.clone()
    }
}

impl AsObject for ObjectRef {
    fn as_object(&self) -> ObjectRef {
        self.clone()
    }
}

/// Builds instances of one registered class from stored values.
pub(crate) trait ClassFactory: Send + Sync {
    fn instantiate(&self, meta: Arc<MetaObject>, values: Vec<Value>) -> Result<ObjectRef>;
}

pub(crate) struct TypedFactory<T: Entity> {
    binding: Arc<EntityBinding<T>>,
}

impl<T: Entity> TypedFactory<T> {
    pub(crate) fn new(binding: Arc<EntityBinding<T>>) -> Self {
        Self { binding }
    }

    pub(crate) fn create(&self, meta: Arc<MetaObject>, value: T) -> Arc<Persistent<T>> {
        Persistent::instantiate(meta, self.binding.clone(), value)
    }
}

impl<T: Entity> ClassFactory for TypedFactory<T> {
    fn instantiate(&self, meta: Arc<MetaObject>, values: Vec<Value>) -> Result<ObjectRef> {
        let object = Persistent::instantiate(meta, self.binding.clone(), T::default());
        object.load_values(values)?;
        Ok(object)
    }
}
