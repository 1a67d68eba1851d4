//! The storage context: registry, identity caches and storage in one value.

use std::any::{Any, TypeId};
use std::sync::Arc;

use dashmap::DashMap;
use ormlink_query::{dialect_for_driver, Condition, Select, Value};
use tracing::{debug, info, instrument};

use crate::cache::IdentityCache;
use crate::concurrency::{
    self, LockStatus, RemoveStatus, SyncState, SyncStatus, UnlockStatus, UpdateStatus,
};
use crate::config::{ContextConfig, DatabaseLocation};
use crate::entity::{
    downcast, AsObject, ClassFactory, Entity, ObjectRef, Persistent, PersistentObject,
    TypedFactory,
};
use crate::error::{Error, Result};
use crate::meta::{MetaModel, MetaObject, REVISION_COLUMN};
use crate::relation;
use crate::storage::{schema, Connection, SqliteConnection, Storage, Transaction};

/// Identity cache of one class.
pub type ObjectCache = IdentityCache<dyn PersistentObject>;

struct Registration {
    factory: Arc<dyn ClassFactory>,
    /// The same factory, kept typed for `new_object`.
    typed: Arc<dyn Any + Send + Sync>,
}

/// Entry point of the engine.
///
/// A context owns the class registry, one identity cache per class and the
/// database session. Independent contexts share nothing, so two contexts on
/// the same database file behave like two processes.
///
/// ```no_run
/// use ormlink_core::{ContextConfig, StorageContext};
///
/// let ctx = StorageContext::open(ContextConfig::file("app.db"))?;
/// // ctx.register::<Parent>()?; ctx.register::<Child>()?;
/// ctx.create_schema()?;
/// # Ok::<(), ormlink_core::Error>(())
/// ```
pub struct StorageContext {
    config: ContextConfig,
    meta: MetaModel,
    classes: DashMap<TypeId, String>,
    registrations: DashMap<String, Registration>,
    caches: DashMap<String, Arc<ObjectCache>>,
    storage: Storage,
}

impl StorageContext {
    /// Open the database named by `config`.
    #[instrument(skip(config), fields(driver = %config.driver))]
    pub fn open(config: ContextConfig) -> Result<Self> {
        if dialect_for_driver(&config.driver)?.name() != "sqlite" {
            return Err(Error::Config(format!(
                "driver {} has no connection backend",
                config.driver
            )));
        }
        let connection = match &config.location {
            DatabaseLocation::Memory => SqliteConnection::open_in_memory(config.busy_timeout())?,
            DatabaseLocation::File(path) => SqliteConnection::open(path, config.busy_timeout())?,
        };
        info!(location = ?config.location, owner = %config.owner_id, "storage context opened");
        Ok(Self::with_connection(config, Box::new(connection)))
    }

    /// Use an already open connection.
    pub fn with_connection(config: ContextConfig, connection: Box<dyn Connection>) -> Self {
        Self {
            config,
            meta: MetaModel::new(),
            classes: DashMap::new(),
            registrations: DashMap::new(),
            caches: DashMap::new(),
            storage: Storage::new(connection),
        }
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    pub fn meta(&self) -> &MetaModel {
        &self.meta
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Register entity `T`.
    pub fn register<T: Entity>(&self) -> Result<Arc<MetaObject>> {
        let (schema, binding) = T::descriptor().into_parts();
        let meta = self.meta.register(schema)?;
        let class = meta.class().to_string();
        let factory = Arc::new(TypedFactory::<T>::new(Arc::new(binding)));
        self.registrations.insert(
            class.clone(),
            Registration {
                factory: factory.clone(),
                typed: factory,
            },
        );
        self.caches.insert(
            class.clone(),
            Arc::new(ObjectCache::with_maximum_size(self.config.cache_max_size)),
        );
        self.classes.insert(TypeId::of::<T>(), class);
        Ok(meta)
    }

    /// Check every relation pair of the registered classes.
    pub fn wire(&self) -> Result<()> {
        self.meta.wire()?;
        Ok(())
    }

    fn ensure_wired(&self) -> Result<()> {
        if self.meta.is_wired() {
            Ok(())
        } else {
            self.wire()
        }
    }

    /// Create the tables of every registered class, the join tables and the
    /// lock table if they do not exist yet.
    pub fn create_schema(&self) -> Result<()> {
        self.ensure_wired()?;
        schema::create_schema(&self.meta, &self.storage, &self.config.lock_table)
    }

    fn class_of<T: Entity>(&self) -> Result<String> {
        self.classes
            .get(&TypeId::of::<T>())
            .map(|c| c.value().clone())
            .ok_or_else(|| {
                Error::Config(format!(
                    "entity type {} is not registered",
                    std::any::type_name::<T>()
                ))
            })
    }

    fn factory(&self, class: &str) -> Result<Arc<dyn ClassFactory>> {
        self.registrations
            .get(class)
            .map(|r| r.factory.clone())
            .ok_or_else(|| crate::error::SchemaError::UnregisteredClass(class.to_string()).into())
    }

    /// A new, not yet stored instance.
    pub fn new_object<T: Entity>(&self, value: T) -> Result<Arc<Persistent<T>>> {
        self.ensure_wired()?;
        let class = self.class_of::<T>()?;
        let meta = self.meta.meta_object(&class)?;
        let typed = self
            .registrations
            .get(&class)
            .map(|r| r.typed.clone())
            .ok_or_else(|| crate::error::SchemaError::UnregisteredClass(class.clone()))?;
        let factory = typed
            .downcast::<TypedFactory<T>>()
            .map_err(|_| Error::TypeMismatch {
                expected: std::any::type_name::<T>(),
                found: class,
            })?;
        Ok(factory.create(meta, value))
    }

    /// Store a new object. Returns its key; an already stored object is
    /// left alone.
    pub fn insert(&self, object: &impl AsObject) -> Result<i64> {
        self.ensure_wired()?;
        concurrency::insert(self, &object.as_object())
    }

    /// Create and store an instance.
    pub fn create<T: Entity>(&self, value: T) -> Result<Arc<Persistent<T>>> {
        let object = self.new_object(value)?;
        self.insert(&object)?;
        Ok(object)
    }

    /// The instance of `T` stored under `key`.
    pub fn read<T: Entity>(&self, key: i64) -> Result<Option<Arc<Persistent<T>>>> {
        let class = self.class_of::<T>()?;
        self.load(&class, key)?.map(downcast::<T>).transpose()
    }

    /// The instance of `class` stored under `key`.
    pub fn load(&self, class: &str, key: i64) -> Result<Option<ObjectRef>> {
        self.ensure_wired()?;
        Ok(self.load_many(class, &[key])?.into_iter().next())
    }

    /// Targets of `relation`, loaded on first access.
    pub fn related<U: Entity>(
        &self,
        object: &impl AsObject,
        relation: &str,
    ) -> Result<Vec<Arc<Persistent<U>>>> {
        self.related_objects(object, relation)?
            .into_iter()
            .map(downcast::<U>)
            .collect()
    }

    /// Target of a to-one relation.
    pub fn related_one<U: Entity>(
        &self,
        object: &impl AsObject,
        relation: &str,
    ) -> Result<Option<Arc<Persistent<U>>>> {
        self.related_objects(object, relation)?
            .into_iter()
            .next()
            .map(downcast::<U>)
            .transpose()
    }

    /// Targets of `relation` without downcasting.
    pub fn related_objects(&self, object: &impl AsObject, relation: &str) -> Result<Vec<ObjectRef>> {
        self.ensure_wired()?;
        relation::resolve(self, &object.as_object(), relation)
    }

    /// Relate `target` to `owner` through `relation`, updating the reverse
    /// side in memory.
    pub fn relate(&self, owner: &impl AsObject, relation: &str, target: &impl AsObject) -> Result<()> {
        self.ensure_wired()?;
        relation::relate(self, &owner.as_object(), relation, &target.as_object())
    }

    /// Replace the content of `relation` with `targets`.
    pub fn relate_all<A: AsObject>(
        &self,
        owner: &impl AsObject,
        relation: &str,
        targets: &[A],
    ) -> Result<()> {
        self.ensure_wired()?;
        let targets: Vec<ObjectRef> = targets.iter().map(AsObject::as_object).collect();
        relation::relate_all(self, &owner.as_object(), relation, &targets)
    }

    /// Remove `target` from `relation` and from its reverse side.
    pub fn unrelate(
        &self,
        owner: &impl AsObject,
        relation: &str,
        target: &impl AsObject,
    ) -> Result<()> {
        self.ensure_wired()?;
        relation::unrelate(self, &owner.as_object(), relation, &target.as_object())
    }

    /// Empty `relation` in memory, leaving reverse sides alone.
    pub fn clear_relation(&self, owner: &impl AsObject, relation: &str) -> Result<()> {
        self.ensure_wired()?;
        relation::clear(&owner.as_object(), relation)
    }

    /// Write the object and its changed relations. Stores it first if it
    /// is new.
    pub fn update(&self, object: &impl AsObject) -> Result<UpdateStatus> {
        self.ensure_wired()?;
        concurrency::update(self, &object.as_object())
    }

    /// Pull remote changes into the object.
    pub fn synchronize(&self, object: &impl AsObject) -> Result<SyncStatus> {
        self.ensure_wired()?;
        concurrency::synchronize(self, &object.as_object())
    }

    /// Delete the object's row.
    pub fn remove(&self, object: &impl AsObject) -> Result<RemoveStatus> {
        self.ensure_wired()?;
        concurrency::remove(self, &object.as_object())
    }

    /// Add `delta` to a numeric field in storage and return the new value.
    pub fn increment(
        &self,
        object: &impl AsObject,
        field: &str,
        delta: impl Into<Value>,
    ) -> Result<Value> {
        self.ensure_wired()?;
        concurrency::increment(self, &object.as_object(), field, delta.into())
    }

    /// Where the object stands relative to its row.
    pub fn state(&self, object: &impl AsObject) -> SyncState {
        concurrency::sync_state(&object.as_object())
    }

    /// Try to take the advisory lock of the object.
    pub fn try_lock(&self, object: &impl AsObject) -> Result<LockStatus> {
        self.ensure_wired()?;
        concurrency::try_lock(self, &object.as_object(), None)
    }

    /// Try to take the advisory lock, recording `metadata` with it.
    pub fn try_lock_with(
        &self,
        object: &impl AsObject,
        metadata: serde_json::Value,
    ) -> Result<LockStatus> {
        self.ensure_wired()?;
        concurrency::try_lock(self, &object.as_object(), Some(metadata))
    }

    /// Release the advisory lock held through the object.
    pub fn unlock(&self, object: &impl AsObject) -> Result<UnlockStatus> {
        self.ensure_wired()?;
        concurrency::unlock(self, &object.as_object())
    }

    /// Current advisory lock state of the object.
    pub fn lock_status(&self, object: &impl AsObject) -> Result<LockStatus> {
        self.ensure_wired()?;
        concurrency::lock_status(self, &object.as_object())
    }

    /// Open a transaction level. Operations run on this thread while it is
    /// open join it; only the outermost level commits.
    pub fn begin_transaction(&self) -> Result<Transaction<'_>> {
        self.storage.begin()
    }

    /// Report a changed field so dependents on related objects recompute.
    /// Returns how many objects were recomputed.
    pub fn property_changed(&self, object: &impl AsObject, field: &str) -> Result<usize> {
        self.ensure_wired()?;
        let object = object.as_object();
        if object.core().meta().field(field).is_none() {
            return Err(Error::UnknownProperty {
                class: object.core().class().to_string(),
                property: field.to_string(),
            });
        }
        relation::propagate(&self.meta, &object, field)
    }

    /// Bound the identity cache of `class` (`None` = unbounded).
    pub fn set_cache_maximum_size(&self, class: &str, max_size: Option<usize>) -> Result<()> {
        self.identity_cache(class)?.set_maximum_size(max_size);
        Ok(())
    }

    /// Identity cache of `class`.
    pub fn identity_cache(&self, class: &str) -> Result<Arc<ObjectCache>> {
        self.caches
            .get(class)
            .map(|c| c.value().clone())
            .ok_or_else(|| crate::error::SchemaError::UnregisteredClass(class.to_string()).into())
    }

    pub(crate) fn cache_for(&self, class: &str) -> Result<Arc<ObjectCache>> {
        self.identity_cache(class)
    }

    /// Live instance of a row, without touching storage.
    pub(crate) fn cached(&self, class: &str, key: i64) -> Option<ObjectRef> {
        let cache = self.caches.get(class)?.value().clone();
        cache.get(key)
    }

    pub(crate) fn evict(&self, class: &str, key: i64) {
        if let Some(cache) = self.caches.get(class) {
            cache.remove(key);
        }
    }

    /// Instances for `keys`, in key order. Live instances are reused;
    /// the rest are read in one query. Missing rows are skipped.
    pub(crate) fn load_many(&self, class: &str, keys: &[i64]) -> Result<Vec<ObjectRef>> {
        let meta = self.meta.meta_object(class)?;
        let cache = self.cache_for(class)?;
        let mut found: Vec<Option<ObjectRef>> = keys.iter().map(|k| cache.get(*k)).collect();
        let mut missing: Vec<i64> = keys
            .iter()
            .zip(&found)
            .filter(|(_, f)| f.is_none())
            .map(|(k, _)| *k)
            .collect();
        missing.sort_unstable();
        missing.dedup();

        if !missing.is_empty() {
            let condition = Condition::in_values(
                meta.primary_key(),
                missing.iter().copied().map(Value::Int64).collect(),
            );
            let loaded = self.load_where(&meta, condition)?;
            for (key, slot) in keys.iter().zip(found.iter_mut()) {
                if slot.is_none() {
                    *slot = loaded.iter().find(|o| o.core().key() == Some(*key)).cloned();
                }
            }
            debug!(class, requested = keys.len(), read = loaded.len(), "loaded rows");
        }
        Ok(found.into_iter().flatten().collect())
    }

    /// Instances of the rows of `meta` matching `condition`, by key.
    pub(crate) fn load_where(&self, meta: &MetaObject, condition: Condition) -> Result<Vec<ObjectRef>> {
        let mut columns = vec![meta.primary_key().to_string(), REVISION_COLUMN.to_string()];
        columns.extend(meta.stored_columns());
        let rows = self.storage.query(
            Select::new(meta.table(), columns)
                .with_condition(condition)
                .order_asc(meta.primary_key()),
        )?;
        rows.into_iter().map(|row| self.materialize(meta, row)).collect()
    }

    /// The live instance of a row, or a new one built from it.
    fn materialize(&self, meta: &MetaObject, row: Vec<Value>) -> Result<ObjectRef> {
        let mut values = row.into_iter();
        let key = values
            .next()
            .and_then(|v| v.as_i64())
            .ok_or_else(|| Error::NotPersisted {
                class: meta.class().to_string(),
            })?;
        let revision = values.next().and_then(|v| v.as_i64()).unwrap_or_default();
        let cache = self.cache_for(meta.class())?;
        if let Some(live) = cache.get(key) {
            return Ok(live);
        }
        let meta_object = self.meta.meta_object(meta.class())?;
        let object = self.factory(meta.class())?.instantiate(meta_object, values.collect())?;
        object.core().set_persisted(key, revision, object.stored_values());
        Ok(cache.get_or_insert_with(key, || object.clone()))
    }
}

impl std::fmt::Debug for StorageContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageContext")
            .field("driver", &self.config.driver)
            .field("location", &self.config.location)
            .field("classes", &self.registrations.len())
            .finish()
    }
}
