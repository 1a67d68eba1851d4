//! ormlink core - relation engine, identity cache and concurrency control.
//!
//! This crate maps plain Rust structs onto relational tables and keeps the
//! object graph consistent with storage.
//!
//! # Modules
//!
//! - [`meta`] - Class metadata and relation cardinality inference
//! - [`entity`] - Entity descriptors and persistent instances
//! - [`cache`] - Per-class identity caches
//! - [`relation`] - Lazily resolved relation proxies
//! - [`concurrency`] - Revision checks, synchronization and advisory locks
//! - [`storage`] - Connections and nested transactions
//! - [`context`] - The storage context tying everything together

pub mod cache;
pub mod concurrency;
pub mod config;
pub mod context;
pub mod entity;
pub mod error;
pub mod meta;
pub mod relation;
pub mod storage;
mod sync;

pub use cache::{CacheStats, IdentityCache};
pub use concurrency::{
    FieldConflict, LockInfo, LockStatus, RemoveStatus, SyncState, SyncStatus, UnlockStatus,
    UpdateStatus,
};
pub use config::{ContextConfig, DatabaseLocation};
pub use context::{ObjectCache, StorageContext};
pub use entity::{
    downcast, same_object, AsObject, ClassDescriptor, Entity, FieldDescriptor, ObjectCore,
    ObjectRef, Persistent, PersistentObject,
};
pub use error::{Error, LockError, Result, SchemaError, StorageError, TransactionError};
pub use meta::{
    Cardinality, ClassSchema, MetaModel, MetaObject, RelationMapping, RelationSchema,
    RelationStorage,
};
pub use relation::RelationProxy;
pub use storage::{Connection, SqliteConnection, Storage, Transaction};

/// Re-export of the query layer.
pub use ormlink_query as query;
