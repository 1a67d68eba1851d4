//! ormlink - plain Rust structs over relational tables.
//!
//! Entities describe their fields and relations once; the storage context
//! keeps one in-memory instance per stored row, resolves relations lazily,
//! keeps both sides of every relation consistent and detects concurrent
//! writers through per-row revisions.
//!
//! # Example
//!
//! ```no_run
//! use ormlink::prelude::*;
//!
//! #[derive(Debug, Default)]
//! struct Author {
//!     name: String,
//! }
//!
//! impl Entity for Author {
//!     fn descriptor() -> ClassDescriptor<Self> {
//!         ClassDescriptor::<Self>::new("Author")
//!             .field(
//!                 "name",
//!                 SqlType::Text,
//!                 |a| a.name.clone().into(),
//!                 |a, v| {
//!                     a.name = v.try_into()?;
//!                     Ok(())
//!                 },
//!             )
//!             .relation(RelationSchema::collection("books", "Book"))
//!     }
//! }
//!
//! #[derive(Debug, Default)]
//! struct Book {
//!     title: String,
//! }
//!
//! impl Entity for Book {
//!     fn descriptor() -> ClassDescriptor<Self> {
//!         ClassDescriptor::<Self>::new("Book")
//!             .field(
//!                 "title",
//!                 SqlType::Text,
//!                 |b| b.title.clone().into(),
//!                 |b, v| {
//!                     b.title = v.try_into()?;
//!                     Ok(())
//!                 },
//!             )
//!             .relation(RelationSchema::single("author", "Author"))
//!     }
//! }
//!
//! # fn main() -> ormlink::Result<()> {
//! let ctx = StorageContext::open(ContextConfig::file("library.db"))?;
//! ctx.register::<Author>()?;
//! ctx.register::<Book>()?;
//! ctx.create_schema()?;
//!
//! let author = ctx.create(Author { name: "Le Guin".into() })?;
//! let book = ctx.create(Book { title: "The Dispossessed".into() })?;
//! ctx.relate(&author, "books", &book)?;
//!
//! match ctx.update(&author)? {
//!     UpdateStatus::Success => {}
//!     UpdateStatus::Conflict { .. } => {
//!         ctx.synchronize(&author)?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! The relation engine lives in `ormlink-core`; [`query`] holds the value
//! model, conditions and SQL rendering.

pub use ormlink_core::{cache, concurrency, config, context, entity, error, meta, relation, storage};
pub use ormlink_query as query;

pub use ormlink_core::{
    downcast, same_object, AsObject, CacheStats, Cardinality, ClassDescriptor, ClassSchema,
    Connection, ContextConfig, DatabaseLocation, Entity, Error, FieldConflict, FieldDescriptor,
    IdentityCache, LockError, LockInfo, LockStatus, MetaModel, MetaObject, ObjectCache,
    ObjectCore, ObjectRef, Persistent, PersistentObject, RelationMapping, RelationProxy,
    RelationSchema, RelationStorage, RemoveStatus, Result, SchemaError, SqliteConnection,
    Storage, StorageContext, StorageError, SyncState, SyncStatus, Transaction,
    TransactionError, UnlockStatus, UpdateStatus,
};
pub use ormlink_query::{Condition, SqlType, Value};

/// The items most programs need.
pub mod prelude {
    pub use ormlink_core::{
        AsObject, ClassDescriptor, ContextConfig, Entity, Error, LockStatus, Persistent,
        RelationSchema, RemoveStatus, Result, StorageContext, SyncState, SyncStatus,
        UnlockStatus, UpdateStatus,
    };
    pub use ormlink_query::{SqlType, Value};
}
