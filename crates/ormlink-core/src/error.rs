//! Core error types.

use thiserror::Error;

use crate::meta::Cardinality;

/// Core engine errors.
///
/// Optimistic conflicts are not errors; they are reported through the
/// status values returned by the mutating operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Schema misconfiguration.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// SQL execution failure.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Advisory lock failure.
    #[error("lock error: {0}")]
    Lock(#[from] LockError),

    /// Begin/commit/rollback failure.
    #[error("transaction error: {0}")]
    Transaction(#[from] TransactionError),

    /// Value conversion or statement rendering failure.
    #[error("value error: {0}")]
    Value(#[from] ormlink_query::Error),

    /// The operation needs an object that has been stored.
    #[error("{class} object has not been persisted")]
    NotPersisted { class: String },

    /// A relation points at an object that has not been stored yet.
    #[error("relation {class}.{relation} refers to an object that has not been persisted")]
    UnpersistedTarget { class: String, relation: String },

    /// The row for an object no longer exists.
    #[error("{class} with key {key} not found")]
    NotFound { class: String, key: i64 },

    /// A related object is not of the requested Rust type.
    #[error("expected {expected}, found object of class {found}")]
    TypeMismatch {
        expected: &'static str,
        found: String,
    },

    /// The class has no property with that name.
    #[error("unknown property {class}.{property}")]
    UnknownProperty { class: String, property: String },

    /// The property is a scalar field, not a relation.
    #[error("{class}.{property} is not a relation")]
    NotARelation { class: String, property: String },

    /// The target is not currently related through that relation.
    #[error("object is not related through {class}.{relation}")]
    NotRelated { class: String, relation: String },

    /// The target's class is not the class the relation points to.
    #[error("relation {class}.{relation} expects {expected}, found {found}")]
    WrongTarget {
        class: String,
        relation: String,
        expected: String,
        found: String,
    },

    /// More than one target was given for a to-one relation.
    #[error("relation {class}.{relation} holds at most one target, got {count}")]
    TooManyTargets {
        class: String,
        relation: String,
        count: usize,
    },

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Check whether the failure was a deadlock or busy backend, which is
    /// worth retrying.
    pub fn is_deadlock(&self) -> bool {
        match self {
            Error::Storage(e) => e.is_deadlock(),
            Error::Transaction(
                TransactionError::Begin(e)
                | TransactionError::Commit(e)
                | TransactionError::Rollback(e),
            ) => e.is_deadlock(),
            _ => false,
        }
    }
}

/// Schema errors. These are fatal and detected while registering and
/// wiring classes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("class {0} is not registered")]
    UnregisteredClass(String),

    #[error("class {0} is already registered")]
    DuplicateClass(String),

    #[error("table {table} of class {class} collides with class {existing}")]
    DuplicateTable {
        table: String,
        class: String,
        existing: String,
    },

    #[error("property {class}.{property} is declared twice")]
    DuplicateProperty { class: String, property: String },

    #[error("class {class} has no relation named {property}")]
    UnknownRelation { class: String, property: String },

    #[error("property {class}.{property} uses a column name reserved by the engine")]
    ReservedColumn { class: String, property: String },

    #[error("reverse relation {target}.{reverse} of {class}.{property} does not exist or does not point back")]
    UnknownReverseRelation {
        class: String,
        property: String,
        target: String,
        reverse: String,
    },

    #[error("relation {class}.{property} has no reverse relation on {target}")]
    NoReverseRelation {
        class: String,
        property: String,
        target: String,
    },

    #[error("relation {class}.{property} has several reverse candidates: {candidates:?}")]
    AmbiguousReverseRelation {
        class: String,
        property: String,
        candidates: Vec<String>,
    },

    #[error("relation {class}.{property} resolves to reverse {target}.{reverse}, which resolves elsewhere")]
    ReverseMismatch {
        class: String,
        property: String,
        target: String,
        reverse: String,
    },

    #[error("relation {class}.{property} is {found:?} but was declared {declared:?}")]
    CardinalityMismatch {
        class: String,
        property: String,
        declared: Cardinality,
        found: Cardinality,
    },

    #[error("relation {class}.{property} is its own reverse")]
    SelfReverse { class: String, property: String },

    #[error("relation {class}.{property} and its reverse are both strong")]
    StrongCycle { class: String, property: String },

    #[error("column {column} is produced twice on table {table}")]
    ColumnCollision { table: String, column: String },

    #[error("dependency of {class}.{dependent} names an unknown field or relation")]
    UnknownDependency { class: String, dependent: String },

    #[error("cardinality of {class}.{property} is not known until all classes are wired")]
    CardinalityUnresolved { class: String, property: String },
}

/// A failed SQL statement.
#[derive(Debug, Error)]
#[error("storage error while executing `{statement}`: {source}")]
pub struct StorageError {
    /// Text of the failing statement.
    pub statement: String,
    /// Driver error.
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
    deadlock: bool,
}

impl StorageError {
    /// Wrap a driver error.
    pub fn new(
        statement: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
        deadlock: bool,
    ) -> Self {
        Self {
            statement: statement.into(),
            source: source.into(),
            deadlock,
        }
    }

    /// True when the backend reported a deadlock, lock timeout or busy
    /// database.
    pub fn is_deadlock(&self) -> bool {
        self.deadlock
    }
}

/// Advisory lock errors.
#[derive(Debug, Error)]
pub enum LockError {
    /// A lock this process held was removed by someone else.
    #[error("lock on {class} {key} was lost")]
    LockLost { class: String, key: i64 },

    /// Lock metadata could not be encoded or decoded.
    #[error("invalid lock metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    /// A lock row carried an unreadable timestamp.
    #[error("invalid lock timestamp: {0}")]
    Timestamp(String),
}

/// Transaction control failures.
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("begin failed: {0}")]
    Begin(#[source] StorageError),

    #[error("commit failed: {0}")]
    Commit(#[source] StorageError),

    #[error("rollback failed: {0}")]
    Rollback(#[source] StorageError),

    /// A statement failed earlier in the transaction, so it was rolled back.
    #[error("transaction rolled back after an earlier failure")]
    Aborted,
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;
