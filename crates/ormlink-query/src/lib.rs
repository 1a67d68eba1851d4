//! ormlink query layer.
//!
//! This crate holds the small, backend-neutral pieces the object engine uses
//! to talk to a relational store: runtime values, composable condition
//! trees, statement descriptors, and a renderer that turns descriptors into
//! parameterized SQL for a chosen dialect.
//!
//! # Modules
//!
//! - [`value`] - Runtime values and column type tags
//! - [`condition`] - Predicate trees (AND/OR/NOT, comparisons, IN, IS NULL)
//! - [`statement`] - Select/Insert/Update/Delete descriptors
//! - [`dialect`] - Backend syntax differences
//! - [`render`] - Descriptor to SQL text
//! - [`error`] - Query error types
//!
//! # Example
//!
//! ```
//! use ormlink_query::{render, Condition, SqliteDialect, Update, Value};
//!
//! let reset = Update::new("child")
//!     .set("parent_id", Value::Null)
//!     .increment("revision", 1i64)
//!     .with_condition(Condition::eq("parent_id", 3i64));
//!
//! let text = render(&reset.into(), &SqliteDialect).unwrap();
//! assert_eq!(text.params.len(), 3);
//! ```

pub mod condition;
pub mod dialect;
pub mod error;
pub mod render;
pub mod statement;
pub mod value;

pub use condition::{Condition, Operator};
pub use dialect::{dialect_for_driver, Dialect, MySqlDialect, PostgresDialect, SqliteDialect};
pub use error::Error;
pub use render::{render, SqlText};
pub use statement::{Assignment, Delete, Insert, OrderDirection, Select, Statement, Update};
pub use value::{SqlType, Value};
