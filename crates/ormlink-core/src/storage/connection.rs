//! Backend connection abstraction.

use std::sync::Arc;

use ormlink_query::{Dialect, SqlText, Value};

use crate::error::StorageError;

/// One result row, columns in select order.
pub type Row = Vec<Value>;

/// A blocking connection to a relational backend.
///
/// Implementations execute already rendered SQL; statement construction and
/// transaction nesting live above this trait.
pub trait Connection: Send {
    /// Dialect used to render statements for this connection.
    fn dialect(&self) -> Arc<dyn Dialect>;

    /// Run parameterless SQL, possibly several statements.
    fn execute_batch(&mut self, sql: &str) -> Result<(), StorageError>;

    /// Run a statement and return the number of affected rows.
    fn execute(&mut self, text: &SqlText) -> Result<usize, StorageError>;

    /// Run an insert and return the generated primary key.
    fn insert(&mut self, text: &SqlText) -> Result<i64, StorageError>;

    /// Run a query and collect every row.
    fn query(&mut self, text: &SqlText) -> Result<Vec<Row>, StorageError>;
}
