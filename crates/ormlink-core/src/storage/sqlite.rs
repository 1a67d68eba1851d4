//! SQLite backend.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use ormlink_query::{Dialect, SqlText, SqliteDialect, Value};
use rusqlite::types::{Value as SqliteValue, ValueRef};
use rusqlite::{params_from_iter, ErrorCode};
use tracing::{debug, instrument};

use super::connection::{Connection, Row};
use crate::error::StorageError;

/// A connection to a SQLite database file or an in-memory database.
pub struct SqliteConnection {
    conn: rusqlite::Connection,
    dialect: Arc<dyn Dialect>,
}

impl SqliteConnection {
    /// Open (or create) the database at `path`.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self, StorageError> {
        let conn = rusqlite::Connection::open(path.as_ref())
            .map_err(|e| wrap("open", e))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(|e| wrap("PRAGMA journal_mode=WAL", e))?;
        let connection = Self::configure(conn, busy_timeout)?;
        debug!("opened sqlite database");
        Ok(connection)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory(busy_timeout: Duration) -> Result<Self, StorageError> {
        let conn = rusqlite::Connection::open_in_memory().map_err(|e| wrap("open", e))?;
        let connection = Self::configure(conn, busy_timeout)?;
        debug!("opened in-memory sqlite database");
        Ok(connection)
    }

    fn configure(conn: rusqlite::Connection, busy_timeout: Duration) -> Result<Self, StorageError> {
        conn.busy_timeout(busy_timeout)
            .map_err(|e| wrap("busy_timeout", e))?;
        Ok(Self {
            conn,
            dialect: Arc::new(SqliteDialect),
        })
    }
}

/// Busy and locked databases are the SQLite equivalent of a deadlock victim.
fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

fn wrap(statement: &str, err: rusqlite::Error) -> StorageError {
    let busy = is_busy(&err);
    StorageError::new(statement, err, busy)
}

fn to_sqlite(value: &Value) -> SqliteValue {
    match value {
        Value::Null => SqliteValue::Null,
        Value::Bool(b) => SqliteValue::Integer(i64::from(*b)),
        Value::Int32(i) => SqliteValue::Integer(i64::from(*i)),
        Value::Int64(i) | Value::Timestamp(i) => SqliteValue::Integer(*i),
        Value::Float64(f) => SqliteValue::Real(*f),
        Value::String(s) => SqliteValue::Text(s.clone()),
        Value::Bytes(b) => SqliteValue::Blob(b.clone()),
    }
}

fn from_sqlite(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int64(i),
        ValueRef::Real(f) => Value::Float64(f),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    }
}

impl Connection for SqliteConnection {
    fn dialect(&self) -> Arc<dyn Dialect> {
        self.dialect.clone()
    }

    fn execute_batch(&mut self, sql: &str) -> Result<(), StorageError> {
        self.conn.execute_batch(sql).map_err(|e| wrap(sql, e))
    }

    fn execute(&mut self, text: &SqlText) -> Result<usize, StorageError> {
        let mut stmt = self
            .conn
            .prepare_cached(&text.sql)
            .map_err(|e| wrap(&text.sql, e))?;
        stmt.execute(params_from_iter(text.params.iter().map(to_sqlite)))
            .map_err(|e| wrap(&text.sql, e))
    }

    fn insert(&mut self, text: &SqlText) -> Result<i64, StorageError> {
        self.execute(text)?;
        Ok(self.conn.last_insert_rowid())
    }

    fn query(&mut self, text: &SqlText) -> Result<Vec<Row>, StorageError> {
        let mut stmt = self
            .conn
            .prepare_cached(&text.sql)
            .map_err(|e| wrap(&text.sql, e))?;
        let width = stmt.column_count();
        let mut rows = stmt
            .query(params_from_iter(text.params.iter().map(to_sqlite)))
            .map_err(|e| wrap(&text.sql, e))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(|e| wrap(&text.sql, e))? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(from_sqlite(row.get_ref(i).map_err(|e| wrap(&text.sql, e))?));
            }
            out.push(values);
        }
        Ok(out)
    }
}
