//! Reference-counted transactions over a shared connection.

use std::cell::RefCell;
use std::sync::Arc;

use ormlink_query::{render, Dialect, Insert, Select, Statement};
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use tracing::{debug, trace, warn};

use super::connection::{Connection, Row};
use crate::error::{Result, TransactionError};

type Undo = Box<dyn FnOnce() + Send>;

pub(crate) struct Session {
    conn: Box<dyn Connection>,
    depth: usize,
    /// Set by any failure or rollback at any nesting level.
    failed: bool,
    /// In-memory changes to put back if the outermost level does not commit.
    undo: Vec<Undo>,
}

/// The connection shared by a storage context.
///
/// Transactions nest: only the outermost [`Transaction`] issues `BEGIN` and
/// `COMMIT`. A failure recorded at any level rolls the whole transaction
/// back when the outermost level ends. The connection is owned by one
/// thread at a time for the whole lifetime of a transaction.
pub struct Storage {
    session: ReentrantMutex<RefCell<Session>>,
    dialect: Arc<dyn Dialect>,
}

impl Storage {
    pub fn new(conn: Box<dyn Connection>) -> Self {
        let dialect = conn.dialect();
        Self {
            session: ReentrantMutex::new(RefCell::new(Session {
                conn,
                depth: 0,
                failed: false,
                undo: Vec::new(),
            })),
            dialect,
        }
    }

    pub fn dialect(&self) -> &Arc<dyn Dialect> {
        &self.dialect
    }

    /// Open a transaction, or join the one this thread already has open.
    pub fn begin(&self) -> Result<Transaction<'_>> {
        let guard = self.session.lock();
        {
            let mut session = guard.borrow_mut();
            if session.depth == 0 {
                let begin = self.dialect.begin();
                session
                    .conn
                    .execute_batch(begin)
                    .map_err(TransactionError::Begin)?;
                session.failed = false;
                trace!("transaction started");
            }
            session.depth += 1;
        }
        Ok(Transaction {
            guard,
            dialect: self.dialect.clone(),
            finished: false,
        })
    }

    /// Run a read outside of any explicit transaction.
    pub fn query(&self, select: Select) -> Result<Vec<Row>> {
        let tx = self.begin()?;
        let rows = tx.query(select);
        match rows {
            Ok(rows) => {
                tx.release()?;
                Ok(rows)
            }
            Err(e) => {
                tx.rollback()?;
                Err(e)
            }
        }
    }

    /// Run parameterless SQL such as DDL.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        let guard = self.session.lock();
        let mut session = guard.borrow_mut();
        debug!(sql, "executing batch");
        session.conn.execute_batch(sql).map_err(|e| {
            session.failed = session.depth > 0;
            e.into()
        })
    }

    /// Current nesting depth on the calling thread's session.
    pub fn depth(&self) -> usize {
        self.session.lock().borrow().depth
    }
}

/// One level of a (possibly nested) transaction.
///
/// Dropping a transaction without committing rolls it back. Work registered
/// with [`Transaction::on_rollback`] at any level runs, newest first, when
/// the outermost level rolls back; it is discarded once that level commits.
pub struct Transaction<'a> {
    guard: ReentrantMutexGuard<'a, RefCell<Session>>,
    dialect: Arc<dyn Dialect>,
    finished: bool,
}

impl Transaction<'_> {
    /// Nesting depth, 1 for the outermost level.
    pub fn depth(&self) -> usize {
        self.guard.borrow().depth
    }

    /// Render and run a statement; returns affected rows. Statements that
    /// cannot touch any row are skipped.
    pub fn execute(&self, statement: impl Into<Statement>) -> Result<usize> {
        let statement = statement.into();
        if statement.is_noop() {
            trace!(table = %statement.table(), "skipping no-op statement");
            return Ok(0);
        }
        let text = render(&statement, self.dialect.as_ref())?;
        debug!(sql = %text.sql, params = text.params.len(), "execute");
        let mut session = self.guard.borrow_mut();
        session.conn.execute(&text).map_err(|e| {
            session.failed = true;
            e.into()
        })
    }

    /// Render and run an insert; returns the generated key.
    pub fn insert(&self, insert: Insert) -> Result<i64> {
        let text = render(&Statement::Insert(insert), self.dialect.as_ref())?;
        debug!(sql = %text.sql, params = text.params.len(), "insert");
        let mut session = self.guard.borrow_mut();
        session.conn.insert(&text).map_err(|e| {
            session.failed = true;
            e.into()
        })
    }

    /// Render and run a select.
    pub fn query(&self, select: Select) -> Result<Vec<Row>> {
        let statement = Statement::Select(select);
        if statement.is_noop() {
            return Ok(Vec::new());
        }
        let text = render(&statement, self.dialect.as_ref())?;
        debug!(sql = %text.sql, params = text.params.len(), "query");
        let mut session = self.guard.borrow_mut();
        session.conn.query(&text).map_err(|e| {
            session.failed = true;
            e.into()
        })
    }

    /// Register `undo` to run if the transaction this level belongs to
    /// ends without committing.
    pub(crate) fn on_rollback(&self, undo: impl FnOnce() + Send + 'static) {
        self.guard.borrow_mut().undo.push(Box::new(undo));
    }

    /// First row of a select, if any.
    pub fn query_one(&self, select: Select) -> Result<Option<Row>> {
        Ok(self.query(select)?.into_iter().next())
    }

    /// Commit. Only the outermost level reaches the backend; it rolls back
    /// instead if any level failed.
    pub fn commit(mut self) -> Result<()> {
        self.finished = true;
        self.finish(End::Commit)
    }

    /// Roll back this level, and with it the whole transaction.
    pub fn rollback(mut self) -> Result<()> {
        self.finished = true;
        self.finish(End::Rollback)
    }

    /// End this level without recording a failure; the outermost level
    /// discards its work. Used when a transaction only read.
    pub fn release(mut self) -> Result<()> {
        self.finished = true;
        self.finish(End::Release)
    }

    fn finish(&self, end: End) -> Result<()> {
        let (result, undo): (Result<()>, Vec<Undo>) = {
            let mut session = self.guard.borrow_mut();
            session.depth -= 1;
            if end == End::Rollback {
                session.failed = true;
            }
            if session.depth > 0 {
                return if end == End::Commit && session.failed {
                    Err(TransactionError::Aborted.into())
                } else {
                    Ok(())
                };
            }

            let failed = std::mem::take(&mut session.failed);
            let undo = std::mem::take(&mut session.undo);
            if end == End::Commit && !failed {
                match session.conn.execute_batch("COMMIT") {
                    Ok(()) => {
                        trace!("transaction committed");
                        return Ok(());
                    }
                    Err(e) => {
                        if let Err(rollback) = session.conn.execute_batch("ROLLBACK") {
                            warn!(error = %rollback, "rollback after failed commit also failed");
                        }
                        (Err(TransactionError::Commit(e).into()), undo)
                    }
                }
            } else {
                let result = match session.conn.execute_batch("ROLLBACK") {
                    Ok(()) => {
                        trace!("transaction rolled back");
                        if end == End::Commit {
                            Err(TransactionError::Aborted.into())
                        } else {
                            Ok(())
                        }
                    }
                    Err(e) => Err(TransactionError::Rollback(e).into()),
                };
                (result, undo)
            }
        };

        if !undo.is_empty() {
            debug!(changes = undo.len(), "restoring in-memory state after rollback");
        }
        for undo in undo.into_iter().rev() {
            undo();
        }
        result
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum End {
    Commit,
    Rollback,
    Release,
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        warn!("transaction dropped without commit, rolling back");
        if let Err(e) = self.finish(End::Rollback) {
            warn!(error = %e, "rollback on drop failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use parking_lot::Mutex;

    use super::*;
    use crate::storage::SqliteConnection;

    fn storage() -> Storage {
        let conn = SqliteConnection::open_in_memory(Duration::from_millis(100)).unwrap();
        Storage::new(Box::new(conn))
    }

    fn record(log: &Arc<Mutex<Vec<&'static str>>>, entry: &'static str) -> impl FnOnce() + Send {
        let log = log.clone();
        move || log.lock().push(entry)
    }

    #[test]
    fn test_outer_rollback_undoes_nested_levels_newest_first() {
        let storage = storage();
        let log = Arc::new(Mutex::new(Vec::new()));

        let outer = storage.begin().unwrap();
        outer.on_rollback(record(&log, "outer"));
        {
            let inner = storage.begin().unwrap();
            assert_eq!(inner.depth(), 2);
            inner.on_rollback(record(&log, "inner"));
            inner.commit().unwrap();
        }
        // the committed inner level keeps its undo until the end
        assert!(log.lock().is_empty());

        outer.rollback().unwrap();
        assert_eq!(*log.lock(), vec!["inner", "outer"]);
        assert_eq!(storage.depth(), 0);
    }

    #[test]
    fn test_commit_discards_undo() {
        let storage = storage();
        let log = Arc::new(Mutex::new(Vec::new()));

        let tx = storage.begin().unwrap();
        tx.on_rollback(record(&log, "first"));
        tx.commit().unwrap();

        // a later rollback does not see work of the committed transaction
        let tx = storage.begin().unwrap();
        tx.on_rollback(record(&log, "second"));
        drop(tx);
        assert_eq!(*log.lock(), vec!["second"]);
    }

    #[test]
    fn test_failed_level_aborts_outer_commit() {
        let storage = storage();
        let log = Arc::new(Mutex::new(Vec::new()));

        let outer = storage.begin().unwrap();
        let inner = storage.begin().unwrap();
        inner.on_rollback(record(&log, "inner"));
        inner.rollback().unwrap();

        assert!(matches!(
            outer.commit(),
            Err(crate::Error::Transaction(TransactionError::Aborted))
        ));
        assert_eq!(*log.lock(), vec!["inner"]);
    }
}
