//! SQL dialect backends.
//!
//! A dialect answers the handful of questions on which the supported
//! backends disagree. It is selected once per connection from the driver
//! name with [`dialect_for_driver`].

use std::sync::Arc;

use crate::error::Error;

/// Backend-specific SQL syntax.
pub trait Dialect: Send + Sync + std::fmt::Debug {
    /// Short backend name, used in logs.
    fn name(&self) -> &'static str;

    /// Placeholder for the bind parameter at 1-based `index`.
    fn placeholder(&self, index: usize) -> String;

    /// Quote an identifier.
    fn quote(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    /// SQL expression yielding the current timestamp.
    fn now(&self) -> &'static str;

    /// Column definition for an auto-assigned integer primary key.
    fn primary_key_type(&self) -> &'static str;

    /// Whether `SELECT ... FOR UPDATE` is understood.
    fn supports_for_update(&self) -> bool;

    /// Render the head of an insert, honouring insert-or-ignore.
    fn insert_head(&self, table: &str, ignore_conflicts: bool) -> String;

    /// Trailing clause of an insert-or-ignore, if the backend needs one.
    fn insert_ignore_tail(&self) -> Option<&'static str> {
        None
    }

    /// Statement opening a write transaction.
    fn begin(&self) -> &'static str {
        "BEGIN"
    }
}

/// SQLite.
///
/// SQLite has no row locks; `begin` takes the database write lock up front
/// instead, which serialises lock acquisition across processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn placeholder(&self, index: usize) -> String {
        format!("?{index}")
    }

    fn now(&self) -> &'static str {
        "CURRENT_TIMESTAMP"
    }

    fn primary_key_type(&self) -> &'static str {
        "INTEGER PRIMARY KEY AUTOINCREMENT"
    }

    fn supports_for_update(&self) -> bool {
        false
    }

    fn insert_head(&self, table: &str, ignore_conflicts: bool) -> String {
        if ignore_conflicts {
            format!("INSERT OR IGNORE INTO {}", self.quote(table))
        } else {
            format!("INSERT INTO {}", self.quote(table))
        }
    }

    fn begin(&self) -> &'static str {
        "BEGIN IMMEDIATE"
    }
}

/// PostgreSQL.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${index}")
    }

    fn now(&self) -> &'static str {
        "now()"
    }

    fn primary_key_type(&self) -> &'static str {
        "BIGSERIAL PRIMARY KEY"
    }

    fn supports_for_update(&self) -> bool {
        true
    }

    fn insert_head(&self, table: &str, _ignore_conflicts: bool) -> String {
        format!("INSERT INTO {}", self.quote(table))
    }

    fn insert_ignore_tail(&self) -> Option<&'static str> {
        Some("ON CONFLICT DO NOTHING")
    }
}

/// MySQL and MariaDB.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl Dialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn quote(&self, ident: &str) -> String {
        format!("`{}`", ident.replace('`', "``"))
    }

    fn now(&self) -> &'static str {
        "NOW()"
    }

    fn primary_key_type(&self) -> &'static str {
        "BIGINT PRIMARY KEY AUTO_INCREMENT"
    }

    fn supports_for_update(&self) -> bool {
        true
    }

    fn insert_head(&self, table: &str, ignore_conflicts: bool) -> String {
        if ignore_conflicts {
            format!("INSERT IGNORE INTO {}", self.quote(table))
        } else {
            format!("INSERT INTO {}", self.quote(table))
        }
    }

    fn begin(&self) -> &'static str {
        "START TRANSACTION"
    }
}

/// Select the dialect for a driver name (case-insensitive).
pub fn dialect_for_driver(driver: &str) -> Result<Arc<dyn Dialect>, Error> {
    match driver.to_ascii_lowercase().as_str() {
        "sqlite" | "sqlite3" => Ok(Arc::new(SqliteDialect)),
        "postgres" | "postgresql" | "pg" => Ok(Arc::new(PostgresDialect)),
        "mysql" | "mariadb" => Ok(Arc::new(MySqlDialect)),
        _ => Err(Error::UnknownDriver(driver.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_selection() {
        assert_eq!(dialect_for_driver("SQLite").unwrap().name(), "sqlite");
        assert_eq!(dialect_for_driver("pg").unwrap().name(), "postgres");
        assert_eq!(dialect_for_driver("mariadb").unwrap().name(), "mysql");
        assert_eq!(
            dialect_for_driver("oracle").unwrap_err(),
            Error::UnknownDriver("oracle".into())
        );
    }

    #[test]
    fn test_placeholders_and_quoting() {
        assert_eq!(SqliteDialect.placeholder(3), "?3");
        assert_eq!(PostgresDialect.placeholder(3), "$3");
        assert_eq!(MySqlDialect.placeholder(3), "?");

        assert_eq!(SqliteDialect.quote("parent"), "\"parent\"");
        assert_eq!(MySqlDialect.quote("parent"), "`parent`");
        assert_eq!(PostgresDialect.quote("we\"ird"), "\"we\"\"ird\"");
    }
}
