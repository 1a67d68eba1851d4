//! Storage context configuration.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default backend driver.
pub const DEFAULT_DRIVER: &str = "sqlite";

/// Default number of retries of an increment that hit a deadlock.
pub const DEFAULT_DEADLOCK_RETRIES: u32 = 3;

/// Default time a connection waits on a locked database, in milliseconds.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Default pause before retrying after a deadlock, in milliseconds.
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 20;

/// Default name of the advisory lock table.
pub const DEFAULT_LOCK_TABLE: &str = "ormlink_lock";

/// Where the database lives.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseLocation {
    /// A private in-memory database.
    #[default]
    Memory,
    /// A database file, created if missing.
    File(PathBuf),
}

/// Storage context configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Backend driver name ("sqlite", "postgres", "mysql").
    pub driver: String,

    pub location: DatabaseLocation,

    /// Identity cache bound per class; `None` keeps every live entry.
    pub cache_max_size: Option<usize>,

    /// Retries of a deadlocked increment before giving up.
    pub deadlock_retries: u32,

    /// Pause before each increment retry, in milliseconds.
    pub retry_backoff_ms: u64,

    /// How long to wait on a locked database, in milliseconds.
    pub busy_timeout_ms: u64,

    /// Table holding advisory lock rows.
    pub lock_table: String,

    /// Recorded as the owner of the locks this context takes.
    pub owner_id: String,
}

impl ContextConfig {
    /// Configuration for a database file.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            location: DatabaseLocation::File(path.into()),
            ..Self::default()
        }
    }

    /// Configuration for a private in-memory database.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Parse a JSON configuration; missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))
    }

    /// Set the backend driver.
    pub fn with_driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = driver.into();
        self
    }

    /// Bound every identity cache.
    pub fn with_cache_max_size(mut self, size: usize) -> Self {
        self.cache_max_size = Some(size);
        self
    }

    /// Set the number of deadlock retries.
    pub fn with_deadlock_retries(mut self, retries: u32) -> Self {
        self.deadlock_retries = retries;
        self
    }

    /// Set the busy timeout.
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the lock table name.
    pub fn with_lock_table(mut self, table: impl Into<String>) -> Self {
        self.lock_table = table.into();
        self
    }

    /// Set the lock owner identifier.
    pub fn with_owner_id(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = owner_id.into();
        self
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            driver: DEFAULT_DRIVER.to_string(),
            location: DatabaseLocation::Memory,
            cache_max_size: None,
            deadlock_retries: DEFAULT_DEADLOCK_RETRIES,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            lock_table: DEFAULT_LOCK_TABLE.to_string(),
            owner_id: generate_owner_id(),
        }
    }
}

/// Generate a lock owner identifier unique within the process.
fn generate_owner_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let sequence = COUNTER.fetch_add(1, Ordering::Relaxed);

    format!("ormlink-{:x}-{:x}-{}", timestamp, std::process::id(), sequence)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ContextConfig::default();
        assert_eq!(config.driver, DEFAULT_DRIVER);
        assert_eq!(config.location, DatabaseLocation::Memory);
        assert_eq!(config.deadlock_retries, DEFAULT_DEADLOCK_RETRIES);
        assert_eq!(config.lock_table, DEFAULT_LOCK_TABLE);
        assert_eq!(config.busy_timeout(), Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS));
        assert!(config.owner_id.starts_with("ormlink-"));
    }

    #[test]
    fn test_owner_ids_are_unique() {
        assert_ne!(ContextConfig::default().owner_id, ContextConfig::default().owner_id);
    }

    #[test]
    fn test_config_builder() {
        let config = ContextConfig::file("/tmp/app.db")
            .with_cache_max_size(128)
            .with_deadlock_retries(5)
            .with_busy_timeout(Duration::from_secs(1))
            .with_lock_table("locks")
            .with_owner_id("worker-1");

        assert_eq!(config.location, DatabaseLocation::File("/tmp/app.db".into()));
        assert_eq!(config.cache_max_size, Some(128));
        assert_eq!(config.deadlock_retries, 5);
        assert_eq!(config.busy_timeout_ms, 1_000);
        assert_eq!(config.lock_table, "locks");
        assert_eq!(config.owner_id, "worker-1");
    }

    #[test]
    fn test_from_json() {
        let config = ContextConfig::from_json(
            r#"{"location": {"file": "data.db"}, "cache_max_size": 10, "owner_id": "a"}"#,
        )
        .unwrap();
        assert_eq!(config.location, DatabaseLocation::File("data.db".into()));
        assert_eq!(config.cache_max_size, Some(10));
        assert_eq!(config.driver, DEFAULT_DRIVER);

        assert!(matches!(
            ContextConfig::from_json("{\"deadlock_retries\": \"x\"}"),
            Err(Error::Config(_))
        ));
    }
}
