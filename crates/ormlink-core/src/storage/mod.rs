//! Storage access: connections, nested transactions and table bootstrap.

mod connection;
pub(crate) mod schema;
mod sqlite;
mod transaction;

pub use connection::{Connection, Row};
pub use sqlite::SqliteConnection;
pub use transaction::{Storage, Transaction};
