//! Writing in-memory relation changes to storage.
//!
//! The strategy follows the storage mapping of each relation:
//!
//! - many-to-one: the foreign key is written with the row itself;
//! - owning side of a one-to-one: the target is first freed from any other
//!   row, then this row points at it;
//! - reverse column (one-to-many, non-owning one-to-one): rows that left are
//!   reset to NULL, then rows that arrived are set;
//! - join table (many-to-many): removed pairs are deleted, then new pairs
//!   inserted.
//!
//! Every row whose stored relation changes has its revision bumped, and the
//! live instances of those rows are reconciled within the same transaction.

mod engine;
mod plan;

pub(crate) use engine::{adjust_relations, detach_relations, reconcile, row_foreign_keys};
