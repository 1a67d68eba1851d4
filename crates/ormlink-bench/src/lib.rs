//! ormlink benchmark suite.
//!
//! # Benchmark Categories
//!
//! - **Identity cache**: insert, hit, miss and bounded eviction
//! - **Relation sync**: relating, writing and reloading one-to-many relations

pub mod fixtures;
pub mod harness;

pub use fixtures::{Author, Post, Scale};
pub use harness::BenchContext;
