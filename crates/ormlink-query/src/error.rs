//! Query-layer error types.

use thiserror::Error;

/// Errors raised while building or converting query values.
#[derive(Debug, Error, PartialEq)]
pub enum Error {
    /// A value did not have the expected type.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// A statement descriptor cannot be rendered.
    #[error("invalid statement: {0}")]
    InvalidStatement(String),

    /// No dialect is known for the given driver name.
    #[error("unknown driver: {0}")]
    UnknownDriver(String),
}
