//! Class metadata and relation cardinality inference.
//!
//! Classes are described once with a [`ClassSchema`] and registered into a
//! [`MetaModel`]. Relation cardinality is never declared up front; it is
//! inferred from the shape (single or collection) of a relation and of its
//! reverse, then memoized:
//!
//! | own shape  | reverse shape | cardinality |
//! |------------|---------------|-------------|
//! | single     | single        | one-to-one  |
//! | single     | collection    | many-to-one |
//! | collection | single        | one-to-many |
//! | collection | collection    | many-to-many|

mod model;
mod object;
mod property;
mod schema;

pub use model::{foreign_key_column, join_table, owns_one_to_one, MetaModel};
pub use object::MetaObject;
pub use property::{
    Cardinality, MetaProperty, PropertyKind, RelationInfo, RelationMapping, RelationShape,
    RelationStorage, Strength,
};
pub use schema::{
    ClassSchema, Dependency, FieldSchema, RelationSchema, DEFAULT_PRIMARY_KEY, LOCK_COLUMN,
    REVISION_COLUMN,
};
