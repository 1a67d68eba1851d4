//! Property metadata.

use std::sync::{Arc, OnceLock};

use ormlink_query::SqlType;
use serde::{Deserialize, Serialize};

/// Multiplicity of a relation, seen from the side that declares it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cardinality {
    /// Not computable yet: the target class is not registered.
    Unknown,
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

impl Cardinality {
    /// Infer the cardinality from the shapes of a relation and its reverse.
    pub fn from_shapes(own: RelationShape, reverse: RelationShape) -> Self {
        match (own, reverse) {
            (RelationShape::Single, RelationShape::Single) => Cardinality::OneToOne,
            (RelationShape::Single, RelationShape::Collection) => Cardinality::ManyToOne,
            (RelationShape::Collection, RelationShape::Single) => Cardinality::OneToMany,
            (RelationShape::Collection, RelationShape::Collection) => Cardinality::ManyToMany,
        }
    }

    /// The cardinality the reverse relation must have.
    pub fn complement(self) -> Self {
        match self {
            Cardinality::OneToMany => Cardinality::ManyToOne,
            Cardinality::ManyToOne => Cardinality::OneToMany,
            other => other,
        }
    }

    /// True when this side holds a collection of targets.
    pub fn is_to_many(self) -> bool {
        matches!(self, Cardinality::OneToMany | Cardinality::ManyToMany)
    }
}

/// Declared shape of a relation property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationShape {
    /// At most one target.
    Single,
    /// Any number of targets.
    Collection,
}

/// Whether a relation keeps its targets alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Strength {
    /// Targets are looked up again once nothing else holds them.
    #[default]
    Weak,
    /// Targets are owned for the lifetime of the declaring object.
    Strong,
}

/// Relation-specific metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationInfo {
    pub target_class: String,
    pub shape: RelationShape,
    /// Explicit reverse relation name, if annotated.
    pub reverse: Option<String>,
    /// Explicitly declared cardinality, checked against the inferred one.
    pub declared: Option<Cardinality>,
    pub strength: Strength,
}

/// What kind of value a property holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyKind {
    Scalar(SqlType),
    Relation(RelationInfo),
}

/// Where the rows of a relation are linked in storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationStorage {
    /// This class's table holds the foreign key column.
    OwnColumn { table: String, column: String },
    /// The target's table holds a foreign key column pointing back.
    ReverseColumn { table: String, column: String },
    /// A join table holds one row per related pair.
    JoinTable {
        table: String,
        own_column: String,
        other_column: String,
    },
}

/// Fully resolved storage mapping of one relation property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationMapping {
    pub class: String,
    pub property: String,
    pub target_class: String,
    pub target_table: String,
    pub reverse: String,
    pub cardinality: Cardinality,
    pub storage: RelationStorage,
}

impl RelationMapping {
    /// Whether this side's table owns the foreign key column.
    pub fn has_table_foreign_key(&self) -> bool {
        matches!(self.storage, RelationStorage::OwnColumn { .. })
    }
}

/// One stored field or relation of a class.
#[derive(Debug)]
pub struct MetaProperty {
    name: String,
    owner: String,
    index: usize,
    kind: PropertyKind,
    transient: bool,
    pub(crate) cardinality: OnceLock<Cardinality>,
    pub(crate) mapping: OnceLock<Arc<RelationMapping>>,
}

impl MetaProperty {
    pub(crate) fn new(
        name: impl Into<String>,
        owner: impl Into<String>,
        index: usize,
        kind: PropertyKind,
        transient: bool,
    ) -> Self {
        Self {
            name: name.into(),
            owner: owner.into(),
            index,
            kind,
            transient,
            cardinality: OnceLock::new(),
            mapping: OnceLock::new(),
        }
    }

    /// Property name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Class that declares this property.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Position among the class's scalar fields or among its relations.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn kind(&self) -> &PropertyKind {
        &self.kind
    }

    pub fn is_relation(&self) -> bool {
        matches!(self.kind, PropertyKind::Relation(_))
    }

    /// Transient fields live in memory only.
    pub fn is_transient(&self) -> bool {
        self.transient
    }

    /// Relation metadata, if this is a relation.
    pub fn relation(&self) -> Option<&RelationInfo> {
        match &self.kind {
            PropertyKind::Relation(info) => Some(info),
            PropertyKind::Scalar(_) => None,
        }
    }

    /// Column type, if this is a scalar field.
    pub fn sql_type(&self) -> Option<SqlType> {
        match &self.kind {
            PropertyKind::Scalar(ty) => Some(*ty),
            PropertyKind::Relation(_) => None,
        }
    }

    /// Column name of a scalar field.
    pub fn column_name(&self) -> &str {
        &self.name
    }

    /// The memoized cardinality, if it has been resolved.
    pub fn resolved_cardinality(&self) -> Option<Cardinality> {
        self.cardinality.get().copied()
    }

    /// The memoized storage mapping, if it has been resolved.
    pub fn resolved_mapping(&self) -> Option<&Arc<RelationMapping>> {
        self.mapping.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cardinality_from_shapes() {
        use RelationShape::*;
        assert_eq!(Cardinality::from_shapes(Single, Single), Cardinality::OneToOne);
        assert_eq!(Cardinality::from_shapes(Single, Collection), Cardinality::ManyToOne);
        assert_eq!(Cardinality::from_shapes(Collection, Single), Cardinality::OneToMany);
        assert_eq!(
            Cardinality::from_shapes(Collection, Collection),
            Cardinality::ManyToMany
        );
    }

    #[test]
    fn test_complement_is_involution() {
        for c in [
            Cardinality::OneToOne,
            Cardinality::OneToMany,
            Cardinality::ManyToOne,
            Cardinality::ManyToMany,
        ] {
            assert_eq!(c.complement().complement(), c);
        }
        assert_eq!(Cardinality::OneToMany.complement(), Cardinality::ManyToOne);
    }
}
