//! Type-erased class declarations fed into the [`MetaModel`](super::MetaModel).

use ormlink_query::SqlType;

use super::property::{Cardinality, RelationInfo, RelationShape, Strength};

/// Default primary key column.
pub const DEFAULT_PRIMARY_KEY: &str = "id";

/// Column holding the optimistic-concurrency revision counter.
pub const REVISION_COLUMN: &str = "revision";

/// Column holding the id of the advisory lock row, if any.
pub const LOCK_COLUMN: &str = "lock_id";

/// A scalar field declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSchema {
    pub name: String,
    pub ty: SqlType,
    pub transient: bool,
}

/// A relation declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationSchema {
    pub name: String,
    pub info: RelationInfo,
}

impl RelationSchema {
    /// A relation holding at most one target.
    pub fn single(name: impl Into<String>, target_class: impl Into<String>) -> Self {
        Self::new(name, target_class, RelationShape::Single)
    }

    /// A relation holding any number of targets.
    pub fn collection(name: impl Into<String>, target_class: impl Into<String>) -> Self {
        Self::new(name, target_class, RelationShape::Collection)
    }

    fn new(name: impl Into<String>, target_class: impl Into<String>, shape: RelationShape) -> Self {
        Self {
            name: name.into(),
            info: RelationInfo {
                target_class: target_class.into(),
                shape,
                reverse: None,
                declared: None,
                strength: Strength::Weak,
            },
        }
    }

    /// Name the reverse relation explicitly.
    pub fn with_reverse(mut self, reverse: impl Into<String>) -> Self {
        self.info.reverse = Some(reverse.into());
        self
    }

    /// Declare the expected cardinality; wiring fails if the shapes disagree.
    pub fn with_cardinality(mut self, cardinality: Cardinality) -> Self {
        self.info.declared = Some(cardinality);
        self
    }

    /// Keep targets alive for the lifetime of the declaring object.
    pub fn strong(mut self) -> Self {
        self.info.strength = Strength::Strong;
        self
    }
}

/// "`dependent` is recomputed from `source` of the targets of `relation`".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub dependent: String,
    pub relation: String,
    pub source: String,
}

/// Everything the engine needs to know about a class.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassSchema {
    pub class: String,
    pub primary_key: String,
    pub fields: Vec<FieldSchema>,
    pub relations: Vec<RelationSchema>,
    pub dependencies: Vec<Dependency>,
}

impl ClassSchema {
    /// Create an empty declaration for `class`.
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            primary_key: DEFAULT_PRIMARY_KEY.to_string(),
            fields: Vec::new(),
            relations: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    /// Use a different primary key column name.
    pub fn with_primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = column.into();
        self
    }

    /// Add a stored scalar field.
    pub fn with_field(mut self, name: impl Into<String>, ty: SqlType) -> Self {
        self.fields.push(FieldSchema {
            name: name.into(),
            ty,
            transient: false,
        });
        self
    }

    /// Add an in-memory-only field.
    pub fn with_transient_field(mut self, name: impl Into<String>, ty: SqlType) -> Self {
        self.fields.push(FieldSchema {
            name: name.into(),
            ty,
            transient: true,
        });
        self
    }

    /// Add a relation.
    pub fn with_relation(mut self, relation: RelationSchema) -> Self {
        self.relations.push(relation);
        self
    }

    /// Add a computed-property dependency.
    pub fn with_dependency(
        mut self,
        dependent: impl Into<String>,
        relation: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        self.dependencies.push(Dependency {
            dependent: dependent.into(),
            relation: relation.into(),
            source: source.into(),
        });
        self
    }

    /// Default table name: the lower-cased class name.
    pub fn table_name(&self) -> String {
        self.class.to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_builder() {
        let schema = ClassSchema::new("Parent")
            .with_field("name", SqlType::Text)
            .with_transient_field("summary", SqlType::Text)
            .with_relation(
                RelationSchema::collection("children", "Child")
                    .with_reverse("parent")
                    .strong(),
            )
            .with_dependency("summary", "children", "name");

        assert_eq!(schema.table_name(), "parent");
        assert_eq!(schema.primary_key, "id");
        assert_eq!(schema.fields.len(), 2);
        assert!(schema.fields[1].transient);

        let rel = &schema.relations[0];
        assert_eq!(rel.info.shape, RelationShape::Collection);
        assert_eq!(rel.info.reverse.as_deref(), Some("parent"));
        assert_eq!(rel.info.strength, Strength::Strong);
        assert_eq!(schema.dependencies[0].source, "name");
    }
}
