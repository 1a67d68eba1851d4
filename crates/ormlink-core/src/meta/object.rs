//! Per-class metadata.

use std::sync::Arc;

use super::property::MetaProperty;
use super::schema::Dependency;

/// Metadata of one persistable class.
///
/// Built once at registration and never mutated afterwards; relation
/// mappings are memoized inside the properties.
#[derive(Debug)]
pub struct MetaObject {
    class: String,
    table: String,
    primary_key: String,
    fields: Vec<Arc<MetaProperty>>,
    relations: Vec<Arc<MetaProperty>>,
    dependencies: Vec<Dependency>,
}

impl MetaObject {
    pub(crate) fn new(
        class: String,
        table: String,
        primary_key: String,
        fields: Vec<Arc<MetaProperty>>,
        relations: Vec<Arc<MetaProperty>>,
        dependencies: Vec<Dependency>,
    ) -> Self {
        Self {
            class,
            table,
            primary_key,
            fields,
            relations,
            dependencies,
        }
    }

    /// Class identifier.
    pub fn class(&self) -> &str {
        &self.class
    }

    /// Table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Primary key column.
    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// All scalar fields in declaration order, transient ones included.
    pub fn fields(&self) -> &[Arc<MetaProperty>] {
        &self.fields
    }

    /// Scalar fields backed by a column.
    pub fn stored_fields(&self) -> impl Iterator<Item = &Arc<MetaProperty>> {
        self.fields.iter().filter(|f| !f.is_transient())
    }

    /// Column names of the stored fields, in order.
    pub fn stored_columns(&self) -> Vec<String> {
        self.stored_fields()
            .map(|f| f.column_name().to_string())
            .collect()
    }

    /// Relation properties in declaration order.
    pub fn relations(&self) -> &[Arc<MetaProperty>] {
        &self.relations
    }

    /// Look up a scalar field by name.
    pub fn field(&self, name: &str) -> Option<&Arc<MetaProperty>> {
        self.fields.iter().find(|f| f.name() == name)
    }

    /// Look up a relation by name.
    pub fn relation(&self, name: &str) -> Option<&Arc<MetaProperty>> {
        self.relations.iter().find(|r| r.name() == name)
    }

    /// Look up any property by name.
    pub fn property(&self, name: &str) -> Option<&Arc<MetaProperty>> {
        self.field(name).or_else(|| self.relation(name))
    }

    /// Computed-property dependencies declared by this class.
    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    /// Dependencies recomputed when `relation` changes.
    pub fn dependencies_on_relation<'a>(
        &'a self,
        relation: &'a str,
    ) -> impl Iterator<Item = &'a Dependency> + 'a {
        self.dependencies
            .iter()
            .filter(move |d| d.relation == relation)
    }
}
