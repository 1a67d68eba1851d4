//! Typed class descriptors.

use ormlink_query::{SqlType, Value};

use crate::meta::{ClassSchema, RelationSchema};

/// Reads a field out of an entity.
pub type Getter<T> = fn(&T) -> Value;

/// Writes a field into an entity.
pub type Setter<T> = fn(&mut T, Value) -> Result<(), ormlink_query::Error>;

/// Recomputes `dependent` from the source values of the related objects.
pub type Recompute<T> = fn(&mut T, &str, &[Value]);

/// A persistable class.
///
/// Entities are plain structs holding scalar fields. Relations are declared
/// on the descriptor and live beside the struct in the persistent wrapper.
pub trait Entity: Default + Send + Sync + 'static {
    /// Describe the class once; called at registration.
    fn descriptor() -> ClassDescriptor<Self>;
}

/// Accessor pair of one scalar field.
pub struct FieldDescriptor<T> {
    pub name: String,
    pub ty: SqlType,
    pub get: Getter<T>,
    pub set: Setter<T>,
    pub transient: bool,
}

impl<T> Clone for FieldDescriptor<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            ty: self.ty,
            get: self.get,
            set: self.set,
            transient: self.transient,
        }
    }
}

impl<T> std::fmt::Debug for FieldDescriptor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("ty", &self.ty)
            .field("transient", &self.transient)
            .finish()
    }
}

/// Schema plus accessors for an entity type.
///
/// ```
/// use ormlink_core::entity::{ClassDescriptor, Entity};
/// use ormlink_core::meta::RelationSchema;
/// use ormlink_query::SqlType;
///
/// #[derive(Default)]
/// struct Parent {
///     name: String,
/// }
///
/// impl Entity for Parent {
///     fn descriptor() -> ClassDescriptor<Self> {
///         ClassDescriptor::<Self>::new("Parent")
///             .field(
///                 "name",
///                 SqlType::Text,
///                 |p| p.name.clone().into(),
///                 |p, v| {
///                     p.name = v.try_into()?;
///                     Ok(())
///                 },
///             )
///             .relation(RelationSchema::collection("children", "Child").strong())
///     }
/// }
///
/// assert_eq!(Parent::descriptor().schema().table_name(), "parent");
/// ```
pub struct ClassDescriptor<T> {
    schema: ClassSchema,
    fields: Vec<FieldDescriptor<T>>,
    recompute: Option<Recompute<T>>,
}

impl<T> ClassDescriptor<T> {
    /// Start describing `class`.
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            schema: ClassSchema::new(class),
            fields: Vec::new(),
            recompute: None,
        }
    }

    /// Use a different primary key column name.
    pub fn with_primary_key(mut self, column: impl Into<String>) -> Self {
        self.schema = self.schema.with_primary_key(column);
        self
    }

    /// Add a stored scalar field.
    pub fn field(
        mut self,
        name: impl Into<String>,
        ty: SqlType,
        get: Getter<T>,
        set: Setter<T>,
    ) -> Self {
        let name = name.into();
        self.schema = self.schema.with_field(name.clone(), ty);
        self.fields.push(FieldDescriptor {
            name,
            ty,
            get,
            set,
            transient: false,
        });
        self
    }

    /// Add a field that is never written to storage, typically a computed one.
    pub fn transient_field(
        mut self,
        name: impl Into<String>,
        ty: SqlType,
        get: Getter<T>,
        set: Setter<T>,
    ) -> Self {
        let name = name.into();
        self.schema = self.schema.with_transient_field(name.clone(), ty);
        self.fields.push(FieldDescriptor {
            name,
            ty,
            get,
            set,
            transient: true,
        });
        self
    }

    /// Add a relation.
    pub fn relation(mut self, relation: RelationSchema) -> Self {
        self.schema = self.schema.with_relation(relation);
        self
    }

    /// Recompute `dependent` whenever `relation` changes or the `source`
    /// field of one of its targets is reported changed.
    pub fn depends_on(
        mut self,
        dependent: impl Into<String>,
        relation: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        self.schema = self.schema.with_dependency(dependent, relation, source);
        self
    }

    /// Function computing dependent fields.
    pub fn recompute_with(mut self, recompute: Recompute<T>) -> Self {
        self.recompute = Some(recompute);
        self
    }

    /// The type-erased schema.
    pub fn schema(&self) -> &ClassSchema {
        &self.schema
    }

    /// Field accessors in declaration order.
    pub fn fields(&self) -> &[FieldDescriptor<T>] {
        &self.fields
    }

    pub(crate) fn into_parts(self) -> (ClassSchema, EntityBinding<T>) {
        let binding = EntityBinding {
            fields: self.fields,
            recompute: self.recompute,
        };
        (self.schema, binding)
    }
}

/// Runtime accessors shared by every instance of a class.
pub(crate) struct EntityBinding<T> {
    pub(crate) fields: Vec<FieldDescriptor<T>>,
    pub(crate) recompute: Option<Recompute<T>>,
}

impl<T> EntityBinding<T> {
    pub(crate) fn stored(&self) -> impl Iterator<Item = &FieldDescriptor<T>> {
        self.fields.iter().filter(|f| !f.transient)
    }

    pub(crate) fn field(&self, name: &str) -> Option<&FieldDescriptor<T>> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counter {
        label: String,
        hits: i64,
        total: i64,
    }

    fn describe() -> ClassDescriptor<Counter> {
        ClassDescriptor::<Counter>::new("Counter")
            .field(
                "label",
                SqlType::Text,
                |c| c.label.clone().into(),
                |c, v| {
                    c.label = v.try_into()?;
                    Ok(())
                },
            )
            .field(
                "hits",
                SqlType::Int64,
                |c| c.hits.into(),
                |c, v| {
                    c.hits = v.try_into()?;
                    Ok(())
                },
            )
            .transient_field(
                "total",
                SqlType::Int64,
                |c| c.total.into(),
                |c, v| {
                    c.total = v.try_into()?;
                    Ok(())
                },
            )
    }

    #[test]
    fn test_descriptor_keeps_schema_and_accessors_aligned() {
        let descriptor = describe();
        let names: Vec<_> = descriptor.schema().fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["label", "hits", "total"]);
        assert_eq!(descriptor.fields().len(), 3);

        let (schema, binding) = descriptor.into_parts();
        assert_eq!(schema.class, "Counter");
        let stored: Vec<_> = binding.stored().map(|f| f.name.as_str()).collect();
        assert_eq!(stored, vec!["label", "hits"]);
    }

    #[test]
    fn test_accessors() {
        let (_, binding) = describe().into_parts();
        let mut counter = Counter::default();
        let hits = binding.field("hits").unwrap();
        (hits.set)(&mut counter, Value::Int64(4)).unwrap();
        assert_eq!((hits.get)(&counter), Value::Int64(4));

        let label = binding.field("label").unwrap();
        assert!((label.set)(&mut counter, Value::Int64(1)).is_err());
        assert_eq!(counter.label, "");
    }
}
