//! The class registry and relation resolution.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, instrument};

use super::object::MetaObject;
use super::property::{
    Cardinality, MetaProperty, PropertyKind, RelationMapping, RelationStorage, Strength,
};
use super::schema::{ClassSchema, LOCK_COLUMN, REVISION_COLUMN};
use crate::error::SchemaError;

/// Name of the foreign key column created for an owning relation property.
pub fn foreign_key_column(property: &str) -> String {
    format!("{property}_id")
}

/// Deterministic join table layout for a many-to-many pair.
///
/// Returns `(table, column for side a, column for side b)`. Either side
/// computes the same table name because the pairs are sorted first.
pub fn join_table(
    a_table: &str,
    a_property: &str,
    b_table: &str,
    b_property: &str,
) -> (String, String, String) {
    let a = (a_table, a_property);
    let b = (b_table, b_property);
    let (first, second) = if a <= b { (a, b) } else { (b, a) };
    let name = format!("{}_{}_{}_{}", first.0, first.1, second.0, second.1);
    (
        name,
        format!("{a_table}_{a_property}_id"),
        format!("{b_table}_{b_property}_id"),
    )
}

/// Whether side `a` owns the foreign key of a one-to-one pair.
///
/// The lexicographically smaller table owns it; for a self-referencing
/// class the smaller property name breaks the tie.
pub fn owns_one_to_one(a_table: &str, a_property: &str, b_table: &str, b_property: &str) -> bool {
    (a_table, a_property) < (b_table, b_property)
}

#[derive(Default)]
struct Registry {
    classes: HashMap<String, Arc<MetaObject>>,
    tables: HashMap<String, String>,
    wired: bool,
}

/// Process-scoped registry of class metadata.
///
/// Classes are registered one by one, then [`wire`](MetaModel::wire) checks
/// every relation pair at once. Until then a relation whose target class is
/// missing reports [`Cardinality::Unknown`]; afterwards the same situation is
/// an [`SchemaError::UnregisteredClass`] error.
#[derive(Default)]
pub struct MetaModel {
    registry: RwLock<Registry>,
}

impl MetaModel {
    /// Create an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a class and return its metadata.
    #[instrument(skip(self, schema), fields(class = %schema.class))]
    pub fn register(&self, schema: ClassSchema) -> Result<Arc<MetaObject>, SchemaError> {
        let table = schema.table_name();
        let mut registry = self.registry.write();

        if registry.classes.contains_key(&schema.class) {
            return Err(SchemaError::DuplicateClass(schema.class));
        }
        if let Some(existing) = registry.tables.get(&table) {
            return Err(SchemaError::DuplicateTable {
                table,
                class: schema.class,
                existing: existing.clone(),
            });
        }

        let reserved = [schema.primary_key.as_str(), REVISION_COLUMN, LOCK_COLUMN];
        let mut seen = HashSet::new();
        let names = schema
            .fields
            .iter()
            .map(|f| &f.name)
            .chain(schema.relations.iter().map(|r| &r.name));
        for name in names {
            if !seen.insert(name.as_str()) {
                return Err(SchemaError::DuplicateProperty {
                    class: schema.class.clone(),
                    property: name.clone(),
                });
            }
            if reserved.contains(&name.as_str()) {
                return Err(SchemaError::ReservedColumn {
                    class: schema.class.clone(),
                    property: name.clone(),
                });
            }
        }

        let fields = schema
            .fields
            .iter()
            .enumerate()
            .map(|(i, f)| {
                Arc::new(MetaProperty::new(
                    f.name.clone(),
                    schema.class.clone(),
                    i,
                    PropertyKind::Scalar(f.ty),
                    f.transient,
                ))
            })
            .collect();
        let relations = schema
            .relations
            .iter()
            .enumerate()
            .map(|(i, r)| {
                Arc::new(MetaProperty::new(
                    r.name.clone(),
                    schema.class.clone(),
                    i,
                    PropertyKind::Relation(r.info.clone()),
                    false,
                ))
            })
            .collect();

        let meta = Arc::new(MetaObject::new(
            schema.class.clone(),
            table.clone(),
            schema.primary_key,
            fields,
            relations,
            schema.dependencies,
        ));

        registry.tables.insert(table.clone(), schema.class.clone());
        registry.classes.insert(schema.class.clone(), meta.clone());
        registry.wired = false;

        debug!(table = %table, "registered class");
        Ok(meta)
    }

    /// Look up a registered class.
    pub fn meta_object(&self, class: &str) -> Result<Arc<MetaObject>, SchemaError> {
        self.registry
            .read()
            .classes
            .get(class)
            .cloned()
            .ok_or_else(|| SchemaError::UnregisteredClass(class.to_string()))
    }

    /// All registered classes, ordered by class name.
    pub fn classes(&self) -> Vec<Arc<MetaObject>> {
        let mut classes: Vec<_> = self.registry.read().classes.values().cloned().collect();
        classes.sort_by(|a, b| a.class().cmp(b.class()));
        classes
    }

    /// Whether [`wire`](Self::wire) has completed since the last registration.
    pub fn is_wired(&self) -> bool {
        self.registry.read().wired
    }

    /// Cardinality of a relation property, memoized once known.
    pub fn cardinality(&self, class: &str, property: &str) -> Result<Cardinality, SchemaError> {
        let registry = self.registry.read();
        let (meta, prop) = relation_property(&registry, class, property)?;
        cardinality_in(&registry, &meta, &prop)
    }

    /// The reverse relation property, or `None` while its class is unregistered.
    pub fn reverse_of(
        &self,
        class: &str,
        property: &str,
    ) -> Result<Option<Arc<MetaProperty>>, SchemaError> {
        let registry = self.registry.read();
        let (meta, prop) = relation_property(&registry, class, property)?;
        find_reverse(&registry, &meta, &prop)
    }

    /// Storage mapping of a relation property, memoized once known.
    pub fn mapping(&self, class: &str, property: &str) -> Result<Arc<RelationMapping>, SchemaError> {
        let registry = self.registry.read();
        let (meta, prop) = relation_property(&registry, class, property)?;
        mapping_in(&registry, &meta, &prop)
    }

    /// Whether this side's table carries the foreign key column.
    pub fn has_table_foreign_key(&self, class: &str, property: &str) -> Result<bool, SchemaError> {
        Ok(self.mapping(class, property)?.has_table_foreign_key())
    }

    /// Finish registration and check every relation pair.
    ///
    /// Fails on the first unregistered target, missing or ambiguous
    /// reverse, asymmetric pair, cardinality disagreement, strong cycle,
    /// column collision or dangling dependency.
    #[instrument(skip(self))]
    pub fn wire(&self) -> Result<(), SchemaError> {
        let mut registry = self.registry.write();
        registry.wired = true;
        let result = validate(&registry);
        if result.is_err() {
            registry.wired = false;
        } else {
            info!(classes = registry.classes.len(), "meta model wired");
        }
        result
    }
}

fn relation_property(
    registry: &Registry,
    class: &str,
    property: &str,
) -> Result<(Arc<MetaObject>, Arc<MetaProperty>), SchemaError> {
    let meta = registry
        .classes
        .get(class)
        .cloned()
        .ok_or_else(|| SchemaError::UnregisteredClass(class.to_string()))?;
    let prop = meta
        .relation(property)
        .cloned()
        .ok_or_else(|| SchemaError::UnknownRelation {
            class: class.to_string(),
            property: property.to_string(),
        })?;
    Ok((meta, prop))
}

fn relation_info(prop: &MetaProperty) -> &super::property::RelationInfo {
    match prop.kind() {
        PropertyKind::Relation(info) => info,
        PropertyKind::Scalar(_) => unreachable!("relation list only holds relations"),
    }
}

fn find_reverse(
    registry: &Registry,
    meta: &MetaObject,
    prop: &Arc<MetaProperty>,
) -> Result<Option<Arc<MetaProperty>>, SchemaError> {
    let info = relation_info(prop);
    let Some(target) = registry.classes.get(&info.target_class) else {
        if registry.wired {
            return Err(SchemaError::UnregisteredClass(info.target_class.clone()));
        }
        return Ok(None);
    };

    if let Some(reverse) = &info.reverse {
        let candidate = target
            .relation(reverse)
            .filter(|r| relation_info(r).target_class == meta.class())
            .ok_or_else(|| SchemaError::UnknownReverseRelation {
                class: meta.class().to_string(),
                property: prop.name().to_string(),
                target: target.class().to_string(),
                reverse: reverse.clone(),
            })?;
        if Arc::ptr_eq(candidate, prop) {
            return Err(SchemaError::SelfReverse {
                class: meta.class().to_string(),
                property: prop.name().to_string(),
            });
        }
        return Ok(Some(candidate.clone()));
    }

    let candidates: Vec<&Arc<MetaProperty>> = target
        .relations()
        .iter()
        .filter(|r| !Arc::ptr_eq(r, prop))
        .filter(|r| {
            let other = relation_info(r);
            other.target_class == meta.class()
                && other.reverse.as_deref().map_or(true, |name| name == prop.name())
        })
        .collect();

    match candidates.as_slice() {
        [] => Err(SchemaError::NoReverseRelation {
            class: meta.class().to_string(),
            property: prop.name().to_string(),
            target: target.class().to_string(),
        }),
        [single] => Ok(Some((*single).clone())),
        many => Err(SchemaError::AmbiguousReverseRelation {
            class: meta.class().to_string(),
            property: prop.name().to_string(),
            candidates: many.iter().map(|r| r.name().to_string()).collect(),
        }),
    }
}

fn cardinality_in(
    registry: &Registry,
    meta: &MetaObject,
    prop: &Arc<MetaProperty>,
) -> Result<Cardinality, SchemaError> {
    if let Some(cardinality) = prop.cardinality.get() {
        return Ok(*cardinality);
    }
    let Some(reverse) = find_reverse(registry, meta, prop)? else {
        return Ok(Cardinality::Unknown);
    };

    let info = relation_info(prop);
    let cardinality = Cardinality::from_shapes(info.shape, relation_info(&reverse).shape);
    if let Some(declared) = info.declared {
        if declared != cardinality {
            return Err(SchemaError::CardinalityMismatch {
                class: meta.class().to_string(),
                property: prop.name().to_string(),
                declared,
                found: cardinality,
            });
        }
    }

    let _ = prop.cardinality.set(cardinality);
    Ok(cardinality)
}

fn mapping_in(
    registry: &Registry,
    meta: &MetaObject,
    prop: &Arc<MetaProperty>,
) -> Result<Arc<RelationMapping>, SchemaError> {
    if let Some(mapping) = prop.mapping.get() {
        return Ok(mapping.clone());
    }

    let unresolved = || SchemaError::CardinalityUnresolved {
        class: meta.class().to_string(),
        property: prop.name().to_string(),
    };
    let reverse = find_reverse(registry, meta, prop)?.ok_or_else(unresolved)?;
    let cardinality = cardinality_in(registry, meta, prop)?;
    let target = registry
        .classes
        .get(&relation_info(prop).target_class)
        .ok_or_else(unresolved)?;

    let storage = match cardinality {
        Cardinality::Unknown => return Err(unresolved()),
        Cardinality::ManyToOne => RelationStorage::OwnColumn {
            table: meta.table().to_string(),
            column: foreign_key_column(prop.name()),
        },
        Cardinality::OneToMany => RelationStorage::ReverseColumn {
            table: target.table().to_string(),
            column: foreign_key_column(reverse.name()),
        },
        Cardinality::OneToOne => {
            if owns_one_to_one(meta.table(), prop.name(), target.table(), reverse.name()) {
                RelationStorage::OwnColumn {
                    table: meta.table().to_string(),
                    column: foreign_key_column(prop.name()),
                }
            } else {
                RelationStorage::ReverseColumn {
                    table: target.table().to_string(),
                    column: foreign_key_column(reverse.name()),
                }
            }
        }
        Cardinality::ManyToMany => {
            let (table, own_column, other_column) =
                join_table(meta.table(), prop.name(), target.table(), reverse.name());
            RelationStorage::JoinTable {
                table,
                own_column,
                other_column,
            }
        }
    };

    let mapping = Arc::new(RelationMapping {
        class: meta.class().to_string(),
        property: prop.name().to_string(),
        target_class: target.class().to_string(),
        target_table: target.table().to_string(),
        reverse: reverse.name().to_string(),
        cardinality,
        storage,
    });
    Ok(prop.mapping.get_or_init(|| mapping).clone())
}

fn validate(registry: &Registry) -> Result<(), SchemaError> {
    let mut classes: Vec<&Arc<MetaObject>> = registry.classes.values().collect();
    classes.sort_by(|a, b| a.class().cmp(b.class()));

    // table -> columns produced on it
    let mut columns: HashMap<String, HashSet<String>> = HashMap::new();
    for meta in &classes {
        let set = columns.entry(meta.table().to_string()).or_default();
        for column in [meta.primary_key(), REVISION_COLUMN, LOCK_COLUMN] {
            set.insert(column.to_string());
        }
        for field in meta.stored_fields() {
            set.insert(field.column_name().to_string());
        }
    }
    let mut join_tables: HashMap<String, (String, String)> = HashMap::new();

    for meta in &classes {
        for prop in meta.relations() {
            let reverse = find_reverse(registry, meta, prop)?.ok_or_else(|| {
                SchemaError::CardinalityUnresolved {
                    class: meta.class().to_string(),
                    property: prop.name().to_string(),
                }
            })?;
            let target = registry
                .classes
                .get(&relation_info(prop).target_class)
                .ok_or_else(|| {
                    SchemaError::UnregisteredClass(relation_info(prop).target_class.clone())
                })?;

            let back = find_reverse(registry, target, &reverse)?;
            if !back.is_some_and(|b| Arc::ptr_eq(&b, prop)) {
                return Err(SchemaError::ReverseMismatch {
                    class: meta.class().to_string(),
                    property: prop.name().to_string(),
                    target: target.class().to_string(),
                    reverse: reverse.name().to_string(),
                });
            }

            if relation_info(prop).strength == Strength::Strong
                && relation_info(&reverse).strength == Strength::Strong
            {
                return Err(SchemaError::StrongCycle {
                    class: meta.class().to_string(),
                    property: prop.name().to_string(),
                });
            }

            let cardinality = cardinality_in(registry, meta, prop)?;
            let reverse_cardinality = cardinality_in(registry, target, &reverse)?;
            if reverse_cardinality != cardinality.complement() {
                return Err(SchemaError::CardinalityMismatch {
                    class: target.class().to_string(),
                    property: reverse.name().to_string(),
                    declared: cardinality.complement(),
                    found: reverse_cardinality,
                });
            }

            let mapping = mapping_in(registry, meta, prop)?;
            match &mapping.storage {
                RelationStorage::OwnColumn { table, column } => {
                    let set = columns.entry(table.clone()).or_default();
                    if !set.insert(column.clone()) {
                        return Err(SchemaError::ColumnCollision {
                            table: table.clone(),
                            column: column.clone(),
                        });
                    }
                }
                RelationStorage::ReverseColumn { .. } => {}
                RelationStorage::JoinTable {
                    table,
                    own_column,
                    other_column,
                } => {
                    if let Some(class) = registry.tables.get(table) {
                        return Err(SchemaError::DuplicateTable {
                            table: table.clone(),
                            class: format!("{}.{}", meta.class(), prop.name()),
                            existing: class.clone(),
                        });
                    }
                    if own_column == other_column {
                        return Err(SchemaError::ColumnCollision {
                            table: table.clone(),
                            column: own_column.clone(),
                        });
                    }
                    let pair = if own_column < other_column {
                        (own_column.clone(), other_column.clone())
                    } else {
                        (other_column.clone(), own_column.clone())
                    };
                    match join_tables.entry(table.clone()) {
                        Entry::Occupied(existing) if *existing.get() != pair => {
                            return Err(SchemaError::DuplicateTable {
                                table: table.clone(),
                                class: format!("{}.{}", meta.class(), prop.name()),
                                existing: format!("{} / {}", existing.get().0, existing.get().1),
                            });
                        }
                        Entry::Occupied(_) => {}
                        Entry::Vacant(slot) => {
                            slot.insert(pair);
                        }
                    }
                }
            }
        }

        for dependency in meta.dependencies() {
            let unknown = || SchemaError::UnknownDependency {
                class: meta.class().to_string(),
                dependent: dependency.dependent.clone(),
            };
            meta.field(&dependency.dependent).ok_or_else(unknown)?;
            let relation = meta.relation(&dependency.relation).ok_or_else(unknown)?;
            let target = registry
                .classes
                .get(&relation_info(relation).target_class)
                .ok_or_else(unknown)?;
            target.field(&dependency.source).ok_or_else(unknown)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::schema::RelationSchema;
    use ormlink_query::SqlType;

    fn parent() -> ClassSchema {
        ClassSchema::new("Parent")
            .with_field("name", SqlType::Text)
            .with_relation(RelationSchema::collection("children", "Child").strong())
    }

    fn child() -> ClassSchema {
        ClassSchema::new("Child")
            .with_field("name", SqlType::Text)
            .with_relation(RelationSchema::single("parent", "Parent"))
    }

    #[test]
    fn test_unknown_until_wired() {
        let model = MetaModel::new();
        model.register(parent()).unwrap();

        assert_eq!(
            model.cardinality("Parent", "children").unwrap(),
            Cardinality::Unknown
        );
        assert!(matches!(
            model.wire(),
            Err(SchemaError::UnregisteredClass(class)) if class == "Child"
        ));
        assert!(!model.is_wired());
    }

    #[test]
    fn test_one_to_many_inference_and_ownership() {
        let model = MetaModel::new();
        model.register(parent()).unwrap();
        model.register(child()).unwrap();
        model.wire().unwrap();

        assert_eq!(
            model.cardinality("Parent", "children").unwrap(),
            Cardinality::OneToMany
        );
        assert_eq!(
            model.cardinality("Child", "parent").unwrap(),
            Cardinality::ManyToOne
        );
        assert!(!model.has_table_foreign_key("Parent", "children").unwrap());
        assert!(model.has_table_foreign_key("Child", "parent").unwrap());

        let mapping = model.mapping("Parent", "children").unwrap();
        assert_eq!(
            mapping.storage,
            RelationStorage::ReverseColumn {
                table: "child".into(),
                column: "parent_id".into()
            }
        );
        assert_eq!(mapping.reverse, "parent");
    }

    #[test]
    fn test_one_to_one_owner_is_order_independent() {
        let person = ClassSchema::new("Person")
            .with_relation(RelationSchema::single("profile", "Profile"));
        let profile = ClassSchema::new("Profile")
            .with_relation(RelationSchema::single("person", "Person"));

        let a = MetaModel::new();
        a.register(person.clone()).unwrap();
        a.register(profile.clone()).unwrap();
        a.wire().unwrap();

        let b = MetaModel::new();
        b.register(profile).unwrap();
        b.register(person).unwrap();
        b.wire().unwrap();

        for model in [&a, &b] {
            assert_eq!(
                model.cardinality("Person", "profile").unwrap(),
                Cardinality::OneToOne
            );
            assert!(model.has_table_foreign_key("Person", "profile").unwrap());
            assert!(!model.has_table_foreign_key("Profile", "person").unwrap());
        }
    }

    #[test]
    fn test_join_table_name_is_symmetric() {
        let (name_a, col_a, _) = join_table("parent", "tags", "tag", "parents");
        let (name_b, col_b, _) = join_table("tag", "parents", "parent", "tags");
        assert_eq!(name_a, name_b);
        assert_eq!(name_a, "parent_tags_tag_parents");
        assert_eq!(col_a, "parent_tags_id");
        assert_eq!(col_b, "tag_parents_id");
    }

    #[test]
    fn test_many_to_many_mapping() {
        let model = MetaModel::new();
        model
            .register(
                ClassSchema::new("Parent")
                    .with_relation(RelationSchema::collection("tags", "Tag")),
            )
            .unwrap();
        model
            .register(
                ClassSchema::new("Tag")
                    .with_relation(RelationSchema::collection("parents", "Parent")),
            )
            .unwrap();
        model.wire().unwrap();

        let a = model.mapping("Parent", "tags").unwrap();
        let b = model.mapping("Tag", "parents").unwrap();
        match (&a.storage, &b.storage) {
            (
                RelationStorage::JoinTable {
                    table: ta,
                    own_column: oa,
                    other_column: xa,
                },
                RelationStorage::JoinTable {
                    table: tb,
                    own_column: ob,
                    other_column: xb,
                },
            ) => {
                assert_eq!(ta, tb);
                assert_eq!(oa, xb);
                assert_eq!(xa, ob);
            }
            other => panic!("expected join tables, got {other:?}"),
        }
    }

    #[test]
    fn test_ambiguous_and_missing_reverse() {
        let model = MetaModel::new();
        model
            .register(
                ClassSchema::new("Parent")
                    .with_relation(RelationSchema::collection("children", "Child")),
            )
            .unwrap();
        model
            .register(
                ClassSchema::new("Child")
                    .with_relation(RelationSchema::single("mother", "Parent"))
                    .with_relation(RelationSchema::single("father", "Parent")),
            )
            .unwrap();
        assert!(matches!(
            model.wire(),
            Err(SchemaError::AmbiguousReverseRelation { .. })
        ));

        let model = MetaModel::new();
        model
            .register(
                ClassSchema::new("Parent")
                    .with_relation(RelationSchema::collection("children", "Child")),
            )
            .unwrap();
        model.register(ClassSchema::new("Child")).unwrap();
        assert!(matches!(
            model.cardinality("Parent", "children"),
            Err(SchemaError::NoReverseRelation { .. })
        ));
    }

    #[test]
    fn test_explicit_reverse_disambiguates() {
        let model = MetaModel::new();
        model
            .register(
                ClassSchema::new("Parent")
                    .with_relation(RelationSchema::collection("children", "Child").with_reverse("mother"))
                    .with_relation(RelationSchema::collection("stepchildren", "Child").with_reverse("father")),
            )
            .unwrap();
        model
            .register(
                ClassSchema::new("Child")
                    .with_relation(RelationSchema::single("mother", "Parent"))
                    .with_relation(RelationSchema::single("father", "Parent")),
            )
            .unwrap();
        model.wire().unwrap();

        assert_eq!(
            model.reverse_of("Child", "father").unwrap().unwrap().name(),
            "stepchildren"
        );
        assert_eq!(
            model.mapping("Parent", "children").unwrap().storage,
            RelationStorage::ReverseColumn {
                table: "child".into(),
                column: "mother_id".into()
            }
        );
    }

    #[test]
    fn test_declared_cardinality_mismatch() {
        let model = MetaModel::new();
        model
            .register(ClassSchema::new("Parent").with_relation(
                RelationSchema::collection("children", "Child")
                    .with_cardinality(Cardinality::ManyToMany),
            ))
            .unwrap();
        model.register(child()).unwrap();

        assert!(matches!(
            model.wire(),
            Err(SchemaError::CardinalityMismatch {
                declared: Cardinality::ManyToMany,
                found: Cardinality::OneToMany,
                ..
            })
        ));
    }

    #[test]
    fn test_registration_errors() {
        let model = MetaModel::new();
        model.register(parent()).unwrap();
        assert_eq!(
            model.register(parent()).unwrap_err(),
            SchemaError::DuplicateClass("Parent".into())
        );
        assert!(matches!(
            model.register(ClassSchema::new("PARENT")),
            Err(SchemaError::DuplicateTable { .. })
        ));
        assert!(matches!(
            model.register(ClassSchema::new("Other").with_field("revision", SqlType::Int64)),
            Err(SchemaError::ReservedColumn { .. })
        ));
        assert!(matches!(
            model.register(
                ClassSchema::new("Dup")
                    .with_field("x", SqlType::Int64)
                    .with_field("x", SqlType::Text)
            ),
            Err(SchemaError::DuplicateProperty { .. })
        ));
        assert_eq!(
            model.meta_object("Missing").unwrap_err(),
            SchemaError::UnregisteredClass("Missing".into())
        );
    }

    #[test]
    fn test_strong_cycle_and_column_collision() {
        let model = MetaModel::new();
        model.register(parent()).unwrap();
        model
            .register(
                ClassSchema::new("Child")
                    .with_relation(RelationSchema::single("parent", "Parent").strong()),
            )
            .unwrap();
        assert!(matches!(model.wire(), Err(SchemaError::StrongCycle { .. })));

        let model = MetaModel::new();
        model.register(parent()).unwrap();
        model
            .register(
                ClassSchema::new("Child")
                    .with_field("parent_id", SqlType::Int64)
                    .with_relation(RelationSchema::single("parent", "Parent")),
            )
            .unwrap();
        assert!(matches!(
            model.wire(),
            Err(SchemaError::ColumnCollision { column, .. }) if column == "parent_id"
        ));
    }

    #[test]
    fn test_self_referencing_tree() {
        let model = MetaModel::new();
        model
            .register(
                ClassSchema::new("Node")
                    .with_relation(RelationSchema::single("up", "Node"))
                    .with_relation(RelationSchema::collection("down", "Node")),
            )
            .unwrap();
        model.wire().unwrap();

        assert_eq!(model.cardinality("Node", "up").unwrap(), Cardinality::ManyToOne);
        assert_eq!(model.reverse_of("Node", "down").unwrap().unwrap().name(), "up");
    }
}
