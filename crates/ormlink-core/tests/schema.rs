//! Registration, wiring and table bootstrap.

mod common;

use common::{parent, Child, Parent, Tag, TestContext};
use ormlink_core::entity::{ClassDescriptor, Entity};
use ormlink_core::meta::{Cardinality, RelationSchema, RelationStorage};
use ormlink_core::{ContextConfig, Error, SchemaError, StorageContext};
use ormlink_query::SqlType;

#[derive(Debug, Default)]
struct Orphan {
    name: String,
}

impl Entity for Orphan {
    fn descriptor() -> ClassDescriptor<Self> {
        ClassDescriptor::<Self>::new("Orphan")
            .field(
                "name",
                SqlType::Text,
                |o| o.name.clone().into(),
                |o, v| {
                    o.name = v.try_into()?;
                    Ok(())
                },
            )
            .relation(RelationSchema::single("home", "Nowhere"))
    }
}

#[derive(Debug, Default)]
struct Keyed {
    code: String,
}

impl Entity for Keyed {
    fn descriptor() -> ClassDescriptor<Self> {
        ClassDescriptor::<Self>::new("Keyed")
            .with_primary_key("keyed_id")
            .field(
                "code",
                SqlType::Text,
                |k| k.code.clone().into(),
                |k, v| {
                    k.code = v.try_into()?;
                    Ok(())
                },
            )
    }
}

#[test]
fn test_create_schema_is_idempotent() {
    let tc = TestContext::new();
    let first = tc.open();
    let p = first.create(parent("p")).unwrap();

    // opening again creates nothing and keeps the rows
    let second = tc.open();
    second.create_schema().unwrap();
    let stored = second.read::<Parent>(p.key().unwrap()).unwrap().unwrap();
    assert_eq!(stored.read().name, "p");
}

#[test]
fn test_duplicate_registration() {
    let ctx = StorageContext::open(ContextConfig::in_memory()).unwrap();
    ctx.register::<Child>().unwrap();
    assert!(matches!(
        ctx.register::<Child>(),
        Err(Error::Schema(SchemaError::DuplicateClass(class))) if class == "Child"
    ));
}

#[test]
fn test_missing_target_class_fails_wiring() {
    let ctx = StorageContext::open(ContextConfig::in_memory()).unwrap();
    ctx.register::<Orphan>().unwrap();
    assert_eq!(
        ctx.meta().cardinality("Orphan", "home").unwrap(),
        Cardinality::Unknown
    );
    assert!(matches!(
        ctx.create_schema(),
        Err(Error::Schema(SchemaError::UnregisteredClass(class))) if class == "Nowhere"
    ));
}

#[test]
fn test_reads_check_wiring_first() {
    let ctx = StorageContext::open(ContextConfig::in_memory()).unwrap();
    ctx.register::<Parent>().unwrap();
    ctx.register::<Child>().unwrap();
    ctx.register::<Tag>().unwrap();
    ctx.register::<Orphan>().unwrap();

    // no table was ever created; the schema error comes first
    assert!(matches!(
        ctx.read::<Parent>(1),
        Err(Error::Schema(SchemaError::UnregisteredClass(class))) if class == "Nowhere"
    ));
    assert!(matches!(
        ctx.load("Child", 1),
        Err(Error::Schema(SchemaError::UnregisteredClass(_)))
    ));
}

#[test]
fn test_inferred_mappings() {
    let tc = TestContext::new();
    let ctx = tc.open();
    let meta = ctx.meta();

    assert_eq!(meta.cardinality("Parent", "children").unwrap(), Cardinality::OneToMany);
    assert_eq!(meta.cardinality("Child", "parent").unwrap(), Cardinality::ManyToOne);
    assert_eq!(meta.cardinality("Parent", "tags").unwrap(), Cardinality::ManyToMany);
    assert_eq!(meta.cardinality("Person", "profile").unwrap(), Cardinality::OneToOne);

    assert!(meta.has_table_foreign_key("Child", "parent").unwrap());
    assert!(!meta.has_table_foreign_key("Parent", "children").unwrap());

    let tags = meta.mapping("Parent", "tags").unwrap();
    let reverse = meta.mapping("Tag", "parents").unwrap();
    match (&tags.storage, &reverse.storage) {
        (
            RelationStorage::JoinTable { table: a, .. },
            RelationStorage::JoinTable { table: b, .. },
        ) => assert_eq!(a, b),
        other => panic!("unexpected storage {other:?}"),
    }

    // exactly one side of a one-to-one holds the column
    let person = meta.has_table_foreign_key("Person", "profile").unwrap();
    let profile = meta.has_table_foreign_key("Profile", "person").unwrap();
    assert!(person != profile);
}

#[test]
fn test_custom_primary_key_and_lock_table() {
    let config = ContextConfig::in_memory().with_lock_table("app_locks");
    let ctx = StorageContext::open(config).unwrap();
    ctx.register::<Keyed>().unwrap();
    ctx.create_schema().unwrap();

    let k = ctx
        .create(Keyed {
            code: "k1".into(),
        })
        .unwrap();
    assert!(ctx.try_lock(&k).unwrap().is_locked_locally());

    let rows = ctx
        .storage()
        .query(ormlink_query::Select::new(
            "app_locks",
            vec!["object_key".to_string()],
        ))
        .unwrap();
    assert_eq!(rows, vec![vec![ormlink_query::Value::Int64(k.key().unwrap())]]);

    let again = ctx.read::<Keyed>(k.key().unwrap()).unwrap().unwrap();
    assert_eq!(again.read().code, "k1");
}

#[test]
fn test_open_from_json_config() {
    let tc = TestContext::new();
    let json = serde_json::json!({
        "driver": "sqlite3",
        "location": { "file": tc.path() },
        "cache_max_size": 4,
    })
    .to_string();
    let config = ContextConfig::from_json(&json).unwrap();
    let ctx = tc.open_with(config);
    assert_eq!(ctx.identity_cache("Parent").unwrap().maximum_size(), Some(4));
}
