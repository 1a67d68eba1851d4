//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Once;

use ormlink_core::entity::{ClassDescriptor, Entity};
use ormlink_core::meta::RelationSchema;
use ormlink_core::{ContextConfig, StorageContext};
use ormlink_query::{SqlType, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

static TRACING: Once = Once::new();

/// Log to the test output when `RUST_LOG` is set.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "ormlink_core=warn".into()),
            )
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .try_init();
    });
}

#[derive(Debug, Default, Clone)]
pub struct Parent {
    pub name: String,
    pub visits: i64,
    /// Number of children, recomputed from the relation.
    pub child_count: i64,
}

impl Entity for Parent {
    fn descriptor() -> ClassDescriptor<Self> {
        ClassDescriptor::<Self>::new("Parent")
            .field(
                "name",
                SqlType::Text,
                |p| p.name.clone().into(),
                |p, v| {
                    p.name = v.try_into()?;
                    Ok(())
                },
            )
            .field(
                "visits",
                SqlType::Int64,
                |p| p.visits.into(),
                |p, v| {
                    p.visits = v.try_into()?;
                    Ok(())
                },
            )
            .transient_field(
                "child_count",
                SqlType::Int64,
                |p| p.child_count.into(),
                |p, v| {
                    p.child_count = v.try_into()?;
                    Ok(())
                },
            )
            .relation(RelationSchema::collection("children", "Child").strong())
            .relation(RelationSchema::collection("tags", "Tag").strong())
            .depends_on("child_count", "children", "name")
            .recompute_with(|p, dependent, sources| {
                if dependent == "child_count" {
                    p.child_count = sources.len() as i64;
                }
            })
    }
}

#[derive(Debug, Default, Clone)]
pub struct Child {
    pub name: String,
    pub age: i64,
}

impl Entity for Child {
    fn descriptor() -> ClassDescriptor<Self> {
        ClassDescriptor::<Self>::new("Child")
            .field(
                "name",
                SqlType::Text,
                |c| c.name.clone().into(),
                |c, v| {
                    c.name = v.try_into()?;
                    Ok(())
                },
            )
            .field(
                "age",
                SqlType::Int64,
                |c| c.age.into(),
                |c, v| {
                    c.age = v.try_into()?;
                    Ok(())
                },
            )
            .relation(RelationSchema::single("parent", "Parent"))
    }
}

#[derive(Debug, Default, Clone)]
pub struct Tag {
    pub label: String,
}

impl Entity for Tag {
    fn descriptor() -> ClassDescriptor<Self> {
        ClassDescriptor::<Self>::new("Tag")
            .field(
                "label",
                SqlType::Text,
                |t| t.label.clone().into(),
                |t, v| {
                    t.label = v.try_into()?;
                    Ok(())
                },
            )
            .relation(RelationSchema::collection("parents", "Parent"))
    }
}

#[derive(Debug, Default, Clone)]
pub struct Person {
    pub name: String,
}

impl Entity for Person {
    fn descriptor() -> ClassDescriptor<Self> {
        ClassDescriptor::<Self>::new("Person")
            .field(
                "name",
                SqlType::Text,
                |p| p.name.clone().into(),
                |p, v| {
                    p.name = v.try_into()?;
                    Ok(())
                },
            )
            .relation(RelationSchema::single("profile", "Profile").strong())
    }
}

#[derive(Debug, Default, Clone)]
pub struct Profile {
    pub handle: String,
}

impl Entity for Profile {
    fn descriptor() -> ClassDescriptor<Self> {
        ClassDescriptor::<Self>::new("Profile")
            .field(
                "handle",
                SqlType::Text,
                |p| p.handle.clone().into(),
                |p, v| {
                    p.handle = v.try_into()?;
                    Ok(())
                },
            )
            .relation(RelationSchema::single("person", "Person"))
    }
}

pub fn parent(name: &str) -> Parent {
    Parent {
        name: name.to_string(),
        ..Parent::default()
    }
}

pub fn child(name: &str) -> Child {
    Child {
        name: name.to_string(),
        age: 0,
    }
}

pub fn tag(label: &str) -> Tag {
    Tag {
        label: label.to_string(),
    }
}

/// A database file in a temporary directory. Every context opened on it
/// acts as a separate process.
pub struct TestContext {
    path: PathBuf,
    _dir: tempfile::TempDir,
}

impl TestContext {
    pub fn new() -> Self {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ormlink.db");
        Self { path, _dir: dir }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> ContextConfig {
        ContextConfig::file(&self.path)
    }

    /// A context with every test entity registered and the schema created.
    pub fn open(&self) -> StorageContext {
        self.open_with(self.config())
    }

    pub fn open_with(&self, config: ContextConfig) -> StorageContext {
        let ctx = StorageContext::open(config).unwrap();
        ctx.register::<Parent>().unwrap();
        ctx.register::<Child>().unwrap();
        ctx.register::<Tag>().unwrap();
        ctx.register::<Person>().unwrap();
        ctx.register::<Profile>().unwrap();
        ctx.create_schema().unwrap();
        ctx
    }
}

/// Sorted names of a set of objects.
pub fn names<T>(objects: &[std::sync::Arc<ormlink_core::Persistent<T>>], get: fn(&T) -> String) -> Vec<String>
where
    T: Entity,
{
    let mut names: Vec<String> = objects.iter().map(|o| get(&o.read())).collect();
    names.sort();
    names
}

pub fn int(value: i64) -> Value {
    Value::Int64(value)
}
