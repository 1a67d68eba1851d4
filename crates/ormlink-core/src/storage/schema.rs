//! Table bootstrap for registered classes.

use std::collections::BTreeMap;

use ormlink_query::Dialect;
use tracing::{info, instrument};

use super::transaction::Storage;
use crate::error::Result;
use crate::meta::{
    Cardinality, MetaModel, MetaObject, RelationStorage, LOCK_COLUMN, REVISION_COLUMN,
};

/// Columns of the advisory lock table.
pub(crate) mod lock_columns {
    pub const ID: &str = "id";
    pub const CLASS: &str = "class";
    pub const KEY: &str = "object_key";
    pub const OWNER: &str = "owner";
    pub const METADATA: &str = "metadata";
    pub const CREATED_AT: &str = "created_at";
}

/// `CREATE TABLE IF NOT EXISTS` statements for every class, join table and
/// the lock table, in a stable order.
pub(crate) fn schema_statements(
    model: &MetaModel,
    dialect: &dyn Dialect,
    lock_table: &str,
) -> Result<Vec<String>> {
    let mut statements = Vec::new();
    let mut join_tables: BTreeMap<String, (String, String)> = BTreeMap::new();

    for meta in model.classes() {
        statements.push(entity_table(model, dialect, &meta)?);
        for relation in meta.relations() {
            let mapping = model.mapping(meta.class(), relation.name())?;
            if let RelationStorage::JoinTable {
                table,
                own_column,
                other_column,
            } = &mapping.storage
            {
                let mut columns = [own_column.clone(), other_column.clone()];
                columns.sort();
                let [a, b] = columns;
                join_tables.entry(table.clone()).or_insert((a, b));
            }
        }
    }

    for (table, (a, b)) in &join_tables {
        statements.push(format!(
            "CREATE TABLE IF NOT EXISTS {} ({} BIGINT NOT NULL, {} BIGINT NOT NULL, PRIMARY KEY ({}, {}))",
            dialect.quote(table),
            dialect.quote(a),
            dialect.quote(b),
            dialect.quote(a),
            dialect.quote(b),
        ));
    }

    use lock_columns::*;
    statements.push(format!(
        "CREATE TABLE IF NOT EXISTS {} ({} {}, {} TEXT NOT NULL, {} BIGINT NOT NULL, {} TEXT NOT NULL, {} TEXT, {} TEXT NOT NULL, UNIQUE ({}, {}))",
        dialect.quote(lock_table),
        dialect.quote(ID),
        dialect.primary_key_type(),
        dialect.quote(CLASS),
        dialect.quote(KEY),
        dialect.quote(OWNER),
        dialect.quote(METADATA),
        dialect.quote(CREATED_AT),
        dialect.quote(CLASS),
        dialect.quote(KEY),
    ));
    Ok(statements)
}

fn entity_table(model: &MetaModel, dialect: &dyn Dialect, meta: &MetaObject) -> Result<String> {
    let mut columns = vec![
        format!(
            "{} {}",
            dialect.quote(meta.primary_key()),
            dialect.primary_key_type()
        ),
        format!("{} BIGINT NOT NULL DEFAULT 0", dialect.quote(REVISION_COLUMN)),
        format!("{} BIGINT", dialect.quote(LOCK_COLUMN)),
    ];
    for field in meta.stored_fields() {
        if let Some(ty) = field.sql_type() {
            columns.push(format!(
                "{} {}",
                dialect.quote(field.column_name()),
                ty.column_type()
            ));
        }
    }
    for relation in meta.relations() {
        let mapping = model.mapping(meta.class(), relation.name())?;
        if let RelationStorage::OwnColumn { column, .. } = &mapping.storage {
            let unique = if mapping.cardinality == Cardinality::OneToOne {
                " UNIQUE"
            } else {
                ""
            };
            columns.push(format!("{} BIGINT{}", dialect.quote(column), unique));
        }
    }
    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        dialect.quote(meta.table()),
        columns.join(", ")
    ))
}

/// Create every missing table in one transaction.
#[instrument(skip_all, fields(lock_table = %lock_table))]
pub(crate) fn create_schema(model: &MetaModel, storage: &Storage, lock_table: &str) -> Result<()> {
    let statements = schema_statements(model, storage.dialect().as_ref(), lock_table)?;
    let tx = storage.begin()?;
    for sql in &statements {
        if let Err(e) = storage.execute_batch(sql) {
            tx.rollback()?;
            return Err(e);
        }
    }
    tx.commit()?;
    info!(tables = statements.len(), "schema ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use ormlink_query::{SqlType, SqliteDialect};

    use super::*;
    use crate::meta::{ClassSchema, RelationSchema};

    fn model() -> MetaModel {
        let model = MetaModel::new();
        model
            .register(
                ClassSchema::new("Person")
                    .with_field("name", SqlType::Text)
                    .with_transient_field("display", SqlType::Text)
                    .with_relation(RelationSchema::single("profile", "Profile"))
                    .with_relation(RelationSchema::collection("clubs", "Club")),
            )
            .unwrap();
        model
            .register(
                ClassSchema::new("Profile").with_relation(RelationSchema::single("person", "Person")),
            )
            .unwrap();
        model
            .register(
                ClassSchema::new("Club").with_relation(RelationSchema::collection("members", "Person")),
            )
            .unwrap();
        model.wire().unwrap();
        model
    }

    #[test]
    fn test_schema_statements() {
        let statements = schema_statements(&model(), &SqliteDialect, "ormlink_lock").unwrap();
        assert_eq!(statements.len(), 5);

        let person = statements.iter().find(|s| s.contains("\"person\" (")).unwrap();
        assert!(person.contains("\"id\" INTEGER PRIMARY KEY AUTOINCREMENT"));
        assert!(person.contains("\"revision\" BIGINT NOT NULL DEFAULT 0"));
        assert!(person.contains("\"lock_id\" BIGINT"));
        assert!(person.contains("\"name\" TEXT"));
        assert!(!person.contains("display"));
        assert!(person.contains("\"profile_id\" BIGINT UNIQUE"));

        let profile = statements.iter().find(|s| s.contains("\"profile\" (")).unwrap();
        assert!(!profile.contains("person_id"));

        assert!(statements.iter().any(|s| s.contains("PRIMARY KEY (")));
        assert!(statements
            .last()
            .unwrap()
            .contains("UNIQUE (\"class\", \"object_key\")"));
    }

    #[test]
    fn test_create_schema_is_repeatable() {
        use std::time::Duration;

        use crate::storage::SqliteConnection;

        let storage = Storage::new(Box::new(
            SqliteConnection::open_in_memory(Duration::from_millis(100)).unwrap(),
        ));
        let model = model();
        create_schema(&model, &storage, "ormlink_lock").unwrap();
        create_schema(&model, &storage, "ormlink_lock").unwrap();
        assert_eq!(storage.depth(), 0);
    }
}
