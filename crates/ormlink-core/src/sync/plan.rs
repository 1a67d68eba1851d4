//! Statement plans for writing relations.
//!
//! Builders here are pure: they describe which rows to touch and which
//! columns to set, and never run anything. Every plan lists its reset or
//! delete step before its set or insert step, so a row moving between
//! owners is never linked to both and unique foreign keys never collide.

use ormlink_query::{Condition, Delete, Insert, Select, Statement, Update, Value};

use crate::meta::{RelationMapping, RelationStorage, REVISION_COLUMN};

/// Rows a step will bump, read as `(key, revision)` just before it runs.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Probe {
    pub select: Select,
    /// Class of the probed rows.
    pub class: String,
    /// Relation of the probed rows that the step changes.
    pub relation: String,
}

/// One statement of a plan.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Step {
    pub probe: Option<Probe>,
    pub statement: Statement,
}

fn keys(values: &[i64]) -> Vec<Value> {
    values.iter().copied().map(Value::Int64).collect()
}

fn probe(table: &str, primary_key: &str, condition: Condition) -> Select {
    Select::new(
        table,
        vec![primary_key.to_string(), REVISION_COLUMN.to_string()],
    )
    .with_condition(condition)
}

/// Owning side of a one-to-one: free `target` from any other row, then
/// point this row at it.
pub(crate) fn owning_one_to_one(
    mapping: &RelationMapping,
    primary_key: &str,
    own_key: i64,
    target: Option<i64>,
) -> Vec<Step> {
    let RelationStorage::OwnColumn { table, column } = &mapping.storage else {
        return Vec::new();
    };
    let mut steps = Vec::with_capacity(2);
    if let Some(target) = target {
        let others = Condition::eq(column.clone(), target)
            .and(Condition::ne(primary_key, own_key));
        steps.push(Step {
            probe: Some(Probe {
                select: probe(table, primary_key, others.clone()),
                class: mapping.class.clone(),
                relation: mapping.property.clone(),
            }),
            statement: Update::new(table.clone())
                .set(column.clone(), Value::Null)
                .increment(REVISION_COLUMN, 1i64)
                .with_condition(others)
                .into(),
        });
    }
    steps.push(Step {
        probe: None,
        statement: Update::new(table.clone())
            .set(column.clone(), Value::from(target))
            .with_condition(Condition::eq(primary_key, own_key))
            .into(),
    });
    steps
}

/// The target table holds the foreign key: detach rows no longer related,
/// then attach the rows that are not yet.
pub(crate) fn reverse_column(
    mapping: &RelationMapping,
    target_primary_key: &str,
    own_key: i64,
    desired: &[i64],
) -> Vec<Step> {
    let RelationStorage::ReverseColumn { table, column } = &mapping.storage else {
        return Vec::new();
    };
    let touched = |select| {
        Some(Probe {
            select,
            class: mapping.target_class.clone(),
            relation: mapping.reverse.clone(),
        })
    };

    let stale = Condition::eq(column.clone(), own_key)
        .and(Condition::not_in_values(target_primary_key, keys(desired)));
    let fresh = Condition::in_values(target_primary_key, keys(desired))
        .and(Condition::distinct_from(column.clone(), own_key));

    vec![
        Step {
            probe: touched(probe(table, target_primary_key, stale.clone())),
            statement: Update::new(table.clone())
                .set(column.clone(), Value::Null)
                .increment(REVISION_COLUMN, 1i64)
                .with_condition(stale)
                .into(),
        },
        Step {
            probe: touched(probe(table, target_primary_key, fresh.clone())),
            statement: Update::new(table.clone())
                .set(column.clone(), own_key)
                .increment(REVISION_COLUMN, 1i64)
                .with_condition(fresh)
                .into(),
        },
    ]
}

/// Keys currently paired with `own_key` in the join table.
pub(crate) fn existing_pairs(mapping: &RelationMapping, own_key: i64) -> Option<Select> {
    let RelationStorage::JoinTable {
        table,
        own_column,
        other_column,
    } = &mapping.storage
    else {
        return None;
    };
    Some(
        Select::new(table.clone(), vec![other_column.clone()])
            .with_condition(Condition::eq(own_column.clone(), own_key))
            .order_asc(other_column.clone()),
    )
}

/// Join table: delete pairs that left, insert pairs that arrived, and bump
/// the revision of the targets whose membership changed.
pub(crate) fn join_table(
    mapping: &RelationMapping,
    target_primary_key: &str,
    own_key: i64,
    existing: &[i64],
    desired: &[i64],
) -> Vec<Step> {
    let RelationStorage::JoinTable {
        table,
        own_column,
        other_column,
    } = &mapping.storage
    else {
        return Vec::new();
    };

    let removed: Vec<i64> = existing
        .iter()
        .copied()
        .filter(|k| !desired.contains(k))
        .collect();
    let mut added: Vec<i64> = desired
        .iter()
        .copied()
        .filter(|k| !existing.contains(k))
        .collect();
    added.dedup();

    let mut insert = Insert::new(table.clone(), vec![own_column.clone(), other_column.clone()])
        .ignore_conflicts();
    for key in &added {
        insert = insert.row(vec![Value::Int64(own_key), Value::Int64(*key)]);
    }

    let changed: Vec<i64> = removed.iter().chain(added.iter()).copied().collect();
    let changed_rows = Condition::in_values(target_primary_key, keys(&changed));

    vec![
        Step {
            probe: None,
            statement: Delete::new(
                table.clone(),
                Condition::eq(own_column.clone(), own_key)
                    .and(Condition::in_values(other_column.clone(), keys(&removed))),
            )
            .into(),
        },
        Step {
            probe: None,
            statement: insert.into(),
        },
        Step {
            probe: Some(Probe {
                select: probe(&mapping.target_table, target_primary_key, changed_rows.clone()),
                class: mapping.target_class.clone(),
                relation: mapping.reverse.clone(),
            }),
            statement: Update::new(mapping.target_table.clone())
                .increment(REVISION_COLUMN, 1i64)
                .with_condition(changed_rows)
                .into(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use ormlink_query::{render, SqliteDialect};

    use super::*;
    use crate::meta::Cardinality;

    fn children() -> RelationMapping {
        RelationMapping {
            class: "Parent".into(),
            property: "children".into(),
            target_class: "Child".into(),
            target_table: "child".into(),
            reverse: "parent".into(),
            cardinality: Cardinality::OneToMany,
            storage: RelationStorage::ReverseColumn {
                table: "child".into(),
                column: "parent_id".into(),
            },
        }
    }

    fn tags() -> RelationMapping {
        RelationMapping {
            class: "Parent".into(),
            property: "tags".into(),
            target_class: "Tag".into(),
            target_table: "tag".into(),
            reverse: "parents".into(),
            cardinality: Cardinality::ManyToMany,
            storage: RelationStorage::JoinTable {
                table: "parent_tags_tag_parents".into(),
                own_column: "parent_tags_id".into(),
                other_column: "tag_parents_id".into(),
            },
        }
    }

    fn sql(step: &Step) -> String {
        render(&step.statement, &SqliteDialect).unwrap().sql
    }

    #[test]
    fn test_reverse_column_resets_before_setting() {
        let steps = reverse_column(&children(), "id", 7, &[1, 2]);
        assert_eq!(steps.len(), 2);
        assert_eq!(
            sql(&steps[0]),
            "UPDATE \"child\" SET \"parent_id\" = ?1, \"revision\" = \"revision\" + ?2 \
             WHERE (\"parent_id\" = ?3 AND NOT (\"id\" IN (?4, ?5)))"
        );
        assert!(sql(&steps[1]).starts_with("UPDATE \"child\" SET \"parent_id\" = ?1"));
        let probe = steps[1].probe.as_ref().unwrap();
        assert_eq!(probe.class, "Child");
        assert_eq!(probe.relation, "parent");
    }

    #[test]
    fn test_reverse_column_with_no_targets_only_resets() {
        let steps = reverse_column(&children(), "id", 7, &[]);
        assert!(!steps[0].statement.is_noop());
        assert!(steps[1].statement.is_noop());
    }

    #[test]
    fn test_join_table_diff() {
        let steps = join_table(&tags(), "id", 1, &[10, 11], &[11, 12]);
        let Statement::Delete(delete) = &steps[0].statement else {
            panic!("expected delete");
        };
        assert_eq!(
            delete.condition,
            Condition::eq("parent_tags_id", 1i64)
                .and(Condition::in_values("tag_parents_id", vec![Value::Int64(10)]))
        );
        let Statement::Insert(insert) = &steps[1].statement else {
            panic!("expected insert");
        };
        assert!(insert.ignore_conflicts);
        assert_eq!(insert.rows, vec![vec![Value::Int64(1), Value::Int64(12)]]);
        let Statement::Update(bump) = &steps[2].statement else {
            panic!("expected update");
        };
        assert_eq!(
            bump.condition,
            Condition::in_values("id", vec![Value::Int64(10), Value::Int64(12)])
        );
    }

    #[test]
    fn test_join_table_unchanged_is_noop() {
        let steps = join_table(&tags(), "id", 1, &[10, 11], &[10, 11]);
        assert!(steps.iter().all(|s| s.statement.is_noop()));
    }

    #[test]
    fn test_owning_one_to_one() {
        let mapping = RelationMapping {
            class: "Person".into(),
            property: "profile".into(),
            target_class: "Profile".into(),
            target_table: "profile".into(),
            reverse: "person".into(),
            cardinality: Cardinality::OneToOne,
            storage: RelationStorage::OwnColumn {
                table: "person".into(),
                column: "profile_id".into(),
            },
        };
        let steps = owning_one_to_one(&mapping, "id", 3, Some(9));
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].probe.as_ref().unwrap().relation, "profile");
        assert_eq!(
            sql(&steps[1]),
            "UPDATE \"person\" SET \"profile_id\" = ?1 WHERE \"id\" = ?2"
        );

        let cleared = owning_one_to_one(&mapping, "id", 3, None);
        assert_eq!(cleared.len(), 1);
    }

    #[test]
    fn test_existing_pairs_only_for_join_tables() {
        assert!(existing_pairs(&children(), 1).is_none());
        assert!(existing_pairs(&tags(), 1).is_some());
    }
}
