//! Rendering statement descriptors into parameterized SQL text.

use crate::condition::{Condition, Operator};
use crate::dialect::Dialect;
use crate::error::Error;
use crate::statement::{Assignment, Delete, Insert, OrderDirection, Select, Statement, Update};
use crate::value::Value;

/// Rendered SQL with its ordered bind values.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlText {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Render a statement for the given dialect.
pub fn render(statement: &Statement, dialect: &dyn Dialect) -> Result<SqlText, Error> {
    let mut writer = Writer::new(dialect);
    match statement {
        Statement::Select(s) => writer.select(s),
        Statement::Insert(s) => writer.insert(s)?,
        Statement::Update(s) => writer.update(s)?,
        Statement::Delete(s) => writer.delete(s),
    }
    Ok(writer.finish())
}

struct Writer<'d> {
    dialect: &'d dyn Dialect,
    sql: String,
    params: Vec<Value>,
}

impl<'d> Writer<'d> {
    fn new(dialect: &'d dyn Dialect) -> Self {
        Self {
            dialect,
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn finish(self) -> SqlText {
        SqlText {
            sql: self.sql,
            params: self.params,
        }
    }

    fn bind(&mut self, value: &Value) {
        self.params.push(value.clone());
        let placeholder = self.dialect.placeholder(self.params.len());
        self.sql.push_str(&placeholder);
    }

    fn ident(&mut self, name: &str) {
        let quoted = self.dialect.quote(name);
        self.sql.push_str(&quoted);
    }

    fn ident_list(&mut self, names: &[String]) {
        for (i, name) in names.iter().enumerate() {
            if i > 0 {
                self.sql.push_str(", ");
            }
            self.ident(name);
        }
    }

    fn select(&mut self, s: &Select) {
        self.sql.push_str("SELECT ");
        self.ident_list(&s.columns);
        self.sql.push_str(" FROM ");
        self.ident(&s.table);
        self.where_clause(&s.condition);
        if !s.order_by.is_empty() {
            self.sql.push_str(" ORDER BY ");
            for (i, (column, direction)) in s.order_by.iter().enumerate() {
                if i > 0 {
                    self.sql.push_str(", ");
                }
                self.ident(column);
                self.sql.push_str(match direction {
                    OrderDirection::Asc => " ASC",
                    OrderDirection::Desc => " DESC",
                });
            }
        }
        if s.for_update && self.dialect.supports_for_update() {
            self.sql.push_str(" FOR UPDATE");
        }
    }

    fn insert(&mut self, s: &Insert) -> Result<(), Error> {
        if s.rows.is_empty() {
            return Err(Error::InvalidStatement(format!(
                "insert into {} has no rows",
                s.table
            )));
        }
        let head = self.dialect.insert_head(&s.table, s.ignore_conflicts);
        self.sql.push_str(&head);
        if s.columns.is_empty() {
            // Every column takes its default; only meaningful for a single row.
            if s.rows.len() > 1 || !s.rows[0].is_empty() {
                return Err(Error::InvalidStatement(format!(
                    "insert into {} without columns must be a single empty row",
                    s.table
                )));
            }
            self.sql.push_str(" DEFAULT VALUES");
            return Ok(());
        }
        self.sql.push_str(" (");
        self.ident_list(&s.columns);
        self.sql.push_str(") VALUES ");
        for (i, row) in s.rows.iter().enumerate() {
            if row.len() != s.columns.len() {
                return Err(Error::InvalidStatement(format!(
                    "insert into {}: row {} has {} values for {} columns",
                    s.table,
                    i,
                    row.len(),
                    s.columns.len()
                )));
            }
            if i > 0 {
                self.sql.push_str(", ");
            }
            self.sql.push('(');
            for (j, value) in row.iter().enumerate() {
                if j > 0 {
                    self.sql.push_str(", ");
                }
                self.bind(value);
            }
            self.sql.push(')');
        }
        if s.ignore_conflicts {
            if let Some(tail) = self.dialect.insert_ignore_tail() {
                self.sql.push(' ');
                self.sql.push_str(tail);
            }
        }
        Ok(())
    }

    fn update(&mut self, s: &Update) -> Result<(), Error> {
        if s.assignments.is_empty() {
            return Err(Error::InvalidStatement(format!(
                "update of {} has no assignments",
                s.table
            )));
        }
        self.sql.push_str("UPDATE ");
        self.ident(&s.table);
        self.sql.push_str(" SET ");
        for (i, assignment) in s.assignments.iter().enumerate() {
            if i > 0 {
                self.sql.push_str(", ");
            }
            self.ident(assignment.column());
            self.sql.push_str(" = ");
            match assignment {
                Assignment::Set(_, value) => self.bind(value),
                Assignment::Increment(column, delta) => {
                    self.ident(column);
                    self.sql.push_str(" + ");
                    self.bind(delta);
                }
                Assignment::Now(_) => {
                    let now = self.dialect.now();
                    self.sql.push_str(now);
                }
            }
        }
        self.where_clause(&s.condition);
        Ok(())
    }

    fn delete(&mut self, s: &Delete) {
        self.sql.push_str("DELETE FROM ");
        self.ident(&s.table);
        self.where_clause(&s.condition);
    }

    fn where_clause(&mut self, condition: &Condition) {
        if matches!(condition, Condition::All(parts) if parts.is_empty()) {
            return;
        }
        self.sql.push_str(" WHERE ");
        self.condition(condition);
    }

    fn condition(&mut self, condition: &Condition) {
        match condition {
            Condition::All(parts) => self.junction(parts, " AND ", "1 = 1"),
            Condition::Any(parts) => self.junction(parts, " OR ", "1 = 0"),
            Condition::Not(inner) => {
                self.sql.push_str("NOT (");
                self.condition(inner);
                self.sql.push(')');
            }
            Condition::Compare { column, op, value } => {
                if value.is_null() {
                    // Comparisons against NULL are never true in SQL.
                    self.ident(column);
                    self.sql.push_str(match op {
                        Operator::Ne => " IS NOT NULL",
                        _ => " IS NULL",
                    });
                    return;
                }
                self.ident(column);
                self.sql.push(' ');
                self.sql.push_str(op.as_sql());
                self.sql.push(' ');
                self.bind(value);
            }
            Condition::In { column, values } => {
                if values.is_empty() {
                    self.sql.push_str("1 = 0");
                    return;
                }
                self.ident(column);
                self.sql.push_str(" IN (");
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        self.sql.push_str(", ");
                    }
                    self.bind(value);
                }
                self.sql.push(')');
            }
            Condition::IsNull { column } => {
                self.ident(column);
                self.sql.push_str(" IS NULL");
            }
        }
    }

    fn junction(&mut self, parts: &[Condition], separator: &str, empty: &str) {
        match parts {
            [] => self.sql.push_str(empty),
            [single] => self.condition(single),
            _ => {
                self.sql.push('(');
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        self.sql.push_str(separator);
                    }
                    self.condition(part);
                }
                self.sql.push(')');
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{MySqlDialect, PostgresDialect, SqliteDialect};

    #[test]
    fn test_render_select() {
        let select = Select::new("child", vec!["id".into(), "revision".into()])
            .with_condition(Condition::eq("parent_id", 5i64).and(Condition::is_not_null("name")))
            .order_asc("id");

        let text = render(&select.into(), &SqliteDialect).unwrap();
        assert_eq!(
            text.sql,
            "SELECT \"id\", \"revision\" FROM \"child\" WHERE (\"parent_id\" = ?1 AND NOT (\"name\" IS NULL)) ORDER BY \"id\" ASC"
        );
        assert_eq!(text.params, vec![Value::Int64(5)]);
    }

    #[test]
    fn test_render_for_update_only_where_supported() {
        let select = Select::new("parent", vec!["lock_id".into()])
            .with_condition(Condition::eq("id", 1i64))
            .for_update();

        let sqlite = render(&select.clone().into(), &SqliteDialect).unwrap();
        assert!(!sqlite.sql.contains("FOR UPDATE"));

        let pg = render(&select.into(), &PostgresDialect).unwrap();
        assert_eq!(
            pg.sql,
            "SELECT \"lock_id\" FROM \"parent\" WHERE \"id\" = $1 FOR UPDATE"
        );
    }

    #[test]
    fn test_render_reset_update() {
        let update = Update::new("child")
            .set("parent_id", Value::Null)
            .increment("revision", 1i64)
            .with_condition(
                Condition::eq("parent_id", 3i64)
                    .and(Condition::not_in_values("id", vec![Value::Int64(8), Value::Int64(9)])),
            );

        let text = render(&update.into(), &MySqlDialect).unwrap();
        assert_eq!(
            text.sql,
            "UPDATE `child` SET `parent_id` = ?, `revision` = `revision` + ? WHERE (`parent_id` = ? AND NOT (`id` IN (?, ?)))"
        );
        assert_eq!(text.params.len(), 5);
        assert_eq!(text.params[0], Value::Null);
    }

    #[test]
    fn test_render_insert_ignore() {
        let insert = Insert::new("parent_tags_tag_parents", vec!["a".into(), "b".into()])
            .row(vec![Value::Int64(1), Value::Int64(2)])
            .row(vec![Value::Int64(1), Value::Int64(3)])
            .ignore_conflicts();

        let sqlite = render(&insert.clone().into(), &SqliteDialect).unwrap();
        assert!(sqlite.sql.starts_with("INSERT OR IGNORE INTO"));
        assert!(sqlite.sql.ends_with("VALUES (?1, ?2), (?3, ?4)"));

        let pg = render(&insert.into(), &PostgresDialect).unwrap();
        assert!(pg.sql.ends_with("ON CONFLICT DO NOTHING"));
    }

    #[test]
    fn test_render_now_and_empty_conditions() {
        let update = Update::new("lock")
            .now("created_at")
            .with_condition(Condition::Any(vec![]));
        let text = render(&update.into(), &PostgresDialect).unwrap();
        assert_eq!(
            text.sql,
            "UPDATE \"lock\" SET \"created_at\" = now() WHERE 1 = 0"
        );

        let delete = Delete::new("lock", Condition::All(vec![]));
        let text = render(&delete.into(), &SqliteDialect).unwrap();
        assert_eq!(text.sql, "DELETE FROM \"lock\"");
    }

    #[test]
    fn test_render_null_comparison() {
        let select = Select::new("child", vec!["id".into()])
            .with_condition(Condition::eq("parent_id", Value::Null));
        let text = render(&select.into(), &SqliteDialect).unwrap();
        assert!(text.sql.ends_with("WHERE \"parent_id\" IS NULL"));
        assert!(text.params.is_empty());
    }

    #[test]
    fn test_render_invalid() {
        let insert = Insert::new("child", vec!["a".into()]).row(vec![]);
        assert!(matches!(
            render(&insert.into(), &SqliteDialect),
            Err(Error::InvalidStatement(_))
        ));

        let update = Update::new("child");
        assert!(render(&update.into(), &SqliteDialect).is_err());
    }
}
