//! Statement descriptors.
//!
//! Each descriptor names a table, the columns involved and a [`Condition`]
//! selecting rows. Descriptors are built with small builder methods, the
//! same way query IR is assembled elsewhere in the workspace.

use serde::{Deserialize, Serialize};

use crate::condition::Condition;
use crate::value::Value;

/// Sort direction for ordered selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderDirection {
    Asc,
    Desc,
}

/// A `SELECT` statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Select {
    pub table: String,
    pub columns: Vec<String>,
    pub condition: Condition,
    pub order_by: Vec<(String, OrderDirection)>,
    /// Request a row-level write lock on the selected rows.
    pub for_update: bool,
}

impl Select {
    /// Select `columns` from `table`, matching every row.
    pub fn new(table: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            table: table.into(),
            columns,
            condition: Condition::All(Vec::new()),
            order_by: Vec::new(),
            for_update: false,
        }
    }

    /// Restrict the selected rows.
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = condition;
        self
    }

    /// Append an ascending sort key.
    pub fn order_asc(mut self, column: impl Into<String>) -> Self {
        self.order_by.push((column.into(), OrderDirection::Asc));
        self
    }

    /// Append a descending sort key.
    pub fn order_desc(mut self, column: impl Into<String>) -> Self {
        self.order_by.push((column.into(), OrderDirection::Desc));
        self
    }

    /// Lock the selected rows until the transaction ends.
    pub fn for_update(mut self) -> Self {
        self.for_update = true;
        self
    }
}

/// An `INSERT` statement for one or more rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insert {
    pub table: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    /// Silently skip rows that violate a uniqueness constraint.
    pub ignore_conflicts: bool,
}

impl Insert {
    /// Create an insert with no rows.
    pub fn new(table: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            table: table.into(),
            columns,
            rows: Vec::new(),
            ignore_conflicts: false,
        }
    }

    /// Append a row; its arity must match the column list.
    pub fn row(mut self, values: Vec<Value>) -> Self {
        self.rows.push(values);
        self
    }

    /// Turn the insert into an insert-or-ignore.
    pub fn ignore_conflicts(mut self) -> Self {
        self.ignore_conflicts = true;
        self
    }
}

/// A single `SET` clause of an update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Assignment {
    /// `column = value`
    Set(String, Value),
    /// `column = column + delta`
    Increment(String, Value),
    /// `column = <current timestamp>`
    Now(String),
}

impl Assignment {
    /// The column this clause writes.
    pub fn column(&self) -> &str {
        match self {
            Assignment::Set(c, _) | Assignment::Increment(c, _) | Assignment::Now(c) => c,
        }
    }
}

/// An `UPDATE` statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    pub table: String,
    pub assignments: Vec<Assignment>,
    pub condition: Condition,
}

impl Update {
    /// Create an update of `table` with no assignments, matching every row.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            assignments: Vec::new(),
            condition: Condition::All(Vec::new()),
        }
    }

    /// Set a column to a bound value.
    pub fn set(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.assignments
            .push(Assignment::Set(column.into(), value.into()));
        self
    }

    /// Add `delta` to a numeric column.
    pub fn increment(mut self, column: impl Into<String>, delta: impl Into<Value>) -> Self {
        self.assignments
            .push(Assignment::Increment(column.into(), delta.into()));
        self
    }

    /// Set a column to the backend's current timestamp.
    pub fn now(mut self, column: impl Into<String>) -> Self {
        self.assignments.push(Assignment::Now(column.into()));
        self
    }

    /// Restrict the updated rows.
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = condition;
        self
    }
}

/// A `DELETE` statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delete {
    pub table: String,
    pub condition: Condition,
}

impl Delete {
    /// Delete the rows of `table` matching `condition`.
    pub fn new(table: impl Into<String>, condition: Condition) -> Self {
        Self {
            table: table.into(),
            condition,
        }
    }
}

/// Any renderable statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    Select(Select),
    Insert(Insert),
    Update(Update),
    Delete(Delete),
}

impl Statement {
    /// Name of the table the statement operates on.
    pub fn table(&self) -> &str {
        match self {
            Statement::Select(s) => &s.table,
            Statement::Insert(s) => &s.table,
            Statement::Update(s) => &s.table,
            Statement::Delete(s) => &s.table,
        }
    }

    /// True when the statement cannot touch any row and may be skipped.
    pub fn is_noop(&self) -> bool {
        match self {
            Statement::Select(s) => s.condition.is_unsatisfiable(),
            Statement::Insert(s) => s.rows.is_empty(),
            Statement::Update(s) => s.assignments.is_empty() || s.condition.is_unsatisfiable(),
            Statement::Delete(s) => s.condition.is_unsatisfiable(),
        }
    }
}

impl From<Select> for Statement {
    fn from(s: Select) -> Self {
        Statement::Select(s)
    }
}

impl From<Insert> for Statement {
    fn from(s: Insert) -> Self {
        Statement::Insert(s)
    }
}

impl From<Update> for Statement {
    fn from(s: Update) -> Self {
        Statement::Update(s)
    }
}

impl From<Delete> for Statement {
    fn from(s: Delete) -> Self {
        Statement::Delete(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_builder() {
        let update = Update::new("child")
            .set("parent_id", Value::Null)
            .increment("revision", 1i64)
            .with_condition(Condition::eq("parent_id", 4i64));

        assert_eq!(update.assignments.len(), 2);
        assert_eq!(update.assignments[1].column(), "revision");
        assert!(!Statement::from(update).is_noop());
    }

    #[test]
    fn test_noop_detection() {
        let update = Update::new("child").with_condition(Condition::eq("id", 1i64));
        assert!(Statement::from(update).is_noop());

        let insert = Insert::new("tag_join", vec!["a".into(), "b".into()]);
        assert!(Statement::from(insert).is_noop());

        let delete = Delete::new("child", Condition::in_values("id", vec![]));
        assert!(Statement::from(delete).is_noop());
    }

    #[test]
    fn test_statement_serde() {
        let select = Select::new("parent", vec!["id".into(), "name".into()])
            .with_condition(Condition::eq("id", 7i64))
            .order_asc("id")
            .for_update();
        let stmt = Statement::from(select);

        let json = serde_json::to_string(&stmt).unwrap();
        let back: Statement = serde_json::from_str(&json).unwrap();
        assert_eq!(stmt, back);
        assert_eq!(back.table(), "parent");
    }
}
