//! Composable predicate trees.
//!
//! A [`Condition`] describes *which* rows a statement touches. It carries
//! column names and bound values only; turning it into SQL text is the job
//! of the renderer, so callers never splice values into strings.

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Comparison operator of a leaf condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    /// `=`
    Eq,
    /// `<>`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl Operator {
    /// SQL spelling of the operator.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "<>",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
        }
    }
}

/// A predicate tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Condition {
    /// All children must hold. An empty list is true.
    All(Vec<Condition>),
    /// At least one child must hold. An empty list is false.
    Any(Vec<Condition>),
    /// Negation.
    Not(Box<Condition>),
    /// `column <op> value`.
    Compare {
        column: String,
        op: Operator,
        value: Value,
    },
    /// `column IN (values)`. An empty list is false.
    In { column: String, values: Vec<Value> },
    /// `column IS NULL`.
    IsNull { column: String },
}

impl Condition {
    /// Create a comparison leaf.
    pub fn compare(column: impl Into<String>, op: Operator, value: impl Into<Value>) -> Self {
        Condition::Compare {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    /// Create an equality leaf.
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, Operator::Eq, value)
    }

    /// Create a not-equal leaf.
    pub fn ne(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, Operator::Ne, value)
    }

    /// Create an IN leaf.
    pub fn in_values(column: impl Into<String>, values: Vec<Value>) -> Self {
        Condition::In {
            column: column.into(),
            values,
        }
    }

    /// Create a NOT IN condition.
    pub fn not_in_values(column: impl Into<String>, values: Vec<Value>) -> Self {
        Self::in_values(column, values).negate()
    }

    /// Create an IS NULL leaf.
    pub fn is_null(column: impl Into<String>) -> Self {
        Condition::IsNull {
            column: column.into(),
        }
    }

    /// Create an IS NOT NULL condition.
    pub fn is_not_null(column: impl Into<String>) -> Self {
        Self::is_null(column).negate()
    }

    /// `column IS NULL OR column <> value`, the null-safe inequality.
    pub fn distinct_from(column: impl Into<String>, value: impl Into<Value>) -> Self {
        let column = column.into();
        Condition::Any(vec![
            Self::is_null(column.clone()),
            Self::ne(column, value),
        ])
    }

    /// Negate this condition.
    pub fn negate(self) -> Self {
        match self {
            Condition::Not(inner) => *inner,
            other => Condition::Not(Box::new(other)),
        }
    }

    /// Conjoin with another condition, flattening nested conjunctions.
    pub fn and(self, other: Condition) -> Self {
        match self {
            Condition::All(mut parts) => {
                parts.push(other);
                Condition::All(parts)
            }
            first => Condition::All(vec![first, other]),
        }
    }

    /// Disjoin with another condition, flattening nested disjunctions.
    pub fn or(self, other: Condition) -> Self {
        match self {
            Condition::Any(mut parts) => {
                parts.push(other);
                Condition::Any(parts)
            }
            first => Condition::Any(vec![first, other]),
        }
    }

    /// Check whether the condition is trivially false (an empty IN list or an
    /// empty disjunction), so callers can skip issuing the statement.
    pub fn is_unsatisfiable(&self) -> bool {
        match self {
            Condition::In { values, .. } => values.is_empty(),
            Condition::Any(parts) => parts.iter().all(Condition::is_unsatisfiable),
            Condition::All(parts) => parts.iter().any(Condition::is_unsatisfiable),
            _ => false,
        }
    }

    /// Collect the column names referenced by the condition.
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Condition::All(parts) | Condition::Any(parts) => {
                for part in parts {
                    part.collect_columns(out);
                }
            }
            Condition::Not(inner) => inner.collect_columns(out),
            Condition::Compare { column, .. }
            | Condition::In { column, .. }
            | Condition::IsNull { column } => {
                if !out.contains(&column.as_str()) {
                    out.push(column);
                }
            }
        }
    }
}
