use super::Value;
use crate::schema::db::ColumnId;

/// A conjunction of conditions over the columns of a single table.
///
/// An empty filter matches every row.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Filter {
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `column = value`. Never matches a null column.
    Eq(ColumnId, Value),

    /// `column IN (values)`. Null entries never match.
    In(ColumnId, Vec<Value>),

    /// `column IS NULL`
    IsNull(ColumnId),
}

impl Filter {
    /// A filter matching every row.
    pub fn all() -> Filter {
        Filter::default()
    }

    pub fn eq(column: ColumnId, value: impl Into<Value>) -> Filter {
        Filter {
            conditions: vec![Condition::Eq(column, value.into())],
        }
    }

    pub fn in_list(column: ColumnId, values: Vec<Value>) -> Filter {
        Filter {
            conditions: vec![Condition::In(column, values)],
        }
    }

    pub fn and(mut self, condition: Condition) -> Filter {
        self.conditions.push(condition);
        self
    }

    pub fn is_all(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Evaluates the filter against a row, reading column values through
    /// `column`.
    pub fn matches<'a>(&self, column: impl Fn(ColumnId) -> &'a Value) -> bool {
        self.conditions.iter().all(|condition| condition.matches(&column))
    }
}

impl Condition {
    pub fn column(&self) -> ColumnId {
        match *self {
            Condition::Eq(column, _) | Condition::In(column, _) | Condition::IsNull(column) => {
                column
            }
        }
    }

    fn matches<'a>(&self, column: &impl Fn(ColumnId) -> &'a Value) -> bool {
        let actual = column(self.column());
        match self {
            Condition::Eq(_, expected) => !actual.is_null() && actual == expected,
            Condition::In(_, values) => {
                !actual.is_null() && values.iter().any(|value| value == actual)
            }
            Condition::IsNull(_) => actual.is_null(),
        }
    }
}
