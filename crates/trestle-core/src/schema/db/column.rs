use super::{table, TableId};
use crate::stmt;

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Uniquely identifies the column in the schema.
    pub id: ColumnId,

    /// The name of the column in the database.
    pub name: String,

    /// The column type
    pub ty: stmt::Type,

    /// Whether or not the column is nullable
    pub nullable: bool,

    /// True if the column is part of the table's primary key
    pub primary_key: bool,

    /// True if the store assigns the value on insert.
    pub auto_increment: bool,
}

#[derive(PartialEq, Eq, Clone, Copy, Hash)]
pub struct ColumnId {
    pub table: TableId,
    pub index: usize,
}

impl ColumnId {
    pub fn placeholder() -> Self {
        Self {
            table: table::TableId::placeholder(),
            index: usize::MAX,
        }
    }
}

impl From<&Column> for ColumnId {
    fn from(value: &Column) -> Self {
        value.id
    }
}

impl fmt::Debug for ColumnId {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "ColumnId({}/{})", self.table.0, self.index)
    }
}
