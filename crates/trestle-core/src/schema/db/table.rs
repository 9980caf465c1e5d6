use super::{Column, ColumnId, ForeignKey, PrimaryKey};
use crate::stmt;

use std::fmt;

/// A database table
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    /// Uniquely identifies a table
    pub id: TableId,

    /// Name of the table
    pub name: String,

    /// The table's columns
    pub columns: Vec<Column>,

    pub primary_key: PrimaryKey,

    pub foreign_keys: Vec<ForeignKey>,
}

/// Uniquely identifies a table
#[derive(PartialEq, Eq, Clone, Copy, Hash)]
pub struct TableId(pub usize);

impl Table {
    pub fn new(id: TableId, name: String) -> Self {
        Self {
            id,
            name,
            columns: vec![],
            primary_key: PrimaryKey { columns: vec![] },
            foreign_keys: vec![],
        }
    }

    pub fn primary_key_columns(&self) -> impl ExactSizeIterator<Item = &Column> + '_ {
        self.primary_key
            .columns
            .iter()
            .map(|column_id| &self.columns[column_id.index])
    }

    pub fn column(&self, id: impl Into<ColumnId>) -> &Column {
        &self.columns[id.into().index]
    }

    pub fn column_by_name(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn foreign_key_by_name(&self, name: &str) -> Option<&ForeignKey> {
        self.foreign_keys.iter().find(|fk| fk.name == name)
    }

    /// Appends a column and returns its id.
    pub fn push_column(
        &mut self,
        name: String,
        ty: stmt::Type,
        nullable: bool,
        primary_key: bool,
        auto_increment: bool,
    ) -> ColumnId {
        let id = ColumnId {
            table: self.id,
            index: self.columns.len(),
        };

        self.columns.push(Column {
            id,
            name,
            ty,
            nullable,
            primary_key,
            auto_increment,
        });

        if primary_key {
            self.primary_key.columns.push(id);
        }

        id
    }
}

impl TableId {
    pub fn placeholder() -> Self {
        Self(usize::MAX)
    }
}

impl fmt::Debug for TableId {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "TableId({})", self.0)
    }
}
