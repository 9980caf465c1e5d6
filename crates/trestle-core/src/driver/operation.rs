use crate::{
    schema::db::{ColumnId, TableId},
    stmt::{Filter, Select, Value, ValueRecord},
};

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Insert one or more rows
    Insert(Insert),

    /// Update the rows matching a filter
    Update(Update),

    /// Delete the rows matching a filter
    Delete(Delete),

    /// Select rows of a join tree
    Select(Select),

    /// Concatenate the rows of several selects with aligned projections
    Union(Vec<Select>),
}

/// Insert rows into a table.
///
/// Every row carries one value per entry of `columns`.
#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    pub table: TableId,

    pub columns: Vec<ColumnId>,

    pub rows: Vec<ValueRecord>,

    /// When set, the response carries the value of this column for each
    /// inserted row, in order. Used for store-assigned identifiers.
    pub returning: Option<ColumnId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub table: TableId,

    pub assignments: Vec<(ColumnId, Value)>,

    pub filter: Filter,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    pub table: TableId,

    pub filter: Filter,
}

impl Operation {
    /// The table written by this operation, if it is a write.
    pub fn written_table(&self) -> Option<TableId> {
        match self {
            Operation::Insert(op) => Some(op.table),
            Operation::Update(op) => Some(op.table),
            Operation::Delete(op) => Some(op.table),
            Operation::Select(_) | Operation::Union(_) => None,
        }
    }

    pub fn is_insert(&self) -> bool {
        matches!(self, Operation::Insert(_))
    }

    pub fn is_update(&self) -> bool {
        matches!(self, Operation::Update(_))
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, Operation::Delete(_))
    }

    pub fn is_read(&self) -> bool {
        matches!(self, Operation::Select(_) | Operation::Union(_))
    }
}

impl From<Insert> for Operation {
    fn from(value: Insert) -> Self {
        Self::Insert(value)
    }
}

impl From<Update> for Operation {
    fn from(value: Update) -> Self {
        Self::Update(value)
    }
}

impl From<Delete> for Operation {
    fn from(value: Delete) -> Self {
        Self::Delete(value)
    }
}

impl From<Select> for Operation {
    fn from(value: Select) -> Self {
        Self::Select(value)
    }
}
