use super::{ColumnId, TableId};

/// A foreign key constraint from columns of one table to the primary key of
/// another.
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKey {
    /// Unique across the schema, derived from the constrained and referenced
    /// columns.
    pub name: String,

    pub columns: Vec<ColumnId>,

    pub references: TableId,

    pub referenced_columns: Vec<ColumnId>,
}

impl ForeignKey {
    /// Returns `true` if both constraints describe the same link.
    pub fn same_link(&self, other: &ForeignKey) -> bool {
        self.columns == other.columns
            && self.references == other.references
            && self.referenced_columns == other.referenced_columns
    }
}
