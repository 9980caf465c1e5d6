use super::ColumnId;

#[derive(Debug, Clone, PartialEq)]
pub struct PrimaryKey {
    /// Columns that make up the primary key
    pub columns: Vec<ColumnId>,
}
