use super::{Column, ColumnId, ForeignKey, Table, TableId};

/// The tables produced while building persisters.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    pub tables: Vec<Table>,
}

impl Schema {
    pub fn column(&self, id: impl Into<ColumnId>) -> &Column {
        let id = id.into();
        self.table(id.table)
            .columns
            .get(id.index)
            .expect("invalid column ID")
    }

    pub fn table(&self, id: impl Into<TableId>) -> &Table {
        self.tables.get(id.into().0).expect("invalid table ID")
    }

    pub fn table_by_name(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|table| table.name == name)
    }

    /// Iterates over every foreign key referencing `table`.
    pub fn foreign_keys_referencing(
        &self,
        table: TableId,
    ) -> impl Iterator<Item = (&Table, &ForeignKey)> + '_ {
        self.tables.iter().flat_map(move |t| {
            t.foreign_keys
                .iter()
                .filter(move |fk| fk.references == table)
                .map(move |fk| (t, fk))
        })
    }
}
