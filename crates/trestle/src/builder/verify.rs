use crate::persister::{Ownership, Persister};

use std::collections::HashSet;
use trestle_core::{
    schema::db::{ColumnId, Schema},
    Error, Result,
};

struct Verify<'a> {
    schema: &'a Schema,
    persisters: &'a [Persister],
}

/// Checks the finished tables and persisters agree with each other.
pub(super) fn verify(schema: &Schema, persisters: &[Persister]) -> Result<()> {
    Verify { schema, persisters }.verify()
}

impl Verify<'_> {
    fn verify(&self) -> Result<()> {
        debug_assert!(self.verify_ids_populated());

        self.verify_each_table_has_a_primary_key()?;
        self.verify_foreign_key_names_are_unique()?;
        self.verify_foreign_key_types()?;
        self.verify_relation_columns_exist()?;
        Ok(())
    }

    fn verify_ids_populated(&self) -> bool {
        for (index, table) in self.schema.tables.iter().enumerate() {
            assert_eq!(table.id.0, index);

            for (index, column) in table.columns.iter().enumerate() {
                assert_eq!(column.id.table, table.id);
                assert_eq!(column.id.index, index);
            }
        }

        for (index, persister) in self.persisters.iter().enumerate() {
            assert_eq!(persister.id.0, index);
        }

        true
    }

    fn verify_each_table_has_a_primary_key(&self) -> Result<()> {
        for table in &self.schema.tables {
            if table.primary_key.columns.is_empty() {
                return Err(Error::invalid_mapping(format!(
                    "table `{}` has no primary key",
                    table.name
                )));
            }
        }
        Ok(())
    }

    fn verify_foreign_key_names_are_unique(&self) -> Result<()> {
        let mut names = HashSet::new();

        for table in &self.schema.tables {
            for foreign_key in &table.foreign_keys {
                if !names.insert(&foreign_key.name) {
                    return Err(Error::invalid_mapping(format!(
                        "foreign key name `{}` is used more than once",
                        foreign_key.name
                    )));
                }
            }
        }
        Ok(())
    }

    fn verify_foreign_key_types(&self) -> Result<()> {
        for table in &self.schema.tables {
            for foreign_key in &table.foreign_keys {
                for (column, referenced) in foreign_key
                    .columns
                    .iter()
                    .zip(&foreign_key.referenced_columns)
                {
                    let column = self.column(*column)?;
                    let referenced = self.column(*referenced)?;

                    if column.ty != referenced.ty {
                        return Err(Error::invalid_mapping(format!(
                            "foreign key `{}` links `{}` ({:?}) to `{}` ({:?})",
                            foreign_key.name,
                            column.name,
                            column.ty,
                            referenced.name,
                            referenced.ty
                        )));
                    }

                    if !referenced.primary_key {
                        return Err(Error::invalid_mapping(format!(
                            "foreign key `{}` references `{}`, which is not a primary key",
                            foreign_key.name, referenced.name
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn verify_relation_columns_exist(&self) -> Result<()> {
        for persister in self.persisters {
            for relation in &persister.relations {
                match &relation.ownership {
                    Ownership::SourceOwned { column } => {
                        self.column(*column)?;
                    }
                    Ownership::TargetOwned { column, index, .. } => {
                        self.column(*column)?;
                        if let Some(index) = index {
                            self.column(*index)?;
                        }
                    }
                    Ownership::AssociationTable {
                        source,
                        target,
                        index,
                        ..
                    } => {
                        self.column(*source)?;
                        self.column(*target)?;
                        if let Some(index) = index {
                            self.column(*index)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn column(&self, id: ColumnId) -> Result<&trestle_core::schema::db::Column> {
        self.schema
            .tables
            .get(id.table.0)
            .and_then(|table| table.columns.get(id.index))
            .ok_or_else(|| trestle_core::err!("column {id:?} does not exist"))
    }
}
