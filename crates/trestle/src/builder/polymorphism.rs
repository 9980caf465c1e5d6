use super::{
    table::{ColumnSpec, TableOwner},
    BuildContext,
};
use crate::persister::{Layout, SubPersister};

use heck::ToSnakeCase;
use trestle_core::{
    schema::{
        app::{EntityMapping, IdentifierPolicy, PolymorphismKind, SubType},
        db::{ColumnId, TableId},
    },
    stmt::Type,
    Error, Result,
};

impl BuildContext<'_> {
    /// Lays out the sub-types of `mapping`. `table` and `id_column` are the
    /// parent table, absent for table-per-class hierarchies.
    pub(super) fn build_layout(
        &mut self,
        mapping: &EntityMapping,
        table: Option<TableId>,
        id_column: Option<ColumnId>,
    ) -> Result<Layout> {
        let Some(polymorphism) = &mapping.polymorphism else {
            return Ok(Layout::Plain);
        };

        tracing::debug!(
            entity = %mapping.name,
            kind = ?polymorphism.kind,
            sub_types = polymorphism.sub_types.len(),
            "laying out sub-types"
        );

        match (&polymorphism.kind, table, id_column) {
            (PolymorphismKind::SingleTable { discriminator }, Some(table), Some(id_column)) => {
                let discriminator = self.discriminator_column(table, discriminator)?;

                let sub_types = polymorphism
                    .sub_types
                    .iter()
                    .map(|sub_type| {
                        Ok(SubPersister {
                            sub_type: sub_type.clone(),
                            table,
                            id_column,
                            columns: self.map_properties(table, &sub_type.properties, true)?,
                            common: 0,
                        })
                    })
                    .collect::<Result<_>>()?;

                Ok(Layout::SingleTable {
                    discriminator,
                    sub_types,
                })
            }
            (PolymorphismKind::JoinedTables { discriminator }, Some(table), Some(id_column)) => {
                let discriminator = match discriminator {
                    Some(name) => Some(self.discriminator_column(table, name)?),
                    None => None,
                };

                let sub_types = polymorphism
                    .sub_types
                    .iter()
                    .map(|sub_type| {
                        let sub_table = self.sub_type_table(mapping, sub_type)?;
                        let sub_id =
                            self.inherited_identifier_column(sub_table, &mapping.identifier)?;
                        self.add_foreign_key(sub_id, id_column)?;

                        Ok(SubPersister {
                            sub_type: sub_type.clone(),
                            table: sub_table,
                            id_column: sub_id,
                            columns: self.map_properties(sub_table, &sub_type.properties, false)?,
                            common: 0,
                        })
                    })
                    .collect::<Result<_>>()?;

                Ok(Layout::JoinedTables {
                    discriminator,
                    sub_types,
                })
            }
            (PolymorphismKind::TablePerClass, None, None) => {
                if let IdentifierPolicy::AutoIncrement = mapping.identifier.policy {
                    return Err(Error::unsupported_feature(format!(
                        "`{}` uses table-per-class polymorphism with store-assigned identifiers, \
                         which cannot be kept unique across sub-type tables",
                        mapping.name
                    )));
                }

                let sub_types = polymorphism
                    .sub_types
                    .iter()
                    .map(|sub_type| {
                        let sub_table = self.sub_type_table(mapping, sub_type)?;
                        let sub_id = self.identifier_column(sub_table, mapping)?;

                        let mut columns =
                            self.map_properties(sub_table, &mapping.properties, false)?;
                        let common = columns.len();
                        columns.extend(self.map_properties(
                            sub_table,
                            &sub_type.properties,
                            false,
                        )?);

                        Ok(SubPersister {
                            sub_type: sub_type.clone(),
                            table: sub_table,
                            id_column: sub_id,
                            columns,
                            common,
                        })
                    })
                    .collect::<Result<_>>()?;

                Ok(Layout::TablePerClass { sub_types })
            }
            (kind, ..) => Err(trestle_core::err!(
                "`{}` has a {kind:?} layout without a matching parent table",
                mapping.name
            )),
        }
    }

    fn discriminator_column(&mut self, table: TableId, name: &str) -> Result<ColumnId> {
        self.add_column(
            table,
            ColumnSpec {
                name,
                ty: Type::String,
                nullable: false,
                primary_key: false,
                auto_increment: false,
            },
        )
    }

    fn sub_type_table(&mut self, mapping: &EntityMapping, sub_type: &SubType) -> Result<TableId> {
        let name = sub_type
            .table_name
            .clone()
            .unwrap_or_else(|| sub_type.discriminator.to_snake_case());

        self.resolve_table(
            self.table_name(&name),
            TableOwner::sub_type(mapping, &sub_type.discriminator),
        )
    }
}
