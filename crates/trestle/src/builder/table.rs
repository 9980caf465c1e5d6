use super::BuildContext;
use crate::persister::MappedColumn;

use std::any::TypeId;
use trestle_core::{
    schema::{
        app::{EntityMapping, Identifier, IdentifierPolicy, Property},
        db::{ColumnId, ForeignKey, TableId},
    },
    stmt::Type,
    Error, Result,
};

/// What a table was created for. Two descriptors may share a table only if
/// they claim it for the same reason.
#[derive(Debug, Clone)]
pub(super) struct TableOwner {
    key: (TypeId, Option<String>),
    description: String,
}

pub(super) struct ColumnSpec<'a> {
    pub(super) name: &'a str,
    pub(super) ty: Type,
    pub(super) nullable: bool,
    pub(super) primary_key: bool,
    pub(super) auto_increment: bool,
}

impl TableOwner {
    pub(super) fn entity(mapping: &EntityMapping) -> TableOwner {
        TableOwner {
            key: (mapping.entity_type, None),
            description: format!("entity `{}`", mapping.name),
        }
    }

    pub(super) fn sub_type(mapping: &EntityMapping, discriminator: &str) -> TableOwner {
        TableOwner {
            key: (mapping.entity_type, Some(format!("sub-type:{discriminator}"))),
            description: format!("sub-type `{discriminator}` of `{}`", mapping.name),
        }
    }

    pub(super) fn association(mapping: &EntityMapping, relation: &str) -> TableOwner {
        TableOwner {
            key: (mapping.entity_type, Some(format!("relation:{relation}"))),
            description: format!("relation `{}.{relation}`", mapping.name),
        }
    }
}

impl PartialEq for TableOwner {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl BuildContext<'_> {
    pub(super) fn table_name(&self, name: &str) -> String {
        if let Some(prefix) = &self.builder.table_name_prefix {
            format!("{prefix}{name}")
        } else {
            name.to_string()
        }
    }

    /// Table name of an entity without the prefix.
    pub(super) fn entity_base_name(mapping: &EntityMapping) -> String {
        mapping
            .table_name
            .clone()
            .unwrap_or_else(|| mapping.name.snake_case())
    }

    pub(super) fn entity_table_name(&self, mapping: &EntityMapping) -> String {
        self.table_name(&Self::entity_base_name(mapping))
    }

    /// Returns the table named `name`, creating it if needed.
    ///
    /// Reusing an existing table is only allowed when it was claimed by the
    /// same owner; anything else is a collision.
    pub(super) fn resolve_table(&mut self, name: String, owner: TableOwner) -> Result<TableId> {
        if let Some(&id) = self.table_lookup.get(&name) {
            let existing = &self.table_owners[id.0];
            if *existing != owner {
                return Err(Error::invalid_mapping(format!(
                    "table `{name}` is claimed by both {} and {}",
                    existing.description, owner.description
                )));
            }
            return Ok(id);
        }

        let id = self.register_table(&name);
        self.tables.push(trestle_core::schema::db::Table::new(id, name));
        self.table_owners.push(owner);
        Ok(id)
    }

    fn register_table(&mut self, name: impl AsRef<str>) -> TableId {
        let id = TableId(self.table_lookup.len());
        self.table_lookup.insert(name.as_ref().to_string(), id);
        id
    }

    /// Adds a column, or returns the existing one when an identical
    /// definition was already added. Nullability widens; any other
    /// difference is a conflict.
    pub(super) fn add_column(&mut self, table: TableId, spec: ColumnSpec<'_>) -> Result<ColumnId> {
        let table = &mut self.tables[table.0];

        if let Some(index) = table.columns.iter().position(|c| c.name == spec.name) {
            let column = &mut table.columns[index];

            if column.ty != spec.ty
                || column.primary_key != spec.primary_key
                || column.auto_increment != spec.auto_increment
            {
                return Err(Error::invalid_mapping(format!(
                    "column `{}.{}` is mapped twice with different definitions",
                    table.name, spec.name
                )));
            }

            column.nullable |= spec.nullable;
            return Ok(column.id);
        }

        Ok(table.push_column(
            spec.name.to_string(),
            spec.ty,
            spec.nullable,
            spec.primary_key,
            spec.auto_increment,
        ))
    }

    pub(super) fn identifier_column(
        &mut self,
        table: TableId,
        mapping: &EntityMapping,
    ) -> Result<ColumnId> {
        let identifier = &mapping.identifier;
        self.add_column(
            table,
            ColumnSpec {
                name: &identifier.column,
                ty: identifier.ty,
                nullable: false,
                primary_key: true,
                auto_increment: matches!(identifier.policy, IdentifierPolicy::AutoIncrement),
            },
        )
    }

    /// Adds the identifier column of a table whose rows extend a parent row.
    pub(super) fn inherited_identifier_column(
        &mut self,
        table: TableId,
        identifier: &Identifier,
    ) -> Result<ColumnId> {
        self.add_column(
            table,
            ColumnSpec {
                name: &identifier.column,
                ty: identifier.ty,
                nullable: false,
                primary_key: true,
                auto_increment: false,
            },
        )
    }

    pub(super) fn map_properties(
        &mut self,
        table: TableId,
        properties: &[Property],
        force_nullable: bool,
    ) -> Result<Vec<MappedColumn>> {
        properties
            .iter()
            .map(|property| {
                let column = self.add_column(
                    table,
                    ColumnSpec {
                        name: &property.column,
                        ty: property.ty,
                        nullable: property.nullable || force_nullable,
                        primary_key: false,
                        auto_increment: false,
                    },
                )?;

                Ok(MappedColumn {
                    column,
                    property: property.clone(),
                })
            })
            .collect()
    }

    /// Adds a foreign key from `column` to `referenced`, named
    /// `fk_{table}_{column}_{referenced table}_{referenced column}`.
    pub(super) fn add_foreign_key(&mut self, column: ColumnId, referenced: ColumnId) -> Result<()> {
        let name = {
            let table = &self.tables[column.table.0];
            let referenced_table = &self.tables[referenced.table.0];
            format!(
                "fk_{}_{}_{}_{}",
                table.name,
                table.columns[column.index].name,
                referenced_table.name,
                referenced_table.columns[referenced.index].name
            )
        };

        let foreign_key = ForeignKey {
            name,
            columns: vec![column],
            references: referenced.table,
            referenced_columns: vec![referenced],
        };

        let table = &mut self.tables[column.table.0];
        if let Some(existing) = table.foreign_key_by_name(&foreign_key.name) {
            if !existing.same_link(&foreign_key) {
                return Err(Error::invalid_mapping(format!(
                    "foreign key `{}` is defined twice with different columns",
                    foreign_key.name
                )));
            }
            return Ok(());
        }

        table.foreign_keys.push(foreign_key);
        Ok(())
    }
}
