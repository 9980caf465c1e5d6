use super::{
    table::{ColumnSpec, TableOwner},
    BuildContext,
};
use crate::persister::{Ownership, Persister, PersisterId};

use trestle_core::{
    schema::{
        app::{
            AssociationTableHint, CascadeMode, EntityMapping, OwnershipHint, Relation,
            RelationAccessor, RelationKind, ReverseAccessor,
        },
        db::{ColumnId, TableId},
    },
    stmt::Type,
    Error, Result,
};

/// Which side stores a relation's link, decided from the descriptors
/// before any column exists.
#[derive(Debug)]
enum Decision {
    SourceOwned {
        column: String,
    },
    TargetOwned {
        column: String,
        reverse: Option<ReverseAccessor>,
    },
    AssociationTable(AssociationTableHint),
}

impl BuildContext<'_> {
    /// Decides which side owns `relation` and creates the link columns,
    /// tables and foreign keys.
    pub(super) fn resolve_ownership(
        &mut self,
        owner: &Persister,
        relation: &Relation,
        target: PersisterId,
    ) -> Result<Ownership> {
        let target_skeleton = self.skeleton(target);
        let owner_name = &owner.mapping.name;
        let target_mapping = &target_skeleton.mapping;

        let pair = find_pair(owner, relation, target_mapping)?;
        let decision = decide(owner_name.to_string(), relation, pair)?;

        if relation.cascade == CascadeMode::AssociationOnly
            && !matches!(decision, Decision::AssociationTable(_))
        {
            return Err(Error::invalid_mapping(format!(
                "`{owner_name}.{}` uses association-only cascade but is not stored in an association table",
                relation.name
            )));
        }

        match decision {
            Decision::SourceOwned { column } => {
                let Some(table) = owner.table else {
                    return Err(Error::unsupported_feature(format!(
                        "`{owner_name}.{}` stores a foreign key in a table-per-class hierarchy",
                        relation.name
                    )));
                };

                let column = self.add_column(
                    table,
                    ColumnSpec {
                        name: &column,
                        ty: target_mapping.identifier.ty,
                        nullable: !relation.mandatory,
                        primary_key: false,
                        auto_increment: false,
                    },
                )?;

                if let Some(referenced) = target_skeleton.id_column {
                    self.add_foreign_key(column, referenced)?;
                }

                Ok(Ownership::SourceOwned { column })
            }
            Decision::TargetOwned { column, reverse } => {
                let Some(table) = target_skeleton.table else {
                    return Err(Error::unsupported_feature(format!(
                        "`{owner_name}.{}` is mapped by the target, which uses a table-per-class hierarchy",
                        relation.name
                    )));
                };

                let column = self.add_column(
                    table,
                    ColumnSpec {
                        name: &column,
                        ty: owner.mapping.identifier.ty,
                        nullable: true,
                        primary_key: false,
                        auto_increment: false,
                    },
                )?;

                if let Some(referenced) = owner.id_column {
                    self.add_foreign_key(column, referenced)?;
                }

                let index = match &relation.index_column {
                    Some(name) => Some(self.index_column(table, name)?),
                    None => None,
                };

                Ok(Ownership::TargetOwned {
                    column,
                    index,
                    reverse,
                })
            }
            Decision::AssociationTable(hint) => {
                let owner_table = Self::entity_base_name(&owner.mapping);
                let name = hint
                    .name
                    .unwrap_or_else(|| format!("{owner_table}_{}", relation.name));
                let source_name = hint.source_column.unwrap_or_else(|| {
                    format!("{owner_table}_{}", owner.mapping.identifier.column)
                });
                let target_name = hint.target_column.unwrap_or_else(|| {
                    format!("{}_{}", relation.name, target_mapping.identifier.column)
                });

                if source_name == target_name {
                    return Err(Error::invalid_mapping(format!(
                        "association table of `{owner_name}.{}` uses `{source_name}` for both sides",
                        relation.name
                    )));
                }

                let table = self.resolve_table(
                    self.table_name(&name),
                    TableOwner::association(&owner.mapping, &relation.name),
                )?;

                let source = self.add_column(
                    table,
                    ColumnSpec {
                        name: &source_name,
                        ty: owner.mapping.identifier.ty,
                        nullable: false,
                        primary_key: true,
                        auto_increment: false,
                    },
                )?;
                let target = self.add_column(
                    table,
                    ColumnSpec {
                        name: &target_name,
                        ty: target_mapping.identifier.ty,
                        nullable: false,
                        primary_key: true,
                        auto_increment: false,
                    },
                )?;

                if let Some(referenced) = owner.id_column {
                    self.add_foreign_key(source, referenced)?;
                }
                if let Some(referenced) = target_skeleton.id_column {
                    self.add_foreign_key(target, referenced)?;
                }

                let index = match &relation.index_column {
                    Some(name) => Some(self.index_column(table, name)?),
                    None => None,
                };

                Ok(Ownership::AssociationTable {
                    table,
                    source,
                    target,
                    index,
                })
            }
        }
    }

    fn index_column(
        &mut self,
        table: TableId,
        name: &str,
    ) -> Result<ColumnId> {
        self.add_column(
            table,
            ColumnSpec {
                name,
                ty: Type::I32,
                nullable: true,
                primary_key: false,
                auto_increment: false,
            },
        )
    }
}

/// Finds the inverse relation declared on the target: the explicit pair,
/// or the relation named by a `mapped_by` reverse accessor.
fn find_pair<'a>(
    owner: &Persister,
    relation: &Relation,
    target: &'a EntityMapping,
) -> Result<Option<&'a Relation>> {
    let name = match (&relation.pair, &relation.ownership) {
        (Some(name), _) => name,
        (
            None,
            OwnershipHint::MappedBy {
                reverse: Some(reverse),
                ..
            },
        ) => match target.relation(&reverse.name) {
            Some(_) => &reverse.name,
            None => return Ok(None),
        },
        _ => return Ok(None),
    };

    let Some(pair) = target.relation(name) else {
        return Err(Error::invalid_mapping(format!(
            "`{}.{}` is paired with `{}.{name}`, which does not exist",
            owner.mapping.name, relation.name, target.name
        )));
    };

    if pair.target_type != owner.mapping.entity_type {
        return Err(Error::invalid_mapping(format!(
            "`{}.{}` is paired with `{}.{name}`, which does not point back at `{}`",
            owner.mapping.name, relation.name, target.name, owner.mapping.name
        )));
    }

    if let Some(back) = &pair.pair {
        if *back != relation.name {
            return Err(Error::invalid_mapping(format!(
                "`{}.{}` is paired with `{}.{name}`, which is paired with `{back}`",
                owner.mapping.name, relation.name, target.name
            )));
        }
    }

    Ok(Some(pair))
}

/// Column a one-to-one relation stores its link in when it owns it.
fn source_column(relation: &Relation) -> String {
    match &relation.ownership {
        OwnershipHint::ForeignKey {
            column: Some(column),
        } => column.clone(),
        _ => format!("{}_id", relation.name),
    }
}

/// Reverse accessor built from the pair's own single-valued accessor.
fn reverse_from(pair: &Relation) -> Option<ReverseAccessor> {
    match &pair.accessor {
        RelationAccessor::One { get, set } => Some(ReverseAccessor {
            name: pair.name.clone(),
            get: get.clone(),
            set: set.clone(),
        }),
        RelationAccessor::Many { .. } => None,
    }
}

fn decide(owner: String, relation: &Relation, pair: Option<&Relation>) -> Result<Decision> {
    let name = &relation.name;

    let ambiguous = |message: &str| {
        Err(Error::invalid_mapping(format!(
            "ownership of `{owner}.{name}` cannot be decided: {message}"
        )))
    };

    match (&relation.ownership, relation.kind) {
        (OwnershipHint::AssociationTable(hint), _) => Ok(Decision::AssociationTable(hint.clone())),
        (OwnershipHint::ForeignKey { .. }, RelationKind::OneToMany | RelationKind::ManyToMany) => {
            Err(Error::invalid_mapping(format!(
                "collection `{owner}.{name}` cannot store a foreign key in its owner; use `mapped_by` or an association table"
            )))
        }
        (OwnershipHint::MappedBy { .. }, RelationKind::ManyToMany) => {
            Err(Error::invalid_mapping(format!(
                "many-to-many `{owner}.{name}` cannot be mapped by its target; use an association table"
            )))
        }
        (_, RelationKind::ManyToMany) if pair.is_some() => Err(Error::unsupported_feature(
            format!("paired many-to-many relation `{owner}.{name}`"),
        )),
        (OwnershipHint::ForeignKey { .. }, RelationKind::OneToOne) => {
            if let Some(pair) = pair {
                if matches!(pair.ownership, OwnershipHint::ForeignKey { .. }) {
                    return ambiguous(&format!(
                        "both it and `{}` declare a foreign key",
                        pair.name
                    ));
                }
            }
            Ok(Decision::SourceOwned {
                column: source_column(relation),
            })
        }
        (OwnershipHint::MappedBy { column, reverse }, _) => {
            let pair_column = match pair {
                Some(pair) if matches!(pair.ownership, OwnershipHint::MappedBy { .. }) => {
                    return ambiguous(&format!(
                        "both it and `{}` declare `mapped_by`",
                        pair.name
                    ));
                }
                Some(pair) if pair.kind == RelationKind::OneToOne => Some(source_column(pair)),
                _ => None,
            };

            let column = match (column, pair_column) {
                (Some(column), Some(pair_column)) if *column != pair_column => {
                    return Err(Error::invalid_mapping(format!(
                        "`{owner}.{name}` is mapped by column `{column}` but its pair stores the link in `{pair_column}`"
                    )));
                }
                (Some(column), _) => column.clone(),
                (None, Some(pair_column)) => pair_column,
                (None, None) => match reverse {
                    Some(reverse) => format!("{}_id", reverse.name),
                    None => {
                        return ambiguous("`mapped_by` needs a column or a reverse accessor");
                    }
                },
            };

            let reverse = reverse.clone().or_else(|| pair.and_then(reverse_from));
            Ok(Decision::TargetOwned { column, reverse })
        }
        (OwnershipHint::Unspecified, RelationKind::OneToOne) => match pair {
            None => Ok(Decision::SourceOwned {
                column: source_column(relation),
            }),
            Some(pair) => match &pair.ownership {
                OwnershipHint::ForeignKey { .. } => Ok(Decision::TargetOwned {
                    column: source_column(pair),
                    reverse: reverse_from(pair),
                }),
                OwnershipHint::MappedBy { column, .. } => Ok(Decision::SourceOwned {
                    column: column.clone().unwrap_or_else(|| source_column(relation)),
                }),
                OwnershipHint::Unspecified if pair.kind.is_collection() => {
                    Ok(Decision::SourceOwned {
                        column: source_column(relation),
                    })
                }
                _ => ambiguous(&format!(
                    "declare `foreign_key` or `mapped_by` on it or on `{}`",
                    pair.name
                )),
            },
        },
        (OwnershipHint::Unspecified, RelationKind::OneToMany) => match pair {
            Some(pair)
                if pair.kind == RelationKind::OneToOne
                    && matches!(
                        pair.ownership,
                        OwnershipHint::Unspecified | OwnershipHint::ForeignKey { .. }
                    ) =>
            {
                Ok(Decision::TargetOwned {
                    column: source_column(pair),
                    reverse: reverse_from(pair),
                })
            }
            Some(pair) => ambiguous(&format!(
                "its pair `{}` does not store a foreign key",
                pair.name
            )),
            None => Ok(Decision::AssociationTable(AssociationTableHint::default())),
        },
        (OwnershipHint::Unspecified, RelationKind::ManyToMany) => {
            Ok(Decision::AssociationTable(AssociationTableHint::default()))
        }
    }
}
