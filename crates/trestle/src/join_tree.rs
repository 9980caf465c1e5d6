//! The select plan of a persister: which tables are joined to load an
//! entity with its eager relations, and where each value lands in a row.

use crate::persister::{Layout, Ownership, Persister, PersisterId, Persisters};

use std::collections::HashMap;
use trestle_core::{
    driver::Operation,
    schema::{app::Property, db::ColumnId},
    stmt::{Filter, JoinKind, ProjectionExpr, Select, Value},
    Result,
};

/// Joined select loading one entity type and its eager relations.
///
/// Table-per-class hierarchies have no common table; they are read through
/// a union with one branch per sub-type, all projecting the same slots.
#[derive(Debug)]
pub struct JoinTree {
    branches: Vec<Branch>,
    pub(crate) root: EntityShape,
}

#[derive(Debug)]
struct Branch {
    select: Select,

    /// Identifier column of the branch's root table.
    id_column: ColumnId,
}

/// Where an entity's values are found in a row.
#[derive(Debug)]
pub(crate) struct EntityShape {
    pub(crate) persister: PersisterId,
    pub(crate) id: usize,
    pub(crate) columns: Vec<(usize, Property)>,
    pub(crate) variant: VariantShape,
    pub(crate) relations: Vec<RelationShape>,
    pub(crate) deferred: Vec<DeferredShape>,
}

#[derive(Debug)]
pub(crate) enum VariantShape {
    None,

    /// The sub-type is named by the value in slot `discriminator`.
    Discriminated {
        discriminator: usize,
        sub_columns: Vec<Vec<(usize, Property)>>,
    },

    /// The sub-type is the first whose identifier slot is not null.
    Probed {
        sub_ids: Vec<usize>,
        sub_columns: Vec<Vec<(usize, Property)>>,
    },
}

/// A relation loaded through the same select.
#[derive(Debug)]
pub(crate) struct RelationShape {
    pub(crate) relation: usize,
    pub(crate) name: String,
    pub(crate) target: Box<EntityShape>,

    /// Slot of the element position of an indexed collection.
    pub(crate) index: Option<usize>,
}

/// A relation loaded by a follow-up select once the owners are known.
#[derive(Debug)]
pub(crate) struct DeferredShape {
    pub(crate) relation: usize,
    pub(crate) name: String,

    /// Slot of the owner's foreign key for source-owned relations. Other
    /// relations are looked up by owner identifier.
    pub(crate) key: Option<usize>,
}

/// Rows a select is restricted to.
#[derive(Debug)]
pub(crate) enum Key {
    All,

    /// Entities with these identifiers.
    Ids(Vec<Value>),

    /// Rows whose root `column` holds one of the values.
    Column(ColumnId, Vec<Value>),
}

struct Planner<'a> {
    persisters: &'a Persisters,
    eager: bool,
    select: Select,
    slots: HashMap<(usize, ColumnId), usize>,

    /// Persisters being joined, root first.
    path: Vec<PersisterId>,
}

impl JoinTree {
    pub(crate) fn build(persisters: &Persisters, id: PersisterId, eager: bool) -> JoinTree {
        let persister = persisters.persister(id);

        match (&persister.layout, persister.table, persister.id_column) {
            (Layout::TablePerClass { .. }, ..) | (_, None, _) | (_, _, None) => {
                Self::build_union(persister)
            }
            (_, Some(table), Some(id_column)) => {
                let mut planner = Planner {
                    persisters,
                    eager,
                    select: Select::new(table),
                    slots: HashMap::new(),
                    path: vec![],
                };

                let root = planner.entity(0, id);

                JoinTree {
                    branches: vec![Branch {
                        select: planner.select,
                        id_column,
                    }],
                    root,
                }
            }
        }
    }

    /// One branch per sub-type table. Every branch projects the
    /// identifier, the common columns, the specific columns of every
    /// sub-type (null outside their own branch) and a literal
    /// discriminator.
    fn build_union(persister: &Persister) -> JoinTree {
        let sub_types = persister.sub_types();
        let mut branches = vec![];
        let mut root = None;

        for (index, sub) in sub_types.iter().enumerate() {
            let mut select = Select::new(sub.table);
            let column = |column: ColumnId| ProjectionExpr::Column { node: 0, column };

            let id = select.project(
                format!("t0_{}", persister.mapping.identifier.column),
                column(sub.id_column),
            );

            let columns = sub.columns[..sub.common]
                .iter()
                .map(|mapped| {
                    let alias = format!("t0_{}", mapped.property.column);
                    (select.project(alias, column(mapped.column)), mapped.property.clone())
                })
                .collect::<Vec<_>>();

            let mut sub_columns = vec![];
            for (other_index, other) in sub_types.iter().enumerate() {
                let specific = other.columns[other.common..]
                    .iter()
                    .map(|mapped| {
                        let alias = format!("s{other_index}_{}", mapped.property.column);
                        let expr = if other_index == index {
                            column(mapped.column)
                        } else {
                            ProjectionExpr::Null
                        };
                        (select.project(alias, expr), mapped.property.clone())
                    })
                    .collect::<Vec<_>>();
                sub_columns.push(specific);
            }

            let discriminator = select.project(
                "discriminator",
                ProjectionExpr::Literal(Value::from(&sub.sub_type.discriminator)),
            );

            branches.push(Branch {
                select,
                id_column: sub.id_column,
            });

            root.get_or_insert_with(|| EntityShape {
                persister: persister.id,
                id,
                columns,
                variant: VariantShape::Discriminated {
                    discriminator,
                    sub_columns,
                },
                relations: vec![],
                deferred: persister
                    .relations
                    .iter()
                    .enumerate()
                    .map(|(relation, rel)| DeferredShape {
                        relation,
                        name: rel.relation.name.clone(),
                        key: None,
                    })
                    .collect(),
            });
        }

        JoinTree {
            branches,
            root: root.unwrap_or_else(|| EntityShape {
                persister: persister.id,
                id: 0,
                columns: vec![],
                variant: VariantShape::None,
                relations: vec![],
                deferred: vec![],
            }),
        }
    }

    /// The selects issued to load every entity; more than one for a union.
    pub fn selects(&self) -> impl ExactSizeIterator<Item = &Select> + '_ {
        self.branches.iter().map(|branch| &branch.select)
    }

    /// Dotted paths of the relations loaded through joins.
    pub fn joined_paths(&self) -> Vec<String> {
        let mut paths = vec![];
        collect_paths(&self.root, "", &mut paths, &mut vec![]);
        paths
    }

    /// Dotted paths of the relations loaded by follow-up selects.
    pub fn deferred_paths(&self) -> Vec<String> {
        let mut paths = vec![];
        collect_paths(&self.root, "", &mut vec![], &mut paths);
        paths
    }

    /// Number of values in each returned row, before `extra` columns.
    pub(crate) fn width(&self) -> usize {
        self.branches
            .first()
            .map(|branch| branch.select.projection.len())
            .unwrap_or_default()
    }

    /// Builds the operation loading the rows matching `key`. `extra` root
    /// columns are projected after the planned slots, starting at
    /// [`JoinTree::width`].
    pub(crate) fn operation(&self, key: &Key, extra: &[ColumnId]) -> Result<Operation> {
        if self.branches.len() != 1 && (matches!(key, Key::Column(..)) || !extra.is_empty()) {
            trestle_core::bail!("a union can only be filtered by identifier");
        }

        let mut selects = self
            .branches
            .iter()
            .map(|branch| {
                let mut select = branch.select.clone();

                select.filter = match key {
                    Key::All => Filter::all(),
                    Key::Ids(ids) => Filter::in_list(branch.id_column, ids.clone()),
                    Key::Column(column, values) => Filter::in_list(*column, values.clone()),
                };

                for column in extra {
                    select.project(
                        format!("x_{}", column.index),
                        ProjectionExpr::Column {
                            node: 0,
                            column: *column,
                        },
                    );
                }

                select
            })
            .collect::<Vec<_>>();

        Ok(match selects.len() {
            1 => Operation::Select(selects.remove(0)),
            _ => Operation::Union(selects),
        })
    }
}

fn collect_paths(
    shape: &EntityShape,
    prefix: &str,
    joined: &mut Vec<String>,
    deferred: &mut Vec<String>,
) {
    for relation in &shape.relations {
        let path = format!("{prefix}{}", relation.name);
        joined.push(path.clone());
        collect_paths(&relation.target, &format!("{path}."), joined, deferred);
    }

    for relation in &shape.deferred {
        deferred.push(format!("{prefix}{}", relation.name));
    }
}

impl Planner<'_> {
    /// Projects the entity bound to `node` and joins its eager relations.
    fn entity(&mut self, node: usize, id: PersisterId) -> EntityShape {
        let persisters = self.persisters;
        let persister = persisters.persister(id);
        self.path.push(id);

        let id_slot = match persister.id_column {
            Some(column) => self.project(node, column),
            None => 0,
        };

        let columns = persister
            .columns
            .iter()
            .map(|mapped| (self.project(node, mapped.column), mapped.property.clone()))
            .collect();

        let variant = self.variant(node, persister);

        let mut relations = vec![];
        let mut deferred = vec![];

        for (index, relation) in persister.relations.iter().enumerate() {
            let target = persisters.persister(relation.target);

            let defer = !self.eager
                || relation.relation.fetch_separately
                || self.path.contains(&relation.target)
                || target.table.is_none()
                || target.id_column.is_none();

            if defer {
                let key = match &relation.ownership {
                    Ownership::SourceOwned { column } => Some(self.project(node, *column)),
                    _ => None,
                };

                deferred.push(DeferredShape {
                    relation: index,
                    name: relation.relation.name.clone(),
                    key,
                });
                continue;
            }

            let (Some(target_table), Some(target_id)) = (target.table, target.id_column) else {
                continue;
            };
            let Some(owner_id) = persister.id_column else {
                continue;
            };

            let (target_node, index_slot) = match &relation.ownership {
                Ownership::SourceOwned { column } => {
                    let kind = if node == 0 && relation.relation.mandatory {
                        JoinKind::Inner
                    } else {
                        JoinKind::LeftOuter
                    };
                    let target_node =
                        self.select
                            .join(node, target_table, kind, vec![(*column, target_id)]);
                    (target_node, None)
                }
                Ownership::TargetOwned { column, index, .. } => {
                    let target_node = self.select.join(
                        node,
                        target_table,
                        JoinKind::LeftOuter,
                        vec![(owner_id, *column)],
                    );
                    let index_slot = index.map(|index| self.project(target_node, index));
                    (target_node, index_slot)
                }
                Ownership::AssociationTable {
                    table,
                    source,
                    target: target_column,
                    index,
                } => {
                    let link_node = self.select.join(
                        node,
                        *table,
                        JoinKind::LeftOuter,
                        vec![(owner_id, *source)],
                    );
                    let index_slot = index.map(|index| self.project(link_node, index));
                    let target_node = self.select.join(
                        link_node,
                        target_table,
                        JoinKind::LeftOuter,
                        vec![(*target_column, target_id)],
                    );
                    (target_node, index_slot)
                }
            };

            let target = self.entity(target_node, relation.target);

            relations.push(RelationShape {
                relation: index,
                name: relation.relation.name.clone(),
                target: Box::new(target),
                index: index_slot,
            });
        }

        self.path.pop();

        EntityShape {
            persister: id,
            id: id_slot,
            columns,
            variant,
            relations,
            deferred,
        }
    }

    fn variant(&mut self, node: usize, persister: &Persister) -> VariantShape {
        match &persister.layout {
            Layout::Plain | Layout::TablePerClass { .. } => VariantShape::None,
            Layout::SingleTable {
                discriminator,
                sub_types,
            } => {
                let discriminator = self.project(node, *discriminator);
                let sub_columns = sub_types
                    .iter()
                    .map(|sub| self.project_all(node, &sub.columns))
                    .collect();

                VariantShape::Discriminated {
                    discriminator,
                    sub_columns,
                }
            }
            Layout::JoinedTables {
                discriminator,
                sub_types,
            } => {
                let discriminator = discriminator.map(|column| self.project(node, column));

                let Some(parent_id) = persister.id_column else {
                    return VariantShape::None;
                };

                let mut sub_ids = vec![];
                let mut sub_columns = vec![];

                for sub in sub_types {
                    let sub_node = self.select.join(
                        node,
                        sub.table,
                        JoinKind::LeftOuter,
                        vec![(parent_id, sub.id_column)],
                    );
                    sub_ids.push(self.project(sub_node, sub.id_column));
                    sub_columns.push(self.project_all(sub_node, &sub.columns));
                }

                match discriminator {
                    Some(discriminator) => VariantShape::Discriminated {
                        discriminator,
                        sub_columns,
                    },
                    None => VariantShape::Probed {
                        sub_ids,
                        sub_columns,
                    },
                }
            }
        }
    }

    fn project_all(
        &mut self,
        node: usize,
        columns: &[crate::persister::MappedColumn],
    ) -> Vec<(usize, Property)> {
        columns
            .iter()
            .map(|mapped| (self.project(node, mapped.column), mapped.property.clone()))
            .collect()
    }

    /// Projects `column` of `node` once, returning its slot.
    fn project(&mut self, node: usize, column: ColumnId) -> usize {
        if let Some(slot) = self.slots.get(&(node, column)) {
            return *slot;
        }

        let name = &self.persisters.schema.column(column).name;
        let slot = self.select.project(
            format!("t{node}_{name}"),
            ProjectionExpr::Column { node, column },
        );
        self.slots.insert((node, column), slot);
        slot
    }
}
