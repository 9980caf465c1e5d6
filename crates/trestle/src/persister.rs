mod typed;
pub use typed::EntityPersister;

use crate::{join_tree::JoinTree, listener::Listener};

use by_address::ByAddress;
use parking_lot::RwLock;
use std::{any::TypeId, fmt, sync::Arc};
use trestle_core::{
    schema::{
        app::{EntityMapping, EntityRef, Property, Relation, ReverseAccessor, SubType},
        db::{self, ColumnId, TableId},
    },
    stmt::Value,
    Error, Result,
};

/// Identifies a persister within its [`Persisters`] graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PersisterId(pub usize);

/// The persisters built from one root mapping, with the tables they write.
///
/// Persisters refer to each other by [`PersisterId`], so cyclic mapping
/// graphs produce a finite, shared set of persisters.
pub struct Persisters {
    pub(crate) schema: Arc<db::Schema>,
    pub(crate) persisters: Vec<Persister>,
    pub(crate) root: PersisterId,
}

/// Reads and writes one mapped entity type, cascading through its
/// relations.
pub struct Persister {
    pub(crate) id: PersisterId,

    pub(crate) mapping: Arc<EntityMapping>,

    /// Main table. `None` for table-per-class hierarchies, which have no
    /// shared table.
    pub(crate) table: Option<TableId>,

    /// Identifier column of the main table.
    pub(crate) id_column: Option<ColumnId>,

    /// Common properties stored in the main table.
    pub(crate) columns: Vec<MappedColumn>,

    pub(crate) relations: Vec<RelationPersister>,

    pub(crate) layout: Layout,

    pub(crate) pipeline: Pipeline,

    pub(crate) join_tree: Option<JoinTree>,

    pub(crate) listeners: RwLock<Vec<Arc<dyn Listener>>>,
}

#[derive(Debug, Clone)]
pub(crate) struct MappedColumn {
    pub(crate) column: ColumnId,
    pub(crate) property: Property,
}

/// How rows of a polymorphic entity are spread over tables.
#[derive(Debug)]
pub(crate) enum Layout {
    Plain,

    SingleTable {
        discriminator: ColumnId,
        sub_types: Vec<SubPersister>,
    },

    JoinedTables {
        discriminator: Option<ColumnId>,
        sub_types: Vec<SubPersister>,
    },

    TablePerClass {
        sub_types: Vec<SubPersister>,
    },
}

#[derive(Debug)]
pub(crate) struct SubPersister {
    pub(crate) sub_type: SubType,

    /// Table holding the sub-type columns. The main table for single-table
    /// layouts.
    pub(crate) table: TableId,

    pub(crate) id_column: ColumnId,

    /// For table-per-class layouts the first `common` columns hold the
    /// parent's properties; the rest are the sub-type's own.
    pub(crate) columns: Vec<MappedColumn>,

    pub(crate) common: usize,
}

#[derive(Debug, Clone)]
pub(crate) struct RelationPersister {
    pub(crate) relation: Relation,
    pub(crate) target: PersisterId,
    pub(crate) ownership: Ownership,
}

/// Which side of a relation stores the link.
#[derive(Debug, Clone)]
pub(crate) enum Ownership {
    /// The owner's main table stores the target identifier in `column`.
    SourceOwned { column: ColumnId },

    /// The target's main table stores the owner identifier in `column`.
    TargetOwned {
        column: ColumnId,
        index: Option<ColumnId>,
        reverse: Option<ReverseAccessor>,
    },

    AssociationTable {
        table: TableId,
        source: ColumnId,
        target: ColumnId,
        index: Option<ColumnId>,
    },
}

/// The cascade steps installed on a persister, per write phase.
#[derive(Debug, Default)]
pub(crate) struct Pipeline {
    pub(crate) before_insert: Vec<Step>,
    pub(crate) after_insert: Vec<Step>,
    pub(crate) before_update: Vec<Step>,
    pub(crate) after_update: Vec<Step>,
    pub(crate) before_delete: Vec<Step>,
    pub(crate) after_delete: Vec<Step>,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Step {
    pub(crate) relation: usize,
    pub(crate) action: Action,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Action {
    /// Insert targets that are not persisted yet.
    InsertTargets,

    /// Write the link of every target, inserting new targets first when
    /// `insert` is set.
    LinkTargets { insert: bool },

    /// Reconcile current targets against previous ones.
    UpdateTargets { insert: bool, orphans: bool },

    /// Delete previous targets no longer referenced.
    RemoveOrphans,

    /// Remove links without touching targets.
    CutLinks,

    /// Delete the owner's targets.
    DeleteTargets,
}

/// One row written for an entity: the table, its identifier column and the
/// mapped columns stored there.
pub(crate) struct RowTarget<'a> {
    pub(crate) table: TableId,
    pub(crate) id_column: ColumnId,
    pub(crate) columns: &'a [MappedColumn],
    pub(crate) extra: &'a [MappedColumn],
    pub(crate) discriminator: Option<(ColumnId, Value)>,
    /// Source-owned link columns live in the main table.
    pub(crate) main: bool,
}

impl Persisters {
    pub fn schema(&self) -> &Arc<db::Schema> {
        &self.schema
    }

    pub fn root(&self) -> PersisterId {
        self.root
    }

    pub fn persister(&self, id: PersisterId) -> &Persister {
        &self.persisters[id.0]
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = &Persister> + '_ {
        self.persisters.iter()
    }

    pub fn len(&self) -> usize {
        self.persisters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.persisters.is_empty()
    }

    /// Finds the persister built from this exact descriptor.
    pub fn find(&self, mapping: &Arc<EntityMapping>) -> Option<PersisterId> {
        let key = ByAddress(mapping.clone());
        self.persisters
            .iter()
            .find(|persister| ByAddress(persister.mapping.clone()) == key)
            .map(|persister| persister.id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Persister> {
        self.persisters
            .iter()
            .find(|persister| persister.mapping.name.upper_camel_case() == name)
    }

    /// Typed handle on the root persister.
    pub fn root_entity<T: Send + Sync + 'static>(self: &Arc<Self>) -> Result<EntityPersister<T>> {
        self.entity(self.root)
    }

    /// Typed handle on the persister built from `mapping`.
    pub fn entity_for<T: Send + Sync + 'static>(
        self: &Arc<Self>,
        mapping: &Arc<EntityMapping>,
    ) -> Result<EntityPersister<T>> {
        let id = self.find(mapping).ok_or_else(|| {
            Error::invalid_mapping(format!("no persister was built for `{}`", mapping.name))
        })?;
        self.entity(id)
    }

    pub fn entity<T: Send + Sync + 'static>(
        self: &Arc<Self>,
        id: PersisterId,
    ) -> Result<EntityPersister<T>> {
        let persister = self.persister(id);
        if persister.mapping.entity_type != TypeId::of::<T>() {
            return Err(Error::entity_type_mismatch(
                std::any::type_name::<T>(),
                persister.mapping.type_name,
            ));
        }
        Ok(EntityPersister::new(self.clone(), id))
    }
}

impl Persister {
    pub fn id(&self) -> PersisterId {
        self.id
    }

    pub fn mapping(&self) -> &Arc<EntityMapping> {
        &self.mapping
    }

    pub fn table(&self) -> Option<TableId> {
        self.table
    }

    pub fn join_tree(&self) -> &JoinTree {
        self.join_tree
            .as_ref()
            .expect("join trees are built before persisters are handed out")
    }

    /// Registers a listener; listeners run in registration order.
    pub fn add_listener(&self, listener: Arc<dyn Listener>) {
        self.listeners.write().push(listener);
    }

    /// Runs `hook` on every listener in registration order. Listener errors
    /// are logged and never change the outcome of the operation.
    pub(crate) fn notify(
        &self,
        hook: &'static str,
        call: impl Fn(&dyn Listener) -> Result<()>,
    ) {
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            if let Err(err) = call(&*listener) {
                tracing::warn!(entity = %self.name(), hook, error = %err, "listener failed");
            }
        }
    }

    pub(crate) fn name(&self) -> String {
        self.mapping.name.upper_camel_case()
    }

    pub(crate) fn relation(&self, index: usize) -> &RelationPersister {
        &self.relations[index]
    }

    pub(crate) fn identifier(&self, entity: &EntityRef) -> Result<Value> {
        self.mapping.identifier.value(entity)
    }

    pub(crate) fn is_persisted(&self, entity: &EntityRef) -> Result<bool> {
        self.mapping.identifier.is_persisted(entity)
    }

    pub(crate) fn sub_types(&self) -> &[SubPersister] {
        match &self.layout {
            Layout::Plain => &[],
            Layout::SingleTable { sub_types, .. }
            | Layout::JoinedTables { sub_types, .. }
            | Layout::TablePerClass { sub_types } => sub_types,
        }
    }

    /// Finds the sub-type of `entity`, if the persister is polymorphic.
    pub(crate) fn sub_type_of(&self, entity: &EntityRef) -> Result<Option<usize>> {
        let sub_types = self.sub_types();
        if sub_types.is_empty() {
            return Ok(None);
        }

        for (index, sub) in sub_types.iter().enumerate() {
            if (sub.sub_type.is_instance)(entity)? {
                return Ok(Some(index));
            }
        }

        Err(Error::entity_type_mismatch(
            "a registered sub-type",
            entity.type_name(),
        )
        .context(trestle_core::err!(
            "entity of `{}` matches none of its sub-types",
            self.name()
        )))
    }

    /// Rows written for an entity of sub-type `sub`, parent table first.
    pub(crate) fn row_targets(&self, sub: Option<usize>) -> Vec<RowTarget<'_>> {
        let main = |extra: &'static [MappedColumn]| RowTarget {
            table: self.table.expect("main table"),
            id_column: self.id_column.expect("main identifier column"),
            columns: &self.columns,
            extra,
            discriminator: None,
            main: true,
        };

        match (&self.layout, sub) {
            (Layout::Plain, _) => vec![main(&[])],
            (
                Layout::SingleTable {
                    discriminator,
                    sub_types,
                },
                Some(sub),
            ) => {
                let sub = &sub_types[sub];
                vec![RowTarget {
                    extra: &sub.columns,
                    discriminator: Some((*discriminator, Value::from(&sub.sub_type.discriminator))),
                    ..main(&[])
                }]
            }
            (
                Layout::JoinedTables {
                    discriminator,
                    sub_types,
                },
                Some(sub),
            ) => {
                let sub = &sub_types[sub];
                vec![
                    RowTarget {
                        discriminator: discriminator
                            .map(|column| (column, Value::from(&sub.sub_type.discriminator))),
                        ..main(&[])
                    },
                    RowTarget {
                        table: sub.table,
                        id_column: sub.id_column,
                        columns: &sub.columns,
                        extra: &[],
                        discriminator: None,
                        main: false,
                    },
                ]
            }
            (Layout::TablePerClass { sub_types }, Some(sub)) => {
                let sub = &sub_types[sub];
                vec![RowTarget {
                    table: sub.table,
                    id_column: sub.id_column,
                    columns: &sub.columns,
                    extra: &[],
                    discriminator: None,
                    main: true,
                }]
            }
            (_, None) => vec![main(&[])],
        }
    }
}

impl fmt::Debug for Persisters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Persisters")
            .field("root", &self.root)
            .field("persisters", &self.persisters)
            .field("schema", &self.schema)
            .finish()
    }
}

impl fmt::Debug for Persister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Persister")
            .field("id", &self.id)
            .field("entity", &self.mapping.name)
            .field("table", &self.table)
            .field("columns", &self.columns)
            .field("relations", &self.relations)
            .field("layout", &self.layout)
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}
