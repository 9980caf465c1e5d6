mod cascade;
mod ownership;
mod polymorphism;
mod table;
mod verify;

use table::TableOwner;

use crate::{
    join_tree::JoinTree,
    persister::{EntityPersister, Persister, PersisterId, Persisters, Pipeline},
};

use by_address::ByAddress;
use indexmap::IndexMap;
use std::{collections::HashMap, sync::Arc};
use trestle_core::{
    err,
    schema::{
        app::{EntityMapping, PolymorphismKind},
        db::{self, ColumnId, Table, TableId},
    },
    Error, Result,
};

/// Builds [`Persisters`] from a root [`EntityMapping`].
///
/// ```ignore
/// let persisters = Builder::new()
///     .table_name_prefix("app_")
///     .build(&person_mapping)?;
/// ```
#[derive(Debug)]
pub struct Builder {
    /// If set, prefix all table names with this string
    table_name_prefix: Option<String>,

    /// When false, every relation is loaded with a follow-up select.
    eager_fetch: bool,
}

/// Used to track state during the build process
struct BuildContext<'a> {
    /// Build options
    builder: &'a Builder,

    /// Maps table names to identifiers.
    table_lookup: IndexMap<String, TableId>,

    /// Who claimed each table, indexed by `TableId`.
    table_owners: Vec<TableOwner>,

    /// Tables as they are built
    tables: Vec<Table>,

    /// Persister of every descriptor seen so far, keyed by descriptor
    /// identity.
    persister_lookup: HashMap<ByAddress<Arc<EntityMapping>>, PersisterId>,

    /// Persisters indexed by `PersisterId`.
    slots: Vec<Slot>,
}

/// A persister is reserved before its relations are built so that cycles
/// resolve to it.
enum Slot {
    Reserved(Skeleton),
    Built(Persister),
}

/// What relations may know about a persister that is still being built.
#[derive(Clone)]
struct Skeleton {
    mapping: Arc<EntityMapping>,
    table: Option<TableId>,
    id_column: Option<ColumnId>,
}

impl Builder {
    pub fn new() -> Self {
        Self {
            table_name_prefix: None,
            eager_fetch: true,
        }
    }

    /// Set the table name prefix for all tables
    pub fn table_name_prefix(&mut self, prefix: &str) -> &mut Self {
        self.table_name_prefix = Some(prefix.to_string());
        self
    }

    /// Whether relations are joined into the owner's select. Defaults to
    /// `true`.
    pub fn eager_fetch(&mut self, eager: bool) -> &mut Self {
        self.eager_fetch = eager;
        self
    }

    pub fn build(&self, mapping: &Arc<EntityMapping>) -> Result<Arc<Persisters>> {
        let mut cx = BuildContext {
            builder: self,
            table_lookup: IndexMap::new(),
            table_owners: vec![],
            tables: vec![],
            persister_lookup: HashMap::new(),
            slots: vec![],
        };

        let root = cx
            .build_persister(mapping)
            .map_err(|e| e.context(err!("failed to build persisters for `{}`", mapping.name)))?;

        cx.finish(root)
    }

    /// Builds persisters and returns a typed handle on the root one.
    pub fn build_entity<T: Send + Sync + 'static>(
        &self,
        mapping: &Arc<EntityMapping>,
    ) -> Result<EntityPersister<T>> {
        self.build(mapping)?.root_entity()
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl BuildContext<'_> {
    fn build_persister(&mut self, mapping: &Arc<EntityMapping>) -> Result<PersisterId> {
        let key = ByAddress(mapping.clone());
        if let Some(id) = self.persister_lookup.get(&key) {
            return Ok(*id);
        }

        tracing::debug!(entity = %mapping.name, "building persister");

        let table_per_class = matches!(
            mapping.polymorphism.as_ref().map(|p| &p.kind),
            Some(PolymorphismKind::TablePerClass)
        );

        let (table, id_column) = if table_per_class {
            (None, None)
        } else {
            let name = self.entity_table_name(mapping);
            let table = self.resolve_table(name, TableOwner::entity(mapping))?;
            let id_column = self.identifier_column(table, mapping)?;
            (Some(table), Some(id_column))
        };

        let id = PersisterId(self.slots.len());
        self.slots.push(Slot::Reserved(Skeleton {
            mapping: mapping.clone(),
            table,
            id_column,
        }));
        self.persister_lookup.insert(key, id);

        let columns = match table {
            Some(table) => self.map_properties(table, &mapping.properties, false)?,
            None => vec![],
        };

        let layout = self.build_layout(mapping, table, id_column)?;

        let mut persister = Persister {
            id,
            mapping: mapping.clone(),
            table,
            id_column,
            columns,
            relations: vec![],
            layout,
            pipeline: Pipeline::default(),
            join_tree: None,
            listeners: Default::default(),
        };

        for relation in &mapping.relations {
            let target_mapping = relation.target.resolve().map_err(|e| {
                e.context(err!("resolving target of `{}.{}`", mapping.name, relation.name))
            })?;

            if target_mapping.entity_type != relation.target_type {
                return Err(Error::invalid_mapping(format!(
                    "`{}.{}` targets `{}` but its mapping describes `{}`",
                    mapping.name,
                    relation.name,
                    relation.target_type_name,
                    target_mapping.type_name
                )));
            }

            let target = self.build_persister(&target_mapping)?;
            let ownership = self.resolve_ownership(&persister, relation, target)?;

            tracing::trace!(
                entity = %mapping.name,
                relation = %relation.name,
                ?ownership,
                "resolved relation ownership"
            );

            cascade::configure(&mut persister, relation.clone(), target, ownership)?;
        }

        self.slots[id.0] = Slot::Built(persister);
        Ok(id)
    }

    fn skeleton(&self, id: PersisterId) -> Skeleton {
        match &self.slots[id.0] {
            Slot::Reserved(skeleton) => skeleton.clone(),
            Slot::Built(persister) => Skeleton {
                mapping: persister.mapping.clone(),
                table: persister.table,
                id_column: persister.id_column,
            },
        }
    }

    fn finish(self, root: PersisterId) -> Result<Arc<Persisters>> {
        let BuildContext {
            builder,
            tables,
            slots,
            ..
        } = self;

        let persisters = slots
            .into_iter()
            .map(|slot| match slot {
                Slot::Built(persister) => Ok(persister),
                Slot::Reserved(skeleton) => Err(err!(
                    "persister for `{}` was never completed",
                    skeleton.mapping.name
                )),
            })
            .collect::<Result<Vec<_>>>()?;

        let schema = Arc::new(db::Schema { tables });
        verify::verify(&schema, &persisters)?;

        let mut persisters = Persisters {
            schema,
            persisters,
            root,
        };

        let join_trees = (0..persisters.len())
            .map(|index| JoinTree::build(&persisters, PersisterId(index), builder.eager_fetch))
            .collect::<Vec<_>>();

        for (persister, join_tree) in persisters.persisters.iter_mut().zip(join_trees) {
            persister.join_tree = Some(join_tree);
        }

        tracing::debug!(
            persisters = persisters.len(),
            tables = persisters.schema.tables.len(),
            "built persisters"
        );

        Ok(Arc::new(persisters))
    }
}
