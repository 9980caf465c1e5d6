//! Runs persister operations against a connection.
//!
//! Every top-level call gets a fresh [`Exec`]: the set of entities already
//! processed, deferred link fixes and the select dedup index never outlive
//! the call.

mod assemble;
mod delete;
mod insert;
mod select;
mod update;

pub(crate) use crate::join_tree::Key;

use crate::persister::{Persister, PersisterId, Persisters};

use std::collections::{HashMap, HashSet};
use trestle_core::{
    driver::{operation, Connection, Operation, Response},
    schema::db::{ColumnId, TableId},
    stmt::{Filter, Value, ValueRecord},
    EntityRef, Error, Result,
};

struct Exec<'a> {
    persisters: &'a Persisters,
    conn: &'a mut dyn Connection,

    /// Entities already written by this operation.
    processed: HashSet<EntityRef>,

    /// Links that could not be written because their target was still being
    /// inserted.
    pending: Vec<PendingFix>,
}

/// A link written once the entities involved have identifiers.
#[derive(Debug)]
enum PendingFix {
    /// Set link columns on the main row of `entity`.
    Link {
        persister: PersisterId,
        entity: EntityRef,
        assignments: Vec<(ColumnId, Linked)>,
    },

    /// Insert an association row from `source` to `target`.
    Association {
        table: TableId,
        columns: Vec<ColumnId>,
        source: Value,
        index: Option<Value>,
        target: EntityRef,
        persister: PersisterId,
    },
}

#[derive(Debug)]
enum Linked {
    Value(Value),

    /// The identifier `entity` has once inserted.
    IdOf(PersisterId, EntityRef),
}

/// Assignments made to a target row on behalf of the relation pointing at
/// it: the owner's identifier in the foreign key, and the element position.
type Injected = HashMap<EntityRef, Vec<(ColumnId, Value)>>;

pub(crate) async fn insert(
    persisters: &Persisters,
    id: PersisterId,
    conn: &mut dyn Connection,
    entities: Vec<EntityRef>,
) -> Result<()> {
    let mut exec = Exec::new(persisters, conn);
    exec.insert(id, &entities, &Injected::new()).await?;
    exec.flush_pending().await
}

pub(crate) async fn update(
    persisters: &Persisters,
    id: PersisterId,
    conn: &mut dyn Connection,
    pairs: Vec<(EntityRef, Option<EntityRef>)>,
    full_replace: bool,
) -> Result<()> {
    let mut exec = Exec::new(persisters, conn);
    exec.update(id, &pairs, full_replace, &Injected::new())
        .await?;
    exec.flush_pending().await
}

pub(crate) async fn delete(
    persisters: &Persisters,
    id: PersisterId,
    conn: &mut dyn Connection,
    entities: Vec<EntityRef>,
) -> Result<()> {
    let mut exec = Exec::new(persisters, conn);
    exec.delete(id, &entities).await
}

pub(crate) async fn select(
    persisters: &Persisters,
    id: PersisterId,
    conn: &mut dyn Connection,
    key: Key,
) -> Result<Vec<EntityRef>> {
    let mut exec = Exec::new(persisters, conn);
    exec.select(id, key).await
}

impl<'a> Exec<'a> {
    fn new(persisters: &'a Persisters, conn: &'a mut dyn Connection) -> Exec<'a> {
        Exec {
            persisters,
            conn,
            processed: HashSet::new(),
            pending: vec![],
        }
    }

    fn persister(&self, id: PersisterId) -> &'a Persister {
        self.persisters.persister(id)
    }

    /// Runs one operation, attaching `context` to store errors.
    async fn exec(&mut self, op: Operation, context: impl FnOnce() -> String) -> Result<Response> {
        tracing::debug!(?op, "exec");

        let schema = &self.persisters.schema;
        match self.conn.exec(schema, op).await {
            Ok(response) => Ok(response),
            Err(err) => Err(err.context(trestle_core::err!("{}", context()))),
        }
    }

    async fn exec_update(
        &mut self,
        table: TableId,
        assignments: Vec<(ColumnId, Value)>,
        filter: Filter,
        context: impl FnOnce() -> String,
    ) -> Result<u64> {
        let op = operation::Update {
            table,
            assignments,
            filter,
        };
        self.exec(op.into(), context).await?.rows.into_count()
    }

    async fn exec_delete(
        &mut self,
        table: TableId,
        filter: Filter,
        context: impl FnOnce() -> String,
    ) -> Result<u64> {
        let op = operation::Delete { table, filter };
        self.exec(op.into(), context).await?.rows.into_count()
    }

    /// Inserts `rows`, one operation per row unless the store batches
    /// writes. Returns the `returning` column of every row, if requested.
    async fn exec_insert(
        &mut self,
        table: TableId,
        columns: Vec<ColumnId>,
        rows: Vec<ValueRecord>,
        returning: Option<ColumnId>,
        context: impl Fn() -> String,
    ) -> Result<Vec<Value>> {
        let expected = rows.len();
        let batches = if self.conn.capability().batch_writes {
            vec![rows]
        } else {
            rows.into_iter().map(|row| vec![row]).collect()
        };

        let mut assigned = vec![];

        for rows in batches {
            let count = rows.len();
            let op = operation::Insert {
                table,
                columns: columns.clone(),
                rows,
                returning,
            };

            let response = self.exec(op.into(), &context).await?;

            if returning.is_some() {
                let records = response.rows.into_values()?;
                if records.len() != count {
                    return Err(Error::invalid_result(format!(
                        "insert returned {} records for {count} rows",
                        records.len()
                    )));
                }
                assigned.extend(
                    records
                        .into_iter()
                        .map(|record| record.into_vec().into_iter().next().unwrap_or_default()),
                );
            }
        }

        debug_assert!(returning.is_none() || assigned.len() == expected);
        Ok(assigned)
    }

    /// Writes the links deferred while their targets were being inserted.
    async fn flush_pending(&mut self) -> Result<()> {
        for fix in std::mem::take(&mut self.pending) {
            tracing::debug!(?fix, "writing deferred link");

            match fix {
                PendingFix::Link {
                    persister,
                    entity,
                    assignments,
                } => {
                    self.persisted_id(persister, &entity)?;

                    let assignments = assignments
                        .into_iter()
                        .map(|(column, linked)| {
                            Ok((
                                column,
                                match linked {
                                    Linked::Value(value) => value,
                                    Linked::IdOf(persister, target) => {
                                        self.persisted_id(persister, &target)?
                                    }
                                },
                            ))
                        })
                        .collect::<Result<Vec<_>>>()?;

                    self.write_link(persister, &entity, assignments).await?;
                }
                PendingFix::Association {
                    table,
                    columns,
                    source,
                    index,
                    target,
                    persister,
                } => {
                    let target_id = self.persisted_id(persister, &target)?;
                    let mut row = vec![source, target_id];
                    row.extend(index);
                    self.exec_insert(table, columns, vec![row.into()], None, || {
                        "insert association row".to_string()
                    })
                    .await?;
                }
            }
        }
        Ok(())
    }

    fn persisted_id(&self, persister: PersisterId, entity: &EntityRef) -> Result<Value> {
        let persister = self.persister(persister);
        let id = persister.identifier(entity)?;
        if id.is_null() || !persister.is_persisted(entity)? {
            return Err(trestle_core::err!(
                "`{}` was never persisted, so it cannot be linked",
                persister.name()
            ));
        }
        Ok(id)
    }
}
