use super::{Exec, Injected, Linked, PendingFix};
use crate::persister::{Action, Ownership, Persister, PersisterId, RowTarget, Step};

use async_recursion::async_recursion;
use indexmap::IndexMap;
use trestle_core::{
    schema::db::{ColumnId, TableId},
    stmt::{Filter, Value},
    EntityRef, Error, Result,
};

/// Rows bound for one table, with the union of the columns they set.
struct TableRows {
    id_column: ColumnId,
    columns: Vec<ColumnId>,
    rows: Vec<(usize, Vec<(ColumnId, Value)>)>,
}

impl Exec<'_> {
    /// Inserts the entities not persisted yet, with the cascades their
    /// relations call for.
    #[async_recursion]
    pub(super) async fn insert(
        &mut self,
        id: PersisterId,
        entities: &[EntityRef],
        injected: &Injected,
    ) -> Result<()> {
        let persister = self.persister(id);

        let mut batch = vec![];
        for entity in entities {
            if persister.is_persisted(entity)? {
                continue;
            }
            if self.processed.insert(entity.clone()) {
                batch.push(entity.clone());
            }
        }

        if batch.is_empty() {
            return Ok(());
        }

        tracing::debug!(entity = %persister.name(), count = batch.len(), "insert");

        persister.notify("before_insert", |listener| listener.before_insert(&batch));

        self.check_mandatory(persister, &batch)?;

        for step in &persister.pipeline.before_insert {
            self.run_insert_step(persister, *step, &batch).await?;
        }

        if let Err(err) = self.write_new_rows(persister, &batch, injected).await {
            // None of `batch` was persisted, so any identifier it carries
            // now was assigned for rows that were not all written.
            for entity in &batch {
                if let Err(reset) = persister.mapping.identifier.unassign(entity) {
                    tracing::warn!(
                        entity = %persister.name(),
                        error = %reset,
                        "identifier not reset"
                    );
                }
            }
            return Err(err);
        }

        for entity in &batch {
            persister.mapping.identifier.mark_persisted(entity, None)?;
        }

        for step in &persister.pipeline.after_insert {
            self.run_insert_step(persister, *step, &batch).await?;
        }

        persister.notify("after_insert", |listener| listener.after_insert(&batch));

        Ok(())
    }

    async fn run_insert_step(
        &mut self,
        persister: &Persister,
        step: Step,
        batch: &[EntityRef],
    ) -> Result<()> {
        let relation = persister.relation(step.relation);

        match step.action {
            Action::InsertTargets => {
                let mut targets = vec![];
                for entity in batch {
                    targets.extend(relation.relation.accessor.targets(entity)?);
                }
                self.insert(relation.target, &targets, &Injected::new())
                    .await
            }
            Action::LinkTargets { insert } => {
                for owner in batch {
                    let targets = relation.relation.accessor.targets(owner)?;
                    self.link_targets(persister, step.relation, owner, &targets, insert)
                        .await?;
                }
                Ok(())
            }
            action => Err(trestle_core::err!(
                "{action:?} cannot run while inserting `{}`",
                persister.name()
            )),
        }
    }

    /// Writes the links from a persisted `owner` to every one of `targets`,
    /// inserting new targets first when `insert` is set.
    pub(super) async fn link_targets(
        &mut self,
        persister: &Persister,
        relation: usize,
        owner: &EntityRef,
        targets: &[EntityRef],
        insert: bool,
    ) -> Result<()> {
        let relation = persister.relation(relation);
        let target = self.persister(relation.target);
        let owner_id = persister.identifier(owner)?;

        match &relation.ownership {
            Ownership::TargetOwned { column, index, .. } => {
                let mut injected = Injected::new();
                let mut new = vec![];

                for (position, entity) in targets.iter().enumerate() {
                    let mut assignments = vec![(*column, owner_id.clone())];
                    if let Some(index) = index {
                        assignments.push((*index, position_value(position)));
                    }

                    if target.is_persisted(entity)? {
                        self.write_link(relation.target, entity, assignments).await?;
                    } else if self.processed.contains(entity) {
                        // Mid-insert further up: its row is written once
                        // this cascade unwinds.
                        self.pending.push(PendingFix::Link {
                            persister: relation.target,
                            entity: entity.clone(),
                            assignments: assignments
                                .into_iter()
                                .map(|(column, value)| (column, Linked::Value(value)))
                                .collect(),
                        });
                    } else if insert {
                        injected.insert(entity.clone(), assignments);
                        new.push(entity.clone());
                    } else {
                        return Err(not_persisted(persister, &relation.relation.name));
                    }
                }

                self.insert(relation.target, &new, &injected).await
            }
            Ownership::AssociationTable {
                table,
                source,
                target: target_column,
                index,
            } => {
                if insert {
                    self.insert(relation.target, targets, &Injected::new())
                        .await?;
                }

                let mut columns = vec![*source, *target_column];
                columns.extend(*index);

                let mut rows = vec![];
                for (position, entity) in targets.iter().enumerate() {
                    let index = index.map(|_| position_value(position));

                    if !target.is_persisted(entity)? {
                        if !self.processed.contains(entity) {
                            return Err(not_persisted(persister, &relation.relation.name));
                        }
                        self.pending.push(PendingFix::Association {
                            table: *table,
                            columns: columns.clone(),
                            source: owner_id.clone(),
                            index,
                            target: entity.clone(),
                            persister: relation.target,
                        });
                        continue;
                    }

                    let mut row = vec![owner_id.clone(), target.identifier(entity)?];
                    row.extend(index);
                    rows.push(row.into());
                }

                if rows.is_empty() {
                    return Ok(());
                }

                let name = persister.name();
                self.exec_insert(*table, columns, rows, None, || {
                    format!("link {name}.{}", relation.relation.name)
                })
                .await?;
                Ok(())
            }
            Ownership::SourceOwned { .. } => Ok(()),
        }
    }

    /// Sets link columns on the main row of an already persisted entity.
    pub(super) async fn write_link(
        &mut self,
        id: PersisterId,
        entity: &EntityRef,
        assignments: Vec<(ColumnId, Value)>,
    ) -> Result<()> {
        let persister = self.persister(id);
        let (Some(table), Some(id_column)) = (persister.table, persister.id_column) else {
            return Err(Error::unsupported_feature(format!(
                "linking `{}` rows without a common table",
                persister.name()
            )));
        };

        let entity_id = persister.identifier(entity)?;
        let context = || format!("link {}(id={entity_id:?})", persister.name());

        let count = self
            .exec_update(
                table,
                assignments,
                Filter::eq(id_column, entity_id.clone()),
                context,
            )
            .await?;

        if count == 0 {
            return Err(Error::record_not_found(context()));
        }
        Ok(())
    }

    async fn write_new_rows(
        &mut self,
        persister: &Persister,
        batch: &[EntityRef],
        injected: &Injected,
    ) -> Result<()> {
        for entity in batch {
            persister.mapping.identifier.generate(entity)?;
        }
        self.write_rows(persister, batch, injected).await
    }

    /// Writes the rows of `batch`, parent tables first. Store-assigned
    /// identifiers are set on the entities as soon as the parent rows are
    /// written, since sub-type rows reuse them.
    async fn write_rows(
        &mut self,
        persister: &Persister,
        batch: &[EntityRef],
        injected: &Injected,
    ) -> Result<()> {
        let identifier = &persister.mapping.identifier;

        let subs = batch
            .iter()
            .map(|entity| persister.sub_type_of(entity))
            .collect::<Result<Vec<_>>>()?;

        let depth = subs
            .iter()
            .map(|sub| persister.row_targets(*sub).len())
            .max()
            .unwrap_or_default();

        let mut deferred = vec![];

        for level in 0..depth {
            let store_assigned = level == 0 && identifier.is_auto_increment();
            let mut tables: IndexMap<TableId, TableRows> = IndexMap::new();

            for (position, (entity, sub)) in batch.iter().zip(&subs).enumerate() {
                let targets = persister.row_targets(*sub);
                let Some(target) = targets.get(level) else {
                    continue;
                };

                let values = self.row_values(
                    persister,
                    target,
                    !store_assigned,
                    entity,
                    injected,
                    &mut deferred,
                )?;

                let rows = tables.entry(target.table).or_insert_with(|| TableRows {
                    id_column: target.id_column,
                    columns: vec![],
                    rows: vec![],
                });

                for (column, _) in &values {
                    if !rows.columns.contains(column) {
                        rows.columns.push(*column);
                    }
                }
                rows.rows.push((position, values));
            }

            for (table, rows) in tables {
                let returning = store_assigned.then_some(rows.id_column);
                let positions = rows.rows.iter().map(|(position, _)| *position).collect::<Vec<_>>();

                let records = rows
                    .rows
                    .into_iter()
                    .map(|(_, values)| {
                        rows.columns
                            .iter()
                            .map(|column| {
                                values
                                    .iter()
                                    .find(|(c, _)| c == column)
                                    .map(|(_, value)| value.clone())
                                    .unwrap_or_default()
                            })
                            .collect::<Vec<_>>()
                            .into()
                    })
                    .collect();

                let name = persister.name();
                let ids = self
                    .exec_insert(table, rows.columns, records, returning, || {
                        format!("insert {name}")
                    })
                    .await?;

                for (position, id) in positions.into_iter().zip(ids) {
                    (identifier.set)(&batch[position], id)?;
                }
            }
        }

        for (entity, column, target, target_persister) in deferred {
            self.pending.push(PendingFix::Link {
                persister: persister.id,
                entity,
                assignments: vec![(column, Linked::IdOf(target_persister, target))],
            });
        }

        Ok(())
    }

    /// Values of one row of `entity`. Source-owned links to entities that
    /// are still mid-insert are written as null and recorded in `deferred`.
    pub(super) fn row_values(
        &self,
        persister: &Persister,
        target: &RowTarget<'_>,
        with_id: bool,
        entity: &EntityRef,
        injected: &Injected,
        deferred: &mut Vec<(EntityRef, ColumnId, EntityRef, PersisterId)>,
    ) -> Result<Vec<(ColumnId, Value)>> {
        let mut values = vec![];

        if with_id {
            values.push((target.id_column, persister.identifier(entity)?));
        }

        for mapped in target.columns.iter().chain(target.extra) {
            values.push((mapped.column, (mapped.property.get)(entity)?));
        }

        if let Some((column, value)) = &target.discriminator {
            values.push((*column, value.clone()));
        }

        if !target.main {
            return Ok(values);
        }

        for (index, relation) in persister.relations.iter().enumerate() {
            let Ownership::SourceOwned { column } = relation.ownership else {
                continue;
            };

            let value = match self.source_link(persister, index, entity)? {
                SourceLink::Value(value) => value,
                SourceLink::Pending(linked) => {
                    deferred.push((entity.clone(), column, linked, relation.target));
                    Value::Null
                }
            };
            values.push((column, value));
        }

        if let Some(assignments) = injected.get(entity) {
            for (column, value) in assignments {
                match values.iter_mut().find(|(c, _)| c == column) {
                    Some(existing) => existing.1 = value.clone(),
                    None => values.push((*column, value.clone())),
                }
            }
        }

        Ok(values)
    }

    /// The foreign key value a source-owned relation stores for `entity`.
    pub(super) fn source_link(
        &self,
        persister: &Persister,
        relation: usize,
        entity: &EntityRef,
    ) -> Result<SourceLink> {
        let relation = persister.relation(relation);
        let target = self.persister(relation.target);

        let Some(linked) = relation.relation.accessor.targets(entity)?.into_iter().next() else {
            return Ok(SourceLink::Value(Value::Null));
        };

        if target.is_persisted(&linked)? {
            return Ok(SourceLink::Value(target.identifier(&linked)?));
        }

        if self.processed.contains(&linked) {
            return Ok(SourceLink::Pending(linked));
        }

        tracing::warn!(
            entity = %persister.name(),
            relation = %relation.relation.name,
            "linked entity is not persisted and this relation does not write it; storing null"
        );
        Ok(SourceLink::Value(Value::Null))
    }

    pub(super) fn check_mandatory(&self, persister: &Persister, batch: &[EntityRef]) -> Result<()> {
        for relation in &persister.relations {
            if !relation.relation.mandatory {
                continue;
            }
            for entity in batch {
                if relation.relation.accessor.targets(entity)?.is_empty() {
                    return Err(Error::mandatory_relation(
                        &persister.name(),
                        &relation.relation.name,
                    ));
                }
            }
        }
        Ok(())
    }
}

pub(super) enum SourceLink {
    Value(Value),

    /// The linked entity is being inserted by this operation and has no
    /// identifier yet.
    Pending(EntityRef),
}

pub(super) fn position_value(position: usize) -> Value {
    Value::I32(i32::try_from(position).unwrap_or(i32::MAX))
}

pub(super) fn not_persisted(persister: &Persister, relation: &str) -> Error {
    trestle_core::err!(
        "`{}.{relation}` does not insert its targets, but one of them is not persisted",
        persister.name()
    )
}
