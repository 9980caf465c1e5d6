use super::{
    insert::{not_persisted, position_value},
    Exec, Injected, Linked, PendingFix,
};
use crate::persister::{Action, Ownership, Persister, PersisterId, RowTarget, Step};

use async_recursion::async_recursion;
use trestle_core::{
    schema::db::ColumnId,
    stmt::{Condition, Filter, Value},
    EntityRef, Error, Result,
};

type Pair = (EntityRef, Option<EntityRef>);

impl Exec<'_> {
    /// Writes the changes of `current` against its `previous` state. A
    /// missing previous state rewrites every column; entities that were
    /// never persisted are inserted.
    #[async_recursion]
    pub(super) async fn update(
        &mut self,
        id: PersisterId,
        pairs: &[Pair],
        full_replace: bool,
        injected: &Injected,
    ) -> Result<()> {
        let persister = self.persister(id);

        let mut new = vec![];
        let mut batch = vec![];

        for (current, previous) in pairs {
            if self.processed.contains(current) {
                continue;
            }
            if !persister.is_persisted(current)? {
                new.push(current.clone());
                continue;
            }
            self.processed.insert(current.clone());
            batch.push((current.clone(), previous.clone()));
        }

        self.insert(id, &new, injected).await?;

        if batch.is_empty() {
            return Ok(());
        }

        tracing::debug!(entity = %persister.name(), count = batch.len(), full_replace, "update");

        persister.notify("before_update", |listener| listener.before_update(&batch));

        let currents = batch
            .iter()
            .map(|(current, _)| current.clone())
            .collect::<Vec<_>>();
        self.check_mandatory(persister, &currents)?;

        for step in &persister.pipeline.before_update {
            self.run_update_step(persister, *step, &batch, full_replace)
                .await?;
        }

        self.update_rows(persister, &batch, full_replace, injected)
            .await?;

        for step in &persister.pipeline.after_update {
            self.run_update_step(persister, *step, &batch, full_replace)
                .await?;
        }

        persister.notify("after_update", |listener| listener.after_update(&batch));

        Ok(())
    }

    async fn update_rows(
        &mut self,
        persister: &Persister,
        batch: &[Pair],
        full_replace: bool,
        injected: &Injected,
    ) -> Result<()> {
        let mut deferred = vec![];

        for (current, previous) in batch {
            let sub = persister.sub_type_of(current)?;

            if let Some(previous) = previous {
                if persister.sub_type_of(previous)? != sub {
                    return Err(Error::unsupported_feature(format!(
                        "changing the sub-type of a persisted `{}`",
                        persister.name()
                    )));
                }
            }

            let entity_id = persister.identifier(current)?;
            let forced: Vec<ColumnId> = injected
                .get(current)
                .map(|assignments| assignments.iter().map(|(column, _)| *column).collect())
                .unwrap_or_default();

            for target in persister.row_targets(sub) {
                let mut values =
                    self.row_values(persister, &target, false, current, injected, &mut deferred)?;

                if let (Some(previous), false) = (previous, full_replace) {
                    let before = self.snapshot_values(persister, &target, previous)?;
                    values.retain(|(column, value)| {
                        forced.contains(column)
                            || before
                                .iter()
                                .find(|(c, _)| c == column)
                                .map_or(true, |(_, v)| v != value)
                    });
                }

                if values.is_empty() {
                    continue;
                }

                let context = || format!("update {}(id={entity_id:?})", persister.name());
                let count = self
                    .exec_update(
                        target.table,
                        values,
                        Filter::eq(target.id_column, entity_id.clone()),
                        context,
                    )
                    .await?;

                if count == 0 {
                    return Err(Error::record_not_found(context()));
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

    /// Values the row of a previous state held, for diffing.
    fn snapshot_values(
        &self,
        persister: &Persister,
        target: &RowTarget<'_>,
        entity: &EntityRef,
    ) -> Result<Vec<(ColumnId, Value)>> {
        let mut values = vec![];

        for mapped in target.columns.iter().chain(target.extra) {
            values.push((mapped.column, (mapped.property.get)(entity)?));
        }

        if let Some((column, value)) = &target.discriminator {
            values.push((*column, value.clone()));
        }

        if target.main {
            for relation in &persister.relations {
                let Ownership::SourceOwned { column } = relation.ownership else {
                    continue;
                };
                let value = match relation.relation.accessor.targets(entity)?.first() {
                    Some(linked) => self.persister(relation.target).identifier(linked)?,
                    None => Value::Null,
                };
                values.push((column, value));
            }
        }

        Ok(values)
    }

    async fn run_update_step(
        &mut self,
        persister: &Persister,
        step: Step,
        batch: &[Pair],
        full_replace: bool,
    ) -> Result<()> {
        let relation = persister.relation(step.relation);

        match (step.action, &relation.ownership) {
            (Action::UpdateTargets { .. }, Ownership::SourceOwned { .. }) => {
                self.update_source_targets(persister, step.relation, batch, full_replace)
                    .await
            }
            (Action::UpdateTargets { insert, orphans }, _) => {
                for (current, previous) in batch {
                    self.update_linked_targets(
                        persister,
                        step.relation,
                        current,
                        previous.as_ref(),
                        full_replace,
                        insert,
                        orphans,
                    )
                    .await?;
                }
                Ok(())
            }
            (Action::RemoveOrphans, _) => self.remove_orphans(persister, step.relation, batch).await,
            (action, _) => Err(trestle_core::err!(
                "{action:?} cannot run while updating `{}`",
                persister.name()
            )),
        }
    }

    /// Inserts or updates the target each owner row references. The link
    /// column itself is written with the owner's row.
    async fn update_source_targets(
        &mut self,
        persister: &Persister,
        relation: usize,
        batch: &[Pair],
        full_replace: bool,
    ) -> Result<()> {
        let relation = persister.relation(relation);
        let target = self.persister(relation.target);
        let accessor = &relation.relation.accessor;

        let mut new = vec![];
        let mut pairs = vec![];

        for (current, previous) in batch {
            let Some(linked) = accessor.targets(current)?.into_iter().next() else {
                continue;
            };

            if !target.is_persisted(&linked)? {
                new.push(linked);
                continue;
            }

            let before = match previous {
                Some(previous) => find_match(target, &linked, &accessor.targets(previous)?)?
                    .map(|(_, before)| before)
                    .filter(|before| *before != linked),
                None => None,
            };
            pairs.push((linked, before));
        }

        self.insert(relation.target, &new, &Injected::new())
            .await?;
        self.update(relation.target, &pairs, full_replace, &Injected::new())
            .await
    }

    /// Reconciles the current targets of a target-owned or association
    /// relation against the previous ones: new links are written, removed
    /// ones are cut (or their targets deleted) and moved elements get their
    /// new position.
    #[allow(clippy::too_many_arguments)]
    async fn update_linked_targets(
        &mut self,
        persister: &Persister,
        relation_index: usize,
        owner: &EntityRef,
        previous: Option<&EntityRef>,
        full_replace: bool,
        insert: bool,
        orphans: bool,
    ) -> Result<()> {
        let relation = persister.relation(relation_index);
        let target = self.persister(relation.target);
        let accessor = &relation.relation.accessor;
        let owner_id = persister.identifier(owner)?;

        let current = accessor.targets(owner)?;
        let before = match previous {
            Some(previous) => accessor.targets(previous)?,
            None => {
                // Nothing is known about what was linked, so start over.
                self.cut_links(persister, relation_index, vec![owner_id.clone()])
                    .await?;
                vec![]
            }
        };

        let mut matched = vec![];
        for entity in &current {
            matched.push(find_match(target, entity, &before)?.map(|(position, _)| position));
        }

        let mut removed = vec![];
        for entity in &before {
            if target.is_persisted(entity)? && find_match(target, entity, &current)?.is_none() {
                removed.push(entity.clone());
            }
        }
        let removed_ids = removed
            .iter()
            .map(|entity| target.identifier(entity))
            .collect::<Result<Vec<_>>>()?;

        match &relation.ownership {
            Ownership::TargetOwned { column, index, .. } => {
                let mut injected = Injected::new();
                let mut new = vec![];
                let mut pairs = vec![];

                for (position, (entity, prior)) in current.iter().zip(&matched).enumerate() {
                    let mut link = vec![(*column, owner_id.clone())];
                    if let Some(index) = index {
                        link.push((*index, position_value(position)));
                    }

                    // Only what changed, for targets this cascade does not
                    // rewrite.
                    let assignments = match prior {
                        None => link.clone(),
                        Some(prior) if *prior != position => link[1..].to_vec(),
                        Some(_) => vec![],
                    };

                    if !target.is_persisted(entity)? {
                        if self.processed.contains(entity) {
                            self.pending.push(PendingFix::Link {
                                persister: relation.target,
                                entity: entity.clone(),
                                assignments: link
                                    .into_iter()
                                    .map(|(column, value)| (column, Linked::Value(value)))
                                    .collect(),
                            });
                        } else if insert {
                            injected.insert(entity.clone(), link);
                            new.push(entity.clone());
                        } else {
                            return Err(not_persisted(persister, &relation.relation.name));
                        }
                        continue;
                    }

                    if insert && !self.processed.contains(entity) {
                        let before = prior
                            .map(|prior| before[prior].clone())
                            .filter(|before| before != entity);
                        // Injected columns are always written: the owner's
                        // view of the link wins over the target's accessor.
                        injected.insert(entity.clone(), link);
                        pairs.push((entity.clone(), before));
                    } else if !assignments.is_empty() {
                        self.write_link(relation.target, entity, assignments)
                            .await?;
                    }
                }

                self.insert(relation.target, &new, &injected).await?;
                self.update(relation.target, &pairs, full_replace, &injected)
                    .await?;

                if removed.is_empty() {
                    return Ok(());
                }

                if orphans {
                    return self.delete(relation.target, &removed).await;
                }

                let (Some(table), Some(id_column)) = (target.table, target.id_column) else {
                    return Err(Error::unsupported_feature(format!(
                        "unlinking `{}` rows without a common table",
                        target.name()
                    )));
                };

                let mut assignments = vec![(*column, Value::Null)];
                assignments.extend(index.map(|index| (index, Value::Null)));

                // Targets already relinked to another owner keep their link.
                let filter = Filter::in_list(id_column, removed_ids)
                    .and(Condition::Eq(*column, owner_id.clone()));

                self.exec_update(table, assignments, filter, || {
                    format!("unlink {}.{}", persister.name(), relation.relation.name)
                })
                .await?;

                Ok(())
            }
            Ownership::AssociationTable {
                table,
                source,
                target: target_column,
                index,
            } => {
                let context = || format!("link {}.{}", persister.name(), relation.relation.name);

                if insert {
                    let mut new = vec![];
                    let mut pairs = vec![];

                    for (entity, prior) in current.iter().zip(&matched) {
                        if self.processed.contains(entity) {
                            continue;
                        }
                        if !target.is_persisted(entity)? {
                            new.push(entity.clone());
                        } else {
                            let before = prior
                                .map(|prior| before[prior].clone())
                                .filter(|before| before != entity);
                            pairs.push((entity.clone(), before));
                        }
                    }

                    self.insert(relation.target, &new, &Injected::new())
                        .await?;
                    self.update(relation.target, &pairs, full_replace, &Injected::new())
                        .await?;
                }

                if !removed_ids.is_empty() {
                    let filter = Filter::eq(*source, owner_id.clone())
                        .and(Condition::In(*target_column, removed_ids));
                    self.exec_delete(*table, filter, context).await?;
                }

                let mut columns = vec![*source, *target_column];
                columns.extend(*index);

                let mut rows = vec![];

                for (position, (entity, prior)) in current.iter().zip(&matched).enumerate() {
                    match prior {
                        None => {
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
                        Some(prior) if *prior != position => {
                            let Some(index) = index else {
                                continue;
                            };
                            let filter = Filter::eq(*source, owner_id.clone())
                                .and(Condition::Eq(*target_column, target.identifier(entity)?));
                            self.exec_update(
                                *table,
                                vec![(*index, position_value(position))],
                                filter,
                                context,
                            )
                            .await?;
                        }
                        Some(_) => {}
                    }
                }

                if !rows.is_empty() {
                    self.exec_insert(*table, columns, rows, None, context)
                        .await?;
                }

                if orphans && !removed.is_empty() {
                    self.delete(relation.target, &removed).await?;
                }

                Ok(())
            }
            Ownership::SourceOwned { .. } => Ok(()),
        }
    }

    /// Deletes the targets previous states referenced and current states no
    /// longer do. Targets that are not persisted anymore are skipped, which
    /// makes repeating the same update harmless.
    async fn remove_orphans(
        &mut self,
        persister: &Persister,
        relation: usize,
        batch: &[Pair],
    ) -> Result<()> {
        let relation = persister.relation(relation);
        let target = self.persister(relation.target);
        let accessor = &relation.relation.accessor;

        let mut orphans = vec![];

        for (current, previous) in batch {
            let Some(previous) = previous else {
                continue;
            };

            let linked = accessor.targets(current)?;
            for before in accessor.targets(previous)? {
                if !target.is_persisted(&before)? {
                    continue;
                }
                if find_match(target, &before, &linked)?.is_none() {
                    orphans.push(before);
                }
            }
        }

        self.delete(relation.target, &orphans).await
    }
}

/// Finds `entity` among `candidates`, by identity or by identifier.
fn find_match(
    persister: &Persister,
    entity: &EntityRef,
    candidates: &[EntityRef],
) -> Result<Option<(usize, EntityRef)>> {
    if let Some(position) = candidates.iter().position(|candidate| candidate == entity) {
        return Ok(Some((position, entity.clone())));
    }

    let id = persister.identifier(entity)?;
    if id.is_null() {
        return Ok(None);
    }

    for (position, candidate) in candidates.iter().enumerate() {
        if persister.identifier(candidate)? == id {
            return Ok(Some((position, candidate.clone())));
        }
    }

    Ok(None)
}
