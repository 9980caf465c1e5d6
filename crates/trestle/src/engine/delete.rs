use super::Exec;
use crate::persister::{Action, Ownership, Persister, PersisterId, Step};

use async_recursion::async_recursion;
use indexmap::IndexMap;
use trestle_core::{
    schema::db::{ColumnId, TableId},
    stmt::{Filter, Value},
    EntityRef, Error, Result,
};

impl Exec<'_> {
    /// Deletes the rows of persisted entities, cutting or deleting what
    /// their relations reference as the cascade asks.
    #[async_recursion]
    pub(super) async fn delete(&mut self, id: PersisterId, entities: &[EntityRef]) -> Result<()> {
        let persister = self.persister(id);

        let mut batch = vec![];
        for entity in entities {
            if self.processed.contains(entity) || !persister.is_persisted(entity)? {
                continue;
            }
            self.processed.insert(entity.clone());
            batch.push(entity.clone());
        }

        if batch.is_empty() {
            return Ok(());
        }

        tracing::debug!(entity = %persister.name(), count = batch.len(), "delete");

        persister.notify("before_delete", |listener| listener.before_delete(&batch));

        for step in &persister.pipeline.before_delete {
            self.run_delete_step(persister, *step, &batch).await?;
        }

        self.delete_rows(persister, &batch).await?;

        for entity in &batch {
            persister.mapping.identifier.mark_transient(entity)?;
        }

        for step in &persister.pipeline.after_delete {
            self.run_delete_step(persister, *step, &batch).await?;
        }

        persister.notify("after_delete", |listener| listener.after_delete(&batch));

        Ok(())
    }

    async fn run_delete_step(
        &mut self,
        persister: &Persister,
        step: Step,
        batch: &[EntityRef],
    ) -> Result<()> {
        let relation = persister.relation(step.relation);

        match step.action {
            Action::DeleteTargets => {
                let mut targets = vec![];
                for entity in batch {
                    targets.extend(relation.relation.accessor.targets(entity)?);
                }
                self.delete(relation.target, &targets).await
            }
            Action::CutLinks => {
                let ids = batch
                    .iter()
                    .map(|entity| persister.identifier(entity))
                    .collect::<Result<Vec<_>>>()?;
                self.cut_links(persister, step.relation, ids).await
            }
            action => Err(trestle_core::err!(
                "{action:?} cannot run while deleting `{}`",
                persister.name()
            )),
        }
    }

    /// Removes every stored link from the owners identified by `owners`,
    /// leaving targets in place.
    pub(super) async fn cut_links(
        &mut self,
        persister: &Persister,
        relation: usize,
        owners: Vec<Value>,
    ) -> Result<()> {
        let relation = persister.relation(relation);
        let context = || format!("unlink {}.{}", persister.name(), relation.relation.name);

        match &relation.ownership {
            Ownership::TargetOwned { column, index, .. } => {
                let target = self.persister(relation.target);
                let Some(table) = target.table else {
                    return Err(Error::unsupported_feature(format!(
                        "unlinking `{}` rows without a common table",
                        target.name()
                    )));
                };

                let mut assignments = vec![(*column, Value::Null)];
                assignments.extend(index.map(|index| (index, Value::Null)));

                self.exec_update(table, assignments, Filter::in_list(*column, owners), context)
                    .await?;
            }
            Ownership::AssociationTable { table, source, .. } => {
                self.exec_delete(*table, Filter::in_list(*source, owners), context)
                    .await?;
            }
            // The owner row holds the link and goes with it.
            Ownership::SourceOwned { .. } => {}
        }

        Ok(())
    }

    /// Deletes sub-type rows before the parent rows they reference.
    async fn delete_rows(&mut self, persister: &Persister, batch: &[EntityRef]) -> Result<()> {
        let mut levels: Vec<IndexMap<TableId, (ColumnId, Vec<Value>)>> = vec![];

        for entity in batch {
            let id = persister.identifier(entity)?;
            let sub = persister.sub_type_of(entity)?;

            for (level, target) in persister.row_targets(sub).into_iter().enumerate() {
                if levels.len() <= level {
                    levels.push(IndexMap::new());
                }
                levels[level]
                    .entry(target.table)
                    .or_insert_with(|| (target.id_column, vec![]))
                    .1
                    .push(id.clone());
            }
        }

        for tables in levels.into_iter().rev() {
            for (table, (id_column, ids)) in tables {
                self.exec_delete(table, Filter::in_list(id_column, ids), || {
                    format!("delete {}", persister.name())
                })
                .await?;
            }
        }

        Ok(())
    }
}
