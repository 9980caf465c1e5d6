use super::{
    assemble::{slot, Assembler},
    Exec,
};
use crate::{join_tree::Key, persister::{Ownership, PersisterId}};

use std::collections::HashMap;
use trestle_core::{
    driver::Operation,
    schema::db::ColumnId,
    stmt::{Filter, ProjectionExpr, Select, Value},
    EntityRef, Result,
};

impl Exec<'_> {
    /// Loads the entities matching `key` with everything reachable through
    /// their relations.
    pub(super) async fn select(&mut self, id: PersisterId, key: Key) -> Result<Vec<EntityRef>> {
        let persister = self.persister(id);

        let ids = match &key {
            Key::Ids(ids) => ids.clone(),
            _ => vec![],
        };

        persister.notify("before_select", |listener| listener.before_select(&ids));

        let mut assembler = Assembler::new(self.persisters);

        let mut roots = vec![];
        for (entity, _) in self.load(&mut assembler, id, &key, &[]).await? {
            if !roots.contains(&entity) {
                roots.push(entity);
            }
        }

        self.load_deferred(&mut assembler).await?;
        assembler.finish()?;

        tracing::debug!(entity = %persister.name(), count = roots.len(), "selected");

        persister.notify("after_select", |listener| listener.after_select(&roots));

        Ok(roots)
    }

    /// Runs the join tree of `id` and materializes every row, returning the
    /// root entity of each row with the values of the `extra` columns.
    async fn load(
        &mut self,
        assembler: &mut Assembler<'_>,
        id: PersisterId,
        key: &Key,
        extra: &[ColumnId],
    ) -> Result<Vec<(EntityRef, Vec<Value>)>> {
        let persister = self.persister(id);
        let tree = persister.join_tree();
        let width = tree.width();

        let op = tree.operation(key, extra)?;
        let rows = self
            .exec(op, || format!("select {}", persister.name()))
            .await?
            .rows
            .into_values()?;

        let mut loaded = vec![];
        for row in rows {
            let row = row.into_vec();
            let Some(entity) = assembler.materialize(&tree.root, &row)? else {
                continue;
            };
            let extra = row.get(width..).map(<[Value]>::to_vec).unwrap_or_default();
            loaded.push((entity, extra));
        }

        Ok(loaded)
    }

    /// Loads relations left out of the joins, until loading stops finding
    /// entities not seen before.
    async fn load_deferred(&mut self, assembler: &mut Assembler<'_>) -> Result<()> {
        while let Some(((owner, relation), owners)) = assembler.deferred.shift_remove_index(0) {
            let persister = self.persister(owner);
            let relation_index = relation;
            let relation = persister.relation(relation);
            let target = relation.target;

            tracing::debug!(
                entity = %persister.name(),
                relation = %relation.relation.name,
                owners = owners.len(),
                "loading deferred relation"
            );

            let mut by_key: HashMap<Value, Vec<EntityRef>> = HashMap::new();
            for (entity, key) in &owners {
                by_key.entry(key.clone()).or_default().push(entity.clone());
            }
            let keys = by_key.keys().cloned().collect::<Vec<_>>();

            match &relation.ownership {
                Ownership::SourceOwned { .. } => {
                    self.load_missing(assembler, target, &keys).await?;

                    for (entity, key) in &owners {
                        if let Some(linked) = assembler.lookup(target, key).cloned() {
                            assembler.collect(owner, entity, relation_index, None, linked);
                        }
                    }
                }
                Ownership::TargetOwned { column, index, .. } => {
                    let mut extra = vec![*column];
                    extra.extend(*index);

                    let loaded = self
                        .load(assembler, target, &Key::Column(*column, keys), &extra)
                        .await?;

                    for (linked, extra) in loaded {
                        let Some(key) = extra.first() else {
                            continue;
                        };
                        let position = extra.get(1).and_then(Value::to_position);

                        for entity in by_key.get(key).into_iter().flatten() {
                            assembler.collect(
                                owner,
                                entity,
                                relation_index,
                                position,
                                linked.clone(),
                            );
                        }
                    }
                }
                Ownership::AssociationTable {
                    table,
                    source,
                    target: target_column,
                    index,
                } => {
                    let mut select = Select::new(*table);
                    for column in [Some(*source), Some(*target_column), *index]
                        .into_iter()
                        .flatten()
                    {
                        let name = &self.persisters.schema.column(column).name;
                        select.project(name.clone(), ProjectionExpr::Column { node: 0, column });
                    }
                    select.filter = Filter::in_list(*source, keys);

                    let links = self
                        .exec(Operation::Select(select), || {
                            format!("select {}.{} links", persister.name(), relation.relation.name)
                        })
                        .await?
                        .rows
                        .into_values()?;

                    let mut pairs = vec![];
                    for link in links {
                        let source = slot(&link, 0)?.clone();
                        let linked = slot(&link, 1)?.clone();
                        let position = match index {
                            Some(_) => slot(&link, 2)?.to_position(),
                            None => None,
                        };
                        pairs.push((source, linked, position));
                    }

                    let targets = pairs
                        .iter()
                        .map(|(_, linked, _)| linked.clone())
                        .collect::<Vec<_>>();
                    self.load_missing(assembler, target, &targets).await?;

                    for (source, linked, position) in pairs {
                        let Some(linked) = assembler.lookup(target, &linked).cloned() else {
                            continue;
                        };
                        for entity in by_key.get(&source).into_iter().flatten() {
                            assembler.collect(
                                owner,
                                entity,
                                relation_index,
                                position,
                                linked.clone(),
                            );
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Loads the entities of `id` among `ids` that were not materialized
    /// yet.
    async fn load_missing(
        &mut self,
        assembler: &mut Assembler<'_>,
        id: PersisterId,
        ids: &[Value],
    ) -> Result<()> {
        let mut missing = vec![];
        for value in ids {
            if !value.is_null() && assembler.lookup(id, value).is_none() && !missing.contains(value) {
                missing.push(value.clone());
            }
        }

        if missing.is_empty() {
            return Ok(());
        }

        self.load(assembler, id, &Key::Ids(missing), &[]).await?;
        Ok(())
    }
}
