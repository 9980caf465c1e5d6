use crate::{
    join_tree::{EntityShape, VariantShape},
    persister::{Ownership, PersisterId, Persisters},
};

use indexmap::IndexMap;
use std::collections::HashMap;
use trestle_core::{
    schema::app::{EntityRef, RelationKind},
    stmt::Value,
    Error, Result,
};

/// Turns rows into entity graphs.
///
/// The identity index lives as long as one top-level select: an
/// `(entity type, identifier)` pair materializes exactly once, however many
/// rows or relations reach it.
pub(super) struct Assembler<'a> {
    persisters: &'a Persisters,

    index: HashMap<(PersisterId, Value), EntityRef>,

    /// Targets gathered per owner relation, with their element position.
    collected: IndexMap<(EntityRef, usize), Collected>,

    /// Relations to load with follow-up selects, keyed by owner persister
    /// and relation. Each owner comes with the value the load is keyed by.
    pub(super) deferred: IndexMap<(PersisterId, usize), Vec<(EntityRef, Value)>>,
}

struct Collected {
    persister: PersisterId,
    targets: Vec<(Option<i64>, EntityRef)>,
}

impl<'a> Assembler<'a> {
    pub(super) fn new(persisters: &'a Persisters) -> Assembler<'a> {
        Assembler {
            persisters,
            index: HashMap::new(),
            collected: IndexMap::new(),
            deferred: IndexMap::new(),
        }
    }

    pub(super) fn lookup(&self, persister: PersisterId, id: &Value) -> Option<&EntityRef> {
        self.index.get(&(persister, id.clone()))
    }

    /// Materializes the entity `shape` describes in `row`, with its joined
    /// relations. Returns `None` when the row holds no such entity, as for
    /// the unmatched side of an outer join.
    pub(super) fn materialize(
        &mut self,
        shape: &EntityShape,
        row: &[Value],
    ) -> Result<Option<EntityRef>> {
        let id = slot(row, shape.id)?;
        if id.is_null() {
            return Ok(None);
        }

        let existing = self.lookup(shape.persister, id).cloned();
        let entity = match existing {
            Some(entity) => entity,
            None => self.instantiate(shape, row, id)?,
        };

        for relation in &shape.relations {
            let Some(target) = self.materialize(&relation.target, row)? else {
                continue;
            };

            let position = match relation.index {
                Some(index) => slot(row, index)?.to_position(),
                None => None,
            };

            self.collect(shape.persister, &entity, relation.relation, position, target);
        }

        Ok(Some(entity))
    }

    fn instantiate(&mut self, shape: &EntityShape, row: &[Value], id: &Value) -> Result<EntityRef> {
        let persister = self.persisters.persister(shape.persister);
        let mapping = &persister.mapping;

        let (sub, sub_columns) = match &shape.variant {
            VariantShape::None => (None, None),
            VariantShape::Discriminated {
                discriminator,
                sub_columns,
            } => {
                let value = slot(row, *discriminator)?;
                let position = persister
                    .sub_types()
                    .iter()
                    .position(|sub| Value::from(&sub.sub_type.discriminator) == *value)
                    .ok_or_else(|| {
                        Error::invalid_result(format!(
                            "`{}` row carries unknown discriminator {value:?}",
                            persister.name()
                        ))
                    })?;
                (Some(position), sub_columns.get(position))
            }
            VariantShape::Probed {
                sub_ids,
                sub_columns,
            } => {
                let mut found = None;
                for (position, sub_id) in sub_ids.iter().enumerate() {
                    if !slot(row, *sub_id)?.is_null() {
                        found = Some(position);
                        break;
                    }
                }
                let position = found.ok_or_else(|| {
                    Error::invalid_result(format!(
                        "`{}` row {id:?} has no sub-type row",
                        persister.name()
                    ))
                })?;
                (Some(position), sub_columns.get(position))
            }
        };

        let entity = match sub {
            Some(sub) => (persister.sub_types()[sub].sub_type.factory)(),
            None => mapping.instantiate(),
        };

        (mapping.identifier.set)(&entity, id.clone())?;

        for (index, property) in shape.columns.iter().chain(sub_columns.into_iter().flatten()) {
            (property.set)(&entity, slot(row, *index)?.clone()).map_err(|e| {
                e.context(trestle_core::err!(
                    "loading `{}.{}`",
                    persister.name(),
                    property.name
                ))
            })?;
        }

        mapping.identifier.mark_persisted(&entity, None)?;

        self.index
            .insert((shape.persister, id.clone()), entity.clone());

        // Every relation of a fresh entity is assigned once assembly ends,
        // even when nothing is found for it.
        for relation in &shape.relations {
            self.touch(shape.persister, &entity, relation.relation);
        }

        for deferred in &shape.deferred {
            self.touch(shape.persister, &entity, deferred.relation);

            let key = match deferred.key {
                Some(key) => slot(row, key)?.clone(),
                None => id.clone(),
            };
            if key.is_null() {
                continue;
            }

            self.deferred
                .entry((shape.persister, deferred.relation))
                .or_default()
                .push((entity.clone(), key));
        }

        Ok(entity)
    }

    fn touch(&mut self, persister: PersisterId, owner: &EntityRef, relation: usize) {
        self.collected
            .entry((owner.clone(), relation))
            .or_insert_with(|| Collected {
                persister,
                targets: vec![],
            });
    }

    pub(super) fn collect(
        &mut self,
        persister: PersisterId,
        owner: &EntityRef,
        relation: usize,
        position: Option<i64>,
        target: EntityRef,
    ) {
        self.touch(persister, owner, relation);
        if let Some(collected) = self.collected.get_mut(&(owner.clone(), relation)) {
            collected.targets.push((position, target));
        }
    }

    /// Assigns every gathered relation to its owner.
    pub(super) fn finish(self) -> Result<()> {
        for ((owner, relation), collected) in self.collected {
            let persister = self.persisters.persister(collected.persister);
            let relation = persister.relation(relation);

            let mut targets = collected.targets;
            targets.sort_by_key(|(position, _)| position.unwrap_or(i64::MAX));

            let mut assigned: Vec<EntityRef> = vec![];
            for (_, target) in targets {
                if !assigned.contains(&target) {
                    assigned.push(target);
                }
            }

            if relation.relation.kind == RelationKind::OneToOne {
                if assigned.is_empty() && relation.relation.mandatory {
                    return Err(Error::mandatory_relation(
                        &persister.name(),
                        &relation.relation.name,
                    ));
                }
                assigned.truncate(1);
            }

            if let Ownership::TargetOwned {
                reverse: Some(reverse),
                ..
            } = &relation.ownership
            {
                for target in &assigned {
                    (reverse.set)(target, Some(owner.clone()))?;
                }
            }

            relation.relation.accessor.assign(&owner, assigned)?;
        }

        Ok(())
    }
}

pub(super) fn slot(row: &[Value], index: usize) -> Result<&Value> {
    row.get(index).ok_or_else(|| {
        Error::invalid_result(format!(
            "row has {} values, expected at least {}",
            row.len(),
            index + 1
        ))
    })
}
