use crate::persister::{Action, Ownership, Persister, PersisterId, RelationPersister, Step};

use trestle_core::{
    schema::app::{CascadeMode, Relation},
    Error, Result,
};

/// Installs the steps `relation` contributes to the owner's write pipeline.
///
/// | ownership      | insert         | update              | delete                  |
/// |----------------|----------------|---------------------|-------------------------|
/// | source-owned   | targets before | targets before      | orphans after           |
/// | target-owned   | link after     | reconcile after     | cut (and orphans) before|
/// | association    | link after     | reconcile after     | cut before              |
pub(super) fn configure(
    persister: &mut Persister,
    relation: Relation,
    target: PersisterId,
    ownership: Ownership,
) -> Result<()> {
    let index = persister.relations.len();
    let cascade = relation.cascade;
    let step = |action| Step {
        relation: index,
        action,
    };

    let pipeline = &mut persister.pipeline;

    match (&ownership, cascade) {
        (_, CascadeMode::ReadOnly) => {}
        (Ownership::SourceOwned { .. }, CascadeMode::AssociationOnly)
        | (Ownership::TargetOwned { .. }, CascadeMode::AssociationOnly) => {
            return Err(Error::invalid_mapping(format!(
                "`{}.{}` uses association-only cascade but is not stored in an association table",
                persister.mapping.name, relation.name
            )));
        }
        (Ownership::SourceOwned { .. }, _) => {
            pipeline.before_insert.push(step(Action::InsertTargets));
            pipeline.before_update.push(step(Action::UpdateTargets {
                insert: true,
                orphans: false,
            }));

            if cascade.removes_orphans() {
                // The owner row references the targets, so they go once it
                // no longer does.
                pipeline.after_update.push(step(Action::RemoveOrphans));
                pipeline.after_delete.push(step(Action::DeleteTargets));
            }
        }
        (Ownership::TargetOwned { .. }, _) => {
            pipeline.after_insert.push(step(Action::LinkTargets { insert: true }));
            pipeline.after_update.push(step(Action::UpdateTargets {
                insert: true,
                orphans: cascade.removes_orphans(),
            }));

            if cascade.removes_orphans() {
                pipeline.before_delete.push(step(Action::DeleteTargets));
            }
            pipeline.before_delete.push(step(Action::CutLinks));
        }
        (Ownership::AssociationTable { .. }, CascadeMode::AssociationOnly) => {
            pipeline
                .after_insert
                .push(step(Action::LinkTargets { insert: false }));
            pipeline.after_update.push(step(Action::UpdateTargets {
                insert: false,
                orphans: false,
            }));
            pipeline.before_delete.push(step(Action::CutLinks));
        }
        (Ownership::AssociationTable { .. }, _) => {
            pipeline.after_insert.push(step(Action::LinkTargets { insert: true }));
            pipeline.after_update.push(step(Action::UpdateTargets {
                insert: true,
                orphans: cascade.removes_orphans(),
            }));
            pipeline.before_delete.push(step(Action::CutLinks));

            if cascade.removes_orphans() {
                pipeline.after_delete.push(step(Action::DeleteTargets));
            }
        }
    }

    tracing::debug!(
        entity = %persister.mapping.name,
        relation = %relation.name,
        ?cascade,
        "configured cascade"
    );

    persister.relations.push(RelationPersister {
        relation,
        target,
        ownership,
    });

    Ok(())
}
