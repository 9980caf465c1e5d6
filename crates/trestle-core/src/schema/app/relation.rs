mod config;
pub use config::{AssociationTableHint, OwnershipHint, RelationConfig, ReverseAccessor};

use super::{CascadeMode, EntityRef, MappingRef, Shared};
use crate::Result;

use std::{any::TypeId, fmt, sync::Arc};

pub type OneGetter = Arc<dyn Fn(&EntityRef) -> Result<Option<EntityRef>> + Send + Sync>;
pub type OneSetter = Arc<dyn Fn(&EntityRef, Option<EntityRef>) -> Result<()> + Send + Sync>;
pub type ManyGetter = Arc<dyn Fn(&EntityRef) -> Result<Vec<EntityRef>> + Send + Sync>;
pub type ManySetter = Arc<dyn Fn(&EntityRef, Vec<EntityRef>) -> Result<()> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    OneToOne,
    OneToMany,
    ManyToMany,
}

impl RelationKind {
    pub fn is_collection(self) -> bool {
        !matches!(self, RelationKind::OneToOne)
    }
}

/// A link from an owner entity to one or many target entities.
#[derive(Clone)]
pub struct Relation {
    pub name: String,

    pub kind: RelationKind,

    pub target: MappingRef,

    /// Type the target mapping must describe.
    pub target_type: TypeId,

    pub target_type_name: &'static str,

    pub accessor: RelationAccessor,

    pub cascade: CascadeMode,

    pub ownership: OwnershipHint,

    /// Name of the inverse relation declared on the target, if any.
    pub pair: Option<String>,

    /// Column storing the element position of an indexed collection.
    pub index_column: Option<String>,

    /// Load through a follow-up select instead of a join.
    pub fetch_separately: bool,

    /// The relation must be set when the owner is written.
    pub mandatory: bool,
}

#[derive(Clone)]
pub enum RelationAccessor {
    One { get: OneGetter, set: OneSetter },
    Many { get: ManyGetter, set: ManySetter },
}

impl Relation {
    pub fn is_collection(&self) -> bool {
        self.kind.is_collection()
    }
}

impl RelationAccessor {
    pub(super) fn one<T, U>(
        get: impl Fn(&T) -> Option<Shared<U>> + Send + Sync + 'static,
        set: impl Fn(&mut T, Option<Shared<U>>) + Send + Sync + 'static,
    ) -> RelationAccessor
    where
        T: 'static,
        U: Send + Sync + 'static,
    {
        let (get, set) = one_accessor(get, set);
        RelationAccessor::One { get, set }
    }

    pub(super) fn many<T, U>(
        get: impl Fn(&T) -> Vec<Shared<U>> + Send + Sync + 'static,
        set: impl Fn(&mut T, Vec<Shared<U>>) + Send + Sync + 'static,
    ) -> RelationAccessor
    where
        T: 'static,
        U: Send + Sync + 'static,
    {
        RelationAccessor::Many {
            get: Arc::new(move |entity: &EntityRef| {
                entity.read(|e: &T| get(e).into_iter().map(EntityRef::new).collect::<Vec<_>>())
            }),
            set: Arc::new(move |entity: &EntityRef, targets: Vec<EntityRef>| {
                let targets = targets
                    .iter()
                    .map(EntityRef::downcast::<U>)
                    .collect::<Result<Vec<_>>>()?;
                entity.write(|e: &mut T| set(e, targets))
            }),
        }
    }

    /// Returns the current targets, in collection order.
    pub fn targets(&self, entity: &EntityRef) -> Result<Vec<EntityRef>> {
        match self {
            RelationAccessor::One { get, .. } => Ok(get(entity)?.into_iter().collect()),
            RelationAccessor::Many { get, .. } => get(entity),
        }
    }

    /// Replaces the targets. A single-valued relation takes the first one.
    pub fn assign(&self, entity: &EntityRef, targets: Vec<EntityRef>) -> Result<()> {
        match self {
            RelationAccessor::One { set, .. } => set(entity, targets.into_iter().next()),
            RelationAccessor::Many { set, .. } => set(entity, targets),
        }
    }
}

pub(super) fn one_accessor<T, U>(
    get: impl Fn(&T) -> Option<Shared<U>> + Send + Sync + 'static,
    set: impl Fn(&mut T, Option<Shared<U>>) + Send + Sync + 'static,
) -> (OneGetter, OneSetter)
where
    T: 'static,
    U: Send + Sync + 'static,
{
    let get: OneGetter =
        Arc::new(move |entity: &EntityRef| entity.read(|e: &T| get(e).map(EntityRef::new)));
    let set: OneSetter = Arc::new(move |entity: &EntityRef, target: Option<EntityRef>| {
        let target = target.as_ref().map(EntityRef::downcast::<U>).transpose()?;
        entity.write(|e: &mut T| set(e, target))
    });
    (get, set)
}

impl fmt::Debug for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relation")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("target", &self.target_type_name)
            .field("cascade", &self.cascade)
            .field("ownership", &self.ownership)
            .field("pair", &self.pair)
            .field("index_column", &self.index_column)
            .field("fetch_separately", &self.fetch_separately)
            .field("mandatory", &self.mandatory)
            .finish_non_exhaustive()
    }
}
