use super::{one_accessor, OneGetter, OneSetter};
use crate::schema::app::{CascadeMode, Shared};

use std::{fmt, marker::PhantomData};

/// Options of a relation from `T` to `U`.
///
/// ```ignore
/// RelationConfig::new()
///     .cascade(CascadeMode::AllOrphanRemoval)
///     .mapped_by("owner", |h: &House| h.owner.clone(), |h, owner| h.owner = owner)
/// ```
pub struct RelationConfig<T, U> {
    pub(crate) cascade: CascadeMode,
    pub(crate) ownership: OwnershipHint,
    pub(crate) pair: Option<String>,
    pub(crate) index_column: Option<String>,
    pub(crate) fetch_separately: bool,
    pub(crate) mandatory: bool,
    _p: PhantomData<fn(T, U)>,
}

/// What the descriptor says about which side stores the link.
#[derive(Clone, Default)]
pub enum OwnershipHint {
    /// Decided from the relation kind.
    #[default]
    Unspecified,

    /// The owner's table stores the target's identifier.
    ForeignKey { column: Option<String> },

    /// The target's table stores the owner's identifier.
    MappedBy {
        column: Option<String>,
        reverse: Option<ReverseAccessor>,
    },

    /// A dedicated table stores `(owner, target)` pairs.
    AssociationTable(AssociationTableHint),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssociationTableHint {
    pub name: Option<String>,
    pub source_column: Option<String>,
    pub target_column: Option<String>,
}

/// Accessor on the target pointing back at the owner.
#[derive(Clone)]
pub struct ReverseAccessor {
    pub name: String,
    pub get: OneGetter,
    pub set: OneSetter,
}

impl<T: 'static, U: Send + Sync + 'static> RelationConfig<T, U> {
    pub fn new() -> RelationConfig<T, U> {
        RelationConfig {
            cascade: CascadeMode::default(),
            ownership: OwnershipHint::Unspecified,
            pair: None,
            index_column: None,
            fetch_separately: false,
            mandatory: false,
            _p: PhantomData,
        }
    }

    pub fn cascade(mut self, cascade: CascadeMode) -> Self {
        self.cascade = cascade;
        self
    }

    /// Stores the link in the owner's table, in `column` (defaults to
    /// `{relation}_id`).
    pub fn foreign_key(mut self, column: Option<&str>) -> Self {
        self.ownership = OwnershipHint::ForeignKey {
            column: column.map(str::to_string),
        };
        self
    }

    /// Stores the link in the target's table, in `column`.
    pub fn mapped_by_column(mut self, column: &str) -> Self {
        let reverse = match std::mem::take(&mut self.ownership) {
            OwnershipHint::MappedBy { reverse, .. } => reverse,
            _ => None,
        };
        self.ownership = OwnershipHint::MappedBy {
            column: Some(column.to_string()),
            reverse,
        };
        self
    }

    /// Stores the link in the target's table, in the column of the target's
    /// relation `name` back to the owner. The accessor is kept in sync when
    /// loading.
    pub fn mapped_by(
        mut self,
        name: &str,
        get: impl Fn(&U) -> Option<Shared<T>> + Send + Sync + 'static,
        set: impl Fn(&mut U, Option<Shared<T>>) + Send + Sync + 'static,
    ) -> Self
    where
        T: Send + Sync,
        U: 'static,
    {
        let column = match std::mem::take(&mut self.ownership) {
            OwnershipHint::MappedBy { column, .. } => column,
            _ => None,
        };
        let (get, set) = one_accessor(get, set);
        self.ownership = OwnershipHint::MappedBy {
            column,
            reverse: Some(ReverseAccessor {
                name: name.to_string(),
                get,
                set,
            }),
        };
        self
    }

    /// Stores links in a dedicated table named `{owner table}_{relation}`.
    pub fn association_table(mut self) -> Self {
        self.ownership = OwnershipHint::AssociationTable(AssociationTableHint::default());
        self
    }

    /// Stores links in a dedicated table with explicit names.
    pub fn association_table_named(
        mut self,
        name: &str,
        source_column: &str,
        target_column: &str,
    ) -> Self {
        self.ownership = OwnershipHint::AssociationTable(AssociationTableHint {
            name: Some(name.to_string()),
            source_column: Some(source_column.to_string()),
            target_column: Some(target_column.to_string()),
        });
        self
    }

    /// Names the inverse relation declared on the target.
    pub fn pair(mut self, name: &str) -> Self {
        self.pair = Some(name.to_string());
        self
    }

    /// Persists the position of each element in `column`.
    pub fn index_column(mut self, column: &str) -> Self {
        self.index_column = Some(column.to_string());
        self
    }

    pub fn fetch_separately(mut self) -> Self {
        self.fetch_separately = true;
        self
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }
}

impl<T: 'static, U: Send + Sync + 'static> Default for RelationConfig<T, U> {
    fn default() -> Self {
        RelationConfig::new()
    }
}

impl fmt::Debug for OwnershipHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnershipHint::Unspecified => f.write_str("Unspecified"),
            OwnershipHint::ForeignKey { column } => f
                .debug_struct("ForeignKey")
                .field("column", column)
                .finish(),
            OwnershipHint::MappedBy { column, reverse } => f
                .debug_struct("MappedBy")
                .field("column", column)
                .field("reverse", &reverse.as_ref().map(|r| &r.name))
                .finish(),
            OwnershipHint::AssociationTable(hint) => {
                f.debug_tuple("AssociationTable").field(hint).finish()
            }
        }
    }
}

impl fmt::Debug for ReverseAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReverseAccessor")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
