use super::{EntityRef, Getter, Setter};
use crate::{
    stmt::{Type, Value},
    Result,
};

use std::{fmt, sync::Arc};

/// The identifier of an entity: its accessor, column and how new values
/// are produced.
#[derive(Clone)]
pub struct Identifier {
    pub name: String,
    pub column: String,
    pub ty: Type,
    pub get: Getter,
    pub set: Setter,
    pub policy: IdentifierPolicy,
}

/// How identifiers are assigned and how persisted state is tracked.
#[derive(Clone)]
pub enum IdentifierPolicy {
    /// The store assigns the identifier on insert. A null identifier means
    /// the entity is not persisted.
    AutoIncrement,

    /// The identifier is produced right before insert. A null identifier
    /// means the entity is not persisted.
    Generated(Arc<dyn Fn() -> Value + Send + Sync>),

    /// The application assigns identifiers and tracks persisted state
    /// itself.
    AlreadyAssigned {
        is_persisted: Arc<dyn Fn(&EntityRef) -> Result<bool> + Send + Sync>,
        mark_persisted: Arc<dyn Fn(&EntityRef, bool) -> Result<()> + Send + Sync>,
    },
}

impl Identifier {
    pub fn value(&self, entity: &EntityRef) -> Result<Value> {
        (self.get)(entity)
    }

    pub fn is_auto_increment(&self) -> bool {
        matches!(self.policy, IdentifierPolicy::AutoIncrement)
    }

    pub fn is_persisted(&self, entity: &EntityRef) -> Result<bool> {
        match &self.policy {
            IdentifierPolicy::AutoIncrement | IdentifierPolicy::Generated(_) => {
                Ok(!self.value(entity)?.is_null())
            }
            IdentifierPolicy::AlreadyAssigned { is_persisted, .. } => is_persisted(entity),
        }
    }

    /// Assigns a freshly generated identifier, if the policy produces one
    /// before insert.
    pub fn generate(&self, entity: &EntityRef) -> Result<()> {
        if let IdentifierPolicy::Generated(generate) = &self.policy {
            if self.value(entity)?.is_null() {
                (self.set)(entity, generate())?;
            }
        }
        Ok(())
    }

    /// Records that the entity's row now exists. `assigned` carries the
    /// identifier returned by the store, if any.
    pub fn mark_persisted(&self, entity: &EntityRef, assigned: Option<Value>) -> Result<()> {
        match &self.policy {
            IdentifierPolicy::AutoIncrement => match assigned {
                Some(id) => (self.set)(entity, id),
                None => Ok(()),
            },
            IdentifierPolicy::Generated(_) => Ok(()),
            IdentifierPolicy::AlreadyAssigned { mark_persisted, .. } => {
                mark_persisted(entity, true)
            }
        }
    }

    /// Clears an identifier assigned for a row that was never written.
    /// Application-assigned identifiers are left alone.
    pub fn unassign(&self, entity: &EntityRef) -> Result<()> {
        match &self.policy {
            IdentifierPolicy::AutoIncrement | IdentifierPolicy::Generated(_) => {
                (self.set)(entity, Value::Null)
            }
            IdentifierPolicy::AlreadyAssigned { .. } => Ok(()),
        }
    }

    /// Records that the entity's row no longer exists.
    pub fn mark_transient(&self, entity: &EntityRef) -> Result<()> {
        match &self.policy {
            IdentifierPolicy::AutoIncrement | IdentifierPolicy::Generated(_) => {
                (self.set)(entity, Value::Null)
            }
            IdentifierPolicy::AlreadyAssigned { mark_persisted, .. } => {
                mark_persisted(entity, false)
            }
        }
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identifier")
            .field("name", &self.name)
            .field("column", &self.column)
            .field("ty", &self.ty)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for IdentifierPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentifierPolicy::AutoIncrement => f.write_str("AutoIncrement"),
            IdentifierPolicy::Generated(_) => f.write_str("Generated"),
            IdentifierPolicy::AlreadyAssigned { .. } => f.write_str("AlreadyAssigned"),
        }
    }
}
