use crate::{Error, Result};

use by_address::ByAddress;
use parking_lot::RwLock;
use std::{
    any::{type_name, Any},
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

/// A shared, mutable entity instance.
///
/// Relation fields hold `Option<Shared<U>>` or `Vec<Shared<U>>`, so entity
/// graphs may contain cycles and shared targets.
pub type Shared<T> = Arc<RwLock<T>>;

/// Wraps a value into a [`Shared`] handle.
pub fn shared<T>(value: T) -> Shared<T> {
    Arc::new(RwLock::new(value))
}

/// Creates a fresh, empty entity instance.
pub type Factory = Arc<dyn Fn() -> EntityRef + Send + Sync>;

/// A type-erased handle to a [`Shared`] entity.
///
/// Equality and hashing use the address of the shared allocation, so two
/// handles compare equal exactly when they refer to the same instance.
#[derive(Clone)]
pub struct EntityRef {
    handle: ByAddress<Arc<dyn Any + Send + Sync>>,
    type_name: &'static str,
}

impl EntityRef {
    pub fn new<T: Send + Sync + 'static>(entity: Shared<T>) -> EntityRef {
        let handle: Arc<dyn Any + Send + Sync> = entity;
        EntityRef {
            handle: ByAddress(handle),
            type_name: type_name::<T>(),
        }
    }

    /// Name of the concrete entity type.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is<T: 'static>(&self) -> bool {
        self.handle.0.downcast_ref::<RwLock<T>>().is_some()
    }

    /// Recovers the typed handle.
    pub fn downcast<T: Send + Sync + 'static>(&self) -> Result<Shared<T>> {
        Arc::clone(&self.handle.0)
            .downcast::<RwLock<T>>()
            .map_err(|_| Error::entity_type_mismatch(type_name::<T>(), self.type_name))
    }

    /// Runs `f` with a shared borrow of the entity.
    pub fn read<T: 'static, R>(&self, f: impl FnOnce(&T) -> R) -> Result<R> {
        let lock = self.lock::<T>()?;
        let guard = lock.read();
        Ok(f(&guard))
    }

    /// Runs `f` with an exclusive borrow of the entity.
    pub fn write<T: 'static, R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        let lock = self.lock::<T>()?;
        let mut guard = lock.write();
        Ok(f(&mut guard))
    }

    fn lock<T: 'static>(&self) -> Result<&RwLock<T>> {
        self.handle
            .0
            .downcast_ref::<RwLock<T>>()
            .ok_or_else(|| Error::entity_type_mismatch(type_name::<T>(), self.type_name))
    }

    fn addr(&self) -> *const () {
        Arc::as_ptr(&self.handle.0) as *const ()
    }
}

impl<T: Send + Sync + 'static> From<Shared<T>> for EntityRef {
    fn from(entity: Shared<T>) -> EntityRef {
        EntityRef::new(entity)
    }
}

impl<T: Send + Sync + 'static> From<&Shared<T>> for EntityRef {
    fn from(entity: &Shared<T>) -> EntityRef {
        EntityRef::new(entity.clone())
    }
}

impl PartialEq for EntityRef {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl Eq for EntityRef {}

impl Hash for EntityRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state)
    }
}

impl fmt::Debug for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityRef({} @ {:p})", self.type_name, self.addr())
    }
}
