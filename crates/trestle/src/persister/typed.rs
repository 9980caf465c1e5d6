use super::{Persister, PersisterId, Persisters};
use crate::{engine, join_tree::Key, listener::Listener};

use std::{fmt, marker::PhantomData, sync::Arc};
use trestle_core::{schema::app::Shared, stmt::Value, Connection, EntityRef, Result};

/// Typed entry point for reading and writing entities of `T`.
///
/// Every call borrows a connection for its duration and starts with fresh
/// bookkeeping: an entity reached twice within one call is written or
/// materialized once.
pub struct EntityPersister<T> {
    persisters: Arc<Persisters>,
    id: PersisterId,
    _p: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> EntityPersister<T> {
    pub(crate) fn new(persisters: Arc<Persisters>, id: PersisterId) -> Self {
        EntityPersister {
            persisters,
            id,
            _p: PhantomData,
        }
    }

    pub fn persisters(&self) -> &Arc<Persisters> {
        &self.persisters
    }

    pub fn persister(&self) -> &Persister {
        self.persisters.persister(self.id)
    }

    pub fn add_listener(&self, listener: Arc<dyn Listener>) {
        self.persister().add_listener(listener);
    }

    /// Inserts `entity` if it is not persisted, cascading to its relations.
    pub async fn insert(&self, conn: &mut dyn Connection, entity: &Shared<T>) -> Result<()> {
        self.insert_all(conn, std::slice::from_ref(entity)).await
    }

    pub async fn insert_all(&self, conn: &mut dyn Connection, entities: &[Shared<T>]) -> Result<()> {
        engine::insert(&self.persisters, self.id, conn, erase(entities)).await
    }

    /// Writes `current`. With a `previous` state only changed columns and
    /// links are written, unless `full_replace` is set.
    pub async fn update(
        &self,
        conn: &mut dyn Connection,
        current: &Shared<T>,
        previous: Option<&Shared<T>>,
        full_replace: bool,
    ) -> Result<()> {
        let pair = (EntityRef::from(current), previous.map(EntityRef::from));
        engine::update(&self.persisters, self.id, conn, vec![pair], full_replace).await
    }

    pub async fn update_all(
        &self,
        conn: &mut dyn Connection,
        pairs: &[(Shared<T>, Option<Shared<T>>)],
        full_replace: bool,
    ) -> Result<()> {
        let pairs = pairs
            .iter()
            .map(|(current, previous)| (EntityRef::from(current), previous.as_ref().map(EntityRef::from)))
            .collect();
        engine::update(&self.persisters, self.id, conn, pairs, full_replace).await
    }

    pub async fn delete(&self, conn: &mut dyn Connection, entity: &Shared<T>) -> Result<()> {
        self.delete_all(conn, std::slice::from_ref(entity)).await
    }

    pub async fn delete_all(&self, conn: &mut dyn Connection, entities: &[Shared<T>]) -> Result<()> {
        engine::delete(&self.persisters, self.id, conn, erase(entities)).await
    }

    /// Loads the entity with identifier `id`, if there is one.
    pub async fn select(
        &self,
        conn: &mut dyn Connection,
        id: impl Into<Value>,
    ) -> Result<Option<Shared<T>>> {
        Ok(self.select_many(conn, vec![id.into()]).await?.into_iter().next())
    }

    /// Loads the entities with these identifiers, skipping unknown ones.
    pub async fn select_many(
        &self,
        conn: &mut dyn Connection,
        ids: Vec<Value>,
    ) -> Result<Vec<Shared<T>>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        self.load(conn, Key::Ids(ids)).await
    }

    pub async fn select_all(&self, conn: &mut dyn Connection) -> Result<Vec<Shared<T>>> {
        self.load(conn, Key::All).await
    }

    async fn load(&self, conn: &mut dyn Connection, key: Key) -> Result<Vec<Shared<T>>> {
        engine::select(&self.persisters, self.id, conn, key)
            .await?
            .iter()
            .map(EntityRef::downcast::<T>)
            .collect()
    }
}

impl<T> Clone for EntityPersister<T> {
    fn clone(&self) -> Self {
        EntityPersister {
            persisters: self.persisters.clone(),
            id: self.id,
            _p: PhantomData,
        }
    }
}

impl<T> fmt::Debug for EntityPersister<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityPersister")
            .field("entity", &std::any::type_name::<T>())
            .field("persister", &self.id)
            .finish()
    }
}

fn erase<T: Send + Sync + 'static>(entities: &[Shared<T>]) -> Vec<EntityRef> {
    entities.iter().map(EntityRef::from).collect()
}
