//! Hooks invoked around persister operations.
//!
//! Listeners are registered per persister and run in registration order.
//! They observe only: an error returned from a hook is logged and the
//! operation carries on.

use trestle_core::{stmt::Value, EntityRef, Result};

#[allow(unused_variables)]
pub trait Listener: Send + Sync {
    fn before_insert(&self, entities: &[EntityRef]) -> Result<()> {
        Ok(())
    }

    fn after_insert(&self, entities: &[EntityRef]) -> Result<()> {
        Ok(())
    }

    /// `entities` holds `(current, previous)` pairs. Without a previous
    /// state every column is written.
    fn before_update(&self, entities: &[(EntityRef, Option<EntityRef>)]) -> Result<()> {
        Ok(())
    }

    fn after_update(&self, entities: &[(EntityRef, Option<EntityRef>)]) -> Result<()> {
        Ok(())
    }

    fn before_delete(&self, entities: &[EntityRef]) -> Result<()> {
        Ok(())
    }

    fn after_delete(&self, entities: &[EntityRef]) -> Result<()> {
        Ok(())
    }

    fn before_select(&self, ids: &[Value]) -> Result<()> {
        Ok(())
    }

    fn after_select(&self, entities: &[EntityRef]) -> Result<()> {
        Ok(())
    }
}
