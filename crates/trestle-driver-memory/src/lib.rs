mod constraint;
pub use constraint::ConstraintViolation;

mod store;
use store::Store;

use parking_lot::Mutex;
use std::sync::Arc;
use trestle_core::{
    async_trait,
    driver::{Capability, Operation, Response},
    schema::db::Schema,
    stmt::Value,
    Result,
};

/// An in-memory store. Connections opened from the same `Memory` share its
/// tables.
#[derive(Debug, Clone)]
pub struct Memory {
    store: Arc<Mutex<Store>>,
    capability: Capability,
}

impl Memory {
    /// A store with multi-row inserts and foreign key checks.
    pub fn new() -> Self {
        Self::with_capability(Capability::RELATIONAL)
    }

    pub fn with_capability(capability: Capability) -> Self {
        Memory {
            store: Arc::new(Mutex::new(Store::default())),
            capability,
        }
    }

    pub fn connect(&self) -> Connection {
        Connection {
            store: self.store.clone(),
            capability: self.capability.clone(),
        }
    }

    /// Rows of the table named `table`, in insertion order, with one value
    /// per column. Empty if nothing was written to it yet.
    pub fn rows(&self, table: &str) -> Vec<Vec<Value>> {
        self.store.lock().rows(table)
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.rows(table).len()
    }

    /// Value of column `column` in every row of `table`.
    pub fn column(&self, table: &str, column: &str) -> Vec<Value> {
        self.store.lock().column(table, column)
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct Connection {
    store: Arc<Mutex<Store>>,
    capability: Capability,
}

#[async_trait]
impl trestle_core::Connection for Connection {
    fn capability(&self) -> &Capability {
        &self.capability
    }

    async fn exec(&mut self, schema: &Arc<Schema>, op: Operation) -> Result<Response> {
        tracing::trace!(?op, "memory exec");

        let mut store = self.store.lock();
        store.attach(schema);
        store
            .exec(schema, op, self.capability.enforces_foreign_keys)
            .map_err(trestle_core::Error::driver_operation_failed)
    }
}
