use crate::logging_connection::DriverOp;
use parking_lot::Mutex;
use std::sync::Arc;
use trestle_core::{
    driver::{Operation, Response},
    schema::db::{Schema, TableId},
};

/// A wrapper around the operations log that provides a clean API for tests
#[derive(Clone)]
pub struct ExecLog {
    ops: Arc<Mutex<Vec<DriverOp>>>,
}

impl ExecLog {
    pub(crate) fn new(ops: Arc<Mutex<Vec<DriverOp>>>) -> Self {
        Self { ops }
    }

    /// Get the number of logged operations
    pub fn len(&self) -> usize {
        self.ops.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.lock().is_empty()
    }

    /// Check if any operation matches the given predicate
    pub fn any<F>(&self, predicate: F) -> bool
    where
        F: Fn(&Operation) -> bool,
    {
        self.ops.lock().iter().any(|op| predicate(&op.operation))
    }

    /// Count operations matching the given predicate
    pub fn count<F>(&self, predicate: F) -> usize
    where
        F: Fn(&Operation) -> bool,
    {
        self.ops
            .lock()
            .iter()
            .filter(|op| predicate(&op.operation))
            .count()
    }

    pub fn reads(&self) -> usize {
        self.count(Operation::is_read)
    }

    pub fn writes(&self) -> usize {
        self.count(|op| !op.is_read())
    }

    /// Writes issued against the table named `table`.
    pub fn writes_to(&self, schema: &Schema, table: &str) -> usize {
        let Some(id) = table_id(schema, table) else {
            return 0;
        };
        self.count(|op| op.written_table() == Some(id))
    }

    pub fn inserts_into(&self, schema: &Schema, table: &str) -> usize {
        let Some(id) = table_id(schema, table) else {
            return 0;
        };
        self.count(|op| op.is_insert() && op.written_table() == Some(id))
    }

    pub fn deletes_from(&self, schema: &Schema, table: &str) -> usize {
        let Some(id) = table_id(schema, table) else {
            return 0;
        };
        self.count(|op| op.is_delete() && op.written_table() == Some(id))
    }

    /// Clear the log
    pub fn clear(&self) {
        self.ops.lock().clear();
    }

    /// Remove and return the first operation from the log
    pub fn pop(&self) -> Option<(Operation, Response)> {
        let mut ops = self.ops.lock();
        if ops.is_empty() {
            None
        } else {
            let driver_op = ops.remove(0);
            Some((driver_op.operation, driver_op.response))
        }
    }

    /// Escape hatch for assertions the helpers do not cover
    pub fn with_ops<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&[DriverOp]) -> R,
    {
        let ops = self.ops.lock();
        f(&ops)
    }
}

fn table_id(schema: &Schema, table: &str) -> Option<TableId> {
    schema.table_by_name(table).map(|table| table.id)
}
