use parking_lot::Mutex;
use std::sync::Arc;
use trestle_core::{
    async_trait,
    driver::{Capability, Connection, Operation, Response},
    schema::db::Schema,
    Result,
};

#[derive(Debug)]
pub struct DriverOp {
    pub operation: Operation,
    pub response: Response,
}

/// A connection wrapper that logs every operation it forwards, with the
/// response the inner connection returned.
#[derive(Debug)]
pub struct LoggingConnection {
    /// The connection that actually executes operations
    inner: Box<dyn Connection>,

    /// Shared with the [`ExecLog`](crate::ExecLog) handed to tests
    ops_log: Arc<Mutex<Vec<DriverOp>>>,
}

impl LoggingConnection {
    pub fn new(inner: Box<dyn Connection>) -> Self {
        Self {
            inner,
            ops_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn ops_log_handle(&self) -> Arc<Mutex<Vec<DriverOp>>> {
        self.ops_log.clone()
    }
}

#[async_trait]
impl Connection for LoggingConnection {
    fn capability(&self) -> &Capability {
        self.inner.capability()
    }

    async fn exec(&mut self, schema: &Arc<Schema>, operation: Operation) -> Result<Response> {
        let logged = operation.clone();
        let response = self.inner.exec(schema, operation).await?;

        self.ops_log.lock().push(DriverOp {
            operation: logged,
            response: response.clone(),
        });

        Ok(response)
    }
}
