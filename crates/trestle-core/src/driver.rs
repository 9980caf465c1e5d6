mod capability;
pub use capability::Capability;

mod response;
pub use response::{Response, Rows};

pub mod operation;
pub use operation::Operation;

use crate::{async_trait, schema::db::Schema};

use std::{fmt::Debug, sync::Arc};

/// A connection to a store able to execute [`Operation`]s.
///
/// The engine never holds a connection across calls; every persister
/// operation borrows one for its duration.
#[async_trait]
pub trait Connection: Debug + Send {
    /// Describes what the store supports, which informs how writes are
    /// grouped.
    fn capability(&self) -> &Capability;

    /// Execute a store operation
    async fn exec(&mut self, schema: &Arc<Schema>, op: Operation) -> crate::Result<Response>;
}

#[async_trait]
impl<C: Connection + ?Sized> Connection for Box<C> {
    fn capability(&self) -> &Capability {
        (**self).capability()
    }

    async fn exec(&mut self, schema: &Arc<Schema>, op: Operation) -> crate::Result<Response> {
        (**self).exec(schema, op).await
    }
}
