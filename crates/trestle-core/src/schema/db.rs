mod column;
pub use column::{Column, ColumnId};

mod fk;
pub use fk::ForeignKey;

mod pk;
pub use pk::PrimaryKey;

mod schema;
pub use schema::Schema;

mod table;
pub use table::{Table, TableId};
