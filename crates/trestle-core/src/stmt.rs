mod filter;
pub use filter::{Condition, Filter};

mod num;

mod primitive;
pub use primitive::Primitive;

mod select;
pub use select::{Join, JoinKind, Projected, ProjectionExpr, Select};

mod ty;
pub use ty::Type;

mod value;
pub use value::Value;

mod value_record;
pub use value_record::ValueRecord;
