use trestle_core::stmt::Value;

/// A write the store refused.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstraintViolation {
    /// A row with the same primary key exists.
    DuplicateKey { table: String, key: Vec<Value> },

    /// A non-nullable column was left null.
    NotNull { table: String, column: String },

    /// A value does not fit its column type.
    TypeMismatch {
        table: String,
        column: String,
        value: Value,
    },

    /// A foreign key references a missing row.
    MissingReference { table: String, foreign_key: String },

    /// A deleted row is still referenced.
    StillReferenced { table: String, foreign_key: String },

    /// The operation names a table or column the schema does not have.
    UnknownColumn { table: String, index: usize },
}

impl std::error::Error for ConstraintViolation {}

impl core::fmt::Display for ConstraintViolation {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            ConstraintViolation::DuplicateKey { table, key } => {
                write!(f, "duplicate primary key {key:?} in `{table}`")
            }
            ConstraintViolation::NotNull { table, column } => {
                write!(f, "`{table}.{column}` cannot be null")
            }
            ConstraintViolation::TypeMismatch {
                table,
                column,
                value,
            } => write!(f, "`{table}.{column}` cannot store {value:?}"),
            ConstraintViolation::MissingReference { table, foreign_key } => write!(
                f,
                "foreign key `{foreign_key}` of `{table}` references a missing row"
            ),
            ConstraintViolation::StillReferenced { table, foreign_key } => write!(
                f,
                "row of `{table}` is still referenced through `{foreign_key}`"
            ),
            ConstraintViolation::UnknownColumn { table, index } => {
                write!(f, "`{table}` has no column {index}")
            }
        }
    }
}
