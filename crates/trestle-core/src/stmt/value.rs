use super::Type;
use crate::{Error, Result};

#[derive(Debug, Default, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    /// Boolean value
    Bool(bool),

    /// Signed 32-bit integer
    I32(i32),

    /// Signed 64-bit integer
    I64(i64),

    /// Null value
    #[default]
    Null,

    /// String value
    String(String),

    /// A UUID value
    Uuid(uuid::Uuid),
}

impl Value {
    pub const fn null() -> Self {
        Self::Null
    }

    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the name of the variant, used in conversion errors.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "Bool",
            Self::I32(_) => "I32",
            Self::I64(_) => "I64",
            Self::Null => "Null",
            Self::String(_) => "String",
            Self::Uuid(_) => "Uuid",
        }
    }

    /// Infers the type of a non-null value.
    pub fn infer_ty(&self) -> Option<Type> {
        Some(match self {
            Self::Bool(_) => Type::Bool,
            Self::I32(_) => Type::I32,
            Self::I64(_) => Type::I64,
            Self::String(_) => Type::String,
            Self::Uuid(_) => Type::Uuid,
            Self::Null => return None,
        })
    }

    /// Interprets an integer value as a list position.
    pub fn to_position(&self) -> Option<i64> {
        match *self {
            Self::I32(v) => Some(v as i64),
            Self::I64(v) => Some(v),
            _ => None,
        }
    }

    pub fn to_bool(self) -> Result<bool> {
        match self {
            Self::Bool(v) => Ok(v),
            _ => Err(Error::type_conversion(self, "bool")),
        }
    }

    pub fn to_string_value(self) -> Result<String> {
        match self {
            Self::String(v) => Ok(v),
            _ => Err(Error::type_conversion(self, "String")),
        }
    }

    pub fn to_uuid(self) -> Result<uuid::Uuid> {
        match self {
            Self::Uuid(v) => Ok(v),
            Self::String(ref v) => Ok(uuid::Uuid::parse_str(v)?),
            _ => Err(Error::type_conversion(self, "Uuid")),
        }
    }
}

impl From<bool> for Value {
    fn from(src: bool) -> Self {
        Self::Bool(src)
    }
}

impl From<String> for Value {
    fn from(src: String) -> Self {
        Self::String(src)
    }
}

impl From<&String> for Value {
    fn from(src: &String) -> Self {
        Self::String(src.clone())
    }
}

impl From<&str> for Value {
    fn from(src: &str) -> Self {
        Self::String(src.to_string())
    }
}

impl From<uuid::Uuid> for Value {
    fn from(src: uuid::Uuid) -> Self {
        Self::Uuid(src)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(src: Option<T>) -> Self {
        match src {
            Some(value) => value.into(),
            None => Self::Null,
        }
    }
}
