use super::Value;
use crate::{Error, Result};

macro_rules! impl_num {
    (
        $(
            $variant:ident($ty:ty) {
                $to:ident
            } )*
    ) => {
        impl Value {
            $(
                pub fn $to(self) -> Result<$ty> {
                    self.try_into()
                }
            )*
        }

        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Self::$variant(value)
                }
            }

            impl From<&$ty> for Value {
                fn from(value: &$ty) -> Self {
                    Self::$variant(*value)
                }
            }
        )*
    };
}

impl_num! {
    I32(i32) {
        to_i32
    }
    I64(i64) {
        to_i64
    }
}

// Integers convert across widths when the value fits.
impl TryFrom<Value> for i32 {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::I32(v) => Ok(v),
            Value::I64(v) => v
                .try_into()
                .map_err(|_| Error::type_conversion(Value::I64(v), "i32")),
            _ => Err(Error::type_conversion(value, "i32")),
        }
    }
}

impl TryFrom<Value> for i64 {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::I32(v) => Ok(v as i64),
            Value::I64(v) => Ok(v),
            _ => Err(Error::type_conversion(value, "i64")),
        }
    }
}
