use super::Value;

/// The storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Bool,
    I32,
    I64,
    String,
    Uuid,
}

impl Type {
    /// Returns `true` if `value` can be stored in a column of this type.
    ///
    /// Null is accepted by every type; nullability is a property of the
    /// column, not the type.
    pub fn accepts(&self, value: &Value) -> bool {
        match value.infer_ty() {
            None => true,
            Some(Type::I32) => matches!(self, Type::I32 | Type::I64),
            Some(ty) => ty == *self,
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Type::I32 | Type::I64)
    }
}
