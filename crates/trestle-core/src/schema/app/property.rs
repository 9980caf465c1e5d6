use super::EntityRef;
use crate::{
    stmt::{Primitive, Type, Value},
    Result,
};

use std::{fmt, sync::Arc};

/// Reads a column value out of an erased entity.
pub type Getter = Arc<dyn Fn(&EntityRef) -> Result<Value> + Send + Sync>;

/// Writes a column value into an erased entity.
pub type Setter = Arc<dyn Fn(&EntityRef, Value) -> Result<()> + Send + Sync>;

/// A scalar value of an entity stored in one column.
#[derive(Clone)]
pub struct Property {
    /// Accessor name, unique within the entity.
    pub name: String,

    /// Column name, unique within the entity.
    pub column: String,

    pub ty: Type,

    pub nullable: bool,

    pub get: Getter,

    pub set: Setter,
}

impl Property {
    pub fn new<T, P>(
        name: &str,
        column: &str,
        get: impl Fn(&T) -> P + Send + Sync + 'static,
        set: impl Fn(&mut T, P) + Send + Sync + 'static,
    ) -> Property
    where
        T: 'static,
        P: Primitive,
    {
        Property {
            name: name.to_string(),
            column: column.to_string(),
            ty: P::TYPE,
            nullable: P::NULLABLE,
            get: getter(get),
            set: setter(set),
        }
    }
}

pub(super) fn getter<T: 'static, P: Primitive>(
    get: impl Fn(&T) -> P + Send + Sync + 'static,
) -> Getter {
    Arc::new(move |entity: &EntityRef| entity.read(|e: &T| get(e).into_value()))
}

pub(super) fn setter<T: 'static, P: Primitive>(
    set: impl Fn(&mut T, P) + Send + Sync + 'static,
) -> Setter {
    Arc::new(move |entity: &EntityRef, value: Value| {
        let value = P::load(value)?;
        entity.write(|e: &mut T| set(e, value))
    })
}

impl fmt::Debug for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("name", &self.name)
            .field("column", &self.column)
            .field("ty", &self.ty)
            .field("nullable", &self.nullable)
            .finish_non_exhaustive()
    }
}
