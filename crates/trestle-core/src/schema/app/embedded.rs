use super::Property;
use crate::{
    stmt::{Primitive, Type, Value},
    Result,
};

use std::sync::Arc;

/// Scalar fields of a value type stored in its owner's row.
///
/// Columns are named `{group}_{column}` once embedded.
pub struct EmbeddedBuilder<E> {
    fields: Vec<EmbeddedField<E>>,
}

struct EmbeddedField<E> {
    name: String,
    column: String,
    ty: Type,
    nullable: bool,
    get: Arc<dyn Fn(&E) -> Value + Send + Sync>,
    set: Arc<dyn Fn(&mut E, Value) -> Result<()> + Send + Sync>,
}

impl<E: 'static> EmbeddedBuilder<E> {
    pub fn new() -> EmbeddedBuilder<E> {
        EmbeddedBuilder { fields: vec![] }
    }

    pub fn property<P: Primitive>(
        self,
        name: &str,
        get: impl Fn(&E) -> P + Send + Sync + 'static,
        set: impl Fn(&mut E, P) + Send + Sync + 'static,
    ) -> Self {
        self.property_with_column(name, name, get, set)
    }

    pub fn property_with_column<P: Primitive>(
        mut self,
        name: &str,
        column: &str,
        get: impl Fn(&E) -> P + Send + Sync + 'static,
        set: impl Fn(&mut E, P) + Send + Sync + 'static,
    ) -> Self {
        self.fields.push(EmbeddedField {
            name: name.to_string(),
            column: column.to_string(),
            ty: P::TYPE,
            nullable: P::NULLABLE,
            get: Arc::new(move |e: &E| get(e).into_value()),
            set: Arc::new(move |e: &mut E, value: Value| {
                set(e, P::load(value)?);
                Ok(())
            }),
        });
        self
    }

    /// Flattens the fields into properties of the owner `T`.
    pub(super) fn into_properties<T: 'static>(
        self,
        group: &str,
        get: Arc<dyn Fn(&T) -> &E + Send + Sync>,
        get_mut: Arc<dyn Fn(&mut T) -> &mut E + Send + Sync>,
    ) -> Vec<Property> {
        self.fields
            .into_iter()
            .map(|field| {
                let read = field.get;
                let write = field.set;
                let get = get.clone();
                let get_mut = get_mut.clone();

                Property {
                    name: format!("{group}.{}", field.name),
                    column: format!("{group}_{}", field.column),
                    ty: field.ty,
                    nullable: field.nullable,
                    get: Arc::new(move |entity| entity.read(|owner: &T| read(get(owner)))),
                    set: Arc::new(move |entity, value| {
                        entity.write(|owner: &mut T| write(get_mut(owner), value))?
                    }),
                }
            })
            .collect()
    }
}

impl<E: 'static> Default for EmbeddedBuilder<E> {
    fn default() -> Self {
        EmbeddedBuilder::new()
    }
}
