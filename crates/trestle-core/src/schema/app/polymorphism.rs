use super::{property::Property, EntityRef, Factory, Shared};
use crate::{stmt::Primitive, Result};

use parking_lot::RwLock;
use std::{fmt, marker::PhantomData, sync::Arc};

/// How the concrete sub-types of an entity are laid out in tables.
#[derive(Clone)]
pub struct Polymorphism {
    pub kind: PolymorphismKind,
    pub sub_types: Vec<SubType>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolymorphismKind {
    /// Every sub-type shares the parent table; `discriminator` tells them
    /// apart.
    SingleTable { discriminator: String },

    /// Each sub-type has its own table joined to the parent table by
    /// identifier. Without a discriminator the sub-type is found by probing
    /// which sub table has a row.
    JoinedTables { discriminator: Option<String> },

    /// Each sub-type has a complete table of its own; there is no parent
    /// table.
    TablePerClass,
}

#[derive(Clone)]
pub struct SubType {
    /// Discriminator value; also the default table name suffix.
    pub discriminator: String,

    pub table_name: Option<String>,

    pub properties: Vec<Property>,

    pub is_instance: Arc<dyn Fn(&EntityRef) -> Result<bool> + Send + Sync>,

    pub factory: Factory,
}

pub struct PolymorphismBuilder<T> {
    pub(super) kind: PolymorphismKind,
    pub(super) sub_types: Vec<SubType>,
    _p: PhantomData<fn() -> T>,
}

pub struct SubTypeBuilder<T> {
    sub_type: SubType,
    _p: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> PolymorphismBuilder<T> {
    fn new(kind: PolymorphismKind) -> Self {
        PolymorphismBuilder {
            kind,
            sub_types: vec![],
            _p: PhantomData,
        }
    }

    pub fn single_table(discriminator: &str) -> Self {
        Self::new(PolymorphismKind::SingleTable {
            discriminator: discriminator.to_string(),
        })
    }

    pub fn joined_tables() -> Self {
        Self::new(PolymorphismKind::JoinedTables {
            discriminator: None,
        })
    }

    pub fn joined_tables_with_discriminator(discriminator: &str) -> Self {
        Self::new(PolymorphismKind::JoinedTables {
            discriminator: Some(discriminator.to_string()),
        })
    }

    pub fn table_per_class() -> Self {
        Self::new(PolymorphismKind::TablePerClass)
    }

    pub fn sub_type(mut self, sub_type: SubTypeBuilder<T>) -> Self {
        self.sub_types.push(sub_type.sub_type);
        self
    }

    pub(super) fn build(self) -> Polymorphism {
        Polymorphism {
            kind: self.kind,
            sub_types: self.sub_types,
        }
    }
}

impl<T: Send + Sync + 'static> SubTypeBuilder<T> {
    /// `is_instance` selects the entities of this sub-type; `factory`
    /// creates an empty one when loading.
    pub fn new(
        discriminator: &str,
        is_instance: impl Fn(&T) -> bool + Send + Sync + 'static,
        factory: impl Fn() -> T + Send + Sync + 'static,
    ) -> Self {
        SubTypeBuilder {
            sub_type: SubType {
                discriminator: discriminator.to_string(),
                table_name: None,
                properties: vec![],
                is_instance: Arc::new(move |entity: &EntityRef| entity.read(&is_instance)),
                factory: Arc::new(move || {
                    let entity: Shared<T> = Arc::new(RwLock::new(factory()));
                    EntityRef::new(entity)
                }),
            },
            _p: PhantomData,
        }
    }

    pub fn table(mut self, name: &str) -> Self {
        self.sub_type.table_name = Some(name.to_string());
        self
    }

    pub fn property<P: Primitive>(
        self,
        name: &str,
        get: impl Fn(&T) -> P + Send + Sync + 'static,
        set: impl Fn(&mut T, P) + Send + Sync + 'static,
    ) -> Self {
        self.property_with_column(name, name, get, set)
    }

    pub fn property_with_column<P: Primitive>(
        mut self,
        name: &str,
        column: &str,
        get: impl Fn(&T) -> P + Send + Sync + 'static,
        set: impl Fn(&mut T, P) + Send + Sync + 'static,
    ) -> Self {
        self.sub_type
            .properties
            .push(Property::new(name, column, get, set));
        self
    }
}

impl Polymorphism {
    /// Finds the sub-type of `entity`.
    pub fn sub_type_of(&self, entity: &EntityRef) -> Result<Option<usize>> {
        for (index, sub_type) in self.sub_types.iter().enumerate() {
            if (sub_type.is_instance)(entity)? {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }
}

impl fmt::Debug for Polymorphism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Polymorphism")
            .field("kind", &self.kind)
            .field("sub_types", &self.sub_types)
            .finish()
    }
}

impl fmt::Debug for SubType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubType")
            .field("discriminator", &self.discriminator)
            .field("table_name", &self.table_name)
            .field("properties", &self.properties)
            .finish_non_exhaustive()
    }
}
