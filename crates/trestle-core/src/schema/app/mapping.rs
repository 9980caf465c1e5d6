use super::{
    property::{getter, setter},
    relation::RelationAccessor,
    EmbeddedBuilder, EntityRef, Factory, Identifier, IdentifierPolicy, MappingRef, Polymorphism,
    PolymorphismBuilder, PolymorphismKind, Property, Relation, RelationConfig, RelationKind,
    Shared,
};
use crate::{
    schema::Name,
    stmt::Primitive,
    Error, Result,
};

use parking_lot::RwLock;
use std::{
    any::{type_name, TypeId},
    collections::HashSet,
    fmt,
    marker::PhantomData,
    sync::Arc,
};

/// Describes how an entity type maps onto tables: its identifier, scalar
/// properties, relations and optional polymorphism.
///
/// Descriptors are immutable once built and are compared by identity when
/// persisters are built, so the same `Arc` always yields the same persister.
pub struct EntityMapping {
    pub name: Name,

    pub entity_type: TypeId,

    pub type_name: &'static str,

    /// Explicit table name. Defaults to the snake-cased entity name.
    pub table_name: Option<String>,

    pub identifier: Identifier,

    /// Scalar properties, embedded ones flattened, in declaration order.
    pub properties: Vec<Property>,

    pub relations: Vec<Relation>,

    pub polymorphism: Option<Polymorphism>,

    pub factory: Factory,
}

/// Typed builder for an [`EntityMapping`] of `T`.
///
/// Mistakes are collected and reported by [`MappingBuilder::build`].
pub struct MappingBuilder<T> {
    name: Name,
    table_name: Option<String>,
    identifier: Option<Identifier>,
    properties: Vec<Property>,
    relations: Vec<Relation>,
    polymorphism: Option<Polymorphism>,
    factory: Factory,
    errors: Vec<String>,
    _p: PhantomData<fn() -> T>,
}

impl EntityMapping {
    pub fn builder<T: Send + Sync + 'static>(
        name: &str,
        factory: impl Fn() -> T + Send + Sync + 'static,
    ) -> MappingBuilder<T> {
        MappingBuilder::new(name, factory)
    }

    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations.iter().find(|relation| relation.name == name)
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|property| property.name == name)
    }

    /// Creates an empty instance.
    pub fn instantiate(&self) -> EntityRef {
        (self.factory)()
    }

    pub fn is_polymorphic(&self) -> bool {
        self.polymorphism.is_some()
    }
}

impl<T: Send + Sync + 'static> MappingBuilder<T> {
    pub fn new(name: &str, factory: impl Fn() -> T + Send + Sync + 'static) -> Self {
        MappingBuilder {
            name: Name::new(name),
            table_name: None,
            identifier: None,
            properties: vec![],
            relations: vec![],
            polymorphism: None,
            factory: Arc::new(move || {
                let entity: Shared<T> = Arc::new(RwLock::new(factory()));
                EntityRef::new(entity)
            }),
            errors: vec![],
            _p: PhantomData,
        }
    }

    pub fn table(mut self, name: &str) -> Self {
        self.table_name = Some(name.to_string());
        self
    }

    /// Identifier assigned by the store on insert. `P` must be an `Option`
    /// so an unsaved entity can be told apart.
    pub fn auto_increment_id<P: Primitive>(
        self,
        column: &str,
        get: impl Fn(&T) -> P + Send + Sync + 'static,
        set: impl Fn(&mut T, P) + Send + Sync + 'static,
    ) -> Self {
        if !P::NULLABLE || !P::TYPE.is_integer() {
            let message = format!(
                "auto-increment identifier `{}.{column}` must be an optional integer",
                self.name
            );
            return self.error(message);
        }
        self.identifier(column, get, set, IdentifierPolicy::AutoIncrement)
    }

    /// Identifier produced by `generate` right before insert. `P` must be an
    /// `Option` so an unsaved entity can be told apart.
    pub fn generated_id<P: Primitive, G: Primitive>(
        self,
        column: &str,
        get: impl Fn(&T) -> P + Send + Sync + 'static,
        set: impl Fn(&mut T, P) + Send + Sync + 'static,
        generate: impl Fn() -> G + Send + Sync + 'static,
    ) -> Self {
        if !P::NULLABLE {
            let message = format!(
                "generated identifier `{}.{column}` must be optional",
                self.name
            );
            return self.error(message);
        }
        let generate = Arc::new(move || generate().into_value());
        self.identifier(column, get, set, IdentifierPolicy::Generated(generate))
    }

    /// Identifier assigned by the application. Persisted state is tracked
    /// by the entity itself through `is_persisted` and `mark_persisted`.
    pub fn assigned_id<P: Primitive>(
        self,
        column: &str,
        get: impl Fn(&T) -> P + Send + Sync + 'static,
        set: impl Fn(&mut T, P) + Send + Sync + 'static,
        is_persisted: impl Fn(&T) -> bool + Send + Sync + 'static,
        mark_persisted: impl Fn(&mut T, bool) + Send + Sync + 'static,
    ) -> Self {
        let policy = IdentifierPolicy::AlreadyAssigned {
            is_persisted: Arc::new(move |entity: &EntityRef| entity.read(&is_persisted)),
            mark_persisted: Arc::new(move |entity: &EntityRef, persisted: bool| {
                entity.write(|e: &mut T| mark_persisted(e, persisted))
            }),
        };
        self.identifier(column, get, set, policy)
    }

    fn identifier<P: Primitive>(
        mut self,
        column: &str,
        get: impl Fn(&T) -> P + Send + Sync + 'static,
        set: impl Fn(&mut T, P) + Send + Sync + 'static,
        policy: IdentifierPolicy,
    ) -> Self {
        if self.identifier.is_some() {
            let message = format!(
                "`{}` declares more than one identifier",
                self.name
            );
            return self.error(message);
        }

        self.identifier = Some(Identifier {
            name: column.to_string(),
            column: column.to_string(),
            ty: P::TYPE,
            get: getter(get),
            set: setter(set),
            policy,
        });
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
        self.properties.push(Property::new(name, column, get, set));
        self
    }

    /// Stores the fields of an embedded value in the owner's table.
    pub fn embed<E: 'static>(
        mut self,
        group: &str,
        get: impl Fn(&T) -> &E + Send + Sync + 'static,
        get_mut: impl Fn(&mut T) -> &mut E + Send + Sync + 'static,
        embedded: EmbeddedBuilder<E>,
    ) -> Self {
        let properties = embedded.into_properties(group, Arc::new(get), Arc::new(get_mut));
        self.properties.extend(properties);
        self
    }

    pub fn one_to_one<U: Send + Sync + 'static>(
        self,
        name: &str,
        target: impl Into<MappingRef>,
        get: impl Fn(&T) -> Option<Shared<U>> + Send + Sync + 'static,
        set: impl Fn(&mut T, Option<Shared<U>>) + Send + Sync + 'static,
        config: RelationConfig<T, U>,
    ) -> Self {
        let accessor = RelationAccessor::one(get, set);
        self.relation(name, RelationKind::OneToOne, target.into(), accessor, config)
    }

    pub fn one_to_many<U: Send + Sync + 'static>(
        self,
        name: &str,
        target: impl Into<MappingRef>,
        get: impl Fn(&T) -> Vec<Shared<U>> + Send + Sync + 'static,
        set: impl Fn(&mut T, Vec<Shared<U>>) + Send + Sync + 'static,
        config: RelationConfig<T, U>,
    ) -> Self {
        let accessor = RelationAccessor::many(get, set);
        self.relation(name, RelationKind::OneToMany, target.into(), accessor, config)
    }

    pub fn many_to_many<U: Send + Sync + 'static>(
        self,
        name: &str,
        target: impl Into<MappingRef>,
        get: impl Fn(&T) -> Vec<Shared<U>> + Send + Sync + 'static,
        set: impl Fn(&mut T, Vec<Shared<U>>) + Send + Sync + 'static,
        config: RelationConfig<T, U>,
    ) -> Self {
        let accessor = RelationAccessor::many(get, set);
        self.relation(name, RelationKind::ManyToMany, target.into(), accessor, config)
    }

    fn relation<U: 'static>(
        mut self,
        name: &str,
        kind: RelationKind,
        target: MappingRef,
        accessor: RelationAccessor,
        config: RelationConfig<T, U>,
    ) -> Self {
        if config.index_column.is_some() && !kind.is_collection() {
            let message = format!(
                "index column on `{}.{name}` requires a collection",
                self.name
            );
            return self.error(message);
        }

        self.relations.push(Relation {
            name: name.to_string(),
            kind,
            target,
            target_type: TypeId::of::<U>(),
            target_type_name: type_name::<U>(),
            accessor,
            cascade: config.cascade,
            ownership: config.ownership,
            pair: config.pair,
            index_column: config.index_column,
            fetch_separately: config.fetch_separately,
            mandatory: config.mandatory,
        });
        self
    }

    pub fn polymorphism(mut self, polymorphism: PolymorphismBuilder<T>) -> Self {
        if self.polymorphism.is_some() {
            let message = format!(
                "`{}` declares polymorphism more than once",
                self.name
            );
            return self.error(message);
        }
        self.polymorphism = Some(polymorphism.build());
        self
    }

    fn error(mut self, message: String) -> Self {
        self.errors.push(message);
        self
    }

    pub fn build(self) -> Result<Arc<EntityMapping>> {
        if let Some(message) = self.errors.into_iter().next() {
            return Err(Error::invalid_mapping(message));
        }

        let Some(identifier) = self.identifier else {
            return Err(Error::invalid_mapping(format!(
                "`{}` has no identifier",
                self.name
            )));
        };

        let mut names = HashSet::new();
        let mut columns = HashSet::new();
        names.insert(identifier.name.as_str());
        columns.insert(identifier.column.as_str());

        for property in &self.properties {
            if !names.insert(property.name.as_str()) {
                return Err(Error::invalid_mapping(format!(
                    "property `{}.{}` is mapped more than once",
                    self.name, property.name
                )));
            }
            if !columns.insert(property.column.as_str()) {
                return Err(Error::invalid_mapping(format!(
                    "column `{}` of `{}` is mapped more than once",
                    property.column, self.name
                )));
            }
        }

        for relation in &self.relations {
            if !names.insert(relation.name.as_str()) {
                return Err(Error::invalid_mapping(format!(
                    "`{}.{}` is mapped more than once",
                    self.name, relation.name
                )));
            }
        }

        if let Some(polymorphism) = &self.polymorphism {
            verify_polymorphism(&self.name, polymorphism, &names, &columns)?;
        }

        Ok(Arc::new(EntityMapping {
            name: self.name,
            entity_type: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            table_name: self.table_name,
            identifier,
            properties: self.properties,
            relations: self.relations,
            polymorphism: self.polymorphism,
            factory: self.factory,
        }))
    }
}

fn verify_polymorphism(
    name: &Name,
    polymorphism: &Polymorphism,
    names: &HashSet<&str>,
    columns: &HashSet<&str>,
) -> Result<()> {
    if polymorphism.sub_types.is_empty() {
        return Err(Error::invalid_mapping(format!(
            "polymorphic `{name}` declares no sub-types"
        )));
    }

    let discriminator = match &polymorphism.kind {
        PolymorphismKind::SingleTable { discriminator } => Some(discriminator.as_str()),
        PolymorphismKind::JoinedTables { discriminator } => discriminator.as_deref(),
        PolymorphismKind::TablePerClass => None,
    };

    if let Some(discriminator) = discriminator {
        if columns.contains(discriminator) {
            return Err(Error::invalid_mapping(format!(
                "discriminator column `{discriminator}` of `{name}` is also mapped as a property"
            )));
        }
    }

    let mut values = HashSet::new();
    for sub_type in &polymorphism.sub_types {
        if !values.insert(sub_type.discriminator.as_str()) {
            return Err(Error::invalid_mapping(format!(
                "sub-type `{}` of `{name}` is declared more than once",
                sub_type.discriminator
            )));
        }

        let mut sub_columns = HashSet::new();
        for property in &sub_type.properties {
            if names.contains(property.name.as_str())
                || columns.contains(property.column.as_str())
                || Some(property.column.as_str()) == discriminator
                || !sub_columns.insert(property.column.as_str())
            {
                return Err(Error::invalid_mapping(format!(
                    "property `{}` of sub-type `{}` of `{name}` is mapped more than once",
                    property.name, sub_type.discriminator
                )));
            }
        }
    }

    Ok(())
}

impl fmt::Debug for EntityMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityMapping")
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .field("table_name", &self.table_name)
            .field("identifier", &self.identifier)
            .field("properties", &self.properties)
            .field("relations", &self.relations)
            .field("polymorphism", &self.polymorphism)
            .finish_non_exhaustive()
    }
}

impl<T> fmt::Debug for MappingBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappingBuilder")
            .field("name", &self.name)
            .field("errors", &self.errors)
            .finish_non_exhaustive()
    }
}
