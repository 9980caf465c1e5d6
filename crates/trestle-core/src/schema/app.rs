mod cascade;
pub use cascade::CascadeMode;

mod embedded;
pub use embedded::EmbeddedBuilder;

mod entity;
pub use entity::{shared, EntityRef, Factory, Shared};

mod identifier;
pub use identifier::{Identifier, IdentifierPolicy};

mod mapping;
pub use mapping::{EntityMapping, MappingBuilder};

mod polymorphism;
pub use polymorphism::{
    Polymorphism, PolymorphismBuilder, PolymorphismKind, SubType, SubTypeBuilder,
};

mod property;
pub use property::{Getter, Property, Setter};

mod provider;
pub use provider::{MappingProvider, MappingRef};

mod relation;
pub use relation::{
    AssociationTableHint, ManyGetter, ManySetter, OneGetter, OneSetter, OwnershipHint, Relation,
    RelationAccessor, RelationConfig, RelationKind, ReverseAccessor,
};
