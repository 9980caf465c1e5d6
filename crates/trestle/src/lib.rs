mod builder;
pub use builder::Builder;

mod engine;

mod join_tree;
pub use join_tree::JoinTree;

pub mod listener;
pub use listener::Listener;

pub mod persister;
pub use persister::{EntityPersister, Persister, PersisterId, Persisters};

pub use trestle_core::{
    driver::{self, Connection},
    schema::{
        self,
        app::{
            shared, CascadeMode, EmbeddedBuilder, EntityMapping, EntityRef, MappingBuilder,
            MappingProvider, PolymorphismBuilder, RelationConfig, Shared, SubTypeBuilder,
        },
    },
    stmt, Error, Result,
};
pub use trestle_core::{bail, err};
