use super::EntityMapping;
use crate::{Error, Result};

use std::sync::{Arc, OnceLock};

/// The target of a relation: a mapping, or a provider filled in later so
/// descriptors can refer to each other before all of them exist.
#[derive(Clone)]
pub enum MappingRef {
    Resolved(Arc<EntityMapping>),
    Deferred(MappingProvider),
}

/// A slot for a mapping that does not exist yet.
///
/// Clones share the slot. It must be filled exactly once, before persisters
/// are built.
#[derive(Clone, Default)]
pub struct MappingProvider {
    cell: Arc<OnceLock<Arc<EntityMapping>>>,
}

impl MappingRef {
    pub fn resolve(&self) -> Result<Arc<EntityMapping>> {
        match self {
            MappingRef::Resolved(mapping) => Ok(mapping.clone()),
            MappingRef::Deferred(provider) => provider.get().cloned().ok_or_else(|| {
                Error::invalid_mapping("relation target provider was never filled")
            }),
        }
    }
}

impl MappingProvider {
    pub fn new() -> MappingProvider {
        MappingProvider::default()
    }

    pub fn fill(&self, mapping: Arc<EntityMapping>) -> Result<()> {
        let name = mapping.name.to_string();
        self.cell.set(mapping).map_err(|_| {
            Error::invalid_mapping(format!(
                "mapping provider already filled; cannot fill it again with `{name}`"
            ))
        })
    }

    pub fn get(&self) -> Option<&Arc<EntityMapping>> {
        self.cell.get()
    }
}

impl From<Arc<EntityMapping>> for MappingRef {
    fn from(mapping: Arc<EntityMapping>) -> MappingRef {
        MappingRef::Resolved(mapping)
    }
}

impl From<&Arc<EntityMapping>> for MappingRef {
    fn from(mapping: &Arc<EntityMapping>) -> MappingRef {
        MappingRef::Resolved(mapping.clone())
    }
}

impl From<MappingProvider> for MappingRef {
    fn from(provider: MappingProvider) -> MappingRef {
        MappingRef::Deferred(provider)
    }
}

impl From<&MappingProvider> for MappingRef {
    fn from(provider: &MappingProvider) -> MappingRef {
        MappingRef::Deferred(provider.clone())
    }
}
