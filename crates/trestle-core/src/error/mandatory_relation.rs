use super::Error;

/// Error when a relation declared mandatory has no target at write time.
#[derive(Debug)]
pub(super) struct MandatoryRelation {
    entity: Box<str>,
    relation: Box<str>,
}

impl std::error::Error for MandatoryRelation {}

impl core::fmt::Display for MandatoryRelation {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(
            f,
            "mandatory relation `{}.{}` is not set",
            self.entity, self.relation
        )
    }
}

impl Error {
    /// Creates a mandatory relation error.
    pub fn mandatory_relation(entity: &str, relation: &str) -> Error {
        Error::from(super::ErrorKind::MandatoryRelation(MandatoryRelation {
            entity: entity.into(),
            relation: relation.into(),
        }))
    }

    /// Returns `true` if this error is a mandatory relation error.
    pub fn is_mandatory_relation(&self) -> bool {
        matches!(self.kind(), super::ErrorKind::MandatoryRelation(_))
    }
}
