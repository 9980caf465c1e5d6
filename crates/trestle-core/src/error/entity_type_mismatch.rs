use super::Error;

/// Error when an erased entity handle does not hold the expected type.
#[derive(Debug)]
pub(super) struct EntityTypeMismatch {
    expected: &'static str,
    found: &'static str,
}

impl std::error::Error for EntityTypeMismatch {}

impl core::fmt::Display for EntityTypeMismatch {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(
            f,
            "entity type mismatch: expected {}, found {}",
            self.expected, self.found
        )
    }
}

impl Error {
    /// Creates an entity type mismatch error.
    pub fn entity_type_mismatch(expected: &'static str, found: &'static str) -> Error {
        Error::from(super::ErrorKind::EntityTypeMismatch(EntityTypeMismatch {
            expected,
            found,
        }))
    }

    /// Returns `true` if this error is an entity type mismatch error.
    pub fn is_entity_type_mismatch(&self) -> bool {
        matches!(self.kind(), super::ErrorKind::EntityTypeMismatch(_))
    }
}
