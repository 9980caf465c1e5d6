use super::Error;

/// Error when a mapping descriptor cannot be turned into persisters.
///
/// This occurs when:
/// - An entity declares more than one identifier, or none
/// - A property or column is mapped more than once
/// - Relation ownership is contradictory or cannot be decided
/// - Two unrelated descriptors claim the same table
/// - A column or foreign key is redefined incompatibly
#[derive(Debug)]
pub(super) struct InvalidMapping {
    message: Box<str>,
}

impl std::error::Error for InvalidMapping {}

impl core::fmt::Display for InvalidMapping {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "invalid mapping: {}", self.message)
    }
}

impl Error {
    /// Creates an invalid mapping error.
    pub fn invalid_mapping(message: impl Into<String>) -> Error {
        Error::from(super::ErrorKind::InvalidMapping(InvalidMapping {
            message: message.into().into(),
        }))
    }

    /// Returns `true` if this error is an invalid mapping error.
    pub fn is_invalid_mapping(&self) -> bool {
        matches!(self.kind(), super::ErrorKind::InvalidMapping(_))
    }
}
