mod adhoc;
mod driver_operation_failed;
mod entity_type_mismatch;
mod invalid_mapping;
mod invalid_result;
mod mandatory_relation;
mod record_not_found;
mod type_conversion;
mod unsupported_feature;

use adhoc::AdhocError;
use driver_operation_failed::DriverOperationFailed;
use entity_type_mismatch::EntityTypeMismatch;
use invalid_mapping::InvalidMapping;
use invalid_result::InvalidResultError;
use mandatory_relation::MandatoryRelation;
use record_not_found::RecordNotFoundError;
use std::sync::Arc;
use type_conversion::TypeConversionError;
use unsupported_feature::UnsupportedFeature;

/// Returns early with an ad-hoc [`Error`] built from a format string.
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::Error::from_args(format_args!($($arg)*)))
    };
}

/// Builds an ad-hoc [`Error`] from a format string.
#[macro_export]
macro_rules! err {
    ($($arg:tt)*) => {
        $crate::Error::from_args(format_args!($($arg)*))
    };
}

/// An error that can occur while building persisters or executing an
/// operation against a store.
///
/// Errors fall into three families:
///
/// * configuration errors ([`Error::is_configuration`]) are raised while
///   building persisters and leave nothing half-built behind;
/// * mapping errors ([`Error::is_mapping`]) are raised while converting
///   between entities and rows;
/// * store errors ([`Error::is_store`]) are propagated from the driver.
#[derive(Clone)]
pub struct Error {
    inner: Option<Arc<ErrorInner>>,
}

#[derive(Debug)]
struct ErrorInner {
    kind: ErrorKind,
    cause: Option<Error>,
}

impl Error {
    /// Adds context to this error.
    ///
    /// Context is displayed in reverse order: the most recently added context is shown first,
    /// followed by earlier context, ending with the root cause.
    #[inline(always)]
    pub fn context(self, consequent: impl IntoError) -> Error {
        self.context_impl(consequent.into_error())
    }

    #[inline(never)]
    #[cold]
    fn context_impl(self, consequent: Error) -> Error {
        let kind = match consequent.inner {
            Some(inner) => match Arc::try_unwrap(inner) {
                Ok(inner) => {
                    debug_assert!(
                        inner.cause.is_none(),
                        "consequent error must not already have a cause"
                    );
                    inner.kind
                }
                // A shared consequent cannot be reparented; keep its message only.
                Err(shared) => ErrorKind::Adhoc(AdhocError::new(shared.kind.to_string())),
            },
            None => ErrorKind::Unknown,
        };

        Error {
            inner: Some(Arc::new(ErrorInner {
                kind,
                cause: Some(self),
            })),
        }
    }

    /// Returns the innermost error of the context chain.
    pub fn root(&self) -> &Error {
        let mut err = self;
        while let Some(cause) = err.inner.as_ref().and_then(|inner| inner.cause.as_ref()) {
            err = cause;
        }
        err
    }

    fn chain(&self) -> impl Iterator<Item = &Error> {
        let mut err = self;
        core::iter::once(err).chain(core::iter::from_fn(move || {
            err = err.inner.as_ref().and_then(|inner| inner.cause.as_ref())?;
            Some(err)
        }))
    }

    fn kind(&self) -> &ErrorKind {
        self.inner
            .as_ref()
            .map(|inner| &inner.kind)
            .unwrap_or(&ErrorKind::Unknown)
    }

    fn any_kind(&self, f: impl Fn(&ErrorKind) -> bool) -> bool {
        self.chain().any(|err| f(err.kind()))
    }

    /// Returns `true` if this error was raised while building persisters.
    pub fn is_configuration(&self) -> bool {
        self.any_kind(|kind| {
            matches!(
                kind,
                ErrorKind::InvalidMapping(_) | ErrorKind::UnsupportedFeature(_)
            )
        })
    }

    /// Returns `true` if this error was raised while converting between
    /// entities and rows.
    pub fn is_mapping(&self) -> bool {
        self.any_kind(|kind| {
            matches!(
                kind,
                ErrorKind::MandatoryRelation(_)
                    | ErrorKind::TypeConversion(_)
                    | ErrorKind::EntityTypeMismatch(_)
            )
        })
    }

    /// Returns `true` if this error was propagated from the store.
    pub fn is_store(&self) -> bool {
        self.any_kind(|kind| {
            matches!(
                kind,
                ErrorKind::DriverOperationFailed(_)
                    | ErrorKind::RecordNotFound(_)
                    | ErrorKind::InvalidResult(_)
            )
        })
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self.kind() {
            ErrorKind::DriverOperationFailed(err) => Some(err),
            ErrorKind::Anyhow(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        let mut it = self.chain().peekable();
        while let Some(err) = it.next() {
            core::fmt::Display::fmt(err.kind(), f)?;
            if it.peek().is_some() {
                f.write_str(": ")?;
            }
        }
        Ok(())
    }
}

impl core::fmt::Debug for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        if !f.alternate() {
            core::fmt::Display::fmt(self, f)
        } else {
            let Some(ref inner) = self.inner else {
                return f.debug_struct("Error").field("kind", &"None").finish();
            };
            f.debug_struct("Error")
                .field("kind", &inner.kind)
                .field("cause", &inner.cause)
                .finish()
        }
    }
}

#[derive(Debug)]
enum ErrorKind {
    Anyhow(anyhow::Error),
    Adhoc(AdhocError),
    InvalidMapping(InvalidMapping),
    UnsupportedFeature(UnsupportedFeature),
    MandatoryRelation(MandatoryRelation),
    TypeConversion(TypeConversionError),
    EntityTypeMismatch(EntityTypeMismatch),
    DriverOperationFailed(DriverOperationFailed),
    RecordNotFound(RecordNotFoundError),
    InvalidResult(InvalidResultError),
    Unknown,
}

impl core::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        use self::ErrorKind::*;

        match self {
            Anyhow(err) => core::fmt::Display::fmt(err, f),
            Adhoc(err) => core::fmt::Display::fmt(err, f),
            InvalidMapping(err) => core::fmt::Display::fmt(err, f),
            UnsupportedFeature(err) => core::fmt::Display::fmt(err, f),
            MandatoryRelation(err) => core::fmt::Display::fmt(err, f),
            TypeConversion(err) => core::fmt::Display::fmt(err, f),
            EntityTypeMismatch(err) => core::fmt::Display::fmt(err, f),
            DriverOperationFailed(err) => core::fmt::Display::fmt(err, f),
            RecordNotFound(err) => core::fmt::Display::fmt(err, f),
            InvalidResult(err) => core::fmt::Display::fmt(err, f),
            Unknown => f.write_str("unknown trestle error"),
        }
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Error {
        Error {
            inner: Some(Arc::new(ErrorInner { kind, cause: None })),
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Error {
        Error::from(ErrorKind::Anyhow(err))
    }
}

impl From<uuid::Error> for Error {
    fn from(err: uuid::Error) -> Error {
        Error::from(anyhow::Error::from(err))
    }
}

/// Trait for types that can be converted into an Error.
pub trait IntoError {
    /// Converts this type into an Error.
    fn into_error(self) -> Error;
}

impl IntoError for Error {
    #[inline(always)]
    fn into_error(self) -> Error {
        self
    }
}
