use std::error::Error;

use super::resolve::ResolveErrorKind;

/// Failure raised by user-supplied code: instantiators, populate stages,
/// init hooks, post-processors and factory-bean producers.
#[derive(thiserror::Error, Debug)]
pub enum InstantiateErrorKind {
    /// A dependency lookup performed inside the user code failed.
    #[error(transparent)]
    Resolve(Box<ResolveErrorKind>),
    #[error("{0}")]
    Custom(Box<dyn Error + Send + Sync>),
    #[error("{0}")]
    Message(String),
}

impl From<ResolveErrorKind> for InstantiateErrorKind {
    fn from(err: ResolveErrorKind) -> Self {
        Self::Resolve(Box::new(err))
    }
}

impl InstantiateErrorKind {
    #[inline]
    pub fn custom(err: impl Error + Send + Sync + 'static) -> Self {
        Self::Custom(Box::new(err))
    }

    #[inline]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}
