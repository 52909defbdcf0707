use std::any::TypeId;

use super::{creation::CreationError, definition::DefinitionErrorKind, instantiate::InstantiateErrorKind};
use crate::any::TypeInfo;

#[derive(thiserror::Error, Debug)]
pub enum ResolveErrorKind {
    #[error("No bean named `{name}` available")]
    NoSuchBean { name: String },
    #[error(
        "Expected a single bean of type `{type_name}`, found {}: {candidates:?}",
        candidates.len()
    )]
    NoUniqueBean {
        type_name: &'static str,
        candidates: Vec<String>,
    },
    #[error(
        "Bean named `{name}` is expected to be of type `{}` but the actual instance is of another type ({actual:?})",
        expected.name
    )]
    NotOfRequiredType {
        name: String,
        expected: TypeInfo,
        actual: TypeId,
    },
    #[error("Requested bean `{name}` is currently in creation: is there an unresolvable circular reference?")]
    CurrentlyInCreation { name: String },
    #[error(
        "Singleton bean `{name}` creation not allowed while the singletons of this factory are in destruction \
         (do not request a bean from a factory inside a teardown callback)"
    )]
    CreationNotAllowed { name: String },
    #[error(transparent)]
    Creation(Box<CreationError>),
    #[error(transparent)]
    Definition(#[from] DefinitionErrorKind),
    #[error(transparent)]
    Instantiate(#[from] InstantiateErrorKind),
    #[error("Illegal state: {message}")]
    IllegalState { message: String },
}

impl From<CreationError> for ResolveErrorKind {
    fn from(err: CreationError) -> Self {
        Self::Creation(Box::new(err))
    }
}

impl ResolveErrorKind {
    #[inline]
    #[must_use]
    pub(crate) fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState { message: message.into() }
    }

    /// Walks the cause chain looking for an unresolvable-cycle failure.
    ///
    /// Creation-path errors are wrapped per bean, so the circularity signal
    /// of a nested lookup surfaces several levels deep.
    #[must_use]
    pub fn is_circular(&self) -> bool {
        match self {
            Self::CurrentlyInCreation { .. } => true,
            Self::Creation(creation) => creation.cause.as_deref().is_some_and(Self::is_circular),
            Self::Instantiate(InstantiateErrorKind::Resolve(inner)) => inner.is_circular(),
            _ => false,
        }
    }
}
