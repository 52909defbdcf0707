mod alias;
mod creation;
mod definition;
mod instantiate;
mod resolve;

pub use alias::AliasErrorKind;
pub use creation::CreationError;
pub use definition::DefinitionErrorKind;
pub use instantiate::InstantiateErrorKind;
pub use resolve::ResolveErrorKind;

pub(crate) use creation::SUPPRESSED_EXCEPTIONS_LIMIT;
