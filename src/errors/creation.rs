use std::fmt::{self, Display, Formatter};

use super::resolve::ResolveErrorKind;

/// Error raised when the creation pipeline of a bean fails.
///
/// Carries the offending bean name, the phase that failed, the underlying
/// cause and every exception that was suppressed during the creation frame
/// (at most 100 entries).
#[derive(Debug)]
pub struct CreationError {
    pub bean_name: String,
    pub message: String,
    pub cause: Option<Box<ResolveErrorKind>>,
    pub suppressed: Vec<ResolveErrorKind>,
}

/// Upper bound of suppressed exceptions retained per creation frame.
/// Entries past the limit are dropped silently.
pub(crate) const SUPPRESSED_EXCEPTIONS_LIMIT: usize = 100;

impl CreationError {
    #[must_use]
    pub(crate) fn new(
        bean_name: impl Into<String>,
        message: impl Into<String>,
        cause: Option<ResolveErrorKind>,
    ) -> Self {
        Self {
            bean_name: bean_name.into(),
            message: message.into(),
            cause: cause.map(Box::new),
            suppressed: Vec::new(),
        }
    }
}

impl Display for CreationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Error creating bean `{}`: {}", self.bean_name, self.message)?;
        if let Some(cause) = &self.cause {
            write!(f, ": {cause}")?;
        }
        if !self.suppressed.is_empty() {
            write!(f, " ({} related cause(s) suppressed)", self.suppressed.len())?;
        }
        Ok(())
    }
}

impl std::error::Error for CreationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}
