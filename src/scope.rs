use crate::{any::BeanHandle, errors::ResolveErrorKind};

/// Reserved scope identifier for singleton beans.
pub const SINGLETON_SCOPE: &str = "singleton";
/// Reserved scope identifier for prototype beans.
pub const PROTOTYPE_SCOPE: &str = "prototype";

/// Producer handed to a scope when it holds no instance for a name.
pub type ScopedProducer<'a> = &'a mut dyn FnMut() -> Result<BeanHandle, ResolveErrorKind>;

/// Storage strategy for beans living outside the built-in scopes.
///
/// Implementations own the cached instances and their teardown; the factory
/// only dispatches to them. The identifiers `singleton` and `prototype` are
/// reserved and cannot be registered.
pub trait Scope: Send + Sync {
    /// Returns the instance cached under `name`, creating it through
    /// `producer` if absent.
    ///
    /// # Errors
    /// Producer failures must be returned unchanged.
    fn get(&self, name: &str, producer: ScopedProducer<'_>) -> Result<BeanHandle, ResolveErrorKind>;

    /// Removes and returns the instance cached under `name`, if any.
    fn remove(&self, name: &str) -> Option<BeanHandle>;
}
