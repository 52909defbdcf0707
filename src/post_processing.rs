use crate::{any::BeanHandle, errors::InstantiateErrorKind};

/// Hook into the bean lifecycle between instantiation and publication.
///
/// Processors run in registration order. Each callback may return the given
/// handle unchanged or substitute a wrapper for it.
///
/// # Warning
/// A processor that substitutes a wrapper must do so in [`Self::early_reference`]
/// as well: the engine guarantees that the object handed out as an early
/// reference is the object eventually published, so a wrap applied only after
/// initialization makes reference cycles through this bean unresolvable.
pub trait BeanPostProcessor: Send + Sync {
    /// Runs after population, before the init hook.
    ///
    /// # Errors
    /// A failure aborts the creation of the bean.
    fn before_initialization(&self, bean: BeanHandle, _name: &str) -> Result<BeanHandle, InstantiateErrorKind> {
        Ok(bean)
    }

    /// Runs after the init hook. Also applied to factory-bean products.
    ///
    /// # Errors
    /// A failure aborts the creation of the bean.
    fn after_initialization(&self, bean: BeanHandle, _name: &str) -> Result<BeanHandle, InstantiateErrorKind> {
        Ok(bean)
    }

    /// Maps the raw instance to the reference exposed to other beans while
    /// this one is still in creation. Invoked under the singleton lock; must
    /// not block or resolve further beans.
    fn early_reference(&self, bean: BeanHandle, _name: &str) -> BeanHandle {
        bean
    }
}
