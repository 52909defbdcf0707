use std::sync::Arc;

use crate::{
    any::BeanHandle,
    errors::InstantiateErrorKind,
    factory::BeanFactory,
};

/// Constructor / factory-method descriptor of a bean definition.
///
/// Receives the owning factory (for dependency lookups) and the explicit
/// arguments passed to an argument-taking lookup, if any.
pub(crate) type BoxedInstantiator =
    Box<dyn Fn(&BeanFactory, Option<&[BeanHandle]>) -> Result<BeanHandle, InstantiateErrorKind> + Send + Sync>;

/// Property-binding stage: runs on the raw instance after instantiation and
/// before the initialization pipeline. Dependency cycles are resolved here,
/// so the stage may observe early references of beans still in creation.
pub(crate) type BoxedPopulator =
    Box<dyn Fn(&BeanFactory, &BeanHandle) -> Result<(), InstantiateErrorKind> + Send + Sync>;

pub(crate) type BoxedInitHook = Box<dyn Fn(&BeanHandle) -> Result<(), InstantiateErrorKind> + Send + Sync>;

/// Teardown hook of a definition. Shared so that each created singleton can
/// capture it in its own disposable record.
pub(crate) type SharedTeardownHook = Arc<dyn Fn(&BeanHandle) + Send + Sync>;

/// Deferred producer yielding the early reference of a singleton in creation.
/// Invoked at most once, under the singleton lock; must not block.
pub(crate) type BoxedEarlyProducer = Box<dyn FnOnce() -> BeanHandle + Send>;

/// Teardown callback captured together with the instance it destroys.
pub(crate) type BoxedDisposer = Box<dyn FnOnce() + Send>;

pub(crate) fn boxed_instantiator<T, F>(instantiator: F) -> BoxedInstantiator
where
    T: Send + Sync + 'static,
    F: Fn(&BeanFactory) -> Result<T, InstantiateErrorKind> + Send + Sync + 'static,
{
    Box::new(move |factory, _args| instantiator(factory).map(|value| Arc::new(value) as BeanHandle))
}

pub(crate) fn boxed_instantiator_with_args<T, F>(instantiator: F) -> BoxedInstantiator
where
    T: Send + Sync + 'static,
    F: Fn(&BeanFactory, &[BeanHandle]) -> Result<T, InstantiateErrorKind> + Send + Sync + 'static,
{
    Box::new(move |factory, args| {
        instantiator(factory, args.unwrap_or(&[])).map(|value| Arc::new(value) as BeanHandle)
    })
}

/// Wrapper to create an instantiator that just returns the passed value.
/// It can be used when the value was created outside the container.
#[inline]
pub fn instance<T: Clone + Send + Sync + 'static>(
    value: T,
) -> impl Fn(&BeanFactory) -> Result<T, InstantiateErrorKind> {
    move |_| Ok(value.clone())
}

pub(crate) fn downcast_for_hook<T: Send + Sync + 'static>(
    handle: &BeanHandle,
) -> Result<Arc<T>, InstantiateErrorKind> {
    handle
        .clone()
        .downcast::<T>()
        .map_err(|_| InstantiateErrorKind::message("Lifecycle hook received an instance of an unexpected type"))
}
