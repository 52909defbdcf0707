use std::sync::Arc;

use tracing::warn;

use crate::{
    any::{BeanHandle, TypeInfo},
    errors::InstantiateErrorKind,
    factory::BeanFactory,
    factory_bean::{BoxedFactoryBean, FactoryBean},
    instantiator::{
        boxed_instantiator, boxed_instantiator_with_args, downcast_for_hook, BoxedInitHook, BoxedInstantiator,
        BoxedPopulator, SharedTeardownHook,
    },
};

/// Scope of a bean definition.
///
/// `Singleton` instances are cached and shared; `Prototype` instances are
/// created fresh on every lookup and never tracked afterwards; `Scoped`
/// instances are delegated to the scope implementation registered under the
/// carried name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeanScope {
    Singleton,
    Prototype,
    Scoped(String),
}

/// Recipe for creating a named bean.
///
/// Once the owning registry is frozen, definitions are immutable; the builder
/// therefore consumes `self` and the factory only ever observes the finished
/// value behind an `Arc`.
pub struct BeanDefinition {
    pub(crate) type_info: TypeInfo,
    pub(crate) product_type: Option<TypeInfo>,
    pub(crate) scope: BeanScope,
    pub(crate) lazy_init: bool,
    pub(crate) synthetic: bool,
    pub(crate) primary: bool,
    pub(crate) is_factory: bool,
    pub(crate) depends_on: Vec<String>,
    pub(crate) instantiator: BoxedInstantiator,
    pub(crate) populate: Option<BoxedPopulator>,
    pub(crate) init: Option<BoxedInitHook>,
    pub(crate) teardown: Option<SharedTeardownHook>,
}

impl BeanDefinition {
    fn from_parts(scope: BeanScope, type_info: TypeInfo, instantiator: BoxedInstantiator) -> Self {
        Self {
            type_info,
            product_type: None,
            scope,
            lazy_init: false,
            synthetic: false,
            primary: false,
            is_factory: false,
            depends_on: Vec::new(),
            instantiator,
            populate: None,
            init: None,
            teardown: None,
        }
    }

    /// Singleton definition backed by the given instantiator.
    #[must_use]
    pub fn singleton<T, F>(instantiator: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&BeanFactory) -> Result<T, InstantiateErrorKind> + Send + Sync + 'static,
    {
        Self::from_parts(BeanScope::Singleton, TypeInfo::of::<T>(), boxed_instantiator(instantiator))
    }

    /// Prototype definition: a fresh instance per lookup, untracked afterwards.
    #[must_use]
    pub fn prototype<T, F>(instantiator: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&BeanFactory) -> Result<T, InstantiateErrorKind> + Send + Sync + 'static,
    {
        Self::from_parts(BeanScope::Prototype, TypeInfo::of::<T>(), boxed_instantiator(instantiator))
    }

    /// Definition bound to a custom scope registered under `scope_name`.
    #[must_use]
    pub fn scoped<T, F>(scope_name: impl Into<String>, instantiator: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&BeanFactory) -> Result<T, InstantiateErrorKind> + Send + Sync + 'static,
    {
        Self::from_parts(
            BeanScope::Scoped(scope_name.into()),
            TypeInfo::of::<T>(),
            boxed_instantiator(instantiator),
        )
    }

    /// Singleton definition whose instantiator consumes explicit lookup
    /// arguments. The argument slice is empty for plain lookups.
    #[must_use]
    pub fn singleton_with_args<T, F>(instantiator: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&BeanFactory, &[BeanHandle]) -> Result<T, InstantiateErrorKind> + Send + Sync + 'static,
    {
        Self::from_parts(
            BeanScope::Singleton,
            TypeInfo::of::<T>(),
            boxed_instantiator_with_args(instantiator),
        )
    }

    /// Prototype definition whose instantiator consumes explicit lookup
    /// arguments.
    #[must_use]
    pub fn prototype_with_args<T, F>(instantiator: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&BeanFactory, &[BeanHandle]) -> Result<T, InstantiateErrorKind> + Send + Sync + 'static,
    {
        Self::from_parts(
            BeanScope::Prototype,
            TypeInfo::of::<T>(),
            boxed_instantiator_with_args(instantiator),
        )
    }

    /// Definition producing a factory bean: lookups under the plain name
    /// yield the factory's product, lookups under the `&`-prefixed name yield
    /// the factory itself.
    #[must_use]
    pub fn factory_bean<P, F>(instantiator: F) -> Self
    where
        P: FactoryBean + 'static,
        F: Fn(&BeanFactory) -> Result<P, InstantiateErrorKind> + Send + Sync + 'static,
    {
        let factory_type = TypeInfo::of::<P>();
        let boxed: BoxedInstantiator = Box::new(move |factory, _args| {
            instantiator(factory).map(|produced| {
                Arc::new(BoxedFactoryBean::new(Arc::new(produced), factory_type)) as BeanHandle
            })
        });
        let mut definition = Self::from_parts(BeanScope::Singleton, factory_type, boxed);
        definition.is_factory = true;
        definition
    }

    #[must_use]
    pub fn lazy(mut self) -> Self {
        self.lazy_init = true;
        self
    }

    /// Synthetic beans skip the post-processing pipeline.
    #[must_use]
    pub fn synthetic(mut self) -> Self {
        self.synthetic = true;
        self
    }

    /// Marks this definition as the tie-breaker for by-type lookups.
    #[must_use]
    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    /// Declares the product type of a factory-bean definition, for type
    /// queries answered before the factory is instantiated.
    #[must_use]
    pub fn product_type<T: ?Sized + 'static>(mut self) -> Self {
        self.product_type = Some(TypeInfo::of::<T>());
        self
    }

    /// Names of beans that must be fully created before this one and must
    /// outlive it.
    #[must_use]
    pub fn depends_on<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(names.into_iter().map(Into::into));
        self
    }

    /// Property-binding stage, run on the raw instance before initialization.
    /// Dependencies resolved here may be early references of beans still in
    /// creation, which is what makes reference cycles resolvable.
    #[must_use]
    pub fn populate<T, F>(mut self, populate: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&BeanFactory, &Arc<T>) -> Result<(), InstantiateErrorKind> + Send + Sync + 'static,
    {
        self.populate = Some(Box::new(move |factory, handle| {
            let instance = downcast_for_hook::<T>(handle)?;
            populate(factory, &instance)
        }));
        self
    }

    /// Init hook, run between the pre- and post-initialization processors.
    #[must_use]
    pub fn init<T, F>(mut self, init: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Arc<T>) -> Result<(), InstantiateErrorKind> + Send + Sync + 'static,
    {
        self.init = Some(Box::new(move |handle| {
            let instance = downcast_for_hook::<T>(handle)?;
            init(&instance)
        }));
        self
    }

    /// Teardown hook, invoked during the destruction phase. Only singletons
    /// are tracked for destruction; for prototypes the caller owns teardown.
    #[must_use]
    pub fn teardown<T, F>(mut self, teardown: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(Arc<T>) + Send + Sync + 'static,
    {
        self.teardown = Some(Arc::new(move |handle: &BeanHandle| {
            match handle.clone().downcast::<T>() {
                Ok(instance) => teardown(instance),
                Err(_) => warn!("Teardown hook received an instance of an unexpected type"),
            }
        }));
        self
    }

    #[inline]
    #[must_use]
    pub fn scope(&self) -> &BeanScope {
        &self.scope
    }

    #[inline]
    #[must_use]
    pub fn type_info(&self) -> TypeInfo {
        self.type_info
    }

    #[inline]
    #[must_use]
    pub fn is_singleton(&self) -> bool {
        self.scope == BeanScope::Singleton
    }

    #[inline]
    #[must_use]
    pub fn is_prototype(&self) -> bool {
        self.scope == BeanScope::Prototype
    }

    #[inline]
    #[must_use]
    pub fn is_lazy(&self) -> bool {
        self.lazy_init
    }

    #[inline]
    #[must_use]
    pub fn is_factory_bean(&self) -> bool {
        self.is_factory
    }

    #[inline]
    #[must_use]
    pub fn dependency_names(&self) -> &[String] {
        &self.depends_on
    }
}
