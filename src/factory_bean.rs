use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::Mutex;
use tracing::debug;

use crate::{
    alias::AliasRegistry,
    any::{BeanHandle, TypeInfo},
    errors::{CreationError, InstantiateErrorKind, ResolveErrorKind},
    singleton::SingletonRegistry,
};

/// A bean whose role is to produce another bean on demand.
///
/// Lookups under the plain bean name yield the product; a leading `&` on the
/// lookup name yields the factory bean itself.
pub trait FactoryBean: Send + Sync {
    /// Produces the object to expose. `None` means "no bean yet": outside
    /// creation it is replaced by the [`NullBean`] sentinel, during creation
    /// it fails the lookup.
    ///
    /// # Errors
    /// Failures surface as creation errors for the product's name.
    fn produce(&self) -> Result<Option<BeanHandle>, InstantiateErrorKind>;

    /// Whether the product is a shared singleton, cacheable per name.
    fn is_singleton_product(&self) -> bool {
        true
    }

    /// Type of the product, if already determinable.
    fn product_type(&self) -> Option<TypeInfo> {
        None
    }
}

/// Concrete handle a factory bean is stored under, so the engine can
/// recognize factory beans among cached instances.
pub struct BoxedFactoryBean {
    factory: Arc<dyn FactoryBean>,
    factory_type: TypeInfo,
}

impl BoxedFactoryBean {
    #[must_use]
    pub(crate) fn new(factory: Arc<dyn FactoryBean>, factory_type: TypeInfo) -> Self {
        Self { factory, factory_type }
    }

    #[inline]
    #[must_use]
    pub fn factory(&self) -> &Arc<dyn FactoryBean> {
        &self.factory
    }

    #[inline]
    #[must_use]
    pub fn factory_type(&self) -> TypeInfo {
        self.factory_type
    }
}

/// Sentinel standing in for "no bean": preserves identity semantics for
/// downstream null checks when a factory bean produces nothing.
pub struct NullBean;

/// Singleton registry extension that caches the products of factory beans
/// and routes them through the post-processing pipeline.
pub struct FactoryBeanRegistry {
    singletons: SingletonRegistry,
    /// Canonical name of the factory bean to its singleton product.
    products: Arc<Mutex<AHashMap<String, BeanHandle>>>,
}

impl FactoryBeanRegistry {
    #[must_use]
    pub fn new(aliases: Arc<AliasRegistry>) -> Self {
        let singletons = SingletonRegistry::new(aliases);
        let products = Arc::new(Mutex::new(AHashMap::new()));
        let purged = products.clone();
        singletons.set_remove_listener(Box::new(move |name| {
            purged.lock().remove(name);
        }));
        Self { singletons, products }
    }

    #[inline]
    #[must_use]
    pub fn singletons(&self) -> &SingletonRegistry {
        &self.singletons
    }

    #[must_use]
    pub(crate) fn cached_product(&self, name: &str) -> Option<BeanHandle> {
        self.products.lock().get(name).cloned()
    }

    /// Destroys every tracked singleton and drops all cached products.
    pub fn destroy_singletons(&self) {
        self.singletons.destroy_singletons();
        self.products.lock().clear();
    }

    /// Destroys one bean; its cached product is purged through the
    /// remove listener installed on the underlying registry.
    pub fn destroy_singleton(&self, name: &str) {
        self.singletons.destroy_singleton(name);
    }

    /// Obtains the object to expose for the given factory bean.
    ///
    /// Products of singleton-producing factories whose name is a registered
    /// singleton are cached under the singleton lock; a product requested
    /// while its name is in creation is returned unprocessed and not cached.
    pub(crate) fn object_from_factory_bean(
        &self,
        factory: &Arc<dyn FactoryBean>,
        bean_name: &str,
        should_post_process: bool,
        post_process: &dyn Fn(BeanHandle, &str) -> Result<BeanHandle, ResolveErrorKind>,
    ) -> Result<BeanHandle, ResolveErrorKind> {
        if factory.is_singleton_product() && self.singletons.contains_singleton(bean_name) {
            let _guard = self.singletons.singleton_mutex().lock();
            if let Some(cached) = self.cached_product(bean_name) {
                return Ok(cached);
            }
            let mut product = self.do_produce(factory, bean_name)?;
            // Only post-process and store if a reentrant produce() call did
            // not put the product there already.
            if let Some(already_there) = self.cached_product(bean_name) {
                product = already_there;
            } else {
                if should_post_process {
                    if self.singletons.is_singleton_currently_in_creation(bean_name) {
                        // Temporarily return the non-post-processed object,
                        // not storing it yet.
                        return Ok(product);
                    }
                    self.singletons.before_singleton_creation(bean_name)?;
                    let processed = post_process(product.clone(), bean_name);
                    self.singletons.after_singleton_creation(bean_name);
                    product = processed.map_err(|err| {
                        ResolveErrorKind::from(CreationError::new(
                            bean_name,
                            "post-processing of the factory bean's singleton product failed",
                            Some(err),
                        ))
                    })?;
                }
                if self.singletons.contains_singleton(bean_name) {
                    debug!(bean = bean_name, "Caching factory bean product");
                    self.products.lock().insert(bean_name.into(), product.clone());
                }
            }
            Ok(product)
        } else {
            let mut product = self.do_produce(factory, bean_name)?;
            if should_post_process {
                product = post_process(product, bean_name).map_err(|err| {
                    ResolveErrorKind::from(CreationError::new(
                        bean_name,
                        "post-processing of the factory bean's product failed",
                        Some(err),
                    ))
                })?;
            }
            Ok(product)
        }
    }

    fn do_produce(&self, factory: &Arc<dyn FactoryBean>, bean_name: &str) -> Result<BeanHandle, ResolveErrorKind> {
        let produced = factory.produce().map_err(|err| {
            ResolveErrorKind::from(CreationError::new(
                bean_name,
                "factory bean threw an exception on product creation",
                Some(err.into()),
            ))
        })?;
        match produced {
            Some(product) => Ok(product),
            None => {
                // Do not accept a null product from a factory bean that is
                // not fully initialized yet.
                if self.singletons.is_singleton_currently_in_creation(bean_name) {
                    return Err(ResolveErrorKind::CurrentlyInCreation { name: bean_name.into() });
                }
                Ok(Arc::new(NullBean))
            }
        }
    }
}
