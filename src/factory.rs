use std::{
    any::TypeId,
    cell::RefCell,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use ahash::{AHashMap, AHashSet};
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use tracing::{debug, debug_span, warn};

use crate::{
    alias::AliasRegistry,
    any::{BeanHandle, TypeInfo},
    config::FactoryConfig,
    definition::{BeanDefinition, BeanScope},
    errors::{AliasErrorKind, CreationError, DefinitionErrorKind, InstantiateErrorKind, ResolveErrorKind},
    factory_bean::{BoxedFactoryBean, FactoryBeanRegistry, NullBean},
    post_processing::BeanPostProcessor,
    registry::DefinitionRegistry,
    scope::{Scope, PROTOTYPE_SCOPE, SINGLETON_SCOPE},
    singleton::{SingletonLock, SingletonRegistry},
};

/// Lookup-name prefix requesting the factory bean itself instead of its
/// product.
pub const FACTORY_BEAN_PREFIX: char = '&';

static NEXT_FACTORY_ID: AtomicU64 = AtomicU64::new(0);

thread_local! {
    /// Prototype names being created on this thread, per factory instance.
    static PROTOTYPES_IN_CREATION: RefCell<AHashMap<u64, AHashSet<String>>> =
        RefCell::new(AHashMap::new());
}

/// Hierarchical bean factory: the user-visible entry point of the container.
///
/// Resolves names through the alias registry, serves singletons from the
/// three-tier singleton registry, creates missing beans from their
/// definitions and routes factory beans to their products. Unknown names are
/// delegated to the parent factory, if one is configured.
///
/// Cloning is cheap and shares the underlying registries. Dropping the last
/// clone destroys the remaining singletons.
#[derive(Clone)]
pub struct BeanFactory {
    inner: Arc<BeanFactoryInner>,
}

struct BeanFactoryInner {
    id: u64,
    config: FactoryConfig,
    aliases: Arc<AliasRegistry>,
    registry: FactoryBeanRegistry,
    definitions: DefinitionRegistry,
    parent: OnceCell<BeanFactory>,
    post_processors: RwLock<Vec<Arc<dyn BeanPostProcessor>>>,
    scopes: RwLock<AHashMap<String, Arc<dyn Scope>>>,
    value_resolvers: RwLock<Vec<Box<dyn Fn(&str) -> String + Send + Sync>>>,
}

impl Drop for BeanFactoryInner {
    fn drop(&mut self) {
        self.registry.destroy_singletons();
        debug!("Bean factory closed on drop");
    }
}

impl Default for BeanFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl BeanFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(FactoryConfig::default())
    }

    #[must_use]
    pub fn with_config(config: FactoryConfig) -> Self {
        let aliases = Arc::new(AliasRegistry::new(config.allow_alias_overriding));
        Self {
            inner: Arc::new(BeanFactoryInner {
                id: NEXT_FACTORY_ID.fetch_add(1, Ordering::Relaxed),
                config,
                registry: FactoryBeanRegistry::new(aliases.clone()),
                definitions: DefinitionRegistry::new(config.allow_definition_overriding),
                aliases,
                parent: OnceCell::new(),
                post_processors: RwLock::new(Vec::new()),
                scopes: RwLock::new(AHashMap::new()),
                value_resolvers: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Sets the parent factory consulted for names unknown locally.
    ///
    /// # Errors
    /// Returns [`ResolveErrorKind::IllegalState`] if a parent is already set.
    pub fn set_parent(&self, parent: BeanFactory) -> Result<(), ResolveErrorKind> {
        self.inner
            .parent
            .set(parent)
            .map_err(|_| ResolveErrorKind::illegal_state("Parent factory already set"))
    }

    #[must_use]
    pub fn parent(&self) -> Option<&BeanFactory> {
        self.inner.parent.get()
    }

    // ===== name handling =====

    #[inline]
    fn is_factory_dereference(name: &str) -> bool {
        name.starts_with(FACTORY_BEAN_PREFIX)
    }

    /// Strips any dereference prefix and resolves aliases to the canonical
    /// bean name.
    fn transformed_bean_name(&self, name: &str) -> String {
        let stripped = name.trim_start_matches(FACTORY_BEAN_PREFIX);
        self.inner.aliases.canonical_name(stripped)
    }

    /// Canonical name with the dereference prefix of the original lookup
    /// restored; used when delegating to the parent.
    fn original_name(&self, name: &str) -> String {
        let bean_name = self.transformed_bean_name(name);
        if Self::is_factory_dereference(name) {
            format!("{FACTORY_BEAN_PREFIX}{bean_name}")
        } else {
            bean_name
        }
    }

    // ===== aliases =====

    /// # Errors
    /// See [`AliasRegistry::register_alias`].
    pub fn register_alias(&self, name: &str, alias: &str) -> Result<(), AliasErrorKind> {
        self.inner.aliases.register_alias(name, alias)
    }

    /// # Errors
    /// See [`AliasRegistry::remove_alias`].
    pub fn remove_alias(&self, alias: &str) -> Result<(), AliasErrorKind> {
        self.inner.aliases.remove_alias(alias)
    }

    #[must_use]
    pub fn is_alias(&self, name: &str) -> bool {
        self.inner.aliases.is_alias(name)
    }

    #[must_use]
    pub fn canonical_name(&self, name: &str) -> String {
        self.inner.aliases.canonical_name(name)
    }

    /// Aliases of the given name, honoring the dereference prefix and
    /// including the parent factory's aliases for names unknown locally.
    #[must_use]
    pub fn get_aliases(&self, name: &str) -> Vec<String> {
        let deref = Self::is_factory_dereference(name);
        let bean_name = self.transformed_bean_name(name);
        let prefix = if deref { "&" } else { "" };

        let mut aliases = Vec::new();
        let full_name = format!("{prefix}{bean_name}");
        if full_name != name {
            aliases.push(full_name);
        }
        for alias in self.inner.aliases.aliases_of(&bean_name) {
            let alias = format!("{prefix}{alias}");
            if alias != name {
                aliases.push(alias);
            }
        }
        if !self.contains_local_bean_name(&bean_name) {
            if let Some(parent) = self.parent() {
                aliases.extend(parent.get_aliases(&self.original_name(name)));
            }
        }
        aliases
    }

    /// Applies `resolver` to all registered aliases and their targets.
    ///
    /// # Errors
    /// See [`AliasRegistry::resolve_aliases`].
    pub fn resolve_aliases_with(&self, resolver: &dyn Fn(&str) -> String) -> Result<(), AliasErrorKind> {
        self.inner.aliases.resolve_aliases(resolver)
    }

    // ===== configuration surface =====

    pub fn add_embedded_value_resolver(&self, resolver: impl Fn(&str) -> String + Send + Sync + 'static) {
        self.inner.value_resolvers.write().push(Box::new(resolver));
    }

    /// Runs the given value through the registered resolver chain, in order.
    #[must_use]
    pub fn resolve_embedded_value(&self, value: &str) -> String {
        let resolvers = self.inner.value_resolvers.read();
        resolvers
            .iter()
            .fold(value.to_string(), |current, resolver| resolver(&current))
    }

    pub fn add_post_processor(&self, processor: impl BeanPostProcessor + 'static) {
        self.inner.post_processors.write().push(Arc::new(processor));
    }

    #[must_use]
    pub fn post_processor_count(&self) -> usize {
        self.inner.post_processors.read().len()
    }

    fn post_processors_snapshot(&self) -> Vec<Arc<dyn BeanPostProcessor>> {
        self.inner.post_processors.read().clone()
    }

    /// Registers a custom scope implementation under `scope_name`.
    ///
    /// # Errors
    /// Returns [`ResolveErrorKind::IllegalState`] for the reserved
    /// identifiers `singleton` and `prototype`.
    pub fn register_scope(&self, scope_name: &str, scope: impl Scope + 'static) -> Result<(), ResolveErrorKind> {
        if scope_name == SINGLETON_SCOPE || scope_name == PROTOTYPE_SCOPE {
            return Err(ResolveErrorKind::illegal_state(
                "Cannot replace the built-in scopes `singleton` and `prototype`",
            ));
        }
        let previous = self.inner.scopes.write().insert(scope_name.into(), Arc::new(scope));
        if previous.is_some() {
            debug!(scope = scope_name, "Replacing scope implementation");
        }
        Ok(())
    }

    #[must_use]
    pub fn registered_scope_names(&self) -> Vec<String> {
        self.inner.scopes.read().keys().cloned().collect()
    }

    fn registered_scope(&self, scope_name: &str) -> Option<Arc<dyn Scope>> {
        self.inner.scopes.read().get(scope_name).cloned()
    }

    // ===== definitions =====

    /// # Errors
    /// See [`DefinitionRegistry::register`].
    pub fn register_definition(
        &self,
        name: impl Into<String>,
        definition: BeanDefinition,
    ) -> Result<(), DefinitionErrorKind> {
        self.inner.definitions.register(name, definition)
    }

    /// # Errors
    /// See [`DefinitionRegistry::remove`].
    pub fn remove_definition(&self, name: &str) -> Result<(), DefinitionErrorKind> {
        self.inner.definitions.remove(name)
    }

    #[must_use]
    pub fn get_definition(&self, name: &str) -> Option<Arc<BeanDefinition>> {
        self.inner.definitions.get(&self.transformed_bean_name(name))
    }

    #[must_use]
    pub fn contains_definition(&self, name: &str) -> bool {
        self.inner.definitions.contains(name)
    }

    #[must_use]
    pub fn definition_names(&self) -> Vec<String> {
        self.inner.definitions.names()
    }

    #[must_use]
    pub fn definition_count(&self) -> usize {
        self.inner.definitions.count()
    }

    /// Freezes the configuration: definitions become immutable.
    pub fn freeze_configuration(&self) {
        self.inner.definitions.freeze();
    }

    #[must_use]
    pub fn is_configuration_frozen(&self) -> bool {
        self.inner.definitions.is_frozen()
    }

    /// Whether the name is already taken by an alias, a registered singleton
    /// or a definition.
    #[must_use]
    pub fn is_name_in_use(&self, name: &str) -> bool {
        self.is_alias(name) || self.contains_local_bean(name)
    }

    // ===== singleton registry surface =====

    #[inline]
    #[must_use]
    pub fn singletons(&self) -> &SingletonRegistry {
        self.inner.registry.singletons()
    }

    /// The singleton lock handle; collaborators needing compound operations
    /// atomic with creation acquire this same lock.
    #[inline]
    #[must_use]
    pub fn singleton_mutex(&self) -> &SingletonLock {
        self.singletons().singleton_mutex()
    }

    /// # Errors
    /// See [`SingletonRegistry::register_singleton`].
    pub fn register_singleton(&self, name: &str, instance: BeanHandle) -> Result<(), ResolveErrorKind> {
        self.singletons().register_singleton(name, instance)
    }

    #[must_use]
    pub fn contains_singleton(&self, name: &str) -> bool {
        self.singletons().contains_singleton(name)
    }

    #[must_use]
    pub fn singleton_names(&self) -> Vec<String> {
        self.singletons().singleton_names()
    }

    #[must_use]
    pub fn singleton_count(&self) -> usize {
        self.singletons().singleton_count()
    }

    pub fn register_dependent_bean(&self, name: &str, dependent: &str) {
        self.singletons().register_dependent_bean(name, dependent);
    }

    #[must_use]
    pub fn dependent_beans(&self, name: &str) -> Vec<String> {
        self.singletons().dependent_beans(name)
    }

    #[must_use]
    pub fn dependencies_for_bean(&self, name: &str) -> Vec<String> {
        self.singletons().dependencies_for_bean(name)
    }

    pub fn register_contained_bean(&self, contained: &str, containing: &str) {
        self.singletons().register_contained_bean(contained, containing);
    }

    /// Destroys all tracked singletons, dependents before dependees, in
    /// reverse registration order.
    pub fn destroy_singletons(&self) {
        self.inner.registry.destroy_singletons();
    }

    pub fn destroy_singleton(&self, name: &str) {
        self.inner.registry.destroy_singleton(name);
    }

    // ===== lookups =====

    /// Returns the bean registered under `name`, downcast to `T`.
    ///
    /// # Errors
    /// - [`ResolveErrorKind::NoSuchBean`] for unknown names
    /// - [`ResolveErrorKind::NotOfRequiredType`] on a type mismatch
    /// - creation failures of the bean or its dependencies
    pub fn get_bean<T: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>, ResolveErrorKind> {
        let handle = self.do_get_bean(name, Some(TypeInfo::of::<T>()), None)?;
        Self::downcast_bean(name, handle)
    }

    /// Untyped variant of [`Self::get_bean`].
    ///
    /// # Errors
    /// As [`Self::get_bean`], without the requested-type check.
    pub fn get_bean_handle(&self, name: &str) -> Result<BeanHandle, ResolveErrorKind> {
        self.do_get_bean(name, None, None)
    }

    /// Resolves `name` passing explicit arguments to its instantiator.
    ///
    /// # Errors
    /// As [`Self::get_bean`].
    pub fn get_bean_with_args<T: Send + Sync + 'static>(
        &self,
        name: &str,
        args: &[BeanHandle],
    ) -> Result<Arc<T>, ResolveErrorKind> {
        let handle = self.do_get_bean(name, Some(TypeInfo::of::<T>()), Some(args))?;
        Self::downcast_bean(name, handle)
    }

    /// # Errors
    /// As [`Self::get_bean_handle`].
    pub fn get_bean_handle_with_args(&self, name: &str, args: &[BeanHandle]) -> Result<BeanHandle, ResolveErrorKind> {
        self.do_get_bean(name, None, Some(args))
    }

    /// Resolves the single bean of type `T` among local definitions and
    /// manually registered singletons. Ambiguity is broken by a unique
    /// `primary` definition, if any.
    ///
    /// # Errors
    /// - [`ResolveErrorKind::NoSuchBean`] when nothing matches
    /// - [`ResolveErrorKind::NoUniqueBean`] when several candidates match
    pub fn get_bean_by_type<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, ResolveErrorKind> {
        let type_info = TypeInfo::of::<T>();
        let candidates = self.names_for_type::<T>();
        match candidates.as_slice() {
            [] => Err(ResolveErrorKind::NoSuchBean {
                name: type_info.name.into(),
            }),
            [single] => self.get_bean::<T>(single),
            _ => {
                let primaries: Vec<&String> = candidates
                    .iter()
                    .filter(|name| self.get_definition(name).is_some_and(|definition| definition.primary))
                    .collect();
                if let [primary] = primaries.as_slice() {
                    return self.get_bean::<T>(primary);
                }
                Err(ResolveErrorKind::NoUniqueBean {
                    type_name: type_info.name,
                    candidates,
                })
            }
        }
    }

    /// Names of local definitions and registered singletons whose bean type
    /// (product type, for factory beans) matches `T`.
    #[must_use]
    pub fn names_for_type<T: ?Sized + 'static>(&self) -> Vec<String> {
        let type_id = TypeId::of::<T>();
        let mut names = Vec::new();
        for name in self.inner.definitions.names() {
            let Some(definition) = self.inner.definitions.get(&name) else {
                continue;
            };
            let matches = if definition.is_factory {
                definition.product_type.is_some_and(|info| info.id == type_id)
            } else {
                definition.type_info.id == type_id
            };
            if matches {
                names.push(name);
            }
        }
        for name in self.singleton_names() {
            if names.iter().any(|known| *known == name) || self.inner.definitions.contains(&name) {
                continue;
            }
            let Some(instance) = self.singletons().get_singleton_allowing_early(&name, false) else {
                continue;
            };
            let matches = match instance.downcast_ref::<BoxedFactoryBean>() {
                Some(factory_bean) => factory_bean
                    .factory()
                    .product_type()
                    .is_some_and(|info| info.id == type_id),
                None => (*instance).type_id() == type_id,
            };
            if matches {
                names.push(name);
            }
        }
        names
    }

    /// Resolves `dependency` on behalf of `dependent`, recording the edge so
    /// that destruction order honors it. Meant for populate stages wiring
    /// their dependencies by hand.
    ///
    /// # Errors
    /// As [`Self::get_bean`].
    pub fn resolve_dependency<T: Send + Sync + 'static>(
        &self,
        dependency: &str,
        dependent: &str,
    ) -> Result<Arc<T>, ResolveErrorKind> {
        self.singletons().register_dependent_bean(dependency, dependent);
        self.get_bean::<T>(dependency)
    }

    // ===== predicates =====

    /// Whether this factory or an ancestor knows the name.
    #[must_use]
    pub fn contains_bean(&self, name: &str) -> bool {
        let bean_name = self.transformed_bean_name(name);
        if self.contains_local_bean_name(&bean_name) {
            return true;
        }
        self.parent()
            .is_some_and(|parent| parent.contains_bean(&self.original_name(name)))
    }

    /// Whether this factory itself holds a singleton or definition for the
    /// name, ignoring ancestors.
    #[must_use]
    pub fn contains_local_bean(&self, name: &str) -> bool {
        let bean_name = self.transformed_bean_name(name);
        self.contains_local_bean_name(&bean_name)
    }

    fn contains_local_bean_name(&self, bean_name: &str) -> bool {
        self.contains_singleton(bean_name) || self.inner.definitions.contains(bean_name)
    }

    /// # Errors
    /// Returns [`ResolveErrorKind::NoSuchBean`] for unknown names.
    pub fn is_singleton(&self, name: &str) -> Result<bool, ResolveErrorKind> {
        let bean_name = self.transformed_bean_name(name);
        if let Some(instance) = self.singletons().get_singleton_allowing_early(&bean_name, false) {
            return Ok(match instance.downcast_ref::<BoxedFactoryBean>() {
                Some(factory_bean) => {
                    Self::is_factory_dereference(name) || factory_bean.factory().is_singleton_product()
                }
                None => !Self::is_factory_dereference(name),
            });
        }
        if !self.contains_local_bean_name(&bean_name) {
            if let Some(parent) = self.parent() {
                return parent.is_singleton(&self.original_name(name));
            }
        }
        let definition = self
            .inner
            .definitions
            .get(&bean_name)
            .ok_or(ResolveErrorKind::NoSuchBean { name: bean_name })?;
        Ok(definition.is_singleton())
    }

    /// # Errors
    /// Returns [`ResolveErrorKind::NoSuchBean`] for unknown names.
    pub fn is_prototype(&self, name: &str) -> Result<bool, ResolveErrorKind> {
        let bean_name = self.transformed_bean_name(name);
        if let Some(instance) = self.singletons().get_singleton_allowing_early(&bean_name, false) {
            return Ok(match instance.downcast_ref::<BoxedFactoryBean>() {
                Some(factory_bean) => {
                    !Self::is_factory_dereference(name) && !factory_bean.factory().is_singleton_product()
                }
                None => false,
            });
        }
        if !self.contains_local_bean_name(&bean_name) {
            if let Some(parent) = self.parent() {
                return parent.is_prototype(&self.original_name(name));
            }
        }
        let definition = self
            .inner
            .definitions
            .get(&bean_name)
            .ok_or(ResolveErrorKind::NoSuchBean { name: bean_name })?;
        Ok(definition.is_prototype())
    }

    /// Whether the bean registered under `name` matches type `T` (for factory
    /// beans, whether the product does).
    ///
    /// # Errors
    /// Returns [`ResolveErrorKind::NoSuchBean`] for unknown names.
    pub fn is_type_match<T: ?Sized + 'static>(&self, name: &str) -> Result<bool, ResolveErrorKind> {
        let type_id = TypeId::of::<T>();
        let deref = Self::is_factory_dereference(name);
        let bean_name = self.transformed_bean_name(name);
        if let Some(instance) = self.singletons().get_singleton_allowing_early(&bean_name, false) {
            return Ok(match instance.downcast_ref::<BoxedFactoryBean>() {
                Some(factory_bean) => {
                    if deref {
                        (*instance).type_id() == type_id || factory_bean.factory_type().id == type_id
                    } else {
                        factory_bean
                            .factory()
                            .product_type()
                            .is_some_and(|info| info.id == type_id)
                    }
                }
                None => !deref && (*instance).type_id() == type_id,
            });
        }
        if !self.contains_local_bean_name(&bean_name) {
            if let Some(parent) = self.parent() {
                return parent.is_type_match::<T>(&self.original_name(name));
            }
        }
        let definition = self
            .inner
            .definitions
            .get(&bean_name)
            .ok_or(ResolveErrorKind::NoSuchBean { name: bean_name })?;
        Ok(if definition.is_factory {
            if deref {
                TypeId::of::<BoxedFactoryBean>() == type_id || definition.type_info.id == type_id
            } else {
                definition.product_type.is_some_and(|info| info.id == type_id)
            }
        } else {
            !deref && definition.type_info.id == type_id
        })
    }

    /// Type of the bean registered under `name`, if determinable without
    /// instantiating it.
    ///
    /// # Errors
    /// Returns [`ResolveErrorKind::NoSuchBean`] for unknown names.
    pub fn get_type(&self, name: &str) -> Result<Option<TypeInfo>, ResolveErrorKind> {
        let deref = Self::is_factory_dereference(name);
        let bean_name = self.transformed_bean_name(name);
        if let Some(definition) = self.inner.definitions.get(&bean_name) {
            if definition.is_factory {
                if deref {
                    return Ok(Some(definition.type_info));
                }
                if definition.product_type.is_some() {
                    return Ok(definition.product_type);
                }
                // Fall through: an instantiated factory may know its product type.
            } else {
                return Ok(if deref { None } else { Some(definition.type_info) });
            }
        }
        if let Some(instance) = self.singletons().get_singleton_allowing_early(&bean_name, false) {
            return Ok(match instance.downcast_ref::<BoxedFactoryBean>() {
                Some(factory_bean) => {
                    if deref {
                        Some(factory_bean.factory_type())
                    } else {
                        factory_bean.factory().product_type()
                    }
                }
                None => None,
            });
        }
        if self.inner.definitions.contains(&bean_name) {
            // A factory definition without a declared product type and no
            // instance yet.
            return Ok(None);
        }
        if let Some(parent) = self.parent() {
            return parent.get_type(&self.original_name(name));
        }
        Err(ResolveErrorKind::NoSuchBean { name: bean_name })
    }

    /// Eagerly creates every non-lazy singleton definition, in registration
    /// order. Factory beans are instantiated as factories; their products
    /// stay deferred until first use.
    ///
    /// # Errors
    /// The first creation failure aborts the bootstrap.
    pub fn pre_instantiate_singletons(&self) -> Result<(), ResolveErrorKind> {
        debug!("Pre-instantiating singletons");
        for name in self.inner.definitions.names() {
            let Some(definition) = self.inner.definitions.get(&name) else {
                continue;
            };
            if !definition.is_singleton() || definition.is_lazy() {
                continue;
            }
            if definition.is_factory_bean() {
                self.get_bean_handle(&format!("{FACTORY_BEAN_PREFIX}{name}"))?;
            } else {
                self.get_bean_handle(&name)?;
            }
        }
        Ok(())
    }

    // ===== resolution protocol =====

    fn do_get_bean(
        &self,
        name: &str,
        required_type: Option<TypeInfo>,
        args: Option<&[BeanHandle]>,
    ) -> Result<BeanHandle, ResolveErrorKind> {
        let bean_name = self.transformed_bean_name(name);
        let span = debug_span!("resolve", bean = %bean_name);
        let _guard = span.enter();

        let cached = if args.is_none() {
            self.singletons().get_singleton(&bean_name)
        } else {
            None
        };

        let handle = if let Some(shared) = cached {
            if self.singletons().is_singleton_currently_in_creation(&bean_name) {
                debug!("Returning eagerly exposed instance of a singleton still in creation");
            } else {
                debug!("Found in singleton cache");
            }
            self.object_for_bean_instance(shared, name, &bean_name)?
        } else {
            // A constructor cycle between prototypes is never resolvable.
            if self.is_prototype_currently_in_creation(&bean_name) {
                return Err(ResolveErrorKind::CurrentlyInCreation { name: bean_name });
            }
            if !self.contains_local_bean_name(&bean_name) {
                if let Some(parent) = self.parent() {
                    debug!("Not found locally, trying parent factory");
                    return parent.do_get_bean(&self.original_name(name), required_type, args);
                }
            }
            let definition = self.inner.definitions.get(&bean_name).ok_or_else(|| {
                warn!("No bean definition found");
                ResolveErrorKind::NoSuchBean {
                    name: bean_name.clone(),
                }
            })?;

            // Guarantee initialization of explicit dependencies first,
            // recording the edges that drive teardown order.
            for dependency in definition.dependency_names() {
                if self.singletons().is_dependent(&bean_name, dependency) {
                    return Err(CreationError::new(
                        &bean_name,
                        format!("circular depends-on relationship with bean `{dependency}`"),
                        None,
                    )
                    .into());
                }
                self.singletons().register_dependent_bean(dependency, &bean_name);
                if let Err(err) = self.get_bean_handle(dependency) {
                    return Err(CreationError::new(
                        &bean_name,
                        format!("initialization of dependency `{dependency}` failed"),
                        Some(err),
                    )
                    .into());
                }
            }

            let created = match definition.scope() {
                BeanScope::Singleton => self.singletons().get_singleton_or_create(&bean_name, || {
                    self.create_bean(&bean_name, &definition, args).map_err(|err| {
                        // Scrub eagerly registered state of the failed creation.
                        self.inner.registry.destroy_singleton(&bean_name);
                        err
                    })
                })?,
                BeanScope::Prototype => {
                    self.before_prototype_creation(&bean_name);
                    let created = self.create_bean(&bean_name, &definition, args);
                    self.after_prototype_creation(&bean_name);
                    created?
                }
                BeanScope::Scoped(scope_name) => {
                    let scope = self.registered_scope(scope_name).ok_or_else(|| {
                        ResolveErrorKind::illegal_state(format!(
                            "No scope named `{scope_name}` registered for bean `{bean_name}`"
                        ))
                    })?;
                    let mut producer = || {
                        self.before_prototype_creation(&bean_name);
                        let created = self.create_bean(&bean_name, &definition, args);
                        self.after_prototype_creation(&bean_name);
                        created
                    };
                    scope.get(&bean_name, &mut producer)?
                }
            };
            self.object_for_bean_instance(created, name, &bean_name)?
        };

        if let Some(required) = required_type {
            if handle.downcast_ref::<NullBean>().is_none() && (*handle).type_id() != required.id {
                return Err(ResolveErrorKind::NotOfRequiredType {
                    name: name.into(),
                    expected: required,
                    actual: (*handle).type_id(),
                });
            }
        }
        Ok(handle)
    }

    /// Routes a resolved instance through factory-bean indirection: a
    /// dereferenced lookup returns the factory itself, a plain lookup on a
    /// factory bean returns its (possibly cached) product.
    fn object_for_bean_instance(
        &self,
        instance: BeanHandle,
        name: &str,
        bean_name: &str,
    ) -> Result<BeanHandle, ResolveErrorKind> {
        if Self::is_factory_dereference(name) {
            if instance.downcast_ref::<NullBean>().is_some() {
                return Ok(instance);
            }
            if instance.downcast_ref::<BoxedFactoryBean>().is_none() {
                return Err(ResolveErrorKind::NotOfRequiredType {
                    name: name.into(),
                    expected: TypeInfo::of::<BoxedFactoryBean>(),
                    actual: (*instance).type_id(),
                });
            }
            return Ok(instance);
        }
        let Some(factory_bean) = instance.downcast_ref::<BoxedFactoryBean>() else {
            return Ok(instance);
        };

        debug!("Bean is a factory bean, resolving its product");
        if let Some(cached) = self.inner.registry.cached_product(bean_name) {
            return Ok(cached);
        }
        let should_post_process = self
            .inner
            .definitions
            .get(bean_name)
            .map_or(true, |definition| !definition.synthetic);
        let factory = factory_bean.factory().clone();
        self.inner
            .registry
            .object_from_factory_bean(&factory, bean_name, should_post_process, &|bean, product_name| {
                self.apply_post_processors_after_initialization(bean, product_name)
            })
    }

    /// Full creation pipeline: instantiate, expose early if eligible,
    /// populate, initialize, reconcile the early reference, and register the
    /// teardown record.
    fn create_bean(
        &self,
        bean_name: &str,
        definition: &Arc<BeanDefinition>,
        args: Option<&[BeanHandle]>,
    ) -> Result<BeanHandle, ResolveErrorKind> {
        debug!(bean = bean_name, "Creating instance of bean");
        let raw = (definition.instantiator)(self, args)
            .map_err(|err| Self::creation_error(bean_name, "instantiation of bean failed", err))?;

        let singletons = self.singletons();
        let early_exposure = definition.is_singleton()
            && self.inner.config.allow_circular_references
            && singletons.is_singleton_currently_in_creation(bean_name);
        if early_exposure {
            debug!(
                bean = bean_name,
                "Eagerly exposing bean to allow resolving potential circular references"
            );
            let processors = if definition.synthetic {
                Vec::new()
            } else {
                self.post_processors_snapshot()
            };
            let early_name = bean_name.to_string();
            let early_raw = raw.clone();
            singletons.add_singleton_producer(
                bean_name,
                Box::new(move || {
                    processors
                        .iter()
                        .fold(early_raw, |bean, processor| processor.early_reference(bean, &early_name))
                }),
            );
        }

        if let Some(populate) = &definition.populate {
            populate(self, &raw)
                .map_err(|err| Self::creation_error(bean_name, "population of bean properties failed", err))?;
        }

        let mut exposed = raw.clone();
        if !definition.synthetic {
            for processor in self.post_processors_snapshot() {
                exposed = processor.before_initialization(exposed, bean_name).map_err(|err| {
                    Self::creation_error(bean_name, "post-processing before initialization failed", err)
                })?;
            }
        }
        if let Some(init) = &definition.init {
            init(&exposed).map_err(|err| Self::creation_error(bean_name, "invocation of init hook failed", err))?;
        }
        if !definition.synthetic {
            for processor in self.post_processors_snapshot() {
                exposed = processor.after_initialization(exposed, bean_name).map_err(|err| {
                    Self::creation_error(bean_name, "post-processing after initialization failed", err)
                })?;
            }
        }

        if early_exposure {
            if let Some(early) = singletons.get_singleton_allowing_early(bean_name, false) {
                if Arc::ptr_eq(&exposed, &raw) {
                    // The early reference is the published object; hand out
                    // the stabilized instance to preserve identity.
                    exposed = early;
                } else if singletons.has_dependent_bean(bean_name) {
                    // The raw instance escaped into dependents but the
                    // pipeline substituted a different final object: the
                    // cycle is unresolvable.
                    return Err(ResolveErrorKind::CurrentlyInCreation {
                        name: bean_name.into(),
                    });
                }
            }
        }

        if definition.is_singleton() {
            if let Some(teardown) = &definition.teardown {
                let hook = teardown.clone();
                let handle = exposed.clone();
                singletons.register_disposable(bean_name, Box::new(move || hook(&handle)));
            }
        }
        Ok(exposed)
    }

    fn apply_post_processors_after_initialization(
        &self,
        bean: BeanHandle,
        bean_name: &str,
    ) -> Result<BeanHandle, ResolveErrorKind> {
        let mut current = bean;
        for processor in self.post_processors_snapshot() {
            current = processor.after_initialization(current, bean_name)?;
        }
        Ok(current)
    }

    fn creation_error(bean_name: &str, message: &'static str, err: InstantiateErrorKind) -> ResolveErrorKind {
        CreationError::new(bean_name, message, Some(err.into())).into()
    }

    fn downcast_bean<T: Send + Sync + 'static>(name: &str, handle: BeanHandle) -> Result<Arc<T>, ResolveErrorKind> {
        if handle.downcast_ref::<NullBean>().is_some() {
            return Err(ResolveErrorKind::NoSuchBean { name: name.into() });
        }
        let actual = (*handle).type_id();
        handle.downcast::<T>().map_err(|_| ResolveErrorKind::NotOfRequiredType {
            name: name.into(),
            expected: TypeInfo::of::<T>(),
            actual,
        })
    }

    // ===== prototype creation tracking =====

    fn is_prototype_currently_in_creation(&self, bean_name: &str) -> bool {
        PROTOTYPES_IN_CREATION.with(|prototypes| {
            prototypes
                .borrow()
                .get(&self.inner.id)
                .is_some_and(|names| names.contains(bean_name))
        })
    }

    fn before_prototype_creation(&self, bean_name: &str) {
        PROTOTYPES_IN_CREATION.with(|prototypes| {
            prototypes
                .borrow_mut()
                .entry(self.inner.id)
                .or_default()
                .insert(bean_name.into());
        });
    }

    fn after_prototype_creation(&self, bean_name: &str) {
        PROTOTYPES_IN_CREATION.with(|prototypes| {
            let mut prototypes = prototypes.borrow_mut();
            if let Some(names) = prototypes.get_mut(&self.inner.id) {
                names.remove(bean_name);
                if names.is_empty() {
                    prototypes.remove(&self.inner.id);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use tracing_test::traced_test;

    use super::BeanFactory;
    use crate::{
        any::{handle_of, BeanHandle},
        config::FactoryConfig,
        definition::BeanDefinition,
        errors::{InstantiateErrorKind, ResolveErrorKind},
        post_processing::BeanPostProcessor,
        scope::{Scope, ScopedProducer},
    };

    #[derive(Debug)]
    struct Plain(u32);

    #[test]
    #[traced_test]
    fn test_singleton_identity_across_lookups() {
        let factory = BeanFactory::new();
        factory
            .register_definition("plain", BeanDefinition::singleton(|_| Ok(Plain(7))))
            .unwrap();

        let first = factory.get_bean::<Plain>("plain").unwrap();
        let second = factory.get_bean::<Plain>("plain").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.0, 7);
        assert!(factory.contains_singleton("plain"));
    }

    #[test]
    #[traced_test]
    fn test_prototype_fresh_instances() {
        let factory = BeanFactory::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();
        factory
            .register_definition(
                "proto",
                BeanDefinition::prototype(move |_| {
                    Ok(Plain(counter_clone.fetch_add(1, Ordering::SeqCst) as u32))
                }),
            )
            .unwrap();

        let first = factory.get_bean::<Plain>("proto").unwrap();
        let second = factory.get_bean::<Plain>("proto").unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        // Prototypes are not tracked after return.
        assert!(!factory.contains_singleton("proto"));
    }

    #[test]
    #[traced_test]
    fn test_instance_helper_registers_prebuilt_value() {
        let factory = BeanFactory::new();
        factory
            .register_definition("constant", BeanDefinition::singleton(crate::instantiator::instance(5_i32)))
            .unwrap();
        assert_eq!(*factory.get_bean::<i32>("constant").unwrap(), 5);
    }

    #[test]
    #[traced_test]
    fn test_no_such_bean() {
        let factory = BeanFactory::new();
        let err = factory.get_bean::<Plain>("missing").unwrap_err();
        assert!(matches!(err, ResolveErrorKind::NoSuchBean { .. }));
    }

    #[test]
    #[traced_test]
    fn test_not_of_required_type() {
        let factory = BeanFactory::new();
        factory.register_singleton("plain", handle_of(Plain(1))).unwrap();
        let err = factory.get_bean::<String>("plain").unwrap_err();
        assert!(matches!(err, ResolveErrorKind::NotOfRequiredType { .. }));
    }

    #[test]
    #[traced_test]
    fn test_alias_resolution_in_lookup() {
        let factory = BeanFactory::new();
        factory
            .register_definition("canonical", BeanDefinition::singleton(|_| Ok(Plain(1))))
            .unwrap();
        factory.register_alias("canonical", "alias").unwrap();
        factory.register_alias("alias", "alias-of-alias").unwrap();

        let via_alias = factory.get_bean::<Plain>("alias-of-alias").unwrap();
        let direct = factory.get_bean::<Plain>("canonical").unwrap();
        assert!(Arc::ptr_eq(&via_alias, &direct));
    }

    #[test]
    #[traced_test]
    fn test_parent_delegation() {
        let parent = BeanFactory::new();
        parent
            .register_definition("shared", BeanDefinition::singleton(|_| Ok(Plain(3))))
            .unwrap();

        let child = BeanFactory::new();
        child.set_parent(parent.clone()).unwrap();

        let from_child = child.get_bean::<Plain>("shared").unwrap();
        let from_parent = parent.get_bean::<Plain>("shared").unwrap();
        assert!(Arc::ptr_eq(&from_child, &from_parent));
        assert!(child.contains_bean("shared"));
        assert!(!child.contains_local_bean("shared"));

        let err = child.set_parent(parent).unwrap_err();
        assert!(matches!(err, ResolveErrorKind::IllegalState { .. }));
    }

    #[test]
    #[traced_test]
    fn test_local_definition_shadows_parent() {
        let parent = BeanFactory::new();
        parent
            .register_definition("bean", BeanDefinition::singleton(|_| Ok(Plain(1))))
            .unwrap();
        let child = BeanFactory::new();
        child.set_parent(parent.clone()).unwrap();
        child
            .register_definition("bean", BeanDefinition::singleton(|_| Ok(Plain(2))))
            .unwrap();

        assert_eq!(child.get_bean::<Plain>("bean").unwrap().0, 2);
        assert_eq!(parent.get_bean::<Plain>("bean").unwrap().0, 1);
    }

    #[test]
    #[traced_test]
    fn test_depends_on_creates_dependency_first() {
        let factory = BeanFactory::new();
        let order: Arc<parking_lot::Mutex<Vec<&'static str>>> = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let order_first = order.clone();
        factory
            .register_definition(
                "first",
                BeanDefinition::singleton(move |_| {
                    order_first.lock().push("first");
                    Ok(Plain(1))
                }),
            )
            .unwrap();
        let order_second = order.clone();
        factory
            .register_definition(
                "second",
                BeanDefinition::singleton(move |_| {
                    order_second.lock().push("second");
                    Ok(Plain(2))
                })
                .depends_on(["first"]),
            )
            .unwrap();

        factory.get_bean::<Plain>("second").unwrap();
        assert_eq!(*order.lock(), ["first", "second"]);
        assert_eq!(factory.dependent_beans("first"), ["second"]);
    }

    #[test]
    #[traced_test]
    fn test_circular_depends_on_rejected() {
        let factory = BeanFactory::new();
        factory
            .register_definition("a", BeanDefinition::singleton(|_| Ok(Plain(1))).depends_on(["b"]))
            .unwrap();
        factory
            .register_definition("b", BeanDefinition::singleton(|_| Ok(Plain(2))).depends_on(["a"]))
            .unwrap();

        let err = factory.get_bean::<Plain>("a").unwrap_err();
        assert!(matches!(err, ResolveErrorKind::Creation(_)));
        // The root failure names the circular depends-on relationship.
        assert!(err.to_string().contains("circular depends-on"));
    }

    #[test]
    #[traced_test]
    fn test_post_processors_run_in_order() {
        struct Recording {
            label: &'static str,
            seen: Arc<parking_lot::Mutex<Vec<String>>>,
        }

        impl BeanPostProcessor for Recording {
            fn before_initialization(
                &self,
                bean: BeanHandle,
                name: &str,
            ) -> Result<BeanHandle, InstantiateErrorKind> {
                self.seen.lock().push(format!("{}:before:{name}", self.label));
                Ok(bean)
            }

            fn after_initialization(
                &self,
                bean: BeanHandle,
                name: &str,
            ) -> Result<BeanHandle, InstantiateErrorKind> {
                self.seen.lock().push(format!("{}:after:{name}", self.label));
                Ok(bean)
            }
        }

        let factory = BeanFactory::new();
        let seen: Arc<parking_lot::Mutex<Vec<String>>> = Arc::new(parking_lot::Mutex::new(Vec::new()));
        factory.add_post_processor(Recording {
            label: "one",
            seen: seen.clone(),
        });
        factory.add_post_processor(Recording {
            label: "two",
            seen: seen.clone(),
        });
        assert_eq!(factory.post_processor_count(), 2);

        let seen_init = seen.clone();
        factory
            .register_definition(
                "bean",
                BeanDefinition::singleton(|_| Ok(Plain(0))).init(move |_: &Arc<Plain>| {
                    seen_init.lock().push("init:bean".into());
                    Ok(())
                }),
            )
            .unwrap();
        factory.get_bean::<Plain>("bean").unwrap();

        assert_eq!(
            *seen.lock(),
            [
                "one:before:bean",
                "two:before:bean",
                "init:bean",
                "one:after:bean",
                "two:after:bean"
            ]
        );
    }

    #[test]
    #[traced_test]
    fn test_synthetic_definition_skips_post_processing() {
        struct Failing;
        impl BeanPostProcessor for Failing {
            fn before_initialization(
                &self,
                _bean: BeanHandle,
                name: &str,
            ) -> Result<BeanHandle, InstantiateErrorKind> {
                Err(InstantiateErrorKind::message(format!("must not run for `{name}`")))
            }
        }

        let factory = BeanFactory::new();
        factory.add_post_processor(Failing);
        factory
            .register_definition("bean", BeanDefinition::singleton(|_| Ok(Plain(0))).synthetic())
            .unwrap();
        factory.get_bean::<Plain>("bean").unwrap();
    }

    #[test]
    #[traced_test]
    fn test_custom_scope_dispatch() {
        struct CachingScope {
            cache: parking_lot::Mutex<ahash::AHashMap<String, BeanHandle>>,
        }

        impl Scope for CachingScope {
            fn get(&self, name: &str, producer: ScopedProducer<'_>) -> Result<BeanHandle, ResolveErrorKind> {
                if let Some(cached) = self.cache.lock().get(name) {
                    return Ok(cached.clone());
                }
                let created = producer()?;
                self.cache.lock().insert(name.into(), created.clone());
                Ok(created)
            }

            fn remove(&self, name: &str) -> Option<BeanHandle> {
                self.cache.lock().remove(name)
            }
        }

        let factory = BeanFactory::new();
        factory
            .register_scope(
                "request",
                CachingScope {
                    cache: parking_lot::Mutex::new(ahash::AHashMap::new()),
                },
            )
            .unwrap();
        factory
            .register_definition("scoped", BeanDefinition::scoped("request", |_| Ok(Plain(1))))
            .unwrap();

        let first = factory.get_bean::<Plain>("scoped").unwrap();
        let second = factory.get_bean::<Plain>("scoped").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        // The singleton registry is not involved.
        assert!(!factory.contains_singleton("scoped"));

        assert_eq!(factory.registered_scope_names(), ["request"]);
    }

    #[test]
    #[traced_test]
    fn test_reserved_scope_identifiers_rejected() {
        struct Dummy;
        impl Scope for Dummy {
            fn get(&self, _name: &str, producer: ScopedProducer<'_>) -> Result<BeanHandle, ResolveErrorKind> {
                producer()
            }
            fn remove(&self, _name: &str) -> Option<BeanHandle> {
                None
            }
        }

        let factory = BeanFactory::new();
        for reserved in ["singleton", "prototype"] {
            let err = factory.register_scope(reserved, Dummy).unwrap_err();
            assert!(matches!(err, ResolveErrorKind::IllegalState { .. }));
        }
    }

    #[test]
    #[traced_test]
    fn test_unknown_scope_fails() {
        let factory = BeanFactory::new();
        factory
            .register_definition("scoped", BeanDefinition::scoped("request", |_| Ok(Plain(1))))
            .unwrap();
        let err = factory.get_bean::<Plain>("scoped").unwrap_err();
        assert!(matches!(err, ResolveErrorKind::IllegalState { .. }));
    }

    #[test]
    #[traced_test]
    fn test_get_bean_with_args() {
        let factory = BeanFactory::new();
        factory
            .register_definition(
                "configured",
                BeanDefinition::prototype_with_args(|_, args: &[BeanHandle]| {
                    let seed = args
                        .first()
                        .and_then(|arg| arg.downcast_ref::<u32>())
                        .copied()
                        .unwrap_or(0);
                    Ok(Plain(seed))
                }),
            )
            .unwrap();

        let bean = factory
            .get_bean_with_args::<Plain>("configured", &[handle_of(41_u32)])
            .unwrap();
        assert_eq!(bean.0, 41);
    }

    #[test]
    #[traced_test]
    fn test_by_type_lookup_and_primary_tiebreak() {
        let factory = BeanFactory::new();
        factory
            .register_definition("only", BeanDefinition::singleton(|_| Ok(Plain(5))))
            .unwrap();
        assert_eq!(factory.get_bean_by_type::<Plain>().unwrap().0, 5);

        struct Other(#[allow(dead_code)] u8);
        factory
            .register_definition("first", BeanDefinition::singleton(|_| Ok(Other(1))))
            .unwrap();
        factory
            .register_definition("second", BeanDefinition::singleton(|_| Ok(Other(2))).primary())
            .unwrap();
        let names = factory.names_for_type::<Other>();
        assert_eq!(names, ["first", "second"]);
        // Two candidates, one primary.
        factory.get_bean_by_type::<Other>().unwrap();

        #[derive(Debug)]
        struct Third;
        let err = factory.get_bean_by_type::<Third>().unwrap_err();
        assert!(matches!(err, ResolveErrorKind::NoSuchBean { .. }));
    }

    #[test]
    #[traced_test]
    fn test_by_type_ambiguity() {
        let factory = BeanFactory::new();
        factory
            .register_definition("first", BeanDefinition::singleton(|_| Ok(Plain(1))))
            .unwrap();
        factory
            .register_definition("second", BeanDefinition::singleton(|_| Ok(Plain(2))))
            .unwrap();

        let err = factory.get_bean_by_type::<Plain>().unwrap_err();
        let ResolveErrorKind::NoUniqueBean { candidates, .. } = err else {
            panic!("expected no-unique-bean");
        };
        assert_eq!(candidates, ["first", "second"]);
    }

    #[test]
    #[traced_test]
    fn test_predicates() {
        let factory = BeanFactory::new();
        factory
            .register_definition("single", BeanDefinition::singleton(|_| Ok(Plain(1))))
            .unwrap();
        factory
            .register_definition("proto", BeanDefinition::prototype(|_| Ok(Plain(2))))
            .unwrap();

        assert!(factory.is_singleton("single").unwrap());
        assert!(!factory.is_prototype("single").unwrap());
        assert!(factory.is_prototype("proto").unwrap());
        assert!(!factory.is_singleton("proto").unwrap());
        assert!(factory.is_type_match::<Plain>("single").unwrap());
        assert!(!factory.is_type_match::<String>("single").unwrap());
        assert_eq!(
            factory.get_type("single").unwrap().map(|info| info.id),
            Some(std::any::TypeId::of::<Plain>())
        );
        assert!(matches!(
            factory.is_singleton("missing").unwrap_err(),
            ResolveErrorKind::NoSuchBean { .. }
        ));
        assert!(factory.is_name_in_use("single"));
        assert!(!factory.is_name_in_use("missing"));
    }

    #[test]
    #[traced_test]
    fn test_pre_instantiate_singletons_honors_lazy() {
        let factory = BeanFactory::new();
        factory
            .register_definition("eager", BeanDefinition::singleton(|_| Ok(Plain(1))))
            .unwrap();
        factory
            .register_definition("lazy", BeanDefinition::singleton(|_| Ok(Plain(2))).lazy())
            .unwrap();
        factory
            .register_definition("proto", BeanDefinition::prototype(|_| Ok(Plain(3))))
            .unwrap();

        factory.pre_instantiate_singletons().unwrap();
        assert!(factory.contains_singleton("eager"));
        assert!(!factory.contains_singleton("lazy"));
        assert!(!factory.contains_singleton("proto"));
    }

    #[test]
    #[traced_test]
    fn test_embedded_value_resolver_chain() {
        let factory = BeanFactory::new();
        factory.add_embedded_value_resolver(|value: &str| value.replace("${name}", "beans"));
        factory.add_embedded_value_resolver(|value: &str| value.to_uppercase());
        assert_eq!(factory.resolve_embedded_value("hello ${name}"), "HELLO BEANS");
    }

    #[test]
    #[traced_test]
    fn test_circular_references_disabled() {
        let factory = BeanFactory::with_config(FactoryConfig {
            allow_circular_references: false,
            ..FactoryConfig::default()
        });

        factory
            .register_definition(
                "a",
                BeanDefinition::singleton(|_| Ok(Plain(0))).populate(|factory, _: &Arc<Plain>| {
                    factory.get_bean::<Plain>("b")?;
                    Ok(())
                }),
            )
            .unwrap();
        factory
            .register_definition(
                "b",
                BeanDefinition::singleton(|_| Ok(Plain(0))).populate(|factory, _: &Arc<Plain>| {
                    factory.get_bean::<Plain>("a")?;
                    Ok(())
                }),
            )
            .unwrap();

        let err = factory.get_bean::<Plain>("a").unwrap_err();
        assert!(err.is_circular());
    }

    #[test]
    #[traced_test]
    fn test_creation_failure_scrubs_state() {
        let factory = BeanFactory::new();
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = attempts.clone();
        factory
            .register_definition(
                "flaky",
                BeanDefinition::singleton(move |_| {
                    if attempts_clone.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(InstantiateErrorKind::message("first attempt fails"))
                    } else {
                        Ok(Plain(1))
                    }
                }),
            )
            .unwrap();

        let err = factory.get_bean::<Plain>("flaky").unwrap_err();
        assert!(matches!(err, ResolveErrorKind::Creation(_)));
        assert!(!factory.contains_singleton("flaky"));
        assert!(!factory.singletons().is_singleton_currently_in_creation("flaky"));

        // A later lookup starts a fresh creation.
        assert_eq!(factory.get_bean::<Plain>("flaky").unwrap().0, 1);
    }
}
