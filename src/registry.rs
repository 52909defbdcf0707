use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use ahash::AHashMap;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::{definition::BeanDefinition, errors::DefinitionErrorKind};

/// Registry of bean definitions, keyed by canonical name.
///
/// Registration order is preserved: it drives eager bootstrapping and, via
/// the singleton registry, teardown order. Once frozen the registry rejects
/// every mutation.
pub struct DefinitionRegistry {
    allow_overriding: bool,
    frozen: AtomicBool,
    entries: RwLock<AHashMap<String, Arc<BeanDefinition>>>,
    order: Mutex<Vec<String>>,
}

impl DefinitionRegistry {
    #[must_use]
    pub fn new(allow_overriding: bool) -> Self {
        Self {
            allow_overriding,
            frozen: AtomicBool::new(false),
            entries: RwLock::new(AHashMap::new()),
            order: Mutex::new(Vec::new()),
        }
    }

    /// # Errors
    /// - [`DefinitionErrorKind::EmptyName`] for an empty bean name
    /// - [`DefinitionErrorKind::Frozen`] after [`Self::freeze`]
    /// - [`DefinitionErrorKind::Duplicate`] if the name is taken and
    ///   overriding is disallowed
    pub fn register(&self, name: impl Into<String>, definition: BeanDefinition) -> Result<(), DefinitionErrorKind> {
        let name = name.into();
        if name.is_empty() {
            return Err(DefinitionErrorKind::EmptyName);
        }
        if self.is_frozen() {
            return Err(DefinitionErrorKind::Frozen { name });
        }

        let mut entries = self.entries.write();
        if entries.contains_key(&name) {
            if !self.allow_overriding {
                return Err(DefinitionErrorKind::Duplicate { name });
            }
            debug!(bean = %name, "Overriding bean definition");
        } else {
            self.order.lock().push(name.clone());
        }
        entries.insert(name, Arc::new(definition));
        Ok(())
    }

    /// # Errors
    /// - [`DefinitionErrorKind::Frozen`] after [`Self::freeze`]
    /// - [`DefinitionErrorKind::Missing`] if the name is unknown
    pub fn remove(&self, name: &str) -> Result<(), DefinitionErrorKind> {
        if self.is_frozen() {
            return Err(DefinitionErrorKind::Frozen { name: name.into() });
        }
        if self.entries.write().remove(name).is_none() {
            return Err(DefinitionErrorKind::Missing { name: name.into() });
        }
        self.order.lock().retain(|registered| registered != name);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<BeanDefinition>> {
        self.entries.read().get(name).cloned()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    /// Definition names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.order.lock().clone()
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.entries.read().len()
    }

    /// Freezes the registry: definitions become immutable.
    pub fn freeze(&self) {
        self.frozen.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use tracing_test::traced_test;

    use super::DefinitionRegistry;
    use crate::{definition::BeanDefinition, errors::DefinitionErrorKind};

    fn definition() -> BeanDefinition {
        BeanDefinition::singleton(|_| Ok(0_i32))
    }

    #[test]
    #[traced_test]
    fn test_register_and_lookup() {
        let registry = DefinitionRegistry::new(false);
        registry.register("a", definition()).unwrap();
        registry.register("b", definition()).unwrap();

        assert!(registry.contains("a"));
        assert_eq!(registry.count(), 2);
        assert_eq!(registry.names(), ["a", "b"]);
        assert!(registry.get("a").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    #[traced_test]
    fn test_duplicate_rejected_without_overriding() {
        let registry = DefinitionRegistry::new(false);
        registry.register("a", definition()).unwrap();
        let err = registry.register("a", definition()).unwrap_err();
        assert!(matches!(err, DefinitionErrorKind::Duplicate { .. }));
    }

    #[test]
    #[traced_test]
    fn test_overriding_keeps_registration_order() {
        let registry = DefinitionRegistry::new(true);
        registry.register("a", definition()).unwrap();
        registry.register("b", definition()).unwrap();
        registry.register("a", definition()).unwrap();
        assert_eq!(registry.names(), ["a", "b"]);
        assert_eq!(registry.count(), 2);
    }

    #[test]
    #[traced_test]
    fn test_frozen_rejects_mutation() {
        let registry = DefinitionRegistry::new(true);
        registry.register("a", definition()).unwrap();
        registry.freeze();

        assert!(matches!(
            registry.register("b", definition()).unwrap_err(),
            DefinitionErrorKind::Frozen { .. }
        ));
        assert!(matches!(registry.remove("a").unwrap_err(), DefinitionErrorKind::Frozen { .. }));
        assert!(registry.contains("a"));
    }

    #[test]
    #[traced_test]
    fn test_empty_name_rejected() {
        let registry = DefinitionRegistry::new(true);
        let err = registry.register("", definition()).unwrap_err();
        assert!(matches!(err, DefinitionErrorKind::EmptyName));
    }

    #[test]
    #[traced_test]
    fn test_remove() {
        let registry = DefinitionRegistry::new(true);
        registry.register("a", definition()).unwrap();
        registry.remove("a").unwrap();
        assert!(!registry.contains("a"));
        assert!(registry.names().is_empty());
        assert!(matches!(
            registry.remove("a").unwrap_err(),
            DefinitionErrorKind::Missing { .. }
        ));
    }
}
