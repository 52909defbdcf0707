//! # beanery
//!
//! Hierarchical named-bean container: a singleton registry and bean lifecycle
//! engine with at-most-one instance per name under concurrent lookup, staged
//! early exposure for resolving circular references, dependency-ordered
//! teardown, aliases, factory-bean indirection and a pluggable
//! post-processing pipeline.
//!
//! ```rust
//! use beanery::{BeanDefinition, BeanFactory};
//! use std::sync::Arc;
//!
//! struct Database {
//!     url: String,
//! }
//!
//! struct UserService {
//!     db: Arc<Database>,
//! }
//!
//! let factory = BeanFactory::new();
//! factory
//!     .register_definition(
//!         "database",
//!         BeanDefinition::singleton(|_| {
//!             Ok(Database { url: "postgres://localhost".into() })
//!         }),
//!     )
//!     .unwrap();
//! factory
//!     .register_definition(
//!         "user-service",
//!         BeanDefinition::singleton(|factory: &BeanFactory| {
//!             Ok(UserService {
//!                 db: factory.resolve_dependency("database", "user-service")?,
//!             })
//!         }),
//!     )
//!     .unwrap();
//!
//! let service = factory.get_bean::<UserService>("user-service").unwrap();
//! assert_eq!(service.db.url, "postgres://localhost");
//! ```

pub(crate) mod alias;
pub(crate) mod any;
pub(crate) mod config;
pub(crate) mod definition;
pub(crate) mod errors;
pub(crate) mod factory;
pub(crate) mod factory_bean;
pub(crate) mod instantiator;
pub(crate) mod post_processing;
pub(crate) mod registry;
pub(crate) mod scope;
pub(crate) mod singleton;

pub use alias::AliasRegistry;
pub use any::{handle_of, BeanHandle, TypeInfo};
pub use config::FactoryConfig;
pub use definition::{BeanDefinition, BeanScope};
pub use errors::{AliasErrorKind, CreationError, DefinitionErrorKind, InstantiateErrorKind, ResolveErrorKind};
pub use factory::{BeanFactory, FACTORY_BEAN_PREFIX};
pub use factory_bean::{BoxedFactoryBean, FactoryBean, FactoryBeanRegistry, NullBean};
pub use instantiator::instance;
pub use post_processing::BeanPostProcessor;
pub use registry::DefinitionRegistry;
pub use scope::{Scope, ScopedProducer, PROTOTYPE_SCOPE, SINGLETON_SCOPE};
pub use singleton::{SingletonGuard, SingletonLock, SingletonRegistry};
