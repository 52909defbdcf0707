use std::sync::{
    atomic::{AtomicU8, AtomicUsize, Ordering},
    Arc, Mutex, OnceLock,
};

use beanery::{
    handle_of, BeanDefinition, BeanFactory, BeanHandle, BoxedFactoryBean, FactoryBean, InstantiateErrorKind,
};

struct Engine {
    transmission: OnceLock<Arc<Transmission>>,
}

struct Transmission {
    engine: OnceLock<Arc<Engine>>,
}

#[test]
fn circular_singletons_resolve_through_early_references() {
    let factory = BeanFactory::new();
    factory
        .register_definition(
            "engine",
            BeanDefinition::singleton(|_| {
                Ok(Engine {
                    transmission: OnceLock::new(),
                })
            })
            .populate(|factory: &BeanFactory, engine: &Arc<Engine>| {
                let transmission = factory.resolve_dependency::<Transmission>("transmission", "engine")?;
                let _ = engine.transmission.set(transmission);
                Ok(())
            }),
        )
        .unwrap();
    factory
        .register_definition(
            "transmission",
            BeanDefinition::singleton(|_| {
                Ok(Transmission {
                    engine: OnceLock::new(),
                })
            })
            .populate(|factory: &BeanFactory, transmission: &Arc<Transmission>| {
                let engine = factory.resolve_dependency::<Engine>("engine", "transmission")?;
                let _ = transmission.engine.set(engine);
                Ok(())
            }),
        )
        .unwrap();

    let engine = factory.get_bean::<Engine>("engine").unwrap();
    let transmission = factory.get_bean::<Transmission>("transmission").unwrap();

    // Both sides observe the exact objects the factory hands out.
    assert!(Arc::ptr_eq(engine.transmission.get().unwrap(), &transmission));
    assert!(Arc::ptr_eq(transmission.engine.get().unwrap(), &engine));

    let singletons = factory.singletons();
    assert!(!singletons.is_singleton_currently_in_creation("engine"));
    assert!(!singletons.is_singleton_currently_in_creation("transmission"));
}

#[derive(Debug)]
struct Ping;
struct Pong;

#[test]
fn circular_prototypes_fail_with_clean_state() {
    let factory = BeanFactory::new();
    factory
        .register_definition(
            "ping",
            BeanDefinition::prototype(|factory: &BeanFactory| {
                let _pong = factory.get_bean::<Pong>("pong")?;
                Ok(Ping)
            }),
        )
        .unwrap();
    factory
        .register_definition(
            "pong",
            BeanDefinition::prototype(|factory: &BeanFactory| {
                let _ping = factory.get_bean::<Ping>("ping")?;
                Ok(Pong)
            }),
        )
        .unwrap();

    let err = factory.get_bean::<Ping>("ping").unwrap_err();
    assert!(err.is_circular(), "expected a circularity failure, got: {err}");

    // The failure left no in-creation state behind: a non-circular
    // prototype lookup still works on this thread.
    factory
        .register_definition("standalone", BeanDefinition::prototype(|_| Ok(Ping)))
        .unwrap();
    factory.get_bean::<Ping>("standalone").unwrap();
}

#[test]
fn alias_chains_resolve_transitively() {
    let factory = BeanFactory::new();
    factory
        .register_definition("canonical", BeanDefinition::singleton(|_| Ok(42_u32)))
        .unwrap();
    factory.register_alias("canonical", "a1").unwrap();
    factory.register_alias("a1", "a2").unwrap();

    assert_eq!(factory.canonical_name("a2"), "canonical");
    let mut aliases = factory.get_aliases("canonical");
    aliases.sort();
    assert_eq!(aliases, ["a1", "a2"]);

    let direct = factory.get_bean::<u32>("canonical").unwrap();
    let via_alias = factory.get_bean::<u32>("a2").unwrap();
    assert!(Arc::ptr_eq(&direct, &via_alias));
}

#[derive(Debug)]
struct Tracked;

fn tracked_definition(
    counter: &Arc<AtomicU8>,
    position: &Arc<AtomicU8>,
) -> BeanDefinition {
    let counter = counter.clone();
    let position = position.clone();
    BeanDefinition::singleton(|_| Ok(Tracked)).teardown(move |_: Arc<Tracked>| {
        position.store(counter.fetch_add(1, Ordering::SeqCst) + 1, Ordering::SeqCst);
    })
}

#[test]
fn destruction_runs_in_reverse_order_with_dependents_first() {
    let factory = BeanFactory::new();
    let counter = Arc::new(AtomicU8::new(0));
    let position_x = Arc::new(AtomicU8::new(0));
    let position_y = Arc::new(AtomicU8::new(0));
    let position_z = Arc::new(AtomicU8::new(0));

    factory.register_definition("x", tracked_definition(&counter, &position_x)).unwrap();
    factory.register_definition("y", tracked_definition(&counter, &position_y)).unwrap();
    factory.register_definition("z", tracked_definition(&counter, &position_z)).unwrap();

    for name in ["x", "y", "z"] {
        factory.get_bean::<Tracked>(name).unwrap();
    }
    factory.register_dependent_bean("x", "y");

    factory.destroy_singletons();

    assert_eq!(position_z.load(Ordering::SeqCst), 1);
    assert_eq!(position_y.load(Ordering::SeqCst), 2);
    assert_eq!(position_x.load(Ordering::SeqCst), 3);
    assert_eq!(factory.singleton_count(), 0);
}

#[test]
fn destruction_runs_on_drop() {
    let destroyed = Arc::new(AtomicUsize::new(0));
    {
        let factory = BeanFactory::new();
        let destroyed = destroyed.clone();
        factory
            .register_definition(
                "tracked",
                BeanDefinition::singleton(|_| Ok(Tracked)).teardown(move |_: Arc<Tracked>| {
                    destroyed.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
        factory.get_bean::<Tracked>("tracked").unwrap();
    }
    assert_eq!(destroyed.load(Ordering::SeqCst), 1);
}

#[test]
fn contained_beans_die_with_their_outer_bean() {
    let factory = BeanFactory::new();
    let destroyed: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    for name in ["inner", "outer"] {
        let destroyed = destroyed.clone();
        factory
            .register_definition(
                name,
                BeanDefinition::singleton(|_| Ok(Tracked))
                    .teardown(move |_: Arc<Tracked>| destroyed.lock().unwrap().push(name)),
            )
            .unwrap();
        factory.get_bean::<Tracked>(name).unwrap();
    }
    factory.register_contained_bean("inner", "outer");

    factory.destroy_singleton("inner");

    assert_eq!(*destroyed.lock().unwrap(), ["outer", "inner"]);
}

struct Connection;

struct ConnectionFactory;

impl FactoryBean for ConnectionFactory {
    fn produce(&self) -> Result<Option<BeanHandle>, InstantiateErrorKind> {
        Ok(Some(handle_of(Connection)))
    }
}

#[test]
fn factory_bean_products_and_factories_are_cached_separately() {
    let factory = BeanFactory::new();
    factory
        .register_definition(
            "connection",
            BeanDefinition::factory_bean(|_| Ok(ConnectionFactory)).product_type::<Connection>(),
        )
        .unwrap();

    let product_one = factory.get_bean::<Connection>("connection").unwrap();
    let product_two = factory.get_bean::<Connection>("connection").unwrap();
    assert!(Arc::ptr_eq(&product_one, &product_two));

    let factory_one = factory.get_bean_handle("&connection").unwrap();
    let factory_two = factory.get_bean_handle("&connection").unwrap();
    assert!(Arc::ptr_eq(&factory_one, &factory_two));
    assert!(factory_one.downcast_ref::<BoxedFactoryBean>().is_some());

    // The product is not the factory bean.
    let product_handle = factory.get_bean_handle("connection").unwrap();
    assert!(!Arc::ptr_eq(&product_handle, &factory_one));
    assert!(product_handle.downcast_ref::<Connection>().is_some());

    assert!(factory.is_singleton("connection").unwrap());
    assert!(factory.is_type_match::<Connection>("connection").unwrap());
    assert!(factory.is_type_match::<BoxedFactoryBean>("&connection").unwrap());
}

#[derive(Debug)]
struct Nothing;

struct EmptyFactory;

impl FactoryBean for EmptyFactory {
    fn produce(&self) -> Result<Option<BeanHandle>, InstantiateErrorKind> {
        Ok(None)
    }
}

#[test]
fn factory_bean_without_product_yields_no_such_bean() {
    let factory = BeanFactory::new();
    factory
        .register_definition("empty", BeanDefinition::factory_bean(|_| Ok(EmptyFactory)))
        .unwrap();

    let err = factory.get_bean::<Nothing>("empty").unwrap_err();
    assert!(matches!(err, beanery::ResolveErrorKind::NoSuchBean { .. }));
}

#[test]
fn frozen_configuration_rejects_new_definitions() {
    let factory = BeanFactory::new();
    factory
        .register_definition("bean", BeanDefinition::singleton(|_| Ok(Tracked)))
        .unwrap();
    factory.freeze_configuration();
    assert!(factory.is_configuration_frozen());

    let err = factory
        .register_definition("late", BeanDefinition::singleton(|_| Ok(Tracked)))
        .unwrap_err();
    assert!(matches!(err, beanery::DefinitionErrorKind::Frozen { .. }));

    // Frozen definitions stay resolvable.
    factory.get_bean::<Tracked>("bean").unwrap();
}

#[test]
fn lookup_from_teardown_is_rejected() {
    let factory = BeanFactory::new();
    let observed: Arc<Mutex<Option<beanery::ResolveErrorKind>>> = Arc::new(Mutex::new(None));

    let observed_clone = observed.clone();
    let lookup = factory.clone();
    factory
        .register_definition(
            "tracked",
            BeanDefinition::singleton(|_| Ok(Tracked)).teardown(move |_: Arc<Tracked>| {
                let err = lookup.get_bean::<Tracked>("other").unwrap_err();
                *observed_clone.lock().unwrap() = Some(err);
            }),
        )
        .unwrap();
    factory
        .register_definition("other", BeanDefinition::singleton(|_| Ok(Tracked)))
        .unwrap();
    factory.get_bean::<Tracked>("tracked").unwrap();

    factory.destroy_singletons();

    let err = observed.lock().unwrap().take().unwrap();
    assert!(matches!(err, beanery::ResolveErrorKind::CreationNotAllowed { .. }));
}
