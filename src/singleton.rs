use std::{
    cell::{Ref, RefCell, RefMut},
    collections::BTreeMap,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
};

use ahash::{AHashMap, AHashSet};
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard, RwLock};
use tracing::{debug, trace, warn};

use crate::{
    alias::AliasRegistry,
    any::BeanHandle,
    errors::{ResolveErrorKind, SUPPRESSED_EXCEPTIONS_LIMIT},
    instantiator::{BoxedDisposer, BoxedEarlyProducer},
};

/// State that only mutates while the singleton lock is held: the early and
/// producer tiers, the suppressed-exception buffer of the active creation
/// frame and the destruction flag.
#[derive(Default)]
struct LockedState {
    early: AHashMap<String, BeanHandle>,
    producers: AHashMap<String, BoxedEarlyProducer>,
    suppressed: Option<Vec<ResolveErrorKind>>,
    in_destruction: bool,
}

/// The singleton lock: serializes creation, cache mutation and the
/// in-creation set across the whole registry.
///
/// The lock is reentrant. It is held across user factories, and dependency
/// resolution re-enters it on the same thread; a second thread blocks until
/// the outermost creation frame completes, so creation is serialized
/// globally.
///
/// Collaborators that need compound operations atomic with creation acquire
/// this same handle through [`SingletonRegistry::singleton_mutex`].
pub struct SingletonLock {
    state: ReentrantMutex<RefCell<LockedState>>,
}

impl SingletonLock {
    fn new() -> Self {
        Self {
            state: ReentrantMutex::new(RefCell::new(LockedState::default())),
        }
    }

    pub fn lock(&self) -> SingletonGuard<'_> {
        SingletonGuard {
            guard: self.state.lock(),
        }
    }
}

pub struct SingletonGuard<'a> {
    guard: ReentrantMutexGuard<'a, RefCell<LockedState>>,
}

impl SingletonGuard<'_> {
    fn state(&self) -> Ref<'_, LockedState> {
        self.guard.borrow()
    }

    fn state_mut(&self) -> RefMut<'_, LockedState> {
        self.guard.borrow_mut()
    }
}

/// Registry of shared singleton instances, keyed by canonical bean name.
///
/// Combines the three-tier cache (complete instances, early references,
/// deferred early-reference producers), creation-in-progress tracking, and
/// the dependency, containment and disposable bookkeeping that drives ordered
/// teardown.
///
/// The primary cache and the in-creation set are readable without the
/// singleton lock; every mutation of them happens while it is held. Auxiliary
/// maps use independent mutexes, acquired only while the singleton lock is
/// already held or alone - never the other way around.
pub struct SingletonRegistry {
    aliases: Arc<AliasRegistry>,
    lock: SingletonLock,
    /// Tier one: canonical name to fully-initialized instance.
    primary: RwLock<AHashMap<String, BeanHandle>>,
    /// Names that entered creation, in insertion order.
    registered_names: Mutex<Vec<String>>,
    in_creation: RwLock<AHashSet<String>>,
    in_creation_exclusions: RwLock<AHashSet<String>>,
    /// Disposable records in registration order; destruction walks it in
    /// reverse.
    disposables: Mutex<Vec<(String, BoxedDisposer)>>,
    /// Outer bean name to the inner beans it contains.
    contained: Mutex<BTreeMap<String, Vec<String>>>,
    /// Bean name to the beans depending on it.
    dependents: Mutex<BTreeMap<String, Vec<String>>>,
    /// Bean name to the beans it depends on.
    dependencies: Mutex<BTreeMap<String, Vec<String>>>,
    /// Notified after a name is scrubbed from the caches, so that extensions
    /// holding derived caches can purge their entries.
    remove_listener: OnceCell<Box<dyn Fn(&str) + Send + Sync>>,
}

impl SingletonRegistry {
    #[must_use]
    pub fn new(aliases: Arc<AliasRegistry>) -> Self {
        Self {
            aliases,
            lock: SingletonLock::new(),
            primary: RwLock::new(AHashMap::new()),
            registered_names: Mutex::new(Vec::new()),
            in_creation: RwLock::new(AHashSet::new()),
            in_creation_exclusions: RwLock::new(AHashSet::new()),
            disposables: Mutex::new(Vec::new()),
            contained: Mutex::new(BTreeMap::new()),
            dependents: Mutex::new(BTreeMap::new()),
            dependencies: Mutex::new(BTreeMap::new()),
            remove_listener: OnceCell::new(),
        }
    }

    /// The singleton lock handle shared by the engine and its collaborators.
    #[inline]
    #[must_use]
    pub fn singleton_mutex(&self) -> &SingletonLock {
        &self.lock
    }

    pub(crate) fn set_remove_listener(&self, listener: Box<dyn Fn(&str) + Send + Sync>) {
        if self.remove_listener.set(listener).is_err() {
            warn!("Singleton remove listener already installed, keeping the existing one");
        }
    }

    /// Registers a fully-initialized instance under `name`.
    ///
    /// # Errors
    /// Returns [`ResolveErrorKind::IllegalState`] if the name is empty or an
    /// instance is already bound under it.
    pub fn register_singleton(&self, name: &str, instance: BeanHandle) -> Result<(), ResolveErrorKind> {
        if name.is_empty() {
            return Err(ResolveErrorKind::illegal_state("Bean name must not be empty"));
        }
        let guard = self.lock.lock();
        if self.primary.read().contains_key(name) {
            return Err(ResolveErrorKind::illegal_state(format!(
                "Could not register singleton `{name}`: there is already an instance bound under that name"
            )));
        }
        self.add_singleton_locked(&guard, name, instance)
    }

    /// Returns the instance registered under `name`, allowing early
    /// references of singletons currently in creation.
    #[must_use]
    pub fn get_singleton(&self, name: &str) -> Option<BeanHandle> {
        self.get_singleton_allowing_early(name, true)
    }

    /// Three-tier lookup.
    ///
    /// The fast path reads the primary cache without the singleton lock; only
    /// a name currently in creation takes the lock to consult the early tier
    /// and, when `allow_early` is set, to materialize the early reference by
    /// consuming the registered producer exactly once.
    #[must_use]
    pub fn get_singleton_allowing_early(&self, name: &str, allow_early: bool) -> Option<BeanHandle> {
        if let Some(instance) = self.primary.read().get(name) {
            return Some(instance.clone());
        }
        if !self.is_singleton_currently_in_creation(name) {
            return None;
        }

        let guard = self.lock.lock();
        // Re-check under the full lock: the creation may have completed, or a
        // reentrant frame may have stabilized the early reference meanwhile.
        if let Some(instance) = self.primary.read().get(name) {
            return Some(instance.clone());
        }
        if let Some(early) = guard.state().early.get(name) {
            return Some(early.clone());
        }
        if !allow_early {
            return None;
        }
        let producer = guard.state_mut().producers.remove(name)?;
        // No borrow is held across the producer call: it runs user-supplied
        // early-reference hooks.
        let early = producer();
        guard.state_mut().early.insert(name.into(), early.clone());
        Some(early)
    }

    /// Returns the instance registered under `name`, creating and registering
    /// it through `factory` if absent.
    ///
    /// Serialized on the singleton lock for the whole creation, including the
    /// factory call.
    ///
    /// # Errors
    /// - [`ResolveErrorKind::CreationNotAllowed`] while destruction runs
    /// - [`ResolveErrorKind::CurrentlyInCreation`] if `name` is already being
    ///   created (an unresolvable cycle)
    /// - factory failures, with the frame's suppressed exceptions attached to
    ///   a [`ResolveErrorKind::Creation`]
    pub fn get_singleton_or_create(
        &self,
        name: &str,
        factory: impl FnOnce() -> Result<BeanHandle, ResolveErrorKind>,
    ) -> Result<BeanHandle, ResolveErrorKind> {
        let guard = self.lock.lock();
        if let Some(existing) = self.primary.read().get(name) {
            return Ok(existing.clone());
        }
        if guard.state().in_destruction {
            return Err(ResolveErrorKind::CreationNotAllowed { name: name.into() });
        }
        debug!(bean = name, "Creating shared instance of singleton bean");
        self.before_singleton_creation(name)?;
        let records_suppressed = {
            let mut state = guard.state_mut();
            if state.suppressed.is_none() {
                state.suppressed = Some(Vec::new());
                true
            } else {
                false
            }
        };

        let produced = factory();

        let outcome = match produced {
            Ok(instance) => Ok((instance, true)),
            Err(err @ ResolveErrorKind::IllegalState { .. }) => {
                // The singleton may have implicitly appeared in the meantime
                // through a reentrant frame; if so, proceed with it.
                match self.primary.read().get(name) {
                    Some(existing) => Ok((existing.clone(), false)),
                    None => Err(err),
                }
            }
            Err(ResolveErrorKind::Creation(mut creation)) => {
                if records_suppressed {
                    if let Some(suppressed) = guard.state_mut().suppressed.take() {
                        creation.suppressed = suppressed;
                    }
                }
                Err(ResolveErrorKind::Creation(creation))
            }
            Err(other) => Err(other),
        };

        if records_suppressed {
            guard.state_mut().suppressed = None;
        }
        self.after_singleton_creation(name);

        match outcome {
            Ok((instance, newly_created)) => {
                if newly_created {
                    self.add_singleton_locked(&guard, name, instance.clone())?;
                }
                Ok(instance)
            }
            Err(err) => Err(err),
        }
    }

    /// Records an exception suppressed during the active creation frame.
    /// At most [`SUPPRESSED_EXCEPTIONS_LIMIT`] entries are retained; further
    /// ones are dropped silently. Outside a creation frame this is a no-op.
    pub fn on_suppressed(&self, err: ResolveErrorKind) {
        let guard = self.lock.lock();
        let mut state = guard.state_mut();
        if let Some(suppressed) = &mut state.suppressed {
            if suppressed.len() < SUPPRESSED_EXCEPTIONS_LIMIT {
                suppressed.push(err);
            }
        }
    }

    /// Puts a completed instance into the primary cache, clearing the early
    /// tiers for the name.
    ///
    /// # Errors
    /// Returns [`ResolveErrorKind::IllegalState`] if the primary cache
    /// already holds the name - completed singletons are never replaced
    /// silently.
    pub(crate) fn add_singleton(&self, name: &str, instance: BeanHandle) -> Result<(), ResolveErrorKind> {
        let guard = self.lock.lock();
        self.add_singleton_locked(&guard, name, instance)
    }

    fn add_singleton_locked(
        &self,
        guard: &SingletonGuard<'_>,
        name: &str,
        instance: BeanHandle,
    ) -> Result<(), ResolveErrorKind> {
        {
            let mut primary = self.primary.write();
            if primary.contains_key(name) {
                return Err(ResolveErrorKind::illegal_state(format!(
                    "Could not complete singleton `{name}`: there is already an instance bound under that name"
                )));
            }
            primary.insert(name.into(), instance);
        }
        {
            let mut state = guard.state_mut();
            state.early.remove(name);
            state.producers.remove(name);
        }
        let mut names = self.registered_names.lock();
        if !names.iter().any(|registered| registered == name) {
            names.push(name.into());
        }
        Ok(())
    }

    /// Registers the deferred producer of `name`'s early reference.
    /// Only meaningful while `name` is in creation; a no-op once the primary
    /// cache holds the name.
    pub(crate) fn add_singleton_producer(&self, name: &str, producer: BoxedEarlyProducer) {
        let guard = self.lock.lock();
        if self.primary.read().contains_key(name) {
            return;
        }
        {
            let mut state = guard.state_mut();
            state.producers.insert(name.into(), producer);
            state.early.remove(name);
        }
        let mut names = self.registered_names.lock();
        if !names.iter().any(|registered| registered == name) {
            names.push(name.into());
        }
    }

    /// Scrubs `name` from all three tiers and the registered-name order.
    /// Used on the cleanup path when a creation fails before completion.
    pub(crate) fn remove_singleton(&self, name: &str) {
        let guard = self.lock.lock();
        self.primary.write().remove(name);
        {
            let mut state = guard.state_mut();
            state.early.remove(name);
            state.producers.remove(name);
        }
        self.registered_names.lock().retain(|registered| registered != name);
        if let Some(listener) = self.remove_listener.get() {
            listener(name);
        }
    }

    #[must_use]
    pub fn contains_singleton(&self, name: &str) -> bool {
        self.primary.read().contains_key(name)
    }

    /// Names that entered creation, in insertion order.
    #[must_use]
    pub fn singleton_names(&self) -> Vec<String> {
        self.registered_names.lock().clone()
    }

    #[must_use]
    pub fn singleton_count(&self) -> usize {
        self.registered_names.lock().len()
    }

    /// Overrides the in-creation status of `name` for cycle checks.
    /// `in_creation = false` excludes the name from creation tracking.
    pub fn set_currently_in_creation(&self, name: &str, in_creation: bool) {
        if in_creation {
            self.in_creation_exclusions.write().remove(name);
        } else {
            self.in_creation_exclusions.write().insert(name.into());
        }
    }

    #[must_use]
    pub fn is_currently_in_creation(&self, name: &str) -> bool {
        !self.in_creation_exclusions.read().contains(name) && self.is_singleton_currently_in_creation(name)
    }

    #[must_use]
    pub fn is_singleton_currently_in_creation(&self, name: &str) -> bool {
        self.in_creation.read().contains(name)
    }

    /// # Errors
    /// Returns [`ResolveErrorKind::CurrentlyInCreation`] if the name is
    /// already marked: the creation re-entered itself without an early
    /// reference to break the cycle.
    pub(crate) fn before_singleton_creation(&self, name: &str) -> Result<(), ResolveErrorKind> {
        if !self.in_creation_exclusions.read().contains(name) && !self.in_creation.write().insert(name.into()) {
            return Err(ResolveErrorKind::CurrentlyInCreation { name: name.into() });
        }
        Ok(())
    }

    /// # Panics
    /// Panics if the name was not marked in creation: the engine state is
    /// corrupt.
    pub(crate) fn after_singleton_creation(&self, name: &str) {
        if !self.in_creation_exclusions.read().contains(name) && !self.in_creation.write().remove(name) {
            panic!("Singleton `{name}` isn't currently in creation");
        }
    }

    /// Adds a teardown record for `name`. Re-registration replaces the
    /// callback but keeps the original position in destruction order.
    pub fn register_disposable(&self, name: &str, disposer: BoxedDisposer) {
        let mut disposables = self.disposables.lock();
        if let Some(entry) = disposables.iter_mut().find(|(registered, _)| registered == name) {
            entry.1 = disposer;
        } else {
            disposables.push((name.into(), disposer));
        }
    }

    /// Records that `dependent` depends on `name`: `name` must outlive it.
    /// Duplicate edges are no-ops.
    pub fn register_dependent_bean(&self, name: &str, dependent: &str) {
        let canonical = self.aliases.canonical_name(name);
        {
            let mut dependents = self.dependents.lock();
            let entry = dependents.entry(canonical.clone()).or_default();
            if entry.iter().any(|existing| existing == dependent) {
                return;
            }
            entry.push(dependent.into());
        }
        let mut dependencies = self.dependencies.lock();
        let entry = dependencies.entry(dependent.into()).or_default();
        if !entry.iter().any(|existing| *existing == canonical) {
            entry.push(canonical);
        }
    }

    /// Records that `containing` contains `contained`; the inner bean is
    /// destroyed when the outer one is, and the outer is additionally
    /// registered as a dependent of the inner for teardown ordering.
    pub fn register_contained_bean(&self, contained: &str, containing: &str) {
        {
            let mut contained_map = self.contained.lock();
            let entry = contained_map.entry(containing.into()).or_default();
            if entry.iter().any(|existing| existing == contained) {
                return;
            }
            entry.push(contained.into());
        }
        self.register_dependent_bean(contained, containing);
    }

    /// Whether `dependent` is reachable in the dependents-of graph from
    /// `name`, transitively. Re-entrant paths terminate via the visited set
    /// and answer `false`.
    #[must_use]
    pub fn is_dependent(&self, name: &str, dependent: &str) -> bool {
        let dependents = self.dependents.lock();
        self.is_dependent_in(&dependents, name, dependent, &mut AHashSet::new())
    }

    fn is_dependent_in(
        &self,
        dependents: &BTreeMap<String, Vec<String>>,
        name: &str,
        dependent: &str,
        seen: &mut AHashSet<String>,
    ) -> bool {
        if seen.contains(name) {
            return false;
        }
        let canonical = self.aliases.canonical_name(name);
        let Some(direct) = dependents.get(&canonical) else {
            return false;
        };
        if direct.iter().any(|existing| existing == dependent) {
            return true;
        }
        seen.insert(name.into());
        direct
            .iter()
            .any(|transitive| self.is_dependent_in(dependents, transitive, dependent, seen))
    }

    #[must_use]
    pub fn has_dependent_bean(&self, name: &str) -> bool {
        self.dependents.lock().contains_key(name)
    }

    #[must_use]
    pub fn dependent_beans(&self, name: &str) -> Vec<String> {
        self.dependents.lock().get(name).cloned().unwrap_or_default()
    }

    #[must_use]
    pub fn dependencies_for_bean(&self, name: &str) -> Vec<String> {
        self.dependencies.lock().get(name).cloned().unwrap_or_default()
    }

    /// Destroys every tracked singleton, in reverse registration order with
    /// dependents destroyed before their dependees, then clears all caches
    /// and bookkeeping.
    pub fn destroy_singletons(&self) {
        trace!("Destroying singletons");
        {
            let guard = self.lock.lock();
            guard.state_mut().in_destruction = true;
        }

        let disposable_names: Vec<String> = self.disposables.lock().iter().map(|(name, _)| name.clone()).collect();
        for name in disposable_names.iter().rev() {
            self.destroy_singleton(name);
        }

        self.contained.lock().clear();
        self.dependents.lock().clear();
        self.dependencies.lock().clear();
        self.clear_singleton_cache();
    }

    pub(crate) fn clear_singleton_cache(&self) {
        let guard = self.lock.lock();
        self.primary.write().clear();
        {
            let mut state = guard.state_mut();
            state.early.clear();
            state.producers.clear();
            state.in_destruction = false;
        }
        self.registered_names.lock().clear();
    }

    /// Destroys the given bean: removes it from the caches, destroys its
    /// dependents first, runs its teardown callback, then destroys its
    /// contained beans. Teardown failures are logged, never propagated.
    pub fn destroy_singleton(&self, name: &str) {
        self.remove_singleton(name);
        let disposer = {
            let mut disposables = self.disposables.lock();
            disposables
                .iter()
                .position(|(registered, _)| registered == name)
                .map(|index| disposables.remove(index).1)
        };
        self.destroy_bean(name, disposer);
    }

    fn destroy_bean(&self, name: &str, disposer: Option<BoxedDisposer>) {
        // Dependents die first. The entry is detached under the lock so the
        // recursion below runs on a disconnected list.
        let dependents = self.dependents.lock().remove(name);
        if let Some(dependents) = dependents {
            trace!(bean = name, ?dependents, "Retrieved dependent beans");
            for dependent in dependents {
                self.destroy_singleton(&dependent);
            }
        }

        if let Some(disposer) = disposer {
            if catch_unwind(AssertUnwindSafe(disposer)).is_err() {
                warn!(bean = name, "Destruction of bean threw an exception");
            }
        }

        let contained = self.contained.lock().remove(name);
        if let Some(contained) = contained {
            for inner in contained {
                self.destroy_singleton(&inner);
            }
        }

        // Surviving beans that listed the destroyed one as a dependent must
        // forget it; entries going empty are dropped.
        {
            let mut dependents = self.dependents.lock();
            dependents.retain(|_, entry| {
                entry.retain(|existing| existing != name);
                !entry.is_empty()
            });
        }
        self.dependencies.lock().remove(name);
    }
}
