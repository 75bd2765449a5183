use std::{
    cell::RefCell,
    collections::{HashMap, HashSet},
    fmt,
    sync::{Arc, Mutex, MutexGuard, Weak},
    thread::{self, ThreadId},
};

use crate::{
    elements::{Binding, BindingId},
    errors::{InjectError, ScopeError},
    injector::{Injector, WeakInjector},
    keys::{Key, Tag},
    types::{Injectable, Instance},
};

/// Caching policy of a binding
#[derive(Debug, Clone, Hash, PartialEq, Eq, Default)]
pub enum Scope {
    /// Every provision invokes the provider
    #[default]
    Unscoped,
    /// One value per binding for the lifetime of the injector
    Singleton,
    /// One value per binding and thread
    Thread,
    /// One value per binding and open session, see [enter_seeded_scope]
    Seeded(Tag),
}
impl Scope {
    pub fn seeded(tag: impl Into<Tag>) -> Self {
        Scope::Seeded(tag.into())
    }

    /// Key under which the session manager of a seeded scope is bound
    pub(crate) fn manager_key(&self) -> Option<Key> {
        match self {
            Scope::Seeded(tag) => Some(Key::of::<SeededScopeManager>().with_tag(tag.clone())),
            _ => None,
        }
    }
}
impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Unscoped => f.write_str("Unscoped"),
            Scope::Singleton => f.write_str("Singleton"),
            Scope::Thread => f.write_str("Thread"),
            Scope::Seeded(tag) => write!(f, "Seeded({tag})"),
        }
    }
}

/// The cache behind a [Scope], one instance per scope and injector
///
/// Providers are never invoked while a runtime holds its lock. A value computed
/// concurrently by two callers is published once, the first published value wins
/// and every caller gets that value back.
pub trait ScopeRuntime: Send + Sync {
    fn scope(&self) -> &Scope;

    /// Returns the value cached for the binding
    fn cached(&self, binding: &Binding) -> Result<Option<Instance>, ScopeError>;

    /// Publishes a freshly provided value, returning the value all callers observe
    fn publish(&self, binding: &Binding, value: Instance) -> Result<Instance, ScopeError>;

    fn as_seeded(&self) -> Option<&SeededScope> {
        None
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Providers never run under these locks, a poisoned cache is still consistent
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

static UNSCOPED: Scope = Scope::Unscoped;
static SINGLETON: Scope = Scope::Singleton;
static THREAD: Scope = Scope::Thread;

pub struct UnscopedScope;
impl ScopeRuntime for UnscopedScope {
    fn scope(&self) -> &Scope {
        &UNSCOPED
    }

    fn cached(&self, _binding: &Binding) -> Result<Option<Instance>, ScopeError> {
        Ok(None)
    }

    fn publish(&self, _binding: &Binding, value: Instance) -> Result<Instance, ScopeError> {
        Ok(value)
    }
}

#[derive(Default)]
pub struct SingletonScope {
    values: Mutex<HashMap<BindingId, Instance>>,
}
impl ScopeRuntime for SingletonScope {
    fn scope(&self) -> &Scope {
        &SINGLETON
    }

    fn cached(&self, binding: &Binding) -> Result<Option<Instance>, ScopeError> {
        Ok(lock(&self.values).get(&binding.id()).cloned())
    }

    fn publish(&self, binding: &Binding, value: Instance) -> Result<Instance, ScopeError> {
        Ok(lock(&self.values)
            .entry(binding.id())
            .or_insert(value)
            .clone())
    }
}

type ThreadValues = Mutex<HashMap<ThreadId, HashMap<BindingId, Instance>>>;

/// Thread scope caches holding values of the current thread, evicted when it exits
struct ThreadExit {
    thread: ThreadId,
    caches: Vec<Weak<ThreadValues>>,
}
impl Drop for ThreadExit {
    fn drop(&mut self) {
        for cache in self.caches.drain(..) {
            let Some(cache) = cache.upgrade() else {
                continue;
            };
            // Values are dropped after the lock is released
            let evicted = lock(&cache).remove(&self.thread);
            drop(evicted);
        }
    }
}

thread_local! {
    static THREAD_EXIT: RefCell<ThreadExit> = RefCell::new(ThreadExit {
        thread: thread::current().id(),
        caches: Vec::new(),
    });
}

/// One value per binding and thread, dropped when the thread exits
#[derive(Default)]
pub struct ThreadScope {
    values: Arc<ThreadValues>,
}
impl ThreadScope {
    #[cfg(test)]
    fn threads(&self) -> usize {
        lock(&self.values).len()
    }
}
impl ScopeRuntime for ThreadScope {
    fn scope(&self) -> &Scope {
        &THREAD
    }

    fn cached(&self, binding: &Binding) -> Result<Option<Instance>, ScopeError> {
        let thread = thread::current().id();
        Ok(lock(&self.values)
            .get(&thread)
            .and_then(|values| values.get(&binding.id()))
            .cloned())
    }

    fn publish(&self, binding: &Binding, value: Instance) -> Result<Instance, ScopeError> {
        let thread = thread::current().id();
        let mut values = lock(&self.values);
        if let Some(values) = values.get_mut(&thread) {
            return Ok(values.entry(binding.id()).or_insert(value).clone());
        }

        let registered = THREAD_EXIT
            .try_with(|exit| {
                let mut exit = exit.borrow_mut();
                exit.caches.retain(|cache| cache.strong_count() > 0);
                exit.caches.push(Arc::downgrade(&self.values));
            })
            .is_ok();
        if !registered {
            // The thread is already exiting, nothing would evict the value
            return Ok(value);
        }
        values.insert(thread, HashMap::from([(binding.id(), value.clone())]));
        Ok(value)
    }
}

/// Values given to a seeded scope when it is opened
#[derive(Debug, Clone, Default)]
pub struct Seeds(HashMap<Key, Instance>);
impl Seeds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the key of `T`
    pub fn with<T: Injectable>(self, value: T) -> Self {
        self.with_key(Key::of::<T>(), Instance::new(value))
    }

    pub fn with_key(mut self, key: Key, value: Instance) -> Self {
        self.0.insert(key, value);
        self
    }

    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.0.keys()
    }
}

struct Session {
    seeds: HashMap<Key, Instance>,
    values: HashMap<BindingId, Instance>,
}

/// A scope whose cache lives for one open/close session
pub struct SeededScope {
    scope: Scope,
    seed_keys: HashSet<Key>,
    /// Eager keys and the injectors binding them, the declaring one or its children
    eager: Mutex<Vec<(WeakInjector, Key)>>,
    session: Mutex<Option<Session>>,
}
impl SeededScope {
    pub(crate) fn new(scope: Scope, seed_keys: HashSet<Key>) -> Self {
        SeededScope {
            scope,
            seed_keys,
            eager: Mutex::new(Vec::new()),
            session: Mutex::new(None),
        }
    }

    /// Resolves `key` through `injector` whenever a session opens
    pub(crate) fn register_eager(&self, injector: WeakInjector, key: Key) {
        lock(&self.eager).push((injector, key));
    }

    /// Eager keys of injectors still alive, forgetting the dropped ones
    fn live_eager(&self) -> Vec<(Injector, Key)> {
        let mut eager = lock(&self.eager);
        eager.retain(|(injector, _)| injector.upgrade().is_some());
        eager
            .iter()
            .filter_map(|(injector, key)| Some((injector.upgrade()?, key.clone())))
            .collect()
    }

    pub fn is_open(&self) -> bool {
        lock(&self.session).is_some()
    }

    /// Opens a session, the seeds must cover exactly the declared seed keys
    pub fn open(&self, seeds: Seeds) -> Result<(), ScopeError> {
        let mut session = lock(&self.session);
        if session.is_some() {
            return Err(ScopeError::AlreadyOpen(self.scope.clone()));
        }

        let given: HashSet<&Key> = seeds.0.keys().collect();
        if given != self.seed_keys.iter().collect() {
            return Err(ScopeError::SeedMismatch {
                scope: self.scope.clone(),
                expected: self.seed_keys.iter().cloned().collect(),
                given: seeds.0.keys().cloned().collect(),
            });
        }

        tracing::debug!("Opening scope {} with {} seeds", self.scope, seeds.0.len());
        *session = Some(Session {
            seeds: seeds.0,
            values: HashMap::new(),
        });
        Ok(())
    }

    /// Closes the session, discarding its seeds and cached values
    pub fn close(&self) {
        if lock(&self.session).take().is_some() {
            tracing::debug!("Closed scope {}", self.scope);
        }
    }

    pub(crate) fn seed(&self, key: &Key) -> Result<Instance, InjectError> {
        let session = lock(&self.session);
        let session = session
            .as_ref()
            .ok_or_else(|| ScopeError::NotOpen(self.scope.clone()))?;
        session
            .seeds
            .get(key)
            .cloned()
            .ok_or_else(|| InjectError::UnboundKey(key.clone()))
    }
}
impl ScopeRuntime for SeededScope {
    fn scope(&self) -> &Scope {
        &self.scope
    }

    fn cached(&self, binding: &Binding) -> Result<Option<Instance>, ScopeError> {
        let session = lock(&self.session);
        let session = session
            .as_ref()
            .ok_or_else(|| ScopeError::NotOpen(self.scope.clone()))?;
        Ok(session.values.get(&binding.id()).cloned())
    }

    fn publish(&self, binding: &Binding, value: Instance) -> Result<Instance, ScopeError> {
        let mut session = lock(&self.session);
        let session = session
            .as_mut()
            .ok_or_else(|| ScopeError::NotOpen(self.scope.clone()))?;
        Ok(session
            .values
            .entry(binding.id())
            .or_insert(value)
            .clone())
    }

    fn as_seeded(&self) -> Option<&SeededScope> {
        Some(self)
    }
}

/// Opens sessions of a seeded scope, bound automatically for every registered seeded scope
pub struct SeededScopeManager {
    scope: Arc<SeededScope>,
}
impl SeededScopeManager {
    pub(crate) fn new(scope: Arc<SeededScope>) -> Self {
        SeededScopeManager { scope }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope.scope
    }

    /// Opens a session and resolves the keys marked eager in this scope
    pub fn enter(&self, seeds: Seeds) -> Result<ScopeSession, InjectError> {
        self.scope.open(seeds)?;
        let session = ScopeSession {
            scope: self.scope.clone(),
        };

        for (injector, key) in self.scope.live_eager() {
            tracing::debug!("Eagerly providing '{key}' in scope {}", self.scope.scope);
            // An error drops the session, which closes the scope again
            injector.provide(&key)?;
        }

        Ok(session)
    }
}

/// An open session of a seeded scope, closed when dropped
#[must_use = "the scope closes as soon as the session is dropped"]
pub struct ScopeSession {
    scope: Arc<SeededScope>,
}
impl ScopeSession {
    pub fn scope(&self) -> &Scope {
        &self.scope.scope
    }

    pub fn close(self) {}
}
impl Drop for ScopeSession {
    fn drop(&mut self) {
        self.scope.close();
    }
}

/// Opens a session of the seeded `scope` registered with `injector` or one of its parents
pub fn enter_seeded_scope(
    injector: &Injector,
    scope: &Scope,
    seeds: Seeds,
) -> Result<ScopeSession, InjectError> {
    let Some(manager_key) = scope.manager_key() else {
        return Err(ScopeError::NotRegistered(scope.clone()).into());
    };
    let manager = match injector.try_provide(&manager_key)? {
        Some(manager) => manager,
        None => return Err(ScopeError::NotRegistered(scope.clone()).into()),
    };
    let manager = manager
        .downcast::<SeededScopeManager>()
        .map_err(|actual_type| InjectError::DowncastFailed {
            required_type: std::any::type_name::<SeededScopeManager>(),
            actual_type,
        })?;
    manager.enter(seeds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::Provider;

    fn binding() -> Binding {
        Binding::new(
            Key::of::<u8>(),
            Provider::Const(Instance::new(0_u8)),
            Scope::Singleton,
        )
    }

    #[test]
    fn singleton_keeps_first_published_value() {
        let runtime = SingletonScope::default();
        let binding = binding();
        assert!(runtime.cached(&binding).unwrap().is_none());

        let first = runtime.publish(&binding, Instance::new(1_u8)).unwrap();
        let second = runtime.publish(&binding, Instance::new(2_u8)).unwrap();
        assert!(first.ptr_eq(&second));
        assert_eq!(*second.downcast::<u8>().unwrap(), 1);
        assert!(runtime.cached(&binding).unwrap().unwrap().ptr_eq(&first));
    }

    #[test]
    fn thread_scope_partitions_by_thread() {
        let runtime = Arc::new(ThreadScope::default());
        let binding = binding();
        runtime.publish(&binding, Instance::new(1_u8)).unwrap();

        let other = {
            let runtime = runtime.clone();
            let binding = binding.clone();
            thread::spawn(move || runtime.cached(&binding).unwrap().is_none())
                .join()
                .unwrap()
        };
        assert!(other);
        assert!(runtime.cached(&binding).unwrap().is_some());
    }

    #[test]
    fn thread_scope_forgets_exited_threads() {
        let runtime = Arc::new(ThreadScope::default());
        let binding = binding();
        for _ in 0..4 {
            let runtime = runtime.clone();
            let binding = binding.clone();
            thread::spawn(move || runtime.publish(&binding, Instance::new(1_u8)).unwrap())
                .join()
                .unwrap();
        }
        assert_eq!(runtime.threads(), 0);

        runtime.publish(&binding, Instance::new(1_u8)).unwrap();
        assert_eq!(runtime.threads(), 1);
    }

    #[test]
    fn seeded_scope_session_discipline() {
        let scope = Scope::seeded("request");
        let runtime = SeededScope::new(scope.clone(), HashSet::from([Key::of::<String>()]));
        let binding = binding();

        assert!(matches!(
            runtime.cached(&binding),
            Err(ScopeError::NotOpen(_))
        ));
        assert!(matches!(
            runtime.open(Seeds::new()),
            Err(ScopeError::SeedMismatch { .. })
        ));

        runtime.open(Seeds::new().with(String::from("a"))).unwrap();
        assert!(matches!(
            runtime.open(Seeds::new().with(String::from("b"))),
            Err(ScopeError::AlreadyOpen(_))
        ));
        runtime.publish(&binding, Instance::new(3_u8)).unwrap();
        assert!(runtime.cached(&binding).unwrap().is_some());
        assert_eq!(
            *runtime
                .seed(&Key::of::<String>())
                .unwrap()
                .downcast::<String>()
                .unwrap(),
            "a"
        );

        runtime.close();
        assert!(!runtime.is_open());
        runtime.open(Seeds::new().with(String::from("b"))).unwrap();
        assert!(runtime.cached(&binding).unwrap().is_none());
    }
}
