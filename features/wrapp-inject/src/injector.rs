use std::{
    any::type_name,
    collections::HashMap,
    fmt,
    sync::{Arc, Weak},
};

use futures::{future::BoxFuture, FutureExt};

use crate::{
    collection::ElementCollection,
    config::InjectorConfig,
    elements::{Binding, Elements},
    errors::{InjectError, ScopeError},
    factories::IntoFactory,
    graph::DependencyGraph,
    keys::{Key, Tag},
    multi::{InjectMap, InjectSet},
    private::PrivateInjector,
    providers::{Args, Dependency, InternalProvider, Provider},
    request::Request,
    resolver::Resolver,
    scopes::{
        ScopeRuntime, SeededScope, SeededScopeManager, SingletonScope, ThreadScope, UnscopedScope,
        Scope,
    },
    types::{DynError, Injectable, Instance},
};

/// Resolves keys to values through the bindings of an [ElementCollection]
///
/// Cloning is cheap, every clone shares the same bindings and scope caches.
#[derive(Clone)]
pub struct Injector(pub Arc<InjectorInner>);
pub struct InjectorInner {
    collection: Arc<ElementCollection>,
    parent: Option<ParentRef>,
    scopes: HashMap<Scope, Arc<dyn ScopeRuntime>>,
    seeded: HashMap<Scope, Arc<SeededScope>>,
    config: InjectorConfig,
}

enum ParentRef {
    /// A child created by the user keeps its parent alive
    Strong(Injector),
    /// The child of a private block is owned by its parent
    Weak(WeakInjector),
}

/// Non-owning handle to an [Injector]
#[derive(Clone)]
pub(crate) struct WeakInjector(Weak<InjectorInner>);
impl WeakInjector {
    pub(crate) fn upgrade(&self) -> Option<Injector> {
        self.0.upgrade().map(Injector)
    }
}

enum Lookup {
    Resolved(Instance),
    Bound(Binding),
    Parent(Injector),
    Unbound,
}

enum Produced {
    Value(Instance),
    /// The value lives in another injector
    Forward { injector: Injector, key: Key },
    Pending(BoxFuture<'static, Result<Instance, DynError>>),
}

/// Builds an injector from `elements`
pub fn create_injector(elements: impl Into<Elements>) -> Result<Injector, InjectError> {
    Injector::with_config(elements, None, InjectorConfig::default())
}

/// Builds an injector from `elements` which delegates unbound keys to `parent`
pub fn create_child_injector(
    elements: impl Into<Elements>,
    parent: &Injector,
) -> Result<Injector, InjectError> {
    Injector::with_config(elements, Some(parent), parent.0.config.clone())
}

fn provider_failed(key: &Key, error: DynError) -> InjectError {
    // Resolution errors raised inside a factory surface unwrapped
    match error.downcast::<InjectError>() {
        Ok(inner) => *inner,
        Err(error) => InjectError::ProviderFailed {
            key: key.clone(),
            error: Arc::new(error),
        },
    }
}

fn downcast<T: Injectable>(instance: &Instance) -> Result<Arc<T>, InjectError> {
    instance
        .downcast::<T>()
        .map_err(|actual_type| InjectError::DowncastFailed {
            required_type: type_name::<T>(),
            actual_type,
        })
}

fn required(key: &Key, value: Option<Instance>) -> Result<Instance, InjectError> {
    value.ok_or_else(|| InjectError::UnboundKey(key.clone()))
}

impl Injector {
    pub fn with_config(
        elements: impl Into<Elements>,
        parent: Option<&Injector>,
        config: InjectorConfig,
    ) -> Result<Self, InjectError> {
        let collection = ElementCollection::new(&elements.into())?;
        Self::build(
            Arc::new(collection),
            parent.cloned().map(ParentRef::Strong),
            config,
        )
    }

    fn build(
        collection: Arc<ElementCollection>,
        parent: Option<ParentRef>,
        config: InjectorConfig,
    ) -> Result<Self, InjectError> {
        let shared_parent = match (&parent, config.share_parent_scopes) {
            (Some(ParentRef::Strong(parent)), true) => Some(parent.clone()),
            (Some(ParentRef::Weak(parent)), true) => {
                Some(parent.upgrade().ok_or(InjectError::ParentDropped)?)
            }
            _ => None,
        };

        let mut scopes: HashMap<Scope, Arc<dyn ScopeRuntime>> = HashMap::new();
        scopes.insert(Scope::Unscoped, Arc::new(UnscopedScope));
        for scope in [Scope::Singleton, Scope::Thread] {
            let runtime: Arc<dyn ScopeRuntime> =
                match shared_parent.as_ref().and_then(|p| p.0.scopes.get(&scope)) {
                    Some(runtime) => runtime.clone(),
                    None if scope == Scope::Singleton => Arc::new(SingletonScope::default()),
                    None => Arc::new(ThreadScope::default()),
                };
            scopes.insert(scope, runtime);
        }

        let mut seeded = HashMap::new();
        for scope in collection.declared_scopes() {
            if !matches!(scope, Scope::Seeded(_)) {
                continue;
            }
            let runtime = Arc::new(SeededScope::new(scope.clone(), collection.seed_keys(scope)));
            scopes.insert(scope.clone(), runtime.clone());
            seeded.insert(scope.clone(), runtime);
        }

        let eager = config.eager;
        let injector = Injector(Arc::new(InjectorInner {
            collection,
            parent,
            scopes,
            seeded,
            config,
        }));

        for binding in injector.0.collection.bindings() {
            injector.scope_runtime(binding.scope())?;
        }

        // Seeded eager keys wait for their scope, which may be declared by a parent
        for (scope, key) in injector.0.collection.seeded_eager_keys() {
            let runtime = injector.scope_runtime(scope)?;
            let seeded = runtime
                .as_seeded()
                .ok_or_else(|| ScopeError::NotRegistered(scope.clone()))?;
            seeded.register_eager(injector.downgrade(), key.clone());
        }

        tracing::debug!(
            "Built injector with {} bindings",
            injector.0.collection.bindings().count()
        );

        if eager {
            for key in injector.0.collection.construction_eager_keys() {
                tracing::debug!("Eagerly providing '{key}'");
                injector.provide(key)?;
            }
        }

        Ok(injector)
    }

    pub(crate) fn downgrade(&self) -> WeakInjector {
        WeakInjector(Arc::downgrade(&self.0))
    }

    pub fn collection(&self) -> &ElementCollection {
        &self.0.collection
    }

    pub fn config(&self) -> &InjectorConfig {
        &self.0.config
    }

    /// The injector unbound keys are delegated to
    pub fn parent(&self) -> Result<Option<Injector>, InjectError> {
        match &self.0.parent {
            None => Ok(None),
            Some(ParentRef::Strong(parent)) => Ok(Some(parent.clone())),
            Some(ParentRef::Weak(parent)) => {
                parent.upgrade().map(Some).ok_or(InjectError::ParentDropped)
            }
        }
    }

    /// Static dependency graph of this injector's bindings
    ///
    /// Keys reachable through the parent chain count as satisfied.
    pub fn graph(&self) -> Result<DependencyGraph, InjectError> {
        let mut external = Vec::new();
        let mut parent = self.parent()?;
        while let Some(injector) = parent {
            external.extend(injector.0.collection.bindings().map(|b| b.key().clone()));
            parent = injector.parent()?;
        }
        Ok(DependencyGraph::new(&self.0.collection, external))
    }

    fn scope_runtime(&self, scope: &Scope) -> Result<Arc<dyn ScopeRuntime>, InjectError> {
        if let Some(runtime) = self.0.scopes.get(scope) {
            return Ok(runtime.clone());
        }
        match self.parent()? {
            Some(parent) => parent.scope_runtime(scope),
            None => Err(ScopeError::NotRegistered(scope.clone()).into()),
        }
    }

    /// Provides the value of `key`, failing if nothing is bound for it
    pub fn provide(&self, key: &Key) -> Result<Instance, InjectError> {
        match self.try_provide(key)? {
            Some(value) => Ok(value),
            None => {
                tracing::debug!("No binding is reachable for '{key}'");
                Err(InjectError::UnboundKey(key.clone()))
            }
        }
    }

    /// Provides the value of `key`, `None` if nothing is bound for it
    pub fn try_provide(&self, key: &Key) -> Result<Option<Instance>, InjectError> {
        let mut request = Request::new(self.0.config.max_depth);
        self.resolve(key, &mut request)
    }

    pub async fn provide_async(&self, key: &Key) -> Result<Instance, InjectError> {
        match self.try_provide_async(key).await? {
            Some(value) => Ok(value),
            None => {
                tracing::debug!("No binding is reachable for '{key}'");
                Err(InjectError::UnboundKey(key.clone()))
            }
        }
    }

    pub async fn try_provide_async(&self, key: &Key) -> Result<Option<Instance>, InjectError> {
        let mut request = Request::new(self.0.config.max_depth);
        self.resolve_async(key, &mut request).await
    }

    pub fn get<T: Injectable>(&self) -> Result<Arc<T>, InjectError> {
        self.get_key(&Key::of::<T>())
    }

    pub fn get_tagged<T: Injectable>(&self, tag: impl Into<Tag>) -> Result<Arc<T>, InjectError> {
        self.get_key(&Key::tagged::<T>(tag))
    }

    /// Provides `key` as a `T`
    pub fn get_key<T: Injectable>(&self, key: &Key) -> Result<Arc<T>, InjectError> {
        downcast(&self.provide(key)?)
    }

    pub fn try_get<T: Injectable>(&self) -> Result<Option<Arc<T>>, InjectError> {
        self.try_provide(&Key::of::<T>())?
            .map(|value| downcast(&value))
            .transpose()
    }

    pub fn get_set<T: Injectable>(&self) -> Result<InjectSet<T>, InjectError> {
        InjectSet::from_instance(Some(self.provide(&Key::set_of::<T>())?))
    }

    pub fn get_map<T: Injectable>(&self) -> Result<InjectMap<T>, InjectError> {
        InjectMap::from_instance(Some(self.provide(&Key::map_of::<T>())?))
    }

    pub async fn get_async<T: Injectable>(&self) -> Result<Arc<T>, InjectError> {
        downcast(&self.provide_async(&Key::of::<T>()).await?)
    }

    /// Calls `f` with its parameters resolved, without binding it
    pub fn inject<M, F: IntoFactory<M>>(&self, f: F) -> Result<Arc<F::Output>, InjectError> {
        let factory = f.into_factory();
        let key = Key::of::<F::Output>();
        let mut request = Request::new(self.0.config.max_depth);
        let args = self.resolve_all(factory.dependencies(), &mut request)?;
        let value = (factory.call)(Args::new(args)).map_err(|error| provider_failed(&key, error))?;
        downcast(&value)
    }

    fn lookup(&self, key: &Key, request: &Request) -> Result<Lookup, InjectError> {
        if *key == Key::of::<Injector>() {
            return Ok(Lookup::Resolved(Instance::new(self.clone())));
        }
        if let Some(value) = request.memoized(key) {
            return Ok(Lookup::Resolved(value.clone()));
        }
        if let Some(binding) = self.0.collection.binding(key) {
            return Ok(Lookup::Bound(binding.clone()));
        }
        Ok(match self.parent()? {
            Some(parent) => Lookup::Parent(parent),
            None => Lookup::Unbound,
        })
    }

    fn resolve(&self, key: &Key, request: &mut Request) -> Result<Option<Instance>, InjectError> {
        match self.lookup(key, request)? {
            Lookup::Resolved(value) => Ok(Some(value)),
            Lookup::Unbound => Ok(None),
            Lookup::Parent(parent) => {
                let value = parent.resolve(key, &mut request.nested())?;
                if let Some(value) = &value {
                    request.remember(key, value.clone());
                }
                Ok(value)
            }
            Lookup::Bound(binding) => {
                request.enter(key)?;
                let result = self.provide_binding(&binding, request);
                request.exit(key);
                let value = result?;
                request.remember(key, value.clone());
                Ok(Some(value))
            }
        }
    }

    fn resolve_async<'a>(
        &'a self,
        key: &'a Key,
        request: &'a mut Request,
    ) -> BoxFuture<'a, Result<Option<Instance>, InjectError>> {
        async move {
            match self.lookup(key, request)? {
                Lookup::Resolved(value) => Ok(Some(value)),
                Lookup::Unbound => Ok(None),
                Lookup::Parent(parent) => {
                    let mut nested = request.nested();
                    let value = parent.resolve_async(key, &mut nested).await?;
                    if let Some(value) = &value {
                        request.remember(key, value.clone());
                    }
                    Ok(value)
                }
                Lookup::Bound(binding) => {
                    request.enter(key)?;
                    let result = self.provide_binding_async(&binding, request).await;
                    request.exit(key);
                    let value = result?;
                    request.remember(key, value.clone());
                    Ok(Some(value))
                }
            }
        }
        .boxed()
    }

    fn resolve_all(
        &self,
        dependencies: &[Dependency],
        request: &mut Request,
    ) -> Result<Vec<Option<Instance>>, InjectError> {
        let mut args = Vec::with_capacity(dependencies.len());
        for dependency in dependencies {
            let value = self.resolve(&dependency.key, request)?;
            if value.is_none() && !dependency.optional {
                return Err(InjectError::UnboundKey(dependency.key.clone()));
            }
            args.push(value);
        }
        Ok(args)
    }

    async fn resolve_all_async(
        &self,
        dependencies: &[Dependency],
        request: &mut Request,
    ) -> Result<Vec<Option<Instance>>, InjectError> {
        let mut args = Vec::with_capacity(dependencies.len());
        for dependency in dependencies {
            let value = self.resolve_async(&dependency.key, request).await?;
            if value.is_none() && !dependency.optional {
                return Err(InjectError::UnboundKey(dependency.key.clone()));
            }
            args.push(value);
        }
        Ok(args)
    }

    fn provide_binding(
        &self,
        binding: &Binding,
        request: &mut Request,
    ) -> Result<Instance, InjectError> {
        if let Provider::AsyncFn(_) = binding.provider() {
            return Err(InjectError::AsyncProvider(binding.key().clone()));
        }
        let runtime = self.scope_runtime(binding.scope())?;
        if let Some(value) = runtime.cached(binding)? {
            return Ok(value);
        }

        let args = self.resolve_all(&binding.provider().dependencies(), request)?;
        let value = match self.produce(binding, args)? {
            Produced::Value(value) => value,
            Produced::Forward { injector, key } => {
                required(&key, injector.resolve(&key, &mut request.nested())?)?
            }
            Produced::Pending(_) => return Err(InjectError::AsyncProvider(binding.key().clone())),
        };
        self.publish(runtime.as_ref(), binding, value)
    }

    async fn provide_binding_async(
        &self,
        binding: &Binding,
        request: &mut Request,
    ) -> Result<Instance, InjectError> {
        let runtime = self.scope_runtime(binding.scope())?;
        if let Some(value) = runtime.cached(binding)? {
            return Ok(value);
        }

        let args = self
            .resolve_all_async(&binding.provider().dependencies(), request)
            .await?;
        let value = match self.produce(binding, args)? {
            Produced::Value(value) => value,
            Produced::Forward { injector, key } => {
                let mut nested = request.nested();
                required(&key, injector.resolve_async(&key, &mut nested).await?)?
            }
            Produced::Pending(future) => future
                .await
                .map_err(|error| provider_failed(binding.key(), error))?,
        };
        self.publish(runtime.as_ref(), binding, value)
    }

    /// Publishes a provided value to the binding's scope and notifies the listeners
    fn publish(
        &self,
        runtime: &dyn ScopeRuntime,
        binding: &Binding,
        value: Instance,
    ) -> Result<Instance, InjectError> {
        let value = runtime.publish(binding, value)?;
        tracing::trace!("Provided '{}' in scope {}", binding.key(), binding.scope());
        for listener in self.0.collection.listeners() {
            (listener.0)(binding, &value);
        }
        Ok(value)
    }

    /// Invokes the provider of `binding` with its resolved dependencies
    fn produce(
        &self,
        binding: &Binding,
        mut args: Vec<Option<Instance>>,
    ) -> Result<Produced, InjectError> {
        let key = binding.key();
        let value = match binding.provider() {
            Provider::Const(value) => value.clone(),
            Provider::Ctor(factory) | Provider::Fn(factory) => {
                (factory.call)(Args::new(args)).map_err(|error| provider_failed(key, error))?
            }
            Provider::AsyncFn(factory) => {
                return Ok(Produced::Pending((factory.call)(Args::new(args))))
            }
            Provider::Link(target) => required(target, args.pop().flatten())?,
            Provider::Internal(internal) => match internal {
                InternalProvider::SetAggregate { assemble, .. } => {
                    assemble(args.into_iter().flatten().collect())?
                }
                InternalProvider::MapAggregate { entries, assemble } => assemble(
                    entries
                        .iter()
                        .map(|(map_key, _)| map_key.clone())
                        .zip(args.into_iter().flatten())
                        .collect(),
                )?,
                InternalProvider::PrivateInjector(id) => {
                    let collection = self
                        .0
                        .collection
                        .private(*id)
                        .cloned()
                        .ok_or_else(|| InjectError::UnboundKey(key.clone()))?;
                    tracing::debug!("Building the child injector of '{key}'");
                    let child = Injector::build(
                        collection,
                        Some(ParentRef::Weak(self.downgrade())),
                        self.0.config.clone(),
                    )?;
                    Instance::new(PrivateInjector(child))
                }
                InternalProvider::Exposed {
                    private_injector,
                    key,
                } => {
                    let private = required(private_injector, args.pop().flatten())?;
                    let private = downcast::<PrivateInjector>(&private)?;
                    return Ok(Produced::Forward {
                        injector: private.0.clone(),
                        key: key.clone(),
                    });
                }
                InternalProvider::ScopeSeed { scope, key } => {
                    let runtime = self.scope_runtime(scope)?;
                    let seeded = runtime
                        .as_seeded()
                        .ok_or_else(|| ScopeError::NotRegistered(scope.clone()))?;
                    seeded.seed(key)?
                }
                InternalProvider::ScopeManager(scope) => {
                    let runtime = self
                        .0
                        .seeded
                        .get(scope)
                        .ok_or_else(|| ScopeError::NotRegistered(scope.clone()))?;
                    Instance::new(SeededScopeManager::new(runtime.clone()))
                }
            },
        };
        Ok(Produced::Value(value))
    }
}

impl fmt::Debug for Injector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        for binding in self.0.collection.bindings() {
            list.entry(&format_args!("{} ({})", binding.key(), binding.scope()));
        }
        list.finish()
    }
}
