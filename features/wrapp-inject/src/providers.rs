use std::{fmt, sync::Arc};

use futures::future::BoxFuture;

use crate::{
    elements::PrivateId,
    errors::InjectError,
    keys::{Key, Tag},
    resolver::Resolver,
    scopes::Scope,
    types::{DynError, Instance},
};

/// A dependency of a factory
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct Dependency {
    /// The required key
    pub key: Key,
    /// Optional dependencies resolve to nothing instead of failing when unbound
    pub optional: bool,
}
impl Dependency {
    pub fn required(key: Key) -> Self {
        Dependency {
            key,
            optional: false,
        }
    }

    pub fn optional(key: Key) -> Self {
        Dependency {
            key,
            optional: true,
        }
    }
}

/// Resolved arguments handed to a factory, in the order its dependencies were declared
pub struct Args {
    declared: usize,
    values: std::vec::IntoIter<Option<Instance>>,
}
impl Args {
    pub(crate) fn new(values: Vec<Option<Instance>>) -> Self {
        Args {
            declared: values.len(),
            values: values.into_iter(),
        }
    }

    /// Takes the next argument as `T`
    pub fn next<T: Resolver>(&mut self) -> Result<T, InjectError> {
        T::from_instance(self.next_instance()?)
    }

    /// Takes the next argument without converting it, `None` for an unbound optional dependency
    pub fn next_instance(&mut self) -> Result<Option<Instance>, InjectError> {
        self.values.next().ok_or(InjectError::ArgumentsExhausted {
            declared: self.declared,
        })
    }

    pub fn remaining(&self) -> usize {
        self.values.len()
    }
}

pub type FactoryFn = dyn Fn(Args) -> Result<Instance, DynError> + Send + Sync;
pub type AsyncFactoryFn =
    dyn Fn(Args) -> BoxFuture<'static, Result<Instance, DynError>> + Send + Sync;

/// A callable with a declared parameter list
#[derive(Clone)]
pub struct Factory {
    pub(crate) dependencies: Arc<[Dependency]>,
    pub(crate) call: Arc<FactoryFn>,
}
impl Factory {
    pub fn new(
        dependencies: Vec<Dependency>,
        call: impl Fn(Args) -> Result<Instance, DynError> + Send + Sync + 'static,
    ) -> Self {
        Factory {
            dependencies: dependencies.into(),
            call: Arc::new(call),
        }
    }

    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }
}

/// Like [Factory], but the callable suspends
#[derive(Clone)]
pub struct AsyncFactory {
    pub(crate) dependencies: Arc<[Dependency]>,
    pub(crate) call: Arc<AsyncFactoryFn>,
}
impl AsyncFactory {
    pub fn new(
        dependencies: Vec<Dependency>,
        call: impl Fn(Args) -> BoxFuture<'static, Result<Instance, DynError>> + Send + Sync + 'static,
    ) -> Self {
        AsyncFactory {
            dependencies: dependencies.into(),
            call: Arc::new(call),
        }
    }

    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }
}

pub type SetAssembler = fn(Vec<Instance>) -> Result<Instance, InjectError>;
pub type MapAssembler = fn(Vec<(Tag, Instance)>) -> Result<Instance, InjectError>;

/// Providers the injector synthesizes for itself
#[derive(Clone)]
pub enum InternalProvider {
    /// Assembles a set from its member keys
    SetAggregate {
        members: Vec<Key>,
        assemble: SetAssembler,
    },
    /// Assembles a map from its member keys
    MapAggregate {
        entries: Vec<(Tag, Key)>,
        assemble: MapAssembler,
    },
    /// Builds the child injector of a private block
    PrivateInjector(PrivateId),
    /// Forwards an exposed key to the child injector of a private block
    Exposed { private_injector: Key, key: Key },
    /// Reads a seed from the open session of a seeded scope
    ScopeSeed { scope: Scope, key: Key },
    /// Hands out the session manager of a seeded scope
    ScopeManager(Scope),
}

/// Produces the value of a binding
#[derive(Clone)]
pub enum Provider {
    Const(Instance),
    /// Constructor of the bound type
    Ctor(Factory),
    Fn(Factory),
    AsyncFn(AsyncFactory),
    /// Alias to another key
    Link(Key),
    Internal(InternalProvider),
}
impl Provider {
    /// Keys this provider asks the injector for
    pub fn dependencies(&self) -> Vec<Dependency> {
        match self {
            Provider::Const(_) => vec![],
            Provider::Ctor(factory) | Provider::Fn(factory) => factory.dependencies.to_vec(),
            Provider::AsyncFn(factory) => factory.dependencies.to_vec(),
            Provider::Link(key) => vec![Dependency::required(key.clone())],
            Provider::Internal(internal) => match internal {
                InternalProvider::SetAggregate { members, .. } => members
                    .iter()
                    .cloned()
                    .map(Dependency::required)
                    .collect(),
                InternalProvider::MapAggregate { entries, .. } => entries
                    .iter()
                    .map(|(_, key)| Dependency::required(key.clone()))
                    .collect(),
                InternalProvider::Exposed {
                    private_injector, ..
                } => vec![Dependency::required(private_injector.clone())],
                InternalProvider::PrivateInjector(_)
                | InternalProvider::ScopeSeed { .. }
                | InternalProvider::ScopeManager(_) => vec![],
            },
        }
    }
}
impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Const(instance) => f.debug_tuple("Const").field(instance).finish(),
            Provider::Ctor(factory) => f
                .debug_tuple("Ctor")
                .field(&factory.dependencies)
                .finish(),
            Provider::Fn(factory) => f.debug_tuple("Fn").field(&factory.dependencies).finish(),
            Provider::AsyncFn(factory) => f
                .debug_tuple("AsyncFn")
                .field(&factory.dependencies)
                .finish(),
            Provider::Link(key) => f.debug_tuple("Link").field(key).finish(),
            Provider::Internal(internal) => f.debug_tuple("Internal").field(internal).finish(),
        }
    }
}
impl fmt::Debug for InternalProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InternalProvider::SetAggregate { members, .. } => {
                f.debug_tuple("SetAggregate").field(members).finish()
            }
            InternalProvider::MapAggregate { entries, .. } => {
                f.debug_tuple("MapAggregate").field(entries).finish()
            }
            InternalProvider::PrivateInjector(id) => {
                f.debug_tuple("PrivateInjector").field(id).finish()
            }
            InternalProvider::Exposed { key, .. } => f.debug_tuple("Exposed").field(key).finish(),
            InternalProvider::ScopeSeed { scope, key } => f
                .debug_struct("ScopeSeed")
                .field("scope", scope)
                .field("key", key)
                .finish(),
            InternalProvider::ScopeManager(scope) => {
                f.debug_tuple("ScopeManager").field(scope).finish()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_are_consumed_in_declaration_order() {
        let mut args = Args::new(vec![Some(Instance::new(1_u8)), None]);
        assert_eq!(args.remaining(), 2);
        assert_eq!(*args.next::<Arc<u8>>().unwrap(), 1);
        assert!(args.next::<Option<Arc<u16>>>().unwrap().is_none());
        assert!(matches!(
            args.next_instance(),
            Err(InjectError::ArgumentsExhausted { declared: 2 })
        ));
    }

    #[test]
    fn link_depends_on_its_target() {
        let provider = Provider::Link(Key::of::<u8>());
        assert_eq!(
            provider.dependencies(),
            vec![Dependency::required(Key::of::<u8>())]
        );
    }
}
