use std::marker::PhantomData;

use crate::{
    elements::{Binding, Element, Elements},
    factories::{Inject, IntoAsyncFactory, IntoFactory, IntoTryFactory},
    keys::{Key, Tag},
    providers::{Args, Dependency, Factory, Provider},
    scopes::Scope,
    types::{DynError, Injectable, Instance},
};

/// Builder state of a binder that has not chosen a provider or scope yet
pub struct Unset;

/// Declares the binding of a key
///
/// The provider and the scope can each be set once, enforced by the type parameters:
///
/// ```ignore
/// let elements = elements![
///     bind::<u32>().to_const(420),
///     bind::<String>().to_fn(|x: Arc<u32>| x.to_string()).singleton(),
/// ];
/// ```
///
/// Any binder with a provider converts into [Elements].
#[must_use = "a binder does nothing until it is converted into elements"]
pub struct Binder<T, P = Unset, S = Unset> {
    key: Key,
    provider: P,
    scope: S,
    eager: bool,
    expose: bool,
    _marker: PhantomData<fn() -> T>,
}

/// Binds the key of `T`
pub fn bind<T: Injectable>() -> Binder<T> {
    bind_key::<T>(Key::of::<T>())
}

/// Binds `key`, whose value must be a `T`
pub fn bind_key<T: Injectable>(key: Key) -> Binder<T> {
    Binder {
        key,
        provider: Unset,
        scope: Unset,
        eager: false,
        expose: false,
        _marker: PhantomData,
    }
}

/// Binds the key of `T` to the given value
pub fn bind_instance<T: Injectable>(value: T) -> Binder<T, Provider> {
    bind::<T>().to_const(value)
}

/// Binds the return type of `f` to `f`
pub fn bind_fn<M, F: IntoFactory<M>>(f: F) -> Binder<F::Output, Provider> {
    bind::<F::Output>().to_fn(f)
}

/// Binds `T` to its [Inject] constructor
pub fn bind_ctor<T: Inject>() -> Binder<T, Provider> {
    bind::<T>().to_ctor()
}

impl<T, P, S> Binder<T, P, S> {
    /// Adds a tag to the bound key
    pub fn tag(mut self, tag: impl Into<Tag>) -> Self {
        self.key = self.key.with_tag(tag);
        self
    }

    /// Resolves the key when the injector is built, or when its seeded scope opens
    pub fn eager(mut self) -> Self {
        self.eager = true;
        self
    }

    /// Re-exports the key from the enclosing private block
    pub fn expose(mut self) -> Self {
        self.expose = true;
        self
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    fn with_provider(self, provider: Provider) -> Binder<T, Provider, S> {
        Binder {
            key: self.key,
            provider,
            scope: self.scope,
            eager: self.eager,
            expose: self.expose,
            _marker: PhantomData,
        }
    }
}

impl<T: Injectable, S> Binder<T, Unset, S> {
    pub fn to_const(self, value: T) -> Binder<T, Provider, S> {
        self.with_provider(Provider::Const(Instance::new(value)))
    }

    pub fn to_ctor(self) -> Binder<T, Provider, S>
    where
        T: Inject,
    {
        self.with_provider(Provider::Ctor(Factory::ctor::<T>()))
    }

    /// Binds to a closure whose parameters are resolved by type
    pub fn to_fn<M>(self, f: impl IntoFactory<M, Output = T>) -> Binder<T, Provider, S> {
        self.with_provider(Provider::Fn(f.into_factory()))
    }

    /// Like [Binder::to_fn] for closures returning a `Result`
    pub fn to_try_fn<M>(self, f: impl IntoTryFactory<M, Output = T>) -> Binder<T, Provider, S> {
        self.with_provider(Provider::Fn(f.into_try_factory()))
    }

    /// Binds to a closure taking explicitly declared dependencies
    pub fn to_fn_with(
        self,
        dependencies: Vec<Dependency>,
        f: impl Fn(&mut Args) -> Result<T, DynError> + Send + Sync + 'static,
    ) -> Binder<T, Provider, S> {
        self.with_provider(Provider::Fn(Factory::new(dependencies, move |mut args| {
            f(&mut args).map(Instance::new)
        })))
    }

    /// Binds to an async closure, the key then only resolves through the async api
    pub fn to_async_fn<M>(self, f: impl IntoAsyncFactory<M, Output = T>) -> Binder<T, Provider, S> {
        self.with_provider(Provider::AsyncFn(f.into_async_factory()))
    }

    /// Aliases the key to `target`
    pub fn to_key(self, target: Key) -> Binder<T, Provider, S> {
        self.with_provider(Provider::Link(target))
    }
}

impl<T, P> Binder<T, P, Unset> {
    pub fn in_scope(self, scope: Scope) -> Binder<T, P, Scope> {
        Binder {
            key: self.key,
            provider: self.provider,
            scope,
            eager: self.eager,
            expose: self.expose,
            _marker: PhantomData,
        }
    }

    pub fn singleton(self) -> Binder<T, P, Scope> {
        self.in_scope(Scope::Singleton)
    }
}

/// Scope state of a [Binder], unscoped unless set
pub trait BinderScope {
    fn into_scope(self) -> Scope;
}
impl BinderScope for Unset {
    fn into_scope(self) -> Scope {
        Scope::Unscoped
    }
}
impl BinderScope for Scope {
    fn into_scope(self) -> Scope {
        self
    }
}

impl<T, S: BinderScope> From<Binder<T, Provider, S>> for Elements {
    fn from(binder: Binder<T, Provider, S>) -> Self {
        let key = binder.key;
        let mut elements = Vec::with_capacity(3);
        elements.push(Element::Binding(Binding::new(
            key.clone(),
            binder.provider,
            binder.scope.into_scope(),
        )));
        if binder.eager {
            elements.push(Element::Eager(key.clone()));
        }
        if binder.expose {
            elements.push(Element::Expose(key));
        }
        Elements::new(elements)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn bindings(elements: &Elements) -> Vec<&Binding> {
        elements
            .iter()
            .filter_map(|element| match element {
                Element::Binding(binding) => Some(binding),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn defaults_to_unscoped() {
        let elements = Elements::from(bind::<u32>().to_const(1));
        let bindings = bindings(&elements);
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].scope(), &Scope::Unscoped);
        assert_eq!(bindings[0].key(), &Key::of::<u32>());
    }

    #[test]
    fn flags_add_elements() {
        let elements = Elements::from(
            bind::<String>()
                .tag("greeting")
                .to_fn(|n: Arc<u32>| n.to_string())
                .singleton()
                .eager()
                .expose(),
        );
        let key = Key::tagged::<String>("greeting");
        assert_eq!(elements.len(), 3);
        assert_eq!(bindings(&elements)[0].scope(), &Scope::Singleton);
        assert!(elements
            .iter()
            .any(|element| matches!(element, Element::Eager(k) if *k == key)));
        assert!(elements
            .iter()
            .any(|element| matches!(element, Element::Expose(k) if *k == key)));
    }

    #[test]
    fn scope_may_be_set_before_provider() {
        let elements = Elements::from(
            bind::<u8>()
                .in_scope(Scope::seeded("request"))
                .to_key(Key::tagged::<u8>("raw")),
        );
        let binding = bindings(&elements)[0];
        assert_eq!(binding.scope(), &Scope::seeded("request"));
        assert!(matches!(binding.provider(), Provider::Link(_)));
    }

    #[test]
    fn bind_fn_keys_by_return_type() {
        let elements = Elements::from(bind_fn(|| 3_u16));
        assert_eq!(bindings(&elements)[0].key(), &Key::of::<u16>());
    }
}
