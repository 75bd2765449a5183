use std::future::Future;

use futures::FutureExt;

use crate::{
    errors::InjectError,
    providers::{Args, AsyncFactory, Dependency, Factory},
    resolver::Resolver,
    types::{DynError, Injectable, Instance},
};

/// A type which knows how to construct itself from injected dependencies
///
/// Binding a type with `to_ctor` uses this as the constructor provider.
pub trait Inject: Injectable + Sized {
    /// Returns a list of dependencies the constructor requires
    fn dependencies() -> Vec<Dependency>;

    /// Constructs a new instance from the resolved dependencies
    ///
    /// `args` yields the dependencies in the order [Inject::dependencies] declared them.
    fn construct(args: &mut Args) -> Result<Self, DynError>;
}

impl Factory {
    /// Constructor provider of `T`
    pub fn ctor<T: Inject>() -> Self {
        Factory::new(T::dependencies(), |mut args| {
            T::construct(&mut args).map(Instance::new)
        })
    }
}

/// Infallible closures whose parameters are all [Resolver]s
///
/// The dependency list is derived from the parameter types.
pub trait IntoFactory<Marker>: Send + Sync + 'static {
    type Output: Injectable;

    fn into_factory(self) -> Factory;
}

/// Closures returning `Result<T, E>` whose parameters are all [Resolver]s
pub trait IntoTryFactory<Marker>: Send + Sync + 'static {
    type Output: Injectable;

    fn into_try_factory(self) -> Factory;
}

/// Closures returning a future of `Result<T, E>` whose parameters are all [Resolver]s
pub trait IntoAsyncFactory<Marker>: Send + Sync + 'static {
    type Output: Injectable;

    fn into_async_factory(self) -> AsyncFactory;
}

macro_rules! impl_factories {
    ($($arg:ident),*) => {
        impl<Func, Out, $($arg,)*> IntoFactory<fn($($arg,)*) -> Out> for Func
        where
            Func: Fn($($arg),*) -> Out + Send + Sync + 'static,
            Out: Injectable,
            $($arg: Resolver,)*
        {
            type Output = Out;

            #[allow(unused_mut, unused_variables)]
            fn into_factory(self) -> Factory {
                Factory::new(vec![$(<$arg as Resolver>::dependency()),*], move |mut args: Args| {
                    let out = (self)($(args.next::<$arg>()?),*);
                    Ok(Instance::new(out))
                })
            }
        }

        impl<Func, Out, Err, $($arg,)*> IntoTryFactory<fn($($arg,)*) -> Result<Out, Err>> for Func
        where
            Func: Fn($($arg),*) -> Result<Out, Err> + Send + Sync + 'static,
            Out: Injectable,
            Err: Into<DynError>,
            $($arg: Resolver,)*
        {
            type Output = Out;

            #[allow(unused_mut, unused_variables)]
            fn into_try_factory(self) -> Factory {
                Factory::new(vec![$(<$arg as Resolver>::dependency()),*], move |mut args: Args| {
                    let out = (self)($(args.next::<$arg>()?),*).map_err(Into::<DynError>::into)?;
                    Ok(Instance::new(out))
                })
            }
        }

        impl<Func, Fut, Out, Err, $($arg,)*> IntoAsyncFactory<fn($($arg,)*) -> Fut> for Func
        where
            Func: Fn($($arg),*) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = Result<Out, Err>> + Send + 'static,
            Out: Injectable,
            Err: Into<DynError>,
            $($arg: Resolver,)*
        {
            type Output = Out;

            #[allow(unused_mut, unused_variables)]
            fn into_async_factory(self) -> AsyncFactory {
                let func = self;
                AsyncFactory::new(vec![$(<$arg as Resolver>::dependency()),*], move |mut args: Args| {
                    // Arguments are converted before suspending, the future owns nothing borrowed
                    let started = (|| -> Result<Fut, InjectError> {
                        Ok(func($(args.next::<$arg>()?),*))
                    })();
                    async move {
                        let out = started.map_err(DynError::from)?.await.map_err(Into::<DynError>::into)?;
                        Ok::<_, DynError>(Instance::new(out))
                    }
                    .boxed()
                })
            }
        }
    };
}

impl_factories!();
impl_factories!(A1);
impl_factories!(A1, A2);
impl_factories!(A1, A2, A3);
impl_factories!(A1, A2, A3, A4);
impl_factories!(A1, A2, A3, A4, A5);
impl_factories!(A1, A2, A3, A4, A5, A6);

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::keys::Key;

    struct Greeter {
        greeting: Arc<String>,
    }
    impl Inject for Greeter {
        fn dependencies() -> Vec<Dependency> {
            vec![Dependency::required(Key::of::<String>())]
        }

        fn construct(args: &mut Args) -> Result<Self, DynError> {
            Ok(Greeter {
                greeting: args.next()?,
            })
        }
    }

    fn call(factory: &Factory, args: Vec<Option<Instance>>) -> Result<Instance, DynError> {
        (factory.call)(Args::new(args))
    }

    #[test]
    fn closure_dependencies_follow_parameter_types() {
        let factory = (|a: Arc<u8>, b: Option<Arc<u16>>| (*a as u32) + b.map_or(0, |b| *b as u32))
            .into_factory();
        assert_eq!(
            factory.dependencies(),
            &[
                Dependency::required(Key::of::<u8>()),
                Dependency::optional(Key::of::<u16>())
            ]
        );
        let out = call(&factory, vec![Some(Instance::new(2_u8)), None]).unwrap();
        assert_eq!(*out.downcast::<u32>().unwrap(), 2);
    }

    #[test]
    fn try_factory_keeps_user_error() {
        let factory = (|| Err::<u8, _>("boom")).into_try_factory();
        let error = call(&factory, vec![]).unwrap_err();
        assert_eq!(error.to_string(), "boom");
    }

    #[test]
    fn ctor_uses_inject_impl() {
        let factory = Factory::ctor::<Greeter>();
        let out = call(&factory, vec![Some(Instance::new(String::from("hi")))]).unwrap();
        assert_eq!(*out.downcast::<Greeter>().unwrap().greeting, "hi");
    }

    #[test]
    fn async_factory_resolves_after_await() {
        let factory = (|a: Arc<u8>| async move { Ok::<_, DynError>(*a as u64 * 2) })
            .into_async_factory();
        let out = futures::executor::block_on((factory.call)(Args::new(vec![Some(
            Instance::new(21_u8),
        )])))
        .unwrap();
        assert_eq!(*out.downcast::<u64>().unwrap(), 42);
    }
}
