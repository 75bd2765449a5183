//! Key based dependency injection
//!
//! Bindings are declared as [Elements], compiled into an [ElementCollection] and
//! resolved by an [Injector]:
//!
//! ```ignore
//! let injector = create_injector(elements![
//!     bind::<u32>().to_const(420),
//!     bind::<String>().to_fn(|x: Arc<u32>| x.to_string()).singleton(),
//! ])?;
//! assert_eq!(*injector.get::<String>()?, "420");
//! ```

mod binder;
mod collection;
mod config;
mod elements;
mod errors;
mod factories;
mod graph;
mod injector;
mod keys;
mod multi;
mod private;
mod providers;
mod request;
mod resolver;
mod scopes;
mod types;

pub use binder::{bind, bind_ctor, bind_fn, bind_instance, bind_key, Binder, BinderScope, Unset};
pub use collection::ElementCollection;
pub use config::InjectorConfig;
pub use elements::{
    as_elements, bind_scope, bind_scope_seed, eager, expose, listener, overrides, private,
    Binding, BindingId, Element, Elements, Overrides, Private, PrivateId, ProvisionListener,
};
pub use errors::{CollectError, InjectError, ScopeError};
pub use factories::{Inject, IntoAsyncFactory, IntoFactory, IntoTryFactory};
pub use graph::{DependencyGraph, DependencyGraphError, DependencyGraphErrors};
pub use injector::{create_child_injector, create_injector, Injector, InjectorInner};
pub use keys::{Key, Multiplicity, Tag};
pub use multi::{map_binder, set_binder, InjectMap, InjectSet, MapBinder, MapBinding, SetBinder, SetBinding};
pub use private::PrivateInjector;
pub use providers::{Args, AsyncFactory, Dependency, Factory, InternalProvider, Provider};
pub use resolver::Resolver;
pub use scopes::{
    enter_seeded_scope, Scope, ScopeRuntime, ScopeSession, SeededScope, SeededScopeManager, Seeds,
    SingletonScope, ThreadScope, UnscopedScope,
};
pub use types::{DynError, Injectable, Instance, TypeInfo};
