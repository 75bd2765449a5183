use std::sync::Arc;

use thiserror::Error;

use crate::{
    keys::{Key, Tag},
    scopes::Scope,
    types::DynError,
};

#[derive(Error, Debug, Clone)]
pub enum InjectError {
    /// No binding is reachable from this injector or any of its parents
    #[error("No binding is reachable for '{0}'")]
    UnboundKey(Key),
    /// A key was requested again while it was still being computed in the same request
    #[error("Cyclic dependency on '{key}' through {chain:?}")]
    CyclicDependency { key: Key, chain: Vec<Key> },
    /// The user factory for the key returned an error
    #[error("Provider for '{key}' failed - error: {error}")]
    ProviderFailed { key: Key, error: Arc<DynError> },
    /// The key is bound to an async factory but was requested through the blocking api
    #[error("'{0}' is bound to an async provider and must be requested with the async api")]
    AsyncProvider(Key),
    #[error("Failed to downcast, required: '{required_type}' actual: '{actual_type}'")]
    DowncastFailed {
        required_type: &'static str,
        actual_type: &'static str,
    },
    /// A private child injector outlived the injector it delegates to
    #[error("The parent injector has been dropped")]
    ParentDropped,
    /// A factory asked for more arguments than its declared dependencies
    #[error("Factory requested more arguments than the {declared} it declared")]
    ArgumentsExhausted { declared: usize },
    #[error("Resolving '{key}' exceeded the maximum depth of {max_depth}")]
    DepthExceeded { key: Key, max_depth: usize },
    #[error(transparent)]
    Collect(#[from] CollectError),
    #[error(transparent)]
    Scope(#[from] ScopeError),
}

/// Errors while compiling elements into a collection
#[derive(Error, Debug, Clone)]
pub enum CollectError {
    /// More than one competing binding for a non-multi key
    #[error("A key has been bound twice: '{0}'")]
    DuplicateKey(Key),
    #[error("The map '{key}' received the entry {map_key} twice")]
    DuplicateMapKey { key: Key, map_key: Tag },
    /// A contribution that does not fit the multiplicity of its key
    #[error("Invalid element for '{key}': {reason}")]
    InvalidElement { key: Key, reason: String },
    /// The key is reserved by the injector itself
    #[error("'{0}' is reserved and may not be bound")]
    ReservedKey(Key),
}

/// Errors from scope runtimes and seeded scope sessions
#[derive(Error, Debug, Clone)]
pub enum ScopeError {
    #[error("Scope {0} is not open")]
    NotOpen(Scope),
    #[error("Scope {0} is already open")]
    AlreadyOpen(Scope),
    #[error("Scope {0} is not registered, did you forget `bind_scope`?")]
    NotRegistered(Scope),
    #[error("Scope {scope} expects seeds {expected:?} but was given {given:?}")]
    SeedMismatch {
        scope: Scope,
        expected: Vec<Key>,
        given: Vec<Key>,
    },
}
