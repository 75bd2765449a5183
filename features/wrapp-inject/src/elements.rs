use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use crate::{
    keys::Key,
    multi::{MapBinding, SetBinding},
    providers::{InternalProvider, Provider},
    scopes::Scope,
    types::Instance,
};

static NEXT_BINDING_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_PRIVATE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a binding, shared by its clones
///
/// Scope caches are keyed by this, so a binding replaced through overrides never
/// sees the value cached for the binding it replaced.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct BindingId(u64);
impl BindingId {
    fn next() -> Self {
        BindingId(NEXT_BINDING_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Identity of a private block, shared by its clones
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct PrivateId(u64);
impl PrivateId {
    fn next() -> Self {
        PrivateId(NEXT_PRIVATE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn as_tag(self) -> i64 {
        self.0 as i64
    }
}

/// A key, the provider of its value and the scope caching it
#[derive(Clone)]
pub struct Binding(Arc<BindingInner>);
struct BindingInner {
    id: BindingId,
    key: Key,
    provider: Provider,
    scope: Scope,
}
impl Binding {
    pub fn new(key: Key, provider: Provider, scope: Scope) -> Self {
        Binding(Arc::new(BindingInner {
            id: BindingId::next(),
            key,
            provider,
            scope,
        }))
    }

    pub fn id(&self) -> BindingId {
        self.0.id
    }

    pub fn key(&self) -> &Key {
        &self.0.key
    }

    pub fn provider(&self) -> &Provider {
        &self.0.provider
    }

    pub fn scope(&self) -> &Scope {
        &self.0.scope
    }
}
impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("id", &self.0.id)
            .field("key", &self.0.key)
            .field("provider", &self.0.provider)
            .field("scope", &self.0.scope)
            .finish()
    }
}

/// An encapsulated sub-graph, only reachable through its exposed keys
#[derive(Debug, Clone)]
pub struct Private {
    id: PrivateId,
    elements: Elements,
}
impl Private {
    pub fn id(&self) -> PrivateId {
        self.id
    }

    pub fn elements(&self) -> &Elements {
        &self.elements
    }
}

/// Replaces, key by key, whatever `original` contributes with what `replacement` contributes
#[derive(Debug, Clone)]
pub struct Overrides {
    pub replacement: Elements,
    pub original: Elements,
}

pub type ListenerFn = dyn Fn(&Binding, &Instance) + Send + Sync;

/// Observes every value a provider produced in the declaring injector
#[derive(Clone)]
pub struct ProvisionListener(pub(crate) Arc<ListenerFn>);
impl fmt::Debug for ProvisionListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ProvisionListener")
    }
}

/// The unit of the binding language
#[derive(Debug, Clone)]
pub enum Element {
    Binding(Binding),
    /// Resolve the key when the injector is built, or when its seeded scope opens
    Eager(Key),
    /// Re-export a key of the enclosing private block
    Expose(Key),
    Private(Private),
    Overrides(Overrides),
    /// Register a scope with the injector
    ScopeBinding(Scope),
    SetBinding(SetBinding),
    MapBinding(MapBinding),
    Listener(ProvisionListener),
}

/// A flattened, order preserving list of elements
#[derive(Debug, Clone, Default)]
pub struct Elements(Arc<[Element]>);
impl Elements {
    pub fn new(elements: Vec<Element>) -> Self {
        Elements(elements.into())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Element> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
impl From<Element> for Elements {
    fn from(element: Element) -> Self {
        Elements::new(vec![element])
    }
}
impl From<Binding> for Elements {
    fn from(binding: Binding) -> Self {
        Element::Binding(binding).into()
    }
}
impl From<Vec<Element>> for Elements {
    fn from(elements: Vec<Element>) -> Self {
        Elements::new(elements)
    }
}
impl FromIterator<Element> for Elements {
    fn from_iter<I: IntoIterator<Item = Element>>(iter: I) -> Self {
        Elements::new(iter.into_iter().collect())
    }
}
impl<'a> IntoIterator for &'a Elements {
    type Item = &'a Element;
    type IntoIter = std::slice::Iter<'a, Element>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
impl From<Binding> for Element {
    fn from(binding: Binding) -> Self {
        Element::Binding(binding)
    }
}

/// Flattens bindings, elements and element generators into one [Elements] value
pub fn as_elements<I>(items: I) -> Elements
where
    I: IntoIterator,
    I::Item: Into<Elements>,
{
    let mut flat = Vec::new();
    for item in items {
        flat.extend(item.into().iter().cloned());
    }
    Elements::new(flat)
}

/// Builds an [Elements] value from anything convertible into one
///
/// ```ignore
/// let elements = elements![
///     bind::<u32>().to_const(420),
///     bind_scope(Scope::seeded("request")),
///     other_elements,
/// ];
/// ```
#[macro_export]
macro_rules! elements {
    ($($item:expr),* $(,)?) => {{
        let items: ::std::vec::Vec<$crate::Elements> =
            ::std::vec![$($crate::Elements::from($item)),*];
        $crate::as_elements(items)
    }};
}

/// Encapsulates `elements` in a private sub-graph
pub fn private(elements: impl Into<Elements>) -> Element {
    Element::Private(Private {
        id: PrivateId::next(),
        elements: elements.into(),
    })
}

/// Re-exports `key` from the enclosing private block
pub fn expose(key: Key) -> Element {
    Element::Expose(key)
}

/// Resolves `key` eagerly
pub fn eager(key: Key) -> Element {
    Element::Eager(key)
}

/// Replaces the contributions of `original` with those of `replacement`, key by key
pub fn overrides(replacement: impl Into<Elements>, original: impl Into<Elements>) -> Element {
    Element::Overrides(Overrides {
        replacement: replacement.into(),
        original: original.into(),
    })
}

/// Registers `scope` with the injector
pub fn bind_scope(scope: Scope) -> Element {
    Element::ScopeBinding(scope)
}

/// Declares `key` as a seed of `scope`, resolved from the seeds given when the scope is opened
pub fn bind_scope_seed(key: Key, scope: Scope) -> Element {
    Element::Binding(Binding::new(
        key.clone(),
        Provider::Internal(InternalProvider::ScopeSeed {
            scope: scope.clone(),
            key,
        }),
        scope,
    ))
}

/// Calls `f` after every provision in the declaring injector
pub fn listener(f: impl Fn(&Binding, &Instance) + Send + Sync + 'static) -> Element {
    Element::Listener(ProvisionListener(Arc::new(f)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn const_binding(value: u32) -> Binding {
        Binding::new(
            Key::of::<u32>(),
            Provider::Const(Instance::new(value)),
            Scope::Unscoped,
        )
    }

    #[test]
    fn as_elements_preserves_order() {
        let first = const_binding(1);
        let second = const_binding(2);
        let nested = as_elements([Element::from(second.clone()), eager(Key::of::<u32>())]);
        let flat = as_elements([Elements::from(first.clone()), nested]);

        assert_eq!(flat.len(), 3);
        let ids: Vec<_> = flat
            .iter()
            .filter_map(|element| match element {
                Element::Binding(binding) => Some(binding.id()),
                _ => None,
            })
            .collect();
        assert_eq!(ids, vec![first.id(), second.id()]);
        assert!(matches!(flat.iter().last(), Some(Element::Eager(_))));
    }

    #[test]
    fn identical_private_blocks_stay_distinct() {
        let a = private(const_binding(1));
        let b = private(const_binding(1));
        let (Element::Private(a), Element::Private(b)) = (&a, &b) else {
            panic!("expected private elements");
        };
        assert_ne!(a.id(), b.id());
        assert_eq!(a.clone().id(), a.id());
    }

    #[test]
    fn binding_clones_share_identity() {
        let binding = const_binding(3);
        assert_eq!(binding.clone().id(), binding.id());
        assert_ne!(const_binding(3).id(), binding.id());
    }
}
