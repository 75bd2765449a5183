use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::Arc,
};

use crate::{
    elements::{Binding, Element, Elements, PrivateId, ProvisionListener},
    errors::CollectError,
    injector::Injector,
    keys::{Key, Multiplicity, Tag},
    multi::{MapBinding, SetBinding},
    private::private_injector_key,
    providers::{InternalProvider, Provider},
    scopes::Scope,
};

/// Elements compiled into one binding per key
///
/// Private blocks are compiled into their own nested collections, reachable only
/// through the forwarding bindings of their exposed keys.
pub struct ElementCollection {
    bindings: HashMap<Key, Binding>,
    /// Keys in the order they were first contributed to
    order: Vec<Key>,
    scopes: Vec<Scope>,
    seed_keys: HashMap<Scope, HashSet<Key>>,
    eager: Vec<(Scope, Key)>,
    listeners: Vec<ProvisionListener>,
    privates: HashMap<PrivateId, Arc<ElementCollection>>,
}
impl fmt::Debug for ElementCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementCollection")
            .field("keys", &self.order)
            .field("scopes", &self.scopes)
            .field("eager", &self.eager)
            .field("privates", &self.privates.len())
            .finish()
    }
}

impl ElementCollection {
    pub fn new(elements: &Elements) -> Result<Self, CollectError> {
        let contributions = Contributions::collect(elements);
        let collection = contributions.resolve()?;
        tracing::debug!(
            "Collected {} bindings, {} scopes and {} private blocks",
            collection.bindings.len(),
            collection.scopes.len(),
            collection.privates.len()
        );
        Ok(collection)
    }

    pub fn binding(&self, key: &Key) -> Option<&Binding> {
        self.bindings.get(key)
    }

    /// All bindings in the order their keys were first contributed to
    pub fn bindings(&self) -> impl Iterator<Item = &Binding> {
        self.order.iter().filter_map(|key| self.bindings.get(key))
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.bindings.contains_key(key)
    }

    /// Scopes registered through [bind_scope](crate::bind_scope)
    pub fn declared_scopes(&self) -> &[Scope] {
        &self.scopes
    }

    /// Seed keys declared for a seeded scope
    pub fn seed_keys(&self, scope: &Scope) -> HashSet<Key> {
        self.seed_keys.get(scope).cloned().unwrap_or_default()
    }

    /// Keys marked eager whose binding lives in `scope`
    pub fn eager_keys<'a>(&'a self, scope: &'a Scope) -> impl Iterator<Item = &'a Key> {
        self.eager
            .iter()
            .filter(move |(eager_scope, _)| eager_scope == scope)
            .map(|(_, key)| key)
    }

    /// Keys marked eager whose binding lives in a seeded scope
    pub(crate) fn seeded_eager_keys(&self) -> impl Iterator<Item = (&Scope, &Key)> {
        self.eager
            .iter()
            .filter(|(scope, _)| matches!(scope, Scope::Seeded(_)))
            .map(|(scope, key)| (scope, key))
    }

    /// Keys marked eager which are resolved when the injector is built
    pub(crate) fn construction_eager_keys(&self) -> impl Iterator<Item = &Key> {
        self.eager
            .iter()
            .filter(|(scope, _)| !matches!(scope, Scope::Seeded(_)))
            .map(|(_, key)| key)
    }

    pub fn listeners(&self) -> &[ProvisionListener] {
        &self.listeners
    }

    pub(crate) fn private(&self, id: PrivateId) -> Option<&Arc<ElementCollection>> {
        self.privates.get(&id)
    }
}

/// Uncompiled contributions, grouped by key
#[derive(Default)]
struct Contributions {
    order: Vec<Key>,
    by_key: HashMap<Key, Vec<Element>>,
    /// Elements without a key
    sentinel: Vec<Element>,
    privates: HashMap<PrivateId, Contributions>,
}
impl Contributions {
    fn collect(elements: &Elements) -> Self {
        let mut contributions = Contributions::default();
        for element in elements {
            contributions.add(element);
        }
        contributions
    }

    fn push(&mut self, key: Key, element: Element) {
        match self.by_key.get_mut(&key) {
            Some(existing) => existing.push(element),
            None => {
                self.order.push(key.clone());
                self.by_key.insert(key, vec![element]);
            }
        }
    }

    fn add(&mut self, element: &Element) {
        match element {
            Element::Binding(binding) => self.push(binding.key().clone(), element.clone()),
            Element::Eager(key) | Element::Expose(key) => self.push(key.clone(), element.clone()),
            Element::SetBinding(SetBinding { multi_key, .. })
            | Element::MapBinding(MapBinding { multi_key, .. }) => {
                self.push(multi_key.clone(), element.clone())
            }
            Element::ScopeBinding(scope) => {
                self.sentinel.push(element.clone());
                if let Some(manager_key) = scope.manager_key() {
                    let manager = Binding::new(
                        manager_key.clone(),
                        Provider::Internal(InternalProvider::ScopeManager(scope.clone())),
                        Scope::Unscoped,
                    );
                    self.push(manager_key, Element::Binding(manager));
                }
            }
            Element::Listener(_) => self.sentinel.push(element.clone()),
            Element::Private(private) => {
                if self.privates.contains_key(&private.id()) {
                    return;
                }
                let inner = Contributions::collect(private.elements());
                let injector_key = private_injector_key(private.id());
                self.push(
                    injector_key.clone(),
                    Element::Binding(Binding::new(
                        injector_key.clone(),
                        Provider::Internal(InternalProvider::PrivateInjector(private.id())),
                        Scope::Singleton,
                    )),
                );
                for exposed in inner.exposed_keys() {
                    let forward = Binding::new(
                        exposed.clone(),
                        Provider::Internal(InternalProvider::Exposed {
                            private_injector: injector_key.clone(),
                            key: exposed.clone(),
                        }),
                        Scope::Unscoped,
                    );
                    self.push(exposed, Element::Binding(forward));
                }
                self.privates.insert(private.id(), inner);
            }
            Element::Overrides(overrides) => {
                let replacement = Contributions::collect(&overrides.replacement);
                let mut original = Contributions::collect(&overrides.original);
                original.replace_with(replacement);
                self.merge(original);
            }
        }
    }

    /// Replaces, key by key, everything this contributes with what `replacement` contributes
    fn replace_with(&mut self, replacement: Contributions) {
        for key in replacement.order {
            let Some(elements) = replacement.by_key.get(&key) else {
                continue;
            };
            if self.by_key.insert(key.clone(), elements.clone()).is_none() {
                self.order.push(key);
            }
        }
        self.sentinel.extend(replacement.sentinel);
        self.privates.extend(replacement.privates);
    }

    fn merge(&mut self, other: Contributions) {
        for key in other.order {
            if let Some(elements) = other.by_key.get(&key) {
                for element in elements {
                    self.push(key.clone(), element.clone());
                }
            }
        }
        self.sentinel.extend(other.sentinel);
        for (id, private) in other.privates {
            self.privates.entry(id).or_insert(private);
        }
    }

    fn exposed_keys(&self) -> Vec<Key> {
        self.order
            .iter()
            .filter(|key| {
                self.by_key.get(*key).is_some_and(|elements| {
                    elements
                        .iter()
                        .any(|element| matches!(element, Element::Expose(_)))
                })
            })
            .cloned()
            .collect()
    }

    fn resolve(self) -> Result<ElementCollection, CollectError> {
        let mut collection = ElementCollection {
            bindings: HashMap::with_capacity(self.by_key.len()),
            order: Vec::with_capacity(self.order.len()),
            scopes: Vec::new(),
            seed_keys: HashMap::new(),
            eager: Vec::new(),
            listeners: Vec::new(),
            privates: HashMap::with_capacity(self.privates.len()),
        };

        for element in self.sentinel {
            match element {
                Element::ScopeBinding(scope) => {
                    if !collection.scopes.contains(&scope) {
                        collection.scopes.push(scope);
                    }
                }
                Element::Listener(listener) => collection.listeners.push(listener),
                _ => {}
            }
        }

        let mut eager = Vec::new();
        for key in self.order {
            let Some(elements) = self.by_key.get(&key) else {
                continue;
            };
            if elements.iter().any(|element| matches!(element, Element::Eager(_))) {
                eager.push(key.clone());
            }

            let binding = match key.multi {
                Multiplicity::Scalar => resolve_scalar(&key, elements)?,
                Multiplicity::Set => Some(resolve_set(&key, elements)?),
                Multiplicity::Map => Some(resolve_map(&key, elements)?),
            };
            if let Some(binding) = binding {
                if let Provider::Internal(InternalProvider::ScopeSeed { scope, key: seed }) =
                    binding.provider()
                {
                    collection
                        .seed_keys
                        .entry(scope.clone())
                        .or_default()
                        .insert(seed.clone());
                }
                collection.bindings.insert(key.clone(), binding);
                collection.order.push(key);
            }
        }

        for key in eager {
            let scope = collection
                .bindings
                .get(&key)
                .map(|binding| binding.scope().clone())
                .unwrap_or_default();
            collection.eager.push((scope, key));
        }

        for (id, private) in self.privates {
            collection.privates.insert(id, Arc::new(private.resolve()?));
        }

        Ok(collection)
    }
}

fn invalid(key: &Key, reason: impl Into<String>) -> CollectError {
    CollectError::InvalidElement {
        key: key.clone(),
        reason: reason.into(),
    }
}

fn resolve_scalar(key: &Key, elements: &[Element]) -> Result<Option<Binding>, CollectError> {
    let mut found: Option<&Binding> = None;
    for element in elements {
        match element {
            Element::Binding(binding) => {
                if *key == Key::of::<Injector>() {
                    return Err(CollectError::ReservedKey(key.clone()));
                }
                if found.is_some() {
                    return Err(CollectError::DuplicateKey(key.clone()));
                }
                found = Some(binding);
            }
            Element::Eager(_) | Element::Expose(_) => {}
            _ => return Err(invalid(key, "only multi-keys accept set and map members")),
        }
    }
    Ok(found.cloned())
}

fn resolve_set(key: &Key, elements: &[Element]) -> Result<Binding, CollectError> {
    let mut members = Vec::new();
    let mut assemble = None;
    for element in elements {
        match element {
            Element::SetBinding(set) => {
                assemble = Some(set.assemble);
                if let Some(member) = &set.member {
                    members.push(member.clone());
                }
            }
            Element::Eager(_) | Element::Expose(_) => {}
            Element::Binding(_) => {
                return Err(invalid(key, "sets are assembled from members, not bound directly"))
            }
            _ => return Err(invalid(key, "a set key only accepts set members")),
        }
    }
    let Some(assemble) = assemble else {
        return Err(invalid(key, "the set has no members or declaration"));
    };
    Ok(Binding::new(
        key.clone(),
        Provider::Internal(InternalProvider::SetAggregate { members, assemble }),
        Scope::Unscoped,
    ))
}

fn resolve_map(key: &Key, elements: &[Element]) -> Result<Binding, CollectError> {
    let mut entries: Vec<(Tag, Key)> = Vec::new();
    let mut assemble = None;
    for element in elements {
        match element {
            Element::MapBinding(map) => {
                assemble = Some(map.assemble);
                if let Some((map_key, member)) = &map.entry {
                    if entries.iter().any(|(existing, _)| existing == map_key) {
                        return Err(CollectError::DuplicateMapKey {
                            key: key.clone(),
                            map_key: map_key.clone(),
                        });
                    }
                    entries.push((map_key.clone(), member.clone()));
                }
            }
            Element::Eager(_) | Element::Expose(_) => {}
            Element::Binding(_) => {
                return Err(invalid(key, "maps are assembled from entries, not bound directly"))
            }
            _ => return Err(invalid(key, "a map key only accepts map entries")),
        }
    }
    let Some(assemble) = assemble else {
        return Err(invalid(key, "the map has no entries or declaration"));
    };
    Ok(Binding::new(
        key.clone(),
        Provider::Internal(InternalProvider::MapAggregate { entries, assemble }),
        Scope::Unscoped,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        binder::bind,
        elements::{eager, expose, overrides, private},
        multi::{map_binder, set_binder},
        scopes::SeededScopeManager,
        types::Instance,
    };

    fn const_of(collection: &ElementCollection, key: &Key) -> u32 {
        match collection.binding(key).map(Binding::provider) {
            Some(Provider::Const(instance)) => *instance.downcast::<u32>().unwrap(),
            other => panic!("expected a constant, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_scalar_binding_fails() {
        let elements = crate::elements![bind::<u32>().to_const(1), bind::<u32>().to_const(2)];
        assert!(matches!(
            ElementCollection::new(&elements),
            Err(CollectError::DuplicateKey(_))
        ));
    }

    #[test]
    fn tags_separate_keys() {
        let elements = crate::elements![
            bind::<u32>().to_const(1),
            bind::<u32>().tag("other").to_const(2),
        ];
        let collection = ElementCollection::new(&elements).unwrap();
        assert_eq!(const_of(&collection, &Key::of::<u32>()), 1);
        assert_eq!(const_of(&collection, &Key::tagged::<u32>("other")), 2);
    }

    #[test]
    fn overrides_replace_wholesale() {
        let plugins = set_binder::<u32>();
        let original = crate::elements![
            bind::<u32>().to_const(1),
            bind::<u32>().tag("a").to_const(10),
            plugins.bind(Key::tagged::<u32>("a")),
            plugins.bind(Key::of::<u32>()),
        ];
        let replacement = crate::elements![bind::<u32>().to_const(2), plugins.declare()];
        let collection =
            ElementCollection::new(&overrides(replacement, original).into()).unwrap();

        assert_eq!(const_of(&collection, &Key::of::<u32>()), 2);
        assert_eq!(const_of(&collection, &Key::tagged::<u32>("a")), 10);
        match collection.binding(&Key::set_of::<u32>()).map(Binding::provider) {
            Some(Provider::Internal(InternalProvider::SetAggregate { members, .. })) => {
                assert!(members.is_empty())
            }
            other => panic!("expected a set aggregate, got {other:?}"),
        }
    }

    #[test]
    fn private_keys_only_visible_when_exposed() {
        let elements: Elements = private(crate::elements![
            bind::<u32>().to_const(1).expose(),
            bind::<u8>().to_const(2),
        ])
        .into();
        let collection = ElementCollection::new(&elements).unwrap();

        assert!(matches!(
            collection.binding(&Key::of::<u32>()).map(Binding::provider),
            Some(Provider::Internal(InternalProvider::Exposed { .. }))
        ));
        assert!(!collection.contains(&Key::of::<u8>()));
        assert_eq!(collection.privates.len(), 1);
    }

    #[test]
    fn repeated_private_block_is_collected_once() {
        let block = private(crate::elements![bind::<u32>().to_const(1), expose(Key::of::<u32>())]);
        let elements = crate::elements![block.clone(), block];
        let collection = ElementCollection::new(&elements).unwrap();
        assert_eq!(collection.privates.len(), 1);
    }

    #[test]
    fn top_level_expose_is_ignored() {
        let elements = crate::elements![expose(Key::of::<u32>())];
        let collection = ElementCollection::new(&elements).unwrap();
        assert!(!collection.contains(&Key::of::<u32>()));
    }

    #[test]
    fn duplicate_map_entry_fails() {
        let handlers = map_binder::<u32>();
        let elements = crate::elements![
            handlers.bind("a", Key::of::<u32>()),
            handlers.bind("a", Key::tagged::<u32>("b")),
        ];
        assert!(matches!(
            ElementCollection::new(&elements),
            Err(CollectError::DuplicateMapKey { .. })
        ));
    }

    #[test]
    fn multi_key_rejects_direct_binding() {
        let elements = crate::elements![
            set_binder::<u32>().declare(),
            crate::elements::Element::Binding(Binding::new(
                Key::set_of::<u32>(),
                Provider::Const(Instance::new(1_u32)),
                Scope::Unscoped,
            )),
        ];
        assert!(matches!(
            ElementCollection::new(&elements),
            Err(CollectError::InvalidElement { .. })
        ));
    }

    #[test]
    fn injector_key_is_reserved() {
        let elements = crate::elements![crate::binder::bind_key::<u32>(Key::of::<Injector>())
            .to_const(1)];
        assert!(matches!(
            ElementCollection::new(&elements),
            Err(CollectError::ReservedKey(_))
        ));
    }

    #[test]
    fn seeded_scope_contributes_manager_and_groups_eager_keys() {
        let scope = Scope::seeded("request");
        let elements = crate::elements![
            crate::elements::bind_scope(scope.clone()),
            crate::elements::bind_scope_seed(Key::of::<String>(), scope.clone()),
            bind::<u32>().in_scope(scope.clone()).to_const(1).eager(),
            bind::<u8>().to_const(1),
            eager(Key::of::<u8>()),
        ];
        let collection = ElementCollection::new(&elements).unwrap();

        assert!(collection.contains(&Key::of::<SeededScopeManager>().with_tag("request")));
        assert_eq!(collection.declared_scopes(), &[scope.clone()]);
        assert_eq!(
            collection.seed_keys(&scope),
            HashSet::from([Key::of::<String>()])
        );
        assert_eq!(
            collection.eager_keys(&scope).collect::<Vec<_>>(),
            vec![&Key::of::<u32>()]
        );
        assert_eq!(
            collection.construction_eager_keys().collect::<Vec<_>>(),
            vec![&Key::of::<u8>()]
        );
    }
}
