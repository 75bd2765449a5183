//! Aggregate bindings
//!
//! A multi-key is never bound directly. Each [SetBinding] or [MapBinding]
//! contributes one member key, and the collection synthesizes an aggregate
//! provider which asks the injector for every member and assembles the results.
//!
//! ```ignore
//! let plugins = set_binder::<Plugin>();
//! let elements = elements![
//!     bind::<Plugin>().tag("a").to_const(Plugin::A),
//!     bind::<Plugin>().tag("b").to_const(Plugin::B),
//!     plugins.bind(Key::tagged::<Plugin>("a")),
//!     plugins.bind(Key::tagged::<Plugin>("b")),
//! ];
//! let all: InjectSet<Plugin> = create_injector(elements)?.get_set::<Plugin>()?;
//! ```

use std::{any::type_name, collections::HashMap, fmt, marker::PhantomData, sync::Arc};

use crate::{
    elements::Element,
    errors::InjectError,
    keys::{Key, Tag},
    providers::{MapAssembler, SetAssembler},
    types::{Injectable, Instance},
};

/// Contributes a member key to a set multi-key
#[derive(Clone)]
pub struct SetBinding {
    pub multi_key: Key,
    /// `None` only declares the set, so it resolves even without members
    pub member: Option<Key>,
    pub(crate) assemble: SetAssembler,
}
impl fmt::Debug for SetBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetBinding")
            .field("multi_key", &self.multi_key)
            .field("member", &self.member)
            .finish()
    }
}

/// Contributes a member key under a map key to a map multi-key
#[derive(Clone)]
pub struct MapBinding {
    pub multi_key: Key,
    /// `None` only declares the map, so it resolves even without entries
    pub entry: Option<(Tag, Key)>,
    pub(crate) assemble: MapAssembler,
}
impl fmt::Debug for MapBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapBinding")
            .field("multi_key", &self.multi_key)
            .field("entry", &self.entry)
            .finish()
    }
}

/// Unordered collection of the members of a set multi-key
pub struct InjectSet<T> {
    items: Arc<[Arc<T>]>,
}
impl<T> Clone for InjectSet<T> {
    fn clone(&self) -> Self {
        InjectSet {
            items: self.items.clone(),
        }
    }
}
impl<T: fmt::Debug> fmt::Debug for InjectSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.items.iter()).finish()
    }
}
impl<T> InjectSet<T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iteration order is unspecified
    pub fn iter(&self) -> impl Iterator<Item = &Arc<T>> {
        self.items.iter()
    }

    pub fn contains(&self, value: &T) -> bool
    where
        T: PartialEq,
    {
        self.items.iter().any(|item| **item == *value)
    }
}
impl<'a, T> IntoIterator for &'a InjectSet<T> {
    type Item = &'a Arc<T>;
    type IntoIter = std::slice::Iter<'a, Arc<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Members of a map multi-key, by their declared map key
pub struct InjectMap<T> {
    items: Arc<HashMap<Tag, Arc<T>>>,
}
impl<T> Clone for InjectMap<T> {
    fn clone(&self) -> Self {
        InjectMap {
            items: self.items.clone(),
        }
    }
}
impl<T: fmt::Debug> fmt::Debug for InjectMap<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.items.iter()).finish()
    }
}
impl<T> InjectMap<T> {
    pub fn get(&self, key: &Tag) -> Option<&Arc<T>> {
        self.items.get(key)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Tag, &Arc<T>)> {
        self.items.iter()
    }
}

fn downcast_member<T: Injectable>(instance: &Instance) -> Result<Arc<T>, InjectError> {
    instance
        .downcast::<T>()
        .map_err(|actual_type| InjectError::DowncastFailed {
            required_type: type_name::<T>(),
            actual_type,
        })
}

fn assemble_set<T: Injectable>(members: Vec<Instance>) -> Result<Instance, InjectError> {
    let mut items: Vec<Arc<T>> = Vec::with_capacity(members.len());
    for member in &members {
        let item = downcast_member::<T>(member)?;
        // Two member keys resolving to the same shared value count once
        if !items.iter().any(|existing| Arc::ptr_eq(existing, &item)) {
            items.push(item);
        }
    }
    Ok(Instance::new(InjectSet::<T> {
        items: items.into(),
    }))
}

fn assemble_map<T: Injectable>(entries: Vec<(Tag, Instance)>) -> Result<Instance, InjectError> {
    let mut items = HashMap::with_capacity(entries.len());
    for (map_key, member) in &entries {
        items.insert(map_key.clone(), downcast_member::<T>(member)?);
    }
    Ok(Instance::new(InjectMap::<T> {
        items: Arc::new(items),
    }))
}

/// Declares members of the set multi-key of `T`
pub struct SetBinder<T> {
    multi_key: Key,
    _marker: PhantomData<fn() -> T>,
}
impl<T: Injectable> SetBinder<T> {
    pub fn new() -> Self {
        SetBinder {
            multi_key: Key::set_of::<T>(),
            _marker: PhantomData,
        }
    }

    /// Targets the set of `T` with the given tag instead
    pub fn tagged(tag: impl Into<Tag>) -> Self {
        SetBinder {
            multi_key: Key::set_of::<T>().with_tag(tag),
            _marker: PhantomData,
        }
    }

    pub fn multi_key(&self) -> &Key {
        &self.multi_key
    }

    /// Adds the value bound at `member` to the set
    pub fn bind(&self, member: Key) -> Element {
        Element::SetBinding(SetBinding {
            multi_key: self.multi_key.clone(),
            member: Some(member),
            assemble: assemble_set::<T>,
        })
    }

    /// Declares the set without adding a member
    pub fn declare(&self) -> Element {
        Element::SetBinding(SetBinding {
            multi_key: self.multi_key.clone(),
            member: None,
            assemble: assemble_set::<T>,
        })
    }
}
impl<T: Injectable> Default for SetBinder<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Declares entries of the map multi-key of `T`
pub struct MapBinder<T> {
    multi_key: Key,
    _marker: PhantomData<fn() -> T>,
}
impl<T: Injectable> MapBinder<T> {
    pub fn new() -> Self {
        MapBinder {
            multi_key: Key::map_of::<T>(),
            _marker: PhantomData,
        }
    }

    /// Targets the map of `T` with the given tag instead
    pub fn tagged(tag: impl Into<Tag>) -> Self {
        MapBinder {
            multi_key: Key::map_of::<T>().with_tag(tag),
            _marker: PhantomData,
        }
    }

    pub fn multi_key(&self) -> &Key {
        &self.multi_key
    }

    /// Adds the value bound at `member` to the map under `map_key`
    pub fn bind(&self, map_key: impl Into<Tag>, member: Key) -> Element {
        Element::MapBinding(MapBinding {
            multi_key: self.multi_key.clone(),
            entry: Some((map_key.into(), member)),
            assemble: assemble_map::<T>,
        })
    }

    /// Declares the map without adding an entry
    pub fn declare(&self) -> Element {
        Element::MapBinding(MapBinding {
            multi_key: self.multi_key.clone(),
            entry: None,
            assemble: assemble_map::<T>,
        })
    }
}
impl<T: Injectable> Default for MapBinder<T> {
    fn default() -> Self {
        Self::new()
    }
}

pub fn set_binder<T: Injectable>() -> SetBinder<T> {
    SetBinder::new()
}

pub fn map_binder<T: Injectable>() -> MapBinder<T> {
    MapBinder::new()
}
