use std::{
    collections::{HashMap, HashSet},
    fmt,
};

use thiserror::Error;

use crate::{
    collection::ElementCollection,
    injector::Injector,
    keys::Key,
    providers::Dependency,
};

/// Graph of the bindings of one injector
///
/// Used to report missing dependencies and cycles before anything is provided,
/// and renders as a readable list of keys and their dependencies.
pub struct DependencyGraph {
    map: HashMap<Key, DependencyGraphEntry>,
    /// Bound keys sorted by their rendering
    order: Vec<Key>,
    /// Keys bound by a parent injector
    external: HashSet<Key>,
}
impl DependencyGraph {
    pub fn new(collection: &ElementCollection, external: impl IntoIterator<Item = Key>) -> Self {
        let mut graph = Self {
            map: Default::default(),
            order: Vec::new(),
            external: external.into_iter().collect(),
        };
        graph.external.insert(Key::of::<Injector>());

        for binding in collection.bindings() {
            graph.order.push(binding.key().clone());
            graph.map.insert(
                binding.key().clone(),
                DependencyGraphEntry {
                    key: binding.key().clone(),
                    dependencies: binding.provider().dependencies(),
                },
            );
        }

        graph.order.sort_by_cached_key(|key| key.to_string());
        graph
    }

    fn entries(&self) -> impl Iterator<Item = &DependencyGraphEntry> {
        self.order.iter().filter_map(|key| self.map.get(key))
    }

    /// Validate the graph
    ///
    /// Returns a list of all issues
    pub fn check(&self) -> Result<(), DependencyGraphErrors> {
        let mut checked = HashSet::new();
        let mut errors = Vec::new();
        for entry in self.entries() {
            let mut dependency_chain = Vec::new();
            check_recurse(
                self,
                &mut checked,
                &mut errors,
                &mut dependency_chain,
                entry,
            );
        }

        if !errors.is_empty() {
            return Err(DependencyGraphErrors { errors });
        }

        return Ok(());

        fn check_recurse(
            graph: &DependencyGraph,
            checked: &mut HashSet<Key>,
            errors: &mut Vec<DependencyGraphError>,
            dependency_chain: &mut Vec<Key>,
            entry: &DependencyGraphEntry,
        ) {
            if let Some(position) = dependency_chain.iter().position(|key| *key == entry.key) {
                let mut chain = dependency_chain[position..].to_vec();
                chain.push(entry.key.clone());
                errors.push(DependencyGraphError::CircularDependency {
                    key: entry.key.clone(),
                    chain,
                });
                return;
            }

            if !checked.insert(entry.key.clone()) {
                return;
            };

            dependency_chain.push(entry.key.clone());

            for dependency in &entry.dependencies {
                let Some(next_entry) = graph.map.get(&dependency.key) else {
                    if !dependency.optional && !graph.external.contains(&dependency.key) {
                        errors.push(DependencyGraphError::MissingDependency {
                            dependency: dependency.key.clone(),
                            required_by: entry.key.clone(),
                        });
                    }

                    continue;
                };

                check_recurse(graph, checked, errors, dependency_chain, next_entry);
            }

            dependency_chain.pop();
        }
    }
}
impl fmt::Display for DependencyGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in self.entries() {
            write!(f, "{}", entry.key)?;
            if entry.dependencies.is_empty() {
                writeln!(f)?;
                continue;
            }
            let dependencies: Vec<String> = entry
                .dependencies
                .iter()
                .map(|dependency| match dependency.optional {
                    true => format!("{}?", dependency.key),
                    false => dependency.key.to_string(),
                })
                .collect();
            writeln!(f, " <- {}", dependencies.join(", "))?;
        }
        Ok(())
    }
}

struct DependencyGraphEntry {
    key: Key,
    dependencies: Vec<Dependency>,
}

#[derive(Error, Debug, Clone)]
pub enum DependencyGraphError {
    #[error("'{required_by}' needs '{dependency}' but it is missing")]
    MissingDependency { dependency: Key, required_by: Key },
    #[error("A Circular Dependency exists on '{key}' through {chain:?}")]
    CircularDependency { key: Key, chain: Vec<Key> },
}
impl std::fmt::Display for DependencyGraphErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut display = Vec::new();
        display.push("The dependency graph had one or more errors:".to_string());
        for error in &self.errors {
            display.push(format!("- {}", error));
        }
        f.write_str(&display.join("\n"))
    }
}

#[derive(Error, Debug, Clone)]
pub struct DependencyGraphErrors {
    pub errors: Vec<DependencyGraphError>,
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{binder::bind, elements};

    fn graph(elements: crate::Elements) -> DependencyGraph {
        DependencyGraph::new(&ElementCollection::new(&elements).unwrap(), [])
    }

    #[test]
    fn reports_missing_and_cyclic_dependencies_together() {
        let graph = graph(elements![
            bind::<u8>().to_fn(|v: Arc<u16>| *v as u8),
            bind::<u16>().to_fn(|v: Arc<u8>| *v as u16),
            bind::<u32>().to_fn(|v: Arc<u64>| *v as u32),
        ]);
        let errors = graph.check().unwrap_err().errors;
        assert_eq!(errors.len(), 2);
        assert!(errors
            .iter()
            .any(|error| matches!(error, DependencyGraphError::CircularDependency { .. })));
        assert!(errors.iter().any(|error| matches!(
            error,
            DependencyGraphError::MissingDependency { dependency, .. } if *dependency == Key::of::<u64>()
        )));
    }

    #[test]
    fn optional_and_external_dependencies_are_satisfied() {
        let elements = elements![
            bind::<u8>().to_fn(|_: Option<Arc<u16>>, v: Arc<u32>| *v as u8),
            bind::<String>().to_fn(|_: Injector| String::new()),
        ];
        let collection = ElementCollection::new(&elements).unwrap();
        assert!(DependencyGraph::new(&collection, [Key::of::<u32>()])
            .check()
            .is_ok());
        assert!(DependencyGraph::new(&collection, []).check().is_err());
    }

    #[test]
    fn display_lists_dependencies() {
        let graph = graph(elements![
            bind::<u32>().to_const(420),
            bind::<String>().to_fn(|v: Arc<u32>| v.to_string()),
        ]);
        let rendered = graph.to_string();
        assert!(rendered.contains(&format!(
            "{} <- {}",
            Key::of::<String>(),
            Key::of::<u32>()
        )));
    }
}
