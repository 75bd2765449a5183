use std::collections::{HashMap, HashSet};

use crate::{errors::InjectError, keys::Key, types::Instance};

/// Bookkeeping of one top-level provision
///
/// Values are memoized for the lifetime of the request, so a dependency shared by
/// several keys is provided once. Keys still being provided are tracked to detect cycles.
pub(crate) struct Request {
    memo: HashMap<Key, Instance>,
    in_progress: HashSet<Key>,
    stack: Vec<Key>,
    /// Depth already used by the requests this one was delegated from
    base_depth: usize,
    max_depth: usize,
}
impl Request {
    pub(crate) fn new(max_depth: usize) -> Self {
        Request {
            memo: HashMap::new(),
            in_progress: HashSet::new(),
            stack: Vec::new(),
            base_depth: 0,
            max_depth,
        }
    }

    /// An independent request for another injector, continuing the depth count
    pub(crate) fn nested(&self) -> Self {
        Request {
            base_depth: self.depth() + 1,
            ..Request::new(self.max_depth)
        }
    }

    pub(crate) fn depth(&self) -> usize {
        self.base_depth + self.stack.len()
    }

    pub(crate) fn memoized(&self, key: &Key) -> Option<&Instance> {
        self.memo.get(key)
    }

    pub(crate) fn enter(&mut self, key: &Key) -> Result<(), InjectError> {
        if self.in_progress.contains(key) {
            let mut chain = self.stack.clone();
            chain.push(key.clone());
            return Err(InjectError::CyclicDependency {
                key: key.clone(),
                chain,
            });
        }
        if self.depth() >= self.max_depth {
            return Err(InjectError::DepthExceeded {
                key: key.clone(),
                max_depth: self.max_depth,
            });
        }

        self.in_progress.insert(key.clone());
        self.stack.push(key.clone());
        Ok(())
    }

    pub(crate) fn exit(&mut self, key: &Key) {
        self.in_progress.remove(key);
        if self.stack.last() == Some(key) {
            self.stack.pop();
        }
    }

    pub(crate) fn remember(&mut self, key: &Key, value: Instance) {
        self.memo.insert(key.clone(), value);
    }
}
