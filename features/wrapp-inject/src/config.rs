/// Settings of an injector, inherited by the child injectors of its private blocks
#[derive(Debug, Clone)]
pub struct InjectorConfig {
    /// Maximum nesting of provisions before resolution fails with `DepthExceeded`
    pub max_depth: usize,
    /// Resolve the keys marked eager while building the injector
    pub eager: bool,
    /// Child injectors use the singleton and thread caches of their parent
    pub share_parent_scopes: bool,
}
impl Default for InjectorConfig {
    fn default() -> Self {
        Self {
            max_depth: 256,
            eager: true,
            share_parent_scopes: false,
        }
    }
}
impl InjectorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn eager(mut self, eager: bool) -> Self {
        self.eager = eager;
        self
    }

    pub fn share_parent_scopes(mut self, share: bool) -> Self {
        self.share_parent_scopes = share;
        self
    }
}
