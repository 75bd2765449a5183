use std::fmt;

use crate::{
    elements::PrivateId,
    injector::Injector,
    keys::{Key, Tag},
};

/// The child injector built for a private block
///
/// It is cached as a singleton of the enclosing injector, which owns it. The child
/// only keeps a weak reference back to the enclosing injector.
pub struct PrivateInjector(pub(crate) Injector);
impl PrivateInjector {
    pub fn injector(&self) -> &Injector {
        &self.0
    }
}
impl fmt::Debug for PrivateInjector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PrivateInjector").field(&self.0).finish()
    }
}

/// Key of the child injector of a private block
pub(crate) fn private_injector_key(id: PrivateId) -> Key {
    Key::of::<PrivateInjector>().with_tag(Tag::Id(id.as_tag()))
}
