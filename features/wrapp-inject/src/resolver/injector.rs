use crate::{
    errors::InjectError,
    injector::Injector,
    keys::Key,
    providers::Dependency,
    resolver::Resolver,
    types::Instance,
};

/// Factories may take the injector which is resolving them
impl Resolver for Injector {
    fn dependency() -> Dependency {
        Dependency::required(Key::of::<Injector>())
    }

    fn from_instance(instance: Option<Instance>) -> Result<Self, InjectError> {
        let instance = instance.ok_or_else(|| InjectError::UnboundKey(Key::of::<Injector>()))?;
        let injector = instance
            .downcast::<Injector>()
            .map_err(|actual_type| InjectError::DowncastFailed {
                required_type: std::any::type_name::<Injector>(),
                actual_type,
            })?;
        Ok(Injector::clone(&injector))
    }
}
