use std::any::type_name;

use crate::{
    errors::InjectError,
    keys::Key,
    multi::{InjectMap, InjectSet},
    providers::Dependency,
    resolver::Resolver,
    types::{Injectable, Instance},
};

impl<T: Injectable> Resolver for InjectSet<T> {
    fn dependency() -> Dependency {
        Dependency::required(Key::set_of::<T>())
    }

    fn from_instance(instance: Option<Instance>) -> Result<Self, InjectError> {
        let instance = instance.ok_or_else(|| InjectError::UnboundKey(Key::set_of::<T>()))?;
        let set = instance
            .downcast::<InjectSet<T>>()
            .map_err(|actual_type| InjectError::DowncastFailed {
                required_type: type_name::<InjectSet<T>>(),
                actual_type,
            })?;
        Ok(InjectSet::clone(&set))
    }
}

impl<T: Injectable> Resolver for InjectMap<T> {
    fn dependency() -> Dependency {
        Dependency::required(Key::map_of::<T>())
    }

    fn from_instance(instance: Option<Instance>) -> Result<Self, InjectError> {
        let instance = instance.ok_or_else(|| InjectError::UnboundKey(Key::map_of::<T>()))?;
        let map = instance
            .downcast::<InjectMap<T>>()
            .map_err(|actual_type| InjectError::DowncastFailed {
                required_type: type_name::<InjectMap<T>>(),
                actual_type,
            })?;
        Ok(InjectMap::clone(&map))
    }
}
