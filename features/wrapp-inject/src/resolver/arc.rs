use std::{any::type_name, sync::Arc};

use crate::{
    errors::InjectError,
    keys::Key,
    providers::Dependency,
    resolver::Resolver,
    types::{Injectable, Instance},
};

impl<T: Injectable> Resolver for Arc<T> {
    fn dependency() -> Dependency {
        Dependency::required(Key::of::<T>())
    }

    fn from_instance(instance: Option<Instance>) -> Result<Self, InjectError> {
        let instance = instance.ok_or_else(|| InjectError::UnboundKey(Key::of::<T>()))?;
        instance
            .downcast::<T>()
            .map_err(|actual_type| InjectError::DowncastFailed {
                required_type: type_name::<T>(),
                actual_type,
            })
    }
}

impl<Resolvable: Resolver> Resolver for Option<Resolvable> {
    fn dependency() -> Dependency {
        let original = Resolvable::dependency();
        Dependency {
            optional: true,
            ..original
        }
    }

    fn from_instance(instance: Option<Instance>) -> Result<Self, InjectError> {
        match instance {
            Some(instance) => Resolvable::from_instance(Some(instance)).map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_marks_dependency_optional() {
        let dependency = <Option<Arc<String>>>::dependency();
        assert!(dependency.optional);
        assert_eq!(dependency.key, Key::of::<String>());
        assert!(!<Arc<String>>::dependency().optional);
    }

    #[test]
    fn wrong_type_fails_downcast() {
        let result = <Arc<String>>::from_instance(Some(Instance::new(5_i32)));
        assert!(matches!(
            result,
            Err(InjectError::DowncastFailed {
                actual_type: "i32",
                ..
            })
        ));
    }
}
