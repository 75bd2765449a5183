use crate::{errors::InjectError, providers::Dependency, types::Instance};

pub mod aggregate;
pub mod arc;
pub mod injector;

/// A type a factory may take as a parameter
///
/// The parameter type decides which key is requested and how the resolved
/// instance is turned back into a typed value.
pub trait Resolver: Sized {
    /// The dependency the parameter declares
    fn dependency() -> Dependency;

    /// Converts the resolved instance, `None` if an optional dependency was unbound
    fn from_instance(instance: Option<Instance>) -> Result<Self, InjectError>;
}
