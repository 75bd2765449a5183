use std::{borrow::Cow, fmt};

use crate::types::TypeInfo;

/// Disambiguates two keys of the same type
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum Tag {
    Name(Cow<'static, str>),
    Id(i64),
    /// A variant of a user enum, identified by the enum type and the variant name
    Variant {
        ty: TypeInfo,
        name: &'static str,
    },
}
impl Tag {
    pub fn name(name: impl Into<Cow<'static, str>>) -> Self {
        Tag::Name(name.into())
    }

    pub fn variant<E: 'static>(name: &'static str) -> Self {
        Tag::Variant {
            ty: TypeInfo::of::<E>(),
            name,
        }
    }
}
impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tag::Name(name) => write!(f, "{name:?}"),
            Tag::Id(id) => write!(f, "{id}"),
            Tag::Variant { ty, name } => write!(f, "{ty}::{name}"),
        }
    }
}
impl From<&'static str> for Tag {
    fn from(value: &'static str) -> Self {
        Tag::Name(Cow::Borrowed(value))
    }
}
impl From<String> for Tag {
    fn from(value: String) -> Self {
        Tag::Name(Cow::Owned(value))
    }
}
impl From<i64> for Tag {
    fn from(value: i64) -> Self {
        Tag::Id(value)
    }
}
impl From<i32> for Tag {
    fn from(value: i32) -> Self {
        Tag::Id(value.into())
    }
}

/// Whether a key addresses a single value or an aggregate of members
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Default)]
pub enum Multiplicity {
    #[default]
    Scalar,
    Set,
    Map,
}

/// The address under which a value is bound and looked up
///
/// Equality and hashing are structural over the type, the tag and the multiplicity.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct Key {
    pub ty: TypeInfo,
    pub tag: Option<Tag>,
    pub multi: Multiplicity,
}
impl Key {
    pub fn new(ty: TypeInfo) -> Self {
        Key {
            ty,
            tag: None,
            multi: Multiplicity::Scalar,
        }
    }

    pub fn of<T: 'static + ?Sized>() -> Self {
        Key::new(TypeInfo::of::<T>())
    }

    pub fn tagged<T: 'static + ?Sized>(tag: impl Into<Tag>) -> Self {
        Key::of::<T>().with_tag(tag)
    }

    /// Key of the aggregate set assembled from members of type `T`
    pub fn set_of<T: 'static + ?Sized>() -> Self {
        Key {
            multi: Multiplicity::Set,
            ..Key::of::<T>()
        }
    }

    /// Key of the aggregate map assembled from members of type `T`
    pub fn map_of<T: 'static + ?Sized>() -> Self {
        Key {
            multi: Multiplicity::Map,
            ..Key::of::<T>()
        }
    }

    pub fn with_tag(self, tag: impl Into<Tag>) -> Self {
        Key {
            tag: Some(tag.into()),
            ..self
        }
    }

    pub fn is_multi(&self) -> bool {
        self.multi != Multiplicity::Scalar
    }
}
impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.multi {
            Multiplicity::Scalar => write!(f, "{}", self.ty)?,
            Multiplicity::Set => write!(f, "Set<{}>", self.ty)?,
            Multiplicity::Map => write!(f, "Map<{}>", self.ty)?,
        }
        if let Some(tag) = &self.tag {
            write!(f, "[{tag}]")?;
        }
        Ok(())
    }
}
