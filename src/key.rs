//! Capability descriptors
//!
//! A [`ServiceKey`] is the identity under which a service is registered and
//! requested. Keys are built from Rust types only, so every key names a fully
//! closed type; the container hands every service out as `Arc<S>`.

use crate::collection::{Collection, empty_collection};
use crate::ledger::Ledger;
use crate::{DiError, Instance, Result, Service};
use ahash::RandomState;
use once_cell::sync::Lazy;
use std::any::{Any, TypeId};
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Weak;

/// Types that carry no meaning as a service identity.
static AMBIGUOUS_TYPES: Lazy<HashSet<TypeId, RandomState>> = Lazy::new(|| {
    [
        TypeId::of::<dyn Any>(),
        TypeId::of::<dyn Any + Send>(),
        TypeId::of::<dyn Any + Send + Sync>(),
        TypeId::of::<()>(),
        TypeId::of::<bool>(),
        TypeId::of::<char>(),
        TypeId::of::<str>(),
        TypeId::of::<String>(),
        TypeId::of::<u8>(),
        TypeId::of::<u16>(),
        TypeId::of::<u32>(),
        TypeId::of::<u64>(),
        TypeId::of::<u128>(),
        TypeId::of::<usize>(),
        TypeId::of::<i8>(),
        TypeId::of::<i16>(),
        TypeId::of::<i32>(),
        TypeId::of::<i64>(),
        TypeId::of::<i128>(),
        TypeId::of::<isize>(),
        TypeId::of::<f32>(),
        TypeId::of::<f64>(),
    ]
    .into_iter()
    .collect()
});

#[derive(Clone, Copy)]
enum KeyShape {
    Service,
    Collection {
        element: TypeId,
        element_name: &'static str,
        empty: fn(Weak<Ledger>) -> Instance,
    },
}

/// Identity by which a service is requested.
///
/// Equality and hashing only consider the underlying `TypeId`.
#[derive(Clone, Copy)]
pub struct ServiceKey {
    type_id: TypeId,
    type_name: &'static str,
    shape: KeyShape,
}

impl ServiceKey {
    /// Key for the service type `S` (usually a `dyn Trait` or a concrete struct).
    #[inline]
    pub fn of<S: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<S>(),
            type_name: std::any::type_name::<S>(),
            shape: KeyShape::Service,
        }
    }

    /// Key for "the collection of `S`".
    #[inline]
    pub fn collection<S: ?Sized + Service>() -> Self {
        Self {
            type_id: TypeId::of::<Collection<S>>(),
            type_name: std::any::type_name::<Collection<S>>(),
            shape: KeyShape::Collection {
                element: TypeId::of::<S>(),
                element_name: std::any::type_name::<S>(),
                empty: empty_collection::<S>,
            },
        }
    }

    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    #[inline]
    pub fn is_collection(&self) -> bool {
        matches!(self.shape, KeyShape::Collection { .. })
    }

    /// The element key, when this is a collection key.
    pub fn element(&self) -> Option<ServiceKey> {
        match self.shape {
            KeyShape::Service => None,
            KeyShape::Collection {
                element,
                element_name,
                ..
            } => Some(ServiceKey {
                type_id: element,
                type_name: element_name,
                shape: KeyShape::Service,
            }),
        }
    }

    /// An empty collection for a collection key.
    pub(crate) fn empty_collection(&self, ledger: Weak<Ledger>) -> Option<Instance> {
        match self.shape {
            KeyShape::Service => None,
            KeyShape::Collection { empty, .. } => Some(empty(ledger)),
        }
    }

    /// Whether the key names a type that can't serve as a service identity.
    #[inline]
    pub fn is_ambiguous(&self) -> bool {
        AMBIGUOUS_TYPES.contains(&self.type_id)
    }

    /// Reject ambiguous keys, blaming `param`.
    pub fn validate(self, param: &'static str) -> Result<Self> {
        if self.is_ambiguous() {
            return Err(DiError::AmbiguousType {
                param,
                type_name: self.type_name,
            });
        }
        Ok(self)
    }
}

impl PartialEq for ServiceKey {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for ServiceKey {}

impl Hash for ServiceKey {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ServiceKey").field(&self.to_string()).finish()
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.shape {
            KeyShape::Service => f.write_str(self.type_name),
            KeyShape::Collection { element_name, .. } => {
                write!(f, "collection of {element_name}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Plugin: Send + Sync {}

    struct Concrete;

    #[test]
    fn test_keys_compare_by_type() {
        assert_eq!(ServiceKey::of::<Concrete>(), ServiceKey::of::<Concrete>());
        assert_ne!(ServiceKey::of::<Concrete>(), ServiceKey::of::<dyn Plugin>());
        assert_ne!(
            ServiceKey::of::<dyn Plugin>(),
            ServiceKey::collection::<dyn Plugin>()
        );
    }

    #[test]
    fn test_collection_key() {
        let key = ServiceKey::collection::<dyn Plugin>();
        assert!(key.is_collection());
        assert_eq!(key.element(), Some(ServiceKey::of::<dyn Plugin>()));
        assert!(key.to_string().starts_with("collection of "));
        assert_eq!(ServiceKey::of::<Concrete>().element(), None);
    }

    #[test]
    fn test_ambiguous_types_rejected() {
        let err = ServiceKey::of::<String>().validate("S").unwrap_err();
        assert!(err.is_argument());
        assert_eq!(err.param(), Some("S"));

        assert!(ServiceKey::of::<dyn Any + Send + Sync>().is_ambiguous());
        assert!(ServiceKey::of::<u64>().validate("S").is_err());
        assert!(ServiceKey::of::<dyn Plugin>().validate("S").is_ok());
        assert!(ServiceKey::of::<Concrete>().validate("S").is_ok());
    }
}
