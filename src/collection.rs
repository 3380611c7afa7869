//! Collections of services
//!
//! A collection is registered per element key, either as a fixed snapshot of
//! instances ([`Container::register_all`]) or as a dynamic [`TypeList`]
//! resolved against the container every time it is enumerated
//! ([`Container::register_all_types`]). Requesting a collection nobody
//! registered yields an empty one.

use crate::compiler::Fallback;
use crate::component::{Component, ensure_constructable};
use crate::ledger::Ledger;
use crate::provider::{Caster, cast_instance};
use crate::{Container, DiError, Instance, Provides, Result, Service, ServiceKey};
use std::any::Any;
use std::fmt;
use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};

// =============================================================================
// Element Sources
// =============================================================================

/// One entry of a dynamic collection.
#[derive(Clone, Copy)]
pub(crate) struct ElementSource {
    key: ServiceKey,
    fallback: Fallback,
    cast: Caster,
    precheck: Option<fn(&'static str) -> Result<Vec<ServiceKey>>>,
}

/// Ordered list of element types for a dynamic collection of `S`.
///
/// # Examples
///
/// ```rust
/// use composition_container::{Component, Container, TypeList, provides};
///
/// trait Plugin: Send + Sync {
///     fn name(&self) -> &'static str;
/// }
///
/// struct Audit;
/// impl Plugin for Audit {
///     fn name(&self) -> &'static str { "audit" }
/// }
/// impl Component for Audit {
///     type Dependencies = ();
///     fn create(_: ()) -> Self { Audit }
/// }
/// provides!(Audit => dyn Plugin);
///
/// let container = Container::new();
/// container
///     .register_all_types(TypeList::<dyn Plugin>::new().with::<Audit>())
///     .unwrap();
///
/// let plugins = container.get_all_instances::<dyn Plugin>().unwrap();
/// let names: Vec<_> = plugins.iter().map(|p| p.unwrap().name()).collect();
/// assert_eq!(names, ["audit"]);
/// ```
pub struct TypeList<S: ?Sized> {
    sources: Vec<ElementSource>,
    _service: PhantomData<fn() -> Arc<S>>,
}

impl<S: ?Sized + Service> TypeList<S> {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            _service: PhantomData,
        }
    }

    /// Append a component; it is auto-registered as transient when the
    /// container has no registration for it.
    pub fn with<I: Component + Provides<S>>(mut self) -> Self {
        self.sources.push(ElementSource {
            key: ServiceKey::of::<I>(),
            fallback: Fallback::component::<I>(),
            cast: cast_instance::<I, S>,
            precheck: Some(ensure_constructable::<I>),
        });
        self
    }

    /// Append a service that must be registered (or handled by a
    /// resolve-unregistered subscriber) by the time the collection is
    /// enumerated.
    pub fn with_service<I: ?Sized + Service + Provides<S>>(mut self) -> Self {
        self.sources.push(ElementSource {
            key: ServiceKey::of::<I>(),
            fallback: Fallback::None,
            cast: cast_instance::<I, S>,
            precheck: None,
        });
        self
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Validate every element and hand the sources over.
    pub(crate) fn into_sources(self, param: &'static str) -> Result<Arc<[ElementSource]>> {
        for source in &self.sources {
            source.key.validate(param)?;
            if let Some(precheck) = source.precheck {
                precheck(param)?;
            }
        }
        Ok(self.sources.into())
    }
}

impl<S: ?Sized + Service> Default for TypeList<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: ?Sized> fmt::Debug for TypeList<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.sources.iter().map(|source| source.key))
            .finish()
    }
}

// =============================================================================
// Registered Elements
// =============================================================================

pub(crate) enum Elements<S: ?Sized> {
    Empty,
    /// Snapshot taken at registration time.
    Fixed(Arc<[Arc<S>]>),
    /// Resolved on every enumeration.
    Dynamic(Arc<[ElementSource]>),
}

impl<S: ?Sized> Clone for Elements<S> {
    fn clone(&self) -> Self {
        match self {
            Elements::Empty => Elements::Empty,
            Elements::Fixed(items) => Elements::Fixed(Arc::clone(items)),
            Elements::Dynamic(sources) => Elements::Dynamic(Arc::clone(sources)),
        }
    }
}

impl<S: ?Sized> Elements<S> {
    fn len(&self) -> usize {
        match self {
            Elements::Empty => 0,
            Elements::Fixed(items) => items.len(),
            Elements::Dynamic(sources) => sources.len(),
        }
    }
}

/// Type-erased collection registration stored in the ledger.
pub(crate) trait CollectionEntry: Send + Sync {
    fn element(&self) -> ServiceKey;

    fn is_dynamic(&self) -> bool;

    fn as_any(&self) -> &dyn Any;

    /// The collection as an erased `Collection<S>` instance.
    fn instantiate(&self, ledger: Weak<Ledger>) -> Instance;

    /// Enumerate every element, reporting the first failure.
    fn verify(&self, container: &Container) -> Result<()>;
}

pub(crate) struct CollectionRegistration<S: ?Sized> {
    pub(crate) elements: Elements<S>,
}

impl<S: ?Sized + Service> CollectionEntry for CollectionRegistration<S> {
    fn element(&self) -> ServiceKey {
        ServiceKey::of::<S>()
    }

    fn is_dynamic(&self) -> bool {
        matches!(self.elements, Elements::Dynamic(_))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn instantiate(&self, ledger: Weak<Ledger>) -> Instance {
        Instance::new(Arc::new(Collection {
            elements: self.elements.clone(),
            ledger,
        }))
    }

    fn verify(&self, container: &Container) -> Result<()> {
        let collection = Collection {
            elements: self.elements.clone(),
            ledger: Arc::downgrade(&container.ledger),
        };
        for item in collection.iter() {
            item.map_err(|err| DiError::InvalidCollection {
                element: std::any::type_name::<S>(),
                reason: err.to_string(),
            })?;
        }
        Ok(())
    }
}

/// An erased, empty `Collection<S>`.
pub(crate) fn empty_collection<S: ?Sized + Service>(ledger: Weak<Ledger>) -> Instance {
    Instance::new(Arc::new(Collection::<S>::new(Elements::Empty, ledger)))
}

// =============================================================================
// Collection
// =============================================================================

/// Every registered `S`, in registration order.
///
/// Elements of a dynamic collection are resolved lazily while iterating, so
/// each one follows its own lifestyle.
pub struct Collection<S: ?Sized> {
    elements: Elements<S>,
    ledger: Weak<Ledger>,
}

impl<S: ?Sized + Service> Collection<S> {
    pub(crate) fn new(elements: Elements<S>, ledger: Weak<Ledger>) -> Self {
        Self { elements, ledger }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether elements are resolved on every enumeration.
    #[inline]
    pub fn is_dynamic(&self) -> bool {
        matches!(self.elements, Elements::Dynamic(_))
    }

    /// Resolve the element at `index`.
    pub fn get(&self, index: usize) -> Option<Result<Arc<S>>> {
        match &self.elements {
            Elements::Empty => None,
            Elements::Fixed(items) => items.get(index).map(|item| Ok(Arc::clone(item))),
            Elements::Dynamic(sources) => sources.get(index).map(|source| self.resolve(source)),
        }
    }

    pub fn iter(&self) -> Instances<'_, S> {
        Instances {
            collection: self,
            index: 0,
        }
    }

    /// Resolve every element, stopping at the first failure.
    pub fn to_vec(&self) -> Result<Vec<Arc<S>>> {
        self.iter().collect()
    }

    fn resolve(&self, source: &ElementSource) -> Result<Arc<S>> {
        let ledger = self.ledger.upgrade().ok_or(DiError::ContainerDropped)?;
        let container = Container::from_ledger(ledger);

        let instance = container.resolve_key(source.key, source.fallback)?;
        (source.cast)(&instance)
            .and_then(|service| service.downcast::<S>())
            .ok_or_else(|| {
                DiError::Internal(format!(
                    "{} can not be handed out as {}",
                    instance.type_name(),
                    std::any::type_name::<S>()
                ))
            })
    }
}

impl<S: ?Sized> Clone for Collection<S> {
    fn clone(&self) -> Self {
        Self {
            elements: self.elements.clone(),
            ledger: Weak::clone(&self.ledger),
        }
    }
}

impl<S: ?Sized> fmt::Debug for Collection<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.elements {
            Elements::Empty => "empty",
            Elements::Fixed(_) => "fixed",
            Elements::Dynamic(_) => "dynamic",
        };
        f.debug_struct("Collection")
            .field("element", &std::any::type_name::<S>())
            .field("kind", &kind)
            .field("len", &self.elements.len())
            .finish()
    }
}

impl<'a, S: ?Sized + Service> IntoIterator for &'a Collection<S> {
    type Item = Result<Arc<S>>;
    type IntoIter = Instances<'a, S>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Lazy iterator over a [`Collection`].
pub struct Instances<'a, S: ?Sized> {
    collection: &'a Collection<S>,
    index: usize,
}

impl<S: ?Sized + Service> Iterator for Instances<'_, S> {
    type Item = Result<Arc<S>>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.collection.get(self.index)?;
        self.index += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.collection.len().saturating_sub(self.index);
        (remaining, Some(remaining))
    }
}

impl<S: ?Sized + Service> ExactSizeIterator for Instances<'_, S> {}

impl<S: ?Sized + Service> FusedIterator for Instances<'_, S> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provides;

    trait Plugin: Send + Sync {
        fn name(&self) -> &'static str;
    }

    struct Alpha;
    struct Beta;

    impl Plugin for Alpha {
        fn name(&self) -> &'static str {
            "alpha"
        }
    }

    impl Plugin for Beta {
        fn name(&self) -> &'static str {
            "beta"
        }
    }

    provides!(Alpha => dyn Plugin);
    provides!(Beta => dyn Plugin);

    impl Component for Alpha {
        type Dependencies = ();

        fn create(_: ()) -> Self {
            Alpha
        }
    }

    impl Component for Beta {
        type Dependencies = ();

        fn create(_: ()) -> Self {
            Beta
        }
    }

    fn names(collection: &Collection<dyn Plugin>) -> Vec<&'static str> {
        collection.iter().map(|p| p.unwrap().name()).collect()
    }

    #[test]
    fn test_unregistered_collection_is_empty() {
        let container = Container::new();
        let plugins = container.get_all_instances::<dyn Plugin>().unwrap();

        assert!(plugins.is_empty());
        assert_eq!(plugins.iter().count(), 0);
        assert!(plugins.get(0).is_none());
    }

    #[test]
    fn test_dynamic_collection_in_order() {
        let container = Container::new();
        container
            .register_all_types(TypeList::<dyn Plugin>::new().with::<Alpha>().with::<Beta>())
            .unwrap();

        let plugins = container.get_all_instances::<dyn Plugin>().unwrap();
        assert!(plugins.is_dynamic());
        assert_eq!(plugins.iter().len(), 2);
        assert_eq!(names(&plugins), ["alpha", "beta"]);
    }

    #[test]
    fn test_dynamic_collection_sees_later_registrations() {
        let container = Container::new();
        container
            .register_all_types(TypeList::<dyn Plugin>::new().with_service::<dyn Plugin>())
            .unwrap();

        // The element service is registered after the collection.
        container.register::<dyn Plugin, Beta>().unwrap();

        let plugins = container.get_all_instances::<dyn Plugin>().unwrap();
        assert_eq!(names(&plugins), ["beta"]);
    }

    #[test]
    fn test_dynamic_elements_follow_their_lifestyle() {
        let container = Container::new();
        container.register_single_concrete::<Alpha>().unwrap();
        container
            .register_all_types(TypeList::<dyn Plugin>::new().with::<Alpha>().with::<Beta>())
            .unwrap();

        let plugins = container.get_all_instances::<dyn Plugin>().unwrap();
        let first = plugins.to_vec().unwrap();
        let second = plugins.to_vec().unwrap();

        assert!(Arc::ptr_eq(&first[0], &second[0]));
        assert!(!Arc::ptr_eq(&first[1], &second[1]));
    }

    #[test]
    fn test_fixed_collection_is_a_snapshot() {
        let container = Container::new();
        let alpha: Arc<dyn Plugin> = Arc::new(Alpha);
        container
            .register_all::<dyn Plugin>([Arc::clone(&alpha), Arc::new(Beta) as Arc<dyn Plugin>])
            .unwrap();
        container.register::<dyn Plugin, Beta>().unwrap();

        let plugins = container.get_all_instances::<dyn Plugin>().unwrap();
        assert!(!plugins.is_dynamic());
        assert_eq!(names(&plugins), ["alpha", "beta"]);
        assert!(Arc::ptr_eq(&plugins.to_vec().unwrap()[0], &alpha));
    }

    #[test]
    fn test_missing_element_fails_enumeration() {
        let container = Container::new();
        container
            .register_all_types(TypeList::<dyn Plugin>::new().with_service::<dyn Plugin>())
            .unwrap();

        let plugins = container.get_all_instances::<dyn Plugin>().unwrap();
        let err = plugins.to_vec().err().unwrap();
        assert!(matches!(err, DiError::NotFound { .. }));

        let err = container.verify().unwrap_err();
        match err {
            DiError::InvalidCollection { element, .. } => assert!(element.contains("Plugin")),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!container.is_verified());
    }

    #[test]
    fn test_injected_collection() {
        struct Host {
            plugins: Collection<dyn Plugin>,
        }

        impl Component for Host {
            type Dependencies = Collection<dyn Plugin>;

            fn create(plugins: Collection<dyn Plugin>) -> Self {
                Host { plugins }
            }
        }

        let container = Container::new();
        container
            .register_all_types(TypeList::<dyn Plugin>::new().with::<Beta>())
            .unwrap();
        container.register_concrete::<Host>().unwrap();

        let host = container.get_instance::<Host>().unwrap();
        assert_eq!(names(&host.plugins), ["beta"]);
    }

    #[test]
    fn test_collection_by_key() {
        let container = Container::new();
        container
            .register_all_types(TypeList::<dyn Plugin>::new().with::<Alpha>())
            .unwrap();

        let instance = container
            .get_instance_by_key(ServiceKey::collection::<dyn Plugin>())
            .unwrap();
        let plugins = instance.downcast::<Collection<dyn Plugin>>().unwrap();
        assert_eq!(names(&plugins), ["alpha"]);
    }

    #[test]
    fn test_unregistered_collection_by_key_is_empty() {
        let container = Container::new();

        let instance = container
            .get_instance_by_key(ServiceKey::collection::<dyn Plugin>())
            .unwrap();
        let plugins = instance.downcast::<Collection<dyn Plugin>>().unwrap();
        assert!(plugins.is_empty());
        assert!(!container.contains_collection::<dyn Plugin>());
    }

    #[test]
    fn test_duplicate_collection_rejected() {
        let container = Container::new();
        container
            .register_all_types(TypeList::<dyn Plugin>::new().with::<Alpha>())
            .unwrap();

        let err = container
            .register_all::<dyn Plugin>([Arc::new(Beta) as Arc<dyn Plugin>])
            .unwrap_err();
        assert!(matches!(err, DiError::CollectionAlreadyRegistered { .. }));
    }
}
