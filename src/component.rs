//! Constructor injection
//!
//! A [`Component`] declares its dependencies as a type and how to build itself
//! from them. The container resolves the dependencies, calls
//! [`Component::create`] and runs the matching instance initializers.
//!
//! # Example
//!
//! ```rust
//! use composition_container::{Component, Container, provides};
//! use std::sync::Arc;
//!
//! trait Logger: Send + Sync {
//!     fn log(&self, message: &str);
//! }
//!
//! struct ConsoleLogger;
//!
//! impl Logger for ConsoleLogger {
//!     fn log(&self, message: &str) {
//!         println!("{message}");
//!     }
//! }
//!
//! impl Component for ConsoleLogger {
//!     type Dependencies = ();
//!
//!     fn create(_: ()) -> Self {
//!         ConsoleLogger
//!     }
//! }
//!
//! provides!(ConsoleLogger => dyn Logger);
//!
//! struct UserService {
//!     logger: Arc<dyn Logger>,
//! }
//!
//! impl Component for UserService {
//!     type Dependencies = Arc<dyn Logger>;
//!
//!     fn create(logger: Arc<dyn Logger>) -> Self {
//!         UserService { logger }
//!     }
//! }
//!
//! let container = Container::new();
//! container.register_single::<dyn Logger, ConsoleLogger>().unwrap();
//! container.register_concrete::<UserService>().unwrap();
//!
//! let users = container.get_instance::<UserService>().unwrap();
//! users.logger.log("ready");
//! ```

use crate::collection::Collection;
use crate::provider::{Caster, cast_instance};
use crate::{Container, DiError, Provides, Result, Service, ServiceKey};
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::Arc;

// =============================================================================
// Component Trait
// =============================================================================

/// A concrete type the container can construct.
pub trait Component: Service + Sized {
    /// The dependencies required to create this component.
    ///
    /// Use `()` for no dependencies, `Arc<S>` for one, or tuples for several.
    type Dependencies: Dependencies;

    /// Create a new instance given the resolved dependencies.
    fn create(deps: Self::Dependencies) -> Self;

    /// Declare additional services this component provides, so instance
    /// initializers registered for them also run on it.
    ///
    /// The component itself and the service it is resolved as are always
    /// part of the set.
    fn capabilities(_capabilities: &mut Capabilities<Self>) {}
}

// =============================================================================
// Dependencies Trait
// =============================================================================

/// Types that can be resolved from a container as constructor arguments.
///
/// Implemented for:
/// - `()` - no dependencies
/// - `Arc<S>` - a required service
/// - `Option<Arc<S>>` - an optional service
/// - `Collection<S>` - every registered `S`
/// - `Concrete<T>` - a component, auto-registered as transient if needed
/// - tuples of the above (up to 12)
pub trait Dependencies: Sized {
    /// Descriptors this dependency set asks for.
    fn keys() -> Vec<ServiceKey>;

    /// Resolve the dependencies from the container.
    fn resolve(container: &Container) -> Result<Self>;
}

impl Dependencies for () {
    #[inline]
    fn keys() -> Vec<ServiceKey> {
        Vec::new()
    }

    #[inline]
    fn resolve(_container: &Container) -> Result<Self> {
        Ok(())
    }
}

impl<S: ?Sized + Service> Dependencies for Arc<S> {
    #[inline]
    fn keys() -> Vec<ServiceKey> {
        vec![ServiceKey::of::<S>()]
    }

    #[inline]
    fn resolve(container: &Container) -> Result<Self> {
        container.get_instance::<S>()
    }
}

impl<S: ?Sized + Service> Dependencies for Option<Arc<S>> {
    #[inline]
    fn keys() -> Vec<ServiceKey> {
        vec![ServiceKey::of::<S>()]
    }

    fn resolve(container: &Container) -> Result<Self> {
        match container.get_instance::<S>() {
            Ok(service) => Ok(Some(service)),
            // Only a missing `S` makes the dependency absent; a missing
            // transitive dependency is still a configuration defect.
            Err(DiError::NotFound { type_name }) if type_name == std::any::type_name::<S>() => {
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}

impl<S: ?Sized + Service> Dependencies for Collection<S> {
    #[inline]
    fn keys() -> Vec<ServiceKey> {
        vec![ServiceKey::collection::<S>()]
    }

    #[inline]
    fn resolve(container: &Container) -> Result<Self> {
        container.get_all_instances::<S>()
    }
}

/// A concrete component dependency.
///
/// Unlike `Arc<T>`, resolving a `Concrete<T>` registers `T` as transient when
/// nothing registered it and no resolve-unregistered subscriber handled it.
pub struct Concrete<T>(pub Arc<T>);

impl<T> Concrete<T> {
    #[inline]
    pub fn into_inner(self) -> Arc<T> {
        self.0
    }
}

impl<T> Deref for Concrete<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: Component> Dependencies for Concrete<T> {
    #[inline]
    fn keys() -> Vec<ServiceKey> {
        vec![ServiceKey::of::<T>()]
    }

    #[inline]
    fn resolve(container: &Container) -> Result<Self> {
        container.get_concrete::<T>().map(Concrete)
    }
}

macro_rules! impl_dependencies_tuple {
    ($($T:ident),+) => {
        impl<$($T: Dependencies),+> Dependencies for ($($T,)+) {
            fn keys() -> Vec<ServiceKey> {
                let mut keys = Vec::new();
                $(keys.extend($T::keys());)+
                keys
            }

            #[inline]
            fn resolve(container: &Container) -> Result<Self> {
                Ok(($($T::resolve(container)?,)+))
            }
        }
    };
}

impl_dependencies_tuple!(A);
impl_dependencies_tuple!(A, B);
impl_dependencies_tuple!(A, B, C);
impl_dependencies_tuple!(A, B, C, D);
impl_dependencies_tuple!(A, B, C, D, E);
impl_dependencies_tuple!(A, B, C, D, E, F);
impl_dependencies_tuple!(A, B, C, D, E, F, G);
impl_dependencies_tuple!(A, B, C, D, E, F, G, H);
impl_dependencies_tuple!(A, B, C, D, E, F, G, H, I);
impl_dependencies_tuple!(A, B, C, D, E, F, G, H, I, J);
impl_dependencies_tuple!(A, B, C, D, E, F, G, H, I, J, K);
impl_dependencies_tuple!(A, B, C, D, E, F, G, H, I, J, K, L);

// =============================================================================
// Capabilities
// =============================================================================

/// One entry of a component's capability hierarchy.
#[derive(Clone, Copy)]
pub(crate) struct Capability {
    pub(crate) key: ServiceKey,
    pub(crate) cast: Caster,
}

/// The services a component declares it provides.
pub struct Capabilities<T> {
    entries: Vec<Capability>,
    _component: PhantomData<fn() -> T>,
}

impl<T: Component> Capabilities<T> {
    pub(crate) fn collect() -> Vec<Capability> {
        let mut capabilities = Self {
            entries: vec![Capability {
                key: ServiceKey::of::<T>(),
                cast: cast_instance::<T, T>,
            }],
            _component: PhantomData,
        };
        T::capabilities(&mut capabilities);
        capabilities.entries
    }

    /// Add `S` to the capability hierarchy.
    pub fn add<S>(&mut self) -> &mut Self
    where
        S: ?Sized + Service,
        T: Provides<S>,
    {
        let key = ServiceKey::of::<S>();
        if !self.entries.iter().any(|c| c.key == key) {
            self.entries.push(Capability {
                key,
                cast: cast_instance::<T, S>,
            });
        }
        self
    }
}

// =============================================================================
// Constructability Check
// =============================================================================

/// Reject components whose constructor asks for ambiguous types.
pub(crate) fn ensure_constructable<T: Component>(param: &'static str) -> Result<Vec<ServiceKey>> {
    let keys = T::Dependencies::keys();
    if let Some(bad) = keys.iter().find(|key| key.is_ambiguous()) {
        return Err(DiError::invalid_argument(
            param,
            format!(
                "{} can not be constructed: its constructor depends on {}, which is not a valid service type",
                std::any::type_name::<T>(),
                bad
            ),
        ));
    }
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Clock: Send + Sync {}

    struct SystemClock;
    impl Clock for SystemClock {}
    crate::provides!(SystemClock => dyn Clock);

    impl Component for SystemClock {
        type Dependencies = ();

        fn create(_: ()) -> Self {
            SystemClock
        }

        fn capabilities(capabilities: &mut Capabilities<Self>) {
            capabilities.add::<dyn Clock>().add::<dyn Clock>();
        }
    }

    struct Scheduler;

    impl Component for Scheduler {
        type Dependencies = (Arc<dyn Clock>, Option<Arc<SystemClock>>, Collection<dyn Clock>);

        fn create(_: Self::Dependencies) -> Self {
            Scheduler
        }
    }

    struct Misconfigured;

    impl Component for Misconfigured {
        type Dependencies = (Arc<dyn Clock>, Arc<String>);

        fn create(_: Self::Dependencies) -> Self {
            Misconfigured
        }
    }

    #[test]
    fn test_dependency_keys() {
        let keys = <Scheduler as Component>::Dependencies::keys();
        assert_eq!(
            keys,
            vec![
                ServiceKey::of::<dyn Clock>(),
                ServiceKey::of::<SystemClock>(),
                ServiceKey::collection::<dyn Clock>(),
            ]
        );
    }

    #[test]
    fn test_capabilities_deduplicated() {
        let capabilities = Capabilities::<SystemClock>::collect();
        let keys: Vec<_> = capabilities.iter().map(|c| c.key).collect();
        assert_eq!(
            keys,
            vec![ServiceKey::of::<SystemClock>(), ServiceKey::of::<dyn Clock>()]
        );
    }

    #[test]
    fn test_constructability_check() {
        assert_eq!(ensure_constructable::<Scheduler>("I").unwrap().len(), 3);

        let err = ensure_constructable::<Misconfigured>("I").unwrap_err();
        assert!(err.is_argument());
        assert_eq!(err.param(), Some("I"));
        assert!(err.to_string().contains("String"));
    }
}
