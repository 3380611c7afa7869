//! Lifestyles: caching disciplines for registrations
//!
//! A [`Lifestyle`] is a stateless strategy. Whatever state a discipline needs
//! (the memoized singleton, a per-scope table, ...) lives in the
//! [`InstanceCache`] it creates for each registration, so producers sharing a
//! registration share that state.
//!
//! Custom disciplines only need a new cache type:
//!
//! ```rust
//! use composition_container::{Instance, InstanceCache, Lifestyle, Result};
//! use std::sync::Arc;
//!
//! /// Never caches; behaves like `Transient` under another name.
//! #[derive(Debug)]
//! struct AlwaysNew;
//!
//! struct Passthrough;
//!
//! impl InstanceCache for Passthrough {
//!     fn get_or_create(&self, create: &dyn Fn() -> Result<Instance>) -> Result<Instance> {
//!         create()
//!     }
//! }
//!
//! impl Lifestyle for AlwaysNew {
//!     fn name(&self) -> &'static str {
//!         "always-new"
//!     }
//!
//!     fn create_cache(&self) -> Arc<dyn InstanceCache> {
//!         Arc::new(Passthrough)
//!     }
//! }
//! ```

use crate::component::Component;
use crate::registration::Registration;
use crate::{Container, Instance, Result, Service};
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::{debug, trace};

/// Per-registration caching state created by a [`Lifestyle`].
pub trait InstanceCache: Send + Sync {
    /// Return a cached instance, or build one with `create`.
    fn get_or_create(&self, create: &dyn Fn() -> Result<Instance>) -> Result<Instance>;

    /// Whether this cache ever hands out the same instance twice.
    fn is_caching(&self) -> bool {
        true
    }
}

/// Caching discipline applied to a registration.
pub trait Lifestyle: Send + Sync + fmt::Debug + 'static {
    /// Human-readable name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Create the caching state for one registration.
    fn create_cache(&self) -> Arc<dyn InstanceCache>;

    /// Create a constructor-injected registration for `I` with this lifestyle.
    fn create_registration<I: Component>(&self, container: &Container) -> Result<Registration<I>>
    where
        Self: Sized,
    {
        Registration::component(container, self)
    }

    /// Create a registration that invokes `factory` with this lifestyle.
    fn create_factory_registration<S, F>(
        &self,
        container: &Container,
        factory: F,
    ) -> Registration<S>
    where
        Self: Sized,
        S: ?Sized + Service,
        F: Fn(&Container) -> Result<Arc<S>> + Send + Sync + 'static,
    {
        Registration::factory(container, self, factory)
    }
}

// =============================================================================
// Transient
// =============================================================================

/// A new instance on every resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Transient;

struct NoCache;

impl InstanceCache for NoCache {
    #[inline]
    fn get_or_create(&self, create: &dyn Fn() -> Result<Instance>) -> Result<Instance> {
        create()
    }

    #[inline]
    fn is_caching(&self) -> bool {
        false
    }
}

impl Lifestyle for Transient {
    fn name(&self) -> &'static str {
        "Transient"
    }

    fn create_cache(&self) -> Arc<dyn InstanceCache> {
        Arc::new(NoCache)
    }
}

// =============================================================================
// Singleton
// =============================================================================

/// One instance for the lifetime of the container.
///
/// Concurrent first resolutions converge on a single construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Singleton;

struct SingletonCache {
    instance: OnceCell<Instance>,
}

impl InstanceCache for SingletonCache {
    fn get_or_create(&self, create: &dyn Fn() -> Result<Instance>) -> Result<Instance> {
        if let Some(instance) = self.instance.get() {
            #[cfg(feature = "logging")]
            trace!(
                target: "composition_container",
                service = instance.type_name(),
                "Singleton already initialized, returning cached instance"
            );
            return Ok(instance.clone());
        }

        // OnceCell blocks concurrent initializers until the winner finishes.
        self.instance
            .get_or_try_init(|| {
                let instance = create()?;

                #[cfg(feature = "logging")]
                debug!(
                    target: "composition_container",
                    service = instance.type_name(),
                    "Singleton initialized on first access"
                );

                Ok(instance)
            })
            .cloned()
    }
}

impl Lifestyle for Singleton {
    fn name(&self) -> &'static str {
        "Singleton"
    }

    fn create_cache(&self) -> Arc<dyn InstanceCache> {
        Arc::new(SingletonCache {
            instance: OnceCell::new(),
        })
    }
}
