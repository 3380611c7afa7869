//! Registrations: recipes for producing instances
//!
//! A [`Registration`] is created by a [`Lifestyle`] for exactly one container
//! and may be shared by several services through
//! [`Container::add_registration`](crate::Container::add_registration).
//! Sharing a singleton registration shares its instance.

use crate::component::{
    Capabilities, Capability, Component, Dependencies, ensure_constructable,
};
use crate::ledger::ContainerId;
use crate::lifestyle::{InstanceCache, Lifestyle};
use crate::plan::{Activator, BuildPlan};
use crate::provider::Caster;
use crate::{Container, Instance, Result, Service, ServiceKey};
use parking_lot::Mutex;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique registration identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistrationId(u64);

impl RegistrationId {
    #[inline]
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// How a registration produces its raw instance.
pub(crate) enum Source {
    /// Constructor injection of a [`Component`].
    Construct {
        dependencies: Vec<ServiceKey>,
        activator: Activator,
        capabilities: Vec<Capability>,
    },
    /// A user-supplied factory.
    Factory { activator: Activator },
    /// A fixed, user-supplied instance.
    Instance(Instance),
}

pub(crate) struct RegistrationCore {
    pub(crate) id: RegistrationId,
    pub(crate) container: ContainerId,
    pub(crate) implementation: ServiceKey,
    pub(crate) lifestyle: &'static str,
    pub(crate) cache: Arc<dyn InstanceCache>,
    pub(crate) source: Source,
    /// Every service this registration is handed out as, in the order added.
    services: Mutex<Vec<(ServiceKey, Caster)>>,
}

impl RegistrationCore {
    fn new(
        container: &Container,
        implementation: ServiceKey,
        lifestyle: &dyn Lifestyle,
        source: Source,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: RegistrationId::next(),
            container: container.id(),
            implementation,
            lifestyle: lifestyle.name(),
            cache: lifestyle.create_cache(),
            source,
            services: Mutex::new(Vec::new()),
        })
    }

    /// The plan before any hook, initializer or lifestyle touches it.
    pub(crate) fn raw_plan(&self) -> BuildPlan {
        match &self.source {
            Source::Construct {
                dependencies,
                activator,
                ..
            } => BuildPlan::Construct {
                implementation: self.implementation,
                dependencies: dependencies.clone(),
                activator: Arc::clone(activator),
            },
            Source::Factory { activator } => BuildPlan::Factory {
                service: self.implementation,
                activator: Arc::clone(activator),
            },
            Source::Instance(instance) => BuildPlan::Constant(instance.clone()),
        }
    }

    #[inline]
    pub(crate) fn is_constructor_injected(&self) -> bool {
        matches!(self.source, Source::Construct { .. })
    }

    pub(crate) fn capabilities(&self) -> &[Capability] {
        match &self.source {
            Source::Construct { capabilities, .. } => capabilities,
            _ => &[],
        }
    }

    /// Record that a producer hands this registration out as `service`.
    pub(crate) fn record_service(&self, service: ServiceKey, cast: Caster) {
        let mut services = self.services.lock();
        if !services.iter().any(|(key, _)| *key == service) {
            services.push((service, cast));
        }
    }

    pub(crate) fn services(&self) -> Vec<(ServiceKey, Caster)> {
        self.services.lock().clone()
    }

    /// The first service this registration was added under, or the
    /// implementation when it was never added.
    pub(crate) fn primary_service(&self) -> ServiceKey {
        self.services
            .lock()
            .first()
            .map_or(self.implementation, |(key, _)| *key)
    }
}

/// A recipe for producing `I`, bound to one container.
pub struct Registration<I: ?Sized> {
    pub(crate) core: Arc<RegistrationCore>,
    _implementation: PhantomData<fn() -> Arc<I>>,
}

impl<I: ?Sized + Service> Registration<I> {
    fn from_core(core: Arc<RegistrationCore>) -> Self {
        Self {
            core,
            _implementation: PhantomData,
        }
    }

    pub(crate) fn component(container: &Container, lifestyle: &dyn Lifestyle) -> Result<Self>
    where
        I: Component,
    {
        let dependencies = ensure_constructable::<I>("I")?;
        let activator: Activator = Arc::new(|container: &Container| {
            let deps = I::Dependencies::resolve(container)?;
            Ok(Instance::new(Arc::new(I::create(deps))))
        });

        Ok(Self::from_core(RegistrationCore::new(
            container,
            ServiceKey::of::<I>(),
            lifestyle,
            Source::Construct {
                dependencies,
                activator,
                capabilities: Capabilities::<I>::collect(),
            },
        )))
    }

    pub(crate) fn factory<F>(container: &Container, lifestyle: &dyn Lifestyle, factory: F) -> Self
    where
        F: Fn(&Container) -> Result<Arc<I>> + Send + Sync + 'static,
    {
        let activator: Activator =
            Arc::new(move |container: &Container| Ok(Instance::new(factory(container)?)));

        Self::from_core(RegistrationCore::new(
            container,
            ServiceKey::of::<I>(),
            lifestyle,
            Source::Factory { activator },
        ))
    }

    pub(crate) fn instance(container: &Container, lifestyle: &dyn Lifestyle, instance: Arc<I>) -> Self {
        Self::from_core(RegistrationCore::new(
            container,
            ServiceKey::of::<I>(),
            lifestyle,
            Source::Instance(Instance::new(instance)),
        ))
    }

    #[inline]
    pub fn id(&self) -> RegistrationId {
        self.core.id
    }

    /// Descriptor of what this registration builds.
    #[inline]
    pub fn implementation_key(&self) -> ServiceKey {
        self.core.implementation
    }

    #[inline]
    pub fn lifestyle(&self) -> &'static str {
        self.core.lifestyle
    }

    /// The container this registration belongs to.
    #[inline]
    pub fn container_id(&self) -> ContainerId {
        self.core.container
    }
}

impl<I: ?Sized> Clone for Registration<I> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            _implementation: PhantomData,
        }
    }
}

impl<I: ?Sized> fmt::Debug for Registration<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("id", &self.core.id)
            .field("implementation", &self.core.implementation)
            .field("lifestyle", &self.core.lifestyle)
            .field("container", &self.core.container)
            .finish()
    }
}

// =============================================================================
// Instance Initializers
// =============================================================================

/// Post-construction action for every component providing `target`.
#[derive(Clone)]
pub(crate) struct InstanceInitializer {
    pub(crate) target: ServiceKey,
    /// Receives the instance already cast to `target`.
    pub(crate) action: Arc<dyn Fn(&Instance) + Send + Sync>,
}

impl InstanceInitializer {
    pub(crate) fn new<S, F>(action: F) -> Self
    where
        S: ?Sized + Service,
        F: Fn(&S) + Send + Sync + 'static,
    {
        Self {
            target: ServiceKey::of::<S>(),
            action: Arc::new(move |instance: &Instance| {
                if let Some(service) = instance.downcast::<S>() {
                    action(&service);
                }
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifestyle::{Singleton, Transient};

    struct Engine;

    impl Component for Engine {
        type Dependencies = ();

        fn create(_: ()) -> Self {
            Engine
        }
    }

    #[test]
    fn test_component_registration() {
        let container = Container::new();
        let registration = Transient.create_registration::<Engine>(&container).unwrap();

        assert_eq!(registration.implementation_key(), ServiceKey::of::<Engine>());
        assert_eq!(registration.lifestyle(), "Transient");
        assert_eq!(registration.container_id(), container.id());
        assert!(registration.core.is_constructor_injected());
        assert_eq!(registration.core.capabilities().len(), 1);
        assert!(matches!(registration.core.raw_plan(), BuildPlan::Construct { .. }));
    }

    #[test]
    fn test_factory_and_instance_registrations() {
        let container = Container::new();
        let factory =
            Singleton.create_factory_registration(&container, |_: &Container| Ok(Arc::new(Engine)));
        let instance = Registration::instance(&container, &Singleton, Arc::new(Engine));

        assert!(!factory.core.is_constructor_injected());
        assert!(factory.core.capabilities().is_empty());
        assert!(matches!(factory.core.raw_plan(), BuildPlan::Factory { .. }));
        assert!(matches!(instance.core.raw_plan(), BuildPlan::Constant(_)));
        assert_ne!(factory.id(), instance.id());
    }

    #[test]
    fn test_recorded_services() {
        use crate::provider::cast_instance;

        let container = Container::new();
        let registration = Transient.create_registration::<Engine>(&container).unwrap();
        assert_eq!(registration.core.primary_service(), ServiceKey::of::<Engine>());

        struct Marker;
        let marker = ServiceKey::of::<Marker>();
        registration.core.record_service(marker, cast_instance::<Engine, Engine>);
        registration.core.record_service(marker, cast_instance::<Engine, Engine>);
        registration
            .core
            .record_service(ServiceKey::of::<Engine>(), cast_instance::<Engine, Engine>);

        let keys: Vec<_> = registration.core.services().iter().map(|(key, _)| *key).collect();
        assert_eq!(keys, vec![marker, ServiceKey::of::<Engine>()]);
        assert_eq!(registration.core.primary_service(), marker);
    }

    #[test]
    fn test_initializer_ignores_other_types() {
        use std::sync::atomic::{AtomicU32, Ordering};

        static CALLS: AtomicU32 = AtomicU32::new(0);

        let initializer = InstanceInitializer::new::<Engine, _>(|_| {
            CALLS.fetch_add(1, Ordering::SeqCst);
        });

        (initializer.action)(&Instance::new(Arc::new(Engine)));
        (initializer.action)(&Instance::new(Arc::new(5_u8)));

        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
        assert_eq!(initializer.target, ServiceKey::of::<Engine>());
    }
}
