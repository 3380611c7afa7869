//! Composition container
//!
//! The `Container` is the public face of the registration ledger. It is
//! configured while unlocked; the first resolution (or an explicit
//! [`lock`](Container::lock) / [`verify`](Container::verify)) locks it for
//! good, after which resolutions run concurrently without a global lock.

use crate::collection::{CollectionRegistration, Elements};
use crate::compiler::{self, Fallback};
use crate::events::{
    BuildingEvent, BuildingHandler, BuiltEvent, BuiltHandler, SubscriptionId,
    UnregisteredHandler, UnregisteredTypeEvent,
};
use crate::ledger::{ContainerId, Ledger};
use crate::producer::InstanceProducer;
use crate::provider::{Caster, cast_instance};
use crate::registration::{InstanceInitializer, Registration, RegistrationCore};
use crate::{
    Collection, Component, ContainerOptions, DiError, Instance, Lifestyle, Provides, Result,
    Service, ServiceKey, Singleton, Transient, TypeList,
};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::Ordering;

#[cfg(feature = "logging")]
use tracing::{debug, trace};

/// Object-composition container.
///
/// Cloning is cheap and yields a handle to the same container.
///
/// # Examples
///
/// ```rust
/// use composition_container::{Component, Container, provides};
/// use std::sync::Arc;
///
/// trait Repository: Send + Sync {
///     fn find(&self, id: u32) -> String;
/// }
///
/// struct InMemoryRepository;
///
/// impl Repository for InMemoryRepository {
///     fn find(&self, id: u32) -> String {
///         format!("user-{id}")
///     }
/// }
///
/// impl Component for InMemoryRepository {
///     type Dependencies = ();
///     fn create(_: ()) -> Self {
///         InMemoryRepository
///     }
/// }
///
/// provides!(InMemoryRepository => dyn Repository);
///
/// let container = Container::new();
/// container.register_single::<dyn Repository, InMemoryRepository>().unwrap();
///
/// let repository = container.get_instance::<dyn Repository>().unwrap();
/// assert_eq!(repository.find(7), "user-7");
/// assert!(container.is_locked());
/// ```
#[derive(Clone)]
pub struct Container {
    pub(crate) ledger: Arc<Ledger>,
}

impl Container {
    /// Create a new, unlocked container.
    #[inline]
    pub fn new() -> Self {
        Self::with_options(ContainerOptions::default())
    }

    /// Create a container with the given options.
    pub fn with_options(options: ContainerOptions) -> Self {
        let ledger = Ledger::new(options);

        #[cfg(feature = "logging")]
        debug!(
            target: "composition_container",
            container = %ledger.id,
            overriding_allowed = options.overriding_allowed(),
            capacity = options.capacity(),
            "Creating new composition container"
        );

        Self {
            ledger: Arc::new(ledger),
        }
    }

    /// Create a container with pre-allocated capacity.
    ///
    /// Use this when you know approximately how many services will be registered.
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_options(ContainerOptions::new().with_capacity(capacity))
    }

    #[inline]
    pub(crate) fn from_ledger(ledger: Arc<Ledger>) -> Self {
        Self { ledger }
    }

    #[inline]
    pub fn id(&self) -> ContainerId {
        self.ledger.id
    }

    #[inline]
    pub fn options(&self) -> ContainerOptions {
        self.ledger.options
    }

    // =========================================================================
    // Registration Methods
    // =========================================================================

    /// Register the component `T` as itself, transient.
    #[inline]
    pub fn register_concrete<T: Component>(&self) -> Result<()> {
        self.register_with::<T, T>(&Transient)
    }

    /// Register `I` as the implementation of `S`, transient.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use composition_container::{Component, Container, provides};
    /// use std::sync::Arc;
    ///
    /// trait Validator: Send + Sync {}
    ///
    /// struct OrderValidator;
    /// impl Validator for OrderValidator {}
    /// impl Component for OrderValidator {
    ///     type Dependencies = ();
    ///     fn create(_: ()) -> Self { OrderValidator }
    /// }
    /// provides!(OrderValidator => dyn Validator);
    ///
    /// let container = Container::new();
    /// container.register::<dyn Validator, OrderValidator>().unwrap();
    ///
    /// let a = container.get_instance::<dyn Validator>().unwrap();
    /// let b = container.get_instance::<dyn Validator>().unwrap();
    /// assert!(!Arc::ptr_eq(&a, &b)); // Different instances
    /// ```
    #[inline]
    pub fn register<S, I>(&self) -> Result<()>
    where
        S: ?Sized + Service,
        I: Component + Provides<S>,
    {
        self.register_with::<S, I>(&Transient)
    }

    /// Register `I` as the implementation of `S` with the given lifestyle.
    pub fn register_with<S, I>(&self, lifestyle: &dyn Lifestyle) -> Result<()>
    where
        S: ?Sized + Service,
        I: Component + Provides<S>,
    {
        self.ledger.ensure_unlocked()?;
        let key = ServiceKey::of::<S>().validate("S")?;
        let registration = Registration::<I>::component(self, lifestyle)?;
        self.add_producer(key, registration.core, cast_instance::<I, S>)
    }

    /// Register a factory for `S` with the given lifestyle.
    ///
    /// Instance initializers never run on factory results.
    pub fn register_factory<S, F>(&self, lifestyle: &dyn Lifestyle, factory: F) -> Result<()>
    where
        S: ?Sized + Service,
        F: Fn(&Container) -> Result<Arc<S>> + Send + Sync + 'static,
    {
        self.ledger.ensure_unlocked()?;
        let key = ServiceKey::of::<S>().validate("S")?;
        let registration = Registration::<S>::factory(self, lifestyle, factory);
        self.add_producer(key, registration.core, cast_instance::<S, S>)
    }

    /// Register the component `T` as itself, singleton.
    #[inline]
    pub fn register_single_concrete<T: Component>(&self) -> Result<()> {
        self.register_with::<T, T>(&Singleton)
    }

    /// Register `I` as the implementation of `S`, singleton.
    #[inline]
    pub fn register_single<S, I>(&self) -> Result<()>
    where
        S: ?Sized + Service,
        I: Component + Provides<S>,
    {
        self.register_with::<S, I>(&Singleton)
    }

    /// Register a factory for `S` that runs at most once.
    #[inline]
    pub fn register_single_factory<S, F>(&self, factory: F) -> Result<()>
    where
        S: ?Sized + Service,
        F: Fn(&Container) -> Result<Arc<S>> + Send + Sync + 'static,
    {
        self.register_factory::<S, F>(&Singleton, factory)
    }

    /// Register an existing instance as the singleton `S`.
    pub fn register_instance<S: ?Sized + Service>(&self, instance: Arc<S>) -> Result<()> {
        self.ledger.ensure_unlocked()?;
        let key = ServiceKey::of::<S>().validate("S")?;
        let registration = Registration::instance(self, &Singleton, instance);
        self.add_producer(key, registration.core, cast_instance::<S, S>)
    }

    /// Register `registration` for `S`.
    ///
    /// Adding one registration for several services makes them share its
    /// lifestyle cache, e.g. one singleton behind two interfaces.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use composition_container::{Component, Container, Lifestyle, Singleton, provides};
    /// use std::sync::Arc;
    ///
    /// trait Reader: Send + Sync {}
    /// trait Writer: Send + Sync {}
    ///
    /// struct Store;
    /// impl Reader for Store {}
    /// impl Writer for Store {}
    /// impl Component for Store {
    ///     type Dependencies = ();
    ///     fn create(_: ()) -> Self { Store }
    /// }
    /// provides!(Store => dyn Reader, dyn Writer);
    ///
    /// let container = Container::new();
    /// let registration = Singleton.create_registration::<Store>(&container).unwrap();
    /// container.add_registration::<dyn Reader, _>(&registration).unwrap();
    /// container.add_registration::<dyn Writer, _>(&registration).unwrap();
    ///
    /// let reader = container.get_instance::<dyn Reader>().unwrap();
    /// let writer = container.get_instance::<dyn Writer>().unwrap();
    /// assert!(std::ptr::addr_eq(Arc::as_ptr(&reader), Arc::as_ptr(&writer)));
    /// ```
    pub fn add_registration<S, I>(&self, registration: &Registration<I>) -> Result<()>
    where
        S: ?Sized + Service,
        I: ?Sized + Provides<S>,
    {
        self.ledger.ensure_unlocked()?;
        let key = ServiceKey::of::<S>().validate("S")?;
        if registration.container_id() != self.id() {
            return Err(DiError::ForeignRegistration {
                param: "registration",
            });
        }
        self.add_producer(key, Arc::clone(&registration.core), cast_instance::<I, S>)
    }

    fn add_producer(
        &self,
        key: ServiceKey,
        registration: Arc<RegistrationCore>,
        cast: Caster,
    ) -> Result<()> {
        let producer = Arc::new(InstanceProducer::new(
            key,
            registration,
            cast,
            Arc::downgrade(&self.ledger),
        ));

        #[cfg(feature = "logging")]
        let (implementation, lifestyle) = (producer.implementation_key(), producer.lifestyle());

        self.ledger.add_producer(producer)?;

        #[cfg(feature = "logging")]
        debug!(
            target: "composition_container",
            service = key.type_name(),
            implementation = implementation.type_name(),
            lifestyle = lifestyle,
            service_count = self.ledger.producers.len(),
            "Registered service"
        );

        Ok(())
    }

    /// Run `action` on every constructor-injected instance whose capabilities
    /// include `S`, right after construction.
    ///
    /// Initializers run in registration order.
    pub fn register_initializer<S, F>(&self, action: F) -> Result<()>
    where
        S: ?Sized + Service,
        F: Fn(&S) + Send + Sync + 'static,
    {
        self.ledger.ensure_unlocked()?;
        ServiceKey::of::<S>().validate("S")?;
        let initializer = InstanceInitializer::new::<S, F>(action);

        self.ledger.mutate(|config| {
            config.initializers.push(initializer);

            #[cfg(feature = "logging")]
            debug!(
                target: "composition_container",
                service = std::any::type_name::<S>(),
                initializers = config.initializers.len(),
                "Registering instance initializer"
            );

            Ok(())
        })
    }

    /// Register a fixed collection of `S`.
    ///
    /// The instances are captured now; later registrations don't change it.
    pub fn register_all<S: ?Sized + Service>(
        &self,
        instances: impl IntoIterator<Item = Arc<S>>,
    ) -> Result<()> {
        self.ledger.ensure_unlocked()?;
        ServiceKey::of::<S>().validate("S")?;
        let items: Arc<[Arc<S>]> = instances.into_iter().collect();

        #[cfg(feature = "logging")]
        debug!(
            target: "composition_container",
            element = std::any::type_name::<S>(),
            elements = items.len(),
            kind = "fixed",
            "Registering collection"
        );

        self.ledger.add_collection(Arc::new(CollectionRegistration::<S> {
            elements: Elements::Fixed(items),
        }))
    }

    /// Register a dynamic collection of `S`.
    ///
    /// Every enumeration resolves each listed type against the container.
    pub fn register_all_types<S: ?Sized + Service>(&self, types: TypeList<S>) -> Result<()> {
        self.ledger.ensure_unlocked()?;
        ServiceKey::of::<S>().validate("S")?;
        let sources = types.into_sources("types")?;

        #[cfg(feature = "logging")]
        debug!(
            target: "composition_container",
            element = std::any::type_name::<S>(),
            elements = sources.len(),
            kind = "dynamic",
            "Registering collection"
        );

        self.ledger.add_collection(Arc::new(CollectionRegistration::<S> {
            elements: Elements::<S>::Dynamic(sources),
        }))
    }

    // =========================================================================
    // Extension Hooks
    // =========================================================================

    /// Subscribe to requests for keys nobody registered.
    ///
    /// Subscribers run in order until one supplies a registration.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use composition_container::{Container, ServiceKey, Singleton};
    /// use std::sync::Arc;
    ///
    /// struct Settings {
    ///     verbose: bool,
    /// }
    ///
    /// let container = Container::new();
    /// container
    ///     .on_resolve_unregistered(|event| {
    ///         if event.requested() == ServiceKey::of::<Settings>() {
    ///             event.register::<Settings, _>(&Singleton, |_| Ok(Arc::new(Settings { verbose: true })))?;
    ///         }
    ///         Ok(())
    ///     })
    ///     .unwrap();
    ///
    /// assert!(container.get_instance::<Settings>().unwrap().verbose);
    /// ```
    pub fn on_resolve_unregistered<F>(&self, handler: F) -> Result<SubscriptionId>
    where
        F: Fn(&mut UnregisteredTypeEvent<'_>) -> Result<()> + Send + Sync + 'static,
    {
        let handler: UnregisteredHandler = Arc::new(handler);
        self.subscribe("resolve_unregistered", |hooks, id| {
            hooks.unregistered.push((id, handler))
        })
    }

    /// Subscribe to raw build plans, before initializers and caching.
    pub fn on_building<F>(&self, handler: F) -> Result<SubscriptionId>
    where
        F: Fn(&mut BuildingEvent) + Send + Sync + 'static,
    {
        let handler: BuildingHandler = Arc::new(handler);
        self.subscribe("building", |hooks, id| hooks.building.push((id, handler)))
    }

    /// Subscribe to cached build plans; this is where decorators go.
    pub fn on_built<F>(&self, handler: F) -> Result<SubscriptionId>
    where
        F: Fn(&mut BuiltEvent) + Send + Sync + 'static,
    {
        let handler: BuiltHandler = Arc::new(handler);
        self.subscribe("built", |hooks, id| hooks.built.push((id, handler)))
    }

    fn subscribe(
        &self,
        hook: &'static str,
        add: impl FnOnce(&mut crate::events::Hooks, SubscriptionId),
    ) -> Result<SubscriptionId> {
        let id = SubscriptionId::next();
        self.ledger.mutate(|config| {
            add(&mut config.hooks, id);
            Ok(())
        })?;

        #[cfg(feature = "logging")]
        debug!(
            target: "composition_container",
            hook = hook,
            "Subscribed to extension hook"
        );
        #[cfg(not(feature = "logging"))]
        let _ = hook;

        Ok(id)
    }

    /// Remove a subscription. Returns whether it existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> Result<bool> {
        self.ledger.mutate(|config| Ok(config.hooks.remove(id)))
    }

    // =========================================================================
    // Resolution Methods
    // =========================================================================

    /// Resolve a service.
    ///
    /// Locks the container on first use.
    #[inline]
    pub fn get_instance<S: ?Sized + Service>(&self) -> Result<Arc<S>> {
        let instance = self.resolve_key(ServiceKey::of::<S>(), Fallback::None)?;
        downcast::<S>(instance)
    }

    /// Try to resolve, returning None on any failure.
    #[inline]
    pub fn try_get_instance<S: ?Sized + Service>(&self) -> Option<Arc<S>> {
        self.get_instance::<S>().ok()
    }

    /// Resolve a concrete component, registering it as transient when
    /// nothing else claims it.
    pub fn get_concrete<T: Component>(&self) -> Result<Arc<T>> {
        let instance = self.resolve_key(ServiceKey::of::<T>(), Fallback::component::<T>())?;
        downcast::<T>(instance)
    }

    /// Every registered `S`; empty when no collection was registered.
    pub fn get_all_instances<S: ?Sized + Service>(&self) -> Result<Collection<S>> {
        self.ledger.lock();
        let element = ServiceKey::of::<S>();

        let elements = match self.ledger.collection(&element) {
            Some(entry) => entry
                .as_any()
                .downcast_ref::<CollectionRegistration<S>>()
                .map(|registration| registration.elements.clone())
                .ok_or_else(|| {
                    DiError::Internal(format!("collection entry for {element} has the wrong type"))
                })?,
            None => Elements::Empty,
        };

        #[cfg(feature = "logging")]
        trace!(
            target: "composition_container",
            element = element.type_name(),
            "Resolving collection"
        );

        Ok(Collection::new(elements, Arc::downgrade(&self.ledger)))
    }

    /// Resolve by key.
    ///
    /// Collection keys resolve to a `Collection<S>` instance, empty when no
    /// collection of `S` was registered.
    pub fn get_instance_by_key(&self, key: ServiceKey) -> Result<Instance> {
        match key.element() {
            Some(element) => {
                self.ledger.lock();
                let ledger = Arc::downgrade(&self.ledger);
                match self.ledger.collection(&element) {
                    Some(entry) => Ok(entry.instantiate(ledger)),
                    None => key.empty_collection(ledger).ok_or(DiError::NotFound {
                        type_name: key.type_name(),
                    }),
                }
            }
            None => self.resolve_key(key, Fallback::None),
        }
    }

    pub(crate) fn resolve_key(&self, key: ServiceKey, fallback: Fallback) -> Result<Instance> {
        self.ledger.lock();

        #[cfg(feature = "logging")]
        trace!(
            target: "composition_container",
            service = key.type_name(),
            "Resolving service"
        );

        let producer = match self.ledger.producer(&key) {
            Some(producer) => producer,
            None => compiler::resolve_unregistered(self, key, fallback)?,
        };
        producer.resolve(self)
    }

    // =========================================================================
    // Query Methods
    // =========================================================================

    /// Whether `S` has a registration (adopted unregistered keys excluded).
    #[inline]
    pub fn contains<S: ?Sized + Service>(&self) -> bool {
        self.ledger.producers.contains_key(&ServiceKey::of::<S>())
    }

    /// Whether a collection of `S` was registered.
    #[inline]
    pub fn contains_collection<S: ?Sized + Service>(&self) -> bool {
        self.ledger.collections.contains_key(&ServiceKey::of::<S>())
    }

    /// Number of registered services.
    #[inline]
    pub fn len(&self) -> usize {
        self.ledger.producers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ledger.producers.is_empty()
    }

    /// Producers currently in the ledger, in no particular order.
    pub fn registered_producers(&self) -> Vec<Arc<InstanceProducer>> {
        self.ledger
            .producers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Every producer this container created that is still alive, including
    /// those adopted for unregistered keys.
    pub fn living_producers(&self) -> Vec<Arc<InstanceProducer>> {
        self.ledger.registry.living_items()
    }

    // =========================================================================
    // Lifecycle Methods
    // =========================================================================

    /// Lock the container to prevent further registrations.
    #[inline]
    pub fn lock(&self) {
        self.ledger.lock();
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.ledger.is_locked()
    }

    /// Build every registration and enumerate every collection once.
    ///
    /// Locks the container. On success the container is marked verified;
    /// the first defect found is returned otherwise.
    pub fn verify(&self) -> Result<()> {
        self.ledger.lock();

        let producers = self.registered_producers();
        let collections: Vec<_> = self
            .ledger
            .collections
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        #[cfg(feature = "logging")]
        debug!(
            target: "composition_container",
            container = %self.id(),
            registrations = producers.len(),
            collections = collections.len(),
            "Verifying container"
        );

        for producer in &producers {
            producer.verify_with(self)?;
        }
        for collection in &collections {
            #[cfg(feature = "logging")]
            trace!(
                target: "composition_container",
                element = collection.element().type_name(),
                dynamic = collection.is_dynamic(),
                "Verifying collection"
            );
            collection.verify(self)?;
        }

        self.ledger.verified.store(true, Ordering::Release);

        #[cfg(feature = "logging")]
        debug!(
            target: "composition_container",
            container = %self.id(),
            "Container verified"
        );

        Ok(())
    }

    /// Whether the last [`verify`](Container::verify) call succeeded.
    #[inline]
    pub fn is_verified(&self) -> bool {
        self.ledger.verified.load(Ordering::Acquire)
    }
}

fn downcast<S: ?Sized + Service>(instance: Instance) -> Result<Arc<S>> {
    instance.downcast::<S>().ok_or_else(|| {
        DiError::Internal(format!(
            "expected {} but the build plan produced {}",
            std::any::type_name::<S>(),
            instance.type_name()
        ))
    })
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("id", &self.ledger.id)
            .field("registrations", &self.ledger.producers.len())
            .field("collections", &self.ledger.collections.len())
            .field("locked", &self.is_locked())
            .field("verified", &self.is_verified())
            .finish()
    }
}
