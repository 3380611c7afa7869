//! Extension hooks
//!
//! Subscribers are stored in ordered lists and invoked sequentially in
//! subscription order. Subscribing and unsubscribing are only allowed while
//! the container is unlocked; the lists are frozen together with the ledger.

use crate::plan::BuildPlan;
use crate::provider::{Caster, cast_instance};
use crate::registration::{Registration, RegistrationCore};
use crate::{Container, DiError, Lifestyle, Provides, Result, Service, ServiceKey};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Handle returned by every subscription, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    #[inline]
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

pub(crate) type UnregisteredHandler =
    Arc<dyn Fn(&mut UnregisteredTypeEvent<'_>) -> Result<()> + Send + Sync>;
pub(crate) type BuildingHandler = Arc<dyn Fn(&mut BuildingEvent) + Send + Sync>;
pub(crate) type BuiltHandler = Arc<dyn Fn(&mut BuiltEvent) + Send + Sync>;

/// Subscriber lists for every hook.
#[derive(Clone, Default)]
pub(crate) struct Hooks {
    pub(crate) unregistered: Vec<(SubscriptionId, UnregisteredHandler)>,
    pub(crate) building: Vec<(SubscriptionId, BuildingHandler)>,
    pub(crate) built: Vec<(SubscriptionId, BuiltHandler)>,
}

impl Hooks {
    /// Drop the subscription with `id`, wherever it lives.
    pub(crate) fn remove(&mut self, id: SubscriptionId) -> bool {
        fn remove_from<H>(list: &mut Vec<(SubscriptionId, H)>, id: SubscriptionId) -> bool {
            let before = list.len();
            list.retain(|(subscription, _)| *subscription != id);
            list.len() != before
        }

        remove_from(&mut self.unregistered, id)
            || remove_from(&mut self.building, id)
            || remove_from(&mut self.built, id)
    }

    pub(crate) fn len(&self) -> usize {
        self.unregistered.len() + self.building.len() + self.built.len()
    }
}

// =============================================================================
// Resolve Unregistered
// =============================================================================

/// Raised when a key without a registration is requested.
///
/// A subscriber may supply a registration; it is adopted for the key and the
/// hook never fires for that key again.
pub struct UnregisteredTypeEvent<'a> {
    container: &'a Container,
    requested: ServiceKey,
    registration: Option<(Arc<RegistrationCore>, Caster)>,
}

impl<'a> UnregisteredTypeEvent<'a> {
    pub(crate) fn new(container: &'a Container, requested: ServiceKey) -> Self {
        Self {
            container,
            requested,
            registration: None,
        }
    }

    /// The key nobody registered.
    #[inline]
    pub fn requested(&self) -> ServiceKey {
        self.requested
    }

    #[inline]
    pub fn container(&self) -> &Container {
        self.container
    }

    /// Whether a subscriber already supplied a registration.
    #[inline]
    pub fn handled(&self) -> bool {
        self.registration.is_some()
    }

    /// Supply a factory for the requested key.
    pub fn register<S, F>(&mut self, lifestyle: &dyn Lifestyle, factory: F) -> Result<()>
    where
        S: ?Sized + Service,
        F: Fn(&Container) -> Result<Arc<S>> + Send + Sync + 'static,
    {
        self.accept::<S>()?;
        let registration = Registration::<S>::factory(self.container, lifestyle, factory);
        self.registration = Some((registration.core, cast_instance::<S, S>));
        Ok(())
    }

    /// Supply an existing registration for the requested key.
    pub fn register_registration<S, I>(&mut self, registration: &Registration<I>) -> Result<()>
    where
        S: ?Sized + Service,
        I: ?Sized + Provides<S>,
    {
        self.accept::<S>()?;
        if registration.container_id() != self.container.id() {
            return Err(DiError::ForeignRegistration {
                param: "registration",
            });
        }
        self.registration = Some((Arc::clone(&registration.core), cast_instance::<I, S>));
        Ok(())
    }

    fn accept<S: ?Sized + Service>(&self) -> Result<()> {
        if self.handled() {
            return Err(DiError::AlreadyRegistered {
                type_name: self.requested.type_name(),
            });
        }
        if ServiceKey::of::<S>() != self.requested {
            return Err(DiError::invalid_argument(
                "S",
                format!(
                    "a registration for {} can not satisfy a request for {}",
                    std::any::type_name::<S>(),
                    self.requested
                ),
            ));
        }
        Ok(())
    }

    pub(crate) fn into_registration(self) -> Option<(Arc<RegistrationCore>, Caster)> {
        self.registration
    }
}

impl fmt::Debug for UnregisteredTypeEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnregisteredTypeEvent")
            .field("requested", &self.requested)
            .field("handled", &self.handled())
            .finish()
    }
}

// =============================================================================
// Building / Built
// =============================================================================

/// Raised with the raw plan of a registration, before initializers and
/// lifestyle caching.
#[derive(Debug)]
pub struct BuildingEvent {
    service: ServiceKey,
    implementation: ServiceKey,
    plan: BuildPlan,
}

impl BuildingEvent {
    pub(crate) fn new(service: ServiceKey, implementation: ServiceKey, plan: BuildPlan) -> Self {
        Self {
            service,
            implementation,
            plan,
        }
    }

    /// The first service the registration was added under.
    ///
    /// Producers sharing a registration all see this key, so they build the
    /// same plan.
    #[inline]
    pub fn service(&self) -> ServiceKey {
        self.service
    }

    #[inline]
    pub fn implementation(&self) -> ServiceKey {
        self.implementation
    }

    #[inline]
    pub fn plan(&self) -> &BuildPlan {
        &self.plan
    }

    /// Replace the plan.
    pub fn set_plan(&mut self, plan: BuildPlan) {
        self.plan = plan;
    }

    /// Replace the plan with one derived from the current plan.
    pub fn map_plan(&mut self, f: impl FnOnce(BuildPlan) -> BuildPlan) {
        let plan = self.plan.take();
        self.plan = f(plan);
    }

    pub(crate) fn into_plan(self) -> BuildPlan {
        self.plan
    }
}

/// Raised with the fully cached plan of a producer.
///
/// Decorators are applied here: each one sees the plan produced by the
/// previous subscriber as its inner plan.
#[derive(Debug)]
pub struct BuiltEvent {
    service: ServiceKey,
    plan: BuildPlan,
}

impl BuiltEvent {
    pub(crate) fn new(service: ServiceKey, plan: BuildPlan) -> Self {
        Self { service, plan }
    }

    #[inline]
    pub fn service(&self) -> ServiceKey {
        self.service
    }

    #[inline]
    pub fn plan(&self) -> &BuildPlan {
        &self.plan
    }

    pub fn set_plan(&mut self, plan: BuildPlan) {
        self.plan = plan;
    }

    pub fn map_plan(&mut self, f: impl FnOnce(BuildPlan) -> BuildPlan) {
        let plan = self.plan.take();
        self.plan = f(plan);
    }

    /// Wrap the plan with `decorator` when the built service is `S`.
    ///
    /// Returns whether the decorator was applied.
    pub fn decorate<S, F>(&mut self, decorator: F) -> bool
    where
        S: ?Sized + Service,
        F: Fn(&Container, Arc<S>) -> Result<Arc<S>> + Send + Sync + 'static,
    {
        if self.service != ServiceKey::of::<S>() {
            return false;
        }
        self.map_plan(|plan| plan.wrap::<S, _>("decorator", decorator));
        true
    }

    pub(crate) fn into_plan(self) -> BuildPlan {
        self.plan
    }
}
