//! Build-plan compiler
//!
//! Turns a producer's registration into a compiled factory. The stages run in
//! a fixed order:
//!
//! 1. raw plan from the registration
//! 2. building hook subscribers, in subscription order
//! 3. instance initializers, in registration order (constructor injection only)
//! 4. lifestyle cache
//! 5. conversion to the requested service
//! 6. built hook subscribers, in subscription order
//! 7. compilation into nested closures
//!
//! Keys without a registration are offered to the resolve-unregistered
//! subscribers first; see [`resolve_unregistered`].

use crate::events::{BuildingEvent, BuiltEvent, UnregisteredTypeEvent};
use crate::plan::{BuildPlan, CompiledFactory};
use crate::producer::InstanceProducer;
use crate::provider::{Caster, cast_instance};
use crate::registration::{InstanceInitializer, RegistrationCore};
use crate::{Component, Container, DiError, Instance, Lifestyle, Result, ServiceKey, Transient};
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::{debug, trace};

/// What to do with a key nobody registered and no subscriber handled.
#[derive(Clone, Copy)]
pub(crate) enum Fallback {
    /// Fail with [`DiError::NotFound`].
    None,
    /// Register the concrete component behind the key as transient.
    Construct(fn(&Container) -> Result<(Arc<RegistrationCore>, Caster)>),
}

impl Fallback {
    /// Auto-registration of the component `I`.
    #[inline]
    pub(crate) fn component<I: Component>() -> Self {
        Fallback::Construct(transient_component::<I>)
    }
}

fn transient_component<I: Component>(
    container: &Container,
) -> Result<(Arc<RegistrationCore>, Caster)> {
    let registration = Transient.create_registration::<I>(container)?;
    Ok((registration.core, cast_instance::<I, I>))
}

/// Find or create the producer for a key missing from the ledger.
pub(crate) fn resolve_unregistered(
    container: &Container,
    key: ServiceKey,
    fallback: Fallback,
) -> Result<Arc<InstanceProducer>> {
    let ledger = &container.ledger;
    if let Some(producer) = ledger.adopted(&key) {
        return Ok(producer);
    }

    let frozen = ledger.lock();
    let mut supplied = None;

    for (_, handler) in &frozen.hooks.unregistered {
        let mut event = UnregisteredTypeEvent::new(container, key);
        handler(&mut event)?;
        if let Some(registration) = event.into_registration() {
            supplied = Some(registration);
            break;
        }
    }

    let (registration, cast) = match (supplied, fallback) {
        (Some(supplied), _) => {
            #[cfg(feature = "logging")]
            debug!(
                target: "composition_container",
                service = key.type_name(),
                "Unregistered type resolved by subscriber"
            );
            supplied
        }
        (None, Fallback::Construct(register)) => {
            #[cfg(feature = "logging")]
            debug!(
                target: "composition_container",
                service = key.type_name(),
                lifestyle = "Transient",
                "Auto-registering concrete type"
            );
            register(container)?
        }
        (None, Fallback::None) => {
            #[cfg(feature = "logging")]
            debug!(
                target: "composition_container",
                service = key.type_name(),
                "Service not found in container"
            );
            return Err(DiError::NotFound {
                type_name: key.type_name(),
            });
        }
    };

    Ok(ledger.adopt(InstanceProducer::new(
        key,
        registration,
        cast,
        Arc::downgrade(ledger),
    )))
}

/// Run the full pipeline for `producer`.
pub(crate) fn compile(producer: &InstanceProducer, container: &Container) -> Result<CompiledFactory> {
    let frozen = container.ledger.lock();
    let registration = producer.registration();
    let service = producer.service_key();

    #[cfg(feature = "logging")]
    trace!(
        target: "composition_container",
        service = service.type_name(),
        implementation = registration.implementation.type_name(),
        lifestyle = registration.lifestyle,
        "Compiling build plan"
    );

    // Everything inside the lifestyle cache depends on the registration
    // alone, so producers sharing one cache build the same instance.
    let mut plan = registration.raw_plan();

    if !frozen.hooks.building.is_empty() {
        let mut event = BuildingEvent::new(
            registration.primary_service(),
            registration.implementation,
            plan,
        );
        for (_, handler) in &frozen.hooks.building {
            handler(&mut event);
        }
        plan = event.into_plan();
    }

    if plan.is_constructor_injected() {
        plan = apply_initializers(plan, registration, &frozen.initializers);
    }

    plan = BuildPlan::Cached {
        lifestyle: registration.lifestyle,
        registration: registration.id,
        implementation: registration.implementation,
        cache: Arc::clone(&registration.cache),
        inner: Box::new(plan),
    };

    let cast = producer.cast();
    plan = plan.intercept("upcast", move |_, instance| {
        cast(&instance).ok_or_else(|| {
            DiError::Internal(format!(
                "{} can not be handed out as {}",
                instance.type_name(),
                service
            ))
        })
    });

    if !frozen.hooks.built.is_empty() {
        let mut event = BuiltEvent::new(service, plan);
        for (_, handler) in &frozen.hooks.built {
            handler(&mut event);
        }
        plan = event.into_plan();
    }

    Ok(plan.compile())
}

/// Wrap `plan` with every initializer whose target is among the component's
/// capabilities or the services the registration was added under.
fn apply_initializers(
    plan: BuildPlan,
    registration: &RegistrationCore,
    initializers: &[InstanceInitializer],
) -> BuildPlan {
    let provided: Vec<(ServiceKey, Caster)> = registration
        .capabilities()
        .iter()
        .map(|capability| (capability.key, capability.cast))
        .chain(registration.services())
        .collect();

    let applicable: Vec<_> = initializers
        .iter()
        .filter_map(|initializer| {
            let (_, cast) = provided
                .iter()
                .find(|(key, _)| *key == initializer.target)?;
            Some((*cast, Arc::clone(&initializer.action)))
        })
        .collect();

    if applicable.is_empty() {
        return plan;
    }

    #[cfg(feature = "logging")]
    trace!(
        target: "composition_container",
        implementation = registration.implementation.type_name(),
        initializers = applicable.len(),
        "Applying instance initializers"
    );

    plan.intercept("initializers", move |_: &Container, instance: Instance| {
        for (cast, action) in &applicable {
            if let Some(target) = cast(&instance) {
                action(&target);
            }
        }
        Ok(instance)
    })
}
