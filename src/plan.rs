//! Build plans
//!
//! A [`BuildPlan`] describes how an instance is produced before it is turned
//! into a callable factory. Extension hooks rewrite plans by wrapping them;
//! [`BuildPlan::compile`] flattens the tree into nested closures once, so every
//! resolution afterwards is a plain function call.

use crate::lifestyle::InstanceCache;
use crate::producer::{ActiveEntry, enter};
use crate::registration::RegistrationId;
use crate::{Container, Instance, Result, Service, ServiceKey};
use std::fmt;
use std::sync::Arc;

/// Creates an instance, resolving whatever it needs from the container.
pub type Activator = Arc<dyn Fn(&Container) -> Result<Instance> + Send + Sync>;

/// Post-processes an instance produced by an inner plan.
pub type Interceptor = Arc<dyn Fn(&Container, Instance) -> Result<Instance> + Send + Sync>;

/// A compiled plan.
pub(crate) type CompiledFactory = Activator;

/// Intermediate representation of how an instance is produced.
pub enum BuildPlan {
    /// Call a component constructor with its resolved dependencies.
    Construct {
        implementation: ServiceKey,
        dependencies: Vec<ServiceKey>,
        activator: Activator,
    },
    /// Invoke a user-supplied factory.
    Factory {
        service: ServiceKey,
        activator: Activator,
    },
    /// Return a fixed instance.
    Constant(Instance),
    /// Run `inner`, then pass its result through `interceptor`.
    Intercept {
        label: &'static str,
        inner: Box<BuildPlan>,
        interceptor: Interceptor,
    },
    /// Run `inner` through a lifestyle cache.
    Cached {
        lifestyle: &'static str,
        registration: RegistrationId,
        implementation: ServiceKey,
        cache: Arc<dyn InstanceCache>,
        inner: Box<BuildPlan>,
    },
}

impl BuildPlan {
    /// Wrap this plan with a post-processing step.
    pub fn intercept<F>(self, label: &'static str, interceptor: F) -> Self
    where
        F: Fn(&Container, Instance) -> Result<Instance> + Send + Sync + 'static,
    {
        BuildPlan::Intercept {
            label,
            inner: Box::new(self),
            interceptor: Arc::new(interceptor),
        }
    }

    /// Wrap this plan with a typed step on `Arc<S>`.
    ///
    /// The step fails with an internal error if the inner plan does not
    /// produce an `S`.
    pub fn wrap<S, F>(self, label: &'static str, wrapper: F) -> Self
    where
        S: ?Sized + Service,
        F: Fn(&Container, Arc<S>) -> Result<Arc<S>> + Send + Sync + 'static,
    {
        self.intercept(label, move |container, instance| {
            let inner = instance.downcast::<S>().ok_or_else(|| {
                crate::DiError::Internal(format!(
                    "plan step `{label}` expected {} but received {}",
                    std::any::type_name::<S>(),
                    instance.type_name()
                ))
            })?;
            Ok(Instance::new(wrapper(container, inner)?))
        })
    }

    /// Whether the innermost plan is constructor injection.
    pub fn is_constructor_injected(&self) -> bool {
        match self {
            BuildPlan::Construct { .. } => true,
            BuildPlan::Factory { .. } | BuildPlan::Constant(_) => false,
            BuildPlan::Intercept { inner, .. } | BuildPlan::Cached { inner, .. } => {
                inner.is_constructor_injected()
            }
        }
    }

    /// Whether any lifestyle cache has been applied.
    pub fn is_cached(&self) -> bool {
        match self {
            BuildPlan::Cached { .. } => true,
            BuildPlan::Intercept { inner, .. } => inner.is_cached(),
            _ => false,
        }
    }

    /// Labels of the interception steps, outermost first.
    pub fn labels(&self) -> Vec<&'static str> {
        let mut labels = Vec::new();
        let mut current = self;
        loop {
            match current {
                BuildPlan::Intercept { label, inner, .. } => {
                    labels.push(*label);
                    current = &**inner;
                }
                BuildPlan::Cached { inner, .. } => current = &**inner,
                _ => return labels,
            }
        }
    }

    /// Descriptors the innermost constructor depends on.
    pub fn dependencies(&self) -> &[ServiceKey] {
        match self {
            BuildPlan::Construct { dependencies, .. } => dependencies,
            BuildPlan::Factory { .. } | BuildPlan::Constant(_) => &[],
            BuildPlan::Intercept { inner, .. } | BuildPlan::Cached { inner, .. } => {
                inner.dependencies()
            }
        }
    }

    /// Move the plan out, leaving an empty constant behind.
    pub(crate) fn take(&mut self) -> BuildPlan {
        std::mem::replace(self, BuildPlan::Constant(Instance::new(Arc::new(()))))
    }

    /// Turn the plan into a callable factory.
    pub(crate) fn compile(self) -> CompiledFactory {
        match self {
            BuildPlan::Construct { activator, .. } | BuildPlan::Factory { activator, .. } => {
                activator
            }
            BuildPlan::Constant(instance) => Arc::new(move |_: &Container| Ok(instance.clone())),
            BuildPlan::Intercept {
                inner, interceptor, ..
            } => {
                let inner = inner.compile();
                Arc::new(move |container: &Container| interceptor(container, inner(container)?))
            }
            BuildPlan::Cached {
                registration,
                implementation,
                cache,
                inner,
                ..
            } => {
                let inner = inner.compile();
                Arc::new(move |container: &Container| {
                    // Re-entering a registration that is still being built
                    // would block on its own cache.
                    let _guard = enter(ActiveEntry::Registration {
                        id: registration,
                        implementation,
                    })?;
                    cache.get_or_create(&|| inner(container))
                })
            }
        }
    }
}

impl fmt::Debug for BuildPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildPlan::Construct {
                implementation,
                dependencies,
                ..
            } => f
                .debug_struct("Construct")
                .field("implementation", implementation)
                .field("dependencies", dependencies)
                .finish(),
            BuildPlan::Factory { service, .. } => {
                f.debug_struct("Factory").field("service", service).finish()
            }
            BuildPlan::Constant(instance) => f.debug_tuple("Constant").field(instance).finish(),
            BuildPlan::Intercept { label, inner, .. } => f
                .debug_struct("Intercept")
                .field("label", label)
                .field("inner", inner)
                .finish(),
            BuildPlan::Cached {
                lifestyle, inner, ..
            } => f
                .debug_struct("Cached")
                .field("lifestyle", lifestyle)
                .field("inner", inner)
                .finish(),
        }
    }
}
