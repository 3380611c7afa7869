//! Instance producers
//!
//! An [`InstanceProducer`] pairs one service key with one registration and
//! owns the compiled factory for that pair. Compilation runs at most once per
//! producer; invoking the compiled factory still follows the registration's
//! lifestyle, so a transient producer builds a fresh instance on every call.

use crate::compiler;
use crate::ledger::{ContainerId, Ledger};
use crate::plan::CompiledFactory;
use crate::provider::Caster;
use crate::registration::{RegistrationCore, RegistrationId};
use crate::{Container, DiError, Instance, Result, Service, ServiceKey};
use once_cell::sync::OnceCell;
use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::{Arc, Weak};

#[cfg(feature = "logging")]
use tracing::trace;

// =============================================================================
// Active Resolution Path
// =============================================================================

/// Something currently being built on this thread.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum ActiveEntry {
    /// A service requested from a container.
    Service { container: ContainerId, key: ServiceKey },
    /// A registration running its raw plan.
    Registration {
        id: RegistrationId,
        implementation: ServiceKey,
    },
}

impl ActiveEntry {
    fn name(&self) -> &'static str {
        match self {
            ActiveEntry::Service { key, .. } => key.type_name(),
            ActiveEntry::Registration { implementation, .. } => implementation.type_name(),
        }
    }
}

thread_local! {
    /// Resolutions in progress on this thread, outermost first.
    static ACTIVE_PATH: RefCell<Vec<ActiveEntry>> = const { RefCell::new(Vec::new()) };
}

/// Removes its entry from the active path when dropped.
pub(crate) struct PathGuard {
    // Must be dropped on the thread that pushed the entry.
    _not_send: PhantomData<*const ()>,
}

impl Drop for PathGuard {
    fn drop(&mut self) {
        ACTIVE_PATH.with(|path| {
            path.borrow_mut().pop();
        });
    }
}

/// Push `entry` onto this thread's active path.
///
/// Fails with [`DiError::CircularDependency`] when the entry is already being
/// built further up the same call path.
pub(crate) fn enter(entry: ActiveEntry) -> Result<PathGuard> {
    ACTIVE_PATH.with(|path| {
        let mut path = path.borrow_mut();

        if let Some(start) = path.iter().position(|active| *active == entry) {
            let mut names: Vec<&'static str> = Vec::with_capacity(path.len() - start + 1);
            for name in path[start..].iter().map(ActiveEntry::name) {
                if names.last() != Some(&name) {
                    names.push(name);
                }
            }
            names.push(entry.name());

            return Err(DiError::CircularDependency {
                type_name: entry.name(),
                path: names.join(" -> "),
            });
        }

        path.push(entry);
        Ok(PathGuard {
            _not_send: PhantomData,
        })
    })
}

// =============================================================================
// Instance Producer
// =============================================================================

/// Compiled, resolvable unit for one service key.
///
/// Several producers may share one registration; they then share its
/// lifestyle cache.
pub struct InstanceProducer {
    service: ServiceKey,
    registration: Arc<RegistrationCore>,
    cast: Caster,
    ledger: Weak<Ledger>,
    compiled: OnceCell<CompiledFactory>,
}

impl InstanceProducer {
    pub(crate) fn new(
        service: ServiceKey,
        registration: Arc<RegistrationCore>,
        cast: Caster,
        ledger: Weak<Ledger>,
    ) -> Self {
        Self {
            service,
            registration,
            cast,
            ledger,
            compiled: OnceCell::new(),
        }
    }

    /// The key this producer is resolved by.
    #[inline]
    pub fn service_key(&self) -> ServiceKey {
        self.service
    }

    /// The key of what the underlying registration builds.
    #[inline]
    pub fn implementation_key(&self) -> ServiceKey {
        self.registration.implementation
    }

    #[inline]
    pub fn lifestyle(&self) -> &'static str {
        self.registration.lifestyle
    }

    #[inline]
    pub fn registration_id(&self) -> RegistrationId {
        self.registration.id
    }

    /// Whether the build plan has been compiled yet.
    #[inline]
    pub fn is_compiled(&self) -> bool {
        self.compiled.get().is_some()
    }

    #[inline]
    pub(crate) fn registration(&self) -> &RegistrationCore {
        &self.registration
    }

    #[inline]
    pub(crate) fn cast(&self) -> Caster {
        self.cast
    }

    /// Resolve an instance through this producer.
    ///
    /// Locks the owning container.
    pub fn get_instance(&self) -> Result<Instance> {
        let container = self.container()?;
        self.resolve(&container)
    }

    /// Resolve and downcast to the service type.
    pub fn get<S: ?Sized + Service>(&self) -> Result<Arc<S>> {
        let instance = self.get_instance()?;
        instance.downcast::<S>().ok_or_else(|| {
            DiError::Internal(format!(
                "producer for {} produced {}, not {}",
                self.service,
                instance.type_name(),
                std::any::type_name::<S>()
            ))
        })
    }

    /// Compile the plan and, for constructor-injected registrations, build
    /// one instance so missing dependencies surface now.
    pub fn verify(&self) -> Result<()> {
        let container = self.container()?;
        self.verify_with(&container)
    }

    pub(crate) fn verify_with(&self, container: &Container) -> Result<()> {
        if self.registration.is_constructor_injected() {
            self.resolve(container).map(drop)
        } else {
            let _guard = self.enter(container)?;
            self.compiled(container).map(drop)
        }
    }

    pub(crate) fn resolve(&self, container: &Container) -> Result<Instance> {
        let _guard = self.enter(container)?;
        let factory = self.compiled(container)?;

        #[cfg(feature = "logging")]
        trace!(
            target: "composition_container",
            service = self.service.type_name(),
            lifestyle = self.registration.lifestyle,
            "Invoking compiled factory"
        );

        factory(container)
    }

    #[inline]
    fn enter(&self, container: &Container) -> Result<PathGuard> {
        enter(ActiveEntry::Service {
            container: container.id(),
            key: self.service,
        })
    }

    fn compiled(&self, container: &Container) -> Result<&CompiledFactory> {
        // Concurrent first callers wait for the one compiling.
        self.compiled
            .get_or_try_init(|| compiler::compile(self, container))
    }

    fn container(&self) -> Result<Container> {
        self.ledger
            .upgrade()
            .map(Container::from_ledger)
            .ok_or(DiError::ContainerDropped)
    }
}

impl Hash for InstanceProducer {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.service.hash(state);
        self.registration.id.hash(state);
    }
}

impl fmt::Debug for InstanceProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceProducer")
            .field("service", &self.service)
            .field("implementation", &self.registration.implementation)
            .field("lifestyle", &self.registration.lifestyle)
            .field("compiled", &self.is_compiled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Component, Lifestyle, Transient};

    struct Widget;
    struct Other;

    fn service<T: 'static>() -> ActiveEntry {
        ActiveEntry::Service {
            container: Container::new().id(),
            key: ServiceKey::of::<T>(),
        }
    }

    #[test]
    fn test_enter_detects_reentry() {
        let widget = service::<Widget>();
        let other = service::<Other>();

        let _outer = enter(widget).unwrap();
        let _inner = enter(other).unwrap();

        let err = enter(widget).err().unwrap();
        match err {
            DiError::CircularDependency { type_name, path } => {
                assert!(type_name.ends_with("Widget"));
                assert_eq!(path.matches(" -> ").count(), 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_guard_pops_entry() {
        let widget = service::<Widget>();
        {
            let _guard = enter(widget).unwrap();
        }
        assert!(enter(widget).is_ok());
    }

    #[test]
    fn test_same_type_in_other_container_is_not_a_cycle() {
        let key = ServiceKey::of::<Widget>();
        let _a = enter(ActiveEntry::Service {
            container: Container::new().id(),
            key,
        })
        .unwrap();
        assert!(
            enter(ActiveEntry::Service {
                container: Container::new().id(),
                key,
            })
            .is_ok()
        );
    }

    impl Component for Widget {
        type Dependencies = ();

        fn create(_: ()) -> Self {
            Widget
        }
    }

    #[test]
    fn test_compiles_once_constructs_per_call() {
        let container = Container::new();
        container.register_concrete::<Widget>().unwrap();

        let producer = container
            .registered_producers()
            .into_iter()
            .find(|p| p.service_key() == ServiceKey::of::<Widget>())
            .unwrap();

        assert!(!producer.is_compiled());
        assert_eq!(producer.lifestyle(), Transient.name());

        let a = producer.get::<Widget>().unwrap();
        let b = producer.get::<Widget>().unwrap();

        assert!(producer.is_compiled());
        assert!(container.is_locked());
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_dropped_container() {
        let container = Container::new();
        container.register_concrete::<Widget>().unwrap();
        let producer = container.registered_producers().pop().unwrap();
        drop(container);

        assert!(matches!(
            producer.get_instance(),
            Err(DiError::ContainerDropped)
        ));
    }
}
