//! # Composition Container - Object Composition for Rust
//!
//! A thread-safe container that composes object graphs from registrations.
//! It has two phases. First you register services while the container is
//! unlocked. The first resolution locks it, and from then on resolutions
//! run concurrently.
//!
//! ## Features
//!
//! - **Lifestyles** - `Transient`, `Singleton`, or your own [`Lifestyle`]
//! - **Constructor injection** - components declare their dependencies as types
//! - **Build-plan interception** - hooks see every plan before it is compiled;
//!   decorators and initializers are plain plan transformations
//! - **Cycle detection** - self-dependent graphs fail with the offending path
//!   instead of overflowing the stack
//! - **Collections** - fixed snapshots or dynamic lists resolved on every enumeration
//! - **Verification** - build everything once up front
//! - **Observable** - optional tracing integration with JSON or pretty output
//!
//! ## Quick Start
//!
//! ```rust
//! use composition_container::{Component, Container, provides};
//! use std::sync::Arc;
//!
//! trait Logger: Send + Sync {
//!     fn log(&self, message: &str) -> String;
//! }
//!
//! struct ConsoleLogger;
//!
//! impl Logger for ConsoleLogger {
//!     fn log(&self, message: &str) -> String {
//!         format!("[console] {message}")
//!     }
//! }
//!
//! impl Component for ConsoleLogger {
//!     type Dependencies = ();
//!     fn create(_: ()) -> Self {
//!         ConsoleLogger
//!     }
//! }
//!
//! provides!(ConsoleLogger => dyn Logger);
//!
//! struct OrderService {
//!     logger: Arc<dyn Logger>,
//! }
//!
//! impl Component for OrderService {
//!     type Dependencies = Arc<dyn Logger>;
//!     fn create(logger: Arc<dyn Logger>) -> Self {
//!         OrderService { logger }
//!     }
//! }
//!
//! let container = Container::new();
//! container.register_single::<dyn Logger, ConsoleLogger>().unwrap();
//! container.register_concrete::<OrderService>().unwrap();
//! container.verify().unwrap();
//!
//! let orders = container.get_instance::<OrderService>().unwrap();
//! assert_eq!(orders.logger.log("placed"), "[console] placed");
//! ```
//!
//! ## Collections
//!
//! ```rust
//! use composition_container::{Component, Container, TypeList, provides};
//!
//! trait Plugin: Send + Sync {
//!     fn name(&self) -> &'static str;
//! }
//!
//! struct Audit;
//! struct Metrics;
//!
//! impl Plugin for Audit {
//!     fn name(&self) -> &'static str { "audit" }
//! }
//! impl Plugin for Metrics {
//!     fn name(&self) -> &'static str { "metrics" }
//! }
//! impl Component for Audit {
//!     type Dependencies = ();
//!     fn create(_: ()) -> Self { Audit }
//! }
//! impl Component for Metrics {
//!     type Dependencies = ();
//!     fn create(_: ()) -> Self { Metrics }
//! }
//! provides!(Audit => dyn Plugin);
//! provides!(Metrics => dyn Plugin);
//!
//! let container = Container::new();
//! container
//!     .register_all_types(TypeList::<dyn Plugin>::new().with::<Audit>().with::<Metrics>())
//!     .unwrap();
//!
//! let names: Vec<_> = container
//!     .get_all_instances::<dyn Plugin>()
//!     .unwrap()
//!     .iter()
//!     .map(|plugin| plugin.unwrap().name())
//!     .collect();
//! assert_eq!(names, ["audit", "metrics"]);
//! ```
//!
//! ## Decorators
//!
//! ```rust
//! use composition_container::{Container, Singleton};
//! use std::sync::Arc;
//!
//! trait Greeter: Send + Sync {
//!     fn greet(&self) -> String;
//! }
//!
//! struct Plain;
//! impl Greeter for Plain {
//!     fn greet(&self) -> String { "hello".into() }
//! }
//!
//! struct Shouting(Arc<dyn Greeter>);
//! impl Greeter for Shouting {
//!     fn greet(&self) -> String { self.0.greet().to_uppercase() }
//! }
//!
//! let container = Container::new();
//! container
//!     .register_factory::<dyn Greeter, _>(&Singleton, |_| Ok(Arc::new(Plain) as Arc<dyn Greeter>))
//!     .unwrap();
//! container
//!     .on_built(|event| {
//!         event.decorate::<dyn Greeter, _>(|_, inner| Ok(Arc::new(Shouting(inner)) as Arc<dyn Greeter>));
//!     })
//!     .unwrap();
//!
//! assert_eq!(container.get_instance::<dyn Greeter>().unwrap().greet(), "HELLO");
//! ```

mod collection;
mod compiler;
mod component;
mod container;
mod error;
mod events;
mod key;
mod ledger;
mod lifestyle;
#[cfg(feature = "logging")]
pub mod logging;
mod options;
mod plan;
mod producer;
mod provider;
mod registration;
mod weak;

pub use collection::{Collection, Instances, TypeList};
pub use component::{Capabilities, Component, Concrete, Dependencies};
pub use container::Container;
pub use error::{DiError, ErrorKind, Result};
pub use events::{BuildingEvent, BuiltEvent, SubscriptionId, UnregisteredTypeEvent};
pub use key::ServiceKey;
pub use ledger::ContainerId;
pub use lifestyle::{InstanceCache, Lifestyle, Singleton, Transient};
pub use options::ContainerOptions;
pub use plan::{Activator, BuildPlan, Interceptor};
pub use producer::InstanceProducer;
pub use provider::{Instance, Provides, Service};
pub use registration::{Registration, RegistrationId};
pub use weak::WeakRegistry;

// Re-export tracing macros for convenience when logging feature is enabled
#[cfg(feature = "logging")]
pub use tracing::{debug, error, info, trace, warn};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        Collection, Component, Concrete, Container, ContainerOptions, DiError, Lifestyle,
        Provides, Registration, Result, ServiceKey, Singleton, Transient, TypeList, provides,
    };
    pub use std::sync::Arc;
}

#[cfg(test)]
mod tests {
    use crate::prelude::*;

    trait Repository: Send + Sync {
        fn url(&self) -> &str;
    }

    struct Postgres;

    impl Repository for Postgres {
        fn url(&self) -> &str {
            "postgres://localhost"
        }
    }

    impl Component for Postgres {
        type Dependencies = ();

        fn create(_: ()) -> Self {
            Postgres
        }
    }

    provides!(Postgres => dyn Repository);

    struct UserService {
        repository: Arc<dyn Repository>,
    }

    impl Component for UserService {
        type Dependencies = Arc<dyn Repository>;

        fn create(repository: Arc<dyn Repository>) -> Self {
            UserService { repository }
        }
    }

    #[test]
    fn test_object_graph() {
        let container = Container::new();
        container.register_single::<dyn Repository, Postgres>().unwrap();
        container.register_concrete::<UserService>().unwrap();

        let a = container.get_instance::<UserService>().unwrap();
        let b = container.get_instance::<UserService>().unwrap();

        assert_eq!(a.repository.url(), "postgres://localhost");
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&a.repository, &b.repository));
    }

    #[test]
    fn test_not_found_error() {
        let container = Container::new();
        let err = container.get_instance::<dyn Repository>().err().unwrap();
        assert!(matches!(err, DiError::NotFound { .. }));
        assert!(container.try_get_instance::<dyn Repository>().is_none());
    }

    #[test]
    fn test_container_handles_share_state() {
        let container = Container::new();
        let handle = container.clone();
        handle.register_single::<dyn Repository, Postgres>().unwrap();

        assert!(container.contains::<dyn Repository>());
        assert_eq!(container.id(), handle.id());
        assert_ne!(container.id(), Container::new().id());
    }
}
