//! Example demonstrating logging capabilities
//!
//! Run with JSON logging (production):
//! ```bash
//! cargo run --example logging --features logging-json
//! ```
//!
//! Run with pretty logging (development):
//! ```bash
//! cargo run --example logging --features logging-pretty
//! ```

use composition_container::{
    Component, Container, ServiceKey, Singleton, TypeList, provides,
};
use std::sync::Arc;

trait Database: Send + Sync {
    fn url(&self) -> &str;
}

struct Postgres;

impl Database for Postgres {
    fn url(&self) -> &str {
        "postgres://localhost/mydb"
    }
}

impl Component for Postgres {
    type Dependencies = ();

    fn create(_: ()) -> Self {
        Postgres
    }
}

provides!(Postgres => dyn Database);

#[allow(dead_code)]
struct UserService {
    database: Arc<dyn Database>,
}

impl Component for UserService {
    type Dependencies = Arc<dyn Database>;

    fn create(database: Arc<dyn Database>) -> Self {
        UserService { database }
    }
}

trait Middleware: Send + Sync {
    fn name(&self) -> &'static str;
}

struct Auth;
struct Compression;

impl Middleware for Auth {
    fn name(&self) -> &'static str {
        "auth"
    }
}

impl Middleware for Compression {
    fn name(&self) -> &'static str {
        "compression"
    }
}

impl Component for Auth {
    type Dependencies = ();

    fn create(_: ()) -> Self {
        Auth
    }
}

impl Component for Compression {
    type Dependencies = ();

    fn create(_: ()) -> Self {
        Compression
    }
}

provides!(Auth => dyn Middleware);
provides!(Compression => dyn Middleware);

struct RequestContext {
    request_id: String,
}

fn main() {
    // Uses JSON if logging-json is enabled, pretty if logging-pretty is
    #[cfg(feature = "logging")]
    {
        composition_container::logging::init();
    }

    println!("=== Composition Container Logging Demo ===\n");

    // logs: "Creating new composition container"
    let container = Container::new();

    // logs: "Registered service"
    container
        .register_single::<dyn Database, Postgres>()
        .unwrap();
    container.register_concrete::<UserService>().unwrap();

    // logs: "Registering collection"
    container
        .register_all_types(
            TypeList::<dyn Middleware>::new()
                .with::<Auth>()
                .with::<Compression>(),
        )
        .unwrap();

    // logs: "Subscribed to extension hook"
    container
        .on_resolve_unregistered(|event| {
            if event.requested() == ServiceKey::of::<RequestContext>() {
                event.register::<RequestContext, _>(&Singleton, |_| {
                    println!("  [App] Request context being created...");
                    Ok(Arc::new(RequestContext {
                        request_id: "req-12345".into(),
                    }))
                })?;
            }
            Ok(())
        })
        .unwrap();

    // logs: "Container locked", "Verifying container", "Compiling build plan", "Container verified"
    container.verify().unwrap();

    // logs: "Resolving service", "Singleton already initialized, returning cached instance"
    let users = container.get_instance::<UserService>().unwrap();
    println!("  [App] UserService uses {}", users.database.url());

    // logs: "Resolving collection"
    for middleware in &container.get_all_instances::<dyn Middleware>().unwrap() {
        println!("  [App] Middleware: {}", middleware.unwrap().name());
    }

    // logs: "Unregistered type resolved by subscriber"
    let context = container.get_instance::<RequestContext>().unwrap();
    println!("  [App] Request id: {}", context.request_id);

    // logs: "Service not found in container"
    let missing = container.try_get_instance::<Postgres>();
    assert!(missing.is_none());

    // Registration after lock fails
    let locked = container.register_concrete::<Postgres>();
    println!("  [App] Late registration: {}", locked.unwrap_err());

    println!("\n=== Demo Complete ===");
    println!("Check the log output above to see structured logging in action!");
    println!("\nTip: Use --features logging-json for production (JSON output)");
    println!("     Use --features logging-pretty for development (colorful output)");
}
