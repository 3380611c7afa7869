//! Service traits and type-erased instances
//!
//! These traits define what can be handed out by the container and which
//! implementations satisfy which services.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Marker trait for types that can be used as a service.
///
/// This is automatically implemented for every `Send + Sync + 'static` type,
/// including unsized ones such as `dyn Trait` when the trait has `Send + Sync`
/// as supertraits. You never need to implement this manually.
pub trait Service: Send + Sync + 'static {}

impl<T: ?Sized + Send + Sync + 'static> Service for T {}

/// Declares that `Self` can be handed out as the service `S`.
///
/// Every type provides itself. Use [`provides!`](crate::provides) to declare
/// the trait objects a type can be converted into:
///
/// ```rust
/// use composition_container::provides;
///
/// trait Logger: Send + Sync {
///     fn log(&self, message: &str);
/// }
///
/// struct ConsoleLogger;
///
/// impl Logger for ConsoleLogger {
///     fn log(&self, message: &str) {
///         println!("{message}");
///     }
/// }
///
/// provides!(ConsoleLogger => dyn Logger);
/// ```
pub trait Provides<S: ?Sized>: Send + Sync + 'static {
    /// Convert a shared implementation into the shared service.
    fn upcast(self: Arc<Self>) -> Arc<S>;
}

impl<T: ?Sized + Send + Sync + 'static> Provides<T> for T {
    #[inline]
    fn upcast(self: Arc<Self>) -> Arc<T> {
        self
    }
}

/// Declare the services an implementation provides.
///
/// ```rust
/// use composition_container::provides;
///
/// trait Foo: Send + Sync {}
/// trait Bar: Send + Sync {}
///
/// struct FooBar;
/// impl Foo for FooBar {}
/// impl Bar for FooBar {}
///
/// provides!(FooBar => dyn Foo, dyn Bar);
/// ```
#[macro_export]
macro_rules! provides {
    ($implementation:ty => $($service:ty),+ $(,)?) => {
        $(
            impl $crate::Provides<$service> for $implementation {
                #[inline]
                fn upcast(self: ::std::sync::Arc<Self>) -> ::std::sync::Arc<$service> {
                    self
                }
            }
        )+
    };
}

/// A type-erased, shared service instance.
///
/// Holds an `Arc<T>` for some service type `T`; cloning is a reference count
/// increment.
#[derive(Clone)]
pub struct Instance {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Instance {
    /// Erase a shared instance.
    #[inline]
    pub fn new<T: ?Sized + Service>(value: Arc<T>) -> Self {
        Self {
            value: Arc::new(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Recover the shared instance, if it holds an `Arc<T>`.
    #[inline]
    pub fn downcast<T: ?Sized + Service>(&self) -> Option<Arc<T>> {
        self.value.downcast_ref::<Arc<T>>().cloned()
    }

    /// Name of the erased type.
    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("type_name", &self.type_name)
            .finish()
    }
}

/// Converts an erased implementation instance into an erased service instance.
pub(crate) type Caster = fn(&Instance) -> Option<Instance>;

/// The [`Caster`] for `I` provided as `S`.
pub(crate) fn cast_instance<I, S>(instance: &Instance) -> Option<Instance>
where
    I: ?Sized + Provides<S>,
    S: ?Sized + Service,
{
    instance
        .downcast::<I>()
        .map(|implementation| Instance::new(implementation.upcast()))
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct English;

    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".into()
        }
    }

    crate::provides!(English => dyn Greeter);

    #[test]
    fn test_instance_roundtrip() {
        let shared = Arc::new(English);
        let instance = Instance::new(Arc::clone(&shared));

        let back = instance.downcast::<English>().unwrap();
        assert!(Arc::ptr_eq(&shared, &back));
        assert!(instance.downcast::<dyn Greeter>().is_none());
        assert!(instance.type_name().ends_with("English"));
    }

    #[test]
    fn test_cast_keeps_identity() {
        let shared = Arc::new(English);
        let instance = Instance::new(Arc::clone(&shared));

        let cast = cast_instance::<English, dyn Greeter>(&instance).unwrap();
        let greeter = cast.downcast::<dyn Greeter>().unwrap();

        assert_eq!(greeter.greet(), "hello");
        assert!(std::ptr::addr_eq(Arc::as_ptr(&greeter), Arc::as_ptr(&shared)));
    }

    #[test]
    fn test_cast_rejects_wrong_payload() {
        let instance = Instance::new(Arc::new(42_u32));
        assert!(cast_instance::<English, dyn Greeter>(&instance).is_none());
    }
}
