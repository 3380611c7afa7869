//! Error types for the composition container
//!
//! Every failure is one of three kinds (see [`ErrorKind`]): malformed input,
//! an invalid container configuration, or a failure while building an object
//! graph.

use thiserror::Error;

/// Broad classification of a [`DiError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed input: a disallowed descriptor shape or an unusable argument.
    Argument,
    /// The container's state forbids the call: mutation after lock, duplicates,
    /// foreign registrations, broken collections.
    Configuration,
    /// Building an instance failed: unresolved type, cyclic dependency,
    /// failing factory.
    Activation,
}

/// Errors that can occur during registration, resolution or verification
#[derive(Error, Debug, Clone)]
pub enum DiError {
    /// The type cannot be used as a service identity
    #[error(
        "The type {type_name} supplied for `{param}` is ambiguous and can not be used as a service type"
    )]
    AmbiguousType {
        param: &'static str,
        type_name: &'static str,
    },

    /// An argument was rejected
    #[error("Invalid argument `{param}`: {reason}")]
    InvalidArgument { param: &'static str, reason: String },

    /// Container is locked and cannot be modified
    #[error(
        "The container can't be changed after the first call to get_instance, get_all_instances or verify"
    )]
    Locked,

    /// Attempted to register a duplicate service
    #[error(
        "Type {type_name} has already been registered and the container is not configured to allow overriding registrations"
    )]
    AlreadyRegistered { type_name: &'static str },

    /// Attempted to register a second collection for the same element type
    #[error(
        "A collection of {type_name} has already been registered and the container is not configured to allow overriding registrations"
    )]
    CollectionAlreadyRegistered { type_name: &'static str },

    /// The registration belongs to another container
    #[error("The registration supplied for `{param}` was created for a different container")]
    ForeignRegistration { param: &'static str },

    /// A registered collection could not be iterated
    #[error("The registered collection of {element} is invalid: {reason}")]
    InvalidCollection {
        element: &'static str,
        reason: String,
    },

    /// No registration was found and none could be made
    #[error("No registration for type {type_name} could be found")]
    NotFound { type_name: &'static str },

    /// Circular dependency detected during resolution
    #[error("The type {type_name} is directly or indirectly depending on itself: {path}")]
    CircularDependency {
        type_name: &'static str,
        path: String,
    },

    /// Factory failed to create service
    #[error("Failed to create service {type_name}: {reason}")]
    CreationFailed {
        type_name: &'static str,
        reason: String,
    },

    /// The owning container was dropped
    #[error("The container that owns this producer has been dropped")]
    ContainerDropped,

    /// Internal error
    #[error("Internal DI error: {0}")]
    Internal(String),
}

impl DiError {
    /// Create a NotFound error for a type
    #[inline]
    pub fn not_found<T: ?Sized + 'static>() -> Self {
        Self::NotFound {
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Create a CreationFailed error
    #[inline]
    pub fn creation_failed<T: ?Sized + 'static>(reason: impl Into<String>) -> Self {
        Self::CreationFailed {
            type_name: std::any::type_name::<T>(),
            reason: reason.into(),
        }
    }

    /// Create an AlreadyRegistered error
    #[inline]
    pub fn already_registered<T: ?Sized + 'static>() -> Self {
        Self::AlreadyRegistered {
            type_name: std::any::type_name::<T>(),
        }
    }

    #[inline]
    pub(crate) fn invalid_argument(param: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            param,
            reason: reason.into(),
        }
    }

    /// The taxonomy bucket this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AmbiguousType { .. } | Self::InvalidArgument { .. } => ErrorKind::Argument,
            Self::Locked
            | Self::AlreadyRegistered { .. }
            | Self::CollectionAlreadyRegistered { .. }
            | Self::ForeignRegistration { .. }
            | Self::InvalidCollection { .. } => ErrorKind::Configuration,
            Self::NotFound { .. }
            | Self::CircularDependency { .. }
            | Self::CreationFailed { .. }
            | Self::ContainerDropped
            | Self::Internal(_) => ErrorKind::Activation,
        }
    }

    /// Name of the offending type, when the error is about one.
    pub fn type_name(&self) -> Option<&'static str> {
        match self {
            Self::AmbiguousType { type_name, .. }
            | Self::AlreadyRegistered { type_name }
            | Self::CollectionAlreadyRegistered { type_name }
            | Self::NotFound { type_name }
            | Self::CircularDependency { type_name, .. }
            | Self::CreationFailed { type_name, .. } => Some(*type_name),
            Self::InvalidCollection { element, .. } => Some(*element),
            _ => None,
        }
    }

    /// Name of the offending parameter, for argument errors.
    pub fn param(&self) -> Option<&'static str> {
        match self {
            Self::AmbiguousType { param, .. }
            | Self::InvalidArgument { param, .. }
            | Self::ForeignRegistration { param } => Some(*param),
            _ => None,
        }
    }

    #[inline]
    pub fn is_argument(&self) -> bool {
        self.kind() == ErrorKind::Argument
    }

    #[inline]
    pub fn is_configuration(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }

    #[inline]
    pub fn is_activation(&self) -> bool {
        self.kind() == ErrorKind::Activation
    }
}

/// Result type alias for container operations
pub type Result<T> = std::result::Result<T, DiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(
            DiError::AmbiguousType {
                param: "S",
                type_name: "String"
            }
            .kind(),
            ErrorKind::Argument
        );
        assert!(DiError::Locked.is_configuration());
        assert!(DiError::already_registered::<u8>().is_configuration());
        assert!(DiError::not_found::<str>().is_activation());
        assert!(
            DiError::CircularDependency {
                type_name: "A",
                path: "A -> A".into()
            }
            .is_activation()
        );
    }

    #[test]
    fn test_accessors() {
        let err = DiError::not_found::<Vec<u8>>();
        assert_eq!(err.type_name(), Some("alloc::vec::Vec<u8>"));
        assert_eq!(err.param(), None);

        let err = DiError::ForeignRegistration {
            param: "registration",
        };
        assert_eq!(err.param(), Some("registration"));
        assert!(err.to_string().contains("different container"));
    }
}
