//! Container configuration
//!
//! Options are fixed when the container is created.

/// Options for a [`Container`](crate::Container).
///
/// # Examples
///
/// ```rust
/// use composition_container::{Container, ContainerOptions};
///
/// let container = Container::with_options(
///     ContainerOptions::new()
///         .allow_overriding_registrations(true)
///         .with_capacity(64),
/// );
/// assert!(container.options().overriding_allowed());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContainerOptions {
    allow_overriding: bool,
    capacity: usize,
}

impl ContainerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let a second registration for the same key (or collection element)
    /// replace the first instead of failing.
    pub fn allow_overriding_registrations(mut self, allow: bool) -> Self {
        self.allow_overriding = allow;
        self
    }

    /// Expected number of registrations, used to size the ledger up front.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    #[inline]
    pub fn overriding_allowed(&self) -> bool {
        self.allow_overriding
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ContainerOptions::default();
        assert!(!options.overriding_allowed());
        assert_eq!(options.capacity(), 0);
    }

    #[test]
    fn test_builder() {
        let options = ContainerOptions::new()
            .allow_overriding_registrations(true)
            .with_capacity(32);
        assert!(options.overriding_allowed());
        assert_eq!(options.capacity(), 32);
    }
}
