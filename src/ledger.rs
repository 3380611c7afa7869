//! Registration ledger
//!
//! Maps service keys to producers and owns the one-way Unlocked -> Locked
//! transition. Every mutation runs under a single configuration mutex that
//! also guards the transition, so no registration can slip in after the
//! container is locked. Once locked, the maps are only read (the unregistered
//! cache aside) and lookups go straight to `DashMap`.

use crate::collection::CollectionEntry;
use crate::events::Hooks;
use crate::producer::InstanceProducer;
use crate::registration::InstanceInitializer;
use crate::weak::WeakRegistry;
use crate::{ContainerOptions, DiError, Result, ServiceKey};
use ahash::RandomState;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[cfg(feature = "logging")]
use tracing::debug;

/// Unique container identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContainerId(u64);

impl ContainerId {
    #[inline]
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "container-{}", self.0)
    }
}

/// State that may only change while unlocked.
#[derive(Default)]
pub(crate) struct Configuration {
    pub(crate) hooks: Hooks,
    pub(crate) initializers: Vec<InstanceInitializer>,
}

/// Snapshot of the configuration taken when the container locks.
pub(crate) struct Frozen {
    pub(crate) hooks: Hooks,
    pub(crate) initializers: Vec<InstanceInitializer>,
}

type Map<V> = DashMap<ServiceKey, V, RandomState>;

/// Shard count for an expected number of entries.
///
/// Default DashMap uses num_cpus * 4 shards which is overkill for typical
/// containers with fewer than 50 registrations.
fn shard_amount(capacity: usize) -> usize {
    if capacity <= 16 {
        8
    } else if capacity <= 64 {
        16
    } else {
        32
    }
}

fn new_map<V>(capacity: usize) -> Map<V> {
    DashMap::with_capacity_and_hasher_and_shard_amount(
        capacity,
        RandomState::new(),
        shard_amount(capacity),
    )
}

pub(crate) struct Ledger {
    pub(crate) id: ContainerId,
    pub(crate) options: ContainerOptions,
    config: Mutex<Configuration>,
    frozen: OnceCell<Frozen>,
    pub(crate) producers: Map<Arc<InstanceProducer>>,
    /// Producers adopted for keys nobody registered.
    pub(crate) unregistered: Map<Arc<InstanceProducer>>,
    /// Collection registrations keyed by element.
    pub(crate) collections: Map<Arc<dyn CollectionEntry>>,
    pub(crate) registry: WeakRegistry<InstanceProducer>,
    pub(crate) verified: AtomicBool,
}

impl Ledger {
    pub(crate) fn new(options: ContainerOptions) -> Self {
        let capacity = options.capacity();
        Self {
            id: ContainerId::next(),
            options,
            config: Mutex::new(Configuration::default()),
            frozen: OnceCell::new(),
            producers: new_map(capacity),
            unregistered: new_map(0),
            collections: new_map(0),
            registry: WeakRegistry::new(),
            verified: AtomicBool::new(false),
        }
    }

    #[inline]
    pub(crate) fn is_locked(&self) -> bool {
        self.frozen.get().is_some()
    }

    /// Lock the ledger (if needed) and return the frozen configuration.
    pub(crate) fn lock(&self) -> &Frozen {
        if let Some(frozen) = self.frozen.get() {
            return frozen;
        }

        let config = self.config.lock();
        self.frozen.get_or_init(|| {
            #[cfg(feature = "logging")]
            debug!(
                target: "composition_container",
                container = %self.id,
                registrations = self.producers.len(),
                collections = self.collections.len(),
                hooks = config.hooks.len(),
                initializers = config.initializers.len(),
                "Container locked - no further registrations allowed"
            );

            Frozen {
                hooks: config.hooks.clone(),
                initializers: config.initializers.clone(),
            }
        })
    }

    /// Fail fast when locked. [`Ledger::mutate`] re-checks under the mutex.
    #[inline]
    pub(crate) fn ensure_unlocked(&self) -> Result<()> {
        if self.is_locked() {
            return Err(DiError::Locked);
        }
        Ok(())
    }

    /// Run `f` under the configuration mutex, unless locked.
    ///
    /// `f` must not call back into user code or into [`Ledger::lock`].
    pub(crate) fn mutate<R>(&self, f: impl FnOnce(&mut Configuration) -> Result<R>) -> Result<R> {
        let mut config = self.config.lock();
        if self.is_locked() {
            return Err(DiError::Locked);
        }
        f(&mut config)
    }

    /// Store a producer under its service key.
    pub(crate) fn add_producer(&self, producer: Arc<InstanceProducer>) -> Result<()> {
        let key = producer.service_key();
        let replaced = self.mutate(|_| {
            if !self.options.overriding_allowed() && self.producers.contains_key(&key) {
                return Err(DiError::AlreadyRegistered {
                    type_name: key.type_name(),
                });
            }
            let replaced = self.producers.insert(key, Arc::clone(&producer));
            producer
                .registration()
                .record_service(key, producer.cast());
            Ok(replaced)
        })?;

        self.registry.add(&producer);
        if let Some(replaced) = replaced {
            self.registry.remove(&replaced);

            #[cfg(feature = "logging")]
            debug!(
                target: "composition_container",
                service = key.type_name(),
                "Registration overridden"
            );
        }
        Ok(())
    }

    /// Store a collection registration under its element key.
    pub(crate) fn add_collection(&self, entry: Arc<dyn CollectionEntry>) -> Result<()> {
        let element = entry.element();
        self.mutate(|_| {
            if !self.options.overriding_allowed() && self.collections.contains_key(&element) {
                return Err(DiError::CollectionAlreadyRegistered {
                    type_name: element.type_name(),
                });
            }
            self.collections.insert(element, entry);
            Ok(())
        })
    }

    #[inline]
    pub(crate) fn producer(&self, key: &ServiceKey) -> Option<Arc<InstanceProducer>> {
        self.producers.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Producer previously adopted for an unregistered key.
    #[inline]
    pub(crate) fn adopted(&self, key: &ServiceKey) -> Option<Arc<InstanceProducer>> {
        self.unregistered
            .get(key)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Adopt a producer for an unregistered key; concurrent adopters converge
    /// on the first one stored.
    pub(crate) fn adopt(&self, producer: InstanceProducer) -> Arc<InstanceProducer> {
        let adopted = Arc::clone(
            self.unregistered
                .entry(producer.service_key())
                .or_insert_with(|| {
                    producer
                        .registration()
                        .record_service(producer.service_key(), producer.cast());
                    Arc::new(producer)
                })
                .value(),
        );
        self.registry.add(&adopted);
        adopted
    }

    pub(crate) fn collection(&self, element: &ServiceKey) -> Option<Arc<dyn CollectionEntry>> {
        self.collections
            .get(element)
            .map(|entry| Arc::clone(entry.value()))
    }
}

impl fmt::Debug for Ledger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ledger")
            .field("id", &self.id)
            .field("registrations", &self.producers.len())
            .field("collections", &self.collections.len())
            .field("locked", &self.is_locked())
            .field("verified", &self.verified.load(Ordering::Acquire))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shard_amount() {
        assert_eq!(shard_amount(0), 8);
        assert_eq!(shard_amount(16), 8);
        assert_eq!(shard_amount(64), 16);
        assert_eq!(shard_amount(1000), 32);
    }

    #[test]
    fn test_container_ids_unique() {
        let a = ContainerId::next();
        let b = ContainerId::next();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("container-"));
    }

    #[test]
    fn test_lock_freezes_configuration() {
        let ledger = Ledger::new(ContainerOptions::default());
        ledger
            .mutate(|config| {
                config
                    .initializers
                    .push(InstanceInitializer::new::<u8, _>(|_| {}));
                Ok(())
            })
            .unwrap();

        assert!(ledger.ensure_unlocked().is_ok());
        assert_eq!(ledger.lock().initializers.len(), 1);
        assert!(ledger.is_locked());

        let err = ledger.mutate(|_| Ok(())).unwrap_err();
        assert!(matches!(err, DiError::Locked));
        assert!(ledger.ensure_unlocked().is_err());

        // Locking again returns the same snapshot.
        assert_eq!(ledger.lock().initializers.len(), 1);
    }
}
