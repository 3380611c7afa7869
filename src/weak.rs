//! Weak, identity-keyed registry
//!
//! Keeps track of every item handed to it without keeping any of them alive.
//! Items are bucketed by their `Hash` value and matched by pointer identity.
//! Removal only clears the entry; every [`SHRINK_STEP`]th removal sweeps out
//! dead entries and empty buckets.

use ahash::RandomState;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Weak};

/// Number of removals between two maintenance sweeps.
pub const SHRINK_STEP: usize = 100;

struct Buckets<T> {
    map: HashMap<u64, Vec<Weak<T>>, RandomState>,
    removals: usize,
}

impl<T> Buckets<T> {
    fn find(&self, hash: u64, item: &Arc<T>) -> Option<(usize, &Weak<T>)> {
        self.map.get(&hash).and_then(|bucket| {
            bucket
                .iter()
                .enumerate()
                .find(|(_, entry)| entry.strong_count() > 0 && same_target(entry, item))
        })
    }

    fn sweep(&mut self) {
        self.map.retain(|_, bucket| {
            bucket.retain(|entry| entry.strong_count() > 0);
            !bucket.is_empty()
        });
    }
}

#[inline]
fn same_target<T>(entry: &Weak<T>, item: &Arc<T>) -> bool {
    std::ptr::eq(entry.as_ptr(), Arc::as_ptr(item))
}

/// A set of non-owning references to shared items.
///
/// All operations serialize on one lock local to the registry.
pub struct WeakRegistry<T> {
    hasher: RandomState,
    buckets: Mutex<Buckets<T>>,
}

impl<T: Hash> WeakRegistry<T> {
    pub fn new() -> Self {
        Self {
            hasher: RandomState::new(),
            buckets: Mutex::new(Buckets {
                map: HashMap::with_hasher(RandomState::new()),
                removals: 0,
            }),
        }
    }

    /// Track `item` unless a live entry already points at it.
    pub fn add(&self, item: &Arc<T>) {
        let hash = self.hasher.hash_one(&**item);
        let mut buckets = self.buckets.lock();

        if buckets.find(hash, item).is_none() {
            buckets
                .map
                .entry(hash)
                .or_insert_with(|| Vec::with_capacity(1))
                .push(Arc::downgrade(item));
        }
    }

    /// Stop tracking `item`, whether or not it is still alive elsewhere.
    pub fn remove(&self, item: &Arc<T>) {
        let hash = self.hasher.hash_one(&**item);
        let mut buckets = self.buckets.lock();

        if let Some((index, _)) = buckets.find(hash, item) {
            if let Some(bucket) = buckets.map.get_mut(&hash) {
                // Logical delete: the slot stays until the next sweep.
                bucket[index] = Weak::new();
            }
        }

        buckets.removals += 1;
        if buckets.removals % SHRINK_STEP == 0 {
            buckets.sweep();
        }
    }

    /// Snapshot of every tracked item that is still alive, in no particular order.
    pub fn living_items(&self) -> Vec<Arc<T>> {
        let buckets = self.buckets.lock();
        buckets
            .map
            .values()
            .flatten()
            .filter_map(Weak::upgrade)
            .collect()
    }

    /// Number of entries currently stored, dead ones included.
    pub fn slot_count(&self) -> usize {
        self.buckets.lock().map.values().map(Vec::len).sum()
    }
}

impl<T: Hash> Default for WeakRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for WeakRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let buckets = self.buckets.lock();
        f.debug_struct("WeakRegistry")
            .field("buckets", &buckets.map.len())
            .field("removals", &buckets.removals)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Hash)]
    struct Item(u32);

    fn contains(items: &[Arc<Item>], item: &Arc<Item>) -> bool {
        items.iter().any(|living| Arc::ptr_eq(living, item))
    }

    #[test]
    fn test_add_is_identity_keyed() {
        let registry = WeakRegistry::new();
        let a = Arc::new(Item(1));
        let twin = Arc::new(Item(1));

        registry.add(&a);
        registry.add(&a);
        registry.add(&twin);

        // Equal hashes share a bucket, identity keeps them apart.
        assert_eq!(registry.slot_count(), 2);
        let living = registry.living_items();
        assert_eq!(living.len(), 2);
        assert!(contains(&living, &a));
        assert!(contains(&living, &twin));
    }

    #[test]
    fn test_registry_does_not_keep_items_alive() {
        let registry = WeakRegistry::new();
        let a = Arc::new(Item(1));
        let weak = Arc::downgrade(&a);

        registry.add(&a);
        drop(a);

        assert!(weak.upgrade().is_none());
        assert!(registry.living_items().is_empty());
    }

    #[test]
    fn test_remove_is_immediate() {
        let registry = WeakRegistry::new();
        let a = Arc::new(Item(1));
        let b = Arc::new(Item(2));

        registry.add(&a);
        registry.add(&b);
        registry.remove(&a);

        let living = registry.living_items();
        assert!(!contains(&living, &a));
        assert!(contains(&living, &b));

        // Re-adding after a removal tracks the item again.
        registry.add(&a);
        assert!(contains(&registry.living_items(), &a));
    }

    #[test]
    fn test_sweep_drops_dead_entries() {
        let registry = WeakRegistry::new();
        let keep = Arc::new(Item(0));
        registry.add(&keep);

        let doomed: Vec<_> = (1..=50).map(|i| Arc::new(Item(i))).collect();
        for item in &doomed {
            registry.add(item);
        }
        drop(doomed);
        assert_eq!(registry.slot_count(), 51);

        let stranger = Arc::new(Item(999));
        for _ in 0..SHRINK_STEP - 1 {
            registry.remove(&stranger);
        }
        assert_eq!(registry.slot_count(), 51);

        registry.remove(&stranger);
        assert_eq!(registry.slot_count(), 1);
        assert!(contains(&registry.living_items(), &keep));
    }
}
