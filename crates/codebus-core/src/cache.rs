//! Handler discovery cache.
//!
//! Maps a subscriber type to its declared [`HandlerTemplate`]s so that
//! [`Subscriber::subscriptions`] runs once per type rather than once per
//! registration. Bounded, least-recently-used eviction.

use std::any::{TypeId, type_name};
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::trace;

use crate::handler::{HandlerTemplate, Subscriber, declare};

/// Default number of subscriber types kept.
pub const DEFAULT_CACHE_CAPACITY: usize = 16;

struct CacheState {
    lru: LruCache<TypeId, Arc<[HandlerTemplate]>>,
    capacity: usize,
    scans: u64,
}

/// Type → templates, bounded LRU.
pub struct HandlerCache {
    state: Mutex<CacheState>,
}

impl HandlerCache {
    /// Creates a cache holding up to `capacity` types.
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(CacheState {
                lru: LruCache::unbounded(),
                capacity,
                scans: 0,
            }),
        }
    }

    /// Returns the templates declared by `S`, scanning on a miss.
    ///
    /// A hit marks `S` most recently used. A miss stores the result and
    /// evicts at most one least-recently-used type if the cache is over
    /// capacity.
    pub fn resolve<S: Subscriber>(&self) -> Arc<[HandlerTemplate]> {
        let key = TypeId::of::<S>();
        let mut state = self.state.lock();
        if let Some(templates) = state.lru.get(&key) {
            return Arc::clone(templates);
        }

        let templates: Arc<[HandlerTemplate]> = declare::<S>().into();
        state.scans += 1;
        state.lru.put(key, Arc::clone(&templates));
        if state.lru.len() > state.capacity {
            state.lru.pop_lru();
        }
        trace!(
            subscriber = type_name::<S>(),
            handlers = templates.len(),
            cached = state.lru.len(),
            "Scanned subscriber type"
        );
        templates
    }

    /// Changes the capacity. Takes effect on the next insert.
    pub fn set_capacity(&self, capacity: usize) {
        self.state.lock().capacity = capacity;
    }

    /// Current capacity.
    pub fn capacity(&self) -> usize {
        self.state.lock().capacity
    }

    /// Number of cached types.
    pub fn len(&self) -> usize {
        self.state.lock().lru.len()
    }

    /// Returns true if no type is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if `S` is cached. Does not touch recency.
    pub fn contains<S: Subscriber>(&self) -> bool {
        self.state.lock().lru.contains(&TypeId::of::<S>())
    }

    /// Number of misses that triggered a declaration scan.
    pub fn scan_count(&self) -> u64 {
        self.state.lock().scans
    }

    /// Drops every cached type.
    pub fn clear(&self) {
        self.state.lock().lru.clear();
    }
}

impl Default for HandlerCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl std::fmt::Debug for HandlerCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("HandlerCache")
            .field("len", &state.lru.len())
            .field("capacity", &state.capacity)
            .field("scans", &state.scans)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::Subscriptions;

    macro_rules! subscriber_types {
        ($($name:ident),*) => {
            $(
                struct $name;

                impl $name {
                    fn on(&self, _value: i32) {}
                }

                impl Subscriber for $name {
                    fn subscriptions(subs: &mut Subscriptions<Self>) {
                        subs.method("on", 1, 0, Self::on);
                    }
                }
            )*
        };
    }

    subscriber_types!(A, B, C, D);

    #[test]
    fn test_hit_does_not_rescan() {
        let cache = HandlerCache::default();
        let first = cache.resolve::<A>();
        let second = cache.resolve::<A>();
        assert_eq!(first.len(), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.scan_count(), 1);
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let cache = HandlerCache::new(2);
        cache.resolve::<A>();
        cache.resolve::<B>();
        cache.resolve::<C>();

        assert_eq!(cache.len(), 2);
        assert!(!cache.contains::<A>());
        assert!(cache.contains::<B>());
        assert!(cache.contains::<C>());
        assert_eq!(cache.scan_count(), 3);

        cache.resolve::<A>();
        assert_eq!(cache.scan_count(), 4);
        assert!(cache.contains::<A>());
        assert!(!cache.contains::<B>());
    }

    #[test]
    fn test_access_restores_recency() {
        let cache = HandlerCache::new(2);
        cache.resolve::<A>();
        cache.resolve::<B>();
        cache.resolve::<A>();
        cache.resolve::<C>();

        assert!(cache.contains::<A>());
        assert!(!cache.contains::<B>());
        assert_eq!(cache.scan_count(), 3);

        cache.resolve::<B>();
        assert_eq!(cache.scan_count(), 4);
    }

    #[test]
    fn test_shrinking_evicts_one_per_insert() {
        let cache = HandlerCache::new(3);
        cache.resolve::<A>();
        cache.resolve::<B>();
        cache.resolve::<C>();

        cache.set_capacity(1);
        assert_eq!(cache.len(), 3);

        cache.resolve::<D>();
        assert_eq!(cache.len(), 3);
        assert!(!cache.contains::<A>());
    }

    #[test]
    fn test_zero_capacity_never_retains() {
        let cache = HandlerCache::new(0);
        assert_eq!(cache.resolve::<A>().len(), 1);
        assert!(cache.is_empty());
        cache.resolve::<A>();
        assert_eq!(cache.scan_count(), 2);
    }
}
