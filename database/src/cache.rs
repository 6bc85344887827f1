use indexmap::IndexMap;
use parking_lot::RwLock;
use rand::Rng;
use std::sync::Arc;

/// Estimated heap footprint of a cached value, used by byte-budgeted caches.
pub trait MemSized {
    fn mem_size(&self) -> usize;
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CachePolicy {
    /// Bound the number of entries.
    Count(usize),
    /// Bound the total estimated bytes of the values.
    Bytes(usize),
}

impl CachePolicy {
    fn budget(&self) -> usize {
        match self {
            CachePolicy::Count(n) => *n,
            CachePolicy::Bytes(n) => *n,
        }
    }
}

struct Inner<TKey, TData>
where
    TKey: Clone + std::hash::Hash + Eq + Send + Sync,
    TData: Clone + Send + Sync + MemSized,
{
    // We use IndexMap and not HashMap because it makes it cheaper to remove a random element when the cache is full.
    map: IndexMap<TKey, TData>,
    tracked_size: usize,
}

/// A concurrent bounded map with random eviction.
#[derive(Clone)]
pub struct Cache<TKey, TData>
where
    TKey: Clone + std::hash::Hash + Eq + Send + Sync,
    TData: Clone + Send + Sync + MemSized,
{
    inner: Arc<RwLock<Inner<TKey, TData>>>,
    policy: CachePolicy,
}

impl<TKey, TData> Cache<TKey, TData>
where
    TKey: Clone + std::hash::Hash + Eq + Send + Sync,
    TData: Clone + Send + Sync + MemSized,
{
    pub fn new(policy: CachePolicy) -> Self {
        Self { inner: Arc::new(RwLock::new(Inner { map: IndexMap::new(), tracked_size: 0 })), policy }
    }

    pub fn get(&self, key: &TKey) -> Option<TData> {
        self.inner.read().map.get(key).cloned()
    }

    pub fn contains_key(&self, key: &TKey) -> bool {
        self.inner.read().map.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.read().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn insert(&self, key: TKey, data: TData) {
        if self.policy.budget() == 0 {
            return;
        }
        let mut inner = self.inner.write();
        match self.policy {
            CachePolicy::Count(max_entries) => {
                if inner.map.len() == max_entries && !inner.map.contains_key(&key) {
                    let victim = rand::thread_rng().gen_range(0..inner.map.len());
                    inner.map.swap_remove_index(victim);
                }
                inner.map.insert(key, data);
            }
            CachePolicy::Bytes(max_bytes) => {
                inner.tracked_size += data.mem_size();
                if let Some(removed) = inner.map.insert(key, data) {
                    inner.tracked_size = inner.tracked_size.saturating_sub(removed.mem_size());
                }
                while inner.tracked_size > max_bytes && !inner.map.is_empty() {
                    let victim = rand::thread_rng().gen_range(0..inner.map.len());
                    if let Some((_, evicted)) = inner.map.swap_remove_index(victim) {
                        inner.tracked_size = inner.tracked_size.saturating_sub(evicted.mem_size());
                    }
                }
            }
        }
    }

    pub fn remove(&self, key: &TKey) -> Option<TData> {
        let mut inner = self.inner.write();
        match inner.map.swap_remove(key) {
            Some(data) => {
                inner.tracked_size = inner.tracked_size.saturating_sub(data.mem_size());
                Some(data)
            }
            None => None,
        }
    }

    pub fn remove_all(&self) {
        let mut inner = self.inner.write();
        inner.map.clear();
        inner.tracked_size = 0;
    }
}

impl MemSized for Vec<u8> {
    fn mem_size(&self) -> usize {
        self.capacity()
    }
}

impl<T: MemSized> MemSized for Arc<T> {
    fn mem_size(&self) -> usize {
        self.as_ref().mem_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_policy_bounds_entries() {
        let cache: Cache<u64, Vec<u8>> = Cache::new(CachePolicy::Count(4));
        for i in 0..64u64 {
            cache.insert(i, vec![0u8; 8]);
        }
        assert_eq!(cache.len(), 4);
    }

    #[test]
    fn test_bytes_policy_bounds_size() {
        let cache: Cache<u64, Vec<u8>> = Cache::new(CachePolicy::Bytes(1024));
        for i in 0..64u64 {
            cache.insert(i, vec![0u8; 100]);
        }
        // 1024 / 100 leaves at most 10 resident entries
        assert!(cache.len() <= 10);
        assert!(cache.len() > 0);
    }

    #[test]
    fn test_zero_budget_disables_cache() {
        let cache: Cache<u64, Vec<u8>> = Cache::new(CachePolicy::Count(0));
        cache.insert(1, vec![1]);
        assert!(cache.get(&1).is_none());
    }

    #[test]
    fn test_reinsert_updates_tracking() {
        let cache: Cache<u64, Vec<u8>> = Cache::new(CachePolicy::Bytes(1000));
        cache.insert(1, vec![0u8; 400]);
        cache.insert(1, vec![0u8; 400]);
        cache.insert(2, vec![0u8; 400]);
        assert_eq!(cache.len(), 2);
    }
}
