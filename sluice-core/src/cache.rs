use parking_lot::RwLock;
use std::{
    any::Any,
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

/// Shared cached value.
pub type CacheValue = Arc<dyn Any + Send + Sync>;

/// Keyed store with absolute expiration, used by converters that back lookup columns.
pub trait Cache: Send + Sync {
    /// The live value of `key`, expired entries are never returned.
    fn get(&self, key: &str) -> Option<CacheValue>;
    fn insert(&self, key: &str, value: CacheValue, expires_at: Instant);
    fn remove(&self, key: &str) -> Option<CacheValue>;

    /// Typed view of [`Cache::get`].
    fn get_as<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>>
    where
        Self: Sized,
    {
        self.get(key)?.downcast::<T>().ok()
    }

    /// Value of `key`, inserting the one returned by `load` for `ttl` when missing.
    fn get_or_insert_with<T: Any + Send + Sync>(
        &self,
        key: &str,
        ttl: Duration,
        load: impl FnOnce() -> T,
    ) -> Arc<T>
    where
        Self: Sized,
    {
        if let Some(value) = self.get_as::<T>(key) {
            return value;
        }
        let value = Arc::new(load());
        self.insert(key, value.clone(), Instant::now() + ttl);
        value
    }
}

/// In process [`Cache`].
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, (CacheValue, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Default::default()
    }

    /// Drops the expired entries.
    pub fn purge(&self) {
        let now = Instant::now();
        self.entries.write().retain(|_, (_, expires_at)| *expires_at > now);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Option<CacheValue> {
        let entries = self.entries.read();
        let (value, expires_at) = entries.get(key)?;
        (*expires_at > Instant::now()).then(|| value.clone())
    }

    fn insert(&self, key: &str, value: CacheValue, expires_at: Instant) {
        self.entries
            .write()
            .insert(key.to_string(), (value, expires_at));
    }

    fn remove(&self, key: &str) -> Option<CacheValue> {
        self.entries.write().remove(key).map(|(value, _)| value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry() {
        let cache = MemoryCache::new();
        cache.insert("live", Arc::new(5i32), Instant::now() + Duration::from_secs(60));
        cache.insert("dead", Arc::new(6i32), Instant::now() - Duration::from_millis(1));
        assert_eq!(cache.get_as::<i32>("live").as_deref(), Some(&5));
        assert!(cache.get("dead").is_none());
        assert!(cache.get_as::<String>("live").is_none());
        cache.purge();
        assert_eq!(cache.len(), 1);
        assert!(cache.remove("live").is_some());
        assert!(cache.is_empty());
    }

    #[test]
    fn loads_once() {
        let cache = MemoryCache::new();
        let mut loads = 0;
        for _ in 0..3 {
            let names = cache.get_or_insert_with("names", Duration::from_secs(60), || {
                loads += 1;
                vec!["a".to_string()]
            });
            assert_eq!(names.len(), 1);
        }
        assert_eq!(loads, 1);
    }
}
