//! Session-scoped store for serialized settings payloads.
//!
//! Stands in for the browser's local storage: [`CacheRepository`] keeps the
//! settings JSON here under its cache key until the graph gains a settings
//! node and the payload is migrated into it.
//!
//! [`CacheRepository`]: crate::settings::CacheRepository

use moka::sync::Cache;

/// Bounded concurrent map from a storage key to a serialized payload.
///
/// Renderers on any thread read it while handlers write it, and old keys
/// are evicted once `capacity` is reached.
#[derive(Clone)]
pub struct MemCache<K, V> {
    entries: Cache<K, V>,
}

impl<K, V> MemCache<K, V>
where
    K: std::hash::Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Allocate a cache holding at most `capacity` payloads.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Cache::new(capacity as u64),
        }
    }

    /// Insert or replace the value stored under `key`.
    pub fn set(
        &self,
        key: K,
        value: V,
    ) {
        self.entries.insert(key, value);
    }

    /// Get the value stored under `&K`.
    pub fn get(
        &self,
        key: &K,
    ) -> Option<V> {
        self.entries.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_saving_payload_replaces_previous() {
        let cache: MemCache<String, String> = MemCache::new(4);
        let key = "mobile-form.widget-settings".to_string();
        assert!(cache.get(&key).is_none());
        cache.set(key.clone(), r#"{"3":{"width":"2"}}"#.to_string());
        cache.set(key.clone(), r#"{"3":{"width":"4"}}"#.to_string());
        assert_eq!(cache.get(&key).as_deref(), Some(r#"{"3":{"width":"4"}}"#));
    }
}
