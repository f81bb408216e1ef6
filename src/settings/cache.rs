use std::sync::Arc;

use tracing::debug;

use crate::{Result, common::MemCache};

use super::{Payload, SettingsRepository};

/// Transient settings store, kept for the lifetime of the session.
///
/// Holds the payload as a JSON string under one key, the way a browser's local
/// storage would.
#[derive(Clone)]
pub struct CacheRepository {
    cache: Arc<MemCache<String, String>>,
    key: String,
}

impl CacheRepository {
    pub fn new(
        cache: Arc<MemCache<String, String>>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            cache,
            key: key.into(),
        }
    }

    pub fn cache(&self) -> Arc<MemCache<String, String>> {
        self.cache.clone()
    }
}

impl SettingsRepository for CacheRepository {
    fn name(&self) -> &'static str {
        "cache"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn load(&self) -> Option<Payload> {
        let raw = self.cache.get(&self.key)?;
        match serde_json::from_str::<Payload>(&raw) {
            Ok(payload) => Some(payload),
            Err(e) => {
                debug!("ignoring corrupt cached settings: {}", e);
                None
            }
        }
    }

    fn store(
        &self,
        payload: &Payload,
    ) -> Result<()> {
        let text = serde_json::to_string(payload)?;
        self.cache.set(self.key.clone(), text);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_cache_roundtrip() {
        let repo = CacheRepository::new(Arc::new(MemCache::new(8)), "k");
        assert!(repo.load().is_none());

        let mut payload = Payload::new();
        payload.insert("1".into(), json!({"width": "2"}));
        repo.store(&payload).unwrap();
        assert_eq!(repo.load().unwrap(), payload);
    }

    #[test]
    fn test_corrupt_cache_is_none() {
        let cache = Arc::new(MemCache::new(8));
        cache.set("k".to_string(), "{oops".to_string());
        let repo = CacheRepository::new(cache, "k");
        assert!(repo.load().is_none());
    }
}
