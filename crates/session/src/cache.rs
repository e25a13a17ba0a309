use dashmap::DashMap;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// Raw model responses keyed by model and prompt.
///
/// Only responses that parsed into a usable extraction are stored, so a hit
/// never replays a failure.
pub struct ResponseCache {
    responses: Arc<DashMap<String, String>>,
    max_entries: usize,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl ResponseCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            responses: Arc::new(DashMap::new()),
            max_entries,
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    pub fn get(&self, model_id: &str, prompt: &str) -> Option<String> {
        let key = cache_key(model_id, prompt);
        match self.responses.get(&key) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value().clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn insert(&self, model_id: &str, prompt: &str, response: String) {
        if self.max_entries == 0 {
            return;
        }
        if self.responses.len() >= self.max_entries {
            // Drop a quarter of the entries when full
            let to_remove: Vec<_> = self
                .responses
                .iter()
                .take((self.max_entries / 4).max(1))
                .map(|r| r.key().clone())
                .collect();
            debug!(evicted = to_remove.len(), "Response cache full, evicting");
            for key in to_remove {
                self.responses.remove(&key);
            }
        }
        self.responses.insert(cache_key(model_id, prompt), response);
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            responses_cached: self.responses.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    pub fn clear(&self) {
        self.responses.clear();
    }
}

fn cache_key(model_id: &str, prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(prompt.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub responses_cached: usize,
    pub hits: usize,
    pub misses: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_and_miss() {
        let cache = ResponseCache::new(10);
        assert_eq!(cache.get("llama3", "prompt"), None);

        cache.insert("llama3", "prompt", "{}".to_string());
        assert_eq!(cache.get("llama3", "prompt"), Some("{}".to_string()));

        let stats = cache.stats();
        assert_eq!(stats.responses_cached, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_keyed_by_model() {
        let cache = ResponseCache::new(10);
        cache.insert("llama3", "prompt", "a".to_string());
        assert_eq!(cache.get("gemini-2.5-flash", "prompt"), None);
    }

    #[test]
    fn test_eviction_keeps_size_bounded() {
        let cache = ResponseCache::new(4);
        for i in 0..10 {
            cache.insert("m", &format!("prompt {}", i), i.to_string());
        }
        assert!(cache.stats().responses_cached <= 4);
        assert_eq!(cache.get("m", "prompt 9"), Some("9".to_string()));
    }

    #[test]
    fn test_zero_capacity_stores_nothing() {
        let cache = ResponseCache::new(0);
        cache.insert("m", "p", "r".to_string());
        assert_eq!(cache.stats().responses_cached, 0);
    }
}
