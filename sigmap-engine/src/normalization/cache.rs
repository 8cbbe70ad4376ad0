//! Normalization result cache
//!
//! moka sync cache keyed by (label, equipment type, vendor). Entries expire
//! after the configured TTL; a full cache evicts least-recently-used first.

use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use std::sync::Arc;
use std::time::Duration;

use super::LabelExpansion;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub label: String,
    pub equipment_type: String,
    pub vendor: String,
}

impl CacheKey {
    pub fn new(label: &str, equipment_type: Option<&str>, vendor: Option<&str>) -> Self {
        Self {
            label: label.to_string(),
            equipment_type: equipment_type.unwrap_or_default().to_string(),
            vendor: vendor.unwrap_or_default().to_string(),
        }
    }
}

pub struct NormalizationCache {
    cache: Cache<CacheKey, Arc<LabelExpansion>>,
}

impl NormalizationCache {
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .eviction_policy(EvictionPolicy::lru())
            .build();
        Self { cache }
    }

    pub fn get(&self, key: &CacheKey) -> Option<Arc<LabelExpansion>> {
        self.cache.get(key)
    }

    pub fn insert(&self, key: CacheKey, value: Arc<LabelExpansion>) {
        self.cache.insert(key, value);
    }

    /// Entry count after pending maintenance has run
    pub fn len(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks();
    }
}

impl std::fmt::Debug for NormalizationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NormalizationCache")
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalization::NormalizationMethod;

    fn expansion(name: &str) -> Arc<LabelExpansion> {
        Arc::new(LabelExpansion {
            canonical_name: name.to_string(),
            tags: vec![],
            confidence: 25.0,
            method: NormalizationMethod::Unchanged,
            reasoning: vec![],
            vendor_specific: false,
            equipment_specific: false,
        })
    }

    #[test]
    fn keys_distinguish_context() {
        let cache = NormalizationCache::new(100, Duration::from_secs(60));
        cache.insert(CacheKey::new("SaTmp", Some("VAV"), None), expansion("a"));

        assert!(cache.get(&CacheKey::new("SaTmp", Some("VAV"), None)).is_some());
        assert!(cache.get(&CacheKey::new("SaTmp", Some("AHU"), None)).is_none());
        assert!(cache.get(&CacheKey::new("SaTmp", Some("VAV"), Some("Trane"))).is_none());
    }

    #[test]
    fn clear_drops_entries() {
        let cache = NormalizationCache::new(100, Duration::from_secs(60));
        cache.insert(CacheKey::new("a", None, None), expansion("a"));
        cache.insert(CacheKey::new("b", None, None), expansion("b"));
        assert_eq!(cache.len(), 2);

        cache.clear();
        assert!(cache.get(&CacheKey::new("a", None, None)).is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn full_cache_evicts_least_recently_used() {
        let cache = NormalizationCache::new(3, Duration::from_secs(60));
        let key = |label: &str| CacheKey::new(label, None, None);
        for label in ["a", "b", "c"] {
            cache.insert(key(label), expansion(label));
        }
        assert_eq!(cache.len(), 3);

        assert!(cache.get(&key("a")).is_some());
        assert_eq!(cache.len(), 3);

        cache.insert(key("d"), expansion("d"));
        assert_eq!(cache.len(), 3);
        assert!(cache.get(&key("b")).is_none());
        for label in ["a", "c", "d"] {
            assert!(cache.get(&key(label)).is_some(), "{label} evicted");
        }
    }

    #[test]
    fn entries_expire_after_ttl() {
        let cache = NormalizationCache::new(100, Duration::from_millis(50));
        let key = CacheKey::new("a", None, None);
        cache.insert(key.clone(), expansion("a"));
        std::thread::sleep(Duration::from_millis(120));
        assert!(cache.get(&key).is_none());
    }
}
