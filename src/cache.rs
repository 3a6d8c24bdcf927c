//! Bounded LRU cache over fused query results, keyed by the query text, the
//! requested result count, and a canonical fingerprint of the metadata
//! filter — so two structurally identical filters with keys in a different
//! order still share a cache entry. Coarse invalidation only: any mutation
//! clears the whole cache rather than tracking per-document dependencies.

use std::num::NonZeroUsize;

use lru::LruCache;

use crate::engine::SearchHit;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    query: String,
    k: usize,
    filter_fingerprint: String,
}

pub(crate) struct QueryCache {
    entries: LruCache<CacheKey, Vec<SearchHit>>,
}

impl QueryCache {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity clamped to >= 1");
        QueryCache { entries: LruCache::new(capacity) }
    }

    pub(crate) fn get(&mut self, query: &str, k: usize, filter_fingerprint: &str) -> Option<Vec<SearchHit>> {
        let key = CacheKey {
            query: query.to_string(),
            k,
            filter_fingerprint: filter_fingerprint.to_string(),
        };
        self.entries.get(&key).cloned()
    }

    pub(crate) fn insert(&mut self, query: &str, k: usize, filter_fingerprint: &str, hits: Vec<SearchHit>) {
        let key = CacheKey {
            query: query.to_string(),
            k,
            filter_fingerprint: filter_fingerprint.to_string(),
        };
        self.entries.put(key, hits);
    }

    /// Dropped on any document add/update/delete: a cached result set could
    /// otherwise reference a tombstoned or stale document indefinitely.
    pub(crate) fn invalidate_all(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SearchHit;

    fn hit(doc_id: &str) -> SearchHit {
        SearchHit {
            doc_id: doc_id.to_string(),
            score: 1.0,
            cosine_component: 1.0,
            bm25_component: 0.0,
            jaccard_component: 0.0,
        }
    }

    #[test]
    fn insert_then_get_round_trips() {
        let mut cache = QueryCache::new(4);
        cache.insert("python developer", 10, "{}", vec![hit("d1")]);
        let hits = cache.get("python developer", 10, "{}").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].doc_id, "d1");
    }

    #[test]
    fn different_filter_fingerprint_is_a_cache_miss() {
        let mut cache = QueryCache::new(4);
        cache.insert("python developer", 10, "{}", vec![hit("d1")]);
        assert!(cache.get("python developer", 10, r#"{"min_experience":2}"#).is_none());
    }

    #[test]
    fn invalidate_all_clears_every_entry() {
        let mut cache = QueryCache::new(4);
        cache.insert("python developer", 10, "{}", vec![hit("d1")]);
        cache.invalidate_all();
        assert!(cache.is_empty());
        assert!(cache.get("python developer", 10, "{}").is_none());
    }

    #[test]
    fn capacity_evicts_least_recently_used_entry() {
        let mut cache = QueryCache::new(1);
        cache.insert("a", 10, "{}", vec![hit("d1")]);
        cache.insert("b", 10, "{}", vec![hit("d2")]);
        assert!(cache.get("a", 10, "{}").is_none());
        assert!(cache.get("b", 10, "{}").is_some());
    }
}
