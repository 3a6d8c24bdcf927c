//! Operational counters, gauges, and histograms, plus the point-in-time
//! health snapshot. Dependency-free by design: no external metrics backend
//! is wired in here, so these are plain structs a caller can serialize or
//! print themselves rather than a `metrics` or `prometheus` facade.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Fixed bucket boundaries (inclusive upper bound, milliseconds) for
/// `search_response_time_ms`.
const SEARCH_LATENCY_BUCKETS_MS: &[u64] = &[1, 5, 10, 25, 50, 100, 250, 500, 1000, 5000];
/// Fixed bucket boundaries (inclusive upper bound, seconds) for
/// `index_build_time_seconds`.
const BUILD_TIME_BUCKETS_S: &[u64] = &[1, 5, 10, 30, 60, 300, 900];

#[derive(Debug, Default)]
struct Counter(AtomicU64);

impl Counter {
    fn incr(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
struct Histogram {
    buckets: Vec<AtomicU64>,
    bounds: &'static [u64],
}

impl Histogram {
    fn new(bounds: &'static [u64]) -> Self {
        Histogram {
            buckets: (0..=bounds.len()).map(|_| AtomicU64::new(0)).collect(),
            bounds,
        }
    }

    fn observe(&self, value: u64) {
        let idx = self.bounds.iter().position(|&bound| value <= bound).unwrap_or(self.bounds.len());
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> Vec<(String, u64)> {
        let mut out = Vec::with_capacity(self.buckets.len());
        for (idx, bound) in self.bounds.iter().enumerate() {
            out.push((format!("le_{bound}"), self.buckets[idx].load(Ordering::Relaxed)));
        }
        out.push(("le_inf".to_string(), self.buckets[self.bounds.len()].load(Ordering::Relaxed)));
        out
    }
}

/// Process-lifetime counters and histograms. Cheap to share behind an `Arc`:
/// every field is lock-free.
#[derive(Debug)]
pub struct Metrics {
    search_queries_total: Counter,
    search_cache_hits_total: Counter,
    index_builds_total: Counter,
    index_build_errors_total: Counter,
    documents_added_total: Counter,
    documents_removed_total: Counter,
    search_response_time_ms: Histogram,
    index_build_time_seconds: Histogram,
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics {
            search_queries_total: Counter::default(),
            search_cache_hits_total: Counter::default(),
            index_builds_total: Counter::default(),
            index_build_errors_total: Counter::default(),
            documents_added_total: Counter::default(),
            documents_removed_total: Counter::default(),
            search_response_time_ms: Histogram::new(SEARCH_LATENCY_BUCKETS_MS),
            index_build_time_seconds: Histogram::new(BUILD_TIME_BUCKETS_S),
        }
    }
}

impl Metrics {
    pub fn new() -> Self {
        Metrics::default()
    }

    pub(crate) fn record_search(&self, cache_hit: bool, elapsed_ms: u64) {
        self.search_queries_total.incr();
        if cache_hit {
            self.search_cache_hits_total.incr();
        }
        self.search_response_time_ms.observe(elapsed_ms);
    }

    pub(crate) fn record_build(&self, succeeded: bool, elapsed_seconds: u64) {
        self.index_builds_total.incr();
        if !succeeded {
            self.index_build_errors_total.incr();
        }
        self.index_build_time_seconds.observe(elapsed_seconds);
    }

    pub(crate) fn record_document_added(&self) {
        self.documents_added_total.incr();
    }

    pub(crate) fn record_document_removed(&self) {
        self.documents_removed_total.incr();
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut counters = HashMap::new();
        counters.insert("search_queries_total".to_string(), self.search_queries_total.get());
        counters.insert("search_cache_hits_total".to_string(), self.search_cache_hits_total.get());
        counters.insert("index_builds_total".to_string(), self.index_builds_total.get());
        counters.insert("index_build_errors_total".to_string(), self.index_build_errors_total.get());
        counters.insert("documents_added_total".to_string(), self.documents_added_total.get());
        counters.insert("documents_removed_total".to_string(), self.documents_removed_total.get());

        let mut histograms = HashMap::new();
        histograms.insert(
            "search_response_time_ms".to_string(),
            self.search_response_time_ms.snapshot(),
        );
        histograms.insert(
            "index_build_time_seconds".to_string(),
            self.index_build_time_seconds.snapshot(),
        );

        MetricsSnapshot { counters, gauges: HashMap::new(), histograms }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub counters: HashMap<String, u64>,
    pub gauges: HashMap<String, u64>,
    pub histograms: HashMap<String, Vec<(String, u64)>>,
}

/// Point-in-time summary of the index's operational state, independent of
/// the cumulative counters above.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub generation: u64,
    pub corpus_size: usize,
    pub tombstones: usize,
    pub pq_trained: bool,
    pub cache_size: usize,
    pub last_build_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_latency_lands_in_expected_bucket() {
        let metrics = Metrics::new();
        metrics.record_search(false, 42);
        let snap = metrics.snapshot();
        let hist = &snap.histograms["search_response_time_ms"];
        let (_, count) = hist.iter().find(|(label, _)| label == "le_50").unwrap();
        assert_eq!(*count, 1);
    }

    #[test]
    fn counters_accumulate_across_calls() {
        let metrics = Metrics::new();
        metrics.record_search(true, 5);
        metrics.record_search(false, 5);
        let snap = metrics.snapshot();
        assert_eq!(snap.counters["search_queries_total"], 2);
        assert_eq!(snap.counters["search_cache_hits_total"], 1);
    }

    #[test]
    fn build_error_increments_error_counter_but_not_success_only_metric() {
        let metrics = Metrics::new();
        metrics.record_build(false, 2);
        let snap = metrics.snapshot();
        assert_eq!(snap.counters["index_builds_total"], 1);
        assert_eq!(snap.counters["index_build_errors_total"], 1);
    }

    #[test]
    fn value_beyond_largest_bucket_falls_into_overflow_bucket() {
        let metrics = Metrics::new();
        metrics.record_search(false, 999_999);
        let snap = metrics.snapshot();
        let hist = &snap.histograms["search_response_time_ms"];
        let (_, count) = hist.iter().find(|(label, _)| label == "le_inf").unwrap();
        assert_eq!(*count, 1);
    }
}
