//! The engine orchestrator: build pipeline, query pipeline, fusion scoring,
//! incremental mutation, and the generation state machine tying every index
//! module together behind one handle.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::bm25::Bm25Index;
use crate::cache::QueryCache;
use crate::cancellation::{CancellationToken, Deadline};
use crate::config::{EngineConfig, FusionConfig};
use crate::document::{AttributeValue, Document};
use crate::embedder::Embedder;
use crate::error::{EngineError, EngineResult};
use crate::events::{EngineEvent, EventSink, NoopEventSink};
use crate::hnsw::HnswIndex;
use crate::lsh::LshIndex;
use crate::metadata::{FilterBag, MetadataStore};
use crate::metrics::{HealthSnapshot, Metrics, MetricsSnapshot};
use crate::persistence::{self, EmbeddingsSnapshot, EngineSnapshot, Manifest};
use crate::pq::ProductQuantizer;

/// Deterministic seed for PQ codebook training, independent of the LSH seed
/// so the two index families don't share RNG state.
const PQ_TRAIN_SEED: u64 = 0x9E3779B97F4A7C15;
/// Cap on how many embeddings feed PQ training, per §4.6's
/// `max(K·40, 10_000)` rule.
const PQ_TRAIN_SAMPLE_FLOOR: usize = 10_000;
const PQ_TRAIN_SAMPLE_PER_CENTROID: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GenerationStatus {
    Empty,
    Building,
    Ready,
    Mutating,
    RebuildScheduled,
}

struct EngineState {
    status: GenerationStatus,
    generation: u64,
    documents: HashMap<String, Document>,
    embeddings: HashMap<String, Vec<f32>>,
    hnsw: HnswIndex,
    lsh: LshIndex,
    bm25: Bm25Index,
    pq: ProductQuantizer,
    metadata: MetadataStore,
    mutations_since_build: usize,
    last_build_ms: Option<u64>,
}

impl EngineState {
    fn fresh(config: &EngineConfig) -> EngineResult<Self> {
        Ok(EngineState {
            status: GenerationStatus::Empty,
            generation: 0,
            documents: HashMap::new(),
            embeddings: HashMap::new(),
            hnsw: HnswIndex::new(config.embedding_dim, config.hnsw.m, config.hnsw.ef_construction, config.lsh.seed),
            lsh: LshIndex::new(config.lsh.num_bands, config.lsh.rows_per_band, config.lsh.seed),
            bm25: Bm25Index::new(config.bm25.k1, config.bm25.b),
            pq: ProductQuantizer::new(config.embedding_dim, config.pq.num_subquantizers, config.pq.num_centroids)?,
            metadata: MetadataStore::new(),
            mutations_since_build: 0,
            last_build_ms: None,
        })
    }

    fn corpus_size(&self) -> usize {
        self.documents.len()
    }

    fn drift_count(&self) -> usize {
        self.mutations_since_build + self.hnsw.tombstone_count()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildReport {
    pub documents_processed: usize,
    pub failures: usize,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub doc_id: String,
    pub score: f32,
    pub cosine_component: f32,
    pub bm25_component: f32,
    pub jaccard_component: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub doc_id: String,
    pub combined_score: f32,
    pub cos: f32,
    pub bm25: f32,
    pub jac: f32,
    pub metadata: BTreeMap<String, AttributeValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ack {
    pub success: bool,
    pub generation: u64,
}

/// The hybrid retrieval engine. Cheap to clone the handle (everything behind
/// `Arc`); the actual state lives in one `RwLock<EngineState>` guarded on the
/// write side by a single-writer mutex per §5's concurrency model.
pub struct Engine {
    config: EngineConfig,
    embedder: Arc<dyn Embedder>,
    state: RwLock<EngineState>,
    mutation_lock: Mutex<()>,
    cache: Mutex<QueryCache>,
    metrics: Metrics,
    events: Arc<dyn EventSink>,
}

impl Engine {
    pub fn new(config: EngineConfig, embedder: Arc<dyn Embedder>) -> EngineResult<Self> {
        Engine::with_event_sink(config, embedder, Arc::new(NoopEventSink))
    }

    /// Same as [`Engine::new`] but with a caller-supplied [`EventSink`]
    /// instead of the default no-op one.
    pub fn with_event_sink(
        config: EngineConfig,
        embedder: Arc<dyn Embedder>,
        events: Arc<dyn EventSink>,
    ) -> EngineResult<Self> {
        config.validate()?;
        if embedder.dimension() != config.embedding_dim {
            return Err(EngineError::validation(format!(
                "embedder dimension {} does not match config.embedding_dim {}",
                embedder.dimension(),
                config.embedding_dim
            )));
        }
        let cache = QueryCache::new(config.cache_max_size);
        let state = EngineState::fresh(&config)?;
        Ok(Engine {
            config,
            embedder,
            state: RwLock::new(state),
            mutation_lock: Mutex::new(()),
            cache: Mutex::new(cache),
            metrics: Metrics::new(),
            events,
        })
    }

    /// Full (re)build over `documents`, replacing every index in place.
    /// Documents that fail tokenization or embedding are skipped and counted
    /// in `BuildReport::failures`; the build as a whole succeeds if at least
    /// one document was indexed.
    pub fn build_indexes(&self, mut documents: Vec<Document>) -> EngineResult<BuildReport> {
        let _guard = self.mutation_lock.lock().expect("mutation lock poisoned");
        let start = Instant::now();
        self.events.on_event(EngineEvent::BuildStarted { requested: documents.len() });
        {
            let mut state = self.state.write().expect("state lock poisoned");
            state.status = GenerationStatus::Building;
        }

        // Deterministic doc-id order, required for stable builds (§4.6 step 5).
        documents.sort_by(|a, b| a.id.cmp(&b.id));

        let canonical_texts: Vec<String> = documents.iter().map(|d| d.canonical_text()).collect();
        let texts_for_embed: Vec<&str> = canonical_texts.iter().map(|s| s.as_str()).collect();
        let embedded = self
            .embedder
            .encode(&texts_for_embed)
            .map_err(|e| EngineError::embedding_failure(e.to_string()))?;

        let succeeded = embedded.len().min(documents.len());
        let failures = documents.len() - succeeded;
        for doc in documents.iter().skip(succeeded) {
            self.events.on_event(EngineEvent::DocumentBuildFailed { doc_id: doc.id.clone() });
        }

        let result = (|| -> EngineResult<BuildReport> {
            let mut fresh = EngineState::fresh(&self.config)?;
            let mut embedding_samples: Vec<Vec<f32>> = Vec::with_capacity(succeeded);

            for (doc, vector) in documents.iter().zip(embedded.iter()).take(succeeded) {
                let tokens: Vec<String> = crate::document::tokenize(&doc.canonical_text());
                let token_set: HashSet<String> = doc.token_set();
                fresh.metadata.add(doc);
                fresh.bm25.add(&doc.id, &tokens);
                fresh.lsh.add(&doc.id, token_set);
                fresh.documents.insert(doc.id.clone(), doc.clone());
                fresh.embeddings.insert(doc.id.clone(), vector.clone());
                embedding_samples.push(vector.clone());
            }

            if !embedding_samples.is_empty() {
                let cap = PQ_TRAIN_SAMPLE_FLOOR.max(fresh.pq_sample_target(&self.config));
                let cap = cap.min(embedding_samples.len());
                let sample: Vec<Vec<f32>> = embedding_samples.iter().take(cap).cloned().collect();
                // PQ training is best-effort: an exotic degenerate corpus
                // (e.g. every vector identical) should not fail the whole
                // build.
                let _ = fresh.pq.train(&sample, PQ_TRAIN_SEED);
            }

            for doc in documents.iter().take(succeeded) {
                if let Some(vector) = fresh.embeddings.get(&doc.id) {
                    fresh.hnsw.add(&doc.id, vector)?;
                }
            }

            fresh.status = GenerationStatus::Ready;
            fresh.generation = {
                let state = self.state.read().expect("state lock poisoned");
                state.generation + 1
            };
            fresh.last_build_ms = Some(start.elapsed().as_millis() as u64);

            {
                let mut state = self.state.write().expect("state lock poisoned");
                *state = fresh;
            }

            if let Some(path) = &self.config.index_path {
                // Best-effort: a snapshot IO failure is reported but does not
                // roll back the in-memory generation that just finished.
                if let Err(e) = self.snapshot(path) {
                    self.events.on_event(EngineEvent::SnapshotFailed { path: path.clone(), reason: e.to_string() });
                }
            }

            self.cache.lock().expect("cache lock poisoned").invalidate_all();

            Ok(BuildReport {
                documents_processed: succeeded,
                failures,
                elapsed_ms: start.elapsed().as_millis() as u64,
            })
        })();

        self.metrics.record_build(result.is_ok(), start.elapsed().as_secs());
        if let Ok(report) = &result {
            self.events.on_event(EngineEvent::BuildFinished {
                processed: report.documents_processed,
                failures: report.failures,
                elapsed_ms: report.elapsed_ms,
            });
        }
        result
    }

    /// Insert (or replace) a single document into the live indexes.
    pub fn add_document(&self, doc: Document) -> EngineResult<Ack> {
        let _guard = self.mutation_lock.lock().expect("mutation lock poisoned");
        let vector = self
            .embedder
            .encode(&[doc.canonical_text().as_str()])
            .map_err(|e| EngineError::embedding_failure(e.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::embedding_failure("embedder returned no vector"))?;

        let mut state = self.state.write().expect("state lock poisoned");
        state.status = GenerationStatus::Mutating;

        let doc_id = doc.id.clone();
        let tokens = crate::document::tokenize(&doc.canonical_text());
        let token_set = doc.token_set();

        state.metadata.remove(&doc_id);
        state.metadata.add(&doc);
        state.bm25.add(&doc_id, &tokens);
        state.lsh.add(&doc_id, token_set);
        state.hnsw.add(&doc_id, &vector)?;
        if state.pq.is_trained() {
            // Encoding failure here just means this document's PQ code stays
            // stale until the next rebuild; it never affects `search()`
            // since PQ isn't wired into the hot path (see §9 open questions).
            let _ = state.pq.encode(&vector);
        }
        state.documents.insert(doc_id.clone(), doc);
        state.embeddings.insert(doc_id, vector.clone());
        let generation = state.generation;
        state.mutations_since_build += 1;
        state.status = GenerationStatus::Ready;
        drop(state);

        self.maybe_rebuild();
        self.cache.lock().expect("cache lock poisoned").invalidate_all();
        self.metrics.record_document_added();
        Ok(Ack { success: true, generation })
    }

    /// Treated as remove-then-add; an unknown `doc_id` is treated as a plain
    /// add.
    pub fn update_document(&self, doc_id: &str, doc: Document) -> EngineResult<Ack> {
        self.delete_document(doc_id)?;
        self.add_document(doc)
    }

    /// Tombstone in HNSW; drop from BM25/LSH/metadata/embedding/PQ tables.
    /// A no-op (but still a successful Ack) for an unknown doc-id.
    pub fn delete_document(&self, doc_id: &str) -> EngineResult<Ack> {
        let _guard = self.mutation_lock.lock().expect("mutation lock poisoned");
        let mut state = self.state.write().expect("state lock poisoned");
        state.status = GenerationStatus::Mutating;

        state.hnsw.remove(doc_id);
        state.bm25.remove(doc_id);
        state.lsh.remove(doc_id);
        state.metadata.remove(doc_id);
        state.documents.remove(doc_id);
        state.embeddings.remove(doc_id);
        state.mutations_since_build += 1;
        let generation = state.generation;
        state.status = GenerationStatus::Ready;
        drop(state);

        self.maybe_rebuild();
        self.cache.lock().expect("cache lock poisoned").invalidate_all();
        self.metrics.record_document_removed();
        Ok(Ack { success: true, generation })
    }

    /// Schedule a rebuild when drift exceeds `max(drift_absolute,
    /// drift_fraction * corpus_size)`. The rebuild itself runs inline here
    /// (there is no background scheduler in this process) but the
    /// `RebuildScheduled` status transition is still observable to a reader
    /// racing a mutation.
    fn maybe_rebuild(&self) {
        let (should_rebuild, documents, drift_count, threshold) = {
            let mut state = self.state.write().expect("state lock poisoned");
            let threshold = (self.config.drift.drift_absolute as f32)
                .max(self.config.drift.drift_fraction * state.corpus_size() as f32) as usize;
            let threshold = threshold.max(1);
            let drift_count = state.drift_count();
            if drift_count >= threshold && !state.documents.is_empty() {
                state.status = GenerationStatus::RebuildScheduled;
                (true, state.documents.values().cloned().collect::<Vec<_>>(), drift_count, threshold)
            } else {
                (false, Vec::new(), drift_count, threshold)
            }
        };
        if should_rebuild {
            self.events.on_event(EngineEvent::RebuildTriggered { drift_count, threshold });
            let _ = self.build_indexes(documents);
        }
    }

    /// Rank documents for `query_text` against the fused scoring function of
    /// §4.6: `0.6*cos + 0.3*bm25 + 0.1*jac` (configurable via
    /// `EngineConfig::fusion`).
    pub fn search(
        &self,
        query_text: &str,
        num_results: usize,
        filters: Option<&serde_json::Value>,
        ef_search: Option<usize>,
        cancel: &CancellationToken,
        deadline: Option<Deadline>,
    ) -> EngineResult<Vec<SearchResult>> {
        if query_text.trim().is_empty() {
            return Err(EngineError::validation("query text must not be empty"));
        }
        if num_results == 0 || num_results > 1000 {
            return Err(EngineError::validation("num_results must be in 1..=1000"));
        }

        let filter_bag = match filters {
            Some(value) => FilterBag::from_json(value)?,
            None => FilterBag::default(),
        };
        let filter_fingerprint = filter_bag.fingerprint();

        let start = Instant::now();
        if let Some(hits) = self.cache.lock().expect("cache lock poisoned").get(query_text, num_results, &filter_fingerprint) {
            self.metrics.record_search(true, start.elapsed().as_millis() as u64);
            return Ok(hydrate(hits, &self.state));
        }

        {
            let state = self.state.read().expect("state lock poisoned");
            if state.status == GenerationStatus::Empty {
                return Err(EngineError::IndexNotReady);
            }
        }

        let query_vector = self
            .embedder
            .encode(&[query_text])
            .map_err(|e| EngineError::embedding_failure(e.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::embedding_failure("embedder returned no vector"))?;
        let query_tokens = crate::document::tokenize(query_text);
        let query_token_set: HashSet<String> = query_tokens.iter().cloned().collect();

        let ef = ef_search.unwrap_or(self.config.hnsw.ef_search);
        // §5: a hard default query deadline applies even when the caller
        // didn't supply one, so a pathological HNSW walk can't run forever.
        let deadline = deadline.unwrap_or_else(|| Deadline::after(std::time::Duration::from_millis(self.config.query_deadline_ms)));

        let hits = {
            let state = self.state.read().expect("state lock poisoned");

            if deadline.has_passed() {
                return Err(EngineError::Timeout);
            }

            let hnsw_hits = state.hnsw.search(&query_vector, num_results.max(ef), ef, cancel)?;
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            if deadline.has_passed() {
                return Err(EngineError::Timeout);
            }
            let lsh_candidates = state.lsh.candidates(&query_token_set);

            let mut candidate_ids: HashSet<String> = hnsw_hits.iter().map(|h| h.doc_id.clone()).collect();
            candidate_ids.extend(lsh_candidates);
            let candidate_ids: Vec<String> = candidate_ids.into_iter().collect();

            // Below the threshold a sequential loop polls cancellation and
            // the deadline between every candidate; a `rayon` fan-out above
            // it trades that per-candidate granularity for throughput, with
            // a single check once every worker has returned.
            let mut scored: Vec<SearchHit> = if candidate_ids.len() >= self.config.parallel_scoring_threshold {
                candidate_ids
                    .par_iter()
                    .filter_map(|doc_id| {
                        score_candidate(doc_id, &state, &filter_bag, &query_vector, &query_tokens, &query_token_set, &self.config.fusion)
                    })
                    .collect()
            } else {
                let mut out = Vec::with_capacity(candidate_ids.len());
                for doc_id in &candidate_ids {
                    if cancel.is_cancelled() {
                        return Err(EngineError::Cancelled);
                    }
                    if deadline.has_passed() {
                        return Err(EngineError::Timeout);
                    }
                    if let Some(hit) =
                        score_candidate(doc_id, &state, &filter_bag, &query_vector, &query_tokens, &query_token_set, &self.config.fusion)
                    {
                        out.push(hit);
                    }
                }
                out
            };
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            if deadline.has_passed() {
                return Err(EngineError::Timeout);
            }

            scored.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.doc_id.cmp(&b.doc_id))
            });
            scored.truncate(num_results);
            scored
        };

        self.cache.lock().expect("cache lock poisoned").insert(query_text, num_results, &filter_fingerprint, hits.clone());
        self.metrics.record_search(false, start.elapsed().as_millis() as u64);
        Ok(hydrate(hits, &self.state))
    }

    /// Probe recall@1 of the PQ-compressed asymmetric distance against exact
    /// cosine, over the live corpus. Exists for the regression test in §8;
    /// PQ is never consulted by `search()` itself.
    pub fn pq_recall_probe(&self, probe_queries: &[Vec<f32>]) -> EngineResult<f32> {
        let state = self.state.read().expect("state lock poisoned");
        if !state.pq.is_trained() || state.embeddings.is_empty() {
            return Ok(0.0);
        }
        let ids: Vec<&String> = state.embeddings.keys().collect();
        let mut hits = 0usize;
        for query in probe_queries {
            let exact_best = ids
                .iter()
                .map(|id| (id, 1.0 - crate::hnsw::distance::cosine_distance(query, &state.embeddings[*id])))
                .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
                .map(|(id, _)| id.to_string());

            let mut best_pq: Option<(String, f32)> = None;
            for id in &ids {
                let vector = &state.embeddings[*id];
                let Ok(code) = state.pq.encode(vector) else { continue };
                let Ok(distance) = state.pq.decode_distance(query, &code) else { continue };
                if best_pq.as_ref().is_none_or(|(_, best)| distance < *best) {
                    best_pq = Some(((*id).clone(), distance));
                }
            }
            if let (Some(exact), Some((approx, _))) = (exact_best, best_pq) {
                if exact == approx {
                    hits += 1;
                }
            }
        }
        Ok(if probe_queries.is_empty() { 0.0 } else { hits as f32 / probe_queries.len() as f32 })
    }

    pub fn snapshot(&self, path: &str) -> EngineResult<Ack> {
        let state = self.state.read().expect("state lock poisoned");
        let mut id_map: Vec<String> = state.embeddings.keys().cloned().collect();
        id_map.sort();
        let mut data = Vec::with_capacity(id_map.len() * self.config.embedding_dim);
        for id in &id_map {
            data.extend_from_slice(&state.embeddings[id]);
        }
        let snapshot = EngineSnapshot {
            manifest: Manifest {
                generation: state.generation,
                dimension: self.config.embedding_dim,
                hnsw_m: self.config.hnsw.m,
                pq_num_centroids: self.config.pq.num_centroids,
                lsh_num_bands: self.config.lsh.num_bands,
                lsh_rows_per_band: self.config.lsh.rows_per_band,
                document_count: state.corpus_size(),
            },
            hnsw: state.hnsw.snapshot(),
            lsh: state.lsh.clone(),
            bm25: state.bm25.clone(),
            pq: state.pq.clone(),
            metadata: state.metadata.clone(),
            embeddings: EmbeddingsSnapshot { dimension: self.config.embedding_dim, id_map, data },
        };
        let generation = state.generation;
        drop(state);
        persistence::save_generation(std::path::Path::new(path), &snapshot)?;
        Ok(Ack { success: true, generation })
    }

    /// Load the most recent generation at `path`. A missing or corrupted
    /// generation surfaces as `EngineError::IndexIO` rather than silently
    /// starting empty — the caller decides whether to fall back to a
    /// rebuild.
    pub fn load(&self, path: &str) -> EngineResult<Ack> {
        let snapshot = persistence::load_latest(std::path::Path::new(path))?;
        let mut documents = HashMap::new();
        let mut embeddings = HashMap::new();
        for (idx, id) in snapshot.embeddings.id_map.iter().enumerate() {
            let start = idx * snapshot.embeddings.dimension;
            let vector = snapshot.embeddings.data[start..start + snapshot.embeddings.dimension].to_vec();
            embeddings.insert(id.clone(), vector);
        }
        // The document payload itself (title/summary/content/extra) is not
        // part of the persisted snapshot — only derived indexes and
        // attributes are. Hydration after a load returns attributes from
        // `metadata` and an empty text body; a host wanting full documents
        // back keeps its own durable document store per §1.
        for id in snapshot.embeddings.id_map.iter() {
            if let Some(attrs) = snapshot.metadata.get(id) {
                let mut doc = Document::new(id.clone(), "");
                doc.attributes = attrs.clone();
                documents.insert(id.clone(), doc);
            }
        }

        let mut state = self.state.write().expect("state lock poisoned");
        state.generation = snapshot.manifest.generation;
        state.hnsw = HnswIndex::from_snapshot(snapshot.hnsw);
        state.lsh = snapshot.lsh;
        state.bm25 = snapshot.bm25;
        state.pq = snapshot.pq;
        state.metadata = snapshot.metadata;
        state.documents = documents;
        state.embeddings = embeddings;
        state.mutations_since_build = 0;
        state.status = GenerationStatus::Ready;
        let generation = state.generation;
        drop(state);

        self.cache.lock().expect("cache lock poisoned").invalidate_all();
        Ok(Ack { success: true, generation })
    }

    pub fn health(&self) -> HealthSnapshot {
        let state = self.state.read().expect("state lock poisoned");
        HealthSnapshot {
            generation: state.generation,
            corpus_size: state.corpus_size(),
            tombstones: state.hnsw.tombstone_count(),
            pq_trained: state.pq.is_trained(),
            cache_size: self.cache.lock().expect("cache lock poisoned").len(),
            last_build_ms: state.last_build_ms,
        }
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

impl EngineState {
    fn pq_sample_target(&self, config: &EngineConfig) -> usize {
        config.pq.num_centroids * PQ_TRAIN_SAMPLE_PER_CENTROID
    }
}

/// Score a single candidate against the query, or `None` if it's filtered
/// out or its embedding has gone missing (deleted concurrently with an
/// in-flight search). Free function so both the sequential and `rayon`
/// fan-out paths in `search()` share one implementation.
fn score_candidate(
    doc_id: &str,
    state: &EngineState,
    filter_bag: &FilterBag,
    query_vector: &[f32],
    query_tokens: &[String],
    query_token_set: &HashSet<String>,
    fusion: &FusionConfig,
) -> Option<SearchHit> {
    if !state.metadata.matches(doc_id, filter_bag) {
        return None;
    }
    let vector = state.embeddings.get(doc_id)?;
    let cos = 1.0 - crate::hnsw::distance::cosine_distance(query_vector, vector);
    let bm25 = state.bm25.score(query_tokens, doc_id);
    let jac = state.lsh.jaccard(query_token_set, doc_id);
    // §8's `combined_score >= 0` invariant holds for any fusion weighting
    // with non-negative weights only if every component is non-negative;
    // cosine similarity alone ranges over [-1, 1], so it's floored here
    // before fusion. `cosine_component` still reports the true, unclamped
    // similarity.
    let score = fusion.cosine_weight * cos.max(0.0) + fusion.bm25_weight * bm25 + fusion.jaccard_weight * jac;
    Some(SearchHit {
        doc_id: doc_id.to_string(),
        score,
        cosine_component: cos,
        bm25_component: bm25,
        jaccard_component: jac,
    })
}

fn hydrate(hits: Vec<SearchHit>, state: &RwLock<EngineState>) -> Vec<SearchResult> {
    let state = state.read().expect("state lock poisoned");
    hits.into_iter()
        .map(|hit| SearchResult {
            metadata: state.metadata.get(&hit.doc_id).cloned().unwrap_or_default(),
            doc_id: hit.doc_id,
            combined_score: hit.score,
            cos: hit.cosine_component,
            bm25: hit.bm25_component,
            jac: hit.jaccard_component,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::HashingEmbedder;
    use crate::events::test_support::RecordingEventSink;

    fn test_engine(dim: usize) -> Engine {
        let mut config = EngineConfig::default();
        config.embedding_dim = dim;
        config.pq.num_subquantizers = 2;
        config.pq.num_centroids = 4;
        config.cache_max_size = 16;
        Engine::new(config, Arc::new(HashingEmbedder::new(dim))).unwrap()
    }

    fn doc(id: &str, text: &str) -> Document {
        Document::new(id, text)
    }

    #[test]
    fn search_before_any_build_is_index_not_ready() {
        let engine = test_engine(32);
        let cancel = CancellationToken::new();
        let result = engine.search("python", 3, None, None, &cancel, None);
        assert!(matches!(result, Err(EngineError::IndexNotReady)));
    }

    #[test]
    fn python_aws_query_ranks_matching_document_first() {
        let engine = test_engine(32);
        let docs = vec![
            doc("d1", "python developer with aws experience"),
            doc("d2", "java backend engineer kubernetes"),
            doc("d3", "senior python data scientist"),
        ];
        let report = engine.build_indexes(docs).unwrap();
        assert_eq!(report.documents_processed, 3);

        let cancel = CancellationToken::new();
        let results = engine.search("python aws", 3, None, None, &cancel, None).unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].doc_id, "d1");
    }

    #[test]
    fn num_results_zero_is_a_validation_error() {
        let engine = test_engine(32);
        engine.build_indexes(vec![doc("d1", "python developer")]).unwrap();
        let cancel = CancellationToken::new();
        let result = engine.search("python", 0, None, None, &cancel, None);
        assert!(matches!(result, Err(EngineError::Validation(_))));
    }

    #[test]
    fn empty_query_is_a_validation_error() {
        let engine = test_engine(32);
        engine.build_indexes(vec![doc("d1", "python developer")]).unwrap();
        let cancel = CancellationToken::new();
        let result = engine.search("   ", 3, None, None, &cancel, None);
        assert!(matches!(result, Err(EngineError::Validation(_))));
    }

    #[test]
    fn add_then_delete_removes_the_document_from_search() {
        let engine = test_engine(32);
        engine
            .build_indexes(vec![
                doc("d1", "python developer with aws experience"),
                doc("d3", "senior python data scientist"),
            ])
            .unwrap();
        engine.add_document(doc("d4", "aws devops engineer")).unwrap();

        let cancel = CancellationToken::new();
        let results = engine.search("aws", 5, None, None, &cancel, None).unwrap();
        assert!(results.iter().any(|r| r.doc_id == "d4"));

        engine.delete_document("d4").unwrap();
        let results = engine.search("aws", 5, None, None, &cancel, None).unwrap();
        assert!(results.iter().all(|r| r.doc_id != "d4"));
    }

    #[test]
    fn filter_excludes_documents_missing_required_skill() {
        let engine = test_engine(32);
        let mut with_skill = doc("d2", "java backend engineer kubernetes");
        with_skill.attributes.insert(
            "required_skills".to_string(),
            AttributeValue::StringSet(vec!["kubernetes".to_string()]),
        );
        engine
            .build_indexes(vec![
                doc("d1", "python developer with aws experience"),
                with_skill,
                doc("d3", "senior python data scientist"),
            ])
            .unwrap();

        let filter = serde_json::json!({"required_skills": ["kubernetes"]});
        let cancel = CancellationToken::new();
        let results = engine.search("python aws", 3, Some(&filter), None, &cancel, None).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].doc_id, "d2");
    }

    #[test]
    fn cached_search_is_served_without_touching_the_index_twice() {
        let engine = test_engine(32);
        engine.build_indexes(vec![doc("d1", "python developer")]).unwrap();
        let cancel = CancellationToken::new();
        let first = engine.search("python", 1, None, None, &cancel, None).unwrap();
        let second = engine.search("python", 1, None, None, &cancel, None).unwrap();
        assert_eq!(first.len(), second.len());
        assert_eq!(engine.metrics().counters["search_cache_hits_total"], 1);
    }

    #[test]
    fn snapshot_then_load_reproduces_top_k_ordering() {
        let dir = std::env::temp_dir().join(format!("rank-hybrid-engine-test-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);

        let engine = test_engine(32);
        let docs: Vec<Document> = (0..50).map(|i| doc(&format!("d{i}"), &format!("document number {i} about python and aws"))).collect();
        engine.build_indexes(docs).unwrap();
        engine.snapshot(dir.to_str().unwrap()).unwrap();

        let cancel = CancellationToken::new();
        let before = engine.search("python aws", 5, None, None, &cancel, None).unwrap();

        let fresh = test_engine(32);
        fresh.load(dir.to_str().unwrap()).unwrap();
        let after = fresh.search("python aws", 5, None, None, &cancel, None).unwrap();

        let before_ids: Vec<&str> = before.iter().map(|r| r.doc_id.as_str()).collect();
        let after_ids: Vec<&str> = after.iter().map(|r| r.doc_id.as_str()).collect();
        assert_eq!(before_ids, after_ids);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn build_emits_started_and_finished_events_in_order() {
        let config = {
            let mut c = EngineConfig::default();
            c.embedding_dim = 32;
            c.pq.num_subquantizers = 2;
            c.pq.num_centroids = 4;
            c
        };
        let sink = Arc::new(RecordingEventSink::new());
        let engine = Engine::with_event_sink(config.clone(), Arc::new(HashingEmbedder::new(32)), sink.clone()).unwrap();
        engine.build_indexes(vec![doc("d1", "python developer"), doc("d2", "java engineer")]).unwrap();

        let events = sink.events();
        assert!(matches!(events[0], EngineEvent::BuildStarted { requested: 2 }));
        assert!(matches!(events.last().unwrap(), EngineEvent::BuildFinished { processed: 2, failures: 0, .. }));
    }

    #[test]
    fn drift_triggered_rebuild_emits_an_event() {
        let mut config = EngineConfig::default();
        config.embedding_dim = 32;
        config.pq.num_subquantizers = 2;
        config.pq.num_centroids = 4;
        config.drift.drift_absolute = 1;
        config.drift.drift_fraction = 1.0;
        let sink = Arc::new(RecordingEventSink::new());
        let engine = Engine::with_event_sink(config, Arc::new(HashingEmbedder::new(32)), sink.clone()).unwrap();
        engine.build_indexes(vec![doc("d1", "python developer"), doc("d2", "java engineer")]).unwrap();
        engine.add_document(doc("d3", "aws devops")).unwrap();

        assert!(sink.events().iter().any(|e| matches!(e, EngineEvent::RebuildTriggered { .. })));
    }

    #[test]
    fn large_candidate_sets_take_the_parallel_scoring_path_and_agree_with_sequential() {
        let mut config = EngineConfig::default();
        config.embedding_dim = 32;
        config.pq.num_subquantizers = 2;
        config.pq.num_centroids = 4;
        config.cache_max_size = 4;
        config.parallel_scoring_threshold = 10;
        let engine = Engine::new(config, Arc::new(HashingEmbedder::new(32))).unwrap();

        let docs: Vec<Document> =
            (0..50).map(|i| doc(&format!("d{i}"), &format!("document number {i} about python and aws"))).collect();
        engine.build_indexes(docs).unwrap();

        let cancel = CancellationToken::new();
        let parallel = engine.search("python aws", 5, None, None, &cancel, None).unwrap();

        let mut sequential_config = engine.config.clone();
        sequential_config.parallel_scoring_threshold = usize::MAX;
        let sequential_engine = Engine::new(sequential_config, Arc::new(HashingEmbedder::new(32))).unwrap();
        let docs: Vec<Document> =
            (0..50).map(|i| doc(&format!("d{i}"), &format!("document number {i} about python and aws"))).collect();
        sequential_engine.build_indexes(docs).unwrap();
        let sequential = sequential_engine.search("python aws", 5, None, None, &cancel, None).unwrap();

        let parallel_ids: Vec<&str> = parallel.iter().map(|r| r.doc_id.as_str()).collect();
        let sequential_ids: Vec<&str> = sequential.iter().map(|r| r.doc_id.as_str()).collect();
        assert_eq!(parallel_ids, sequential_ids);
    }
}
