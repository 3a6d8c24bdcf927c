//! Hierarchical Navigable Small World graph over document embeddings.
//!
//! Structure-of-arrays vector storage plus per-layer sparse neighbor lists
//! (see [`graph`]), the bounded best-first layer search (see [`search`]), and
//! insertion/neighbor-selection (see [`construction`]) are kept as separate
//! modules so each stays readable on its own; this file is the public,
//! doc-id-facing API the rest of the engine calls.

mod construction;
pub(crate) mod distance;
mod graph;
mod search;

use std::collections::{HashMap, HashSet};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use self::construction::{connect_and_prune, descend_to_level, sample_level, select_neighbors_heuristic};
use self::graph::{Layer, VectorRows};
use self::search::{greedy_search_layer, VectorStore};
use crate::cancellation::CancellationToken;
use crate::error::EngineError;

/// A single HNSW search hit: the document id and its cosine distance to the
/// query, distance ascending.
#[derive(Debug, Clone, PartialEq)]
pub struct HnswHit {
    pub doc_id: String,
    pub distance: f32,
}

/// The incremental HNSW index. Insert order does not need to match build
/// order for correctness, but the engine's build pipeline inserts in
/// deterministic doc-id order to keep snapshots byte-stable across rebuilds.
pub struct HnswIndex {
    dimension: usize,
    m: usize,
    m_max0: usize,
    ef_construction: usize,
    rows: VectorRows,
    layers: Vec<Layer>,
    levels: Vec<u8>,
    id_map: Vec<String>,
    id_lookup: HashMap<String, u32>,
    tombstones: HashSet<u32>,
    entry_point: Option<u32>,
    entry_level: usize,
    rng: ChaCha8Rng,
}

impl HnswIndex {
    pub fn new(dimension: usize, m: usize, ef_construction: usize, seed: u64) -> Self {
        HnswIndex {
            dimension,
            m,
            m_max0: m * 2,
            ef_construction,
            rows: VectorRows::new(dimension),
            layers: vec![Layer::new()],
            levels: Vec::new(),
            id_map: Vec::new(),
            id_lookup: HashMap::new(),
            tombstones: HashSet::new(),
            entry_point: None,
            entry_level: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn len(&self) -> usize {
        self.id_lookup.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_lookup.is_empty()
    }

    pub fn tombstone_count(&self) -> usize {
        self.tombstones.len()
    }

    fn store(&self) -> VectorStore<'_> {
        VectorStore { vectors: &self.rows.data, dimension: self.dimension }
    }

    /// Insert (or replace) a document's vector. Safe to call on an empty
    /// graph — the first insertion simply becomes the entry point.
    pub fn add(&mut self, doc_id: &str, vector: &[f32]) -> Result<(), EngineError> {
        if vector.len() != self.dimension {
            return Err(EngineError::validation(format!(
                "embedding dimension mismatch: expected {}, got {}",
                self.dimension,
                vector.len()
            )));
        }
        // `add` doubles as "replace": re-adding a known doc-id tombstones the
        // old entry and inserts a fresh node rather than updating in place,
        // consistent with the engine's update = remove + add law.
        self.remove(doc_id);

        let internal_id = self.rows.push(vector);
        self.id_map.push(doc_id.to_string());
        self.id_lookup.insert(doc_id.to_string(), internal_id);

        let level = sample_level(&mut self.rng, self.m);
        while self.levels.len() <= internal_id as usize {
            self.levels.push(0);
        }
        self.levels[internal_id as usize] = level as u8;
        while self.layers.len() <= level {
            self.layers.push(Layer::new());
        }
        self.layers[0].ensure_present(internal_id);
        for layer in self.layers.iter_mut().take(level + 1).skip(1) {
            layer.ensure_present(internal_id);
        }

        let Some(entry_point) = self.entry_point else {
            self.entry_point = Some(internal_id);
            self.entry_level = level;
            return Ok(());
        };

        let store = self.store();
        let cancel = CancellationToken::new();
        let mut entry_points = descend_to_level(
            &self.layers,
            &store,
            vector,
            vec![entry_point],
            self.entry_level,
            level,
            &cancel,
        )?;

        for layer_idx in (0..=level.min(self.entry_level)).rev() {
            let candidates =
                greedy_search_layer(&self.layers[layer_idx], &store, vector, &entry_points, self.ef_construction, &cancel)?;
            let m_max = if layer_idx == 0 { self.m_max0 } else { self.m };
            let selected = select_neighbors_heuristic(&candidates, self.m, &store);

            let mut forward: smallvec::SmallVec<[u32; 16]> = smallvec::SmallVec::new();
            forward.extend(selected.iter().copied());
            self.layers[layer_idx].set_neighbors(internal_id, forward);

            for &neighbor in &selected {
                connect_and_prune(&mut self.layers[layer_idx], neighbor, internal_id, m_max, &store);
            }

            entry_points = candidates.into_iter().map(|c| c.id).collect();
            if entry_points.is_empty() {
                entry_points = vec![internal_id];
            }
        }

        if level > self.entry_level {
            self.entry_point = Some(internal_id);
            self.entry_level = level;
        }
        Ok(())
    }

    /// Tombstone a node: connectivity is preserved for other nodes'
    /// traversal, but it is excluded from every subsequent search result.
    /// A no-op for an unknown doc-id.
    pub fn remove(&mut self, doc_id: &str) {
        if let Some(&internal_id) = self.id_lookup.get(doc_id) {
            self.tombstones.insert(internal_id);
            self.id_lookup.remove(doc_id);
        }
    }

    /// Approximate `k`-nearest documents by cosine distance. Returns fewer
    /// than `k` if the live graph doesn't have enough reachable candidates
    /// within the `ef_search` window.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        ef_search: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<HnswHit>, EngineError> {
        if query.len() != self.dimension {
            return Err(EngineError::validation(format!(
                "query dimension mismatch: expected {}, got {}",
                self.dimension,
                query.len()
            )));
        }
        let Some(entry_point) = self.entry_point else {
            return Ok(Vec::new());
        };
        let store = self.store();
        let entry_points = descend_to_level(
            &self.layers,
            &store,
            query,
            vec![entry_point],
            self.entry_level,
            0,
            cancel,
        )?;
        let ef = ef_search.max(k);
        let results = greedy_search_layer(&self.layers[0], &store, query, &entry_points, ef, cancel)?;
        Ok(results
            .into_iter()
            .filter(|c| !self.tombstones.contains(&c.id))
            .take(k)
            .map(|c| HnswHit { doc_id: self.id_map[c.id as usize].clone(), distance: c.distance })
            .collect())
    }

    pub fn snapshot(&self) -> HnswSnapshot {
        HnswSnapshot {
            dimension: self.dimension,
            m: self.m,
            m_max0: self.m_max0,
            ef_construction: self.ef_construction,
            vectors: self.rows.data.clone(),
            layers: self
                .layers
                .iter()
                .map(|l| {
                    let mut entries: Vec<(u32, Vec<u32>)> = Vec::new();
                    for id in 0..self.id_map.len() as u32 {
                        if l.contains(id) {
                            entries.push((id, l.neighbors(id).to_vec()));
                        }
                    }
                    entries
                })
                .collect(),
            levels: self.levels.clone(),
            id_map: self.id_map.clone(),
            tombstones: self.tombstones.iter().copied().collect(),
            entry_point: self.entry_point,
            entry_level: self.entry_level,
            seed: 0,
        }
    }

    pub fn from_snapshot(snapshot: HnswSnapshot) -> Self {
        let mut id_lookup = HashMap::new();
        for (idx, id) in snapshot.id_map.iter().enumerate() {
            id_lookup.insert(id.clone(), idx as u32);
        }
        let tombstones: HashSet<u32> = snapshot.tombstones.into_iter().collect();
        for tombstoned in &tombstones {
            if let Some(doc_id) = snapshot.id_map.get(*tombstoned as usize) {
                id_lookup.remove(doc_id);
            }
        }
        let mut layers = Vec::with_capacity(snapshot.layers.len());
        for entries in snapshot.layers {
            let mut layer = Layer::new();
            for (id, neighbors) in entries {
                layer.set_neighbors(id, neighbors.into_iter().collect());
            }
            layers.push(layer);
        }
        HnswIndex {
            dimension: snapshot.dimension,
            m: snapshot.m,
            m_max0: snapshot.m_max0,
            ef_construction: snapshot.ef_construction,
            rows: VectorRows { data: snapshot.vectors, dimension: snapshot.dimension },
            layers,
            levels: snapshot.levels,
            id_map: snapshot.id_map,
            id_lookup,
            tombstones,
            entry_point: snapshot.entry_point,
            entry_level: snapshot.entry_level,
            rng: ChaCha8Rng::seed_from_u64(snapshot.seed),
        }
    }
}

/// Plain-data mirror of [`HnswIndex`] used for persistence. Separated from
/// the live index so the RNG (not meaningfully restorable mid-sequence) and
/// the `HashMap`-backed layer storage don't have to round-trip through serde
/// directly.
#[derive(Debug, Serialize, Deserialize)]
pub struct HnswSnapshot {
    pub dimension: usize,
    pub m: usize,
    pub m_max0: usize,
    pub ef_construction: usize,
    pub vectors: Vec<f32>,
    pub layers: Vec<Vec<(u32, Vec<u32>)>>,
    pub levels: Vec<u8>,
    pub id_map: Vec<String>,
    pub tombstones: Vec<u32>,
    pub entry_point: Option<u32>,
    pub entry_level: usize,
    pub seed: u64,
}
