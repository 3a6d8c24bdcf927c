//! HNSW graph storage: per-layer neighbor lists over a growable,
//! structure-of-arrays vector store, plus the tombstone bitset that lets
//! deleted nodes stay connective without appearing in search results.

use std::collections::HashMap;

use smallvec::SmallVec;

/// A single graph layer: sparse neighbor lists keyed by internal node id.
/// Only nodes assigned to this layer (by [`super::construction::sample_level`])
/// have an entry; everyone else is simply absent from the map.
///
/// Deliberately not `Serialize`/`Deserialize` — persistence goes through
/// [`super::HnswSnapshot`], a plain-data mirror built for that purpose.
#[derive(Debug, Default)]
pub(crate) struct Layer {
    neighbors: HashMap<u32, SmallVec<[u32; 16]>>,
}

impl Layer {
    pub(crate) fn new() -> Self {
        Layer { neighbors: HashMap::new() }
    }

    pub(crate) fn neighbors(&self, id: u32) -> &[u32] {
        self.neighbors.get(&id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub(crate) fn contains(&self, id: u32) -> bool {
        self.neighbors.contains_key(&id)
    }

    pub(crate) fn set_neighbors(&mut self, id: u32, list: SmallVec<[u32; 16]>) {
        self.neighbors.insert(id, list);
    }

    pub(crate) fn ensure_present(&mut self, id: u32) {
        self.neighbors.entry(id).or_default();
    }
}

/// Structure-of-arrays vector storage shared by search and construction.
/// Rows are appended and never removed — a tombstoned row's vector stays
/// in place so the layer it belongs to remains walkable.
#[derive(Debug, Default)]
pub(crate) struct VectorRows {
    pub(crate) data: Vec<f32>,
    pub(crate) dimension: usize,
}

impl VectorRows {
    pub(crate) fn new(dimension: usize) -> Self {
        VectorRows { data: Vec::new(), dimension }
    }

    pub(crate) fn push(&mut self, vector: &[f32]) -> u32 {
        let id = (self.data.len() / self.dimension) as u32;
        self.data.extend_from_slice(vector);
        id
    }
}
