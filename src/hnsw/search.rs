//! Bounded best-first search over a single HNSW layer.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use super::distance::cosine_distance;
use super::graph::Layer;
use crate::cancellation::CancellationToken;
use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub id: u32,
    pub distance: f32,
}

impl Eq for Candidate {}

// Reversed ordering so a `BinaryHeap<Candidate>` behaves as a min-heap on
// distance, with doc-id ascending as the tie-break.
impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .distance
            .partial_cmp(&self.distance)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// SoA vector storage accessor shared by search and construction.
pub struct VectorStore<'a> {
    pub vectors: &'a [f32],
    pub dimension: usize,
}

impl<'a> VectorStore<'a> {
    pub fn get(&self, id: u32) -> &'a [f32] {
        let start = id as usize * self.dimension;
        &self.vectors[start..start + self.dimension]
    }
}

/// Greedy descent through a single layer starting from `entry_points`,
/// returning up to `ef` nearest candidates by cosine distance (tombstoned
/// nodes are still traversable for connectivity but are filtered by the
/// caller before results are returned to a query).
///
/// Polls `cancel` between candidate expansions — the natural boundary for a
/// best-first graph walk — and returns `Cancelled` promptly instead of after
/// the whole layer has been explored.
pub fn greedy_search_layer(
    layer: &Layer,
    store: &VectorStore,
    query: &[f32],
    entry_points: &[u32],
    ef: usize,
    cancel: &CancellationToken,
) -> Result<Vec<Candidate>, EngineError> {
    let mut visited: HashSet<u32> = HashSet::new();
    let mut candidates: BinaryHeap<Candidate> = BinaryHeap::new();
    let mut results: BinaryHeap<FarthestFirst> = BinaryHeap::new();

    for &ep in entry_points {
        if visited.insert(ep) {
            let d = cosine_distance(query, store.get(ep));
            candidates.push(Candidate { id: ep, distance: d });
            results.push(FarthestFirst(Candidate { id: ep, distance: d }));
        }
    }

    let mut steps = 0u32;
    while let Some(current) = candidates.pop() {
        steps += 1;
        if steps % 8 == 0 && cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        let worst_known = results.peek().map(|c| c.0.distance).unwrap_or(f32::INFINITY);
        if current.distance > worst_known && results.len() >= ef {
            break;
        }
        for &neighbor in layer.neighbors(current.id) {
            if visited.insert(neighbor) {
                let d = cosine_distance(query, store.get(neighbor));
                if results.len() < ef || d < worst_known {
                    candidates.push(Candidate { id: neighbor, distance: d });
                    results.push(FarthestFirst(Candidate { id: neighbor, distance: d }));
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }
    }

    let mut out: Vec<Candidate> = results.into_iter().map(|c| c.0).collect();
    out.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    Ok(out)
}

/// Max-heap ordering (opposite of `Candidate`'s `Ord`) used to keep the
/// worst-of-the-best-so-far at the top of the results heap for eviction.
struct FarthestFirst(Candidate);

impl PartialEq for FarthestFirst {
    fn eq(&self, other: &Self) -> bool {
        self.0.distance == other.0.distance && self.0.id == other.0.id
    }
}
impl Eq for FarthestFirst {}
impl Ord for FarthestFirst {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .distance
            .partial_cmp(&other.0.distance)
            .unwrap_or(Ordering::Equal)
            .then_with(|| self.0.id.cmp(&other.0.id))
    }
}
impl PartialOrd for FarthestFirst {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
