//! Insertion: level sampling, layer descent, and the relative-neighborhood
//! diversification heuristic used to keep neighbor lists useful instead of
//! just "nearest so far".

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use smallvec::SmallVec;

use super::distance::cosine_distance;
use super::graph::Layer;
use super::search::{greedy_search_layer, Candidate, VectorStore};
use crate::cancellation::CancellationToken;
use crate::error::EngineError;

/// Sample an insertion level from the geometric distribution HNSW uses,
/// `floor(-ln(U) * m_l)` with `m_l = 1 / ln(m)`, so higher layers are
/// exponentially rarer as `m` grows.
pub(crate) fn sample_level(rng: &mut ChaCha8Rng, m: usize) -> usize {
    let m_l = 1.0 / (m.max(2) as f64).ln();
    let u: f64 = rng.gen_range(f64::MIN_POSITIVE..1.0);
    (-u.ln() * m_l).floor() as usize
}

/// Keep a candidate only if it is closer to the new node than to any
/// already-chosen neighbor — the "relative neighborhood" rule from §4.2.
/// `candidates` must already be sorted by ascending distance to the new node.
pub(crate) fn select_neighbors_heuristic(
    candidates: &[Candidate],
    m: usize,
    store: &VectorStore,
) -> Vec<u32> {
    let mut selected: Vec<Candidate> = Vec::with_capacity(m);
    for &candidate in candidates {
        if selected.len() >= m {
            break;
        }
        let candidate_vec = store.get(candidate.id);
        let redundant = selected.iter().any(|s| {
            cosine_distance(candidate_vec, store.get(s.id)) < candidate.distance
        });
        if !redundant {
            selected.push(candidate);
        }
    }
    selected.into_iter().map(|c| c.id).collect()
}

/// Add `new_id` to `existing_id`'s neighbor list in `layer`, pruning back
/// down to `m_max` entries by the same heuristic if the list overflows.
pub(crate) fn connect_and_prune(
    layer: &mut Layer,
    existing_id: u32,
    new_id: u32,
    m_max: usize,
    store: &VectorStore,
) {
    let mut neighbors: SmallVec<[u32; 16]> = layer.neighbors(existing_id).into();
    if neighbors.contains(&new_id) {
        return;
    }
    neighbors.push(new_id);
    if neighbors.len() > m_max {
        let anchor = store.get(existing_id);
        let mut candidates: Vec<Candidate> = neighbors
            .iter()
            .map(|&id| Candidate { id, distance: cosine_distance(anchor, store.get(id)) })
            .collect();
        candidates.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        let pruned = select_neighbors_heuristic(&candidates, m_max, store);
        neighbors = pruned.into_iter().collect();
    }
    layer.set_neighbors(existing_id, neighbors);
}

/// Descend greedily from `from_level` down to `to_level + 1` with `ef = 1`,
/// returning a single-element entry point list for the next phase.
pub(crate) fn descend_to_level(
    layers: &[Layer],
    store: &VectorStore,
    query: &[f32],
    mut entry_points: Vec<u32>,
    from_level: usize,
    to_level: usize,
    cancel: &CancellationToken,
) -> Result<Vec<u32>, EngineError> {
    for layer_idx in (to_level + 1..=from_level).rev() {
        let results =
            greedy_search_layer(&layers[layer_idx], store, query, &entry_points, 1, cancel)?;
        if let Some(best) = results.first() {
            entry_points = vec![best.id];
        }
    }
    Ok(entry_points)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_level_is_deterministic_for_a_fixed_seed() {
        let mut a = ChaCha8Rng::seed_from_u64(7);
        let mut b = ChaCha8Rng::seed_from_u64(7);
        let levels_a: Vec<usize> = (0..20).map(|_| sample_level(&mut a, 16)).collect();
        let levels_b: Vec<usize> = (0..20).map(|_| sample_level(&mut b, 16)).collect();
        assert_eq!(levels_a, levels_b);
    }

    #[test]
    fn sample_level_is_mostly_zero_for_realistic_m() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let zeros = (0..1000).filter(|_| sample_level(&mut rng, 16) == 0).count();
        assert!(zeros > 700, "expected most insertions to land on layer 0, got {zeros}/1000");
    }
}
