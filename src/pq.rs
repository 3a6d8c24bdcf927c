//! Product quantization: compress embeddings into short byte codes and score
//! them against a query via precomputed per-subspace distance tables.
//!
//! Subspace split, per-subspace k-means codebook, and nearest-codeword
//! encoding follow the classical IVF-PQ construction. Codebook training uses
//! a seeded RNG instead of `rand::thread_rng()` so builds stay reproducible,
//! and distance is squared L2 in each subspace rather than cosine, since a
//! subvector isn't unit-norm even when the full embedding is.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

const KMEANS_ITERATIONS: usize = 25;
const KMEANS_CONVERGENCE_EPS: f32 = 1e-6;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductQuantizer {
    dimension: usize,
    num_subquantizers: usize,
    subvector_dim: usize,
    num_centroids: usize,
    /// `[subquantizer][centroid][subvector_dim]`; empty until `train` succeeds.
    codebooks: Vec<Vec<Vec<f32>>>,
    trained: bool,
}

impl ProductQuantizer {
    pub fn new(dimension: usize, num_subquantizers: usize, num_centroids: usize) -> Result<Self, EngineError> {
        if num_subquantizers == 0 || dimension % num_subquantizers != 0 {
            return Err(EngineError::validation(format!(
                "pq num_subquantizers ({num_subquantizers}) must evenly divide dimension ({dimension})"
            )));
        }
        if num_centroids == 0 || num_centroids > 256 {
            return Err(EngineError::validation("pq num_centroids must be in 1..=256"));
        }
        Ok(ProductQuantizer {
            dimension,
            num_subquantizers,
            subvector_dim: dimension / num_subquantizers,
            num_centroids,
            codebooks: Vec::new(),
            trained: false,
        })
    }

    pub fn is_trained(&self) -> bool {
        self.trained
    }

    /// Train one k-means codebook per subspace. `samples` are flattened,
    /// `dimension`-wide rows; each subquantizer's centroids are seeded from
    /// `seed ^ subquantizer_index` so training is reproducible across builds
    /// without every subspace converging to the same initialization.
    pub fn train(&mut self, samples: &[Vec<f32>], seed: u64) -> Result<(), EngineError> {
        if samples.is_empty() {
            return Err(EngineError::validation("pq training requires at least one sample vector"));
        }
        for sample in samples {
            if sample.len() != self.dimension {
                return Err(EngineError::validation(format!(
                    "pq training sample has dimension {}, expected {}",
                    sample.len(),
                    self.dimension
                )));
            }
        }
        let effective_k = self.num_centroids.min(samples.len());
        let mut codebooks = Vec::with_capacity(self.num_subquantizers);
        for sq in 0..self.num_subquantizers {
            let start = sq * self.subvector_dim;
            let end = start + self.subvector_dim;
            let subvectors: Vec<&[f32]> = samples.iter().map(|v| &v[start..end]).collect();
            let mut rng = ChaCha8Rng::seed_from_u64(seed ^ (sq as u64).wrapping_mul(0x9E3779B97F4A7C15));
            codebooks.push(train_subspace(&subvectors, effective_k, self.subvector_dim, &mut rng));
        }
        self.codebooks = codebooks;
        self.trained = true;
        Ok(())
    }

    /// Nearest-centroid index per subspace. Requires `is_trained`.
    pub fn encode(&self, vector: &[f32]) -> Result<Vec<u8>, EngineError> {
        if !self.trained {
            return Err(EngineError::internal(0, "pq.encode called before training"));
        }
        if vector.len() != self.dimension {
            return Err(EngineError::validation(format!(
                "embedding dimension mismatch: expected {}, got {}",
                self.dimension,
                vector.len()
            )));
        }
        let mut codes = Vec::with_capacity(self.num_subquantizers);
        for sq in 0..self.num_subquantizers {
            let start = sq * self.subvector_dim;
            let sub = &vector[start..start + self.subvector_dim];
            codes.push(nearest_centroid(sub, &self.codebooks[sq]) as u8);
        }
        Ok(codes)
    }

    /// Asymmetric distance: precompute a `num_centroids`-entry squared-L2
    /// table per subspace against the (unquantized) query, then sum the
    /// table entries the code selects. Always non-negative.
    pub fn decode_distance(&self, query: &[f32], code: &[u8]) -> Result<f32, EngineError> {
        if !self.trained {
            return Err(EngineError::internal(0, "pq.decode_distance called before training"));
        }
        if query.len() != self.dimension || code.len() != self.num_subquantizers {
            return Err(EngineError::validation("pq query/code shape mismatch"));
        }
        let mut total = 0.0f32;
        for sq in 0..self.num_subquantizers {
            let start = sq * self.subvector_dim;
            let sub_query = &query[start..start + self.subvector_dim];
            let table = distance_table(sub_query, &self.codebooks[sq]);
            total += table[code[sq] as usize];
        }
        Ok(total.max(0.0))
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn distance_table(query: &[f32], centroids: &[Vec<f32>]) -> Vec<f32> {
    centroids.iter().map(|c| squared_l2(query, c)).collect()
}

fn nearest_centroid(vector: &[f32], centroids: &[Vec<f32>]) -> usize {
    let mut best = 0;
    let mut best_dist = f32::INFINITY;
    for (idx, centroid) in centroids.iter().enumerate() {
        let d = squared_l2(vector, centroid);
        if d < best_dist {
            best_dist = d;
            best = idx;
        }
    }
    best
}

/// k-means++ init followed by bounded Lloyd iteration over `&[f32]`
/// subvector slices, with a seeded RNG so training is reproducible.
fn train_subspace(subvectors: &[&[f32]], k: usize, dim: usize, rng: &mut ChaCha8Rng) -> Vec<Vec<f32>> {
    let n = subvectors.len();
    let mut centroids: Vec<Vec<f32>> = Vec::with_capacity(k);
    centroids.push(subvectors[rng.gen_range(0..n)].to_vec());
    while centroids.len() < k {
        let mut distances = Vec::with_capacity(n);
        let mut total = 0.0f64;
        for v in subvectors {
            let min_dist = centroids.iter().map(|c| squared_l2(v, c)).fold(f32::INFINITY, f32::min);
            distances.push(min_dist);
            total += min_dist as f64;
        }
        if total <= 0.0 {
            // Every remaining point coincides with a chosen centroid; pad with
            // duplicates rather than looping forever.
            centroids.push(subvectors[rng.gen_range(0..n)].to_vec());
            continue;
        }
        let threshold = rng.gen::<f64>() * total;
        let mut cumulative = 0.0f64;
        let mut chosen = n - 1;
        for (idx, &d) in distances.iter().enumerate() {
            cumulative += d as f64;
            if cumulative >= threshold {
                chosen = idx;
                break;
            }
        }
        centroids.push(subvectors[chosen].to_vec());
    }

    for _ in 0..KMEANS_ITERATIONS {
        let mut sums = vec![vec![0.0f32; dim]; k];
        let mut counts = vec![0usize; k];
        for v in subvectors {
            let cluster = nearest_centroid(v, &centroids);
            counts[cluster] += 1;
            for (s, &x) in sums[cluster].iter_mut().zip(v.iter()) {
                *s += x;
            }
        }
        let mut max_shift = 0.0f32;
        for cluster in 0..k {
            if counts[cluster] == 0 {
                continue;
            }
            let mean: Vec<f32> = sums[cluster].iter().map(|&s| s / counts[cluster] as f32).collect();
            max_shift = max_shift.max(squared_l2(&mean, &centroids[cluster]));
            centroids[cluster] = mean;
        }
        if max_shift < KMEANS_CONVERGENCE_EPS {
            break;
        }
    }
    centroids
}
