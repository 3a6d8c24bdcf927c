//! Engine configuration. Parsing from files or environment is a host
//! concern; this module only validates an already-materialized struct.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HnswConfig {
    pub m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
}

impl Default for HnswConfig {
    fn default() -> Self {
        HnswConfig { m: 16, ef_construction: 200, ef_search: 200 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PqConfig {
    pub num_subquantizers: usize,
    pub num_centroids: usize,
}

impl Default for PqConfig {
    fn default() -> Self {
        PqConfig { num_subquantizers: 8, num_centroids: 256 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LshConfig {
    pub num_bands: usize,
    pub rows_per_band: usize,
    /// Fixed seed for MinHash hash-function generation; builds and
    /// snapshot/load round trips must be reproducible.
    pub seed: u64,
}

impl Default for LshConfig {
    fn default() -> Self {
        LshConfig { num_bands: 20, rows_per_band: 5, seed: 0x5EED_CAFE_D00D_u64 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bm25Config {
    pub k1: f32,
    pub b: f32,
}

impl Default for Bm25Config {
    fn default() -> Self {
        Bm25Config { k1: 1.5, b: 0.75 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionConfig {
    pub cosine_weight: f32,
    pub bm25_weight: f32,
    pub jaccard_weight: f32,
}

impl Default for FusionConfig {
    fn default() -> Self {
        FusionConfig { cosine_weight: 0.6, bm25_weight: 0.3, jaccard_weight: 0.1 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftConfig {
    pub drift_absolute: usize,
    pub drift_fraction: f32,
}

impl Default for DriftConfig {
    fn default() -> Self {
        DriftConfig { drift_absolute: 10_000, drift_fraction: 0.1 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub embedding_dim: usize,
    /// Threaded through to the `Embedder` trait only; the engine never
    /// touches a GPU itself.
    pub use_gpu: bool,
    pub index_path: Option<String>,
    pub cache_max_size: usize,
    pub hnsw: HnswConfig,
    pub pq: PqConfig,
    pub lsh: LshConfig,
    pub bm25: Bm25Config,
    pub fusion: FusionConfig,
    pub drift: DriftConfig,
    pub query_deadline_ms: u64,
    /// Candidate sets at or above this size are scored with a `rayon`
    /// parallel iterator instead of sequentially; below it, thread fan-out
    /// overhead outweighs the per-candidate scoring cost.
    pub parallel_scoring_threshold: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            embedding_dim: 384,
            use_gpu: false,
            index_path: None,
            cache_max_size: 1024,
            hnsw: HnswConfig::default(),
            pq: PqConfig::default(),
            lsh: LshConfig::default(),
            bm25: Bm25Config::default(),
            fusion: FusionConfig::default(),
            drift: DriftConfig::default(),
            query_deadline_ms: 2_000,
            parallel_scoring_threshold: 256,
        }
    }
}

impl EngineConfig {
    /// Validate cross-field consistency the individual field defaults can't
    /// enforce on their own. Called once at engine construction rather than
    /// lazily at first use, so a misconfiguration fails immediately.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.embedding_dim == 0 {
            return Err(EngineError::validation("embedding_dim must be > 0"));
        }
        if self.pq.num_subquantizers == 0 || self.embedding_dim % self.pq.num_subquantizers != 0 {
            return Err(EngineError::validation(format!(
                "pq.num_subquantizers ({}) must evenly divide embedding_dim ({})",
                self.pq.num_subquantizers, self.embedding_dim
            )));
        }
        if self.pq.num_centroids == 0 || self.pq.num_centroids > 256 {
            return Err(EngineError::validation(
                "pq.num_centroids must be in 1..=256 to fit an 8-bit code",
            ));
        }
        if self.lsh.num_bands == 0 || self.lsh.rows_per_band == 0 {
            return Err(EngineError::validation(
                "lsh.num_bands and lsh.rows_per_band must both be > 0",
            ));
        }
        if self.hnsw.m == 0 {
            return Err(EngineError::validation("hnsw.m must be > 0"));
        }
        if self.hnsw.ef_search < 1 {
            return Err(EngineError::validation("hnsw.ef_search must be >= 1"));
        }
        if self.fusion.cosine_weight < 0.0 || self.fusion.bm25_weight < 0.0 || self.fusion.jaccard_weight < 0.0 {
            return Err(EngineError::validation("fusion weights must all be >= 0.0"));
        }
        let weight_sum =
            self.fusion.cosine_weight + self.fusion.bm25_weight + self.fusion.jaccard_weight;
        if (weight_sum - 1.0).abs() > 1e-3 {
            return Err(EngineError::validation(format!(
                "fusion weights must sum to 1.0, got {weight_sum}"
            )));
        }
        if self.cache_max_size == 0 {
            return Err(EngineError::validation("cache_max_size must be > 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_pq_dimension_mismatch() {
        let mut cfg = EngineConfig::default();
        cfg.embedding_dim = 100;
        cfg.pq.num_subquantizers = 7;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_fusion_weights_not_summing_to_one() {
        let mut cfg = EngineConfig::default();
        cfg.fusion.cosine_weight = 0.9;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_a_negative_fusion_weight() {
        let mut cfg = EngineConfig::default();
        cfg.fusion.cosine_weight = 1.1;
        cfg.fusion.bm25_weight = -0.1;
        assert!(cfg.validate().is_err());
    }
}
