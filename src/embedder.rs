//! The embedding model boundary.
//!
//! The engine treats the embedding model as a pure function
//! `encode(texts) -> Vec<Vec<f32>>`. Loading weights, batching strategy, GPU
//! placement, and model choice are all a host concern; this trait is the
//! entire surface the engine depends on.

use crate::error::EngineError;

pub trait Embedder: Send + Sync {
    /// Encode a batch of texts into fixed-dimension vectors, one per input,
    /// in input order. A implementation may fail the whole batch (return
    /// `Err`) or skip individual rows by returning a shorter vector than
    /// `texts`; the caller treats a short result as "the trailing entries
    /// failed to embed" rather than as an error.
    fn encode(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EngineError>;

    fn dimension(&self) -> usize;
}

/// A deterministic stub embedder for tests and examples: hashes each
/// whitespace token into a fixed-width vector and L2-normalizes it. Good
/// enough to exercise ranking logic without a real model dependency.
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        HashingEmbedder { dimension }
    }
}

impl Embedder for HashingEmbedder {
    fn encode(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EngineError> {
        Ok(texts.iter().map(|t| hash_embed(t, self.dimension)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

fn hash_embed(text: &str, dimension: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; dimension];
    for token in crate::document::tokenize(text) {
        let mut hash: u64 = 1469598103934665603; // FNV offset basis
        for byte in token.bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(1099511628211); // FNV prime
        }
        let idx = (hash as usize) % dimension;
        let sign = if (hash >> 63) & 1 == 0 { 1.0 } else { -1.0 };
        v[idx] += sign;
    }
    let norm = crate::simd::norm(&v);
    if norm > 1e-9 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashing_embedder_is_deterministic() {
        let embedder = HashingEmbedder::new(32);
        let a = embedder.encode(&["python aws"]).unwrap();
        let b = embedder.encode(&["python aws"]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn hashing_embedder_produces_unit_vectors() {
        let embedder = HashingEmbedder::new(16);
        let v = embedder.encode(&["some non empty text"]).unwrap();
        let n = crate::simd::norm(&v[0]);
        assert!((n - 1.0).abs() < 1e-4);
    }
}
