//! MinHash-based locality-sensitive hashing over token sets.
//!
//! Returns a superset of documents whose token set has non-trivial Jaccard
//! overlap with a query's token set, with sub-linear expected candidate
//! generation cost via banding. The hash family here operates on token
//! sets, not dense vectors.

use std::collections::{HashMap, HashSet};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// A MinHash + banding index over token sets.
///
/// Hash functions are generated once at construction from a fixed seed so
/// that two engines built from the same documents with the same
/// configuration produce byte-identical signatures — required for the
/// snapshot/load determinism law.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LshIndex {
    num_bands: usize,
    rows_per_band: usize,
    /// One (a, b) pair per hash function, defining `h(x) = (a*x + b) mod p`
    /// over the universal hash family on token hashes.
    hash_params: Vec<(u64, u64)>,
    signatures: HashMap<String, Vec<u32>>,
    token_sets: HashMap<String, HashSet<String>>,
    bands: Vec<HashMap<u64, HashSet<String>>>,
}

const MERSENNE_PRIME: u64 = (1u64 << 61) - 1;

impl LshIndex {
    pub fn new(num_bands: usize, rows_per_band: usize, seed: u64) -> Self {
        let num_functions = num_bands * rows_per_band;
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let hash_params = (0..num_functions)
            .map(|_| {
                let a = rng.gen_range(1..MERSENNE_PRIME);
                let b = rng.gen_range(0..MERSENNE_PRIME);
                (a, b)
            })
            .collect();

        LshIndex {
            num_bands,
            rows_per_band,
            hash_params,
            signatures: HashMap::new(),
            token_sets: HashMap::new(),
            bands: vec![HashMap::new(); num_bands],
        }
    }

    fn token_hash(token: &str) -> u64 {
        let mut hash: u64 = 1469598103934665603;
        for byte in token.bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(1099511628211);
        }
        hash
    }

    fn compute_signature(&self, tokens: &HashSet<String>) -> Vec<u32> {
        self.hash_params
            .iter()
            .map(|&(a, b)| {
                tokens
                    .iter()
                    .map(|t| {
                        let x = Self::token_hash(t) % MERSENNE_PRIME;
                        ((a.wrapping_mul(x).wrapping_add(b)) % MERSENNE_PRIME) as u32
                    })
                    .min()
                    .unwrap_or(u32::MAX)
            })
            .collect()
    }

    fn band_key(signature: &[u32], band: usize, rows_per_band: usize) -> u64 {
        let start = band * rows_per_band;
        let mut hash: u64 = 0xcbf29ce484222325;
        for &v in &signature[start..start + rows_per_band] {
            hash ^= v as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        hash
    }

    /// Insert or replace a document's signature.
    pub fn add(&mut self, doc_id: &str, tokens: HashSet<String>) {
        self.remove(doc_id);
        let signature = self.compute_signature(&tokens);
        for band in 0..self.num_bands {
            let key = Self::band_key(&signature, band, self.rows_per_band);
            self.bands[band]
                .entry(key)
                .or_default()
                .insert(doc_id.to_string());
        }
        self.signatures.insert(doc_id.to_string(), signature);
        self.token_sets.insert(doc_id.to_string(), tokens);
    }

    /// Erase a doc-id from every band. A no-op for an unknown doc-id.
    pub fn remove(&mut self, doc_id: &str) {
        if let Some(signature) = self.signatures.remove(doc_id) {
            for band in 0..self.num_bands {
                let key = Self::band_key(&signature, band, self.rows_per_band);
                if let Some(bucket) = self.bands[band].get_mut(&key) {
                    bucket.remove(doc_id);
                    if bucket.is_empty() {
                        self.bands[band].remove(&key);
                    }
                }
            }
        }
        self.token_sets.remove(doc_id);
    }

    /// Every document sharing at least one band signature with the query.
    pub fn candidates(&self, query_tokens: &HashSet<String>) -> HashSet<String> {
        let signature = self.compute_signature(query_tokens);
        let mut out = HashSet::new();
        for band in 0..self.num_bands {
            let key = Self::band_key(&signature, band, self.rows_per_band);
            if let Some(bucket) = self.bands[band].get(&key) {
                out.extend(bucket.iter().cloned());
            }
        }
        out
    }

    /// Exact Jaccard similarity between the query tokens and a doc's stored
    /// token set, computed from the originals rather than estimated from the
    /// MinHash signature.
    pub fn jaccard(&self, query_tokens: &HashSet<String>, doc_id: &str) -> f32 {
        match self.token_sets.get(doc_id) {
            Some(doc_tokens) => jaccard_exact(query_tokens, doc_tokens),
            None => 0.0,
        }
    }

    pub fn len(&self) -> usize {
        self.token_sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.token_sets.is_empty()
    }
}

fn jaccard_exact(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f32 / union as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(words: &[&str]) -> HashSet<String> {
        words.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn exact_jaccard_of_identical_sets_is_one() {
        let a = set(&["python", "aws"]);
        assert!((jaccard_exact(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn exact_jaccard_of_disjoint_sets_is_zero() {
        assert_eq!(jaccard_exact(&set(&["a"]), &set(&["b"])), 0.0);
    }

    #[test]
    fn jaccard_of_two_empty_sets_is_zero() {
        assert_eq!(jaccard_exact(&HashSet::new(), &HashSet::new()), 0.0);
    }

    #[test]
    fn add_then_candidates_finds_overlapping_doc() {
        let mut index = LshIndex::new(20, 5, 42);
        index.add("d1", set(&["python", "aws", "developer"]));
        index.add("d2", set(&["java", "kubernetes"]));

        let query = set(&["python", "aws"]);
        let candidates = index.candidates(&query);
        assert!(candidates.contains("d1"));
    }

    #[test]
    fn remove_drops_doc_from_every_band() {
        let mut index = LshIndex::new(20, 5, 42);
        index.add("d1", set(&["python", "aws"]));
        index.remove("d1");
        let candidates = index.candidates(&set(&["python", "aws"]));
        assert!(!candidates.contains("d1"));
        assert_eq!(index.jaccard(&set(&["python"]), "d1"), 0.0);
    }

    #[test]
    fn remove_unknown_doc_is_a_noop() {
        let mut index = LshIndex::new(10, 2, 1);
        index.remove("ghost");
        assert!(index.is_empty());
    }

    #[test]
    fn same_seed_produces_identical_signatures_across_instances() {
        let mut a = LshIndex::new(10, 4, 7);
        let mut b = LshIndex::new(10, 4, 7);
        let tokens = set(&["rust", "systems", "programming"]);
        a.add("d1", tokens.clone());
        b.add("d1", tokens);
        assert_eq!(a.signatures.get("d1"), b.signatures.get("d1"));
    }

    #[test]
    fn single_token_set_still_produces_valid_signature() {
        let mut index = LshIndex::new(5, 2, 3);
        index.add("d1", set(&["solo"]));
        assert_eq!(index.jaccard(&set(&["solo"]), "d1"), 1.0);
    }
}
