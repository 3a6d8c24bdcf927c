//! Okapi BM25 lexical scoring, computed lazily per candidate rather than via
//! a precomputed top-k retrieval path — the hot query loop only ever scores
//! the small candidate set LSH/HNSW already produced.
//!
//! Postings map, doc length table, and running average length, restructured
//! around string doc-ids and an explicit `remove` so it can participate in
//! the incremental add/update/delete lifecycle.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bm25Index {
    k1: f32,
    b: f32,
    /// term -> (doc_id -> term frequency)
    postings: HashMap<String, HashMap<String, u32>>,
    /// doc_id -> (term -> term frequency), kept to make `remove` possible
    /// without re-tokenizing the document.
    doc_term_freqs: HashMap<String, HashMap<String, u32>>,
    doc_lengths: HashMap<String, u32>,
    total_length: u64,
}

impl Bm25Index {
    pub fn new(k1: f32, b: f32) -> Self {
        Bm25Index {
            k1,
            b,
            postings: HashMap::new(),
            doc_term_freqs: HashMap::new(),
            doc_lengths: HashMap::new(),
            total_length: 0,
        }
    }

    /// Insert or replace a document's postings, length, and corpus stats.
    pub fn add(&mut self, doc_id: &str, tokens: &[String]) {
        self.remove(doc_id);

        let mut term_freqs: HashMap<String, u32> = HashMap::new();
        for token in tokens {
            *term_freqs.entry(token.clone()).or_insert(0) += 1;
        }
        for (term, freq) in &term_freqs {
            self.postings
                .entry(term.clone())
                .or_default()
                .insert(doc_id.to_string(), *freq);
        }
        self.doc_lengths.insert(doc_id.to_string(), tokens.len() as u32);
        self.total_length += tokens.len() as u64;
        self.doc_term_freqs.insert(doc_id.to_string(), term_freqs);
    }

    /// Remove a document's postings, length, and corpus stats. A no-op for
    /// an unknown doc-id.
    pub fn remove(&mut self, doc_id: &str) {
        if let Some(term_freqs) = self.doc_term_freqs.remove(doc_id) {
            for term in term_freqs.keys() {
                if let Some(bucket) = self.postings.get_mut(term) {
                    bucket.remove(doc_id);
                    if bucket.is_empty() {
                        self.postings.remove(term);
                    }
                }
            }
        }
        if let Some(length) = self.doc_lengths.remove(doc_id) {
            self.total_length -= length as u64;
        }
    }

    pub fn corpus_size(&self) -> usize {
        self.doc_lengths.len()
    }

    pub fn avg_doc_length(&self) -> f32 {
        let n = self.corpus_size();
        if n == 0 {
            0.0
        } else {
            self.total_length as f32 / n as f32
        }
    }

    fn document_frequency(&self, term: &str) -> usize {
        self.postings.get(term).map(|b| b.len()).unwrap_or(0)
    }

    /// `ln((N - df + 0.5)/(df + 0.5) + 1)`; zero for a term absent from the
    /// corpus rather than a negative number.
    pub fn idf(&self, term: &str) -> f32 {
        let df = self.document_frequency(term) as f32;
        if df == 0.0 {
            return 0.0;
        }
        let n = self.corpus_size() as f32;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    /// Okapi BM25 score of `doc_id` against `query_tokens`. Zero for an
    /// unknown or zero-length document, and terms absent from the corpus
    /// contribute zero rather than a negative penalty.
    pub fn score(&self, query_tokens: &[String], doc_id: &str) -> f32 {
        let avg_len = self.avg_doc_length();
        if avg_len <= 0.0 {
            return 0.0;
        }
        let doc_len = match self.doc_lengths.get(doc_id) {
            Some(&len) if len > 0 => len as f32,
            _ => return 0.0,
        };

        let mut score = 0.0f32;
        for term in query_tokens {
            let idf = self.idf(term);
            if idf == 0.0 {
                continue;
            }
            let tf = self
                .postings
                .get(term)
                .and_then(|bucket| bucket.get(doc_id))
                .copied()
                .unwrap_or(0) as f32;
            if tf == 0.0 {
                continue;
            }
            let numerator = tf * (self.k1 + 1.0);
            let denominator = tf + self.k1 * (1.0 - self.b + self.b * doc_len / avg_len);
            score += idf * numerator / denominator;
        }
        score
    }

    pub fn is_empty(&self) -> bool {
        self.doc_lengths.is_empty()
    }
}
