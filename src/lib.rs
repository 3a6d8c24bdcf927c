//! An in-process hybrid document retrieval engine.
//!
//! Answers ranked nearest-document queries over collections of up to the low
//! millions of short structured documents (résumés, emails, profiles) by
//! fusing four index families behind one handle:
//!
//! - a locality-sensitive hash table (`lsh`) for Jaccard-style candidate
//!   generation over token sets,
//! - a hierarchical navigable small-world graph (`hnsw`) for approximate
//!   cosine-nearest candidate generation over embeddings,
//! - a product quantizer (`pq`) for memory-efficient vector compression and
//!   asymmetric approximate distance,
//! - an Okapi BM25 index (`bm25`) for lexical scoring.
//!
//! # Design Philosophy
//!
//! The embedding model itself is out of scope — it is treated as a pure
//! function `encode(texts) -> Vec<Vec<f32>>` behind the [`embedder::Embedder`]
//! trait. The HTTP surface, document durability, deployment, and
//! configuration loading from files or environment are all host concerns;
//! this crate accepts an already-materialized [`config::EngineConfig`] and
//! does the rest in-process.
//!
//! **Key characteristics:**
//! - In-memory indexes behind a single-writer, many-readers concurrency model
//! - Incremental add/update/delete with tombstone-based deletion and
//!   drift-triggered rebuilds
//! - Deterministic builds: every source of randomness is a seeded
//!   `ChaCha8Rng`, so two engines built from the same documents and config
//!   produce byte-identical snapshots
//! - Snapshot/load persistence framed with magic bytes, a format version, and
//!   a CRC32 checksum per section
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use rank_hybrid::prelude::*;
//!
//! let config = EngineConfig::default();
//! let embedder = Arc::new(HashingEmbedder::new(config.embedding_dim));
//! let engine = Engine::new(config, embedder).unwrap();
//!
//! engine.build_indexes(vec![
//!     Document::new("d1", "python developer with aws experience"),
//!     Document::new("d2", "java backend engineer kubernetes"),
//! ]).unwrap();
//!
//! let cancel = CancellationToken::new();
//! let hits = engine.search("python aws", 5, None, None, &cancel, None).unwrap();
//! assert_eq!(hits[0].doc_id, "d1");
//! ```
//!
//! # Boundaries
//!
//! - Candidate generation, fusion scoring, and incremental mutation
//! - Snapshot/load persistence of every index structure
//! - Health and metrics reporting as plain, dependency-free snapshots
//! - Not in scope: the embedding model, the document store's durable bytes,
//!   the HTTP/transport layer, distributed sharding, multi-tenant isolation

/// Okapi BM25 lexical scoring over tokenized text.
pub mod bm25;

/// Bounded LRU cache over fused query results.
pub mod cache;

/// Cooperative cancellation tokens and query deadlines.
pub mod cancellation;

/// Engine configuration and cross-field validation.
pub mod config;

/// The document model: canonical text, tokenization, typed attributes.
pub mod document;

/// The embedding model boundary.
pub mod embedder;

/// The engine orchestrator: build pipeline, query pipeline, mutation.
pub mod engine;

/// The single error type surfaced across build, query, and mutation paths.
pub mod error;

/// The diagnostic event sink: a host-observable notification boundary for
/// build/rebuild/snapshot lifecycle events.
pub mod events;

/// Hierarchical Navigable Small World graph over document embeddings.
pub mod hnsw;

/// MinHash-based locality-sensitive hashing over token sets.
pub mod lsh;

/// Metadata storage and filter predicate evaluation.
pub mod metadata;

/// Operational counters, histograms, and health snapshots.
pub mod metrics;

/// Snapshot/load of every index structure into a generation directory.
pub mod persistence;

/// Product quantization: vector compression and asymmetric distance.
pub mod pq;

/// SIMD-dispatching dense vector math with a portable fallback.
pub mod simd;

/// Re-exports of the types most callers need, so `use rank_hybrid::prelude::*`
/// covers the common path without naming every module.
pub mod prelude {
    pub use crate::cancellation::{CancellationToken, Deadline};
    pub use crate::config::EngineConfig;
    pub use crate::document::{AttributeValue, Document};
    pub use crate::embedder::{Embedder, HashingEmbedder};
    pub use crate::engine::{Ack, BuildReport, Engine, SearchResult};
    pub use crate::error::{EngineError, EngineResult};
    pub use crate::events::{EngineEvent, EventSink, NoopEventSink};
    pub use crate::metadata::FilterBag;
    pub use crate::metrics::{HealthSnapshot, MetricsSnapshot};
}

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use std::sync::Arc;

    #[test]
    fn end_to_end_build_and_search_smoke_test() {
        let config = EngineConfig::default();
        let embedder = Arc::new(HashingEmbedder::new(config.embedding_dim));
        let engine = Engine::new(config, embedder).unwrap();

        engine
            .build_indexes(vec![
                Document::new("d1", "python developer with aws experience"),
                Document::new("d2", "java backend engineer kubernetes"),
                Document::new("d3", "senior python data scientist"),
            ])
            .unwrap();

        let cancel = CancellationToken::new();
        let hits = engine.search("python aws", 3, None, None, &cancel, None).unwrap();
        assert_eq!(hits[0].doc_id, "d1");
    }
}
