//! Incremental add/update/delete usage.
//!
//! Demonstrates that a newly added document is immediately searchable, that
//! an update is observationally equivalent to delete-then-add, and that a
//! deleted document never reappears even though HNSW still references its
//! tombstoned node.

use std::sync::Arc;

use rank_hybrid::prelude::*;

fn main() {
    println!("=== Incremental Updates Example ===\n");

    let config = EngineConfig::default();
    let embedder = Arc::new(HashingEmbedder::new(config.embedding_dim));
    let engine = Engine::new(config, embedder).unwrap();

    engine
        .build_indexes(vec![
            Document::new("d1", "python developer with aws experience"),
            Document::new("d3", "senior python data scientist"),
        ])
        .unwrap();

    let cancel = CancellationToken::new();

    println!("1. Adding d4 = \"aws devops engineer\":");
    let ack = engine.add_document(Document::new("d4", "aws devops engineer")).unwrap();
    println!("   ack: generation {}\n", ack.generation);

    println!("2. Searching \"aws\":");
    for hit in engine.search("aws", 5, None, None, &cancel, None).unwrap() {
        println!("   {} — score {:.4}", hit.doc_id, hit.combined_score);
    }

    println!("\n3. Updating d4 to \"aws cost optimization specialist\":");
    engine
        .update_document("d4", Document::new("d4", "aws cost optimization specialist"))
        .unwrap();
    for hit in engine.search("cost optimization", 5, None, None, &cancel, None).unwrap() {
        println!("   {} — score {:.4}", hit.doc_id, hit.combined_score);
    }

    println!("\n4. Deleting d4:");
    engine.delete_document("d4").unwrap();
    let hits = engine.search("aws", 5, None, None, &cancel, None).unwrap();
    println!("   d4 present after delete: {}", hits.iter().any(|h| h.doc_id == "d4"));

    println!("\n=== Incremental Updates Example Complete ===");
}
