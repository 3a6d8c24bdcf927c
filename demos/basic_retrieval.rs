//! Basic build-then-search usage.
//!
//! Demonstrates building an index over a small corpus and running a fused
//! query against it, with and without a metadata filter.

use std::sync::Arc;

use rank_hybrid::prelude::*;

fn main() {
    println!("=== Basic Retrieval Example ===\n");

    let config = EngineConfig::default();
    let embedder = Arc::new(HashingEmbedder::new(config.embedding_dim));
    let engine = Engine::new(config, embedder).unwrap();

    println!("1. Building the index:");
    let report = engine
        .build_indexes(vec![
            Document::new("d1", "python developer with aws experience"),
            Document::new("d2", "java backend engineer kubernetes")
                .with_attribute("required_skills", AttributeValue::StringSet(vec!["kubernetes".to_string()])),
            Document::new("d3", "senior python data scientist"),
        ])
        .unwrap();
    println!(
        "   indexed {} documents ({} failures) in {}ms\n",
        report.documents_processed, report.failures, report.elapsed_ms
    );

    println!("2. Unfiltered query \"python aws\":");
    let cancel = CancellationToken::new();
    let hits = engine.search("python aws", 3, None, None, &cancel, None).unwrap();
    for hit in &hits {
        println!("   {} — score {:.4} (cos {:.4}, bm25 {:.4}, jac {:.4})", hit.doc_id, hit.combined_score, hit.cos, hit.bm25, hit.jac);
    }

    println!("\n3. Filtered query \"python aws\" requiring skill \"kubernetes\":");
    let filter = serde_json::json!({"required_skills": ["kubernetes"]});
    let hits = engine.search("python aws", 3, Some(&filter), None, &cancel, None).unwrap();
    for hit in &hits {
        println!("   {} — score {:.4}", hit.doc_id, hit.combined_score);
    }

    println!("\n4. Health snapshot: {:?}", engine.health());
    println!("\n=== Basic Retrieval Example Complete ===");
}
