//! End-to-end scenarios exercising the engine as a single black box: build,
//! query fusion, filtering, incremental mutation, snapshot/load, validation,
//! and cancellation.

use std::sync::Arc;
use std::time::Duration;

use rank_hybrid::prelude::*;

fn small_engine() -> Engine {
    let mut config = EngineConfig::default();
    config.embedding_dim = 32;
    config.pq.num_subquantizers = 2;
    config.pq.num_centroids = 4;
    config.cache_max_size = 64;
    Engine::new(config, Arc::new(HashingEmbedder::new(32))).unwrap()
}

#[test]
fn fused_query_ranks_the_doubly_matching_document_first() {
    let engine = small_engine();
    engine
        .build_indexes(vec![
            Document::new("d1", "python developer with aws experience"),
            Document::new("d2", "java backend engineer kubernetes"),
            Document::new("d3", "senior python data scientist"),
        ])
        .unwrap();

    let cancel = CancellationToken::new();
    let results = engine.search("python aws", 3, None, None, &cancel, None).unwrap();

    let ids: Vec<&str> = results.iter().map(|r| r.doc_id.as_str()).collect();
    assert_eq!(ids, vec!["d1", "d3", "d2"]);

    let d1_score = results.iter().find(|r| r.doc_id == "d1").unwrap().combined_score;
    let d3_score = results.iter().find(|r| r.doc_id == "d3").unwrap().combined_score;
    assert!(d1_score > d3_score, "d1 ({d1_score}) should outscore d3 ({d3_score})");
}

#[test]
fn required_skills_filter_excludes_every_document_without_the_skill() {
    let engine = small_engine();
    let mut d2 = Document::new("d2", "java backend engineer kubernetes");
    d2 = d2.with_attribute("required_skills", AttributeValue::StringSet(vec!["kubernetes".to_string()]));

    engine
        .build_indexes(vec![
            Document::new("d1", "python developer with aws experience"),
            d2,
            Document::new("d3", "senior python data scientist"),
        ])
        .unwrap();

    let filter = serde_json::json!({"required_skills": ["kubernetes"]});
    let cancel = CancellationToken::new();
    let results = engine.search("python aws", 3, Some(&filter), None, &cancel, None).unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].doc_id, "d2");
}

#[test]
fn added_document_is_searchable_and_deleted_document_disappears() {
    let engine = small_engine();
    engine
        .build_indexes(vec![
            Document::new("d1", "python developer with aws experience"),
            Document::new("d3", "senior python data scientist"),
        ])
        .unwrap();

    engine.add_document(Document::new("d4", "aws devops engineer")).unwrap();

    let cancel = CancellationToken::new();
    let results = engine.search("aws", 2, None, None, &cancel, None).unwrap();
    let ids: Vec<&str> = results.iter().map(|r| r.doc_id.as_str()).collect();
    assert!(ids.contains(&"d4"));
    assert!(ids.contains(&"d1"));
    assert!(!ids.contains(&"d3"));

    engine.delete_document("d4").unwrap();
    let results = engine.search("aws", 2, None, None, &cancel, None).unwrap();
    assert!(results.iter().all(|r| r.doc_id != "d4"));
}

#[test]
fn snapshot_then_load_reproduces_top_five_for_ten_random_queries() {
    let dir = std::env::temp_dir().join(format!("rank-hybrid-integration-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);

    let engine = small_engine();
    let documents: Vec<Document> = (0..1000)
        .map(|i| {
            Document::new(
                format!("doc{i}"),
                format!("document number {i} covering topic{} and topic{}", i % 17, (i * 3) % 23),
            )
        })
        .collect();
    engine.build_indexes(documents).unwrap();
    engine.snapshot(dir.to_str().unwrap()).unwrap();

    let fresh = small_engine();
    fresh.load(dir.to_str().unwrap()).unwrap();

    let cancel = CancellationToken::new();
    let queries = [
        "topic1 topic2", "topic3", "topic4 topic5", "topic6", "topic7 topic8",
        "topic9", "topic10 topic11", "topic12", "topic13 topic14", "topic15",
    ];
    for query in queries {
        let before = engine.search(query, 5, None, None, &cancel, None).unwrap();
        let after = fresh.search(query, 5, None, None, &cancel, None).unwrap();
        let before_ids: Vec<&str> = before.iter().map(|r| r.doc_id.as_str()).collect();
        let after_ids: Vec<&str> = after.iter().map(|r| r.doc_id.as_str()).collect();
        assert_eq!(before_ids, after_ids, "mismatch for query {query:?}");
    }

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn zero_num_results_is_rejected_without_incrementing_the_query_counter() {
    let engine = small_engine();
    engine.build_indexes(vec![Document::new("d1", "python developer")]).unwrap();

    let cancel = CancellationToken::new();
    let before = engine.metrics().counters["search_queries_total"];
    let result = engine.search("python", 0, None, None, &cancel, None);
    assert!(matches!(result, Err(EngineError::Validation(_))));

    let after = engine.metrics().counters["search_queries_total"];
    assert_eq!(before, after, "a rejected query must not count as a served search");
}

#[test]
fn cancelled_search_fails_and_the_next_identical_search_is_served_and_cached() {
    let engine = small_engine();
    let documents: Vec<Document> = (0..200)
        .map(|i| Document::new(format!("doc{i}"), format!("document {i} about python and aws")))
        .collect();
    engine.build_indexes(documents).unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = engine.search("python aws", 5, None, None, &cancel, None);
    assert!(matches!(result, Err(EngineError::Cancelled)));

    let fresh_cancel = CancellationToken::new();
    let first = engine.search("python aws", 5, None, None, &fresh_cancel, None).unwrap();
    assert!(!first.is_empty());

    let hits_before = engine.metrics().counters["search_cache_hits_total"];
    let second = engine.search("python aws", 5, None, None, &fresh_cancel, None).unwrap();
    let hits_after = engine.metrics().counters["search_cache_hits_total"];
    assert_eq!(hits_after, hits_before + 1);
    assert_eq!(first.len(), second.len());
}

#[test]
fn deadline_in_the_past_times_out_before_scoring() {
    let engine = small_engine();
    engine.build_indexes(vec![Document::new("d1", "python developer")]).unwrap();

    let cancel = CancellationToken::new();
    let deadline = Deadline::after(Duration::from_millis(0));
    std::thread::sleep(Duration::from_millis(5));
    let result = engine.search("python", 1, None, None, &cancel, Some(deadline));
    assert!(matches!(result, Err(EngineError::Timeout)));
}
