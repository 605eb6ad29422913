//! Result iterator lifecycle tests
//!
//! Whoever receives a result iterator owns one close. These tests check
//! that every exit path (exhaustion, early abandonment, errors, drop)
//! hands the cursor back to the backend.

use std::sync::Arc;

use syncdb::backend::{DocumentUpdate, MemoryBucket};
use syncdb::config::DatabaseConfig;
use syncdb::dispatcher::QueryDispatcher;
use syncdb::query::{BackendKind, QueryType};
use syncdb::stats::{StatCounts, StatsRegistry};

const BACKENDS: [BackendKind; 2] = [BackendKind::View, BackendKind::Declarative];

fn setup(backend: BackendKind, docs: usize) -> (QueryDispatcher, Arc<MemoryBucket>) {
    let bucket = Arc::new(MemoryBucket::new("db"));
    for i in 0..docs {
        bucket.put(&format!("doc{}", i), DocumentUpdate::new().with_channels(["A"]));
    }
    let config = DatabaseConfig::new("db").with_backend(backend);
    let dispatcher =
        QueryDispatcher::from_config(&config, bucket.clone(), Arc::new(StatsRegistry::new()));
    (dispatcher, bucket)
}

// =============================================================================
// EXHAUSTION
// =============================================================================

/// Test: once `next_row` returns `None` it keeps returning `None`, and
/// close after exhaustion succeeds.
#[test]
fn test_exhaustion_is_terminal() {
    for backend in BACKENDS {
        let (dispatcher, bucket) = setup(backend, 2);

        let mut results = dispatcher.query_channels("A", 0, 0, 0).unwrap();
        assert!(results.next_row().unwrap().is_some());
        assert!(results.next_row().unwrap().is_some());
        for _ in 0..3 {
            assert!(results.next_row().unwrap().is_none());
        }
        results.close().unwrap();
        results.close().unwrap();
        assert!(results.next_row().unwrap().is_none());
        assert_eq!(bucket.open_cursors(), 0);
    }
}

/// Test: the iterator adapter yields every row then stops.
#[test]
fn test_iterator_adapter() {
    for backend in BACKENDS {
        let (dispatcher, _) = setup(backend, 4);

        let mut results = dispatcher.query_channels("A", 0, 0, 0).unwrap();
        let ids: Vec<String> = results
            .by_ref()
            .map(|row| row.unwrap().id().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["doc0", "doc1", "doc2", "doc3"]);
        assert!(results.next().is_none());
        results.close().unwrap();
    }
}

// =============================================================================
// EARLY RELEASE
// =============================================================================

/// Test: closing mid-stream releases the backend cursor.
#[test]
fn test_early_close_releases_cursor() {
    for backend in BACKENDS {
        let (dispatcher, bucket) = setup(backend, 5);

        let mut results = dispatcher.query_channels("A", 0, 0, 0).unwrap();
        results.next_row().unwrap();
        assert!(bucket.open_cursors() > 0);

        results.close().unwrap();
        assert!(results.is_closed());
        assert_eq!(bucket.open_cursors(), 0);
    }
}

/// Test: both partition cursors of a view sequence query are released on
/// early close.
#[test]
fn test_early_close_releases_every_partition() {
    let (dispatcher, bucket) = setup(BackendKind::View, 3);
    bucket.put("loose", DocumentUpdate::new());

    let mut results = dispatcher.query_sequences([1, 2, 3, 4]).unwrap();
    assert_eq!(bucket.open_cursors(), 2);
    results.next_row().unwrap();
    results.close().unwrap();
    assert_eq!(bucket.open_cursors(), 0);
}

/// Test: dropping an unclosed iterator still releases the cursor.
#[test]
fn test_drop_releases_cursor() {
    for backend in BACKENDS {
        let (dispatcher, bucket) = setup(backend, 3);
        {
            let mut results = dispatcher.query_channels("A", 0, 0, 0).unwrap();
            results.next_row().unwrap();
        }
        assert_eq!(bucket.open_cursors(), 0);
    }
}

// =============================================================================
// ERRORS AFTER EXECUTE
// =============================================================================

/// Test: rows read before a read failure stay valid; the iterator is
/// terminal afterwards and still closes.
#[test]
fn test_partial_results_before_read_failure() {
    for backend in BACKENDS {
        let (dispatcher, bucket) = setup(backend, 4);
        bucket.fail_cursor_reads_after(Some(2));

        let mut results = dispatcher.query_channels("A", 0, 0, 0).unwrap();
        let first = results.next_row().unwrap().unwrap();
        let second = results.next_row().unwrap().unwrap();
        let err = results.next_row().unwrap_err();
        assert!(err.is_iteration());
        assert_eq!(err.code().code(), "SYNCDB_QUERY_ITERATION_FAILED");

        assert_eq!(first.id(), Some("doc0"));
        assert_eq!(second.id(), Some("doc1"));
        assert!(results.next_row().unwrap().is_none());
        assert_eq!(results.rows_read(), 2);

        results.close().unwrap();
        assert_eq!(bucket.open_cursors(), 0);
    }
}

/// Test: a close failure surfaces on `close` without touching the counters.
#[test]
fn test_close_failure_surfaced() {
    for backend in BACKENDS {
        let (dispatcher, bucket) = setup(backend, 1);
        bucket.fail_cursor_close(true);

        let mut results = dispatcher.query_channels("A", 0, 0, 0).unwrap();
        assert_eq!(results.count_rows().unwrap(), 1);
        let err = results.close().unwrap_err();
        assert!(err.is_iteration());
        assert_eq!(err.query_type(), QueryType::Channels);

        // Second close is a no-op.
        results.close().unwrap();
        assert_eq!(bucket.open_cursors(), 0);
        assert_eq!(
            dispatcher.stats().get(&dispatcher.stat_key(QueryType::Channels)),
            StatCounts { issued: 1, errors: 0 }
        );
    }
}
