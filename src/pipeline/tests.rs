use std::collections::HashSet;
use std::ops::ControlFlow;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use chrono::DateTime;
use crossbeam_channel::{bounded, unbounded};

use super::{BoxError, Pipeline, PipelineError, RunSummary, operation, run};
use crate::location::RootLocation;
use crate::model::Item;
use crate::selection::SelectionPolicy;
use crate::store::{EnumerateError, Enumerator, MemoryStore};

/// `count` keys `{prefix}{n:03}` in container `b`, one version each
fn store_with_keys(prefix: &str, count: usize, page_size: usize) -> MemoryStore {
    (0..count).fold(MemoryStore::new().with_page_size(page_size), |store, n| {
        store.with_object("b", &format!("{prefix}{n:03}"), "v1", "")
    })
}

fn versioned_store() -> MemoryStore {
    MemoryStore::new()
        .with_page_size(2)
        .with_object("b", "a", "a1", "")
        .with_object("b", "a", "a2", "")
        .with_object("b", "b", "b1", "")
        .with_object("b", "c", "c1", "")
        .with_object("b", "c", "c2", "")
}

fn root(container: &str, prefix: &str) -> RootLocation {
    RootLocation::new(container, prefix)
}

fn applied_versions(store: &MemoryStore, policy: &SelectionPolicy, workers: usize) -> HashSet<String> {
    let seen = Mutex::new(HashSet::new());
    run(
        store,
        &[root("b", "")],
        operation(|_, item| {
            seen.lock().unwrap().insert(item.version_id.clone());
            Ok(())
        }),
        policy,
        workers,
    )
    .unwrap();
    seen.into_inner().unwrap()
}

#[test]
fn test_all_versions_selected() {
    let seen = applied_versions(&versioned_store(), &SelectionPolicy::All, 3);
    let expected: HashSet<String> = ["a1", "a2", "b1", "c1", "c2"].map(String::from).into();
    assert_eq!(seen, expected);
}

#[test]
fn test_current_only_selected() {
    let seen = applied_versions(&versioned_store(), &SelectionPolicy::CurrentOnly, 3);
    let expected: HashSet<String> = ["a2", "b1", "c2"].map(String::from).into();
    assert_eq!(seen, expected);
}

#[test]
fn test_exact_version_selected() {
    let seen = applied_versions(
        &versioned_store(),
        &SelectionPolicy::ExactVersion("a1".into()),
        2,
    );
    assert_eq!(seen, HashSet::from(["a1".to_string()]));
}

#[test]
fn test_exact_version_without_match_is_not_an_error() {
    let calls = AtomicUsize::new(0);
    let summary = Pipeline::new(&versioned_store())
        .with_workers(2)
        .run(
            &[root("b", "")],
            &SelectionPolicy::ExactVersion("missing".into()),
            operation(|_, _| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        )
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(summary.items, 5);
}

#[test]
fn test_duplicate_current_flags_all_applied() {
    let time = DateTime::UNIX_EPOCH;
    let store = MemoryStore::new()
        .with_item("b", Item::new("k", "v1", true, time))
        .with_item("b", Item::new("k", "v2", true, time))
        .with_item("b", Item::new("k", "v3", false, time));
    let seen = applied_versions(&store, &SelectionPolicy::CurrentOnly, 1);
    assert_eq!(seen, HashSet::from(["v1".to_string(), "v2".to_string()]));
}

#[test]
fn test_every_page_processed_before_return() {
    let store = store_with_keys("k", 95, 10);
    let calls = AtomicUsize::new(0);
    let summary = run(
        &store,
        &[root("b", "")],
        operation(|_, _| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }),
        &SelectionPolicy::All,
        4,
    )
    .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 95);
    assert_eq!(summary, RunSummary { batches: 10, items: 95 });
}

#[test]
fn test_multiple_roots_processed() {
    let store = MemoryStore::new()
        .with_page_size(1)
        .with_object("b", "logs/1", "v1", "")
        .with_object("b", "logs/2", "v1", "")
        .with_object("b", "data/1", "v1", "")
        .with_object("other", "x", "v1", "");
    let seen = Mutex::new(Vec::new());
    let summary = run(
        &store,
        &[root("b", "logs/"), root("other", "")],
        operation(|container, item| {
            seen.lock().unwrap().push(item.url(container));
            Ok(())
        }),
        &SelectionPolicy::CurrentOnly,
        2,
    )
    .unwrap();
    let mut seen = seen.into_inner().unwrap();
    seen.sort();
    assert_eq!(seen, vec!["s3://b/logs/1", "s3://b/logs/2", "s3://other/x"]);
    assert_eq!(summary.batches, 3);
}

#[test]
fn test_empty_root_completes() {
    let store = MemoryStore::new().with_container("empty");
    let summary = run(
        &store,
        &[root("empty", "")],
        operation(|_, _| Err("never called".into())),
        &SelectionPolicy::All,
        2,
    )
    .unwrap();
    assert_eq!(summary, RunSummary::default());
}

#[test]
fn test_batch_order_preserved_per_worker() {
    let store = store_with_keys("k", 60, 6);
    let log = Mutex::new(Vec::new());
    run(
        &store,
        &[root("b", "")],
        operation(|_, item| {
            log.lock().unwrap().push(item.key.clone());
            Ok(())
        }),
        &SelectionPolicy::All,
        4,
    )
    .unwrap();

    let log = log.into_inner().unwrap();
    assert_eq!(log.len(), 60);
    // Keys of one page stay in listing order even when pages interleave
    for page in 0..10 {
        let in_page: Vec<&String> = log
            .iter()
            .filter(|key| key[1..].parse::<usize>().unwrap() / 6 == page)
            .collect();
        let mut sorted = in_page.clone();
        sorted.sort();
        assert_eq!(in_page, sorted);
    }
}

#[test]
fn test_failure_stops_rest_of_batch() {
    let store = store_with_keys("k", 3, 10);
    let seen = Mutex::new(Vec::new());
    let err = run(
        &store,
        &[root("b", "")],
        operation(|_, item| {
            seen.lock().unwrap().push(item.key.clone());
            if item.key == "k001" {
                return Err("access denied".into());
            }
            Ok(())
        }),
        &SelectionPolicy::All,
        1,
    )
    .unwrap_err();

    assert_eq!(seen.into_inner().unwrap(), vec!["k000", "k001"]);
    match err {
        PipelineError::Operation {
            container,
            key,
            version,
            source,
        } => {
            assert_eq!(container, "b");
            assert_eq!(key, "k001");
            assert_eq!(version, "v1");
            assert_eq!(source.to_string(), "access denied");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_failure_halts_dispatch() {
    let store = store_with_keys("k", 100, 1);
    let calls = AtomicUsize::new(0);
    let result = run(
        &store,
        &[root("b", "")],
        operation(|_, _| -> Result<(), BoxError> {
            calls.fetch_add(1, Ordering::SeqCst);
            Err("boom".into())
        }),
        &SelectionPolicy::All,
        1,
    );
    assert!(matches!(result, Err(PipelineError::Operation { .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_failure_with_many_workers_is_reported() {
    let store = store_with_keys("k", 50, 2);
    let result = run(
        &store,
        &[root("b", "")],
        operation(|_, item| {
            if item.key == "k031" {
                Err("boom".into())
            } else {
                Ok(())
            }
        }),
        &SelectionPolicy::All,
        8,
    );
    assert!(matches!(result, Err(PipelineError::Operation { key, .. }) if key == "k031"));
}

#[test]
fn test_enumeration_failure_stops_later_roots() {
    let store = MemoryStore::new()
        .with_page_size(1)
        .with_object("first", "a", "v1", "")
        .with_object("first", "b", "v1", "")
        .with_listing_failure("first", 1)
        .with_object("second", "c", "v1", "");
    let seen = Mutex::new(Vec::new());
    let err = run(
        &store,
        &[root("first", ""), root("second", "")],
        operation(|container, _| {
            seen.lock().unwrap().push(container.to_string());
            Ok(())
        }),
        &SelectionPolicy::All,
        2,
    )
    .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Enumeration {
            source: EnumerateError::PageFetch { .. },
            ..
        }
    ));
    assert!(!seen.into_inner().unwrap().contains(&"second".to_string()));
}

#[test]
fn test_missing_container_is_enumeration_error() {
    let store = MemoryStore::new();
    let err = run(
        &store,
        &[root("nope", "logs/")],
        operation(|_, _| Ok(())),
        &SelectionPolicy::All,
        1,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Enumeration { root, source: EnumerateError::NoSuchContainer(_) }
            if root == "s3://nope/logs/"
    ));
}

#[test]
fn test_zero_workers_rejected() {
    let store = versioned_store();
    let calls = AtomicUsize::new(0);
    let err = run(
        &store,
        &[root("b", "")],
        operation(|_, _| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }),
        &SelectionPolicy::All,
        0,
    )
    .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidWorkerCount));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

/// One-item pages that count how many were listed
struct CountingPages {
    pages: usize,
    listed: AtomicUsize,
}

impl Enumerator for CountingPages {
    fn list_versions(
        &self,
        _root: &RootLocation,
        visit: &mut dyn FnMut(Vec<Item>) -> ControlFlow<()>,
    ) -> Result<(), EnumerateError> {
        for n in 0..self.pages {
            self.listed.fetch_add(1, Ordering::SeqCst);
            let item = Item::new(format!("k{n:03}"), "v1", true, DateTime::UNIX_EPOCH);
            if visit(vec![item]).is_break() {
                break;
            }
        }
        Ok(())
    }

    fn common_prefixes(&self, _root: &RootLocation) -> Result<Vec<String>, EnumerateError> {
        Ok(Vec::new())
    }
}

/// Listing stays at most one page ahead of the busy workers
fn assert_listing_waits_for_workers(workers: usize) {
    let store = CountingPages {
        pages: 50,
        listed: AtomicUsize::new(0),
    };
    let finished = AtomicUsize::new(0);
    let (started_tx, started_rx) = unbounded();
    let (gate_tx, gate_rx) = bounded::<()>(0);

    thread::scope(|s| {
        let handle = s.spawn(|| {
            Pipeline::new(&store).with_workers(workers).run_unfiltered(
                &[root("b", "")],
                &operation(|_, _| {
                    started_tx.send(()).ok();
                    // Blocks until the gate is dropped
                    gate_rx.recv().ok();
                    finished.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
            )
        });

        for _ in 0..workers {
            started_rx
                .recv_timeout(Duration::from_secs(5))
                .expect("worker never started");
        }
        thread::sleep(Duration::from_millis(100));
        let ahead = store.listed.load(Ordering::SeqCst) - finished.load(Ordering::SeqCst);
        drop(gate_tx);

        let summary = handle.join().unwrap().unwrap();
        assert!(ahead <= workers + 1, "listed {ahead} pages ahead of {workers} workers");
        assert_eq!(summary.batches, 50);
    });
    assert_eq!(finished.load(Ordering::SeqCst), 50);
}

#[test]
fn test_listing_waits_for_single_busy_worker() {
    assert_listing_waits_for_workers(1);
}

#[test]
fn test_listing_waits_for_busy_workers() {
    assert_listing_waits_for_workers(3);
}
