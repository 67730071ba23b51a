//! Integration tests for s3kit
//!
//! These tests build a temporary bucket mirror on disk and run complete
//! command workflows against it through the public API.

use chrono::{Duration, Utc};
use std::fs;
use std::ops::ControlFlow;
use std::path::Path;
use tempfile::TempDir;

use s3kit::access_log::{AccessLogRecord, LogWindow, scan_logs};
use s3kit::commands::locks::{self, GovernanceAction};
use s3kit::commands::size::measure;
use s3kit::commands::tags::{self, TagChange, TagMode};
use s3kit::commands::versions::list_versions;
use s3kit::model::{LegalHoldStatus, NULL_VERSION, RetentionMode};
use s3kit::pipeline::{BoxError, operation};
use s3kit::store::{LocalStore, ObjectLocks, ObjectTagging, StoreError};
use s3kit::{Item, PipelineError, RootLocation, SelectionPolicy};

/// Helper function to create a file under the mirror
fn create_object(root: &Path, bucket: &str, key: &str, content: &str) {
    let path = root.join(bucket).join(key);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn mirror() -> TempDir {
    let dir = TempDir::new().unwrap();
    create_object(dir.path(), "data", "reports/2024/jan.csv", "a,b\n1,2\n");
    create_object(dir.path(), "data", "reports/2024/feb.csv", "a,b\n3,4\n5,6\n");
    create_object(dir.path(), "data", "images/logo.png", "png");
    create_object(
        dir.path(),
        "logs",
        "access/2024-03-01.log",
        include_str!("fixtures/access_log.txt"),
    );
    dir
}

fn roots(urls: &[&str]) -> Vec<RootLocation> {
    RootLocation::parse_all(urls).unwrap()
}

#[test]
fn test_list_versions_of_mirror() {
    let dir = mirror();
    let store = LocalStore::new(dir.path()).with_page_size(1);
    let listings = list_versions(
        &store,
        &roots(&["s3://data/reports/"]),
        &SelectionPolicy::All,
        3,
    )
    .unwrap();

    let paths: Vec<_> = listings.iter().map(|l| l.path.as_str()).collect();
    assert_eq!(
        paths,
        vec!["s3://data/reports/2024/feb.csv", "s3://data/reports/2024/jan.csv"]
    );
    assert!(listings.iter().all(|l| l.latest.as_deref() == Some(NULL_VERSION)));
}

#[test]
fn test_tag_add_and_remove_roundtrip() {
    let dir = mirror();
    let store = LocalStore::new(dir.path());
    let target = roots(&["s3://data/reports/"]);
    let policy = SelectionPolicy::CurrentOnly;

    let add = TagChange::parse(TagMode::Add, &["team=finance,year=2024"]);
    let summary = tags::execute(&store, &target, &policy, 2, &add, true).unwrap();
    assert_eq!(summary.items, 2);

    let remove = TagChange::parse(TagMode::Remove, &["year"]);
    tags::execute(&store, &target, &policy, 2, &remove, true).unwrap();

    let reopened = LocalStore::new(dir.path());
    let listed = tags::list_tags(&reopened, &target, &policy, 2).unwrap();
    assert_eq!(listed.len(), 2);
    for listing in &listed {
        assert_eq!(listing.versions[0].tags, vec!["team=finance"]);
    }
    assert!(
        reopened
            .get_tags("data", "images/logo.png", NULL_VERSION)
            .unwrap()
            .is_empty()
    );
}

#[test]
fn test_legal_hold_and_governance_locks() {
    let dir = mirror();
    let store = LocalStore::new(dir.path());
    let target = roots(&["s3://data/images/"]);
    let policy = SelectionPolicy::CurrentOnly;

    locks::execute(
        &store,
        &target,
        &policy,
        1,
        "legal hold ON",
        locks::legal_hold_operation(&store, LegalHoldStatus::On),
        true,
    )
    .unwrap();
    locks::execute(
        &store,
        &target,
        &policy,
        1,
        "governance lock",
        locks::governance_operation(&store, GovernanceAction::Apply(Duration::days(1))),
        true,
    )
    .unwrap();

    let listed = locks::list_locks(&store, &target, &policy, 1).unwrap();
    assert_eq!(listed.len(), 1);
    let state = &listed[0].versions[0];
    assert!(state.legal_hold);
    assert!(state.governance_until.is_some_and(|until| until > Utc::now()));
    assert!(state.compliance_until.is_none());

    locks::execute(
        &store,
        &target,
        &policy,
        1,
        "governance release",
        locks::governance_operation(&store, GovernanceAction::Release),
        true,
    )
    .unwrap();
    let retention = store
        .retention("data", "images/logo.png", NULL_VERSION)
        .unwrap()
        .unwrap();
    assert_eq!(retention.mode, RetentionMode::Governance);
    assert!(retention.retain_until <= Utc::now() + Duration::seconds(1));
}

#[test]
fn test_declined_compliance_lock_changes_nothing() {
    let dir = mirror();
    let store = LocalStore::new(dir.path());
    locks::execute(
        &store,
        &roots(&["s3://data/"]),
        &SelectionPolicy::CurrentOnly,
        2,
        "compliance lock",
        locks::compliance_operation(&store, Duration::hours(1), |_: &str, _: &str, _| Ok(false)),
        true,
    )
    .unwrap();
    assert_eq!(
        store.retention("data", "images/logo.png", NULL_VERSION).unwrap(),
        None
    );
}

#[test]
fn test_size_groups_top_level_folders() {
    let dir = mirror();
    let store = LocalStore::new(dir.path());
    let sizes = measure(&store, &roots(&["s3://data/"]), true, 2).unwrap();

    let paths: Vec<_> = sizes.iter().map(|s| s.path.as_str()).collect();
    assert_eq!(paths, vec!["s3://data/images/", "s3://data/reports/"]);
    assert_eq!(sizes[0].count, 1);
    assert_eq!(sizes[0].size, 3);
    assert_eq!(sizes[1].count, 2);
    assert_eq!(sizes[1].size, 8 + 12);
}

#[test]
fn test_scan_access_logs_from_disk() {
    let dir = mirror();
    let store = LocalStore::new(dir.path());
    let mut operations = Vec::new();
    let summary = scan_logs(
        &store,
        &roots(&["s3://logs/access/"]),
        &LogWindow::default(),
        2,
        |record: AccessLogRecord| {
            operations.push(record.operation);
            ControlFlow::Continue(())
        },
    )
    .unwrap();
    assert_eq!(summary.objects, 1);
    assert_eq!(summary.records, 9);
    assert_eq!(operations.len(), 9);
}

#[test]
fn test_failing_operation_stops_run() {
    let dir = mirror();
    let store = LocalStore::new(dir.path()).with_page_size(1);
    let result = s3kit::pipeline::run(
        &store,
        &roots(&["s3://data/"]),
        operation(|_: &str, item: &Item| -> Result<(), BoxError> {
            if item.key.ends_with(".png") {
                Err("refused".into())
            } else {
                Ok(())
            }
        }),
        &SelectionPolicy::All,
        1,
    );
    match result {
        Err(PipelineError::Operation { container, key, .. }) => {
            assert_eq!(container, "data");
            assert_eq!(key, "images/logo.png");
        }
        other => panic!("Expected operation error, got {other:?}"),
    }
}

#[test]
fn test_missing_bucket_is_reported() {
    let dir = mirror();
    let store = LocalStore::new(dir.path());
    let err = list_versions(&store, &roots(&["s3://nope/"]), &SelectionPolicy::All, 1).unwrap_err();
    assert!(matches!(err, PipelineError::Enumeration { .. }));

    let err = store
        .put_legal_hold("nope", "k", NULL_VERSION, LegalHoldStatus::On)
        .unwrap_err();
    assert!(matches!(err, StoreError::NoSuchContainer(_)));
}
