//! Run tracking schema tests: records and the SQLite metadata store

use chrono::{Duration, TimeZone, Utc};
use runvault::experiment::{
    MetadataStore, ParamSet, RecordKind, RunDetail, RunId, RunSummary, StoreTarget,
};
use runvault::ml::{make_classification, DatasetConfig, GridSearch, ParamGrid, RandomForestClassifier};
use runvault::ml::Classifier;
use runvault::pipeline::detail_from_search;
use runvault::Error;

// =============================================================================
// Helpers
// =============================================================================

fn summary(id: i64) -> RunSummary {
    let started = Utc.with_ymd_and_hms(2019, 5, 10, 19, 1, 0).unwrap();
    RunSummary::new(
        RunId::new(id),
        RandomForestClassifier::NAME,
        RandomForestClassifier::model_type(),
        started,
        started + Duration::seconds(95),
    )
    .unwrap()
}

fn detail(id: i64) -> RunDetail {
    let data = make_classification(&DatasetConfig { n_samples: 60, ..Default::default() }).unwrap();
    let grid = ParamGrid::new().with("n_estimators", [2_i64, 4]).with("max_depth", [Some(3_usize)]);
    let outcome = GridSearch::new(grid, 2).fit(&RandomForestClassifier::new(), &data).unwrap();
    detail_from_search(summary(id), &outcome).unwrap()
}

fn store_with_schema() -> MetadataStore {
    let mut store = MetadataStore::open(StoreTarget::InMemory).unwrap();
    for kind in RecordKind::ALL {
        store.define_schema(kind).unwrap();
    }
    store
}

// =============================================================================
// RunSummary
// =============================================================================

#[test]
fn test_run_summary_creation() {
    let run = summary(201_905_101_901);

    assert_eq!(run.run_id(), RunId::new(201_905_101_901));
    assert_eq!(run.model_name(), "RandomForestClassifier");
    assert!(run.model_type().ends_with("RandomForestClassifier"));
    assert!(run.model_type().contains("::"));
    assert!(run.started_at() <= run.finished_at());
}

#[test]
fn test_run_summary_serialization() {
    let run = summary(1);
    let json = serde_json::to_string(&run).expect("serialization failed");
    let deserialized: RunSummary = serde_json::from_str(&json).expect("deserialization failed");
    assert_eq!(run, deserialized);
}

// =============================================================================
// Store round trips
// =============================================================================

#[test]
fn test_summary_read_back_equal() {
    let mut store = store_with_schema();
    let run = summary(201_905_101_901);
    store.insert(&run).unwrap();

    let rows: Vec<RunSummary> = store.read_all::<RunSummary>().collect::<Result<_, _>>().unwrap();
    assert_eq!(rows, vec![run]);
}

#[test]
fn test_sub_second_timestamps_survive() {
    let mut store = store_with_schema();
    let started = Utc.with_ymd_and_hms(2024, 2, 29, 23, 59, 59).unwrap() + Duration::nanoseconds(123_456_789);
    let run = RunSummary::new(RunId::new(5), "m", "t", started, started + Duration::microseconds(7))
        .unwrap();
    store.insert(&run).unwrap();
    assert_eq!(store.get::<RunSummary>(RunId::new(5)).unwrap(), Some(run));
}

#[test]
fn test_detail_read_back_equal() {
    let mut store = store_with_schema();
    let record = detail(201_905_101_901);
    store.insert(&record).unwrap();

    let rows: Vec<RunDetail> = store.read_all::<RunDetail>().collect::<Result<_, _>>().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0], record);
    assert_eq!(rows[0].candidate_count(), 2);
    assert_eq!(rows[0].test_scores().len(), 2);
    assert!(rows[0].all_params().contains(rows[0].best_params()));
}

#[test]
fn test_detail_model_decodes_to_same_predictions() {
    let mut store = store_with_schema();
    let record = detail(3);
    store.insert(&record).unwrap();

    let stored: RunDetail = store.get(RunId::new(3)).unwrap().unwrap();
    let original: RandomForestClassifier = record.best_model().decode().unwrap();
    let restored: RandomForestClassifier = stored.best_model().decode().unwrap();

    let unseen = make_classification(&DatasetConfig { n_samples: 40, seed: 99, ..Default::default() })
        .unwrap();
    assert_eq!(
        original.predict(unseen.features()).unwrap(),
        restored.predict(unseen.features()).unwrap()
    );
}

#[test]
fn test_duplicate_run_id_rejected_and_row_unchanged() {
    let mut store = store_with_schema();
    let first = summary(42);
    store.insert(&first).unwrap();

    let started = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
    let second = RunSummary::new(RunId::new(42), "Other", "other::Other", started, started).unwrap();
    let err = store.insert(&second).unwrap_err();
    assert!(matches!(err, Error::Constraint { run_id: 42, ref table } if table == "RunSummary"));

    assert_eq!(store.count::<RunSummary>().unwrap(), 1);
    assert_eq!(store.get::<RunSummary>(RunId::new(42)).unwrap(), Some(first));
}

#[test]
fn test_duplicate_detail_rejected() {
    let mut store = store_with_schema();
    let record = detail(11);
    store.insert(&record).unwrap();
    assert!(matches!(store.insert(&record), Err(Error::Constraint { run_id: 11, .. })));
    assert_eq!(store.count::<RunDetail>().unwrap(), 1);
}

#[test]
fn test_read_all_is_restartable() {
    let mut store = store_with_schema();
    for id in [3, 1, 2] {
        store.insert(&summary(id)).unwrap();
    }

    let first: Vec<RunId> = store.read_all::<RunSummary>().map(|r| r.unwrap().run_id()).collect();
    let second: Vec<RunId> = store.read_all::<RunSummary>().map(|r| r.unwrap().run_id()).collect();
    assert_eq!(first, second);
    assert_eq!(first, vec![RunId::new(1), RunId::new(2), RunId::new(3)]);
}

#[test]
fn test_read_all_empty_table() {
    let store = store_with_schema();
    assert_eq!(store.read_all::<RunDetail>().count(), 0);
}

// =============================================================================
// Lifecycle and schema errors
// =============================================================================

#[test]
fn test_open_missing_directory_is_connection_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("does").join("not").join("exist.db");
    let err = MetadataStore::open_file(&path).unwrap_err();
    assert!(matches!(err, Error::Connection(_)));
}

#[test]
fn test_file_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("runs.db");

    let mut store = MetadataStore::open_file(&path).unwrap();
    assert!(!store.is_in_memory());
    store.define_schema(RecordKind::Summary).unwrap();
    store.insert(&summary(9)).unwrap();
    store.close().unwrap();

    let mut reopened = MetadataStore::open_file(&path).unwrap();
    assert_eq!(reopened.count::<RunSummary>().unwrap(), 1);
    // Insert works on an existing table without redefining it.
    reopened.insert(&summary(10)).unwrap();
    assert_eq!(reopened.count::<RunSummary>().unwrap(), 2);
}

#[test]
fn test_conflicting_existing_schema() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("legacy.db");
    {
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute_batch("CREATE TABLE RunDetail (run_id INTEGER PRIMARY KEY, blob BLOB)").unwrap();
    }

    let mut store = MetadataStore::open_file(&path).unwrap();
    let err = store.define_schema(RecordKind::Detail).unwrap_err();
    assert!(matches!(err, Error::Schema { ref table, .. } if table == "RunDetail"));
}

#[test]
fn test_invalid_detail_never_reaches_store() {
    let err = RunDetail::builder(summary(1))
        .best_params(ParamSet::new().with("n_estimators", 40_i64))
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::InvalidRecord(_)));
}
