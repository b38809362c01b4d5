//! Property-based tests for runvault
//!
//! - Blob encoding preserves every parameter mapping and score series
//! - The store returns exactly what was inserted, in run id order
//! - Grid candidates and CV folds keep their structural invariants
//! - Run with `ProptestConfig::with_cases`

use std::collections::BTreeSet;

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use runvault::archive::Compression;
use runvault::codec;
use runvault::experiment::{MetadataStore, ParamSet, ParamValue, RecordKind, RunId, RunSummary, StoreTarget};
use runvault::ml::grid_search::{rank_descending, stratified_folds};
use runvault::ml::ParamGrid;
use runvault::Error;

// ============================================================================
// Strategies
// ============================================================================

fn arb_param_value() -> impl Strategy<Value = ParamValue> {
    prop_oneof![
        any::<i64>().prop_map(ParamValue::Int),
        (-1.0e9_f64..1.0e9).prop_map(ParamValue::Float),
        "[a-z_]{0,12}".prop_map(ParamValue::Text),
        any::<bool>().prop_map(ParamValue::Bool),
        Just(ParamValue::Null),
    ]
}

fn arb_param_set() -> impl Strategy<Value = ParamSet> {
    proptest::collection::btree_map("[a-z_]{1,16}", arb_param_value(), 0..8)
        .prop_map(|map| map.into_iter().collect())
}

fn arb_summary(run_id: i64) -> impl Strategy<Value = RunSummary> {
    ("[A-Za-z]{1,24}", 0_i64..1_000_000_000, 0_i64..86_400_000).prop_map(move |(name, offset_ms, len_ms)| {
        let base = Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0).unwrap();
        let started = base + Duration::milliseconds(offset_ms);
        RunSummary::new(
            RunId::new(run_id),
            name.clone(),
            format!("models::{name}"),
            started,
            started + Duration::milliseconds(len_ms),
        )
        .unwrap()
    })
}

fn summary_store() -> MetadataStore {
    let mut store = MetadataStore::open(StoreTarget::InMemory).unwrap();
    store.define_schema(RecordKind::Summary).unwrap();
    store
}

// ============================================================================
// Codec properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: any parameter mapping decodes to an equal mapping
    #[test]
    fn prop_param_set_round_trip(params in arb_param_set()) {
        let bytes = codec::encode(&params).unwrap();
        let decoded: ParamSet = codec::decode(&bytes).unwrap();
        prop_assert_eq!(decoded, params);
    }

    /// Property: score series keep length, order and exact values
    #[test]
    fn prop_series_round_trip(series in proptest::collection::vec(-1.0e6_f64..1.0e6, 0..64)) {
        let decoded: Vec<f64> = codec::decode(&codec::encode(&series).unwrap()).unwrap();
        prop_assert_eq!(decoded, series);
    }

    /// Property: no strict prefix of a blob decodes
    #[test]
    fn prop_truncated_blob_rejected(params in arb_param_set(), cut in 0.0_f64..1.0) {
        let bytes = codec::encode(&params).unwrap();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
        let keep = ((bytes.len() as f64) * cut) as usize;
        prop_assume!(keep < bytes.len());
        let result = codec::decode::<ParamSet>(&bytes[..keep]);
        prop_assert!(matches!(result, Err(Error::Decode(_))));
    }

    /// Property: both archive codecs are lossless
    #[test]
    fn prop_compression_round_trip(data in proptest::collection::vec(any::<u8>(), 0..4096)) {
        for compression in [Compression::Zstd, Compression::Lz4] {
            let packed = compression.compress(&data, 3).unwrap();
            prop_assert_eq!(compression.decompress(&packed).unwrap(), data.clone());
        }
    }
}

// ============================================================================
// Store properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(30))]

    /// Property: inserted summaries come back equal, ordered by run id
    #[test]
    fn prop_store_returns_inserted_rows(
        ids in proptest::collection::btree_set(1_i64..1_000_000, 1..20),
        seed_summary in arb_summary(0),
    ) {
        let mut store = summary_store();
        let mut expected = Vec::new();
        // Insert in reverse so ordering comes from the store, not the caller.
        for &id in ids.iter().rev() {
            let run = RunSummary::new(
                RunId::new(id),
                seed_summary.model_name(),
                seed_summary.model_type(),
                seed_summary.started_at(),
                seed_summary.finished_at(),
            )
            .unwrap();
            store.insert(&run).unwrap();
            expected.push(run);
        }
        expected.reverse();

        let rows: Vec<RunSummary> = store.read_all::<RunSummary>().collect::<Result<_, _>>().unwrap();
        prop_assert_eq!(&rows, &expected);

        let paged: Vec<RunSummary> = store.read_all_paged::<RunSummary>(3).collect::<Result<_, _>>().unwrap();
        prop_assert_eq!(paged, expected);
    }

    /// Property: a second insert with the same id never changes the row
    #[test]
    fn prop_duplicate_never_overwrites(first in arb_summary(77), second in arb_summary(77)) {
        let mut store = summary_store();
        store.insert(&first).unwrap();
        let is_constraint = matches!(store.insert(&second), Err(Error::Constraint { run_id: 77, .. }));
        prop_assert!(is_constraint);
        prop_assert_eq!(store.get::<RunSummary>(RunId::new(77)).unwrap(), Some(first));
        prop_assert_eq!(store.count::<RunSummary>().unwrap(), 1);
    }
}

// ============================================================================
// Search structure properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: candidate count is the product of value counts, all distinct
    #[test]
    fn prop_grid_is_cartesian_product(
        a in proptest::collection::btree_set(0_i64..100, 1..5),
        b in proptest::collection::btree_set(0_i64..100, 1..5),
    ) {
        let grid = ParamGrid::new().with("a", a.iter().copied()).with("b", b.iter().copied());
        let candidates = grid.candidates();
        prop_assert_eq!(candidates.len(), a.len() * b.len());

        let distinct: BTreeSet<String> = candidates.iter().map(ToString::to_string).collect();
        prop_assert_eq!(distinct.len(), candidates.len());
    }

    /// Property: folds partition the rows and each test fold is non-empty
    #[test]
    fn prop_stratified_folds_partition(
        labels in proptest::collection::vec(0_usize..3, 12..80),
        k in 2_usize..5,
    ) {
        let folds = stratified_folds(&labels, k).unwrap();
        prop_assert_eq!(folds.len(), k);

        let mut seen = vec![0_usize; labels.len()];
        for (train, test) in &folds {
            prop_assert!(!test.is_empty());
            prop_assert_eq!(train.len() + test.len(), labels.len());
            for &i in test {
                seen[i] += 1;
            }
        }
        prop_assert!(seen.iter().all(|&count| count == 1));
    }

    /// Property: rank 1 always marks a maximal score
    #[test]
    fn prop_rank_one_is_best(scores in proptest::collection::vec(0.0_f64..1.0, 1..20)) {
        let ranks = rank_descending(&scores);
        let best = scores.iter().copied().fold(f64::MIN, f64::max);
        for (score, rank) in scores.iter().zip(&ranks) {
            prop_assert!(*rank >= 1);
            if *rank == 1 {
                prop_assert!((score - best).abs() < f64::EPSILON);
            }
        }
    }
}
