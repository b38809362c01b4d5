//! Run Tracking Schema
//!
//! Data structures and SQLite storage for completed training runs.
//!
//! ## Schema Overview
//!
//! ```text
//! RunSummary (run_id PK, model_name, model_type, started_at, finished_at)
//! RunDetail  (RunSummary columns
//!             + best_params, all_params,            [ParamSet blobs]
//!             + test_scores, train_scores,          [f64 series blobs]
//!             + fit_time_secs, score_time_secs,     [f64 series blobs]
//!             + best_model)                         [model blob]
//! ```
//!
//! Both tables are append-only; `run_id` is the primary key of each.
//!
//! ## Usage
//!
//! ```rust
//! use runvault::experiment::{MetadataStore, RecordKind, RunId, RunSummary, StoreTarget};
//! use chrono::Utc;
//!
//! let mut store = MetadataStore::open(StoreTarget::InMemory)?;
//! for kind in RecordKind::ALL {
//!     store.define_schema(kind)?;
//! }
//!
//! let started = Utc::now();
//! let summary = RunSummary::new(RunId::from_datetime(started), "RandomForestClassifier",
//!     "runvault::ml::RandomForestClassifier", started, Utc::now())?;
//! store.insert(&summary)?;
//! # Ok::<(), runvault::Error>(())
//! ```

mod params;
mod run_detail;
mod run_id;
mod run_summary;
mod schema;
mod store;

pub use params::{ParamSet, ParamValue};
pub use run_detail::{CandidateRow, RunDetail, RunDetailBuilder};
pub use run_id::RunId;
pub use run_summary::RunSummary;
pub use schema::RecordKind;
pub use store::{MetadataStore, RecordCursor, StoreTarget, StoredRecord, DEFAULT_PAGE_SIZE};
