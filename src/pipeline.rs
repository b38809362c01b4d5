//! End-to-end run: dataset → grid search → metadata store → archive
//!
//! Each stage only starts once the previous one has succeeded. In
//! particular, the uncompressed database is deleted only after its archive
//! has been fully written.

use std::fs;
use std::path::PathBuf;

use chrono::Utc;
use tracing::{debug, info, info_span, warn};

use crate::archive::{ArchiveInfo, Archiver};
use crate::codec::{self, ModelArtifact};
use crate::config::PipelineConfig;
use crate::experiment::{MetadataStore, ParamSet, RecordKind, RunDetail, RunId, RunSummary, StoreTarget};
use crate::ml::grid_search::SearchOutcome;
use crate::ml::{accuracy, make_classification, Classifier, Dataset, GridSearch, RandomForestClassifier};
use crate::{Error, Result};

/// Outcome of [`Pipeline::run`].
#[derive(Debug, Clone)]
pub struct PipelineReport {
    /// Id of the recorded run.
    pub run_id: RunId,
    /// Where the database was flushed (deleted after archiving).
    pub database_path: PathBuf,
    /// Where the archive was written.
    pub archive_path: PathBuf,
    /// Archive header.
    pub archive: ArchiveInfo,
    /// Winning hyperparameters.
    pub best_params: ParamSet,
    /// Mean CV score of the winner.
    pub best_score: f64,
    /// Standard deviation of the winner's CV scores across folds.
    pub best_score_std: f64,
    /// Seconds spent refitting the winner on the full training set.
    pub refit_time_secs: f64,
    /// Number of evaluated candidates.
    pub candidate_count: usize,
    /// Held-out rows the best model was checked on.
    pub holdout: Dataset,
    /// Best model's predictions on `holdout`.
    pub holdout_predictions: Vec<usize>,
    /// Accuracy of `holdout_predictions`.
    pub holdout_accuracy: f64,
}

/// Build the detail record for a finished search.
///
/// # Errors
///
/// Returns [`crate::Error::Serialization`] if the model cannot be encoded,
/// or [`crate::Error::InvalidRecord`] if the search results are misaligned.
pub fn detail_from_search<C: Classifier>(
    summary: RunSummary,
    outcome: &SearchOutcome<C>,
) -> Result<RunDetail> {
    let cv = &outcome.cv_results;
    RunDetail::builder(summary)
        .best_params(outcome.best_params.clone())
        .all_params(cv.params.clone())
        .test_scores(cv.mean_test_score.clone())
        .train_scores(cv.mean_train_score.clone())
        .fit_time_secs(cv.mean_fit_time.clone())
        .score_time_secs(cv.mean_score_time.clone())
        .best_model(ModelArtifact::from_model(&outcome.best_estimator)?)
        .build()
}

/// Linear driver for one training run.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    run_id: Option<RunId>,
    archiver: Archiver,
}

impl Pipeline {
    /// Create a pipeline from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidConfig`] if `config` is invalid.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let archiver = Archiver::new(config.compression);
        Ok(Self { config, run_id: None, archiver })
    }

    /// Use a fixed run id instead of deriving it from the start time.
    #[must_use]
    pub const fn with_run_id(mut self, run_id: RunId) -> Self {
        self.run_id = Some(run_id);
        self
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Constraint`] before training if the database or
    /// archive for this run id already exists, otherwise the first stage
    /// error. Store errors abort before anything is written; archive errors
    /// abort before the database file is deleted.
    pub fn run(&self) -> Result<PipelineReport> {
        let started_at = Utc::now();
        let run_id = self.run_id.unwrap_or_else(|| RunId::from_datetime(started_at));
        let span = info_span!("run", %run_id);
        let _guard = span.enter();
        let config = &self.config;

        let database_path = config.database_path(run_id);
        let archive_path = config.archive_path(run_id);
        if let Some(existing) = [&database_path, &archive_path].into_iter().find(|p| p.exists()) {
            warn!(path = %existing.display(), "run already recorded");
            return Err(Error::Constraint {
                table: RecordKind::Summary.table_name().to_string(),
                run_id: run_id.get(),
            });
        }

        let data = make_classification(&config.dataset)?;
        let (train, holdout) = data.train_test_split(config.test_fraction, config.split_seed)?;
        debug!(train = train.len(), holdout = holdout.len(), "dataset ready");

        let base = RandomForestClassifier::new().with_random_state(config.search.random_state);
        let outcome = GridSearch::new(config.search.grid(), config.search.cv_folds).fit(&base, &train)?;
        let holdout_predictions = outcome.best_estimator.predict(holdout.features())?;
        let holdout_accuracy = accuracy(&holdout_predictions, holdout.labels());
        let finished_at = Utc::now();

        let summary = RunSummary::new(
            run_id,
            RandomForestClassifier::NAME,
            RandomForestClassifier::model_type(),
            started_at,
            finished_at,
        )?;
        let detail = detail_from_search(summary.clone(), &outcome)?;
        for candidate in detail.candidates() {
            debug!(params = %candidate.params, test_score = candidate.test_score, "candidate");
        }
        let model_header = codec::read_header(detail.best_model().as_bytes())?;
        info!(
            artifact = %detail.best_model().cas_hash(),
            bytes = detail.best_model().len(),
            format = %model_header.format,
            format_version = model_header.version,
            "model serialized"
        );

        let mut store = MetadataStore::open(StoreTarget::InMemory)?;
        for kind in RecordKind::ALL {
            store.define_schema(kind)?;
        }
        store.insert(&summary)?;
        store.insert(&detail)?;

        fs::create_dir_all(&config.output_dir)?;
        self.archiver.flush(&store, &database_path)?;
        store.close()?;

        let archive = self.archiver.seal(&database_path, &archive_path)?;
        let best_score_std =
            outcome.cv_results.std_test_score.get(outcome.best_index).copied().unwrap_or_default();

        info!(
            archive = %archive_path.display(),
            best_params = %outcome.best_params,
            best_score = outcome.best_score,
            best_score_std,
            holdout_accuracy,
            "run archived"
        );

        Ok(PipelineReport {
            run_id,
            database_path,
            archive_path,
            archive,
            best_params: outcome.best_params,
            best_score: outcome.best_score,
            best_score_std,
            refit_time_secs: outcome.refit_time_secs,
            candidate_count: outcome.cv_results.params.len(),
            holdout,
            holdout_predictions,
            holdout_accuracy,
        })
    }
}
