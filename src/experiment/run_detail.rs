//! Run Detail - run summary plus search results and the fitted model

use serde::{Deserialize, Serialize};

use super::{ParamSet, RunSummary};
use crate::codec::ModelArtifact;
use crate::{Error, Result};

/// Run Detail extends a [`RunSummary`] with the grid-search results and
/// the serialized best model.
///
/// ## Alignment
///
/// `test_scores`, `train_scores`, `fit_time_secs` and `score_time_secs` are
/// index-aligned with `all_params`: entry `i` of each describes candidate
/// `all_params[i]`. `best_params` is always one of the candidates.
#[derive(Debug, Clone, PartialEq)]
pub struct RunDetail {
    summary: RunSummary,
    best_params: ParamSet,
    all_params: Vec<ParamSet>,
    test_scores: Vec<f64>,
    train_scores: Vec<f64>,
    fit_time_secs: Vec<f64>,
    score_time_secs: Vec<f64>,
    best_model: ModelArtifact,
}

impl RunDetail {
    /// Create a builder seeded with the run's summary fields.
    #[must_use]
    pub fn builder(summary: RunSummary) -> RunDetailBuilder {
        RunDetailBuilder::new(summary)
    }

    /// Summary fields shared with the `RunSummary` table.
    #[must_use]
    pub const fn summary(&self) -> &RunSummary {
        &self.summary
    }

    /// Chosen hyperparameters.
    #[must_use]
    pub const fn best_params(&self) -> &ParamSet {
        &self.best_params
    }

    /// Every evaluated candidate, in evaluation order.
    #[must_use]
    pub fn all_params(&self) -> &[ParamSet] {
        &self.all_params
    }

    /// Mean cross-validated test score per candidate.
    #[must_use]
    pub fn test_scores(&self) -> &[f64] {
        &self.test_scores
    }

    /// Mean cross-validated train score per candidate.
    #[must_use]
    pub fn train_scores(&self) -> &[f64] {
        &self.train_scores
    }

    /// Mean fit time per candidate, in seconds.
    #[must_use]
    pub fn fit_time_secs(&self) -> &[f64] {
        &self.fit_time_secs
    }

    /// Mean score time per candidate, in seconds.
    #[must_use]
    pub fn score_time_secs(&self) -> &[f64] {
        &self.score_time_secs
    }

    /// Serialized best model.
    #[must_use]
    pub const fn best_model(&self) -> &ModelArtifact {
        &self.best_model
    }

    /// Index of `best_params` within `all_params`.
    #[must_use]
    pub fn best_index(&self) -> Option<usize> {
        self.all_params.iter().position(|p| p == &self.best_params)
    }

    /// Number of evaluated candidates.
    #[must_use]
    pub fn candidate_count(&self) -> usize {
        self.all_params.len()
    }
}

/// Builder for `RunDetail`.
#[derive(Debug)]
pub struct RunDetailBuilder {
    summary: RunSummary,
    best_params: Option<ParamSet>,
    all_params: Vec<ParamSet>,
    test_scores: Vec<f64>,
    train_scores: Vec<f64>,
    fit_time_secs: Vec<f64>,
    score_time_secs: Vec<f64>,
    best_model: Option<ModelArtifact>,
}

impl RunDetailBuilder {
    /// Create a new builder with required fields.
    #[must_use]
    pub const fn new(summary: RunSummary) -> Self {
        Self {
            summary,
            best_params: None,
            all_params: Vec::new(),
            test_scores: Vec::new(),
            train_scores: Vec::new(),
            fit_time_secs: Vec::new(),
            score_time_secs: Vec::new(),
            best_model: None,
        }
    }

    /// Set the chosen hyperparameters.
    #[must_use]
    pub fn best_params(mut self, params: ParamSet) -> Self {
        self.best_params = Some(params);
        self
    }

    /// Set every evaluated candidate.
    #[must_use]
    pub fn all_params(mut self, params: Vec<ParamSet>) -> Self {
        self.all_params = params;
        self
    }

    /// Set per-candidate mean test scores.
    #[must_use]
    pub fn test_scores(mut self, scores: Vec<f64>) -> Self {
        self.test_scores = scores;
        self
    }

    /// Set per-candidate mean train scores.
    #[must_use]
    pub fn train_scores(mut self, scores: Vec<f64>) -> Self {
        self.train_scores = scores;
        self
    }

    /// Set per-candidate mean fit times.
    #[must_use]
    pub fn fit_time_secs(mut self, secs: Vec<f64>) -> Self {
        self.fit_time_secs = secs;
        self
    }

    /// Set per-candidate mean score times.
    #[must_use]
    pub fn score_time_secs(mut self, secs: Vec<f64>) -> Self {
        self.score_time_secs = secs;
        self
    }

    /// Set the serialized best model.
    #[must_use]
    pub fn best_model(mut self, artifact: ModelArtifact) -> Self {
        self.best_model = Some(artifact);
        self
    }

    /// Build the `RunDetail`, checking alignment invariants.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRecord`] if a field is missing, a sequence is
    /// misaligned with `all_params`, or `best_params` is not a candidate.
    pub fn build(self) -> Result<RunDetail> {
        let run_id = self.summary.run_id();
        let best_params = self
            .best_params
            .ok_or_else(|| Error::InvalidRecord(format!("run {run_id}: best_params not set")))?;
        let best_model = self
            .best_model
            .ok_or_else(|| Error::InvalidRecord(format!("run {run_id}: best_model not set")))?;

        let expected = self.all_params.len();
        for (name, len) in [
            ("test_scores", self.test_scores.len()),
            ("train_scores", self.train_scores.len()),
            ("fit_time_secs", self.fit_time_secs.len()),
            ("score_time_secs", self.score_time_secs.len()),
        ] {
            if len != expected {
                return Err(Error::InvalidRecord(format!(
                    "run {run_id}: {name} has {len} entries, all_params has {expected}"
                )));
            }
        }

        if !self.all_params.contains(&best_params) {
            return Err(Error::InvalidRecord(format!(
                "run {run_id}: best_params {best_params} is not among the evaluated candidates"
            )));
        }

        Ok(RunDetail {
            summary: self.summary,
            best_params,
            all_params: self.all_params,
            test_scores: self.test_scores,
            train_scores: self.train_scores,
            fit_time_secs: self.fit_time_secs,
            score_time_secs: self.score_time_secs,
            best_model,
        })
    }
}

/// Serializable view of the score columns, used when exporting a detail row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRow {
    /// Candidate hyperparameters.
    pub params: ParamSet,
    /// Mean test score.
    pub test_score: f64,
    /// Mean train score.
    pub train_score: f64,
    /// Mean fit time in seconds.
    pub fit_time_secs: f64,
    /// Mean score time in seconds.
    pub score_time_secs: f64,
}

impl RunDetail {
    /// Zip the aligned columns into one row per candidate.
    #[must_use]
    pub fn candidates(&self) -> Vec<CandidateRow> {
        self.all_params
            .iter()
            .enumerate()
            .map(|(i, params)| CandidateRow {
                params: params.clone(),
                test_score: self.test_scores[i],
                train_score: self.train_scores[i],
                fit_time_secs: self.fit_time_secs[i],
                score_time_secs: self.score_time_secs[i],
            })
            .collect()
    }
}
