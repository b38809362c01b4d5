//! Exhaustive grid search with stratified k-fold cross-validation

use std::collections::BTreeMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{Classifier, Dataset};
use crate::experiment::{ParamSet, ParamValue};
use crate::{Error, Result};

/// Hyperparameter grid: every name maps to the values to try.
///
/// Candidates are the cartesian product in name order, with the last name
/// varying fastest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamGrid(BTreeMap<String, Vec<ParamValue>>);

impl ParamGrid {
    /// Empty grid (a single candidate with no overrides).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a dimension.
    #[must_use]
    pub fn with<V: Into<ParamValue>>(
        mut self,
        key: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.0.insert(key.into(), values.into_iter().map(Into::into).collect());
        self
    }

    /// Number of candidates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.values().map(Vec::len).product()
    }

    /// Whether the grid yields no candidates (some dimension is empty).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Expand into candidates.
    #[must_use]
    pub fn candidates(&self) -> Vec<ParamSet> {
        let mut out = vec![ParamSet::new()];
        for (key, values) in &self.0 {
            out = out
                .into_iter()
                .flat_map(|base| {
                    values.iter().map(move |value| base.clone().with(key.clone(), value.clone()))
                })
                .collect();
        }
        out
    }
}

/// Per-candidate cross-validation statistics, index-aligned with `params`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvResults {
    /// Candidates in evaluation order.
    pub params: Vec<ParamSet>,
    /// Mean held-out fold accuracy.
    pub mean_test_score: Vec<f64>,
    /// Standard deviation of held-out fold accuracy.
    pub std_test_score: Vec<f64>,
    /// Mean training fold accuracy.
    pub mean_train_score: Vec<f64>,
    /// Mean fit time in seconds.
    pub mean_fit_time: Vec<f64>,
    /// Mean scoring time in seconds.
    pub mean_score_time: Vec<f64>,
    /// 1 = best; ties share the lower rank.
    pub rank_test_score: Vec<usize>,
}

/// Result of [`GridSearch::fit`].
#[derive(Debug, Clone)]
pub struct SearchOutcome<C> {
    /// Best candidate refitted on the full dataset.
    pub best_estimator: C,
    /// Hyperparameters of the best candidate.
    pub best_params: ParamSet,
    /// Mean CV test score of the best candidate.
    pub best_score: f64,
    /// Index of the best candidate in `cv_results`.
    pub best_index: usize,
    /// Per-candidate statistics.
    pub cv_results: CvResults,
    /// Time spent refitting the best candidate, in seconds.
    pub refit_time_secs: f64,
}

/// Grid search driver.
#[derive(Debug, Clone, PartialEq)]
pub struct GridSearch {
    grid: ParamGrid,
    cv_folds: usize,
}

impl GridSearch {
    /// Create a search over `grid` with `cv_folds`-fold cross-validation.
    #[must_use]
    pub const fn new(grid: ParamGrid, cv_folds: usize) -> Self {
        Self { grid, cv_folds }
    }

    /// The grid being searched.
    #[must_use]
    pub const fn grid(&self) -> &ParamGrid {
        &self.grid
    }

    /// Evaluate every candidate, then refit the best one on all of `data`.
    ///
    /// The highest mean test score wins; ties go to the earliest candidate.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidConfig`] for an empty grid, fewer than 2 folds,
    ///   more folds than rows, or a candidate the estimator rejects
    /// - [`Error::Training`] if fitting fails
    pub fn fit<C: Classifier>(&self, base: &C, data: &Dataset) -> Result<SearchOutcome<C>> {
        let candidates = self.grid.candidates();
        if candidates.is_empty() {
            return Err(Error::InvalidConfig("parameter grid has no candidates".to_string()));
        }
        let folds = stratified_folds(data.labels(), self.cv_folds)?;

        let n = candidates.len();
        let mut results = CvResults {
            params: Vec::with_capacity(n),
            mean_test_score: Vec::with_capacity(n),
            std_test_score: Vec::with_capacity(n),
            mean_train_score: Vec::with_capacity(n),
            mean_fit_time: Vec::with_capacity(n),
            mean_score_time: Vec::with_capacity(n),
            rank_test_score: Vec::new(),
        };

        for params in candidates {
            let mut test_scores = Vec::with_capacity(folds.len());
            let mut train_scores = Vec::with_capacity(folds.len());
            let mut fit_times = Vec::with_capacity(folds.len());
            let mut score_times = Vec::with_capacity(folds.len());

            for (train_idx, test_idx) in &folds {
                let train = data.subset(train_idx);
                let test = data.subset(test_idx);

                let mut estimator = base.clone();
                estimator.set_params(&params)?;

                let started = Instant::now();
                estimator.fit(train.features(), train.labels())?;
                fit_times.push(started.elapsed().as_secs_f64());

                let started = Instant::now();
                test_scores.push(estimator.score(test.features(), test.labels())?);
                score_times.push(started.elapsed().as_secs_f64());

                train_scores.push(estimator.score(train.features(), train.labels())?);
            }

            let (mean, std) = mean_std(&test_scores);
            debug!(%params, mean_test_score = mean, "evaluated candidate");
            results.params.push(params);
            results.mean_test_score.push(mean);
            results.std_test_score.push(std);
            results.mean_train_score.push(mean_std(&train_scores).0);
            results.mean_fit_time.push(mean_std(&fit_times).0);
            results.mean_score_time.push(mean_std(&score_times).0);
        }

        results.rank_test_score = rank_descending(&results.mean_test_score);
        let best_index = results
            .rank_test_score
            .iter()
            .position(|&rank| rank == 1)
            .unwrap_or(0);
        let best_params = results.params[best_index].clone();
        let best_score = results.mean_test_score[best_index];

        let mut best_estimator = base.clone();
        best_estimator.set_params(&best_params)?;
        let started = Instant::now();
        best_estimator.fit(data.features(), data.labels())?;
        let refit_time_secs = started.elapsed().as_secs_f64();

        info!(
            model = C::NAME,
            candidates = results.params.len(),
            folds = folds.len(),
            %best_params,
            best_score,
            best_score_std = results.std_test_score[best_index],
            refit_time_secs,
            "grid search complete"
        );

        Ok(SearchOutcome {
            best_estimator,
            best_params,
            best_score,
            best_index,
            cv_results: results,
            refit_time_secs,
        })
    }
}

/// `(train, test)` index pairs with class proportions preserved per fold.
///
/// The j-th row of each class goes to fold `j % k`.
///
/// # Errors
///
/// Returns [`Error::InvalidConfig`] if `k < 2` or `k` exceeds the row count.
pub fn stratified_folds(labels: &[usize], k: usize) -> Result<Vec<(Vec<usize>, Vec<usize>)>> {
    if k < 2 {
        return Err(Error::InvalidConfig(format!("cv_folds must be at least 2, got {k}")));
    }
    if k > labels.len() {
        return Err(Error::InvalidConfig(format!(
            "cv_folds ({k}) exceeds number of rows ({})",
            labels.len()
        )));
    }

    let mut fold_of = vec![0_usize; labels.len()];
    let mut seen: BTreeMap<usize, usize> = BTreeMap::new();
    for (i, &label) in labels.iter().enumerate() {
        let j = seen.entry(label).or_insert(0);
        fold_of[i] = *j % k;
        *j += 1;
    }

    // Rotate so small classes don't leave later folds empty.
    let mut counts = vec![0_usize; k];
    fold_of.iter().for_each(|&f| counts[f] += 1);
    if counts.contains(&0) {
        for (i, fold) in fold_of.iter_mut().enumerate() {
            *fold = i % k;
        }
    }

    Ok((0..k)
        .map(|fold| {
            let (test, train): (Vec<usize>, Vec<usize>) =
                (0..labels.len()).partition(|&i| fold_of[i] == fold);
            (train, test)
        })
        .collect())
}

/// Mean and population standard deviation; zeros for empty input.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

/// Competition ranking, highest score first ("1224").
#[must_use]
pub fn rank_descending(scores: &[f64]) -> Vec<usize> {
    scores
        .iter()
        .map(|s| 1 + scores.iter().filter(|other| *other > s).count())
        .collect()
}
