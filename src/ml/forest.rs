//! Random forest classifier (bagged CART trees, probability averaging)

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::tree::{DecisionTree, TreeConfig};
use super::Classifier;
use crate::codec::{Blob, BlobKind};
use crate::experiment::{ParamSet, ParamValue};
use crate::{Error, Result};

/// Random forest over [`DecisionTree`]s.
///
/// Each tree sees a bootstrap sample of the rows and `max_features`
/// randomly chosen columns per split (default: `sqrt(n_features)`).
/// Prediction averages leaf class distributions and picks the most likely
/// class, lowest index on ties.
///
/// ## Hyperparameters
///
/// | name                | type          | default |
/// |---------------------|---------------|---------|
/// | `n_estimators`      | int           | 10      |
/// | `max_depth`         | int or null   | null    |
/// | `min_samples_split` | int           | 2       |
/// | `max_features`      | int or null   | null    |
/// | `bootstrap`         | bool          | true    |
/// | `random_state`      | int           | 0       |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestClassifier {
    n_estimators: usize,
    max_depth: Option<usize>,
    min_samples_split: usize,
    max_features: Option<usize>,
    bootstrap: bool,
    random_state: u64,
    n_classes: usize,
    n_features: usize,
    trees: Vec<DecisionTree>,
}

impl Default for RandomForestClassifier {
    fn default() -> Self {
        Self {
            n_estimators: 10,
            max_depth: None,
            min_samples_split: 2,
            max_features: None,
            bootstrap: true,
            random_state: 0,
            n_classes: 0,
            n_features: 0,
            trees: Vec::new(),
        }
    }
}

impl RandomForestClassifier {
    /// Unfitted forest with default hyperparameters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of trees.
    #[must_use]
    pub const fn with_n_estimators(mut self, n: usize) -> Self {
        self.n_estimators = n;
        self
    }

    /// Set the maximum tree depth.
    #[must_use]
    pub const fn with_max_depth(mut self, depth: Option<usize>) -> Self {
        self.max_depth = depth;
        self
    }

    /// Set the RNG seed.
    #[must_use]
    pub const fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    /// Whether `fit` has been called successfully.
    #[must_use]
    pub fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }

    /// Fitted trees.
    #[must_use]
    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    /// Averaged class probabilities for one row.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Training`] if unfitted or the row width differs.
    #[allow(clippy::cast_precision_loss)]
    pub fn predict_proba_row(&self, row: &[f64]) -> Result<Vec<f64>> {
        if !self.is_fitted() {
            return Err(Error::Training("forest is not fitted".to_string()));
        }
        if row.len() != self.n_features {
            return Err(Error::Training(format!(
                "row has {} features, forest was fitted on {}",
                row.len(),
                self.n_features
            )));
        }

        let mut proba = vec![0.0; self.n_classes];
        for tree in &self.trees {
            for (acc, p) in proba.iter_mut().zip(tree.predict_proba_row(row)) {
                *acc += p;
            }
        }
        let n = self.trees.len() as f64;
        proba.iter_mut().for_each(|p| *p /= n);
        Ok(proba)
    }

    fn tree_config(&self) -> TreeConfig {
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let default_features = ((self.n_features as f64).sqrt().floor() as usize).max(1);
        TreeConfig {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            max_features: Some(self.max_features.unwrap_or(default_features)),
        }
    }
}

fn expect_usize(key: &str, value: &ParamValue) -> Result<usize> {
    value
        .as_optional_usize()?
        .ok_or_else(|| Error::InvalidConfig(format!("{key} cannot be null")))
}

impl Classifier for RandomForestClassifier {
    const NAME: &'static str = "RandomForestClassifier";

    fn set_params(&mut self, params: &ParamSet) -> Result<()> {
        for (key, value) in params.iter() {
            match key {
                "n_estimators" => {
                    let n = expect_usize(key, value)?;
                    if n == 0 {
                        return Err(Error::InvalidConfig("n_estimators must be positive".to_string()));
                    }
                    self.n_estimators = n;
                }
                "max_depth" => self.max_depth = value.as_optional_usize()?,
                "min_samples_split" => self.min_samples_split = expect_usize(key, value)?.max(2),
                "max_features" => self.max_features = value.as_optional_usize()?,
                "bootstrap" => match value {
                    ParamValue::Bool(b) => self.bootstrap = *b,
                    other => {
                        return Err(Error::InvalidConfig(format!("bootstrap expects bool, got {other}")))
                    }
                },
                "random_state" => self.random_state = expect_usize(key, value)? as u64,
                unknown => {
                    return Err(Error::InvalidConfig(format!(
                        "unknown {} parameter: {unknown}",
                        Self::NAME
                    )))
                }
            }
        }
        Ok(())
    }

    fn params(&self) -> ParamSet {
        ParamSet::new()
            .with("n_estimators", self.n_estimators)
            .with("max_depth", self.max_depth)
            .with("min_samples_split", self.min_samples_split)
            .with("max_features", self.max_features)
            .with("bootstrap", self.bootstrap)
            .with("random_state", i64::try_from(self.random_state).unwrap_or(i64::MAX))
    }

    fn fit(&mut self, features: &[Vec<f64>], labels: &[usize]) -> Result<()> {
        if features.is_empty() {
            return Err(Error::Training("cannot fit on an empty dataset".to_string()));
        }
        if features.len() != labels.len() {
            return Err(Error::Training(format!(
                "{} rows but {} labels",
                features.len(),
                labels.len()
            )));
        }
        let n_features = features[0].len();
        if features.iter().any(|row| row.len() != n_features) {
            return Err(Error::Training("ragged feature matrix".to_string()));
        }

        self.n_features = n_features;
        self.n_classes = labels.iter().max().map_or(0, |&m| m + 1);
        let config = self.tree_config();

        let mut rng = StdRng::seed_from_u64(self.random_state);
        let n = features.len();
        let all_rows: Vec<usize> = (0..n).collect();

        self.trees = (0..self.n_estimators)
            .map(|_| {
                let mut tree_rng = StdRng::seed_from_u64(rng.gen());
                let rows = if self.bootstrap {
                    (0..n).map(|_| tree_rng.gen_range(0..n)).collect()
                } else {
                    all_rows.clone()
                };
                DecisionTree::fit(features, labels, &rows, self.n_classes, config, &mut tree_rng)
            })
            .collect();
        Ok(())
    }

    fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<usize>> {
        features
            .iter()
            .map(|row| {
                let proba = self.predict_proba_row(row)?;
                let mut best = 0;
                for (class, p) in proba.iter().enumerate() {
                    if *p > proba[best] {
                        best = class;
                    }
                }
                Ok(best)
            })
            .collect()
    }
}

impl Blob for RandomForestClassifier {
    const KIND: BlobKind = BlobKind::Model;
    const FORMAT: &'static str = "random_forest";
}
