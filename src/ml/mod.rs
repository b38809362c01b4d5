//! Model training for a run
//!
//! - [`dataset`]: seeded synthetic classification data
//! - [`tree`] / [`forest`]: CART trees and a bagged random forest
//! - [`grid_search`]: exhaustive hyperparameter search with stratified k-fold CV
//!
//! Everything is deterministic for a fixed seed, so a decoded model can be
//! checked against the original prediction by prediction.

pub mod dataset;
pub mod forest;
pub mod grid_search;
pub mod tree;

pub use dataset::{make_classification, Dataset, DatasetConfig};
pub use forest::RandomForestClassifier;
pub use grid_search::{CvResults, GridSearch, ParamGrid, SearchOutcome};

use crate::codec::Blob;
use crate::experiment::ParamSet;
use crate::Result;

/// A trainable classifier that can be stored as a model blob.
pub trait Classifier: Clone + Blob {
    /// Short class name recorded as `model_name`.
    const NAME: &'static str;

    /// Fully qualified type recorded as `model_type`.
    #[must_use]
    fn model_type() -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Apply hyperparameters; unknown names are rejected.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidConfig`] for unknown names or bad values.
    fn set_params(&mut self, params: &ParamSet) -> Result<()>;

    /// Current hyperparameters.
    fn params(&self) -> ParamSet;

    /// Fit on a feature matrix and class labels.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Training`] on empty or inconsistent input.
    fn fit(&mut self, features: &[Vec<f64>], labels: &[usize]) -> Result<()>;

    /// Predict a class per row.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Training`] if unfitted or the row width differs.
    fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<usize>>;

    /// Fraction of rows predicted correctly.
    ///
    /// # Errors
    ///
    /// Propagates [`Classifier::predict`] errors.
    fn score(&self, features: &[Vec<f64>], labels: &[usize]) -> Result<f64> {
        Ok(accuracy(&self.predict(features)?, labels))
    }
}

/// Fraction of equal entries; zero for empty input.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn accuracy(predicted: &[usize], truth: &[usize]) -> f64 {
    let n = predicted.len().min(truth.len());
    if n == 0 {
        return 0.0;
    }
    let correct = predicted.iter().zip(truth).filter(|(p, t)| p == t).count();
    correct as f64 / n as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accuracy() {
        assert!((accuracy(&[1, 0, 1, 1], &[1, 1, 1, 0]) - 0.5).abs() < f64::EPSILON);
        assert!(accuracy(&[], &[]).abs() < f64::EPSILON);
    }
}
