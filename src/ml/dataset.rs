//! Synthetic classification datasets

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Parameters for [`make_classification`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Number of rows.
    pub n_samples: usize,
    /// Total feature columns.
    pub n_features: usize,
    /// Columns that carry class signal; the rest are noise.
    pub n_informative: usize,
    /// Number of classes.
    pub n_classes: usize,
    /// Distance of class centroids from the origin along each informative axis.
    pub class_sep: f64,
    /// Fraction of labels replaced with a random class.
    pub flip_y: f64,
    /// RNG seed.
    pub seed: u64,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            n_samples: 1000,
            n_features: 4,
            n_informative: 2,
            n_classes: 2,
            class_sep: 1.0,
            flip_y: 0.01,
            seed: 0,
        }
    }
}

impl DatasetConfig {
    /// Check parameter ranges.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] describing the first bad parameter.
    pub fn validate(&self) -> Result<()> {
        if self.n_classes < 2 {
            return Err(Error::InvalidConfig("n_classes must be at least 2".to_string()));
        }
        if self.n_samples < self.n_classes {
            return Err(Error::InvalidConfig(format!(
                "n_samples ({}) must be at least n_classes ({})",
                self.n_samples, self.n_classes
            )));
        }
        if self.n_informative == 0 || self.n_informative > self.n_features {
            return Err(Error::InvalidConfig(format!(
                "n_informative ({}) must be in 1..={}",
                self.n_informative, self.n_features
            )));
        }
        let vertices = 1_usize.checked_shl(u32::try_from(self.n_informative).unwrap_or(u32::MAX));
        if vertices.is_some_and(|v| self.n_classes > v) {
            return Err(Error::InvalidConfig(format!(
                "n_classes ({}) exceeds 2^n_informative ({})",
                self.n_classes, self.n_informative
            )));
        }
        if !(self.class_sep > 0.0 && self.class_sep.is_finite()) {
            return Err(Error::InvalidConfig("class_sep must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&self.flip_y) {
            return Err(Error::InvalidConfig("flip_y must be in [0, 1]".to_string()));
        }
        Ok(())
    }
}

/// Labelled feature matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    features: Vec<Vec<f64>>,
    labels: Vec<usize>,
    n_classes: usize,
}

impl Dataset {
    /// Wrap a feature matrix and labels.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Training`] if lengths differ, rows are ragged, or a
    /// label is out of range.
    pub fn new(features: Vec<Vec<f64>>, labels: Vec<usize>, n_classes: usize) -> Result<Self> {
        if features.len() != labels.len() {
            return Err(Error::Training(format!(
                "{} rows but {} labels",
                features.len(),
                labels.len()
            )));
        }
        if let Some(width) = features.first().map(Vec::len) {
            if features.iter().any(|row| row.len() != width) {
                return Err(Error::Training("ragged feature matrix".to_string()));
            }
        }
        if let Some(bad) = labels.iter().find(|&&l| l >= n_classes) {
            return Err(Error::Training(format!("label {bad} out of range for {n_classes} classes")));
        }
        Ok(Self { features, labels, n_classes })
    }

    /// Feature rows.
    #[must_use]
    pub fn features(&self) -> &[Vec<f64>] {
        &self.features
    }

    /// Class labels.
    #[must_use]
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Number of classes.
    #[must_use]
    pub const fn n_classes(&self) -> usize {
        self.n_classes
    }

    /// Number of feature columns.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.features.first().map_or(0, Vec::len)
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether there are no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Rows at `indices`, in that order.
    #[must_use]
    pub fn subset(&self, indices: &[usize]) -> Self {
        Self {
            features: indices.iter().map(|&i| self.features[i].clone()).collect(),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
            n_classes: self.n_classes,
        }
    }

    /// Shuffle and split into `(train, test)`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] unless `0 < test_fraction < 1` and
    /// both parts end up non-empty.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn train_test_split(&self, test_fraction: f64, seed: u64) -> Result<(Self, Self)> {
        if !(test_fraction > 0.0 && test_fraction < 1.0) {
            return Err(Error::InvalidConfig(format!(
                "test_fraction must be in (0, 1), got {test_fraction}"
            )));
        }
        if self.len() < 2 {
            return Err(Error::InvalidConfig("need at least 2 rows to split".to_string()));
        }

        let mut indices: Vec<usize> = (0..self.len()).collect();
        indices.shuffle(&mut StdRng::seed_from_u64(seed));

        let n_test = ((self.len() as f64) * test_fraction).round() as usize;
        let n_test = n_test.clamp(1, self.len() - 1);
        let (test, train) = indices.split_at(n_test);
        Ok((self.subset(train), self.subset(test)))
    }
}

/// Standard normal sample (Box-Muller).
fn gaussian(rng: &mut StdRng) -> f64 {
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

/// Generate a seeded classification problem.
///
/// Each class is a Gaussian cluster centred on a distinct vertex of a
/// hypercube with side `2 * class_sep` in the informative columns; the
/// remaining columns are pure noise. Classes are balanced before label
/// flipping, and rows are shuffled.
///
/// # Errors
///
/// Returns [`Error::InvalidConfig`] if `config` fails validation.
pub fn make_classification(config: &DatasetConfig) -> Result<Dataset> {
    config.validate()?;
    let mut rng = StdRng::seed_from_u64(config.seed);

    let centroids: Vec<Vec<f64>> = (0..config.n_classes)
        .map(|class| {
            (0..config.n_informative)
                .map(|axis| {
                    if (class >> axis) & 1 == 1 {
                        config.class_sep
                    } else {
                        -config.class_sep
                    }
                })
                .collect()
        })
        .collect();

    let mut rows = Vec::with_capacity(config.n_samples);
    for i in 0..config.n_samples {
        let class = i % config.n_classes;
        let mut row = Vec::with_capacity(config.n_features);
        for axis in 0..config.n_features {
            let centre = centroids[class].get(axis).copied().unwrap_or(0.0);
            row.push(centre + gaussian(&mut rng));
        }
        let label = if rng.gen::<f64>() < config.flip_y {
            rng.gen_range(0..config.n_classes)
        } else {
            class
        };
        rows.push((row, label));
    }
    rows.shuffle(&mut rng);

    let (features, labels) = rows.into_iter().unzip();
    Dataset::new(features, labels, config.n_classes)
}
