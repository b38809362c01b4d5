//! Pipeline configuration
//!
//! Every field has a default, so an empty JSON object (or no file at all)
//! yields a runnable configuration. `{run_id}` in file names is replaced
//! with the run's id.
//!
//! ```json
//! {
//!   "dataset": { "n_samples": 1000, "n_features": 4, "seed": 0 },
//!   "search": { "n_estimators": [10, 40], "max_depth": [5, 10, 20, null], "cv_folds": 3 },
//!   "output_dir": "runs",
//!   "compression": "zstd"
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::archive::Compression;
use crate::experiment::RunId;
use crate::ml::{DatasetConfig, ParamGrid};
use crate::{Error, Result};

/// Placeholder substituted with the run id in file names.
pub const RUN_ID_PLACEHOLDER: &str = "{run_id}";

/// Grid-search settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Tree counts to try.
    pub n_estimators: Vec<usize>,
    /// Depth limits to try; `null` means unbounded.
    pub max_depth: Vec<Option<usize>>,
    /// Cross-validation folds.
    pub cv_folds: usize,
    /// Seed for every forest in the search.
    pub random_state: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            n_estimators: vec![10, 40],
            max_depth: vec![Some(5), Some(10), Some(20), None],
            cv_folds: 3,
            random_state: 0,
        }
    }
}

impl SearchConfig {
    /// Grid over `n_estimators` x `max_depth`.
    #[must_use]
    pub fn grid(&self) -> ParamGrid {
        ParamGrid::new()
            .with("n_estimators", self.n_estimators.iter().copied())
            .with("max_depth", self.max_depth.iter().copied())
    }
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Synthetic dataset parameters.
    pub dataset: DatasetConfig,
    /// Grid-search parameters.
    pub search: SearchConfig,
    /// Fraction of rows held out from the search for a final check.
    pub test_fraction: f64,
    /// Seed for the train/test split.
    pub split_seed: u64,
    /// Directory receiving the database and archive.
    pub output_dir: PathBuf,
    /// Database file name (may contain `{run_id}`).
    pub database_file: String,
    /// Archive file name (may contain `{run_id}`).
    pub archive_file: String,
    /// Archive codec.
    pub compression: Compression,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dataset: DatasetConfig::default(),
            search: SearchConfig::default(),
            test_fraction: 0.2,
            split_seed: 42,
            output_dir: PathBuf::from("runs"),
            database_file: format!("run_{RUN_ID_PLACEHOLDER}.db"),
            archive_file: format!("run_{RUN_ID_PLACEHOLDER}.db.rvz"),
            compression: Compression::default(),
        }
    }
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty() && Path::new(name).file_name().is_some_and(|f| f == name)
}

impl PipelineConfig {
    /// Parse from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] on malformed JSON or failed validation.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::InvalidConfig(format!("malformed config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if unreadable, otherwise as [`PipelineConfig::from_json_str`].
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Load `path` if it exists, defaults otherwise.
    ///
    /// # Errors
    ///
    /// As [`PipelineConfig::from_json_file`] when the file exists.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            debug!(path = %path.display(), "loading config");
            Self::from_json_file(path)
        } else {
            debug!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Check every setting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] describing the first bad setting.
    pub fn validate(&self) -> Result<()> {
        self.dataset.validate()?;

        if self.search.n_estimators.is_empty() || self.search.max_depth.is_empty() {
            return Err(Error::InvalidConfig(
                "search.n_estimators and search.max_depth must be non-empty".to_string(),
            ));
        }
        if self.search.n_estimators.contains(&0) {
            return Err(Error::InvalidConfig("search.n_estimators must be positive".to_string()));
        }
        if self.search.cv_folds < 2 {
            return Err(Error::InvalidConfig("search.cv_folds must be at least 2".to_string()));
        }
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(Error::InvalidConfig(format!(
                "test_fraction must be in (0, 1), got {}",
                self.test_fraction
            )));
        }
        for (field, name) in [("database_file", &self.database_file), ("archive_file", &self.archive_file)]
        {
            if !is_plain_file_name(name) {
                return Err(Error::InvalidConfig(format!(
                    "{field} must be a plain file name, got {name:?}"
                )));
            }
        }
        if self.database_file == self.archive_file {
            return Err(Error::InvalidConfig(
                "database_file and archive_file must differ".to_string(),
            ));
        }
        Ok(())
    }

    /// Database path for `run_id`.
    #[must_use]
    pub fn database_path(&self, run_id: RunId) -> PathBuf {
        self.output_dir.join(self.database_file.replace(RUN_ID_PLACEHOLDER, &run_id.to_string()))
    }

    /// Archive path for `run_id`.
    #[must_use]
    pub fn archive_path(&self, run_id: RunId) -> PathBuf {
        self.output_dir.join(self.archive_file.replace(RUN_ID_PLACEHOLDER, &run_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_grid_has_eight_candidates() {
        assert_eq!(SearchConfig::default().grid().len(), 8);
    }

    #[test]
    fn test_empty_json_is_default() {
        assert_eq!(PipelineConfig::from_json_str("{}").unwrap(), PipelineConfig::default());
    }

    #[test]
    fn test_partial_json_overrides() {
        let config = PipelineConfig::from_json_str(
            r#"{"search": {"max_depth": [3, null]}, "compression": "lz4", "output_dir": "/tmp/x"}"#,
        )
        .unwrap();
        assert_eq!(config.search.max_depth, vec![Some(3), None]);
        assert_eq!(config.search.n_estimators, vec![10, 40]);
        assert_eq!(config.compression, Compression::Lz4);
        assert_eq!(config.output_dir, PathBuf::from("/tmp/x"));
    }

    #[test]
    fn test_paths_substitute_run_id() {
        let config = PipelineConfig::default();
        let run_id = RunId::new(201_905_101_901);
        assert_eq!(config.database_path(run_id), PathBuf::from("runs/run_201905101901.db"));
        assert_eq!(config.archive_path(run_id), PathBuf::from("runs/run_201905101901.db.rvz"));
    }

    #[test]
    fn test_rejects_nested_file_name() {
        let config = PipelineConfig { database_file: "a/b.db".to_string(), ..Default::default() };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_bad_folds() {
        let mut config = PipelineConfig::default();
        config.search.cv_folds = 1;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(PipelineConfig::from_json_str("{"), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_load_missing_file_defaults() {
        let config = PipelineConfig::load_or_default(Path::new("/nonexistent/runvault.json")).unwrap();
        assert_eq!(config, PipelineConfig::default());
    }
}
