//! Run Summary - plain metadata of a completed training run

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::RunId;
use crate::{Error, Result};

/// Run Summary holds the text/numeric metadata of one training run.
///
/// Created once when a run completes and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunSummary {
    run_id: RunId,
    model_name: String,
    model_type: String,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
}

impl RunSummary {
    /// Create a run summary.
    ///
    /// # Arguments
    ///
    /// * `run_id` - Primary key of the run
    /// * `model_name` - Short model name (e.g. "RandomForestClassifier")
    /// * `model_type` - Fully qualified model type path
    /// * `started_at` / `finished_at` - Bounds of the training session
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRecord`] if `started_at > finished_at`.
    pub fn new(
        run_id: RunId,
        model_name: impl Into<String>,
        model_type: impl Into<String>,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Result<Self> {
        if started_at > finished_at {
            return Err(Error::InvalidRecord(format!(
                "run {run_id} finished ({finished_at}) before it started ({started_at})"
            )));
        }
        Ok(Self {
            run_id,
            model_name: model_name.into(),
            model_type: model_type.into(),
            started_at,
            finished_at,
        })
    }

    /// Get the run ID.
    #[must_use]
    pub const fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Get the short model name.
    #[must_use]
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Get the fully qualified model type.
    #[must_use]
    pub fn model_type(&self) -> &str {
        &self.model_type
    }

    /// Get the start timestamp.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Get the finish timestamp.
    #[must_use]
    pub const fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }

    /// Wall-clock duration of the run.
    #[must_use]
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_run_summary_new() {
        let start = Utc.with_ymd_and_hms(2019, 5, 10, 19, 1, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2019, 5, 10, 19, 3, 30).unwrap();
        let summary =
            RunSummary::new(RunId::new(201_905_101_901), "RandomForestClassifier", "x::Rf", start, end)
                .unwrap();
        assert_eq!(summary.run_id().get(), 201_905_101_901);
        assert_eq!(summary.model_name(), "RandomForestClassifier");
        assert_eq!(summary.duration().num_seconds(), 150);
    }

    #[test]
    fn test_run_summary_rejects_inverted_bounds() {
        let start = Utc.with_ymd_and_hms(2019, 5, 10, 19, 1, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2019, 5, 10, 19, 0, 0).unwrap();
        let err = RunSummary::new(RunId::new(1), "m", "t", start, end).unwrap_err();
        assert!(matches!(err, Error::InvalidRecord(_)));
    }

    #[test]
    fn test_zero_length_run_is_valid() {
        let at = Utc.with_ymd_and_hms(2019, 5, 10, 19, 1, 0).unwrap();
        assert!(RunSummary::new(RunId::new(1), "m", "t", at, at).is_ok());
    }
}
