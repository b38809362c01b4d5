//! Run ID - timestamp-derived primary key

use std::fmt;

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a training run.
///
/// Encodes the minute the run started as the integer `YYYYMMDDHHMM`
/// (e.g. `201905101901`), so ids sort in chronological order and fit
/// SQLite's integer primary key. Two runs starting within the same minute
/// collide; the store rejects the second one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(i64);

impl RunId {
    /// Wrap a raw id.
    #[must_use]
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// Derive the id from the minute of `started_at`.
    #[must_use]
    pub fn from_datetime(started_at: DateTime<Utc>) -> Self {
        let date = i64::from(started_at.year()) * 100_000_000
            + i64::from(started_at.month()) * 1_000_000
            + i64::from(started_at.day()) * 10_000;
        let time = i64::from(started_at.hour()) * 100 + i64::from(started_at.minute());
        Self(date + time)
    }

    /// Derive the id from the current wall-clock minute.
    #[must_use]
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Raw integer value as stored in the database.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for RunId {
    fn from(raw: i64) -> Self {
        Self(raw)
    }
}
