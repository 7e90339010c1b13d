//! Time log records and their ordering projection.

use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{LogId, TaskId, ValidationError};

/// One logged session of work on a task, covering `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeLogRecord {
    /// Caller-supplied unique identifier.
    pub id: LogId,
    /// The task this time was spent on.
    pub task: TaskId,
    /// Free-form note.
    #[serde(default)]
    pub comment: String,
    /// Inclusive start. Acts as the sort key once committed.
    pub start: DateTime<Utc>,
    /// Exclusive end.
    pub end: DateTime<Utc>,
}

impl TimeLogRecord {
    /// Creates a record with an empty comment.
    ///
    /// Returns an error if `end` is before `start`. Zero-length records are allowed.
    pub fn new(
        id: LogId,
        task: TaskId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        let record = Self {
            id,
            task,
            comment: String::new(),
            start,
            end,
        };
        record.validate()?;
        Ok(record)
    }

    /// Replaces the comment.
    #[must_use]
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    /// Checks that the interval is not inverted.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.end < self.start {
            return Err(ValidationError::InvertedInterval {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }

    /// Truncates both instants to millisecond precision, the unit records are stored in.
    #[must_use]
    pub fn at_storage_precision(mut self) -> Self {
        self.start = self.start.trunc_subsecs(3);
        self.end = self.end.trunc_subsecs(3);
        self
    }

    /// Returns the ordering projection of this record.
    pub fn meta(&self) -> IntervalMeta {
        IntervalMeta {
            id: self.id.clone(),
            start: self.start,
            end: self.end,
        }
    }

    /// Length of the interval.
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

/// Lightweight `{id, start, end}` projection kept in the ordered sequence.
///
/// The interval data is duplicated from the full record so that ordering
/// comparisons never have to load the record itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalMeta {
    pub id: LogId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl IntervalMeta {
    /// Whether two half-open intervals share any instant.
    pub fn overlaps(&self, other: &Self) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Milliseconds since the Unix epoch.
pub fn to_millis(instant: DateTime<Utc>) -> i64 {
    instant.timestamp_millis()
}

/// Inverse of [`to_millis`]. Returns `None` for out-of-range values.
pub fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
}
