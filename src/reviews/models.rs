// Review data as it arrives from a review source.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A single app-store review. Immutable once ingested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRecord {
    /// Opaque identifier, unique within one app's reviews
    pub id: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// Star rating, 1 to 5, when the store exposes one
    #[serde(default)]
    pub rating: Option<u8>,
}

impl ReviewRecord {
    /// Calendar day this review counts towards, in the run's reporting offset.
    pub fn local_date(&self, offset: &FixedOffset) -> NaiveDate {
        self.timestamp.with_timezone(offset).date_naive()
    }

    pub fn has_valid_rating(&self) -> bool {
        self.rating.is_none_or(|r| (1..=5).contains(&r))
    }
}

/// A stretch of days the source could not deliver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub reason: String,
}

impl MissingRange {
    pub fn day(date: NaiveDate, reason: impl Into<String>) -> Self {
        Self {
            start: date,
            end: date,
            reason: reason.into(),
        }
    }

    pub fn covers(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Everything a source produced for one fetch: the reviews it could read,
/// plus the date ranges it knows it could not.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ingestion {
    pub reviews: Vec<ReviewRecord>,
    pub missing: Vec<MissingRange>,
}

impl Ingestion {
    pub fn complete(reviews: Vec<ReviewRecord>) -> Self {
        Self {
            reviews,
            missing: Vec::new(),
        }
    }
}
