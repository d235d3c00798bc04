// Analysis window: the inclusive range of calendar days a report covers.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Inclusive `[start, end]` range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl AnalysisWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, PipelineError> {
        if start > end {
            return Err(PipelineError::InvalidWindow {
                reason: format!("{start} is after {end}"),
            });
        }
        Ok(Self { start, end })
    }

    /// The trailing window of `days` days that ends on (and includes) `end`.
    pub fn ending_on(end: NaiveDate, days: u32) -> Result<Self, PipelineError> {
        let days = days.max(1);
        let start = end
            .checked_sub_days(Days::new(u64::from(days) - 1))
            .ok_or_else(|| PipelineError::InvalidWindow {
                reason: format!("{days} days before {end} is out of the calendar range"),
            })?;
        Self::new(start, end)
    }

    /// Number of days in the window, counting both ends.
    pub fn days(&self) -> u32 {
        ((self.end - self.start).num_days() + 1) as u32
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Every date of the window, ascending, without gaps.
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.start
            .iter_days()
            .take_while(|d| *d <= self.end)
            .collect()
    }

    /// Column index of `date`, if it falls inside the window.
    pub fn index_of(&self, date: NaiveDate) -> Option<usize> {
        self.contains(date)
            .then(|| (date - self.start).num_days() as usize)
    }
}

impl std::fmt::Display for AnalysisWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}
