// Typed pipeline errors.
//
// The application boundary (CLI, config, model files) works in anyhow, like
// the rest of the crate. Inside the pipeline, failures need to be matched on:
// some skip a single review, some mark a day as unavailable, and some are
// merely reported next to an otherwise complete result.

use chrono::NaiveDate;
use serde::Serialize;

/// Why a review's text could not be turned into tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnprocessableReason {
    /// Nothing left after trimming whitespace
    Empty,
    /// No alphabetic characters at all (emoji-only, punctuation, digits)
    NonLinguistic,
    /// Alphabetic content is mostly outside the Latin script
    UnsupportedLanguage,
    /// Only stop words, boilerplate or single characters remained
    NoContentTokens,
}

impl std::fmt::Display for UnprocessableReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UnprocessableReason::Empty => "empty text",
            UnprocessableReason::NonLinguistic => "no linguistic content",
            UnprocessableReason::UnsupportedLanguage => "unsupported language",
            UnprocessableReason::NoContentTokens => "no content tokens",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineError {
    #[error("review {review_id} skipped: {reason}")]
    UnprocessableText {
        review_id: String,
        reason: UnprocessableReason,
    },

    #[error("window of {days} days is too short for 7-day trend deltas (need at least 14)")]
    InsufficientWindow { days: u32 },

    #[error("no processable reviews in the analysis window")]
    EmptyInputBatch,

    #[error("review ingestion failed: {reason}")]
    IngestionFailure { reason: String },

    #[error("no data for {start} to {end}: {reason}")]
    MissingRange {
        start: NaiveDate,
        end: NaiveDate,
        reason: String,
    },

    #[error("batch for {date} discarded: {reason}")]
    CorruptBatch { date: NaiveDate, reason: String },

    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("invalid analysis window: {reason}")]
    InvalidWindow { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_mentions_review_id() {
        let err = PipelineError::UnprocessableText {
            review_id: "r-42".to_string(),
            reason: UnprocessableReason::NonLinguistic,
        };
        assert_eq!(err.to_string(), "review r-42 skipped: no linguistic content");
    }

    #[test]
    fn test_serializes_with_kind_tag() {
        let err = PipelineError::InsufficientWindow { days: 7 };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "insufficient_window");
        assert_eq!(json["days"], 7);
    }
}
