// Summary statistics over a trend matrix.
//
// Only available days take part: an outage day is not a zero, so it neither
// drags a topic's mean down nor inflates its volatility.

use rayon::prelude::*;
use serde::Serialize;

use super::matrix::{DayAvailability, TopicRow, TrendMatrix};
use crate::error::PipelineError;
use crate::topics::models::TopicId;

/// Days averaged at each end of the window for the trend delta.
pub const TREND_SPAN_DAYS: usize = 7;

/// Shortest window with two non-overlapping trend spans.
pub const MIN_TREND_WINDOW_DAYS: u32 = 14;

/// Topics listed in the summary when no explicit top-N is configured.
pub const DEFAULT_SUMMARY_TOPICS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicStats {
    pub topic_id: TopicId,
    pub label: String,
    pub total: u32,
    /// Population standard deviation of the daily counts
    pub volatility: f64,
    /// Mean of the last 7 days minus mean of the first 7; `None` when the
    /// window is too short or one end has no available days
    pub trend_delta: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendSummary {
    pub total_occurrences: u64,
    /// Stats for the top rows, in matrix order
    pub top_topics: Vec<TopicStats>,
    /// Stats for every row, in matrix order
    pub topic_stats: Vec<TopicStats>,
    /// Set when the window is too short for trend deltas
    pub trend_window_error: Option<PipelineError>,
}

/// Population standard deviation of `counts` over available days only.
pub fn volatility(counts: &[u32], availability: &[DayAvailability]) -> f64 {
    let values: Vec<f64> = available_values(counts, availability).collect();
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}

/// Mean of the last seven columns minus the mean of the first seven,
/// counting available days only.
///
/// Fails with `InsufficientWindow` exactly when the window has fewer than
/// 14 days. `Ok(None)` when either span has no available day.
pub fn trend_delta(
    counts: &[u32],
    availability: &[DayAvailability],
) -> Result<Option<f64>, PipelineError> {
    let days = counts.len();
    if days < MIN_TREND_WINDOW_DAYS as usize {
        return Err(PipelineError::InsufficientWindow { days: days as u32 });
    }

    let head = span_mean(&counts[..TREND_SPAN_DAYS], &availability[..TREND_SPAN_DAYS]);
    let tail = span_mean(
        &counts[days - TREND_SPAN_DAYS..],
        &availability[days - TREND_SPAN_DAYS..],
    );

    Ok(match (head, tail) {
        (Some(h), Some(t)) => Some(t - h),
        _ => None,
    })
}

/// Per-row statistics and the headline numbers. `top_k` defaults to
/// `DEFAULT_SUMMARY_TOPICS`.
pub fn summarize(matrix: &TrendMatrix, top_k: Option<usize>) -> TrendSummary {
    let days = matrix.dates.len() as u32;
    let trend_window_error =
        (days < MIN_TREND_WINDOW_DAYS).then_some(PipelineError::InsufficientWindow { days });

    let topic_stats: Vec<TopicStats> = matrix
        .rows
        .par_iter()
        .map(|row| row_stats(row, &matrix.availability))
        .collect();

    let k = top_k.unwrap_or(DEFAULT_SUMMARY_TOPICS);
    let top_topics = topic_stats.iter().take(k).cloned().collect();

    TrendSummary {
        total_occurrences: matrix.total_occurrences(),
        top_topics,
        topic_stats,
        trend_window_error,
    }
}

fn row_stats(row: &TopicRow, availability: &[DayAvailability]) -> TopicStats {
    TopicStats {
        topic_id: row.topic_id,
        label: row.label.clone(),
        total: row.total,
        volatility: volatility(&row.counts, availability),
        trend_delta: trend_delta(&row.counts, availability).ok().flatten(),
    }
}

fn available_values<'a>(
    counts: &'a [u32],
    availability: &'a [DayAvailability],
) -> impl Iterator<Item = f64> + 'a {
    counts
        .iter()
        .zip(availability)
        .filter(|(_, a)| a.is_available())
        .map(|(&c, _)| f64::from(c))
}

fn span_mean(counts: &[u32], availability: &[DayAvailability]) -> Option<f64> {
    let values: Vec<f64> = available_values(counts, availability).collect();
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}
