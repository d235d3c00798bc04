// Colored terminal output for trend reports.
//
// This module handles all terminal-specific formatting. The main.rs command
// handlers delegate here.

use colored::Colorize;

use super::csv::DateFormat;
use crate::error::PipelineError;
use crate::pipeline::run::TrendReport;
use crate::trends::matrix::TrendMatrix;
use crate::trends::stats::TopicStats;

/// Display the headline summary of a run.
pub fn display_report(report: &TrendReport) {
    let summary = &report.summary;

    println!(
        "\n{}",
        format!(
            "=== Topic Trends for {} ({}, {} days) ===",
            report.app_id,
            report.window,
            report.matrix.dates.len()
        )
        .bold()
    );
    println!(
        "  {} reviews analyzed, {} topics, {} occurrences (embedder: {})",
        report.reviews_analyzed,
        report.matrix.rows.len(),
        summary.total_occurrences,
        report.embedder.dimmed(),
    );

    if !report.skipped.is_empty() {
        println!(
            "  {} reviews skipped (empty, emoji-only, or unreadable text)",
            report.skipped.len().to_string().yellow()
        );
    }

    let unavailable = report.matrix.dates.len() - report.matrix.available_days();
    if unavailable > 0 {
        println!(
            "  {} {} days had no data and are shown as n/a",
            "!".yellow(),
            unavailable
        );
    }

    for warning in &report.warnings {
        if matches!(warning, PipelineError::EmptyInputBatch) {
            println!("\n  {}", "No processable reviews in this window.".yellow());
        }
    }

    if summary.top_topics.is_empty() {
        return;
    }

    println!("\n{}", "Top topics:".bold());
    println!(
        "  {:>4}  {:<36} {:>6}  {:>10}  {:>8}",
        "Rank".dimmed(),
        "Topic".dimmed(),
        "Total".dimmed(),
        "Volatility".dimmed(),
        "Trend".dimmed(),
    );
    println!("  {}", "-".repeat(72).dimmed());

    for (i, stats) in summary.top_topics.iter().enumerate() {
        println!(
            "  {:>4}. {:<36} {:>6}  {:>10.2}  {:>8}",
            i + 1,
            super::truncate_chars(&stats.label, 33),
            stats.total,
            stats.volatility,
            colorize_trend(stats),
        );
    }

    if let Some(ref e) = summary.trend_window_error {
        println!("\n  {} {}", "~".yellow(), e.to_string().dimmed());
    }
}

/// Print the matrix itself as an aligned table. Wide windows get long lines;
/// the CSV is the better format past a couple of weeks.
pub fn display_matrix(matrix: &TrendMatrix, format: DateFormat, limit: Option<usize>) {
    if matrix.is_empty() {
        println!("No topics to display.");
        return;
    }

    let rows = match limit {
        Some(n) => matrix.top(n),
        None => &matrix.rows[..],
    };
    let labels = matrix.row_labels();
    let width = labels
        .iter()
        .take(rows.len())
        .map(|l| l.chars().count())
        .max()
        .unwrap_or(5)
        .clamp(5, 40);

    let mut header = format!("  {:<width$}", "Topic");
    for name in format.headers(&matrix.dates) {
        header.push_str(&format!(" {:>7}", name));
    }
    println!("\n{}", header.dimmed());

    for (row_idx, label) in labels.iter().take(rows.len()).enumerate() {
        let mut line = format!("  {:<width$}", super::truncate_chars(label, width));
        for col in 0..matrix.dates.len() {
            let cell = match matrix.cell(row_idx, col) {
                Some(0) => format!(" {:>7}", "."),
                Some(n) => format!(" {:>7}", n),
                None => format!(" {:>7}", "n/a"),
            };
            line.push_str(&cell);
        }
        println!("{line}");
    }
    println!();
}

/// Rising complaints are the ones worth attention, so up is red.
fn colorize_trend(stats: &TopicStats) -> colored::ColoredString {
    match stats.trend_delta {
        Some(d) if d > 0.05 => format!("+{d:.2}").red(),
        Some(d) if d < -0.05 => format!("{d:.2}").green(),
        Some(d) => format!("{d:.2}").normal(),
        None => "-".dimmed(),
    }
}
