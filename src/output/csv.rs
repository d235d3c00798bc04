// CSV and JSON report files.
//
// The CSV is the shareable artifact: one row per topic, one column per day,
// `n/a` where the day's data was unavailable. The JSON report carries
// everything, including summary statistics and skipped reviews.

use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tracing::info;

use crate::pipeline::run::TrendReport;
use crate::trends::matrix::TrendMatrix;

/// Cell text for a day with no data.
pub const UNAVAILABLE_CELL: &str = "n/a";

/// How date columns are headed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateFormat {
    /// `2024-06-01`
    #[default]
    Iso,
    /// `Jun 01`, or `Jun 01 2024` when a window is long enough to repeat
    /// a month and day
    Short,
}

impl DateFormat {
    pub fn render(&self, date: NaiveDate) -> String {
        match self {
            DateFormat::Iso => date.format("%Y-%m-%d").to_string(),
            DateFormat::Short => date.format("%b %d").to_string(),
        }
    }

    /// Column headers for `dates`, guaranteed distinct.
    pub fn headers(&self, dates: &[NaiveDate]) -> Vec<String> {
        let rendered: Vec<String> = dates.iter().map(|d| self.render(*d)).collect();
        let distinct: BTreeSet<&String> = rendered.iter().collect();
        if distinct.len() == rendered.len() {
            return rendered;
        }
        dates
            .iter()
            .map(|d| d.format("%b %d %Y").to_string())
            .collect()
    }
}

/// `<output_dir>/trend_report_<YYYYMMDD>.csv`
pub fn default_report_path(output_dir: &Path, date: NaiveDate) -> PathBuf {
    output_dir.join(format!("trend_report_{}.csv", date.format("%Y%m%d")))
}

/// Write the matrix as CSV to any writer.
pub fn write_matrix<W: Write>(matrix: &TrendMatrix, format: DateFormat, out: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);

    let mut header = Vec::with_capacity(matrix.dates.len() + 1);
    header.push("topic".to_string());
    header.extend(format.headers(&matrix.dates));
    writer
        .write_record(&header)
        .context("Failed to write CSV header")?;

    for (row_idx, label) in matrix.row_labels().into_iter().enumerate() {
        let mut record = Vec::with_capacity(matrix.dates.len() + 1);
        record.push(label);
        for col in 0..matrix.dates.len() {
            record.push(match matrix.cell(row_idx, col) {
                Some(count) => count.to_string(),
                None => UNAVAILABLE_CELL.to_string(),
            });
        }
        writer
            .write_record(&record)
            .context("Failed to write CSV row")?;
    }

    writer.flush().context("Failed to flush CSV output")?;
    Ok(())
}

/// Write the matrix to `path`, creating parent directories as needed.
pub fn write_matrix_csv(matrix: &TrendMatrix, path: &Path, format: DateFormat) -> Result<()> {
    create_parent(path)?;
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    write_matrix(matrix, format, file)?;

    info!(
        path = %path.display(),
        topics = matrix.rows.len(),
        days = matrix.dates.len(),
        "Wrote trend report CSV"
    );
    Ok(())
}

/// Write the full report as pretty-printed JSON.
pub fn write_report_json(report: &TrendReport, path: &Path) -> Result<()> {
    create_parent(path)?;
    let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;

    info!(path = %path.display(), "Wrote JSON report");
    Ok(())
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::topics::models::{TopicId, TopicKind};
    use crate::trends::matrix::{DayAvailability, TopicRow};
    use crate::trends::window::AnalysisWindow;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    fn matrix() -> TrendMatrix {
        let window = AnalysisWindow::new(day(1), day(3)).unwrap();
        TrendMatrix {
            window,
            dates: window.dates(),
            availability: vec![
                DayAvailability::Available,
                DayAvailability::Missing {
                    reason: "outage".to_string(),
                },
                DayAvailability::Available,
            ],
            rows: vec![
                TopicRow {
                    topic_id: TopicId(0),
                    kind: TopicKind::Named,
                    label: "delivery late".to_string(),
                    counts: vec![2, 0, 1],
                    total: 3,
                },
                TopicRow {
                    topic_id: TopicId(1),
                    kind: TopicKind::Named,
                    label: "app crash, again".to_string(),
                    counts: vec![0, 0, 1],
                    total: 1,
                },
            ],
        }
    }

    fn render(format: DateFormat) -> String {
        let mut buf = Vec::new();
        write_matrix(&matrix(), format, &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_iso_output() {
        let out = render(DateFormat::Iso);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "topic,2024-06-01,2024-06-02,2024-06-03");
        assert_eq!(lines[1], "delivery late,2,n/a,1");
        // Labels containing commas are quoted
        assert_eq!(lines[2], "\"app crash, again\",0,n/a,1");
    }

    #[test]
    fn test_short_dates() {
        let out = render(DateFormat::Short);
        assert!(out.starts_with("topic,Jun 01,Jun 02,Jun 03\n"));
    }

    #[test]
    fn test_short_dates_add_year_past_a_year() {
        let year_before = NaiveDate::from_ymd_opt(2023, 6, 1).unwrap();
        let window = AnalysisWindow::ending_on(day(30), 400).unwrap();
        let headers = DateFormat::Short.headers(&window.dates());

        let distinct: BTreeSet<&String> = headers.iter().collect();
        assert_eq!(distinct.len(), headers.len());
        assert!(headers.contains(&year_before.format("%b %d %Y").to_string()));
        assert!(headers.contains(&"Jun 01 2024".to_string()));

        // Short windows keep the compact form
        let short = DateFormat::Short.headers(&[day(1), day(2)]);
        assert_eq!(short, vec!["Jun 01", "Jun 02"]);
    }

    #[test]
    fn test_empty_matrix_still_has_columns() {
        let window = AnalysisWindow::new(day(1), day(2)).unwrap();
        let empty = TrendMatrix {
            window,
            dates: window.dates(),
            availability: vec![DayAvailability::Available; 2],
            rows: Vec::new(),
        };
        let mut buf = Vec::new();
        write_matrix(&empty, DateFormat::Iso, &mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "topic,2024-06-01,2024-06-02\n");
    }

    #[test]
    fn test_default_report_path() {
        let path = default_report_path(Path::new("outputs"), day(9));
        assert_eq!(path, PathBuf::from("outputs/trend_report_20240609.csv"));
    }

    #[test]
    fn test_write_matrix_csv_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("report.csv");
        write_matrix_csv(&matrix(), &path, DateFormat::Iso).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written.lines().count(), 3);
    }
}
