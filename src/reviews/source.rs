// Review sources: the boundary between the pipeline and wherever reviews live.
//
// Like the embedder trait, this lets the analysis run against any backing
// store without changing the pipeline. The shipped implementations read
// exported review dumps from disk; a live store scraper would implement the
// same trait.
//
// Sources filter loosely (one day of slack on each side, in UTC) because the
// pipeline buckets timestamps in the run's reporting offset, which can move a
// review across midnight.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::models::{Ingestion, MissingRange, ReviewRecord};
use crate::error::PipelineError;
use crate::trends::window::AnalysisWindow;

/// Trait for fetching the reviews of one app over a date window.
///
/// Implementations should fail fast with `IngestionFailure` when nothing can
/// be read at all, and report partially unavailable data through
/// `Ingestion::missing` instead of failing.
#[async_trait]
pub trait ReviewSource: Send + Sync {
    async fn fetch(&self, app_id: &str, window: &AnalysisWindow)
        -> Result<Ingestion, PipelineError>;
}

/// Accepted shapes of a review JSON file: a bare array of reviews, or an
/// object that also names the app and any gaps the exporter knew about.
///
/// Records stay raw here so one malformed review does not reject the file.
#[derive(Deserialize)]
#[serde(untagged)]
enum ReviewFile {
    Bare(Vec<Value>),
    Wrapped {
        #[serde(default)]
        app_id: Option<String>,
        reviews: Vec<Value>,
        #[serde(default)]
        missing: Vec<MissingRange>,
    },
}

impl ReviewFile {
    fn into_parts(self, app_id: &str, origin: &Path) -> (Vec<ReviewRecord>, Vec<MissingRange>) {
        let (records, missing) = match self {
            ReviewFile::Bare(records) => (records, Vec::new()),
            ReviewFile::Wrapped {
                app_id: file_app,
                reviews,
                missing,
            } => {
                if let Some(file_app) = file_app.filter(|a| a != app_id) {
                    warn!(
                        file = %origin.display(),
                        file_app = %file_app,
                        requested = %app_id,
                        "Review file is for a different app"
                    );
                }
                (reviews, missing)
            }
        };
        (parse_records(records, origin), missing)
    }
}

/// Convert raw JSON records one by one, skipping the ones that do not parse.
fn parse_records(records: Vec<Value>, origin: &Path) -> Vec<ReviewRecord> {
    let mut reviews = Vec::with_capacity(records.len());
    let mut bad_records = 0usize;

    for (index, record) in records.into_iter().enumerate() {
        match serde_json::from_value::<ReviewRecord>(record) {
            Ok(review) => reviews.push(review),
            Err(e) => {
                debug!(index, error = %e, "Skipping malformed review record");
                bad_records += 1;
            }
        }
    }

    if bad_records > 0 {
        warn!(
            bad_records,
            file = %origin.display(),
            "Skipped malformed records in review file"
        );
    }
    reviews
}

/// Reads every review from a single JSON file.
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ReviewSource for JsonFileSource {
    async fn fetch(
        &self,
        app_id: &str,
        window: &AnalysisWindow,
    ) -> Result<Ingestion, PipelineError> {
        let raw = read_file(&self.path).await?;
        let file: ReviewFile = serde_json::from_str(&raw).map_err(|e| {
            PipelineError::IngestionFailure {
                reason: format!("{} is not a review file: {e}", self.path.display()),
            }
        })?;

        let (reviews, missing) = file.into_parts(app_id, &self.path);
        let reviews = within_slack(reviews, window);

        info!(
            count = reviews.len(),
            missing_ranges = missing.len(),
            file = %self.path.display(),
            "Loaded reviews from JSON"
        );

        Ok(Ingestion { reviews, missing })
    }
}

/// Reads reviews from a CSV export with `id,text,timestamp,rating` columns.
pub struct CsvFileSource {
    path: PathBuf,
}

impl CsvFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ReviewSource for CsvFileSource {
    async fn fetch(
        &self,
        _app_id: &str,
        window: &AnalysisWindow,
    ) -> Result<Ingestion, PipelineError> {
        #[derive(Deserialize)]
        struct CsvRow {
            id: String,
            text: String,
            timestamp: DateTime<Utc>,
            rating: Option<u8>,
        }

        let raw = read_file(&self.path).await?;
        let mut reader = csv::Reader::from_reader(raw.as_bytes());
        let mut reviews = Vec::new();
        let mut bad_rows = 0usize;

        for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
            match result {
                Ok(row) => reviews.push(ReviewRecord {
                    id: row.id,
                    text: row.text,
                    timestamp: row.timestamp,
                    rating: row.rating,
                }),
                Err(e) => {
                    // Header is line 1, so the first record is line 2
                    debug!(line = line + 2, error = %e, "Skipping malformed CSV row");
                    bad_rows += 1;
                }
            }
        }

        if bad_rows > 0 {
            warn!(
                bad_rows,
                file = %self.path.display(),
                "Skipped malformed rows in review CSV"
            );
        }

        let reviews = within_slack(reviews, window);
        info!(
            count = reviews.len(),
            file = %self.path.display(),
            "Loaded reviews from CSV"
        );

        Ok(Ingestion::complete(reviews))
    }
}

/// Reads one `YYYY-MM-DD.json` file per day from a directory.
///
/// This is the shape a daily scraper produces. A day whose file is absent or
/// unreadable is reported as missing, so the rest of the window still gets
/// analyzed.
pub struct DailyFileSource {
    dir: PathBuf,
}

impl DailyFileSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn day_path(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("{}.json", date.format("%Y-%m-%d")))
    }
}

#[async_trait]
impl ReviewSource for DailyFileSource {
    async fn fetch(
        &self,
        app_id: &str,
        window: &AnalysisWindow,
    ) -> Result<Ingestion, PipelineError> {
        if !self.dir.is_dir() {
            return Err(PipelineError::IngestionFailure {
                reason: format!("review directory not found: {}", self.dir.display()),
            });
        }

        let mut reviews = Vec::new();
        let mut missing_days: Vec<(NaiveDate, String)> = Vec::new();
        let mut missing = Vec::new();

        for date in window.dates() {
            let path = self.day_path(date);
            if !path.exists() {
                missing_days.push((date, "no review file".to_string()));
                continue;
            }

            let parsed = read_file(&path).await.and_then(|raw| {
                serde_json::from_str::<ReviewFile>(&raw).map_err(|e| {
                    PipelineError::IngestionFailure {
                        reason: e.to_string(),
                    }
                })
            });

            match parsed {
                Ok(file) => {
                    let (day_reviews, day_missing) = file.into_parts(app_id, &path);
                    debug!(%date, count = day_reviews.len(), "Loaded day file");
                    reviews.extend(day_reviews);
                    missing.extend(day_missing);
                }
                Err(e) => {
                    warn!(%date, error = %e, "Unreadable day file, marking day as missing");
                    missing_days.push((date, "unreadable review file".to_string()));
                }
            }
        }

        missing.extend(coalesce_missing(&missing_days));

        let reviews = within_slack(reviews, window);
        info!(
            count = reviews.len(),
            missing_days = missing_days.len(),
            dir = %self.dir.display(),
            "Loaded reviews from daily files"
        );

        Ok(Ingestion { reviews, missing })
    }
}

/// Merge consecutive missing days that share a reason into ranges.
pub fn coalesce_missing(days: &[(NaiveDate, String)]) -> Vec<MissingRange> {
    let mut sorted: Vec<&(NaiveDate, String)> = days.iter().collect();
    sorted.sort();

    let mut ranges: Vec<MissingRange> = Vec::new();
    for (date, reason) in sorted {
        match ranges.last_mut() {
            Some(last) if last.reason == *reason && last.end.succ_opt() == Some(*date) => {
                last.end = *date;
            }
            Some(last) if last.covers(*date) => {}
            _ => ranges.push(MissingRange::day(*date, reason.clone())),
        }
    }
    ranges
}

async fn read_file(path: &Path) -> Result<String, PipelineError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| PipelineError::IngestionFailure {
            reason: format!("failed to read {}: {e}", path.display()),
        })
}

fn within_slack(reviews: Vec<ReviewRecord>, window: &AnalysisWindow) -> Vec<ReviewRecord> {
    let lo = window.start.pred_opt().unwrap_or(window.start);
    let hi = window.end.succ_opt().unwrap_or(window.end);
    reviews
        .into_iter()
        .filter(|r| {
            let d = r.timestamp.date_naive();
            lo <= d && d <= hi
        })
        .collect()
}
