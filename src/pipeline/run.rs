// Trend analysis pipeline: reviews in, topic-by-day matrix out.
//
// Stages, in order:
// 1. Fetch reviews from a ReviewSource for the window
// 2. Sanitize: collapse duplicate ids, drop out-of-range ratings, keep only
//    days inside the window, cap each day at max_reviews_per_day
// 3. Normalize text (rayon, on a blocking thread); unprocessable reviews are
//    skipped and recorded
// 4. Embed one day at a time, a few days concurrently; a day whose batch
//    fails or comes back malformed is marked unavailable
// 5. Cluster every day independently (rayon)
// 6. Consolidate the day candidates into run-wide topics, oldest day first
// 7. Count per topic per day, assemble the matrix, summarize

use std::collections::{BTreeMap, HashSet};

use anyhow::{Context, Result};
use chrono::{FixedOffset, NaiveDate};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::AnalysisConfig;
use crate::error::PipelineError;
use crate::reviews::models::{Ingestion, ReviewRecord};
use crate::reviews::source::ReviewSource;
use crate::text::normalizer::{CleanText, TextNormalizer};
use crate::topics::cluster::TopicExtractor;
use crate::topics::consolidate::{remap_assignments, TopicRegistry};
use crate::topics::models::{Assignment, NormalizedText, TopicCandidate};
use crate::topics::traits::Embedder;
use crate::trends::aggregate::aggregate;
use crate::trends::matrix::{assemble, TrendMatrix};
use crate::trends::stats::{summarize, TrendSummary};
use crate::trends::window::AnalysisWindow;

/// Everything one run produced.
#[derive(Debug, Clone, Serialize)]
pub struct TrendReport {
    pub app_id: String,
    pub window: AnalysisWindow,
    /// Name of the embedder that produced the vectors
    pub embedder: String,
    pub matrix: TrendMatrix,
    pub summary: TrendSummary,
    /// Reviews that made it into a topic
    pub reviews_analyzed: usize,
    /// Reviews whose text could not be processed
    pub skipped: Vec<PipelineError>,
    /// Run-level problems that did not stop the run
    pub warnings: Vec<PipelineError>,
}

/// Runs the whole analysis for one app and window.
pub struct TrendPipeline {
    config: AnalysisConfig,
    offset: FixedOffset,
    embedder: Box<dyn Embedder>,
    normalizer: TextNormalizer,
    show_progress: bool,
}

impl TrendPipeline {
    /// Fails with `InvalidConfig` if the configuration cannot be honored.
    pub fn new(config: AnalysisConfig, embedder: Box<dyn Embedder>) -> Result<Self, PipelineError> {
        config.validate()?;
        let offset = config
            .reporting_offset()
            .ok_or_else(|| PipelineError::InvalidConfig {
                reason: "reporting offset out of range".to_string(),
            })?;

        Ok(Self {
            config,
            offset,
            embedder,
            normalizer: TextNormalizer::new(),
            show_progress: false,
        })
    }

    /// Draw a progress bar over day batches while embedding.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Fetch the window's reviews from `source` and analyze them.
    pub async fn run(
        &self,
        source: &dyn ReviewSource,
        app_id: &str,
        window: AnalysisWindow,
    ) -> Result<TrendReport> {
        info!(app_id, %window, embedder = self.embedder.name(), "Starting trend analysis");

        let ingestion = source
            .fetch(app_id, &window)
            .await
            .with_context(|| format!("Failed to fetch reviews for {app_id}"))?;

        info!(
            reviews = ingestion.reviews.len(),
            missing_ranges = ingestion.missing.len(),
            "Fetched reviews"
        );

        self.analyze(app_id, window, ingestion).await
    }

    /// Analyze an already fetched set of reviews.
    pub async fn analyze(
        &self,
        app_id: &str,
        window: AnalysisWindow,
        ingestion: Ingestion,
    ) -> Result<TrendReport> {
        let mut warnings = Vec::new();

        // Days the source could not deliver, within the window
        let mut unavailable: BTreeMap<NaiveDate, String> = BTreeMap::new();
        for range in &ingestion.missing {
            for date in window.dates().into_iter().filter(|d| range.covers(*d)) {
                unavailable.entry(date).or_insert_with(|| range.reason.clone());
            }
            if range.start <= window.end && range.end >= window.start {
                warn!(start = %range.start, end = %range.end, reason = %range.reason, "Source is missing data");
                warnings.push(PipelineError::MissingRange {
                    start: range.start,
                    end: range.end,
                    reason: range.reason.clone(),
                });
            }
        }

        // --- Sanitize ---
        let reviews = self.sanitize(ingestion.reviews, &window, &unavailable);

        // --- Normalize ---
        let normalizer = self.normalizer.clone();
        let offset = self.offset;
        let normalized: Vec<Result<CleanText, PipelineError>> =
            tokio::task::spawn_blocking(move || {
                reviews
                    .par_iter()
                    .map(|r| normalizer.normalize(r, &offset))
                    .collect::<Vec<_>>()
            })
            .await
            .context("spawn_blocking panicked")?;

        let mut skipped = Vec::new();
        let mut by_day: BTreeMap<NaiveDate, Vec<CleanText>> = BTreeMap::new();
        for result in normalized {
            match result {
                Ok(clean) => by_day.entry(clean.date).or_default().push(clean),
                Err(e) => {
                    warn!(error = %e, "Skipping review");
                    skipped.push(e);
                }
            }
        }

        if by_day.is_empty() {
            warn!(%window, "No processable reviews in the analysis window");
            warnings.push(PipelineError::EmptyInputBatch);
        }

        // --- Embed ---
        let embedded = self.embed_days(by_day).await;

        let mut day_batches: Vec<(NaiveDate, Vec<NormalizedText>)> = Vec::new();
        for (date, result) in embedded {
            match result {
                Ok(batch) => day_batches.push((date, batch)),
                Err(e) => {
                    warn!(error = %e, "Discarding day batch");
                    unavailable.insert(date, e.to_string());
                    warnings.push(e);
                }
            }
        }

        // --- Cluster each day ---
        let extractor = TopicExtractor::new(&self.config);
        let clustered: Vec<(NaiveDate, Vec<TopicCandidate>)> =
            tokio::task::spawn_blocking(move || {
                day_batches
                    .par_iter()
                    .map(|(date, batch)| (*date, extractor.extract(batch)))
                    .collect::<Vec<_>>()
            })
            .await
            .context("spawn_blocking panicked")?;

        // --- Consolidate, oldest day first ---
        let mut registry = TopicRegistry::new(&self.config);
        let mut assignments: Vec<Assignment> = Vec::new();
        for (date, candidates) in clustered {
            assignments.extend(registry.absorb(date, candidates));
        }

        if self.config.final_merge {
            let remap = registry.merge_near_duplicates();
            remap_assignments(&mut assignments, &remap);
            info!(merged = remap.len(), "Final merge pass complete");
        }

        info!(
            topics = registry.len(),
            assignments = assignments.len(),
            skipped = skipped.len(),
            "Topic consolidation complete"
        );

        // --- Aggregate and report ---
        let counts = aggregate(&assignments);
        let matrix = assemble(
            &counts,
            registry.topics(),
            &window,
            &unavailable,
            self.config.include_miscellaneous,
        );
        let summary = summarize(&matrix, self.config.top_n_topics);

        if let Some(ref e) = summary.trend_window_error {
            info!(error = %e, "Trend deltas unavailable");
        }

        Ok(TrendReport {
            app_id: app_id.to_string(),
            window,
            embedder: self.embedder.name().to_string(),
            matrix,
            summary,
            reviews_analyzed: assignments.len(),
            skipped,
            warnings,
        })
    }

    /// Collapse duplicate ids, clear out-of-range ratings, keep only reviews
    /// on available days inside the window, and cap each day.
    ///
    /// The result is sorted by (date, timestamp, id), independent of input
    /// order.
    fn sanitize(
        &self,
        mut reviews: Vec<ReviewRecord>,
        window: &AnalysisWindow,
        unavailable: &BTreeMap<NaiveDate, String>,
    ) -> Vec<ReviewRecord> {
        let received = reviews.len();

        // Earliest timestamp wins for a duplicated id; text breaks exact ties
        reviews.sort_by(|a, b| {
            a.id.cmp(&b.id)
                .then(a.timestamp.cmp(&b.timestamp))
                .then(a.text.cmp(&b.text))
        });
        let mut seen: HashSet<String> = HashSet::new();
        reviews.retain(|r| seen.insert(r.id.clone()));
        let duplicates = received - reviews.len();
        if duplicates > 0 {
            warn!(duplicates, "Collapsed duplicate review ids");
        }

        let mut bad_ratings = 0usize;
        for review in reviews.iter_mut() {
            if !review.has_valid_rating() {
                review.rating = None;
                bad_ratings += 1;
            }
        }
        if bad_ratings > 0 {
            warn!(count = bad_ratings, "Dropped out-of-range star ratings");
        }

        let mut by_day: BTreeMap<NaiveDate, Vec<ReviewRecord>> = BTreeMap::new();
        let mut outside = 0usize;
        let mut on_missing_days = 0usize;
        for review in reviews {
            let date = review.local_date(&self.offset);
            if !window.contains(date) {
                outside += 1;
            } else if unavailable.contains_key(&date) {
                on_missing_days += 1;
            } else {
                by_day.entry(date).or_default().push(review);
            }
        }
        if outside > 0 {
            debug!(count = outside, "Ignored reviews outside the window");
        }
        if on_missing_days > 0 {
            warn!(
                count = on_missing_days,
                "Ignored reviews on days the source reported as missing"
            );
        }

        let cap = self.config.max_reviews_per_day;
        let mut kept = Vec::new();
        for (date, mut day) in by_day {
            day.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
            if day.len() > cap {
                warn!(%date, reviews = day.len(), cap, "Day exceeds review cap, truncating");
                day.truncate(cap);
            }
            kept.extend(day);
        }

        kept
    }

    /// Embed each day's reviews. Days are processed with bounded concurrency
    /// and returned in date order.
    async fn embed_days(
        &self,
        by_day: BTreeMap<NaiveDate, Vec<CleanText>>,
    ) -> Vec<(NaiveDate, Result<Vec<NormalizedText>, PipelineError>)> {
        let pb = if self.show_progress {
            let pb = ProgressBar::new(by_day.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("  Embedding [{bar:30}] {pos}/{len} days ({eta})")
                    .expect("valid template"),
            );
            pb
        } else {
            ProgressBar::hidden()
        };
        let pb = &pb;
        let embedder = self.embedder.as_ref();

        let results: Vec<_> = stream::iter(by_day.into_iter().map(|(date, docs)| async move {
            let result = embed_day(embedder, date, docs).await;
            pb.inc(1);
            (date, result)
        }))
        .buffered(self.config.embed_concurrency)
        .collect()
        .await;

        pb.finish_and_clear();
        results
    }
}

/// Embed one day's batch and check what came back.
async fn embed_day(
    embedder: &dyn Embedder,
    date: NaiveDate,
    mut docs: Vec<CleanText>,
) -> Result<Vec<NormalizedText>, PipelineError> {
    docs.sort_by(|a, b| a.review_id.cmp(&b.review_id));

    let corrupt = |reason: String| PipelineError::CorruptBatch { date, reason };

    let embeddings = embedder
        .embed_batch(&docs)
        .await
        .map_err(|e| corrupt(format!("embedding failed: {e:#}")))?;

    if embeddings.len() != docs.len() {
        return Err(corrupt(format!(
            "expected {} embeddings, got {}",
            docs.len(),
            embeddings.len()
        )));
    }

    let dim = embedder.dimension();
    if let Some(bad) = embeddings.iter().find(|e| e.len() != dim) {
        return Err(corrupt(format!(
            "embedding has {} dimensions, expected {dim}",
            bad.len()
        )));
    }
    if embeddings.iter().flatten().any(|v| !v.is_finite()) {
        return Err(corrupt("embedding contains non-finite values".to_string()));
    }

    debug!(%date, reviews = docs.len(), "Embedded day batch");

    Ok(docs
        .into_iter()
        .zip(embeddings)
        .map(|(doc, embedding)| NormalizedText {
            review_id: doc.review_id,
            date: doc.date,
            tokens: doc.tokens,
            embedding,
        })
        .collect())
}
