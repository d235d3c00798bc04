use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::FixedOffset;

use crate::error::PipelineError;

/// Longest analysis period accepted, roughly ten years.
pub const MAX_ANALYSIS_PERIOD_DAYS: u32 = 3660;

/// App analyzed when neither a Play Store link nor a package name is given.
pub const DEFAULT_APP_ID: &str = "in.swiggy.android";

/// Which embedding backend turns review text into vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedderBackend {
    /// Local all-MiniLM-L6-v2 ONNX model (default when the files are present)
    Onnx,
    /// Deterministic feature hashing over review tokens, needs no model files
    Hashing,
}

/// Parameters that shape a single analysis run.
///
/// Passed by reference into every pipeline stage. There is no process-wide
/// copy; two runs with different thresholds can coexist.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    /// Cosine similarity a review (or candidate) must exceed to join a
    /// cluster (or topic). In (0, 1].
    pub similarity_threshold: f64,
    /// Clusters smaller than this are pooled into the miscellaneous bucket.
    pub min_cluster_size: usize,
    /// Length of the trailing window, in days, ending on the target date.
    pub analysis_period_days: u32,
    /// Only report this many topics (a slice of the sorted matrix).
    pub top_n_topics: Option<usize>,
    /// Reviews beyond this count on a single day are dropped before clustering.
    pub max_reviews_per_day: usize,
    /// A topic is relabeled only when the best accumulated phrase outweighs
    /// the current label by this fraction.
    pub relabel_margin: f64,
    /// Below this top-phrase coverage, a matching canonical label is used.
    pub label_confidence_floor: f64,
    /// Allow canonical complaint labels for low-confidence clusters.
    pub canonical_labels: bool,
    /// Run the explicit end-of-run merge of near-duplicate topics.
    pub final_merge: bool,
    /// Keep the miscellaneous row in the matrix.
    pub include_miscellaneous: bool,
    /// How many day batches are embedded concurrently.
    pub embed_concurrency: usize,
    /// Offset (minutes east of UTC) used to bucket timestamps into days.
    pub reporting_offset_minutes: i32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.7,
            min_cluster_size: 3,
            analysis_period_days: 30,
            top_n_topics: None,
            max_reviews_per_day: 1000,
            relabel_margin: 0.25,
            label_confidence_floor: 0.5,
            canonical_labels: true,
            final_merge: false,
            include_miscellaneous: true,
            embed_concurrency: 4,
            reporting_offset_minutes: 0,
        }
    }
}

impl AnalysisConfig {
    /// Reject parameter combinations the pipeline cannot honor.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let invalid = |reason: String| Err(PipelineError::InvalidConfig { reason });

        if !(self.similarity_threshold > 0.0 && self.similarity_threshold <= 1.0) {
            return invalid(format!(
                "similarity_threshold must be in (0, 1], got {}",
                self.similarity_threshold
            ));
        }
        if self.min_cluster_size == 0 {
            return invalid("min_cluster_size must be at least 1".to_string());
        }
        if !(1..=MAX_ANALYSIS_PERIOD_DAYS).contains(&self.analysis_period_days) {
            return invalid(format!(
                "analysis_period_days must be between 1 and {MAX_ANALYSIS_PERIOD_DAYS}, got {}",
                self.analysis_period_days
            ));
        }
        if self.top_n_topics == Some(0) {
            return invalid("top_n_topics must be at least 1 when set".to_string());
        }
        if self.max_reviews_per_day == 0 {
            return invalid("max_reviews_per_day must be at least 1".to_string());
        }
        if self.relabel_margin < 0.0 || !self.relabel_margin.is_finite() {
            return invalid(format!(
                "relabel_margin must be a non-negative number, got {}",
                self.relabel_margin
            ));
        }
        if !(0.0..=1.0).contains(&self.label_confidence_floor) {
            return invalid(format!(
                "label_confidence_floor must be in [0, 1], got {}",
                self.label_confidence_floor
            ));
        }
        if self.embed_concurrency == 0 {
            return invalid("embed_concurrency must be at least 1".to_string());
        }
        if self.reporting_offset().is_none() {
            return invalid(format!(
                "reporting_offset_minutes out of range: {}",
                self.reporting_offset_minutes
            ));
        }
        Ok(())
    }

    /// The fixed offset every timestamp of the run is bucketed in.
    pub fn reporting_offset(&self) -> Option<FixedOffset> {
        FixedOffset::east_opt(self.reporting_offset_minutes.checked_mul(60)?)
    }
}

/// Central configuration loaded from environment variables.
///
/// The .env file is loaded automatically at startup via dotenvy. CLI flags
/// override the analysis parameters after loading.
pub struct Config {
    pub default_app_id: String,
    /// Directory containing the embedding model files
    pub model_dir: PathBuf,
    /// Where CSV and JSON reports are written
    pub output_dir: PathBuf,
    pub embedder_backend: EmbedderBackend,
    pub analysis: AnalysisConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Every variable is optional; unset ones take the documented defaults.
    /// A variable that is set but unparseable is an error rather than being
    /// silently replaced by the default.
    pub fn load() -> Result<Self> {
        let defaults = AnalysisConfig::default();

        let embedder_backend = match env::var("PULSEGEN_EMBEDDER").as_deref() {
            Ok("hashing") => EmbedderBackend::Hashing,
            // "onnx" or unset both prefer the sentence model
            _ => EmbedderBackend::Onnx,
        };

        let model_dir = env::var("PULSEGEN_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| crate::topics::download::default_model_dir());

        let top_n_topics = match env::var("PULSEGEN_TOP_N_TOPICS") {
            Ok(raw) => Some(
                raw.parse()
                    .with_context(|| format!("PULSEGEN_TOP_N_TOPICS is not a number: {raw}"))?,
            ),
            Err(_) => defaults.top_n_topics,
        };

        let analysis = AnalysisConfig {
            similarity_threshold: env_or(
                "PULSEGEN_SIMILARITY_THRESHOLD",
                defaults.similarity_threshold,
            )?,
            min_cluster_size: env_or("PULSEGEN_MIN_CLUSTER_SIZE", defaults.min_cluster_size)?,
            analysis_period_days: env_or(
                "PULSEGEN_ANALYSIS_PERIOD_DAYS",
                defaults.analysis_period_days,
            )?,
            top_n_topics,
            max_reviews_per_day: env_or(
                "PULSEGEN_MAX_REVIEWS_PER_DAY",
                defaults.max_reviews_per_day,
            )?,
            relabel_margin: env_or("PULSEGEN_RELABEL_MARGIN", defaults.relabel_margin)?,
            label_confidence_floor: env_or(
                "PULSEGEN_LABEL_CONFIDENCE_FLOOR",
                defaults.label_confidence_floor,
            )?,
            canonical_labels: env_or("PULSEGEN_CANONICAL_LABELS", defaults.canonical_labels)?,
            final_merge: env_or("PULSEGEN_FINAL_MERGE", defaults.final_merge)?,
            include_miscellaneous: env_or(
                "PULSEGEN_INCLUDE_MISCELLANEOUS",
                defaults.include_miscellaneous,
            )?,
            embed_concurrency: env_or("PULSEGEN_EMBED_CONCURRENCY", defaults.embed_concurrency)?,
            reporting_offset_minutes: env_or(
                "PULSEGEN_REPORTING_OFFSET_MINUTES",
                defaults.reporting_offset_minutes,
            )?,
        };

        Ok(Self {
            default_app_id: env::var("PULSEGEN_DEFAULT_APP_ID")
                .unwrap_or_else(|_| DEFAULT_APP_ID.to_string()),
            model_dir,
            output_dir: env::var("PULSEGEN_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./outputs")),
            embedder_backend,
            analysis,
        })
    }

    /// Check that the sentence embedding model is downloaded.
    /// Call this before loading the ONNX embedder.
    pub fn require_model(&self) -> Result<()> {
        if !crate::topics::download::embedding_files_present(&self.model_dir) {
            anyhow::bail!(
                "Embedding model files not found in {}\n\
                 Run `pulsegen download-model` to download them.\n\
                 Or set PULSEGEN_EMBEDDER=hashing to use the built-in hashing embedder.",
                self.model_dir.display()
            );
        }
        Ok(())
    }
}

/// Parse an optional environment variable, falling back to `default` when unset.
fn env_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{name}={raw} could not be parsed: {e}")),
        Err(_) => Ok(default),
    }
}
