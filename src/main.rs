use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::{info, warn};

use pulsegen::config::{Config, EmbedderBackend};
use pulsegen::output::csv::{default_report_path, write_matrix_csv, write_report_json, DateFormat};
use pulsegen::output::terminal;
use pulsegen::pipeline::run::TrendPipeline;
use pulsegen::reviews::playstore::resolve_app_id;
use pulsegen::reviews::source::{CsvFileSource, DailyFileSource, JsonFileSource, ReviewSource};
use pulsegen::topics::download;
use pulsegen::topics::embeddings::SentenceEmbedder;
use pulsegen::topics::hashing::HashingEmbedder;
use pulsegen::topics::traits::Embedder;
use pulsegen::trends::window::AnalysisWindow;

/// PulseGen: topic trends from app store reviews.
///
/// Groups reviews into recurring themes and counts, day by day, how often
/// each theme comes up over a trailing window.
#[derive(Parser)]
#[command(name = "pulsegen", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a topic-by-day trend report from exported reviews
    Analyze {
        /// Review export: a JSON file, a CSV file, or a directory of
        /// YYYY-MM-DD.json files
        #[arg(long)]
        reviews: PathBuf,

        /// Play Store link or package name (default: PULSEGEN_DEFAULT_APP_ID)
        #[arg(long)]
        app: Option<String>,

        /// Last day of the window, YYYY-MM-DD (default: today, UTC)
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Window length in days (default: 30)
        #[arg(long)]
        days: Option<u32>,

        /// Only report the top N topics
        #[arg(long)]
        top: Option<usize>,

        /// Cosine similarity needed to join a topic, in (0, 1] (default: 0.7)
        #[arg(long)]
        threshold: Option<f64>,

        /// Smaller clusters are pooled into Miscellaneous (default: 3)
        #[arg(long)]
        min_cluster_size: Option<usize>,

        /// CSV output path (default: <output dir>/trend_report_<date>.csv)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Also write the full report as JSON next to the CSV
        #[arg(long)]
        json: bool,

        /// Head date columns like "Jun 01" instead of ISO dates
        #[arg(long)]
        short_dates: bool,

        /// Merge near-duplicate topics once all days are processed
        #[arg(long)]
        final_merge: bool,

        /// Print the full matrix to the terminal as well
        #[arg(long)]
        show_matrix: bool,
    },

    /// Download the sentence embedding model (~90 MB)
    DownloadModel,

    /// Show model status and analysis defaults
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("pulsegen=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            reviews,
            app,
            date,
            days,
            top,
            threshold,
            min_cluster_size,
            output,
            json,
            short_dates,
            final_merge,
            show_matrix,
        } => {
            let mut config = Config::load()?;

            // CLI flags override the environment
            let analysis = &mut config.analysis;
            if let Some(days) = days {
                analysis.analysis_period_days = days;
            }
            if let Some(top) = top {
                analysis.top_n_topics = Some(top);
            }
            if let Some(threshold) = threshold {
                analysis.similarity_threshold = threshold;
            }
            if let Some(size) = min_cluster_size {
                analysis.min_cluster_size = size;
            }
            if final_merge {
                analysis.final_merge = true;
            }

            config.analysis.validate()?;

            let app_id = resolve_app_id(app.as_deref(), &config.default_app_id);
            let end = date.unwrap_or_else(|| Utc::now().date_naive());
            let window = AnalysisWindow::ending_on(end, config.analysis.analysis_period_days)?;

            let source = open_source(&reviews)?;
            let embedder = load_embedder(&config)?;

            let pipeline = TrendPipeline::new(config.analysis.clone(), embedder)?
                .with_progress(true);
            let report = pipeline.run(source.as_ref(), &app_id, window).await?;

            let format = if short_dates {
                DateFormat::Short
            } else {
                DateFormat::Iso
            };

            terminal::display_report(&report);
            if show_matrix {
                terminal::display_matrix(&report.matrix, format, config.analysis.top_n_topics);
            }

            let csv_path = output.unwrap_or_else(|| default_report_path(&config.output_dir, end));
            // An explicit top-N also trims the CSV
            let mut matrix = report.matrix.clone();
            if let Some(n) = config.analysis.top_n_topics {
                matrix.rows = report.matrix.top(n).to_vec();
            }
            write_matrix_csv(&matrix, &csv_path, format)?;
            println!("\nReport saved to {}", csv_path.display().to_string().bold());

            if json {
                let json_path = csv_path.with_extension("json");
                write_report_json(&report, &json_path)?;
                println!("Full report saved to {}", json_path.display());
            }
        }

        Commands::DownloadModel => {
            let config = Config::load()?;
            info!(dir = %config.model_dir.display(), "Downloading embedding model");
            download::download_model(&config.model_dir).await?;
            println!(
                "\n{} Model saved to {}",
                "Done.".green().bold(),
                download::embedding_model_dir(&config.model_dir).display()
            );
        }

        Commands::Status => {
            let config = Config::load()?;
            pulsegen::status::show(&config)?;
        }
    }

    Ok(())
}

/// Pick a review source from the shape of the path.
fn open_source(path: &Path) -> Result<Box<dyn ReviewSource>> {
    if path.is_dir() {
        return Ok(Box::new(DailyFileSource::new(path)));
    }
    if !path.exists() {
        anyhow::bail!(
            "Review export not found: {}\n\
             Pass a JSON file, a CSV file, or a directory of YYYY-MM-DD.json files.",
            path.display()
        );
    }
    let is_csv = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
    if is_csv {
        Ok(Box::new(CsvFileSource::new(path)))
    } else {
        Ok(Box::new(JsonFileSource::new(path)))
    }
}

/// The sentence model when it is available, the hashing embedder otherwise.
fn load_embedder(config: &Config) -> Result<Box<dyn Embedder>> {
    match config.embedder_backend {
        EmbedderBackend::Hashing => {
            info!("Using the feature-hashing embedder");
            Ok(Box::new(HashingEmbedder::default()))
        }
        EmbedderBackend::Onnx => {
            if config.require_model().is_err() {
                warn!("Embedding model not found, falling back to feature hashing");
                println!(
                    "{}",
                    "Tip: run `pulsegen download-model` for better topic grouping.".dimmed()
                );
                return Ok(Box::new(HashingEmbedder::default()));
            }
            let dir = download::embedding_model_dir(&config.model_dir);
            let embedder = SentenceEmbedder::load(&dir)
                .with_context(|| format!("Failed to load embedding model from {}", dir.display()))?;
            Ok(Box::new(embedder))
        }
    }
}
