// System status display: model files, embedder choice, analysis defaults,
// and the most recent report on disk.

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::config::{Config, EmbedderBackend};
use crate::topics::download::{embedding_files_present, embedding_model_dir};

/// Display system status to the terminal.
pub fn show(config: &Config) -> Result<()> {
    let model_present = embedding_files_present(&config.model_dir);
    if model_present {
        let model_path = embedding_model_dir(&config.model_dir).join("model.onnx");
        let size = std::fs::metadata(&model_path)
            .map(|m| format_bytes(m.len()))
            .unwrap_or_else(|_| "unknown".to_string());
        println!("Embedding model: {} ({})", model_path.display(), size);
    } else {
        println!("Embedding model: not downloaded");
        println!("  Run `pulsegen download-model` to fetch all-MiniLM-L6-v2");
    }

    let embedder = match (config.embedder_backend, model_present) {
        (EmbedderBackend::Hashing, _) => "feature hashing (PULSEGEN_EMBEDDER=hashing)",
        (EmbedderBackend::Onnx, true) => "all-MiniLM-L6-v2",
        (EmbedderBackend::Onnx, false) => "feature hashing (model not downloaded)",
    };
    println!("Embedder: {}", embedder);

    let a = &config.analysis;
    println!("Default app: {}", config.default_app_id);
    println!(
        "Analysis: {} days, similarity > {}, clusters of {}+, at most {} reviews/day",
        a.analysis_period_days, a.similarity_threshold, a.min_cluster_size, a.max_reviews_per_day
    );

    match latest_report(&config.output_dir)? {
        Some(path) => println!("Last report: {}", path.display()),
        None => {
            println!("Last report: none in {}", config.output_dir.display());
            println!("  Run `pulsegen analyze --reviews <file>` to produce one");
        }
    }

    Ok(())
}

/// Newest `trend_report_*.csv` in `dir`, by file name (the date is in it).
fn latest_report(dir: &Path) -> Result<Option<PathBuf>> {
    if !dir.exists() {
        return Ok(None);
    }
    let mut reports: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("trend_report_") && n.ends_with(".csv"))
        })
        .collect();
    reports.sort();
    Ok(reports.pop())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
