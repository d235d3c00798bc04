// Composition tests: the full pipeline, end to end.
//
// These tests exercise the data flow between modules:
//   ReviewSource -> Normalizer -> Embedder -> Extractor -> Registry
//     -> Aggregator -> Matrix -> CSV
// using the deterministic hashing embedder, so no model files or network
// access are needed.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use pulsegen::config::AnalysisConfig;
use pulsegen::error::PipelineError;
use pulsegen::output::csv::{write_matrix, DateFormat};
use pulsegen::pipeline::run::{TrendPipeline, TrendReport};
use pulsegen::reviews::models::{Ingestion, MissingRange, ReviewRecord};
use pulsegen::reviews::source::JsonFileSource;
use pulsegen::topics::hashing::HashingEmbedder;
use pulsegen::trends::matrix::DayAvailability;
use pulsegen::trends::window::AnalysisWindow;

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
}

fn at(d: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, d, hour, 0, 0).unwrap()
}

fn review(id: &str, text: &str, d: u32) -> ReviewRecord {
    ReviewRecord {
        id: id.to_string(),
        text: text.to_string(),
        timestamp: at(d, 12),
        rating: None,
    }
}

fn pipeline(config: AnalysisConfig) -> TrendPipeline {
    TrendPipeline::new(config, Box::new(HashingEmbedder::default())).unwrap()
}

/// Every review counts, however small its cluster.
fn singleton_config() -> AnalysisConfig {
    AnalysisConfig {
        min_cluster_size: 1,
        ..AnalysisConfig::default()
    }
}

async fn analyze(
    config: AnalysisConfig,
    window: AnalysisWindow,
    reviews: Vec<ReviewRecord>,
) -> TrendReport {
    pipeline(config)
        .analyze("in.swiggy.android", window, Ingestion::complete(reviews))
        .await
        .unwrap()
}

fn sample_reviews() -> Vec<ReviewRecord> {
    vec![
        review("r01", "Delivery was late again", 1),
        review("r02", "delivery late", 1),
        review("r03", "Late delivery, food cold", 2),
        review("r04", "App crashed on checkout", 2),
        review("r05", "app crashed again", 3),
        review("r06", "The app crashed twice", 3),
        review("r07", "Refund still pending", 4),
        review("r08", "refund pending for a week", 4),
        review("r09", "delivery late", 5),
        review("r10", "Maps location wrong", 5),
    ]
}

// ============================================================
// The reference example
// ============================================================

#[tokio::test]
async fn delivery_late_and_app_crashed_example() {
    let reviews = vec![
        review("r1", "delivery late", 1),
        review("r2", "delivery was late again", 1),
        review("r3", "app crashed", 2),
    ];
    let window = AnalysisWindow::new(day(1), day(3)).unwrap();
    let report = analyze(singleton_config(), window, reviews).await;
    let m = &report.matrix;

    assert_eq!(m.rows.len(), 2);

    let delivery = m
        .rows
        .iter()
        .find(|r| r.label.contains("delivery"))
        .expect("a delivery topic");
    assert_eq!(delivery.counts, vec![2, 0, 0]);

    let crash = m
        .rows
        .iter()
        .find(|r| r.label.contains("crash"))
        .expect("a crash topic");
    assert_eq!(crash.counts, vec![0, 1, 0]);

    // Larger topic first
    assert_eq!(m.rows[0].topic_id, delivery.topic_id);
    assert_eq!(report.reviews_analyzed, 3);
}

// ============================================================
// Matrix shape and counting
// ============================================================

#[tokio::test]
async fn columns_cover_the_whole_window() {
    let window = AnalysisWindow::ending_on(day(30), 30).unwrap();
    let report = analyze(singleton_config(), window, sample_reviews()).await;
    let m = &report.matrix;

    assert_eq!(m.dates.len(), 30);
    assert_eq!(m.dates, window.dates());
    assert!(m.rows.iter().all(|r| r.counts.len() == 30));
}

#[tokio::test]
async fn row_sums_match_assignments() {
    let window = AnalysisWindow::new(day(1), day(7)).unwrap();
    let reviews = sample_reviews();
    let report = analyze(singleton_config(), window, reviews.clone()).await;

    let matrix_total: u32 = report.matrix.rows.iter().map(|r| r.total).sum();
    assert_eq!(matrix_total as usize, report.reviews_analyzed);
    assert_eq!(report.reviews_analyzed, reviews.len());
    for row in &report.matrix.rows {
        assert_eq!(row.total, row.counts.iter().sum::<u32>());
    }
}

#[tokio::test]
async fn small_clusters_are_counted_as_miscellaneous() {
    let window = AnalysisWindow::new(day(1), day(7)).unwrap();
    let config = AnalysisConfig {
        min_cluster_size: 50,
        ..AnalysisConfig::default()
    };
    let report = analyze(config.clone(), window, sample_reviews()).await;
    assert_eq!(report.matrix.rows.len(), 1);
    assert_eq!(report.matrix.rows[0].label, "Miscellaneous");
    assert_eq!(report.matrix.rows[0].total, 10);

    let without = AnalysisConfig {
        include_miscellaneous: false,
        ..config
    };
    let report = analyze(without, window, sample_reviews()).await;
    assert!(report.matrix.is_empty());
}

#[tokio::test]
async fn unprocessable_reviews_never_counted() {
    let mut reviews = sample_reviews();
    reviews.push(review("junk1", "", 1));
    reviews.push(review("junk2", "🔥🔥🔥", 2));
    reviews.push(review("junk3", "!!!", 3));

    let window = AnalysisWindow::new(day(1), day(7)).unwrap();
    let report = analyze(singleton_config(), window, reviews).await;

    assert_eq!(report.reviews_analyzed, 10);
    assert_eq!(report.skipped.len(), 3);
    assert!(report
        .skipped
        .iter()
        .all(|e| matches!(e, PipelineError::UnprocessableText { .. })));
}

// ============================================================
// Determinism
// ============================================================

#[tokio::test]
async fn identical_input_identical_matrix() {
    let window = AnalysisWindow::new(day(1), day(7)).unwrap();
    let a = analyze(AnalysisConfig::default(), window, sample_reviews()).await;
    let b = analyze(AnalysisConfig::default(), window, sample_reviews()).await;
    assert_eq!(a.matrix, b.matrix);
    assert_eq!(a.summary, b.summary);
}

#[tokio::test]
async fn input_order_does_not_matter() {
    let window = AnalysisWindow::new(day(1), day(7)).unwrap();
    let forward = sample_reviews();
    let mut reversed = sample_reviews();
    reversed.reverse();
    let mut interleaved = sample_reviews();
    interleaved.rotate_left(4);

    let a = analyze(singleton_config(), window, forward).await;
    let b = analyze(singleton_config(), window, reversed).await;
    let c = analyze(singleton_config(), window, interleaved).await;
    assert_eq!(a.matrix, b.matrix);
    assert_eq!(a.matrix, c.matrix);
}

#[tokio::test]
async fn equal_totals_ordered_by_topic_id() {
    let reviews = vec![
        review("a", "refund pending", 1),
        review("b", "maps location wrong", 2),
        review("c", "otp login failed", 3),
    ];
    let window = AnalysisWindow::new(day(1), day(3)).unwrap();
    let report = analyze(singleton_config(), window, reviews).await;

    let ids: Vec<u32> = report.matrix.rows.iter().map(|r| r.topic_id.0).collect();
    let mut sorted = ids.clone();
    sorted.sort_unstable();
    assert_eq!(ids.len(), 3);
    assert_eq!(ids, sorted);
}

// ============================================================
// Degraded input
// ============================================================

#[tokio::test]
async fn empty_input_gives_empty_matrix_with_columns() {
    let window = AnalysisWindow::new(day(1), day(5)).unwrap();
    let report = analyze(AnalysisConfig::default(), window, Vec::new()).await;

    assert!(report.matrix.is_empty());
    assert_eq!(report.matrix.dates.len(), 5);
    assert!(report.warnings.contains(&PipelineError::EmptyInputBatch));
}

#[tokio::test]
async fn missing_days_are_marked_not_zeroed() {
    let window = AnalysisWindow::new(day(1), day(5)).unwrap();
    let ingestion = Ingestion {
        reviews: sample_reviews(),
        missing: vec![MissingRange {
            start: day(3),
            end: day(3),
            reason: "scraper blocked".to_string(),
        }],
    };
    let report = pipeline(singleton_config())
        .analyze("in.swiggy.android", window, ingestion)
        .await
        .unwrap();
    let m = &report.matrix;

    assert!(matches!(m.availability[2], DayAvailability::Missing { .. }));
    assert_eq!(m.available_days(), 4);
    for row in 0..m.rows.len() {
        assert_eq!(m.cell(row, 2), None);
    }
    assert!(report
        .warnings
        .iter()
        .any(|w| matches!(w, PipelineError::MissingRange { .. })));

    let mut csv = Vec::new();
    write_matrix(m, DateFormat::Iso, &mut csv).unwrap();
    let csv = String::from_utf8(csv).unwrap();
    for line in csv.lines().skip(1) {
        assert_eq!(line.split(',').nth(3), Some("n/a"));
    }
}

#[tokio::test]
async fn short_window_reports_insufficient_window() {
    let reviews = sample_reviews();

    let short = AnalysisWindow::ending_on(day(13), 13).unwrap();
    let report = analyze(singleton_config(), short, reviews.clone()).await;
    assert_eq!(
        report.summary.trend_window_error,
        Some(PipelineError::InsufficientWindow { days: 13 })
    );
    // The matrix itself is still complete
    assert_eq!(report.matrix.dates.len(), 13);
    assert!(!report.summary.topic_stats.is_empty());

    let enough = AnalysisWindow::ending_on(day(14), 14).unwrap();
    let report = analyze(singleton_config(), enough, reviews).await;
    assert_eq!(report.summary.trend_window_error, None);
}

#[tokio::test]
async fn per_day_cap_limits_counts() {
    let reviews: Vec<ReviewRecord> = (0..10)
        .map(|i| ReviewRecord {
            id: format!("r{i:02}"),
            text: "delivery late".to_string(),
            timestamp: at(1, i),
            rating: None,
        })
        .collect();
    let config = AnalysisConfig {
        min_cluster_size: 1,
        max_reviews_per_day: 4,
        ..AnalysisConfig::default()
    };
    let window = AnalysisWindow::new(day(1), day(2)).unwrap();
    let report = analyze(config, window, reviews).await;
    assert_eq!(report.reviews_analyzed, 4);
    assert_eq!(report.matrix.rows[0].counts, vec![4, 0]);
}

// ============================================================
// Source -> report
// ============================================================

#[tokio::test]
async fn json_file_to_csv_report() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reviews.json");
    std::fs::write(&path, serde_json::to_string(&sample_reviews()).unwrap()).unwrap();

    let window = AnalysisWindow::new(day(1), day(5)).unwrap();
    let source = JsonFileSource::new(&path);
    let report = pipeline(singleton_config())
        .run(&source, "in.swiggy.android", window)
        .await
        .unwrap();

    let mut csv = Vec::new();
    write_matrix(&report.matrix, DateFormat::Short, &mut csv).unwrap();
    let csv = String::from_utf8(csv).unwrap();
    let mut lines = csv.lines();
    assert_eq!(
        lines.next(),
        Some("topic,Jun 01,Jun 02,Jun 03,Jun 04,Jun 05")
    );
    assert_eq!(lines.count(), report.matrix.rows.len());
}

#[tokio::test]
async fn failing_source_surfaces_ingestion_failure() {
    let dir = tempfile::tempdir().unwrap();
    let source = JsonFileSource::new(dir.path().join("missing.json"));
    let window = AnalysisWindow::new(day(1), day(5)).unwrap();

    let err = pipeline(AnalysisConfig::default())
        .run(&source, "in.swiggy.android", window)
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::IngestionFailure { .. })
    ));
}
