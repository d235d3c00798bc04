// Temporal side of the pipeline: the analysis window, per-day counting, the
// topic-by-day matrix and its summary statistics.

pub mod aggregate;
pub mod matrix;
pub mod stats;
pub mod window;
