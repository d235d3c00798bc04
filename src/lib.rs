// PulseGen: topic trend analysis for app store reviews
//
// This is the library root. Each module corresponds to a stage of the
// review-to-trend-matrix pipeline, plus the output and configuration layers
// around it.

pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod reviews;
pub mod status;
pub mod text;
pub mod topics;
pub mod trends;
