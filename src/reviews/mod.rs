// Review ingestion: records, sources and store link parsing.

pub mod models;
pub mod playstore;
pub mod source;
