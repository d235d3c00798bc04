// Topic discovery: embedding reviews, clustering each day, and consolidating
// the per-day clusters into stable run-wide topics.

pub mod cluster;
pub mod consolidate;
pub mod download;
pub mod embeddings;
pub mod hashing;
pub mod keywords;
pub mod models;
pub mod traits;
