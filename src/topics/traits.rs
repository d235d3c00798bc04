// Embedder trait: swap-ready abstraction over text to vector.
//
// The default implementation runs a local sentence-transformer through ONNX.
// The hashing embedder needs no model files and is what tests run against.
// Clustering and consolidation only ever see the vectors.

use anyhow::Result;
use async_trait::async_trait;

use crate::text::normalizer::CleanText;

/// Trait for embedding normalized reviews. Async because model inference is
/// offloaded from the runtime.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Length of every vector this embedder produces.
    fn dimension(&self) -> usize;

    /// Short name for logs and the report header.
    fn name(&self) -> &str;

    /// Embed a batch of reviews, returning vectors in the same order.
    /// Identical input must always produce identical vectors.
    async fn embed_batch(&self, docs: &[CleanText]) -> Result<Vec<Vec<f64>>>;
}
