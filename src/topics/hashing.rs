// Feature-hashing embedder, the model-free fallback.
//
// Each content token (lightly stemmed, so "crashed" and "crashing" land on the
// same feature) and each adjacent token pair is hashed into a fixed number of
// buckets with a sign bit, the signed-hashing trick. Reviews that share
// vocabulary end up with high cosine similarity; reviews that do not end up
// near zero. Much weaker than a sentence model on paraphrases, but fully
// deterministic and fast enough for tests. Buckets come from XXH3, which is
// stable across platforms and toolchains, unlike the std hasher.

use anyhow::Result;
use async_trait::async_trait;
use xxhash_rust::xxh3::xxh3_64;

use super::embeddings::l2_normalize;
use super::traits::Embedder;
use crate::text::normalizer::CleanText;

/// Default number of hash buckets.
pub const DEFAULT_HASHING_DIM: usize = 512;

/// Weight of a token pair relative to a single token.
const BIGRAM_WEIGHT: f64 = 0.5;

pub struct HashingEmbedder {
    dim: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_HASHING_DIM)
    }
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    /// Embed a token sequence synchronously.
    pub fn embed_tokens(&self, tokens: &[String]) -> Vec<f64> {
        let mut v = vec![0.0_f64; self.dim];
        let stems: Vec<String> = tokens.iter().map(|t| stem(t)).collect();

        for s in &stems {
            self.add_feature(&mut v, s.as_bytes(), 1.0);
        }
        for pair in stems.windows(2) {
            let key = format!("{} {}", pair[0], pair[1]);
            self.add_feature(&mut v, key.as_bytes(), BIGRAM_WEIGHT);
        }

        l2_normalize(&mut v);
        v
    }

    fn add_feature(&self, v: &mut [f64], key: &[u8], weight: f64) {
        let h = xxh3_64(key);
        let idx = (h % self.dim as u64) as usize;
        let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
        v[idx] += sign * weight;
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn dimension(&self) -> usize {
        self.dim
    }

    fn name(&self) -> &str {
        "feature-hashing"
    }

    async fn embed_batch(&self, docs: &[CleanText]) -> Result<Vec<Vec<f64>>> {
        Ok(docs.iter().map(|d| self.embed_tokens(&d.tokens)).collect())
    }
}

/// Strip the commonest English inflections. Only used for hashing; labels
/// keep the words as the reviewers wrote them.
pub fn stem(word: &str) -> String {
    for suffix in ["ing", "ed", "es", "s"] {
        if let Some(base) = word.strip_suffix(suffix) {
            if base.chars().count() >= 3 && !base.ends_with('s') {
                return base.to_string();
            }
        }
    }
    word.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topics::embeddings::cosine_similarity;

    fn toks(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_stem() {
        assert_eq!(stem("crashed"), "crash");
        assert_eq!(stem("crashing"), "crash");
        assert_eq!(stem("crashes"), "crash");
        assert_eq!(stem("orders"), "order");
        // Too short to strip safely
        assert_eq!(stem("bus"), "bus");
        assert_eq!(stem("red"), "red");
        // Double-s words are left alone
        assert_eq!(stem("glass"), "glass");
    }

    #[test]
    fn test_dimension_and_unit_length() {
        let e = HashingEmbedder::new(64);
        let v = e.embed_tokens(&toks(&["delivery", "late"]));
        assert_eq!(v.len(), 64);
        let norm: f64 = v.iter().map(|x| x * x).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_identical_tokens_identical_vectors() {
        let e = HashingEmbedder::default();
        let a = e.embed_tokens(&toks(&["app", "crashed"]));
        let b = e.embed_tokens(&toks(&["app", "crashed"]));
        assert_eq!(a, b);
    }

    #[test]
    fn test_inflections_share_features() {
        let e = HashingEmbedder::default();
        let a = e.embed_tokens(&toks(&["app", "crashed"]));
        let b = e.embed_tokens(&toks(&["app", "crashing"]));
        assert!(cosine_similarity(&a, &b) > 0.99);
    }

    #[test]
    fn test_unrelated_tokens_low_similarity() {
        let e = HashingEmbedder::default();
        let a = e.embed_tokens(&toks(&["delivery", "late"]));
        let b = e.embed_tokens(&toks(&["payment", "refund"]));
        assert!(cosine_similarity(&a, &b) < 0.3);
    }

    #[test]
    fn test_empty_tokens_zero_vector() {
        let e = HashingEmbedder::new(8);
        assert_eq!(e.embed_tokens(&[]), vec![0.0; 8]);
    }

    #[test]
    fn test_single_token_lands_in_its_xxh3_bucket() {
        let e = HashingEmbedder::new(64);
        let v = e.embed_tokens(&toks(&["late"]));
        let h = xxh3_64(b"late");
        let idx = (h % 64) as usize;
        let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
        assert_eq!(v[idx], sign);
        assert_eq!(v.iter().filter(|x| **x != 0.0).count(), 1);
    }
}
