// Sentence embeddings for review clustering, using all-MiniLM-L6-v2.
//
// Two reviews that complain about the same thing rarely share much wording
// ("order came an hour late" vs "delivery delayed again"). A sentence
// transformer maps both into nearby 384-dimensional vectors, so cosine
// similarity between them is high even with no overlapping tokens.
//
// The model runs locally via ONNX. Token embeddings are mean-pooled over the
// attention mask and the result is L2-normalized. Inference is deterministic.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;
use tracing::debug;

use super::traits::Embedder;
use crate::text::normalizer::CleanText;

/// Embedding dimension for all-MiniLM-L6-v2.
pub const EMBEDDING_DIM: usize = 384;

/// Reviews longer than this many word pieces are cut; the model was trained
/// on sequences of at most 256.
const MAX_SEQUENCE_TOKENS: usize = 256;

/// Sentence embedder backed by a local ONNX session.
///
/// Arc<Mutex<Session>> so the session can move into spawn_blocking;
/// Arc<Tokenizer> for the same reason.
pub struct SentenceEmbedder {
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<Tokenizer>,
}

impl SentenceEmbedder {
    /// Load `model.onnx` and `tokenizer.json` from `model_dir`.
    pub fn load(model_dir: &Path) -> Result<Self> {
        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");

        for path in [&model_path, &tokenizer_path] {
            if !path.exists() {
                anyhow::bail!(
                    "Embedding model file not found: {}\nRun `pulsegen download-model` to download it.",
                    path.display()
                );
            }
        }

        let session = Session::builder()
            .context("Failed to create ONNX session builder")?
            .commit_from_file(&model_path)
            .with_context(|| {
                format!(
                    "Failed to load embedding model from {}",
                    model_path.display()
                )
            })?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("Failed to load embedding tokenizer: {}", e))?;

        debug!(dir = %model_dir.display(), "Loaded sentence embedding model");

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
        })
    }
}

#[async_trait]
impl Embedder for SentenceEmbedder {
    fn dimension(&self) -> usize {
        EMBEDDING_DIM
    }

    fn name(&self) -> &str {
        "all-MiniLM-L6-v2"
    }

    async fn embed_batch(&self, docs: &[CleanText]) -> Result<Vec<Vec<f64>>> {
        if docs.is_empty() {
            return Ok(Vec::new());
        }

        let session = Arc::clone(&self.session);
        let tokenizer = Arc::clone(&self.tokenizer);
        let texts: Vec<String> = docs.iter().map(|d| d.text.clone()).collect();

        tokio::task::spawn_blocking(move || embed_sync(&session, &tokenizer, &texts))
            .await
            .context("spawn_blocking panicked")?
    }
}

/// Tokenize, run inference and mean-pool. Runs inside spawn_blocking.
fn embed_sync(
    session: &Mutex<Session>,
    tokenizer: &Tokenizer,
    texts: &[String],
) -> Result<Vec<Vec<f64>>> {
    let encodings = texts
        .iter()
        .map(|t| {
            tokenizer
                .encode(t.as_str(), true)
                .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))
        })
        .collect::<Result<Vec<_>>>()?;

    let batch_size = encodings.len();
    let seq_len = encodings
        .iter()
        .map(|e| e.get_ids().len().min(MAX_SEQUENCE_TOKENS))
        .max()
        .unwrap_or(0);

    if seq_len == 0 {
        return Ok(vec![vec![0.0; EMBEDDING_DIM]; batch_size]);
    }

    // Row-major [batch, seq_len] inputs, right-padded with id 0 / mask 0.
    // token_type_ids are all zero for single-sentence input.
    let mut input_ids = vec![0i64; batch_size * seq_len];
    let mut attention_mask = vec![0i64; batch_size * seq_len];
    let token_type_ids = vec![0i64; batch_size * seq_len];

    for (row, enc) in encodings.iter().enumerate() {
        let ids = enc.get_ids();
        let mask = enc.get_attention_mask();
        let n = ids.len().min(seq_len);
        let base = row * seq_len;
        for j in 0..n {
            input_ids[base + j] = i64::from(ids[j]);
            attention_mask[base + j] = i64::from(mask[j]);
        }
    }

    let shape = [batch_size as i64, seq_len as i64];
    let input_ids_tensor =
        Tensor::from_array((shape, input_ids)).context("Failed to create input_ids tensor")?;
    let attention_mask_tensor = Tensor::from_array((shape, attention_mask.clone()))
        .context("Failed to create attention_mask tensor")?;
    let token_type_ids_tensor = Tensor::from_array((shape, token_type_ids))
        .context("Failed to create token_type_ids tensor")?;

    // last_hidden_state: [batch, seq_len, EMBEDDING_DIM]
    let hidden = {
        let mut session = session
            .lock()
            .map_err(|e| anyhow::anyhow!("Session lock poisoned: {}", e))?;

        let outputs = session
            .run(ort::inputs! {
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor,
                "token_type_ids" => token_type_ids_tensor
            })
            .context("Embedding ONNX inference failed")?;

        let (_shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .context("Failed to extract embedding output tensor")?;

        data.to_vec()
    };

    if hidden.len() != batch_size * seq_len * EMBEDDING_DIM {
        anyhow::bail!(
            "Unexpected embedding output size {} for batch {}x{}",
            hidden.len(),
            batch_size,
            seq_len
        );
    }

    let embeddings: Vec<Vec<f64>> = (0..batch_size)
        .map(|row| {
            let mut pooled = vec![0.0_f64; EMBEDDING_DIM];
            let mut weight = 0.0_f64;
            for j in 0..seq_len {
                if attention_mask[row * seq_len + j] == 0 {
                    continue;
                }
                weight += 1.0;
                let offset = (row * seq_len + j) * EMBEDDING_DIM;
                for (k, slot) in pooled.iter_mut().enumerate() {
                    *slot += f64::from(hidden[offset + k]);
                }
            }
            if weight > 0.0 {
                pooled.iter_mut().for_each(|v| *v /= weight);
            }
            l2_normalize(&mut pooled);
            pooled
        })
        .collect();

    debug!(batch_size, seq_len, "Computed sentence embeddings");

    Ok(embeddings)
}

/// Scale `v` to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(v: &mut [f64]) {
    let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > f64::EPSILON {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

/// Element-wise mean of equally sized vectors. Empty input yields an empty
/// vector; callers know the dimension they expect.
pub fn mean_embedding(embeddings: &[&[f64]]) -> Vec<f64> {
    let Some(first) = embeddings.first() else {
        return Vec::new();
    };

    let mut mean = vec![0.0_f64; first.len()];
    for emb in embeddings {
        for (slot, &val) in mean.iter_mut().zip(emb.iter()) {
            *slot += val;
        }
    }
    let n = embeddings.len() as f64;
    mean.iter_mut().for_each(|v| *v /= n);
    mean
}

/// Weighted combination of two means: the mean of `a`'s `a_count` members
/// together with `b`'s `b_count` members, without revisiting either.
pub fn merge_means(a: &[f64], a_count: usize, b: &[f64], b_count: usize) -> Vec<f64> {
    let total = (a_count + b_count) as f64;
    if total == 0.0 {
        return a.to_vec();
    }
    let wa = a_count as f64 / total;
    let wb = b_count as f64 / total;
    a.iter().zip(b.iter()).map(|(x, y)| x * wa + y * wb).collect()
}

/// Cosine similarity clamped to 0.0..=1.0.
///
/// Anti-correlated vectors count as unrelated. Mismatched or empty vectors
/// score 0.0.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let mag_b: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();

    let denom = mag_a * mag_b;
    if denom < f64::EPSILON {
        0.0
    } else {
        (dot / denom).clamp(0.0, 1.0)
    }
}
