/// ONNX Runtime embedder using the `ort` crate.
///
/// Loads a sentence-transformers MiniLM ONNX export, runs batched inference,
/// applies mean pooling with the attention mask and L2-normalizes the result.
use std::path::Path;
use std::sync::Mutex;

use ort::session::Session;
use ort::value::Tensor;
use tracing::{debug, info};

use super::tokenizer::{BertTokenizer, TokenBatch};
use super::{Embedder, EmbedderError, l2_normalize};

/// Texts per inference call; bounds peak memory on long documents.
const BATCH_SIZE: usize = 32;

/// ONNX-backed embedder implementing the `Embedder` trait.
pub struct OnnxEmbedder {
    session: Mutex<Session>,
    tokenizer: BertTokenizer,
    dimensions: usize,
}

impl OnnxEmbedder {
    /// Create a new `OnnxEmbedder` by loading a model from the given directory.
    ///
    /// Expects `model.onnx` and `tokenizer.json` in `model_dir`.
    pub fn new(
        model_dir: &Path,
        dimensions: usize,
        max_length: usize,
    ) -> Result<Self, EmbedderError> {
        let model_path = model_dir.join("model.onnx");

        if !model_path.exists() {
            return Err(EmbedderError::ModelLoadFailed(format!(
                "model.onnx not found in {}",
                model_dir.display()
            )));
        }

        info!("Initializing ONNX Runtime...");

        let session = Session::builder()
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("session builder error: {e}")))?
            .with_intra_threads(4)
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("thread config error: {e}")))?
            .commit_from_file(&model_path)
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("model load error: {e}")))?;

        info!("ONNX model loaded from {}", model_path.display());

        let tokenizer = BertTokenizer::from_model_dir(model_dir, max_length)
            .map_err(|e| EmbedderError::TokenizerError(e.to_string()))?;

        info!(
            "Tokenizer loaded (vocab size: {}, max length: {})",
            tokenizer.vocab_size(),
            tokenizer.max_length()
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            dimensions,
        })
    }

    fn run_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        let batch = self
            .tokenizer
            .tokenize_batch(texts)
            .map_err(|e| EmbedderError::TokenizerError(e.to_string()))?;
        if batch.batch_size == 0 {
            return Ok(Vec::new());
        }

        let shape = [batch.batch_size, batch.seq_len];
        let input_ids = Tensor::from_array((shape, batch.input_ids.clone()))
            .map_err(|e| EmbedderError::InferenceFailed(format!("input_ids error: {e}")))?;
        let attention_mask = Tensor::from_array((shape, batch.attention_mask.clone()))
            .map_err(|e| EmbedderError::InferenceFailed(format!("attention_mask error: {e}")))?;
        let token_type_ids = Tensor::from_array((shape, vec![0i64; batch.input_ids.len()]))
            .map_err(|e| EmbedderError::InferenceFailed(format!("token_type_ids error: {e}")))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| EmbedderError::InferenceFailed(format!("lock poisoned: {e}")))?;
        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids,
                "attention_mask" => attention_mask,
                "token_type_ids" => token_type_ids,
            ])
            .map_err(|e| EmbedderError::InferenceFailed(format!("inference failed: {e}")))?;

        // last_hidden_state: [batch, seq_len, hidden]
        let (_shape, hidden) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbedderError::InferenceFailed(format!("output extraction: {e}")))?;

        let expected = batch.batch_size * batch.seq_len * self.dimensions;
        if hidden.len() != expected {
            return Err(EmbedderError::InferenceFailed(format!(
                "unexpected output size {} (expected {expected} for {} dimensions)",
                hidden.len(),
                self.dimensions
            )));
        }

        Ok(pool_batch(hidden, &batch, self.dimensions))
    }
}

impl Embedder for OnnxEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        self.run_batch(&[text])?
            .pop()
            .ok_or_else(|| EmbedderError::InferenceFailed("empty model output".to_string()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for (i, window) in texts.chunks(BATCH_SIZE).enumerate() {
            debug!("Embedding batch {} ({} texts)", i + 1, window.len());
            vectors.extend(self.run_batch(window)?);
        }
        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Mean-pools and normalizes every row of a `[batch, seq_len, hidden]` output.
fn pool_batch(hidden: &[f32], batch: &TokenBatch, hidden_size: usize) -> Vec<Vec<f32>> {
    let row_len = batch.seq_len * hidden_size;
    (0..batch.batch_size)
        .map(|b| {
            let states = &hidden[b * row_len..(b + 1) * row_len];
            let mask = &batch.attention_mask[b * batch.seq_len..(b + 1) * batch.seq_len];
            let mut pooled = mean_pooling(states, mask, batch.seq_len, hidden_size);
            l2_normalize(&mut pooled);
            pooled
        })
        .collect()
}

/// Mean pooling over hidden states weighted by attention mask.
///
/// `hidden_data` is a flat array with shape `[seq_len, hidden_size]`.
fn mean_pooling(
    hidden_data: &[f32],
    attention_mask: &[i64],
    seq_len: usize,
    hidden_size: usize,
) -> Vec<f32> {
    let mut result = vec![0.0f32; hidden_size];
    let mut mask_sum: f32 = 0.0;

    for t in 0..seq_len {
        let mask = attention_mask[t] as f32;
        mask_sum += mask;

        for h in 0..hidden_size {
            result[h] += hidden_data[t * hidden_size + h] * mask;
        }
    }

    if mask_sum > 0.0 {
        for v in &mut result {
            *v /= mask_sum;
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::download::default_model_dir;
    use crate::embedder::tokenizer::DEFAULT_MAX_LENGTH;

    #[test]
    fn test_mean_pooling_with_padding() {
        // 2 tokens, hidden_size=2, second token is padding (mask=0)
        let hidden = vec![1.0, 2.0, 10.0, 20.0];
        let mask = vec![1i64, 0i64];
        let result = mean_pooling(&hidden, &mask, 2, 2);
        assert_eq!(result, vec![1.0, 2.0]);
    }

    #[test]
    fn test_pool_batch_rows_are_independent() {
        // batch=2, seq_len=2, hidden=2
        let hidden = vec![3.0, 4.0, 0.0, 0.0, 0.0, 1.0, 0.0, 3.0];
        let batch = TokenBatch {
            input_ids: vec![101, 102, 101, 7],
            attention_mask: vec![1, 0, 1, 1],
            batch_size: 2,
            seq_len: 2,
        };
        let pooled = pool_batch(&hidden, &batch, 2);
        assert_eq!(pooled.len(), 2);
        assert!((pooled[0][0] - 0.6).abs() < 1e-6);
        assert!((pooled[0][1] - 0.8).abs() < 1e-6);
        assert!((pooled[1][0]).abs() < 1e-6);
        assert!((pooled[1][1] - 1.0).abs() < 1e-6);
    }

    /// Integration test requiring actual model files.
    #[test]
    #[ignore]
    fn test_onnx_embed_batch_matches_single() {
        let model_dir = default_model_dir();
        if !model_dir.join("model.onnx").exists() {
            eprintln!("Skipping: model files not downloaded");
            return;
        }

        let embedder = OnnxEmbedder::new(&model_dir, 384, DEFAULT_MAX_LENGTH).unwrap();
        let single = embedder.embed("Convolutional networks on ImageNet").unwrap();
        let batch = embedder
            .embed_batch(&["Convolutional networks on ImageNet", "a short one"])
            .unwrap();

        assert_eq!(single.len(), 384);
        assert_eq!(batch.len(), 2);
        let cos: f32 = single.iter().zip(&batch[0]).map(|(a, b)| a * b).sum();
        assert!(cos > 0.999, "padding changed the embedding: {cos}");
    }
}
