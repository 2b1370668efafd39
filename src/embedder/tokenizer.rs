/// BERT tokenizer wrapper around HuggingFace `tokenizers` crate.
///
/// Provides padded, truncated batches with attention masks for the ONNX
/// embedder.
use std::path::Path;

use anyhow::Result;
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};

/// Sequence length used by the sentence-transformers MiniLM checkpoints.
pub const DEFAULT_MAX_LENGTH: usize = 256;

/// Wrapper around the HuggingFace tokenizer for BERT-style models.
pub struct BertTokenizer {
    inner: Tokenizer,
    max_length: usize,
}

/// A padded batch ready to be turned into `[batch, seq_len]` tensors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBatch {
    /// Row-major token IDs, `batch * seq_len` long.
    pub input_ids: Vec<i64>,
    /// Row-major attention mask (1 for real tokens, 0 for padding).
    pub attention_mask: Vec<i64>,
    pub batch_size: usize,
    pub seq_len: usize,
}

impl BertTokenizer {
    /// Load a tokenizer from a `tokenizer.json` file in the model directory.
    pub fn from_model_dir(model_dir: &Path, max_length: usize) -> Result<Self> {
        let tokenizer_path = model_dir.join("tokenizer.json");

        anyhow::ensure!(
            tokenizer_path.exists(),
            "tokenizer.json not found in {}",
            model_dir.display()
        );

        let mut inner = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("failed to load tokenizer: {e}"))?;

        inner
            .with_truncation(Some(TruncationParams {
                max_length,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("failed to configure truncation: {e}"))?;

        // Pad every batch to its longest member.
        inner.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..Default::default()
        }));

        Ok(Self { inner, max_length })
    }

    /// Tokenize texts into one padded batch.
    pub fn tokenize_batch(&self, texts: &[&str]) -> Result<TokenBatch> {
        let encodings = self
            .inner
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow::anyhow!("failed to encode batch: {e}"))?;

        let seq_len = encodings.first().map_or(0, |enc| enc.get_ids().len());
        let mut batch = TokenBatch {
            input_ids: Vec::with_capacity(encodings.len() * seq_len),
            attention_mask: Vec::with_capacity(encodings.len() * seq_len),
            batch_size: encodings.len(),
            seq_len,
        };

        for enc in &encodings {
            anyhow::ensure!(
                enc.get_ids().len() == seq_len,
                "unpadded encoding: expected {seq_len} tokens, got {}",
                enc.get_ids().len()
            );
            batch
                .input_ids
                .extend(enc.get_ids().iter().map(|&id| i64::from(id)));
            batch
                .attention_mask
                .extend(enc.get_attention_mask().iter().map(|&m| i64::from(m)));
        }

        Ok(batch)
    }

    /// Get the vocabulary size.
    #[must_use]
    pub fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(false)
    }

    /// Get the configured maximum sequence length.
    #[must_use]
    pub fn max_length(&self) -> usize {
        self.max_length
    }
}
