/// Deterministic bag-of-words embedder for tests and offline runs.
///
/// Each lowercase word is hashed (FNV-1a) into one signed bucket, so texts that
/// share vocabulary get a positive cosine similarity and identical texts embed
/// identically.
use super::{Embedder, EmbedderError, l2_normalize};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Weight of the constant bucket that keeps word-less texts non-zero.
const BIAS: f32 = 0.05;

/// A mock embedder that hashes words into a fixed number of buckets.
///
/// Useful for testing without loading a real ONNX model.
/// Always at least two dimensions: bucket 0 holds the bias.
pub struct MockEmbedder {
    dimensions: usize,
}

impl MockEmbedder {
    /// Create a new `MockEmbedder` with the given dimensionality.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(2),
        }
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

fn fnv1a(word: &str) -> u64 {
    word.bytes().fold(FNV_OFFSET, |hash, b| {
        (hash ^ u64::from(b)).wrapping_mul(FNV_PRIME)
    })
}

impl Embedder for MockEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        let mut embedding = vec![0.0f32; self.dimensions];
        embedding[0] = BIAS;

        let words = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase);

        for word in words {
            let hash = fnv1a(&word);
            // bucket 0 is reserved for the bias
            let bucket = 1 + (hash % (self.dimensions as u64 - 1)) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            embedding[bucket] += sign;
        }

        l2_normalize(&mut embedding);
        Ok(embedding)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
