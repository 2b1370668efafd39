//! Query-time retrieval: top-k search with optional section restriction and
//! rank-based re-weighting of the results.
use std::fmt;

use thiserror::Error;
use tracing::debug;

use crate::db::{IndexError, VectorIndex};
use crate::embedder::{Embedder, EmbedderError, l2_normalize};
use crate::indexer::chunker::Chunk;

/// Label that selects every section.
pub const ALL_SECTIONS: &str = "All Sections";

pub const DEFAULT_TOP_K: usize = 5;

/// Decay coefficient of the default rank weighting.
pub const DEFAULT_DECAY_RATE: f32 = 0.3;

#[derive(Error, Debug)]
pub enum RetrieveError {
    #[error("query must not be empty")]
    EmptyQuery,

    #[error("k must be at least 1")]
    InvalidTopK,

    #[error(transparent)]
    Embedder(#[from] EmbedderError),

    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Restricts retrieval to one named section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SectionFilter {
    #[default]
    All,
    Section(String),
}

impl SectionFilter {
    /// Parses a UI label; [`ALL_SECTIONS`] and blank labels mean no filter.
    pub fn from_label(label: &str) -> Self {
        let label = label.trim();
        if label.is_empty() || label == ALL_SECTIONS {
            Self::All
        } else {
            Self::Section(label.to_string())
        }
    }

    /// The section name, or `None` for [`SectionFilter::All`].
    #[must_use]
    pub fn section(&self) -> Option<&str> {
        match self {
            Self::All => None,
            Self::Section(name) => Some(name),
        }
    }
}

impl fmt::Display for SectionFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.section().unwrap_or(ALL_SECTIONS))
    }
}

/// Assigns an importance weight to each rank of a result list.
///
/// Weights depend only on rank and count, never on similarity scores.
pub trait RankWeighting: Send + Sync {
    /// Weights for ranks `1..=count`, summing to 1.
    fn weights(&self, count: usize) -> Vec<f32>;
}

/// `weight(rank) = exp(-rate * (rank - 1))`, normalized to sum to 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExponentialDecay {
    pub rate: f32,
}

impl Default for ExponentialDecay {
    fn default() -> Self {
        Self {
            rate: DEFAULT_DECAY_RATE,
        }
    }
}

impl RankWeighting for ExponentialDecay {
    fn weights(&self, count: usize) -> Vec<f32> {
        let raw: Vec<f32> = (0..count)
            .map(|rank| (-self.rate * rank as f32).exp())
            .collect();
        let total: f32 = raw.iter().sum();
        raw.into_iter().map(|w| w / total).collect()
    }
}

/// One retrieved chunk with its rank-derived weight and raw similarity.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk<'c> {
    pub chunk: &'c Chunk,
    /// Index of the chunk in the document's chunk sequence.
    pub position: usize,
    pub weight: f32,
    pub similarity: f32,
}

/// Retrieval output, rank 0 first. Empty when a section filter matched nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievalResult<'c> {
    pub items: Vec<RetrievedChunk<'c>>,
}

impl<'c> RetrievalResult<'c> {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn chunks(&self) -> Vec<&'c Chunk> {
        self.items.iter().map(|item| item.chunk).collect()
    }

    pub fn weights(&self) -> Vec<f32> {
        self.items.iter().map(|item| item.weight).collect()
    }

    pub fn scores(&self) -> Vec<f32> {
        self.items.iter().map(|item| item.similarity).collect()
    }
}

pub struct Retriever<'a, E: Embedder + ?Sized> {
    embedder: &'a E,
    weighting: Box<dyn RankWeighting + 'a>,
}

impl<'a, E: Embedder + ?Sized> Retriever<'a, E> {
    /// Retriever with the default exponential rank decay.
    pub fn new(embedder: &'a E) -> Self {
        Self::with_weighting(embedder, ExponentialDecay::default())
    }

    pub fn with_weighting(embedder: &'a E, weighting: impl RankWeighting + 'a) -> Self {
        Self {
            embedder,
            weighting: Box::new(weighting),
        }
    }

    /// Returns the `k` chunks closest to `query`, best first.
    ///
    /// With a section filter only that section's chunks are candidates and
    /// `k` shrinks to the number of candidates; a section with no chunks
    /// yields an empty result rather than an error. `k == 0` is rejected.
    pub fn retrieve<'c>(
        &self,
        query: &str,
        chunks: &'c [Chunk],
        index: &VectorIndex,
        k: usize,
        filter: &SectionFilter,
    ) -> Result<RetrievalResult<'c>, RetrieveError> {
        if query.trim().is_empty() {
            return Err(RetrieveError::EmptyQuery);
        }
        if k == 0 {
            return Err(RetrieveError::InvalidTopK);
        }
        if chunks.len() != index.len() {
            return Err(IndexError::Misaligned {
                chunks: chunks.len(),
                vectors: index.len(),
            }
            .into());
        }

        let candidates = match filter.section() {
            Some(name) => index.count_in_section(name)?,
            None => index.len(),
        };
        let effective_k = k.min(candidates);
        debug!(
            "Retrieving k={} (effective {}) from {} candidate(s), filter: {}",
            k, effective_k, candidates, filter
        );
        if effective_k == 0 {
            return Ok(RetrievalResult::default());
        }

        let mut query_vector = self.embedder.embed(query)?;
        l2_normalize(&mut query_vector);

        let hits = index.search_with_filter(&query_vector, effective_k, filter.section())?;
        let weights = self.weighting.weights(hits.len());

        let items = hits
            .into_iter()
            .zip(weights)
            .map(|(hit, weight)| {
                let chunk = chunks
                    .get(hit.position)
                    .ok_or(IndexError::PositionOutOfRange {
                        position: hit.position,
                        len: chunks.len(),
                    })?;
                Ok(RetrievedChunk {
                    chunk,
                    position: hit.position,
                    weight,
                    similarity: hit.similarity,
                })
            })
            .collect::<Result<Vec<_>, RetrieveError>>()?;

        Ok(RetrievalResult { items })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::mock::MockEmbedder;
    use crate::indexer::chunker::ChunkerOptions;
    use crate::indexer::core::Indexer;

    const PAPER: &str = "Abstract\nWe present a vision model.\n\
        Introduction\nImage classification is a core task.\n\
        Methods\nWe trained on the ImageNet dataset with a ResNet backbone.\n\n\
        The dataset was used with standard augmentation.\n\n\
        Training used eight GPUs for ninety epochs.\n\
        Results\nTop-1 accuracy reached 80 percent.\n\
        Conclusion\nThe model works well.\n";

    fn indexed(
        embedder: &MockEmbedder,
        text: &str,
        size: usize,
    ) -> (Vec<Chunk>, VectorIndex) {
        let indexer = Indexer::new(embedder, ChunkerOptions::new(size, 10));
        let chunks = indexer.chunk_document(text);
        let (index, _) = indexer.index_chunks(&chunks).unwrap();
        (chunks, index)
    }

    #[test]
    fn test_exponential_weights_monotonic_and_normalized() {
        let decay = ExponentialDecay::default();
        for k in 1..=10 {
            let weights = decay.weights(k);
            assert_eq!(weights.len(), k);
            let sum: f32 = weights.iter().sum();
            assert!((sum - 1.0).abs() < 1e-5, "k={k} sums to {sum}");
            assert!(weights.windows(2).all(|w| w[0] >= w[1]));
        }
    }

    #[test]
    fn test_exponential_weights_decay_ratio() {
        let weights = ExponentialDecay::default().weights(3);
        let ratio = weights[1] / weights[0];
        assert!((ratio - (-0.3f32).exp()).abs() < 1e-5);
        assert!(ExponentialDecay::default().weights(0).is_empty());
        assert_eq!(ExponentialDecay::default().weights(1), vec![1.0]);
    }

    #[test]
    fn test_section_filter_labels() {
        assert_eq!(SectionFilter::from_label("All Sections"), SectionFilter::All);
        assert_eq!(SectionFilter::from_label("  "), SectionFilter::All);
        assert_eq!(
            SectionFilter::from_label("Methods"),
            SectionFilter::Section("Methods".into())
        );
        assert_eq!(SectionFilter::All.to_string(), "All Sections");
        assert_eq!(SectionFilter::Section("Results".into()).to_string(), "Results");
    }

    #[test]
    fn test_retrieve_without_filter() {
        let embedder = MockEmbedder::default();
        let (chunks, index) = indexed(&embedder, PAPER, 500);
        let retriever = Retriever::new(&embedder);

        let result = retriever
            .retrieve("What dataset was used?", &chunks, &index, 3, &SectionFilter::All)
            .unwrap();

        assert_eq!(result.len(), 3);
        assert_eq!(result.items[0].chunk.section, "Methods");
        let scores = result.scores();
        assert!(scores.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_retrieve_with_section_filter() {
        let embedder = MockEmbedder::default();
        let (chunks, index) = indexed(&embedder, PAPER, 60);
        let retriever = Retriever::new(&embedder);
        let filter = SectionFilter::from_label("Methods");

        let result = retriever
            .retrieve("What dataset was used?", &chunks, &index, 5, &filter)
            .unwrap();

        assert!(result.len() >= 2);
        for item in &result.items {
            assert_eq!(item.chunk.section, "Methods");
            assert_eq!(&chunks[item.position], item.chunk);
        }
        let weights = result.weights();
        assert!(weights[1..].iter().all(|w| weights[0] > *w));
    }

    #[test]
    fn test_retrieve_missing_section_is_empty() {
        let embedder = MockEmbedder::default();
        let text = "Abstract\nSummary.\nMethods\nWe used ImageNet.\n";
        let (chunks, index) = indexed(&embedder, text, 500);
        let retriever = Retriever::new(&embedder);

        let result = retriever
            .retrieve("Any results?", &chunks, &index, 5, &SectionFilter::from_label("Results"))
            .unwrap();

        assert!(result.is_empty());
        assert!(result.chunks().is_empty());
        assert!(result.weights().is_empty());
        assert!(result.scores().is_empty());
    }

    #[test]
    fn test_k_larger_than_document() {
        let embedder = MockEmbedder::default();
        let text = "Abstract\nSummary of the work.\nMethods\nWe used ImageNet.\n";
        let (chunks, index) = indexed(&embedder, text, 500);
        assert_eq!(chunks.len(), 2);

        let result = Retriever::new(&embedder)
            .retrieve("dataset", &chunks, &index, 5, &SectionFilter::All)
            .unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(result.weights(), ExponentialDecay::default().weights(2));
        let sum: f32 = result.weights().iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_chunk_retrieves_itself_first() {
        let embedder = MockEmbedder::default();
        let (chunks, index) = indexed(&embedder, PAPER, 60);
        let retriever = Retriever::new(&embedder);

        for (position, chunk) in chunks.iter().enumerate() {
            let result = retriever
                .retrieve(&chunk.text, &chunks, &index, 1, &SectionFilter::All)
                .unwrap();
            assert_eq!(result.items[0].position, position);
            assert!((result.items[0].similarity - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        let embedder = MockEmbedder::default();
        let (chunks, index) = indexed(&embedder, PAPER, 500);
        let retriever = Retriever::new(&embedder);

        let err = retriever
            .retrieve("dataset", &chunks, &index, 0, &SectionFilter::All)
            .unwrap_err();
        assert!(matches!(err, RetrieveError::InvalidTopK));

        let err = retriever
            .retrieve("   ", &chunks, &index, 3, &SectionFilter::All)
            .unwrap_err();
        assert!(matches!(err, RetrieveError::EmptyQuery));

        let err = retriever
            .retrieve("dataset", &chunks[1..], &index, 3, &SectionFilter::All)
            .unwrap_err();
        assert!(matches!(
            err,
            RetrieveError::Index(IndexError::Misaligned { .. })
        ));
    }

    #[test]
    fn test_custom_weighting_policy() {
        struct Uniform;
        impl RankWeighting for Uniform {
            fn weights(&self, count: usize) -> Vec<f32> {
                vec![1.0 / count as f32; count]
            }
        }

        let embedder = MockEmbedder::default();
        let (chunks, index) = indexed(&embedder, PAPER, 500);
        let result = Retriever::with_weighting(&embedder, Uniform)
            .retrieve("dataset", &chunks, &index, 4, &SectionFilter::All)
            .unwrap();

        assert_eq!(result.len(), 4);
        assert!(result.weights().iter().all(|w| (w - 0.25).abs() < 1e-6));
    }
}
