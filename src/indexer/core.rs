use thiserror::Error;
use tracing::info;

use crate::db::{IndexError, VectorIndex};
use crate::embedder::{Embedder, EmbedderError, l2_normalize};
use crate::indexer::chunker::{self, Chunk, ChunkerOptions};
use crate::indexer::sections;

#[derive(Error, Debug)]
pub enum IndexingError {
    #[error(transparent)]
    Embedder(#[from] EmbedderError),

    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Turns raw document text into a position-aligned (chunks, index) pair.
pub struct Indexer<'a, E: Embedder + ?Sized> {
    pub embedder: &'a E,
    pub options: ChunkerOptions,
}

impl<'a, E: Embedder + ?Sized> Indexer<'a, E> {
    pub fn new(embedder: &'a E, options: ChunkerOptions) -> Self {
        Self { embedder, options }
    }

    /// Detects sections and splits them into tagged chunks.
    pub fn chunk_document(&self, text: &str) -> Vec<Chunk> {
        let sections = sections::detect_sections(text);
        info!("Detected {} section(s)", sections.len());

        let chunks = chunker::chunk_sections(&sections, self.options);
        info!(
            "Split document into {} chunk(s) (size {}, overlap {})",
            chunks.len(),
            self.options.chunk_size,
            self.options.chunk_overlap
        );
        chunks
    }

    /// Embeds every chunk in order and builds the index over the vectors.
    ///
    /// Vector `i` of both the returned embeddings and the index belongs to
    /// `chunks[i]`.
    pub fn index_chunks(
        &self,
        chunks: &[Chunk],
    ) -> Result<(VectorIndex, Vec<Vec<f32>>), IndexingError> {
        let text_refs: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();

        let mut vectors = if text_refs.is_empty() {
            Vec::new()
        } else {
            self.embedder.embed_batch(&text_refs)?
        };
        for vector in &mut vectors {
            l2_normalize(vector);
        }

        let index = VectorIndex::build(chunks, &vectors, self.embedder.dimensions())?;
        Ok((index, vectors))
    }
}
